/// Memory module - device memory allocation and the shared GPU context

pub mod memory_manager;
pub mod gpu_context;

pub use memory_manager::*;
pub use gpu_context::*;
