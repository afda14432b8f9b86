/// Layout module - shader mappings compiled into descriptor layouts,
/// packed uniform structs, specialization data and vertex input state

pub mod mapping;
pub mod uniform_struct;
pub mod descriptor_layout;
pub mod specialization;
pub mod vertex_input;

pub use mapping::*;
pub use uniform_struct::*;
pub use descriptor_layout::*;
pub use specialization::*;
pub use vertex_input::*;
