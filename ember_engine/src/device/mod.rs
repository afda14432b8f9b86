/// Device module - the GPU interface the engine is written against

pub mod device;
pub mod swapchain;
#[cfg(test)]
pub mod mock_device;

pub use device::*;
pub use swapchain::*;
