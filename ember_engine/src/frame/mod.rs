/// Frame module - per-frame swapchain synchronization

pub mod frame_driver;

pub use frame_driver::{FrameDriver, FrameOutcome, FrameState};
