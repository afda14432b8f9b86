/*!
# Ember Engine - Vulkan Backend

Implements the `Device` and `Swapchain` traits of `ember_engine` with `ash`.

```no_run
use std::sync::Arc;
use ember_engine::ember::{Config, Runtime};
use ember_engine_renderer_vulkan::{VulkanDevice, VulkanSwapchain};
# fn run(window: &winit::window::Window) -> ember_engine::ember::Result<()> {
let config = Config::default();
let device = Arc::new(VulkanDevice::new(window, &config)?);
let swapchain = VulkanSwapchain::new(device.clone(), window, &config)?;
let mut runtime = Runtime::new(device, Box::new(swapchain), config)?;
# let _ = &mut runtime;
# Ok(())
# }
```

Validation layers and the debug messenger are only compiled in with the
`vulkan-validation` feature, and only enabled when `Config::enable_validation`
is set.
*/

mod debug;
mod vulkan_error;
mod vulkan_queues;
mod vulkan_device;
mod vulkan_swapchain;

pub use vulkan_device::VulkanDevice;
pub use vulkan_swapchain::VulkanSwapchain;

// Re-export debug utilities
pub use debug::{get_validation_stats, print_validation_stats_report, ValidationStats};
