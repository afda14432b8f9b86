/// Swapchain trait - presentation surface and its per-image render targets
///
/// The swapchain owns the render pass, the depth attachment and one
/// framebuffer per presentable image. Everything extent-dependent is rebuilt
/// by `recreate`.

use ash::vk;
use crate::error::Result;

pub trait Swapchain {
    /// Number of presentable images (and framebuffers)
    fn image_count(&self) -> usize;

    fn extent(&self) -> vk::Extent2D;

    fn render_pass(&self) -> vk::RenderPass;

    fn framebuffer(&self, image_index: usize) -> vk::Framebuffer;

    /// Acquire the next image, signalling `image_ready` when it can be rendered to
    ///
    /// # Errors
    ///
    /// `Error::SwapchainOutOfDate` when the surface changed; the caller must
    /// go through its resize path.
    fn acquire_next_image(&mut self, image_ready: vk::Semaphore) -> Result<u32>;

    /// Queue `image_index` for presentation once `rendering_done` is signalled
    fn present(&mut self, image_index: u32, rendering_done: vk::Semaphore) -> Result<()>;

    /// Rebuild the swapchain and its render targets for a new surface size
    fn recreate(&mut self, width: u32, height: u32) -> Result<()>;
}
