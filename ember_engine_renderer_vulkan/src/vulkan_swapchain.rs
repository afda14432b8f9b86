/// VulkanSwapchain - `ash` implementation of the engine's `Swapchain` trait
///
/// Owns the surface, the swapchain, one view and framebuffer per image, the
/// shared depth attachment and the render pass every scene pipeline is built
/// against. The render pass only depends on the surface format, so it
/// survives `recreate`; everything extent-dependent is rebuilt.

use std::sync::Arc;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use ember_engine::config::Config;
use ember_engine::ember::device::{Device, ImageDesc, ImageViewDesc, Swapchain};
use ember_engine::ember::memory::{BoundResource, MemoryBlock, MemoryManager};
use ember_engine::ember::{Error, Result};
use ember_engine::{engine_debug, engine_warn};

use crate::vulkan_device::VulkanDevice;
use crate::vulkan_error::{init_error, vk_error};

const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Prefer an sRGB BGRA/RGBA format, else whatever the surface lists first
pub(crate) fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| f.format == vk::Format::B8G8R8A8_SRGB || f.format == vk::Format::R8G8B8A8_SRGB)
        .or_else(|| formats.first())
        .copied()
}

/// The surface extent when it dictates one, else `requested` clamped to its limits
pub(crate) fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, requested: (u32, u32)) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: requested.0.clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
        height: requested.1.clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
    }
}

/// One image more than the minimum, bounded by the maximum (0 = unbounded)
pub(crate) fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

struct DepthTarget {
    block: MemoryBlock,
    view: vk::ImageView,
}

pub struct VulkanSwapchain {
    device: Arc<VulkanDevice>,
    memory: MemoryManager,
    present_queue: vk::Queue,

    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,

    swapchain: vk::SwapchainKHR,
    loader: ash::khr::swapchain::Device,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    depth: Option<DepthTarget>,

    render_pass: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,
}

impl VulkanSwapchain {
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(
        device: Arc<VulkanDevice>,
        window: &W,
        config: &Config,
    ) -> Result<Self> {
        let display_handle = window.display_handle().map_err(|e| init_error("Failed to get display handle", e))?;
        let window_handle = window.window_handle().map_err(|e| init_error("Failed to get window handle", e))?;
        let surface = unsafe {
            ash_window::create_surface(
                device.entry(),
                device.instance(),
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
        }
        .map_err(|e| init_error("Failed to create surface", e))?;
        let surface_loader = ash::khr::surface::Instance::new(device.entry(), device.instance());

        let render = device.render_queue();
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(device.physical_device(), surface)
        };
        let format = match formats.map(|f| choose_surface_format(&f)) {
            Ok(Some(format)) => format,
            Ok(None) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                return Err(init_error("Surface reports no formats", vk::Result::ERROR_FORMAT_NOT_SUPPORTED));
            }
            Err(e) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                return Err(init_error("Failed to query surface formats", e));
            }
        };

        let loader = ash::khr::swapchain::Device::new(device.instance(), device.raw());
        let memory = MemoryManager::new(device.clone() as Arc<dyn Device>);
        let mut swapchain = Self {
            device,
            memory,
            present_queue: render.handle,
            surface,
            surface_loader,
            swapchain: vk::SwapchainKHR::null(),
            loader,
            format,
            extent: vk::Extent2D::default(),
            images: Vec::new(),
            views: Vec::new(),
            depth: None,
            render_pass: vk::RenderPass::null(),
            framebuffers: Vec::new(),
        };

        // Drop releases whatever was created if a step fails
        swapchain.render_pass = swapchain.create_render_pass()?;
        swapchain.build_targets(config.initial_extent)?;
        engine_debug!("ember::vulkan", "Swapchain created: {}x{}, {} images, {:?}",
            swapchain.extent.width, swapchain.extent.height, swapchain.images.len(), swapchain.format.format);
        Ok(swapchain)
    }

    pub fn format(&self) -> vk::Format {
        self.format.format
    }

    fn create_render_pass(&self) -> Result<vk::RenderPass> {
        let attachments = [
            vk::AttachmentDescription::default()
                .format(self.format.format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
            vk::AttachmentDescription::default()
                .format(DEPTH_FORMAT)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        ];
        let color_refs = [vk::AttachmentReference { attachment: 0, layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL }];
        let depth_ref = vk::AttachmentReference { attachment: 1, layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL };
        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(&depth_ref)];
        let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
        let dependencies = [vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(stages)
            .dst_stage_mask(stages)
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )];

        let info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);
        unsafe { self.device.raw().create_render_pass(&info, None) }.map_err(|e| vk_error("vkCreateRenderPass", e))
    }

    /// Create (or replace) the swapchain and every extent-dependent target
    fn build_targets(&mut self, requested: (u32, u32)) -> Result<()> {
        let capabilities = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.device.physical_device(), self.surface)
        }
        .map_err(|e| vk_error("vkGetPhysicalDeviceSurfaceCapabilitiesKHR", e))?;
        let extent = choose_extent(&capabilities, requested);

        let old_swapchain = self.swapchain;
        let info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(choose_image_count(&capabilities))
            .image_format(self.format.format)
            .image_color_space(self.format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true)
            .old_swapchain(old_swapchain);
        let swapchain = unsafe { self.loader.create_swapchain(&info, None) }
            .map_err(|e| vk_error("vkCreateSwapchainKHR", e))?;
        if old_swapchain != vk::SwapchainKHR::null() {
            unsafe { self.loader.destroy_swapchain(old_swapchain, None) };
        }
        self.swapchain = swapchain;
        self.extent = extent;

        self.images = unsafe { self.loader.get_swapchain_images(swapchain) }
            .map_err(|e| vk_error("vkGetSwapchainImagesKHR", e))?;
        for &image in &self.images {
            let view = self.device.create_image_view(&ImageViewDesc {
                image,
                view_type: vk::ImageViewType::TYPE_2D,
                format: self.format.format,
                subresource_range: subresource(vk::ImageAspectFlags::COLOR),
            })?;
            self.views.push(view);
        }

        let depth = self.create_depth_target()?;
        let depth_view = depth.view;
        self.depth = Some(depth);

        for &view in &self.views {
            let attachments = [view, depth_view];
            let info = vk::FramebufferCreateInfo::default()
                .render_pass(self.render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);
            let framebuffer = unsafe { self.device.raw().create_framebuffer(&info, None) }
                .map_err(|e| vk_error("vkCreateFramebuffer", e))?;
            self.framebuffers.push(framebuffer);
        }
        Ok(())
    }

    fn create_depth_target(&mut self) -> Result<DepthTarget> {
        let image = self.device.create_image(&ImageDesc {
            flags: vk::ImageCreateFlags::empty(),
            image_type: vk::ImageType::TYPE_2D,
            format: DEPTH_FORMAT,
            extent: vk::Extent3D { width: self.extent.width, height: self.extent.height, depth: 1 },
            mip_levels: 1,
            array_layers: 1,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        })?;
        let block = match self.memory.allocate(BoundResource::Image(image), vk::MemoryPropertyFlags::DEVICE_LOCAL) {
            Ok(block) => block,
            Err(e) => {
                self.device.destroy_image(image);
                return Err(e);
            }
        };
        let view = self.device.create_image_view(&ImageViewDesc {
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format: DEPTH_FORMAT,
            subresource_range: subresource(vk::ImageAspectFlags::DEPTH),
        });
        match view {
            Ok(view) => Ok(DepthTarget { block, view }),
            Err(e) => {
                self.memory.free(block);
                Err(e)
            }
        }
    }

    /// Release framebuffers, views and the depth target (not the swapchain itself)
    fn destroy_targets(&mut self) {
        for framebuffer in self.framebuffers.drain(..) {
            unsafe { self.device.raw().destroy_framebuffer(framebuffer, None) };
        }
        for view in self.views.drain(..) {
            self.device.destroy_image_view(view);
        }
        if let Some(depth) = self.depth.take() {
            self.device.destroy_image_view(depth.view);
            self.memory.free(depth.block);
        }
        self.images.clear();
    }
}

fn subresource(aspect_mask: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

impl Swapchain for VulkanSwapchain {
    fn image_count(&self) -> usize {
        self.images.len()
    }

    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    fn framebuffer(&self, image_index: usize) -> vk::Framebuffer {
        self.framebuffers.get(image_index).copied().unwrap_or_default()
    }

    fn acquire_next_image(&mut self, image_ready: vk::Semaphore) -> Result<u32> {
        let acquired = unsafe {
            self.loader.acquire_next_image(self.swapchain, u64::MAX, image_ready, vk::Fence::null())
        };
        match acquired {
            Ok((index, _suboptimal)) => Ok(index),
            Err(e) => Err(vk_error("vkAcquireNextImageKHR", e)),
        }
    }

    fn present(&mut self, image_index: u32, rendering_done: vk::Semaphore) -> Result<()> {
        let swapchains = [self.swapchain];
        let indices = [image_index];
        let wait = [rendering_done];
        let info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait)
            .swapchains(&swapchains)
            .image_indices(&indices);

        match unsafe { self.loader.queue_present(self.present_queue, &info) } {
            Ok(_suboptimal) => Ok(()),
            Err(e) => Err(vk_error("vkQueuePresentKHR", e)),
        }
    }

    fn recreate(&mut self, width: u32, height: u32) -> Result<()> {
        self.device.device_wait_idle()?;
        self.destroy_targets();
        self.build_targets((width, height))?;
        if self.images.is_empty() {
            return Err(Error::InitializationFailed("Swapchain has no images".to_string()));
        }
        Ok(())
    }
}

impl Drop for VulkanSwapchain {
    fn drop(&mut self) {
        if let Err(e) = self.device.device_wait_idle() {
            engine_warn!("ember::vulkan", "Wait idle before swapchain teardown failed: {}", e);
        }
        self.destroy_targets();
        unsafe {
            if self.render_pass != vk::RenderPass::null() {
                self.device.raw().destroy_render_pass(self.render_pass, None);
            }
            if self.swapchain != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(self.swapchain, None);
            }
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

#[cfg(test)]
#[path = "vulkan_swapchain_tests.rs"]
mod tests;
