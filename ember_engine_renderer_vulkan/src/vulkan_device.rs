/// VulkanDevice - `ash` implementation of the engine's `Device` trait
///
/// Owns the instance, the logical device, one queue per configured queue
/// requirement and the optional validation messenger. Every trait method is a
/// thin wrapper over the matching Vulkan call; failures are converted by
/// `vk_error` with the call name.

use std::ffi::CString;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use rustc_hash::FxHashSet;

use ember_engine::config::{Config, RENDER_QUEUE};
use ember_engine::ember::device::{
    BufferDesc, DescriptorResource, DescriptorWrite, Device, DeviceLimits, GraphicsPipelineDesc, ImageBarrier,
    ImageDesc, ImageViewDesc, LayoutBinding, QueueInfo, SamplerDesc, ShaderStageDesc, SubmitInfo,
};
use ember_engine::ember::{Error, Result};
use ember_engine::{engine_info, engine_warn};

use crate::debug::DebugMessenger;
use crate::vulkan_error::{init_error, vk_alloc_error, vk_error};
use crate::vulkan_queues::select_queue_families;

pub struct VulkanDevice {
    entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    debug: Option<DebugMessenger>,

    queues: Vec<(String, QueueInfo)>,
    render_queue: QueueInfo,
    limits: DeviceLimits,
    memory_types: Vec<vk::MemoryPropertyFlags>,
}

impl VulkanDevice {
    /// Create the instance and the logical device for `window`
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(window: &W, config: &Config) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load().map_err(|e| init_error("Failed to load Vulkan library", e))?;

            let app_name = CString::new(config.app_name.as_str())
                .map_err(|e| init_error("Invalid application name", e))?;
            let (major, minor, patch) = config.app_version;
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, major, minor, patch))
                .engine_name(c"Ember")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_2);

            let display_handle = window.display_handle().map_err(|e| init_error("Failed to get display handle", e))?;
            let mut extension_names = ash_window::enumerate_required_extensions(display_handle.as_raw())
                .map_err(|e| init_error("Failed to get required extensions", e))?
                .to_vec();

            let validation = cfg!(feature = "vulkan-validation") && config.enable_validation;
            if validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
            }
            let layer_names = if validation {
                vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
            } else {
                vec![]
            };

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);
            let instance = entry
                .create_instance(&create_info, None)
                .map_err(|e| init_error("Failed to create instance", e))?;

            let debug = if validation {
                match DebugMessenger::new(&entry, &instance, config.debug_severity) {
                    Ok(messenger) => Some(messenger),
                    Err(e) => {
                        instance.destroy_instance(None);
                        return Err(e);
                    }
                }
            } else {
                None
            };

            match Self::create_device(&entry, &instance, window, config) {
                Ok((physical_device, device, queues, render_queue)) => {
                    let properties = instance.get_physical_device_properties(physical_device);
                    let memory = instance.get_physical_device_memory_properties(physical_device);
                    let limits = DeviceLimits {
                        min_uniform_buffer_offset_alignment: properties.limits.min_uniform_buffer_offset_alignment,
                        max_bound_descriptor_sets: properties.limits.max_bound_descriptor_sets,
                        max_compute_work_group_count: properties.limits.max_compute_work_group_count,
                    };
                    let memory_types = memory.memory_types[..memory.memory_type_count as usize]
                        .iter()
                        .map(|t| t.property_flags)
                        .collect();

                    let name = properties.device_name_as_c_str().map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    engine_info!("ember::vulkan", "Using '{}' with {} queue(s)", name, queues.len());

                    Ok(Self { entry, instance, physical_device, device, debug, queues, render_queue, limits, memory_types })
                }
                Err(e) => {
                    if let Some(debug) = &debug {
                        debug.destroy();
                    }
                    instance.destroy_instance(None);
                    Err(e)
                }
            }
        }
    }

    unsafe fn create_device<W: HasDisplayHandle + HasWindowHandle>(
        entry: &ash::Entry,
        instance: &ash::Instance,
        window: &W,
        config: &Config,
    ) -> Result<(vk::PhysicalDevice, ash::Device, Vec<(String, QueueInfo)>, QueueInfo)> {
        // Temporary surface, only used to check present support
        let display_handle = window.display_handle().map_err(|e| init_error("Failed to get display handle", e))?;
        let window_handle = window.window_handle().map_err(|e| init_error("Failed to get window handle", e))?;
        let surface = ash_window::create_surface(entry, instance, display_handle.as_raw(), window_handle.as_raw(), None)
            .map_err(|e| init_error("Failed to create surface", e))?;
        let surface_loader = ash::khr::surface::Instance::new(entry, instance);

        let selected = Self::pick_physical_device(instance, &surface_loader, surface, config);
        surface_loader.destroy_surface(surface, None);
        let (physical_device, families, assignments) = selected?;

        let unique: FxHashSet<u32> = assignments.iter().map(|a| a.family).collect();
        let mut unique: Vec<u32> = unique.into_iter().collect();
        unique.sort_unstable();
        let priorities = [1.0];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique
            .iter()
            .map(|&family| vk::DeviceQueueCreateInfo::default().queue_family_index(family).queue_priorities(&priorities))
            .collect();

        let extensions = [ash::khr::swapchain::NAME.as_ptr()];
        let features = vk::PhysicalDeviceFeatures::default();
        let device_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);
        let device = instance
            .create_device(physical_device, &device_info, None)
            .map_err(|e| init_error("Failed to create logical device", e))?;

        let queues: Vec<(String, QueueInfo)> = assignments
            .into_iter()
            .map(|a| {
                let info = QueueInfo {
                    handle: device.get_device_queue(a.family, 0),
                    family: a.family,
                    flags: families[a.family as usize].queue_flags,
                };
                (a.name, info)
            })
            .collect();
        let render_queue = queues
            .iter()
            .find(|(name, _)| name == RENDER_QUEUE)
            .map(|(_, info)| *info)
            .ok_or_else(|| Error::InitializationFailed("Render queue was not created".to_string()))?;

        Ok((physical_device, device, queues, render_queue))
    }

    /// First physical device whose queue families satisfy every requirement
    unsafe fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        config: &Config,
    ) -> Result<(vk::PhysicalDevice, Vec<vk::QueueFamilyProperties>, Vec<crate::vulkan_queues::QueueAssignment>)> {
        let physical_devices = instance
            .enumerate_physical_devices()
            .map_err(|e| init_error("Failed to enumerate physical devices", e))?;

        let mut last_error = Error::InitializationFailed("No Vulkan-capable GPU found".to_string());
        for physical_device in physical_devices {
            let families = instance.get_physical_device_queue_family_properties(physical_device);
            let can_present = |family: u32| {
                surface_loader
                    .get_physical_device_surface_support(physical_device, family, surface)
                    .unwrap_or(false)
            };
            match select_queue_families(&families, &config.queues, can_present) {
                Ok(assignments) => return Ok((physical_device, families, assignments)),
                Err(e) => last_error = e,
            }
        }
        Err(last_error)
    }

    pub(crate) fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    pub(crate) fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub(crate) fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub(crate) fn raw(&self) -> &ash::Device {
        &self.device
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                engine_warn!("ember::vulkan", "Wait idle before device teardown failed: {:?}", e);
            }
            self.device.destroy_device(None);
            if let Some(debug) = &self.debug {
                debug.destroy();
            }
            self.instance.destroy_instance(None);
        }
    }
}

// ============================================================================
// Device trait
// ============================================================================

fn specialization_entries(stage: &ShaderStageDesc) -> Vec<vk::SpecializationMapEntry> {
    stage
        .specialization
        .as_ref()
        .map(|data| {
            data.entries
                .iter()
                .map(|e| vk::SpecializationMapEntry { constant_id: e.constant_id, offset: e.offset, size: e.size })
                .collect()
        })
        .unwrap_or_default()
}

fn entry_point(stage: &ShaderStageDesc) -> Result<CString> {
    CString::new(stage.entry_point.as_str())
        .map_err(|_| Error::InvalidResource(format!("Invalid entry point name '{}'", stage.entry_point)))
}

impl Device for VulkanDevice {
    // ===== INFO =====

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn memory_types(&self) -> Vec<vk::MemoryPropertyFlags> {
        self.memory_types.clone()
    }

    fn queue(&self, name: &str) -> Option<QueueInfo> {
        self.queues.iter().find(|(n, _)| n == name).map(|(_, info)| *info)
    }

    fn render_queue(&self) -> QueueInfo {
        self.render_queue
    }

    // ===== MEMORY =====

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        unsafe { self.device.get_buffer_memory_requirements(buffer) }
    }

    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        unsafe { self.device.get_image_memory_requirements(image) }
    }

    fn allocate_memory(&self, size: u64, memory_type_index: u32) -> Result<vk::DeviceMemory> {
        let info = vk::MemoryAllocateInfo::default().allocation_size(size).memory_type_index(memory_type_index);
        unsafe { self.device.allocate_memory(&info, None) }.map_err(|e| vk_alloc_error("vkAllocateMemory", e, size))
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.free_memory(memory, None) }
    }

    fn bind_buffer_memory(&self, buffer: vk::Buffer, memory: vk::DeviceMemory, offset: u64) -> Result<()> {
        unsafe { self.device.bind_buffer_memory(buffer, memory, offset) }
            .map_err(|e| vk_error("vkBindBufferMemory", e))
    }

    fn bind_image_memory(&self, image: vk::Image, memory: vk::DeviceMemory, offset: u64) -> Result<()> {
        unsafe { self.device.bind_image_memory(image, memory, offset) }
            .map_err(|e| vk_error("vkBindImageMemory", e))
    }

    fn map_memory(&self, memory: vk::DeviceMemory, offset: u64, size: u64) -> Result<*mut u8> {
        unsafe { self.device.map_memory(memory, offset, size, vk::MemoryMapFlags::empty()) }
            .map(|ptr| ptr.cast::<u8>())
            .map_err(|e| vk_error("vkMapMemory", e))
    }

    fn unmap_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.unmap_memory(memory) }
    }

    // ===== RESOURCES =====

    fn create_buffer(&self, desc: &BufferDesc) -> Result<vk::Buffer> {
        let info = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        unsafe { self.device.create_buffer(&info, None) }.map_err(|e| vk_error("vkCreateBuffer", e))
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        unsafe { self.device.destroy_buffer(buffer, None) }
    }

    fn create_image(&self, desc: &ImageDesc) -> Result<vk::Image> {
        let info = vk::ImageCreateInfo::default()
            .flags(desc.flags)
            .image_type(desc.image_type)
            .format(desc.format)
            .extent(desc.extent)
            .mip_levels(desc.mip_levels)
            .array_layers(desc.array_layers)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        unsafe { self.device.create_image(&info, None) }.map_err(|e| vk_error("vkCreateImage", e))
    }

    fn destroy_image(&self, image: vk::Image) {
        unsafe { self.device.destroy_image(image, None) }
    }

    fn create_image_view(&self, desc: &ImageViewDesc) -> Result<vk::ImageView> {
        let info = vk::ImageViewCreateInfo::default()
            .image(desc.image)
            .view_type(desc.view_type)
            .format(desc.format)
            .components(vk::ComponentMapping::default())
            .subresource_range(desc.subresource_range);
        unsafe { self.device.create_image_view(&info, None) }.map_err(|e| vk_error("vkCreateImageView", e))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<vk::Sampler> {
        let info = vk::SamplerCreateInfo::default()
            .mag_filter(desc.mag_filter)
            .min_filter(desc.min_filter)
            .mipmap_mode(desc.mipmap_mode)
            .address_mode_u(desc.address_mode_u)
            .address_mode_v(desc.address_mode_v)
            .address_mode_w(desc.address_mode_w)
            .mip_lod_bias(desc.mip_lod_bias)
            .anisotropy_enable(desc.anisotropy_enable)
            .max_anisotropy(desc.max_anisotropy)
            .compare_enable(desc.compare_enable)
            .compare_op(desc.compare_op)
            .min_lod(desc.min_lod)
            .max_lod(desc.max_lod)
            .border_color(desc.border_color)
            .unnormalized_coordinates(desc.unnormalized_coordinates);
        unsafe { self.device.create_sampler(&info, None) }.map_err(|e| vk_error("vkCreateSampler", e))
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        unsafe { self.device.destroy_sampler(sampler, None) }
    }

    fn create_shader_module(&self, code: &[u32]) -> Result<vk::ShaderModule> {
        let info = vk::ShaderModuleCreateInfo::default().code(code);
        unsafe { self.device.create_shader_module(&info, None) }.map_err(|e| vk_error("vkCreateShaderModule", e))
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.device.destroy_shader_module(module, None) }
    }

    // ===== DESCRIPTORS & PIPELINES =====

    fn create_descriptor_set_layout(&self, bindings: &[LayoutBinding]) -> Result<vk::DescriptorSetLayout> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
            .iter()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(b.binding)
                    .descriptor_type(b.descriptor_type)
                    .descriptor_count(b.count)
                    .stage_flags(b.stages)
            })
            .collect();
        let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        unsafe { self.device.create_descriptor_set_layout(&info, None) }
            .map_err(|e| vk_error("vkCreateDescriptorSetLayout", e))
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) }
    }

    fn create_pipeline_layout(&self, set_layouts: &[vk::DescriptorSetLayout]) -> Result<vk::PipelineLayout> {
        let info = vk::PipelineLayoutCreateInfo::default().set_layouts(set_layouts);
        unsafe { self.device.create_pipeline_layout(&info, None) }.map_err(|e| vk_error("vkCreatePipelineLayout", e))
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) }
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<vk::Pipeline> {
        let names = desc.stages.iter().map(entry_point).collect::<Result<Vec<_>>>()?;
        let map_entries: Vec<Vec<vk::SpecializationMapEntry>> = desc.stages.iter().map(specialization_entries).collect();
        let spec_infos: Vec<vk::SpecializationInfo> = desc
            .stages
            .iter()
            .zip(&map_entries)
            .map(|(stage, entries)| {
                let data = stage.specialization.as_ref().map(|s| s.data.as_slice()).unwrap_or(&[]);
                vk::SpecializationInfo::default().map_entries(entries).data(data)
            })
            .collect();
        let stages: Vec<vk::PipelineShaderStageCreateInfo> = desc
            .stages
            .iter()
            .enumerate()
            .map(|(i, stage)| {
                let info = vk::PipelineShaderStageCreateInfo::default()
                    .stage(stage.stage)
                    .module(stage.module)
                    .name(&names[i]);
                if stage.specialization.is_some() {
                    info.specialization_info(&spec_infos[i])
                } else {
                    info
                }
            })
            .collect();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&desc.vertex_bindings)
            .vertex_attribute_descriptions(&desc.vertex_attributes);
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default().topology(desc.topology);
        let viewport = vk::PipelineViewportStateCreateInfo::default().viewport_count(1).scissor_count(1);
        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(desc.cull_mode)
            .front_face(desc.front_face)
            .line_width(1.0);
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(desc.depth_test)
            .depth_write_enable(desc.depth_test)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL);
        let attachments = [vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(false)
            .color_write_mask(vk::ColorComponentFlags::RGBA)];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default().attachments(&attachments);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic)
            .layout(desc.layout)
            .render_pass(desc.render_pass)
            .subpass(0);

        let pipelines = unsafe { self.device.create_graphics_pipelines(vk::PipelineCache::null(), &[info], None) }
            .map_err(|(_, e)| vk_error("vkCreateGraphicsPipelines", e))?;
        pipelines
            .into_iter()
            .next()
            .ok_or_else(|| Error::BackendError("vkCreateGraphicsPipelines returned no pipeline".to_string()))
    }

    fn create_compute_pipeline(&self, stage: &ShaderStageDesc, layout: vk::PipelineLayout) -> Result<vk::Pipeline> {
        let name = entry_point(stage)?;
        let entries = specialization_entries(stage);
        let data = stage.specialization.as_ref().map(|s| s.data.as_slice()).unwrap_or(&[]);
        let spec_info = vk::SpecializationInfo::default().map_entries(&entries).data(data);

        let mut stage_info = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(stage.module)
            .name(&name);
        if stage.specialization.is_some() {
            stage_info = stage_info.specialization_info(&spec_info);
        }
        let info = vk::ComputePipelineCreateInfo::default().stage(stage_info).layout(layout);

        let pipelines = unsafe { self.device.create_compute_pipelines(vk::PipelineCache::null(), &[info], None) }
            .map_err(|(_, e)| vk_error("vkCreateComputePipelines", e))?;
        pipelines
            .into_iter()
            .next()
            .ok_or_else(|| Error::BackendError("vkCreateComputePipelines returned no pipeline".to_string()))
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) }
    }

    fn create_descriptor_pool(&self, sizes: &[vk::DescriptorPoolSize], max_sets: u32) -> Result<vk::DescriptorPool> {
        let info = vk::DescriptorPoolCreateInfo::default().pool_sizes(sizes).max_sets(max_sets);
        unsafe { self.device.create_descriptor_pool(&info, None) }.map_err(|e| vk_error("vkCreateDescriptorPool", e))
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) }
    }

    fn allocate_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Vec<vk::DescriptorSet>> {
        if layouts.is_empty() {
            return Ok(Vec::new());
        }
        let info = vk::DescriptorSetAllocateInfo::default().descriptor_pool(pool).set_layouts(layouts);
        unsafe { self.device.allocate_descriptor_sets(&info) }.map_err(|e| vk_error("vkAllocateDescriptorSets", e))
    }

    fn update_descriptor_sets(&self, writes: &[DescriptorWrite]) {
        if writes.is_empty() {
            return;
        }
        let buffer_infos: Vec<vk::DescriptorBufferInfo> = writes
            .iter()
            .map(|w| match w.resource {
                DescriptorResource::Buffer { buffer, offset, range } => {
                    vk::DescriptorBufferInfo { buffer, offset, range }
                }
                DescriptorResource::Image { .. } => vk::DescriptorBufferInfo::default(),
            })
            .collect();
        let image_infos: Vec<vk::DescriptorImageInfo> = writes
            .iter()
            .map(|w| match w.resource {
                DescriptorResource::Image { sampler, view, layout } => {
                    vk::DescriptorImageInfo { sampler, image_view: view, image_layout: layout }
                }
                DescriptorResource::Buffer { .. } => vk::DescriptorImageInfo::default(),
            })
            .collect();

        let vk_writes: Vec<vk::WriteDescriptorSet> = writes
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(w.set)
                    .dst_binding(w.binding)
                    .descriptor_type(w.descriptor_type);
                match w.resource {
                    DescriptorResource::Buffer { .. } => write.buffer_info(std::slice::from_ref(&buffer_infos[i])),
                    DescriptorResource::Image { .. } => write.image_info(std::slice::from_ref(&image_infos[i])),
                }
            })
            .collect();

        unsafe { self.device.update_descriptor_sets(&vk_writes, &[]) }
    }

    // ===== COMMAND BUFFERS =====

    fn create_command_pool(&self, queue_family: u32) -> Result<vk::CommandPool> {
        let info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        unsafe { self.device.create_command_pool(&info, None) }.map_err(|e| vk_error("vkCreateCommandPool", e))
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) }
    }

    fn allocate_command_buffers(&self, pool: vk::CommandPool, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        unsafe { self.device.allocate_command_buffers(&info) }.map_err(|e| vk_error("vkAllocateCommandBuffers", e))
    }

    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        if !buffers.is_empty() {
            unsafe { self.device.free_command_buffers(pool, buffers) }
        }
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer, one_time_submit: bool) -> Result<()> {
        let flags = if one_time_submit {
            vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT
        } else {
            vk::CommandBufferUsageFlags::empty()
        };
        let info = vk::CommandBufferBeginInfo::default().flags(flags);
        unsafe { self.device.begin_command_buffer(cmd, &info) }.map_err(|e| vk_error("vkBeginCommandBuffer", e))
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> Result<()> {
        unsafe { self.device.end_command_buffer(cmd) }.map_err(|e| vk_error("vkEndCommandBuffer", e))
    }

    fn cmd_copy_buffer(&self, cmd: vk::CommandBuffer, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        unsafe { self.device.cmd_copy_buffer(cmd, src, dst, regions) }
    }

    fn cmd_copy_buffer_to_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        unsafe { self.device.cmd_copy_buffer_to_image(cmd, src, dst, layout, regions) }
    }

    fn cmd_pipeline_barrier(
        &self,
        cmd: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barriers: &[ImageBarrier],
    ) {
        let barriers: Vec<vk::ImageMemoryBarrier> = barriers
            .iter()
            .map(|b| {
                vk::ImageMemoryBarrier::default()
                    .old_layout(b.old_layout)
                    .new_layout(b.new_layout)
                    .src_access_mask(b.src_access)
                    .dst_access_mask(b.dst_access)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(b.image)
                    .subresource_range(b.range)
            })
            .collect();
        unsafe {
            self.device.cmd_pipeline_barrier(
                cmd,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &barriers,
            )
        }
    }

    fn cmd_begin_render_pass(
        &self,
        cmd: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) {
        let info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(area)
            .clear_values(clear_values);
        unsafe { self.device.cmd_begin_render_pass(cmd, &info, vk::SubpassContents::INLINE) }
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(cmd) }
    }

    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport) {
        unsafe { self.device.cmd_set_viewport(cmd, 0, &[viewport]) }
    }

    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D) {
        unsafe { self.device.cmd_set_scissor(cmd, 0, &[scissor]) }
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe { self.device.cmd_bind_pipeline(cmd, bind_point, pipeline) }
    }

    fn cmd_bind_descriptor_sets(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        unsafe { self.device.cmd_bind_descriptor_sets(cmd, bind_point, layout, first_set, sets, &[]) }
    }

    fn cmd_bind_index_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer, offset: u64, index_type: vk::IndexType) {
        unsafe { self.device.cmd_bind_index_buffer(cmd, buffer, offset, index_type) }
    }

    fn cmd_bind_vertex_buffers(&self, cmd: vk::CommandBuffer, first_binding: u32, buffers: &[vk::Buffer], offsets: &[u64]) {
        unsafe { self.device.cmd_bind_vertex_buffers(cmd, first_binding, buffers, offsets) }
    }

    fn cmd_draw_indexed(&self, cmd: vk::CommandBuffer, index_count: u32, instance_count: u32, first_index: u32, vertex_offset: i32, first_instance: u32) {
        unsafe { self.device.cmd_draw_indexed(cmd, index_count, instance_count, first_index, vertex_offset, first_instance) }
    }

    fn cmd_dispatch(&self, cmd: vk::CommandBuffer, x: u32, y: u32, z: u32) {
        unsafe { self.device.cmd_dispatch(cmd, x, y, z) }
    }

    // ===== SYNCHRONIZATION =====

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence> {
        let flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let info = vk::FenceCreateInfo::default().flags(flags);
        unsafe { self.device.create_fence(&info, None) }.map_err(|e| vk_error("vkCreateFence", e))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn wait_for_fences(&self, fences: &[vk::Fence], timeout: u64) -> Result<()> {
        unsafe { self.device.wait_for_fences(fences, true, timeout) }.map_err(|e| vk_error("vkWaitForFences", e))
    }

    fn reset_fences(&self, fences: &[vk::Fence]) -> Result<()> {
        unsafe { self.device.reset_fences(fences) }.map_err(|e| vk_error("vkResetFences", e))
    }

    fn fence_signaled(&self, fence: vk::Fence) -> Result<bool> {
        unsafe { self.device.get_fence_status(fence) }.map_err(|e| vk_error("vkGetFenceStatus", e))
    }

    fn create_semaphore(&self) -> Result<vk::Semaphore> {
        let info = vk::SemaphoreCreateInfo::default();
        unsafe { self.device.create_semaphore(&info, None) }.map_err(|e| vk_error("vkCreateSemaphore", e))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    fn queue_submit(&self, queue: vk::Queue, submit: &SubmitInfo<'_>, fence: vk::Fence) -> Result<()> {
        let info = vk::SubmitInfo::default()
            .command_buffers(submit.command_buffers)
            .wait_semaphores(submit.wait_semaphores)
            .wait_dst_stage_mask(submit.wait_stages)
            .signal_semaphores(submit.signal_semaphores);
        unsafe { self.device.queue_submit(queue, &[info], fence) }.map_err(|e| vk_error("vkQueueSubmit", e))
    }

    fn queue_wait_idle(&self, queue: vk::Queue) -> Result<()> {
        unsafe { self.device.queue_wait_idle(queue) }.map_err(|e| vk_error("vkQueueWaitIdle", e))
    }

    fn device_wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.map_err(|e| vk_error("vkDeviceWaitIdle", e))
    }
}
