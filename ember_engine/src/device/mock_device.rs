/// Mock device for unit tests (no GPU required)
///
/// Hands out fake handles, backs device memory with host byte arrays so that
/// mapped writes can be read back, and records every call the engine makes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use ash::vk;
use ash::vk::Handle;
use rustc_hash::FxHashMap;

use crate::device::{
    Device, Swapchain, DeviceLimits, QueueInfo, BufferDesc, ImageDesc, ImageViewDesc,
    SamplerDesc, LayoutBinding, GraphicsPipelineDesc, ShaderStageDesc, DescriptorWrite,
    ImageBarrier, SubmitInfo,
};
use crate::error::{Error, Result};

// ============================================================================
// Recorded state
// ============================================================================

#[derive(Default)]
pub struct MockState {
    /// Live object count per kind ("buffer", "image", "memory", ...)
    pub live: FxHashMap<&'static str, i64>,
    pub buffers: FxHashMap<u64, BufferDesc>,
    pub images: FxHashMap<u64, ImageDesc>,
    /// Buffer raw handle -> (memory raw handle, offset)
    pub buffer_bindings: FxHashMap<u64, (u64, u64)>,
    pub image_bindings: FxHashMap<u64, (u64, u64)>,
    /// Host backing store per DeviceMemory
    pub memory: FxHashMap<u64, Box<[u8]>>,
    /// (size, memory type index) per allocate_memory call
    pub allocations: Vec<(u64, u32)>,
    /// (memory, offset, size) per map_memory call
    pub maps: Vec<(u64, u64, u64)>,
    /// One entry per update_descriptor_sets call
    pub descriptor_updates: Vec<Vec<DescriptorWrite>>,
    /// (pool sizes, max sets) per created pool
    pub pools: Vec<(Vec<(vk::DescriptorType, u32)>, u32)>,
    pub allocated_sets: Vec<vk::DescriptorSetLayout>,
    pub set_layouts: Vec<Vec<LayoutBinding>>,
    pub graphics_pipelines: Vec<GraphicsPipelineDesc>,
    pub compute_pipelines: Vec<ShaderStageDesc>,
    pub samplers: Vec<SamplerDesc>,
    /// Recorded command names, in order
    pub commands: Vec<String>,
    /// Submissions as (queue raw handle, command buffer count)
    pub submits: Vec<(u64, usize)>,
    pub fences: FxHashMap<u64, bool>,
    pub wait_idle_calls: u32,
}

impl MockState {
    fn created(&mut self, kind: &'static str) {
        *self.live.entry(kind).or_insert(0) += 1;
    }

    fn destroyed(&mut self, kind: &'static str) {
        *self.live.entry(kind).or_insert(0) -= 1;
    }
}

// ============================================================================
// Mock Device
// ============================================================================

pub struct MockDevice {
    pub limits: DeviceLimits,
    pub memory_types: Vec<vk::MemoryPropertyFlags>,
    pub queues: Vec<(String, QueueInfo)>,
    /// When false, submitted fences stay unsignaled until `signal_fence`
    pub auto_signal_fences: bool,
    pub state: Mutex<MockState>,
    next_handle: AtomicU64,
}

impl MockDevice {
    /// A device with a render queue and a dedicated "compute" queue
    pub fn new() -> Self {
        let render = QueueInfo {
            handle: vk::Queue::from_raw(0x1000),
            family: 0,
            flags: vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE,
        };
        let compute = QueueInfo {
            handle: vk::Queue::from_raw(0x2000),
            family: 1,
            flags: vk::QueueFlags::COMPUTE,
        };
        Self {
            limits: DeviceLimits { min_uniform_buffer_offset_alignment: 16, ..DeviceLimits::default() },
            memory_types: vec![
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                vk::MemoryPropertyFlags::DEVICE_LOCAL
                    | vk::MemoryPropertyFlags::HOST_VISIBLE
                    | vk::MemoryPropertyFlags::HOST_COHERENT,
            ],
            queues: vec![("render".to_string(), render), ("compute".to_string(), compute)],
            auto_signal_fences: true,
            state: Mutex::new(MockState::default()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// A device whose "compute" name aliases the render queue
    pub fn without_compute_queue() -> Self {
        let mut device = Self::new();
        let render = device.render_queue();
        device.queues = vec![("render".to_string(), render), ("compute".to_string(), render)];
        device
    }

    pub fn with_alignment(mut self, alignment: u64) -> Self {
        self.limits.min_uniform_buffer_offset_alignment = alignment;
        self
    }

    fn next_raw(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    pub fn live(&self, kind: &'static str) -> i64 {
        self.state.lock().unwrap().live.get(kind).copied().unwrap_or(0)
    }

    /// True when every created object has been destroyed
    pub fn all_destroyed(&self) -> bool {
        self.state.lock().unwrap().live.values().all(|&count| count == 0)
    }

    /// Current contents of the memory bound to `buffer`
    pub fn buffer_contents(&self, buffer: vk::Buffer) -> Vec<u8> {
        let state = self.state.lock().unwrap();
        let desc = state.buffers[&buffer.as_raw()];
        let (memory, offset) = state.buffer_bindings[&buffer.as_raw()];
        let bytes = &state.memory[&memory];
        bytes[offset as usize..(offset + desc.size) as usize].to_vec()
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.state.lock().unwrap().commands.clear();
    }

    pub fn signal_fence(&self, fence: vk::Fence) {
        self.state.lock().unwrap().fences.insert(fence.as_raw(), true);
    }

    fn record(&self, command: String) {
        self.state.lock().unwrap().commands.push(command);
    }
}

impl Device for MockDevice {
    // ===== INFO =====

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn memory_types(&self) -> Vec<vk::MemoryPropertyFlags> {
        self.memory_types.clone()
    }

    fn queue(&self, name: &str) -> Option<QueueInfo> {
        self.queues.iter().find(|(n, _)| n == name).map(|(_, q)| *q)
    }

    fn render_queue(&self) -> QueueInfo {
        self.queues[0].1
    }

    // ===== MEMORY =====

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        let state = self.state.lock().unwrap();
        let size = state.buffers.get(&buffer.as_raw()).map(|d| d.size).unwrap_or(0);
        vk::MemoryRequirements { size, alignment: 16, memory_type_bits: 0b111 }
    }

    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        let state = self.state.lock().unwrap();
        let size = state.images.get(&image.as_raw())
            .map(|d| {
                let texels = d.extent.width as u64 * d.extent.height as u64 * d.extent.depth as u64;
                texels * 4 * 2 * d.array_layers as u64
            })
            .unwrap_or(0);
        vk::MemoryRequirements { size, alignment: 512, memory_type_bits: 0b101 }
    }

    fn allocate_memory(&self, size: u64, memory_type_index: u32) -> Result<vk::DeviceMemory> {
        let raw = self.next_raw();
        let mut state = self.state.lock().unwrap();
        state.memory.insert(raw, vec![0xCD; size as usize].into_boxed_slice());
        state.allocations.push((size, memory_type_index));
        state.created("memory");
        Ok(vk::DeviceMemory::from_raw(raw))
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        let mut state = self.state.lock().unwrap();
        state.memory.remove(&memory.as_raw());
        state.destroyed("memory");
    }

    fn bind_buffer_memory(&self, buffer: vk::Buffer, memory: vk::DeviceMemory, offset: u64) -> Result<()> {
        self.state.lock().unwrap().buffer_bindings.insert(buffer.as_raw(), (memory.as_raw(), offset));
        Ok(())
    }

    fn bind_image_memory(&self, image: vk::Image, memory: vk::DeviceMemory, offset: u64) -> Result<()> {
        self.state.lock().unwrap().image_bindings.insert(image.as_raw(), (memory.as_raw(), offset));
        Ok(())
    }

    fn map_memory(&self, memory: vk::DeviceMemory, offset: u64, size: u64) -> Result<*mut u8> {
        let mut state = self.state.lock().unwrap();
        state.maps.push((memory.as_raw(), offset, size));
        let bytes = state.memory.get_mut(&memory.as_raw())
            .ok_or_else(|| Error::DeviceCall { call: "vkMapMemory".to_string(), code: -2 })?;
        if offset + size > bytes.len() as u64 {
            return Err(Error::DeviceCall { call: "vkMapMemory".to_string(), code: -2 });
        }
        Ok(unsafe { bytes.as_mut_ptr().add(offset as usize) })
    }

    fn unmap_memory(&self, _memory: vk::DeviceMemory) {
        self.record("unmap".to_string());
    }

    // ===== RESOURCES =====

    fn create_buffer(&self, desc: &BufferDesc) -> Result<vk::Buffer> {
        let raw = self.next_raw();
        let mut state = self.state.lock().unwrap();
        state.buffers.insert(raw, *desc);
        state.created("buffer");
        Ok(vk::Buffer::from_raw(raw))
    }

    fn destroy_buffer(&self, _buffer: vk::Buffer) {
        self.state.lock().unwrap().destroyed("buffer");
    }

    fn create_image(&self, desc: &ImageDesc) -> Result<vk::Image> {
        let raw = self.next_raw();
        let mut state = self.state.lock().unwrap();
        state.images.insert(raw, *desc);
        state.created("image");
        Ok(vk::Image::from_raw(raw))
    }

    fn destroy_image(&self, _image: vk::Image) {
        self.state.lock().unwrap().destroyed("image");
    }

    fn create_image_view(&self, _desc: &ImageViewDesc) -> Result<vk::ImageView> {
        let raw = self.next_raw();
        self.state.lock().unwrap().created("image_view");
        Ok(vk::ImageView::from_raw(raw))
    }

    fn destroy_image_view(&self, _view: vk::ImageView) {
        self.state.lock().unwrap().destroyed("image_view");
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<vk::Sampler> {
        let raw = self.next_raw();
        let mut state = self.state.lock().unwrap();
        state.samplers.push(*desc);
        state.created("sampler");
        Ok(vk::Sampler::from_raw(raw))
    }

    fn destroy_sampler(&self, _sampler: vk::Sampler) {
        self.state.lock().unwrap().destroyed("sampler");
    }

    fn create_shader_module(&self, _code: &[u32]) -> Result<vk::ShaderModule> {
        let raw = self.next_raw();
        self.state.lock().unwrap().created("shader_module");
        Ok(vk::ShaderModule::from_raw(raw))
    }

    fn destroy_shader_module(&self, _module: vk::ShaderModule) {
        self.state.lock().unwrap().destroyed("shader_module");
    }

    // ===== DESCRIPTORS & PIPELINES =====

    fn create_descriptor_set_layout(&self, bindings: &[LayoutBinding]) -> Result<vk::DescriptorSetLayout> {
        let raw = self.next_raw();
        let mut state = self.state.lock().unwrap();
        state.set_layouts.push(bindings.to_vec());
        state.created("set_layout");
        Ok(vk::DescriptorSetLayout::from_raw(raw))
    }

    fn destroy_descriptor_set_layout(&self, _layout: vk::DescriptorSetLayout) {
        self.state.lock().unwrap().destroyed("set_layout");
    }

    fn create_pipeline_layout(&self, _set_layouts: &[vk::DescriptorSetLayout]) -> Result<vk::PipelineLayout> {
        let raw = self.next_raw();
        self.state.lock().unwrap().created("pipeline_layout");
        Ok(vk::PipelineLayout::from_raw(raw))
    }

    fn destroy_pipeline_layout(&self, _layout: vk::PipelineLayout) {
        self.state.lock().unwrap().destroyed("pipeline_layout");
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<vk::Pipeline> {
        let raw = self.next_raw();
        let mut state = self.state.lock().unwrap();
        state.graphics_pipelines.push(desc.clone());
        state.created("pipeline");
        Ok(vk::Pipeline::from_raw(raw))
    }

    fn create_compute_pipeline(&self, stage: &ShaderStageDesc, _layout: vk::PipelineLayout) -> Result<vk::Pipeline> {
        let raw = self.next_raw();
        let mut state = self.state.lock().unwrap();
        state.compute_pipelines.push(stage.clone());
        state.created("pipeline");
        Ok(vk::Pipeline::from_raw(raw))
    }

    fn destroy_pipeline(&self, _pipeline: vk::Pipeline) {
        self.state.lock().unwrap().destroyed("pipeline");
    }

    fn create_descriptor_pool(&self, sizes: &[vk::DescriptorPoolSize], max_sets: u32) -> Result<vk::DescriptorPool> {
        let raw = self.next_raw();
        let mut state = self.state.lock().unwrap();
        state.pools.push((sizes.iter().map(|s| (s.ty, s.descriptor_count)).collect(), max_sets));
        state.created("descriptor_pool");
        Ok(vk::DescriptorPool::from_raw(raw))
    }

    fn destroy_descriptor_pool(&self, _pool: vk::DescriptorPool) {
        self.state.lock().unwrap().destroyed("descriptor_pool");
    }

    fn allocate_descriptor_sets(
        &self,
        _pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Vec<vk::DescriptorSet>> {
        let sets = layouts.iter().map(|_| vk::DescriptorSet::from_raw(self.next_raw())).collect();
        self.state.lock().unwrap().allocated_sets.extend_from_slice(layouts);
        Ok(sets)
    }

    fn update_descriptor_sets(&self, writes: &[DescriptorWrite]) {
        self.state.lock().unwrap().descriptor_updates.push(writes.to_vec());
    }

    // ===== COMMAND BUFFERS =====

    fn create_command_pool(&self, _queue_family: u32) -> Result<vk::CommandPool> {
        let raw = self.next_raw();
        self.state.lock().unwrap().created("command_pool");
        Ok(vk::CommandPool::from_raw(raw))
    }

    fn destroy_command_pool(&self, _pool: vk::CommandPool) {
        self.state.lock().unwrap().destroyed("command_pool");
    }

    fn allocate_command_buffers(&self, _pool: vk::CommandPool, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        Ok((0..count).map(|_| vk::CommandBuffer::from_raw(self.next_raw())).collect())
    }

    fn free_command_buffers(&self, _pool: vk::CommandPool, _buffers: &[vk::CommandBuffer]) {}

    fn begin_command_buffer(&self, _cmd: vk::CommandBuffer, _one_time_submit: bool) -> Result<()> {
        self.record("begin".to_string());
        Ok(())
    }

    fn end_command_buffer(&self, _cmd: vk::CommandBuffer) -> Result<()> {
        self.record("end".to_string());
        Ok(())
    }

    fn cmd_copy_buffer(&self, _cmd: vk::CommandBuffer, _src: vk::Buffer, _dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        self.record(format!("copy_buffer {}", regions.len()));
    }

    fn cmd_copy_buffer_to_image(
        &self,
        _cmd: vk::CommandBuffer,
        _src: vk::Buffer,
        _dst: vk::Image,
        _layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        self.record(format!("copy_buffer_to_image {}", regions.len()));
    }

    fn cmd_pipeline_barrier(
        &self,
        _cmd: vk::CommandBuffer,
        _src_stage: vk::PipelineStageFlags,
        _dst_stage: vk::PipelineStageFlags,
        barriers: &[ImageBarrier],
    ) {
        for barrier in barriers {
            self.record(format!("barrier {:?}->{:?}", barrier.old_layout, barrier.new_layout));
        }
    }

    fn cmd_begin_render_pass(
        &self,
        _cmd: vk::CommandBuffer,
        _render_pass: vk::RenderPass,
        _framebuffer: vk::Framebuffer,
        area: vk::Rect2D,
        _clear_values: &[vk::ClearValue],
    ) {
        self.record(format!("begin_render_pass {}x{}", area.extent.width, area.extent.height));
    }

    fn cmd_end_render_pass(&self, _cmd: vk::CommandBuffer) {
        self.record("end_render_pass".to_string());
    }

    fn cmd_set_viewport(&self, _cmd: vk::CommandBuffer, _viewport: vk::Viewport) {
        self.record("set_viewport".to_string());
    }

    fn cmd_set_scissor(&self, _cmd: vk::CommandBuffer, _scissor: vk::Rect2D) {
        self.record("set_scissor".to_string());
    }

    fn cmd_bind_pipeline(&self, _cmd: vk::CommandBuffer, _bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        self.record(format!("bind_pipeline {}", pipeline.as_raw()));
    }

    fn cmd_bind_descriptor_sets(
        &self,
        _cmd: vk::CommandBuffer,
        _bind_point: vk::PipelineBindPoint,
        _layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        self.record(format!("bind_sets {} {}", first_set, sets.len()));
    }

    fn cmd_bind_index_buffer(&self, _cmd: vk::CommandBuffer, _buffer: vk::Buffer, offset: u64, _index_type: vk::IndexType) {
        self.record(format!("bind_index {}", offset));
    }

    fn cmd_bind_vertex_buffers(&self, _cmd: vk::CommandBuffer, first_binding: u32, _buffers: &[vk::Buffer], offsets: &[u64]) {
        self.record(format!("bind_vertex {} {:?}", first_binding, offsets));
    }

    fn cmd_draw_indexed(&self, _cmd: vk::CommandBuffer, index_count: u32, _instance_count: u32, _first_index: u32, _vertex_offset: i32, _first_instance: u32) {
        self.record(format!("draw_indexed {}", index_count));
    }

    fn cmd_dispatch(&self, _cmd: vk::CommandBuffer, x: u32, y: u32, z: u32) {
        self.record(format!("dispatch {} {} {}", x, y, z));
    }

    // ===== SYNCHRONIZATION =====

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence> {
        let raw = self.next_raw();
        let mut state = self.state.lock().unwrap();
        state.fences.insert(raw, signaled);
        state.created("fence");
        Ok(vk::Fence::from_raw(raw))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state.lock().unwrap();
        state.fences.remove(&fence.as_raw());
        state.destroyed("fence");
    }

    fn wait_for_fences(&self, fences: &[vk::Fence], _timeout: u64) -> Result<()> {
        let state = self.state.lock().unwrap();
        if fences.iter().all(|f| state.fences.get(&f.as_raw()).copied().unwrap_or(false)) {
            Ok(())
        } else {
            Err(Error::DeviceCall { call: "vkWaitForFences".to_string(), code: 2 })
        }
    }

    fn reset_fences(&self, fences: &[vk::Fence]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for fence in fences {
            state.fences.insert(fence.as_raw(), false);
        }
        Ok(())
    }

    fn fence_signaled(&self, fence: vk::Fence) -> Result<bool> {
        Ok(self.state.lock().unwrap().fences.get(&fence.as_raw()).copied().unwrap_or(false))
    }

    fn create_semaphore(&self) -> Result<vk::Semaphore> {
        let raw = self.next_raw();
        self.state.lock().unwrap().created("semaphore");
        Ok(vk::Semaphore::from_raw(raw))
    }

    fn destroy_semaphore(&self, _semaphore: vk::Semaphore) {
        self.state.lock().unwrap().destroyed("semaphore");
    }

    fn queue_submit(&self, queue: vk::Queue, submit: &SubmitInfo<'_>, fence: vk::Fence) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.submits.push((queue.as_raw(), submit.command_buffers.len()));
        state.commands.push("submit".to_string());
        if fence != vk::Fence::null() && self.auto_signal_fences {
            state.fences.insert(fence.as_raw(), true);
        }
        Ok(())
    }

    fn queue_wait_idle(&self, _queue: vk::Queue) -> Result<()> {
        Ok(())
    }

    fn device_wait_idle(&self) -> Result<()> {
        self.state.lock().unwrap().wait_idle_calls += 1;
        Ok(())
    }
}

// ============================================================================
// Mock Swapchain
// ============================================================================

pub struct MockSwapchain {
    pub image_count: usize,
    pub extent: vk::Extent2D,
    pub next_image: u32,
    /// Number of upcoming acquires that report OutOfDate
    pub out_of_date: u32,
    pub recreated: u32,
    pub presented: Vec<u32>,
}

impl MockSwapchain {
    pub fn new(image_count: usize) -> Self {
        Self {
            image_count,
            extent: vk::Extent2D { width: 800, height: 600 },
            next_image: 0,
            out_of_date: 0,
            recreated: 0,
            presented: Vec::new(),
        }
    }
}

impl Swapchain for MockSwapchain {
    fn image_count(&self) -> usize {
        self.image_count
    }

    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn render_pass(&self) -> vk::RenderPass {
        vk::RenderPass::from_raw(0xAA)
    }

    fn framebuffer(&self, image_index: usize) -> vk::Framebuffer {
        vk::Framebuffer::from_raw(0xF0 + image_index as u64)
    }

    fn acquire_next_image(&mut self, _image_ready: vk::Semaphore) -> Result<u32> {
        if self.out_of_date > 0 {
            self.out_of_date -= 1;
            return Err(Error::SwapchainOutOfDate);
        }
        let index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count as u32;
        Ok(index)
    }

    fn present(&mut self, image_index: u32, _rendering_done: vk::Semaphore) -> Result<()> {
        self.presented.push(image_index);
        Ok(())
    }

    fn recreate(&mut self, width: u32, height: u32) -> Result<()> {
        self.extent = vk::Extent2D { width, height };
        self.next_image = 0;
        self.recreated += 1;
        Ok(())
    }
}
