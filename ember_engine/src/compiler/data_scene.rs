/// DataScene - a scene compiled into device resources
///
/// `setup` runs once per load, in a fixed order:
///  1. compile every shader and compute
///  2. lay out the staging buffer (meshes, then images)
///  3. fill staging through a single mapping
///  4. copy the mesh region into the device-local mesh buffer
///  5. upload images and move them to their target layouts
///  6. build pipelines, group objects by shader, resolve vertex offsets
///  7. size one descriptor pool for every set the scene needs
///  8. allocate all descriptor sets
///  9. allocate and zero the uniform buffer, write initial values and
///     descriptors
/// 10. allocate per-frame and per-compute-queue command buffers
///
/// Every device object created here is owned by the `DataScene` and released
/// by `destroy` (or on drop), including after a failed setup.
///
/// Per frame, `update` flushes the dirty uniforms recorded by the scene and
/// `record` re-records the command buffer of the acquired swapchain image.

use std::collections::BTreeMap;
use std::sync::Arc;
use ash::vk;
use rustc_hash::FxHashMap;

use crate::commands::{stage_for_access, submit_one_shot};
use crate::compiler::data_image::{plan_image_memory, staging_desc};
use crate::compiler::{DataCompute, DataImage, DataMesh, DataSampler, DataShader, StagingLayout};
use crate::device::{
    BufferDesc, DescriptorResource, DescriptorWrite, Device, ImageBarrier, QueueInfo,
};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::layout::{DescriptorKind, DescriptorSetLayout, UniformStruct};
use crate::memory::{BoundResource, GpuContext, MemoryBlock, MemoryManager};
use crate::scene::{
    ComputeId, ImageBinding, MeshId, ObjectId, ProgramId, Scene, ShaderId, Uniforms,
};
use crate::{engine_debug, engine_info, engine_warn};

const SOURCE: &str = "ember::DataScene";

// ============================================================================
// Public types
// ============================================================================

/// Who a uniform value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UniformOwner {
    Object(ObjectId),
    Program(ProgramId),
}

/// Device-side state of one game object
#[derive(Debug, Clone)]
pub struct DataGameObject {
    pub shader: ShaderId,
    pub mesh: MeshId,
    /// Index of the object's shader group
    pub pipeline_index: usize,
    /// (set index, set) for every per-object layout of the shader
    pub sets: Vec<(u32, vk::DescriptorSet)>,
    /// Mesh buffer offsets in the shader's vertex binding order
    pub vertex_offsets: Vec<u64>,
}

/// Objects drawn with one pipeline, in first-seen order
#[derive(Debug, Clone)]
pub struct ShaderGroup {
    pub shader: ShaderId,
    pub pipeline: vk::Pipeline,
    pub objects: Vec<ObjectId>,
}

/// Counters of the last update + record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub draw_calls: u32,
    pub descriptor_writes: u32,
    pub uniform_bytes: u64,
}

/// Where a frame is rendered to
#[derive(Debug, Clone, Copy)]
pub struct FrameTarget {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
}

/// Everything needed to record and submit one compute dispatch
#[derive(Debug, Clone)]
pub struct ComputeDispatch {
    pub name: String,
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub sets: Vec<(u32, vk::DescriptorSet)>,
    pub queue_name: String,
    pub queue: QueueInfo,
    pub sync: bool,
    pub command_buffer: vk::CommandBuffer,
}

// ============================================================================
// Internal bookkeeping
// ============================================================================

#[derive(Debug, Clone)]
enum UniformSlot {
    /// Absolute offset in the uniform buffer and the packed layout
    Buffer { offset: u64, layout: UniformStruct },
    /// Index of the cached descriptor write
    Image { write: usize, kind: DescriptorKind },
}

/// One descriptor set to allocate: its owner and the layout it comes from
#[derive(Debug, Clone, Copy)]
struct SetRequest {
    owner: UniformOwner,
    program: ProgramId,
    layout: usize,
}

#[derive(Debug)]
struct ComputeQueue {
    name: String,
    pool: vk::CommandPool,
    cmd: vk::CommandBuffer,
}

fn owner_uniforms(scene: &Scene, owner: UniformOwner) -> Option<&Uniforms> {
    match owner {
        UniformOwner::Object(id) => scene.object(id).map(|o| &o.uniforms),
        UniformOwner::Program(id) => scene.program_uniforms(id),
    }
}

fn owner_name(scene: &Scene, owner: UniformOwner) -> String {
    let name = match owner {
        UniformOwner::Object(id) => scene.object(id).map(|o| o.name.as_str()),
        UniformOwner::Program(ProgramId::Shader(id)) => scene.shader(id).map(|s| s.name.as_str()),
        UniformOwner::Program(ProgramId::Compute(id)) => scene.compute(id).map(|c| c.name.as_str()),
    };
    name.map(str::to_string).unwrap_or_else(|| format!("{:?}", owner))
}

fn first_buffer(buffers: Vec<vk::CommandBuffer>) -> Result<vk::CommandBuffer> {
    buffers
        .into_iter()
        .next()
        .ok_or_else(|| Error::BackendError("Command buffer allocation returned nothing".to_string()))
}

// ============================================================================
// DataScene
// ============================================================================

pub struct DataScene {
    ctx: Arc<GpuContext>,
    shaders: Vec<DataShader>,
    computes: Vec<DataCompute>,
    /// Graphics pipeline per shader id
    pipelines: Vec<vk::Pipeline>,
    compute_pipelines: Vec<vk::Pipeline>,
    groups: Vec<ShaderGroup>,
    objects: Vec<DataGameObject>,
    program_sets: FxHashMap<ProgramId, Vec<(u32, vk::DescriptorSet)>>,
    meshes: Vec<DataMesh>,
    mesh_block: Option<MemoryBlock>,
    images: Vec<DataImage>,
    image_block: Option<MemoryBlock>,
    samplers: Vec<DataSampler>,
    descriptor_pool: Option<vk::DescriptorPool>,
    pool_sizes: Vec<(vk::DescriptorType, u32)>,
    uniform_block: Option<MemoryBlock>,
    writes: Vec<DescriptorWrite>,
    slots: FxHashMap<(UniformOwner, String), UniformSlot>,
    graphics_pool: Option<vk::CommandPool>,
    command_buffers: Vec<vk::CommandBuffer>,
    compute_queues: Vec<ComputeQueue>,
    stats: FrameStats,
    destroyed: bool,
}

impl DataScene {
    fn empty(ctx: Arc<GpuContext>) -> Self {
        Self {
            ctx,
            shaders: Vec::new(),
            computes: Vec::new(),
            pipelines: Vec::new(),
            compute_pipelines: Vec::new(),
            groups: Vec::new(),
            objects: Vec::new(),
            program_sets: FxHashMap::default(),
            meshes: Vec::new(),
            mesh_block: None,
            images: Vec::new(),
            image_block: None,
            samplers: Vec::new(),
            descriptor_pool: None,
            pool_sizes: Vec::new(),
            uniform_block: None,
            writes: Vec::new(),
            slots: FxHashMap::default(),
            graphics_pool: None,
            command_buffers: Vec::new(),
            compute_queues: Vec::new(),
            stats: FrameStats::default(),
            destroyed: false,
        }
    }

    /// Compile `scene` for a render pass with `image_count` swapchain images
    pub fn setup(
        ctx: Arc<GpuContext>,
        scene: &mut Scene,
        render_pass: vk::RenderPass,
        image_count: usize,
    ) -> Result<Self> {
        let mut data = Self::empty(ctx);
        match data.build(scene, render_pass, image_count) {
            Ok(()) => {
                engine_info!(SOURCE, "Scene '{}' ready: {} object(s) in {} group(s), {} byte uniform buffer",
                    scene.name, data.objects.len(), data.groups.len(), data.uniform_size());
                Ok(data)
            }
            Err(e) => {
                data.destroy();
                Err(e)
            }
        }
    }

    fn build(&mut self, scene: &mut Scene, render_pass: vk::RenderPass, image_count: usize) -> Result<()> {
        let ctx = self.ctx.clone();
        let device = ctx.device.as_ref();

        for shader in scene.shaders() {
            self.shaders.push(DataShader::compile(&ctx, shader)?);
        }
        for compute in scene.computes() {
            self.computes.push(DataCompute::compile(&ctx, compute)?);
        }

        self.upload(scene)?;
        for sampler in scene.samplers() {
            self.samplers.push(DataSampler::create(device, sampler)?);
        }

        for shader in &self.shaders {
            let pipeline = shader.create_pipeline(device, render_pass)?;
            self.pipelines.push(pipeline);
        }
        for compute in &self.computes {
            let pipeline = compute.create_pipeline(device)?;
            self.compute_pipelines.push(pipeline);
        }
        self.bind_objects(scene)?;

        self.allocate_descriptors(scene)?;
        self.allocate_command_buffers(image_count)?;

        self.track(scene);
        Ok(())
    }

    // ===== UPLOADS (steps 2-5) =====

    fn upload(&mut self, scene: &Scene) -> Result<()> {
        let layout = StagingLayout::plan(scene.meshes(), scene.images());
        self.meshes = scene.meshes()
            .iter()
            .zip(&layout.meshes)
            .map(|(mesh, slot)| DataMesh::new(mesh, slot))
            .collect();
        if layout.total == 0 {
            return Ok(());
        }

        let ctx = self.ctx.clone();
        let device = ctx.device.as_ref();
        for image in scene.images() {
            self.images.push(DataImage::create(device, image)?);
        }

        let mut memory = ctx.memory()?;
        let staging_buffer = device.create_buffer(&staging_desc(layout.total))?;
        let staging = match memory.allocate(
            BoundResource::Buffer(staging_buffer),
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ) {
            Ok(block) => block,
            Err(e) => {
                device.destroy_buffer(staging_buffer);
                return Err(e);
            }
        };

        let result = self.upload_from_staging(scene, &mut memory, &staging, staging_buffer, &layout);
        memory.free(staging);
        result
    }

    fn upload_from_staging(
        &mut self,
        scene: &Scene,
        memory: &mut MemoryManager,
        staging: &MemoryBlock,
        staging_buffer: vk::Buffer,
        layout: &StagingLayout,
    ) -> Result<()> {
        let ctx = self.ctx.clone();
        let device = ctx.device.as_ref();
        let render = device.render_queue();

        {
            let mut map = memory.map(staging, 0, layout.total)?;
            for (mesh, slot) in scene.meshes().iter().zip(&layout.meshes) {
                map.write_bytes(slot.index_offset as usize, mesh.indices().as_bytes())?;
                for ((_, data), (_, offset, _)) in mesh.attributes().zip(&slot.attributes) {
                    map.write_bytes(*offset as usize, data.as_bytes())?;
                }
            }
            for (image, slot) in scene.images().iter().zip(&layout.images) {
                map.write_bytes(slot.offset as usize, &image.source.data)?;
            }
        }

        if layout.mesh_size > 0 {
            let buffer = device.create_buffer(&BufferDesc {
                size: layout.mesh_size,
                usage: vk::BufferUsageFlags::VERTEX_BUFFER
                    | vk::BufferUsageFlags::INDEX_BUFFER
                    | vk::BufferUsageFlags::TRANSFER_DST,
            })?;
            match memory.allocate(BoundResource::Buffer(buffer), vk::MemoryPropertyFlags::DEVICE_LOCAL) {
                Ok(block) => self.mesh_block = Some(block),
                Err(e) => {
                    device.destroy_buffer(buffer);
                    return Err(e);
                }
            }
            let region = vk::BufferCopy { src_offset: 0, dst_offset: 0, size: layout.mesh_size };
            submit_one_shot(device, render, |cmd| {
                device.cmd_copy_buffer(cmd, staging_buffer, buffer, &[region]);
            })?;
            engine_debug!(SOURCE, "Uploaded {} mesh(es), {} bytes", self.meshes.len(), layout.mesh_size);
        }

        if self.images.is_empty() {
            return Ok(());
        }

        let (offsets, total, type_bits) = plan_image_memory(device, &self.images);
        let block = memory.allocate_shared(total, type_bits, vk::MemoryPropertyFlags::DEVICE_LOCAL)?;
        let image_memory = block.memory();
        self.image_block = Some(block);
        for (image, offset) in self.images.iter().zip(&offsets) {
            device.bind_image_memory(image.handle, image_memory, *offset)?;
        }
        for (data, image) in self.images.iter_mut().zip(scene.images()) {
            data.create_views(device, image)?;
        }

        let images = &self.images;
        let targets_access = images.iter().fold(vk::AccessFlags::empty(), |acc, i| acc | i.target.access());
        submit_one_shot(device, render, |cmd| {
            let to_transfer: Vec<ImageBarrier> = images
                .iter()
                .map(|i| i.barrier_to(vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::AccessFlags::TRANSFER_WRITE))
                .collect();
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                &to_transfer,
            );

            for ((data, image), slot) in images.iter().zip(scene.images()).zip(&layout.images) {
                device.cmd_copy_buffer_to_image(
                    cmd,
                    staging_buffer,
                    data.handle,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &data.copy_regions(image, slot.offset),
                );
            }

            let to_target: Vec<ImageBarrier> = images
                .iter()
                .map(|i| ImageBarrier {
                    old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    src_access: vk::AccessFlags::TRANSFER_WRITE,
                    ..i.barrier_to(i.target.layout(), i.target.access())
                })
                .collect();
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                stage_for_access(targets_access),
                &to_target,
            );
        })?;

        for image in &mut self.images {
            image.layout = image.target.layout();
            image.access = image.target.access();
        }
        engine_debug!(SOURCE, "Uploaded {} image(s), {} bytes of device memory", self.images.len(), total);
        Ok(())
    }

    // ===== OBJECTS (step 6) =====

    fn bind_objects(&mut self, scene: &Scene) -> Result<()> {
        let mut group_of: FxHashMap<ShaderId, usize> = FxHashMap::default();

        for (index, object) in scene.objects().iter().enumerate() {
            let shader = self.shaders.get(object.shader.0).ok_or_else(|| {
                Error::InvalidResource(format!("Object '{}' uses missing shader {}", object.name, object.shader.0))
            })?;
            let mesh = self.meshes.get(object.mesh.0).ok_or_else(|| {
                Error::InvalidResource(format!("Object '{}' uses missing mesh {}", object.name, object.mesh.0))
            })?;

            let vertex_offsets = shader.vertex_input.attribute_names
                .iter()
                .map(|attribute| {
                    mesh.attribute_offset(attribute).ok_or_else(|| {
                        Engine::log_and_return_error(SOURCE, Error::IncompatibleMeshShader {
                            mesh: mesh.name.clone(),
                            shader: shader.name.clone(),
                            attribute: attribute.clone(),
                        })
                    })
                })
                .collect::<Result<Vec<u64>>>()?;

            let pipeline_index = match group_of.get(&object.shader) {
                Some(&group) => group,
                None => {
                    self.groups.push(ShaderGroup {
                        shader: object.shader,
                        pipeline: self.pipelines[object.shader.0],
                        objects: Vec::new(),
                    });
                    group_of.insert(object.shader, self.groups.len() - 1);
                    self.groups.len() - 1
                }
            };
            self.groups[pipeline_index].objects.push(ObjectId(index));

            self.objects.push(DataGameObject {
                shader: object.shader,
                mesh: object.mesh,
                pipeline_index,
                sets: Vec::new(),
                vertex_offsets,
            });
        }
        Ok(())
    }

    // ===== DESCRIPTORS (steps 7-9) =====

    fn layout(&self, program: ProgramId, index: usize) -> Option<&DescriptorSetLayout> {
        match program {
            ProgramId::Shader(id) => self.shaders.get(id.0)?.layouts.get(index),
            ProgramId::Compute(id) => self.computes.get(id.0)?.layouts.get(index),
        }
    }

    fn set_requests(&self) -> Vec<SetRequest> {
        let mut requests = Vec::new();

        for (id, shader) in self.shaders.iter().enumerate() {
            let program = ProgramId::Shader(ShaderId(id));
            for (index, layout) in shader.layouts.iter().enumerate() {
                if !layout.scope().is_per_object() {
                    requests.push(SetRequest { owner: UniformOwner::Program(program), program, layout: index });
                }
            }
        }

        for group in &self.groups {
            let program = ProgramId::Shader(group.shader);
            let Some(shader) = self.shaders.get(group.shader.0) else { continue };
            for object in &group.objects {
                for (index, layout) in shader.layouts.iter().enumerate() {
                    if layout.scope().is_per_object() {
                        requests.push(SetRequest { owner: UniformOwner::Object(*object), program, layout: index });
                    }
                }
            }
        }

        for (id, compute) in self.computes.iter().enumerate() {
            let program = ProgramId::Compute(ComputeId(id));
            for index in 0..compute.layouts.len() {
                requests.push(SetRequest { owner: UniformOwner::Program(program), program, layout: index });
            }
        }

        requests
    }

    fn allocate_descriptors(&mut self, scene: &Scene) -> Result<()> {
        let ctx = self.ctx.clone();
        let device = ctx.device.as_ref();

        let requests = self.set_requests();
        if requests.is_empty() {
            return Ok(());
        }

        let mut pool_sizes: Vec<(vk::DescriptorType, u32)> = Vec::new();
        let mut handles = Vec::with_capacity(requests.len());
        let mut uniform_size = 0u64;
        for request in &requests {
            let layout = self.layout(request.program, request.layout)
                .ok_or_else(|| Error::InvalidResource(format!("{:?} has no layout {}", request.program, request.layout)))?;
            for &(ty, count) in &layout.plan.pool_sizes {
                match pool_sizes.iter_mut().find(|(t, _)| *t == ty) {
                    Some((_, total)) => *total += count,
                    None => pool_sizes.push((ty, count)),
                }
            }
            handles.push(layout.handle);
            uniform_size += layout.struct_map_size();
        }

        self.pool_sizes = pool_sizes;
        let sizes: Vec<vk::DescriptorPoolSize> = self.pool_sizes
            .iter()
            .map(|&(ty, descriptor_count)| vk::DescriptorPoolSize { ty, descriptor_count })
            .collect();
        let pool = device.create_descriptor_pool(&sizes, requests.len() as u32)?;
        self.descriptor_pool = Some(pool);
        let sets = device.allocate_descriptor_sets(pool, &handles)?;

        let uniform_buffer = if uniform_size > 0 {
            let buffer = device.create_buffer(&BufferDesc {
                size: uniform_size,
                usage: vk::BufferUsageFlags::UNIFORM_BUFFER,
            })?;
            let mut memory = ctx.memory()?;
            match memory.allocate(
                BoundResource::Buffer(buffer),
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            ) {
                Ok(block) => self.uniform_block = Some(block),
                Err(e) => {
                    device.destroy_buffer(buffer);
                    return Err(e);
                }
            }
            buffer
        } else {
            vk::Buffer::null()
        };

        let mut initial: Vec<(u64, Vec<u8>)> = Vec::new();
        let mut cursor = 0u64;
        for (request, set) in requests.iter().zip(sets) {
            let layout = self.layout(request.program, request.layout)
                .ok_or_else(|| Error::InvalidResource(format!("{:?} has no layout {}", request.program, request.layout)))?;
            let set_index = layout.set();
            let mut writes = Vec::with_capacity(layout.plan.write_sets.len());
            let mut slots = Vec::with_capacity(layout.plan.write_sets.len());

            for template in &layout.plan.write_sets {
                let resource = if template.kind.is_buffer() {
                    let structure = layout.uniform_struct(&template.name).ok_or_else(|| {
                        Error::InvalidResource(format!("Uniform '{}' has no struct layout", template.name))
                    })?;
                    let empty = BTreeMap::new();
                    let values = owner_uniforms(scene, request.owner)
                        .and_then(|u| u.fields(&template.name))
                        .unwrap_or(&empty);
                    initial.push((cursor, structure.pack(values)?));
                    slots.push((template.name.clone(), UniformSlot::Buffer { offset: cursor, layout: structure.clone() }));
                    let resource = DescriptorResource::Buffer { buffer: uniform_buffer, offset: cursor, range: template.range };
                    cursor += structure.size();
                    resource
                } else {
                    let resource = self.resolve_image(scene, request.owner, &template.name, template.kind)?;
                    slots.push((template.name.clone(), UniformSlot::Image {
                        write: self.writes.len() + writes.len(),
                        kind: template.kind,
                    }));
                    resource
                };
                writes.push(DescriptorWrite {
                    set,
                    binding: template.binding,
                    descriptor_type: template.kind.vk_type(),
                    resource,
                });
            }

            self.writes.extend(writes);
            for (name, slot) in slots {
                self.slots.insert((request.owner, name), slot);
            }
            match request.owner {
                UniformOwner::Object(id) => {
                    if let Some(object) = self.objects.get_mut(id.0) {
                        object.sets.push((set_index, set));
                    }
                }
                UniformOwner::Program(program) => {
                    self.program_sets.entry(program).or_default().push((set_index, set));
                }
            }
        }

        if let Some(block) = &self.uniform_block {
            let memory = ctx.memory()?;
            let mut map = memory.map(block, 0, uniform_size)?;
            map.fill(0);
            for (offset, bytes) in &initial {
                map.write_bytes(*offset as usize, bytes)?;
            }
        }

        device.update_descriptor_sets(&self.writes);
        self.stats.descriptor_writes = self.writes.len() as u32;
        engine_debug!(SOURCE, "Allocated {} descriptor set(s), wrote {} descriptor(s)", requests.len(), self.writes.len());
        Ok(())
    }

    fn resolve_image(
        &self,
        scene: &Scene,
        owner: UniformOwner,
        uniform: &str,
        kind: DescriptorKind,
    ) -> Result<DescriptorResource> {
        let unresolved = |reason: String| {
            Engine::log_and_return_error(SOURCE, Error::UnresolvedImageBinding {
                owner: owner_name(scene, owner),
                uniform: uniform.to_string(),
                reason,
            })
        };

        let binding = owner_uniforms(scene, owner)
            .and_then(|u| u.image(uniform))
            .ok_or_else(|| unresolved("no image bound".to_string()))?;
        let image = self.images
            .get(binding.image().0)
            .ok_or_else(|| unresolved(format!("image {} does not exist", binding.image().0)))?;
        let view = image
            .view(binding.view())
            .ok_or_else(|| unresolved(format!("image '{}' has no view '{}'", image.name, binding.view())))?;

        match (kind, binding) {
            (DescriptorKind::CombinedImageSampler, ImageBinding::CombinedImageSampler { sampler, .. }) => {
                let sampler = self.samplers
                    .get(sampler.0)
                    .ok_or_else(|| unresolved(format!("sampler {} does not exist", sampler.0)))?;
                Ok(DescriptorResource::Image { sampler: sampler.handle, view, layout: image.layout })
            }
            (DescriptorKind::StorageImage, ImageBinding::Storage { .. }) => Ok(DescriptorResource::Image {
                sampler: vk::Sampler::null(),
                view,
                layout: kind.image_layout(),
            }),
            _ => Err(unresolved(format!("binding does not match descriptor type {:?}", kind.vk_type()))),
        }
    }

    // ===== COMMAND BUFFERS (step 10) =====

    fn allocate_command_buffers(&mut self, image_count: usize) -> Result<()> {
        let ctx = self.ctx.clone();
        let device = ctx.device.as_ref();

        let pool = device.create_command_pool(device.render_queue().family)?;
        self.graphics_pool = Some(pool);
        self.command_buffers = device.allocate_command_buffers(pool, image_count as u32)?;

        for index in 0..self.computes.len() {
            let (name, family) = (self.computes[index].queue_name.clone(), self.computes[index].queue.family);
            if self.compute_queues.iter().any(|q| q.name == name) {
                continue;
            }
            let pool = device.create_command_pool(family)?;
            self.compute_queues.push(ComputeQueue { name, pool, cmd: vk::CommandBuffer::null() });
            let cmd = first_buffer(device.allocate_command_buffers(pool, 1)?)?;
            if let Some(queue) = self.compute_queues.last_mut() {
                queue.cmd = cmd;
            }
        }
        Ok(())
    }

    /// Re-allocate per-image command buffers after the swapchain changed
    pub fn resize_targets(&mut self, image_count: usize) -> Result<()> {
        if image_count == self.command_buffers.len() {
            return Ok(());
        }
        let Some(pool) = self.graphics_pool else {
            return Ok(());
        };
        let device = self.ctx.device.clone();
        device.free_command_buffers(pool, &self.command_buffers);
        self.command_buffers = device.allocate_command_buffers(pool, image_count as u32)?;
        Ok(())
    }

    fn track(&self, scene: &mut Scene) {
        for (id, shader) in self.shaders.iter().enumerate() {
            if let Some(uniforms) = scene.program_uniforms_mut(ProgramId::Shader(ShaderId(id))) {
                uniforms.track(shader.global_names());
            }
        }
        for (id, compute) in self.computes.iter().enumerate() {
            if let Some(uniforms) = scene.program_uniforms_mut(ProgramId::Compute(ComputeId(id))) {
                uniforms.track(compute.names());
            }
        }
        for (id, object) in self.objects.iter().enumerate() {
            let names = self.shaders.get(object.shader.0).map(|s| s.local_names()).unwrap_or_default();
            if let Some(uniforms) = scene.object_uniforms_mut(ObjectId(id)) {
                uniforms.track(names);
            }
        }
        scene.take_updated();
    }

    // ===== PER FRAME =====

    /// Flush every dirty uniform recorded by `scene`
    ///
    /// Buffer values are written through one mapping spanning exactly the
    /// touched bytes; changed image bindings are patched into the cached
    /// descriptor writes and sent in one update call. On error nothing is
    /// written and every dirty value stays pending.
    pub fn update(&mut self, scene: &mut Scene) -> Result<()> {
        self.stats.descriptor_writes = 0;
        self.stats.uniform_bytes = 0;
        if !scene.has_updates() {
            return Ok(());
        }

        let owners: Vec<UniformOwner> = scene.updated_objects().map(UniformOwner::Object)
            .chain(scene.updated_programs().map(UniformOwner::Program))
            .collect();
        let dirty: Vec<(UniformOwner, Vec<String>)> = owners
            .into_iter()
            .filter_map(|owner| {
                owner_uniforms(scene, owner).map(|u| (owner, u.updated().map(str::to_string).collect()))
            })
            .collect();

        // Nothing is drained or patched until every dirty value resolved
        let mut values: Vec<(u64, Vec<u8>)> = Vec::new();
        let mut patched: Vec<(usize, DescriptorResource)> = Vec::new();
        let (mut start, mut end) = (u64::MAX, 0u64);
        let empty = BTreeMap::new();

        for (owner, names) in &dirty {
            for name in names {
                match self.slots.get(&(*owner, name.clone())) {
                    Some(UniformSlot::Buffer { offset, layout }) => {
                        let fields = owner_uniforms(scene, *owner)
                            .and_then(|u| u.fields(name))
                            .unwrap_or(&empty);
                        let bytes = layout.pack(fields)?;
                        start = start.min(*offset);
                        end = end.max(offset + bytes.len() as u64);
                        values.push((*offset, bytes));
                    }
                    Some(UniformSlot::Image { write, kind }) => {
                        let resource = self.resolve_image(scene, *owner, name, *kind)?;
                        patched.push((*write, resource));
                    }
                    None => {}
                }
            }
        }

        let (objects, programs) = scene.take_updated();
        for id in objects {
            if let Some(uniforms) = scene.object_uniforms_mut(id) {
                uniforms.take_updated();
            }
        }
        for id in programs {
            if let Some(uniforms) = scene.program_uniforms_mut(id) {
                uniforms.take_updated();
            }
        }
        for &(write, resource) in &patched {
            self.writes[write].resource = resource;
        }

        if !patched.is_empty() {
            let writes: Vec<DescriptorWrite> = patched.iter().map(|&(i, _)| self.writes[i]).collect();
            self.ctx.device.update_descriptor_sets(&writes);
            self.stats.descriptor_writes = writes.len() as u32;
        }

        if values.is_empty() {
            return Ok(());
        }
        if let Some(block) = &self.uniform_block {
            let memory = self.ctx.memory()?;
            let mut map = memory.map(block, start, end - start)?;
            for (offset, bytes) in &values {
                map.write_bytes((offset - start) as usize, bytes)?;
            }
            self.stats.uniform_bytes = values.iter().map(|(_, b)| b.len() as u64).sum();
        }
        Ok(())
    }

    /// Record the draw commands of swapchain image `image_index`
    pub fn record(&mut self, scene: &Scene, image_index: usize, target: &FrameTarget) -> Result<vk::CommandBuffer> {
        let ctx = self.ctx.clone();
        let device = ctx.device.as_ref();
        let cmd = *self.command_buffers.get(image_index).ok_or_else(|| {
            Error::InvalidResource(format!("No command buffer for swapchain image {}", image_index))
        })?;

        device.begin_command_buffer(cmd, true)?;

        let area = vk::Rect2D { offset: vk::Offset2D { x: 0, y: 0 }, extent: target.extent };
        let clear_values = [
            vk::ClearValue { color: vk::ClearColorValue { float32: target.clear_color } },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: target.clear_depth, stencil: 0 },
            },
        ];
        device.cmd_begin_render_pass(cmd, target.render_pass, target.framebuffer, area, &clear_values);
        device.cmd_set_viewport(cmd, vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: target.extent.width as f32,
            height: target.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        device.cmd_set_scissor(cmd, area);

        let mesh_buffer = self.mesh_block.as_ref().and_then(MemoryBlock::buffer);
        let mut draw_calls = 0;

        for group in &self.groups {
            let Some(shader) = self.shaders.get(group.shader.0) else { continue };
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, group.pipeline);
            if let Some(sets) = self.program_sets.get(&ProgramId::Shader(group.shader)) {
                for &(index, set) in sets {
                    device.cmd_bind_descriptor_sets(cmd, vk::PipelineBindPoint::GRAPHICS, shader.pipeline_layout, index, &[set]);
                }
            }

            for id in &group.objects {
                if !scene.object(*id).is_some_and(|o| o.visible) {
                    continue;
                }
                let (Some(object), Some(buffer)) = (self.objects.get(id.0), mesh_buffer) else { continue };
                let Some(mesh) = self.meshes.get(object.mesh.0) else { continue };

                for &(index, set) in &object.sets {
                    device.cmd_bind_descriptor_sets(cmd, vk::PipelineBindPoint::GRAPHICS, shader.pipeline_layout, index, &[set]);
                }
                device.cmd_bind_index_buffer(cmd, buffer, mesh.index_offset, mesh.index_type);
                if !object.vertex_offsets.is_empty() {
                    let buffers = vec![buffer; object.vertex_offsets.len()];
                    device.cmd_bind_vertex_buffers(cmd, 0, &buffers, &object.vertex_offsets);
                }
                device.cmd_draw_indexed(cmd, mesh.index_count, 1, 0, 0, 0);
                draw_calls += 1;
            }
        }

        device.cmd_end_render_pass(cmd);
        device.end_command_buffer(cmd)?;
        self.stats.draw_calls = draw_calls;
        Ok(cmd)
    }

    // ===== ACCESS =====

    pub fn context(&self) -> &Arc<GpuContext> {
        &self.ctx
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn groups(&self) -> &[ShaderGroup] {
        &self.groups
    }

    pub fn object(&self, id: ObjectId) -> Option<&DataGameObject> {
        self.objects.get(id.0)
    }

    pub fn mesh(&self, id: MeshId) -> Option<&DataMesh> {
        self.meshes.get(id.0)
    }

    pub fn images(&self) -> &[DataImage] {
        &self.images
    }

    pub fn images_mut(&mut self) -> &mut [DataImage] {
        &mut self.images
    }

    /// Descriptor count reserved per type
    pub fn pool_sizes(&self) -> &[(vk::DescriptorType, u32)] {
        &self.pool_sizes
    }

    pub fn uniform_buffer(&self) -> Option<vk::Buffer> {
        self.uniform_block.as_ref().and_then(MemoryBlock::buffer)
    }

    pub fn uniform_size(&self) -> u64 {
        self.uniform_block.as_ref().map_or(0, MemoryBlock::size)
    }

    pub fn mesh_buffer(&self) -> Option<vk::Buffer> {
        self.mesh_block.as_ref().and_then(MemoryBlock::buffer)
    }

    /// Absolute uniform buffer offset of a buffer uniform
    pub fn uniform_offset(&self, owner: UniformOwner, name: &str) -> Option<u64> {
        match self.slots.get(&(owner, name.to_string()))? {
            UniformSlot::Buffer { offset, .. } => Some(*offset),
            UniformSlot::Image { .. } => None,
        }
    }

    pub fn uniform_struct(&self, owner: UniformOwner, name: &str) -> Option<&UniformStruct> {
        match self.slots.get(&(owner, name.to_string()))? {
            UniformSlot::Buffer { layout, .. } => Some(layout),
            UniformSlot::Image { .. } => None,
        }
    }

    pub fn command_buffer_count(&self) -> usize {
        self.command_buffers.len()
    }

    pub fn compute_dispatch(&self, id: ComputeId) -> Result<ComputeDispatch> {
        let compute = self.computes.get(id.0).ok_or_else(|| {
            Error::InvalidResource(format!("Compute {} does not exist", id.0))
        })?;
        let queue = self.compute_queues.iter().find(|q| q.name == compute.queue_name).ok_or_else(|| {
            Error::InvalidResource(format!("Compute '{}' has no command buffer", compute.name))
        })?;
        Ok(ComputeDispatch {
            name: compute.name.clone(),
            pipeline: self.compute_pipelines.get(id.0).copied().unwrap_or_default(),
            layout: compute.pipeline_layout,
            sets: self.program_sets.get(&ProgramId::Compute(id)).cloned().unwrap_or_default(),
            queue_name: compute.queue_name.clone(),
            queue: compute.queue,
            sync: compute.sync,
            command_buffer: queue.cmd,
        })
    }

    // ===== TEARDOWN =====

    /// Release every device object of the scene
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        let ctx = self.ctx.clone();
        let device = ctx.device.as_ref();
        if let Err(e) = device.device_wait_idle() {
            engine_warn!(SOURCE, "Wait idle before teardown failed: {}", e);
        }

        if let Some(pool) = self.graphics_pool.take() {
            device.free_command_buffers(pool, &self.command_buffers);
            device.destroy_command_pool(pool);
        }
        self.command_buffers.clear();
        for queue in self.compute_queues.drain(..) {
            if queue.cmd != vk::CommandBuffer::null() {
                device.free_command_buffers(queue.pool, &[queue.cmd]);
            }
            device.destroy_command_pool(queue.pool);
        }

        if let Some(pool) = self.descriptor_pool.take() {
            device.destroy_descriptor_pool(pool);
        }
        for pipeline in self.pipelines.drain(..).chain(self.compute_pipelines.drain(..)) {
            device.destroy_pipeline(pipeline);
        }
        for shader in self.shaders.drain(..) {
            shader.destroy(device);
        }
        for compute in self.computes.drain(..) {
            compute.destroy(device);
        }
        for sampler in self.samplers.drain(..) {
            sampler.destroy(device);
        }
        for image in self.images.drain(..) {
            image.destroy(device);
        }

        match ctx.memory() {
            Ok(mut memory) => {
                for block in [self.image_block.take(), self.mesh_block.take(), self.uniform_block.take()]
                    .into_iter()
                    .flatten()
                {
                    memory.free(block);
                }
            }
            Err(e) => engine_warn!(SOURCE, "Scene memory left to the allocator: {}", e),
        }

        self.groups.clear();
        self.objects.clear();
        self.program_sets.clear();
        self.writes.clear();
        self.slots.clear();
    }
}

impl Drop for DataScene {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
#[path = "data_scene_tests.rs"]
mod tests;
