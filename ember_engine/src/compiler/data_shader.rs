/// DataShader / DataCompute - device-side programs
///
/// Compiles a `Shader` or `Compute` into shader modules, specialization data,
/// descriptor set layouts and a pipeline layout. Pipelines themselves are
/// built later by the scene compiler, once the render pass is known.

use ash::vk;
use crate::config::RENDER_QUEUE;
use crate::device::{Device, GraphicsPipelineDesc, QueueInfo, ShaderStageDesc};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::layout::{
    build_specialization, compile_set_layouts, DescriptorSetLayout, ShaderMapping, ShaderScope,
    VertexInput,
};
use crate::memory::GpuContext;
use crate::scene::{Compute, Shader};
use crate::engine_debug;

const SOURCE: &str = "ember::DataShader";
const ENTRY_POINT: &str = "main";

/// Descriptor set layouts plus the pipeline layout built from them
struct ProgramLayout {
    layouts: Vec<DescriptorSetLayout>,
    pipeline_layout: vk::PipelineLayout,
}

fn destroy_layouts(device: &dyn Device, layouts: &[DescriptorSetLayout]) {
    for layout in layouts {
        layout.destroy(device);
    }
}

fn compile_program_layout(ctx: &GpuContext, owner: &str, mapping: &ShaderMapping) -> Result<ProgramLayout> {
    let device = ctx.device.as_ref();
    let layouts = compile_set_layouts(device, owner, mapping, ctx.limits.min_uniform_buffer_offset_alignment)?;

    // Sets are bound by position, so indices must be 0..N
    if let Some((position, layout)) = layouts.iter().enumerate().find(|(i, l)| l.set() != *i as u32) {
        destroy_layouts(device, &layouts);
        return Err(Error::InvalidMapping(format!(
            "'{}' descriptor sets must be contiguous from 0 (found set {} at position {})",
            owner, layout.set(), position
        )));
    }

    let handles: Vec<vk::DescriptorSetLayout> = layouts.iter().map(|l| l.handle).collect();
    match device.create_pipeline_layout(&handles) {
        Ok(pipeline_layout) => Ok(ProgramLayout { layouts, pipeline_layout }),
        Err(e) => {
            destroy_layouts(device, &layouts);
            Err(e)
        }
    }
}

fn stage_desc(
    stage: vk::ShaderStageFlags,
    module: vk::ShaderModule,
    mapping: &ShaderMapping,
) -> Result<ShaderStageDesc> {
    Ok(ShaderStageDesc {
        stage,
        module,
        entry_point: ENTRY_POINT.to_string(),
        specialization: build_specialization(stage, &mapping.constants)?,
    })
}

// ============================================================================
// Graphics
// ============================================================================

#[derive(Debug)]
pub struct DataShader {
    pub name: String,
    modules: [vk::ShaderModule; 2],
    pub stages: Vec<ShaderStageDesc>,
    pub vertex_input: VertexInput,
    pub layouts: Vec<DescriptorSetLayout>,
    pub pipeline_layout: vk::PipelineLayout,
}

impl DataShader {
    pub fn compile(ctx: &GpuContext, shader: &Shader) -> Result<Self> {
        let device = ctx.device.as_ref();
        let mapping = &shader.mapping;

        let vertex_input = VertexInput::from_mapping(&shader.name, mapping)?;
        // Specialization is checked before any module exists
        let mut stages = vec![
            stage_desc(vk::ShaderStageFlags::VERTEX, vk::ShaderModule::null(), mapping)?,
            stage_desc(vk::ShaderStageFlags::FRAGMENT, vk::ShaderModule::null(), mapping)?,
        ];

        let vert = device.create_shader_module(&shader.vert)?;
        let frag = match device.create_shader_module(&shader.frag) {
            Ok(frag) => frag,
            Err(e) => {
                device.destroy_shader_module(vert);
                return Err(e);
            }
        };
        stages[0].module = vert;
        stages[1].module = frag;

        let program = match compile_program_layout(ctx, &shader.name, mapping) {
            Ok(program) => program,
            Err(e) => {
                device.destroy_shader_module(vert);
                device.destroy_shader_module(frag);
                return Err(e);
            }
        };

        engine_debug!(SOURCE, "Compiled shader '{}' ({} set layout(s), {} vertex binding(s))",
            shader.name, program.layouts.len(), vertex_input.bindings.len());

        Ok(Self {
            name: shader.name.clone(),
            modules: [vert, frag],
            stages,
            vertex_input,
            layouts: program.layouts,
            pipeline_layout: program.pipeline_layout,
        })
    }

    pub fn global_layouts(&self) -> impl Iterator<Item = &DescriptorSetLayout> {
        self.layouts.iter().filter(|l| !l.scope().is_per_object())
    }

    pub fn local_layouts(&self) -> impl Iterator<Item = &DescriptorSetLayout> {
        self.layouts.iter().filter(|l| l.scope().is_per_object())
    }

    /// Uniform names written through the shader's own store
    pub fn global_names(&self) -> Vec<String> {
        self.global_layouts().flat_map(|l| l.plan.write_sets.iter().map(|w| w.name.clone())).collect()
    }

    /// Uniform names written through each object's store
    pub fn local_names(&self) -> Vec<String> {
        self.local_layouts().flat_map(|l| l.plan.write_sets.iter().map(|w| w.name.clone())).collect()
    }

    pub fn create_pipeline(&self, device: &dyn Device, render_pass: vk::RenderPass) -> Result<vk::Pipeline> {
        device.create_graphics_pipeline(&GraphicsPipelineDesc {
            stages: self.stages.clone(),
            vertex_bindings: self.vertex_input.bindings.clone(),
            vertex_attributes: self.vertex_input.attributes.clone(),
            layout: self.pipeline_layout,
            render_pass,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test: true,
        })
    }

    pub fn destroy(&self, device: &dyn Device) {
        device.destroy_pipeline_layout(self.pipeline_layout);
        destroy_layouts(device, &self.layouts);
        for module in self.modules {
            device.destroy_shader_module(module);
        }
    }
}

// ============================================================================
// Compute
// ============================================================================

#[derive(Debug)]
pub struct DataCompute {
    pub name: String,
    pub stage: ShaderStageDesc,
    pub layouts: Vec<DescriptorSetLayout>,
    pub pipeline_layout: vk::PipelineLayout,
    pub queue_name: String,
    pub queue: QueueInfo,
    /// Runs on the render queue, so dispatches are waited on immediately
    pub sync: bool,
}

impl DataCompute {
    /// Resolve the target queue by name
    ///
    /// Undeclared names fail with `UnknownQueue`. A declared optional queue
    /// the device could not provide resolves to the render queue.
    pub fn resolve_queue(ctx: &GpuContext, compute: &Compute) -> Result<(String, QueueInfo)> {
        let name = compute.queue.as_deref().unwrap_or(RENDER_QUEUE);
        if name != RENDER_QUEUE && ctx.config.queue(name).is_none() {
            return Err(Engine::log_and_return_error(SOURCE, Error::UnknownQueue {
                compute: compute.name.clone(),
                queue: name.to_string(),
            }));
        }
        let queue = ctx.device.queue(name).unwrap_or_else(|| ctx.device.render_queue());
        Ok((name.to_string(), queue))
    }

    pub fn compile(ctx: &GpuContext, compute: &Compute) -> Result<Self> {
        let (queue_name, queue) = Self::resolve_queue(ctx, compute)?;
        let sync = queue.handle == ctx.device.render_queue().handle;
        let device = ctx.device.as_ref();

        let mut stage = stage_desc(vk::ShaderStageFlags::COMPUTE, vk::ShaderModule::null(), &compute.mapping)?;
        stage.module = device.create_shader_module(&compute.code)?;

        let program = match compile_program_layout(ctx, &compute.name, &compute.mapping) {
            Ok(program) => program,
            Err(e) => {
                device.destroy_shader_module(stage.module);
                return Err(e);
            }
        };

        if let Some(layout) = program.layouts.iter().find(|l| l.scope() != ShaderScope::Global) {
            let set = layout.set();
            device.destroy_pipeline_layout(program.pipeline_layout);
            destroy_layouts(device, &program.layouts);
            device.destroy_shader_module(stage.module);
            return Err(Error::InvalidMapping(format!(
                "Compute '{}' set {} must use the global scope", compute.name, set
            )));
        }

        engine_debug!(SOURCE, "Compiled compute '{}' on queue '{}' (sync: {})", compute.name, queue_name, sync);

        Ok(Self {
            name: compute.name.clone(),
            stage,
            layouts: program.layouts,
            pipeline_layout: program.pipeline_layout,
            queue_name,
            queue,
            sync,
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.layouts.iter().flat_map(|l| l.plan.write_sets.iter().map(|w| w.name.clone())).collect()
    }

    pub fn create_pipeline(&self, device: &dyn Device) -> Result<vk::Pipeline> {
        device.create_compute_pipeline(&self.stage, self.pipeline_layout)
    }

    pub fn destroy(&self, device: &dyn Device) {
        device.destroy_pipeline_layout(self.pipeline_layout);
        destroy_layouts(device, &self.layouts);
        device.destroy_shader_module(self.stage.module);
    }
}

#[cfg(test)]
#[path = "data_shader_tests.rs"]
mod tests;
