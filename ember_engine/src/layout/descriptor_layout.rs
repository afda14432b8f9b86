/// Descriptor set layouts compiled from a shader mapping
///
/// Compilation is split in two steps:
/// - `plan_set_layouts` is pure: it groups uniforms by set, builds the packed
///   struct of every buffer uniform, counts pool sizes and produces the
///   write-set templates
/// - `DescriptorSetLayout::create` turns one plan into a device layout
///
/// The result is immutable and is the only place that knows how large a
/// shader's uniform buffer slice is and where each named uniform lives.

use ash::vk;
use crate::device::{Device, LayoutBinding};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::layout::{ShaderMapping, UniformMapping, UniformStruct};

const SOURCE: &str = "ember::DescriptorLayout";

// ===== SCOPES =====

/// Who owns the descriptor sets allocated from a layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderScope {
    /// One set per shader or compute
    Global,
    /// One set per object using the shader
    Local,
    /// One set per object, filled by the engine's animation system
    EngineAnimation,
}

impl ShaderScope {
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(ShaderScope::Global),
            1 => Some(ShaderScope::Local),
            2 => Some(ShaderScope::EngineAnimation),
            _ => None,
        }
    }

    /// Scopes a shader may declare at most once
    pub fn is_unique(&self) -> bool {
        matches!(self, ShaderScope::Global | ShaderScope::EngineAnimation)
    }

    /// Sets are allocated per object rather than per shader
    pub fn is_per_object(&self) -> bool {
        !matches!(self, ShaderScope::Global)
    }
}

// ===== DESCRIPTOR KINDS =====

/// Descriptor types the engine knows how to fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    UniformBuffer { dynamic: bool },
    CombinedImageSampler,
    StorageImage,
}

impl DescriptorKind {
    pub fn from_vk(ty: vk::DescriptorType) -> Option<Self> {
        match ty {
            vk::DescriptorType::UNIFORM_BUFFER => Some(DescriptorKind::UniformBuffer { dynamic: false }),
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC => Some(DescriptorKind::UniformBuffer { dynamic: true }),
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER => Some(DescriptorKind::CombinedImageSampler),
            vk::DescriptorType::STORAGE_IMAGE => Some(DescriptorKind::StorageImage),
            _ => None,
        }
    }

    pub fn vk_type(&self) -> vk::DescriptorType {
        match self {
            DescriptorKind::UniformBuffer { dynamic: false } => vk::DescriptorType::UNIFORM_BUFFER,
            DescriptorKind::UniformBuffer { dynamic: true } => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            DescriptorKind::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            DescriptorKind::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
        }
    }

    pub fn is_buffer(&self) -> bool {
        matches!(self, DescriptorKind::UniformBuffer { .. })
    }

    /// Layout an image must be in when sampled through this descriptor
    pub fn image_layout(&self) -> vk::ImageLayout {
        match self {
            DescriptorKind::StorageImage => vk::ImageLayout::GENERAL,
            _ => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }
}

/// How to build the descriptor write of one uniform
#[derive(Debug, Clone, PartialEq)]
pub struct WriteSetTemplate {
    pub name: String,
    pub kind: DescriptorKind,
    pub binding: u32,
    /// Struct size for buffers, 0 for images
    pub range: u64,
}

// ===== PLANNING =====

/// Everything about one set that does not need the device
#[derive(Debug, Clone, PartialEq)]
pub struct SetLayoutPlan {
    pub set: u32,
    pub scope: ShaderScope,
    pub bindings: Vec<LayoutBinding>,
    /// Buffer uniforms in declaration order
    pub structs: Vec<UniformStruct>,
    pub images: Vec<String>,
    /// Descriptor count per type, in first-seen order
    pub pool_sizes: Vec<(vk::DescriptorType, u32)>,
    pub write_sets: Vec<WriteSetTemplate>,
}

/// Group uniforms by set (first-seen order) and lay out every set
///
/// # Errors
///
/// - `UnsupportedDescriptorType` for any descriptor type outside `DescriptorKind`
/// - `ScopeCardinality` when a unique scope is declared twice
/// - `InvalidMapping` for undeclared sets, unknown scopes or bad fields
pub fn plan_set_layouts(owner: &str, mapping: &ShaderMapping, alignment: u64) -> Result<Vec<SetLayoutPlan>> {
    if mapping.uniforms.is_empty() {
        return Ok(Vec::new());
    }

    let mut groups: Vec<(u32, Vec<&UniformMapping>)> = Vec::new();
    for uniform in &mapping.uniforms {
        match groups.iter_mut().find(|(set, _)| *set == uniform.set) {
            Some((_, members)) => members.push(uniform),
            None => groups.push((uniform.set, vec![uniform])),
        }
    }

    let mut plans = Vec::with_capacity(groups.len());
    for (set, uniforms) in groups {
        let declared = mapping.set(set).ok_or_else(|| {
            Error::InvalidMapping(format!("'{}' uses set {} which is not declared in 'sets'", owner, set))
        })?;
        let scope = ShaderScope::from_id(declared.scope).ok_or_else(|| {
            Error::InvalidMapping(format!("'{}' set {} has unknown scope {}", owner, set, declared.scope))
        })?;

        if scope.is_unique() && plans.iter().any(|p: &SetLayoutPlan| p.scope == scope) {
            return Err(Engine::log_and_return_error(SOURCE, Error::ScopeCardinality {
                shader: owner.to_string(),
                scope: format!("{:?}", scope),
            }));
        }

        plans.push(plan_set(owner, set, scope, &uniforms, alignment)?);
    }

    Ok(plans)
}

fn plan_set(
    owner: &str,
    set: u32,
    scope: ShaderScope,
    uniforms: &[&UniformMapping],
    alignment: u64,
) -> Result<SetLayoutPlan> {
    let mut plan = SetLayoutPlan {
        set,
        scope,
        bindings: Vec::with_capacity(uniforms.len()),
        structs: Vec::new(),
        images: Vec::new(),
        pool_sizes: Vec::new(),
        write_sets: Vec::with_capacity(uniforms.len()),
    };

    for uniform in uniforms {
        let descriptor_type = vk::DescriptorType::from_raw(uniform.descriptor_type);
        let kind = DescriptorKind::from_vk(descriptor_type).ok_or_else(|| {
            Engine::log_and_return_error(SOURCE, Error::UnsupportedDescriptorType {
                shader: owner.to_string(),
                uniform: uniform.name.clone(),
                descriptor_type: uniform.descriptor_type,
            })
        })?;

        match plan.pool_sizes.iter_mut().find(|(ty, _)| *ty == descriptor_type) {
            Some((_, count)) => *count += uniform.count,
            None => plan.pool_sizes.push((descriptor_type, uniform.count)),
        }

        let range = if kind.is_buffer() {
            let layout = UniformStruct::build(&uniform.name, &uniform.fields, alignment)?;
            let size = layout.size();
            plan.structs.push(layout);
            size
        } else {
            plan.images.push(uniform.name.clone());
            0
        };

        plan.bindings.push(LayoutBinding {
            binding: uniform.binding,
            descriptor_type,
            count: uniform.count,
            stages: vk::ShaderStageFlags::from_raw(uniform.stage),
        });

        plan.write_sets.push(WriteSetTemplate {
            name: uniform.name.clone(),
            kind,
            binding: uniform.binding,
            range,
        });
    }

    Ok(plan)
}

// ===== COMPILED LAYOUT =====

/// A descriptor set layout on the device plus its planning data
#[derive(Debug)]
pub struct DescriptorSetLayout {
    pub handle: vk::DescriptorSetLayout,
    pub plan: SetLayoutPlan,
    struct_map_size: u64,
}

impl DescriptorSetLayout {
    pub fn create(device: &dyn Device, plan: SetLayoutPlan) -> Result<Self> {
        let handle = device.create_descriptor_set_layout(&plan.bindings)?;
        let struct_map_size = plan.structs.iter().map(|s| s.size()).sum();
        Ok(Self { handle, plan, struct_map_size })
    }

    pub fn set(&self) -> u32 { self.plan.set }

    pub fn scope(&self) -> ShaderScope { self.plan.scope }

    /// Bytes of uniform buffer one set of this layout occupies
    pub fn struct_map_size(&self) -> u64 { self.struct_map_size }

    pub fn uniform_struct(&self, name: &str) -> Option<&UniformStruct> {
        self.plan.structs.iter().find(|s| s.name() == name)
    }

    pub fn write_set(&self, name: &str) -> Option<&WriteSetTemplate> {
        self.plan.write_sets.iter().find(|w| w.name == name)
    }

    pub fn destroy(&self, device: &dyn Device) {
        device.destroy_descriptor_set_layout(self.handle);
    }
}

/// Plan and create every set layout of a mapping
///
/// Layouts are returned sorted by set index. On failure the layouts created
/// so far are destroyed.
pub fn compile_set_layouts(
    device: &dyn Device,
    owner: &str,
    mapping: &ShaderMapping,
    alignment: u64,
) -> Result<Vec<DescriptorSetLayout>> {
    let mut plans = plan_set_layouts(owner, mapping, alignment)?;
    plans.sort_by_key(|p| p.set);

    let mut layouts: Vec<DescriptorSetLayout> = Vec::with_capacity(plans.len());
    for plan in plans {
        match DescriptorSetLayout::create(device, plan) {
            Ok(layout) => layouts.push(layout),
            Err(e) => {
                for layout in &layouts {
                    layout.destroy(device);
                }
                return Err(e);
            }
        }
    }
    Ok(layouts)
}

#[cfg(test)]
#[path = "descriptor_layout_tests.rs"]
mod tests;
