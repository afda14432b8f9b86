/// Shared fixtures for compiler tests

use std::sync::Arc;
use ash::vk;
use crate::config::Config;
use crate::device::mock_device::MockDevice;
use crate::layout::{
    AttributeMapping, ConstantMapping, FieldMapping, SetMapping, ShaderMapping, UniformMapping,
    VertexBindingMapping,
};
use crate::memory::GpuContext;
use crate::scene::{
    Compute, ComputeId, GameObject, Image, ImageBinding, ImageSource, ImageTarget, Mesh, ObjectId,
    Sampler, Scene, Shader, DEFAULT_VIEW,
};

pub const SPIRV: u32 = 0x0723_0203;

pub fn context() -> (Arc<MockDevice>, GpuContext) {
    let device = Arc::new(MockDevice::new());
    let ctx = GpuContext::new(device.clone(), Config::default());
    (device, ctx)
}

pub fn buffer_uniform(name: &str, set: u32, binding: u32, fields: &[(&str, u32)]) -> UniformMapping {
    UniformMapping {
        name: name.to_string(),
        set,
        binding,
        descriptor_type: vk::DescriptorType::UNIFORM_BUFFER.as_raw(),
        stage: (vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT).as_raw(),
        count: 1,
        fields: fields
            .iter()
            .map(|(n, t)| FieldMapping { name: n.to_string(), member_type: *t, count: 1 })
            .collect(),
    }
}

pub fn image_uniform(name: &str, set: u32, binding: u32, ty: vk::DescriptorType) -> UniformMapping {
    UniformMapping {
        name: name.to_string(),
        set,
        binding,
        descriptor_type: ty.as_raw(),
        stage: vk::ShaderStageFlags::FRAGMENT.as_raw(),
        count: 1,
        fields: Vec::new(),
    }
}

/// Global camera (set 0), per-object color + albedo texture (set 1),
/// POSITION and NORMAL vertex inputs
pub fn lit_mapping() -> ShaderMapping {
    ShaderMapping {
        sets: vec![SetMapping { id: 0, scope: 0 }, SetMapping { id: 1, scope: 1 }],
        uniforms: vec![
            buffer_uniform("camera", 0, 0, &[("view_proj", 2)]),
            buffer_uniform("color", 1, 0, &[("value", 5)]),
            image_uniform("albedo", 1, 1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER),
        ],
        constants: Vec::new(),
        bindings: vec![
            VertexBindingMapping { binding: 0, stride: 12, name: "POSITION".to_string() },
            VertexBindingMapping { binding: 1, stride: 12, name: "NORMAL".to_string() },
        ],
        attributes: vec![
            AttributeMapping { name: "POSITION".to_string(), binding: 0, location: 0, format: 106, offset: 0 },
            AttributeMapping { name: "NORMAL".to_string(), binding: 1, location: 1, format: 106, offset: 0 },
        ],
    }
}

pub fn lit_shader() -> Shader {
    Shader::from_words("lit", vec![SPIRV], vec![SPIRV], lit_mapping())
}

pub fn quad_mesh() -> Mesh {
    Mesh::new("quad", vec![0u16, 1, 2, 2, 3, 0])
        .unwrap()
        .with_attribute("POSITION", vec![0.5f32; 12])
        .with_attribute("NORMAL", vec![0.0f32; 12])
}

pub fn checker_image() -> Image {
    Image::new("checker", ImageSource::image_2d(vk::Format::R8G8B8A8_UNORM, 2, 2, vec![0xFF; 16]))
}

/// `count` objects sharing the lit shader, the quad and the checker texture
pub fn lit_scene(count: usize) -> Scene {
    let mut scene = Scene::new("lit");
    let shader = scene.add_shader(lit_shader());
    let mesh = scene.add_mesh(quad_mesh());
    let image = scene.add_image(checker_image());
    let sampler = scene.add_sampler(Sampler::new("linear"));

    scene
        .update_shader(shader, |u| u.set_field("camera", "view_proj", glam::Mat4::IDENTITY))
        .unwrap();

    for i in 0..count {
        let id = scene.add_object(GameObject::new(&format!("object{}", i), shader, mesh));
        scene
            .update_object(id, |u| {
                u.set_field("color", "value", [i as f32, 0.0, 0.0, 1.0]);
                u.set_image("albedo", ImageBinding::CombinedImageSampler {
                    image,
                    view: DEFAULT_VIEW.to_string(),
                    sampler,
                });
            })
            .unwrap();
        assert_eq!(id, ObjectId(i));
    }
    scene
}

/// Global params block plus a storage image, with one specialization constant
pub fn blur_mapping() -> ShaderMapping {
    ShaderMapping {
        sets: vec![SetMapping { id: 0, scope: 0 }],
        uniforms: vec![
            buffer_uniform("params", 0, 0, &[("radius", 12)]),
            image_uniform("target", 0, 1, vk::DescriptorType::STORAGE_IMAGE),
        ],
        constants: vec![ConstantMapping {
            name: "GROUP_SIZE".to_string(),
            id: 0,
            stage: vk::ShaderStageFlags::COMPUTE.as_raw(),
            member_type: 13,
            default_value: Some(serde_json::json!(16)),
        }],
        ..ShaderMapping::default()
    }
}

/// One lit object plus a "blur" compute writing a general-layout canvas
pub fn canvas_scene(queue: Option<&str>) -> (Scene, ComputeId) {
    let mut scene = lit_scene(1);
    let canvas = scene.add_image(
        Image::new("canvas", ImageSource::image_2d(vk::Format::R8G8B8A8_UNORM, 2, 2, vec![0; 16]))
            .with_target(ImageTarget::General),
    );
    let mut compute = Compute::from_words("blur", vec![SPIRV], blur_mapping());
    if let Some(queue) = queue {
        compute = compute.with_queue(queue);
    }
    let blur = scene.add_compute(compute);
    scene
        .update_compute(blur, |u| {
            u.set_field("params", "radius", 2.0f32);
            u.set_image("target", ImageBinding::Storage { image: canvas, view: DEFAULT_VIEW.to_string() });
        })
        .unwrap();
    (scene, blur)
}
