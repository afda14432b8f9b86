use ash::vk;
use crate::device::mock_device::MockDevice;
use crate::error::Error;
use crate::layout::{
    ShaderMapping, SetMapping, UniformMapping, FieldMapping,
    plan_set_layouts, compile_set_layouts, ShaderScope, DescriptorKind,
};

fn uniform(name: &str, set: u32, binding: u32, ty: vk::DescriptorType, fields: &[(&str, u32)]) -> UniformMapping {
    UniformMapping {
        name: name.to_string(),
        set,
        binding,
        descriptor_type: ty.as_raw(),
        stage: vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw(),
        count: 1,
        fields: fields
            .iter()
            .map(|(n, t)| FieldMapping { name: n.to_string(), member_type: *t, count: 1 })
            .collect(),
    }
}

fn mapping(sets: &[(u32, u32)], uniforms: Vec<UniformMapping>) -> ShaderMapping {
    ShaderMapping {
        sets: sets.iter().map(|&(id, scope)| SetMapping { id, scope }).collect(),
        uniforms,
        ..ShaderMapping::default()
    }
}

// ============================================================================
// PLANNING
// ============================================================================

#[test]
fn test_single_global_buffer_of_two_floats() {
    let m = mapping(
        &[(0, 0)],
        vec![uniform("params", 0, 0, vk::DescriptorType::UNIFORM_BUFFER, &[("a", 12), ("b", 12)])],
    );

    let plans = plan_set_layouts("s", &m, 16).unwrap();

    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].scope, ShaderScope::Global);
    assert_eq!(plans[0].structs[0].size(), 16);
    assert_eq!(plans[0].write_sets[0].range, 16);
    assert_eq!(plans[0].pool_sizes, vec![(vk::DescriptorType::UNIFORM_BUFFER, 1)]);
}

#[test]
fn test_empty_uniform_list_yields_no_layouts() {
    let m = mapping(&[(0, 0)], Vec::new());
    assert!(plan_set_layouts("s", &m, 16).unwrap().is_empty());
}

#[test]
fn test_uniforms_grouped_by_set_in_first_seen_order() {
    let m = mapping(
        &[(0, 0), (1, 1)],
        vec![
            uniform("model", 1, 0, vk::DescriptorType::UNIFORM_BUFFER, &[("m", 2)]),
            uniform("view", 0, 0, vk::DescriptorType::UNIFORM_BUFFER, &[("v", 2)]),
            uniform("albedo", 1, 1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, &[]),
        ],
    );

    let plans = plan_set_layouts("s", &m, 256).unwrap();

    assert_eq!(plans.iter().map(|p| p.set).collect::<Vec<_>>(), vec![1, 0]);
    assert_eq!(plans[0].scope, ShaderScope::Local);
    assert_eq!(plans[0].images, vec!["albedo".to_string()]);
    assert_eq!(plans[0].write_sets.len(), 2);
    assert!(plans[0].write_sets[0].kind.is_buffer());
    assert_eq!(plans[0].write_sets[1].kind, DescriptorKind::CombinedImageSampler);
    assert_eq!(plans[0].write_sets[1].range, 0);
}

#[test]
fn test_pool_sizes_accumulate_per_type() {
    let m = mapping(
        &[(0, 1)],
        vec![
            uniform("a", 0, 0, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, &[]),
            uniform("b", 0, 1, vk::DescriptorType::UNIFORM_BUFFER, &[("x", 12)]),
            uniform("c", 0, 2, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, &[]),
        ],
    );

    let plans = plan_set_layouts("s", &m, 16).unwrap();

    assert_eq!(
        plans[0].pool_sizes,
        vec![
            (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 2),
            (vk::DescriptorType::UNIFORM_BUFFER, 1),
        ]
    );
}

#[test]
fn test_dynamic_uniform_buffer_and_storage_image() {
    let m = mapping(
        &[(0, 0)],
        vec![
            uniform("dyn", 0, 0, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, &[("x", 12)]),
            uniform("out", 0, 1, vk::DescriptorType::STORAGE_IMAGE, &[]),
        ],
    );

    let plans = plan_set_layouts("c", &m, 16).unwrap();
    assert_eq!(plans[0].write_sets[0].kind, DescriptorKind::UniformBuffer { dynamic: true });
    assert_eq!(plans[0].write_sets[1].kind, DescriptorKind::StorageImage);
    assert_eq!(plans[0].write_sets[1].kind.image_layout(), vk::ImageLayout::GENERAL);
}

// ============================================================================
// ERRORS
// ============================================================================

#[test]
fn test_unsupported_descriptor_type() {
    let m = mapping(
        &[(0, 0)],
        vec![uniform("particles", 0, 0, vk::DescriptorType::STORAGE_BUFFER, &[])],
    );

    let result = plan_set_layouts("smoke", &m, 16);

    assert_eq!(
        result.unwrap_err(),
        Error::UnsupportedDescriptorType {
            shader: "smoke".to_string(),
            uniform: "particles".to_string(),
            descriptor_type: vk::DescriptorType::STORAGE_BUFFER.as_raw(),
        }
    );
}

#[test]
fn test_two_global_sets_violate_cardinality() {
    let m = mapping(
        &[(0, 0), (1, 0)],
        vec![
            uniform("a", 0, 0, vk::DescriptorType::UNIFORM_BUFFER, &[("x", 12)]),
            uniform("b", 1, 0, vk::DescriptorType::UNIFORM_BUFFER, &[("x", 12)]),
        ],
    );
    assert!(matches!(plan_set_layouts("s", &m, 16), Err(Error::ScopeCardinality { .. })));
}

#[test]
fn test_two_local_sets_are_allowed() {
    let m = mapping(
        &[(0, 1), (1, 1)],
        vec![
            uniform("a", 0, 0, vk::DescriptorType::UNIFORM_BUFFER, &[("x", 12)]),
            uniform("b", 1, 0, vk::DescriptorType::UNIFORM_BUFFER, &[("x", 12)]),
        ],
    );
    assert_eq!(plan_set_layouts("s", &m, 16).unwrap().len(), 2);
}

#[test]
fn test_undeclared_set() {
    let m = mapping(&[], vec![uniform("a", 3, 0, vk::DescriptorType::UNIFORM_BUFFER, &[("x", 12)])]);
    assert!(matches!(plan_set_layouts("s", &m, 16), Err(Error::InvalidMapping(_))));
}

// ============================================================================
// DEVICE LAYOUTS
// ============================================================================

#[test]
fn test_compile_creates_sorted_layouts() {
    let device = MockDevice::new();
    let m = mapping(
        &[(0, 0), (1, 1)],
        vec![
            uniform("model", 1, 0, vk::DescriptorType::UNIFORM_BUFFER, &[("m", 2)]),
            uniform("view", 0, 0, vk::DescriptorType::UNIFORM_BUFFER, &[("v", 2), ("t", 12)]),
        ],
    );

    let layouts = compile_set_layouts(&device, "s", &m, 16).unwrap();

    assert_eq!(layouts.len(), 2);
    assert_eq!(layouts[0].set(), 0);
    assert_eq!(layouts[0].struct_map_size(), 80);
    assert_eq!(layouts[1].struct_map_size(), 64);
    assert_eq!(layouts[0].write_set("view").unwrap().range, layouts[0].uniform_struct("view").unwrap().size());
    assert_eq!(device.live("set_layout"), 2);

    for layout in &layouts {
        layout.destroy(&device);
    }
    assert_eq!(device.live("set_layout"), 0);
}
