use std::sync::Arc;
use ash::vk;
use ash::vk::Handle;
use crate::compiler::test_fixtures::*;
use crate::compiler::{DataScene, FrameTarget, UniformOwner};
use crate::device::mock_device::MockDevice;
use crate::device::DescriptorResource;
use crate::error::Error;
use crate::memory::GpuContext;
use crate::scene::{
    GameObject, ImageBinding, ImageTarget, Mesh, ObjectId, ProgramId, Scene, ShaderId, DEFAULT_VIEW,
};

fn setup(scene: &mut Scene) -> (Arc<MockDevice>, DataScene) {
    let (device, ctx) = context();
    let data = DataScene::setup(Arc::new(ctx), scene, vk::RenderPass::from_raw(0xAA), 3).unwrap();
    (device, data)
}

fn target() -> FrameTarget {
    FrameTarget {
        render_pass: vk::RenderPass::from_raw(0xAA),
        framebuffer: vk::Framebuffer::from_raw(0xF0),
        extent: vk::Extent2D { width: 800, height: 600 },
        clear_color: [0.0, 0.0, 0.0, 1.0],
        clear_depth: 1.0,
    }
}

fn float_at(bytes: &[u8], offset: u64) -> f32 {
    let offset = offset as usize;
    f32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

// ============================================================================
// SETUP
// ============================================================================

#[test]
fn test_setup_groups_objects_by_shader() {
    let mut scene = lit_scene(3);

    let (_device, data) = setup(&mut scene);

    assert_eq!(data.groups().len(), 1);
    assert_eq!(data.groups()[0].shader, ShaderId(0));
    assert_eq!(data.groups()[0].objects, vec![ObjectId(0), ObjectId(1), ObjectId(2)]);
    assert_eq!(data.command_buffer_count(), 3);
}

#[test]
fn test_two_objects_reserve_two_image_samplers() {
    let mut scene = lit_scene(2);

    let (device, data) = setup(&mut scene);

    let state = device.state.lock().unwrap();
    assert_eq!(state.pools.len(), 1);
    let (sizes, max_sets) = &state.pools[0];
    assert!(sizes.contains(&(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 2)));
    assert!(sizes.contains(&(vk::DescriptorType::UNIFORM_BUFFER, 3)));
    assert_eq!(*max_sets, 3);
    drop(state);
    assert_eq!(data.pool_sizes().len(), 2);
}

#[test]
fn test_pool_capacity_matches_descriptors_written() {
    let mut scene = lit_scene(4);

    let (device, _data) = setup(&mut scene);

    let state = device.state.lock().unwrap();
    let reserved: u32 = state.pools[0].0.iter().map(|(_, count)| count).sum();
    assert_eq!(state.descriptor_updates.len(), 1);
    assert_eq!(state.descriptor_updates[0].len() as u32, reserved);
}

#[test]
fn test_initial_values_are_packed_into_uniform_buffer() {
    let mut scene = lit_scene(2);

    let (device, data) = setup(&mut scene);

    let bytes = device.buffer_contents(data.uniform_buffer().unwrap());
    let camera = data.uniform_offset(UniformOwner::Program(ProgramId::Shader(ShaderId(0))), "camera").unwrap();
    let color1 = data.uniform_offset(UniformOwner::Object(ObjectId(1)), "color").unwrap();
    assert_eq!(camera, 0);
    assert_eq!(color1 % 16, 0);
    assert_eq!(float_at(&bytes, camera), 1.0);
    assert_eq!(float_at(&bytes, camera + 4), 0.0);
    assert_eq!(float_at(&bytes, color1), 1.0);
    assert_eq!(float_at(&bytes, color1 + 12), 1.0);
}

#[test]
fn test_mesh_upload_and_vertex_offsets() {
    let mut scene = lit_scene(1);

    let (device, data) = setup(&mut scene);

    let bytes = device.buffer_contents(data.mesh_buffer().unwrap());
    let indices: Vec<u16> = bytes[..12].chunks(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
    assert_eq!(indices, vec![0, 1, 2, 2, 3, 0]);
    assert_eq!(data.object(ObjectId(0)).unwrap().vertex_offsets, vec![12, 60]);
    assert_eq!(float_at(&bytes, 12), 0.5);
}

#[test]
fn test_images_end_in_target_layout() {
    let mut scene = lit_scene(1);

    let (device, data) = setup(&mut scene);

    let commands = device.commands();
    assert!(commands.contains(&"barrier UNDEFINED->TRANSFER_DST_OPTIMAL".to_string()));
    assert!(commands.contains(&"copy_buffer_to_image 1".to_string()));
    assert!(commands.contains(&"barrier TRANSFER_DST_OPTIMAL->SHADER_READ_ONLY_OPTIMAL".to_string()));
    assert_eq!(data.images()[0].layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    assert_eq!(data.images()[0].access, ImageTarget::ShaderRead.access());
}

#[test]
fn test_sampled_image_descriptor_points_at_view() {
    let mut scene = lit_scene(1);

    let (device, data) = setup(&mut scene);

    let view = data.images()[0].view(DEFAULT_VIEW).unwrap();
    let state = device.state.lock().unwrap();
    let image_writes: Vec<_> = state.descriptor_updates[0]
        .iter()
        .filter(|w| w.descriptor_type == vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .collect();
    assert_eq!(image_writes.len(), 1);
    assert!(matches!(
        image_writes[0].resource,
        DescriptorResource::Image { view: v, layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, .. } if v == view
    ));
}

#[test]
fn test_incompatible_mesh_fails_without_leaks() {
    let mut scene = lit_scene(0);
    let bare = scene.add_mesh(
        Mesh::new("bare", vec![0u16, 1, 2]).unwrap().with_attribute("POSITION", vec![0.0f32; 9]),
    );
    scene.add_object(GameObject::new("broken", ShaderId(0), bare));
    let (device, ctx) = context();

    let result = DataScene::setup(Arc::new(ctx), &mut scene, vk::RenderPass::null(), 2);

    match result {
        Err(Error::IncompatibleMeshShader { mesh, shader, attribute }) => {
            assert_eq!(mesh, "bare");
            assert_eq!(shader, "lit");
            assert_eq!(attribute, "NORMAL");
        }
        other => panic!("unexpected result: {:?}", other.err()),
    }
    assert!(device.all_destroyed());
}

#[test]
fn test_missing_image_binding_is_unresolved() {
    let mut scene = lit_scene(1);
    let id = scene.add_object(GameObject::new("plain", ShaderId(0), crate::scene::MeshId(0)));
    scene.update_object(id, |u| u.set_field("color", "value", [0.0f32; 4])).unwrap();
    let (device, ctx) = context();

    let result = DataScene::setup(Arc::new(ctx), &mut scene, vk::RenderPass::null(), 2);

    assert!(matches!(
        result.err(),
        Some(Error::UnresolvedImageBinding { ref owner, ref uniform, .. }) if owner == "plain" && uniform == "albedo"
    ));
    assert!(device.all_destroyed());
}

#[test]
fn test_destroy_releases_everything() {
    let (mut scene, _) = canvas_scene(Some("compute"));
    let (device, mut data) = setup(&mut scene);
    assert!(device.live("pipeline") > 0);

    data.destroy();
    data.destroy();

    assert!(device.all_destroyed());
}

// ============================================================================
// UPDATE
// ============================================================================

#[test]
fn test_single_field_update_maps_only_that_uniform() {
    let mut scene = lit_scene(2);
    let (device, mut data) = setup(&mut scene);
    let buffer = data.uniform_buffer().unwrap();
    let offset_a = data.uniform_offset(UniformOwner::Object(ObjectId(0)), "color").unwrap();
    let offset_b = data.uniform_offset(UniformOwner::Object(ObjectId(1)), "color").unwrap();
    let before = device.buffer_contents(buffer);
    let maps_before = device.state.lock().unwrap().maps.len();

    scene.update_object(ObjectId(0), |u| u.set_field("color", "value", [0.25f32, 0.5, 0.75, 1.0])).unwrap();
    data.update(&mut scene).unwrap();

    let state = device.state.lock().unwrap();
    assert_eq!(state.maps.len(), maps_before + 1);
    let (_, offset, size) = *state.maps.last().unwrap();
    assert_eq!((offset, size), (offset_a, 16));
    drop(state);

    let after = device.buffer_contents(buffer);
    assert_eq!(float_at(&after, offset_a + 4), 0.5);
    let b = offset_b as usize;
    assert_eq!(after[b..b + 16], before[b..b + 16]);
    assert_eq!(data.stats().uniform_bytes, 16);
    assert!(!scene.has_updates());
}

#[test]
fn test_span_covers_first_to_last_dirty_uniform() {
    let mut scene = lit_scene(3);
    let (device, mut data) = setup(&mut scene);
    let first = data.uniform_offset(UniformOwner::Object(ObjectId(0)), "color").unwrap();
    let last = data.uniform_offset(UniformOwner::Object(ObjectId(2)), "color").unwrap();

    scene.update_object(ObjectId(2), |u| u.touch("color")).unwrap();
    scene.update_object(ObjectId(0), |u| u.touch("color")).unwrap();
    data.update(&mut scene).unwrap();

    let (_, offset, size) = *device.state.lock().unwrap().maps.last().unwrap();
    assert_eq!(offset, first);
    assert_eq!(offset + size, last + 16);
}

#[test]
fn test_flush_without_writes_does_nothing() {
    let mut scene = lit_scene(2);
    let (device, mut data) = setup(&mut scene);
    let (maps, updates) = {
        let state = device.state.lock().unwrap();
        (state.maps.len(), state.descriptor_updates.len())
    };

    data.update(&mut scene).unwrap();
    scene.update_object(ObjectId(0), |u| u.set_field("color", "value", [1.0f32; 4])).unwrap();
    data.update(&mut scene).unwrap();
    data.update(&mut scene).unwrap();

    let state = device.state.lock().unwrap();
    assert_eq!(state.maps.len(), maps + 1);
    assert_eq!(state.descriptor_updates.len(), updates);
    assert_eq!(data.stats().uniform_bytes, 0);
}

#[test]
fn test_global_uniform_update_round_trips() {
    let mut scene = lit_scene(1);
    let (device, mut data) = setup(&mut scene);
    let owner = UniformOwner::Program(ProgramId::Shader(ShaderId(0)));
    let view_proj = glam::Mat4::from_scale(glam::Vec3::splat(2.0));

    scene.update_shader(ShaderId(0), |u| u.set_field("camera", "view_proj", view_proj)).unwrap();
    data.update(&mut scene).unwrap();

    let bytes = device.buffer_contents(data.uniform_buffer().unwrap());
    let offset = data.uniform_offset(owner, "camera").unwrap() as usize;
    let layout = data.uniform_struct(owner, "camera").unwrap();
    let packed = layout.unpack_field(&bytes[offset..offset + layout.size() as usize], "view_proj");
    assert_eq!(packed, Some(crate::layout::FieldValue::from(view_proj)));
}

#[test]
fn test_image_rebind_patches_one_descriptor() {
    let mut scene = lit_scene(2);
    let second = scene.add_image(checker_image());
    let (device, mut data) = setup(&mut scene);

    scene
        .update_object(ObjectId(1), |u| {
            u.set_image("albedo", ImageBinding::CombinedImageSampler {
                image: second,
                view: DEFAULT_VIEW.to_string(),
                sampler: crate::scene::SamplerId(0),
            })
        })
        .unwrap();
    data.update(&mut scene).unwrap();

    let view = data.images()[second.0].view(DEFAULT_VIEW).unwrap();
    let state = device.state.lock().unwrap();
    let last = state.descriptor_updates.last().unwrap();
    assert_eq!(last.len(), 1);
    assert_eq!(last[0].set, data.object(ObjectId(1)).unwrap().sets[0].1);
    assert!(matches!(last[0].resource, DescriptorResource::Image { view: v, .. } if v == view));
    drop(state);
    assert_eq!(data.stats().descriptor_writes, 1);
}

#[test]
fn test_failed_flush_keeps_every_pending_write() {
    let mut scene = lit_scene(2);
    let (device, mut data) = setup(&mut scene);
    let buffer = data.uniform_buffer().unwrap();
    let offset_b = data.uniform_offset(UniformOwner::Object(ObjectId(1)), "color").unwrap();
    let (maps, updates) = {
        let state = device.state.lock().unwrap();
        (state.maps.len(), state.descriptor_updates.len())
    };

    scene.update_object(ObjectId(0), |u| u.set_field("color", "value", [1.0f32, 2.0])).unwrap();
    scene.update_object(ObjectId(1), |u| u.set_field("color", "value", [9.0f32; 4])).unwrap();
    scene.update_object(ObjectId(1), |u| u.touch("albedo")).unwrap();
    assert!(data.update(&mut scene).is_err());

    {
        let state = device.state.lock().unwrap();
        assert_eq!(state.maps.len(), maps);
        assert_eq!(state.descriptor_updates.len(), updates);
    }
    assert!(scene.has_updates());
    assert!(scene.object(ObjectId(1)).unwrap().uniforms.has_updates());

    scene.update_object(ObjectId(0), |u| u.set_field("color", "value", [3.0f32; 4])).unwrap();
    data.update(&mut scene).unwrap();

    let bytes = device.buffer_contents(buffer);
    assert_eq!(float_at(&bytes, offset_b), 9.0);
    assert_eq!(data.stats().descriptor_writes, 1);
    assert!(!scene.has_updates());
}

// ============================================================================
// RECORDING
// ============================================================================

#[test]
fn test_record_draws_visible_objects() {
    let mut scene = lit_scene(3);
    let (device, mut data) = setup(&mut scene);
    scene.set_visible(ObjectId(1), false).unwrap();
    device.clear_commands();

    data.record(&scene, 0, &target()).unwrap();

    let commands = device.commands();
    assert_eq!(commands.iter().filter(|c| c.starts_with("bind_pipeline")).count(), 1);
    assert_eq!(commands.iter().filter(|c| *c == "draw_indexed 6").count(), 2);
    assert!(commands.contains(&"begin_render_pass 800x600".to_string()));
    assert!(commands.contains(&"bind_vertex 0 [12, 60]".to_string()));
    assert_eq!(data.stats().draw_calls, 2);
}

#[test]
fn test_record_rejects_unknown_image_index() {
    let mut scene = lit_scene(1);
    let (_device, mut data) = setup(&mut scene);

    assert!(data.record(&scene, 7, &target()).is_err());
}

#[test]
fn test_resize_targets_reallocates_command_buffers() {
    let mut scene = lit_scene(1);
    let (_device, mut data) = setup(&mut scene);

    data.resize_targets(5).unwrap();

    assert_eq!(data.command_buffer_count(), 5);
}

// ============================================================================
// COMPUTE
// ============================================================================

#[test]
fn test_compute_dispatch_info() {
    let (mut scene, blur) = canvas_scene(Some("compute"));

    let (device, data) = setup(&mut scene);
    let dispatch = data.compute_dispatch(blur).unwrap();

    assert_eq!(dispatch.name, "blur");
    assert!(!dispatch.sync);
    assert_eq!(dispatch.queue.family, 1);
    assert_eq!(dispatch.sets.len(), 1);
    assert_ne!(dispatch.command_buffer, vk::CommandBuffer::null());
    let canvas = &data.images()[1];
    assert_eq!(canvas.layout, vk::ImageLayout::GENERAL);
    let state = device.state.lock().unwrap();
    assert!(state.descriptor_updates[0].iter().any(|w| {
        w.descriptor_type == vk::DescriptorType::STORAGE_IMAGE
            && matches!(w.resource, DescriptorResource::Image { layout: vk::ImageLayout::GENERAL, .. })
    }));
}

#[test]
fn test_gpu_context_is_shared() {
    let (_device, ctx) = context();
    let ctx: Arc<GpuContext> = Arc::new(ctx);
    let mut scene = lit_scene(1);

    let data = DataScene::setup(ctx.clone(), &mut scene, vk::RenderPass::null(), 1).unwrap();

    assert!(Arc::ptr_eq(data.context(), &ctx));
    assert!(scene.object(ObjectId(0)).unwrap().uniforms.is_tracked("color"));
}
