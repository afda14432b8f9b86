use ash::vk;
use crate::error::Error;
use crate::scene::{Mesh, TypedArray};

#[test]
fn test_new_rejects_float_indices() {
    let result = Mesh::new("bad", vec![0.0f32, 1.0, 2.0]);
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

#[test]
fn test_u16_indices() {
    let mesh = Mesh::new("quad", vec![0u16, 1, 2, 2, 3, 0]).unwrap();
    assert_eq!(mesh.index_count(), 6);
    assert_eq!(mesh.index_type(), vk::IndexType::UINT16);
    assert_eq!(mesh.indices().byte_len(), 12);
}

#[test]
fn test_attributes_keep_insertion_order_and_replace() {
    let mesh = Mesh::new("tri", vec![0u32, 1, 2])
        .unwrap()
        .with_attribute("POSITION", vec![0.0f32; 9])
        .with_attribute("NORMAL", vec![0.0f32; 9])
        .with_attribute("POSITION", vec![1.0f32; 9]);

    let names: Vec<&str> = mesh.attributes().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["POSITION", "NORMAL"]);
    assert_eq!(mesh.attribute("POSITION"), Some(&TypedArray::F32(vec![1.0; 9])));
    assert!(mesh.attribute("TEXCOORD_0").is_none());
}

#[test]
fn test_from_raw_decodes_indices() {
    let bytes: Vec<u8> = [3u16, 4, 5].iter().flat_map(|i| i.to_ne_bytes()).collect();
    let mesh = Mesh::from_raw(
        "decoded",
        vk::IndexType::UINT16,
        3,
        &bytes,
        vec![("POSITION".to_string(), vec![0u8; 36])],
    )
    .unwrap();

    assert_eq!(mesh.indices(), &TypedArray::U16(vec![3, 4, 5]));
    assert_eq!(mesh.attribute("POSITION").unwrap().byte_len(), 36);
}

#[test]
fn test_from_raw_rejects_short_buffer() {
    let result = Mesh::from_raw("short", vk::IndexType::UINT32, 4, &[0u8; 8], Vec::new());
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

#[test]
fn test_glam_vectors_flatten_to_f32() {
    let data = TypedArray::from(vec![glam::Vec3::new(1.0, 2.0, 3.0), glam::Vec3::ZERO]);
    assert_eq!(data.len(), 6);
    assert_eq!(data.byte_len(), 24);
}
