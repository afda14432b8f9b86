/// Staging buffer layout
///
/// All mesh and image bytes of a scene go through one host-visible staging
/// buffer. Mesh data comes first, chunk by chunk (index data then each
/// attribute, 4-byte aligned). Image data starts at the next 256-byte
/// boundary, one slot per image rounded up to 16 bytes.
///
/// The mesh region is copied verbatim into the device-local mesh buffer, so
/// the offsets computed here are also the bind offsets used when drawing.

use crate::scene::{Image, Mesh};

pub const MESH_CHUNK_ALIGNMENT: u64 = 4;
pub const IMAGE_REGION_ALIGNMENT: u64 = 256;
pub const IMAGE_SLOT_ALIGNMENT: u64 = 16;

pub fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshSlot {
    pub index_offset: u64,
    pub index_size: u64,
    /// (attribute name, offset, size) in mesh attribute order
    pub attributes: Vec<(String, u64, u64)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSlot {
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingLayout {
    pub meshes: Vec<MeshSlot>,
    /// Bytes used by the mesh region (copied to the mesh buffer)
    pub mesh_size: u64,
    pub image_base: u64,
    pub images: Vec<ImageSlot>,
    pub total: u64,
}

impl StagingLayout {
    pub fn plan(meshes: &[Mesh], images: &[Image]) -> Self {
        let mut cursor = 0u64;
        let mut mesh_slots = Vec::with_capacity(meshes.len());

        for mesh in meshes {
            let index_offset = align_up(cursor, MESH_CHUNK_ALIGNMENT);
            let index_size = mesh.indices().byte_len();
            cursor = index_offset + index_size;

            let mut attributes = Vec::new();
            for (name, data) in mesh.attributes() {
                let offset = align_up(cursor, MESH_CHUNK_ALIGNMENT);
                attributes.push((name.to_string(), offset, data.byte_len()));
                cursor = offset + data.byte_len();
            }
            mesh_slots.push(MeshSlot { index_offset, index_size, attributes });
        }

        let mesh_size = cursor;
        let image_base = if images.is_empty() { mesh_size } else { align_up(mesh_size, IMAGE_REGION_ALIGNMENT) };

        let mut cursor = image_base;
        let mut image_slots = Vec::with_capacity(images.len());
        for image in images {
            let size = align_up(image.source.data.len() as u64, IMAGE_SLOT_ALIGNMENT);
            image_slots.push(ImageSlot { offset: cursor, size });
            cursor += size;
        }

        Self {
            meshes: mesh_slots,
            mesh_size,
            image_base,
            images: image_slots,
            total: cursor,
        }
    }
}

#[cfg(test)]
#[path = "staging_tests.rs"]
mod tests;
