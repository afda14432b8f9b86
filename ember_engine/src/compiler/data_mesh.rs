/// DataMesh - where a mesh lives inside the scene's mesh buffer

use ash::vk;
use crate::compiler::staging::MeshSlot;
use crate::scene::Mesh;

#[derive(Debug, Clone)]
pub struct DataMesh {
    pub name: String,
    pub index_offset: u64,
    pub index_count: u32,
    pub index_type: vk::IndexType,
    attribute_offsets: Vec<(String, u64)>,
}

impl DataMesh {
    pub fn new(mesh: &Mesh, slot: &MeshSlot) -> Self {
        Self {
            name: mesh.name.clone(),
            index_offset: slot.index_offset,
            index_count: mesh.index_count(),
            index_type: mesh.index_type(),
            attribute_offsets: slot.attributes.iter().map(|(n, offset, _)| (n.clone(), *offset)).collect(),
        }
    }

    pub fn attribute_offset(&self, name: &str) -> Option<u64> {
        self.attribute_offsets.iter().find(|(n, _)| n == name).map(|(_, o)| *o)
    }
}
