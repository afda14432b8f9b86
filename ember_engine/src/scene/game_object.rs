/// GameObject - a mesh drawn with a shader and its own uniform values

use crate::scene::{MeshId, ShaderId, Uniforms};

#[derive(Debug, Clone)]
pub struct GameObject {
    pub name: String,
    pub shader: ShaderId,
    pub mesh: MeshId,
    /// Hidden objects keep their descriptor sets but are not drawn
    pub visible: bool,
    pub uniforms: Uniforms,
}

impl GameObject {
    pub fn new(name: &str, shader: ShaderId, mesh: MeshId) -> Self {
        Self {
            name: name.to_string(),
            shader,
            mesh,
            visible: true,
            uniforms: Uniforms::new(),
        }
    }
}
