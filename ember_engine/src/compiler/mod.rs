/// Compiler module - turns a `Scene` into device resources ready to draw

pub mod staging;
pub mod data_shader;
pub mod data_mesh;
pub mod data_image;
pub mod data_scene;
#[cfg(test)]
pub(crate) mod test_fixtures;

pub use staging::{StagingLayout, MeshSlot, ImageSlot};
pub use data_shader::{DataShader, DataCompute};
pub use data_mesh::DataMesh;
pub use data_image::{DataImage, DataSampler};
pub use data_scene::{
    DataScene, DataGameObject, ShaderGroup, UniformOwner, FrameStats, FrameTarget, ComputeDispatch,
};
