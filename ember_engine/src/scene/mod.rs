//! Scene model
//!
//! Everything the application builds and mutates: shaders, computes, meshes,
//! images, samplers and game objects, plus the change-tracking uniform
//! stores the scene compiler flushes every frame.

mod typed_array;
mod mesh;
mod image;
mod sampler;
mod shader;
mod game_object;
mod uniforms;
mod scene;

pub use typed_array::TypedArray;
pub use mesh::Mesh;
pub use image::{Image, ImageSource, ImageKind, ImageTarget, MipRegion, ViewDesc, DEFAULT_VIEW};
pub use sampler::Sampler;
pub use shader::{Shader, Compute};
pub use game_object::GameObject;
pub use uniforms::{Uniforms, UniformValue, ImageBinding};
pub use scene::{
    Scene, InitializedHook, ProgramId,
    ShaderId, ComputeId, MeshId, ImageId, SamplerId, ObjectId,
};
