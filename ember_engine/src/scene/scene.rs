/// Scene - the application-facing description of what to draw
///
/// Collections are append-only: an item's id is its insertion index and is
/// never reused. Uniform writes go through `update_object`, `update_shader`
/// and `update_compute` so the scene can record which owners have dirty
/// values for the next flush.

use std::collections::BTreeSet;
use std::fmt;
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::scene::{Compute, GameObject, Image, Mesh, Sampler, Shader, Uniforms};

macro_rules! scene_ids {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(pub usize);

            impl $name {
                pub fn index(&self) -> usize { self.0 }
            }
        )*
    };
}

scene_ids!(ShaderId, ComputeId, MeshId, ImageId, SamplerId, ObjectId);

/// A shader or a compute, the owners of global-scope uniforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProgramId {
    Shader(ShaderId),
    Compute(ComputeId),
}

/// Called once after the scene's first successful setup
pub type InitializedHook = Box<dyn FnOnce(&mut Scene) + Send>;

pub struct Scene {
    pub name: String,
    shaders: Vec<Shader>,
    computes: Vec<Compute>,
    meshes: Vec<Mesh>,
    images: Vec<Image>,
    samplers: Vec<Sampler>,
    objects: Vec<GameObject>,
    updated_objects: BTreeSet<ObjectId>,
    updated_programs: BTreeSet<ProgramId>,
    on_initialized: Option<InitializedHook>,
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scene")
            .field("name", &self.name)
            .field("shaders", &self.shaders.len())
            .field("computes", &self.computes.len())
            .field("meshes", &self.meshes.len())
            .field("images", &self.images.len())
            .field("samplers", &self.samplers.len())
            .field("objects", &self.objects.len())
            .finish_non_exhaustive()
    }
}

impl Scene {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            shaders: Vec::new(),
            computes: Vec::new(),
            meshes: Vec::new(),
            images: Vec::new(),
            samplers: Vec::new(),
            objects: Vec::new(),
            updated_objects: BTreeSet::new(),
            updated_programs: BTreeSet::new(),
            on_initialized: None,
        }
    }

    // ===== APPEND =====

    pub fn add_shader(&mut self, shader: Shader) -> ShaderId {
        self.shaders.push(shader);
        ShaderId(self.shaders.len() - 1)
    }

    pub fn add_compute(&mut self, compute: Compute) -> ComputeId {
        self.computes.push(compute);
        ComputeId(self.computes.len() - 1)
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshId {
        self.meshes.push(mesh);
        MeshId(self.meshes.len() - 1)
    }

    pub fn add_image(&mut self, image: Image) -> ImageId {
        self.images.push(image);
        ImageId(self.images.len() - 1)
    }

    pub fn add_sampler(&mut self, sampler: Sampler) -> SamplerId {
        self.samplers.push(sampler);
        SamplerId(self.samplers.len() - 1)
    }

    pub fn add_object(&mut self, object: GameObject) -> ObjectId {
        self.objects.push(object);
        ObjectId(self.objects.len() - 1)
    }

    // ===== ACCESS =====

    pub fn shader(&self, id: ShaderId) -> Option<&Shader> { self.shaders.get(id.0) }
    pub fn shaders(&self) -> &[Shader] { &self.shaders }
    pub fn compute(&self, id: ComputeId) -> Option<&Compute> { self.computes.get(id.0) }
    pub fn computes(&self) -> &[Compute] { &self.computes }
    pub fn mesh(&self, id: MeshId) -> Option<&Mesh> { self.meshes.get(id.0) }
    pub fn meshes(&self) -> &[Mesh] { &self.meshes }
    pub fn image(&self, id: ImageId) -> Option<&Image> { self.images.get(id.0) }
    pub fn images(&self) -> &[Image] { &self.images }
    pub fn sampler(&self, id: SamplerId) -> Option<&Sampler> { self.samplers.get(id.0) }
    pub fn samplers(&self) -> &[Sampler] { &self.samplers }
    pub fn object(&self, id: ObjectId) -> Option<&GameObject> { self.objects.get(id.0) }
    pub fn objects(&self) -> &[GameObject] { &self.objects }

    pub fn find_object(&self, name: &str) -> Option<ObjectId> {
        self.objects.iter().position(|o| o.name == name).map(ObjectId)
    }

    pub fn find_shader(&self, name: &str) -> Option<ShaderId> {
        self.shaders.iter().position(|s| s.name == name).map(ShaderId)
    }

    pub fn find_compute(&self, name: &str) -> Option<ComputeId> {
        self.computes.iter().position(|c| c.name == name).map(ComputeId)
    }

    // ===== UNIFORM WRITES =====

    /// Run `f` on an object's uniforms and record the object if any tracked
    /// name was written
    pub fn update_object<R>(&mut self, id: ObjectId, f: impl FnOnce(&mut Uniforms) -> R) -> Result<R> {
        let object = self.objects.get_mut(id.0).ok_or_else(|| {
            Error::InvalidResource(format!("Object {} does not exist", id.0))
        })?;
        let result = f(&mut object.uniforms);
        if object.uniforms.has_updates() {
            self.updated_objects.insert(id);
        }
        Ok(result)
    }

    pub fn update_shader<R>(&mut self, id: ShaderId, f: impl FnOnce(&mut Uniforms) -> R) -> Result<R> {
        self.update_program(ProgramId::Shader(id), f)
    }

    pub fn update_compute<R>(&mut self, id: ComputeId, f: impl FnOnce(&mut Uniforms) -> R) -> Result<R> {
        self.update_program(ProgramId::Compute(id), f)
    }

    fn update_program<R>(&mut self, id: ProgramId, f: impl FnOnce(&mut Uniforms) -> R) -> Result<R> {
        let uniforms = self.program_uniforms_mut(id).ok_or_else(|| {
            Error::InvalidResource(format!("{:?} does not exist", id))
        })?;
        let result = f(uniforms);
        if uniforms.has_updates() {
            self.updated_programs.insert(id);
        }
        Ok(result)
    }

    pub fn set_visible(&mut self, id: ObjectId, visible: bool) -> Result<()> {
        let object = self.objects.get_mut(id.0).ok_or_else(|| {
            Error::InvalidResource(format!("Object {} does not exist", id.0))
        })?;
        object.visible = visible;
        Ok(())
    }

    /// Override a compute specialization constant (applies on next load)
    pub fn set_compute_constant(&mut self, id: ComputeId, name: &str, value: serde_json::Value) -> Result<()> {
        let compute = self.computes.get_mut(id.0).ok_or_else(|| {
            Error::InvalidResource(format!("Compute {} does not exist", id.0))
        })?;
        compute.set_constant(name, value)
    }

    // ===== DIRTY SETS =====

    pub fn mark_object_updated(&mut self, id: ObjectId) {
        if id.0 < self.objects.len() {
            self.updated_objects.insert(id);
        }
    }

    pub fn mark_program_updated(&mut self, id: ProgramId) {
        if self.program_uniforms(id).is_some() {
            self.updated_programs.insert(id);
        }
    }

    pub fn updated_objects(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.updated_objects.iter().copied()
    }

    pub fn updated_programs(&self) -> impl Iterator<Item = ProgramId> + '_ {
        self.updated_programs.iter().copied()
    }

    pub fn has_updates(&self) -> bool {
        !self.updated_objects.is_empty() || !self.updated_programs.is_empty()
    }

    pub(crate) fn take_updated(&mut self) -> (BTreeSet<ObjectId>, BTreeSet<ProgramId>) {
        (
            std::mem::take(&mut self.updated_objects),
            std::mem::take(&mut self.updated_programs),
        )
    }

    pub(crate) fn program_uniforms(&self, id: ProgramId) -> Option<&Uniforms> {
        match id {
            ProgramId::Shader(s) => self.shaders.get(s.0).map(|s| &s.uniforms),
            ProgramId::Compute(c) => self.computes.get(c.0).map(|c| &c.uniforms),
        }
    }

    pub(crate) fn program_uniforms_mut(&mut self, id: ProgramId) -> Option<&mut Uniforms> {
        match id {
            ProgramId::Shader(s) => self.shaders.get_mut(s.0).map(|s| &mut s.uniforms),
            ProgramId::Compute(c) => self.computes.get_mut(c.0).map(|c| &mut c.uniforms),
        }
    }

    pub(crate) fn object_uniforms_mut(&mut self, id: ObjectId) -> Option<&mut Uniforms> {
        self.objects.get_mut(id.0).map(|o| &mut o.uniforms)
    }

    /// Stop change tracking on every uniform store and drop pending updates
    pub(crate) fn untrack_all(&mut self) {
        for shader in &mut self.shaders {
            shader.uniforms.untrack();
        }
        for compute in &mut self.computes {
            compute.uniforms.untrack();
        }
        for object in &mut self.objects {
            object.uniforms.untrack();
        }
        self.updated_objects.clear();
        self.updated_programs.clear();
    }

    // ===== LIFECYCLE =====

    pub fn on_initialized(&mut self, hook: impl FnOnce(&mut Scene) + Send + 'static) {
        self.on_initialized = Some(Box::new(hook));
    }

    pub(crate) fn take_initialized_hook(&mut self) -> Option<InitializedHook> {
        self.on_initialized.take()
    }
}

#[cfg(test)]
#[path = "scene_tests.rs"]
mod tests;
