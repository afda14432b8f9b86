/// Shader and Compute - SPIR-V programs plus their mapping files
///
/// Both carry a `Uniforms` store for values shared by every user of the
/// program (global-scope sets). Per-object values live on the game object.

use std::io::Cursor;
use std::path::Path;
use crate::error::{Error, Result};
use crate::layout::{FieldValue, ShaderMapping, UniformMemberType};
use crate::scene::Uniforms;

fn read_spirv(owner: &str, bytes: &[u8]) -> Result<Vec<u32>> {
    ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| Error::InvalidResource(format!("'{}': invalid SPIR-V: {}", owner, e)))
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| Error::InvalidResource(format!("{}: {}", path.display(), e)))
}

// ===== SHADER =====

#[derive(Debug, Clone)]
pub struct Shader {
    pub name: String,
    pub vert: Vec<u32>,
    pub frag: Vec<u32>,
    pub mapping: ShaderMapping,
    pub uniforms: Uniforms,
}

impl Shader {
    /// Build from SPIR-V bytes
    pub fn new(name: &str, vert: &[u8], frag: &[u8], mapping: ShaderMapping) -> Result<Self> {
        Ok(Self::from_words(name, read_spirv(name, vert)?, read_spirv(name, frag)?, mapping))
    }

    pub fn from_words(name: &str, vert: Vec<u32>, frag: Vec<u32>, mapping: ShaderMapping) -> Self {
        Self {
            name: name.to_string(),
            vert,
            frag,
            mapping,
            uniforms: Uniforms::new(),
        }
    }

    /// Load `<name>.vert.spv`, `<name>.frag.spv` and `<name>.json` from `dir`
    pub fn from_dir(dir: impl AsRef<Path>, name: &str) -> Result<Self> {
        let dir = dir.as_ref();
        let vert = read_file(&dir.join(format!("{}.vert.spv", name)))?;
        let frag = read_file(&dir.join(format!("{}.frag.spv", name)))?;
        let mapping = ShaderMapping::from_file(dir.join(format!("{}.json", name)))?;
        Self::new(name, &vert, &frag, mapping)
    }
}

// ===== COMPUTE =====

#[derive(Debug, Clone)]
pub struct Compute {
    pub name: String,
    pub code: Vec<u32>,
    pub mapping: ShaderMapping,
    /// Named queue to dispatch on; `None` runs on the render queue
    pub queue: Option<String>,
    pub uniforms: Uniforms,
}

impl Compute {
    pub fn new(name: &str, code: &[u8], mapping: ShaderMapping) -> Result<Self> {
        Ok(Self::from_words(name, read_spirv(name, code)?, mapping))
    }

    pub fn from_words(name: &str, code: Vec<u32>, mapping: ShaderMapping) -> Self {
        Self {
            name: name.to_string(),
            code,
            mapping,
            queue: None,
            uniforms: Uniforms::new(),
        }
    }

    /// Load `<name>.comp.spv` and `<name>.json` from `dir`
    pub fn from_dir(dir: impl AsRef<Path>, name: &str) -> Result<Self> {
        let dir = dir.as_ref();
        let code = read_file(&dir.join(format!("{}.comp.spv", name)))?;
        let mapping = ShaderMapping::from_file(dir.join(format!("{}.json", name)))?;
        Self::new(name, &code, mapping)
    }

    pub fn with_queue(mut self, queue: &str) -> Self {
        self.queue = Some(queue.to_string());
        self
    }

    /// Override the value a specialization constant is compiled with
    ///
    /// Only takes effect for scenes loaded afterwards.
    pub fn set_constant(&mut self, name: &str, value: serde_json::Value) -> Result<()> {
        let constant = self.mapping.constants
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::InvalidResource(format!(
                "Compute '{}' has no constant '{}'", self.name, name
            )))?;

        let member_type = UniformMemberType::from_id(constant.member_type).ok_or_else(|| {
            Error::InvalidMapping(format!("Constant '{}' has unknown type {}", name, constant.member_type))
        })?;
        let fits = FieldValue::from_json(&value, member_type.scalar())
            .is_some_and(|v| v.len() == member_type.components() as usize);
        if !fits {
            return Err(Error::InvalidResource(format!(
                "Compute '{}': {} does not fit constant '{}' ({:?})", self.name, value, name, member_type
            )));
        }

        constant.default_value = Some(value);
        Ok(())
    }
}

#[cfg(test)]
#[path = "shader_tests.rs"]
mod tests;
