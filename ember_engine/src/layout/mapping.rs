/// Shader mapping file
///
/// A JSON document shipped next to the SPIR-V modules describing the
/// descriptor sets, uniforms, specialization constants and vertex inputs a
/// shader expects. Raw Vulkan enum values are stored as integers.
///
/// ```json
/// {
///   "sets": [{"id": 0, "scope": 0}],
///   "uniforms": [
///     {"name": "view", "set": 0, "binding": 0, "type": 6, "stage": 1, "count": 1,
///      "fields": [{"name": "mvp", "type": 2, "count": 1}]}
///   ],
///   "bindings": [{"binding": 0, "stride": 12, "name": "POSITION"}],
///   "attributes": [{"name": "POSITION", "binding": 0, "location": 0, "format": 106, "offset": 0}]
/// }
/// ```

use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShaderMapping {
    #[serde(default)]
    pub sets: Vec<SetMapping>,
    #[serde(default)]
    pub uniforms: Vec<UniformMapping>,
    #[serde(default)]
    pub constants: Vec<ConstantMapping>,
    #[serde(default)]
    pub bindings: Vec<VertexBindingMapping>,
    #[serde(default)]
    pub attributes: Vec<AttributeMapping>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetMapping {
    pub id: u32,
    /// 0 = global, 1 = local, 2 = engine animation
    pub scope: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniformMapping {
    pub name: String,
    pub set: u32,
    pub binding: u32,
    /// Raw `VkDescriptorType`
    #[serde(rename = "type")]
    pub descriptor_type: i32,
    /// Raw `VkShaderStageFlags`
    pub stage: u32,
    #[serde(default = "one")]
    pub count: u32,
    #[serde(default)]
    pub fields: Vec<FieldMapping>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub name: String,
    /// `UniformMemberType` id
    #[serde(rename = "type")]
    pub member_type: u32,
    #[serde(default = "one")]
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantMapping {
    pub name: String,
    pub id: u32,
    /// Raw `VkShaderStageFlags` of the stage that consumes the constant
    pub stage: u32,
    #[serde(rename = "type")]
    pub member_type: u32,
    #[serde(default)]
    pub default_value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexBindingMapping {
    pub binding: u32,
    pub stride: u32,
    /// Mesh attribute feeding this binding
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeMapping {
    pub name: String,
    pub binding: u32,
    pub location: u32,
    /// Raw `VkFormat`
    pub format: i32,
    #[serde(default)]
    pub offset: u32,
}

impl ShaderMapping {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::InvalidMapping(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidMapping(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn set(&self, id: u32) -> Option<&SetMapping> {
        self.sets.iter().find(|s| s.id == id)
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformMapping> {
        self.uniforms.iter().find(|u| u.name == name)
    }
}

#[cfg(test)]
#[path = "mapping_tests.rs"]
mod tests;
