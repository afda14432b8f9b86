/// Mesh - index data plus named vertex attributes
///
/// Attributes keep their insertion order. Which attributes are bound, and in
/// which order, is decided by the shader's vertex bindings at compile time.

use ash::vk;
use crate::error::{Error, Result};
use crate::scene::TypedArray;

#[derive(Debug, Clone)]
pub struct Mesh {
    pub name: String,
    indices: TypedArray,
    attributes: Vec<(String, TypedArray)>,
}

impl Mesh {
    /// Create a mesh from an index array (`u16` or `u32`)
    pub fn new(name: &str, indices: impl Into<TypedArray>) -> Result<Self> {
        let indices = indices.into();
        if indices.index_type().is_none() {
            return Err(Error::InvalidResource(format!(
                "Mesh '{}': indices must be u16 or u32", name
            )));
        }
        Ok(Self { name: name.to_string(), indices, attributes: Vec::new() })
    }

    /// Create a mesh from decoded asset bytes
    ///
    /// `index_type` and `index_count` describe `index_bytes`; every attribute
    /// is taken as an opaque byte view.
    pub fn from_raw(
        name: &str,
        index_type: vk::IndexType,
        index_count: u32,
        index_bytes: &[u8],
        attributes: Vec<(String, Vec<u8>)>,
    ) -> Result<Self> {
        let width = match index_type {
            vk::IndexType::UINT16 => 2,
            vk::IndexType::UINT32 => 4,
            other => return Err(Error::InvalidResource(format!(
                "Mesh '{}': unsupported index type {:?}", name, other
            ))),
        };
        let expected = index_count as usize * width;
        if index_bytes.len() < expected {
            return Err(Error::InvalidResource(format!(
                "Mesh '{}': {} indices need {} bytes, got {}", name, index_count, expected, index_bytes.len()
            )));
        }

        let index_bytes = &index_bytes[..expected];
        let indices = if width == 2 {
            TypedArray::U16(index_bytes.chunks_exact(2).map(|c| u16::from_ne_bytes([c[0], c[1]])).collect())
        } else {
            TypedArray::U32(index_bytes.chunks_exact(4).map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]])).collect())
        };

        Ok(Self {
            name: name.to_string(),
            indices,
            attributes: attributes.into_iter().map(|(n, b)| (n, TypedArray::Bytes(b))).collect(),
        })
    }

    /// Add (or replace) a named attribute
    pub fn with_attribute(mut self, name: &str, data: impl Into<TypedArray>) -> Self {
        let data = data.into();
        match self.attributes.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = data,
            None => self.attributes.push((name.to_string(), data)),
        }
        self
    }

    pub fn indices(&self) -> &TypedArray {
        &self.indices
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn index_type(&self) -> vk::IndexType {
        self.indices.index_type().unwrap_or(vk::IndexType::UINT32)
    }

    pub fn attribute(&self, name: &str) -> Option<&TypedArray> {
        self.attributes.iter().find(|(n, _)| n == name).map(|(_, a)| a)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &TypedArray)> {
        self.attributes.iter().map(|(n, a)| (n.as_str(), a))
    }
}

#[cfg(test)]
#[path = "mesh_tests.rs"]
mod tests;
