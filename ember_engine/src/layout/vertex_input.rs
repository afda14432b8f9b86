/// Vertex input state of a graphics shader
///
/// One vertex buffer binding per mesh attribute. Bindings are sorted by
/// index and must be contiguous from 0 so that a mesh's attribute buffers
/// can be bound in a single call.

use ash::vk;
use crate::error::{Error, Result};
use crate::layout::ShaderMapping;

#[derive(Debug, Clone, Default)]
pub struct VertexInput {
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
    /// Mesh attribute name feeding each binding, in binding order
    pub attribute_names: Vec<String>,
}

impl VertexInput {
    pub fn from_mapping(owner: &str, mapping: &ShaderMapping) -> Result<Self> {
        let mut declared: Vec<_> = mapping.bindings.iter().collect();
        declared.sort_by_key(|b| b.binding);

        for (expected, binding) in declared.iter().enumerate() {
            if binding.binding != expected as u32 {
                return Err(Error::InvalidMapping(format!(
                    "'{}' vertex bindings must be contiguous from 0 (found {} at position {})",
                    owner, binding.binding, expected
                )));
            }
        }

        let bindings = declared
            .iter()
            .map(|b| vk::VertexInputBindingDescription {
                binding: b.binding,
                stride: b.stride,
                input_rate: vk::VertexInputRate::VERTEX,
            })
            .collect();

        let attributes = mapping
            .attributes
            .iter()
            .map(|a| vk::VertexInputAttributeDescription {
                location: a.location,
                binding: a.binding,
                format: vk::Format::from_raw(a.format),
                offset: a.offset,
            })
            .collect();

        Ok(Self {
            bindings,
            attributes,
            attribute_names: declared.iter().map(|b| b.name.clone()).collect(),
        })
    }
}
