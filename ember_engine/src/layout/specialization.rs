/// Specialization constants
///
/// Constants declared in a mapping are filtered by pipeline stage and packed
/// back to back in declaration order. A constant without a default value is
/// zero-filled.

use ash::vk;
use crate::device::{SpecializationData, SpecializationEntry};
use crate::error::{Error, Result};
use crate::layout::{ConstantMapping, FieldValue, UniformMemberType, ELEMENT_SIZE};

/// Build the specialization data of `stage`, `None` when no constant targets it
pub fn build_specialization(
    stage: vk::ShaderStageFlags,
    constants: &[ConstantMapping],
) -> Result<Option<SpecializationData>> {
    let mut data = SpecializationData::default();

    for constant in constants.iter().filter(|c| c.stage == stage.as_raw()) {
        let member_type = UniformMemberType::from_id(constant.member_type).ok_or_else(|| {
            Error::InvalidMapping(format!(
                "Constant '{}' has unknown type {}", constant.name, constant.member_type
            ))
        })?;
        let elements = member_type.components() as usize;
        let size = elements * ELEMENT_SIZE as usize;

        let bytes = match &constant.default_value {
            None | Some(serde_json::Value::Null) => vec![0u8; size],
            Some(json) => {
                let value = FieldValue::from_json(json, member_type.scalar())
                    .filter(|v| v.len() == elements)
                    .ok_or_else(|| Error::InvalidMapping(format!(
                        "Constant '{}' default {} does not fit {:?}", constant.name, json, member_type
                    )))?;
                value.to_bytes(member_type.scalar())
            }
        };

        data.entries.push(SpecializationEntry {
            constant_id: constant.id,
            offset: data.data.len() as u32,
            size,
        });
        data.data.extend_from_slice(&bytes);
    }

    if data.entries.is_empty() {
        Ok(None)
    } else {
        Ok(Some(data))
    }
}

#[cfg(test)]
#[path = "specialization_tests.rs"]
mod tests;
