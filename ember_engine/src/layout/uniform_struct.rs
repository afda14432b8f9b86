/// Packed uniform buffer structs
///
/// A `UniformStruct` is the byte layout of one buffer-backed uniform:
/// - fields are placed back to back in declaration order (no per-field alignment)
/// - every element is a 4-byte float or int (bools are ints)
/// - the total is padded up to the device's minimum uniform buffer offset
///   alignment, so consecutive structs in one buffer stay bindable
///
/// Field values travel as `FieldValue` and are converted to the field's
/// scalar kind when packed.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::layout::FieldMapping;
use crate::engine_warn;

// ===== MEMBER TYPES =====

/// Field type ids used in shader mapping files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformMemberType {
    FloatMat2,
    FloatMat3,
    FloatMat4,
    FloatVec2,
    FloatVec3,
    FloatVec4,
    IntMat2,
    IntMat3,
    IntMat4,
    IntVec2,
    IntVec3,
    IntVec4,
    Float,
    Int,
    Bool,
}

/// Element representation on the GPU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Float,
    Int,
}

impl UniformMemberType {
    pub fn from_id(id: u32) -> Option<Self> {
        use UniformMemberType::*;
        let ty = match id {
            0 => FloatMat2,
            1 => FloatMat3,
            2 => FloatMat4,
            3 => FloatVec2,
            4 => FloatVec3,
            5 => FloatVec4,
            6 => IntMat2,
            7 => IntMat3,
            8 => IntMat4,
            9 => IntVec2,
            10 => IntVec3,
            11 => IntVec4,
            12 => Float,
            13 => Int,
            14 => Bool,
            _ => return None,
        };
        Some(ty)
    }

    pub fn scalar(&self) -> ScalarKind {
        use UniformMemberType::*;
        match self {
            FloatMat2 | FloatMat3 | FloatMat4 | FloatVec2 | FloatVec3 | FloatVec4 | Float => ScalarKind::Float,
            _ => ScalarKind::Int,
        }
    }

    /// Elements per instance of the type
    pub fn components(&self) -> u32 {
        use UniformMemberType::*;
        match self {
            FloatMat2 | IntMat2 | FloatVec4 | IntVec4 => 4,
            FloatMat3 | IntMat3 => 9,
            FloatMat4 | IntMat4 => 16,
            FloatVec2 | IntVec2 => 2,
            FloatVec3 | IntVec3 => 3,
            Float | Int | Bool => 1,
        }
    }
}

/// Width of every element (c_float / c_int32)
pub const ELEMENT_SIZE: u64 = 4;

// ===== FIELD VALUES =====

/// Value of one struct field, as written by the application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(Vec<i32>),
    Float(Vec<f32>),
}

impl FieldValue {
    pub fn len(&self) -> usize {
        match self {
            FieldValue::Int(v) => v.len(),
            FieldValue::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Native-endian bytes in the requested representation
    pub fn to_bytes(&self, kind: ScalarKind) -> Vec<u8> {
        match (self, kind) {
            (FieldValue::Float(v), ScalarKind::Float) => bytemuck::cast_slice(v).to_vec(),
            (FieldValue::Int(v), ScalarKind::Int) => bytemuck::cast_slice(v).to_vec(),
            (FieldValue::Float(v), ScalarKind::Int) => {
                let ints: Vec<i32> = v.iter().map(|&x| x as i32).collect();
                bytemuck::cast_slice(&ints).to_vec()
            }
            (FieldValue::Int(v), ScalarKind::Float) => {
                let floats: Vec<f32> = v.iter().map(|&x| x as f32).collect();
                bytemuck::cast_slice(&floats).to_vec()
            }
        }
    }

    /// Decode `bytes` as `kind` elements
    pub fn from_bytes(bytes: &[u8], kind: ScalarKind) -> Self {
        let words = bytes.chunks_exact(4).map(|c| [c[0], c[1], c[2], c[3]]);
        match kind {
            ScalarKind::Float => FieldValue::Float(words.map(f32::from_ne_bytes).collect()),
            ScalarKind::Int => FieldValue::Int(words.map(i32::from_ne_bytes).collect()),
        }
    }

    /// Build a value from JSON (number, bool or array of them)
    pub fn from_json(value: &serde_json::Value, kind: ScalarKind) -> Option<Self> {
        let items: Vec<&serde_json::Value> = match value {
            serde_json::Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        match kind {
            ScalarKind::Float => items.iter()
                .map(|v| v.as_f64().map(|x| x as f32))
                .collect::<Option<Vec<f32>>>()
                .map(FieldValue::Float),
            ScalarKind::Int => items.iter()
                .map(|v| v.as_i64().map(|x| x as i32).or_else(|| v.as_bool().map(i32::from)))
                .collect::<Option<Vec<i32>>>()
                .map(FieldValue::Int),
        }
    }
}

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self { FieldValue::Float(vec![v]) }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self { FieldValue::Int(vec![v]) }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self { FieldValue::Int(vec![i32::from(v)]) }
}

impl<const N: usize> From<[f32; N]> for FieldValue {
    fn from(v: [f32; N]) -> Self { FieldValue::Float(v.to_vec()) }
}

impl<const N: usize> From<[i32; N]> for FieldValue {
    fn from(v: [i32; N]) -> Self { FieldValue::Int(v.to_vec()) }
}

impl From<Vec<f32>> for FieldValue {
    fn from(v: Vec<f32>) -> Self { FieldValue::Float(v) }
}

impl From<Vec<i32>> for FieldValue {
    fn from(v: Vec<i32>) -> Self { FieldValue::Int(v) }
}

impl From<glam::Vec2> for FieldValue {
    fn from(v: glam::Vec2) -> Self { FieldValue::Float(v.to_array().to_vec()) }
}

impl From<glam::Vec3> for FieldValue {
    fn from(v: glam::Vec3) -> Self { FieldValue::Float(v.to_array().to_vec()) }
}

impl From<glam::Vec4> for FieldValue {
    fn from(v: glam::Vec4) -> Self { FieldValue::Float(v.to_array().to_vec()) }
}

impl From<glam::IVec4> for FieldValue {
    fn from(v: glam::IVec4) -> Self { FieldValue::Int(v.to_array().to_vec()) }
}

impl From<glam::Mat3> for FieldValue {
    fn from(m: glam::Mat3) -> Self { FieldValue::Float(m.to_cols_array().to_vec()) }
}

impl From<glam::Mat4> for FieldValue {
    fn from(m: glam::Mat4) -> Self { FieldValue::Float(m.to_cols_array().to_vec()) }
}

// ===== STRUCT LAYOUT =====

/// One field of a packed struct
#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub name: String,
    pub member_type: UniformMemberType,
    pub count: u32,
    pub offset: u64,
    pub size: u64,
}

impl StructField {
    pub fn elements(&self) -> usize {
        (self.member_type.components() * self.count) as usize
    }
}

/// Byte layout of a buffer-backed uniform
#[derive(Debug, Clone, PartialEq)]
pub struct UniformStruct {
    name: String,
    fields: Vec<StructField>,
    size: u64,
    padding: u64,
}

impl UniformStruct {
    /// Lay out `fields` and pad the total to `alignment`
    ///
    /// # Errors
    ///
    /// `InvalidMapping` for an unknown member type, a duplicate field name or
    /// an alignment that is not a power of two.
    pub fn build(name: &str, fields: &[FieldMapping], alignment: u64) -> Result<Self> {
        if !alignment.is_power_of_two() {
            return Err(Error::InvalidMapping(format!(
                "Uniform buffer alignment {} is not a power of two", alignment
            )));
        }

        let mut laid_out: Vec<StructField> = Vec::with_capacity(fields.len());
        let mut offset: u64 = 0;
        for field in fields {
            let member_type = UniformMemberType::from_id(field.member_type).ok_or_else(|| {
                Error::InvalidMapping(format!(
                    "Field '{}' of uniform '{}' has unknown type {}", field.name, name, field.member_type
                ))
            })?;
            if laid_out.iter().any(|f| f.name == field.name) {
                return Err(Error::InvalidMapping(format!(
                    "Duplicate field '{}' in uniform '{}'", field.name, name
                )));
            }
            let size = member_type.components() as u64 * field.count as u64 * ELEMENT_SIZE;
            laid_out.push(StructField {
                name: field.name.clone(),
                member_type,
                count: field.count,
                offset,
                size,
            });
            offset += size;
        }

        let padding = offset.wrapping_neg() & (alignment - 1);
        Ok(Self {
            name: name.to_string(),
            fields: laid_out,
            size: offset + padding,
            padding,
        })
    }

    // ===== ACCESSORS =====

    pub fn name(&self) -> &str { &self.name }

    /// Total size in bytes, padding included
    pub fn size(&self) -> u64 { self.size }

    pub fn padding(&self) -> u64 { self.padding }

    pub fn fields(&self) -> &[StructField] { &self.fields }

    pub fn field(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|f| f.name == name)
    }

    // ===== PACKING =====

    /// Serialize field values into a zero-initialized struct image
    ///
    /// Fields without a value stay zero. Values for unknown fields are ignored
    /// with a warning.
    pub fn pack(&self, values: &BTreeMap<String, FieldValue>) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; self.size as usize];

        for (field_name, value) in values {
            let Some(field) = self.field(field_name) else {
                engine_warn!("ember::UniformStruct",
                    "Unknown field '{}' in uniform '{}'", field_name, self.name);
                continue;
            };
            if value.len() != field.elements() {
                return Err(Error::InvalidResource(format!(
                    "Field '{}' of uniform '{}' expects {} value(s), got {}",
                    field.name, self.name, field.elements(), value.len()
                )));
            }
            let start = field.offset as usize;
            let data = value.to_bytes(field.member_type.scalar());
            bytes[start..start + data.len()].copy_from_slice(&data);
        }

        Ok(bytes)
    }

    /// Decode one field out of a packed struct image
    pub fn unpack_field(&self, bytes: &[u8], name: &str) -> Option<FieldValue> {
        let field = self.field(name)?;
        let start = field.offset as usize;
        let end = start + field.size as usize;
        let slice = bytes.get(start..end)?;
        Some(FieldValue::from_bytes(slice, field.member_type.scalar()))
    }
}

#[cfg(test)]
#[path = "uniform_struct_tests.rs"]
mod tests;
