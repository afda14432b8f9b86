/// Typed arrays for mesh data
///
/// Index buffers are `u16` or `u32`; vertex attributes are usually `f32` but
/// raw bytes from an asset decoder are accepted as-is.

use ash::vk;

#[derive(Debug, Clone, PartialEq)]
pub enum TypedArray {
    U16(Vec<u16>),
    U32(Vec<u32>),
    F32(Vec<f32>),
    Bytes(Vec<u8>),
}

impl TypedArray {
    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            TypedArray::U16(v) => v.len(),
            TypedArray::U32(v) => v.len(),
            TypedArray::F32(v) => v.len(),
            TypedArray::Bytes(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            TypedArray::U16(v) => bytemuck::cast_slice(v),
            TypedArray::U32(v) => bytemuck::cast_slice(v),
            TypedArray::F32(v) => bytemuck::cast_slice(v),
            TypedArray::Bytes(v) => v,
        }
    }

    pub fn byte_len(&self) -> u64 {
        self.as_bytes().len() as u64
    }

    /// Index type when the array can feed an index buffer
    pub fn index_type(&self) -> Option<vk::IndexType> {
        match self {
            TypedArray::U16(_) => Some(vk::IndexType::UINT16),
            TypedArray::U32(_) => Some(vk::IndexType::UINT32),
            _ => None,
        }
    }
}

impl From<Vec<u16>> for TypedArray {
    fn from(v: Vec<u16>) -> Self { TypedArray::U16(v) }
}

impl From<Vec<u32>> for TypedArray {
    fn from(v: Vec<u32>) -> Self { TypedArray::U32(v) }
}

impl From<Vec<f32>> for TypedArray {
    fn from(v: Vec<f32>) -> Self { TypedArray::F32(v) }
}

impl From<Vec<glam::Vec3>> for TypedArray {
    fn from(v: Vec<glam::Vec3>) -> Self {
        TypedArray::F32(bytemuck::cast_slice(&v).to_vec())
    }
}

impl From<Vec<glam::Vec2>> for TypedArray {
    fn from(v: Vec<glam::Vec2>) -> Self {
        TypedArray::F32(bytemuck::cast_slice(&v).to_vec())
    }
}
