/// Sampler - named sampling parameters

use crate::device::SamplerDesc;

#[derive(Debug, Clone, PartialEq)]
pub struct Sampler {
    pub name: String,
    pub desc: SamplerDesc,
}

impl Sampler {
    /// Linear filtering, repeat addressing
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), desc: SamplerDesc::default() }
    }

    pub fn from_desc(name: &str, desc: SamplerDesc) -> Self {
        Self { name: name.to_string(), desc }
    }
}
