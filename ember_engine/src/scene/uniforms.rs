/// Uniforms - change-tracking uniform value store
///
/// Each shader, compute and game object owns one `Uniforms`. Values are keyed
/// by uniform name: buffer uniforms hold per-field values, image uniforms hold
/// an image/view/sampler binding.
///
/// Once the scene compiler has registered the names a shader declares
/// (`track`), every write to one of those names is recorded in a dirty set
/// until the next flush, whether or not the value actually changed.

use std::collections::{BTreeMap, BTreeSet};
use crate::layout::FieldValue;
use crate::scene::{ImageId, SamplerId};
use crate::engine_warn;

/// What an image uniform points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageBinding {
    CombinedImageSampler {
        image: ImageId,
        view: String,
        sampler: SamplerId,
    },
    Storage {
        image: ImageId,
        view: String,
    },
}

impl ImageBinding {
    pub fn image(&self) -> ImageId {
        match self {
            ImageBinding::CombinedImageSampler { image, .. } => *image,
            ImageBinding::Storage { image, .. } => *image,
        }
    }

    pub fn view(&self) -> &str {
        match self {
            ImageBinding::CombinedImageSampler { view, .. } => view,
            ImageBinding::Storage { view, .. } => view,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    /// Field name -> value of a buffer-backed uniform
    Block(BTreeMap<String, FieldValue>),
    Image(ImageBinding),
}

#[derive(Debug, Clone, Default)]
pub struct Uniforms {
    values: BTreeMap<String, UniformValue>,
    tracking: bool,
    tracked: BTreeSet<String>,
    updated: BTreeSet<String>,
}

impl Uniforms {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== WRITES =====

    /// Set one field of a buffer uniform
    pub fn set_field(&mut self, uniform: &str, field: &str, value: impl Into<FieldValue>) {
        let entry = self.values
            .entry(uniform.to_string())
            .or_insert_with(|| UniformValue::Block(BTreeMap::new()));
        if let UniformValue::Image(_) = entry {
            engine_warn!("ember::Uniforms", "Uniform '{}' was an image binding, replacing it with fields", uniform);
            *entry = UniformValue::Block(BTreeMap::new());
        }
        if let UniformValue::Block(fields) = entry {
            fields.insert(field.to_string(), value.into());
        }
        self.mark(uniform);
    }

    /// Replace every field of a buffer uniform
    pub fn set_block<I, K, V>(&mut self, uniform: &str, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        let fields = fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.values.insert(uniform.to_string(), UniformValue::Block(fields));
        self.mark(uniform);
    }

    /// Point an image uniform at an image view (and sampler)
    pub fn set_image(&mut self, uniform: &str, binding: ImageBinding) {
        self.values.insert(uniform.to_string(), UniformValue::Image(binding));
        self.mark(uniform);
    }

    /// Record a write without changing the value
    pub fn touch(&mut self, uniform: &str) {
        self.mark(uniform);
    }

    fn mark(&mut self, uniform: &str) {
        if self.tracked.contains(uniform) {
            self.updated.insert(uniform.to_string());
        } else if self.tracking {
            engine_warn!("ember::Uniforms",
                "Uniform '{}' is not declared by the shader, the write will never reach the GPU", uniform);
        }
    }

    // ===== READS =====

    pub fn get(&self, uniform: &str) -> Option<&UniformValue> {
        self.values.get(uniform)
    }

    pub fn field(&self, uniform: &str, field: &str) -> Option<&FieldValue> {
        match self.values.get(uniform)? {
            UniformValue::Block(fields) => fields.get(field),
            UniformValue::Image(_) => None,
        }
    }

    pub fn fields(&self, uniform: &str) -> Option<&BTreeMap<String, FieldValue>> {
        match self.values.get(uniform)? {
            UniformValue::Block(fields) => Some(fields),
            UniformValue::Image(_) => None,
        }
    }

    pub fn image(&self, uniform: &str) -> Option<&ImageBinding> {
        match self.values.get(uniform)? {
            UniformValue::Image(binding) => Some(binding),
            UniformValue::Block(_) => None,
        }
    }

    /// Names that currently hold a value
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    // ===== CHANGE TRACKING =====

    /// Start tracking writes to `names`; pending dirty names are discarded
    pub(crate) fn track<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tracking = true;
        self.tracked = names.into_iter().map(Into::into).collect();
        self.updated.clear();
    }

    /// Stop tracking (the owning scene was unloaded)
    pub(crate) fn untrack(&mut self) {
        self.tracking = false;
        self.tracked.clear();
        self.updated.clear();
    }

    pub fn is_tracked(&self, uniform: &str) -> bool {
        self.tracked.contains(uniform)
    }

    /// Names written since the last flush
    pub fn updated(&self) -> impl Iterator<Item = &str> {
        self.updated.iter().map(String::as_str)
    }

    pub fn has_updates(&self) -> bool {
        !self.updated.is_empty()
    }

    pub(crate) fn take_updated(&mut self) -> BTreeSet<String> {
        std::mem::take(&mut self.updated)
    }
}

#[cfg(test)]
#[path = "uniforms_tests.rs"]
mod tests;
