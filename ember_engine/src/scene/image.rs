/// Image - decoded texel data plus the views shaders sample through
///
/// An image is uploaded once at scene setup. Its texels arrive as one
/// contiguous byte array and a region table naming which mip level, array
/// layer and cube face each byte range belongs to.

use ash::vk;
use crate::error::{Error, Result};

/// Shape of the image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Image2D,
    /// 2D array, `layers` deep
    Array,
    /// Six faces per layer; a face is addressed as an array layer
    Cube,
}

/// One mip/layer/face slice of the source bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipRegion {
    pub level: u32,
    pub layer: u32,
    pub face: u32,
    pub offset: u64,
    pub size: u64,
    pub width: u32,
    pub height: u32,
}

/// Decoded image as produced by an asset loader
#[derive(Debug, Clone)]
pub struct ImageSource {
    pub format: vk::Format,
    pub width: u32,
    pub height: u32,
    pub kind: ImageKind,
    pub mip_levels: u32,
    pub layers: u32,
    pub regions: Vec<MipRegion>,
    pub data: Vec<u8>,
}

impl ImageSource {
    /// Single-level 2D image covering all of `data`
    pub fn image_2d(format: vk::Format, width: u32, height: u32, data: Vec<u8>) -> Self {
        let region = MipRegion {
            level: 0,
            layer: 0,
            face: 0,
            offset: 0,
            size: data.len() as u64,
            width,
            height,
        };
        Self {
            format,
            width,
            height,
            kind: ImageKind::Image2D,
            mip_levels: 1,
            layers: 1,
            regions: vec![region],
            data,
        }
    }
}

/// Layout/access the image is left in after upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageTarget {
    ShaderRead,
    General,
    TransferSrc,
    TransferDst,
}

impl ImageTarget {
    pub fn layout(&self) -> vk::ImageLayout {
        match self {
            ImageTarget::ShaderRead => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ImageTarget::General => vk::ImageLayout::GENERAL,
            ImageTarget::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            ImageTarget::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        }
    }

    pub fn access(&self) -> vk::AccessFlags {
        match self {
            ImageTarget::ShaderRead => vk::AccessFlags::SHADER_READ,
            ImageTarget::General => vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
            ImageTarget::TransferSrc => vk::AccessFlags::TRANSFER_READ,
            ImageTarget::TransferDst => vk::AccessFlags::TRANSFER_WRITE,
        }
    }
}

/// Named view parameters; `None` means "same as the image"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewDesc {
    pub view_type: Option<vk::ImageViewType>,
    pub format: Option<vk::Format>,
    pub base_mip: u32,
    pub mip_count: Option<u32>,
    pub base_layer: u32,
    pub layer_count: Option<u32>,
}

impl Default for ViewDesc {
    fn default() -> Self {
        Self {
            view_type: None,
            format: None,
            base_mip: 0,
            mip_count: None,
            base_layer: 0,
            layer_count: None,
        }
    }
}

pub const DEFAULT_VIEW: &str = "default";

#[derive(Debug, Clone)]
pub struct Image {
    pub name: String,
    pub source: ImageSource,
    pub target: ImageTarget,
    views: Vec<(String, ViewDesc)>,
}

impl Image {
    /// Image with a single `"default"` view over every level and layer
    pub fn new(name: &str, source: ImageSource) -> Self {
        Self {
            name: name.to_string(),
            source,
            target: ImageTarget::ShaderRead,
            views: vec![(DEFAULT_VIEW.to_string(), ViewDesc::default())],
        }
    }

    pub fn with_target(mut self, target: ImageTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_view(mut self, name: &str, desc: ViewDesc) -> Self {
        match self.views.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = desc,
            None => self.views.push((name.to_string(), desc)),
        }
        self
    }

    pub fn views(&self) -> impl Iterator<Item = (&str, &ViewDesc)> {
        self.views.iter().map(|(n, d)| (n.as_str(), d))
    }

    fn faces(&self) -> u32 {
        if self.source.kind == ImageKind::Cube { 6 } else { 1 }
    }

    /// Array layers of the device image (faces included)
    pub fn array_layers(&self) -> u32 {
        self.source.layers.max(1) * self.faces()
    }

    /// Device array layer of a region
    pub fn region_layer(&self, region: &MipRegion) -> u32 {
        region.layer * self.faces() + region.face
    }

    pub fn create_flags(&self) -> vk::ImageCreateFlags {
        match self.source.kind {
            ImageKind::Cube => vk::ImageCreateFlags::CUBE_COMPATIBLE,
            _ => vk::ImageCreateFlags::empty(),
        }
    }

    pub fn default_view_type(&self) -> vk::ImageViewType {
        match self.source.kind {
            ImageKind::Image2D => vk::ImageViewType::TYPE_2D,
            ImageKind::Array => vk::ImageViewType::TYPE_2D_ARRAY,
            ImageKind::Cube if self.source.layers > 1 => vk::ImageViewType::CUBE_ARRAY,
            ImageKind::Cube => vk::ImageViewType::CUBE,
        }
    }

    /// Check the region table against the image shape and the byte array
    pub fn validate(&self) -> Result<()> {
        let src = &self.source;
        if src.width == 0 || src.height == 0 || src.mip_levels == 0 {
            return Err(Error::InvalidResource(format!(
                "Image '{}' has an empty extent or no mip levels", self.name
            )));
        }
        for region in &src.regions {
            let end = region.offset.checked_add(region.size);
            if end.map_or(true, |end| end > src.data.len() as u64) {
                return Err(Error::InvalidResource(format!(
                    "Image '{}': region at offset {} ({} bytes) exceeds the {} source bytes",
                    self.name, region.offset, region.size, src.data.len()
                )));
            }
            if region.level >= src.mip_levels
                || region.layer >= src.layers.max(1)
                || region.face >= self.faces()
            {
                return Err(Error::InvalidResource(format!(
                    "Image '{}': region (level {}, layer {}, face {}) is outside the image",
                    self.name, region.level, region.layer, region.face
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "image_tests.rs"]
mod tests;
