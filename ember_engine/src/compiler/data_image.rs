/// DataImage / DataSampler - device images, their views and samplers
///
/// Images of a scene share one device-local allocation. Each image is bound
/// at its own bump-allocated offset; views are created after binding.
/// `layout` and `access` track the state the host last recorded for the
/// image and are updated only after the GPU work that changed them completed.

use ash::vk;
use crate::compiler::staging::align_up;
use crate::device::{BufferDesc, Device, ImageBarrier, ImageDesc, ImageViewDesc};
use crate::error::{Error, Result};
use crate::scene::{Image, ImageTarget, Sampler};

#[derive(Debug)]
pub struct DataImage {
    pub name: String,
    pub handle: vk::Image,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub views: Vec<(String, vk::ImageView)>,
    pub layout: vk::ImageLayout,
    pub access: vk::AccessFlags,
    pub target: ImageTarget,
}

impl DataImage {
    /// Create the image object (no memory bound yet)
    pub fn create(device: &dyn Device, image: &Image) -> Result<Self> {
        image.validate()?;
        let src = &image.source;
        let mut usage = vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED;
        if image.target == ImageTarget::General {
            usage |= vk::ImageUsageFlags::STORAGE;
        }
        let extent = vk::Extent3D { width: src.width, height: src.height, depth: 1 };
        let handle = device.create_image(&ImageDesc {
            flags: image.create_flags(),
            image_type: vk::ImageType::TYPE_2D,
            format: src.format,
            extent,
            mip_levels: src.mip_levels,
            array_layers: image.array_layers(),
            usage,
        })?;

        Ok(Self {
            name: image.name.clone(),
            handle,
            format: src.format,
            extent,
            mip_levels: src.mip_levels,
            array_layers: image.array_layers(),
            views: Vec::new(),
            layout: vk::ImageLayout::UNDEFINED,
            access: vk::AccessFlags::empty(),
            target: image.target,
        })
    }

    /// Create every named view declared on `image`
    pub fn create_views(&mut self, device: &dyn Device, image: &Image) -> Result<()> {
        for (name, desc) in image.views() {
            let mip_count = desc.mip_count.unwrap_or(self.mip_levels.saturating_sub(desc.base_mip));
            let layer_count = desc.layer_count.unwrap_or(self.array_layers.saturating_sub(desc.base_layer));
            if desc.base_mip + mip_count > self.mip_levels || desc.base_layer + layer_count > self.array_layers {
                return Err(Error::InvalidResource(format!(
                    "Image '{}': view '{}' is outside the image", self.name, name
                )));
            }
            let view = device.create_image_view(&ImageViewDesc {
                image: self.handle,
                view_type: desc.view_type.unwrap_or_else(|| image.default_view_type()),
                format: desc.format.unwrap_or(self.format),
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: desc.base_mip,
                    level_count: mip_count,
                    base_array_layer: desc.base_layer,
                    layer_count,
                },
            })?;
            self.views.push((name.to_string(), view));
        }
        Ok(())
    }

    pub fn view(&self, name: &str) -> Option<vk::ImageView> {
        self.views.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn full_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: self.mip_levels,
            base_array_layer: 0,
            layer_count: self.array_layers,
        }
    }

    /// Barrier from the tracked state to `layout`/`access`
    pub fn barrier_to(&self, layout: vk::ImageLayout, access: vk::AccessFlags) -> ImageBarrier {
        ImageBarrier {
            image: self.handle,
            old_layout: self.layout,
            new_layout: layout,
            src_access: self.access,
            dst_access: access,
            range: self.full_range(),
        }
    }

    /// Copy regions of `image`'s source bytes staged at `staging_offset`
    pub fn copy_regions(&self, image: &Image, staging_offset: u64) -> Vec<vk::BufferImageCopy> {
        image.source.regions
            .iter()
            .map(|region| vk::BufferImageCopy {
                buffer_offset: staging_offset + region.offset,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: region.level,
                    base_array_layer: image.region_layer(region),
                    layer_count: 1,
                },
                image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
                image_extent: vk::Extent3D { width: region.width, height: region.height, depth: 1 },
            })
            .collect()
    }

    pub fn destroy(&self, device: &dyn Device) {
        for (_, view) in &self.views {
            device.destroy_image_view(*view);
        }
        device.destroy_image(self.handle);
    }
}

/// Bump-allocate offsets for `images` inside one allocation
///
/// Returns the per-image offsets, the total size and the memory type bits
/// every image accepts.
pub fn plan_image_memory(device: &dyn Device, images: &[DataImage]) -> (Vec<u64>, u64, u32) {
    let mut offsets = Vec::with_capacity(images.len());
    let mut cursor = 0u64;
    let mut type_bits = u32::MAX;
    for image in images {
        let requirements = device.image_memory_requirements(image.handle);
        let offset = align_up(cursor, requirements.alignment.max(1));
        offsets.push(offset);
        cursor = offset + requirements.size;
        type_bits &= requirements.memory_type_bits;
    }
    (offsets, cursor, type_bits)
}

/// Staging buffer description for `size` bytes
pub fn staging_desc(size: u64) -> BufferDesc {
    BufferDesc { size, usage: vk::BufferUsageFlags::TRANSFER_SRC }
}

// ===== SAMPLERS =====

#[derive(Debug)]
pub struct DataSampler {
    pub name: String,
    pub handle: vk::Sampler,
}

impl DataSampler {
    pub fn create(device: &dyn Device, sampler: &Sampler) -> Result<Self> {
        Ok(Self {
            name: sampler.name.clone(),
            handle: device.create_sampler(&sampler.desc)?,
        })
    }

    pub fn destroy(&self, device: &dyn Device) {
        device.destroy_sampler(self.handle);
    }
}
