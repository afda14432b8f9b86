/// Device commands - GPU-side state changes recorded around a dispatch
///
/// A command runs in two passes:
/// - the device pass records barriers into a command buffer, starting from
///   the layout the host believes each image is in
/// - the app pass updates that host-side bookkeeping, and only runs once the
///   submission that carried the device pass is known to have completed

use ash::vk;
use rustc_hash::FxHashMap;
use crate::compiler::DataImage;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::scene::{ImageId, ImageTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Transition an image to the target's layout and access
    UpdateImageLayout {
        image: ImageId,
        target: ImageTarget,
    },
}

/// Pipeline stages that perform `access`
pub fn stage_for_access(access: vk::AccessFlags) -> vk::PipelineStageFlags {
    if access.is_empty() {
        return vk::PipelineStageFlags::TOP_OF_PIPE;
    }
    let mut stages = vk::PipelineStageFlags::empty();
    if access.intersects(vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE) {
        stages |= vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::COMPUTE_SHADER;
    }
    if access.intersects(vk::AccessFlags::TRANSFER_READ | vk::AccessFlags::TRANSFER_WRITE) {
        stages |= vk::PipelineStageFlags::TRANSFER;
    }
    if stages.is_empty() {
        vk::PipelineStageFlags::ALL_COMMANDS
    } else {
        stages
    }
}

/// Layout/access of images as seen by commands recorded so far
///
/// Starts from the host-side state and follows every transition recorded
/// through it, so several lists recorded into one buffer chain correctly.
#[derive(Debug, Default)]
pub struct LayoutTracker {
    pending: FxHashMap<ImageId, (vk::ImageLayout, vk::AccessFlags)>,
}

impl LayoutTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self, id: ImageId, image: &DataImage) -> (vk::ImageLayout, vk::AccessFlags) {
        self.pending.get(&id).copied().unwrap_or((image.layout, image.access))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceCommandList {
    commands: Vec<DeviceCommand>,
}

impl DeviceCommandList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: DeviceCommand) -> &mut Self {
        self.commands.push(command);
        self
    }

    pub fn update_image_layout(mut self, image: ImageId, target: ImageTarget) -> Self {
        self.commands.push(DeviceCommand::UpdateImageLayout { image, target });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    fn image<'a>(images: &'a [DataImage], id: ImageId) -> Result<&'a DataImage> {
        images.get(id.0).ok_or_else(|| Error::InvalidResource(format!("Image {} does not exist", id.0)))
    }

    /// Record every command into `cmd`
    pub fn run_device(
        &self,
        device: &dyn Device,
        cmd: vk::CommandBuffer,
        images: &[DataImage],
        tracker: &mut LayoutTracker,
    ) -> Result<()> {
        for command in &self.commands {
            match *command {
                DeviceCommand::UpdateImageLayout { image: id, target } => {
                    let image = Self::image(images, id)?;
                    let (layout, access) = tracker.current(id, image);
                    let mut barrier = image.barrier_to(target.layout(), target.access());
                    barrier.old_layout = layout;
                    barrier.src_access = access;
                    device.cmd_pipeline_barrier(
                        cmd,
                        stage_for_access(access),
                        stage_for_access(target.access()),
                        &[barrier],
                    );
                    tracker.pending.insert(id, (target.layout(), target.access()));
                }
            }
        }
        Ok(())
    }

    /// Apply the host-side effects after the GPU finished the device pass
    pub fn run_app(&self, images: &mut [DataImage]) -> Result<()> {
        for command in &self.commands {
            match *command {
                DeviceCommand::UpdateImageLayout { image: id, target } => {
                    let image = images.get_mut(id.0).ok_or_else(|| {
                        Error::InvalidResource(format!("Image {} does not exist", id.0))
                    })?;
                    image.layout = target.layout();
                    image.access = target.access();
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "device_command_tests.rs"]
mod tests;
