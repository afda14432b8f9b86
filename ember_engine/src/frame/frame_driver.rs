/// FrameDriver - acquire, record, submit and present one frame at a time
///
/// Frames walk `Idle -> Acquired -> Recorded -> Submitted -> Presented` and
/// back to `Idle`. Each swapchain image owns a fence (created signaled) that
/// guards its command buffer, and a rendering-done semaphore waited on by
/// present. Image-ready semaphores rotate per frame slot since the image
/// index is only known after the acquire that signals them.

use std::sync::Arc;
use ash::vk;

use crate::compiler::FrameTarget;
use crate::config::Config;
use crate::device::{Device, SubmitInfo, Swapchain};
use crate::error::{Error, Result};
use crate::{engine_debug, engine_info, engine_warn};

const SOURCE: &str = "ember::FrameDriver";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Acquired,
    Recorded,
    Submitted,
    Presented,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented(u32),
    /// The swapchain must be recreated before the next frame
    OutOfDate,
}

pub struct FrameDriver {
    device: Arc<dyn Device>,
    image_ready: Vec<vk::Semaphore>,
    rendering_done: Vec<vk::Semaphore>,
    in_flight: Vec<vk::Fence>,
    slot: usize,
    state: FrameState,
    frames: u64,
    clear_color: [f32; 4],
    clear_depth: f32,
}

impl FrameDriver {
    pub fn new(device: Arc<dyn Device>, config: &Config, image_count: usize) -> Result<Self> {
        let mut driver = Self {
            device,
            image_ready: Vec::new(),
            rendering_done: Vec::new(),
            in_flight: Vec::new(),
            slot: 0,
            state: FrameState::Idle,
            frames: 0,
            clear_color: config.clear_color,
            clear_depth: config.clear_depth,
        };
        if let Err(e) = driver.create_sync_objects(image_count) {
            driver.destroy_sync_objects();
            return Err(e);
        }
        Ok(driver)
    }

    fn create_sync_objects(&mut self, image_count: usize) -> Result<()> {
        for _ in 0..image_count {
            self.image_ready.push(self.device.create_semaphore()?);
            self.rendering_done.push(self.device.create_semaphore()?);
            self.in_flight.push(self.device.create_fence(true)?);
        }
        Ok(())
    }

    fn destroy_sync_objects(&mut self) {
        for semaphore in self.image_ready.drain(..).chain(self.rendering_done.drain(..)) {
            self.device.destroy_semaphore(semaphore);
        }
        for fence in self.in_flight.drain(..) {
            self.device.destroy_fence(fence);
        }
        self.slot = 0;
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Number of frames presented so far
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    pub fn image_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Run one frame; `record` returns the command buffer to submit for the
    /// acquired image
    pub fn draw_frame<F>(&mut self, swapchain: &mut dyn Swapchain, record: F) -> Result<FrameOutcome>
    where
        F: FnOnce(usize, &FrameTarget) -> Result<vk::CommandBuffer>,
    {
        self.state = FrameState::Idle;
        let Some(&image_ready) = self.image_ready.get(self.slot) else {
            return Err(Error::InvalidResource("Frame driver has no synchronization objects".to_string()));
        };

        let image_index = match swapchain.acquire_next_image(image_ready) {
            Ok(index) => index,
            Err(Error::SwapchainOutOfDate) => {
                engine_debug!(SOURCE, "Swapchain out of date on acquire");
                return Ok(FrameOutcome::OutOfDate);
            }
            Err(e) => return Err(e),
        };
        self.state = FrameState::Acquired;

        let rendering_done = match self.submit_acquired(swapchain, image_ready, image_index as usize, record) {
            Ok(semaphore) => semaphore,
            Err(e) => {
                self.state = FrameState::Idle;
                // The acquire signal is never waited on: the semaphore cannot be reused
                if let Err(replace) = self.replace_image_ready() {
                    engine_warn!(SOURCE, "Could not replace image-ready semaphore: {}", replace);
                }
                return Err(e);
            }
        };
        self.state = FrameState::Submitted;

        let presented = swapchain.present(image_index, rendering_done);
        self.slot = (self.slot + 1) % self.image_ready.len();

        match presented {
            Ok(()) => {
                self.state = FrameState::Presented;
                self.frames += 1;
                Ok(FrameOutcome::Presented(image_index))
            }
            Err(Error::SwapchainOutOfDate) => {
                self.state = FrameState::Idle;
                engine_debug!(SOURCE, "Swapchain out of date on present");
                Ok(FrameOutcome::OutOfDate)
            }
            Err(e) => Err(e),
        }
    }

    /// Record and submit the acquired image; returns its rendering-done semaphore
    fn submit_acquired<F>(
        &mut self,
        swapchain: &mut dyn Swapchain,
        image_ready: vk::Semaphore,
        index: usize,
        record: F,
    ) -> Result<vk::Semaphore>
    where
        F: FnOnce(usize, &FrameTarget) -> Result<vk::CommandBuffer>,
    {
        let (fence, rendering_done) = match (self.in_flight.get(index), self.rendering_done.get(index)) {
            (Some(&fence), Some(&semaphore)) => (fence, semaphore),
            _ => {
                return Err(Error::InvalidResource(format!(
                    "Swapchain returned image {} but only {} are known", index, self.in_flight.len()
                )));
            }
        };
        self.device.wait_for_fences(&[fence], u64::MAX)?;

        let target = FrameTarget {
            render_pass: swapchain.render_pass(),
            framebuffer: swapchain.framebuffer(index),
            extent: swapchain.extent(),
            clear_color: self.clear_color,
            clear_depth: self.clear_depth,
        };
        let cmd = record(index, &target)?;
        self.state = FrameState::Recorded;

        // Reset only once a submission is certain to signal it again
        self.device.reset_fences(&[fence])?;
        self.device.queue_submit(
            self.device.render_queue().handle,
            &SubmitInfo {
                command_buffers: &[cmd],
                wait_semaphores: &[image_ready],
                wait_stages: &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
                signal_semaphores: &[rendering_done],
            },
            fence,
        )?;
        Ok(rendering_done)
    }

    /// Swap the current slot's image-ready semaphore for an unsignaled one
    fn replace_image_ready(&mut self) -> Result<()> {
        let fresh = self.device.create_semaphore()?;
        let Some(slot) = self.image_ready.get_mut(self.slot) else {
            self.device.destroy_semaphore(fresh);
            return Ok(());
        };
        let stale = std::mem::replace(slot, fresh);
        self.device.device_wait_idle()?;
        self.device.destroy_semaphore(stale);
        Ok(())
    }

    /// Recreate the swapchain at `width` x `height`; returns the new image count
    pub fn resize(&mut self, swapchain: &mut dyn Swapchain, width: u32, height: u32) -> Result<usize> {
        self.device.device_wait_idle()?;
        swapchain.recreate(width, height)?;

        let image_count = swapchain.image_count();
        // Semaphores may still be referenced by an aborted acquire
        self.destroy_sync_objects();
        self.create_sync_objects(image_count)?;
        self.state = FrameState::Idle;

        engine_info!(SOURCE, "Swapchain resized to {}x{} ({} images)", width, height, image_count);
        Ok(image_count)
    }

    pub fn destroy(&mut self) {
        if self.in_flight.is_empty() {
            return;
        }
        if let Err(e) = self.device.device_wait_idle() {
            engine_warn!(SOURCE, "Wait idle before teardown failed: {}", e);
        }
        self.destroy_sync_objects();
    }
}

impl Drop for FrameDriver {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
#[path = "frame_driver_tests.rs"]
mod tests;
