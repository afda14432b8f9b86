/// ComputeRunner - records, submits and completes compute dispatches
///
/// A dispatch records into the command buffer owned by its queue, wrapped by
/// the device pass of the `before` and `after` command lists, and is
/// submitted with a fence dedicated to that compute.
///
/// Computes on the render queue are synchronous: the runner waits on the
/// fence, runs both app passes and the callback before returning. Other
/// computes return a ticket; `poll` completes them once their fence signals.

use std::sync::Arc;
use ash::vk;
use rustc_hash::FxHashMap;

use crate::commands::{DeviceCommandList, LayoutTracker};
use crate::compiler::DataScene;
use crate::device::{Device, SubmitInfo};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::scene::{ComputeId, Scene};
use crate::{engine_debug, engine_warn};

const SOURCE: &str = "ember::ComputeRunner";

/// Invoked on the host once a dispatch completed
pub type ComputeCallback = Box<dyn FnOnce(&mut Scene) + Send>;

/// Identifies an asynchronous dispatch until it completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComputeTicket(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Finished before `dispatch` returned
    Completed,
    Pending(ComputeTicket),
}

/// What to run and what to do around it
pub struct ComputeRequest {
    pub compute: ComputeId,
    pub groups: [u32; 3],
    pub before: DeviceCommandList,
    pub after: DeviceCommandList,
    pub callback: Option<ComputeCallback>,
}

impl ComputeRequest {
    pub fn new(compute: ComputeId, groups: [u32; 3]) -> Self {
        Self {
            compute,
            groups,
            before: DeviceCommandList::new(),
            after: DeviceCommandList::new(),
            callback: None,
        }
    }

    pub fn before(mut self, commands: DeviceCommandList) -> Self {
        self.before = commands;
        self
    }

    pub fn after(mut self, commands: DeviceCommandList) -> Self {
        self.after = commands;
        self
    }

    pub fn on_complete(mut self, callback: impl FnOnce(&mut Scene) + Send + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }
}

struct PendingCompute {
    ticket: ComputeTicket,
    compute: ComputeId,
    queue_name: String,
    fence: vk::Fence,
    before: DeviceCommandList,
    after: DeviceCommandList,
    callback: Option<ComputeCallback>,
}

pub struct ComputeRunner {
    device: Arc<dyn Device>,
    fences: FxHashMap<ComputeId, vk::Fence>,
    pending: Vec<PendingCompute>,
    next_ticket: u64,
}

impl ComputeRunner {
    pub fn new(device: Arc<dyn Device>) -> Self {
        Self {
            device,
            fences: FxHashMap::default(),
            pending: Vec::new(),
            next_ticket: 1,
        }
    }

    pub fn is_running(&self, compute: ComputeId) -> bool {
        self.pending.iter().any(|p| p.compute == compute)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn fence(&mut self, compute: ComputeId) -> Result<vk::Fence> {
        if let Some(&fence) = self.fences.get(&compute) {
            return Ok(fence);
        }
        let fence = self.device.create_fence(false)?;
        self.fences.insert(compute, fence);
        Ok(fence)
    }

    pub fn dispatch(&mut self, data: &mut DataScene, scene: &mut Scene, request: ComputeRequest) -> Result<DispatchOutcome> {
        let info = data.compute_dispatch(request.compute)?;
        if self.is_running(request.compute) {
            return Err(Engine::log_and_return_error(SOURCE, Error::ComputeAlreadyRunning(info.name)));
        }

        // The queue's command buffer may still be in flight
        if let Some(index) = self.pending.iter().position(|p| p.queue_name == info.queue_name) {
            engine_debug!(SOURCE, "Queue '{}' is busy, waiting before dispatching '{}'", info.queue_name, info.name);
            let busy = self.pending.remove(index);
            self.device.wait_for_fences(&[busy.fence], u64::MAX)?;
            self.complete(busy, data, scene)?;
        }

        let device = self.device.clone();
        let cmd = info.command_buffer;
        let mut tracker = LayoutTracker::new();

        device.begin_command_buffer(cmd, true)?;
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, info.pipeline);
        for &(index, set) in &info.sets {
            device.cmd_bind_descriptor_sets(cmd, vk::PipelineBindPoint::COMPUTE, info.layout, index, &[set]);
        }
        request.before.run_device(device.as_ref(), cmd, data.images(), &mut tracker)?;
        let [x, y, z] = request.groups;
        device.cmd_dispatch(cmd, x, y, z);
        request.after.run_device(device.as_ref(), cmd, data.images(), &mut tracker)?;
        device.end_command_buffer(cmd)?;

        let fence = self.fence(request.compute)?;
        device.queue_submit(
            info.queue.handle,
            &SubmitInfo { command_buffers: &[cmd], ..SubmitInfo::default() },
            fence,
        )?;

        let ticket = ComputeTicket(self.next_ticket);
        self.next_ticket += 1;
        let pending = PendingCompute {
            ticket,
            compute: request.compute,
            queue_name: info.queue_name,
            fence,
            before: request.before,
            after: request.after,
            callback: request.callback,
        };

        if info.sync {
            device.wait_for_fences(&[fence], u64::MAX)?;
            self.complete(pending, data, scene)?;
            Ok(DispatchOutcome::Completed)
        } else {
            engine_debug!(SOURCE, "Compute '{}' submitted as ticket {}", info.name, ticket.0);
            self.pending.push(pending);
            Ok(DispatchOutcome::Pending(ticket))
        }
    }

    fn complete(&mut self, pending: PendingCompute, data: &mut DataScene, scene: &mut Scene) -> Result<()> {
        self.device.reset_fences(&[pending.fence])?;
        pending.before.run_app(data.images_mut())?;
        pending.after.run_app(data.images_mut())?;
        if let Some(callback) = pending.callback {
            callback(scene);
        }
        Ok(())
    }

    /// Complete every asynchronous dispatch whose fence has signaled
    pub fn poll(&mut self, data: &mut DataScene, scene: &mut Scene) -> Result<Vec<ComputeTicket>> {
        let mut done = Vec::new();
        let mut index = 0;
        while index < self.pending.len() {
            if self.device.fence_signaled(self.pending[index].fence)? {
                let pending = self.pending.remove(index);
                done.push(pending.ticket);
                self.complete(pending, data, scene)?;
            } else {
                index += 1;
            }
        }
        Ok(done)
    }

    /// Block until every asynchronous dispatch completed
    pub fn wait_all(&mut self, data: &mut DataScene, scene: &mut Scene) -> Result<()> {
        while let Some(pending) = self.pending.pop() {
            self.device.wait_for_fences(&[pending.fence], u64::MAX)?;
            self.complete(pending, data, scene)?;
        }
        Ok(())
    }

    pub fn destroy(&mut self) {
        if !self.pending.is_empty() {
            let fences: Vec<vk::Fence> = self.pending.iter().map(|p| p.fence).collect();
            if let Err(e) = self.device.wait_for_fences(&fences, u64::MAX) {
                engine_warn!(SOURCE, "Dropping {} unfinished compute(s): {}", fences.len(), e);
            }
            self.pending.clear();
        }
        for (_, fence) in self.fences.drain() {
            self.device.destroy_fence(fence);
        }
    }
}

impl Drop for ComputeRunner {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
#[path = "compute_runner_tests.rs"]
mod tests;
