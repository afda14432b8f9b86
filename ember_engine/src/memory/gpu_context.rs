/// GpuContext - shared device state for everything that creates GPU resources
///
/// Shared via `Arc` by the scene compiler, the frame driver and the compute
/// runner so they do not each carry a device, an allocator and the limits.

use std::sync::{Arc, Mutex, MutexGuard};
use crate::config::Config;
use crate::device::{Device, DeviceLimits};
use crate::error::Result;
use crate::engine_err;
use crate::memory::MemoryManager;

pub struct GpuContext {
    pub device: Arc<dyn Device>,
    pub limits: DeviceLimits,
    pub config: Config,
    memory: Mutex<MemoryManager>,
}

impl GpuContext {
    pub fn new(device: Arc<dyn Device>, config: Config) -> Self {
        let limits = device.limits();
        let memory = Mutex::new(MemoryManager::new(device.clone()));
        Self { device, limits, config, memory }
    }

    /// Lock the memory manager
    pub fn memory(&self) -> Result<MutexGuard<'_, MemoryManager>> {
        self.memory
            .lock()
            .map_err(|_| engine_err!("ember::GpuContext", "Memory manager lock poisoned"))
    }
}
