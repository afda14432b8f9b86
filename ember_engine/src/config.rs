/// Engine configuration
///
/// Everything the backend needs before a device exists: application identity,
/// validation settings and the named queues the scenes may dispatch to.

use ash::vk;
use crate::log::LogSeverity;

/// Name of the queue used for drawing and presentation
pub const RENDER_QUEUE: &str = "render";

/// Name of the default asynchronous compute queue
pub const COMPUTE_QUEUE: &str = "compute";

/// Which validation-layer messages reach the logger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugSeverity {
    ErrorsOnly,
    ErrorsAndWarnings,
    All,
}

/// A named queue the application wants from the device
///
/// Optional queues that the physical device cannot provide are aliased to the
/// render queue, which makes every dispatch on them synchronous.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueRequirement {
    pub name: String,
    pub flags: vk::QueueFlags,
    pub required: bool,
}

impl QueueRequirement {
    pub fn required(name: &str, flags: vk::QueueFlags) -> Self {
        Self { name: name.to_string(), flags, required: true }
    }

    pub fn optional(name: &str, flags: vk::QueueFlags) -> Self {
        Self { name: name.to_string(), flags, required: false }
    }
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: String,
    /// (major, minor, patch)
    pub app_version: (u32, u32, u32),

    /// Enable VK_LAYER_KHRONOS_validation and the debug messenger
    pub enable_validation: bool,
    pub debug_severity: DebugSeverity,
    /// Minimum severity printed by the default logger
    pub log_level: LogSeverity,

    /// Queues requested from the device, looked up by name
    pub queues: Vec<QueueRequirement>,

    pub clear_color: [f32; 4],
    pub clear_depth: f32,

    /// Extent used when the surface leaves the choice to the application
    pub initial_extent: (u32, u32),
}

impl Config {
    /// Find a queue requirement by name
    pub fn queue(&self, name: &str) -> Option<&QueueRequirement> {
        self.queues.iter().find(|q| q.name == name)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "Ember Application".to_string(),
            app_version: (1, 0, 0),
            enable_validation: cfg!(debug_assertions),
            debug_severity: DebugSeverity::ErrorsAndWarnings,
            log_level: LogSeverity::Debug,
            queues: vec![
                QueueRequirement::required(RENDER_QUEUE, vk::QueueFlags::GRAPHICS),
                QueueRequirement::optional(COMPUTE_QUEUE, vk::QueueFlags::COMPUTE),
            ],
            clear_color: [0.2, 0.2, 0.2, 1.0],
            clear_depth: 1.0,
            initial_extent: (800, 600),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
