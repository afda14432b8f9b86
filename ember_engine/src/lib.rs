/*!
# Ember Engine

Scene compilation and GPU resource binding for a data-driven Vulkan engine.

An application describes a scene as data (shaders with their reflected
mappings, computes, meshes, images, samplers and game objects) and hands it
to the [`ember::Runtime`]. Loading compiles the scene into device objects;
afterwards the application only writes uniform values and the runtime flushes
exactly what changed before every frame.

## Architecture

- **Device**: the GPU interface (`Device`, `Swapchain`) implemented by a backend
  such as `ember_engine_renderer_vulkan`
- **Memory**: memory type selection, allocation and mapping
- **Layout**: shader mappings compiled into descriptor set layouts and packed
  uniform structs
- **Scene**: the application-side data model with change-tracked uniforms
- **Compiler**: `DataScene`, the device-side mirror of a scene
- **Commands**: one-shot submissions, device command lists and compute dispatch
- **Frame**: per-frame acquire, submit and present
- **Inspector**: debug tool protocol
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod config;
pub mod device;
pub mod memory;
pub mod layout;
pub mod scene;
pub mod compiler;
pub mod commands;
pub mod frame;
pub mod inspector;
pub mod runtime;

// Main ember namespace module
pub mod ember {
    // Error types
    pub use crate::error::{Error, Result};

    // Engine singleton
    pub use crate::engine::Engine;

    // Configuration
    pub use crate::config::Config;

    // Runtime entry point
    pub use crate::runtime::{Runtime, SceneHandle};

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    pub mod device {
        pub use crate::device::*;
    }

    pub mod memory {
        pub use crate::memory::*;
    }

    pub mod layout {
        pub use crate::layout::*;
    }

    pub mod scene {
        pub use crate::scene::*;
    }

    pub mod compiler {
        pub use crate::compiler::*;
    }

    pub mod commands {
        pub use crate::commands::*;
    }

    pub mod frame {
        pub use crate::frame::*;
    }

    pub mod inspector {
        pub use crate::inspector::*;
    }
}

// Re-export math library at crate root
pub use glam;
