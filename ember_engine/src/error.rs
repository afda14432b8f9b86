//! Error types for the Ember engine
//!
//! One error enum covers scene compilation, resource exhaustion and device
//! failures. Only `SwapchainOutOfDate` is recoverable; everything else aborts
//! the operation that produced it.

use std::fmt;

/// Result type for Ember engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ember engine errors
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Backend-specific error (Vulkan loader, window system, poisoned lock)
    BackendError(String),

    /// Invalid resource (unknown id, bad value, malformed data)
    InvalidResource(String),

    /// Initialization failed (instance, device, swapchain)
    InitializationFailed(String),

    /// Shader mapping file could not be read or parsed
    InvalidMapping(String),

    /// A uniform in a shader mapping uses a descriptor type the engine does not handle
    UnsupportedDescriptorType {
        shader: String,
        uniform: String,
        descriptor_type: i32,
    },

    /// An image uniform has no value, or names a missing image/view/sampler
    UnresolvedImageBinding {
        owner: String,
        uniform: String,
        reason: String,
    },

    /// A mesh does not provide an attribute the shader consumes
    IncompatibleMeshShader {
        mesh: String,
        shader: String,
        attribute: String,
    },

    /// A shader declares more than one set for an engine-reserved scope
    ScopeCardinality {
        shader: String,
        scope: String,
    },

    /// A compute names a queue that was never declared
    UnknownQueue {
        compute: String,
        queue: String,
    },

    /// No memory type satisfies the requested property flags
    NoSuitableMemoryType {
        required: String,
        type_bits: u32,
    },

    /// The device refused an allocation
    DeviceOutOfMemory {
        size: u64,
    },

    /// The descriptor pool cannot satisfy an allocation
    DescriptorPoolExhausted,

    /// The swapchain no longer matches the surface and must be recreated
    SwapchainOutOfDate,

    /// Any other failing device call
    DeviceCall {
        call: String,
        code: i32,
    },

    /// A compute dispatch was requested while the same compute is in flight
    ComputeAlreadyRunning(String),

    /// The operation needs a loaded scene
    SceneNotLoaded,
}

impl Error {
    /// Whether the caller can recover from this error (only swapchain staleness)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::SwapchainOutOfDate)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::InvalidMapping(msg) => write!(f, "Invalid shader mapping: {}", msg),
            Error::UnsupportedDescriptorType { shader, uniform, descriptor_type } => write!(
                f,
                "Unsupported descriptor type {} for uniform '{}' in shader '{}'",
                descriptor_type, uniform, shader
            ),
            Error::UnresolvedImageBinding { owner, uniform, reason } => write!(
                f,
                "Unresolved image binding '{}' on '{}': {}",
                uniform, owner, reason
            ),
            Error::IncompatibleMeshShader { mesh, shader, attribute } => write!(
                f,
                "Mesh '{}' is missing attribute '{}' required by shader '{}'",
                mesh, attribute, shader
            ),
            Error::ScopeCardinality { shader, scope } => write!(
                f,
                "Shader '{}' declares more than one descriptor set with scope {}",
                shader, scope
            ),
            Error::UnknownQueue { compute, queue } => write!(
                f,
                "Compute '{}' uses undeclared queue '{}'",
                compute, queue
            ),
            Error::NoSuitableMemoryType { required, type_bits } => write!(
                f,
                "No memory type with flags {} in type bits {:#b}",
                required, type_bits
            ),
            Error::DeviceOutOfMemory { size } => {
                write!(f, "Out of device memory (requested {} bytes)", size)
            }
            Error::DescriptorPoolExhausted => write!(f, "Descriptor pool exhausted"),
            Error::SwapchainOutOfDate => write!(f, "Swapchain out of date"),
            Error::DeviceCall { call, code } => write!(f, "{} failed with code {}", call, code),
            Error::ComputeAlreadyRunning(name) => {
                write!(f, "Compute shader '{}' is already running", name)
            }
            Error::SceneNotLoaded => write!(f, "Scene is not loaded"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
