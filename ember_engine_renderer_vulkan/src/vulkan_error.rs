/// Conversion of `vk::Result` failures into engine errors

use ash::vk;
use ember_engine::ember::Error;
use ember_engine::engine_error;

/// Map a failed Vulkan call to an engine error, logging it with the call name
pub(crate) fn vk_error(call: &str, result: vk::Result) -> Error {
    let error = match result {
        vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
            Error::DeviceOutOfMemory { size: 0 }
        }
        vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL => {
            Error::DescriptorPoolExhausted
        }
        vk::Result::ERROR_OUT_OF_DATE_KHR => Error::SwapchainOutOfDate,
        other => Error::DeviceCall { call: call.to_string(), code: other.as_raw() },
    };
    if !error.is_recoverable() {
        engine_error!("ember::vulkan", "{} failed: {:?}", call, result);
    }
    error
}

/// Same as `vk_error`, keeping the requested size on out-of-memory
pub(crate) fn vk_alloc_error(call: &str, result: vk::Result, size: u64) -> Error {
    match vk_error(call, result) {
        Error::DeviceOutOfMemory { .. } => Error::DeviceOutOfMemory { size },
        other => other,
    }
}

/// Initialization failures keep the `InitializationFailed` category
pub(crate) fn init_error(what: &str, detail: impl std::fmt::Debug) -> Error {
    engine_error!("ember::vulkan", "{}: {:?}", what, detail);
    Error::InitializationFailed(format!("{}: {:?}", what, detail))
}

#[cfg(test)]
#[path = "vulkan_error_tests.rs"]
mod tests;
