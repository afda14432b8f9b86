use ash::vk;
use ember_engine::ember::Error;
use crate::vulkan_error::{init_error, vk_alloc_error, vk_error};

#[test]
fn test_memory_codes_map_to_out_of_memory() {
    assert_eq!(
        vk_error("vkCreateBuffer", vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
        Error::DeviceOutOfMemory { size: 0 }
    );
    assert_eq!(
        vk_alloc_error("vkAllocateMemory", vk::Result::ERROR_OUT_OF_HOST_MEMORY, 4096),
        Error::DeviceOutOfMemory { size: 4096 }
    );
}

#[test]
fn test_pool_codes_map_to_exhausted_pool() {
    assert_eq!(
        vk_error("vkAllocateDescriptorSets", vk::Result::ERROR_OUT_OF_POOL_MEMORY),
        Error::DescriptorPoolExhausted
    );
    assert_eq!(
        vk_error("vkAllocateDescriptorSets", vk::Result::ERROR_FRAGMENTED_POOL),
        Error::DescriptorPoolExhausted
    );
}

#[test]
fn test_out_of_date_is_recoverable() {
    let error = vk_error("vkAcquireNextImageKHR", vk::Result::ERROR_OUT_OF_DATE_KHR);

    assert_eq!(error, Error::SwapchainOutOfDate);
    assert!(error.is_recoverable());
}

#[test]
fn test_other_codes_keep_the_call_name() {
    let error = vk_error("vkQueueSubmit", vk::Result::ERROR_DEVICE_LOST);

    assert_eq!(
        error,
        Error::DeviceCall { call: "vkQueueSubmit".to_string(), code: vk::Result::ERROR_DEVICE_LOST.as_raw() }
    );
    assert!(!error.is_recoverable());
    assert!(error.to_string().contains("vkQueueSubmit"));
}

#[test]
fn test_alloc_error_passes_other_codes_through() {
    assert_eq!(
        vk_alloc_error("vkAllocateMemory", vk::Result::ERROR_TOO_MANY_OBJECTS, 64),
        Error::DeviceCall {
            call: "vkAllocateMemory".to_string(),
            code: vk::Result::ERROR_TOO_MANY_OBJECTS.as_raw(),
        }
    );
}

#[test]
fn test_init_error_category() {
    assert!(matches!(
        init_error("Failed to create instance", vk::Result::ERROR_INCOMPATIBLE_DRIVER),
        Error::InitializationFailed(msg) if msg.contains("ERROR_INCOMPATIBLE_DRIVER")
    ));
}
