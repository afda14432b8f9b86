use std::sync::Arc;
use ash::vk;
use ash::vk::Handle;
use crate::config::Config;
use crate::device::mock_device::{MockDevice, MockSwapchain};
use crate::error::Error;
use crate::frame::{FrameDriver, FrameOutcome, FrameState};

fn driver(images: usize) -> (Arc<MockDevice>, FrameDriver, MockSwapchain) {
    let device = Arc::new(MockDevice::new());
    let driver = FrameDriver::new(device.clone(), &Config::default(), images).unwrap();
    (device, driver, MockSwapchain::new(images))
}

fn cmd(raw: u64) -> vk::CommandBuffer {
    vk::CommandBuffer::from_raw(raw)
}

#[test]
fn test_new_creates_sync_objects_per_image() {
    let (device, driver, _swapchain) = driver(3);

    assert_eq!(device.live("semaphore"), 6);
    assert_eq!(device.live("fence"), 3);
    assert_eq!(driver.image_count(), 3);
    assert_eq!(driver.state(), FrameState::Idle);
}

#[test]
fn test_frame_records_submits_and_presents() {
    let (device, mut driver, mut swapchain) = driver(2);
    let mut seen = None;

    let outcome = driver
        .draw_frame(&mut swapchain, |index, target| {
            seen = Some((index, target.framebuffer, target.extent));
            Ok(cmd(0x77))
        })
        .unwrap();

    assert_eq!(outcome, FrameOutcome::Presented(0));
    assert_eq!(seen, Some((0, vk::Framebuffer::from_raw(0xF0), vk::Extent2D { width: 800, height: 600 })));
    assert_eq!(device.state.lock().unwrap().submits, vec![(0x1000, 1)]);
    assert_eq!(swapchain.presented, vec![0]);
    assert_eq!(driver.state(), FrameState::Presented);
    assert_eq!(driver.frame_count(), 1);
}

#[test]
fn test_frames_cycle_through_images() {
    let (_device, mut driver, mut swapchain) = driver(2);

    for _ in 0..3 {
        driver.draw_frame(&mut swapchain, |_, _| Ok(cmd(1))).unwrap();
    }

    assert_eq!(swapchain.presented, vec![0, 1, 0]);
    assert_eq!(driver.frame_count(), 3);
}

#[test]
fn test_out_of_date_acquire_skips_the_frame() {
    let (device, mut driver, mut swapchain) = driver(2);
    swapchain.out_of_date = 1;
    let mut recorded = false;

    let outcome = driver
        .draw_frame(&mut swapchain, |_, _| {
            recorded = true;
            Ok(cmd(1))
        })
        .unwrap();

    assert_eq!(outcome, FrameOutcome::OutOfDate);
    assert!(!recorded);
    assert!(device.state.lock().unwrap().submits.is_empty());
    assert_eq!(driver.state(), FrameState::Idle);
}

#[test]
fn test_record_failure_keeps_fence_signaled() {
    let (device, mut driver, mut swapchain) = driver(1);

    let result = driver.draw_frame(&mut swapchain, |_, _| Err(Error::SceneNotLoaded));
    assert_eq!(result, Err(Error::SceneNotLoaded));

    // The next frame on the same image must not block on an unsignaled fence
    let outcome = driver.draw_frame(&mut swapchain, |_, _| Ok(cmd(1))).unwrap();
    assert_eq!(outcome, FrameOutcome::Presented(0));
    assert_eq!(device.state.lock().unwrap().submits.len(), 1);
}

#[test]
fn test_record_failure_replaces_signaled_image_ready() {
    let (device, mut driver, mut swapchain) = driver(2);
    let signaled = driver.image_ready[0];
    let idle_before = device.state.lock().unwrap().wait_idle_calls;

    let result = driver.draw_frame(&mut swapchain, |_, _| Err(Error::SceneNotLoaded));
    assert_eq!(result, Err(Error::SceneNotLoaded));

    assert_eq!(driver.slot, 0);
    assert_ne!(driver.image_ready[0], signaled);
    assert_eq!(device.live("semaphore"), 4);
    assert_eq!(device.state.lock().unwrap().wait_idle_calls, idle_before + 1);
    assert_eq!(driver.state(), FrameState::Idle);
}

#[test]
fn test_resize_recreates_swapchain_and_sync_objects() {
    let (device, mut driver, mut swapchain) = driver(2);
    swapchain.image_count = 3;

    let count = driver.resize(&mut swapchain, 1024, 768).unwrap();

    assert_eq!(count, 3);
    assert_eq!(swapchain.recreated, 1);
    assert_eq!(swapchain.extent, vk::Extent2D { width: 1024, height: 768 });
    assert_eq!(device.live("fence"), 3);
    assert_eq!(device.state.lock().unwrap().wait_idle_calls, 1);
}

#[test]
fn test_destroy_releases_sync_objects() {
    let (device, mut driver, _swapchain) = driver(2);

    driver.destroy();

    assert!(device.all_destroyed());
}
