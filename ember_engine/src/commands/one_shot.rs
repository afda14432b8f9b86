/// One-shot command submission for setup uploads
///
/// Records a throwaway command buffer, submits it and blocks until the GPU is
/// done. Used for staging copies only; per-frame work goes through the
/// scene's long-lived command buffers.

use ash::vk;
use crate::device::{Device, QueueInfo, SubmitInfo};
use crate::error::Result;

pub fn submit_one_shot(
    device: &dyn Device,
    queue: QueueInfo,
    record: impl FnOnce(vk::CommandBuffer),
) -> Result<()> {
    let pool = device.create_command_pool(queue.family)?;
    let result = submit_from_pool(device, pool, queue, record);
    device.destroy_command_pool(pool);
    result
}

fn submit_from_pool(
    device: &dyn Device,
    pool: vk::CommandPool,
    queue: QueueInfo,
    record: impl FnOnce(vk::CommandBuffer),
) -> Result<()> {
    let buffers = device.allocate_command_buffers(pool, 1)?;
    let cmd = buffers[0];

    device.begin_command_buffer(cmd, true)?;
    record(cmd);
    device.end_command_buffer(cmd)?;

    let fence = device.create_fence(false)?;
    let submitted = device
        .queue_submit(queue.handle, &SubmitInfo { command_buffers: &buffers, ..SubmitInfo::default() }, fence)
        .and_then(|_| device.wait_for_fences(&[fence], u64::MAX));

    device.destroy_fence(fence);
    device.free_command_buffers(pool, &buffers);
    submitted
}
