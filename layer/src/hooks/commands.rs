//! State tracking of application command buffers.

use ash::vk;
use ash::vk::Handle;

use super::dispatch::device_data;
use super::ffi::raw_slice;
use super::{next_fn, report};
use crate::vulkan::records::{CommandBufferRecord, RecorderState};
use crate::vulkan::VulkanDevice;

fn transition(layer: &VulkanDevice, command_buffer: vk::CommandBuffer, next: RecorderState) {
    match layer
        .records()
        .get::<CommandBufferRecord>(command_buffer.as_raw())
    {
        Some(record) => {
            let previous = record.transition(next);
            log::trace!(
                "command buffer {:#x}: {previous:?} -> {next:?}",
                command_buffer.as_raw()
            );
        }
        None => log::debug!(
            "untracked command buffer {:#x}",
            command_buffer.as_raw()
        ),
    }
}

pub unsafe extern "system" fn allocate_command_buffers(
    device: vk::Device,
    p_allocate_info: *const vk::CommandBufferAllocateInfo<'_>,
    p_command_buffers: *mut vk::CommandBuffer,
) -> vk::Result {
    let Some(data) = device_data(device) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    let next = next_fn!(data, allocate_command_buffers, vk::Result::ERROR_INITIALIZATION_FAILED);
    let result = unsafe { next(device, p_allocate_info, p_command_buffers) };
    if result == vk::Result::SUCCESS {
        if let Some(layer) = &data.layer {
            let info = unsafe { &*p_allocate_info };
            let command_buffers =
                unsafe { raw_slice(p_command_buffers, info.command_buffer_count) };
            for command_buffer in command_buffers {
                report(
                    layer
                        .records()
                        .insert(command_buffer.as_raw(), CommandBufferRecord::new(info.command_pool))
                        .map(drop),
                    "command buffer",
                    command_buffer.as_raw(),
                );
            }
        }
    }
    result
}

pub unsafe extern "system" fn free_command_buffers(
    device: vk::Device,
    command_pool: vk::CommandPool,
    command_buffer_count: u32,
    p_command_buffers: *const vk::CommandBuffer,
) {
    let Some(data) = device_data(device) else {
        return;
    };
    let next = next_fn!(data, free_command_buffers);
    if let Some(layer) = &data.layer {
        for command_buffer in unsafe { raw_slice(p_command_buffers, command_buffer_count) } {
            layer
                .records()
                .remove::<CommandBufferRecord>(command_buffer.as_raw());
        }
    }
    unsafe { next(device, command_pool, command_buffer_count, p_command_buffers) };
}

pub unsafe extern "system" fn destroy_command_pool(
    device: vk::Device,
    command_pool: vk::CommandPool,
    p_allocator: *const vk::AllocationCallbacks<'_>,
) {
    let Some(data) = device_data(device) else {
        return;
    };
    let next = next_fn!(data, destroy_command_pool);
    if let Some(layer) = &data.layer {
        let freed = layer
            .records()
            .remove_where::<CommandBufferRecord>(|record| record.pool == command_pool);
        log::trace!(
            "command pool {:#x} destroyed with {} command buffers",
            command_pool.as_raw(),
            freed.len()
        );
    }
    unsafe { next(device, command_pool, p_allocator) };
}

pub unsafe extern "system" fn reset_command_pool(
    device: vk::Device,
    command_pool: vk::CommandPool,
    flags: vk::CommandPoolResetFlags,
) -> vk::Result {
    let Some(data) = device_data(device) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    let next = next_fn!(data, reset_command_pool, vk::Result::ERROR_INITIALIZATION_FAILED);
    let result = unsafe { next(device, command_pool, flags) };
    if result == vk::Result::SUCCESS {
        if let Some(layer) = &data.layer {
            for (_, record) in layer
                .records()
                .filter::<CommandBufferRecord>(|record| record.pool == command_pool)
            {
                record.transition(RecorderState::Idle);
            }
        }
    }
    result
}

pub unsafe extern "system" fn begin_command_buffer(
    command_buffer: vk::CommandBuffer,
    p_begin_info: *const vk::CommandBufferBeginInfo<'_>,
) -> vk::Result {
    let Some(data) = device_data(command_buffer) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    let next = next_fn!(data, begin_command_buffer, vk::Result::ERROR_INITIALIZATION_FAILED);
    let result = unsafe { next(command_buffer, p_begin_info) };
    if result == vk::Result::SUCCESS {
        if let Some(layer) = &data.layer {
            transition(layer, command_buffer, RecorderState::Recording);
        }
    }
    result
}

pub unsafe extern "system" fn end_command_buffer(command_buffer: vk::CommandBuffer) -> vk::Result {
    let Some(data) = device_data(command_buffer) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    let next = next_fn!(data, end_command_buffer, vk::Result::ERROR_INITIALIZATION_FAILED);
    let result = unsafe { next(command_buffer) };
    if result == vk::Result::SUCCESS {
        if let Some(layer) = &data.layer {
            transition(layer, command_buffer, RecorderState::Idle);
        }
    }
    result
}

pub unsafe extern "system" fn reset_command_buffer(
    command_buffer: vk::CommandBuffer,
    flags: vk::CommandBufferResetFlags,
) -> vk::Result {
    let Some(data) = device_data(command_buffer) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    let next = next_fn!(data, reset_command_buffer, vk::Result::ERROR_INITIALIZATION_FAILED);
    let result = unsafe { next(command_buffer, flags) };
    if result == vk::Result::SUCCESS {
        if let Some(layer) = &data.layer {
            transition(layer, command_buffer, RecorderState::Idle);
        }
    }
    result
}

/// Forward a submit while holding the queue lock, so it cannot interleave
/// with the layer's own submissions on the same queue.
pub unsafe extern "system" fn queue_submit(
    queue: vk::Queue,
    submit_count: u32,
    p_submits: *const vk::SubmitInfo<'_>,
    fence: vk::Fence,
) -> vk::Result {
    let Some(data) = device_data(queue) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    let next = next_fn!(data, queue_submit, vk::Result::ERROR_INITIALIZATION_FAILED);
    let Some(layer) = &data.layer else {
        return unsafe { next(queue, submit_count, p_submits, fence) };
    };

    let tracked_queue = layer.queue(queue);
    let _guard = tracked_queue.as_deref().map(|q| q.lock());
    let result = unsafe { next(queue, submit_count, p_submits, fence) };
    if result == vk::Result::SUCCESS {
        for submit in unsafe { raw_slice(p_submits, submit_count) } {
            let command_buffers =
                unsafe { raw_slice(submit.p_command_buffers, submit.command_buffer_count) };
            for command_buffer in command_buffers {
                transition(layer, *command_buffer, RecorderState::Submitted);
            }
        }
    }
    result
}
