//! Fence and semaphore helpers.

use ash::vk;

use crate::error::LayerResult;

pub fn create_fence(device: &ash::Device, signaled: bool) -> LayerResult<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };
    let info = vk::FenceCreateInfo::default().flags(flags);
    Ok(unsafe { device.create_fence(&info, None) }?)
}

pub fn create_semaphore(device: &ash::Device) -> LayerResult<vk::Semaphore> {
    let info = vk::SemaphoreCreateInfo::default();
    Ok(unsafe { device.create_semaphore(&info, None) }?)
}

/// Block until `fence` is signaled or `timeout_ns` elapses.
///
/// A timeout is reported as `vk::Result::TIMEOUT` after logging a warning.
pub fn wait_fence(device: &ash::Device, fence: vk::Fence, timeout_ns: u64) -> LayerResult<()> {
    match unsafe { device.wait_for_fences(&[fence], true, timeout_ns) } {
        Ok(()) => Ok(()),
        Err(vk::Result::TIMEOUT) => {
            log::warn!(
                "fence wait timed out after {} ms, the GPU may be hung",
                timeout_ns / 1_000_000
            );
            Err(vk::Result::TIMEOUT.into())
        }
        Err(e) => {
            log::error!("fence wait failed: {e:?}");
            Err(e.into())
        }
    }
}

/// Returns `true` if the fence is signaled, without blocking.
pub fn is_fence_signaled(device: &ash::Device, fence: vk::Fence) -> bool {
    unsafe { device.get_fence_status(fence) }.unwrap_or(false)
}
