//! Swap-chain creation, image acquisition and presentation.

use std::sync::Arc;

use ash::vk;
use ash::vk::Handle;

use super::dispatch::{DeviceData, device_data};
use super::ffi::{find_in_chain, raw_slice};
use super::{next_fn, report};
use crate::api::events;
use crate::profile_scope;
use crate::vulkan::conversion::convert_swapchain_info;
use crate::vulkan::{
    VulkanDevice, VulkanSwapchain, apply_swapchain_desc, augment_usage, format_list_pair,
};

/// Adjust an application's swap-chain create info in place.
///
/// Collaborators may amend the description first. Images always get transfer
/// usage, and become mutable between their UNORM and SRGB format when the
/// device allows it and the application did not ask for a format list itself.
pub(crate) fn amend_swapchain_info(
    info: &mut vk::SwapchainCreateInfoKHR<'_>,
    supports_mutable_format: bool,
) -> Option<[vk::Format; 2]> {
    let mut desc = convert_swapchain_info(info);
    if events().invoke_create_swapchain(&mut desc) {
        log::debug!("swap-chain description amended: {desc:?}");
        apply_swapchain_desc(info, &desc);
    }
    info.image_usage = augment_usage(info.image_usage);

    let has_format_list =
        unsafe { find_in_chain::<vk::ImageFormatListCreateInfo<'_>>(info.p_next) }.is_some();
    if !supports_mutable_format
        || has_format_list
        || info.flags.contains(vk::SwapchainCreateFlagsKHR::MUTABLE_FORMAT)
    {
        return None;
    }
    format_list_pair(info.image_format)
}

fn swapchain_init(
    data: &DeviceData,
    layer: &Arc<VulkanDevice>,
    old: Option<Arc<VulkanSwapchain>>,
    handle: vk::SwapchainKHR,
    info: &vk::SwapchainCreateInfoKHR<'_>,
) {
    match old {
        Some(swapchain) => {
            // Re-created: the lineage moves to the new handle.
            let old_handle = info.old_swapchain;
            report(swapchain.on_init(handle, info), "swap-chain", handle.as_raw());
            data.swapchains.remove(old_handle.as_raw());
            report(
                data.swapchains.insert_arc(handle.as_raw(), swapchain),
                "swap-chain",
                handle.as_raw(),
            );
        }
        None => match VulkanSwapchain::new(Arc::clone(layer), handle, info) {
            Ok(swapchain) => report(
                data.swapchains.insert_arc(handle.as_raw(), swapchain),
                "swap-chain",
                handle.as_raw(),
            ),
            Err(e) => log::error!("failed to initialize swap-chain {:#x}: {e}", handle.as_raw()),
        },
    }
}

pub unsafe extern "system" fn create_swapchain(
    device: vk::Device,
    p_create_info: *const vk::SwapchainCreateInfoKHR<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
    p_swapchain: *mut vk::SwapchainKHR,
) -> vk::Result {
    profile_scope!("vkCreateSwapchainKHR");
    let Some(data) = device_data(device) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    let next = next_fn!(data, create_swapchain, vk::Result::ERROR_INITIALIZATION_FAILED);
    let Some(layer) = &data.layer else {
        return unsafe { next(device, p_create_info, p_allocator, p_swapchain) };
    };

    let mut info = unsafe { *p_create_info };
    let formats = amend_swapchain_info(&mut info, layer.context().supports_mutable_swapchain());
    let mut format_list = vk::ImageFormatListCreateInfo::default();
    if let Some(formats) = &formats {
        format_list = format_list.view_formats(formats);
        format_list.p_next = info.p_next;
        info.p_next = (&format_list as *const vk::ImageFormatListCreateInfo<'_>).cast();
        info.flags |= vk::SwapchainCreateFlagsKHR::MUTABLE_FORMAT;
    }

    let old = (info.old_swapchain != vk::SwapchainKHR::null())
        .then(|| data.swapchains.get(info.old_swapchain.as_raw()))
        .flatten();
    if let Some(old) = &old {
        old.on_reset();
    }

    let result = unsafe { next(device, &info, p_allocator, p_swapchain) };
    if result != vk::Result::SUCCESS {
        log::error!("vkCreateSwapchainKHR failed: {result:?}");
        return result;
    }
    swapchain_init(&data, layer, old, unsafe { *p_swapchain }, &info);
    result
}

pub unsafe extern "system" fn destroy_swapchain(
    device: vk::Device,
    swapchain: vk::SwapchainKHR,
    p_allocator: *const vk::AllocationCallbacks<'_>,
) {
    let Some(data) = device_data(device) else {
        return;
    };
    let next = next_fn!(data, destroy_swapchain);
    if let Some(tracked) = data.swapchains.remove(swapchain.as_raw()) {
        tracked.on_destroy();
        log::info!("swap-chain {:#x} destroyed", swapchain.as_raw());
    }
    unsafe { next(device, swapchain, p_allocator) };
}

fn is_acquired(result: vk::Result) -> bool {
    result == vk::Result::SUCCESS || result == vk::Result::SUBOPTIMAL_KHR
}

pub unsafe extern "system" fn acquire_next_image(
    device: vk::Device,
    swapchain: vk::SwapchainKHR,
    timeout: u64,
    semaphore: vk::Semaphore,
    fence: vk::Fence,
    p_image_index: *mut u32,
) -> vk::Result {
    let Some(data) = device_data(device) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    let next = next_fn!(data, acquire_next_image, vk::Result::ERROR_INITIALIZATION_FAILED);
    let result = unsafe { next(device, swapchain, timeout, semaphore, fence, p_image_index) };
    if is_acquired(result) {
        if let Some(tracked) = data.swapchains.get(swapchain.as_raw()) {
            tracked.set_current_back_buffer_index(unsafe { *p_image_index });
        }
    }
    result
}

pub unsafe extern "system" fn acquire_next_image2(
    device: vk::Device,
    p_acquire_info: *const vk::AcquireNextImageInfoKHR<'_>,
    p_image_index: *mut u32,
) -> vk::Result {
    let Some(data) = device_data(device) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    let next = next_fn!(data, acquire_next_image2, vk::Result::ERROR_INITIALIZATION_FAILED);
    let result = unsafe { next(device, p_acquire_info, p_image_index) };
    if is_acquired(result) {
        let swapchain = unsafe { (*p_acquire_info).swapchain };
        if let Some(tracked) = data.swapchains.get(swapchain.as_raw()) {
            tracked.set_current_back_buffer_index(unsafe { *p_image_index });
        }
    }
    result
}

pub unsafe extern "system" fn queue_present(
    queue: vk::Queue,
    p_present_info: *const vk::PresentInfoKHR<'_>,
) -> vk::Result {
    profile_scope!("vkQueuePresentKHR");
    let Some(data) = device_data(queue) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    let next = next_fn!(data, queue_present, vk::Result::ERROR_INITIALIZATION_FAILED);
    let Some(present_queue) = data.layer.as_ref().and_then(|layer| layer.queue(queue)) else {
        return unsafe { next(queue, p_present_info) };
    };

    let _guard = present_queue.lock();
    let mut info = unsafe { *p_present_info };
    let mut wait =
        unsafe { raw_slice(info.p_wait_semaphores, info.wait_semaphore_count) }.to_vec();
    for swapchain in unsafe { raw_slice(info.p_swapchains, info.swapchain_count) } {
        let Some(tracked) = data.swapchains.get(swapchain.as_raw()) else {
            continue;
        };
        if let Err(e) = tracked.on_present(&present_queue, &mut wait) {
            log::error!("present processing failed on swap-chain {:#x}: {e}", swapchain.as_raw());
        }
    }

    info.wait_semaphore_count = wait.len() as u32;
    info.p_wait_semaphores = wait.as_ptr();
    unsafe { next(queue, &info) }
}

pub unsafe extern "system" fn acquire_full_screen_exclusive_mode(
    device: vk::Device,
    swapchain: vk::SwapchainKHR,
) -> vk::Result {
    let Some(data) = device_data(device) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    let next = next_fn!(
        data,
        acquire_full_screen_exclusive_mode,
        vk::Result::ERROR_INITIALIZATION_FAILED
    );
    if let Some(tracked) = data.swapchains.get(swapchain.as_raw()) {
        if !tracked.set_fullscreen_state(true) {
            return vk::Result::ERROR_INITIALIZATION_FAILED;
        }
    }
    unsafe { next(device, swapchain) }
}

pub unsafe extern "system" fn release_full_screen_exclusive_mode(
    device: vk::Device,
    swapchain: vk::SwapchainKHR,
) -> vk::Result {
    let Some(data) = device_data(device) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    let next = next_fn!(
        data,
        release_full_screen_exclusive_mode,
        vk::Result::ERROR_INITIALIZATION_FAILED
    );
    if let Some(tracked) = data.swapchains.get(swapchain.as_raw()) {
        if !tracked.set_fullscreen_state(false) {
            return vk::Result::SUCCESS;
        }
    }
    unsafe { next(device, swapchain) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vulkan::REQUIRED_USAGE;

    #[test]
    fn test_amend_adds_transfer_usage_and_format_pair() {
        let mut info = vk::SwapchainCreateInfoKHR::default()
            .image_format(vk::Format::B8G8R8A8_UNORM)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT);

        let formats = amend_swapchain_info(&mut info, true);
        assert!(info.image_usage.contains(REQUIRED_USAGE));
        assert_eq!(
            formats,
            Some([vk::Format::B8G8R8A8_UNORM, vk::Format::B8G8R8A8_SRGB])
        );
    }

    #[test]
    fn test_amend_respects_existing_format_list() {
        let formats = [vk::Format::R8G8B8A8_UNORM];
        let mut list = vk::ImageFormatListCreateInfo::default().view_formats(&formats);
        let mut info = vk::SwapchainCreateInfoKHR::default()
            .image_format(vk::Format::R8G8B8A8_UNORM)
            .push_next(&mut list);

        assert_eq!(amend_swapchain_info(&mut info, true), None);
        let mut plain = vk::SwapchainCreateInfoKHR::default().image_format(vk::Format::R8G8B8A8_UNORM);
        assert_eq!(amend_swapchain_info(&mut plain, false), None);
    }

    #[test]
    fn test_suboptimal_acquire_counts() {
        assert!(is_acquired(vk::Result::SUCCESS));
        assert!(is_acquired(vk::Result::SUBOPTIMAL_KHR));
        assert!(!is_acquired(vk::Result::NOT_READY));
        assert!(!is_acquired(vk::Result::ERROR_OUT_OF_DATE_KHR));
    }
}
