//! Device creation and destruction.

use std::ffi::{CStr, CString};

use ash::vk;
use ash::vk::Handle;

use super::dispatch::{
    DeviceData, InstanceData, NextDeviceFns, devices, instance_data, load_device_fn,
};
use super::ffi::{
    LAYER_LINK_INFO, LOADER_DATA_CALLBACK, c_string_list, dispatch_key, find_device_link,
    find_in_chain, proc_ptr, raw_slice,
};
use crate::config::{LayerConfig, MIN_REGISTRY_CAPACITY};
use crate::profile_scope;
use crate::registry::HandleMap;
use crate::vulkan::{DeviceParams, QueueInfo, SetDeviceLoaderDataFn, VulkanDevice};

fn contains(list: &[CString], name: &CStr) -> bool {
    list.iter().any(|ext| ext.as_c_str() == name)
}

/// Add the extensions the layer relies on to an application's list.
///
/// `VK_KHR_push_descriptor` is added whenever it is supported and wanted.
/// `VK_KHR_swapchain_mutable_format` and `VK_KHR_image_format_list` are added
/// together, only for swap-chain devices, and only when `maintenance2` is
/// available through the API version or the application's own list.
pub fn augment_device_extensions(
    mut enabled: Vec<CString>,
    supported: &[CString],
    api_version: u32,
    push_descriptors: bool,
) -> Vec<CString> {
    let add = |enabled: &mut Vec<CString>, name: &CStr| {
        if !contains(enabled, name) && contains(supported, name) {
            enabled.push(name.to_owned());
        }
    };

    if push_descriptors {
        add(&mut enabled, ash::khr::push_descriptor::NAME);
    }

    let has_maintenance2 = api_version >= vk::API_VERSION_1_1
        || contains(&enabled, ash::khr::maintenance2::NAME);
    if contains(&enabled, ash::khr::swapchain::NAME)
        && has_maintenance2
        && contains(supported, ash::khr::swapchain_mutable_format::NAME)
        && contains(supported, ash::khr::image_format_list::NAME)
    {
        add(&mut enabled, ash::khr::image_format_list::NAME);
        add(&mut enabled, ash::khr::swapchain_mutable_format::NAME);
    }
    enabled
}

/// Native queues created with the device.
unsafe fn collect_queues(
    instance: &InstanceData,
    physical_device: vk::PhysicalDevice,
    native: &ash::Device,
    create_info: &vk::DeviceCreateInfo<'_>,
) -> Vec<QueueInfo> {
    let families = unsafe {
        instance
            .instance
            .get_physical_device_queue_family_properties(physical_device)
    };
    let queue_infos = unsafe {
        raw_slice(
            create_info.p_queue_create_infos,
            create_info.queue_create_info_count,
        )
    };

    let mut queues = Vec::new();
    for queue_info in queue_infos {
        let flags = families
            .get(queue_info.queue_family_index as usize)
            .map_or(vk::QueueFlags::empty(), |family| family.queue_flags);
        for index in 0..queue_info.queue_count {
            let queue = if queue_info.flags.is_empty() {
                unsafe { native.get_device_queue(queue_info.queue_family_index, index) }
            } else {
                let info = vk::DeviceQueueInfo2::default()
                    .flags(queue_info.flags)
                    .queue_family_index(queue_info.queue_family_index)
                    .queue_index(index);
                unsafe { native.get_device_queue2(&info) }
            };
            if queue != vk::Queue::null() {
                queues.push(QueueInfo {
                    queue,
                    family_index: queue_info.queue_family_index,
                    flags,
                });
            }
        }
    }
    queues
}

pub unsafe extern "system" fn create_device(
    physical_device: vk::PhysicalDevice,
    p_create_info: *const vk::DeviceCreateInfo<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
    p_device: *mut vk::Device,
) -> vk::Result {
    profile_scope!("vkCreateDevice");
    let Some(instance) = instance_data(physical_device) else {
        log::error!("vkCreateDevice on an unknown physical device");
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };

    let Some(mut link_info) = (unsafe { find_device_link(p_create_info, LAYER_LINK_INFO) }) else {
        log::error!("vkCreateDevice called without a layer link");
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let link = unsafe {
        let link_info = link_info.as_mut();
        let Some(link) = link_info.u.layer_info.as_ref() else {
            return vk::Result::ERROR_INITIALIZATION_FAILED;
        };
        link_info.u.layer_info = link.p_next;
        link
    };
    let (Some(next_gipa), Some(next_gdpa)) = (
        link.pfn_next_get_instance_proc_addr,
        link.pfn_next_get_device_proc_addr,
    ) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let set_loader_data: Option<SetDeviceLoaderDataFn> =
        unsafe { find_device_link(p_create_info, LOADER_DATA_CALLBACK) }
            .and_then(|info| unsafe { info.as_ref().u.set_device_loader_data });

    let Some(next_create) =
        (unsafe { next_gipa(instance.instance.handle(), c"vkCreateDevice".as_ptr()) })
    else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let next_create: vk::PFN_vkCreateDevice = unsafe { std::mem::transmute(next_create) };

    let config = LayerConfig::global();
    let app_info = unsafe { &*p_create_info };
    let requested = unsafe {
        c_string_list(
            app_info.pp_enabled_extension_names,
            app_info.enabled_extension_count,
        )
    };
    let properties = unsafe {
        instance
            .instance
            .get_physical_device_properties(physical_device)
    };
    let api_version = instance.api_version.min(properties.api_version);

    let enabled_extensions = if config.disabled {
        requested
    } else {
        let supported: Vec<CString> = unsafe {
            instance
                .instance
                .enumerate_device_extension_properties(physical_device)
        }
        .unwrap_or_default()
        .iter()
        .filter_map(|ext| ext.extension_name_as_c_str().ok().map(CStr::to_owned))
        .collect();
        augment_device_extensions(requested, &supported, api_version, config.push_descriptors)
    };
    let extension_ptrs: Vec<_> = enabled_extensions.iter().map(|ext| ext.as_ptr()).collect();
    let mut create_info = *app_info;
    create_info.enabled_extension_count = extension_ptrs.len() as u32;
    create_info.pp_enabled_extension_names = extension_ptrs.as_ptr();

    let result = unsafe { next_create(physical_device, &create_info, p_allocator, p_device) };
    if result != vk::Result::SUCCESS {
        log::error!("vkCreateDevice failed: {result:?}");
        return result;
    }

    let handle = unsafe { *p_device };
    let native = unsafe {
        ash::Device::load_with(|name| proc_ptr(next_gdpa(handle, name.as_ptr())), handle)
    };
    let mut next = unsafe { NextDeviceFns::load(next_gdpa, handle) };
    if next.create_render_pass2.is_none() {
        next.create_render_pass2 =
            unsafe { load_device_fn(next_gdpa, handle, c"vkCreateRenderPass2KHR") };
    }

    let layer = if config.disabled {
        log::info!("device {:#x} created in pass-through mode", handle.as_raw());
        None
    } else {
        let enabled_features = unsafe { app_info.p_enabled_features.as_ref() }
            .copied()
            .or_else(|| {
                unsafe { find_in_chain::<vk::PhysicalDeviceFeatures2<'_>>(app_info.p_next) }
                    .map(|features| features.features)
            })
            .unwrap_or_default();
        let queues = unsafe { collect_queues(&instance, physical_device, &native, app_info) };
        if let Some(set_loader_data) = set_loader_data {
            for queue in &queues {
                let result = unsafe {
                    set_loader_data(handle, queue.queue.as_raw() as *mut std::ffi::c_void)
                };
                if result != vk::Result::SUCCESS {
                    log::warn!("vkSetDeviceLoaderData failed on queue: {result:?}");
                }
            }
        }
        let params = DeviceParams {
            instance: instance.instance.clone(),
            physical_device,
            device: native,
            enabled_extensions,
            enabled_features,
            debug_utils: instance.has_extension(ash::ext::debug_utils::NAME),
            queues,
            set_loader_data,
            config: config.clone(),
        };
        match VulkanDevice::new(params) {
            Ok(device) => Some(device),
            Err(e) => {
                log::error!(
                    "device {:#x} passes through untracked: {e}",
                    handle.as_raw()
                );
                None
            }
        }
    };

    let data = DeviceData {
        handle,
        next_get_device_proc_addr: next_gdpa,
        next,
        layer,
        swapchains: HandleMap::with_capacity(MIN_REGISTRY_CAPACITY),
    };
    if let Err(e) = devices().insert(unsafe { dispatch_key(handle) }, data) {
        log::error!("failed to track device {:#x}: {e}", handle.as_raw());
    }
    vk::Result::SUCCESS
}

pub unsafe extern "system" fn destroy_device(
    device: vk::Device,
    p_allocator: *const vk::AllocationCallbacks<'_>,
) {
    if device == vk::Device::null() {
        return;
    }
    let Some(data) = devices().remove(unsafe { dispatch_key(device) }) else {
        log::warn!("vkDestroyDevice on unknown device {:#x}", device.as_raw());
        return;
    };

    for (raw, swapchain) in data.swapchains.drain() {
        log::warn!("swap-chain {raw:#x} still alive at device destruction");
        swapchain.on_destroy();
    }
    if let Some(layer) = &data.layer {
        layer.shutdown();
    }
    if let Some(destroy) = data.next.destroy_device {
        unsafe { destroy(device, p_allocator) };
    }
    log::info!("device {:#x} destroyed", device.as_raw());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&CStr]) -> Vec<CString> {
        list.iter().map(|name| (*name).to_owned()).collect()
    }

    #[test]
    fn test_push_descriptor_added_when_supported() {
        let supported = names(&[ash::khr::push_descriptor::NAME]);
        let enabled = augment_device_extensions(Vec::new(), &supported, vk::API_VERSION_1_0, true);
        assert_eq!(enabled, supported);

        let enabled = augment_device_extensions(Vec::new(), &supported, vk::API_VERSION_1_0, false);
        assert!(enabled.is_empty());
        let enabled = augment_device_extensions(Vec::new(), &[], vk::API_VERSION_1_3, true);
        assert!(enabled.is_empty());
    }

    #[test]
    fn test_mutable_format_needs_swapchain_and_maintenance2() {
        let supported = names(&[
            ash::khr::swapchain::NAME,
            ash::khr::swapchain_mutable_format::NAME,
            ash::khr::image_format_list::NAME,
            ash::khr::maintenance2::NAME,
        ]);

        let without_swapchain =
            augment_device_extensions(Vec::new(), &supported, vk::API_VERSION_1_2, false);
        assert!(without_swapchain.is_empty());

        let app = names(&[ash::khr::swapchain::NAME]);
        let old_api = augment_device_extensions(app.clone(), &supported, vk::API_VERSION_1_0, false);
        assert_eq!(old_api, app);

        let enabled = augment_device_extensions(app.clone(), &supported, vk::API_VERSION_1_1, false);
        assert!(contains(&enabled, ash::khr::swapchain_mutable_format::NAME));
        assert!(contains(&enabled, ash::khr::image_format_list::NAME));

        let app = names(&[ash::khr::swapchain::NAME, ash::khr::maintenance2::NAME]);
        let enabled = augment_device_extensions(app, &supported, vk::API_VERSION_1_0, false);
        assert!(contains(&enabled, ash::khr::swapchain_mutable_format::NAME));
    }

    #[test]
    fn test_augmentation_keeps_existing_entries_once() {
        let supported = names(&[ash::khr::push_descriptor::NAME]);
        let app = names(&[ash::khr::push_descriptor::NAME]);
        let enabled = augment_device_extensions(app, &supported, vk::API_VERSION_1_0, true);
        assert_eq!(enabled.len(), 1);
    }
}
