//! Loader negotiation and instance lifetime.

use std::ffi::c_char;

use ash::vk;

use super::dispatch::{self, InstanceData, instance_data, instances};
use super::ffi::{
    LAYER_LINK_INFO, LAYER_NEGOTIATE_INTERFACE_STRUCT, LOADER_LAYER_INTERFACE_VERSION,
    NegotiateLayerInterface, c_string_list, dispatch_key, find_instance_link, proc_ptr,
};

/// Entry point the loader calls first to agree on an interface version.
///
/// # Safety
///
/// Called by the Vulkan loader with a valid negotiation structure.
#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub unsafe extern "system" fn vkNegotiateLoaderLayerInterfaceVersion(
    p_version_struct: *mut NegotiateLayerInterface,
) -> vk::Result {
    crate::init();
    let Some(version) = (unsafe { p_version_struct.as_mut() }) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    if version.s_type != LAYER_NEGOTIATE_INTERFACE_STRUCT {
        log::error!("unexpected negotiation structure type {}", version.s_type);
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    }
    if version.loader_layer_interface_version < LOADER_LAYER_INTERFACE_VERSION {
        log::error!(
            "loader interface version {} is too old",
            version.loader_layer_interface_version
        );
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    }

    version.loader_layer_interface_version = LOADER_LAYER_INTERFACE_VERSION;
    version.pfn_get_instance_proc_addr = Some(dispatch::get_instance_proc_addr);
    version.pfn_get_device_proc_addr = Some(dispatch::get_device_proc_addr);
    version.pfn_get_physical_device_proc_addr = None;
    log::debug!("negotiated loader interface version {LOADER_LAYER_INTERFACE_VERSION}");
    vk::Result::SUCCESS
}

/// # Safety
///
/// Called by the Vulkan loader.
#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub unsafe extern "system" fn vkGetInstanceProcAddr(
    instance: vk::Instance,
    p_name: *const c_char,
) -> vk::PFN_vkVoidFunction {
    unsafe { dispatch::get_instance_proc_addr(instance, p_name) }
}

/// # Safety
///
/// Called by the Vulkan loader.
#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub unsafe extern "system" fn vkGetDeviceProcAddr(
    device: vk::Device,
    p_name: *const c_char,
) -> vk::PFN_vkVoidFunction {
    unsafe { dispatch::get_device_proc_addr(device, p_name) }
}

pub unsafe extern "system" fn create_instance(
    p_create_info: *const vk::InstanceCreateInfo<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
    p_instance: *mut vk::Instance,
) -> vk::Result {
    crate::init();

    let Some(mut link_info) = (unsafe { find_instance_link(p_create_info, LAYER_LINK_INFO) })
    else {
        log::error!("vkCreateInstance called without a layer link");
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    // Advance the chain so the next layer finds its own link.
    let link = unsafe {
        let link_info = link_info.as_mut();
        let Some(link) = link_info.u.layer_info.as_ref() else {
            return vk::Result::ERROR_INITIALIZATION_FAILED;
        };
        link_info.u.layer_info = link.p_next;
        link
    };
    let Some(next_gipa) = link.pfn_next_get_instance_proc_addr else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let next_gpdpa = link.pfn_next_get_physical_device_proc_addr;

    let Some(next_create) =
        (unsafe { next_gipa(vk::Instance::null(), c"vkCreateInstance".as_ptr()) })
    else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let next_create: vk::PFN_vkCreateInstance = unsafe { std::mem::transmute(next_create) };

    let result = unsafe { next_create(p_create_info, p_allocator, p_instance) };
    if result != vk::Result::SUCCESS {
        return result;
    }

    let handle = unsafe { *p_instance };
    let create_info = unsafe { &*p_create_info };
    let api_version = unsafe { create_info.p_application_info.as_ref() }
        .map(|app| app.api_version)
        .filter(|version| *version != 0)
        .unwrap_or(vk::API_VERSION_1_0);
    let enabled_extensions = unsafe {
        c_string_list(
            create_info.pp_enabled_extension_names,
            create_info.enabled_extension_count,
        )
    };

    let instance = unsafe {
        ash::Instance::load_with(
            |name| proc_ptr(next_gipa(handle, name.as_ptr())),
            handle,
        )
    };
    let data = InstanceData {
        instance,
        next_get_instance_proc_addr: next_gipa,
        next_get_physical_device_proc_addr: next_gpdpa,
        api_version,
        enabled_extensions,
    };
    if let Err(e) = instances().insert(unsafe { dispatch_key(handle) }, data) {
        log::error!("failed to track instance {:#x}: {e}", vk::Handle::as_raw(handle));
    }
    log::info!(
        "instance {:#x} created (API {}.{})",
        vk::Handle::as_raw(handle),
        vk::api_version_major(api_version),
        vk::api_version_minor(api_version)
    );
    vk::Result::SUCCESS
}

pub unsafe extern "system" fn destroy_instance(
    instance: vk::Instance,
    p_allocator: *const vk::AllocationCallbacks<'_>,
) {
    let Some(data) = instance_data(instance) else {
        return;
    };
    instances().remove(unsafe { dispatch_key(instance) });
    unsafe { (data.instance.fp_v1_0().destroy_instance)(instance, p_allocator) };
    log::info!("instance {:#x} destroyed", vk::Handle::as_raw(instance));
}
