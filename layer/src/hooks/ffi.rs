//! Structures of the loader/layer interface and small pointer helpers.
//!
//! The loader passes these through the `pNext` chains of
//! `VkInstanceCreateInfo` and `VkDeviceCreateInfo`. They are not part of the
//! core API, so they are declared here with the loader's C layout.

use std::ffi::{CStr, c_char, c_void};
use std::ptr::NonNull;

use ash::vk;
use ash::vk::Handle;

use crate::vulkan::SetDeviceLoaderDataFn;

/// Interface version this layer implements.
pub const LOADER_LAYER_INTERFACE_VERSION: u32 = 2;

/// `LAYER_NEGOTIATE_INTERFACE_STRUCT`
pub const LAYER_NEGOTIATE_INTERFACE_STRUCT: i32 = 1;

/// `VkLayerFunction` values.
pub const LAYER_LINK_INFO: i32 = 0;
pub const LOADER_DATA_CALLBACK: i32 = 1;

pub type GetPhysicalDeviceProcAddrFn =
    unsafe extern "system" fn(vk::Instance, *const c_char) -> vk::PFN_vkVoidFunction;

pub type SetInstanceLoaderDataFn =
    unsafe extern "system" fn(vk::Instance, *mut c_void) -> vk::Result;

#[repr(C)]
pub struct NegotiateLayerInterface {
    pub s_type: i32,
    pub p_next: *mut c_void,
    pub loader_layer_interface_version: u32,
    pub pfn_get_instance_proc_addr: Option<vk::PFN_vkGetInstanceProcAddr>,
    pub pfn_get_device_proc_addr: Option<vk::PFN_vkGetDeviceProcAddr>,
    pub pfn_get_physical_device_proc_addr: Option<GetPhysicalDeviceProcAddrFn>,
}

#[repr(C)]
pub struct LayerInstanceLink {
    pub p_next: *mut LayerInstanceLink,
    pub pfn_next_get_instance_proc_addr: Option<vk::PFN_vkGetInstanceProcAddr>,
    pub pfn_next_get_physical_device_proc_addr: Option<GetPhysicalDeviceProcAddrFn>,
}

#[repr(C)]
pub union LayerInstanceCreateInfoPayload {
    pub layer_info: *mut LayerInstanceLink,
    pub set_instance_loader_data: Option<SetInstanceLoaderDataFn>,
    /// `layerDevice` pair of the loader's union, the largest member.
    _layer_device: [*const c_void; 2],
}

#[repr(C)]
pub struct LayerInstanceCreateInfo {
    pub s_type: vk::StructureType,
    pub p_next: *const c_void,
    pub function: i32,
    pub u: LayerInstanceCreateInfoPayload,
}

#[repr(C)]
pub struct LayerDeviceLink {
    pub p_next: *mut LayerDeviceLink,
    pub pfn_next_get_instance_proc_addr: Option<vk::PFN_vkGetInstanceProcAddr>,
    pub pfn_next_get_device_proc_addr: Option<vk::PFN_vkGetDeviceProcAddr>,
}

#[repr(C)]
pub union LayerDeviceCreateInfoPayload {
    pub layer_info: *mut LayerDeviceLink,
    pub set_device_loader_data: Option<SetDeviceLoaderDataFn>,
}

#[repr(C)]
pub struct LayerDeviceCreateInfo {
    pub s_type: vk::StructureType,
    pub p_next: *const c_void,
    pub function: i32,
    pub u: LayerDeviceCreateInfoPayload,
}

/// Walk a `pNext` chain looking for a loader structure.
///
/// # Safety
///
/// `p_next` must be a valid Vulkan structure chain.
unsafe fn find_loader_info<T>(
    mut p_next: *const c_void,
    s_type: vk::StructureType,
    function: i32,
    header: impl Fn(*mut T) -> (vk::StructureType, *const c_void, i32),
) -> Option<NonNull<T>> {
    while let Some(info) = NonNull::new(p_next.cast_mut().cast::<T>()) {
        let (ty, next, func) = header(info.as_ptr());
        if ty == s_type && func == function {
            return Some(info);
        }
        p_next = next;
    }
    None
}

/// Find the loader's instance create info carrying `function`.
///
/// # Safety
///
/// `create_info` must point to a valid `VkInstanceCreateInfo`.
pub unsafe fn find_instance_link(
    create_info: *const vk::InstanceCreateInfo<'_>,
    function: i32,
) -> Option<NonNull<LayerInstanceCreateInfo>> {
    let create_info = unsafe { create_info.as_ref() }?;
    unsafe {
        find_loader_info(
            create_info.p_next,
            vk::StructureType::LOADER_INSTANCE_CREATE_INFO,
            function,
            |info: *mut LayerInstanceCreateInfo| ((*info).s_type, (*info).p_next, (*info).function),
        )
    }
}

/// Find the loader's device create info carrying `function`.
///
/// # Safety
///
/// `create_info` must point to a valid `VkDeviceCreateInfo`.
pub unsafe fn find_device_link(
    create_info: *const vk::DeviceCreateInfo<'_>,
    function: i32,
) -> Option<NonNull<LayerDeviceCreateInfo>> {
    let create_info = unsafe { create_info.as_ref() }?;
    unsafe {
        find_loader_info(
            create_info.p_next,
            vk::StructureType::LOADER_DEVICE_CREATE_INFO,
            function,
            |info: *mut LayerDeviceCreateInfo| ((*info).s_type, (*info).p_next, (*info).function),
        )
    }
}

/// Find an extension structure in a `pNext` chain.
///
/// # Safety
///
/// `p_next` must be a valid Vulkan structure chain that outlives `'a`.
pub unsafe fn find_in_chain<'a, T: vk::TaggedStructure>(mut p_next: *const c_void) -> Option<&'a T> {
    while let Some(base) = unsafe { p_next.cast::<vk::BaseInStructure<'_>>().as_ref() } {
        if base.s_type == T::STRUCTURE_TYPE {
            return unsafe { p_next.cast::<T>().as_ref() };
        }
        p_next = base.p_next.cast();
    }
    None
}

/// Key the loader's dispatch tables are indexed by.
///
/// Every dispatchable object starts with a pointer to its dispatch table, so
/// an instance and its physical devices share a key, as do a device and its
/// queues and command buffers.
///
/// # Safety
///
/// `object` must be null or a valid dispatchable handle.
pub unsafe fn dispatch_key<H: Handle>(object: H) -> u64 {
    let raw = object.as_raw() as *const usize;
    if raw.is_null() {
        return 0;
    }
    unsafe { *raw as u64 }
}

/// View a count/pointer pair as a slice.
///
/// # Safety
///
/// `ptr` must be null or point to `len` initialized elements that outlive `'a`.
pub unsafe fn raw_slice<'a, T>(ptr: *const T, len: u32) -> &'a [T] {
    if ptr.is_null() || len == 0 {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(ptr, len as usize) }
    }
}

/// Copy a list of C extension names.
///
/// # Safety
///
/// Same as [`raw_slice`]; every element must be a valid C string.
pub unsafe fn c_string_list(names: *const *const c_char, len: u32) -> Vec<std::ffi::CString> {
    unsafe { raw_slice(names, len) }
        .iter()
        .filter(|name| !name.is_null())
        .map(|name| unsafe { CStr::from_ptr(*name) }.to_owned())
        .collect()
}

/// Turn a resolved function into the pointer shape ash's loaders expect.
pub fn proc_ptr(f: vk::PFN_vkVoidFunction) -> *const c_void {
    f.map_or(std::ptr::null(), |f| f as *const c_void)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_slice_of_null_is_empty() {
        let empty: &[u32] = unsafe { raw_slice(std::ptr::null(), 4) };
        assert!(empty.is_empty());

        let values = [1u32, 2, 3];
        let view = unsafe { raw_slice(values.as_ptr(), 2) };
        assert_eq!(view, &[1, 2]);
    }

    #[test]
    fn test_dispatch_key_reads_first_word() {
        let table = 0xfeed_usize;
        let object = [table, 7];
        let handle = vk::Device::from_raw(object.as_ptr() as u64);
        assert_eq!(unsafe { dispatch_key(handle) }, 0xfeed);
        assert_eq!(unsafe { dispatch_key(vk::Device::null()) }, 0);
    }

    #[test]
    fn test_find_device_link_skips_other_functions() {
        let mut link = LayerDeviceLink {
            p_next: std::ptr::null_mut(),
            pfn_next_get_instance_proc_addr: None,
            pfn_next_get_device_proc_addr: None,
        };
        let callback = LayerDeviceCreateInfo {
            s_type: vk::StructureType::LOADER_DEVICE_CREATE_INFO,
            p_next: std::ptr::null(),
            function: LOADER_DATA_CALLBACK,
            u: LayerDeviceCreateInfoPayload { set_device_loader_data: None },
        };
        let link_info = LayerDeviceCreateInfo {
            s_type: vk::StructureType::LOADER_DEVICE_CREATE_INFO,
            p_next: (&callback as *const LayerDeviceCreateInfo).cast(),
            function: LAYER_LINK_INFO,
            u: LayerDeviceCreateInfoPayload { layer_info: &mut link },
        };
        let mut create_info = vk::DeviceCreateInfo::default();
        create_info.p_next = (&link_info as *const LayerDeviceCreateInfo).cast();

        let found = unsafe { find_device_link(&create_info, LOADER_DATA_CALLBACK) };
        assert_eq!(found.map(|p| p.as_ptr().cast_const()), Some(&callback as *const _));
        let found = unsafe { find_device_link(&create_info, LAYER_LINK_INFO) };
        assert_eq!(found.map(|p| p.as_ptr().cast_const()), Some(&link_info as *const _));
    }

    #[test]
    fn test_find_in_chain() {
        let formats = [vk::Format::R8G8B8A8_UNORM, vk::Format::R8G8B8A8_SRGB];
        let list = vk::ImageFormatListCreateInfo::default().view_formats(&formats);
        let info = vk::SwapchainCreateInfoKHR {
            p_next: (&list as *const vk::ImageFormatListCreateInfo<'_>).cast(),
            ..Default::default()
        };

        let found = unsafe { find_in_chain::<vk::ImageFormatListCreateInfo<'_>>(info.p_next) };
        assert_eq!(found.map(|l| l.view_format_count), Some(2));
        let missing = unsafe { find_in_chain::<vk::PhysicalDeviceFeatures2<'_>>(info.p_next) };
        assert!(missing.is_none());
    }
}
