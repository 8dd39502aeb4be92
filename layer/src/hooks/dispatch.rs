//! Per-instance and per-device dispatch state.
//!
//! Both tables are keyed by the loader dispatch key of the handle (see
//! [`dispatch_key`]), so any dispatchable child object resolves to its parent.

use std::ffi::{CStr, CString, c_char};
use std::sync::{Arc, LazyLock};

use ash::vk;

use super::ffi::{GetPhysicalDeviceProcAddrFn, dispatch_key};
use super::{commands, device, instance, resources, swapchain};
use crate::config::MIN_REGISTRY_CAPACITY;
use crate::registry::HandleMap;
use crate::vulkan::{VulkanDevice, VulkanSwapchain};

pub struct InstanceData {
    /// Instance functions of the next layer.
    pub instance: ash::Instance,
    pub next_get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
    pub next_get_physical_device_proc_addr: Option<GetPhysicalDeviceProcAddrFn>,
    pub api_version: u32,
    pub enabled_extensions: Vec<CString>,
}

impl InstanceData {
    pub fn has_extension(&self, name: &CStr) -> bool {
        self.enabled_extensions.iter().any(|ext| ext.as_c_str() == name)
    }
}

/// Resolve `name` through a device resolver and cast it to `F`.
///
/// # Safety
///
/// `F` must be the function pointer type of the command called `name`.
pub unsafe fn load_device_fn<F: Copy>(
    get_device_proc_addr: vk::PFN_vkGetDeviceProcAddr,
    device: vk::Device,
    name: &CStr,
) -> Option<F> {
    debug_assert_eq!(size_of::<F>(), size_of::<unsafe extern "system" fn()>());
    let f = unsafe { get_device_proc_addr(device, name.as_ptr()) }?;
    Some(unsafe { std::mem::transmute_copy::<unsafe extern "system" fn(), F>(&f) })
}

macro_rules! next_device_fns {
    ($($field:ident: $pfn:ident = $name:literal,)*) => {
        /// Entry points of the next layer for every intercepted device command.
        ///
        /// A field is `None` when the command is not available on the device.
        #[derive(Clone, Copy)]
        pub struct NextDeviceFns {
            $(pub $field: Option<vk::$pfn>,)*
        }

        impl NextDeviceFns {
            /// # Safety
            ///
            /// `device` must be a device created through `get_device_proc_addr`'s chain.
            pub unsafe fn load(
                get_device_proc_addr: vk::PFN_vkGetDeviceProcAddr,
                device: vk::Device,
            ) -> Self {
                Self {
                    $($field: unsafe { load_device_fn(get_device_proc_addr, device, $name) },)*
                }
            }
        }
    };
}

next_device_fns! {
    destroy_device: PFN_vkDestroyDevice = c"vkDestroyDevice",
    create_image: PFN_vkCreateImage = c"vkCreateImage",
    destroy_image: PFN_vkDestroyImage = c"vkDestroyImage",
    create_buffer: PFN_vkCreateBuffer = c"vkCreateBuffer",
    destroy_buffer: PFN_vkDestroyBuffer = c"vkDestroyBuffer",
    create_image_view: PFN_vkCreateImageView = c"vkCreateImageView",
    destroy_image_view: PFN_vkDestroyImageView = c"vkDestroyImageView",
    create_buffer_view: PFN_vkCreateBufferView = c"vkCreateBufferView",
    destroy_buffer_view: PFN_vkDestroyBufferView = c"vkDestroyBufferView",
    create_sampler: PFN_vkCreateSampler = c"vkCreateSampler",
    destroy_sampler: PFN_vkDestroySampler = c"vkDestroySampler",
    create_render_pass: PFN_vkCreateRenderPass = c"vkCreateRenderPass",
    create_render_pass2: PFN_vkCreateRenderPass2 = c"vkCreateRenderPass2",
    destroy_render_pass: PFN_vkDestroyRenderPass = c"vkDestroyRenderPass",
    create_framebuffer: PFN_vkCreateFramebuffer = c"vkCreateFramebuffer",
    destroy_framebuffer: PFN_vkDestroyFramebuffer = c"vkDestroyFramebuffer",
    destroy_command_pool: PFN_vkDestroyCommandPool = c"vkDestroyCommandPool",
    reset_command_pool: PFN_vkResetCommandPool = c"vkResetCommandPool",
    allocate_command_buffers: PFN_vkAllocateCommandBuffers = c"vkAllocateCommandBuffers",
    free_command_buffers: PFN_vkFreeCommandBuffers = c"vkFreeCommandBuffers",
    begin_command_buffer: PFN_vkBeginCommandBuffer = c"vkBeginCommandBuffer",
    end_command_buffer: PFN_vkEndCommandBuffer = c"vkEndCommandBuffer",
    reset_command_buffer: PFN_vkResetCommandBuffer = c"vkResetCommandBuffer",
    queue_submit: PFN_vkQueueSubmit = c"vkQueueSubmit",
    create_swapchain: PFN_vkCreateSwapchainKHR = c"vkCreateSwapchainKHR",
    destroy_swapchain: PFN_vkDestroySwapchainKHR = c"vkDestroySwapchainKHR",
    acquire_next_image: PFN_vkAcquireNextImageKHR = c"vkAcquireNextImageKHR",
    acquire_next_image2: PFN_vkAcquireNextImage2KHR = c"vkAcquireNextImage2KHR",
    queue_present: PFN_vkQueuePresentKHR = c"vkQueuePresentKHR",
    acquire_full_screen_exclusive_mode: PFN_vkAcquireFullScreenExclusiveModeEXT =
        c"vkAcquireFullScreenExclusiveModeEXT",
    release_full_screen_exclusive_mode: PFN_vkReleaseFullScreenExclusiveModeEXT =
        c"vkReleaseFullScreenExclusiveModeEXT",
}

pub struct DeviceData {
    pub handle: vk::Device,
    pub next_get_device_proc_addr: vk::PFN_vkGetDeviceProcAddr,
    pub next: NextDeviceFns,
    /// `None` in pass-through mode or when the adapter failed to initialize.
    pub layer: Option<Arc<VulkanDevice>>,
    pub swapchains: HandleMap<VulkanSwapchain>,
}

impl DeviceData {
    /// Resolve a device command through the next layer.
    pub fn next_proc_addr(&self, name: *const c_char) -> vk::PFN_vkVoidFunction {
        unsafe { (self.next_get_device_proc_addr)(self.handle, name) }
    }
}

static INSTANCES: LazyLock<HandleMap<InstanceData>> =
    LazyLock::new(|| HandleMap::with_capacity(MIN_REGISTRY_CAPACITY));
static DEVICES: LazyLock<HandleMap<DeviceData>> =
    LazyLock::new(|| HandleMap::with_capacity(MIN_REGISTRY_CAPACITY));

pub fn instances() -> &'static HandleMap<InstanceData> {
    &INSTANCES
}

pub fn devices() -> &'static HandleMap<DeviceData> {
    &DEVICES
}

/// Dispatch state of the instance owning `object`.
pub fn instance_data<H: vk::Handle + Copy>(object: H) -> Option<Arc<InstanceData>> {
    INSTANCES.get(unsafe { dispatch_key(object) })
}

/// Dispatch state of the device owning `object`.
pub fn device_data<H: vk::Handle + Copy>(object: H) -> Option<Arc<DeviceData>> {
    let data = DEVICES.get(unsafe { dispatch_key(object) });
    if data.is_none() {
        log::warn!("call on unknown device object {:#x}", object.as_raw());
    }
    data
}

macro_rules! hook {
    ($f:path) => {
        Some(unsafe { std::mem::transmute::<*const (), unsafe extern "system" fn()>($f as *const ()) })
    };
}

/// Intercepted commands that are resolved without an instance.
fn global_hook(name: &CStr) -> vk::PFN_vkVoidFunction {
    match name.to_bytes() {
        b"vkGetInstanceProcAddr" => hook!(get_instance_proc_addr),
        b"vkCreateInstance" => hook!(instance::create_instance),
        _ => None,
    }
}

/// Intercepted instance commands.
fn instance_hook(name: &CStr) -> vk::PFN_vkVoidFunction {
    match name.to_bytes() {
        b"vkDestroyInstance" => hook!(instance::destroy_instance),
        b"vkCreateDevice" => hook!(device::create_device),
        _ => None,
    }
}

/// Intercepted device commands.
fn device_hook(name: &CStr) -> vk::PFN_vkVoidFunction {
    match name.to_bytes() {
        b"vkGetDeviceProcAddr" => hook!(get_device_proc_addr),
        b"vkDestroyDevice" => hook!(device::destroy_device),
        b"vkCreateImage" => hook!(resources::create_image),
        b"vkDestroyImage" => hook!(resources::destroy_image),
        b"vkCreateBuffer" => hook!(resources::create_buffer),
        b"vkDestroyBuffer" => hook!(resources::destroy_buffer),
        b"vkCreateImageView" => hook!(resources::create_image_view),
        b"vkDestroyImageView" => hook!(resources::destroy_image_view),
        b"vkCreateBufferView" => hook!(resources::create_buffer_view),
        b"vkDestroyBufferView" => hook!(resources::destroy_buffer_view),
        b"vkCreateSampler" => hook!(resources::create_sampler),
        b"vkDestroySampler" => hook!(resources::destroy_sampler),
        b"vkCreateRenderPass" => hook!(resources::create_render_pass),
        b"vkCreateRenderPass2" | b"vkCreateRenderPass2KHR" => hook!(resources::create_render_pass2),
        b"vkDestroyRenderPass" => hook!(resources::destroy_render_pass),
        b"vkCreateFramebuffer" => hook!(resources::create_framebuffer),
        b"vkDestroyFramebuffer" => hook!(resources::destroy_framebuffer),
        b"vkDestroyCommandPool" => hook!(commands::destroy_command_pool),
        b"vkResetCommandPool" => hook!(commands::reset_command_pool),
        b"vkAllocateCommandBuffers" => hook!(commands::allocate_command_buffers),
        b"vkFreeCommandBuffers" => hook!(commands::free_command_buffers),
        b"vkBeginCommandBuffer" => hook!(commands::begin_command_buffer),
        b"vkEndCommandBuffer" => hook!(commands::end_command_buffer),
        b"vkResetCommandBuffer" => hook!(commands::reset_command_buffer),
        b"vkQueueSubmit" => hook!(commands::queue_submit),
        b"vkCreateSwapchainKHR" => hook!(swapchain::create_swapchain),
        b"vkDestroySwapchainKHR" => hook!(swapchain::destroy_swapchain),
        b"vkAcquireNextImageKHR" => hook!(swapchain::acquire_next_image),
        b"vkAcquireNextImage2KHR" => hook!(swapchain::acquire_next_image2),
        b"vkQueuePresentKHR" => hook!(swapchain::queue_present),
        b"vkAcquireFullScreenExclusiveModeEXT" => {
            hook!(swapchain::acquire_full_screen_exclusive_mode)
        }
        b"vkReleaseFullScreenExclusiveModeEXT" => {
            hook!(swapchain::release_full_screen_exclusive_mode)
        }
        _ => None,
    }
}

/// `vkGetInstanceProcAddr` of this layer.
pub unsafe extern "system" fn get_instance_proc_addr(
    instance: vk::Instance,
    p_name: *const c_char,
) -> vk::PFN_vkVoidFunction {
    if p_name.is_null() {
        return None;
    }
    let name = unsafe { CStr::from_ptr(p_name) };
    if let Some(f) = global_hook(name) {
        return Some(f);
    }
    if instance == vk::Instance::null() {
        return None;
    }
    if let Some(f) = instance_hook(name).or_else(|| device_hook(name)) {
        return Some(f);
    }
    let data = instance_data(instance)?;
    unsafe { (data.next_get_instance_proc_addr)(instance, p_name) }
}

/// `vkGetDeviceProcAddr` of this layer.
///
/// Intercepted commands are only handed out when the next layer provides
/// them, so disabled extensions keep resolving to null.
pub unsafe extern "system" fn get_device_proc_addr(
    device: vk::Device,
    p_name: *const c_char,
) -> vk::PFN_vkVoidFunction {
    if p_name.is_null() || device == vk::Device::null() {
        return None;
    }
    let name = unsafe { CStr::from_ptr(p_name) };
    let data = device_data(device)?;
    let next = data.next_proc_addr(p_name);
    match device_hook(name) {
        Some(f) if next.is_some() || name == c"vkGetDeviceProcAddr" => Some(f),
        _ => next,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_tables_are_disjoint() {
        let names: [&CStr; 4] = [
            c"vkCreateInstance",
            c"vkCreateDevice",
            c"vkQueuePresentKHR",
            c"vkCreateRenderPass2KHR",
        ];
        let hits = |name: &CStr| {
            [global_hook(name), instance_hook(name), device_hook(name)]
                .iter()
                .filter(|f| f.is_some())
                .count()
        };
        for name in names {
            assert_eq!(hits(name), 1, "{name:?}");
        }
        assert_eq!(hits(c"vkCmdDraw"), 0);
    }

    #[test]
    fn test_unknown_objects_have_no_dispatch_state() {
        assert!(device_data(vk::Device::null()).is_none());
        assert!(device_data(vk::Queue::null()).is_none());
        assert!(instance_data(vk::Instance::null()).is_none());
    }

    #[test]
    fn test_proc_addr_rejects_null_name() {
        let f = unsafe { get_instance_proc_addr(vk::Instance::null(), std::ptr::null()) };
        assert!(f.is_none());
        let f = unsafe { get_instance_proc_addr(vk::Instance::null(), c"vkCreateInstance".as_ptr()) };
        assert!(f.is_some());
        let f = unsafe { get_instance_proc_addr(vk::Instance::null(), c"vkCreateDevice".as_ptr()) };
        assert!(f.is_none());
    }
}
