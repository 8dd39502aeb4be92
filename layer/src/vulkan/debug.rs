//! Debug-utils integration: validation output, object names and labels.

use std::ffi::{CStr, CString};

use ash::vk;

use crate::error::LayerResult;

/// Create a messenger that routes validation output into `log`.
pub fn create_debug_messenger(
    debug_utils: &ash::ext::debug_utils::Instance,
) -> LayerResult<vk::DebugUtilsMessengerEXT> {
    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback));

    Ok(unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }?)
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    // SAFETY: the driver passes either null or valid callback data.
    let message = match unsafe { callback_data.as_ref() } {
        Some(data) if !data.p_message.is_null() => {
            // SAFETY: p_message is a null-terminated string owned by the driver.
            unsafe { CStr::from_ptr(data.p_message) }.to_string_lossy().into_owned()
        }
        _ => String::from("(no message)"),
    };

    let kind = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "Validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "Performance",
        _ => "General",
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("[Vulkan {kind}] {message}"),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("[Vulkan {kind}] {message}"),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::debug!("[Vulkan {kind}] {message}"),
        _ => log::trace!("[Vulkan {kind}] {message}"),
    }

    vk::FALSE
}

/// Convert a label to a C string, dropping interior nul bytes.
pub fn label_cstring(label: &str) -> CString {
    CString::new(label.replace('\0', "")).unwrap_or_default()
}

/// Attach a debug name to a native object.
pub fn set_object_name<H: vk::Handle>(
    debug_utils: &ash::ext::debug_utils::Device,
    handle: H,
    name: &str,
) {
    let name = label_cstring(name);
    let info = vk::DebugUtilsObjectNameInfoEXT::default()
        .object_handle(handle)
        .object_name(&name);
    if let Err(e) = unsafe { debug_utils.set_debug_utils_object_name(&info) } {
        log::debug!("failed to set object name: {e:?}");
    }
}

pub fn cmd_begin_label(
    debug_utils: &ash::ext::debug_utils::Device,
    cmd: vk::CommandBuffer,
    label: &str,
    color: [f32; 4],
) {
    let name = label_cstring(label);
    let info = vk::DebugUtilsLabelEXT::default().label_name(&name).color(color);
    unsafe { debug_utils.cmd_begin_debug_utils_label(cmd, &info) };
}

pub fn cmd_end_label(debug_utils: &ash::ext::debug_utils::Device, cmd: vk::CommandBuffer) {
    unsafe { debug_utils.cmd_end_debug_utils_label(cmd) };
}

pub fn cmd_insert_label(
    debug_utils: &ash::ext::debug_utils::Device,
    cmd: vk::CommandBuffer,
    label: &str,
    color: [f32; 4],
) {
    let name = label_cstring(label);
    let info = vk::DebugUtilsLabelEXT::default().label_name(&name).color(color);
    unsafe { debug_utils.cmd_insert_debug_utils_label(cmd, &info) };
}

pub fn queue_begin_label(
    debug_utils: &ash::ext::debug_utils::Device,
    queue: vk::Queue,
    label: &str,
    color: [f32; 4],
) {
    let name = label_cstring(label);
    let info = vk::DebugUtilsLabelEXT::default().label_name(&name).color(color);
    unsafe { debug_utils.queue_begin_debug_utils_label(queue, &info) };
}

pub fn queue_end_label(debug_utils: &ash::ext::debug_utils::Device, queue: vk::Queue) {
    unsafe { debug_utils.queue_end_debug_utils_label(queue) };
}

pub fn queue_insert_label(
    debug_utils: &ash::ext::debug_utils::Device,
    queue: vk::Queue,
    label: &str,
    color: [f32; 4],
) {
    let name = label_cstring(label);
    let info = vk::DebugUtilsLabelEXT::default().label_name(&name).color(color);
    unsafe { debug_utils.queue_insert_debug_utils_label(queue, &info) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_strips_nul() {
        assert_eq!(label_cstring("a\0b").as_bytes(), b"ab");
        assert_eq!(label_cstring("pass").as_bytes(), b"pass");
    }
}
