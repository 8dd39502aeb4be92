//! Entry points the Vulkan loader calls.
//!
//! Every intercepted command forwards to the next layer through the function
//! pointers captured at instance and device creation, and passes the native
//! result back unchanged. The layer's own bookkeeping runs around the forwarded
//! call: records of application objects are installed after a successful
//! create and removed before a destroy is forwarded. Bookkeeping failures are
//! logged and never change the result the application sees.

mod commands;
mod device;
pub mod dispatch;
pub mod ffi;
mod instance;
mod resources;
mod swapchain;

pub use device::augment_device_extensions;
pub use instance::{
    vkGetDeviceProcAddr, vkGetInstanceProcAddr, vkNegotiateLoaderLayerInterfaceVersion,
};

/// Resolve a next-layer entry point or return `$fallback` from the hook.
macro_rules! next_fn {
    ($data:expr, $field:ident) => {
        next_fn!($data, $field, ())
    };
    ($data:expr, $field:ident, $fallback:expr) => {
        match $data.next.$field {
            Some(f) => f,
            None => {
                log::error!(concat!("next layer has no entry point for ", stringify!($field)));
                return $fallback;
            }
        }
    };
}
pub(crate) use next_fn;

/// Log a bookkeeping failure without affecting the forwarded call.
pub(crate) fn report(result: crate::error::LayerResult<()>, what: &str, raw: u64) {
    if let Err(e) = result {
        log::warn!("failed to track {what} {raw:#x}: {e}");
    }
}
