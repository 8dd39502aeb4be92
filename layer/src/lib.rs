//! # RedLilium Layer
//!
//! A Vulkan interception layer that lets external post-processing code
//! observe and inject work into an application's rendering.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`registry`] - Lock-free tables attaching metadata to native handles
//! - [`api`] - Backend-neutral device, command list, queue and swap-chain interfaces
//! - [`vulkan`] - The Vulkan implementation of those interfaces
//! - [`hooks`] - The exported entry points the Vulkan loader calls
//!
//! ## Example
//!
//! ```ignore
//! use redlilium_layer::api::events;
//!
//! events().on_present(|queue, swapchain| {
//!     let back_buffer = swapchain.get_current_back_buffer();
//!     queue.with_immediate_command_list(&mut |cmd| {
//!         // Record work against `back_buffer`...
//!     });
//! });
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod hooks;
pub mod profiling;
pub mod registry;
pub mod vulkan;

use std::sync::Once;

pub use config::LayerConfig;
pub use error::{LayerError, LayerResult};

/// Layer version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

static INIT: Once = Once::new();

/// Initialize logging from the process configuration.
///
/// Safe to call any number of times; an already installed logger is kept.
pub fn init() {
    INIT.call_once(|| {
        let config = LayerConfig::global();
        let installed = env_logger::Builder::new()
            .parse_filters(&config.log_filter)
            .try_init()
            .is_ok();
        log::info!(
            "RedLilium layer v{} initialized (own logger: {installed})",
            VERSION
        );
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_init_is_idempotent() {
        init();
        init();
    }
}
