//! Backend-neutral types and interfaces.
//!
//! Collaborators such as an effect runtime only ever see these types; the
//! Vulkan adapter in [`crate::vulkan`] implements the traits.

pub mod device;
pub mod events;
pub mod format;
pub mod handles;
pub mod pipeline;
pub mod resource;

pub use device::{
    CommandList, CommandQueue, Device, DeviceCaps, EffectRuntime, PresentMode, QueueType,
    Swapchain, SwapchainDesc,
};
pub use events::{EventRegistry, RuntimeFactory, events};
pub use format::Format;
pub use handles::*;
pub use pipeline::*;
pub use resource::*;
