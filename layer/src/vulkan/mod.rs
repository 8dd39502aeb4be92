//! Vulkan adapter: implements the [`crate::api`] interfaces on top of a
//! native device the application created.

mod allocator;
pub mod barriers;
mod command;
pub(crate) mod conversion;
mod debug;
mod descriptors;
mod device;
pub mod headless;
mod immediate;
mod pipeline;
mod queue;
pub mod records;
mod resources;
mod swapchain;
mod sync;

pub use command::VulkanCommandList;
pub use device::{
    DeviceContext, DeviceParams, PIPELINE_STATISTICS_COUNT, QueueInfo, SetDeviceLoaderDataFn,
    VulkanDevice, required_format_features,
};
pub use headless::HeadlessContext;
pub use immediate::{ImmediateCommandList, RING_SIZE};
pub(crate) use pipeline::render_pass_desc_from_refs;
pub use queue::VulkanQueue;
pub use records::ResourceOwner;
pub use swapchain::{
    REQUIRED_USAGE, SwapchainAdapter, SwapchainState, VulkanSwapchain, apply_swapchain_desc,
    augment_usage, back_buffer_image_info, format_list_pair,
};
