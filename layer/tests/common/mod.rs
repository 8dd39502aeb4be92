//! Shared setup for the GPU integration tests.

use std::sync::Arc;

use redlilium_layer::api::{
    Device, MapAccess, MemoryHeap, ResourceDesc, ResourceHandle, ResourceUsage,
};
use redlilium_layer::vulkan::{HeadlessContext, VulkanQueue};

/// A headless device plus its graphics queue.
pub struct TestContext {
    pub headless: HeadlessContext,
    pub queue: Arc<VulkanQueue>,
}

impl TestContext {
    /// Create a context, or `None` when no Vulkan implementation is present.
    pub fn new() -> Option<Self> {
        let _ = env_logger::builder().is_test(true).try_init();
        let headless = HeadlessContext::new()?;
        let queue = headless.device().graphics_queue()?;
        Some(Self { headless, queue })
    }

    pub fn device(&self) -> &dyn Device {
        &**self.headless.device()
    }

    /// Number of records the device currently tracks.
    pub fn record_count(&self) -> usize {
        self.headless.device().records().total()
    }

    /// A host-readable buffer that copies can target.
    pub fn create_readback_buffer(&self, size: u64) -> ResourceHandle {
        let desc = ResourceDesc::buffer(size, MemoryHeap::GpuToCpu, ResourceUsage::COPY_DEST);
        self.device()
            .create_resource(&desc, None, ResourceUsage::UNDEFINED)
            .expect("readback buffer")
    }

    /// Copy the contents of a host-readable buffer.
    pub fn read_buffer(&self, buffer: ResourceHandle, size: u64) -> Vec<u8> {
        let mapped = self
            .device()
            .map_buffer_region(buffer, 0, size, MapAccess::ReadOnly)
            .expect("map readback buffer");
        let bytes = unsafe { std::slice::from_raw_parts(mapped.as_ptr(), size as usize) }.to_vec();
        self.device().unmap_buffer_region(buffer);
        bytes
    }
}

/// Deterministic byte pattern.
pub fn test_pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
