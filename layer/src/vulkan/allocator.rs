//! GPU memory for layer-created resources, backed by gpu-allocator.

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use parking_lot::Mutex;

use crate::api::MemoryHeap;
use crate::error::{LayerError, LayerResult};

/// Create a memory allocator for the device.
pub fn create_allocator(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: &ash::Device,
) -> LayerResult<Allocator> {
    Allocator::new(&AllocatorCreateDesc {
        instance: instance.clone(),
        device: device.clone(),
        physical_device,
        debug_settings: Default::default(),
        buffer_device_address: false,
        allocation_sizes: gpu_allocator::AllocationSizes::default(),
    })
    .map_err(|e| LayerError::Allocation(format!("failed to create memory allocator: {e}")))
}

/// Allocator location for a heap; `None` if the heap requests no memory.
pub fn memory_location(heap: MemoryHeap) -> Option<MemoryLocation> {
    match heap {
        MemoryHeap::Unknown => None,
        MemoryHeap::GpuOnly => Some(MemoryLocation::GpuOnly),
        MemoryHeap::CpuToGpu => Some(MemoryLocation::CpuToGpu),
        MemoryHeap::GpuToCpu | MemoryHeap::CpuOnly => Some(MemoryLocation::GpuToCpu),
    }
}

/// Device allocator shared by every layer allocation.
///
/// Emptied on device teardown, after which allocations fail.
pub struct DeviceAllocator {
    inner: Mutex<Option<Allocator>>,
}

impl DeviceAllocator {
    pub fn new(allocator: Allocator) -> Self {
        Self {
            inner: Mutex::new(Some(allocator)),
        }
    }

    fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> LayerResult<Allocation> {
        let mut guard = self.inner.lock();
        let allocator = guard
            .as_mut()
            .ok_or_else(|| LayerError::Internal("allocator already destroyed".into()))?;
        Ok(allocator.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?)
    }

    /// Return an allocation. Failures are logged, not reported.
    pub fn free(&self, allocation: Allocation) {
        if let Some(allocator) = self.inner.lock().as_mut() {
            if let Err(e) = allocator.free(allocation) {
                log::error!("failed to free allocation: {e}");
            }
        }
    }

    /// Allocate memory for `buffer` and bind it.
    pub fn allocate_buffer(
        &self,
        device: &ash::Device,
        buffer: vk::Buffer,
        location: MemoryLocation,
        name: &str,
    ) -> LayerResult<Allocation> {
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let allocation = self.allocate(name, requirements, location, true)?;
        if let Err(e) =
            unsafe { device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) }
        {
            self.free(allocation);
            return Err(e.into());
        }
        Ok(allocation)
    }

    /// Allocate memory for `image` and bind it.
    pub fn allocate_image(
        &self,
        device: &ash::Device,
        image: vk::Image,
        location: MemoryLocation,
        linear: bool,
        name: &str,
    ) -> LayerResult<Allocation> {
        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let allocation = self.allocate(name, requirements, location, linear)?;
        if let Err(e) =
            unsafe { device.bind_image_memory(image, allocation.memory(), allocation.offset()) }
        {
            self.free(allocation);
            return Err(e.into());
        }
        Ok(allocation)
    }

    /// Drop the allocator. Every allocation must have been freed.
    pub fn destroy(&self) {
        if let Some(allocator) = self.inner.lock().take() {
            log::debug!("destroying device allocator");
            drop(allocator);
        }
    }
}

/// Host-visible staging buffer, freed on drop.
pub struct StagingBuffer<'a> {
    device: &'a ash::Device,
    allocator: &'a DeviceAllocator,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: u64,
}

impl<'a> StagingBuffer<'a> {
    pub fn new(
        device: &'a ash::Device,
        allocator: &'a DeviceAllocator,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> LayerResult<Self> {
        if size == 0 {
            return Err(LayerError::InvalidParameter("zero-size staging buffer".into()));
        }
        let info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { device.create_buffer(&info, None) }?;
        let allocation = match allocator.allocate_buffer(device, buffer, location, "staging") {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };
        Ok(Self {
            device,
            allocator,
            buffer,
            allocation: Some(allocation),
            size,
        })
    }

    pub fn buffer(&self) -> vk::Buffer {
        self.buffer
    }

    /// The persistently mapped contents.
    pub fn mapped(&mut self) -> LayerResult<&mut [u8]> {
        let size = self.size as usize;
        let ptr = self
            .allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .ok_or_else(|| LayerError::Internal("staging buffer is not mapped".into()))?;
        // SAFETY: the allocation is host visible, at least `size` bytes long and
        // exclusively borrowed through `self`.
        Ok(unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr().cast::<u8>(), size) })
    }
}

impl Drop for StagingBuffer<'_> {
    fn drop(&mut self) {
        unsafe { self.device.destroy_buffer(self.buffer, None) };
        if let Some(allocation) = self.allocation.take() {
            self.allocator.free(allocation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_locations() {
        assert_eq!(memory_location(MemoryHeap::Unknown), None);
        assert_eq!(memory_location(MemoryHeap::GpuOnly), Some(MemoryLocation::GpuOnly));
        assert_eq!(memory_location(MemoryHeap::CpuToGpu), Some(MemoryLocation::CpuToGpu));
        assert_eq!(memory_location(MemoryHeap::CpuOnly), Some(MemoryLocation::GpuToCpu));
    }
}
