//! Swap-chain tracking.
//!
//! One [`VulkanSwapchain`] follows a swap-chain lineage: re-creation through
//! `oldSwapchain` resets and re-initializes the same object, so the effect
//! runtime attached to it survives resizes and format changes.

use std::sync::Arc;

use ash::vk;
use ash::vk::Handle;
use parking_lot::{Mutex, RwLock};

use super::conversion::{
    convert_format, convert_present_mode, convert_swapchain_info, convert_usage_to_image_usage,
};
use super::device::VulkanDevice;
use super::queue::VulkanQueue;
use super::records::{ResourceOwner, ResourceRecord};
use super::sync::create_semaphore;
use crate::api::{
    CommandQueue, Device, EffectRuntime, ResourceHandle, Swapchain, SwapchainDesc, events,
};
use crate::error::LayerResult;
use crate::{frame_mark, profile_scope};

/// Usage every swap-chain image gets so effects can copy from and to it.
pub const REQUIRED_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::TRANSFER_SRC.as_raw() | vk::ImageUsageFlags::TRANSFER_DST.as_raw(),
);

pub fn augment_usage(usage: vk::ImageUsageFlags) -> vk::ImageUsageFlags {
    usage | REQUIRED_USAGE
}

/// UNORM and SRGB variant of a back buffer format, for a mutable-format swap-chain.
pub fn format_list_pair(format: vk::Format) -> Option<[vk::Format; 2]> {
    match format {
        vk::Format::R8G8B8A8_UNORM | vk::Format::R8G8B8A8_SRGB => {
            Some([vk::Format::R8G8B8A8_UNORM, vk::Format::R8G8B8A8_SRGB])
        }
        vk::Format::B8G8R8A8_UNORM | vk::Format::B8G8R8A8_SRGB => {
            Some([vk::Format::B8G8R8A8_UNORM, vk::Format::B8G8R8A8_SRGB])
        }
        _ => None,
    }
}

/// Write a description amended by a `create_swapchain` callback back into the create info.
pub fn apply_swapchain_desc(info: &mut vk::SwapchainCreateInfoKHR<'_>, desc: &SwapchainDesc) {
    info.image_extent = vk::Extent2D {
        width: desc.width,
        height: desc.height,
    };
    info.image_format = convert_format(desc.format);
    info.min_image_count = desc.back_buffer_count;
    info.present_mode = convert_present_mode(desc.present_mode);
    info.image_usage |= convert_usage_to_image_usage(desc.usage);
}

/// Create info of a back buffer image, as the native swap-chain created it.
pub fn back_buffer_image_info(info: &vk::SwapchainCreateInfoKHR<'_>) -> vk::ImageCreateInfo<'static> {
    let mut flags = vk::ImageCreateFlags::empty();
    if info.flags.contains(vk::SwapchainCreateFlagsKHR::MUTABLE_FORMAT) {
        flags |= vk::ImageCreateFlags::MUTABLE_FORMAT | vk::ImageCreateFlags::EXTENDED_USAGE;
    }
    vk::ImageCreateInfo::default()
        .flags(flags)
        .image_type(vk::ImageType::TYPE_2D)
        .format(info.image_format)
        .extent(vk::Extent3D {
            width: info.image_extent.width,
            height: info.image_extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(info.image_array_layers.max(1))
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(info.image_usage)
        .sharing_mode(info.image_sharing_mode)
        .initial_layout(vk::ImageLayout::UNDEFINED)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwapchainState {
    #[default]
    Uninitialized,
    Initialized,
}

/// Back buffer bookkeeping of a swap-chain lineage.
#[derive(Debug, Default)]
pub struct SwapchainAdapter {
    state: SwapchainState,
    back_buffers: Vec<ResourceHandle>,
    current_index: u32,
    initializations: u32,
}

impl SwapchainAdapter {
    pub fn state(&self) -> SwapchainState {
        self.state
    }

    /// Enter the initialized state. Returns `true` on the first
    /// initialization of the lineage.
    pub fn init(&mut self, back_buffers: Vec<ResourceHandle>) -> bool {
        debug_assert_eq!(self.state, SwapchainState::Uninitialized);
        self.back_buffers = back_buffers;
        self.current_index = 0;
        self.state = SwapchainState::Initialized;
        self.initializations += 1;
        self.initializations == 1
    }

    /// Leave the initialized state, returning the back buffers to unregister.
    pub fn reset(&mut self) -> Vec<ResourceHandle> {
        self.state = SwapchainState::Uninitialized;
        self.current_index = 0;
        std::mem::take(&mut self.back_buffers)
    }

    /// Returns `false` and keeps the previous index if `index` is out of range.
    pub fn set_current_index(&mut self, index: u32) -> bool {
        if (index as usize) < self.back_buffers.len() {
            self.current_index = index;
            true
        } else {
            false
        }
    }

    pub fn current_index(&self) -> u32 {
        self.current_index
    }

    pub fn back_buffer(&self, index: u32) -> ResourceHandle {
        self.back_buffers
            .get(index as usize)
            .copied()
            .unwrap_or(ResourceHandle::NULL)
    }

    pub fn back_buffer_count(&self) -> u32 {
        self.back_buffers.len() as u32
    }

    pub fn back_buffers(&self) -> &[ResourceHandle] {
        &self.back_buffers
    }
}

/// Effect runtime attached to a swap-chain lineage.
#[derive(Default)]
pub(crate) struct RuntimeSlot(Mutex<Option<Arc<dyn EffectRuntime>>>);

impl RuntimeSlot {
    pub(crate) fn get(&self) -> Option<Arc<dyn EffectRuntime>> {
        self.0.lock().clone()
    }

    /// Runtime to initialize after a (re-)creation.
    ///
    /// An attached runtime is kept. Otherwise `create` runs on the first
    /// initialization of the lineage only. The lock is not held across
    /// `create`, which may call back into the swap-chain.
    pub(crate) fn select(
        &self,
        first: bool,
        create: impl FnOnce() -> Option<Arc<dyn EffectRuntime>>,
    ) -> Option<Arc<dyn EffectRuntime>> {
        if let Some(runtime) = self.get() {
            return Some(runtime);
        }
        if !first {
            return None;
        }
        let created = create();
        let mut slot = self.0.lock();
        if slot.is_none() {
            *slot = created;
        }
        slot.clone()
    }

    pub(crate) fn take(&self) -> Option<Arc<dyn EffectRuntime>> {
        self.0.lock().take()
    }
}

struct SwapchainInner {
    handle: vk::SwapchainKHR,
    desc: SwapchainDesc,
    adapter: SwapchainAdapter,
    /// Signaled by a presenting queue that is not the rendering queue, one per back buffer.
    queue_sync_semaphores: Vec<vk::Semaphore>,
}

/// A native swap-chain.
pub struct VulkanSwapchain {
    device: Arc<VulkanDevice>,
    inner: RwLock<SwapchainInner>,
    runtime: RuntimeSlot,
}

impl VulkanSwapchain {
    /// Track a freshly created swap-chain and initialize it.
    pub fn new(
        device: Arc<VulkanDevice>,
        handle: vk::SwapchainKHR,
        create_info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> LayerResult<Arc<Self>> {
        let this = Arc::new(Self {
            device,
            inner: RwLock::new(SwapchainInner {
                handle,
                desc: convert_swapchain_info(create_info),
                adapter: SwapchainAdapter::default(),
                queue_sync_semaphores: Vec::new(),
            }),
            runtime: RuntimeSlot::default(),
        });
        this.on_init(handle, create_info)?;
        Ok(this)
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.inner.read().handle
    }

    pub fn state(&self) -> SwapchainState {
        self.inner.read().adapter.state()
    }

    pub fn vulkan_device(&self) -> &Arc<VulkanDevice> {
        &self.device
    }

    /// Register the back buffers of `handle` and notify collaborators.
    pub fn on_init(
        &self,
        handle: vk::SwapchainKHR,
        create_info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> LayerResult<()> {
        profile_scope!("swapchain_init");
        let ctx = self.device.context();
        let images = unsafe { ctx.swapchain_fn.get_swapchain_images(handle) }?;
        let image_info = back_buffer_image_info(create_info);

        let mut back_buffers = Vec::with_capacity(images.len());
        let mut semaphores = Vec::with_capacity(images.len());
        let registered: LayerResult<()> = images.iter().try_for_each(|image| {
            self.device
                .register_image(*image, &image_info, ResourceOwner::Swapchain)?;
            back_buffers.push(ResourceHandle::from_raw(image.as_raw()));
            semaphores.push(create_semaphore(&ctx.device)?);
            Ok(())
        });
        if let Err(e) = registered {
            self.release(&back_buffers, &semaphores);
            return Err(e);
        }

        let first = {
            let mut inner = self.inner.write();
            inner.handle = handle;
            inner.desc = convert_swapchain_info(create_info);
            inner.desc.back_buffer_count = back_buffers.len() as u32;
            inner.queue_sync_semaphores = semaphores;
            inner.adapter.init(back_buffers)
        };
        log::info!(
            "swap-chain {:#x} initialized: {}x{} {:?}, {} back buffers",
            handle.as_raw(),
            create_info.image_extent.width,
            create_info.image_extent.height,
            create_info.image_format,
            images.len()
        );

        events().invoke_init_swapchain(self);

        let runtime = self.runtime.select(first, || events().create_runtime(self));
        if let Some(runtime) = runtime {
            if !runtime.on_init(self) {
                log::warn!("effect runtime failed to initialize on swap-chain {:#x}", handle.as_raw());
            }
        }
        Ok(())
    }

    /// Unregister back buffers and release per-image objects.
    ///
    /// Must run before the native swap-chain is destroyed or re-created.
    pub fn on_reset(&self) {
        if self.state() == SwapchainState::Uninitialized {
            return;
        }
        profile_scope!("swapchain_reset");

        if let Some(runtime) = self.runtime.get() {
            runtime.on_reset();
        }
        events().invoke_destroy_swapchain(self);

        // Injected work may still reference the back buffers or semaphores.
        if let Some(queue) = self.device.graphics_queue() {
            queue.flush();
        }
        if let Err(e) = unsafe { self.device.context().device.device_wait_idle() } {
            log::error!("vkDeviceWaitIdle failed during swap-chain reset: {e:?}");
        }

        let (handle, back_buffers, semaphores) = {
            let mut inner = self.inner.write();
            let back_buffers = inner.adapter.reset();
            let semaphores = std::mem::take(&mut inner.queue_sync_semaphores);
            (inner.handle, back_buffers, semaphores)
        };
        self.release(&back_buffers, &semaphores);
        log::debug!("swap-chain {:#x} reset", handle.as_raw());
    }

    fn release(&self, back_buffers: &[ResourceHandle], semaphores: &[vk::Semaphore]) {
        let ctx = self.device.context();
        for back_buffer in back_buffers {
            if let Some(record) = ctx.records.remove::<ResourceRecord>(back_buffer.raw()) {
                // A swap-chain synthesized by the layer owns its images.
                if record.owner == ResourceOwner::Layer {
                    self.device.destroy_native_resource(&record);
                }
            }
        }
        for semaphore in semaphores {
            unsafe { ctx.device.destroy_semaphore(*semaphore, None) };
        }
    }

    /// Drop the runtime after the final reset of the lineage.
    pub fn on_destroy(&self) {
        self.on_reset();
        self.runtime.take();
    }

    /// Note the back buffer returned by an acquire.
    pub fn set_current_back_buffer_index(&self, index: u32) {
        if !self.inner.write().adapter.set_current_index(index) {
            log::warn!("acquired back buffer index {index} is out of range");
        }
    }

    /// Run present callbacks and submit injected work ahead of a native present.
    ///
    /// `wait` holds the semaphores the application's present waits on and is
    /// replaced by what the native present has to wait on instead.
    pub fn on_present(&self, queue: &VulkanQueue, wait: &mut Vec<vk::Semaphore>) -> LayerResult<()> {
        profile_scope!("swapchain_present");
        let (initialized, sync_semaphore) = {
            let inner = self.inner.read();
            (
                inner.adapter.state() == SwapchainState::Initialized,
                inner
                    .queue_sync_semaphores
                    .get(inner.adapter.current_index() as usize)
                    .copied(),
            )
        };
        if !initialized {
            return Ok(());
        }
        let Some(graphics) = self.device.graphics_queue() else {
            return Ok(());
        };

        let render_queue: &dyn CommandQueue = &*graphics;
        events().invoke_present(render_queue, self);
        if let Some(runtime) = self.runtime.get() {
            runtime.on_present(render_queue, self);
        }

        // Work injected on the rendering queue must come after what the
        // application submitted to the presenting queue.
        if queue.handle() != graphics.handle() {
            if let Some(semaphore) = sync_semaphore {
                queue.signal_after(wait, semaphore)?;
                wait.clear();
                wait.push(semaphore);
            }
        }
        graphics.flush_with_semaphores(wait)?;

        self.device.context().descriptor_pools.advance_frame(&self.device.context().device);
        frame_mark!();
        Ok(())
    }

    /// Ask collaborators whether a full-screen state change may proceed.
    pub fn set_fullscreen_state(&self, fullscreen: bool) -> bool {
        let vetoed = events().invoke_set_fullscreen_state(self, fullscreen);
        if vetoed {
            log::info!(
                "full-screen {} vetoed on swap-chain {:#x}",
                if fullscreen { "acquire" } else { "release" },
                self.handle().as_raw()
            );
        }
        !vetoed
    }
}

impl std::fmt::Debug for VulkanSwapchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("VulkanSwapchain")
            .field("handle", &inner.handle)
            .field("desc", &inner.desc)
            .field("adapter", &inner.adapter)
            .finish_non_exhaustive()
    }
}

impl Swapchain for VulkanSwapchain {
    fn native(&self) -> u64 {
        self.handle().as_raw()
    }

    fn device(&self) -> Arc<dyn Device> {
        Arc::clone(&self.device) as Arc<dyn Device>
    }

    fn desc(&self) -> SwapchainDesc {
        self.inner.read().desc
    }

    fn get_back_buffer(&self, index: u32) -> ResourceHandle {
        self.inner.read().adapter.back_buffer(index)
    }

    fn get_back_buffer_count(&self) -> u32 {
        self.inner.read().adapter.back_buffer_count()
    }

    fn get_current_back_buffer_index(&self) -> u32 {
        self.inner.read().adapter.current_index()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Format, PresentMode, ResourceUsage};

    fn handles(raw: &[u64]) -> Vec<ResourceHandle> {
        raw.iter().copied().map(ResourceHandle::from_raw).collect()
    }

    #[test]
    fn test_adapter_lifecycle() {
        let mut adapter = SwapchainAdapter::default();
        assert_eq!(adapter.state(), SwapchainState::Uninitialized);
        assert!(adapter.init(handles(&[10, 11, 12])));
        assert_eq!(adapter.state(), SwapchainState::Initialized);
        assert_eq!(adapter.back_buffer_count(), 3);

        assert!(adapter.set_current_index(2));
        assert_eq!(adapter.back_buffer(adapter.current_index()).raw(), 12);

        let released = adapter.reset();
        assert_eq!(released, handles(&[10, 11, 12]));
        assert_eq!(adapter.state(), SwapchainState::Uninitialized);
        assert_eq!(adapter.back_buffer_count(), 0);
        assert_eq!(adapter.current_index(), 0);

        // Re-creation is not the first initialization of the lineage.
        assert!(!adapter.init(handles(&[20, 21])));
        assert_eq!(adapter.back_buffer(1).raw(), 21);
    }

    struct IdleRuntime;

    impl EffectRuntime for IdleRuntime {
        fn on_init(&self, _swapchain: &dyn Swapchain) -> bool {
            true
        }
        fn on_reset(&self) {}
        fn on_present(&self, _queue: &dyn CommandQueue, _swapchain: &dyn Swapchain) {}
    }

    #[test]
    fn test_runtime_survives_recreation() {
        let mut adapter = SwapchainAdapter::default();
        let slot = RuntimeSlot::default();
        let created = std::cell::Cell::new(0);
        let mut create = || {
            created.set(created.get() + 1);
            Some(Arc::new(IdleRuntime) as Arc<dyn EffectRuntime>)
        };

        let first = adapter.init(handles(&[1, 2]));
        let runtime = slot.select(first, &mut create).unwrap();

        for round in 0..3u64 {
            adapter.reset();
            let first = adapter.init(handles(&[10 + round, 20 + round]));
            let again = slot.select(first, &mut create).unwrap();
            assert!(Arc::ptr_eq(&runtime, &again));
        }
        assert_eq!(created.get(), 1);

        slot.take();
        adapter.reset();
        let first = adapter.init(handles(&[3]));
        assert!(slot.select(first, &mut create).is_none());
        assert_eq!(created.get(), 1);
    }

    #[test]
    fn test_runtime_factory_may_decline() {
        let slot = RuntimeSlot::default();
        assert!(slot.select(true, || None).is_none());
        assert!(slot.get().is_none());
    }

    #[test]
    fn test_adapter_rejects_out_of_range_index() {
        let mut adapter = SwapchainAdapter::default();
        adapter.init(handles(&[1, 2]));
        assert!(adapter.set_current_index(1));
        assert!(!adapter.set_current_index(2));
        assert_eq!(adapter.current_index(), 1);
        assert!(adapter.back_buffer(5).is_null());
    }

    #[test]
    fn test_usage_augmentation() {
        let usage = augment_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT);
        assert!(usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
        assert!(usage.contains(vk::ImageUsageFlags::TRANSFER_SRC));
        assert!(usage.contains(vk::ImageUsageFlags::TRANSFER_DST));
    }

    #[test]
    fn test_format_list_pairs() {
        assert_eq!(
            format_list_pair(vk::Format::B8G8R8A8_SRGB),
            Some([vk::Format::B8G8R8A8_UNORM, vk::Format::B8G8R8A8_SRGB])
        );
        assert_eq!(
            format_list_pair(vk::Format::R8G8B8A8_UNORM),
            Some([vk::Format::R8G8B8A8_UNORM, vk::Format::R8G8B8A8_SRGB])
        );
        assert_eq!(format_list_pair(vk::Format::A2B10G10R10_UNORM_PACK32), None);
    }

    #[test]
    fn test_amended_desc_is_written_back() {
        let mut info = vk::SwapchainCreateInfoKHR::default()
            .image_extent(vk::Extent2D {
                width: 640,
                height: 480,
            })
            .image_format(vk::Format::B8G8R8A8_UNORM)
            .min_image_count(2)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .present_mode(vk::PresentModeKHR::FIFO);
        let desc = SwapchainDesc {
            width: 1280,
            height: 720,
            format: Format::R8G8B8A8Unorm,
            back_buffer_count: 3,
            present_mode: PresentMode::Mailbox,
            usage: ResourceUsage::RENDER_TARGET,
        };
        apply_swapchain_desc(&mut info, &desc);
        assert_eq!(info.image_extent.width, 1280);
        assert_eq!(info.image_format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(info.min_image_count, 3);
        assert_eq!(info.present_mode, vk::PresentModeKHR::MAILBOX);
        assert!(info.image_usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
    }

    #[test]
    fn test_back_buffer_image_info() {
        let info = vk::SwapchainCreateInfoKHR::default()
            .flags(vk::SwapchainCreateFlagsKHR::MUTABLE_FORMAT)
            .image_extent(vk::Extent2D {
                width: 800,
                height: 600,
            })
            .image_format(vk::Format::B8G8R8A8_SRGB)
            .image_array_layers(1)
            .image_usage(augment_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT));
        let image = back_buffer_image_info(&info);
        assert_eq!(image.extent.width, 800);
        assert_eq!(image.extent.depth, 1);
        assert_eq!(image.mip_levels, 1);
        assert!(image.flags.contains(vk::ImageCreateFlags::MUTABLE_FORMAT));
        assert!(image.usage.contains(vk::ImageUsageFlags::TRANSFER_DST));
    }
}
