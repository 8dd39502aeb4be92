//! Per-device state shared by every Vulkan adapter object, and the
//! [`Device`] implementation.
//!
//! A [`VulkanDevice`] wraps a native device the layer did not create. All
//! operations that create objects live in `resources.rs`, `pipeline.rs` and
//! `descriptors.rs`; this file holds the shared context, device queries and
//! teardown.

use std::ffi::{CStr, CString, c_void};
use std::ptr::NonNull;
use std::sync::Arc;

use ash::vk;
use ash::vk::Handle;
use parking_lot::RwLock;

use super::allocator::{DeviceAllocator, create_allocator};
use super::conversion::{convert_format, pipeline_statistics_flags};
use super::debug::set_object_name;
use super::descriptors::DescriptorPools;
use super::immediate::ImmediateCommandList;
use super::queue::VulkanQueue;
use super::records::{
    DescriptorSetLayoutRecord, FramebufferRecord, NativeResource, NativeView, ObjectRegistry,
    PipelineLayoutRecord, PipelineRecord, QueryPoolRecord, RenderPassRecord, ResourceOwner,
    ResourceRecord, SamplerRecord, ViewRecord,
};
use crate::api::{
    DescriptorRange, DescriptorSetCopy, DescriptorSetHandle, DescriptorSetLayoutHandle,
    DescriptorSetUpdate, Device, DeviceCaps, Format, FramebufferDesc, FramebufferHandle, MapAccess,
    PipelineDesc, PipelineHandle, PipelineLayoutHandle, PipelineLayoutParam, QueryPoolHandle,
    QueryType, RenderPassDesc, RenderPassHandle, ResourceDesc, ResourceHandle, ResourceUsage,
    ResourceViewDesc, ResourceViewHandle, SamplerDesc, SamplerHandle, SubresourceBox,
    SubresourceData, SubresourceMapping,
};
use crate::config::LayerConfig;
use crate::error::{LayerError, LayerResult};

/// Loader callback that stamps the dispatch pointer into a dispatchable
/// object created by a layer.
pub type SetDeviceLoaderDataFn = unsafe extern "system" fn(vk::Device, *mut c_void) -> vk::Result;

/// Number of values one pipeline statistics query writes.
pub const PIPELINE_STATISTICS_COUNT: usize = 7;

/// A queue retrieved from the native device.
#[derive(Debug, Clone, Copy)]
pub struct QueueInfo {
    pub queue: vk::Queue,
    pub family_index: u32,
    pub flags: vk::QueueFlags,
}

/// Everything needed to wrap a native device.
pub struct DeviceParams {
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    /// Device extensions the device was created with.
    pub enabled_extensions: Vec<CString>,
    pub enabled_features: vk::PhysicalDeviceFeatures,
    /// `VK_EXT_debug_utils` was enabled on the instance.
    pub debug_utils: bool,
    pub queues: Vec<QueueInfo>,
    pub set_loader_data: Option<SetDeviceLoaderDataFn>,
    pub config: LayerConfig,
}

/// State shared by the device, its queues, command lists and swap-chains.
pub struct DeviceContext {
    pub instance: ash::Instance,
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub records: ObjectRegistry,
    pub allocator: DeviceAllocator,
    pub swapchain_fn: ash::khr::swapchain::Device,
    pub push_descriptor_fn: Option<ash::khr::push_descriptor::Device>,
    pub debug_utils_fn: Option<ash::ext::debug_utils::Device>,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub enabled_extensions: Vec<CString>,
    pub descriptor_pools: DescriptorPools,
    pub set_loader_data: Option<SetDeviceLoaderDataFn>,
    pub config: LayerConfig,
}

impl DeviceContext {
    pub fn has_extension(&self, name: &CStr) -> bool {
        self.enabled_extensions.iter().any(|ext| ext.as_c_str() == name)
    }

    pub fn push_descriptors_enabled(&self) -> bool {
        self.push_descriptor_fn.is_some()
    }

    /// Swap-chain images may be viewed with both the UNORM and SRGB format.
    pub fn supports_mutable_swapchain(&self) -> bool {
        self.has_extension(ash::khr::swapchain_mutable_format::NAME)
            && self.has_extension(ash::khr::image_format_list::NAME)
    }

    pub fn fence_timeout_ns(&self) -> u64 {
        self.config.fence_timeout_ns()
    }

    /// Make a dispatchable object created by the layer usable through the loader.
    pub fn set_loader_data<H: Handle>(&self, object: H) -> LayerResult<()> {
        let Some(set_loader_data) = self.set_loader_data else {
            return Ok(());
        };
        let result =
            unsafe { set_loader_data(self.device.handle(), object.as_raw() as *mut c_void) };
        if result != vk::Result::SUCCESS {
            log::error!("vkSetDeviceLoaderData failed: {result:?}");
            return Err(result.into());
        }
        Ok(())
    }

    pub fn set_debug_name<H: Handle>(&self, object: H, name: &str) {
        if let Some(debug_utils) = &self.debug_utils_fn {
            set_object_name(debug_utils, object, name);
        }
    }
}

/// A native device seen through the backend-neutral [`Device`] interface.
pub struct VulkanDevice {
    pub(crate) ctx: Arc<DeviceContext>,
    queues: RwLock<Vec<Arc<VulkanQueue>>>,
}

impl VulkanDevice {
    pub fn new(params: DeviceParams) -> LayerResult<Arc<Self>> {
        let DeviceParams {
            instance,
            physical_device,
            device,
            enabled_extensions,
            enabled_features,
            debug_utils,
            queues,
            set_loader_data,
            config,
        } = params;

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let allocator = DeviceAllocator::new(create_allocator(&instance, physical_device, &device)?);
        let descriptor_pools = match DescriptorPools::new(&device) {
            Ok(pools) => pools,
            Err(e) => {
                allocator.destroy();
                return Err(e);
            }
        };

        let has_push_descriptor = enabled_extensions
            .iter()
            .any(|ext| ext.as_c_str() == ash::khr::push_descriptor::NAME);
        let push_descriptor_fn = (config.push_descriptors && has_push_descriptor)
            .then(|| ash::khr::push_descriptor::Device::new(&instance, &device));
        let debug_utils_fn =
            debug_utils.then(|| ash::ext::debug_utils::Device::new(&instance, &device));

        let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) };
        log::info!(
            "wrapping device {:?} ({:?}, push descriptors: {})",
            device_name,
            properties.device_type,
            push_descriptor_fn.is_some()
        );

        let ctx = Arc::new(DeviceContext {
            swapchain_fn: ash::khr::swapchain::Device::new(&instance, &device),
            records: ObjectRegistry::with_capacity(config.registry_capacity),
            instance,
            device,
            physical_device,
            allocator,
            push_descriptor_fn,
            debug_utils_fn,
            properties,
            features: enabled_features,
            enabled_extensions,
            descriptor_pools,
            set_loader_data,
            config,
        });

        let this = Arc::new(Self {
            ctx,
            queues: RwLock::new(Vec::with_capacity(queues.len())),
        });
        for info in &queues {
            match VulkanQueue::new(Arc::clone(&this.ctx), info) {
                Ok(queue) => this.queues.write().push(Arc::new(queue)),
                Err(e) => {
                    this.shutdown();
                    return Err(e);
                }
            }
        }
        Ok(this)
    }

    pub fn context(&self) -> &Arc<DeviceContext> {
        &self.ctx
    }

    pub fn handle(&self) -> vk::Device {
        self.ctx.device.handle()
    }

    pub fn records(&self) -> &ObjectRegistry {
        &self.ctx.records
    }

    pub fn queues(&self) -> Vec<Arc<VulkanQueue>> {
        self.queues.read().clone()
    }

    pub fn queue(&self, queue: vk::Queue) -> Option<Arc<VulkanQueue>> {
        self.queues
            .read()
            .iter()
            .find(|q| q.handle() == queue)
            .cloned()
    }

    /// The first queue that owns an immediate command list.
    pub fn graphics_queue(&self) -> Option<Arc<VulkanQueue>> {
        self.queues
            .read()
            .iter()
            .find(|q| q.has_immediate_command_list())
            .cloned()
    }

    /// Run `f` on the immediate command list of the first graphics queue.
    pub(crate) fn with_immediate<R>(
        &self,
        f: impl FnOnce(&mut ImmediateCommandList) -> LayerResult<R>,
    ) -> LayerResult<R> {
        let queue = self
            .graphics_queue()
            .ok_or_else(|| LayerError::Unsupported("device has no graphics queue".into()))?;
        queue
            .with_immediate(f)
            .unwrap_or_else(|| Err(LayerError::Internal("immediate command list is busy".into())))
    }

    /// Destroy everything the layer created on this device.
    ///
    /// Call before the native device is destroyed. Records of application
    /// objects are dropped without touching the native objects.
    pub fn shutdown(&self) {
        let device = &self.ctx.device;
        if let Err(e) = unsafe { device.device_wait_idle() } {
            log::error!("vkDeviceWaitIdle failed during shutdown: {e:?}");
        }

        for queue in self.queues.write().drain(..) {
            queue.destroy();
        }

        self.destroy_leftovers();
        self.ctx.records.clear();

        self.ctx.descriptor_pools.destroy(device);
        self.ctx.allocator.destroy();
        log::info!("device {:#x} shut down", device.handle().as_raw());
    }

    /// Destroy objects still tracked at teardown. A valid application has
    /// destroyed its own objects by now, so these were created by the layer.
    fn destroy_leftovers(&self) {
        let records = &self.ctx.records;
        let device = &self.ctx.device;

        for (_, view) in records.drain::<ViewRecord>() {
            self.destroy_native_view(&view);
        }
        for (raw, resource) in records.drain::<ResourceRecord>() {
            if resource.owner == ResourceOwner::Layer {
                log::debug!("destroying leftover resource {raw:#x}");
                self.destroy_native_resource(&resource);
            }
        }
        for (raw, _) in records.drain::<FramebufferRecord>() {
            unsafe { device.destroy_framebuffer(vk::Framebuffer::from_raw(raw), None) };
        }
        for (raw, _) in records.drain::<RenderPassRecord>() {
            unsafe { device.destroy_render_pass(vk::RenderPass::from_raw(raw), None) };
        }
        for (raw, _) in records.drain::<PipelineRecord>() {
            unsafe { device.destroy_pipeline(vk::Pipeline::from_raw(raw), None) };
        }
        for (raw, layout) in records.drain::<PipelineLayoutRecord>() {
            unsafe { device.destroy_pipeline_layout(vk::PipelineLayout::from_raw(raw), None) };
            for set_layout in &layout.owned_set_layouts {
                unsafe { device.destroy_descriptor_set_layout(*set_layout, None) };
            }
        }
        for (raw, _) in records.drain::<DescriptorSetLayoutRecord>() {
            unsafe {
                device.destroy_descriptor_set_layout(vk::DescriptorSetLayout::from_raw(raw), None)
            };
        }
        for (raw, _) in records.drain::<SamplerRecord>() {
            unsafe { device.destroy_sampler(vk::Sampler::from_raw(raw), None) };
        }
        for (raw, _) in records.drain::<QueryPoolRecord>() {
            unsafe { device.destroy_query_pool(vk::QueryPool::from_raw(raw), None) };
        }
    }

    pub(crate) fn destroy_native_view(&self, view: &ViewRecord) {
        match view.native {
            NativeView::Image { view, .. } => unsafe {
                self.ctx.device.destroy_image_view(view, None)
            },
            NativeView::Buffer { view, .. } => unsafe {
                self.ctx.device.destroy_buffer_view(view, None)
            },
        }
    }

    pub(crate) fn destroy_native_resource(&self, resource: &ResourceRecord) {
        match resource.native {
            NativeResource::Image { image, .. } => unsafe {
                self.ctx.device.destroy_image(image, None)
            },
            NativeResource::Buffer { buffer, .. } => unsafe {
                self.ctx.device.destroy_buffer(buffer, None)
            },
        }
        if let Some(allocation) = resource.allocation.lock().take() {
            self.ctx.allocator.free(allocation);
        }
    }

    fn flush_all_queues(&self) {
        for queue in self.queues() {
            queue.flush();
        }
    }
}

/// Format features a resource usage needs with optimal tiling.
pub fn required_format_features(usage: ResourceUsage) -> vk::FormatFeatureFlags {
    let mut features = vk::FormatFeatureFlags::empty();
    if usage.intersects(ResourceUsage::DEPTH_STENCIL) {
        features |= vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
    }
    if usage.intersects(ResourceUsage::RENDER_TARGET | ResourceUsage::RESOLVE_DEST) {
        features |= vk::FormatFeatureFlags::COLOR_ATTACHMENT;
    }
    if usage.intersects(ResourceUsage::SHADER_RESOURCE) {
        features |= vk::FormatFeatureFlags::SAMPLED_IMAGE;
    }
    if usage.contains(ResourceUsage::UNORDERED_ACCESS) {
        features |= vk::FormatFeatureFlags::STORAGE_IMAGE;
    }
    if usage.contains(ResourceUsage::COPY_DEST) {
        features |= vk::FormatFeatureFlags::TRANSFER_DST;
    }
    if usage.intersects(ResourceUsage::COPY_SOURCE | ResourceUsage::RESOLVE_SOURCE) {
        features |= vk::FormatFeatureFlags::TRANSFER_SRC;
    }
    features
}

impl Device for VulkanDevice {
    fn native(&self) -> u64 {
        self.handle().as_raw()
    }

    fn check_capability(&self, capability: DeviceCaps) -> bool {
        let features = &self.ctx.features;
        let enabled = |flag: vk::Bool32| flag == vk::TRUE;
        match capability {
            DeviceCaps::GeometryShader => enabled(features.geometry_shader),
            DeviceCaps::HullAndDomainShader => enabled(features.tessellation_shader),
            DeviceCaps::LogicOp => enabled(features.logic_op),
            DeviceCaps::DualSourceBlend => enabled(features.dual_src_blend),
            DeviceCaps::IndependentBlend => enabled(features.independent_blend),
            DeviceCaps::FillModeNonSolid => enabled(features.fill_mode_non_solid),
            DeviceCaps::MultiViewport => enabled(features.multi_viewport),
            DeviceCaps::SamplerAnisotropic => enabled(features.sampler_anisotropy),
            DeviceCaps::ConservativeRasterization => self
                .ctx
                .has_extension(ash::ext::conservative_rasterization::NAME),
            DeviceCaps::PartialPushDescriptorUpdates => self.ctx.push_descriptors_enabled(),
            DeviceCaps::SharedResource => {
                self.ctx.has_extension(ash::khr::external_memory_fd::NAME)
            }
            DeviceCaps::ComputeShader
            | DeviceCaps::PartialPushConstantUpdates
            | DeviceCaps::DrawInstanced
            | DeviceCaps::DrawOrDispatchIndirect
            | DeviceCaps::CopyBufferRegion
            | DeviceCaps::CopyBufferToTexture
            | DeviceCaps::Blit
            | DeviceCaps::ResolveRegion
            | DeviceCaps::CopyQueryPoolResults
            | DeviceCaps::SamplerCompare
            | DeviceCaps::SamplerWithResourceView => true,
        }
    }

    fn check_format_support(&self, format: Format, usage: ResourceUsage) -> bool {
        if format == Format::Unknown {
            return false;
        }
        let properties = unsafe {
            self.ctx.instance.get_physical_device_format_properties(
                self.ctx.physical_device,
                convert_format(format),
            )
        };
        properties
            .optimal_tiling_features
            .contains(required_format_features(usage))
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> LayerResult<SamplerHandle> {
        VulkanDevice::create_sampler(self, desc)
    }

    fn destroy_sampler(&self, sampler: SamplerHandle) {
        VulkanDevice::destroy_sampler(self, sampler)
    }

    fn create_resource(
        &self,
        desc: &ResourceDesc,
        initial_data: Option<&[SubresourceData<'_>]>,
        initial_usage: ResourceUsage,
    ) -> LayerResult<ResourceHandle> {
        VulkanDevice::create_resource(self, desc, initial_data, initial_usage)
    }

    fn destroy_resource(&self, resource: ResourceHandle) {
        VulkanDevice::destroy_resource(self, resource)
    }

    fn get_resource_desc(&self, resource: ResourceHandle) -> Option<ResourceDesc> {
        let record = self.ctx.records.get::<ResourceRecord>(resource.raw());
        if record.is_none() {
            log::warn!("no resource record for {:#x}", resource.raw());
        }
        record.map(|record| record.desc)
    }

    fn create_resource_view(
        &self,
        resource: ResourceHandle,
        usage_type: ResourceUsage,
        desc: &ResourceViewDesc,
    ) -> LayerResult<ResourceViewHandle> {
        VulkanDevice::create_resource_view(self, resource, usage_type, desc)
    }

    fn destroy_resource_view(&self, view: ResourceViewHandle) {
        VulkanDevice::destroy_resource_view(self, view)
    }

    fn get_resource_from_view(&self, view: ResourceViewHandle) -> Option<ResourceHandle> {
        self.ctx
            .records
            .get::<ViewRecord>(view.raw())
            .map(|record| record.resource)
    }

    fn get_resource_view_desc(&self, view: ResourceViewHandle) -> Option<ResourceViewDesc> {
        self.ctx
            .records
            .get::<ViewRecord>(view.raw())
            .map(|record| record.desc)
    }

    fn map_buffer_region(
        &self,
        resource: ResourceHandle,
        offset: u64,
        size: u64,
        access: MapAccess,
    ) -> LayerResult<NonNull<u8>> {
        VulkanDevice::map_buffer_region(self, resource, offset, size, access)
    }

    fn unmap_buffer_region(&self, resource: ResourceHandle) {
        VulkanDevice::unmap_buffer_region(self, resource)
    }

    fn map_texture_region(
        &self,
        resource: ResourceHandle,
        subresource: u32,
        region: Option<&SubresourceBox>,
        access: MapAccess,
    ) -> LayerResult<SubresourceMapping> {
        VulkanDevice::map_texture_region(self, resource, subresource, region, access)
    }

    fn unmap_texture_region(&self, resource: ResourceHandle, subresource: u32) {
        VulkanDevice::unmap_texture_region(self, resource, subresource)
    }

    fn update_buffer_region(
        &self,
        data: &[u8],
        resource: ResourceHandle,
        offset: u64,
    ) -> LayerResult<()> {
        VulkanDevice::update_buffer_region(self, data, resource, offset)
    }

    fn update_texture_region(
        &self,
        data: &SubresourceData<'_>,
        resource: ResourceHandle,
        subresource: u32,
        region: Option<&SubresourceBox>,
    ) -> LayerResult<()> {
        VulkanDevice::update_texture_region(self, data, resource, subresource, region)
    }

    fn create_pipeline(
        &self,
        layout: PipelineLayoutHandle,
        desc: &PipelineDesc<'_>,
    ) -> LayerResult<PipelineHandle> {
        VulkanDevice::create_pipeline(self, layout, desc)
    }

    fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        VulkanDevice::destroy_pipeline(self, pipeline)
    }

    fn create_pipeline_layout(
        &self,
        params: &[PipelineLayoutParam],
    ) -> LayerResult<PipelineLayoutHandle> {
        VulkanDevice::create_pipeline_layout(self, params)
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle) {
        VulkanDevice::destroy_pipeline_layout(self, layout)
    }

    fn get_pipeline_layout_desc(
        &self,
        layout: PipelineLayoutHandle,
    ) -> Option<Vec<PipelineLayoutParam>> {
        VulkanDevice::get_pipeline_layout_desc(self, layout)
    }

    fn create_descriptor_set_layout(
        &self,
        ranges: &[DescriptorRange],
        push_descriptors: bool,
    ) -> LayerResult<DescriptorSetLayoutHandle> {
        VulkanDevice::create_descriptor_set_layout(self, ranges, push_descriptors)
    }

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle) {
        VulkanDevice::destroy_descriptor_set_layout(self, layout)
    }

    fn allocate_descriptor_sets(
        &self,
        layouts: &[DescriptorSetLayoutHandle],
    ) -> LayerResult<Vec<DescriptorSetHandle>> {
        VulkanDevice::allocate_descriptor_sets(self, layouts)
    }

    fn free_descriptor_sets(&self, sets: &[DescriptorSetHandle]) {
        VulkanDevice::free_descriptor_sets(self, sets)
    }

    fn update_descriptor_sets(&self, updates: &[DescriptorSetUpdate<'_>]) {
        VulkanDevice::update_descriptor_sets(self, updates)
    }

    fn copy_descriptor_sets(&self, copies: &[DescriptorSetCopy]) {
        VulkanDevice::copy_descriptor_sets(self, copies)
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> LayerResult<RenderPassHandle> {
        VulkanDevice::create_render_pass(self, desc)
    }

    fn destroy_render_pass(&self, render_pass: RenderPassHandle) {
        VulkanDevice::destroy_render_pass(self, render_pass)
    }

    fn get_render_pass_desc(&self, render_pass: RenderPassHandle) -> Option<RenderPassDesc> {
        self.ctx
            .records
            .get::<RenderPassRecord>(render_pass.raw())
            .map(|record| record.desc.clone())
    }

    fn create_framebuffer(&self, desc: &FramebufferDesc) -> LayerResult<FramebufferHandle> {
        VulkanDevice::create_framebuffer(self, desc)
    }

    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle) {
        VulkanDevice::destroy_framebuffer(self, framebuffer)
    }

    fn get_framebuffer_attachment(
        &self,
        framebuffer: FramebufferHandle,
        index: u32,
    ) -> Option<ResourceViewHandle> {
        self.ctx
            .records
            .get::<FramebufferRecord>(framebuffer.raw())
            .and_then(|record| record.attachments.get(index as usize).copied())
    }

    fn create_query_pool(&self, ty: QueryType, count: u32) -> LayerResult<QueryPoolHandle> {
        VulkanDevice::create_query_pool(self, ty, count)
    }

    fn destroy_query_pool(&self, pool: QueryPoolHandle) {
        VulkanDevice::destroy_query_pool(self, pool)
    }

    fn get_query_pool_results(
        &self,
        pool: QueryPoolHandle,
        first: u32,
        results: &mut [u64],
    ) -> LayerResult<bool> {
        let record = self
            .ctx
            .records
            .get::<QueryPoolRecord>(pool.raw())
            .ok_or(LayerError::HandleNotFound(pool.raw()))?;
        let native = vk::QueryPool::from_raw(pool.raw());
        let flags = vk::QueryResultFlags::TYPE_64;
        let available = record.count.saturating_sub(first) as usize;
        if available == 0 {
            return Err(LayerError::InvalidParameter(format!(
                "first query {first} is outside a pool of {}",
                record.count
            )));
        }

        let result = if record.ty == QueryType::PipelineStatistics {
            debug_assert_eq!(
                pipeline_statistics_flags().as_raw().count_ones() as usize,
                PIPELINE_STATISTICS_COUNT
            );
            let usable = (results.len() / PIPELINE_STATISTICS_COUNT).min(available)
                * PIPELINE_STATISTICS_COUNT;
            let grouped: &mut [[u64; PIPELINE_STATISTICS_COUNT]] =
                bytemuck::cast_slice_mut(&mut results[..usable]);
            unsafe { self.ctx.device.get_query_pool_results(native, first, grouped, flags) }
        } else {
            let count = results.len().min(available);
            unsafe {
                self.ctx
                    .device
                    .get_query_pool_results(native, first, &mut results[..count], flags)
            }
        };

        match result {
            Ok(()) => Ok(true),
            Err(vk::Result::NOT_READY) => Ok(false),
            Err(e) => {
                log::error!("vkGetQueryPoolResults failed: {e:?}");
                Err(e.into())
            }
        }
    }

    fn set_resource_name(&self, resource: ResourceHandle, name: &str) {
        let Some(record) = self.ctx.records.get::<ResourceRecord>(resource.raw()) else {
            log::warn!("naming untracked resource {:#x}", resource.raw());
            return;
        };
        match record.native {
            NativeResource::Image { image, .. } => self.ctx.set_debug_name(image, name),
            NativeResource::Buffer { buffer, .. } => self.ctx.set_debug_name(buffer, name),
        }
    }

    fn wait_idle(&self) {
        self.flush_all_queues();
        if let Err(e) = unsafe { self.ctx.device.device_wait_idle() } {
            log::error!("vkDeviceWaitIdle failed: {e:?}");
        }
    }
}

impl std::fmt::Debug for VulkanDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanDevice")
            .field("handle", &self.handle())
            .field("queues", &self.queues.read().len())
            .field("records", &self.ctx.records.total())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_count_matches_flags() {
        assert_eq!(
            pipeline_statistics_flags().as_raw().count_ones() as usize,
            PIPELINE_STATISTICS_COUNT
        );
    }

    #[test]
    fn test_required_format_features() {
        assert_eq!(
            required_format_features(ResourceUsage::RENDER_TARGET | ResourceUsage::SHADER_RESOURCE),
            vk::FormatFeatureFlags::COLOR_ATTACHMENT | vk::FormatFeatureFlags::SAMPLED_IMAGE
        );
        assert_eq!(
            required_format_features(ResourceUsage::DEPTH_STENCIL_WRITE),
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
        );
        assert!(required_format_features(ResourceUsage::UNDEFINED).is_empty());
    }
}
