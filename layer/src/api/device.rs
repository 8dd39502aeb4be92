//! Upward interfaces consumed by effect runtimes and other collaborators.
//!
//! All handles passed through these traits are native handle values.

use std::ptr::NonNull;
use std::sync::Arc;

use bitflags::bitflags;

use super::format::Format;
use super::handles::*;
use super::pipeline::*;
use super::resource::*;
use crate::error::LayerResult;

/// Optional device capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceCaps {
    ComputeShader,
    GeometryShader,
    HullAndDomainShader,
    LogicOp,
    DualSourceBlend,
    IndependentBlend,
    FillModeNonSolid,
    ConservativeRasterization,
    MultiViewport,
    PartialPushConstantUpdates,
    PartialPushDescriptorUpdates,
    DrawInstanced,
    DrawOrDispatchIndirect,
    CopyBufferRegion,
    CopyBufferToTexture,
    Blit,
    ResolveRegion,
    CopyQueryPoolResults,
    SamplerCompare,
    SamplerAnisotropic,
    SamplerWithResourceView,
    SharedResource,
}

bitflags! {
    /// Kinds of work a queue accepts.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct QueueType: u32 {
        const GRAPHICS = 1 << 0;
        const COMPUTE = 1 << 1;
        const COPY = 1 << 2;
    }
}

/// Present mode of a swap-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PresentMode {
    Immediate,
    Mailbox,
    #[default]
    Fifo,
    FifoRelaxed,
}

/// Presentation parameters of a swap-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SwapchainDesc {
    pub width: u32,
    pub height: u32,
    pub format: Format,
    pub back_buffer_count: u32,
    pub present_mode: PresentMode,
    pub usage: ResourceUsage,
}

/// Device level operations.
pub trait Device: Send + Sync {
    /// Native device handle.
    fn native(&self) -> u64;

    fn check_capability(&self, capability: DeviceCaps) -> bool;
    fn check_format_support(&self, format: Format, usage: ResourceUsage) -> bool;

    fn create_sampler(&self, desc: &SamplerDesc) -> LayerResult<SamplerHandle>;
    fn destroy_sampler(&self, sampler: SamplerHandle);

    /// Create a buffer or texture, optionally uploading `initial_data` and
    /// transitioning it to `initial_usage` before returning.
    fn create_resource(
        &self,
        desc: &ResourceDesc,
        initial_data: Option<&[SubresourceData<'_>]>,
        initial_usage: ResourceUsage,
    ) -> LayerResult<ResourceHandle>;
    fn destroy_resource(&self, resource: ResourceHandle);
    fn get_resource_desc(&self, resource: ResourceHandle) -> Option<ResourceDesc>;

    fn create_resource_view(
        &self,
        resource: ResourceHandle,
        usage_type: ResourceUsage,
        desc: &ResourceViewDesc,
    ) -> LayerResult<ResourceViewHandle>;
    fn destroy_resource_view(&self, view: ResourceViewHandle);
    fn get_resource_from_view(&self, view: ResourceViewHandle) -> Option<ResourceHandle>;
    fn get_resource_view_desc(&self, view: ResourceViewHandle) -> Option<ResourceViewDesc>;

    fn map_buffer_region(
        &self,
        resource: ResourceHandle,
        offset: u64,
        size: u64,
        access: MapAccess,
    ) -> LayerResult<NonNull<u8>>;
    fn unmap_buffer_region(&self, resource: ResourceHandle);
    fn map_texture_region(
        &self,
        resource: ResourceHandle,
        subresource: u32,
        region: Option<&SubresourceBox>,
        access: MapAccess,
    ) -> LayerResult<SubresourceMapping>;
    fn unmap_texture_region(&self, resource: ResourceHandle, subresource: u32);
    fn update_buffer_region(
        &self,
        data: &[u8],
        resource: ResourceHandle,
        offset: u64,
    ) -> LayerResult<()>;
    fn update_texture_region(
        &self,
        data: &SubresourceData<'_>,
        resource: ResourceHandle,
        subresource: u32,
        region: Option<&SubresourceBox>,
    ) -> LayerResult<()>;

    fn create_pipeline(
        &self,
        layout: PipelineLayoutHandle,
        desc: &PipelineDesc<'_>,
    ) -> LayerResult<PipelineHandle>;
    fn destroy_pipeline(&self, pipeline: PipelineHandle);

    fn create_pipeline_layout(
        &self,
        params: &[PipelineLayoutParam],
    ) -> LayerResult<PipelineLayoutHandle>;
    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle);
    fn get_pipeline_layout_desc(&self, layout: PipelineLayoutHandle)
    -> Option<Vec<PipelineLayoutParam>>;

    fn create_descriptor_set_layout(
        &self,
        ranges: &[DescriptorRange],
        push_descriptors: bool,
    ) -> LayerResult<DescriptorSetLayoutHandle>;
    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle);

    fn allocate_descriptor_sets(
        &self,
        layouts: &[DescriptorSetLayoutHandle],
    ) -> LayerResult<Vec<DescriptorSetHandle>>;
    fn free_descriptor_sets(&self, sets: &[DescriptorSetHandle]);
    fn update_descriptor_sets(&self, updates: &[DescriptorSetUpdate<'_>]);
    fn copy_descriptor_sets(&self, copies: &[DescriptorSetCopy]);

    fn create_render_pass(&self, desc: &RenderPassDesc) -> LayerResult<RenderPassHandle>;
    fn destroy_render_pass(&self, render_pass: RenderPassHandle);
    fn get_render_pass_desc(&self, render_pass: RenderPassHandle) -> Option<RenderPassDesc>;

    fn create_framebuffer(&self, desc: &FramebufferDesc) -> LayerResult<FramebufferHandle>;
    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle);
    fn get_framebuffer_attachment(
        &self,
        framebuffer: FramebufferHandle,
        index: u32,
    ) -> Option<ResourceViewHandle>;

    fn create_query_pool(&self, ty: QueryType, count: u32) -> LayerResult<QueryPoolHandle>;
    fn destroy_query_pool(&self, pool: QueryPoolHandle);
    /// Read back results. Returns `false` if some results are not available yet.
    fn get_query_pool_results(
        &self,
        pool: QueryPoolHandle,
        first: u32,
        results: &mut [u64],
    ) -> LayerResult<bool>;

    fn set_resource_name(&self, resource: ResourceHandle, name: &str);

    /// Flush every queue's immediate work and wait for the device to go idle.
    fn wait_idle(&self);
}

/// Command recording operations.
pub trait CommandList {
    /// Native command buffer handle.
    fn native(&self) -> u64;

    /// Transition `resources[i]` from `old_states[i]` to `new_states[i]`.
    fn barrier(
        &mut self,
        resources: &[ResourceHandle],
        old_states: &[ResourceUsage],
        new_states: &[ResourceUsage],
    );

    fn begin_render_pass(
        &mut self,
        render_pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        clear_values: &[ClearValue],
    );
    fn end_render_pass(&mut self);

    fn bind_pipeline(&mut self, pipeline: PipelineHandle);
    fn bind_viewports(&mut self, first: u32, viewports: &[Viewport]);
    fn bind_scissor_rects(&mut self, first: u32, rects: &[Rect]);
    fn set_blend_constant(&mut self, constant: [f32; 4]);
    fn set_stencil_reference(&mut self, reference: u32);

    fn push_constants(
        &mut self,
        stages: ShaderStage,
        layout: PipelineLayoutHandle,
        param_index: u32,
        first: u32,
        values: &[u32],
    );
    fn push_descriptors(
        &mut self,
        stages: ShaderStage,
        layout: PipelineLayoutHandle,
        param_index: u32,
        update: &DescriptorSetUpdate<'_>,
    );
    fn bind_descriptor_sets(
        &mut self,
        stages: ShaderStage,
        layout: PipelineLayoutHandle,
        first_param: u32,
        sets: &[DescriptorSetHandle],
    );

    fn bind_index_buffer(&mut self, buffer: ResourceHandle, offset: u64, index_size: u32);
    fn bind_vertex_buffers(&mut self, first: u32, buffers: &[ResourceHandle], offsets: &[u64]);

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);
    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
    fn dispatch(&mut self, x: u32, y: u32, z: u32);
    fn draw_or_dispatch_indirect(
        &mut self,
        kind: IndirectCommand,
        buffer: ResourceHandle,
        offset: u64,
        draw_count: u32,
        stride: u32,
    );

    /// Copy a whole resource; both must have the same shape.
    fn copy_resource(&mut self, source: ResourceHandle, dest: ResourceHandle);
    fn copy_buffer_region(
        &mut self,
        source: ResourceHandle,
        source_offset: u64,
        dest: ResourceHandle,
        dest_offset: u64,
        size: u64,
    );
    #[allow(clippy::too_many_arguments)]
    fn copy_buffer_to_texture(
        &mut self,
        source: ResourceHandle,
        source_offset: u64,
        row_length: u32,
        slice_height: u32,
        dest: ResourceHandle,
        dest_subresource: u32,
        dest_box: Option<&SubresourceBox>,
    );
    #[allow(clippy::too_many_arguments)]
    fn copy_texture_region(
        &mut self,
        source: ResourceHandle,
        source_subresource: u32,
        source_box: Option<&SubresourceBox>,
        dest: ResourceHandle,
        dest_subresource: u32,
        dest_box: Option<&SubresourceBox>,
        filter: FilterType,
    );
    #[allow(clippy::too_many_arguments)]
    fn copy_texture_to_buffer(
        &mut self,
        source: ResourceHandle,
        source_subresource: u32,
        source_box: Option<&SubresourceBox>,
        dest: ResourceHandle,
        dest_offset: u64,
        row_length: u32,
        slice_height: u32,
    );
    #[allow(clippy::too_many_arguments)]
    fn resolve_texture_region(
        &mut self,
        source: ResourceHandle,
        source_subresource: u32,
        source_box: Option<&SubresourceBox>,
        dest: ResourceHandle,
        dest_subresource: u32,
        dest_offset: [i32; 3],
        format: Format,
    );

    /// Clear a depth-stencil view. The view is expected in depth-stencil
    /// write usage before the call and is left in it afterwards.
    fn clear_depth_stencil_view(
        &mut self,
        view: ResourceViewHandle,
        depth: Option<f32>,
        stencil: Option<u8>,
        rects: &[Rect],
    );
    /// Clear a render target view. The view is expected in render target
    /// usage before the call and is left in it afterwards.
    fn clear_render_target_view(&mut self, view: ResourceViewHandle, color: [f32; 4], rects: &[Rect]);
    fn clear_unordered_access_view_uint(
        &mut self,
        view: ResourceViewHandle,
        values: [u32; 4],
        rects: &[Rect],
    );
    fn clear_unordered_access_view_float(
        &mut self,
        view: ResourceViewHandle,
        values: [f32; 4],
        rects: &[Rect],
    );

    /// Fill every mip level below the view's first from the one above it.
    /// The view is left in shader resource usage.
    fn generate_mipmaps(&mut self, view: ResourceViewHandle);

    fn begin_query(&mut self, pool: QueryPoolHandle, ty: QueryType, index: u32);
    fn end_query(&mut self, pool: QueryPoolHandle, ty: QueryType, index: u32);
    #[allow(clippy::too_many_arguments)]
    fn copy_query_pool_results(
        &mut self,
        pool: QueryPoolHandle,
        ty: QueryType,
        first: u32,
        count: u32,
        dest: ResourceHandle,
        dest_offset: u64,
        stride: u32,
    );

    fn begin_debug_event(&mut self, label: &str, color: [f32; 4]);
    fn end_debug_event(&mut self);
    fn insert_debug_marker(&mut self, label: &str, color: [f32; 4]);
}

/// Queue level operations.
pub trait CommandQueue {
    /// Native queue handle.
    fn native(&self) -> u64;
    fn queue_type(&self) -> QueueType;

    /// Flush immediate work, then wait for the queue to go idle.
    fn wait_idle(&self);
    /// Submit everything recorded on the immediate command list.
    fn flush_immediate_command_list(&self);
    /// Run `f` with the queue's immediate command list.
    ///
    /// Returns `false` if the queue has none (it cannot do graphics work).
    fn with_immediate_command_list(&self, f: &mut dyn FnMut(&mut dyn CommandList)) -> bool;

    fn begin_debug_event(&self, label: &str, color: [f32; 4]);
    fn end_debug_event(&self);
    fn insert_debug_marker(&self, label: &str, color: [f32; 4]);
}

/// Swap-chain back buffer access.
pub trait Swapchain {
    /// Native swap-chain handle.
    fn native(&self) -> u64;
    fn device(&self) -> Arc<dyn Device>;
    fn desc(&self) -> SwapchainDesc;

    fn get_back_buffer(&self, index: u32) -> ResourceHandle;
    fn get_back_buffer_count(&self) -> u32;
    fn get_current_back_buffer_index(&self) -> u32;

    fn get_current_back_buffer(&self) -> ResourceHandle {
        self.get_back_buffer(self.get_current_back_buffer_index())
    }
}

/// Post-processing runtime attached to a swap-chain lineage.
///
/// One runtime object survives every re-creation of the swap-chain it was
/// created for.
pub trait EffectRuntime: Send + Sync {
    /// Called after (re-)creation. Returning `false` leaves the runtime idle
    /// until the next re-creation.
    fn on_init(&self, swapchain: &dyn Swapchain) -> bool;
    /// Called before back buffers go away.
    fn on_reset(&self);
    /// Called on every present, before the native present is forwarded.
    fn on_present(&self, queue: &dyn CommandQueue, swapchain: &dyn Swapchain);
}
