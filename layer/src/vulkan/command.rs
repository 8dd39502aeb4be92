//! Command recording on one native command buffer.

use std::sync::Arc;

use ash::vk;
use ash::vk::Handle;

use super::barriers::BarrierBatch;
use super::conversion::{
    convert_filter, convert_format, convert_query_control, convert_shader_stages,
    format_aspect_mask, subresource_to_level_layer, ImageInfo,
};
use super::debug;
use super::descriptors::ResolvedDescriptors;
use super::device::DeviceContext;
use super::records::{
    FramebufferRecord, NativeResource, NativeView, PipelineLayoutRecord, PipelineRecord,
    QueryPoolRecord, Recorded, ResourceRecord, ViewRecord,
};
use crate::api::{
    ClearValue, CommandList, DescriptorSetHandle, DescriptorSetUpdate, FilterType, Format,
    FramebufferHandle, IndirectCommand, PipelineHandle, PipelineLayoutHandle, QueryPoolHandle,
    QueryType, Rect, RenderPassHandle, ResourceHandle, ResourceUsage, ResourceViewDesc,
    ResourceViewHandle, ShaderStage, SubresourceBox, ViewRange, Viewport,
};

/// Usage transitions bracketing an explicit clear of a view that is in `usage`.
pub(crate) fn clear_transitions(usage: ResourceUsage) -> [(ResourceUsage, ResourceUsage); 2] {
    [
        (usage, ResourceUsage::COPY_DEST),
        (ResourceUsage::COPY_DEST, usage),
    ]
}

/// Offset and extent of a box, or of the whole subresource.
pub(crate) fn box_region(
    region: Option<&SubresourceBox>,
    full: vk::Extent3D,
) -> (vk::Offset3D, vk::Extent3D) {
    match region {
        Some(region) => (
            vk::Offset3D {
                x: region.left as i32,
                y: region.top as i32,
                z: region.front as i32,
            },
            vk::Extent3D {
                width: region.width(),
                height: region.height(),
                depth: region.depth().max(1),
            },
        ),
        None => (vk::Offset3D::default(), full),
    }
}

pub(crate) fn mip_extent(extent: vk::Extent3D, level: u32) -> vk::Extent3D {
    vk::Extent3D {
        width: (extent.width >> level).max(1),
        height: (extent.height >> level).max(1),
        depth: (extent.depth >> level).max(1),
    }
}

fn end_offset(offset: vk::Offset3D, extent: vk::Extent3D) -> vk::Offset3D {
    vk::Offset3D {
        x: offset.x + extent.width as i32,
        y: offset.y + extent.height as i32,
        z: offset.z + extent.depth as i32,
    }
}

/// Bind points a set of shader stages can be bound to.
pub(crate) fn bind_points(stages: ShaderStage) -> impl Iterator<Item = vk::PipelineBindPoint> {
    let graphics = stages
        .intersects(ShaderStage::ALL_GRAPHICS)
        .then_some(vk::PipelineBindPoint::GRAPHICS);
    let compute = stages
        .contains(ShaderStage::COMPUTE)
        .then_some(vk::PipelineBindPoint::COMPUTE);
    graphics.into_iter().chain(compute)
}

fn convert_rect(rect: &Rect) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D {
            x: rect.left,
            y: rect.top,
        },
        extent: vk::Extent2D {
            width: (rect.right - rect.left).max(0) as u32,
            height: (rect.bottom - rect.top).max(0) as u32,
        },
    }
}

fn convert_clear_value(value: &ClearValue) -> vk::ClearValue {
    match *value {
        ClearValue::Color(float32) => vk::ClearValue {
            color: vk::ClearColorValue { float32 },
        },
        ClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth,
                stencil: u32::from(stencil),
            },
        },
    }
}

fn subresource_layers(info: &ImageInfo, subresource: u32) -> vk::ImageSubresourceLayers {
    let (mip_level, base_array_layer) = subresource_to_level_layer(subresource, info.mip_levels);
    vk::ImageSubresourceLayers {
        aspect_mask: format_aspect_mask(info.format),
        mip_level,
        base_array_layer,
        layer_count: 1,
    }
}

/// Records abstract commands into a native command buffer.
///
/// Lookups that miss the registry are logged and the command is dropped.
pub struct VulkanCommandList {
    ctx: Arc<DeviceContext>,
    cmd: vk::CommandBuffer,
    has_commands: bool,
    barriers: BarrierBatch,
}

impl VulkanCommandList {
    pub fn new(ctx: Arc<DeviceContext>, cmd: vk::CommandBuffer) -> Self {
        Self {
            ctx,
            cmd,
            has_commands: false,
            barriers: BarrierBatch::new(),
        }
    }

    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.cmd
    }

    /// Returns `true` if anything was recorded since the last reset.
    pub fn has_commands(&self) -> bool {
        self.has_commands
    }

    /// Note that a command is about to be recorded and return the buffer to record into.
    pub(crate) fn mark_recorded(&mut self) -> vk::CommandBuffer {
        self.has_commands = true;
        self.cmd
    }

    /// Continue recording into `cmd`, which must be freshly begun.
    pub(crate) fn reset(&mut self, cmd: vk::CommandBuffer) {
        self.cmd = cmd;
        self.has_commands = false;
        self.barriers.clear();
    }

    fn device(&self) -> &ash::Device {
        &self.ctx.device
    }

    pub fn transition_image(
        &mut self,
        image: vk::Image,
        range: vk::ImageSubresourceRange,
        old_usage: ResourceUsage,
        new_usage: ResourceUsage,
    ) {
        self.barriers
            .add_image_transition(image, range, old_usage, new_usage);
        self.flush_barriers();
    }

    pub fn transition_buffer(
        &mut self,
        buffer: vk::Buffer,
        old_usage: ResourceUsage,
        new_usage: ResourceUsage,
    ) {
        self.barriers
            .add_buffer_transition(buffer, old_usage, new_usage);
        self.flush_barriers();
    }

    fn flush_barriers(&mut self) {
        if self.barriers.is_empty() {
            return;
        }
        let cmd = self.mark_recorded();
        self.barriers.record(&self.ctx.device, cmd);
        self.barriers.clear();
    }

    fn resource(&self, handle: ResourceHandle) -> Option<NativeResource> {
        match self.ctx.records.get::<ResourceRecord>(handle.raw()) {
            Some(record) => Some(record.native),
            None => {
                log::warn!("no record for resource {:#x}", handle.raw());
                None
            }
        }
    }

    fn image(&self, handle: ResourceHandle) -> Option<(vk::Image, ImageInfo)> {
        match self.resource(handle)? {
            NativeResource::Image { image, info } => Some((image, info)),
            NativeResource::Buffer { .. } => {
                log::warn!("resource {:#x} is not a texture", handle.raw());
                None
            }
        }
    }

    fn buffer(&self, handle: ResourceHandle) -> Option<vk::Buffer> {
        match self.resource(handle)? {
            NativeResource::Buffer { buffer, .. } => Some(buffer),
            NativeResource::Image { .. } => {
                log::warn!("resource {:#x} is not a buffer", handle.raw());
                None
            }
        }
    }

    fn view(&self, handle: ResourceViewHandle) -> Option<(NativeView, ResourceViewDesc)> {
        match self.ctx.records.get::<ViewRecord>(handle.raw()) {
            Some(record) => Some((record.native, record.desc)),
            None => {
                log::warn!("no record for view {:#x}", handle.raw());
                None
            }
        }
    }

    fn layout(&self, handle: PipelineLayoutHandle) -> Option<Recorded<PipelineLayoutRecord>> {
        let record = self.ctx.records.get::<PipelineLayoutRecord>(handle.raw());
        if record.is_none() {
            log::warn!("no record for pipeline layout {:#x}", handle.raw());
        }
        record
    }

    /// Clear an image view through a transfer, leaving it in `usage`.
    fn clear_image_explicit(
        &mut self,
        image: vk::Image,
        range: vk::ImageSubresourceRange,
        usage: ResourceUsage,
        clear: impl FnOnce(&ash::Device, vk::CommandBuffer),
    ) {
        let [before, after] = clear_transitions(usage);
        self.transition_image(image, range, before.0, before.1);
        let cmd = self.mark_recorded();
        clear(&self.ctx.device, cmd);
        self.transition_image(image, range, after.0, after.1);
    }

    fn clear_unordered_access_view(&mut self, view: ResourceViewHandle, color: vk::ClearColorValue, fill: u32) {
        let Some((native, desc)) = self.view(view) else {
            return;
        };
        let cmd = self.mark_recorded();
        match native {
            NativeView::Image { image, range, .. } => unsafe {
                self.device().cmd_clear_color_image(
                    cmd,
                    image,
                    vk::ImageLayout::GENERAL,
                    &color,
                    &[range],
                )
            },
            NativeView::Buffer { buffer, .. } => {
                let (offset, size) = match desc.range {
                    ViewRange::Buffer { offset, size } if size != u64::MAX => (offset, size & !3),
                    ViewRange::Buffer { offset, .. } => (offset, vk::WHOLE_SIZE),
                    ViewRange::Texture { .. } => (0, vk::WHOLE_SIZE),
                };
                unsafe { self.device().cmd_fill_buffer(cmd, buffer, offset, size, fill) };
            }
        }
    }
}

impl std::fmt::Debug for VulkanCommandList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanCommandList")
            .field("cmd", &self.cmd)
            .field("has_commands", &self.has_commands)
            .finish_non_exhaustive()
    }
}

impl CommandList for VulkanCommandList {
    fn native(&self) -> u64 {
        self.cmd.as_raw()
    }

    fn barrier(
        &mut self,
        resources: &[ResourceHandle],
        old_states: &[ResourceUsage],
        new_states: &[ResourceUsage],
    ) {
        debug_assert_eq!(resources.len(), old_states.len());
        debug_assert_eq!(resources.len(), new_states.len());
        for ((resource, old), new) in resources.iter().zip(old_states).zip(new_states) {
            match self.resource(*resource) {
                Some(NativeResource::Image { image, info }) => {
                    self.barriers
                        .add_image_transition(image, info.full_range(), *old, *new)
                }
                Some(NativeResource::Buffer { buffer, .. }) => {
                    self.barriers.add_buffer_transition(buffer, *old, *new)
                }
                None => {}
            }
        }
        self.flush_barriers();
    }

    fn begin_render_pass(
        &mut self,
        render_pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        clear_values: &[ClearValue],
    ) {
        let Some(record) = self.ctx.records.get::<FramebufferRecord>(framebuffer.raw()) else {
            log::warn!("no record for framebuffer {:#x}", framebuffer.raw());
            return;
        };
        let clear_values: Vec<_> = clear_values.iter().map(convert_clear_value).collect();
        let info = vk::RenderPassBeginInfo::default()
            .render_pass(vk::RenderPass::from_raw(render_pass.raw()))
            .framebuffer(vk::Framebuffer::from_raw(framebuffer.raw()))
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: record.extent,
            })
            .clear_values(&clear_values);
        let cmd = self.mark_recorded();
        unsafe {
            self.device()
                .cmd_begin_render_pass(cmd, &info, vk::SubpassContents::INLINE)
        };
    }

    fn end_render_pass(&mut self) {
        let cmd = self.mark_recorded();
        unsafe { self.device().cmd_end_render_pass(cmd) };
    }

    fn bind_pipeline(&mut self, pipeline: PipelineHandle) {
        // Pipelines the application created carry no record and are graphics.
        let bind_point = self
            .ctx
            .records
            .get::<PipelineRecord>(pipeline.raw())
            .map_or(vk::PipelineBindPoint::GRAPHICS, |record| record.bind_point);
        let cmd = self.mark_recorded();
        unsafe {
            self.device()
                .cmd_bind_pipeline(cmd, bind_point, vk::Pipeline::from_raw(pipeline.raw()))
        };
    }

    fn bind_viewports(&mut self, first: u32, viewports: &[Viewport]) {
        let viewports: Vec<_> = viewports
            .iter()
            .map(|v| vk::Viewport {
                x: v.x,
                y: v.y,
                width: v.width,
                height: v.height,
                min_depth: v.min_depth,
                max_depth: v.max_depth,
            })
            .collect();
        let cmd = self.mark_recorded();
        unsafe { self.device().cmd_set_viewport(cmd, first, &viewports) };
    }

    fn bind_scissor_rects(&mut self, first: u32, rects: &[Rect]) {
        let rects: Vec<_> = rects.iter().map(convert_rect).collect();
        let cmd = self.mark_recorded();
        unsafe { self.device().cmd_set_scissor(cmd, first, &rects) };
    }

    fn set_blend_constant(&mut self, constant: [f32; 4]) {
        let cmd = self.mark_recorded();
        unsafe { self.device().cmd_set_blend_constants(cmd, &constant) };
    }

    fn set_stencil_reference(&mut self, reference: u32) {
        let cmd = self.mark_recorded();
        unsafe {
            self.device()
                .cmd_set_stencil_reference(cmd, vk::StencilFaceFlags::FRONT_AND_BACK, reference)
        };
    }

    fn push_constants(
        &mut self,
        stages: ShaderStage,
        layout: PipelineLayoutHandle,
        param_index: u32,
        first: u32,
        values: &[u32],
    ) {
        let Some(record) = self.layout(layout) else {
            return;
        };
        let Some(range) = record.push_constants(param_index) else {
            log::warn!("parameter {param_index} of layout {:#x} is not a constant range", layout.raw());
            return;
        };
        debug_assert!(first + values.len() as u32 <= range.count);
        let cmd = self.mark_recorded();
        unsafe {
            self.device().cmd_push_constants(
                cmd,
                vk::PipelineLayout::from_raw(layout.raw()),
                convert_shader_stages(stages),
                (range.offset + first) * 4,
                bytemuck::cast_slice(values),
            )
        };
    }

    fn push_descriptors(
        &mut self,
        stages: ShaderStage,
        layout: PipelineLayoutHandle,
        param_index: u32,
        update: &DescriptorSetUpdate<'_>,
    ) {
        let Some(record) = self.layout(layout) else {
            return;
        };
        let Some(set_index) = record.set_index(param_index) else {
            log::warn!("parameter {param_index} of layout {:#x} is not a descriptor set", layout.raw());
            return;
        };
        let native_layout = vk::PipelineLayout::from_raw(layout.raw());
        let resolved = ResolvedDescriptors::resolve(update.ty, &update.descriptors);

        let ctx = Arc::clone(&self.ctx);
        if let Some(push_descriptor) = &ctx.push_descriptor_fn {
            let write = resolved.write(vk::DescriptorSet::null(), update.binding, update.array_offset, update.ty);
            let cmd = self.mark_recorded();
            for bind_point in bind_points(stages) {
                unsafe {
                    push_descriptor.cmd_push_descriptor_set(
                        cmd,
                        bind_point,
                        native_layout,
                        set_index,
                        std::slice::from_ref(&write),
                    )
                };
            }
            return;
        }

        // Without the extension, write a transient set and bind it.
        let Some(set_layout) = record.set_layout(param_index) else {
            return;
        };
        let set = match self
            .ctx
            .descriptor_pools
            .allocate_transient(&self.ctx.device, set_layout)
        {
            Ok(set) => set,
            Err(e) => {
                log::error!("cannot emulate push descriptors: {e}");
                return;
            }
        };
        let write = resolved.write(set, update.binding, update.array_offset, update.ty);
        unsafe { self.device().update_descriptor_sets(std::slice::from_ref(&write), &[]) };
        let cmd = self.mark_recorded();
        for bind_point in bind_points(stages) {
            unsafe {
                self.device()
                    .cmd_bind_descriptor_sets(cmd, bind_point, native_layout, set_index, &[set], &[])
            };
        }
    }

    fn bind_descriptor_sets(
        &mut self,
        stages: ShaderStage,
        layout: PipelineLayoutHandle,
        first_param: u32,
        sets: &[DescriptorSetHandle],
    ) {
        if sets.is_empty() {
            return;
        }
        let Some(record) = self.layout(layout) else {
            return;
        };
        let Some(first_set) = record.set_index(first_param) else {
            log::warn!("parameter {first_param} of layout {:#x} is not a descriptor set", layout.raw());
            return;
        };
        let sets: Vec<_> = sets
            .iter()
            .map(|set| vk::DescriptorSet::from_raw(set.raw()))
            .collect();
        let cmd = self.mark_recorded();
        for bind_point in bind_points(stages) {
            unsafe {
                self.device().cmd_bind_descriptor_sets(
                    cmd,
                    bind_point,
                    vk::PipelineLayout::from_raw(layout.raw()),
                    first_set,
                    &sets,
                    &[],
                )
            };
        }
    }

    fn bind_index_buffer(&mut self, buffer: ResourceHandle, offset: u64, index_size: u32) {
        let index_type = match index_size {
            2 => vk::IndexType::UINT16,
            4 => vk::IndexType::UINT32,
            other => {
                debug_assert!(false, "invalid index size {other}");
                return;
            }
        };
        let cmd = self.mark_recorded();
        unsafe {
            self.device().cmd_bind_index_buffer(
                cmd,
                vk::Buffer::from_raw(buffer.raw()),
                offset,
                index_type,
            )
        };
    }

    fn bind_vertex_buffers(&mut self, first: u32, buffers: &[ResourceHandle], offsets: &[u64]) {
        debug_assert_eq!(buffers.len(), offsets.len());
        let count = buffers.len().min(offsets.len());
        let buffers: Vec<_> = buffers[..count]
            .iter()
            .map(|buffer| vk::Buffer::from_raw(buffer.raw()))
            .collect();
        let cmd = self.mark_recorded();
        unsafe {
            self.device()
                .cmd_bind_vertex_buffers(cmd, first, &buffers, &offsets[..count])
        };
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        let cmd = self.mark_recorded();
        unsafe {
            self.device()
                .cmd_draw(cmd, vertex_count, instance_count, first_vertex, first_instance)
        };
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        let cmd = self.mark_recorded();
        unsafe {
            self.device().cmd_draw_indexed(
                cmd,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        };
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        let cmd = self.mark_recorded();
        unsafe { self.device().cmd_dispatch(cmd, x, y, z) };
    }

    fn draw_or_dispatch_indirect(
        &mut self,
        kind: IndirectCommand,
        buffer: ResourceHandle,
        offset: u64,
        draw_count: u32,
        stride: u32,
    ) {
        let buffer = vk::Buffer::from_raw(buffer.raw());
        let cmd = self.mark_recorded();
        let device = &self.ctx.device;
        match kind {
            IndirectCommand::Draw => unsafe {
                device.cmd_draw_indirect(cmd, buffer, offset, draw_count, stride)
            },
            IndirectCommand::DrawIndexed => unsafe {
                device.cmd_draw_indexed_indirect(cmd, buffer, offset, draw_count, stride)
            },
            IndirectCommand::Dispatch => {
                for i in 0..u64::from(draw_count) {
                    unsafe {
                        device.cmd_dispatch_indirect(cmd, buffer, offset + i * u64::from(stride))
                    };
                }
            }
        }
    }

    fn copy_resource(&mut self, source: ResourceHandle, dest: ResourceHandle) {
        match (self.resource(source), self.resource(dest)) {
            (
                Some(NativeResource::Buffer { buffer: src, info: src_info }),
                Some(NativeResource::Buffer { buffer: dst, info: dst_info }),
            ) => {
                let region = vk::BufferCopy::default().size(src_info.size.min(dst_info.size));
                let cmd = self.mark_recorded();
                unsafe { self.device().cmd_copy_buffer(cmd, src, dst, &[region]) };
            }
            (
                Some(NativeResource::Image { image: src, info }),
                Some(NativeResource::Image { image: dst, .. }),
            ) => {
                let aspect_mask = format_aspect_mask(info.format);
                let regions: Vec<_> = (0..info.mip_levels)
                    .map(|level| {
                        let layers = vk::ImageSubresourceLayers {
                            aspect_mask,
                            mip_level: level,
                            base_array_layer: 0,
                            layer_count: info.array_layers,
                        };
                        vk::ImageCopy::default()
                            .src_subresource(layers)
                            .dst_subresource(layers)
                            .extent(mip_extent(info.extent, level))
                    })
                    .collect();
                let cmd = self.mark_recorded();
                unsafe {
                    self.device().cmd_copy_image(
                        cmd,
                        src,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        dst,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &regions,
                    )
                };
            }
            (Some(_), Some(_)) => {
                debug_assert!(false, "copy between a buffer and a texture");
            }
            _ => {}
        }
    }

    fn copy_buffer_region(
        &mut self,
        source: ResourceHandle,
        source_offset: u64,
        dest: ResourceHandle,
        dest_offset: u64,
        size: u64,
    ) {
        let (Some(src), Some(dst)) = (self.buffer(source), self.buffer(dest)) else {
            return;
        };
        let region = vk::BufferCopy::default()
            .src_offset(source_offset)
            .dst_offset(dest_offset)
            .size(if size == u64::MAX { vk::WHOLE_SIZE } else { size });
        let cmd = self.mark_recorded();
        unsafe { self.device().cmd_copy_buffer(cmd, src, dst, &[region]) };
    }

    fn copy_buffer_to_texture(
        &mut self,
        source: ResourceHandle,
        source_offset: u64,
        row_length: u32,
        slice_height: u32,
        dest: ResourceHandle,
        dest_subresource: u32,
        dest_box: Option<&SubresourceBox>,
    ) {
        let (Some(buffer), Some((image, info))) = (self.buffer(source), self.image(dest)) else {
            return;
        };
        let layers = subresource_layers(&info, dest_subresource);
        let (offset, extent) = box_region(dest_box, mip_extent(info.extent, layers.mip_level));
        let region = vk::BufferImageCopy::default()
            .buffer_offset(source_offset)
            .buffer_row_length(row_length)
            .buffer_image_height(slice_height)
            .image_subresource(layers)
            .image_offset(offset)
            .image_extent(extent);
        let cmd = self.mark_recorded();
        unsafe {
            self.device().cmd_copy_buffer_to_image(
                cmd,
                buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            )
        };
    }

    fn copy_texture_region(
        &mut self,
        source: ResourceHandle,
        source_subresource: u32,
        source_box: Option<&SubresourceBox>,
        dest: ResourceHandle,
        dest_subresource: u32,
        dest_box: Option<&SubresourceBox>,
        filter: FilterType,
    ) {
        let (Some((src, src_info)), Some((dst, dst_info))) = (self.image(source), self.image(dest))
        else {
            return;
        };
        let src_layers = subresource_layers(&src_info, source_subresource);
        let dst_layers = subresource_layers(&dst_info, dest_subresource);
        let (src_offset, src_extent) =
            box_region(source_box, mip_extent(src_info.extent, src_layers.mip_level));
        let (dst_offset, dst_extent) = match dest_box {
            Some(_) => box_region(dest_box, mip_extent(dst_info.extent, dst_layers.mip_level)),
            None => (vk::Offset3D::default(), src_extent),
        };

        let cmd = self.mark_recorded();
        if src_extent == dst_extent {
            let region = vk::ImageCopy::default()
                .src_subresource(src_layers)
                .src_offset(src_offset)
                .dst_subresource(dst_layers)
                .dst_offset(dst_offset)
                .extent(src_extent);
            unsafe {
                self.device().cmd_copy_image(
                    cmd,
                    src,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    dst,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                )
            };
        } else {
            let region = vk::ImageBlit::default()
                .src_subresource(src_layers)
                .src_offsets([src_offset, end_offset(src_offset, src_extent)])
                .dst_subresource(dst_layers)
                .dst_offsets([dst_offset, end_offset(dst_offset, dst_extent)]);
            unsafe {
                self.device().cmd_blit_image(
                    cmd,
                    src,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    dst,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                    convert_filter(filter),
                )
            };
        }
    }

    fn copy_texture_to_buffer(
        &mut self,
        source: ResourceHandle,
        source_subresource: u32,
        source_box: Option<&SubresourceBox>,
        dest: ResourceHandle,
        dest_offset: u64,
        row_length: u32,
        slice_height: u32,
    ) {
        let (Some((image, info)), Some(buffer)) = (self.image(source), self.buffer(dest)) else {
            return;
        };
        let layers = subresource_layers(&info, source_subresource);
        let (offset, extent) = box_region(source_box, mip_extent(info.extent, layers.mip_level));
        let region = vk::BufferImageCopy::default()
            .buffer_offset(dest_offset)
            .buffer_row_length(row_length)
            .buffer_image_height(slice_height)
            .image_subresource(layers)
            .image_offset(offset)
            .image_extent(extent);
        let cmd = self.mark_recorded();
        unsafe {
            self.device().cmd_copy_image_to_buffer(
                cmd,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                buffer,
                &[region],
            )
        };
    }

    fn resolve_texture_region(
        &mut self,
        source: ResourceHandle,
        source_subresource: u32,
        source_box: Option<&SubresourceBox>,
        dest: ResourceHandle,
        dest_subresource: u32,
        dest_offset: [i32; 3],
        format: Format,
    ) {
        let (Some((src, src_info)), Some((dst, dst_info))) = (self.image(source), self.image(dest))
        else {
            return;
        };
        if format != Format::Unknown && convert_format(format) != src_info.format {
            log::debug!("resolve format {format:?} differs from the source, using the source format");
        }
        let src_layers = subresource_layers(&src_info, source_subresource);
        let (src_offset, extent) =
            box_region(source_box, mip_extent(src_info.extent, src_layers.mip_level));
        let region = vk::ImageResolve::default()
            .src_subresource(src_layers)
            .src_offset(src_offset)
            .dst_subresource(subresource_layers(&dst_info, dest_subresource))
            .dst_offset(vk::Offset3D {
                x: dest_offset[0],
                y: dest_offset[1],
                z: dest_offset[2],
            })
            .extent(extent);
        let cmd = self.mark_recorded();
        unsafe {
            self.device().cmd_resolve_image(
                cmd,
                src,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            )
        };
    }

    fn clear_depth_stencil_view(
        &mut self,
        view: ResourceViewHandle,
        depth: Option<f32>,
        stencil: Option<u8>,
        rects: &[Rect],
    ) {
        debug_assert!(rects.is_empty(), "explicit view clears cover the whole view");
        let Some((NativeView::Image { image, mut range, .. }, _)) = self.view(view) else {
            return;
        };
        let mut aspect_mask = vk::ImageAspectFlags::empty();
        if depth.is_some() {
            aspect_mask |= vk::ImageAspectFlags::DEPTH;
        }
        if stencil.is_some() {
            aspect_mask |= vk::ImageAspectFlags::STENCIL;
        }
        range.aspect_mask &= aspect_mask;
        if range.aspect_mask.is_empty() {
            return;
        }
        let value = vk::ClearDepthStencilValue {
            depth: depth.unwrap_or(0.0),
            stencil: u32::from(stencil.unwrap_or(0)),
        };
        self.clear_image_explicit(image, range, ResourceUsage::DEPTH_STENCIL_WRITE, |device, cmd| unsafe {
            device.cmd_clear_depth_stencil_image(
                cmd,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &value,
                &[range],
            )
        });
    }

    fn clear_render_target_view(&mut self, view: ResourceViewHandle, color: [f32; 4], rects: &[Rect]) {
        debug_assert!(rects.is_empty(), "explicit view clears cover the whole view");
        let Some((NativeView::Image { image, range, .. }, _)) = self.view(view) else {
            return;
        };
        let value = vk::ClearColorValue { float32: color };
        self.clear_image_explicit(image, range, ResourceUsage::RENDER_TARGET, |device, cmd| unsafe {
            device.cmd_clear_color_image(
                cmd,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &value,
                &[range],
            )
        });
    }

    fn clear_unordered_access_view_uint(
        &mut self,
        view: ResourceViewHandle,
        values: [u32; 4],
        rects: &[Rect],
    ) {
        debug_assert!(rects.is_empty(), "explicit view clears cover the whole view");
        self.clear_unordered_access_view(view, vk::ClearColorValue { uint32: values }, values[0]);
    }

    fn clear_unordered_access_view_float(
        &mut self,
        view: ResourceViewHandle,
        values: [f32; 4],
        rects: &[Rect],
    ) {
        debug_assert!(rects.is_empty(), "explicit view clears cover the whole view");
        self.clear_unordered_access_view(
            view,
            vk::ClearColorValue { float32: values },
            values[0].to_bits(),
        );
    }

    fn generate_mipmaps(&mut self, view: ResourceViewHandle) {
        let Some((NativeView::Image { image, range, .. }, _)) = self.view(view) else {
            return;
        };
        let Some(info) = self
            .ctx
            .records
            .get::<ResourceRecord>(image.as_raw())
            .and_then(|record| record.image().map(|(_, info)| *info))
        else {
            log::warn!("no texture record behind view {:#x}", view.raw());
            return;
        };

        let first = range.base_mip_level;
        let end = if range.level_count == vk::REMAINING_MIP_LEVELS {
            info.mip_levels
        } else {
            (first + range.level_count).min(info.mip_levels)
        };
        if end <= first + 1 {
            return;
        }
        let layer_count = if range.layer_count == vk::REMAINING_ARRAY_LAYERS {
            info.array_layers - range.base_array_layer
        } else {
            range.layer_count
        };
        let level_range = |level: u32| vk::ImageSubresourceRange {
            aspect_mask: range.aspect_mask,
            base_mip_level: level,
            level_count: 1,
            base_array_layer: range.base_array_layer,
            layer_count,
        };
        let layers = |level: u32| vk::ImageSubresourceLayers {
            aspect_mask: range.aspect_mask,
            mip_level: level,
            base_array_layer: range.base_array_layer,
            layer_count,
        };

        let whole = vk::ImageSubresourceRange {
            level_count: end - first,
            ..level_range(first)
        };
        self.transition_image(image, whole, ResourceUsage::SHADER_RESOURCE, ResourceUsage::COPY_DEST);
        for level in first + 1..end {
            self.transition_image(
                image,
                level_range(level - 1),
                ResourceUsage::COPY_DEST,
                ResourceUsage::COPY_SOURCE,
            );
            let src_extent = mip_extent(info.extent, level - 1);
            let dst_extent = mip_extent(info.extent, level);
            let blit = vk::ImageBlit::default()
                .src_subresource(layers(level - 1))
                .src_offsets([
                    vk::Offset3D::default(),
                    end_offset(vk::Offset3D::default(), src_extent),
                ])
                .dst_subresource(layers(level))
                .dst_offsets([
                    vk::Offset3D::default(),
                    end_offset(vk::Offset3D::default(), dst_extent),
                ]);
            let cmd = self.mark_recorded();
            unsafe {
                self.device().cmd_blit_image(
                    cmd,
                    image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[blit],
                    vk::Filter::LINEAR,
                )
            };
        }
        let sources = vk::ImageSubresourceRange {
            level_count: end - 1 - first,
            ..level_range(first)
        };
        self.barriers.add_image_transition(
            image,
            sources,
            ResourceUsage::COPY_SOURCE,
            ResourceUsage::SHADER_RESOURCE,
        );
        self.barriers.add_image_transition(
            image,
            level_range(end - 1),
            ResourceUsage::COPY_DEST,
            ResourceUsage::SHADER_RESOURCE,
        );
        self.flush_barriers();
    }

    fn begin_query(&mut self, pool: QueryPoolHandle, ty: QueryType, index: u32) {
        if ty == QueryType::Timestamp {
            debug_assert!(false, "timestamps are written with end_query");
            return;
        }
        let pool = vk::QueryPool::from_raw(pool.raw());
        let cmd = self.mark_recorded();
        unsafe {
            self.device()
                .cmd_begin_query(cmd, pool, index, convert_query_control(ty))
        };
    }

    fn end_query(&mut self, pool: QueryPoolHandle, ty: QueryType, index: u32) {
        let pool = vk::QueryPool::from_raw(pool.raw());
        let cmd = self.mark_recorded();
        if ty == QueryType::Timestamp {
            unsafe {
                self.device().cmd_write_timestamp(
                    cmd,
                    vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                    pool,
                    index,
                )
            };
        } else {
            unsafe { self.device().cmd_end_query(cmd, pool, index) };
        }
    }

    fn copy_query_pool_results(
        &mut self,
        pool: QueryPoolHandle,
        ty: QueryType,
        first: u32,
        count: u32,
        dest: ResourceHandle,
        dest_offset: u64,
        stride: u32,
    ) {
        if let Some(record) = self.ctx.records.get::<QueryPoolRecord>(pool.raw()) {
            debug_assert_eq!(record.ty, ty);
        }
        let Some(buffer) = self.buffer(dest) else {
            return;
        };
        let cmd = self.mark_recorded();
        unsafe {
            self.device().cmd_copy_query_pool_results(
                cmd,
                vk::QueryPool::from_raw(pool.raw()),
                first,
                count,
                buffer,
                dest_offset,
                u64::from(stride),
                vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WAIT,
            )
        };
    }

    fn begin_debug_event(&mut self, label: &str, color: [f32; 4]) {
        if let Some(debug_utils) = &self.ctx.debug_utils_fn {
            self.has_commands = true;
            let cmd = self.cmd;
            debug::cmd_begin_label(debug_utils, cmd, label, color);
        }
    }

    fn end_debug_event(&mut self) {
        if let Some(debug_utils) = &self.ctx.debug_utils_fn {
            self.has_commands = true;
            let cmd = self.cmd;
            debug::cmd_end_label(debug_utils, cmd);
        }
    }

    fn insert_debug_marker(&mut self, label: &str, color: [f32; 4]) {
        if let Some(debug_utils) = &self.ctx.debug_utils_fn {
            self.has_commands = true;
            let cmd = self.cmd;
            debug::cmd_insert_label(debug_utils, cmd, label, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_transitions_round_trip() {
        let [before, after] = clear_transitions(ResourceUsage::RENDER_TARGET);
        assert_eq!(before, (ResourceUsage::RENDER_TARGET, ResourceUsage::COPY_DEST));
        assert_eq!(after, (ResourceUsage::COPY_DEST, ResourceUsage::RENDER_TARGET));
    }

    #[test]
    fn test_box_region() {
        let full = vk::Extent3D {
            width: 64,
            height: 32,
            depth: 1,
        };
        assert_eq!(box_region(None, full), (vk::Offset3D::default(), full));

        let region = SubresourceBox {
            left: 8,
            top: 4,
            front: 0,
            right: 24,
            bottom: 12,
            back: 1,
        };
        let (offset, extent) = box_region(Some(&region), full);
        assert_eq!((offset.x, offset.y, offset.z), (8, 4, 0));
        assert_eq!((extent.width, extent.height, extent.depth), (16, 8, 1));
    }

    #[test]
    fn test_mip_extent_clamps() {
        let extent = vk::Extent3D {
            width: 256,
            height: 16,
            depth: 1,
        };
        let level = mip_extent(extent, 6);
        assert_eq!((level.width, level.height, level.depth), (4, 1, 1));
    }

    #[test]
    fn test_bind_points_follow_stages() {
        let points: Vec<_> = bind_points(ShaderStage::PIXEL).collect();
        assert_eq!(points, vec![vk::PipelineBindPoint::GRAPHICS]);
        let points: Vec<_> = bind_points(ShaderStage::ALL).collect();
        assert_eq!(
            points,
            vec![vk::PipelineBindPoint::GRAPHICS, vk::PipelineBindPoint::COMPUTE]
        );
        assert_eq!(bind_points(ShaderStage::empty()).count(), 0);
    }

    #[test]
    fn test_rect_conversion_clamps_inverted() {
        let rect = convert_rect(&Rect {
            left: 10,
            top: 10,
            right: 5,
            bottom: 20,
        });
        assert_eq!(rect.extent.width, 0);
        assert_eq!(rect.extent.height, 10);
    }
}
