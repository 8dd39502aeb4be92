//! Samplers, resources, views and query pools.
//!
//! Objects created through [`crate::api::Device`] are owned by the layer. The
//! `register_*` functions attach records to objects the application created,
//! so collaborators can query them like their own.

use std::ptr::NonNull;

use ash::vk;
use ash::vk::Handle;
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;

use super::allocator::{StagingBuffer, memory_location};
use super::conversion::{
    BufferInfo, ImageInfo, convert_buffer_desc, convert_buffer_info, convert_format,
    convert_format_from_vk, convert_image_info, convert_image_view_info, convert_query_type,
    convert_sampler_desc, convert_sampler_info, convert_texture_desc, convert_view_range,
    convert_view_type, format_aspect_mask, pipeline_statistics_flags, subresource_to_level_layer,
};
use super::device::VulkanDevice;
use super::records::{
    NativeResource, NativeView, QueryPoolRecord, ResourceOwner, ResourceRecord, SamplerRecord,
    ViewRecord,
};
use crate::api::{
    Format, MapAccess, MemoryHeap, QueryPoolHandle, QueryType, ResourceDesc, ResourceHandle,
    ResourceKind, ResourceUsage, ResourceViewDesc, ResourceViewHandle, ResourceViewType,
    SamplerDesc, SamplerHandle, SubresourceBox, SubresourceData, SubresourceMapping,
    TextureDesc, TextureDimension, ViewRange,
};
use crate::error::{LayerError, LayerResult};
use crate::profile_scope;

/// Fail unless `len` bytes at `offset` fit in a buffer of `size` bytes.
pub(crate) fn check_buffer_range(offset: u64, len: usize, size: u64) -> LayerResult<()> {
    match offset.checked_add(len as u64) {
        Some(end) if end <= size => Ok(()),
        _ => Err(LayerError::InvalidParameter(format!(
            "write of {len} bytes at {offset} exceeds buffer of {size} bytes"
        ))),
    }
}

/// Round `value` up to a multiple of `alignment`.
pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

/// Extent of one mip level.
pub(crate) fn level_extent(texture: &TextureDesc, level: u32) -> vk::Extent3D {
    let depth = match texture.dimension {
        TextureDimension::D3 => u32::from(texture.depth_or_layers),
        _ => 1,
    };
    vk::Extent3D {
        width: (texture.width >> level).max(1),
        height: (texture.height >> level).max(1),
        depth: (depth >> level).max(1),
    }
}

/// Copy `rows` rows of `row_bytes` for each of `slices` slices from a pitched
/// source into a tightly packed destination.
pub(crate) fn copy_rows(
    dst: &mut [u8],
    src: &[u8],
    row_bytes: usize,
    rows: usize,
    slices: usize,
    src_row_pitch: usize,
    src_slice_pitch: usize,
) -> LayerResult<()> {
    let src_row_pitch = if src_row_pitch == 0 { row_bytes } else { src_row_pitch };
    let src_slice_pitch = if src_slice_pitch == 0 {
        src_row_pitch * rows
    } else {
        src_slice_pitch
    };
    for slice in 0..slices {
        for row in 0..rows {
            let src_start = slice * src_slice_pitch + row * src_row_pitch;
            let dst_start = (slice * rows + row) * row_bytes;
            let source = src.get(src_start..src_start + row_bytes).ok_or_else(|| {
                LayerError::InvalidParameter(format!(
                    "subresource data too short for row {row} of slice {slice}"
                ))
            })?;
            dst[dst_start..dst_start + row_bytes].copy_from_slice(source);
        }
    }
    Ok(())
}

/// One subresource copied into a staging buffer.
struct StagedRegion {
    offset: u64,
    level: u32,
    layer: u32,
    extent: vk::Extent3D,
}

impl VulkanDevice {
    pub fn create_sampler(&self, desc: &SamplerDesc) -> LayerResult<SamplerHandle> {
        let mut info = convert_sampler_desc(desc);
        if info.anisotropy_enable == vk::TRUE && self.ctx.features.sampler_anisotropy != vk::TRUE {
            log::debug!("anisotropic filtering not enabled on the device, ignoring");
            info.anisotropy_enable = vk::FALSE;
        }
        let sampler = unsafe { self.ctx.device.create_sampler(&info, None) }.map_err(|e| {
            log::error!("vkCreateSampler failed: {e:?}");
            LayerError::from(e)
        })?;

        if let Err(e) = self
            .ctx
            .records
            .insert(sampler.as_raw(), SamplerRecord { desc: *desc })
        {
            unsafe { self.ctx.device.destroy_sampler(sampler, None) };
            return Err(e);
        }
        Ok(SamplerHandle::from_raw(sampler.as_raw()))
    }

    pub fn destroy_sampler(&self, sampler: SamplerHandle) {
        if sampler.is_null() {
            return;
        }
        self.ctx.records.remove::<SamplerRecord>(sampler.raw());
        unsafe {
            self.ctx
                .device
                .destroy_sampler(vk::Sampler::from_raw(sampler.raw()), None)
        };
    }

    pub fn create_resource(
        &self,
        desc: &ResourceDesc,
        initial_data: Option<&[SubresourceData<'_>]>,
        initial_usage: ResourceUsage,
    ) -> LayerResult<ResourceHandle> {
        profile_scope!("create_resource");

        let location = memory_location(desc.heap);
        if location.is_none() && (initial_data.is_some() || initial_usage != ResourceUsage::UNDEFINED)
        {
            return Err(LayerError::InvalidParameter(
                "initial data or usage needs a resource with a memory heap".into(),
            ));
        }

        let (native, allocation) = match &desc.kind {
            ResourceKind::Buffer(buffer) => {
                if buffer.size == 0 {
                    return Err(LayerError::InvalidParameter("zero-size buffer".into()));
                }
                let info = convert_buffer_desc(desc, buffer.size);
                self.create_native_buffer(info, location)?
            }
            ResourceKind::Texture(texture) => {
                if texture.width == 0 || texture.height == 0 || texture.format == Format::Unknown {
                    return Err(LayerError::InvalidParameter(format!(
                        "invalid texture {}x{} {:?}",
                        texture.width, texture.height, texture.format
                    )));
                }
                let info = convert_texture_desc(desc, texture);
                self.create_native_image(info, location)?
            }
        };

        let raw = match native {
            NativeResource::Image { image, .. } => image.as_raw(),
            NativeResource::Buffer { buffer, .. } => buffer.as_raw(),
        };
        let unbound = || ResourceRecord {
            native,
            desc: *desc,
            owner: ResourceOwner::Layer,
            allocation: Mutex::new(None),
        };
        // The allocation moves in after the insert so a full table cannot drop it unfreed.
        let record = match self.ctx.records.insert(raw, unbound()) {
            Ok(record) => {
                *record.allocation.lock() = allocation;
                record
            }
            Err(e) => {
                self.destroy_native_resource(&unbound());
                if let Some(allocation) = allocation {
                    self.ctx.allocator.free(allocation);
                }
                return Err(e);
            }
        };
        let handle = ResourceHandle::from_raw(raw);

        let initialized = match (initial_data, record.native) {
            (Some(data), NativeResource::Buffer { buffer, .. }) => {
                self.upload_initial_buffer(&record, buffer, data, initial_usage)
            }
            (Some(data), NativeResource::Image { image, info }) => {
                self.upload_initial_texture(desc, image, &info, data, initial_usage)
            }
            (None, NativeResource::Image { image, info })
                if initial_usage != ResourceUsage::UNDEFINED =>
            {
                self.with_immediate(|imm| {
                    imm.recorder().transition_image(
                        image,
                        info.full_range(),
                        ResourceUsage::UNDEFINED,
                        initial_usage,
                    );
                    imm.flush(None)
                })
            }
            (None, _) => Ok(()),
        };

        if let Err(e) = initialized {
            log::error!("failed to initialize resource {raw:#x}: {e}");
            drop(record);
            self.destroy_resource(handle);
            return Err(e);
        }

        log::trace!("created resource {raw:#x} ({:?})", desc.kind);
        Ok(handle)
    }

    fn create_native_buffer(
        &self,
        info: BufferInfo,
        location: Option<MemoryLocation>,
    ) -> LayerResult<(NativeResource, Option<gpu_allocator::vulkan::Allocation>)> {
        let device = &self.ctx.device;
        let buffer = unsafe { device.create_buffer(&info.to_vk(), None) }.map_err(|e| {
            log::error!("vkCreateBuffer failed: {e:?}");
            LayerError::from(e)
        })?;
        let allocation = match location {
            Some(location) => {
                match self
                    .ctx
                    .allocator
                    .allocate_buffer(device, buffer, location, "layer buffer")
                {
                    Ok(allocation) => Some(allocation),
                    Err(e) => {
                        unsafe { device.destroy_buffer(buffer, None) };
                        return Err(e);
                    }
                }
            }
            None => None,
        };
        Ok((NativeResource::Buffer { buffer, info }, allocation))
    }

    fn create_native_image(
        &self,
        info: ImageInfo,
        location: Option<MemoryLocation>,
    ) -> LayerResult<(NativeResource, Option<gpu_allocator::vulkan::Allocation>)> {
        let device = &self.ctx.device;
        let image = unsafe { device.create_image(&info.to_vk(), None) }.map_err(|e| {
            log::error!("vkCreateImage failed: {e:?}");
            LayerError::from(e)
        })?;
        let allocation = match location {
            Some(location) => {
                let linear = info.tiling == vk::ImageTiling::LINEAR;
                match self
                    .ctx
                    .allocator
                    .allocate_image(device, image, location, linear, "layer texture")
                {
                    Ok(allocation) => Some(allocation),
                    Err(e) => {
                        unsafe { device.destroy_image(image, None) };
                        return Err(e);
                    }
                }
            }
            None => None,
        };
        Ok((NativeResource::Image { image, info }, allocation))
    }

    fn upload_initial_buffer(
        &self,
        record: &ResourceRecord,
        buffer: vk::Buffer,
        data: &[SubresourceData<'_>],
        initial_usage: ResourceUsage,
    ) -> LayerResult<()> {
        let Some(first) = data.first() else {
            return Ok(());
        };
        if let Some((_, info)) = record.buffer() {
            check_buffer_range(0, first.data.len(), info.size)?;
        }
        if self.write_mapped_buffer(record, first.data, 0)? {
            return Ok(());
        }

        let mut staging = StagingBuffer::new(
            &self.ctx.device,
            &self.ctx.allocator,
            first.data.len() as u64,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
        )?;
        staging.mapped()?.copy_from_slice(first.data);

        self.with_immediate(|imm| {
            let region = vk::BufferCopy::default().size(first.data.len() as u64);
            let cmd = imm.recorder().mark_recorded();
            unsafe {
                self.ctx
                    .device
                    .cmd_copy_buffer(cmd, staging.buffer(), buffer, &[region])
            };
            if initial_usage != ResourceUsage::UNDEFINED {
                imm.recorder()
                    .transition_buffer(buffer, ResourceUsage::COPY_DEST, initial_usage);
            }
            imm.flush_and_wait()
        })
    }

    fn upload_initial_texture(
        &self,
        desc: &ResourceDesc,
        image: vk::Image,
        info: &ImageInfo,
        data: &[SubresourceData<'_>],
        initial_usage: ResourceUsage,
    ) -> LayerResult<()> {
        profile_scope!("upload_initial_texture");
        let Some(texture) = desc.as_texture() else {
            return Ok(());
        };
        let count = (desc.subresource_count() as usize).min(data.len());
        let levels = u32::from(texture.levels).max(1);

        let mut staged = Vec::with_capacity(count);
        let mut size = 0u64;
        let alignment = u64::from(texture.format.block_size()) * 4;
        for subresource in 0..count as u32 {
            let (level, layer) = subresource_to_level_layer(subresource, levels);
            let extent = level_extent(texture, level);
            size = align_up(size, alignment);
            staged.push(StagedRegion {
                offset: size,
                level,
                layer,
                extent,
            });
            size += u64::from(texture.format.slice_pitch(extent.width, extent.height))
                * u64::from(extent.depth);
        }

        let mut staging = StagingBuffer::new(
            &self.ctx.device,
            &self.ctx.allocator,
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
        )?;
        {
            let mapped = staging.mapped()?;
            for (region, subresource) in staged.iter().zip(data) {
                let row_bytes = texture.format.row_pitch(region.extent.width) as usize;
                let rows = region.extent.height.div_ceil(texture.format.block_extent()) as usize;
                let slices = region.extent.depth as usize;
                let start = region.offset as usize;
                copy_rows(
                    &mut mapped[start..start + row_bytes * rows * slices],
                    subresource.data,
                    row_bytes,
                    rows,
                    slices,
                    subresource.row_pitch as usize,
                    subresource.slice_pitch as usize,
                )?;
            }
        }

        let aspect_mask = format_aspect_mask(info.format);
        let regions: Vec<_> = staged
            .iter()
            .map(|region| {
                vk::BufferImageCopy::default()
                    .buffer_offset(region.offset)
                    .image_subresource(vk::ImageSubresourceLayers {
                        aspect_mask,
                        mip_level: region.level,
                        base_array_layer: region.layer,
                        layer_count: 1,
                    })
                    .image_extent(region.extent)
            })
            .collect();

        let final_usage = if initial_usage == ResourceUsage::UNDEFINED {
            ResourceUsage::COPY_DEST
        } else {
            initial_usage
        };
        self.with_immediate(|imm| {
            let recorder = imm.recorder();
            recorder.transition_image(
                image,
                info.full_range(),
                ResourceUsage::UNDEFINED,
                ResourceUsage::COPY_DEST,
            );
            let cmd = recorder.mark_recorded();
            unsafe {
                self.ctx.device.cmd_copy_buffer_to_image(
                    cmd,
                    staging.buffer(),
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &regions,
                )
            };
            recorder.transition_image(image, info.full_range(), ResourceUsage::COPY_DEST, final_usage);
            imm.flush_and_wait()
        })
    }

    /// Write through the persistent mapping. Returns `false` if the buffer
    /// memory is not host visible.
    fn write_mapped_buffer(
        &self,
        record: &ResourceRecord,
        data: &[u8],
        offset: u64,
    ) -> LayerResult<bool> {
        let mut allocation = record.allocation.lock();
        let Some(mapped) = allocation.as_mut().and_then(|a| a.mapped_slice_mut()) else {
            return Ok(false);
        };
        let start = offset as usize;
        let end = start
            .checked_add(data.len())
            .filter(|end| *end <= mapped.len())
            .ok_or_else(|| {
                LayerError::InvalidParameter(format!(
                    "write of {} bytes at {offset} exceeds the buffer",
                    data.len()
                ))
            })?;
        mapped[start..end].copy_from_slice(data);
        Ok(true)
    }

    pub fn destroy_resource(&self, resource: ResourceHandle) {
        if resource.is_null() {
            return;
        }
        let Some(record) = self.ctx.records.remove::<ResourceRecord>(resource.raw()) else {
            log::warn!("destroying untracked resource {:#x}", resource.raw());
            return;
        };
        if record.owner != ResourceOwner::Layer {
            log::warn!(
                "resource {:#x} is owned by {:?}, only dropping its record",
                resource.raw(),
                record.owner
            );
            return;
        }
        self.destroy_native_resource(&record);
    }

    pub fn create_resource_view(
        &self,
        resource: ResourceHandle,
        usage_type: ResourceUsage,
        desc: &ResourceViewDesc,
    ) -> LayerResult<ResourceViewHandle> {
        let record = self
            .ctx
            .records
            .get::<ResourceRecord>(resource.raw())
            .ok_or(LayerError::HandleNotFound(resource.raw()))?;

        let (native, desc) = match record.native {
            NativeResource::Image { image, info } => {
                let mut desc = *desc;
                if desc.view_type == ResourceViewType::Unknown {
                    desc.view_type = default_view_type(&record.desc);
                }
                if desc.format == Format::Unknown {
                    desc.format = convert_format_from_vk(info.format);
                }
                let range = convert_view_range(&desc, info.format, usage_type);
                let view_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(convert_view_type(desc.view_type))
                    .format(convert_format(desc.format))
                    .subresource_range(range);
                let view = unsafe { self.ctx.device.create_image_view(&view_info, None) }
                    .map_err(|e| {
                        log::error!("vkCreateImageView failed: {e:?}");
                        LayerError::from(e)
                    })?;
                (NativeView::Image { view, image, range }, desc)
            }
            NativeResource::Buffer { buffer, .. } => {
                let ViewRange::Buffer { offset, size } = desc.range else {
                    return Err(LayerError::InvalidParameter(
                        "buffer view needs a buffer range".into(),
                    ));
                };
                let view_info = vk::BufferViewCreateInfo::default()
                    .buffer(buffer)
                    .format(convert_format(desc.format))
                    .offset(offset)
                    .range(if size == u64::MAX { vk::WHOLE_SIZE } else { size });
                let view = unsafe { self.ctx.device.create_buffer_view(&view_info, None) }
                    .map_err(|e| {
                        log::error!("vkCreateBufferView failed: {e:?}");
                        LayerError::from(e)
                    })?;
                (NativeView::Buffer { view, buffer }, *desc)
            }
        };

        let raw = match native {
            NativeView::Image { view, .. } => view.as_raw(),
            NativeView::Buffer { view, .. } => view.as_raw(),
        };
        let view_record = ViewRecord {
            native,
            resource,
            desc,
        };
        if let Err(e) = self.ctx.records.insert(raw, view_record) {
            self.destroy_native_view(&ViewRecord {
                native,
                resource,
                desc,
            });
            return Err(e);
        }
        Ok(ResourceViewHandle::from_raw(raw))
    }

    pub fn destroy_resource_view(&self, view: ResourceViewHandle) {
        if view.is_null() {
            return;
        }
        match self.ctx.records.remove::<ViewRecord>(view.raw()) {
            Some(record) => self.destroy_native_view(&record),
            None => log::warn!("destroying untracked view {:#x}", view.raw()),
        }
    }

    pub fn map_buffer_region(
        &self,
        resource: ResourceHandle,
        offset: u64,
        size: u64,
        access: MapAccess,
    ) -> LayerResult<NonNull<u8>> {
        let record = self
            .ctx
            .records
            .get::<ResourceRecord>(resource.raw())
            .ok_or(LayerError::HandleNotFound(resource.raw()))?;
        let (_, info) = record
            .buffer()
            .ok_or_else(|| LayerError::InvalidParameter("resource is not a buffer".into()))?;
        let end = if size == u64::MAX { info.size } else { offset.saturating_add(size) };
        if end > info.size || offset > end {
            return Err(LayerError::InvalidParameter(format!(
                "map range {offset}..{end} exceeds buffer of {} bytes",
                info.size
            )));
        }

        let allocation = record.allocation.lock();
        let ptr = allocation
            .as_ref()
            .and_then(|a| a.mapped_ptr())
            .ok_or_else(|| LayerError::Unsupported("buffer memory is not host visible".into()))?;
        log::trace!("mapping buffer {:#x} for {access:?}", resource.raw());
        // SAFETY: the offset lies inside the mapped allocation checked above.
        let ptr = unsafe { ptr.as_ptr().cast::<u8>().add(offset as usize) };
        NonNull::new(ptr).ok_or_else(|| LayerError::Internal("null mapping".into()))
    }

    pub fn unmap_buffer_region(&self, resource: ResourceHandle) {
        // Allocations stay persistently mapped in host-coherent memory.
        log::trace!("unmapping buffer {:#x}", resource.raw());
    }

    pub fn map_texture_region(
        &self,
        resource: ResourceHandle,
        subresource: u32,
        region: Option<&SubresourceBox>,
        access: MapAccess,
    ) -> LayerResult<SubresourceMapping> {
        let record = self
            .ctx
            .records
            .get::<ResourceRecord>(resource.raw())
            .ok_or(LayerError::HandleNotFound(resource.raw()))?;
        let (image, info) = record
            .image()
            .ok_or_else(|| LayerError::InvalidParameter("resource is not a texture".into()))?;
        if info.tiling != vk::ImageTiling::LINEAR {
            return Err(LayerError::Unsupported(
                "only linear textures in host visible heaps can be mapped".into(),
            ));
        }

        let (level, layer) = subresource_to_level_layer(subresource, info.mip_levels);
        let layout = unsafe {
            self.ctx.device.get_image_subresource_layout(
                image,
                vk::ImageSubresource {
                    aspect_mask: format_aspect_mask(info.format),
                    mip_level: level,
                    array_layer: layer,
                },
            )
        };

        let allocation = record.allocation.lock();
        let base = allocation
            .as_ref()
            .and_then(|a| a.mapped_ptr())
            .ok_or_else(|| LayerError::Unsupported("texture memory is not host visible".into()))?;

        let format = convert_format_from_vk(info.format);
        let mut offset = layout.offset;
        if let Some(region) = region {
            let block = format.block_extent();
            offset += u64::from(region.front) * layout.depth_pitch
                + u64::from(region.top / block) * layout.row_pitch
                + u64::from(region.left / block) * u64::from(format.block_size());
        }
        log::trace!("mapping texture {:#x}/{subresource} for {access:?}", resource.raw());

        Ok(SubresourceMapping {
            // SAFETY: the subresource layout lies inside the bound allocation.
            data: unsafe { base.as_ptr().cast::<u8>().add(offset as usize) },
            row_pitch: u32::try_from(layout.row_pitch).unwrap_or(u32::MAX),
            slice_pitch: u32::try_from(layout.depth_pitch).unwrap_or(u32::MAX),
        })
    }

    pub fn unmap_texture_region(&self, resource: ResourceHandle, subresource: u32) {
        log::trace!("unmapping texture {:#x}/{subresource}", resource.raw());
    }

    pub fn update_buffer_region(
        &self,
        data: &[u8],
        resource: ResourceHandle,
        offset: u64,
    ) -> LayerResult<()> {
        profile_scope!("update_buffer_region");
        if data.is_empty() {
            return Ok(());
        }
        let record = self
            .ctx
            .records
            .get::<ResourceRecord>(resource.raw())
            .ok_or(LayerError::HandleNotFound(resource.raw()))?;
        let (buffer, info) = record
            .buffer()
            .ok_or_else(|| LayerError::InvalidParameter("resource is not a buffer".into()))?;
        check_buffer_range(offset, data.len(), info.size)?;
        if self.write_mapped_buffer(&record, data, offset)? {
            return Ok(());
        }

        let mut staging = StagingBuffer::new(
            &self.ctx.device,
            &self.ctx.allocator,
            data.len() as u64,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
        )?;
        staging.mapped()?.copy_from_slice(data);

        self.with_immediate(|imm| {
            let region = vk::BufferCopy::default()
                .dst_offset(offset)
                .size(data.len() as u64);
            let cmd = imm.recorder().mark_recorded();
            unsafe {
                self.ctx
                    .device
                    .cmd_copy_buffer(cmd, staging.buffer(), buffer, &[region])
            };
            imm.flush_and_wait()
        })
    }

    /// Upload into one subresource. The texture is expected in shader
    /// resource usage and is left in it.
    pub fn update_texture_region(
        &self,
        data: &SubresourceData<'_>,
        resource: ResourceHandle,
        subresource: u32,
        region: Option<&SubresourceBox>,
    ) -> LayerResult<()> {
        profile_scope!("update_texture_region");
        let record = self
            .ctx
            .records
            .get::<ResourceRecord>(resource.raw())
            .ok_or(LayerError::HandleNotFound(resource.raw()))?;
        let (image, info) = record
            .image()
            .ok_or_else(|| LayerError::InvalidParameter("resource is not a texture".into()))?;
        let texture = record
            .desc
            .as_texture()
            .ok_or_else(|| LayerError::Internal("texture record without texture desc".into()))?;

        let (level, layer) = subresource_to_level_layer(subresource, info.mip_levels);
        let (offset, extent) = match region {
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
            None => (vk::Offset3D::default(), level_extent(texture, level)),
        };

        let format = texture.format;
        let row_bytes = format.row_pitch(extent.width) as usize;
        let rows = extent.height.div_ceil(format.block_extent()) as usize;
        let slices = extent.depth as usize;
        let mut staging = StagingBuffer::new(
            &self.ctx.device,
            &self.ctx.allocator,
            (row_bytes * rows * slices) as u64,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
        )?;
        copy_rows(
            staging.mapped()?,
            data.data,
            row_bytes,
            rows,
            slices,
            data.row_pitch as usize,
            data.slice_pitch as usize,
        )?;

        let aspect_mask = format_aspect_mask(info.format);
        let range = vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: level,
            level_count: 1,
            base_array_layer: layer,
            layer_count: 1,
        };
        let copy = vk::BufferImageCopy::default()
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask,
                mip_level: level,
                base_array_layer: layer,
                layer_count: 1,
            })
            .image_offset(offset)
            .image_extent(extent);

        self.with_immediate(|imm| {
            let recorder = imm.recorder();
            recorder.transition_image(
                image,
                range,
                ResourceUsage::SHADER_RESOURCE,
                ResourceUsage::COPY_DEST,
            );
            let cmd = recorder.mark_recorded();
            unsafe {
                self.ctx.device.cmd_copy_buffer_to_image(
                    cmd,
                    staging.buffer(),
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[copy],
                )
            };
            recorder.transition_image(
                image,
                range,
                ResourceUsage::COPY_DEST,
                ResourceUsage::SHADER_RESOURCE,
            );
            imm.flush_and_wait()
        })
    }

    pub fn create_query_pool(&self, ty: QueryType, count: u32) -> LayerResult<QueryPoolHandle> {
        if count == 0 {
            return Err(LayerError::InvalidParameter("empty query pool".into()));
        }
        let mut info = vk::QueryPoolCreateInfo::default()
            .query_type(convert_query_type(ty))
            .query_count(count);
        if ty == QueryType::PipelineStatistics {
            info = info.pipeline_statistics(pipeline_statistics_flags());
        }
        let pool = unsafe { self.ctx.device.create_query_pool(&info, None) }.map_err(|e| {
            log::error!("vkCreateQueryPool failed: {e:?}");
            LayerError::from(e)
        })?;

        if let Err(e) = self
            .ctx
            .records
            .insert(pool.as_raw(), QueryPoolRecord { ty, count })
        {
            unsafe { self.ctx.device.destroy_query_pool(pool, None) };
            return Err(e);
        }

        // Queries must be reset before first use.
        let reset = self.with_immediate(|imm| {
            let cmd = imm.recorder().mark_recorded();
            unsafe { self.ctx.device.cmd_reset_query_pool(cmd, pool, 0, count) };
            imm.flush(None)
        });
        if let Err(e) = reset {
            log::warn!("could not reset query pool {:#x}: {e}", pool.as_raw());
        }
        Ok(QueryPoolHandle::from_raw(pool.as_raw()))
    }

    pub fn destroy_query_pool(&self, pool: QueryPoolHandle) {
        if pool.is_null() {
            return;
        }
        self.ctx.records.remove::<QueryPoolRecord>(pool.raw());
        unsafe {
            self.ctx
                .device
                .destroy_query_pool(vk::QueryPool::from_raw(pool.raw()), None)
        };
    }

    /// Track an image the application or a swap-chain created.
    pub fn register_image(
        &self,
        image: vk::Image,
        create_info: &vk::ImageCreateInfo<'_>,
        owner: ResourceOwner,
    ) -> LayerResult<()> {
        let info = ImageInfo::from_vk(create_info);
        let record = ResourceRecord {
            native: NativeResource::Image { image, info },
            desc: convert_image_info(&info, MemoryHeap::Unknown),
            owner,
            allocation: Mutex::new(None),
        };
        self.ctx.records.insert(image.as_raw(), record).map(drop)
    }

    /// Track a buffer the application created.
    pub fn register_buffer(
        &self,
        buffer: vk::Buffer,
        create_info: &vk::BufferCreateInfo<'_>,
    ) -> LayerResult<()> {
        let info = BufferInfo::from_vk(create_info);
        let record = ResourceRecord {
            native: NativeResource::Buffer { buffer, info },
            desc: convert_buffer_info(&info, MemoryHeap::Unknown),
            owner: ResourceOwner::Application,
            allocation: Mutex::new(None),
        };
        self.ctx.records.insert(buffer.as_raw(), record).map(drop)
    }

    /// Track an image view the application created.
    pub fn register_image_view(
        &self,
        view: vk::ImageView,
        create_info: &vk::ImageViewCreateInfo<'_>,
    ) -> LayerResult<()> {
        let samples = self
            .ctx
            .records
            .get::<ResourceRecord>(create_info.image.as_raw())
            .and_then(|record| record.image().map(|(_, info)| info.samples.as_raw()))
            .unwrap_or(1);
        let record = ViewRecord {
            native: NativeView::Image {
                view,
                image: create_info.image,
                range: create_info.subresource_range,
            },
            resource: ResourceHandle::from_raw(create_info.image.as_raw()),
            desc: convert_image_view_info(
                create_info.view_type,
                create_info.format,
                &create_info.subresource_range,
                samples,
            ),
        };
        self.ctx.records.insert(view.as_raw(), record).map(drop)
    }

    /// Track a buffer view the application created.
    pub fn register_buffer_view(
        &self,
        view: vk::BufferView,
        create_info: &vk::BufferViewCreateInfo<'_>,
    ) -> LayerResult<()> {
        let size = if create_info.range == vk::WHOLE_SIZE {
            u64::MAX
        } else {
            create_info.range
        };
        let record = ViewRecord {
            native: NativeView::Buffer {
                view,
                buffer: create_info.buffer,
            },
            resource: ResourceHandle::from_raw(create_info.buffer.as_raw()),
            desc: ResourceViewDesc::buffer(
                convert_format_from_vk(create_info.format),
                create_info.offset,
                size,
            ),
        };
        self.ctx.records.insert(view.as_raw(), record).map(drop)
    }

    /// Track a sampler the application created.
    pub fn register_sampler(
        &self,
        sampler: vk::Sampler,
        create_info: &vk::SamplerCreateInfo<'_>,
    ) -> LayerResult<()> {
        let record = SamplerRecord {
            desc: convert_sampler_info(create_info),
        };
        self.ctx.records.insert(sampler.as_raw(), record).map(drop)
    }
}

/// View type covering a whole texture.
fn default_view_type(desc: &ResourceDesc) -> ResourceViewType {
    let Some(texture) = desc.as_texture() else {
        return ResourceViewType::Buffer;
    };
    let layered = texture.depth_or_layers > 1;
    let multisampled = texture.samples > 1;
    match texture.dimension {
        TextureDimension::D1 if layered => ResourceViewType::Texture1DArray,
        TextureDimension::D1 => ResourceViewType::Texture1D,
        TextureDimension::D2 if multisampled && layered => {
            ResourceViewType::Texture2DMultisampleArray
        }
        TextureDimension::D2 if multisampled => ResourceViewType::Texture2DMultisample,
        TextureDimension::D2 if layered => ResourceViewType::Texture2DArray,
        TextureDimension::D2 => ResourceViewType::Texture2D,
        TextureDimension::D3 => ResourceViewType::Texture3D,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(32, 16), 32);
        assert_eq!(align_up(7, 0), 7);
    }

    #[test]
    fn test_buffer_range_check() {
        assert!(check_buffer_range(0, 64, 64).is_ok());
        assert!(check_buffer_range(32, 32, 64).is_ok());
        assert!(check_buffer_range(0, 0, 0).is_ok());
        assert!(check_buffer_range(0, 65, 64).is_err());
        assert!(check_buffer_range(48, 32, 64).is_err());
        assert!(check_buffer_range(u64::MAX, 1, u64::MAX).is_err());
    }

    #[test]
    fn test_level_extent_clamps_to_one() {
        let desc = ResourceDesc::texture_2d(
            256,
            64,
            1,
            9,
            Format::R8G8B8A8Unorm,
            MemoryHeap::GpuOnly,
            ResourceUsage::SHADER_RESOURCE,
        );
        let texture = desc.as_texture().unwrap();
        let extent = level_extent(texture, 7);
        assert_eq!((extent.width, extent.height, extent.depth), (2, 1, 1));
    }

    #[test]
    fn test_copy_rows_strips_padding() {
        let src = [1u8, 2, 0, 0, 3, 4, 0, 0];
        let mut dst = [0u8; 4];
        copy_rows(&mut dst, &src, 2, 2, 1, 4, 0).unwrap();
        assert_eq!(dst, [1, 2, 3, 4]);
    }

    #[test]
    fn test_copy_rows_rejects_short_source() {
        let src = [1u8, 2, 3];
        let mut dst = [0u8; 4];
        assert!(copy_rows(&mut dst, &src, 2, 2, 1, 0, 0).is_err());
    }

    #[test]
    fn test_default_view_types() {
        let array = ResourceDesc::texture_2d(
            8,
            8,
            6,
            1,
            Format::R8G8B8A8Unorm,
            MemoryHeap::GpuOnly,
            ResourceUsage::SHADER_RESOURCE,
        );
        assert_eq!(default_view_type(&array), ResourceViewType::Texture2DArray);
        assert_eq!(
            default_view_type(&array.with_samples(4)),
            ResourceViewType::Texture2DMultisampleArray
        );
        let buffer = ResourceDesc::buffer(64, MemoryHeap::GpuOnly, ResourceUsage::VERTEX_BUFFER);
        assert_eq!(default_view_type(&buffer), ResourceViewType::Buffer);
    }
}
