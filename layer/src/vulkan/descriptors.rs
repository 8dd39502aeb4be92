//! Descriptor set layouts, pipeline layouts and descriptor sets.
//!
//! Persistent sets come from a growable list of pools that allow freeing
//! individual sets. Transient sets, used for push descriptors when
//! `VK_KHR_push_descriptor` is unavailable, come from a ring of pools that is
//! reset one pool per frame.

use ash::vk;
use ash::vk::Handle;
use parking_lot::Mutex;

use super::conversion::{
    convert_descriptor_type, convert_shader_stages, descriptor_image_layout,
};
use super::device::{DeviceContext, VulkanDevice};
use super::records::{DescriptorSetLayoutRecord, DescriptorSetRecord, PipelineLayoutRecord};
use crate::api::{
    DescriptorRange, DescriptorSetCopy, DescriptorSetHandle, DescriptorSetLayoutHandle,
    DescriptorSetUpdate, DescriptorType, Descriptors, PipelineLayoutHandle, PipelineLayoutParam,
};
use crate::error::{LayerError, LayerResult};

/// Number of transient pools in the per-frame ring.
pub const TRANSIENT_POOL_COUNT: usize = 4;

const PERSISTENT_MAX_SETS: u32 = 1024;
const TRANSIENT_MAX_SETS: u32 = 512;

const POOL_SIZES: [(vk::DescriptorType, u32); 8] = [
    (vk::DescriptorType::SAMPLER, 512),
    (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1024),
    (vk::DescriptorType::SAMPLED_IMAGE, 1024),
    (vk::DescriptorType::STORAGE_IMAGE, 256),
    (vk::DescriptorType::UNIFORM_TEXEL_BUFFER, 128),
    (vk::DescriptorType::STORAGE_TEXEL_BUFFER, 128),
    (vk::DescriptorType::UNIFORM_BUFFER, 512),
    (vk::DescriptorType::STORAGE_BUFFER, 256),
];

fn create_pool(
    device: &ash::Device,
    max_sets: u32,
    flags: vk::DescriptorPoolCreateFlags,
) -> LayerResult<vk::DescriptorPool> {
    let sizes = POOL_SIZES.map(|(ty, descriptor_count)| vk::DescriptorPoolSize {
        ty,
        descriptor_count,
    });
    let info = vk::DescriptorPoolCreateInfo::default()
        .flags(flags)
        .max_sets(max_sets)
        .pool_sizes(&sizes);
    Ok(unsafe { device.create_descriptor_pool(&info, None) }?)
}

/// Transient pools and the one in use, advanced once per frame.
///
/// Allocating from a pool and resetting it must not overlap, so the ring
/// lives behind the owner's lock.
#[derive(Debug)]
pub struct TransientRing {
    pools: [vk::DescriptorPool; TRANSIENT_POOL_COUNT],
    index: usize,
}

impl TransientRing {
    pub fn new(pools: [vk::DescriptorPool; TRANSIENT_POOL_COUNT]) -> Self {
        Self { pools, index: 0 }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> vk::DescriptorPool {
        self.pools[self.index]
    }

    /// Move to the next pool and return it.
    pub fn advance(&mut self) -> vk::DescriptorPool {
        self.index = (self.index + 1) % TRANSIENT_POOL_COUNT;
        self.pools[self.index]
    }
}

/// Descriptor pools owned by one device.
pub struct DescriptorPools {
    persistent: Mutex<Vec<vk::DescriptorPool>>,
    transient: Mutex<TransientRing>,
}

impl DescriptorPools {
    pub fn new(device: &ash::Device) -> LayerResult<Self> {
        let mut transient = [vk::DescriptorPool::null(); TRANSIENT_POOL_COUNT];
        for index in 0..TRANSIENT_POOL_COUNT {
            match create_pool(device, TRANSIENT_MAX_SETS, vk::DescriptorPoolCreateFlags::empty()) {
                Ok(pool) => transient[index] = pool,
                Err(e) => {
                    for pool in &transient[..index] {
                        unsafe { device.destroy_descriptor_pool(*pool, None) };
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self {
            persistent: Mutex::new(Vec::new()),
            transient: Mutex::new(TransientRing::new(transient)),
        })
    }

    /// Allocate sets that live until freed. Returns the sets and their pool.
    pub fn allocate_persistent(
        &self,
        device: &ash::Device,
        layouts: &[vk::DescriptorSetLayout],
    ) -> LayerResult<(Vec<vk::DescriptorSet>, vk::DescriptorPool)> {
        let mut pools = self.persistent.lock();

        if let Some(&pool) = pools.last() {
            let info = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(pool)
                .set_layouts(layouts);
            match unsafe { device.allocate_descriptor_sets(&info) } {
                Ok(sets) => return Ok((sets, pool)),
                Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
                    log::debug!("descriptor pool exhausted, creating another");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let pool = create_pool(
            device,
            PERSISTENT_MAX_SETS,
            vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET,
        )?;
        pools.push(pool);

        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(layouts);
        let sets = unsafe { device.allocate_descriptor_sets(&info) }?;
        Ok((sets, pool))
    }

    /// Allocate a set valid until its pool comes around in the ring again.
    pub fn allocate_transient(
        &self,
        device: &ash::Device,
        layout: vk::DescriptorSetLayout,
    ) -> LayerResult<vk::DescriptorSet> {
        let layouts = [layout];
        let ring = self.transient.lock();
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(ring.current())
            .set_layouts(&layouts);
        let sets = unsafe { device.allocate_descriptor_sets(&info) }.inspect_err(|e| {
            log::warn!("transient descriptor pool exhausted: {e:?}");
        })?;
        sets.into_iter()
            .next()
            .ok_or_else(|| LayerError::Internal("no descriptor set returned".into()))
    }

    /// Advance to the next transient pool and reset it.
    ///
    /// Sets allocated from that pool, four frames ago, become invalid.
    pub fn advance_frame(&self, device: &ash::Device) {
        let mut ring = self.transient.lock();
        let pool = ring.advance();
        if let Err(e) =
            unsafe { device.reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty()) }
        {
            log::error!("failed to reset transient descriptor pool: {e:?}");
        }
    }

    pub fn destroy(&self, device: &ash::Device) {
        for pool in self.persistent.lock().drain(..) {
            unsafe { device.destroy_descriptor_pool(pool, None) };
        }
        let mut ring = self.transient.lock();
        for pool in &mut ring.pools {
            unsafe { device.destroy_descriptor_pool(*pool, None) };
            *pool = vk::DescriptorPool::null();
        }
    }
}

/// Native descriptor payload of one update, owned until the write is issued.
pub enum ResolvedDescriptors {
    Images(Vec<vk::DescriptorImageInfo>),
    Buffers(Vec<vk::DescriptorBufferInfo>),
    TexelBuffers(Vec<vk::BufferView>),
}

impl ResolvedDescriptors {
    pub fn resolve(ty: DescriptorType, descriptors: &Descriptors<'_>) -> Self {
        let layout = descriptor_image_layout(ty);
        match descriptors {
            Descriptors::Samplers(samplers) => Self::Images(
                samplers
                    .iter()
                    .map(|sampler| {
                        vk::DescriptorImageInfo::default()
                            .sampler(vk::Sampler::from_raw(sampler.raw()))
                    })
                    .collect(),
            ),
            Descriptors::SamplersWithViews(pairs) => Self::Images(
                pairs
                    .iter()
                    .map(|(sampler, view)| {
                        vk::DescriptorImageInfo::default()
                            .sampler(vk::Sampler::from_raw(sampler.raw()))
                            .image_view(vk::ImageView::from_raw(view.raw()))
                            .image_layout(layout)
                    })
                    .collect(),
            ),
            Descriptors::Views(views)
                if matches!(
                    ty,
                    DescriptorType::BufferShaderResourceView
                        | DescriptorType::BufferUnorderedAccessView
                ) =>
            {
                Self::TexelBuffers(
                    views
                        .iter()
                        .map(|view| vk::BufferView::from_raw(view.raw()))
                        .collect(),
                )
            }
            Descriptors::Views(views) => Self::Images(
                views
                    .iter()
                    .map(|view| {
                        vk::DescriptorImageInfo::default()
                            .image_view(vk::ImageView::from_raw(view.raw()))
                            .image_layout(layout)
                    })
                    .collect(),
            ),
            Descriptors::Buffers(ranges) => Self::Buffers(
                ranges
                    .iter()
                    .map(|range| {
                        vk::DescriptorBufferInfo::default()
                            .buffer(vk::Buffer::from_raw(range.buffer.raw()))
                            .offset(range.offset)
                            .range(if range.size == u64::MAX {
                                vk::WHOLE_SIZE
                            } else {
                                range.size
                            })
                    })
                    .collect(),
            ),
        }
    }

    /// Build a write into `set` that borrows this payload.
    pub fn write(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        array_offset: u32,
        ty: DescriptorType,
    ) -> vk::WriteDescriptorSet<'_> {
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(binding)
            .dst_array_element(array_offset)
            .descriptor_type(convert_descriptor_type(ty));
        match self {
            Self::Images(infos) => write.image_info(infos),
            Self::Buffers(infos) => write.buffer_info(infos),
            Self::TexelBuffers(views) => write.texel_buffer_view(views),
        }
    }
}

impl DeviceContext {
    pub(crate) fn create_native_set_layout(
        &self,
        ranges: &[DescriptorRange],
        push_descriptors: bool,
    ) -> LayerResult<vk::DescriptorSetLayout> {
        let bindings: Vec<_> = ranges
            .iter()
            .map(|range| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(range.binding)
                    .descriptor_type(convert_descriptor_type(range.ty))
                    .descriptor_count(range.array_size)
                    .stage_flags(convert_shader_stages(range.visibility))
            })
            .collect();
        let flags = if push_descriptors {
            vk::DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR_KHR
        } else {
            vk::DescriptorSetLayoutCreateFlags::empty()
        };
        let info = vk::DescriptorSetLayoutCreateInfo::default()
            .flags(flags)
            .bindings(&bindings);
        unsafe { self.device.create_descriptor_set_layout(&info, None) }.map_err(|e| {
            log::error!("vkCreateDescriptorSetLayout failed: {e:?}");
            e.into()
        })
    }
}

impl VulkanDevice {
    pub fn create_descriptor_set_layout(
        &self,
        ranges: &[DescriptorRange],
        push_descriptors: bool,
    ) -> LayerResult<DescriptorSetLayoutHandle> {
        let push_descriptors = push_descriptors && self.ctx.push_descriptors_enabled();
        let layout = self.ctx.create_native_set_layout(ranges, push_descriptors)?;

        let record = DescriptorSetLayoutRecord {
            ranges: ranges.to_vec(),
            push_descriptors,
        };
        if let Err(e) = self.ctx.records.insert(layout.as_raw(), record) {
            unsafe { self.ctx.device.destroy_descriptor_set_layout(layout, None) };
            return Err(e);
        }
        Ok(DescriptorSetLayoutHandle::from_raw(layout.as_raw()))
    }

    pub fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle) {
        if layout.is_null() {
            return;
        }
        self.ctx.records.remove::<DescriptorSetLayoutRecord>(layout.raw());
        unsafe {
            self.ctx
                .device
                .destroy_descriptor_set_layout(vk::DescriptorSetLayout::from_raw(layout.raw()), None)
        };
    }

    pub fn create_pipeline_layout(
        &self,
        params: &[PipelineLayoutParam],
    ) -> LayerResult<PipelineLayoutHandle> {
        let mut push_constant_ranges = Vec::new();
        let mut set_layouts = Vec::with_capacity(params.len());
        let mut set_indices = Vec::with_capacity(params.len());
        let mut owned_set_layouts = Vec::new();
        let mut native_sets = Vec::new();

        let destroy_owned = |owned: &[vk::DescriptorSetLayout]| {
            for layout in owned {
                unsafe { self.ctx.device.destroy_descriptor_set_layout(*layout, None) };
            }
        };

        for param in params {
            match param {
                PipelineLayoutParam::PushConstants(range) => {
                    push_constant_ranges.push(
                        vk::PushConstantRange::default()
                            .stage_flags(convert_shader_stages(range.visibility))
                            .offset(range.offset * 4)
                            .size(range.count * 4),
                    );
                    set_layouts.push(vk::DescriptorSetLayout::null());
                    set_indices.push(None);
                }
                PipelineLayoutParam::PushDescriptors(ranges) => {
                    let push = self.ctx.push_descriptors_enabled();
                    let layout = match self.ctx.create_native_set_layout(ranges, push) {
                        Ok(layout) => layout,
                        Err(e) => {
                            destroy_owned(&owned_set_layouts);
                            return Err(e);
                        }
                    };
                    owned_set_layouts.push(layout);
                    set_indices.push(Some(native_sets.len() as u32));
                    set_layouts.push(layout);
                    native_sets.push(layout);
                }
                PipelineLayoutParam::DescriptorSet(handle) => {
                    let layout = vk::DescriptorSetLayout::from_raw(handle.raw());
                    set_indices.push(Some(native_sets.len() as u32));
                    set_layouts.push(layout);
                    native_sets.push(layout);
                }
            }
        }

        let info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&native_sets)
            .push_constant_ranges(&push_constant_ranges);
        let layout = match unsafe { self.ctx.device.create_pipeline_layout(&info, None) } {
            Ok(layout) => layout,
            Err(e) => {
                log::error!("vkCreatePipelineLayout failed: {e:?}");
                destroy_owned(&owned_set_layouts);
                return Err(e.into());
            }
        };

        let owned = owned_set_layouts.clone();
        let record = PipelineLayoutRecord {
            params: params.to_vec(),
            set_indices,
            set_layouts,
            owned_set_layouts,
        };
        if let Err(e) = self.ctx.records.insert(layout.as_raw(), record) {
            unsafe { self.ctx.device.destroy_pipeline_layout(layout, None) };
            destroy_owned(&owned);
            return Err(e);
        }
        Ok(PipelineLayoutHandle::from_raw(layout.as_raw()))
    }

    pub fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle) {
        if layout.is_null() {
            return;
        }
        let record = self.ctx.records.remove::<PipelineLayoutRecord>(layout.raw());
        unsafe {
            self.ctx
                .device
                .destroy_pipeline_layout(vk::PipelineLayout::from_raw(layout.raw()), None)
        };
        if let Some(record) = record {
            for set_layout in &record.owned_set_layouts {
                unsafe { self.ctx.device.destroy_descriptor_set_layout(*set_layout, None) };
            }
        }
    }

    pub fn get_pipeline_layout_desc(
        &self,
        layout: PipelineLayoutHandle,
    ) -> Option<Vec<PipelineLayoutParam>> {
        let record = self.ctx.records.get::<PipelineLayoutRecord>(layout.raw());
        if record.is_none() {
            log::debug!("no pipeline layout record for {:#x}", layout.raw());
        }
        record.map(|record| record.params.clone())
    }

    pub fn allocate_descriptor_sets(
        &self,
        layouts: &[DescriptorSetLayoutHandle],
    ) -> LayerResult<Vec<DescriptorSetHandle>> {
        if layouts.is_empty() {
            return Ok(Vec::new());
        }
        let native: Vec<_> = layouts
            .iter()
            .map(|layout| vk::DescriptorSetLayout::from_raw(layout.raw()))
            .collect();
        let (sets, pool) = self
            .ctx
            .descriptor_pools
            .allocate_persistent(&self.ctx.device, &native)?;

        for (index, (&set, &layout)) in sets.iter().zip(&native).enumerate() {
            if let Err(e) = self
                .ctx
                .records
                .insert(set.as_raw(), DescriptorSetRecord { layout, pool })
            {
                for &inserted in &sets[..index] {
                    self.ctx.records.remove::<DescriptorSetRecord>(inserted.as_raw());
                }
                if let Err(free_err) = unsafe { self.ctx.device.free_descriptor_sets(pool, &sets) } {
                    log::error!("failed to free descriptor sets: {free_err:?}");
                }
                return Err(e);
            }
        }

        Ok(sets
            .into_iter()
            .map(|set| DescriptorSetHandle::from_raw(set.as_raw()))
            .collect())
    }

    pub fn free_descriptor_sets(&self, sets: &[DescriptorSetHandle]) {
        for set in sets.iter().filter(|set| !set.is_null()) {
            let Some(record) = self.ctx.records.remove::<DescriptorSetRecord>(set.raw()) else {
                log::warn!("freeing untracked descriptor set {:#x}", set.raw());
                continue;
            };
            let native = [vk::DescriptorSet::from_raw(set.raw())];
            if let Err(e) = unsafe { self.ctx.device.free_descriptor_sets(record.pool, &native) } {
                log::error!("vkFreeDescriptorSets failed: {e:?}");
            }
        }
    }

    pub fn update_descriptor_sets(&self, updates: &[DescriptorSetUpdate<'_>]) {
        let resolved: Vec<_> = updates
            .iter()
            .map(|update| ResolvedDescriptors::resolve(update.ty, &update.descriptors))
            .collect();
        let writes: Vec<_> = updates
            .iter()
            .zip(&resolved)
            .map(|(update, payload)| {
                payload.write(
                    vk::DescriptorSet::from_raw(update.set.raw()),
                    update.binding,
                    update.array_offset,
                    update.ty,
                )
            })
            .collect();
        unsafe { self.ctx.device.update_descriptor_sets(&writes, &[]) };
    }

    pub fn copy_descriptor_sets(&self, copies: &[DescriptorSetCopy]) {
        let copies: Vec<_> = copies
            .iter()
            .map(|copy| {
                vk::CopyDescriptorSet::default()
                    .src_set(vk::DescriptorSet::from_raw(copy.source_set.raw()))
                    .src_binding(copy.source_binding)
                    .src_array_element(copy.source_array_offset)
                    .dst_set(vk::DescriptorSet::from_raw(copy.dest_set.raw()))
                    .dst_binding(copy.dest_binding)
                    .dst_array_element(copy.dest_array_offset)
                    .descriptor_count(copy.count)
            })
            .collect();
        unsafe { self.ctx.device.update_descriptor_sets(&[], &copies) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{BufferRange, ResourceHandle, ResourceViewHandle, SamplerHandle};

    fn test_ring() -> TransientRing {
        TransientRing::new(std::array::from_fn(|i| {
            vk::DescriptorPool::from_raw(0x100 + i as u64)
        }))
    }

    #[test]
    fn test_transient_ring_wraps() {
        let mut ring = test_ring();
        assert_eq!(ring.index(), 0);
        assert_eq!(ring.current().as_raw(), 0x100);
        let visited: Vec<_> = (0..TRANSIENT_POOL_COUNT + 1)
            .map(|_| ring.advance().as_raw())
            .collect();
        assert_eq!(visited, vec![0x101, 0x102, 0x103, 0x100, 0x101]);
        assert_eq!(ring.index(), 1);
    }

    #[test]
    fn test_transient_ring_allocation_sees_stable_pool() {
        let ring = Mutex::new(test_ring());
        std::thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..1000 {
                    ring.lock().advance();
                }
            });
            for _ in 0..1000 {
                let ring = ring.lock();
                let pool = ring.current();
                std::hint::spin_loop();
                assert_eq!(ring.current(), pool);
                assert_eq!(pool.as_raw(), 0x100 + ring.index() as u64);
            }
        });
        assert_eq!(ring.lock().index(), 1000 % TRANSIENT_POOL_COUNT);
    }

    #[test]
    fn test_resolve_texel_buffer_views() {
        let views = [ResourceViewHandle::from_raw(0x30)];
        let resolved = ResolvedDescriptors::resolve(
            DescriptorType::BufferShaderResourceView,
            &Descriptors::Views(&views),
        );
        assert!(matches!(resolved, ResolvedDescriptors::TexelBuffers(ref v) if v.len() == 1));
    }

    #[test]
    fn test_resolve_image_views_use_read_only_layout() {
        let views = [ResourceViewHandle::from_raw(0x30), ResourceViewHandle::from_raw(0x40)];
        let resolved = ResolvedDescriptors::resolve(
            DescriptorType::ShaderResourceView,
            &Descriptors::Views(&views),
        );
        let ResolvedDescriptors::Images(infos) = resolved else {
            panic!("expected image infos");
        };
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].image_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

        let pairs = [(SamplerHandle::from_raw(1), ResourceViewHandle::from_raw(2))];
        let resolved = ResolvedDescriptors::resolve(
            DescriptorType::UnorderedAccessView,
            &Descriptors::SamplersWithViews(&pairs),
        );
        let ResolvedDescriptors::Images(infos) = resolved else {
            panic!("expected image infos");
        };
        assert_eq!(infos[0].image_layout, vk::ImageLayout::GENERAL);
    }

    #[test]
    fn test_resolve_whole_buffer_range() {
        let ranges = [BufferRange {
            buffer: ResourceHandle::from_raw(0x50),
            offset: 16,
            size: u64::MAX,
        }];
        let resolved =
            ResolvedDescriptors::resolve(DescriptorType::ConstantBuffer, &Descriptors::Buffers(&ranges));
        let ResolvedDescriptors::Buffers(infos) = resolved else {
            panic!("expected buffer infos");
        };
        assert_eq!(infos[0].range, vk::WHOLE_SIZE);
        assert_eq!(infos[0].offset, 16);

        let resolved = ResolvedDescriptors::Buffers(infos);
        let write = resolved.write(
            vk::DescriptorSet::null(),
            2,
            0,
            DescriptorType::ConstantBuffer,
        );
        assert_eq!(write.descriptor_count, 1);
        assert_eq!(write.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
    }
}
