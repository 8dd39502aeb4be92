//! Metadata attached to native handles.
//!
//! Every tracked native object gets one [`ObjectRecord`], a tagged variant per
//! object kind. Records live in one handle table per kind, since Vulkan only
//! guarantees non-dispatchable handles to be unique within an object type.

use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use parking_lot::Mutex;

use super::conversion::{BufferInfo, ImageInfo};
use crate::api::{
    ConstantRange, DescriptorRange, PipelineLayoutParam, QueryType, RenderPassDesc, ResourceDesc,
    ResourceHandle, ResourceViewDesc, ResourceViewHandle, SamplerDesc,
};
use crate::error::LayerResult;
use crate::registry::HandleMap;

/// Who created a resource, and therefore who destroys it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceOwner {
    /// Created by the application; the layer only observes it.
    Application,
    /// Created by the layer through the device interface.
    Layer,
    /// A back buffer allocated by a native swap-chain.
    Swapchain,
}

/// Native object behind a resource.
#[derive(Debug, Clone, Copy)]
pub enum NativeResource {
    Image { image: vk::Image, info: ImageInfo },
    Buffer { buffer: vk::Buffer, info: BufferInfo },
}

#[derive(Debug)]
pub struct ResourceRecord {
    pub native: NativeResource,
    pub desc: ResourceDesc,
    pub owner: ResourceOwner,
    /// Backing memory for layer-created resources.
    pub allocation: Mutex<Option<Allocation>>,
}

impl ResourceRecord {
    pub fn image(&self) -> Option<(vk::Image, &ImageInfo)> {
        match &self.native {
            NativeResource::Image { image, info } => Some((*image, info)),
            NativeResource::Buffer { .. } => None,
        }
    }

    pub fn buffer(&self) -> Option<(vk::Buffer, &BufferInfo)> {
        match &self.native {
            NativeResource::Buffer { buffer, info } => Some((*buffer, info)),
            NativeResource::Image { .. } => None,
        }
    }
}

/// Native object behind a view.
#[derive(Debug, Clone, Copy)]
pub enum NativeView {
    Image {
        view: vk::ImageView,
        image: vk::Image,
        range: vk::ImageSubresourceRange,
    },
    Buffer {
        view: vk::BufferView,
        buffer: vk::Buffer,
    },
}

#[derive(Debug)]
pub struct ViewRecord {
    pub native: NativeView,
    pub resource: ResourceHandle,
    pub desc: ResourceViewDesc,
}

#[derive(Debug)]
pub struct SamplerRecord {
    pub desc: SamplerDesc,
}

#[derive(Debug)]
pub struct PipelineRecord {
    pub bind_point: vk::PipelineBindPoint,
    pub layout: vk::PipelineLayout,
}

#[derive(Debug)]
pub struct PipelineLayoutRecord {
    pub params: Vec<PipelineLayoutParam>,
    /// Descriptor set index of each parameter; `None` for push constants.
    pub set_indices: Vec<Option<u32>>,
    /// Set layout of each parameter; null for push constants.
    pub set_layouts: Vec<vk::DescriptorSetLayout>,
    /// Set layouts created for push descriptor parameters, destroyed with the layout.
    pub owned_set_layouts: Vec<vk::DescriptorSetLayout>,
}

impl PipelineLayoutRecord {
    pub fn set_index(&self, param_index: u32) -> Option<u32> {
        self.set_indices.get(param_index as usize).copied().flatten()
    }

    pub fn set_layout(&self, param_index: u32) -> Option<vk::DescriptorSetLayout> {
        self.set_layouts
            .get(param_index as usize)
            .copied()
            .filter(|layout| *layout != vk::DescriptorSetLayout::null())
    }

    pub fn push_constants(&self, param_index: u32) -> Option<ConstantRange> {
        match self.params.get(param_index as usize)? {
            PipelineLayoutParam::PushConstants(range) => Some(*range),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct DescriptorSetLayoutRecord {
    pub ranges: Vec<DescriptorRange>,
    pub push_descriptors: bool,
}

#[derive(Debug)]
pub struct DescriptorSetRecord {
    pub layout: vk::DescriptorSetLayout,
    pub pool: vk::DescriptorPool,
}

#[derive(Debug)]
pub struct RenderPassRecord {
    pub desc: RenderPassDesc,
}

#[derive(Debug)]
pub struct FramebufferRecord {
    pub render_pass: vk::RenderPass,
    pub attachments: Vec<ResourceViewHandle>,
    pub extent: vk::Extent2D,
}

#[derive(Debug)]
pub struct QueryPoolRecord {
    pub ty: QueryType,
    pub count: u32,
}

/// Lifecycle of a command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecorderState {
    #[default]
    Idle,
    Recording,
    Submitted,
}

/// An application command buffer.
#[derive(Debug)]
pub struct CommandBufferRecord {
    pub pool: vk::CommandPool,
    pub state: Mutex<RecorderState>,
}

impl CommandBufferRecord {
    pub fn new(pool: vk::CommandPool) -> Self {
        Self {
            pool,
            state: Mutex::new(RecorderState::Idle),
        }
    }

    pub fn state(&self) -> RecorderState {
        *self.state.lock()
    }

    /// Move to `next`, returning the previous state.
    pub fn transition(&self, next: RecorderState) -> RecorderState {
        std::mem::replace(&mut *self.state.lock(), next)
    }
}

macro_rules! define_records {
    ($($kind:ident($record:ident),)*) => {
        /// Metadata for one native object.
        #[derive(Debug)]
        pub enum ObjectRecord {
            $($kind($record),)*
        }

        /// Kind of native object a record describes.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ObjectKind {
            $($kind,)*
        }

        impl ObjectKind {
            pub const ALL: &'static [ObjectKind] = &[$(ObjectKind::$kind,)*];
            pub const COUNT: usize = Self::ALL.len();
        }

        impl ObjectRecord {
            pub fn kind(&self) -> ObjectKind {
                match self {
                    $(Self::$kind(_) => ObjectKind::$kind,)*
                }
            }
        }

        $(
            impl Record for $record {
                const KIND: ObjectKind = ObjectKind::$kind;

                fn from_record(record: &ObjectRecord) -> Option<&Self> {
                    match record {
                        ObjectRecord::$kind(inner) => Some(inner),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }

                fn into_record(self) -> ObjectRecord {
                    ObjectRecord::$kind(self)
                }
            }
        )*
    };
}

/// A payload type of one [`ObjectRecord`] variant.
pub trait Record: Sized {
    const KIND: ObjectKind;
    fn from_record(record: &ObjectRecord) -> Option<&Self>;
    fn into_record(self) -> ObjectRecord;
}

define_records! {
    Resource(ResourceRecord),
    ResourceView(ViewRecord),
    Sampler(SamplerRecord),
    Pipeline(PipelineRecord),
    PipelineLayout(PipelineLayoutRecord),
    DescriptorSetLayout(DescriptorSetLayoutRecord),
    DescriptorSet(DescriptorSetRecord),
    RenderPass(RenderPassRecord),
    Framebuffer(FramebufferRecord),
    QueryPool(QueryPoolRecord),
    CommandBuffer(CommandBufferRecord),
}

/// Shared reference to a record of a known kind.
pub struct Recorded<T> {
    record: Arc<ObjectRecord>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Record> Recorded<T> {
    fn new(record: Arc<ObjectRecord>) -> Option<Self> {
        T::from_record(&record)?;
        Some(Self {
            record,
            _marker: PhantomData,
        })
    }
}

impl<T: Record> Deref for Recorded<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match T::from_record(&self.record) {
            Some(inner) => inner,
            None => unreachable!("record kind checked on construction"),
        }
    }
}

impl<T> Clone for Recorded<T> {
    fn clone(&self) -> Self {
        Self {
            record: Arc::clone(&self.record),
            _marker: PhantomData,
        }
    }
}

impl<T: Record + std::fmt::Debug> std::fmt::Debug for Recorded<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        (**self).fmt(f)
    }
}

/// Per-device record tables, one per object kind.
pub struct ObjectRegistry {
    tables: Vec<HandleMap<ObjectRecord>>,
}

impl ObjectRegistry {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tables: ObjectKind::ALL
                .iter()
                .map(|_| HandleMap::with_capacity(capacity))
                .collect(),
        }
    }

    fn table(&self, kind: ObjectKind) -> &HandleMap<ObjectRecord> {
        &self.tables[kind as usize]
    }

    /// Attach `record` to the native handle `raw`.
    pub fn insert<T: Record>(&self, raw: u64, record: T) -> LayerResult<Recorded<T>> {
        let record = self.table(T::KIND).insert(raw, record.into_record())?;
        Ok(Recorded {
            record,
            _marker: PhantomData,
        })
    }

    pub fn get<T: Record>(&self, raw: u64) -> Option<Recorded<T>> {
        Recorded::new(self.table(T::KIND).get(raw)?)
    }

    pub fn contains<T: Record>(&self, raw: u64) -> bool {
        self.table(T::KIND).contains(raw)
    }

    /// Detach the record of `raw`. Call before the native destroy is forwarded.
    pub fn remove<T: Record>(&self, raw: u64) -> Option<Recorded<T>> {
        Recorded::new(self.table(T::KIND).remove(raw)?)
    }

    /// Detach every record of one kind.
    pub fn drain<T: Record>(&self) -> Vec<(u64, Recorded<T>)> {
        self.table(T::KIND)
            .drain()
            .into_iter()
            .filter_map(|(raw, record)| Some((raw, Recorded::new(record)?)))
            .collect()
    }

    /// Detach the records of one kind that `f` selects.
    pub fn remove_where<T: Record>(&self, mut f: impl FnMut(&T) -> bool) -> Vec<(u64, Recorded<T>)> {
        self.table(T::KIND)
            .remove_where(|_, record| T::from_record(record).is_some_and(&mut f))
            .into_iter()
            .filter_map(|(raw, record)| Some((raw, Recorded::new(record)?)))
            .collect()
    }

    /// Records of one kind that `f` selects.
    pub fn filter<T: Record>(&self, mut f: impl FnMut(&T) -> bool) -> Vec<(u64, Recorded<T>)> {
        self.table(T::KIND)
            .filter(|_, record| T::from_record(record).is_some_and(&mut f))
            .into_iter()
            .filter_map(|(raw, record)| Some((raw, Recorded::new(record)?)))
            .collect()
    }

    pub fn len(&self, kind: ObjectKind) -> usize {
        self.table(kind).len()
    }

    /// Total number of records over all kinds.
    pub fn total(&self) -> usize {
        self.tables.iter().map(HandleMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(HandleMap::is_empty)
    }

    pub fn clear(&self) {
        for table in &self.tables {
            table.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{CompareOp, QueryType};

    #[test]
    fn test_kinds_are_separate() {
        let registry = ObjectRegistry::with_capacity(64);
        registry
            .insert(0x10, SamplerRecord { desc: SamplerDesc::point() })
            .unwrap();
        registry
            .insert(0x10, QueryPoolRecord { ty: QueryType::Timestamp, count: 4 })
            .unwrap();

        assert_eq!(registry.get::<QueryPoolRecord>(0x10).unwrap().count, 4);
        assert!(registry.get::<SamplerRecord>(0x10).is_some());
        assert!(registry.get::<PipelineRecord>(0x10).is_none());
        assert_eq!(registry.total(), 2);
        assert_eq!(registry.len(ObjectKind::Sampler), 1);
    }

    #[test]
    fn test_record_outlives_removal() {
        let registry = ObjectRegistry::with_capacity(64);
        registry
            .insert(
                0x20,
                SamplerRecord {
                    desc: SamplerDesc::default().with_compare(CompareOp::Less),
                },
            )
            .unwrap();

        let held = registry.get::<SamplerRecord>(0x20).unwrap();
        let removed = registry.remove::<SamplerRecord>(0x20).unwrap();
        assert!(registry.is_empty());
        assert_eq!(held.desc.compare, Some(CompareOp::Less));
        assert_eq!(removed.desc, held.desc);
    }

    #[test]
    fn test_set_index_lookup() {
        let record = PipelineLayoutRecord {
            params: Vec::new(),
            set_indices: vec![None, Some(0), Some(1)],
            set_layouts: Vec::new(),
            owned_set_layouts: Vec::new(),
        };
        assert_eq!(record.set_index(0), None);
        assert_eq!(record.set_index(2), Some(1));
        assert_eq!(record.set_index(7), None);
    }

    #[test]
    fn test_command_buffer_transitions() {
        let record = CommandBufferRecord::new(vk::CommandPool::null());
        assert_eq!(record.state(), RecorderState::Idle);
        assert_eq!(record.transition(RecorderState::Recording), RecorderState::Idle);
        assert_eq!(record.transition(RecorderState::Submitted), RecorderState::Recording);
        assert_eq!(record.state(), RecorderState::Submitted);
    }

    #[test]
    fn test_drain_by_kind() {
        let registry = ObjectRegistry::with_capacity(64);
        for raw in 1..=3 {
            registry
                .insert(raw, QueryPoolRecord { ty: QueryType::Occlusion, count: raw as u32 })
                .unwrap();
        }
        registry
            .insert(9, SamplerRecord { desc: SamplerDesc::default() })
            .unwrap();

        let drained = registry.drain::<QueryPoolRecord>();
        assert_eq!(drained.len(), 3);
        assert_eq!(registry.total(), 1);
        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_command_buffers_of_pool() {
        use ash::vk::Handle;

        let registry = ObjectRegistry::with_capacity(64);
        let pool_a = vk::CommandPool::from_raw(0x10);
        let pool_b = vk::CommandPool::from_raw(0x20);
        for raw in 1..=4 {
            let pool = if raw % 2 == 0 { pool_a } else { pool_b };
            registry.insert(raw, CommandBufferRecord::new(pool)).unwrap();
        }

        assert_eq!(registry.filter::<CommandBufferRecord>(|cb| cb.pool == pool_a).len(), 2);
        let mut removed: Vec<u64> = registry
            .remove_where::<CommandBufferRecord>(|cb| cb.pool == pool_a)
            .into_iter()
            .map(|(raw, _)| raw)
            .collect();
        removed.sort_unstable();
        assert_eq!(removed, vec![2, 4]);
        assert_eq!(registry.len(ObjectKind::CommandBuffer), 2);
        assert!(registry.contains::<CommandBufferRecord>(1));
    }
}
