//! Resource, view and sampler descriptions.

use bitflags::bitflags;

use super::format::Format;
use super::handles::ResourceHandle;

bitflags! {
    /// How a resource is being accessed.
    ///
    /// Stands in for native layouts and access masks. Only transitions between
    /// two usages carry meaning; a resource has no resting usage.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceUsage: u32 {
        const INDEX_BUFFER = 1 << 0;
        const VERTEX_BUFFER = 1 << 1;
        const CONSTANT_BUFFER = 1 << 2;
        const STREAM_OUTPUT = 1 << 3;
        const INDIRECT_ARGUMENT = 1 << 4;
        const DEPTH_STENCIL_READ = 1 << 5;
        const DEPTH_STENCIL_WRITE = 1 << 6;
        const RENDER_TARGET = 1 << 7;
        const SHADER_RESOURCE_PIXEL = 1 << 8;
        const SHADER_RESOURCE_NON_PIXEL = 1 << 9;
        const UNORDERED_ACCESS = 1 << 10;
        const COPY_DEST = 1 << 11;
        const COPY_SOURCE = 1 << 12;
        const RESOLVE_DEST = 1 << 13;
        const RESOLVE_SOURCE = 1 << 14;
        const PRESENT = 1 << 15;
        const CPU_ACCESS = 1 << 16;

        const DEPTH_STENCIL = Self::DEPTH_STENCIL_READ.bits() | Self::DEPTH_STENCIL_WRITE.bits();
        const SHADER_RESOURCE = Self::SHADER_RESOURCE_PIXEL.bits() | Self::SHADER_RESOURCE_NON_PIXEL.bits();
        /// Any access except presentation.
        const GENERAL = (1 << 15) - 1 | Self::CPU_ACCESS.bits();
    }
}

impl ResourceUsage {
    /// The undefined usage: previous contents may be discarded.
    pub const UNDEFINED: Self = Self::empty();

    /// Returns `true` if the usage writes the resource.
    pub fn is_write(self) -> bool {
        self.intersects(
            Self::DEPTH_STENCIL_WRITE
                | Self::RENDER_TARGET
                | Self::UNORDERED_ACCESS
                | Self::COPY_DEST
                | Self::RESOLVE_DEST
                | Self::STREAM_OUTPUT,
        )
    }
}

bitflags! {
    /// Creation flags that are not usages.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceFlags: u32 {
        const CUBE_COMPATIBLE = 1 << 0;
        const SPARSE_BINDING = 1 << 1;
        const GENERATE_MIPMAPS = 1 << 2;
        /// Views may reinterpret the format.
        const MUTABLE_FORMAT = 1 << 3;
        const SHARED = 1 << 4;
    }
}

/// Memory heap backing a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryHeap {
    /// No memory is allocated by the layer (application or swap-chain owned).
    #[default]
    Unknown,
    /// Device local, not CPU visible.
    GpuOnly,
    /// CPU writes, GPU reads.
    CpuToGpu,
    /// GPU writes, CPU reads.
    GpuToCpu,
    /// CPU only staging memory.
    CpuOnly,
}

impl MemoryHeap {
    /// Returns `true` if the CPU can map memory from this heap.
    pub fn is_cpu_visible(self) -> bool {
        matches!(self, Self::CpuToGpu | Self::GpuToCpu | Self::CpuOnly)
    }
}

/// Dimensionality of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureDimension {
    D1,
    #[default]
    D2,
    D3,
}

/// Texture shape and format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub dimension: TextureDimension,
    pub width: u32,
    pub height: u32,
    /// Depth for 3D textures, array layer count otherwise.
    pub depth_or_layers: u16,
    pub levels: u16,
    pub format: Format,
    pub samples: u16,
}

/// Buffer size and structure stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferDesc {
    pub size: u64,
    pub stride: u32,
}

/// Buffer or texture specific part of a [`ResourceDesc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer(BufferDesc),
    Texture(TextureDesc),
}

/// Backend-neutral description of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceDesc {
    pub kind: ResourceKind,
    pub heap: MemoryHeap,
    pub usage: ResourceUsage,
    pub flags: ResourceFlags,
}

impl ResourceDesc {
    /// Describe a buffer.
    pub fn buffer(size: u64, heap: MemoryHeap, usage: ResourceUsage) -> Self {
        Self {
            kind: ResourceKind::Buffer(BufferDesc { size, stride: 0 }),
            heap,
            usage,
            flags: ResourceFlags::empty(),
        }
    }

    /// Describe a single-sampled 2D texture.
    pub fn texture_2d(
        width: u32,
        height: u32,
        layers: u16,
        levels: u16,
        format: Format,
        heap: MemoryHeap,
        usage: ResourceUsage,
    ) -> Self {
        Self {
            kind: ResourceKind::Texture(TextureDesc {
                dimension: TextureDimension::D2,
                width,
                height,
                depth_or_layers: layers,
                levels,
                format,
                samples: 1,
            }),
            heap,
            usage,
            flags: ResourceFlags::empty(),
        }
    }

    /// Set the creation flags.
    pub fn with_flags(mut self, flags: ResourceFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the sample count (textures only).
    pub fn with_samples(mut self, samples: u16) -> Self {
        if let ResourceKind::Texture(texture) = &mut self.kind {
            texture.samples = samples;
        }
        self
    }

    /// The texture part, if this is a texture.
    pub fn as_texture(&self) -> Option<&TextureDesc> {
        match &self.kind {
            ResourceKind::Texture(texture) => Some(texture),
            ResourceKind::Buffer(_) => None,
        }
    }

    /// The buffer part, if this is a buffer.
    pub fn as_buffer(&self) -> Option<&BufferDesc> {
        match &self.kind {
            ResourceKind::Buffer(buffer) => Some(buffer),
            ResourceKind::Texture(_) => None,
        }
    }

    /// Returns `true` for buffers.
    pub fn is_buffer(&self) -> bool {
        matches!(self.kind, ResourceKind::Buffer(_))
    }

    /// Number of subresources (levels times layers) of a texture, 1 for buffers.
    pub fn subresource_count(&self) -> u32 {
        match &self.kind {
            ResourceKind::Buffer(_) => 1,
            ResourceKind::Texture(texture) => {
                let layers = match texture.dimension {
                    TextureDimension::D3 => 1,
                    _ => u32::from(texture.depth_or_layers),
                };
                u32::from(texture.levels) * layers
            }
        }
    }
}

/// Shape of a resource view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceViewType {
    #[default]
    Unknown,
    Buffer,
    Texture1D,
    Texture1DArray,
    Texture2D,
    Texture2DArray,
    Texture2DMultisample,
    Texture2DMultisampleArray,
    Texture3D,
    TextureCube,
    TextureCubeArray,
}

/// Selects `all remaining` levels or layers in a view range.
pub const REMAINING: u32 = u32::MAX;

/// Part of a resource a view covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewRange {
    Texture {
        first_level: u32,
        level_count: u32,
        first_layer: u32,
        layer_count: u32,
    },
    Buffer {
        offset: u64,
        size: u64,
    },
}

/// Backend-neutral description of a resource view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceViewDesc {
    pub view_type: ResourceViewType,
    pub format: Format,
    pub range: ViewRange,
}

impl ResourceViewDesc {
    /// View of every level and layer of a texture.
    pub fn texture(view_type: ResourceViewType, format: Format) -> Self {
        Self {
            view_type,
            format,
            range: ViewRange::Texture {
                first_level: 0,
                level_count: REMAINING,
                first_layer: 0,
                layer_count: REMAINING,
            },
        }
    }

    /// View of a level range of a 2D texture.
    pub fn texture_2d(format: Format, first_level: u32, level_count: u32) -> Self {
        Self {
            view_type: ResourceViewType::Texture2D,
            format,
            range: ViewRange::Texture {
                first_level,
                level_count,
                first_layer: 0,
                layer_count: 1,
            },
        }
    }

    /// Typed view of a buffer region.
    pub fn buffer(format: Format, offset: u64, size: u64) -> Self {
        Self {
            view_type: ResourceViewType::Buffer,
            format,
            range: ViewRange::Buffer { offset, size },
        }
    }
}

/// Initial or update data for one subresource.
#[derive(Debug, Clone, Copy)]
pub struct SubresourceData<'a> {
    pub data: &'a [u8],
    /// Bytes between rows; 0 means tightly packed.
    pub row_pitch: u32,
    /// Bytes between depth slices; 0 means tightly packed.
    pub slice_pitch: u32,
}

impl<'a> SubresourceData<'a> {
    /// Tightly packed data.
    pub fn packed(data: &'a [u8]) -> Self {
        Self {
            data,
            row_pitch: 0,
            slice_pitch: 0,
        }
    }
}

/// Texel region of a subresource, end-exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SubresourceBox {
    pub left: u32,
    pub top: u32,
    pub front: u32,
    pub right: u32,
    pub bottom: u32,
    pub back: u32,
}

impl SubresourceBox {
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }

    pub fn depth(&self) -> u32 {
        self.back - self.front
    }
}

/// CPU access requested when mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapAccess {
    ReadOnly,
    WriteOnly,
    ReadWrite,
    WriteDiscard,
}

/// Pointer and pitches of a mapped texture subresource.
#[derive(Debug, Clone, Copy)]
pub struct SubresourceMapping {
    pub data: *mut u8,
    pub row_pitch: u32,
    pub slice_pitch: u32,
}

/// Byte range of a buffer bound as a descriptor or vertex stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferRange {
    pub buffer: ResourceHandle,
    pub offset: u64,
    /// `u64::MAX` selects the rest of the buffer.
    pub size: u64,
}

/// Texel filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterType {
    #[default]
    Point,
    Linear,
}

/// Texture coordinate addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    Wrap,
    Mirror,
    #[default]
    Clamp,
    Border,
    MirrorOnce,
}

/// Comparison function for depth, stencil and comparison samplers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    #[default]
    Always,
}

/// Sampler state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub min_filter: FilterType,
    pub mag_filter: FilterType,
    pub mip_filter: FilterType,
    pub anisotropic: bool,
    pub compare: Option<CompareOp>,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    pub mip_lod_bias: f32,
    pub max_anisotropy: f32,
    pub border_color: [f32; 4],
    pub min_lod: f32,
    pub max_lod: f32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            min_filter: FilterType::Linear,
            mag_filter: FilterType::Linear,
            mip_filter: FilterType::Linear,
            anisotropic: false,
            compare: None,
            address_u: AddressMode::Clamp,
            address_v: AddressMode::Clamp,
            address_w: AddressMode::Clamp,
            mip_lod_bias: 0.0,
            max_anisotropy: 1.0,
            border_color: [0.0; 4],
            min_lod: 0.0,
            max_lod: f32::MAX,
        }
    }
}

impl SamplerDesc {
    /// Point sampling for all of min, mag and mip.
    pub fn point() -> Self {
        Self {
            min_filter: FilterType::Point,
            mag_filter: FilterType::Point,
            mip_filter: FilterType::Point,
            ..Default::default()
        }
    }

    /// Set all three address modes.
    pub fn with_address_mode(mut self, mode: AddressMode) -> Self {
        self.address_u = mode;
        self.address_v = mode;
        self.address_w = mode;
        self
    }

    /// Turn this into a comparison sampler.
    pub fn with_compare(mut self, op: CompareOp) -> Self {
        self.compare = Some(op);
        self
    }

    /// Enable anisotropic filtering.
    pub fn with_anisotropy(mut self, max_anisotropy: f32) -> Self {
        self.anisotropic = true;
        self.max_anisotropy = max_anisotropy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_desc_accessors() {
        let desc = ResourceDesc::texture_2d(
            256,
            128,
            1,
            4,
            Format::R8G8B8A8Unorm,
            MemoryHeap::GpuOnly,
            ResourceUsage::SHADER_RESOURCE,
        );
        let texture = desc.as_texture().unwrap();
        assert_eq!((texture.width, texture.height), (256, 128));
        assert!(desc.as_buffer().is_none());
        assert_eq!(desc.subresource_count(), 4);
    }

    #[test]
    fn test_buffer_desc_accessors() {
        let desc = ResourceDesc::buffer(4096, MemoryHeap::CpuToGpu, ResourceUsage::CONSTANT_BUFFER);
        assert!(desc.is_buffer());
        assert_eq!(desc.as_buffer().unwrap().size, 4096);
        assert_eq!(desc.with_samples(4), desc);
    }

    #[test]
    fn test_general_usage_excludes_present() {
        assert!(!ResourceUsage::GENERAL.contains(ResourceUsage::PRESENT));
        assert!(ResourceUsage::GENERAL.contains(ResourceUsage::SHADER_RESOURCE));
        assert!(ResourceUsage::GENERAL.contains(ResourceUsage::CPU_ACCESS));
        assert!(ResourceUsage::RENDER_TARGET.is_write());
        assert!(!ResourceUsage::SHADER_RESOURCE.is_write());
    }

    #[test]
    fn test_subresource_box_extent() {
        let region = SubresourceBox {
            left: 4,
            top: 8,
            front: 0,
            right: 20,
            bottom: 16,
            back: 1,
        };
        assert_eq!((region.width(), region.height(), region.depth()), (16, 8, 1));
    }

    #[test]
    fn test_sampler_builders() {
        let sampler = SamplerDesc::point()
            .with_address_mode(AddressMode::Wrap)
            .with_compare(CompareOp::LessEqual);
        assert_eq!(sampler.min_filter, FilterType::Point);
        assert_eq!(sampler.address_w, AddressMode::Wrap);
        assert_eq!(sampler.compare, Some(CompareOp::LessEqual));
    }
}
