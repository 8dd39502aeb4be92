//! Type conversions between layer types and Vulkan types.
//!
//! Native values the layer cannot represent convert to `None` (or
//! [`Format::Unknown`]). Every layer value has a native equivalent.

use ash::vk;

use crate::api::{
    AddressMode, AttachmentDesc, BlendFactor, BlendOp, CompareOp, CullMode, DescriptorType,
    DynamicState, FillMode, FilterType, Format, LoadOp, LogicOp, MemoryHeap, PresentMode,
    PrimitiveTopology, QueryType, ResourceDesc, ResourceFlags, ResourceKind, ResourceUsage,
    ResourceViewDesc, ResourceViewType, SamplerDesc, ShaderStage, StencilOp, StoreOp,
    SwapchainDesc, TextureDesc, TextureDimension, ViewRange, REMAINING,
};

macro_rules! format_pairs {
    ($($format:ident <=> $vk:ident,)*) => {
        /// Convert a format to its Vulkan format.
        ///
        /// Typeless formats map to the UNORM/SFLOAT member of their family.
        pub fn convert_format(format: Format) -> vk::Format {
            match format {
                $(Format::$format => vk::Format::$vk,)*
                other => typeless_storage_format(other),
            }
        }

        /// Convert a Vulkan format to a format.
        pub fn convert_format_from_vk(format: vk::Format) -> Format {
            match format {
                $(vk::Format::$vk => Format::$format,)*
                _ => Format::Unknown,
            }
        }
    };
}

format_pairs! {
    R8Uint <=> R8_UINT,
    R8Sint <=> R8_SINT,
    R8Unorm <=> R8_UNORM,
    R8Snorm <=> R8_SNORM,
    R8G8Uint <=> R8G8_UINT,
    R8G8Sint <=> R8G8_SINT,
    R8G8Unorm <=> R8G8_UNORM,
    R8G8Snorm <=> R8G8_SNORM,
    R8G8B8A8Uint <=> R8G8B8A8_UINT,
    R8G8B8A8Sint <=> R8G8B8A8_SINT,
    R8G8B8A8Unorm <=> R8G8B8A8_UNORM,
    R8G8B8A8UnormSrgb <=> R8G8B8A8_SRGB,
    R8G8B8A8Snorm <=> R8G8B8A8_SNORM,
    B8G8R8A8Unorm <=> B8G8R8A8_UNORM,
    B8G8R8A8UnormSrgb <=> B8G8R8A8_SRGB,
    R10G10B10A2Uint <=> A2B10G10R10_UINT_PACK32,
    R10G10B10A2Unorm <=> A2B10G10R10_UNORM_PACK32,
    B10G10R10A2Uint <=> A2R10G10B10_UINT_PACK32,
    B10G10R10A2Unorm <=> A2R10G10B10_UNORM_PACK32,
    R16Float <=> R16_SFLOAT,
    R16Uint <=> R16_UINT,
    R16Sint <=> R16_SINT,
    R16Unorm <=> R16_UNORM,
    R16Snorm <=> R16_SNORM,
    R16G16Float <=> R16G16_SFLOAT,
    R16G16Uint <=> R16G16_UINT,
    R16G16Sint <=> R16G16_SINT,
    R16G16Unorm <=> R16G16_UNORM,
    R16G16Snorm <=> R16G16_SNORM,
    R16G16B16A16Float <=> R16G16B16A16_SFLOAT,
    R16G16B16A16Uint <=> R16G16B16A16_UINT,
    R16G16B16A16Sint <=> R16G16B16A16_SINT,
    R16G16B16A16Unorm <=> R16G16B16A16_UNORM,
    R16G16B16A16Snorm <=> R16G16B16A16_SNORM,
    R32Float <=> R32_SFLOAT,
    R32Uint <=> R32_UINT,
    R32Sint <=> R32_SINT,
    R32G32Float <=> R32G32_SFLOAT,
    R32G32Uint <=> R32G32_UINT,
    R32G32Sint <=> R32G32_SINT,
    R32G32B32Float <=> R32G32B32_SFLOAT,
    R32G32B32Uint <=> R32G32B32_UINT,
    R32G32B32Sint <=> R32G32B32_SINT,
    R32G32B32A32Float <=> R32G32B32A32_SFLOAT,
    R32G32B32A32Uint <=> R32G32B32A32_UINT,
    R32G32B32A32Sint <=> R32G32B32A32_SINT,
    R9G9B9E5 <=> E5B9G9R9_UFLOAT_PACK32,
    R11G11B10Float <=> B10G11R11_UFLOAT_PACK32,
    B5G6R5Unorm <=> R5G6B5_UNORM_PACK16,
    B5G5R5A1Unorm <=> A1R5G5B5_UNORM_PACK16,
    B4G4R4A4Unorm <=> A4R4G4B4_UNORM_PACK16,
    S8Uint <=> S8_UINT,
    D16Unorm <=> D16_UNORM,
    D16UnormS8Uint <=> D16_UNORM_S8_UINT,
    D24UnormS8Uint <=> D24_UNORM_S8_UINT,
    D32Float <=> D32_SFLOAT,
    D32FloatS8Uint <=> D32_SFLOAT_S8_UINT,
    BC1Unorm <=> BC1_RGBA_UNORM_BLOCK,
    BC1UnormSrgb <=> BC1_RGBA_SRGB_BLOCK,
    BC2Unorm <=> BC2_UNORM_BLOCK,
    BC2UnormSrgb <=> BC2_SRGB_BLOCK,
    BC3Unorm <=> BC3_UNORM_BLOCK,
    BC3UnormSrgb <=> BC3_SRGB_BLOCK,
    BC4Unorm <=> BC4_UNORM_BLOCK,
    BC4Snorm <=> BC4_SNORM_BLOCK,
    BC5Unorm <=> BC5_UNORM_BLOCK,
    BC5Snorm <=> BC5_SNORM_BLOCK,
    BC6HUfloat <=> BC6H_UFLOAT_BLOCK,
    BC6HSfloat <=> BC6H_SFLOAT_BLOCK,
    BC7Unorm <=> BC7_UNORM_BLOCK,
    BC7UnormSrgb <=> BC7_SRGB_BLOCK,
}

fn typeless_storage_format(format: Format) -> vk::Format {
    match format {
        Format::R8Typeless => vk::Format::R8_UNORM,
        Format::R8G8Typeless => vk::Format::R8G8_UNORM,
        Format::R8G8B8A8Typeless => vk::Format::R8G8B8A8_UNORM,
        Format::B8G8R8A8Typeless => vk::Format::B8G8R8A8_UNORM,
        Format::R10G10B10A2Typeless => vk::Format::A2B10G10R10_UNORM_PACK32,
        Format::B10G10R10A2Typeless => vk::Format::A2R10G10B10_UNORM_PACK32,
        Format::R16Typeless => vk::Format::R16_SFLOAT,
        Format::R16G16Typeless => vk::Format::R16G16_SFLOAT,
        Format::R16G16B16A16Typeless => vk::Format::R16G16B16A16_SFLOAT,
        Format::R32Typeless => vk::Format::R32_SFLOAT,
        Format::R32G32Typeless => vk::Format::R32G32_SFLOAT,
        Format::R32G32B32Typeless => vk::Format::R32G32B32_SFLOAT,
        Format::R32G32B32A32Typeless => vk::Format::R32G32B32A32_SFLOAT,
        Format::BC1Typeless => vk::Format::BC1_RGBA_UNORM_BLOCK,
        Format::BC2Typeless => vk::Format::BC2_UNORM_BLOCK,
        Format::BC3Typeless => vk::Format::BC3_UNORM_BLOCK,
        Format::BC4Typeless => vk::Format::BC4_UNORM_BLOCK,
        Format::BC5Typeless => vk::Format::BC5_UNORM_BLOCK,
        Format::BC6HTypeless => vk::Format::BC6H_UFLOAT_BLOCK,
        Format::BC7Typeless => vk::Format::BC7_UNORM_BLOCK,
        _ => vk::Format::UNDEFINED,
    }
}

/// Image aspects present in a Vulkan format.
pub fn format_aspect_mask(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

// ---------------------------------------------------------------------------
// Usage <-> layout, access and stage
// ---------------------------------------------------------------------------

/// Convert a resource usage to the image layout it requires.
///
/// Several usages share a layout; usages that need more than one distinct
/// layout fall back to `GENERAL`.
pub fn convert_usage_to_layout(usage: ResourceUsage) -> vk::ImageLayout {
    if usage.is_empty() {
        return vk::ImageLayout::UNDEFINED;
    }
    if usage == ResourceUsage::PRESENT {
        return vk::ImageLayout::PRESENT_SRC_KHR;
    }
    if usage == ResourceUsage::RENDER_TARGET {
        return vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL;
    }
    if usage.contains(ResourceUsage::DEPTH_STENCIL_WRITE)
        && ResourceUsage::DEPTH_STENCIL.contains(usage)
    {
        return vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL;
    }
    if usage.contains(ResourceUsage::DEPTH_STENCIL_READ)
        && (ResourceUsage::DEPTH_STENCIL_READ | ResourceUsage::SHADER_RESOURCE).contains(usage)
    {
        return vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL;
    }
    if ResourceUsage::SHADER_RESOURCE.contains(usage) {
        return vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
    }
    if (ResourceUsage::COPY_SOURCE | ResourceUsage::RESOLVE_SOURCE).contains(usage) {
        return vk::ImageLayout::TRANSFER_SRC_OPTIMAL;
    }
    if (ResourceUsage::COPY_DEST | ResourceUsage::RESOLVE_DEST).contains(usage) {
        return vk::ImageLayout::TRANSFER_DST_OPTIMAL;
    }
    vk::ImageLayout::GENERAL
}

/// Convert an image layout to the set of usages it permits.
///
/// Converting the result back with [`convert_usage_to_layout`] yields the
/// original layout or `GENERAL`.
pub fn convert_layout_to_usage(layout: vk::ImageLayout) -> ResourceUsage {
    match layout {
        vk::ImageLayout::UNDEFINED | vk::ImageLayout::PREINITIALIZED => ResourceUsage::UNDEFINED,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => ResourceUsage::RENDER_TARGET,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        | vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
        | vk::ImageLayout::STENCIL_ATTACHMENT_OPTIMAL => ResourceUsage::DEPTH_STENCIL,
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        | vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL
        | vk::ImageLayout::STENCIL_READ_ONLY_OPTIMAL => {
            ResourceUsage::DEPTH_STENCIL_READ | ResourceUsage::SHADER_RESOURCE
        }
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => ResourceUsage::SHADER_RESOURCE,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => {
            ResourceUsage::COPY_SOURCE | ResourceUsage::RESOLVE_SOURCE
        }
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => {
            ResourceUsage::COPY_DEST | ResourceUsage::RESOLVE_DEST
        }
        vk::ImageLayout::PRESENT_SRC_KHR | vk::ImageLayout::SHARED_PRESENT_KHR => {
            ResourceUsage::PRESENT
        }
        _ => ResourceUsage::GENERAL,
    }
}

/// Convert a resource usage to the memory accesses it performs.
pub fn convert_usage_to_access(usage: ResourceUsage) -> vk::AccessFlags {
    let mut access = vk::AccessFlags::empty();

    if usage.contains(ResourceUsage::INDEX_BUFFER) {
        access |= vk::AccessFlags::INDEX_READ;
    }
    if usage.contains(ResourceUsage::VERTEX_BUFFER) {
        access |= vk::AccessFlags::VERTEX_ATTRIBUTE_READ;
    }
    if usage.contains(ResourceUsage::CONSTANT_BUFFER) {
        access |= vk::AccessFlags::UNIFORM_READ;
    }
    if usage.contains(ResourceUsage::STREAM_OUTPUT) {
        access |= vk::AccessFlags::TRANSFORM_FEEDBACK_WRITE_EXT;
    }
    if usage.contains(ResourceUsage::INDIRECT_ARGUMENT) {
        access |= vk::AccessFlags::INDIRECT_COMMAND_READ;
    }
    if usage.contains(ResourceUsage::DEPTH_STENCIL_READ) {
        access |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ;
    }
    if usage.contains(ResourceUsage::DEPTH_STENCIL_WRITE) {
        access |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
    }
    if usage.contains(ResourceUsage::RENDER_TARGET) {
        access |= vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
    }
    if usage.intersects(ResourceUsage::SHADER_RESOURCE) {
        access |= vk::AccessFlags::SHADER_READ;
    }
    if usage.contains(ResourceUsage::UNORDERED_ACCESS) {
        access |= vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE;
    }
    if usage.intersects(ResourceUsage::COPY_DEST | ResourceUsage::RESOLVE_DEST) {
        access |= vk::AccessFlags::TRANSFER_WRITE;
    }
    if usage.intersects(ResourceUsage::COPY_SOURCE | ResourceUsage::RESOLVE_SOURCE) {
        access |= vk::AccessFlags::TRANSFER_READ;
    }
    if usage.contains(ResourceUsage::CPU_ACCESS) {
        access |= vk::AccessFlags::HOST_READ | vk::AccessFlags::HOST_WRITE;
    }

    access
}

/// Convert a resource usage to the pipeline stages that access the resource.
///
/// `is_source` selects the side of a barrier. Undefined and present usages
/// wait on nothing, so they map to the top of the pipe as a source and to the
/// bottom of the pipe as a destination.
pub fn convert_usage_to_pipeline_stage(
    usage: ResourceUsage,
    is_source: bool,
) -> vk::PipelineStageFlags {
    let edge = if is_source {
        vk::PipelineStageFlags::TOP_OF_PIPE
    } else {
        vk::PipelineStageFlags::BOTTOM_OF_PIPE
    };
    if usage.is_empty() {
        return edge;
    }

    let mut stages = vk::PipelineStageFlags::empty();

    if usage.intersects(ResourceUsage::INDEX_BUFFER | ResourceUsage::VERTEX_BUFFER) {
        stages |= vk::PipelineStageFlags::VERTEX_INPUT;
    }
    if usage.contains(ResourceUsage::CONSTANT_BUFFER) {
        stages |= vk::PipelineStageFlags::VERTEX_SHADER
            | vk::PipelineStageFlags::FRAGMENT_SHADER
            | vk::PipelineStageFlags::COMPUTE_SHADER;
    }
    if usage.contains(ResourceUsage::STREAM_OUTPUT) {
        stages |= vk::PipelineStageFlags::TRANSFORM_FEEDBACK_EXT;
    }
    if usage.contains(ResourceUsage::INDIRECT_ARGUMENT) {
        stages |= vk::PipelineStageFlags::DRAW_INDIRECT;
    }
    if usage.intersects(ResourceUsage::DEPTH_STENCIL) {
        stages |= vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
    }
    if usage.contains(ResourceUsage::RENDER_TARGET) {
        stages |= vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
    }
    if usage.contains(ResourceUsage::SHADER_RESOURCE_PIXEL) {
        stages |= vk::PipelineStageFlags::FRAGMENT_SHADER;
    }
    if usage.contains(ResourceUsage::SHADER_RESOURCE_NON_PIXEL) {
        stages |= vk::PipelineStageFlags::VERTEX_SHADER | vk::PipelineStageFlags::COMPUTE_SHADER;
    }
    if usage.contains(ResourceUsage::UNORDERED_ACCESS) {
        stages |= vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::COMPUTE_SHADER;
    }
    if usage.intersects(
        ResourceUsage::COPY_DEST
            | ResourceUsage::COPY_SOURCE
            | ResourceUsage::RESOLVE_DEST
            | ResourceUsage::RESOLVE_SOURCE,
    ) {
        stages |= vk::PipelineStageFlags::TRANSFER;
    }
    if usage.contains(ResourceUsage::CPU_ACCESS) {
        stages |= vk::PipelineStageFlags::HOST;
    }
    if usage.contains(ResourceUsage::PRESENT) {
        stages |= edge;
    }

    if stages.is_empty() { edge } else { stages }
}

// ---------------------------------------------------------------------------
// Resource descriptions
// ---------------------------------------------------------------------------

/// Convert a resource usage to Vulkan image usage flags.
pub fn convert_usage_to_image_usage(usage: ResourceUsage) -> vk::ImageUsageFlags {
    let mut result = vk::ImageUsageFlags::empty();

    if usage.contains(ResourceUsage::RENDER_TARGET) {
        result |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
    }
    if usage.intersects(ResourceUsage::DEPTH_STENCIL) {
        result |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
    }
    if usage.intersects(ResourceUsage::SHADER_RESOURCE) {
        result |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.contains(ResourceUsage::UNORDERED_ACCESS) {
        result |= vk::ImageUsageFlags::STORAGE;
    }
    if usage.intersects(ResourceUsage::COPY_DEST | ResourceUsage::RESOLVE_DEST) {
        result |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    if usage.intersects(ResourceUsage::COPY_SOURCE | ResourceUsage::RESOLVE_SOURCE) {
        result |= vk::ImageUsageFlags::TRANSFER_SRC;
    }

    result
}

/// Convert Vulkan image usage flags to a resource usage.
pub fn convert_image_usage_to_usage(usage: vk::ImageUsageFlags) -> ResourceUsage {
    let mut result = ResourceUsage::empty();

    if usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT) {
        result |= ResourceUsage::RENDER_TARGET;
    }
    if usage.contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT) {
        result |= ResourceUsage::DEPTH_STENCIL;
    }
    if usage.intersects(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::INPUT_ATTACHMENT) {
        result |= ResourceUsage::SHADER_RESOURCE;
    }
    if usage.contains(vk::ImageUsageFlags::STORAGE) {
        result |= ResourceUsage::UNORDERED_ACCESS;
    }
    if usage.contains(vk::ImageUsageFlags::TRANSFER_DST) {
        result |= ResourceUsage::COPY_DEST | ResourceUsage::RESOLVE_DEST;
    }
    if usage.contains(vk::ImageUsageFlags::TRANSFER_SRC) {
        result |= ResourceUsage::COPY_SOURCE | ResourceUsage::RESOLVE_SOURCE;
    }

    result
}

/// Convert a resource usage to Vulkan buffer usage flags.
pub fn convert_usage_to_buffer_usage(usage: ResourceUsage) -> vk::BufferUsageFlags {
    let mut result = vk::BufferUsageFlags::empty();

    if usage.contains(ResourceUsage::INDEX_BUFFER) {
        result |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(ResourceUsage::VERTEX_BUFFER) {
        result |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(ResourceUsage::CONSTANT_BUFFER) {
        result |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(ResourceUsage::STREAM_OUTPUT) {
        result |= vk::BufferUsageFlags::TRANSFORM_FEEDBACK_BUFFER_EXT;
    }
    if usage.contains(ResourceUsage::INDIRECT_ARGUMENT) {
        result |= vk::BufferUsageFlags::INDIRECT_BUFFER;
    }
    if usage.intersects(ResourceUsage::SHADER_RESOURCE) {
        result |= vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER;
    }
    if usage.contains(ResourceUsage::UNORDERED_ACCESS) {
        result |= vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::STORAGE_TEXEL_BUFFER;
    }
    if usage.intersects(ResourceUsage::COPY_DEST | ResourceUsage::RESOLVE_DEST) {
        result |= vk::BufferUsageFlags::TRANSFER_DST;
    }
    if usage.intersects(ResourceUsage::COPY_SOURCE | ResourceUsage::RESOLVE_SOURCE) {
        result |= vk::BufferUsageFlags::TRANSFER_SRC;
    }

    result
}

/// Convert Vulkan buffer usage flags to a resource usage.
pub fn convert_buffer_usage_to_usage(usage: vk::BufferUsageFlags) -> ResourceUsage {
    let mut result = ResourceUsage::empty();

    if usage.contains(vk::BufferUsageFlags::INDEX_BUFFER) {
        result |= ResourceUsage::INDEX_BUFFER;
    }
    if usage.contains(vk::BufferUsageFlags::VERTEX_BUFFER) {
        result |= ResourceUsage::VERTEX_BUFFER;
    }
    if usage.contains(vk::BufferUsageFlags::UNIFORM_BUFFER) {
        result |= ResourceUsage::CONSTANT_BUFFER;
    }
    if usage.contains(vk::BufferUsageFlags::TRANSFORM_FEEDBACK_BUFFER_EXT) {
        result |= ResourceUsage::STREAM_OUTPUT;
    }
    if usage.contains(vk::BufferUsageFlags::INDIRECT_BUFFER) {
        result |= ResourceUsage::INDIRECT_ARGUMENT;
    }
    if usage.contains(vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER) {
        result |= ResourceUsage::SHADER_RESOURCE;
    }
    if usage.intersects(
        vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::STORAGE_TEXEL_BUFFER,
    ) {
        result |= ResourceUsage::UNORDERED_ACCESS;
    }
    if usage.contains(vk::BufferUsageFlags::TRANSFER_DST) {
        result |= ResourceUsage::COPY_DEST | ResourceUsage::RESOLVE_DEST;
    }
    if usage.contains(vk::BufferUsageFlags::TRANSFER_SRC) {
        result |= ResourceUsage::COPY_SOURCE | ResourceUsage::RESOLVE_SOURCE;
    }

    result
}

/// The image creation parameters the layer tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub flags: vk::ImageCreateFlags,
    pub image_type: vk::ImageType,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: vk::SampleCountFlags,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
}

impl ImageInfo {
    /// Capture the tracked parameters of a create info.
    pub fn from_vk(info: &vk::ImageCreateInfo<'_>) -> Self {
        Self {
            flags: info.flags,
            image_type: info.image_type,
            format: info.format,
            extent: info.extent,
            mip_levels: info.mip_levels,
            array_layers: info.array_layers,
            samples: info.samples,
            tiling: info.tiling,
            usage: info.usage,
        }
    }

    /// Build a create info from the tracked parameters.
    pub fn to_vk(&self) -> vk::ImageCreateInfo<'static> {
        vk::ImageCreateInfo::default()
            .flags(self.flags)
            .image_type(self.image_type)
            .format(self.format)
            .extent(self.extent)
            .mip_levels(self.mip_levels)
            .array_layers(self.array_layers)
            .samples(self.samples)
            .tiling(self.tiling)
            .usage(self.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
    }

    /// Full subresource range of the image.
    pub fn full_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: format_aspect_mask(self.format),
            base_mip_level: 0,
            level_count: vk::REMAINING_MIP_LEVELS,
            base_array_layer: 0,
            layer_count: vk::REMAINING_ARRAY_LAYERS,
        }
    }
}

/// The buffer creation parameters the layer tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    pub flags: vk::BufferCreateFlags,
    pub size: u64,
    pub usage: vk::BufferUsageFlags,
}

impl BufferInfo {
    /// Capture the tracked parameters of a create info.
    pub fn from_vk(info: &vk::BufferCreateInfo<'_>) -> Self {
        Self {
            flags: info.flags,
            size: info.size,
            usage: info.usage,
        }
    }

    /// Build a create info from the tracked parameters.
    pub fn to_vk(&self) -> vk::BufferCreateInfo<'static> {
        vk::BufferCreateInfo::default()
            .flags(self.flags)
            .size(self.size)
            .usage(self.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
    }
}

/// Convert a texture description to image creation parameters.
pub fn convert_texture_desc(desc: &ResourceDesc, texture: &TextureDesc) -> ImageInfo {
    let mut flags = vk::ImageCreateFlags::empty();
    if desc.flags.contains(ResourceFlags::CUBE_COMPATIBLE) {
        flags |= vk::ImageCreateFlags::CUBE_COMPATIBLE;
    }
    if desc.flags.contains(ResourceFlags::SPARSE_BINDING) {
        flags |= vk::ImageCreateFlags::SPARSE_BINDING;
    }
    if desc.flags.contains(ResourceFlags::MUTABLE_FORMAT) || texture.format.is_typeless() {
        flags |= vk::ImageCreateFlags::MUTABLE_FORMAT;
    }

    let mut usage = convert_usage_to_image_usage(desc.usage);
    if desc.flags.contains(ResourceFlags::GENERATE_MIPMAPS) {
        usage |= vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST;
    }

    let (image_type, extent, array_layers) = match texture.dimension {
        TextureDimension::D1 => (
            vk::ImageType::TYPE_1D,
            vk::Extent3D { width: texture.width, height: 1, depth: 1 },
            u32::from(texture.depth_or_layers),
        ),
        TextureDimension::D2 => (
            vk::ImageType::TYPE_2D,
            vk::Extent3D { width: texture.width, height: texture.height, depth: 1 },
            u32::from(texture.depth_or_layers),
        ),
        TextureDimension::D3 => (
            vk::ImageType::TYPE_3D,
            vk::Extent3D {
                width: texture.width,
                height: texture.height,
                depth: u32::from(texture.depth_or_layers),
            },
            1,
        ),
    };

    let tiling = if desc.heap.is_cpu_visible() {
        vk::ImageTiling::LINEAR
    } else {
        vk::ImageTiling::OPTIMAL
    };

    ImageInfo {
        flags,
        image_type,
        format: convert_format(texture.format),
        extent,
        mip_levels: u32::from(texture.levels).max(1),
        array_layers: array_layers.max(1),
        samples: vk::SampleCountFlags::from_raw(u32::from(texture.samples.max(1))),
        tiling,
        usage,
    }
}

/// Convert image creation parameters to a resource description.
pub fn convert_image_info(info: &ImageInfo, heap: MemoryHeap) -> ResourceDesc {
    let (dimension, depth_or_layers) = match info.image_type {
        vk::ImageType::TYPE_1D => (TextureDimension::D1, info.array_layers),
        vk::ImageType::TYPE_3D => (TextureDimension::D3, info.extent.depth),
        _ => (TextureDimension::D2, info.array_layers),
    };

    let mut flags = ResourceFlags::empty();
    if info.flags.contains(vk::ImageCreateFlags::CUBE_COMPATIBLE) {
        flags |= ResourceFlags::CUBE_COMPATIBLE;
    }
    if info.flags.contains(vk::ImageCreateFlags::SPARSE_BINDING) {
        flags |= ResourceFlags::SPARSE_BINDING;
    }
    if info.flags.contains(vk::ImageCreateFlags::MUTABLE_FORMAT) {
        flags |= ResourceFlags::MUTABLE_FORMAT;
    }

    ResourceDesc {
        kind: ResourceKind::Texture(TextureDesc {
            dimension,
            width: info.extent.width,
            height: info.extent.height,
            depth_or_layers: u16::try_from(depth_or_layers).unwrap_or(u16::MAX),
            levels: u16::try_from(info.mip_levels).unwrap_or(u16::MAX),
            format: convert_format_from_vk(info.format),
            samples: u16::try_from(info.samples.as_raw()).unwrap_or(1),
        }),
        heap,
        usage: convert_image_usage_to_usage(info.usage),
        flags,
    }
}

/// Convert a buffer description to buffer creation parameters.
pub fn convert_buffer_desc(desc: &ResourceDesc, size: u64) -> BufferInfo {
    let mut flags = vk::BufferCreateFlags::empty();
    if desc.flags.contains(ResourceFlags::SPARSE_BINDING) {
        flags |= vk::BufferCreateFlags::SPARSE_BINDING;
    }
    BufferInfo {
        flags,
        size,
        usage: convert_usage_to_buffer_usage(desc.usage),
    }
}

/// Convert buffer creation parameters to a resource description.
pub fn convert_buffer_info(info: &BufferInfo, heap: MemoryHeap) -> ResourceDesc {
    let mut desc = ResourceDesc::buffer(info.size, heap, convert_buffer_usage_to_usage(info.usage));
    if info.flags.contains(vk::BufferCreateFlags::SPARSE_BINDING) {
        desc.flags |= ResourceFlags::SPARSE_BINDING;
    }
    desc
}

/// Split a subresource index into `(mip level, array layer)`.
pub fn subresource_to_level_layer(subresource: u32, levels: u32) -> (u32, u32) {
    let levels = levels.max(1);
    (subresource % levels, subresource / levels)
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Convert a view type to a Vulkan image view type.
pub fn convert_view_type(view_type: ResourceViewType) -> vk::ImageViewType {
    match view_type {
        ResourceViewType::Texture1D => vk::ImageViewType::TYPE_1D,
        ResourceViewType::Texture1DArray => vk::ImageViewType::TYPE_1D_ARRAY,
        ResourceViewType::Texture2D | ResourceViewType::Texture2DMultisample => {
            vk::ImageViewType::TYPE_2D
        }
        ResourceViewType::Texture2DArray | ResourceViewType::Texture2DMultisampleArray => {
            vk::ImageViewType::TYPE_2D_ARRAY
        }
        ResourceViewType::Texture3D => vk::ImageViewType::TYPE_3D,
        ResourceViewType::TextureCube => vk::ImageViewType::CUBE,
        ResourceViewType::TextureCubeArray => vk::ImageViewType::CUBE_ARRAY,
        ResourceViewType::Unknown | ResourceViewType::Buffer => {
            debug_assert!(false, "{view_type:?} has no image view type");
            vk::ImageViewType::TYPE_2D
        }
    }
}

/// Convert a Vulkan image view type to a view type.
pub fn convert_view_type_from_vk(view_type: vk::ImageViewType, samples: u32) -> ResourceViewType {
    let multisampled = samples > 1;
    match view_type {
        vk::ImageViewType::TYPE_1D => ResourceViewType::Texture1D,
        vk::ImageViewType::TYPE_1D_ARRAY => ResourceViewType::Texture1DArray,
        vk::ImageViewType::TYPE_2D if multisampled => ResourceViewType::Texture2DMultisample,
        vk::ImageViewType::TYPE_2D => ResourceViewType::Texture2D,
        vk::ImageViewType::TYPE_2D_ARRAY if multisampled => {
            ResourceViewType::Texture2DMultisampleArray
        }
        vk::ImageViewType::TYPE_2D_ARRAY => ResourceViewType::Texture2DArray,
        vk::ImageViewType::TYPE_3D => ResourceViewType::Texture3D,
        vk::ImageViewType::CUBE => ResourceViewType::TextureCube,
        vk::ImageViewType::CUBE_ARRAY => ResourceViewType::TextureCubeArray,
        _ => ResourceViewType::Unknown,
    }
}

/// Subresource range covered by a texture view.
///
/// Shader resource views of combined depth-stencil formats only see depth.
pub fn convert_view_range(
    desc: &ResourceViewDesc,
    image_format: vk::Format,
    usage_type: ResourceUsage,
) -> vk::ImageSubresourceRange {
    let view_format = match desc.format {
        Format::Unknown => image_format,
        format => convert_format(format),
    };
    let mut aspect_mask = format_aspect_mask(view_format);
    if aspect_mask.contains(vk::ImageAspectFlags::DEPTH)
        && !usage_type.intersects(ResourceUsage::DEPTH_STENCIL)
    {
        aspect_mask = vk::ImageAspectFlags::DEPTH;
    }

    let (first_level, level_count, first_layer, layer_count) = match desc.range {
        ViewRange::Texture {
            first_level,
            level_count,
            first_layer,
            layer_count,
        } => (first_level, level_count, first_layer, layer_count),
        ViewRange::Buffer { .. } => (0, REMAINING, 0, REMAINING),
    };

    vk::ImageSubresourceRange {
        aspect_mask,
        base_mip_level: first_level,
        level_count: if level_count == REMAINING {
            vk::REMAINING_MIP_LEVELS
        } else {
            level_count
        },
        base_array_layer: first_layer,
        layer_count: if layer_count == REMAINING {
            vk::REMAINING_ARRAY_LAYERS
        } else {
            layer_count
        },
    }
}

/// Convert image view parameters to a view description.
pub fn convert_image_view_info(
    view_type: vk::ImageViewType,
    format: vk::Format,
    range: &vk::ImageSubresourceRange,
    samples: u32,
) -> ResourceViewDesc {
    let remaining = |count: u32, sentinel: u32| if count == sentinel { REMAINING } else { count };
    ResourceViewDesc {
        view_type: convert_view_type_from_vk(view_type, samples),
        format: convert_format_from_vk(format),
        range: ViewRange::Texture {
            first_level: range.base_mip_level,
            level_count: remaining(range.level_count, vk::REMAINING_MIP_LEVELS),
            first_layer: range.base_array_layer,
            layer_count: remaining(range.layer_count, vk::REMAINING_ARRAY_LAYERS),
        },
    }
}

// ---------------------------------------------------------------------------
// Samplers
// ---------------------------------------------------------------------------

/// Convert a filter type to a Vulkan filter.
pub fn convert_filter(filter: FilterType) -> vk::Filter {
    match filter {
        FilterType::Point => vk::Filter::NEAREST,
        FilterType::Linear => vk::Filter::LINEAR,
    }
}

/// Convert a Vulkan filter to a filter type.
pub fn convert_filter_from_vk(filter: vk::Filter) -> Option<FilterType> {
    match filter {
        vk::Filter::NEAREST => Some(FilterType::Point),
        vk::Filter::LINEAR => Some(FilterType::Linear),
        _ => None,
    }
}

/// Convert an address mode to a Vulkan sampler address mode.
pub fn convert_address_mode(mode: AddressMode) -> vk::SamplerAddressMode {
    match mode {
        AddressMode::Wrap => vk::SamplerAddressMode::REPEAT,
        AddressMode::Mirror => vk::SamplerAddressMode::MIRRORED_REPEAT,
        AddressMode::Clamp => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        AddressMode::Border => vk::SamplerAddressMode::CLAMP_TO_BORDER,
        AddressMode::MirrorOnce => vk::SamplerAddressMode::MIRROR_CLAMP_TO_EDGE,
    }
}

/// Convert a Vulkan sampler address mode to an address mode.
pub fn convert_address_mode_from_vk(mode: vk::SamplerAddressMode) -> Option<AddressMode> {
    match mode {
        vk::SamplerAddressMode::REPEAT => Some(AddressMode::Wrap),
        vk::SamplerAddressMode::MIRRORED_REPEAT => Some(AddressMode::Mirror),
        vk::SamplerAddressMode::CLAMP_TO_EDGE => Some(AddressMode::Clamp),
        vk::SamplerAddressMode::CLAMP_TO_BORDER => Some(AddressMode::Border),
        vk::SamplerAddressMode::MIRROR_CLAMP_TO_EDGE => Some(AddressMode::MirrorOnce),
        _ => None,
    }
}

/// Convert a comparison function to a Vulkan compare op.
pub fn convert_compare_op(op: CompareOp) -> vk::CompareOp {
    match op {
        CompareOp::Never => vk::CompareOp::NEVER,
        CompareOp::Less => vk::CompareOp::LESS,
        CompareOp::Equal => vk::CompareOp::EQUAL,
        CompareOp::LessEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareOp::Greater => vk::CompareOp::GREATER,
        CompareOp::NotEqual => vk::CompareOp::NOT_EQUAL,
        CompareOp::GreaterEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareOp::Always => vk::CompareOp::ALWAYS,
    }
}

/// Convert a Vulkan compare op to a comparison function.
pub fn convert_compare_op_from_vk(op: vk::CompareOp) -> Option<CompareOp> {
    match op {
        vk::CompareOp::NEVER => Some(CompareOp::Never),
        vk::CompareOp::LESS => Some(CompareOp::Less),
        vk::CompareOp::EQUAL => Some(CompareOp::Equal),
        vk::CompareOp::LESS_OR_EQUAL => Some(CompareOp::LessEqual),
        vk::CompareOp::GREATER => Some(CompareOp::Greater),
        vk::CompareOp::NOT_EQUAL => Some(CompareOp::NotEqual),
        vk::CompareOp::GREATER_OR_EQUAL => Some(CompareOp::GreaterEqual),
        vk::CompareOp::ALWAYS => Some(CompareOp::Always),
        _ => None,
    }
}

fn convert_border_color(color: [f32; 4]) -> vk::BorderColor {
    if color == [0.0, 0.0, 0.0, 1.0] {
        vk::BorderColor::FLOAT_OPAQUE_BLACK
    } else if color == [1.0; 4] {
        vk::BorderColor::FLOAT_OPAQUE_WHITE
    } else {
        vk::BorderColor::FLOAT_TRANSPARENT_BLACK
    }
}

fn convert_border_color_from_vk(color: vk::BorderColor) -> [f32; 4] {
    match color {
        vk::BorderColor::FLOAT_OPAQUE_BLACK | vk::BorderColor::INT_OPAQUE_BLACK => {
            [0.0, 0.0, 0.0, 1.0]
        }
        vk::BorderColor::FLOAT_OPAQUE_WHITE | vk::BorderColor::INT_OPAQUE_WHITE => [1.0; 4],
        _ => [0.0; 4],
    }
}

/// Convert a sampler description to a Vulkan create info.
pub fn convert_sampler_desc(desc: &SamplerDesc) -> vk::SamplerCreateInfo<'static> {
    let mipmap_mode = match desc.mip_filter {
        FilterType::Point => vk::SamplerMipmapMode::NEAREST,
        FilterType::Linear => vk::SamplerMipmapMode::LINEAR,
    };

    vk::SamplerCreateInfo::default()
        .mag_filter(convert_filter(desc.mag_filter))
        .min_filter(convert_filter(desc.min_filter))
        .mipmap_mode(mipmap_mode)
        .address_mode_u(convert_address_mode(desc.address_u))
        .address_mode_v(convert_address_mode(desc.address_v))
        .address_mode_w(convert_address_mode(desc.address_w))
        .mip_lod_bias(desc.mip_lod_bias)
        .anisotropy_enable(desc.anisotropic)
        .max_anisotropy(desc.max_anisotropy)
        .compare_enable(desc.compare.is_some())
        .compare_op(convert_compare_op(desc.compare.unwrap_or(CompareOp::Always)))
        .min_lod(desc.min_lod)
        .max_lod(desc.max_lod)
        .border_color(convert_border_color(desc.border_color))
        .unnormalized_coordinates(false)
}

/// Convert a Vulkan sampler create info to a sampler description.
pub fn convert_sampler_info(info: &vk::SamplerCreateInfo<'_>) -> SamplerDesc {
    let mip_filter = if info.mipmap_mode == vk::SamplerMipmapMode::LINEAR {
        FilterType::Linear
    } else {
        FilterType::Point
    };

    SamplerDesc {
        min_filter: convert_filter_from_vk(info.min_filter).unwrap_or_default(),
        mag_filter: convert_filter_from_vk(info.mag_filter).unwrap_or_default(),
        mip_filter,
        anisotropic: info.anisotropy_enable != vk::FALSE,
        compare: if info.compare_enable != vk::FALSE {
            convert_compare_op_from_vk(info.compare_op)
        } else {
            None
        },
        address_u: convert_address_mode_from_vk(info.address_mode_u).unwrap_or_default(),
        address_v: convert_address_mode_from_vk(info.address_mode_v).unwrap_or_default(),
        address_w: convert_address_mode_from_vk(info.address_mode_w).unwrap_or_default(),
        mip_lod_bias: info.mip_lod_bias,
        max_anisotropy: info.max_anisotropy,
        border_color: convert_border_color_from_vk(info.border_color),
        min_lod: info.min_lod,
        max_lod: info.max_lod,
    }
}

// ---------------------------------------------------------------------------
// Pipeline state
// ---------------------------------------------------------------------------

macro_rules! enum_pairs {
    (
        $(#[$meta:meta])*
        $to:ident, $from:ident, $layer:ident, vk::$native:ident {
            $($variant:ident <=> $vk:ident,)*
        }
    ) => {
        $(#[$meta])*
        pub fn $to(value: $layer) -> vk::$native {
            match value {
                $($layer::$variant => vk::$native::$vk,)*
            }
        }

        /// Inverse of the matching `convert_*` function; `None` if unrepresentable.
        pub fn $from(value: vk::$native) -> Option<$layer> {
            match value {
                $(vk::$native::$vk => Some($layer::$variant),)*
                _ => None,
            }
        }
    };
}

enum_pairs! {
    /// Convert a blend factor to a Vulkan blend factor.
    convert_blend_factor, convert_blend_factor_from_vk, BlendFactor, vk::BlendFactor {
        Zero <=> ZERO,
        One <=> ONE,
        SourceColor <=> SRC_COLOR,
        OneMinusSourceColor <=> ONE_MINUS_SRC_COLOR,
        DestColor <=> DST_COLOR,
        OneMinusDestColor <=> ONE_MINUS_DST_COLOR,
        SourceAlpha <=> SRC_ALPHA,
        OneMinusSourceAlpha <=> ONE_MINUS_SRC_ALPHA,
        DestAlpha <=> DST_ALPHA,
        OneMinusDestAlpha <=> ONE_MINUS_DST_ALPHA,
        ConstantColor <=> CONSTANT_COLOR,
        OneMinusConstantColor <=> ONE_MINUS_CONSTANT_COLOR,
        ConstantAlpha <=> CONSTANT_ALPHA,
        OneMinusConstantAlpha <=> ONE_MINUS_CONSTANT_ALPHA,
        SourceAlphaSaturate <=> SRC_ALPHA_SATURATE,
        Source1Color <=> SRC1_COLOR,
        OneMinusSource1Color <=> ONE_MINUS_SRC1_COLOR,
        Source1Alpha <=> SRC1_ALPHA,
        OneMinusSource1Alpha <=> ONE_MINUS_SRC1_ALPHA,
    }
}

enum_pairs! {
    /// Convert a blend operation to a Vulkan blend op.
    convert_blend_op, convert_blend_op_from_vk, BlendOp, vk::BlendOp {
        Add <=> ADD,
        Subtract <=> SUBTRACT,
        ReverseSubtract <=> REVERSE_SUBTRACT,
        Min <=> MIN,
        Max <=> MAX,
    }
}

enum_pairs! {
    /// Convert a logic operation to a Vulkan logic op.
    convert_logic_op, convert_logic_op_from_vk, LogicOp, vk::LogicOp {
        Clear <=> CLEAR,
        And <=> AND,
        AndReverse <=> AND_REVERSE,
        Copy <=> COPY,
        AndInverted <=> AND_INVERTED,
        NoOp <=> NO_OP,
        Xor <=> XOR,
        Or <=> OR,
        Nor <=> NOR,
        Equivalent <=> EQUIVALENT,
        Invert <=> INVERT,
        OrReverse <=> OR_REVERSE,
        CopyInverted <=> COPY_INVERTED,
        OrInverted <=> OR_INVERTED,
        Nand <=> NAND,
        Set <=> SET,
    }
}

enum_pairs! {
    /// Convert a stencil operation to a Vulkan stencil op.
    convert_stencil_op, convert_stencil_op_from_vk, StencilOp, vk::StencilOp {
        Keep <=> KEEP,
        Zero <=> ZERO,
        Replace <=> REPLACE,
        IncrementSaturate <=> INCREMENT_AND_CLAMP,
        DecrementSaturate <=> DECREMENT_AND_CLAMP,
        Invert <=> INVERT,
        Increment <=> INCREMENT_AND_WRAP,
        Decrement <=> DECREMENT_AND_WRAP,
    }
}

enum_pairs! {
    /// Convert a fill mode to a Vulkan polygon mode.
    convert_fill_mode, convert_fill_mode_from_vk, FillMode, vk::PolygonMode {
        Solid <=> FILL,
        Wireframe <=> LINE,
        Point <=> POINT,
    }
}

enum_pairs! {
    /// Convert a cull mode to Vulkan cull mode flags.
    convert_cull_mode, convert_cull_mode_from_vk, CullMode, vk::CullModeFlags {
        None <=> NONE,
        Front <=> FRONT,
        Back <=> BACK,
        FrontAndBack <=> FRONT_AND_BACK,
    }
}

enum_pairs! {
    /// Convert a dynamic state to a Vulkan dynamic state.
    convert_dynamic_state, convert_dynamic_state_from_vk, DynamicState, vk::DynamicState {
        Viewport <=> VIEWPORT,
        Scissor <=> SCISSOR,
        LineWidth <=> LINE_WIDTH,
        DepthBias <=> DEPTH_BIAS,
        BlendConstant <=> BLEND_CONSTANTS,
        DepthBounds <=> DEPTH_BOUNDS,
        StencilReadMask <=> STENCIL_COMPARE_MASK,
        StencilWriteMask <=> STENCIL_WRITE_MASK,
        StencilReferenceValue <=> STENCIL_REFERENCE,
        CullMode <=> CULL_MODE,
        FrontCounterClockwise <=> FRONT_FACE,
        PrimitiveTopology <=> PRIMITIVE_TOPOLOGY,
        DepthEnable <=> DEPTH_TEST_ENABLE,
        DepthWriteMask <=> DEPTH_WRITE_ENABLE,
        DepthFunc <=> DEPTH_COMPARE_OP,
        StencilEnable <=> STENCIL_TEST_ENABLE,
        StencilOp <=> STENCIL_OP,
    }
}

enum_pairs! {
    /// Convert a present mode to a Vulkan present mode.
    convert_present_mode, convert_present_mode_from_vk, PresentMode, vk::PresentModeKHR {
        Immediate <=> IMMEDIATE,
        Mailbox <=> MAILBOX,
        Fifo <=> FIFO,
        FifoRelaxed <=> FIFO_RELAXED,
    }
}

/// Convert a primitive topology to a Vulkan topology and patch control point count.
pub fn convert_primitive_topology(topology: PrimitiveTopology) -> (vk::PrimitiveTopology, u32) {
    match topology {
        PrimitiveTopology::PointList => (vk::PrimitiveTopology::POINT_LIST, 0),
        PrimitiveTopology::LineList => (vk::PrimitiveTopology::LINE_LIST, 0),
        PrimitiveTopology::LineStrip => (vk::PrimitiveTopology::LINE_STRIP, 0),
        PrimitiveTopology::TriangleList => (vk::PrimitiveTopology::TRIANGLE_LIST, 0),
        PrimitiveTopology::TriangleStrip => (vk::PrimitiveTopology::TRIANGLE_STRIP, 0),
        PrimitiveTopology::TriangleFan => (vk::PrimitiveTopology::TRIANGLE_FAN, 0),
        PrimitiveTopology::LineListAdj => (vk::PrimitiveTopology::LINE_LIST_WITH_ADJACENCY, 0),
        PrimitiveTopology::LineStripAdj => (vk::PrimitiveTopology::LINE_STRIP_WITH_ADJACENCY, 0),
        PrimitiveTopology::TriangleListAdj => {
            (vk::PrimitiveTopology::TRIANGLE_LIST_WITH_ADJACENCY, 0)
        }
        PrimitiveTopology::TriangleStripAdj => {
            (vk::PrimitiveTopology::TRIANGLE_STRIP_WITH_ADJACENCY, 0)
        }
        PrimitiveTopology::PatchList(control_points) => {
            debug_assert!(
                (1..=32).contains(&control_points),
                "patch lists take 1 to 32 control points, got {control_points}"
            );
            (vk::PrimitiveTopology::PATCH_LIST, control_points)
        }
    }
}

/// Convert a Vulkan topology (and patch control points) to a primitive topology.
pub fn convert_primitive_topology_from_vk(
    topology: vk::PrimitiveTopology,
    patch_control_points: u32,
) -> Option<PrimitiveTopology> {
    Some(match topology {
        vk::PrimitiveTopology::POINT_LIST => PrimitiveTopology::PointList,
        vk::PrimitiveTopology::LINE_LIST => PrimitiveTopology::LineList,
        vk::PrimitiveTopology::LINE_STRIP => PrimitiveTopology::LineStrip,
        vk::PrimitiveTopology::TRIANGLE_LIST => PrimitiveTopology::TriangleList,
        vk::PrimitiveTopology::TRIANGLE_STRIP => PrimitiveTopology::TriangleStrip,
        vk::PrimitiveTopology::TRIANGLE_FAN => PrimitiveTopology::TriangleFan,
        vk::PrimitiveTopology::LINE_LIST_WITH_ADJACENCY => PrimitiveTopology::LineListAdj,
        vk::PrimitiveTopology::LINE_STRIP_WITH_ADJACENCY => PrimitiveTopology::LineStripAdj,
        vk::PrimitiveTopology::TRIANGLE_LIST_WITH_ADJACENCY => PrimitiveTopology::TriangleListAdj,
        vk::PrimitiveTopology::TRIANGLE_STRIP_WITH_ADJACENCY => {
            PrimitiveTopology::TriangleStripAdj
        }
        vk::PrimitiveTopology::PATCH_LIST if (1..=32).contains(&patch_control_points) => {
            PrimitiveTopology::PatchList(patch_control_points)
        }
        _ => return None,
    })
}

/// Convert shader stages to Vulkan shader stage flags.
pub fn convert_shader_stages(stages: ShaderStage) -> vk::ShaderStageFlags {
    let mut result = vk::ShaderStageFlags::empty();
    if stages.contains(ShaderStage::VERTEX) {
        result |= vk::ShaderStageFlags::VERTEX;
    }
    if stages.contains(ShaderStage::HULL) {
        result |= vk::ShaderStageFlags::TESSELLATION_CONTROL;
    }
    if stages.contains(ShaderStage::DOMAIN) {
        result |= vk::ShaderStageFlags::TESSELLATION_EVALUATION;
    }
    if stages.contains(ShaderStage::GEOMETRY) {
        result |= vk::ShaderStageFlags::GEOMETRY;
    }
    if stages.contains(ShaderStage::PIXEL) {
        result |= vk::ShaderStageFlags::FRAGMENT;
    }
    if stages.contains(ShaderStage::COMPUTE) {
        result |= vk::ShaderStageFlags::COMPUTE;
    }
    result
}

/// Convert Vulkan shader stage flags to shader stages.
pub fn convert_shader_stages_from_vk(stages: vk::ShaderStageFlags) -> ShaderStage {
    let mut result = ShaderStage::empty();
    if stages.contains(vk::ShaderStageFlags::VERTEX) {
        result |= ShaderStage::VERTEX;
    }
    if stages.contains(vk::ShaderStageFlags::TESSELLATION_CONTROL) {
        result |= ShaderStage::HULL;
    }
    if stages.contains(vk::ShaderStageFlags::TESSELLATION_EVALUATION) {
        result |= ShaderStage::DOMAIN;
    }
    if stages.contains(vk::ShaderStageFlags::GEOMETRY) {
        result |= ShaderStage::GEOMETRY;
    }
    if stages.contains(vk::ShaderStageFlags::FRAGMENT) {
        result |= ShaderStage::PIXEL;
    }
    if stages.contains(vk::ShaderStageFlags::COMPUTE) {
        result |= ShaderStage::COMPUTE;
    }
    result
}

/// Convert a descriptor type to a Vulkan descriptor type.
pub fn convert_descriptor_type(ty: DescriptorType) -> vk::DescriptorType {
    match ty {
        DescriptorType::Sampler => vk::DescriptorType::SAMPLER,
        DescriptorType::SamplerWithResourceView => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        DescriptorType::ShaderResourceView => vk::DescriptorType::SAMPLED_IMAGE,
        DescriptorType::UnorderedAccessView => vk::DescriptorType::STORAGE_IMAGE,
        DescriptorType::BufferShaderResourceView => vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
        DescriptorType::BufferUnorderedAccessView => vk::DescriptorType::STORAGE_TEXEL_BUFFER,
        DescriptorType::ConstantBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        DescriptorType::ShaderStorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
    }
}

/// Convert a Vulkan descriptor type to a descriptor type.
pub fn convert_descriptor_type_from_vk(ty: vk::DescriptorType) -> Option<DescriptorType> {
    match ty {
        vk::DescriptorType::SAMPLER => Some(DescriptorType::Sampler),
        vk::DescriptorType::COMBINED_IMAGE_SAMPLER => Some(DescriptorType::SamplerWithResourceView),
        vk::DescriptorType::SAMPLED_IMAGE => Some(DescriptorType::ShaderResourceView),
        vk::DescriptorType::STORAGE_IMAGE => Some(DescriptorType::UnorderedAccessView),
        vk::DescriptorType::UNIFORM_TEXEL_BUFFER => Some(DescriptorType::BufferShaderResourceView),
        vk::DescriptorType::STORAGE_TEXEL_BUFFER => Some(DescriptorType::BufferUnorderedAccessView),
        vk::DescriptorType::UNIFORM_BUFFER | vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC => {
            Some(DescriptorType::ConstantBuffer)
        }
        vk::DescriptorType::STORAGE_BUFFER | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC => {
            Some(DescriptorType::ShaderStorageBuffer)
        }
        _ => None,
    }
}

/// Layout a descriptor of this type's image must be in when accessed.
pub fn descriptor_image_layout(ty: DescriptorType) -> vk::ImageLayout {
    match ty {
        DescriptorType::UnorderedAccessView => vk::ImageLayout::GENERAL,
        _ => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    }
}

/// Convert a query type to a Vulkan query type.
pub fn convert_query_type(ty: QueryType) -> vk::QueryType {
    match ty {
        QueryType::Occlusion | QueryType::BinaryOcclusion => vk::QueryType::OCCLUSION,
        QueryType::Timestamp => vk::QueryType::TIMESTAMP,
        QueryType::PipelineStatistics => vk::QueryType::PIPELINE_STATISTICS,
    }
}

/// Control flags used when beginning a query of this type.
pub fn convert_query_control(ty: QueryType) -> vk::QueryControlFlags {
    match ty {
        QueryType::Occlusion => vk::QueryControlFlags::PRECISE,
        _ => vk::QueryControlFlags::empty(),
    }
}

/// Statistics collected by pipeline statistics queries.
pub fn pipeline_statistics_flags() -> vk::QueryPipelineStatisticFlags {
    vk::QueryPipelineStatisticFlags::INPUT_ASSEMBLY_VERTICES
        | vk::QueryPipelineStatisticFlags::INPUT_ASSEMBLY_PRIMITIVES
        | vk::QueryPipelineStatisticFlags::VERTEX_SHADER_INVOCATIONS
        | vk::QueryPipelineStatisticFlags::CLIPPING_INVOCATIONS
        | vk::QueryPipelineStatisticFlags::CLIPPING_PRIMITIVES
        | vk::QueryPipelineStatisticFlags::FRAGMENT_SHADER_INVOCATIONS
        | vk::QueryPipelineStatisticFlags::COMPUTE_SHADER_INVOCATIONS
}

/// Convert a load operation to a Vulkan attachment load op.
pub fn convert_load_op(op: LoadOp) -> vk::AttachmentLoadOp {
    match op {
        LoadOp::Load => vk::AttachmentLoadOp::LOAD,
        LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
        LoadOp::Discard => vk::AttachmentLoadOp::DONT_CARE,
    }
}

/// Convert a Vulkan attachment load op to a load operation.
pub fn convert_load_op_from_vk(op: vk::AttachmentLoadOp) -> LoadOp {
    match op {
        vk::AttachmentLoadOp::LOAD => LoadOp::Load,
        vk::AttachmentLoadOp::CLEAR => LoadOp::Clear,
        _ => LoadOp::Discard,
    }
}

/// Convert a store operation to a Vulkan attachment store op.
pub fn convert_store_op(op: StoreOp) -> vk::AttachmentStoreOp {
    match op {
        StoreOp::Store => vk::AttachmentStoreOp::STORE,
        StoreOp::Discard => vk::AttachmentStoreOp::DONT_CARE,
    }
}

/// Convert a Vulkan attachment store op to a store operation.
pub fn convert_store_op_from_vk(op: vk::AttachmentStoreOp) -> StoreOp {
    match op {
        vk::AttachmentStoreOp::STORE => StoreOp::Store,
        _ => StoreOp::Discard,
    }
}

/// Convert a render pass attachment to a Vulkan attachment description.
pub fn convert_attachment_desc(desc: &AttachmentDesc) -> vk::AttachmentDescription {
    vk::AttachmentDescription::default()
        .format(convert_format(desc.format))
        .samples(vk::SampleCountFlags::from_raw(u32::from(desc.samples.max(1))))
        .load_op(convert_load_op(desc.load_op))
        .store_op(convert_store_op(desc.store_op))
        .stencil_load_op(convert_load_op(desc.stencil_load_op))
        .stencil_store_op(convert_store_op(desc.stencil_store_op))
        .initial_layout(convert_usage_to_layout(desc.initial_usage))
        .final_layout(convert_usage_to_layout(desc.final_usage))
}

/// Convert the fields shared by both Vulkan attachment description versions.
#[allow(clippy::too_many_arguments)]
pub fn convert_attachment_from_vk(
    format: vk::Format,
    samples: vk::SampleCountFlags,
    load_op: vk::AttachmentLoadOp,
    store_op: vk::AttachmentStoreOp,
    stencil_load_op: vk::AttachmentLoadOp,
    stencil_store_op: vk::AttachmentStoreOp,
    initial_layout: vk::ImageLayout,
    final_layout: vk::ImageLayout,
) -> AttachmentDesc {
    AttachmentDesc {
        format: convert_format_from_vk(format),
        samples: u16::try_from(samples.as_raw()).unwrap_or(1),
        load_op: convert_load_op_from_vk(load_op),
        store_op: convert_store_op_from_vk(store_op),
        stencil_load_op: convert_load_op_from_vk(stencil_load_op),
        stencil_store_op: convert_store_op_from_vk(stencil_store_op),
        initial_usage: convert_layout_to_usage(initial_layout),
        final_usage: convert_layout_to_usage(final_layout),
    }
}

/// Describe a swap-chain create info.
pub fn convert_swapchain_info(info: &vk::SwapchainCreateInfoKHR<'_>) -> SwapchainDesc {
    SwapchainDesc {
        width: info.image_extent.width,
        height: info.image_extent.height,
        format: convert_format_from_vk(info.image_format),
        back_buffer_count: info.min_image_count,
        present_mode: convert_present_mode_from_vk(info.present_mode).unwrap_or_default(),
        usage: convert_image_usage_to_usage(info.image_usage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_round_trip_is_stable() {
        for &format in Format::ALL {
            let native = convert_format(format);
            assert_eq!(
                convert_format(convert_format_from_vk(native)),
                native,
                "{format:?}"
            );
        }
    }

    #[test]
    fn test_typed_formats_are_exact() {
        for &format in Format::ALL {
            if format.is_typeless() || format == Format::Unknown {
                continue;
            }
            assert_eq!(convert_format_from_vk(convert_format(format)), format);
        }
    }

    #[test]
    fn test_typeless_formats_have_storage() {
        assert_eq!(convert_format(Format::R8G8B8A8Typeless), vk::Format::R8G8B8A8_UNORM);
        assert_eq!(convert_format(Format::R32Typeless), vk::Format::R32_SFLOAT);
        assert_eq!(convert_format(Format::Unknown), vk::Format::UNDEFINED);
        for &format in Format::ALL {
            if format.is_typeless() {
                assert_ne!(convert_format(format), vk::Format::UNDEFINED, "{format:?}");
            }
        }
    }

    #[test]
    fn test_packed_channel_order() {
        assert_eq!(
            convert_format(Format::R10G10B10A2Unorm),
            vk::Format::A2B10G10R10_UNORM_PACK32
        );
        assert_eq!(
            convert_format(Format::B10G10R10A2Unorm),
            vk::Format::A2R10G10B10_UNORM_PACK32
        );
    }

    #[test]
    fn test_unknown_native_format() {
        assert_eq!(convert_format_from_vk(vk::Format::ASTC_4X4_UNORM_BLOCK), Format::Unknown);
    }

    const LAYOUTS: &[vk::ImageLayout] = &[
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::GENERAL,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::PRESENT_SRC_KHR,
    ];

    #[test]
    fn test_layout_usage_round_trip_is_at_least_as_permissive() {
        for &layout in LAYOUTS {
            let back = convert_usage_to_layout(convert_layout_to_usage(layout));
            assert!(
                back == layout || back == vk::ImageLayout::GENERAL,
                "{layout:?} came back as {back:?}"
            );
        }
    }

    #[test]
    fn test_usage_to_layout() {
        let cases = [
            (ResourceUsage::UNDEFINED, vk::ImageLayout::UNDEFINED),
            (ResourceUsage::RENDER_TARGET, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
            (ResourceUsage::DEPTH_STENCIL_WRITE, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
            (ResourceUsage::DEPTH_STENCIL, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
            (ResourceUsage::DEPTH_STENCIL_READ, vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL),
            (
                ResourceUsage::DEPTH_STENCIL_READ | ResourceUsage::SHADER_RESOURCE_PIXEL,
                vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            ),
            (ResourceUsage::SHADER_RESOURCE_PIXEL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            (ResourceUsage::SHADER_RESOURCE, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            (ResourceUsage::COPY_SOURCE, vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
            (ResourceUsage::RESOLVE_DEST, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            (ResourceUsage::PRESENT, vk::ImageLayout::PRESENT_SRC_KHR),
            (ResourceUsage::UNORDERED_ACCESS, vk::ImageLayout::GENERAL),
            (
                ResourceUsage::RENDER_TARGET | ResourceUsage::SHADER_RESOURCE,
                vk::ImageLayout::GENERAL,
            ),
        ];
        for (usage, layout) in cases {
            assert_eq!(convert_usage_to_layout(usage), layout, "{usage:?}");
        }
    }

    #[test]
    fn test_stage_masks_are_never_empty() {
        let mut usages = vec![ResourceUsage::UNDEFINED, ResourceUsage::GENERAL];
        usages.extend(ResourceUsage::all().iter());
        for usage in usages {
            assert!(!convert_usage_to_pipeline_stage(usage, true).is_empty(), "{usage:?}");
            assert!(!convert_usage_to_pipeline_stage(usage, false).is_empty(), "{usage:?}");
        }
    }

    #[test]
    fn test_undefined_and_present_stages() {
        for usage in [ResourceUsage::UNDEFINED, ResourceUsage::PRESENT] {
            assert_eq!(
                convert_usage_to_pipeline_stage(usage, true),
                vk::PipelineStageFlags::TOP_OF_PIPE
            );
            assert_eq!(
                convert_usage_to_pipeline_stage(usage, false),
                vk::PipelineStageFlags::BOTTOM_OF_PIPE
            );
            assert!(convert_usage_to_access(usage).is_empty());
        }
    }

    #[test]
    fn test_image_info_round_trip() {
        let infos = [
            ImageInfo {
                flags: vk::ImageCreateFlags::empty(),
                image_type: vk::ImageType::TYPE_2D,
                format: vk::Format::R8G8B8A8_UNORM,
                extent: vk::Extent3D { width: 256, height: 256, depth: 1 },
                mip_levels: 9,
                array_layers: 1,
                samples: vk::SampleCountFlags::TYPE_1,
                tiling: vk::ImageTiling::OPTIMAL,
                usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            },
            ImageInfo {
                flags: vk::ImageCreateFlags::CUBE_COMPATIBLE | vk::ImageCreateFlags::MUTABLE_FORMAT,
                image_type: vk::ImageType::TYPE_2D,
                format: vk::Format::B8G8R8A8_SRGB,
                extent: vk::Extent3D { width: 64, height: 64, depth: 1 },
                mip_levels: 1,
                array_layers: 6,
                samples: vk::SampleCountFlags::TYPE_1,
                tiling: vk::ImageTiling::OPTIMAL,
                usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::STORAGE,
            },
            ImageInfo {
                flags: vk::ImageCreateFlags::empty(),
                image_type: vk::ImageType::TYPE_2D,
                format: vk::Format::D24_UNORM_S8_UINT,
                extent: vk::Extent3D { width: 1920, height: 1080, depth: 1 },
                mip_levels: 1,
                array_layers: 1,
                samples: vk::SampleCountFlags::TYPE_4,
                tiling: vk::ImageTiling::OPTIMAL,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
                    | vk::ImageUsageFlags::TRANSFER_SRC,
            },
            ImageInfo {
                flags: vk::ImageCreateFlags::empty(),
                image_type: vk::ImageType::TYPE_3D,
                format: vk::Format::R16G16B16A16_SFLOAT,
                extent: vk::Extent3D { width: 32, height: 32, depth: 16 },
                mip_levels: 1,
                array_layers: 1,
                samples: vk::SampleCountFlags::TYPE_1,
                tiling: vk::ImageTiling::OPTIMAL,
                usage: vk::ImageUsageFlags::SAMPLED,
            },
        ];

        for info in infos {
            let desc = convert_image_info(&info, MemoryHeap::Unknown);
            let texture = *desc.as_texture().unwrap();
            assert_eq!(convert_texture_desc(&desc, &texture), info);
        }
    }

    #[test]
    fn test_buffer_usage_round_trip_is_stable() {
        for usage in ResourceUsage::all().iter() {
            let native = convert_usage_to_buffer_usage(usage);
            assert_eq!(
                convert_usage_to_buffer_usage(convert_buffer_usage_to_usage(native)),
                native,
                "{usage:?}"
            );
        }
    }

    #[test]
    fn test_buffer_info_round_trip() {
        let info = BufferInfo {
            flags: vk::BufferCreateFlags::empty(),
            size: 65536,
            usage: vk::BufferUsageFlags::VERTEX_BUFFER
                | vk::BufferUsageFlags::INDEX_BUFFER
                | vk::BufferUsageFlags::TRANSFER_DST,
        };
        let desc = convert_buffer_info(&info, MemoryHeap::GpuOnly);
        assert_eq!(convert_buffer_desc(&desc, 65536), info);
    }

    #[test]
    fn test_typeless_textures_are_mutable() {
        let desc = ResourceDesc::texture_2d(
            16,
            16,
            1,
            1,
            Format::R8G8B8A8Typeless,
            MemoryHeap::GpuOnly,
            ResourceUsage::SHADER_RESOURCE,
        );
        let info = convert_texture_desc(&desc, desc.as_texture().unwrap());
        assert!(info.flags.contains(vk::ImageCreateFlags::MUTABLE_FORMAT));
        assert_eq!(info.tiling, vk::ImageTiling::OPTIMAL);
    }

    #[test]
    fn test_shader_view_of_depth_stencil_sees_depth_only() {
        let desc = ResourceViewDesc::texture_2d(Format::D24UnormS8Uint, 0, 1);
        let range = convert_view_range(
            &desc,
            vk::Format::D24_UNORM_S8_UINT,
            ResourceUsage::SHADER_RESOURCE,
        );
        assert_eq!(range.aspect_mask, vk::ImageAspectFlags::DEPTH);

        let range =
            convert_view_range(&desc, vk::Format::D24_UNORM_S8_UINT, ResourceUsage::DEPTH_STENCIL);
        assert_eq!(
            range.aspect_mask,
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }

    #[test]
    fn test_sampler_round_trip() {
        let desc = SamplerDesc::point()
            .with_address_mode(AddressMode::Border)
            .with_compare(CompareOp::GreaterEqual);
        let info = convert_sampler_desc(&desc);
        assert_eq!(convert_sampler_info(&info), desc);
    }

    #[test]
    fn test_enum_pairs_invert() {
        assert_eq!(
            convert_blend_factor_from_vk(convert_blend_factor(BlendFactor::OneMinusSource1Alpha)),
            Some(BlendFactor::OneMinusSource1Alpha)
        );
        assert_eq!(
            convert_stencil_op_from_vk(convert_stencil_op(StencilOp::IncrementSaturate)),
            Some(StencilOp::IncrementSaturate)
        );
        assert_eq!(convert_dynamic_state_from_vk(vk::DynamicState::VIEWPORT_W_SCALING_NV), None);
        assert_eq!(convert_blend_op_from_vk(vk::BlendOp::MULTIPLY_EXT), None);

        for mode in [
            PresentMode::Immediate,
            PresentMode::Mailbox,
            PresentMode::Fifo,
            PresentMode::FifoRelaxed,
        ] {
            assert_eq!(convert_present_mode_from_vk(convert_present_mode(mode)), Some(mode));
        }
        assert_eq!(
            convert_present_mode_from_vk(vk::PresentModeKHR::SHARED_DEMAND_REFRESH),
            None
        );
        for mode in [CullMode::None, CullMode::Front, CullMode::Back, CullMode::FrontAndBack] {
            assert_eq!(convert_cull_mode_from_vk(convert_cull_mode(mode)), Some(mode));
        }
        assert_eq!(
            convert_fill_mode_from_vk(convert_fill_mode(FillMode::Wireframe)),
            Some(FillMode::Wireframe)
        );
    }

    #[test]
    fn test_topology_round_trip() {
        for topology in [
            PrimitiveTopology::TriangleStrip,
            PrimitiveTopology::LineListAdj,
            PrimitiveTopology::PatchList(3),
        ] {
            let (native, points) = convert_primitive_topology(topology);
            assert_eq!(convert_primitive_topology_from_vk(native, points), Some(topology));
        }
        assert_eq!(
            convert_primitive_topology_from_vk(vk::PrimitiveTopology::PATCH_LIST, 0),
            None
        );
    }

    #[test]
    fn test_descriptor_types_round_trip() {
        for ty in [
            DescriptorType::Sampler,
            DescriptorType::SamplerWithResourceView,
            DescriptorType::ShaderResourceView,
            DescriptorType::UnorderedAccessView,
            DescriptorType::BufferShaderResourceView,
            DescriptorType::BufferUnorderedAccessView,
            DescriptorType::ConstantBuffer,
            DescriptorType::ShaderStorageBuffer,
        ] {
            assert_eq!(convert_descriptor_type_from_vk(convert_descriptor_type(ty)), Some(ty));
        }
    }

    #[test]
    fn test_subresource_index_split() {
        assert_eq!(subresource_to_level_layer(0, 4), (0, 0));
        assert_eq!(subresource_to_level_layer(5, 4), (1, 1));
        assert_eq!(subresource_to_level_layer(3, 0), (0, 3));
    }
}
