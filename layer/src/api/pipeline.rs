//! Pipeline, descriptor, render pass and query descriptions.

use bitflags::bitflags;

use super::format::Format;
use super::handles::{
    DescriptorSetHandle, DescriptorSetLayoutHandle, RenderPassHandle, ResourceViewHandle,
    SamplerHandle,
};
use super::resource::{BufferRange, CompareOp, ResourceUsage};

bitflags! {
    /// Shader stages.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStage: u32 {
        const VERTEX = 1 << 0;
        const HULL = 1 << 1;
        const DOMAIN = 1 << 2;
        const GEOMETRY = 1 << 3;
        const PIXEL = 1 << 4;
        const COMPUTE = 1 << 5;

        const ALL_GRAPHICS = Self::VERTEX.bits()
            | Self::HULL.bits()
            | Self::DOMAIN.bits()
            | Self::GEOMETRY.bits()
            | Self::PIXEL.bits();
        const ALL = Self::ALL_GRAPHICS.bits() | Self::COMPUTE.bits();
    }
}

/// A compiled shader blob (SPIR-V for the Vulkan backend).
#[derive(Debug, Clone, Copy)]
pub struct ShaderDesc<'a> {
    pub code: &'a [u8],
    pub entry_point: &'a str,
}

impl<'a> ShaderDesc<'a> {
    /// Shader with the conventional `main` entry point.
    pub fn new(code: &'a [u8]) -> Self {
        Self {
            code,
            entry_point: "main",
        }
    }
}

/// Blend factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SourceColor,
    OneMinusSourceColor,
    DestColor,
    OneMinusDestColor,
    SourceAlpha,
    OneMinusSourceAlpha,
    DestAlpha,
    OneMinusDestAlpha,
    ConstantColor,
    OneMinusConstantColor,
    ConstantAlpha,
    OneMinusConstantAlpha,
    SourceAlphaSaturate,
    Source1Color,
    OneMinusSource1Color,
    Source1Alpha,
    OneMinusSource1Alpha,
}

/// Blend operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

/// Framebuffer logic operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicOp {
    Clear,
    And,
    AndReverse,
    Copy,
    AndInverted,
    NoOp,
    Xor,
    Or,
    Nor,
    Equivalent,
    Invert,
    OrReverse,
    CopyInverted,
    OrInverted,
    Nand,
    Set,
}

/// Stencil operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    IncrementSaturate,
    DecrementSaturate,
    Invert,
    Increment,
    Decrement,
}

/// Polygon fill mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FillMode {
    #[default]
    Solid,
    Wireframe,
    Point,
}

/// Face culling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
    FrontAndBack,
}

/// Primitive topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
    TriangleFan,
    LineListAdj,
    LineStripAdj,
    TriangleListAdj,
    TriangleStripAdj,
    /// Patch list with the given control point count (1 to 32).
    PatchList(u32),
}

/// Pipeline state that can be changed while recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DynamicState {
    Viewport,
    Scissor,
    LineWidth,
    DepthBias,
    BlendConstant,
    DepthBounds,
    StencilReadMask,
    StencilWriteMask,
    StencilReferenceValue,
    CullMode,
    FrontCounterClockwise,
    PrimitiveTopology,
    DepthEnable,
    DepthWriteMask,
    DepthFunc,
    StencilEnable,
    StencilOp,
}

/// Blend state of one render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetBlend {
    pub blend_enable: bool,
    pub source_color: BlendFactor,
    pub dest_color: BlendFactor,
    pub color_op: BlendOp,
    pub source_alpha: BlendFactor,
    pub dest_alpha: BlendFactor,
    pub alpha_op: BlendOp,
    /// RGBA bits 0 to 3.
    pub write_mask: u8,
}

impl Default for RenderTargetBlend {
    fn default() -> Self {
        Self {
            blend_enable: false,
            source_color: BlendFactor::One,
            dest_color: BlendFactor::Zero,
            color_op: BlendOp::Add,
            source_alpha: BlendFactor::One,
            dest_alpha: BlendFactor::Zero,
            alpha_op: BlendOp::Add,
            write_mask: 0xF,
        }
    }
}

/// Maximum number of simultaneously bound render targets.
pub const MAX_RENDER_TARGETS: usize = 8;

/// Output merger blend state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendDesc {
    pub alpha_to_coverage: bool,
    pub logic_op_enable: bool,
    pub logic_op: LogicOp,
    pub blend_constant: [f32; 4],
    pub render_targets: [RenderTargetBlend; MAX_RENDER_TARGETS],
}

impl Default for BlendDesc {
    fn default() -> Self {
        Self {
            alpha_to_coverage: false,
            logic_op_enable: false,
            logic_op: LogicOp::NoOp,
            blend_constant: [0.0; 4],
            render_targets: [RenderTargetBlend::default(); MAX_RENDER_TARGETS],
        }
    }
}

/// Rasterizer state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizerDesc {
    pub fill_mode: FillMode,
    pub cull_mode: CullMode,
    pub front_counter_clockwise: bool,
    pub depth_bias: f32,
    pub depth_bias_clamp: f32,
    pub slope_scaled_depth_bias: f32,
    pub depth_clip_enable: bool,
    pub conservative_rasterization: bool,
}

impl Default for RasterizerDesc {
    fn default() -> Self {
        Self {
            fill_mode: FillMode::Solid,
            cull_mode: CullMode::Back,
            front_counter_clockwise: false,
            depth_bias: 0.0,
            depth_bias_clamp: 0.0,
            slope_scaled_depth_bias: 0.0,
            depth_clip_enable: true,
            conservative_rasterization: false,
        }
    }
}

/// Stencil behavior for one face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilFaceDesc {
    pub fail_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub func: CompareOp,
}

impl Default for StencilFaceDesc {
    fn default() -> Self {
        Self {
            fail_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            pass_op: StencilOp::Keep,
            func: CompareOp::Always,
        }
    }
}

/// Depth and stencil test state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilDesc {
    pub depth_enable: bool,
    pub depth_write_mask: bool,
    pub depth_func: CompareOp,
    pub stencil_enable: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub stencil_reference: u8,
    pub front: StencilFaceDesc,
    pub back: StencilFaceDesc,
}

impl Default for DepthStencilDesc {
    fn default() -> Self {
        Self {
            depth_enable: false,
            depth_write_mask: false,
            depth_func: CompareOp::Less,
            stencil_enable: false,
            stencil_read_mask: 0xFF,
            stencil_write_mask: 0xFF,
            stencil_reference: 0,
            front: StencilFaceDesc::default(),
            back: StencilFaceDesc::default(),
        }
    }
}

/// One vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputElement {
    pub location: u32,
    pub format: Format,
    pub buffer_binding: u32,
    pub offset: u32,
    pub stride: u32,
    /// 0 for per-vertex data, otherwise per-instance.
    pub instance_step_rate: u32,
}

/// Full description of a graphics pipeline.
#[derive(Debug, Clone)]
pub struct GraphicsPipelineDesc<'a> {
    pub vertex_shader: Option<ShaderDesc<'a>>,
    pub hull_shader: Option<ShaderDesc<'a>>,
    pub domain_shader: Option<ShaderDesc<'a>>,
    pub geometry_shader: Option<ShaderDesc<'a>>,
    pub pixel_shader: Option<ShaderDesc<'a>>,
    pub input_layout: Vec<InputElement>,
    pub blend: BlendDesc,
    pub rasterizer: RasterizerDesc,
    pub depth_stencil: DepthStencilDesc,
    pub topology: PrimitiveTopology,
    pub sample_mask: u32,
    pub sample_count: u32,
    pub viewport_count: u32,
    pub dynamic_states: Vec<DynamicState>,
    /// Render pass the pipeline must be compatible with. Required.
    pub render_pass_template: RenderPassHandle,
    pub subpass: u32,
}

impl<'a> GraphicsPipelineDesc<'a> {
    /// A pipeline drawing with the given shaders into `render_pass_template`.
    pub fn new(
        vertex_shader: ShaderDesc<'a>,
        pixel_shader: ShaderDesc<'a>,
        render_pass_template: RenderPassHandle,
    ) -> Self {
        Self {
            vertex_shader: Some(vertex_shader),
            hull_shader: None,
            domain_shader: None,
            geometry_shader: None,
            pixel_shader: Some(pixel_shader),
            input_layout: Vec::new(),
            blend: BlendDesc::default(),
            rasterizer: RasterizerDesc::default(),
            depth_stencil: DepthStencilDesc::default(),
            topology: PrimitiveTopology::TriangleList,
            sample_mask: u32::MAX,
            sample_count: 1,
            viewport_count: 1,
            dynamic_states: vec![DynamicState::Viewport, DynamicState::Scissor],
            render_pass_template,
            subpass: 0,
        }
    }
}

/// Pipeline to create.
#[derive(Debug, Clone)]
pub enum PipelineDesc<'a> {
    Compute(ShaderDesc<'a>),
    Graphics(GraphicsPipelineDesc<'a>),
}

/// Descriptor kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    Sampler,
    SamplerWithResourceView,
    ShaderResourceView,
    UnorderedAccessView,
    BufferShaderResourceView,
    BufferUnorderedAccessView,
    ConstantBuffer,
    ShaderStorageBuffer,
}

/// A contiguous range of bindings in a descriptor set layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorRange {
    pub binding: u32,
    pub array_size: u32,
    pub ty: DescriptorType,
    pub visibility: ShaderStage,
}

/// A range of 32-bit push constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstantRange {
    /// Offset in 32-bit values.
    pub offset: u32,
    /// Size in 32-bit values.
    pub count: u32,
    pub visibility: ShaderStage,
}

/// One parameter of a pipeline layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PipelineLayoutParam {
    PushConstants(ConstantRange),
    /// Descriptors written directly into the command stream.
    PushDescriptors(Vec<DescriptorRange>),
    DescriptorSet(DescriptorSetLayoutHandle),
}

/// Descriptor payload of an update.
#[derive(Debug, Clone, Copy)]
pub enum Descriptors<'a> {
    Samplers(&'a [SamplerHandle]),
    SamplersWithViews(&'a [(SamplerHandle, ResourceViewHandle)]),
    /// Image views, or buffer views for the texel buffer types.
    Views(&'a [ResourceViewHandle]),
    Buffers(&'a [BufferRange]),
}

impl Descriptors<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::Samplers(items) => items.len(),
            Self::SamplersWithViews(items) => items.len(),
            Self::Views(items) => items.len(),
            Self::Buffers(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Write descriptors into a set (or into the command stream for push descriptors).
#[derive(Debug, Clone, Copy)]
pub struct DescriptorSetUpdate<'a> {
    /// Ignored for push descriptors.
    pub set: DescriptorSetHandle,
    pub binding: u32,
    pub array_offset: u32,
    pub ty: DescriptorType,
    pub descriptors: Descriptors<'a>,
}

/// Copy descriptors between sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorSetCopy {
    pub source_set: DescriptorSetHandle,
    pub source_binding: u32,
    pub source_array_offset: u32,
    pub dest_set: DescriptorSetHandle,
    pub dest_binding: u32,
    pub dest_array_offset: u32,
    pub count: u32,
}

/// What happens to attachment contents at the start of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadOp {
    #[default]
    Load,
    Clear,
    Discard,
}

/// What happens to attachment contents at the end of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StoreOp {
    #[default]
    Store,
    Discard,
}

/// One render pass attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentDesc {
    pub format: Format,
    pub samples: u16,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub stencil_load_op: LoadOp,
    pub stencil_store_op: StoreOp,
    /// Usage the attachment is in when the pass begins.
    pub initial_usage: ResourceUsage,
    /// Usage the attachment is left in when the pass ends.
    pub final_usage: ResourceUsage,
}

impl AttachmentDesc {
    /// Color attachment that stays a render target across the pass.
    pub fn color(format: Format, load_op: LoadOp) -> Self {
        Self {
            format,
            samples: 1,
            load_op,
            store_op: StoreOp::Store,
            stencil_load_op: LoadOp::Discard,
            stencil_store_op: StoreOp::Discard,
            initial_usage: ResourceUsage::RENDER_TARGET,
            final_usage: ResourceUsage::RENDER_TARGET,
        }
    }

    /// Depth-stencil attachment that stays writable across the pass.
    pub fn depth_stencil(format: Format, load_op: LoadOp) -> Self {
        Self {
            format,
            samples: 1,
            load_op,
            store_op: StoreOp::Store,
            stencil_load_op: load_op,
            stencil_store_op: StoreOp::Store,
            initial_usage: ResourceUsage::DEPTH_STENCIL_WRITE,
            final_usage: ResourceUsage::DEPTH_STENCIL_WRITE,
        }
    }
}

/// Single-subpass render pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RenderPassDesc {
    pub color_attachments: Vec<AttachmentDesc>,
    pub depth_stencil_attachment: Option<AttachmentDesc>,
}

/// Framebuffer for a render pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FramebufferDesc {
    pub render_pass: RenderPassHandle,
    /// Color views followed by the depth-stencil view, in render pass order.
    pub attachments: Vec<ResourceViewHandle>,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
}

/// Clear value for one attachment at render pass begin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u8 },
}

/// Query kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryType {
    Occlusion,
    BinaryOcclusion,
    Timestamp,
    PipelineStatistics,
}

/// Kind of indirect command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndirectCommand {
    Draw,
    DrawIndexed,
    Dispatch,
}

/// Viewport rectangle and depth range.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

/// Integer rectangle, end-exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_groups() {
        assert!(ShaderStage::ALL_GRAPHICS.contains(ShaderStage::PIXEL));
        assert!(!ShaderStage::ALL_GRAPHICS.contains(ShaderStage::COMPUTE));
        assert_eq!(ShaderStage::ALL, ShaderStage::all());
    }

    #[test]
    fn test_graphics_pipeline_defaults() {
        let code = [0u8; 4];
        let desc = GraphicsPipelineDesc::new(
            ShaderDesc::new(&code),
            ShaderDesc::new(&code),
            RenderPassHandle::from_raw(1),
        );
        assert_eq!(desc.viewport_count, 1);
        assert!(desc.dynamic_states.contains(&DynamicState::Scissor));
        assert_eq!(desc.blend.render_targets[0].write_mask, 0xF);
    }

    #[test]
    fn test_descriptor_payload_len() {
        let views = [ResourceViewHandle::from_raw(1), ResourceViewHandle::from_raw(2)];
        assert_eq!(Descriptors::Views(&views).len(), 2);
        assert!(Descriptors::Samplers(&[]).is_empty());
    }
}
