//! Pipelines, render passes and framebuffers.

use std::ffi::CString;
use std::io::Cursor;

use ash::vk;
use ash::vk::Handle;

use super::conversion::{
    convert_attachment_desc, convert_blend_factor, convert_blend_op, convert_compare_op,
    convert_cull_mode, convert_dynamic_state, convert_fill_mode, convert_format,
    convert_logic_op, convert_primitive_topology, convert_stencil_op,
};
use super::device::VulkanDevice;
use super::records::{FramebufferRecord, NativeView, PipelineRecord, RenderPassRecord, ViewRecord};
use crate::api::{
    AttachmentDesc, DepthStencilDesc, DynamicState, FramebufferDesc, FramebufferHandle,
    GraphicsPipelineDesc, InputElement, PipelineDesc, PipelineHandle, PipelineLayoutHandle,
    RenderPassDesc, RenderPassHandle, RenderTargetBlend, ResourceViewHandle, ShaderDesc,
    StencilFaceDesc,
};
use crate::error::{LayerError, LayerResult};

/// Shader modules that live only as long as pipeline creation.
struct ShaderModules<'a> {
    device: &'a ash::Device,
    stages: Vec<(vk::ShaderStageFlags, vk::ShaderModule, CString)>,
}

impl<'a> ShaderModules<'a> {
    fn new(device: &'a ash::Device) -> Self {
        Self {
            device,
            stages: Vec::new(),
        }
    }

    fn add(&mut self, stage: vk::ShaderStageFlags, shader: &ShaderDesc<'_>) -> LayerResult<()> {
        let code = ash::util::read_spv(&mut Cursor::new(shader.code))
            .map_err(|e| LayerError::InvalidParameter(format!("invalid SPIR-V for {stage:?}: {e}")))?;
        let entry = CString::new(shader.entry_point).map_err(|e| {
            LayerError::InvalidParameter(format!("invalid entry point name: {e}"))
        })?;
        let info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe { self.device.create_shader_module(&info, None) }.map_err(|e| {
            log::error!("vkCreateShaderModule failed for {stage:?}: {e:?}");
            LayerError::from(e)
        })?;
        self.stages.push((stage, module, entry));
        Ok(())
    }

    fn add_optional(
        &mut self,
        stage: vk::ShaderStageFlags,
        shader: Option<&ShaderDesc<'_>>,
    ) -> LayerResult<()> {
        match shader {
            Some(shader) => self.add(stage, shader),
            None => Ok(()),
        }
    }

    fn stage_infos(&self) -> Vec<vk::PipelineShaderStageCreateInfo<'_>> {
        self.stages
            .iter()
            .map(|(stage, module, entry)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(*stage)
                    .module(*module)
                    .name(entry)
            })
            .collect()
    }
}

impl Drop for ShaderModules<'_> {
    fn drop(&mut self) {
        for (_, module, _) in self.stages.drain(..) {
            unsafe { self.device.destroy_shader_module(module, None) };
        }
    }
}

/// Dynamic states of a pipeline. Viewport and scissor are always dynamic.
pub(crate) fn collect_dynamic_states(requested: &[DynamicState]) -> Vec<vk::DynamicState> {
    let mut states = vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    for state in requested {
        let native = convert_dynamic_state(*state);
        if !states.contains(&native) {
            states.push(native);
        }
    }
    states
}

/// Vertex buffer bindings referenced by an input layout, one per binding slot.
pub(crate) fn vertex_bindings(elements: &[InputElement]) -> Vec<vk::VertexInputBindingDescription> {
    let mut bindings: Vec<vk::VertexInputBindingDescription> = Vec::new();
    for element in elements {
        if bindings.iter().any(|b| b.binding == element.buffer_binding) {
            continue;
        }
        let input_rate = if element.instance_step_rate == 0 {
            vk::VertexInputRate::VERTEX
        } else {
            if element.instance_step_rate > 1 {
                log::debug!(
                    "instance step rate {} on binding {} treated as 1",
                    element.instance_step_rate,
                    element.buffer_binding
                );
            }
            vk::VertexInputRate::INSTANCE
        };
        bindings.push(
            vk::VertexInputBindingDescription::default()
                .binding(element.buffer_binding)
                .stride(element.stride)
                .input_rate(input_rate),
        );
    }
    bindings
}

fn vertex_attributes(elements: &[InputElement]) -> Vec<vk::VertexInputAttributeDescription> {
    elements
        .iter()
        .map(|element| {
            vk::VertexInputAttributeDescription::default()
                .location(element.location)
                .binding(element.buffer_binding)
                .format(convert_format(element.format))
                .offset(element.offset)
        })
        .collect()
}

pub(crate) fn convert_render_target_blend(
    blend: &RenderTargetBlend,
) -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(blend.blend_enable)
        .src_color_blend_factor(convert_blend_factor(blend.source_color))
        .dst_color_blend_factor(convert_blend_factor(blend.dest_color))
        .color_blend_op(convert_blend_op(blend.color_op))
        .src_alpha_blend_factor(convert_blend_factor(blend.source_alpha))
        .dst_alpha_blend_factor(convert_blend_factor(blend.dest_alpha))
        .alpha_blend_op(convert_blend_op(blend.alpha_op))
        .color_write_mask(vk::ColorComponentFlags::from_raw(u32::from(blend.write_mask & 0xF)))
}

fn convert_stencil_face(face: &StencilFaceDesc, desc: &DepthStencilDesc) -> vk::StencilOpState {
    vk::StencilOpState {
        fail_op: convert_stencil_op(face.fail_op),
        pass_op: convert_stencil_op(face.pass_op),
        depth_fail_op: convert_stencil_op(face.depth_fail_op),
        compare_op: convert_compare_op(face.func),
        compare_mask: u32::from(desc.stencil_read_mask),
        write_mask: u32::from(desc.stencil_write_mask),
        reference: u32::from(desc.stencil_reference),
    }
}

/// Describe a single-subpass render pass from its attachment list and the
/// attachment indices the subpass references.
pub(crate) fn render_pass_desc_from_refs(
    attachments: &[AttachmentDesc],
    color_refs: &[u32],
    depth_ref: Option<u32>,
) -> RenderPassDesc {
    let lookup = |index: u32| {
        if index == vk::ATTACHMENT_UNUSED {
            return None;
        }
        attachments.get(index as usize).copied()
    };
    RenderPassDesc {
        color_attachments: color_refs.iter().filter_map(|index| lookup(*index)).collect(),
        depth_stencil_attachment: depth_ref.and_then(lookup),
    }
}

impl VulkanDevice {
    pub fn create_pipeline(
        &self,
        layout: PipelineLayoutHandle,
        desc: &PipelineDesc<'_>,
    ) -> LayerResult<PipelineHandle> {
        if layout.is_null() {
            return Err(LayerError::InvalidParameter("pipeline needs a layout".into()));
        }
        let layout = vk::PipelineLayout::from_raw(layout.raw());
        let (pipeline, bind_point) = match desc {
            PipelineDesc::Compute(shader) => (
                self.create_compute_pipeline(layout, shader)?,
                vk::PipelineBindPoint::COMPUTE,
            ),
            PipelineDesc::Graphics(graphics) => (
                self.create_graphics_pipeline(layout, graphics)?,
                vk::PipelineBindPoint::GRAPHICS,
            ),
        };

        if let Err(e) = self
            .ctx
            .records
            .insert(pipeline.as_raw(), PipelineRecord { bind_point, layout })
        {
            unsafe { self.ctx.device.destroy_pipeline(pipeline, None) };
            return Err(e);
        }
        Ok(PipelineHandle::from_raw(pipeline.as_raw()))
    }

    fn create_compute_pipeline(
        &self,
        layout: vk::PipelineLayout,
        shader: &ShaderDesc<'_>,
    ) -> LayerResult<vk::Pipeline> {
        let mut modules = ShaderModules::new(&self.ctx.device);
        modules.add(vk::ShaderStageFlags::COMPUTE, shader)?;
        let stages = modules.stage_infos();
        let info = vk::ComputePipelineCreateInfo::default()
            .stage(stages[0])
            .layout(layout);

        let pipelines = unsafe {
            self.ctx
                .device
                .create_compute_pipelines(vk::PipelineCache::null(), &[info], None)
        }
        .map_err(|(_, e)| {
            log::error!("vkCreateComputePipelines failed: {e:?}");
            LayerError::from(e)
        })?;
        pipelines
            .first()
            .copied()
            .ok_or_else(|| LayerError::Internal("no compute pipeline returned".into()))
    }

    fn create_graphics_pipeline(
        &self,
        layout: vk::PipelineLayout,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> LayerResult<vk::Pipeline> {
        if desc.render_pass_template.is_null() {
            return Err(LayerError::InvalidParameter(
                "graphics pipeline needs a render pass template".into(),
            ));
        }
        let render_pass = self
            .ctx
            .records
            .get::<RenderPassRecord>(desc.render_pass_template.raw())
            .ok_or(LayerError::HandleNotFound(desc.render_pass_template.raw()))?;

        let mut modules = ShaderModules::new(&self.ctx.device);
        modules.add_optional(vk::ShaderStageFlags::VERTEX, desc.vertex_shader.as_ref())?;
        modules.add_optional(
            vk::ShaderStageFlags::TESSELLATION_CONTROL,
            desc.hull_shader.as_ref(),
        )?;
        modules.add_optional(
            vk::ShaderStageFlags::TESSELLATION_EVALUATION,
            desc.domain_shader.as_ref(),
        )?;
        modules.add_optional(vk::ShaderStageFlags::GEOMETRY, desc.geometry_shader.as_ref())?;
        modules.add_optional(vk::ShaderStageFlags::FRAGMENT, desc.pixel_shader.as_ref())?;
        let stages = modules.stage_infos();

        let bindings = vertex_bindings(&desc.input_layout);
        let attributes = vertex_attributes(&desc.input_layout);
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let (topology, patch_control_points) = convert_primitive_topology(desc.topology);
        let input_assembly =
            vk::PipelineInputAssemblyStateCreateInfo::default().topology(topology);
        let tessellation = vk::PipelineTessellationStateCreateInfo::default()
            .patch_control_points(patch_control_points);

        let viewport_count = desc.viewport_count.max(1);
        let viewport = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(viewport_count)
            .scissor_count(viewport_count);

        let rasterizer = &desc.rasterizer;
        let depth_bias_enable = rasterizer.depth_bias != 0.0
            || rasterizer.slope_scaled_depth_bias != 0.0;
        let depth_clamp = !rasterizer.depth_clip_enable && self.ctx.features.depth_clamp == vk::TRUE;
        let mut conservative = vk::PipelineRasterizationConservativeStateCreateInfoEXT::default()
            .conservative_rasterization_mode(vk::ConservativeRasterizationModeEXT::OVERESTIMATE);
        let mut rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(depth_clamp)
            .polygon_mode(convert_fill_mode(rasterizer.fill_mode))
            .cull_mode(convert_cull_mode(rasterizer.cull_mode))
            .front_face(if rasterizer.front_counter_clockwise {
                vk::FrontFace::COUNTER_CLOCKWISE
            } else {
                vk::FrontFace::CLOCKWISE
            })
            .depth_bias_enable(depth_bias_enable)
            .depth_bias_constant_factor(rasterizer.depth_bias)
            .depth_bias_clamp(rasterizer.depth_bias_clamp)
            .depth_bias_slope_factor(rasterizer.slope_scaled_depth_bias)
            .line_width(1.0);
        if rasterizer.conservative_rasterization {
            if self
                .ctx
                .has_extension(ash::ext::conservative_rasterization::NAME)
            {
                rasterization = rasterization.push_next(&mut conservative);
            } else {
                log::warn!("conservative rasterization requested but not enabled, ignoring");
            }
        }

        let sample_mask = [desc.sample_mask];
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::from_raw(desc.sample_count.max(1)))
            .sample_mask(&sample_mask)
            .alpha_to_coverage_enable(desc.blend.alpha_to_coverage);

        let ds = &desc.depth_stencil;
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(ds.depth_enable)
            .depth_write_enable(ds.depth_write_mask)
            .depth_compare_op(convert_compare_op(ds.depth_func))
            .stencil_test_enable(ds.stencil_enable)
            .front(convert_stencil_face(&ds.front, ds))
            .back(convert_stencil_face(&ds.back, ds))
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);

        let color_count = render_pass.desc.color_attachments.len();
        let attachments: Vec<_> = desc
            .blend
            .render_targets
            .iter()
            .take(color_count)
            .map(convert_render_target_blend)
            .collect();
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(desc.blend.logic_op_enable)
            .logic_op(convert_logic_op(desc.blend.logic_op))
            .attachments(&attachments)
            .blend_constants(desc.blend.blend_constant);

        let dynamic_states = collect_dynamic_states(&desc.dynamic_states);
        let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let mut info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic)
            .layout(layout)
            .render_pass(vk::RenderPass::from_raw(desc.render_pass_template.raw()))
            .subpass(desc.subpass);
        if patch_control_points > 0 {
            info = info.tessellation_state(&tessellation);
        }

        let pipelines = unsafe {
            self.ctx
                .device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
        }
        .map_err(|(_, e)| {
            log::error!("vkCreateGraphicsPipelines failed: {e:?}");
            LayerError::from(e)
        })?;
        pipelines
            .first()
            .copied()
            .ok_or_else(|| LayerError::Internal("no graphics pipeline returned".into()))
    }

    pub fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        if pipeline.is_null() {
            return;
        }
        self.ctx.records.remove::<PipelineRecord>(pipeline.raw());
        unsafe {
            self.ctx
                .device
                .destroy_pipeline(vk::Pipeline::from_raw(pipeline.raw()), None)
        };
    }

    pub fn create_render_pass(&self, desc: &RenderPassDesc) -> LayerResult<RenderPassHandle> {
        let mut attachments: Vec<_> = desc
            .color_attachments
            .iter()
            .map(convert_attachment_desc)
            .collect();
        let color_refs: Vec<_> = (0..desc.color_attachments.len() as u32)
            .map(|attachment| vk::AttachmentReference {
                attachment,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            })
            .collect();
        let depth_ref = desc.depth_stencil_attachment.as_ref().map(|depth| {
            attachments.push(convert_attachment_desc(depth));
            vk::AttachmentReference {
                attachment: color_refs.len() as u32,
                layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            }
        });

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if let Some(depth_ref) = depth_ref.as_ref() {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }
        let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
        let dependency = vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(stages)
            .dst_stage_mask(stages)
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            );

        let subpasses = [subpass];
        let dependencies = [dependency];
        let info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);
        let render_pass = unsafe { self.ctx.device.create_render_pass(&info, None) }.map_err(|e| {
            log::error!("vkCreateRenderPass failed: {e:?}");
            LayerError::from(e)
        })?;

        if let Err(e) = self.register_render_pass(render_pass, desc.clone()) {
            unsafe { self.ctx.device.destroy_render_pass(render_pass, None) };
            return Err(e);
        }
        Ok(RenderPassHandle::from_raw(render_pass.as_raw()))
    }

    pub fn destroy_render_pass(&self, render_pass: RenderPassHandle) {
        if render_pass.is_null() {
            return;
        }
        self.ctx.records.remove::<RenderPassRecord>(render_pass.raw());
        unsafe {
            self.ctx
                .device
                .destroy_render_pass(vk::RenderPass::from_raw(render_pass.raw()), None)
        };
    }

    /// Track a render pass, either the layer's own or one the application created.
    pub fn register_render_pass(
        &self,
        render_pass: vk::RenderPass,
        desc: RenderPassDesc,
    ) -> LayerResult<()> {
        self.ctx
            .records
            .insert(render_pass.as_raw(), RenderPassRecord { desc })
            .map(drop)
    }

    pub fn create_framebuffer(&self, desc: &FramebufferDesc) -> LayerResult<FramebufferHandle> {
        if desc.render_pass.is_null() || desc.width == 0 || desc.height == 0 {
            return Err(LayerError::InvalidParameter(format!(
                "invalid framebuffer {}x{} for render pass {:#x}",
                desc.width,
                desc.height,
                desc.render_pass.raw()
            )));
        }
        let views = desc
            .attachments
            .iter()
            .map(|view| {
                let record = self
                    .ctx
                    .records
                    .get::<ViewRecord>(view.raw())
                    .ok_or(LayerError::HandleNotFound(view.raw()))?;
                match record.native {
                    NativeView::Image { view, .. } => Ok(view),
                    NativeView::Buffer { .. } => Err(LayerError::InvalidParameter(
                        "buffer view used as framebuffer attachment".into(),
                    )),
                }
            })
            .collect::<LayerResult<Vec<_>>>()?;

        let render_pass = vk::RenderPass::from_raw(desc.render_pass.raw());
        let info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&views)
            .width(desc.width)
            .height(desc.height)
            .layers(desc.layers.max(1));
        let framebuffer = unsafe { self.ctx.device.create_framebuffer(&info, None) }.map_err(|e| {
            log::error!("vkCreateFramebuffer failed: {e:?}");
            LayerError::from(e)
        })?;

        let extent = vk::Extent2D {
            width: desc.width,
            height: desc.height,
        };
        if let Err(e) =
            self.register_framebuffer(framebuffer, render_pass, desc.attachments.clone(), extent)
        {
            unsafe { self.ctx.device.destroy_framebuffer(framebuffer, None) };
            return Err(e);
        }
        Ok(FramebufferHandle::from_raw(framebuffer.as_raw()))
    }

    pub fn destroy_framebuffer(&self, framebuffer: FramebufferHandle) {
        if framebuffer.is_null() {
            return;
        }
        self.ctx.records.remove::<FramebufferRecord>(framebuffer.raw());
        unsafe {
            self.ctx
                .device
                .destroy_framebuffer(vk::Framebuffer::from_raw(framebuffer.raw()), None)
        };
    }

    /// Track a framebuffer and the views it was built from.
    pub fn register_framebuffer(
        &self,
        framebuffer: vk::Framebuffer,
        render_pass: vk::RenderPass,
        attachments: Vec<ResourceViewHandle>,
        extent: vk::Extent2D,
    ) -> LayerResult<()> {
        let record = FramebufferRecord {
            render_pass,
            attachments,
            extent,
        };
        self.ctx.records.insert(framebuffer.as_raw(), record).map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{BlendFactor, Format, LoadOp};

    #[test]
    fn test_viewport_and_scissor_always_dynamic() {
        let states = collect_dynamic_states(&[DynamicState::Scissor, DynamicState::BlendConstant]);
        assert_eq!(
            states,
            vec![
                vk::DynamicState::VIEWPORT,
                vk::DynamicState::SCISSOR,
                vk::DynamicState::BLEND_CONSTANTS
            ]
        );
        assert_eq!(collect_dynamic_states(&[]).len(), 2);
    }

    #[test]
    fn test_vertex_bindings_deduplicate() {
        let element = |location, buffer_binding, instance_step_rate| InputElement {
            location,
            format: Format::R32G32B32A32Float,
            buffer_binding,
            offset: 16 * location,
            stride: 32,
            instance_step_rate,
        };
        let bindings = vertex_bindings(&[element(0, 0, 0), element(1, 0, 0), element(2, 1, 1)]);
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].input_rate, vk::VertexInputRate::VERTEX);
        assert_eq!(bindings[1].binding, 1);
        assert_eq!(bindings[1].input_rate, vk::VertexInputRate::INSTANCE);
    }

    #[test]
    fn test_render_target_blend() {
        let blend = RenderTargetBlend {
            blend_enable: true,
            source_color: BlendFactor::SourceAlpha,
            dest_color: BlendFactor::OneMinusSourceAlpha,
            write_mask: 0x7,
            ..Default::default()
        };
        let state = convert_render_target_blend(&blend);
        assert_eq!(state.blend_enable, vk::TRUE);
        assert_eq!(state.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(
            state.color_write_mask,
            vk::ColorComponentFlags::R | vk::ColorComponentFlags::G | vk::ColorComponentFlags::B
        );
    }

    #[test]
    fn test_render_pass_desc_from_refs() {
        let color = AttachmentDesc::color(Format::R8G8B8A8Unorm, LoadOp::Clear);
        let depth = AttachmentDesc::depth_stencil(Format::D32Float, LoadOp::Load);
        let attachments = [depth, color];

        let desc = render_pass_desc_from_refs(&attachments, &[1, vk::ATTACHMENT_UNUSED], Some(0));
        assert_eq!(desc.color_attachments, vec![color]);
        assert_eq!(desc.depth_stencil_attachment, Some(depth));

        let desc = render_pass_desc_from_refs(&attachments, &[], None);
        assert!(desc.color_attachments.is_empty());
        assert!(desc.depth_stencil_attachment.is_none());
    }
}
