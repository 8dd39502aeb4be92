//! Tracking of application-created resources, views, samplers, render passes
//! and framebuffers.

use ash::vk;
use ash::vk::Handle;

use super::dispatch::device_data;
use super::ffi::raw_slice;
use super::{next_fn, report};
use crate::api::{AttachmentDesc, RenderPassDesc, ResourceViewHandle};
use crate::vulkan::conversion::convert_attachment_from_vk;
use crate::vulkan::records::{
    FramebufferRecord, RenderPassRecord, ResourceRecord, SamplerRecord, ViewRecord,
};
use crate::vulkan::{ResourceOwner, render_pass_desc_from_refs};

pub unsafe extern "system" fn create_image(
    device: vk::Device,
    p_create_info: *const vk::ImageCreateInfo<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
    p_image: *mut vk::Image,
) -> vk::Result {
    let Some(data) = device_data(device) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    let next = next_fn!(data, create_image, vk::Result::ERROR_INITIALIZATION_FAILED);
    let result = unsafe { next(device, p_create_info, p_allocator, p_image) };
    if result == vk::Result::SUCCESS {
        if let Some(layer) = &data.layer {
            let image = unsafe { *p_image };
            report(
                layer.register_image(image, unsafe { &*p_create_info }, ResourceOwner::Application),
                "image",
                image.as_raw(),
            );
        }
    }
    result
}

pub unsafe extern "system" fn destroy_image(
    device: vk::Device,
    image: vk::Image,
    p_allocator: *const vk::AllocationCallbacks<'_>,
) {
    let Some(data) = device_data(device) else {
        return;
    };
    let next = next_fn!(data, destroy_image);
    if let Some(layer) = &data.layer {
        layer.records().remove::<ResourceRecord>(image.as_raw());
    }
    unsafe { next(device, image, p_allocator) };
}

pub unsafe extern "system" fn create_buffer(
    device: vk::Device,
    p_create_info: *const vk::BufferCreateInfo<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
    p_buffer: *mut vk::Buffer,
) -> vk::Result {
    let Some(data) = device_data(device) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    let next = next_fn!(data, create_buffer, vk::Result::ERROR_INITIALIZATION_FAILED);
    let result = unsafe { next(device, p_create_info, p_allocator, p_buffer) };
    if result == vk::Result::SUCCESS {
        if let Some(layer) = &data.layer {
            let buffer = unsafe { *p_buffer };
            report(
                layer.register_buffer(buffer, unsafe { &*p_create_info }),
                "buffer",
                buffer.as_raw(),
            );
        }
    }
    result
}

pub unsafe extern "system" fn destroy_buffer(
    device: vk::Device,
    buffer: vk::Buffer,
    p_allocator: *const vk::AllocationCallbacks<'_>,
) {
    let Some(data) = device_data(device) else {
        return;
    };
    let next = next_fn!(data, destroy_buffer);
    if let Some(layer) = &data.layer {
        layer.records().remove::<ResourceRecord>(buffer.as_raw());
    }
    unsafe { next(device, buffer, p_allocator) };
}

pub unsafe extern "system" fn create_image_view(
    device: vk::Device,
    p_create_info: *const vk::ImageViewCreateInfo<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
    p_view: *mut vk::ImageView,
) -> vk::Result {
    let Some(data) = device_data(device) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    let next = next_fn!(data, create_image_view, vk::Result::ERROR_INITIALIZATION_FAILED);
    let result = unsafe { next(device, p_create_info, p_allocator, p_view) };
    if result == vk::Result::SUCCESS {
        if let Some(layer) = &data.layer {
            let view = unsafe { *p_view };
            report(
                layer.register_image_view(view, unsafe { &*p_create_info }),
                "image view",
                view.as_raw(),
            );
        }
    }
    result
}

pub unsafe extern "system" fn destroy_image_view(
    device: vk::Device,
    view: vk::ImageView,
    p_allocator: *const vk::AllocationCallbacks<'_>,
) {
    let Some(data) = device_data(device) else {
        return;
    };
    let next = next_fn!(data, destroy_image_view);
    if let Some(layer) = &data.layer {
        layer.records().remove::<ViewRecord>(view.as_raw());
    }
    unsafe { next(device, view, p_allocator) };
}

pub unsafe extern "system" fn create_buffer_view(
    device: vk::Device,
    p_create_info: *const vk::BufferViewCreateInfo<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
    p_view: *mut vk::BufferView,
) -> vk::Result {
    let Some(data) = device_data(device) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    let next = next_fn!(data, create_buffer_view, vk::Result::ERROR_INITIALIZATION_FAILED);
    let result = unsafe { next(device, p_create_info, p_allocator, p_view) };
    if result == vk::Result::SUCCESS {
        if let Some(layer) = &data.layer {
            let view = unsafe { *p_view };
            report(
                layer.register_buffer_view(view, unsafe { &*p_create_info }),
                "buffer view",
                view.as_raw(),
            );
        }
    }
    result
}

pub unsafe extern "system" fn destroy_buffer_view(
    device: vk::Device,
    view: vk::BufferView,
    p_allocator: *const vk::AllocationCallbacks<'_>,
) {
    let Some(data) = device_data(device) else {
        return;
    };
    let next = next_fn!(data, destroy_buffer_view);
    if let Some(layer) = &data.layer {
        layer.records().remove::<ViewRecord>(view.as_raw());
    }
    unsafe { next(device, view, p_allocator) };
}

pub unsafe extern "system" fn create_sampler(
    device: vk::Device,
    p_create_info: *const vk::SamplerCreateInfo<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
    p_sampler: *mut vk::Sampler,
) -> vk::Result {
    let Some(data) = device_data(device) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    let next = next_fn!(data, create_sampler, vk::Result::ERROR_INITIALIZATION_FAILED);
    let result = unsafe { next(device, p_create_info, p_allocator, p_sampler) };
    if result == vk::Result::SUCCESS {
        if let Some(layer) = &data.layer {
            let sampler = unsafe { *p_sampler };
            report(
                layer.register_sampler(sampler, unsafe { &*p_create_info }),
                "sampler",
                sampler.as_raw(),
            );
        }
    }
    result
}

pub unsafe extern "system" fn destroy_sampler(
    device: vk::Device,
    sampler: vk::Sampler,
    p_allocator: *const vk::AllocationCallbacks<'_>,
) {
    let Some(data) = device_data(device) else {
        return;
    };
    let next = next_fn!(data, destroy_sampler);
    if let Some(layer) = &data.layer {
        layer.records().remove::<SamplerRecord>(sampler.as_raw());
    }
    unsafe { next(device, sampler, p_allocator) };
}

/// Describe the first subpass of a render pass. Works on both the original
/// and the `2` flavor of the create info, which share field names.
macro_rules! describe_render_pass {
    ($info:expr) => {{
        let info = $info;
        let attachments: Vec<AttachmentDesc> =
            unsafe { raw_slice(info.p_attachments, info.attachment_count) }
                .iter()
                .map(|a| {
                    convert_attachment_from_vk(
                        a.format,
                        a.samples,
                        a.load_op,
                        a.store_op,
                        a.stencil_load_op,
                        a.stencil_store_op,
                        a.initial_layout,
                        a.final_layout,
                    )
                })
                .collect();
        match unsafe { raw_slice(info.p_subpasses, info.subpass_count) }.first() {
            Some(subpass) => {
                let color: Vec<u32> = unsafe {
                    raw_slice(subpass.p_color_attachments, subpass.color_attachment_count)
                }
                .iter()
                .map(|reference| reference.attachment)
                .collect();
                let depth = unsafe { subpass.p_depth_stencil_attachment.as_ref() }
                    .map(|reference| reference.attachment);
                render_pass_desc_from_refs(&attachments, &color, depth)
            }
            None => render_pass_desc_from_refs(&attachments, &[], None),
        }
    }};
}

pub(crate) fn describe_render_pass(info: &vk::RenderPassCreateInfo<'_>) -> RenderPassDesc {
    describe_render_pass!(info)
}

pub(crate) fn describe_render_pass2(info: &vk::RenderPassCreateInfo2<'_>) -> RenderPassDesc {
    describe_render_pass!(info)
}

pub unsafe extern "system" fn create_render_pass(
    device: vk::Device,
    p_create_info: *const vk::RenderPassCreateInfo<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
    p_render_pass: *mut vk::RenderPass,
) -> vk::Result {
    let Some(data) = device_data(device) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    let next = next_fn!(data, create_render_pass, vk::Result::ERROR_INITIALIZATION_FAILED);
    let result = unsafe { next(device, p_create_info, p_allocator, p_render_pass) };
    if result == vk::Result::SUCCESS {
        if let Some(layer) = &data.layer {
            let render_pass = unsafe { *p_render_pass };
            let desc = describe_render_pass(unsafe { &*p_create_info });
            report(
                layer.register_render_pass(render_pass, desc),
                "render pass",
                render_pass.as_raw(),
            );
        }
    }
    result
}

pub unsafe extern "system" fn create_render_pass2(
    device: vk::Device,
    p_create_info: *const vk::RenderPassCreateInfo2<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
    p_render_pass: *mut vk::RenderPass,
) -> vk::Result {
    let Some(data) = device_data(device) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    let next = next_fn!(data, create_render_pass2, vk::Result::ERROR_INITIALIZATION_FAILED);
    let result = unsafe { next(device, p_create_info, p_allocator, p_render_pass) };
    if result == vk::Result::SUCCESS {
        if let Some(layer) = &data.layer {
            let render_pass = unsafe { *p_render_pass };
            let desc = describe_render_pass2(unsafe { &*p_create_info });
            report(
                layer.register_render_pass(render_pass, desc),
                "render pass",
                render_pass.as_raw(),
            );
        }
    }
    result
}

pub unsafe extern "system" fn destroy_render_pass(
    device: vk::Device,
    render_pass: vk::RenderPass,
    p_allocator: *const vk::AllocationCallbacks<'_>,
) {
    let Some(data) = device_data(device) else {
        return;
    };
    let next = next_fn!(data, destroy_render_pass);
    if let Some(layer) = &data.layer {
        layer.records().remove::<RenderPassRecord>(render_pass.as_raw());
    }
    unsafe { next(device, render_pass, p_allocator) };
}

/// Views a framebuffer was built from. Imageless framebuffers have none.
fn framebuffer_attachments(info: &vk::FramebufferCreateInfo<'_>) -> Vec<ResourceViewHandle> {
    if info.flags.contains(vk::FramebufferCreateFlags::IMAGELESS) {
        return Vec::new();
    }
    unsafe { raw_slice(info.p_attachments, info.attachment_count) }
        .iter()
        .map(|view| ResourceViewHandle::from_raw(view.as_raw()))
        .collect()
}

pub unsafe extern "system" fn create_framebuffer(
    device: vk::Device,
    p_create_info: *const vk::FramebufferCreateInfo<'_>,
    p_allocator: *const vk::AllocationCallbacks<'_>,
    p_framebuffer: *mut vk::Framebuffer,
) -> vk::Result {
    let Some(data) = device_data(device) else {
        return vk::Result::ERROR_DEVICE_LOST;
    };
    let next = next_fn!(data, create_framebuffer, vk::Result::ERROR_INITIALIZATION_FAILED);
    let result = unsafe { next(device, p_create_info, p_allocator, p_framebuffer) };
    if result == vk::Result::SUCCESS {
        if let Some(layer) = &data.layer {
            let framebuffer = unsafe { *p_framebuffer };
            let info = unsafe { &*p_create_info };
            report(
                layer.register_framebuffer(
                    framebuffer,
                    info.render_pass,
                    framebuffer_attachments(info),
                    vk::Extent2D {
                        width: info.width,
                        height: info.height,
                    },
                ),
                "framebuffer",
                framebuffer.as_raw(),
            );
        }
    }
    result
}

pub unsafe extern "system" fn destroy_framebuffer(
    device: vk::Device,
    framebuffer: vk::Framebuffer,
    p_allocator: *const vk::AllocationCallbacks<'_>,
) {
    let Some(data) = device_data(device) else {
        return;
    };
    let next = next_fn!(data, destroy_framebuffer);
    if let Some(layer) = &data.layer {
        layer.records().remove::<FramebufferRecord>(framebuffer.as_raw());
    }
    unsafe { next(device, framebuffer, p_allocator) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Format, LoadOp, ResourceUsage, StoreOp};

    #[test]
    fn test_describe_render_pass_reads_first_subpass() {
        let attachments = [
            vk::AttachmentDescription::default()
                .format(vk::Format::B8G8R8A8_UNORM)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
            vk::AttachmentDescription::default()
                .format(vk::Format::D32_SFLOAT)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        ];
        let color = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        let subpasses = [vk::SubpassDescription::default()
            .color_attachments(&color)
            .depth_stencil_attachment(&depth)];
        let info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses);

        let desc = describe_render_pass(&info);
        assert_eq!(desc.color_attachments.len(), 1);
        let color = desc.color_attachments[0];
        assert_eq!(color.format, Format::B8G8R8A8Unorm);
        assert_eq!(color.load_op, LoadOp::Clear);
        assert_eq!(color.store_op, StoreOp::Store);
        assert_eq!(color.final_usage, ResourceUsage::PRESENT);
        let depth = desc.depth_stencil_attachment.unwrap();
        assert_eq!(depth.format, Format::D32Float);
    }

    #[test]
    fn test_render_pass_without_subpasses() {
        let info = vk::RenderPassCreateInfo2::default();
        let desc = describe_render_pass2(&info);
        assert!(desc.color_attachments.is_empty());
        assert!(desc.depth_stencil_attachment.is_none());
    }

    #[test]
    fn test_imageless_framebuffer_has_no_views() {
        let views = [vk::ImageView::from_raw(0x11), vk::ImageView::from_raw(0x22)];
        let info = vk::FramebufferCreateInfo::default().attachments(&views);
        assert_eq!(
            framebuffer_attachments(&info),
            vec![ResourceViewHandle::from_raw(0x11), ResourceViewHandle::from_raw(0x22)]
        );

        let info = info.flags(vk::FramebufferCreateFlags::IMAGELESS);
        assert!(framebuffer_attachments(&info).is_empty());
    }
}
