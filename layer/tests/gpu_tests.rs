//! GPU integration tests for the layer's device abstraction.
//!
//! Each test creates its own headless Vulkan device through
//! [`HeadlessContext`](redlilium_layer::vulkan::HeadlessContext) and skips
//! itself when the machine has no Vulkan implementation.
//!
//! ```bash
//! cargo test -p redlilium-layer --test gpu_tests
//! ```

mod common;

use rstest::rstest;

use common::{TestContext, test_pattern};
use redlilium_layer::api::{
    AttachmentDesc, BufferRange, CommandQueue, DescriptorRange, DescriptorSetHandle,
    DescriptorSetUpdate, DescriptorType, Descriptors, Device, DeviceCaps, Format, LoadOp,
    MemoryHeap, PipelineLayoutParam, QueueType, RenderPassDesc, ResourceDesc, ResourceUsage,
    ResourceViewDesc, ShaderStage, SubresourceData,
};
use redlilium_layer::vulkan::RING_SIZE;

// ============================================================================
// Resource Tests
// ============================================================================

#[rstest]
#[case::rgba8(Format::R8G8B8A8Unorm)]
#[case::bgra8(Format::B8G8R8A8Unorm)]
#[case::rgba16f(Format::R16G16B16A16Float)]
fn test_texture_creation(#[case] format: Format) {
    let Some(ctx) = TestContext::new() else {
        eprintln!("Vulkan not available, skipping");
        return;
    };
    let usage = ResourceUsage::SHADER_RESOURCE | ResourceUsage::COPY_DEST;
    if !ctx.device().check_format_support(format, usage) {
        eprintln!("{format:?} not supported for sampling, skipping");
        return;
    }

    let desc = ResourceDesc::texture_2d(256, 256, 1, 1, format, MemoryHeap::GpuOnly, usage);
    let texture = ctx
        .device()
        .create_resource(&desc, None, ResourceUsage::SHADER_RESOURCE)
        .expect("texture creation");

    let created = ctx.device().get_resource_desc(texture).expect("resource record");
    let info = created.as_texture().expect("texture description");
    assert_eq!(info.width, 256);
    assert_eq!(info.height, 256);
    assert_eq!(info.format, format);
    assert!(created.usage.contains(usage));

    ctx.device().destroy_resource(texture);
    assert!(ctx.device().get_resource_desc(texture).is_none());
}

#[test]
fn test_zero_size_buffer_is_rejected() {
    let Some(ctx) = TestContext::new() else {
        eprintln!("Vulkan not available, skipping");
        return;
    };
    let before = ctx.record_count();
    let desc = ResourceDesc::buffer(0, MemoryHeap::GpuOnly, ResourceUsage::COPY_DEST);
    let result = ctx
        .device()
        .create_resource(&desc, None, ResourceUsage::UNDEFINED);

    assert!(result.is_err());
    assert_eq!(ctx.record_count(), before);
}

#[test]
fn test_buffer_upload_and_readback() {
    let Some(ctx) = TestContext::new() else {
        eprintln!("Vulkan not available, skipping");
        return;
    };
    const SIZE: u64 = 4096;
    let data = test_pattern(SIZE as usize);

    let desc = ResourceDesc::buffer(
        SIZE,
        MemoryHeap::GpuOnly,
        ResourceUsage::COPY_SOURCE | ResourceUsage::COPY_DEST,
    );
    let gpu_buffer = ctx
        .device()
        .create_resource(&desc, None, ResourceUsage::UNDEFINED)
        .expect("gpu buffer");
    ctx.device()
        .update_buffer_region(&data, gpu_buffer, 0)
        .expect("buffer upload");

    let readback = ctx.create_readback_buffer(SIZE);
    let recorded = ctx.queue.with_immediate_command_list(&mut |cmd| {
        cmd.copy_buffer_region(gpu_buffer, 0, readback, 0, SIZE);
    });
    assert!(recorded);
    ctx.queue.wait_idle();

    assert_eq!(ctx.read_buffer(readback, SIZE), data);

    ctx.device().destroy_resource(readback);
    ctx.device().destroy_resource(gpu_buffer);
}

#[test]
fn test_update_past_buffer_end_fails() {
    let Some(ctx) = TestContext::new() else {
        eprintln!("Vulkan not available, skipping");
        return;
    };
    let desc = ResourceDesc::buffer(64, MemoryHeap::CpuToGpu, ResourceUsage::COPY_SOURCE);
    let buffer = ctx
        .device()
        .create_resource(&desc, None, ResourceUsage::UNDEFINED)
        .expect("upload buffer");

    assert!(ctx.device().update_buffer_region(&[0u8; 32], buffer, 48).is_err());
    assert!(ctx.device().update_buffer_region(&[0u8; 32], buffer, 32).is_ok());

    ctx.device().destroy_resource(buffer);
}

#[rstest]
#[case::gpu_only(MemoryHeap::GpuOnly)]
#[case::cpu_to_gpu(MemoryHeap::CpuToGpu)]
fn test_oversized_initial_data_is_rejected(#[case] heap: MemoryHeap) {
    let Some(ctx) = TestContext::new() else {
        eprintln!("Vulkan not available, skipping");
        return;
    };
    let before = ctx.record_count();
    let data = test_pattern(128);
    let desc = ResourceDesc::buffer(64, heap, ResourceUsage::COPY_DEST);
    let result = ctx.device().create_resource(
        &desc,
        Some(&[SubresourceData::packed(&data)]),
        ResourceUsage::UNDEFINED,
    );

    assert!(result.is_err());
    assert_eq!(ctx.record_count(), before);
}

// ============================================================================
// Immediate Command List Tests
// ============================================================================

#[test]
fn test_graphics_queue_has_immediate_list() {
    let Some(ctx) = TestContext::new() else {
        eprintln!("Vulkan not available, skipping");
        return;
    };
    assert!(ctx.queue.queue_type().contains(QueueType::GRAPHICS));
    assert!(ctx.queue.has_immediate_command_list());
}

#[test]
fn test_flushes_beyond_ring_size() {
    let Some(ctx) = TestContext::new() else {
        eprintln!("Vulkan not available, skipping");
        return;
    };

    for i in 0..RING_SIZE * 3 {
        let recorded = ctx.queue.with_immediate_command_list(&mut |cmd| {
            cmd.insert_debug_marker(&format!("flush {i}"), [1.0, 1.0, 1.0, 1.0]);
        });
        assert!(recorded);
        ctx.queue.flush_immediate_command_list();
    }

    let recorded = ctx.queue.with_immediate_command_list(&mut |cmd| {
        cmd.insert_debug_marker("after wrap", [0.0, 1.0, 0.0, 1.0]);
    });
    assert!(recorded);
    ctx.queue.wait_idle();
}

#[test]
fn test_nested_immediate_access_is_refused() {
    let Some(ctx) = TestContext::new() else {
        eprintln!("Vulkan not available, skipping");
        return;
    };

    let mut nested = None;
    let queue = ctx.queue.clone();
    let outer = ctx.queue.with_immediate_command_list(&mut |_| {
        nested = Some(queue.with_immediate_command_list(&mut |_| {}));
    });

    assert!(outer);
    assert_eq!(nested, Some(false));
}

#[test]
fn test_device_work_inside_immediate_callback_reports_busy() {
    let Some(ctx) = TestContext::new() else {
        eprintln!("Vulkan not available, skipping");
        return;
    };
    let data = test_pattern(64);
    let desc = ResourceDesc::buffer(64, MemoryHeap::GpuOnly, ResourceUsage::COPY_DEST);
    let device = ctx.device();
    let queue = ctx.queue.clone();

    let mut nested = None;
    let recorded = ctx.queue.with_immediate_command_list(&mut |_| {
        assert!(queue.has_immediate_command_list());
        nested = Some(device.create_resource(
            &desc,
            Some(&[SubresourceData::packed(&data)]),
            ResourceUsage::UNDEFINED,
        ));
    });

    assert!(recorded);
    assert!(matches!(nested, Some(Err(_))));
}

#[test]
fn test_queue_labels_inside_immediate_callback() {
    let Some(ctx) = TestContext::new() else {
        eprintln!("Vulkan not available, skipping");
        return;
    };
    let queue = ctx.queue.clone();
    let recorded = ctx.queue.with_immediate_command_list(&mut |cmd| {
        queue.begin_debug_event("outer", [1.0, 0.0, 0.0, 1.0]);
        cmd.insert_debug_marker("inner", [0.0, 0.0, 1.0, 1.0]);
        queue.insert_debug_marker("queue marker", [0.0, 1.0, 0.0, 1.0]);
        queue.end_debug_event();
    });
    assert!(recorded);
    ctx.queue.wait_idle();
}

// ============================================================================
// Render Tests
// ============================================================================

#[test]
fn test_clear_render_target_readback() {
    let Some(ctx) = TestContext::new() else {
        eprintln!("Vulkan not available, skipping");
        return;
    };
    const WIDTH: u32 = 16;
    const HEIGHT: u32 = 16;
    const SIZE: u64 = (WIDTH * HEIGHT * 4) as u64;
    let format = Format::R8G8B8A8Unorm;

    let desc = ResourceDesc::texture_2d(
        WIDTH,
        HEIGHT,
        1,
        1,
        format,
        MemoryHeap::GpuOnly,
        ResourceUsage::RENDER_TARGET | ResourceUsage::COPY_SOURCE | ResourceUsage::COPY_DEST,
    );
    let target = ctx
        .device()
        .create_resource(&desc, None, ResourceUsage::RENDER_TARGET)
        .expect("render target");
    let view = ctx
        .device()
        .create_resource_view(
            target,
            ResourceUsage::RENDER_TARGET,
            &ResourceViewDesc::texture_2d(format, 0, 1),
        )
        .expect("render target view");
    assert_eq!(ctx.device().get_resource_from_view(view), Some(target));
    let readback = ctx.create_readback_buffer(SIZE);

    let recorded = ctx.queue.with_immediate_command_list(&mut |cmd| {
        cmd.clear_render_target_view(view, [1.0, 0.0, 0.0, 1.0], &[]);
        cmd.barrier(
            &[target],
            &[ResourceUsage::RENDER_TARGET],
            &[ResourceUsage::COPY_SOURCE],
        );
        cmd.copy_texture_to_buffer(target, 0, None, readback, 0, 0, 0);
    });
    assert!(recorded);
    ctx.queue.wait_idle();

    let pixels = ctx.read_buffer(readback, SIZE);
    for pixel in pixels.chunks_exact(4) {
        assert_eq!(pixel, [255, 0, 0, 255]);
    }

    ctx.device().destroy_resource(readback);
    ctx.device().destroy_resource_view(view);
    ctx.device().destroy_resource(target);
}

#[rstest]
#[case::color_only(None)]
#[case::with_depth(Some(Format::D32Float))]
fn test_render_pass_description_is_kept(#[case] depth: Option<Format>) {
    let Some(ctx) = TestContext::new() else {
        eprintln!("Vulkan not available, skipping");
        return;
    };
    let desc = RenderPassDesc {
        color_attachments: vec![AttachmentDesc::color(Format::R8G8B8A8Unorm, LoadOp::Clear)],
        depth_stencil_attachment: depth
            .map(|format| AttachmentDesc::depth_stencil(format, LoadOp::Clear)),
    };

    let render_pass = ctx.device().create_render_pass(&desc).expect("render pass");
    assert_eq!(ctx.device().get_render_pass_desc(render_pass), Some(desc));

    ctx.device().destroy_render_pass(render_pass);
    assert_eq!(ctx.device().get_render_pass_desc(render_pass), None);
}

#[test]
fn test_push_descriptors_record_into_immediate_list() {
    let Some(ctx) = TestContext::new() else {
        eprintln!("Vulkan not available, skipping");
        return;
    };
    let layout = ctx
        .device()
        .create_pipeline_layout(&[PipelineLayoutParam::PushDescriptors(vec![DescriptorRange {
            binding: 0,
            array_size: 1,
            ty: DescriptorType::ConstantBuffer,
            visibility: ShaderStage::COMPUTE,
        }])])
        .expect("pipeline layout");
    let desc = ResourceDesc::buffer(256, MemoryHeap::GpuOnly, ResourceUsage::CONSTANT_BUFFER);
    let buffer = ctx
        .device()
        .create_resource(&desc, None, ResourceUsage::UNDEFINED)
        .expect("constant buffer");

    let ranges = [BufferRange {
        buffer,
        offset: 0,
        size: u64::MAX,
    }];
    let update = DescriptorSetUpdate {
        set: DescriptorSetHandle::NULL,
        binding: 0,
        array_offset: 0,
        ty: DescriptorType::ConstantBuffer,
        descriptors: Descriptors::Buffers(&ranges),
    };
    for _ in 0..RING_SIZE + 1 {
        let recorded = ctx.queue.with_immediate_command_list(&mut |cmd| {
            cmd.push_descriptors(ShaderStage::COMPUTE, layout, 0, &update);
        });
        assert!(recorded);
        ctx.queue.flush_immediate_command_list();
    }
    ctx.queue.wait_idle();

    ctx.device().destroy_resource(buffer);
    ctx.device().destroy_pipeline_layout(layout);
}

// ============================================================================
// Capability Tests
// ============================================================================

#[rstest]
#[case::compute(DeviceCaps::ComputeShader)]
#[case::copy_buffer_region(DeviceCaps::CopyBufferRegion)]
#[case::copy_buffer_to_texture(DeviceCaps::CopyBufferToTexture)]
#[case::blit(DeviceCaps::Blit)]
fn test_core_capabilities(#[case] capability: DeviceCaps) {
    let Some(ctx) = TestContext::new() else {
        eprintln!("Vulkan not available, skipping");
        return;
    };
    assert!(ctx.device().check_capability(capability));
}

#[test]
fn test_depth_format_is_not_a_color_target() {
    let Some(ctx) = TestContext::new() else {
        eprintln!("Vulkan not available, skipping");
        return;
    };
    assert!(!ctx.device().check_format_support(Format::D32Float, ResourceUsage::RENDER_TARGET));
}
