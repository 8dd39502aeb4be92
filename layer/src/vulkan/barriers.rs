//! Batched resource state transitions.
//!
//! Transitions are collected per command, then recorded as a single
//! `vkCmdPipelineBarrier`.

use ash::vk;

use super::conversion::{
    convert_usage_to_access, convert_usage_to_layout, convert_usage_to_pipeline_stage,
};
use crate::api::ResourceUsage;

/// A batch of image and buffer barriers to record together.
#[derive(Debug, Default)]
pub struct BarrierBatch {
    image_barriers: Vec<vk::ImageMemoryBarrier<'static>>,
    buffer_barriers: Vec<vk::BufferMemoryBarrier<'static>>,
    src_stage_mask: vk::PipelineStageFlags,
    dst_stage_mask: vk::PipelineStageFlags,
}

impl BarrierBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition an image between two usages.
    ///
    /// Read-only usages that do not change are skipped. A write usage that does
    /// not change still gets a barrier so later work sees the writes.
    pub fn add_image_transition(
        &mut self,
        image: vk::Image,
        range: vk::ImageSubresourceRange,
        old_usage: ResourceUsage,
        new_usage: ResourceUsage,
    ) {
        if old_usage == new_usage && !old_usage.is_write() {
            return;
        }

        self.image_barriers.push(
            vk::ImageMemoryBarrier::default()
                .old_layout(convert_usage_to_layout(old_usage))
                .new_layout(convert_usage_to_layout(new_usage))
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(range)
                .src_access_mask(convert_usage_to_access(old_usage))
                .dst_access_mask(convert_usage_to_access(new_usage)),
        );
        self.add_stages(old_usage, new_usage);
    }

    /// Transition a whole buffer between two usages.
    pub fn add_buffer_transition(
        &mut self,
        buffer: vk::Buffer,
        old_usage: ResourceUsage,
        new_usage: ResourceUsage,
    ) {
        if old_usage == new_usage && !old_usage.is_write() {
            return;
        }

        self.buffer_barriers.push(
            vk::BufferMemoryBarrier::default()
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .buffer(buffer)
                .offset(0)
                .size(vk::WHOLE_SIZE)
                .src_access_mask(convert_usage_to_access(old_usage))
                .dst_access_mask(convert_usage_to_access(new_usage)),
        );
        self.add_stages(old_usage, new_usage);
    }

    fn add_stages(&mut self, old_usage: ResourceUsage, new_usage: ResourceUsage) {
        self.src_stage_mask |= convert_usage_to_pipeline_stage(old_usage, true);
        self.dst_stage_mask |= convert_usage_to_pipeline_stage(new_usage, false);
    }

    pub fn is_empty(&self) -> bool {
        self.image_barriers.is_empty() && self.buffer_barriers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.image_barriers.len() + self.buffer_barriers.len()
    }

    /// Combined `(source, destination)` stage masks of the batch.
    pub fn stage_masks(&self) -> (vk::PipelineStageFlags, vk::PipelineStageFlags) {
        (self.src_stage_mask, self.dst_stage_mask)
    }

    /// Record all barriers as one pipeline barrier command.
    ///
    /// Does nothing if the batch is empty.
    pub fn record(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        if self.is_empty() {
            return;
        }
        debug_assert!(!self.src_stage_mask.is_empty() && !self.dst_stage_mask.is_empty());

        unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                self.src_stage_mask,
                self.dst_stage_mask,
                vk::DependencyFlags::empty(),
                &[],
                &self.buffer_barriers,
                &self.image_barriers,
            );
        }
    }

    pub fn clear(&mut self) {
        self.image_barriers.clear();
        self.buffer_barriers.clear();
        self.src_stage_mask = vk::PipelineStageFlags::empty();
        self.dst_stage_mask = vk::PipelineStageFlags::empty();
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    fn color_range() -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        }
    }

    #[test]
    fn test_unchanged_read_usage_is_skipped() {
        let mut batch = BarrierBatch::new();
        batch.add_image_transition(
            vk::Image::from_raw(1),
            color_range(),
            ResourceUsage::SHADER_RESOURCE,
            ResourceUsage::SHADER_RESOURCE,
        );
        assert!(batch.is_empty());
    }

    #[test]
    fn test_unchanged_write_usage_is_kept() {
        let mut batch = BarrierBatch::new();
        batch.add_buffer_transition(
            vk::Buffer::from_raw(1),
            ResourceUsage::UNORDERED_ACCESS,
            ResourceUsage::UNORDERED_ACCESS,
        );
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_stage_masks_accumulate() {
        let mut batch = BarrierBatch::new();
        batch.add_image_transition(
            vk::Image::from_raw(1),
            color_range(),
            ResourceUsage::UNDEFINED,
            ResourceUsage::COPY_DEST,
        );
        batch.add_image_transition(
            vk::Image::from_raw(2),
            color_range(),
            ResourceUsage::RENDER_TARGET,
            ResourceUsage::SHADER_RESOURCE_PIXEL,
        );

        let (src, dst) = batch.stage_masks();
        assert_eq!(
            src,
            vk::PipelineStageFlags::TOP_OF_PIPE | vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
        assert_eq!(
            dst,
            vk::PipelineStageFlags::TRANSFER | vk::PipelineStageFlags::FRAGMENT_SHADER
        );
        assert_eq!(batch.len(), 2);

        batch.clear();
        assert!(batch.is_empty());
        assert_eq!(batch.stage_masks().0, vk::PipelineStageFlags::empty());
    }
}
