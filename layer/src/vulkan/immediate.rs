//! The layer's own command stream on a graphics queue.
//!
//! Work the application never asked for (uploads, layout transitions, present
//! synchronization) is recorded here and submitted on the next flush. Command
//! buffers rotate through a fixed ring so flushing never grows memory and only
//! blocks when the slot about to be reused is still executing.

use std::sync::Arc;

use ash::vk;
use static_assertions::const_assert;

use super::command::VulkanCommandList;
use super::device::DeviceContext;
use super::sync::{create_fence, create_semaphore, wait_fence};
use crate::error::LayerResult;
use crate::profile_scope;

/// Command buffers in the ring.
pub const RING_SIZE: usize = 4;

const_assert!(RING_SIZE.is_power_of_two());

/// Slot bookkeeping for the command buffer ring.
#[derive(Debug, Clone, Default)]
pub(crate) struct SubmissionRing {
    index: usize,
    submitted: [bool; RING_SIZE],
}

impl SubmissionRing {
    pub fn current(&self) -> usize {
        self.index
    }

    pub fn mark_submitted(&mut self) {
        self.submitted[self.index] = true;
    }

    pub fn is_submitted(&self, slot: usize) -> bool {
        self.submitted[slot]
    }

    /// Move to the next slot. Returns it if its previous submission must be
    /// waited on before reuse.
    pub fn advance(&mut self) -> Option<usize> {
        self.index = (self.index + 1) & (RING_SIZE - 1);
        self.submitted[self.index].then_some(self.index)
    }

    /// The GPU is done with `slot`.
    pub fn retire(&mut self, slot: usize) {
        self.submitted[slot] = false;
    }

    /// Make the current slot recordable, calling `wait` first if it is still
    /// in flight. A failed wait leaves the slot submitted.
    pub fn acquire(&mut self, wait: impl FnOnce(usize) -> LayerResult<()>) -> LayerResult<usize> {
        let slot = self.index;
        if self.submitted[slot] {
            wait(slot)?;
            self.retire(slot);
        }
        Ok(slot)
    }

    pub fn in_flight(&self) -> usize {
        self.submitted.iter().filter(|submitted| **submitted).count()
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    cmd: vk::CommandBuffer,
    fence: vk::Fence,
    semaphore: vk::Semaphore,
}

/// Immediate command list of one queue.
///
/// Always open for recording between calls.
pub struct ImmediateCommandList {
    ctx: Arc<DeviceContext>,
    queue: vk::Queue,
    pool: vk::CommandPool,
    slots: Vec<Slot>,
    ring: SubmissionRing,
    recorder: VulkanCommandList,
    /// Signaled by the last flush that nobody has waited on yet.
    pending: Option<vk::Semaphore>,
    /// The current slot's command buffer is begun.
    open: bool,
}

impl ImmediateCommandList {
    pub fn new(ctx: Arc<DeviceContext>, queue: vk::Queue, family_index: u32) -> LayerResult<Self> {
        let device = &ctx.device;
        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(family_index);
        let pool = unsafe { device.create_command_pool(&pool_info, None) }?;

        let mut slots = Vec::with_capacity(RING_SIZE);
        if let Err(e) = Self::create_slots(&ctx, pool, &mut slots) {
            Self::destroy_slots(device, pool, &slots);
            return Err(e);
        }

        let first = slots[0].cmd;
        let mut this = Self {
            recorder: VulkanCommandList::new(Arc::clone(&ctx), first),
            ctx,
            queue,
            pool,
            slots,
            ring: SubmissionRing::default(),
            pending: None,
            open: false,
        };
        if let Err(e) = this.reopen(0) {
            this.destroy();
            return Err(e);
        }
        log::debug!("immediate command list created on queue family {family_index}");
        Ok(this)
    }

    fn create_slots(
        ctx: &DeviceContext,
        pool: vk::CommandPool,
        slots: &mut Vec<Slot>,
    ) -> LayerResult<()> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(RING_SIZE as u32);
        let buffers = unsafe { ctx.device.allocate_command_buffers(&alloc_info) }?;
        for cmd in buffers {
            // Command buffers are dispatchable and need the loader's dispatch table.
            ctx.set_loader_data(cmd)?;
            let fence = create_fence(&ctx.device, false)?;
            let semaphore = match create_semaphore(&ctx.device) {
                Ok(semaphore) => semaphore,
                Err(e) => {
                    unsafe { ctx.device.destroy_fence(fence, None) };
                    return Err(e);
                }
            };
            slots.push(Slot {
                cmd,
                fence,
                semaphore,
            });
        }
        Ok(())
    }

    fn destroy_slots(device: &ash::Device, pool: vk::CommandPool, slots: &[Slot]) {
        for slot in slots {
            unsafe {
                device.destroy_fence(slot.fence, None);
                device.destroy_semaphore(slot.semaphore, None);
            }
        }
        // Destroying the pool frees its command buffers.
        unsafe { device.destroy_command_pool(pool, None) };
    }

    /// Recorder writing into the current ring slot.
    pub fn recorder(&mut self) -> &mut VulkanCommandList {
        &mut self.recorder
    }

    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.recorder.command_buffer()
    }

    pub fn has_commands(&self) -> bool {
        self.recorder.has_commands()
    }

    /// Begin the current slot if the last flush could not.
    ///
    /// Fails while the slot's previous submission is still executing.
    pub fn ensure_open(&mut self) -> LayerResult<()> {
        if self.open {
            return Ok(());
        }
        let slot = self
            .ring
            .acquire(|slot| Self::wait_slot(&self.ctx, &self.slots[slot]))?;
        self.reopen(slot)
    }

    /// Submit recorded work.
    ///
    /// The submission waits on `wait` (and on the previous unconsumed flush).
    /// With `Some`, the list is replaced by the semaphore this submission
    /// signals; with `None` the next flush waits on it instead. Blocks only
    /// if the next ring slot is still executing.
    pub fn flush(&mut self, wait: Option<&mut Vec<vk::Semaphore>>) -> LayerResult<()> {
        self.ensure_open()?;
        if !self.recorder.has_commands() {
            // Hand an unconsumed signal to the caller so it is waited on exactly once.
            if let Some(list) = wait {
                list.extend(self.pending.take());
            }
            return Ok(());
        }
        profile_scope!("immediate_flush");

        let slot = self.ring.current();
        let mut wait_semaphores: Vec<vk::Semaphore> = self.pending.into_iter().collect();
        if let Some(list) = wait.as_deref() {
            wait_semaphores.extend_from_slice(list);
        }
        if let Err(e) = self.submit(slot, &wait_semaphores) {
            log::error!("immediate command list submission failed: {e}");
            self.reopen(slot)?;
            return Err(e);
        }
        self.ring.mark_submitted();
        self.open = false;

        let signal = self.slots[slot].semaphore;
        self.pending = None;
        match wait {
            Some(list) => {
                list.clear();
                list.push(signal);
            }
            None => self.pending = Some(signal),
        }

        // This submission went through; a stuck next slot only keeps the list
        // closed until a later call manages to retire it.
        self.ring.advance();
        if let Err(e) = self.ensure_open() {
            log::warn!("immediate slot {} not reusable yet: {e}", self.ring.current());
        }
        Ok(())
    }

    /// Flush, then block until the submitted work has completed.
    pub fn flush_and_wait(&mut self) -> LayerResult<()> {
        if !self.recorder.has_commands() {
            return Ok(());
        }
        let slot = self.ring.current();
        self.flush(None)?;
        wait_fence(
            &self.ctx.device,
            self.slots[slot].fence,
            self.ctx.fence_timeout_ns(),
        )
    }

    fn submit(&self, slot: usize, wait_semaphores: &[vk::Semaphore]) -> LayerResult<()> {
        let Slot {
            cmd,
            fence,
            semaphore,
        } = self.slots[slot];
        let device = &self.ctx.device;
        unsafe { device.end_command_buffer(cmd) }?;

        let wait_stages = vec![vk::PipelineStageFlags::ALL_COMMANDS; wait_semaphores.len()];
        let command_buffers = [cmd];
        let signal_semaphores = [semaphore];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);
        unsafe { device.queue_submit(self.queue, &[submit_info], fence) }?;
        log::trace!(
            "immediate slot {slot} submitted, waiting on {} semaphores",
            wait_semaphores.len()
        );
        Ok(())
    }

    /// Wait for a slot to finish executing so it can be recorded again.
    fn wait_slot(ctx: &DeviceContext, slot: &Slot) -> LayerResult<()> {
        profile_scope!("immediate_retire");
        wait_fence(&ctx.device, slot.fence, ctx.fence_timeout_ns())?;
        if let Err(e) = unsafe { ctx.device.reset_fences(&[slot.fence]) } {
            log::error!("failed to reset immediate fence: {e:?}");
            return Err(e.into());
        }
        Ok(())
    }

    fn reopen(&mut self, slot: usize) -> LayerResult<()> {
        let cmd = self.slots[slot].cmd;
        let device = &self.ctx.device;
        let begin_info =
            vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
            device.begin_command_buffer(cmd, &begin_info)?;
        }
        self.recorder.reset(cmd);
        self.open = true;
        Ok(())
    }

    /// Destroy the native objects. The queue must be idle.
    pub fn destroy(&mut self) {
        if self.pool == vk::CommandPool::null() {
            return;
        }
        let device = &self.ctx.device;
        let in_flight: Vec<_> = (0..RING_SIZE)
            .filter(|slot| self.ring.is_submitted(*slot))
            .map(|slot| self.slots[slot].fence)
            .collect();
        if !in_flight.is_empty() {
            if let Err(e) =
                unsafe { device.wait_for_fences(&in_flight, true, self.ctx.fence_timeout_ns()) }
            {
                log::warn!("immediate command list destroyed with work in flight: {e:?}");
            }
        }
        Self::destroy_slots(device, self.pool, &self.slots);
        self.slots.clear();
        self.pool = vk::CommandPool::null();
        self.pending = None;
    }
}

impl Drop for ImmediateCommandList {
    fn drop(&mut self) {
        if self.pool != vk::CommandPool::null() {
            log::warn!("immediate command list dropped without destroy, leaking native objects");
        }
    }
}

impl std::fmt::Debug for ImmediateCommandList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImmediateCommandList")
            .field("queue", &self.queue)
            .field("slot", &self.ring.current())
            .field("in_flight", &self.ring.in_flight())
            .field("has_commands", &self.recorder.has_commands())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_wraps_at_size() {
        let mut ring = SubmissionRing::default();
        for expected in [1, 2, 3, 0, 1] {
            ring.advance();
            assert_eq!(ring.current(), expected);
        }
    }

    #[test]
    fn test_ring_blocks_after_full_cycle() {
        let mut ring = SubmissionRing::default();
        for _ in 0..RING_SIZE - 1 {
            ring.mark_submitted();
            assert_eq!(ring.advance(), None);
        }
        ring.mark_submitted();
        assert_eq!(ring.in_flight(), RING_SIZE);

        // The fifth flush lands on slot 0, which is still in flight.
        assert_eq!(ring.advance(), Some(0));
        ring.retire(0);
        assert_eq!(ring.in_flight(), RING_SIZE - 1);
        assert!(!ring.is_submitted(0));
    }

    #[test]
    fn test_ring_keeps_slot_when_wait_fails() {
        let mut ring = SubmissionRing::default();
        for _ in 0..RING_SIZE {
            ring.mark_submitted();
            ring.advance();
        }
        assert_eq!(ring.current(), 0);

        let timed_out = ring.acquire(|_| Err(vk::Result::TIMEOUT.into()));
        assert!(timed_out.is_err());
        assert!(ring.is_submitted(0));
        assert_eq!(ring.in_flight(), RING_SIZE);

        let mut waited = None;
        let slot = ring.acquire(|slot| {
            waited = Some(slot);
            Ok(())
        });
        assert_eq!(slot.ok(), Some(0));
        assert_eq!(waited, Some(0));
        assert!(!ring.is_submitted(0));
    }

    #[test]
    fn test_ring_idle_slot_skips_wait() {
        let mut ring = SubmissionRing::default();
        let slot = ring.acquire(|_| panic!("idle slot must not be waited on"));
        assert_eq!(slot.ok(), Some(0));
    }

    #[test]
    fn test_ring_retired_slot_needs_no_wait() {
        let mut ring = SubmissionRing::default();
        ring.mark_submitted();
        ring.retire(0);
        for _ in 0..RING_SIZE {
            assert_eq!(ring.advance(), None);
        }
        assert_eq!(ring.current(), 0);
    }
}
