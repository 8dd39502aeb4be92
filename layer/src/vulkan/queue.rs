//! Queues and their immediate command lists.

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ash::vk;
use ash::vk::Handle;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use super::debug;
use super::device::{DeviceContext, QueueInfo};
use super::immediate::ImmediateCommandList;
use crate::api::{CommandList, CommandQueue, QueueType};
use crate::error::LayerResult;

pub(crate) fn convert_queue_flags(flags: vk::QueueFlags) -> QueueType {
    let mut ty = QueueType::empty();
    if flags.contains(vk::QueueFlags::GRAPHICS) {
        ty |= QueueType::GRAPHICS;
    }
    if flags.contains(vk::QueueFlags::COMPUTE) {
        ty |= QueueType::COMPUTE;
    }
    // Graphics and compute queues support transfers implicitly.
    if flags.intersects(vk::QueueFlags::TRANSFER | vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE) {
        ty |= QueueType::COPY;
    }
    ty
}

/// Queues of a graphics-capable family carry an immediate command list.
pub(crate) fn owns_immediate_list(flags: vk::QueueFlags) -> bool {
    flags.contains(vk::QueueFlags::GRAPHICS)
}

type ImmediateSlot = ReentrantMutex<RefCell<Option<ImmediateCommandList>>>;

/// A native queue. Queue-affecting calls are serialized by a re-entrant lock
/// so the same thread can flush from inside a present hook.
pub struct VulkanQueue {
    ctx: Arc<DeviceContext>,
    queue: vk::Queue,
    family_index: u32,
    flags: vk::QueueFlags,
    has_immediate: AtomicBool,
    immediate: ImmediateSlot,
}

impl VulkanQueue {
    pub fn new(ctx: Arc<DeviceContext>, info: &QueueInfo) -> LayerResult<Self> {
        let immediate = if owns_immediate_list(info.flags) {
            Some(ImmediateCommandList::new(
                Arc::clone(&ctx),
                info.queue,
                info.family_index,
            )?)
        } else {
            None
        };
        Ok(Self {
            ctx,
            queue: info.queue,
            family_index: info.family_index,
            flags: info.flags,
            has_immediate: AtomicBool::new(immediate.is_some()),
            immediate: ReentrantMutex::new(RefCell::new(immediate)),
        })
    }

    pub fn handle(&self) -> vk::Queue {
        self.queue
    }

    pub fn family_index(&self) -> u32 {
        self.family_index
    }

    /// Never blocks, so it is safe to call from inside [`Self::with_immediate`].
    pub fn has_immediate_command_list(&self) -> bool {
        self.has_immediate.load(Ordering::Acquire)
    }

    /// Hold the queue lock across a sequence of queue operations.
    pub(crate) fn lock(&self) -> ReentrantMutexGuard<'_, RefCell<Option<ImmediateCommandList>>> {
        self.immediate.lock()
    }

    /// Run `f` on the immediate command list.
    ///
    /// Returns `None` if the queue has no immediate list or the calling thread
    /// is already inside `with_immediate` on this queue. Also `None` while the
    /// list's next command buffer is still executing.
    pub(crate) fn with_immediate<R>(
        &self,
        f: impl FnOnce(&mut ImmediateCommandList) -> R,
    ) -> Option<R> {
        let guard = self.immediate.lock();
        let Ok(mut slot) = guard.try_borrow_mut() else {
            log::warn!("immediate command list of queue {:#x} is already in use", self.queue.as_raw());
            return None;
        };
        let immediate = slot.as_mut()?;
        if let Err(e) = immediate.ensure_open() {
            log::error!("immediate command list of queue {:#x} is not recordable: {e}", self.queue.as_raw());
            return None;
        }
        Some(f(immediate))
    }

    /// Submit pending immediate work.
    pub fn flush(&self) {
        if let Some(Err(e)) = self.with_immediate(|imm| imm.flush(None)) {
            log::error!("failed to flush immediate command list: {e}");
        }
    }

    /// Submit pending immediate work waiting on `wait`, which is replaced by
    /// what a subsequent present must wait on.
    pub fn flush_with_semaphores(&self, wait: &mut Vec<vk::Semaphore>) -> LayerResult<()> {
        self.with_immediate(|imm| imm.flush(Some(wait)))
            .unwrap_or(Ok(()))
    }

    /// Submit an empty batch that waits on `wait` and signals `signal`.
    pub(crate) fn signal_after(
        &self,
        wait: &[vk::Semaphore],
        signal: vk::Semaphore,
    ) -> LayerResult<()> {
        let _guard = self.lock();
        let wait_stages = vec![vk::PipelineStageFlags::ALL_COMMANDS; wait.len()];
        let signal_semaphores = [signal];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(wait)
            .wait_dst_stage_mask(&wait_stages)
            .signal_semaphores(&signal_semaphores);
        unsafe {
            self.ctx
                .device
                .queue_submit(self.queue, &[submit_info], vk::Fence::null())
        }
        .map_err(|e| {
            log::error!("semaphore chaining submit failed: {e:?}");
            e.into()
        })
    }

    /// Release the immediate command list. The device must be idle.
    pub fn destroy(&self) {
        let guard = self.immediate.lock();
        let Ok(mut slot) = guard.try_borrow_mut() else {
            log::error!("queue destroyed while its immediate command list is in use");
            return;
        };
        self.has_immediate.store(false, Ordering::Release);
        if let Some(mut immediate) = slot.take() {
            immediate.destroy();
        }
    }
}

impl std::fmt::Debug for VulkanQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanQueue")
            .field("queue", &self.queue)
            .field("family_index", &self.family_index)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl CommandQueue for VulkanQueue {
    fn native(&self) -> u64 {
        self.queue.as_raw()
    }

    fn queue_type(&self) -> QueueType {
        convert_queue_flags(self.flags)
    }

    fn wait_idle(&self) {
        let _guard = self.lock();
        self.flush();
        if let Err(e) = unsafe { self.ctx.device.queue_wait_idle(self.queue) } {
            log::error!("vkQueueWaitIdle failed: {e:?}");
        }
    }

    fn flush_immediate_command_list(&self) {
        self.flush();
    }

    fn with_immediate_command_list(&self, f: &mut dyn FnMut(&mut dyn CommandList)) -> bool {
        self.with_immediate(|imm| f(imm.recorder())).is_some()
    }

    fn begin_debug_event(&self, label: &str, color: [f32; 4]) {
        if let Some(debug_utils) = &self.ctx.debug_utils_fn {
            let _guard = self.lock();
            debug::queue_begin_label(debug_utils, self.queue, label, color);
        }
    }

    fn end_debug_event(&self) {
        if let Some(debug_utils) = &self.ctx.debug_utils_fn {
            let _guard = self.lock();
            debug::queue_end_label(debug_utils, self.queue);
        }
    }

    fn insert_debug_marker(&self, label: &str, color: [f32; 4]) {
        if let Some(debug_utils) = &self.ctx.debug_utils_fn {
            let _guard = self.lock();
            debug::queue_insert_label(debug_utils, self.queue, label, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_flags_conversion() {
        assert_eq!(
            convert_queue_flags(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            QueueType::all()
        );
        assert_eq!(
            convert_queue_flags(vk::QueueFlags::TRANSFER),
            QueueType::COPY
        );
        assert_eq!(
            convert_queue_flags(vk::QueueFlags::COMPUTE),
            QueueType::COMPUTE | QueueType::COPY
        );
        assert_eq!(convert_queue_flags(vk::QueueFlags::SPARSE_BINDING), QueueType::empty());
    }

    #[test]
    fn test_only_graphics_families_own_immediate_lists() {
        assert!(owns_immediate_list(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE));
        assert!(owns_immediate_list(vk::QueueFlags::GRAPHICS));
        assert!(!owns_immediate_list(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER));
        assert!(!owns_immediate_list(vk::QueueFlags::TRANSFER));
    }
}
