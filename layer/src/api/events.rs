//! Callback registry for external collaborators.

use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;

use super::device::{CommandQueue, EffectRuntime, Swapchain, SwapchainDesc};

type SwapchainCallback = Box<dyn Fn(&dyn Swapchain) + Send + Sync>;
type CreateSwapchainCallback = Box<dyn Fn(&mut SwapchainDesc) -> bool + Send + Sync>;
type FullscreenCallback = Box<dyn Fn(&dyn Swapchain, bool) -> bool + Send + Sync>;
type PresentCallback = Box<dyn Fn(&dyn CommandQueue, &dyn Swapchain) + Send + Sync>;

/// Builds the runtime for a new swap-chain lineage.
pub type RuntimeFactory = Box<dyn Fn(&dyn Swapchain) -> Option<Arc<dyn EffectRuntime>> + Send + Sync>;

/// Registered callbacks, invoked in registration order.
#[derive(Default)]
pub struct EventRegistry {
    init_swapchain: RwLock<Vec<SwapchainCallback>>,
    destroy_swapchain: RwLock<Vec<SwapchainCallback>>,
    create_swapchain: RwLock<Vec<CreateSwapchainCallback>>,
    set_fullscreen_state: RwLock<Vec<FullscreenCallback>>,
    present: RwLock<Vec<PresentCallback>>,
    runtime_factory: RwLock<Option<RuntimeFactory>>,
}

static EVENTS: LazyLock<EventRegistry> = LazyLock::new(EventRegistry::default);

/// The process-wide event registry.
pub fn events() -> &'static EventRegistry {
    &EVENTS
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called after a swap-chain was created or re-created.
    pub fn on_init_swapchain(&self, f: impl Fn(&dyn Swapchain) + Send + Sync + 'static) {
        self.init_swapchain.write().push(Box::new(f));
    }

    /// Called before a swap-chain is destroyed or re-created.
    pub fn on_destroy_swapchain(&self, f: impl Fn(&dyn Swapchain) + Send + Sync + 'static) {
        self.destroy_swapchain.write().push(Box::new(f));
    }

    /// Called before the native swap-chain create. Return `true` after
    /// changing the description.
    pub fn on_create_swapchain(
        &self,
        f: impl Fn(&mut SwapchainDesc) -> bool + Send + Sync + 'static,
    ) {
        self.create_swapchain.write().push(Box::new(f));
    }

    /// Called before a full-screen state change. Return `true` to veto it.
    pub fn on_set_fullscreen_state(
        &self,
        f: impl Fn(&dyn Swapchain, bool) -> bool + Send + Sync + 'static,
    ) {
        self.set_fullscreen_state.write().push(Box::new(f));
    }

    /// Called on every present, before the native present is forwarded.
    pub fn on_present(&self, f: impl Fn(&dyn CommandQueue, &dyn Swapchain) + Send + Sync + 'static) {
        self.present.write().push(Box::new(f));
    }

    /// Install the runtime factory, replacing any previous one.
    pub fn set_runtime_factory(
        &self,
        f: impl Fn(&dyn Swapchain) -> Option<Arc<dyn EffectRuntime>> + Send + Sync + 'static,
    ) {
        *self.runtime_factory.write() = Some(Box::new(f));
    }

    pub(crate) fn invoke_init_swapchain(&self, swapchain: &dyn Swapchain) {
        for f in self.init_swapchain.read().iter() {
            f(swapchain);
        }
    }

    pub(crate) fn invoke_destroy_swapchain(&self, swapchain: &dyn Swapchain) {
        for f in self.destroy_swapchain.read().iter() {
            f(swapchain);
        }
    }

    /// Returns `true` if any callback changed `desc`.
    pub(crate) fn invoke_create_swapchain(&self, desc: &mut SwapchainDesc) -> bool {
        let mut modified = false;
        for f in self.create_swapchain.read().iter() {
            modified |= f(desc);
        }
        modified
    }

    /// Returns `true` if any callback vetoed the change.
    pub(crate) fn invoke_set_fullscreen_state(&self, swapchain: &dyn Swapchain, fullscreen: bool) -> bool {
        let mut vetoed = false;
        for f in self.set_fullscreen_state.read().iter() {
            vetoed |= f(swapchain, fullscreen);
        }
        vetoed
    }

    pub(crate) fn invoke_present(&self, queue: &dyn CommandQueue, swapchain: &dyn Swapchain) {
        for f in self.present.read().iter() {
            f(queue, swapchain);
        }
    }

    pub(crate) fn create_runtime(&self, swapchain: &dyn Swapchain) -> Option<Arc<dyn EffectRuntime>> {
        self.runtime_factory.read().as_ref().and_then(|f| f(swapchain))
    }

    /// Drop every callback and the runtime factory.
    pub fn clear(&self) {
        self.init_swapchain.write().clear();
        self.destroy_swapchain.write().clear();
        self.create_swapchain.write().clear();
        self.set_fullscreen_state.write().clear();
        self.present.write().clear();
        *self.runtime_factory.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::format::Format;

    #[test]
    fn test_create_swapchain_callbacks_amend_description() {
        let registry = EventRegistry::new();
        registry.on_create_swapchain(|_| false);
        registry.on_create_swapchain(|desc| {
            desc.back_buffer_count = desc.back_buffer_count.max(3);
            desc.format = Format::B8G8R8A8Unorm;
            true
        });

        let mut desc = SwapchainDesc {
            back_buffer_count: 2,
            ..Default::default()
        };
        assert!(registry.invoke_create_swapchain(&mut desc));
        assert_eq!(desc.back_buffer_count, 3);
        assert_eq!(desc.format, Format::B8G8R8A8Unorm);
    }

    #[test]
    fn test_untouched_description_reports_unmodified() {
        let registry = EventRegistry::new();
        let mut desc = SwapchainDesc::default();
        assert!(!registry.invoke_create_swapchain(&mut desc));

        registry.on_create_swapchain(|_| false);
        registry.clear();
        assert!(!registry.invoke_create_swapchain(&mut desc));
    }
}
