//! Opaque object handles exposed to collaborators.
//!
//! Every handle wraps the native 64-bit value unchanged; the layer never mints
//! its own identifiers.

macro_rules! define_handle {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
            #[repr(transparent)]
            pub struct $name(u64);

            impl $name {
                /// The null handle.
                pub const NULL: Self = Self(0);

                /// Wrap a native handle value.
                #[inline]
                pub const fn from_raw(raw: u64) -> Self {
                    Self(raw)
                }

                /// The native handle value.
                #[inline]
                pub const fn raw(self) -> u64 {
                    self.0
                }

                /// Returns `true` for the null handle.
                #[inline]
                pub const fn is_null(self) -> bool {
                    self.0 == 0
                }
            }
        )*
    };
}

define_handle! {
    /// A buffer or texture.
    ResourceHandle;
    /// A view onto a resource (image view or buffer view).
    ResourceViewHandle;
    /// A sampler.
    SamplerHandle;
    /// A graphics or compute pipeline.
    PipelineHandle;
    /// A pipeline layout.
    PipelineLayoutHandle;
    /// A descriptor set layout.
    DescriptorSetLayoutHandle;
    /// A descriptor set.
    DescriptorSetHandle;
    /// A render pass.
    RenderPassHandle;
    /// A framebuffer.
    FramebufferHandle;
    /// A query pool.
    QueryPoolHandle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_is_native_value() {
        let handle = ResourceHandle::from_raw(0xdead_beef);
        assert_eq!(handle.raw(), 0xdead_beef);
        assert!(!handle.is_null());
        assert!(ResourceHandle::NULL.is_null());
        assert_eq!(ResourceHandle::default(), ResourceHandle::NULL);
    }
}
