//! Layer error types.

use ash::vk;

/// Errors produced by the layer.
///
/// Native failures are carried unmodified in [`LayerError::Vulkan`] so the
/// hook surface can hand the exact driver code back to the application.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayerError {
    /// A native call returned an error code.
    #[error("vulkan call failed: {0}")]
    Vulkan(vk::Result),
    /// A handle table has no free slot left.
    #[error("handle registry is full")]
    RegistryFull,
    /// No record is attached to the handle.
    #[error("no record for handle {0:#x}")]
    HandleNotFound(u64),
    /// An invalid parameter was provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// Failed to create a resource.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// The memory allocator rejected a request.
    #[error("allocation failed: {0}")]
    Allocation(String),
    /// Out of GPU memory.
    #[error("out of GPU memory")]
    OutOfMemory,
    /// The GPU device was lost.
    #[error("GPU device lost")]
    DeviceLost,
    /// A requested feature is not supported.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used throughout the layer.
pub type LayerResult<T> = Result<T, LayerError>;

impl LayerError {
    /// Native return code to report to the application for this error.
    pub fn to_vk_result(&self) -> vk::Result {
        match self {
            Self::Vulkan(result) => *result,
            Self::RegistryFull => vk::Result::ERROR_OUT_OF_HOST_MEMORY,
            Self::OutOfMemory | Self::Allocation(_) => vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            Self::DeviceLost => vk::Result::ERROR_DEVICE_LOST,
            Self::Unsupported(_) => vk::Result::ERROR_FEATURE_NOT_PRESENT,
            Self::HandleNotFound(_)
            | Self::InvalidParameter(_)
            | Self::ResourceCreationFailed(_)
            | Self::Internal(_) => vk::Result::ERROR_INITIALIZATION_FAILED,
        }
    }
}

impl From<vk::Result> for LayerError {
    fn from(result: vk::Result) -> Self {
        Self::Vulkan(result)
    }
}

impl From<gpu_allocator::AllocationError> for LayerError {
    fn from(error: gpu_allocator::AllocationError) -> Self {
        match error {
            gpu_allocator::AllocationError::OutOfMemory => Self::OutOfMemory,
            other => Self::Allocation(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LayerError::OutOfMemory;
        assert_eq!(err.to_string(), "out of GPU memory");

        let err = LayerError::HandleNotFound(0xdead);
        assert_eq!(err.to_string(), "no record for handle 0xdead");
    }

    #[test]
    fn test_native_code_passes_through() {
        let err: LayerError = vk::Result::ERROR_OUT_OF_DATE_KHR.into();
        assert_eq!(err.to_vk_result(), vk::Result::ERROR_OUT_OF_DATE_KHR);
    }

    #[test]
    fn test_layer_errors_map_to_native_codes() {
        assert_eq!(
            LayerError::RegistryFull.to_vk_result(),
            vk::Result::ERROR_OUT_OF_HOST_MEMORY
        );
        assert_eq!(
            LayerError::OutOfMemory.to_vk_result(),
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
        );
        assert_eq!(
            LayerError::InvalidParameter("zero size".into()).to_vk_result(),
            vk::Result::ERROR_INITIALIZATION_FAILED
        );
    }

    #[test]
    fn test_allocator_out_of_memory() {
        let err: LayerError = gpu_allocator::AllocationError::OutOfMemory.into();
        assert_eq!(err, LayerError::OutOfMemory);
    }
}
