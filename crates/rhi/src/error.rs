//! RHI error types and their recovery classification.

use ash::vk;
use thiserror::Error;

/// How a caller is expected to react to an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Surface went stale; recovered by recreating the swapchain.
    Transient,
    /// Descriptor pool ran out; recovered by growing once.
    Exhaustion,
    /// Anything else. The run cannot continue.
    Fatal,
}

impl ErrorKind {
    /// Classifies a raw driver result.
    pub fn of(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::SUBOPTIMAL_KHR => ErrorKind::Transient,
            vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL => {
                ErrorKind::Exhaustion
            }
            _ => ErrorKind::Fatal,
        }
    }
}

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load Vulkan
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// Another thread panicked while holding the allocator lock.
    #[error("GPU allocator lock poisoned")]
    AllocatorPoisoned,

    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// None of the candidate formats supports the requested features.
    #[error("Unsupported format: no candidate in {candidates:?} supports {features:?}")]
    UnsupportedFormat {
        candidates: Vec<vk::Format>,
        features: vk::FormatFeatureFlags,
    },

    /// The barrier table has no entry for this layout pair.
    #[error("Unsupported layout transition {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },

    /// Allocation still failed after the pool was grown.
    #[error("Descriptor allocation failed after growing pool to {budget} sets: {result}")]
    DescriptorPoolExhausted { budget: u32, result: vk::Result },

    #[error("Shader error: {0}")]
    ShaderError(String),

    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// A caller passed a value the RHI cannot act on.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl RhiError {
    /// Recovery class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RhiError::VulkanError(result) => ErrorKind::of(*result),
            _ => ErrorKind::Fatal,
        }
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_results() {
        assert_eq!(
            ErrorKind::of(vk::Result::ERROR_OUT_OF_DATE_KHR),
            ErrorKind::Transient
        );
        assert_eq!(ErrorKind::of(vk::Result::SUBOPTIMAL_KHR), ErrorKind::Transient);
    }

    #[test]
    fn test_exhaustion_results() {
        assert_eq!(
            ErrorKind::of(vk::Result::ERROR_OUT_OF_POOL_MEMORY),
            ErrorKind::Exhaustion
        );
        assert_eq!(
            ErrorKind::of(vk::Result::ERROR_FRAGMENTED_POOL),
            ErrorKind::Exhaustion
        );
    }

    #[test]
    fn test_everything_else_is_fatal() {
        for result in [
            vk::Result::ERROR_DEVICE_LOST,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            vk::Result::ERROR_OUT_OF_HOST_MEMORY,
            vk::Result::ERROR_SURFACE_LOST_KHR,
            vk::Result::ERROR_FORMAT_NOT_SUPPORTED,
        ] {
            assert_eq!(ErrorKind::of(result), ErrorKind::Fatal, "{result:?}");
        }
    }

    #[test]
    fn test_error_kind_of_wrapped_errors() {
        assert_eq!(
            RhiError::from(vk::Result::ERROR_OUT_OF_POOL_MEMORY).kind(),
            ErrorKind::Exhaustion
        );
        let second_failure = RhiError::DescriptorPoolExhausted {
            budget: 11,
            result: vk::Result::ERROR_OUT_OF_POOL_MEMORY,
        };
        assert_eq!(second_failure.kind(), ErrorKind::Fatal);
        let transition = RhiError::UnsupportedLayoutTransition {
            old: vk::ImageLayout::PRESENT_SRC_KHR,
            new: vk::ImageLayout::GENERAL,
        };
        assert_eq!(transition.kind(), ErrorKind::Fatal);
    }
}
