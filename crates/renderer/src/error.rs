//! Renderer error types.

use thiserror::Error;
use vkframe_resources::ResourceError;
use vkframe_rhi::{ErrorKind, RhiError};

use crate::frame::FramePhase;

/// Errors raised by the frame orchestrator, texture upload and precompute.
#[derive(Error, Debug)]
pub enum RendererError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Core(#[from] vkframe_core::Error),

    /// `begin_frame` was called again before `end_frame`.
    #[error("Frame already started")]
    FrameAlreadyStarted,

    /// A recording call arrived while no frame was open.
    #[error("`{operation}` called outside a frame")]
    FrameNotStarted { operation: &'static str },

    /// A recording call arrived in the wrong phase of an open frame.
    #[error("`{operation}` called while the frame is {phase:?}")]
    OutOfOrder {
        operation: &'static str,
        phase: FramePhase,
    },

    /// The command handle passed in is not the one `begin_frame` returned.
    #[error("Command buffer does not belong to the current frame")]
    ForeignCommandBuffer,

    #[error("Precompute error: {0}")]
    Precompute(String),
}

impl RendererError {
    /// Error class for recovery decisions.
    ///
    /// Only RHI errors can carry a non-fatal kind; everything the renderer
    /// raises itself is a protocol or data error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Rhi(e) => e.kind(),
            _ => ErrorKind::Fatal,
        }
    }
}

/// Result type alias using [`RendererError`].
pub type RendererResult<T> = Result<T, RendererError>;

#[cfg(test)]
mod tests {
    use super::*;
    use vkframe_rhi::vk;

    #[test]
    fn test_kind_passes_through_rhi() {
        let err: RendererError = RhiError::VulkanError(vk::Result::ERROR_OUT_OF_DATE_KHR).into();
        assert_eq!(err.kind(), ErrorKind::Transient);

        let err: RendererError = RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST).into();
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }

    #[test]
    fn test_protocol_errors_are_fatal() {
        assert_eq!(RendererError::FrameAlreadyStarted.kind(), ErrorKind::Fatal);
        assert_eq!(
            RendererError::FrameNotStarted { operation: "end_frame" }.kind(),
            ErrorKind::Fatal
        );
    }
}
