use ash::vk;
use thiserror::Error;

/// Failure taxonomy of the renderer.
///
/// Startup code turns these into `color_eyre` reports with `?`. The frame loop inspects them to
/// decide between dropping a frame and shutting down.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("initialization failed: {0}")]
    InitializationFailure(String),

    #[error("resource allocation failed: {0}")]
    ResourceAllocationFailure(String),

    #[error("timed out waiting for {what}")]
    SynchronizationTimeout { what: &'static str },

    #[error("unsupported image layout transition {from:?} -> {to:?}")]
    UnsupportedLayoutTransition {
        from: vk::ImageLayout,
        to: vk::ImageLayout,
    },

    #[error("submission failed: {0}")]
    SubmissionFailure(vk::Result),

    #[error("{what} capacity exceeded (limit {limit})")]
    CapacityExceeded { what: &'static str, limit: usize },

    #[error("frame slot {0} is still recording")]
    SlotBusy(usize),

    #[error("invalid buffer write: {0}")]
    InvalidWrite(String),

    #[error(transparent)]
    Vulkan(#[from] vk::Result),
}

impl RenderError {
    /// Errors after which the frame loop can keep going
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SynchronizationTimeout { .. } | Self::SubmissionFailure(_)
        )
    }
}

pub type RenderResult<T> = std::result::Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_frame_level_errors_are_recoverable() {
        assert!(RenderError::SynchronizationTimeout { what: "frame fence" }.is_recoverable());
        assert!(RenderError::SubmissionFailure(vk::Result::ERROR_OUT_OF_DATE_KHR).is_recoverable());
        assert!(!RenderError::InitializationFailure("no adapter".into()).is_recoverable());
        assert!(!RenderError::Vulkan(vk::Result::ERROR_DEVICE_LOST).is_recoverable());
    }

    #[test]
    fn layout_error_names_both_layouts() {
        let err = RenderError::UnsupportedLayoutTransition {
            from: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            to: vk::ImageLayout::UNDEFINED,
        };
        let msg = err.to_string();
        assert!(msg.contains("SHADER_READ_ONLY_OPTIMAL"));
        assert!(msg.contains("UNDEFINED"));
    }
}
