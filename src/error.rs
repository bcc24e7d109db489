// Error types for pipeline and render pass construction
//
// Contract violations (out-of-order setup, double finalize, misuse of the
// render pass protocol) are assertions, not errors. Only conditions a caller
// can react to end up here.

use ash::vk;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Creation was asked to fail instead of compiling (module identifier path).
    /// Retry with real shader bytecode.
    #[error("pipeline creation requires compilation (VK_PIPELINE_COMPILE_REQUIRED)")]
    NotYetCompiled,

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("out of memory: {0:?}")]
    OutOfMemory(vk::Result),

    #[error("device error: {0:?}")]
    Device(vk::Result),
}

impl PipelineError {
    /// Classify a native creation result.
    ///
    /// `PIPELINE_COMPILE_REQUIRED` is only a recoverable status when the
    /// creation call was made with `FAIL_ON_PIPELINE_COMPILE_REQUIRED`.
    pub fn from_creation(result: vk::Result, fail_on_compile_required: bool) -> Self {
        match result {
            vk::Result::PIPELINE_COMPILE_REQUIRED if fail_on_compile_required => Self::NotYetCompiled,
            vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
                Self::OutOfMemory(result)
            }
            other => Self::Device(other),
        }
    }
}

impl From<vk::Result> for PipelineError {
    fn from(result: vk::Result) -> Self {
        Self::from_creation(result, false)
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_required_is_recoverable_only_when_requested() {
        assert_eq!(
            PipelineError::from_creation(vk::Result::PIPELINE_COMPILE_REQUIRED, true),
            PipelineError::NotYetCompiled
        );
        assert_eq!(
            PipelineError::from(vk::Result::PIPELINE_COMPILE_REQUIRED),
            PipelineError::Device(vk::Result::PIPELINE_COMPILE_REQUIRED)
        );
    }

    #[test]
    fn out_of_memory_is_distinguished() {
        assert_eq!(
            PipelineError::from(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            PipelineError::OutOfMemory(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)
        );
        assert_eq!(
            PipelineError::from(vk::Result::ERROR_DEVICE_LOST),
            PipelineError::Device(vk::Result::ERROR_DEVICE_LOST)
        );
    }
}
