// Error taxonomy for the renderer core
//
// Every failure surfaces to the caller of the entry point that triggered it.
// Nothing here is retried: each variant terminates the render loop.

use ash::prelude::VkResult;
use ash::vk;
use thiserror::Error;

/// Result type for renderer operations
pub type Result<T, E = RendererError> = std::result::Result<T, E>;

/// Which part of the per-frame protocol failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStep {
    WaitFence,
    ResetFence,
    Acquire,
    Record,
    Submit,
    Present,
    WaitIdle,
}

impl std::fmt::Display for FrameStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FrameStep::WaitFence => "wait for in-flight fence",
            FrameStep::ResetFence => "reset in-flight fence",
            FrameStep::Acquire => "acquire swapchain image",
            FrameStep::Record => "record command buffer",
            FrameStep::Submit => "submit command buffer",
            FrameStep::Present => "present swapchain image",
            FrameStep::WaitIdle => "wait for device idle",
        };
        f.write_str(name)
    }
}

/// Why a shader blob was rejected before or by the driver
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpirvError {
    #[error("shader blob is empty")]
    Empty,

    #[error("shader blob length {0} is not a multiple of 4")]
    Misaligned(usize),

    #[error("shader blob has bad magic number {0:#010x}")]
    BadMagic(u32),

    #[error("driver rejected shader module: {0}")]
    Driver(vk::Result),
}

/// Renderer errors, grouped by [`ErrorKind`]
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("failed to load the Vulkan library: {0}")]
    Loader(#[from] ash::LoadingError),

    #[error("initialization failed at `{step}`: {result}")]
    Init {
        step: &'static str,
        #[source]
        result: vk::Result,
    },

    #[error("surface provider reported no instance extensions")]
    NoInstanceExtensions,

    #[error("no Vulkan physical device available")]
    NoPhysicalDevice,

    #[error("no suitable queue family (graphics: {graphics:?}, present: {present:?})")]
    NoSuitableQueueFamily {
        graphics: Option<u32>,
        present: Option<u32>,
    },

    #[error("no memory type in {type_bits:#b} supports {required:?}")]
    NoSuitableMemoryType {
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    },

    #[error("surface reports no formats")]
    NoSurfaceFormat,

    #[error("swapchain creation failed at `{step}`: {result}")]
    SwapchainCreate {
        step: &'static str,
        #[source]
        result: vk::Result,
    },

    #[error("shader module creation failed: {0}")]
    ShaderCompile(#[from] SpirvError),

    #[error("pipeline creation failed at `{step}`: {result}")]
    PipelineCreate {
        step: &'static str,
        #[source]
        result: vk::Result,
    },

    #[error("render called before the graphics pipeline was created")]
    PipelineNotCreated,

    #[error("frame failed to {step}: {result}")]
    FrameExecution {
        step: FrameStep,
        #[source]
        result: vk::Result,
    },

    #[error("in-flight fence did not signal within {timeout_ns} ns")]
    FenceTimeout { timeout_ns: u64 },

    #[error("an earlier frame failed mid-flight; rendering cannot resume")]
    FrameAborted,

    #[error("acquired image {index} has no framebuffer ({count} exist)")]
    ImageIndexOutOfRange { index: u32, count: usize },
}

/// Error categories a caller can react to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Init,
    NoSuitableQueueFamily,
    NoSuitableMemoryType,
    SwapchainCreate,
    PipelineCreate,
    ShaderCompile,
    FrameExecution,
}

impl RendererError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RendererError::Loader(_)
            | RendererError::Init { .. }
            | RendererError::NoInstanceExtensions
            | RendererError::NoPhysicalDevice => ErrorKind::Init,
            RendererError::NoSuitableQueueFamily { .. } => ErrorKind::NoSuitableQueueFamily,
            RendererError::NoSuitableMemoryType { .. } => ErrorKind::NoSuitableMemoryType,
            RendererError::NoSurfaceFormat | RendererError::SwapchainCreate { .. } => {
                ErrorKind::SwapchainCreate
            }
            RendererError::ShaderCompile(_) => ErrorKind::ShaderCompile,
            RendererError::PipelineCreate { .. } => ErrorKind::PipelineCreate,
            RendererError::PipelineNotCreated
            | RendererError::FrameExecution { .. }
            | RendererError::FenceTimeout { .. }
            | RendererError::FrameAborted
            | RendererError::ImageIndexOutOfRange { .. } => ErrorKind::FrameExecution,
        }
    }
}

/// Attach the failing step to a raw Vulkan result
pub(crate) trait VkResultExt<T> {
    fn init_step(self, step: &'static str) -> Result<T>;
    fn swapchain_step(self, step: &'static str) -> Result<T>;
    fn pipeline_step(self, step: &'static str) -> Result<T>;
    fn frame_step(self, step: FrameStep) -> Result<T>;
}

impl<T> VkResultExt<T> for VkResult<T> {
    fn init_step(self, step: &'static str) -> Result<T> {
        self.map_err(|result| RendererError::Init { step, result })
    }

    fn swapchain_step(self, step: &'static str) -> Result<T> {
        self.map_err(|result| RendererError::SwapchainCreate { step, result })
    }

    fn pipeline_step(self, step: &'static str) -> Result<T> {
        self.map_err(|result| RendererError::PipelineCreate { step, result })
    }

    fn frame_step(self, step: FrameStep) -> Result<T> {
        self.map_err(|result| RendererError::FrameExecution { step, result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_groups_taxonomy() {
        let init = RendererError::Init {
            step: "create instance",
            result: vk::Result::ERROR_INITIALIZATION_FAILED,
        };
        assert_eq!(init.kind(), ErrorKind::Init);
        assert_eq!(RendererError::NoPhysicalDevice.kind(), ErrorKind::Init);
        assert_eq!(RendererError::NoSurfaceFormat.kind(), ErrorKind::SwapchainCreate);
        assert_eq!(
            RendererError::ShaderCompile(SpirvError::Empty).kind(),
            ErrorKind::ShaderCompile
        );
        assert_eq!(RendererError::PipelineNotCreated.kind(), ErrorKind::FrameExecution);
        assert_eq!(RendererError::FrameAborted.kind(), ErrorKind::FrameExecution);
    }

    #[test]
    fn test_out_of_range_image_carries_no_driver_result() {
        let err = RendererError::ImageIndexOutOfRange { index: 3, count: 2 };
        assert_eq!(err.kind(), ErrorKind::FrameExecution);
        assert!(std::error::Error::source(&err).is_none());
        assert_eq!(err.to_string(), "acquired image 3 has no framebuffer (2 exist)");
    }

    #[test]
    fn test_step_is_attached() {
        let failed: VkResult<()> = Err(vk::Result::ERROR_DEVICE_LOST);
        match failed.frame_step(FrameStep::Submit) {
            Err(RendererError::FrameExecution { step, result }) => {
                assert_eq!(step, FrameStep::Submit);
                assert_eq!(result, vk::Result::ERROR_DEVICE_LOST);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_display_names_step() {
        let err = RendererError::FrameExecution {
            step: FrameStep::Present,
            result: vk::Result::ERROR_OUT_OF_DATE_KHR,
        };
        assert!(err.to_string().contains("present swapchain image"));
    }
}
