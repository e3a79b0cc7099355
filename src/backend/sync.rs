// Synchronization primitives
//
// One set for the whole renderer: frames never overlap.
// - image_available: acquire -> submit (GPU-GPU)
// - render_finished: submit -> present (GPU-GPU)
// - in_flight_fence: submit -> host (GPU-CPU)

use crate::backend::DeviceContext;
use crate::error::{FrameStep, RendererError, Result, VkResultExt};
use ash::vk;
use std::sync::Arc;

/// Host-side view of the in-flight fence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceState {
    Signaled,
    Unsignaled,
}

pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
    fence_state: FenceState,
    ctx: Arc<DeviceContext>,
}

impl FrameSync {
    pub fn new(ctx: Arc<DeviceContext>) -> Result<Self> {
        let mut sync = Self {
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight_fence: vk::Fence::null(),
            fence_state: FenceState::Signaled,
            ctx,
        };

        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Start signaled so the first frame does not block
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        let device = &sync.ctx.device;
        unsafe {
            sync.image_available = device
                .create_semaphore(&semaphore_info, None)
                .init_step("create image-available semaphore")?;
            sync.render_finished = device
                .create_semaphore(&semaphore_info, None)
                .init_step("create render-finished semaphore")?;
            sync.in_flight_fence = device
                .create_fence(&fence_info, None)
                .init_step("create in-flight fence")?;
        }

        Ok(sync)
    }

    pub fn fence_state(&self) -> FenceState {
        self.fence_state
    }

    /// Block until the previous submission retires, then reset the fence.
    ///
    /// `timeout_ns` of `u64::MAX` waits forever.
    pub fn wait_and_reset(&mut self, timeout_ns: u64) -> Result<()> {
        let fences = [self.in_flight_fence];
        let device = &self.ctx.device;

        match unsafe { device.wait_for_fences(&fences, true, timeout_ns) } {
            Ok(()) => self.fence_state = FenceState::Signaled,
            Err(vk::Result::TIMEOUT) => return Err(RendererError::FenceTimeout { timeout_ns }),
            Err(result) => {
                return Err(RendererError::FrameExecution {
                    step: FrameStep::WaitFence,
                    result,
                })
            }
        }

        unsafe { device.reset_fences(&fences) }.frame_step(FrameStep::ResetFence)?;
        self.fence_state = FenceState::Unsignaled;
        Ok(())
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        let device = &self.ctx.device;
        unsafe {
            device.destroy_fence(self.in_flight_fence, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_semaphore(self.image_available, None);
        }
    }
}
