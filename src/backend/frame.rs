// Frame Executor - the render loop state machine
//
// FRAME FLOW (one frame per call, frames never overlap):
// ┌──────────────────────────────────────────────────────────────────────┐
// │  wait+reset fence ─> acquire ─> record ─> submit ─> present          │
// │                                                                      │
// │  (CPU blocks    (GPU signals   (one cmd    (waits on     (waits on   │
// │   on last       image_available buffer,    image_avail,  render_     │
// │   submission)   when writable)  re-used)   signals both) finished)   │
// └──────────────────────────────────────────────────────────────────────┘
//
// The fence wait is the only host-side blocking point and the only
// backpressure: it keeps the command buffer and vertex buffer out of the
// GPU's hands while they are touched again.

use crate::backend::buffer::VertexBuffer;
use crate::backend::pipeline::PipelineResources;
use crate::backend::swapchain::Swapchain;
use crate::backend::sync::{FenceState, FrameSync};
use crate::backend::DeviceContext;
use crate::error::{FrameStep, RendererError, Result, VkResultExt};
use crate::scene::Vertex;
use ash::vk;
use std::sync::Arc;

// =============================================================================
// STATE MACHINE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramePhase {
    #[default]
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
}

impl FramePhase {
    pub fn next(self) -> Self {
        match self {
            FramePhase::Idle => FramePhase::Acquiring,
            FramePhase::Acquiring => FramePhase::Recording,
            FramePhase::Recording => FramePhase::Submitted,
            FramePhase::Submitted => FramePhase::Presenting,
            FramePhase::Presenting => FramePhase::Idle,
        }
    }
}

/// The device-facing half of one frame
pub trait FrameBackend {
    /// Fail before any GPU work if the frame cannot be drawn
    fn check_ready(&self) -> Result<()>;

    /// Block on the in-flight fence, then reset it
    fn wait_and_reset_fence(&mut self) -> Result<()>;

    /// Next presentable image; readiness is signaled on the acquire semaphore
    fn acquire(&mut self) -> Result<u32>;

    fn record(&mut self, image_index: u32) -> Result<()>;

    fn submit(&mut self) -> Result<()>;

    fn present(&mut self, image_index: u32) -> Result<()>;
}

/// Sequences the per-frame protocol over a [`FrameBackend`]
#[derive(Debug, Default)]
pub struct FrameCycle {
    phase: FramePhase,
    frames_completed: u64,
    // Set once a step past check_ready fails; the fence may never signal again
    aborted: bool,
}

impl FrameCycle {
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn frames_completed(&self) -> u64 {
        self.frames_completed
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Run one full cycle and return the presented image index.
    ///
    /// Any failing step aborts the frame and leaves the cycle in `Idle`.
    /// Every later call then fails with `FrameAborted` without touching
    /// the backend.
    pub fn run<B: FrameBackend>(&mut self, backend: &mut B) -> Result<u32> {
        if self.aborted {
            return Err(RendererError::FrameAborted);
        }
        backend.check_ready()?;

        let result = self.run_steps(backend);
        self.phase = FramePhase::Idle;

        match result {
            Ok(_) => self.frames_completed += 1,
            Err(ref e) => {
                log::error!("Frame {} aborted: {}", self.frames_completed, e);
                self.aborted = true;
            }
        }
        result
    }

    fn run_steps<B: FrameBackend>(&mut self, backend: &mut B) -> Result<u32> {
        backend.wait_and_reset_fence()?;

        self.enter(FramePhase::Acquiring);
        let image_index = backend.acquire()?;

        self.enter(FramePhase::Recording);
        backend.record(image_index)?;
        backend.submit()?;

        self.enter(FramePhase::Submitted);
        self.enter(FramePhase::Presenting);
        backend.present(image_index)?;

        Ok(image_index)
    }

    fn enter(&mut self, phase: FramePhase) {
        debug_assert_eq!(self.phase.next(), phase);
        log::debug!("Frame {}: {:?} -> {:?}", self.frames_completed, self.phase, phase);
        self.phase = phase;
    }
}

// =============================================================================
// VULKAN RESOURCES
// =============================================================================

/// Dedicated pool with the single re-recorded command buffer
struct CommandResources {
    pool: vk::CommandPool,
    buffer: vk::CommandBuffer,
    ctx: Arc<DeviceContext>,
}

impl CommandResources {
    fn new(ctx: Arc<DeviceContext>) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(ctx.queue_families.graphics)
            // TRANSIENT: Command buffers are short-lived
            // RESET: Allow individual buffer reset
            .flags(
                vk::CommandPoolCreateFlags::TRANSIENT
                    | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            );

        let pool = unsafe { ctx.device.create_command_pool(&pool_info, None) }
            .init_step("create command pool")?;

        let mut commands = Self {
            pool,
            buffer: vk::CommandBuffer::null(),
            ctx,
        };

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(commands.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        commands.buffer = unsafe { commands.ctx.device.allocate_command_buffers(&alloc_info) }
            .init_step("allocate command buffer")?[0];

        Ok(commands)
    }
}

impl Drop for CommandResources {
    fn drop(&mut self) {
        unsafe {
            if self.buffer != vk::CommandBuffer::null() {
                self.ctx.device.free_command_buffers(self.pool, &[self.buffer]);
            }
            self.ctx.device.destroy_command_pool(self.pool, None);
        }
    }
}

/// Knobs for the executor
#[derive(Debug, Clone, Copy)]
pub struct FrameSettings {
    pub clear_color: [f32; 4],
    /// `u64::MAX` waits forever
    pub fence_timeout_ns: u64,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            fence_timeout_ns: u64::MAX,
        }
    }
}

/// Owns everything one frame touches: vertex buffer, sync objects, commands.
///
/// Field order is drop order: memory/buffer, fence/semaphores, command buffer/pool.
pub struct FrameExecutor {
    vertex_buffer: VertexBuffer,
    sync: FrameSync,
    commands: CommandResources,
    cycle: FrameCycle,
    settings: FrameSettings,
    ctx: Arc<DeviceContext>,
}

impl FrameExecutor {
    pub fn new(
        ctx: Arc<DeviceContext>,
        vertices: &[Vertex],
        settings: FrameSettings,
    ) -> Result<Self> {
        let commands = CommandResources::new(ctx.clone())?;
        let sync = FrameSync::new(ctx.clone())?;
        let vertex_buffer = VertexBuffer::upload(ctx.clone(), vertices)?;

        Ok(Self {
            vertex_buffer,
            sync,
            commands,
            cycle: FrameCycle::default(),
            settings,
            ctx,
        })
    }

    pub fn frames_completed(&self) -> u64 {
        self.cycle.frames_completed()
    }

    /// Draw and present one frame
    pub fn render(
        &mut self,
        swapchain: &Swapchain,
        pipeline: Option<&PipelineResources>,
    ) -> Result<u32> {
        let mut frame = VulkanFrame {
            ctx: &self.ctx,
            swapchain,
            pipeline,
            vertex_buffer: &self.vertex_buffer,
            sync: &mut self.sync,
            command_buffer: self.commands.buffer,
            settings: self.settings,
        };

        self.cycle.run(&mut frame)
    }
}

struct VulkanFrame<'a> {
    ctx: &'a DeviceContext,
    swapchain: &'a Swapchain,
    pipeline: Option<&'a PipelineResources>,
    vertex_buffer: &'a VertexBuffer,
    sync: &'a mut FrameSync,
    command_buffer: vk::CommandBuffer,
    settings: FrameSettings,
}

impl VulkanFrame<'_> {
    fn pipeline(&self) -> Result<&PipelineResources> {
        self.pipeline.ok_or(RendererError::PipelineNotCreated)
    }
}

impl FrameBackend for VulkanFrame<'_> {
    fn check_ready(&self) -> Result<()> {
        self.pipeline().map(|_| ())
    }

    fn wait_and_reset_fence(&mut self) -> Result<()> {
        self.sync.wait_and_reset(self.settings.fence_timeout_ns)
    }

    fn acquire(&mut self) -> Result<u32> {
        debug_assert_eq!(self.sync.fence_state(), FenceState::Unsignaled);
        self.swapchain
            .acquire_next_image(u64::MAX, self.sync.image_available)
    }

    fn record(&mut self, image_index: u32) -> Result<()> {
        let pipeline = self.pipeline()?;
        let framebuffer = pipeline
            .framebuffers
            .get(image_index as usize)
            .copied()
            .ok_or(RendererError::ImageIndexOutOfRange {
                index: image_index,
                count: pipeline.framebuffers.len(),
            })?;

        let device = &self.ctx.device;
        let cmd = self.command_buffer;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.settings.clear_color,
            },
        }];

        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(pipeline.render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: pipeline.extent,
            })
            .clear_values(&clear_values);

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .frame_step(FrameStep::Record)?;
            device
                .begin_command_buffer(cmd, &begin_info)
                .frame_step(FrameStep::Record)?;

            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.pipeline);
            device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.buffer], &[0]);
            device.cmd_draw(cmd, self.vertex_buffer.vertex_count, 1, 0, 0);
            device.cmd_end_render_pass(cmd);

            device.end_command_buffer(cmd).frame_step(FrameStep::Record)?;
        }

        Ok(())
    }

    fn submit(&mut self) -> Result<()> {
        let wait_semaphores = [self.sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [self.sync.render_finished];
        let command_buffers = [self.command_buffer];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores) // Wait for image to be available
            .wait_dst_stage_mask(&wait_stages) // Which stage waits
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores); // Signal when done

        unsafe {
            self.ctx.device.queue_submit(
                self.ctx.graphics_queue,
                &[submit_info.build()],
                self.sync.in_flight_fence, // Signal this fence when GPU is done
            )
        }
        .frame_step(FrameStep::Submit)
    }

    fn present(&mut self, image_index: u32) -> Result<()> {
        self.swapchain.present(
            self.ctx.present_queue,
            image_index,
            &[self.sync.render_finished],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_cycle() {
        let mut phase = FramePhase::Idle;
        let mut seen = Vec::new();
        for _ in 0..5 {
            phase = phase.next();
            seen.push(phase);
        }
        assert_eq!(
            seen,
            vec![
                FramePhase::Acquiring,
                FramePhase::Recording,
                FramePhase::Submitted,
                FramePhase::Presenting,
                FramePhase::Idle,
            ]
        );
    }

    #[test]
    fn test_default_settings_wait_forever() {
        assert_eq!(FrameSettings::default().fence_timeout_ns, u64::MAX);
    }
}
