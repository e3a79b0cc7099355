// Frame protocol driven against a recording backend, no GPU involved

use ash::vk;
use triangle_renderer::backend::sync::FenceState;
use triangle_renderer::backend::{FrameBackend, FrameCycle, FramePhase};
use triangle_renderer::error::FrameStep;
use triangle_renderer::{ErrorKind, RendererError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Wait,
    Acquire,
    Record(u32),
    Submit,
    Present(u32),
}

/// Mimics the fence and swapchain semantics of the Vulkan backend
struct MockBackend {
    calls: Vec<Call>,
    fence: FenceState,
    image_count: u32,
    next_image: u32,
    has_pipeline: bool,
    fail_at: Option<FrameStep>,
}

impl MockBackend {
    fn new(image_count: u32) -> Self {
        Self {
            calls: Vec::new(),
            fence: FenceState::Signaled,
            image_count,
            next_image: 0,
            has_pipeline: true,
            fail_at: None,
        }
    }

    fn fail(&self, step: FrameStep) -> Result<()> {
        if self.fail_at == Some(step) {
            return Err(RendererError::FrameExecution {
                step,
                result: vk::Result::ERROR_DEVICE_LOST,
            });
        }
        Ok(())
    }
}

impl FrameBackend for MockBackend {
    fn check_ready(&self) -> Result<()> {
        if self.has_pipeline {
            Ok(())
        } else {
            Err(RendererError::PipelineNotCreated)
        }
    }

    fn wait_and_reset_fence(&mut self) -> Result<()> {
        // A fence left unsignaled here would block forever
        assert_eq!(self.fence, FenceState::Signaled);
        self.fail(FrameStep::WaitFence)?;
        self.calls.push(Call::Wait);
        self.fence = FenceState::Unsignaled;
        Ok(())
    }

    fn acquire(&mut self) -> Result<u32> {
        assert_eq!(self.fence, FenceState::Unsignaled);
        self.fail(FrameStep::Acquire)?;
        self.calls.push(Call::Acquire);
        let index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count;
        Ok(index)
    }

    fn record(&mut self, image_index: u32) -> Result<()> {
        self.fail(FrameStep::Record)?;
        self.calls.push(Call::Record(image_index));
        Ok(())
    }

    fn submit(&mut self) -> Result<()> {
        assert_eq!(self.fence, FenceState::Unsignaled);
        self.fail(FrameStep::Submit)?;
        self.calls.push(Call::Submit);
        // The GPU finishes instantly in the mock
        self.fence = FenceState::Signaled;
        Ok(())
    }

    fn present(&mut self, image_index: u32) -> Result<()> {
        self.fail(FrameStep::Present)?;
        self.calls.push(Call::Present(image_index));
        Ok(())
    }
}

#[test]
fn test_frames_follow_protocol_order() {
    let mut backend = MockBackend::new(3);
    let mut cycle = FrameCycle::default();

    for frame in 0..5u32 {
        let index = cycle.run(&mut backend).unwrap();
        assert_eq!(index, frame % 3);
        assert_eq!(cycle.phase(), FramePhase::Idle);
    }

    assert_eq!(cycle.frames_completed(), 5);
    assert_eq!(backend.calls.len(), 25);

    for (frame, calls) in backend.calls.chunks(5).enumerate() {
        let index = frame as u32 % 3;
        assert_eq!(
            calls,
            [
                Call::Wait,
                Call::Acquire,
                Call::Record(index),
                Call::Submit,
                Call::Present(index),
            ]
        );
    }
}

#[test]
fn test_presented_index_matches_acquired() {
    let mut backend = MockBackend::new(2);
    backend.next_image = 1;
    let mut cycle = FrameCycle::default();

    assert_eq!(cycle.run(&mut backend).unwrap(), 1);
    assert!(backend.calls.contains(&Call::Record(1)));
    assert!(backend.calls.contains(&Call::Present(1)));
}

#[test]
fn test_acquire_failure_aborts_frame() {
    let mut backend = MockBackend::new(2);
    let mut cycle = FrameCycle::default();
    cycle.run(&mut backend).unwrap();

    backend.fail_at = Some(FrameStep::Acquire);
    let err = cycle.run(&mut backend).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FrameExecution);
    assert!(matches!(
        err,
        RendererError::FrameExecution {
            step: FrameStep::Acquire,
            ..
        }
    ));
    assert_eq!(cycle.phase(), FramePhase::Idle);
    assert_eq!(cycle.frames_completed(), 1);
    // Nothing past the wait ran on the failed frame
    assert_eq!(backend.calls.last(), Some(&Call::Wait));
    assert_eq!(
        backend.calls.iter().filter(|c| matches!(c, Call::Present(_))).count(),
        1
    );
}

#[test]
fn test_present_failure_still_counts_nothing() {
    let mut backend = MockBackend::new(2);
    backend.fail_at = Some(FrameStep::Present);
    let mut cycle = FrameCycle::default();

    let err = cycle.run(&mut backend).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FrameExecution);
    assert_eq!(cycle.frames_completed(), 0);
    assert_eq!(cycle.phase(), FramePhase::Idle);
    assert_eq!(backend.calls.last(), Some(&Call::Submit));
}

#[test]
fn test_render_without_pipeline_touches_nothing() {
    let mut backend = MockBackend::new(2);
    backend.has_pipeline = false;
    let mut cycle = FrameCycle::default();

    let err = cycle.run(&mut backend).unwrap_err();
    assert!(matches!(err, RendererError::PipelineNotCreated));
    assert!(backend.calls.is_empty());
    assert_eq!(backend.fence, FenceState::Signaled);
    assert_eq!(cycle.frames_completed(), 0);
}

#[test]
fn test_failed_frame_blocks_further_rendering() {
    let mut backend = MockBackend::new(2);
    backend.fail_at = Some(FrameStep::Acquire);
    let mut cycle = FrameCycle::default();

    cycle.run(&mut backend).unwrap_err();
    assert!(cycle.is_aborted());
    // Reset but never resubmitted: no GPU work will signal it
    assert_eq!(backend.fence, FenceState::Unsignaled);

    backend.fail_at = None;
    let calls_before = backend.calls.len();
    let err = cycle.run(&mut backend).unwrap_err();

    assert!(matches!(err, RendererError::FrameAborted));
    assert_eq!(err.kind(), ErrorKind::FrameExecution);
    assert_eq!(backend.calls.len(), calls_before);
    assert_eq!(cycle.frames_completed(), 0);
}

#[test]
fn test_missing_pipeline_does_not_abort() {
    let mut backend = MockBackend::new(2);
    backend.has_pipeline = false;
    let mut cycle = FrameCycle::default();

    cycle.run(&mut backend).unwrap_err();
    assert!(!cycle.is_aborted());

    backend.has_pipeline = true;
    assert_eq!(cycle.run(&mut backend).unwrap(), 0);
    assert_eq!(cycle.frames_completed(), 1);
}
