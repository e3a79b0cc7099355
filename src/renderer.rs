// =============================================================================
// RENDERER - Composed owner of every GPU object
// =============================================================================
//
// Construction follows the dependency chain:
//   DeviceContext -> Swapchain -> FrameExecutor (+ vertex buffer)
//   ... then create_pipeline() -> PipelineResources
//
// IMPORTANT: Field order matters for Drop! Fields drop top to bottom, which
// releases objects in reverse dependency order:
//   vertex memory/buffer -> fence/semaphores -> command buffer/pool
//   -> framebuffers/render pass/layout/pipeline -> shader modules
//   -> image views/swapchain -> device/surface/instance
//
// =============================================================================

use crate::backend::device::DeviceSelection;
use crate::backend::frame::FrameSettings;
use crate::backend::pipeline::PipelineResources;
use crate::backend::shader::ShaderRegistry;
use crate::backend::{DeviceContext, FrameExecutor, SurfaceProvider, Swapchain};
use crate::error::{RendererError, Result};
use crate::scene::Vertex;
use ash::vk;
use std::sync::Arc;

/// Settings the core needs at bring-up
#[derive(Debug, Clone)]
pub struct RendererOptions {
    pub app_name: String,
    pub enable_validation: bool,
    pub device_selection: DeviceSelection,
    pub frame: FrameSettings,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            app_name: "Triangle Renderer".to_string(),
            enable_validation: cfg!(debug_assertions),
            device_selection: DeviceSelection::First,
            frame: FrameSettings::default(),
        }
    }
}

pub struct Renderer {
    frame: FrameExecutor,
    pipeline: Option<PipelineResources>,
    shaders: ShaderRegistry,
    swapchain: Swapchain,
    ctx: Arc<DeviceContext>,
}

impl Renderer {
    /// Full bring-up through vertex buffer upload.
    ///
    /// A failure at any step releases everything created before it.
    pub fn init<P: SurfaceProvider + ?Sized>(
        provider: &P,
        options: &RendererOptions,
        vertices: &[Vertex],
    ) -> Result<Self> {
        log::info!("Initializing Vulkan...");

        let ctx = Arc::new(DeviceContext::new(
            provider,
            &options.app_name,
            options.enable_validation,
            options.device_selection,
        )?);

        let (width, height) = provider.drawable_size();
        let descriptor = Swapchain::query_surface_requirements(&ctx, width, height)?;
        let swapchain = Swapchain::new(ctx.clone(), &descriptor)?;

        let shaders = ShaderRegistry::new(ctx.clone());
        let frame = FrameExecutor::new(ctx.clone(), vertices, options.frame)?;

        log::info!("Vulkan initialized successfully!");

        Ok(Self {
            frame,
            pipeline: None,
            shaders,
            swapchain,
            ctx,
        })
    }

    /// Wrap a SPIR-V blob into a registered shader module
    pub fn create_shader_module(&mut self, code: &[u8]) -> Result<vk::ShaderModule> {
        self.shaders.create_shader_module(code)
    }

    /// Build layout, render pass, pipeline and framebuffers.
    /// Must run after `init` and before the first `render`, exactly once.
    pub fn create_pipeline(
        &mut self,
        vert_shader: vk::ShaderModule,
        frag_shader: vk::ShaderModule,
    ) -> Result<()> {
        if self.pipeline.is_some() {
            return Err(RendererError::PipelineCreate {
                step: "pipeline already created",
                result: vk::Result::ERROR_INITIALIZATION_FAILED,
            });
        }

        self.pipeline = Some(PipelineResources::new(
            self.ctx.clone(),
            vert_shader,
            frag_shader,
            self.swapchain.format(),
            self.swapchain.extent(),
            &self.swapchain.image_views,
        )?);

        Ok(())
    }

    /// Draw and present one frame; returns the presented image index
    pub fn render(&mut self) -> Result<u32> {
        self.frame.render(&self.swapchain, self.pipeline.as_ref())
    }

    /// Block until all queued device work retires
    pub fn wait_idle(&self) -> Result<()> {
        self.ctx.wait_idle()
    }

    /// Idle the device and release every GPU object
    pub fn quit(self) -> Result<()> {
        let result = self.wait_idle();
        drop(self);
        result
    }

    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frame.frames_completed()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        // Wait for GPU to finish before destroying anything
        if let Err(e) = self.ctx.wait_idle() {
            log::warn!("wait_idle failed during shutdown: {}", e);
        }
    }
}
