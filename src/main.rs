// =============================================================================
// VULKAN TRIANGLE - Window host for the renderer core
// =============================================================================
//
// The binary owns everything outside the GPU path:
//   config.toml -> logging -> window -> Renderer::init
//   -> shader modules -> create_pipeline -> render loop
//
// FRAME FLOW (inside Renderer::render):
// 1. Wait for the in-flight fence, then reset it
// 2. Acquire swapchain image
// 3. Record clear + draw into the command buffer
// 4. Submit, signaling render_finished and the fence
// 5. Present rendered image to screen
//
// =============================================================================

mod config;

use anyhow::{Context, Result};
use config::Config;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use triangle_renderer::{Renderer, DEFAULT_TRIANGLE};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml
    let config = Config::load();

    // Initialize logging
    init_logging(&config);
    log::info!("Starting Vulkan triangle");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        config.window.title
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

fn init_logging(config: &Config) {
    use env_logger::Builder;

    let mut builder = Builder::from_default_env();
    builder.filter_level(config.log_level());
    builder.init();
}

fn read_shader(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read shader: {:?}", path))
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

struct App {
    config: Config,

    // Dropped before the window so the surface never outlives it
    renderer: Option<Renderer>,
    window: Option<Arc<Window>>,

    // FPS tracking
    frame_count: u32,
    last_fps_update: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            frame_count: 0,
            last_fps_update: Instant::now(),
        }
    }

    /// Bring up the renderer and build the triangle pipeline
    fn init_vulkan(&mut self, window: &Window) -> Result<()> {
        let options = self.config.renderer_options();
        let mut renderer = Renderer::init(window, &options, &DEFAULT_TRIANGLE)
            .context("Failed to initialize renderer")?;

        let vert_code = read_shader(&self.config.shaders.vertex)?;
        let frag_code = read_shader(&self.config.shaders.fragment)?;

        let vert_module = renderer
            .create_shader_module(&vert_code)
            .context("Failed to create vertex shader module")?;
        let frag_module = renderer
            .create_shader_module(&frag_code)
            .context("Failed to create fragment shader module")?;

        renderer
            .create_pipeline(vert_module, frag_module)
            .context("Failed to create graphics pipeline")?;

        log::info!(
            "Swapchain: {} images, {}x{}",
            renderer.swapchain().images.len(),
            renderer.swapchain().extent().width,
            renderer.swapchain().extent().height
        );

        self.renderer = Some(renderer);
        Ok(())
    }

    fn update_fps(&mut self) {
        self.frame_count += 1;

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
        if elapsed >= 1.0 {
            let fps = self.frame_count as f32 / elapsed;
            log::info!("{:.0} FPS ({:.2}ms)", fps, 1000.0 / fps);
            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }

    /// Idle the device, release GPU objects, then stop the loop
    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(renderer) = self.renderer.take() {
            log::info!("Rendered {} frames", renderer.frames_rendered());
            if let Err(e) = renderer.quit() {
                log::error!("Shutdown error: {}", e);
            }
        }
        event_loop.exit();
    }
}

// =============================================================================
// WINIT EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(false);

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        if let Err(e) = self.init_vulkan(&window) {
            log::error!("Failed to initialize Vulkan: {:?}", e);
            event_loop.exit();
            return;
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.shutdown(event_loop);
            }

            WindowEvent::RedrawRequested => {
                let Some(renderer) = self.renderer.as_mut() else {
                    return;
                };
                match renderer.render() {
                    Ok(_) => self.update_fps(),
                    Err(e) => {
                        log::error!("Render error: {}", e);
                        self.shutdown(event_loop);
                    }
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    log::info!("ESC pressed, exiting...");
                    self.shutdown(event_loop);
                }
            }

            _ => {}
        }
    }

    /// Request continuous redraws for maximum FPS.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            if let Some(ref window) = self.window {
                window.request_redraw();
            }
        }
    }
}
