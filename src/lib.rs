// Vulkan triangle renderer core
//
// Device/swapchain bring-up and a single-buffered acquire -> record ->
// submit -> present loop. Windowing and shader compilation stay outside.

pub mod backend;
pub mod error;
pub mod renderer;
pub mod scene;

pub use error::{ErrorKind, RendererError, Result};
pub use renderer::{Renderer, RendererOptions};
pub use scene::{Vertex, DEFAULT_TRIANGLE};
