// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash, one file per GPU concern.
// Bring-up order: device -> swapchain -> pipeline -> frame executor.

pub mod buffer;
pub mod device;
pub mod frame;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use device::DeviceContext;
pub use frame::{FrameBackend, FrameCycle, FrameExecutor, FramePhase};
pub use surface::SurfaceProvider;
pub use swapchain::{Swapchain, SwapchainDescriptor};
