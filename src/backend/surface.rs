// Surface provider - platform window connection
//
// The windowing system is an external collaborator. It tells us which
// instance extensions presentation needs and turns a window into a
// VkSurfaceKHR once the instance exists.

use crate::error::{RendererError, Result, VkResultExt};
use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::ffi::CStr;

pub trait SurfaceProvider {
    /// Instance extensions required to present on this platform
    fn required_instance_extensions(&self) -> Result<Vec<&'static CStr>>;

    /// Create a native surface for this window
    ///
    /// # Safety
    /// `instance` must have been created with every extension from
    /// [`SurfaceProvider::required_instance_extensions`], and the window must
    /// outlive the returned surface.
    unsafe fn create_surface(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Result<vk::SurfaceKHR>;

    /// Current drawable size in pixels
    fn drawable_size(&self) -> (u32, u32);
}

impl SurfaceProvider for winit::window::Window {
    fn required_instance_extensions(&self) -> Result<Vec<&'static CStr>> {
        let names = ash_window::enumerate_required_extensions(self.raw_display_handle())
            .init_step("enumerate required instance extensions")?;

        if names.is_empty() {
            return Err(RendererError::NoInstanceExtensions);
        }

        // Safety: ash-window hands out pointers to static extension name constants
        Ok(names
            .iter()
            .map(|&name| unsafe { CStr::from_ptr(name) })
            .collect())
    }

    unsafe fn create_surface(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Result<vk::SurfaceKHR> {
        ash_window::create_surface(
            entry,
            instance,
            self.raw_display_handle(),
            self.raw_window_handle(),
            None,
        )
        .init_step("create surface")
    }

    fn drawable_size(&self) -> (u32, u32) {
        let size = self.inner_size();
        (size.width, size.height)
    }
}
