// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// Negotiation (format, present mode, extent, image count) is pure so it can
// be re-derived whenever the drawable size changes.

use crate::backend::device::{DeviceContext, QueueFamilies};
use crate::error::{FrameStep, RendererError, Result, VkResultExt};
use ash::extensions::khr;
use ash::vk;
use std::sync::Arc;

/// Double buffering, clamped to what the surface allows
pub const PREFERRED_IMAGE_COUNT: u32 = 2;

// =============================================================================
// NEGOTIATION
// =============================================================================

/// Everything needed to create a swapchain for one surface size
#[derive(Debug, Clone, Copy)]
pub struct SwapchainDescriptor {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub extent: vk::Extent2D,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub image_count: u32,
}

impl SwapchainDescriptor {
    pub fn negotiate(
        capabilities: vk::SurfaceCapabilitiesKHR,
        formats: &[vk::SurfaceFormatKHR],
        present_modes: &[vk::PresentModeKHR],
        width: u32,
        height: u32,
    ) -> Result<Self> {
        Ok(Self {
            capabilities,
            extent: choose_extent(&capabilities, width, height),
            surface_format: choose_surface_format(formats)?,
            present_mode: choose_present_mode(present_modes),
            image_count: choose_image_count(&capabilities),
        })
    }
}

/// `PREFERRED_IMAGE_COUNT` clamped to the surface range.
/// A `max_image_count` of 0 means the surface sets no upper bound.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let max = match capabilities.max_image_count {
        0 => u32::MAX,
        max => max,
    };
    PREFERRED_IMAGE_COUNT.max(capabilities.min_image_count).min(max)
}

/// Requested size clamped componentwise to the surface's extent range
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    let clamp = |value: u32, min: u32, max: u32| value.max(min).min(max);
    vk::Extent2D {
        width: clamp(
            width,
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: clamp(
            height,
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// 8-bit sRGB in either channel order, else the first format offered.
/// When several sRGB formats are offered the last one enumerated wins.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    let mut chosen = None;
    for format in formats {
        if matches!(
            format.format,
            vk::Format::B8G8R8A8_SRGB | vk::Format::R8G8B8A8_SRGB
        ) {
            chosen = Some(*format);
        }
    }

    chosen
        .or_else(|| formats.first().copied())
        .ok_or(RendererError::NoSurfaceFormat)
}

/// MAILBOX if offered, otherwise FIFO (always supported)
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// How swapchain images are shared between graphics and present queues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharingPolicy {
    /// One family renders and presents
    Exclusive(u32),
    /// Distinct families; images are usable from both without ownership transfers
    Concurrent([u32; 2]),
}

impl SharingPolicy {
    pub fn for_families(families: &QueueFamilies) -> Self {
        if families.is_shared() {
            SharingPolicy::Exclusive(families.graphics)
        } else {
            SharingPolicy::Concurrent([families.graphics, families.present])
        }
    }

    pub fn mode(&self) -> vk::SharingMode {
        match self {
            SharingPolicy::Exclusive(_) => vk::SharingMode::EXCLUSIVE,
            SharingPolicy::Concurrent(_) => vk::SharingMode::CONCURRENT,
        }
    }

    pub fn queue_family_indices(&self) -> &[u32] {
        match self {
            SharingPolicy::Exclusive(family) => std::slice::from_ref(family),
            SharingPolicy::Concurrent(families) => families,
        }
    }
}

// =============================================================================
// SWAPCHAIN
// =============================================================================

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub descriptor: SwapchainDescriptor,
    ctx: Arc<DeviceContext>,
}

impl Swapchain {
    /// Query the surface and negotiate a descriptor. Creates no GPU objects.
    pub fn query_surface_requirements(
        ctx: &DeviceContext,
        width: u32,
        height: u32,
    ) -> Result<SwapchainDescriptor> {
        let loader = ctx.surface_loader();
        let surface = ctx.surface();

        let capabilities = unsafe {
            loader.get_physical_device_surface_capabilities(ctx.physical_device, surface)
        }
        .swapchain_step("query surface capabilities")?;

        let formats =
            unsafe { loader.get_physical_device_surface_formats(ctx.physical_device, surface) }
                .swapchain_step("query surface formats")?;

        let present_modes = unsafe {
            loader.get_physical_device_surface_present_modes(ctx.physical_device, surface)
        }
        .swapchain_step("query present modes")?;

        SwapchainDescriptor::negotiate(capabilities, &formats, &present_modes, width, height)
    }

    pub fn new(ctx: Arc<DeviceContext>, descriptor: &SwapchainDescriptor) -> Result<Self> {
        log::info!(
            "Creating swapchain: {}x{} {:?} {:?}, {} images",
            descriptor.extent.width,
            descriptor.extent.height,
            descriptor.surface_format.format,
            descriptor.present_mode,
            descriptor.image_count
        );

        let sharing = SharingPolicy::for_families(&ctx.queue_families);
        log::info!("Swapchain sharing: {:?}", sharing);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(ctx.surface())
            .min_image_count(descriptor.image_count)
            .image_format(descriptor.surface_format.format)
            .image_color_space(descriptor.surface_format.color_space)
            .image_extent(descriptor.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing.mode())
            .queue_family_indices(sharing.queue_family_indices())
            .pre_transform(descriptor.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(descriptor.present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let swapchain_loader = khr::Swapchain::new(ctx.instance(), &ctx.device);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .swapchain_step("create swapchain")?;

        let mut this = Self {
            swapchain,
            swapchain_loader,
            images: Vec::new(),
            image_views: Vec::new(),
            descriptor: *descriptor,
            ctx,
        };

        this.images = unsafe { this.swapchain_loader.get_swapchain_images(this.swapchain) }
            .swapchain_step("get swapchain images")?;
        this.image_views =
            create_image_views(&this.ctx.device, &this.images, descriptor.surface_format.format)?;

        log::info!("Created swapchain with {} images", this.images.len());

        Ok(this)
    }

    pub fn format(&self) -> vk::Format {
        self.descriptor.surface_format.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.descriptor.extent
    }

    /// Acquire the next image, signaling `semaphore` once it is writable.
    /// Anything but VK_SUCCESS is fatal; there is no recreation path.
    pub fn acquire_next_image(&self, timeout: u64, semaphore: vk::Semaphore) -> Result<u32> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout,
                semaphore,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, false)) => Ok(index),
            Ok((_, true)) => Err(RendererError::FrameExecution {
                step: FrameStep::Acquire,
                result: vk::Result::SUBOPTIMAL_KHR,
            }),
            Err(result) => Err(RendererError::FrameExecution {
                step: FrameStep::Acquire,
                result,
            }),
        }
    }

    /// Present `image_index` on `queue` once `wait_semaphores` signal
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<()> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.swapchain_loader.queue_present(queue, &present_info) } {
            Ok(false) => Ok(()),
            Ok(true) => Err(RendererError::FrameExecution {
                step: FrameStep::Present,
                result: vk::Result::SUBOPTIMAL_KHR,
            }),
            Err(result) => Err(RendererError::FrameExecution {
                step: FrameStep::Present,
                result,
            }),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.ctx.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// One 2D color view per image, identity swizzle, single mip and layer.
/// Views created before a failure are destroyed before returning.
pub fn create_image_views(
    device: &ash::Device,
    images: &[vk::Image],
    format: vk::Format,
) -> Result<Vec<vk::ImageView>> {
    let mut views = Vec::with_capacity(images.len());

    for &image in images {
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        match unsafe { device.create_image_view(&create_info, None) } {
            Ok(view) => views.push(view),
            Err(result) => {
                for view in views {
                    unsafe { device.destroy_image_view(view, None) };
                }
                return Err(RendererError::SwapchainCreate {
                    step: "create image view",
                    result,
                });
            }
        }
    }

    Ok(views)
}
