// Bring-up decisions made before any GPU object exists

use ash::vk;
use triangle_renderer::backend::buffer::{select_memory_type, write_vertices, UPLOAD_MEMORY};
use triangle_renderer::backend::device::{queue_create_infos, QueueFamilyScan};
use triangle_renderer::backend::shader::parse_spirv;
use triangle_renderer::backend::swapchain::SharingPolicy;
use triangle_renderer::backend::SwapchainDescriptor;
use triangle_renderer::{ErrorKind, RendererError, Result, Vertex, DEFAULT_TRIANGLE};

fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
    vk::QueueFamilyProperties {
        queue_flags: flags,
        queue_count: 1,
        ..Default::default()
    }
}

fn capabilities() -> vk::SurfaceCapabilitiesKHR {
    vk::SurfaceCapabilitiesKHR {
        min_image_count: 2,
        max_image_count: 8,
        min_image_extent: vk::Extent2D {
            width: 1,
            height: 1,
        },
        max_image_extent: vk::Extent2D {
            width: 4096,
            height: 4096,
        },
        ..Default::default()
    }
}

#[test]
fn test_shared_family_gives_one_queue_and_exclusive_images() {
    let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)];
    let resolved = QueueFamilyScan::run(&families, |_| -> Result<bool> { Ok(true) })
        .and_then(QueueFamilyScan::resolve)
        .unwrap();

    let infos = queue_create_infos(&resolved);
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].queue_family_index, 0);
    assert_eq!(infos[0].queue_count, 1);

    let sharing = SharingPolicy::for_families(&resolved);
    assert_eq!(sharing.mode(), vk::SharingMode::EXCLUSIVE);
    assert_eq!(sharing.queue_family_indices(), &[0]);
}

#[test]
fn test_split_families_give_two_queues_and_concurrent_images() {
    let families = [
        family(vk::QueueFlags::GRAPHICS),
        family(vk::QueueFlags::TRANSFER),
    ];
    let resolved = QueueFamilyScan::run(&families, |index: u32| -> Result<bool> { Ok(index == 1) })
        .and_then(QueueFamilyScan::resolve)
        .unwrap();

    let infos = queue_create_infos(&resolved);
    let indices: Vec<u32> = infos.iter().map(|info| info.queue_family_index).collect();
    assert_eq!(indices, vec![0, 1]);

    let sharing = SharingPolicy::for_families(&resolved);
    assert_eq!(sharing.mode(), vk::SharingMode::CONCURRENT);
    assert_eq!(sharing.queue_family_indices(), &[0, 1]);
}

#[test]
fn test_no_graphics_family_is_reported() {
    let families = [family(vk::QueueFlags::COMPUTE)];
    let err = QueueFamilyScan::run(&families, |_| -> Result<bool> { Ok(true) })
        .and_then(QueueFamilyScan::resolve)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NoSuitableQueueFamily);
}

#[test]
fn test_empty_shader_blob_is_a_compile_error() {
    let err = RendererError::from(parse_spirv(&[]).unwrap_err());
    assert_eq!(err.kind(), ErrorKind::ShaderCompile);
}

#[test]
fn test_triangle_upload_bytes() {
    assert_eq!(std::mem::size_of_val(&DEFAULT_TRIANGLE), 72);

    let mut mapped = vec![0u8; 72];
    write_vertices(&mut mapped, &DEFAULT_TRIANGLE);
    assert_eq!(mapped, bytemuck::cast_slice::<Vertex, u8>(&DEFAULT_TRIANGLE));
}

#[test]
fn test_vertex_memory_needs_host_visible_coherent() {
    let mut props = vk::PhysicalDeviceMemoryProperties {
        memory_type_count: 2,
        ..Default::default()
    };
    props.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
    props.memory_types[1].property_flags = UPLOAD_MEMORY;

    assert_eq!(select_memory_type(&props, 0b11, UPLOAD_MEMORY).unwrap(), 1);

    let err = select_memory_type(&props, 0b01, UPLOAD_MEMORY).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoSuitableMemoryType);
}

#[test]
fn test_typical_surface_negotiation() {
    let formats = [
        vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        },
        vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        },
    ];
    let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];

    let descriptor =
        SwapchainDescriptor::negotiate(capabilities(), &formats, &modes, 800, 600).unwrap();

    assert_eq!(descriptor.image_count, 2);
    assert_eq!(descriptor.extent.width, 800);
    assert_eq!(descriptor.extent.height, 600);
    assert_eq!(descriptor.surface_format.format, vk::Format::B8G8R8A8_SRGB);
    assert_eq!(descriptor.present_mode, vk::PresentModeKHR::MAILBOX);
}

#[test]
fn test_surface_without_formats_fails_swapchain_creation() {
    let modes = [vk::PresentModeKHR::FIFO];
    let err = SwapchainDescriptor::negotiate(capabilities(), &[], &modes, 800, 600).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SwapchainCreate);
}
