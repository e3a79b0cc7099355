// Buffer utilities for the vertex buffer
//
// Provides helpers for creating GPU-accessible memory buffers. The vertex
// buffer lives in HOST_VISIBLE | HOST_COHERENT memory, so a plain
// map/copy/unmap uploads it without an explicit flush.

use crate::backend::DeviceContext;
use crate::error::{RendererError, Result, VkResultExt};
use crate::scene::{self, Vertex};
use ash::vk;
use std::sync::Arc;

/// Memory the vertex buffer must live in
pub const UPLOAD_MEMORY: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw()
        | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

/// Create a buffer of exactly `size` bytes owned by one queue family
pub fn create_buffer(
    device: &ash::Device,
    usage: vk::BufferUsageFlags,
    size: vk::DeviceSize,
    owner_queue_family: u32,
) -> Result<vk::Buffer> {
    let queue_families = [owner_queue_family];
    let buffer_info = vk::BufferCreateInfo::builder()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .queue_family_indices(&queue_families);

    unsafe { device.create_buffer(&buffer_info, None) }.init_step("create buffer")
}

/// First memory type allowed by `type_bits` whose flags include `required`
pub fn select_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Result<u32> {
    let count = (memory_properties.memory_type_count as usize).min(vk::MAX_MEMORY_TYPES);

    memory_properties.memory_types[..count]
        .iter()
        .enumerate()
        .find(|(index, memory_type)| {
            type_bits & (1u32 << *index) != 0 && memory_type.property_flags.contains(required)
        })
        .map(|(index, _)| index as u32)
        .ok_or(RendererError::NoSuitableMemoryType {
            type_bits,
            required,
        })
}

/// Allocate `size` bytes from memory type `memory_type_index`
pub fn allocate(
    device: &ash::Device,
    size: vk::DeviceSize,
    memory_type_index: u32,
) -> Result<vk::DeviceMemory> {
    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(size)
        .memory_type_index(memory_type_index);

    unsafe { device.allocate_memory(&alloc_info, None) }.init_step("allocate buffer memory")
}

/// Copy the vertex bytes into mapped memory of at least the same size
pub fn write_vertices(mapped: &mut [u8], vertices: &[Vertex]) {
    let bytes: &[u8] = bytemuck::cast_slice(vertices);
    mapped[..bytes.len()].copy_from_slice(bytes);
}

/// GPU buffer + bound memory holding a fixed vertex list
pub struct VertexBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
    pub vertex_count: u32,
    ctx: Arc<DeviceContext>,
}

impl VertexBuffer {
    /// Create, bind and fill a vertex buffer owned by the graphics family
    pub fn upload(ctx: Arc<DeviceContext>, vertices: &[Vertex]) -> Result<Self> {
        if vertices.is_empty() {
            return Err(RendererError::Init {
                step: "upload vertex buffer",
                result: vk::Result::ERROR_INITIALIZATION_FAILED,
            });
        }

        let size = scene::byte_size(vertices);
        let mut this = Self {
            buffer: vk::Buffer::null(),
            memory: vk::DeviceMemory::null(),
            size,
            vertex_count: vertices.len() as u32,
            ctx,
        };

        let device = &this.ctx.device;
        this.buffer = create_buffer(
            device,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            size,
            this.ctx.queue_families.graphics,
        )?;

        let requirements = unsafe { device.get_buffer_memory_requirements(this.buffer) };
        let memory_type = select_memory_type(
            &this.ctx.memory_properties,
            requirements.memory_type_bits,
            UPLOAD_MEMORY,
        )?;

        this.memory = allocate(device, requirements.size, memory_type)?;

        unsafe { device.bind_buffer_memory(this.buffer, this.memory, 0) }
            .init_step("bind buffer memory")?;

        // Coherent memory: no flush needed after the copy
        this.with_mapped(|mapped| write_vertices(mapped, vertices))?;

        log::info!(
            "Uploaded {} vertices ({} bytes) to memory type {}",
            this.vertex_count,
            size,
            memory_type
        );

        Ok(this)
    }

    fn with_mapped<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        let device = &self.ctx.device;
        unsafe {
            let ptr = device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .init_step("map buffer memory")? as *mut u8;

            let mapped = std::slice::from_raw_parts_mut(ptr, self.size as usize);
            let result = f(mapped);

            device.unmap_memory(self.memory);
            Ok(result)
        }
    }
}

impl Drop for VertexBuffer {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.free_memory(self.memory, None);
            self.ctx.device.destroy_buffer(self.buffer, None);
        }
    }
}
