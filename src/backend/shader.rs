// Shader module loading and management
//
// Vulkan consumes SPIR-V bytecode. Compilation from GLSL happens elsewhere;
// here we validate the blob, wrap it into a shader module and keep every
// module in a registry until shutdown.

use crate::backend::DeviceContext;
use crate::error::{Result, SpirvError};
use ash::vk;
use std::io::Cursor;
use std::sync::Arc;

pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Validate a SPIR-V blob and return it as aligned native-endian words
pub fn parse_spirv(code: &[u8]) -> Result<Vec<u32>, SpirvError> {
    if code.is_empty() {
        return Err(SpirvError::Empty);
    }
    if code.len() % 4 != 0 {
        return Err(SpirvError::Misaligned(code.len()));
    }

    let magic = u32::from_ne_bytes([code[0], code[1], code[2], code[3]]);
    if magic != SPIRV_MAGIC && magic != SPIRV_MAGIC.swap_bytes() {
        return Err(SpirvError::BadMagic(magic));
    }

    // read_spv copies into aligned storage and fixes up swapped byte order
    ash::util::read_spv(&mut Cursor::new(code)).map_err(|_| SpirvError::BadMagic(magic))
}

/// Owns every shader module created for the renderer
pub struct ShaderRegistry {
    modules: Vec<vk::ShaderModule>,
    ctx: Arc<DeviceContext>,
}

impl ShaderRegistry {
    pub fn new(ctx: Arc<DeviceContext>) -> Self {
        Self {
            modules: Vec::new(),
            ctx,
        }
    }

    /// Create a shader module from SPIR-V bytes.
    ///
    /// The returned handle stays valid until [`ShaderRegistry::destroy_all`]
    /// or drop; callers may forget it once the pipeline is built.
    pub fn create_shader_module(&mut self, code: &[u8]) -> Result<vk::ShaderModule> {
        let words = parse_spirv(code)?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);

        let module = unsafe { self.ctx.device.create_shader_module(&create_info, None) }
            .map_err(SpirvError::Driver)?;

        log::debug!("Created shader module ({} bytes)", code.len());
        self.modules.push(module);
        Ok(module)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Release every registered module
    pub fn destroy_all(&mut self) {
        if self.is_empty() {
            return;
        }

        log::debug!("Destroying {} shader modules", self.len());
        for module in self.modules.drain(..) {
            unsafe { self.ctx.device.destroy_shader_module(module, None) };
        }
    }
}

impl Drop for ShaderRegistry {
    fn drop(&mut self) {
        self.destroy_all();
    }
}
