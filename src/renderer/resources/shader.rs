use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use ash::vk;
use crate::renderer::error::{RenderError, RenderResult};

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Vertex and fragment modules of one program, loaded from `<dir>/<name>.{vert,frag}.spv`
pub struct GraphicsShader {
    pub vert_mod: vk::ShaderModule,
    pub frag_mod: vk::ShaderModule,
    device: Arc<ash::Device>,
}

impl GraphicsShader {
    pub fn new(dir: &Path, shader_name: &str, device: Arc<ash::Device>) -> RenderResult<Self> {
        let vert_mod = create_shader_module(
            &dir.join(format!("{}.vert.spv", shader_name)),
            &device,
        )?;
        let frag_mod = match create_shader_module(
            &dir.join(format!("{}.frag.spv", shader_name)),
            &device,
        ) {
            Ok(module) => module,
            Err(e) => {
                unsafe { device.destroy_shader_module(vert_mod, None) };
                return Err(e);
            }
        };
        Ok(Self { vert_mod, frag_mod, device })
    }
}

impl Drop for GraphicsShader {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.vert_mod, None);
            self.device.destroy_shader_module(self.frag_mod, None);
        }
    }
}

/// Reinterprets a SPIR-V file as words, rejecting truncated or foreign files
pub fn spirv_words(code: &[u8]) -> Option<Vec<u32>> {
    ash::util::read_spv(&mut Cursor::new(code))
        .ok()
        .filter(|words| words.first() == Some(&SPIRV_MAGIC))
}

fn create_shader_module(filepath: &Path, device: &ash::Device) -> RenderResult<vk::ShaderModule> {
    let code = std::fs::read(filepath).map_err(|e| {
        RenderError::InitializationFailure(format!("cannot read shader {:?}: {}", filepath, e))
    })?;
    let words = spirv_words(&code).ok_or_else(|| {
        RenderError::InitializationFailure(format!("{:?} is not a SPIR-V module", filepath))
    })?;

    let shader_module_info = vk::ShaderModuleCreateInfo::default().code(&words);
    let shader_module = unsafe { device.create_shader_module(&shader_module_info, None) }
        .map_err(|e| {
            RenderError::InitializationFailure(format!("{:?} rejected by driver: {}", filepath, e))
        })?;

    Ok(shader_module)
}
