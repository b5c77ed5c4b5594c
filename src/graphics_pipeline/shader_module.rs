use std::{fs::File, ops::Deref, path::Path, rc::Rc};

use anyhow::{Context, Result};
use ash::{
    util::read_spv,
    vk::{self, ShaderModuleCreateInfo},
};

use crate::LogicalDevice;

/// A compiled SPIR-V module, read from disk at startup. Only alive while
/// the pipeline is being built.
pub struct ShaderModule {
    logical_device: Rc<LogicalDevice>,
    shader_module: vk::ShaderModule,
}

impl ShaderModule {
    pub fn from_spv_file(
        logical_device: &Rc<LogicalDevice>,
        path: impl AsRef<Path>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)
            .with_context(|| format!("failed to open shader file {}", path.display()))?;
        let code = read_spv(&mut file)
            .with_context(|| format!("invalid SPIR-V in {}", path.display()))?;

        let shader_module_create_info = ShaderModuleCreateInfo::default().code(&code);
        let shader_module =
            unsafe { logical_device.create_shader_module(&shader_module_create_info, None)? };

        Ok(Self {
            logical_device: Rc::clone(logical_device),
            shader_module,
        })
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.logical_device
                .destroy_shader_module(self.shader_module, None)
        }
    }
}

impl Deref for ShaderModule {
    type Target = vk::ShaderModule;

    fn deref(&self) -> &Self::Target {
        &self.shader_module
    }
}
