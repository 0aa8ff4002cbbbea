// Shader compilation and module creation
//
// Shaders are written in GLSL and translated to SPIR-V at startup with naga,
// then handed to Vulkan as shader modules.

use anyhow::{Context, Result};
use ash::vk;
use std::fmt;
use super::VulkanDevice;

/// SPIR-V magic number, first word of every module
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// The two programmable stages a shader program links together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    fn naga_stage(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Compile GLSL source (entry point `main`) to SPIR-V words.
pub fn compile_glsl(source: &str, stage: ShaderStage) -> Result<Vec<u32>> {
    let mut frontend = naga::front::glsl::Frontend::default();
    let module = frontend
        .parse(&naga::front::glsl::Options::from(stage.naga_stage()), source)
        .map_err(|e| anyhow::anyhow!("{:?}", e))
        .with_context(|| format!("Failed to parse {} shader", stage))?;

    let info = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::empty(),
    )
    .validate(&module)
    .map_err(|e| anyhow::anyhow!("{:?}", e.into_inner()))
    .with_context(|| format!("Failed to validate {} shader", stage))?;

    let pipeline_options = naga::back::spv::PipelineOptions {
        shader_stage: stage.naga_stage(),
        entry_point: "main".to_string(),
    };

    naga::back::spv::write_vec(
        &module,
        &info,
        &naga::back::spv::Options::default(),
        Some(&pipeline_options),
    )
    .map_err(|e| anyhow::anyhow!("{:?}", e))
    .with_context(|| format!("Failed to generate SPIR-V for {} shader", stage))
}

/// Create a shader module from SPIR-V words
pub fn create_shader_module(device: &VulkanDevice, code: &[u32]) -> Result<vk::ShaderModule> {
    if code.first() != Some(&SPIRV_MAGIC) {
        anyhow::bail!("Shader code is not SPIR-V");
    }

    let create_info = vk::ShaderModuleCreateInfo::default().code(code);

    unsafe {
        device
            .device
            .create_shader_module(&create_info, None)
            .context("Failed to create shader module")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASS_THROUGH_VERTEX: &str = r#"
        #version 450
        layout(location = 0) in vec3 a_position;
        void main() {
            gl_Position = vec4(a_position, 1.0);
        }
    "#;

    #[test]
    fn vertex_shader_compiles_to_spirv() {
        let words = compile_glsl(PASS_THROUGH_VERTEX, ShaderStage::Vertex).unwrap();
        assert_eq!(words[0], SPIRV_MAGIC);
        assert!(words.len() > 5);
    }

    #[test]
    fn syntax_error_names_the_stage() {
        let err = compile_glsl("#version 450\nvoid main() { oops }", ShaderStage::Fragment)
            .unwrap_err();
        assert!(format!("{err:#}").contains("fragment shader"));
    }

    #[test]
    fn stage_maps_to_vulkan_flags() {
        assert_eq!(ShaderStage::Vertex.vk_stage(), vk::ShaderStageFlags::VERTEX);
        assert_eq!(ShaderStage::Fragment.vk_stage(), vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(ShaderStage::Vertex.to_string(), "vertex");
    }
}
