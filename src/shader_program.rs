// Shader program - a vertex + fragment pair linked into one pipeline
//
// Usage mirrors a classic GL program object:
//   new() -> load_shader(vertex) -> load_shader(fragment) -> link() -> bind() per frame

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use crate::backend::pipeline::{self, VertexLayout};
use crate::backend::shader::{self, ShaderStage};
use crate::backend::VulkanDevice;
use crate::geometry::Vertex;

/// Built-in vertex stage: passes position through and forwards the vertex colour.
pub const DEFAULT_VERTEX_SHADER: &str = r#"
#version 450

layout(location = 0) in vec3 a_position;
layout(location = 1) in vec3 a_color;

layout(location = 0) out vec3 v_color;

void main() {
    v_color = a_color;
    gl_Position = vec4(a_position, 1.0);
}
"#;

/// Built-in fragment stage: writes the interpolated vertex colour.
pub const DEFAULT_FRAGMENT_SHADER: &str = r#"
#version 450

layout(location = 0) in vec3 v_color;

layout(location = 0) out vec4 frag_color;

void main() {
    frag_color = vec4(v_color, 1.0);
}
"#;

pub struct ShaderProgram {
    vertex: Option<vk::ShaderModule>,
    fragment: Option<vk::ShaderModule>,
    pipeline: Option<(vk::Pipeline, vk::PipelineLayout)>,
    device: Arc<VulkanDevice>,
}

impl ShaderProgram {
    pub fn new(device: Arc<VulkanDevice>) -> Self {
        Self {
            vertex: None,
            fragment: None,
            pipeline: None,
            device,
        }
    }

    /// Compile `source` for `stage`.
    ///
    /// Replaces any module already loaded for that stage. The program must be
    /// linked again afterwards.
    pub fn load_shader(&mut self, source: &str, stage: ShaderStage) -> Result<()> {
        let code = shader::compile_glsl(source, stage)?;
        let module = shader::create_shader_module(&self.device, &code)
            .with_context(|| format!("Failed to load {} shader", stage))?;

        self.destroy_pipeline();

        let slot = match stage {
            ShaderStage::Vertex => &mut self.vertex,
            ShaderStage::Fragment => &mut self.fragment,
        };
        if let Some(old) = slot.replace(module) {
            unsafe { self.device.device.destroy_shader_module(old, None) };
        }

        log::debug!("Loaded {} shader ({} words)", stage, code.len());
        Ok(())
    }

    /// Build the pipeline from the loaded stages for `render_pass`.
    pub fn link(&mut self, render_pass: vk::RenderPass) -> Result<()> {
        let vertex = self.vertex.context("Cannot link: no vertex shader loaded")?;
        let fragment = self.fragment.context("Cannot link: no fragment shader loaded")?;

        self.destroy_pipeline();

        let bindings = [Vertex::binding_description()];
        let attributes = Vertex::attribute_descriptions();
        let layout = VertexLayout {
            bindings: &bindings,
            attributes: &attributes,
        };

        let pipeline =
            pipeline::create_graphics_pipeline(&self.device, render_pass, &layout, vertex, fragment)?;
        self.pipeline = Some(pipeline);

        log::info!("Shader program linked");
        Ok(())
    }

    pub fn is_linked(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Make this program the active one for subsequent draws in `cmd`.
    pub fn bind(&self, cmd: vk::CommandBuffer) -> Result<()> {
        let (pipeline, _) = self.pipeline.context("Shader program is not linked")?;
        unsafe {
            self.device
                .device
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
        Ok(())
    }

    fn destroy_pipeline(&mut self) {
        if let Some((pipeline, layout)) = self.pipeline.take() {
            unsafe {
                self.device.device.destroy_pipeline(pipeline, None);
                self.device.device.destroy_pipeline_layout(layout, None);
            }
        }
    }

    /// Release the pipeline and both modules. Safe to call twice.
    pub fn destroy(&mut self) {
        self.destroy_pipeline();

        for module in [self.vertex.take(), self.fragment.take()].into_iter().flatten() {
            unsafe { self.device.device.destroy_shader_module(module, None) };
        }
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::shader::{compile_glsl, SPIRV_MAGIC};

    #[test]
    fn default_pair_compiles() {
        let vertex = compile_glsl(DEFAULT_VERTEX_SHADER, ShaderStage::Vertex).unwrap();
        let fragment = compile_glsl(DEFAULT_FRAGMENT_SHADER, ShaderStage::Fragment).unwrap();
        assert_eq!(vertex[0], SPIRV_MAGIC);
        assert_eq!(fragment[0], SPIRV_MAGIC);
    }

    #[test]
    fn vertex_inputs_match_vertex_layout() {
        // Every attribute the pipeline feeds must be declared by the vertex stage
        for attribute in Vertex::attribute_descriptions() {
            let declaration = format!("layout(location = {}) in vec3", attribute.location);
            assert!(
                DEFAULT_VERTEX_SHADER.contains(&declaration),
                "missing input at location {}",
                attribute.location
            );
        }
    }
}
