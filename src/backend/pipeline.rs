// Graphics pipeline creation and management
//
// A PipelineBuilder remembers everything needed to (re)build the pipeline:
// shader paths, fixed-function state and the layout. The render pass comes in
// at build time because it changes with every swapchain.

use ash::vk;
use std::ffi::CStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::error::{RenderError, RenderResult};
use super::gpu::Gpu;
use super::shader;

const ENTRY_POINT: &CStr = c"main";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    #[default]
    Opaque,
    /// Standard src-alpha / one-minus-src-alpha
    Alpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepthTest {
    /// The swapchain render pass has no depth attachment
    #[default]
    Disabled,
    ReadWrite,
    ReadOnly,
}

/// Vertex buffer bindings and attributes consumed by the vertex shader
#[derive(Debug, Clone, Default)]
pub struct VertexLayout {
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

#[derive(Debug, Clone)]
pub struct FixedFunctionConfig {
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub blend: BlendMode,
    pub depth_test: DepthTest,
    /// Viewport and scissor are always dynamic, extra states go here
    pub dynamic_states: Vec<vk::DynamicState>,
    pub vertex_layout: VertexLayout,
}

impl Default for FixedFunctionConfig {
    fn default() -> Self {
        Self {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
            blend: BlendMode::Opaque,
            depth_test: DepthTest::Disabled,
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
            vertex_layout: VertexLayout::default(),
        }
    }
}

impl FixedFunctionConfig {
    /// Configured dynamic states, with viewport and scissor guaranteed present
    pub fn effective_dynamic_states(&self) -> Vec<vk::DynamicState> {
        let mut states = vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        for &state in &self.dynamic_states {
            if !states.contains(&state) {
                states.push(state);
            }
        }
        states
    }
}

/// Immutable graphics pipeline, destroyed on drop
pub struct Pipeline<D: Gpu> {
    device: Arc<D>,
    handle: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl<D: Gpu> Pipeline<D> {
    pub fn handle(&self) -> vk::Pipeline {
        self.handle
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl<D: Gpu> Drop for Pipeline<D> {
    fn drop(&mut self) {
        self.device.destroy_pipeline(self.handle);
    }
}

#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    vertex_path: PathBuf,
    fragment_path: PathBuf,
    fixed: FixedFunctionConfig,
    layout: vk::PipelineLayout,
}

impl PipelineBuilder {
    pub fn new(
        vertex_path: impl Into<PathBuf>,
        fragment_path: impl Into<PathBuf>,
        fixed: FixedFunctionConfig,
        layout: vk::PipelineLayout,
    ) -> Self {
        Self {
            vertex_path: vertex_path.into(),
            fragment_path: fragment_path.into(),
            fixed,
            layout,
        }
    }

    pub fn vertex_path(&self) -> &Path {
        &self.vertex_path
    }

    pub fn fragment_path(&self) -> &Path {
        &self.fragment_path
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Compile both stages and create the pipeline. Shader modules never
    /// outlive this call.
    pub fn build<D: Gpu>(
        &self,
        device: &Arc<D>,
        render_pass: vk::RenderPass,
        subpass: u32,
    ) -> RenderResult<Pipeline<D>> {
        let vert_module = shader::create_shader_module(&**device, &self.vertex_path)?;
        let frag_module = match shader::create_shader_module(&**device, &self.fragment_path) {
            Ok(module) => module,
            Err(e) => {
                device.destroy_shader_module(vert_module);
                return Err(e);
            }
        };

        let result = self.create_pipeline(&**device, vert_module, frag_module, render_pass, subpass);

        device.destroy_shader_module(vert_module);
        device.destroy_shader_module(frag_module);

        let handle = result?;
        log::debug!(
            "Graphics pipeline built from {:?} + {:?}",
            self.vertex_path,
            self.fragment_path
        );

        Ok(Pipeline {
            device: Arc::clone(device),
            handle,
            layout: self.layout,
        })
    }

    fn create_pipeline<D: Gpu>(
        &self,
        device: &D,
        vert_module: vk::ShaderModule,
        frag_module: vk::ShaderModule,
        render_pass: vk::RenderPass,
        subpass: u32,
    ) -> RenderResult<vk::Pipeline> {
        let fixed = &self.fixed;

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert_module)
                .name(ENTRY_POINT)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag_module)
                .name(ENTRY_POINT)
                .build(),
        ];

        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&fixed.vertex_layout.bindings)
            .vertex_attribute_descriptions(&fixed.vertex_layout.attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(fixed.topology)
            .primitive_restart_enable(false);

        // Actual rectangles are set per frame
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(fixed.polygon_mode)
            .line_width(1.0)
            .cull_mode(fixed.cull_mode)
            .front_face(fixed.front_face)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let (depth_test, depth_write) = match fixed.depth_test {
            DepthTest::Disabled => (false, false),
            DepthTest::ReadWrite => (true, true),
            DepthTest::ReadOnly => (true, false),
        };
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(depth_test)
            .depth_write_enable(depth_write)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachment = match fixed.blend {
            BlendMode::Opaque => vk::PipelineColorBlendAttachmentState::builder()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(false)
                .build(),
            BlendMode::Alpha => vk::PipelineColorBlendAttachmentState::builder()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                .alpha_blend_op(vk::BlendOp::ADD)
                .build(),
        };

        let color_blend_attachments = [color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let dynamic_states = fixed.effective_dynamic_states();
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder()
            .dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(self.layout)
            .render_pass(render_pass)
            .subpass(subpass);

        device
            .create_graphics_pipeline(&pipeline_info)
            .map_err(RenderError::PipelineCreate)
    }
}
