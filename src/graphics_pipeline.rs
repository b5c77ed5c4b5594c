mod frame_buffer;
mod pipeline_layout;
mod render_pass;
mod shader_module;

use std::{ffi::CStr, ops::Deref, rc::Rc};

use anyhow::Result;
use ash::vk::{
    self, ColorComponentFlags, CullModeFlags, DynamicState, FrontFace,
    GraphicsPipelineCreateInfo, PipelineCache, PipelineColorBlendAttachmentState,
    PipelineColorBlendStateCreateInfo, PipelineDynamicStateCreateInfo,
    PipelineInputAssemblyStateCreateInfo, PipelineMultisampleStateCreateInfo,
    PipelineRasterizationStateCreateInfo, PipelineShaderStageCreateInfo,
    PipelineVertexInputStateCreateInfo, PipelineViewportStateCreateInfo, PolygonMode,
    PrimitiveTopology, SampleCountFlags, ShaderStageFlags,
};

use crate::{LogicalDevice, Vertex};

pub use self::frame_buffer::Framebuffer;
pub use self::pipeline_layout::PipelineLayout;
pub use self::render_pass::RenderPass;

use self::shader_module::ShaderModule;

// compiled out of band from the sources next to them (see shader/)
const VERTEX_SHADER_PATH: &str = "shader/vert.spv";
const FRAGMENT_SHADER_PATH: &str = "shader/frag.spv";

pub struct GraphicsPipeline {
    logical_device: Rc<LogicalDevice>,
    pipeline: vk::Pipeline,
    // variables we need to hold onto so they dont get cleaned
    // up before we do
    _render_pass: Rc<RenderPass>,
    _pipeline_layout: Rc<PipelineLayout>,
}

impl GraphicsPipeline {
    /// Builds the quad pipeline. Viewport and scissor are dynamic, so the
    /// pipeline survives whatever extent the framebuffers were built for.
    pub fn new(
        logical_device: &Rc<LogicalDevice>,
        render_pass: &Rc<RenderPass>,
        pipeline_layout: &Rc<PipelineLayout>,
    ) -> Result<Self> {
        let vertex_shader = ShaderModule::from_spv_file(logical_device, VERTEX_SHADER_PATH)?;
        let fragment_shader = ShaderModule::from_spv_file(logical_device, FRAGMENT_SHADER_PATH)?;

        let shader_entrypoint_name = CStr::from_bytes_with_nul(b"main\0")?;
        let shader_stage_create_infos = [
            PipelineShaderStageCreateInfo::default()
                .stage(ShaderStageFlags::VERTEX)
                .module(*vertex_shader)
                .name(shader_entrypoint_name),
            PipelineShaderStageCreateInfo::default()
                .stage(ShaderStageFlags::FRAGMENT)
                .module(*fragment_shader)
                .name(shader_entrypoint_name),
        ];

        let binding_descriptions = [Vertex::binding_description()];
        let attribute_descriptions = Vertex::attribute_descriptions();
        let vertex_input_state_create_info = PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&binding_descriptions)
            .vertex_attribute_descriptions(&attribute_descriptions);

        // interpret the index buffer as a list of triangles
        let input_assembly_state_create_info = PipelineInputAssemblyStateCreateInfo::default()
            .topology(PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // viewport and scissor get set at record time
        let viewport_state_create_info = PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let dynamic_states = [DynamicState::VIEWPORT, DynamicState::SCISSOR];
        let dynamic_state_create_info =
            PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let rasterization_create_info = PipelineRasterizationStateCreateInfo::default()
            // discard points outside the near/far planes instead of clamping
            .depth_clamp_enable(false)
            // setting this to true would disable the rasterizer
            .rasterizer_discard_enable(false)
            // create filled polygons, instead of lines or points
            .polygon_mode(PolygonMode::FILL)
            // default line width
            .line_width(1.0f32)
            // faces wound clockwise are front facing, back faces get culled
            .cull_mode(CullModeFlags::BACK)
            .front_face(FrontFace::CLOCKWISE)
            // disable depth biasing, mainly used for shadow mapping
            .depth_bias_enable(false);

        // disable multisampling
        let multisampling_state_create_info = PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(SampleCountFlags::TYPE_1);

        // no blending, vertex colors pass through as-is
        let color_blend_attachment_state = [PipelineColorBlendAttachmentState::default()
            .blend_enable(false)
            .color_write_mask(ColorComponentFlags::RGBA)];
        let color_blend_state = PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachment_state);

        let graphics_pipeline_create_info = [GraphicsPipelineCreateInfo::default()
            .stages(&shader_stage_create_infos)
            .vertex_input_state(&vertex_input_state_create_info)
            .input_assembly_state(&input_assembly_state_create_info)
            .viewport_state(&viewport_state_create_info)
            .dynamic_state(&dynamic_state_create_info)
            .rasterization_state(&rasterization_create_info)
            .multisample_state(&multisampling_state_create_info)
            .color_blend_state(&color_blend_state)
            .layout(***pipeline_layout)
            .render_pass(***render_pass)];

        let pipelines = unsafe {
            logical_device.create_graphics_pipelines(
                PipelineCache::null(),
                &graphics_pipeline_create_info,
                None,
            )
        }
        .map_err(|(_, result)| result)?;

        // shader modules are only needed for pipeline creation and drop here

        Ok(Self {
            logical_device: Rc::clone(logical_device),
            pipeline: pipelines[0],
            _render_pass: Rc::clone(render_pass),
            _pipeline_layout: Rc::clone(pipeline_layout),
        })
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe { self.logical_device.destroy_pipeline(self.pipeline, None) }
    }
}

impl Deref for GraphicsPipeline {
    type Target = vk::Pipeline;

    fn deref(&self) -> &Self::Target {
        &self.pipeline
    }
}
