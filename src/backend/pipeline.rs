// Graphics pipeline creation and management
//
// The graphics pipeline defines how vertices are processed and rasterized.
// Everything here is fixed at creation time: no dynamic state, no
// descriptor sets, no depth buffer.

use crate::backend::DeviceContext;
use crate::error::{Result, VkResultExt};
use crate::scene::Vertex;
use ash::vk;
use std::sync::Arc;

/// Create a single-subpass render pass with one cleared color attachment
pub fn create_render_pass(device: &ash::Device, format: vk::Format) -> Result<vk::RenderPass> {
    // Color attachment (the swapchain image)
    let color_attachment = vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build();

    let color_attachment_ref = vk::AttachmentReference::builder()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build();

    let color_attachments = &[color_attachment_ref];
    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(color_attachments)
        .build();

    // The layout transition must wait for the acquire semaphore, which the
    // submit waits on at COLOR_ATTACHMENT_OUTPUT
    let dependency = vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .build();

    let attachments = &[color_attachment];
    let subpasses = &[subpass];
    let dependencies = &[dependency];

    let render_pass_info = vk::RenderPassCreateInfo::builder()
        .attachments(attachments)
        .subpasses(subpasses)
        .dependencies(dependencies);

    unsafe { device.create_render_pass(&render_pass_info, None) }
        .pipeline_step("create render pass")
}

/// Empty layout: the fixed scene needs no descriptors or push constants
pub fn create_pipeline_layout(device: &ash::Device) -> Result<vk::PipelineLayout> {
    let layout_info = vk::PipelineLayoutCreateInfo::builder();

    unsafe { device.create_pipeline_layout(&layout_info, None) }
        .pipeline_step("create pipeline layout")
}

/// Create one single-layer framebuffer per swapchain image view.
/// Framebuffers created before a failure are destroyed before returning.
pub fn create_framebuffers(
    device: &ash::Device,
    image_views: &[vk::ImageView],
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
) -> Result<Vec<vk::Framebuffer>> {
    let mut framebuffers = Vec::with_capacity(image_views.len());

    for &image_view in image_views {
        let attachments = &[image_view];
        let framebuffer_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        match unsafe { device.create_framebuffer(&framebuffer_info, None) }
            .pipeline_step("create framebuffer")
        {
            Ok(framebuffer) => framebuffers.push(framebuffer),
            Err(err) => {
                for framebuffer in framebuffers {
                    unsafe { device.destroy_framebuffer(framebuffer, None) };
                }
                return Err(err);
            }
        }
    }

    Ok(framebuffers)
}

/// Full-extent viewport with the standard [0, 1] depth range
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport::builder()
        .x(0.0)
        .y(0.0)
        .width(extent.width as f32)
        .height(extent.height as f32)
        .min_depth(0.0)
        .max_depth(1.0)
        .build()
}

/// Create the fixed graphics pipeline for drawing [`Vertex`] triangles
pub fn create_graphics_pipeline(
    device: &ash::Device,
    vert_shader: vk::ShaderModule,
    frag_shader: vk::ShaderModule,
    layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
) -> Result<vk::Pipeline> {
    // Shader stages
    let entry_point = c"main";

    let vert_stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::VERTEX)
        .module(vert_shader)
        .name(entry_point)
        .build();

    let frag_stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::FRAGMENT)
        .module(frag_shader)
        .name(entry_point)
        .build();

    let shader_stages = &[vert_stage, frag_stage];

    // Vertex input
    let bindings = [Vertex::binding_description()];
    let attributes = Vertex::attribute_descriptions();
    let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);

    // Input assembly
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    // Viewport and scissor
    let viewports = &[full_viewport(extent)];
    let scissors = &[vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }];
    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewports(viewports)
        .scissors(scissors);

    // Rasterization
    let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::NONE)
        .front_face(vk::FrontFace::CLOCKWISE)
        .depth_bias_enable(false);

    // Multisampling (disabled)
    let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    // Color blending (no blending, opaque)
    let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false)
        .build();

    let color_blend_attachments = &[color_blend_attachment];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op_enable(false)
        .attachments(color_blend_attachments);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(shader_stages)
        .vertex_input_state(&vertex_input_info)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .color_blend_state(&color_blending)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(0)
        .build();

    let pipelines = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    }
    .map_err(|(_, result)| result)
    .pipeline_step("create graphics pipeline")?;

    Ok(pipelines[0])
}

/// Layout, render pass, pipeline and one framebuffer per swapchain image.
///
/// Handles start out null so a partially built set can always be dropped;
/// destroying a null handle is a no-op.
pub struct PipelineResources {
    pub framebuffers: Vec<vk::Framebuffer>,
    pub render_pass: vk::RenderPass,
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
    pub extent: vk::Extent2D,
    ctx: Arc<DeviceContext>,
}

impl PipelineResources {
    pub fn new(
        ctx: Arc<DeviceContext>,
        vert_shader: vk::ShaderModule,
        frag_shader: vk::ShaderModule,
        format: vk::Format,
        extent: vk::Extent2D,
        image_views: &[vk::ImageView],
    ) -> Result<Self> {
        let mut resources = Self {
            framebuffers: Vec::new(),
            render_pass: vk::RenderPass::null(),
            layout: vk::PipelineLayout::null(),
            pipeline: vk::Pipeline::null(),
            extent,
            ctx,
        };

        let device = &resources.ctx.device;
        resources.layout = create_pipeline_layout(device)?;
        resources.render_pass = create_render_pass(device, format)?;
        resources.pipeline = create_graphics_pipeline(
            device,
            vert_shader,
            frag_shader,
            resources.layout,
            resources.render_pass,
            extent,
        )?;
        resources.framebuffers =
            create_framebuffers(device, image_views, resources.render_pass, extent)?;

        log::info!(
            "Created graphics pipeline with {} framebuffers ({}x{})",
            resources.framebuffers.len(),
            extent.width,
            extent.height
        );

        Ok(resources)
    }
}

impl Drop for PipelineResources {
    fn drop(&mut self) {
        let device = &self.ctx.device;
        unsafe {
            for &framebuffer in &self.framebuffers {
                device.destroy_framebuffer(framebuffer, None);
            }
            device.destroy_render_pass(self.render_pass, None);
            device.destroy_pipeline_layout(self.layout, None);
            device.destroy_pipeline(self.pipeline, None);
        }
    }
}
