use log::trace;

use super::{draw_instances, mesh_pipeline_desc, pipeline_layout_desc, target_desc, DEPTH_FORMAT};
use crate::device::GpuDevice;
use crate::gpu::WgpuDevice;
use crate::names::{gbuffer, prepass, scene};
use crate::pass::{FrameContext, PassDescriptor, PassError, RenderPass, SetupContext};

/// Targets and formats in attachment order.
pub const GBUFFER_FORMATS: [(&str, wgpu::TextureFormat); 4] = [
    (gbuffer::A, wgpu::TextureFormat::Rgb10a2Unorm),
    (gbuffer::B, wgpu::TextureFormat::Rgba8Unorm),
    (gbuffer::C, wgpu::TextureFormat::Rgba8UnormSrgb),
    (gbuffer::D, wgpu::TextureFormat::Rgba8Unorm),
];

/// Writes normal, surface parameters, base color and emissive/occlusion for
/// every visible pixel, depth-tested against the pre-pass.
#[derive(Debug, Default)]
pub struct GBufferPass;

impl GBufferPass {
    pub fn new() -> Self {
        Self
    }

    pub(crate) fn create_resources<D: GpuDevice>(
        &self,
        ctx: &mut SetupContext<'_, D>,
    ) -> Result<(), PassError> {
        ctx.create_shader(gbuffer::SHADER, "gbuffer.wgsl")?;
        ctx.table.create_resource(
            gbuffer::PIPELINE_LAYOUT,
            pipeline_layout_desc(&[
                scene::FRAME_BIND_GROUP_LAYOUT,
                scene::INSTANCE_BIND_GROUP_LAYOUT,
            ]),
        )?;
        let targets = GBUFFER_FORMATS
            .iter()
            .map(|(_, format)| Some(wgpu::ColorTargetState::from(*format)))
            .collect();
        ctx.table.create_resource(
            gbuffer::PIPELINE,
            mesh_pipeline_desc(
                gbuffer::PIPELINE_LAYOUT,
                gbuffer::SHADER,
                Some(targets),
                wgpu::Face::Back,
                wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: false,
                    depth_compare: wgpu::CompareFunction::GreaterEqual,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                },
            ),
        )?;
        self.create_targets(ctx)
    }

    pub(crate) fn create_targets<D: GpuDevice>(
        &self,
        ctx: &mut SetupContext<'_, D>,
    ) -> Result<(), PassError> {
        for (name, format) in GBUFFER_FORMATS {
            ctx.table.create_resource(name, target_desc(ctx.viewport, format))?;
        }
        Ok(())
    }
}

impl RenderPass<WgpuDevice> for GBufferPass {
    fn name(&self) -> &str {
        "GBufferPass"
    }

    fn declare(&self) -> PassDescriptor {
        PassDescriptor::new("GBufferPass")
            .inputs([scene::FRAME_BIND_GROUP, prepass::DEPTH])
            .managed(GBUFFER_FORMATS.iter().map(|(name, _)| *name))
            .managed([gbuffer::SHADER, gbuffer::PIPELINE_LAYOUT, gbuffer::PIPELINE])
            .outputs(GBUFFER_FORMATS.iter().map(|(name, _)| *name))
    }

    fn initialize(&mut self, ctx: &mut SetupContext<'_, WgpuDevice>) -> Result<(), PassError> {
        self.create_resources(ctx)
    }

    fn on_resize(&mut self, ctx: &mut SetupContext<'_, WgpuDevice>) -> Result<(), PassError> {
        self.create_targets(ctx)
    }

    fn render(&mut self, frame: &mut FrameContext<'_, WgpuDevice>) -> Result<(), PassError> {
        let table = &*frame.table;
        let mut attachments = Vec::with_capacity(GBUFFER_FORMATS.len());
        for (name, _) in GBUFFER_FORMATS {
            attachments.push(Some(wgpu::RenderPassColorAttachment {
                view: table.texture_view(name)?,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            }));
        }
        let depth = table.texture_view(prepass::DEPTH)?;
        let pipeline = table.render_pipeline(gbuffer::PIPELINE)?;
        let frame_group = table.bind_group(scene::FRAME_BIND_GROUP)?;

        let mut pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("gbuffer"),
            color_attachments: &attachments,
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, frame_group, &[]);
        let draws = draw_instances(&mut pass, table, frame.scene)?;
        trace!("GBuffer pass recorded {draws} draws");
        Ok(())
    }
}
