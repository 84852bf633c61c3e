use log::trace;

use super::{draw_instances, mesh_pipeline_desc, pipeline_layout_desc, target_desc, DEPTH_FORMAT};
use crate::device::GpuDevice;
use crate::gpu::WgpuDevice;
use crate::names::{prepass, scene};
use crate::pass::{
    FrameContext, PassDescriptor, PassError, RenderPass, SetupContext, DEPTH_CLEAR,
};

/// Depth-only pass filling `PrePass/Depth` before the GBuffer pass.
#[derive(Debug, Default)]
pub struct DepthPrePass;

impl DepthPrePass {
    pub fn new() -> Self {
        Self
    }

    pub(crate) fn create_resources<D: GpuDevice>(
        &self,
        ctx: &mut SetupContext<'_, D>,
    ) -> Result<(), PassError> {
        ctx.create_shader(prepass::SHADER, "prepass.wgsl")?;
        ctx.table.create_resource(
            prepass::PIPELINE_LAYOUT,
            pipeline_layout_desc(&[
                scene::FRAME_BIND_GROUP_LAYOUT,
                scene::INSTANCE_BIND_GROUP_LAYOUT,
            ]),
        )?;
        ctx.table.create_resource(
            prepass::PIPELINE,
            mesh_pipeline_desc(
                prepass::PIPELINE_LAYOUT,
                prepass::SHADER,
                None,
                wgpu::Face::Back,
                wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Greater,
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
        ctx.table
            .create_resource(prepass::DEPTH, target_desc(ctx.viewport, DEPTH_FORMAT))?;
        Ok(())
    }
}

impl RenderPass<WgpuDevice> for DepthPrePass {
    fn name(&self) -> &str {
        "DepthPrePass"
    }

    fn declare(&self) -> PassDescriptor {
        PassDescriptor::new("DepthPrePass")
            .inputs([scene::FRAME_BIND_GROUP])
            .managed([
                prepass::DEPTH,
                prepass::SHADER,
                prepass::PIPELINE_LAYOUT,
                prepass::PIPELINE,
            ])
            .outputs([prepass::DEPTH])
    }

    fn initialize(&mut self, ctx: &mut SetupContext<'_, WgpuDevice>) -> Result<(), PassError> {
        self.create_resources(ctx)
    }

    fn on_resize(&mut self, ctx: &mut SetupContext<'_, WgpuDevice>) -> Result<(), PassError> {
        self.create_targets(ctx)
    }

    fn render(&mut self, frame: &mut FrameContext<'_, WgpuDevice>) -> Result<(), PassError> {
        let table = &*frame.table;
        let depth = table.texture_view(prepass::DEPTH)?;
        let pipeline = table.render_pipeline(prepass::PIPELINE)?;
        let frame_group = table.bind_group(scene::FRAME_BIND_GROUP)?;

        let mut pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("depth-prepass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(DEPTH_CLEAR),
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
        trace!("Depth pre-pass recorded {draws} draws");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::Viewport;
    use crate::passes::tests::{context, scene_fixture};
    use crate::resource::ResourceDesc;

    #[test]
    fn test_creates_declared_resources() {
        let (mut table, scene, shaders) = scene_fixture();
        let pass = DepthPrePass::new();
        pass.create_resources(&mut context(&mut table, &scene, &shaders, Viewport::new(64, 32)))
            .unwrap();

        let descriptor = RenderPass::<WgpuDevice>::declare(&pass);
        for name in &descriptor.managed {
            assert!(table.has_resource(name), "{name} missing");
        }
        match table.descriptor(prepass::DEPTH) {
            Some(ResourceDesc::Texture(desc)) => {
                assert_eq!(desc.format, DEPTH_FORMAT);
                assert_eq!((desc.size.width, desc.size.height), (64, 32));
            }
            other => panic!("unexpected depth descriptor {other:?}"),
        }
    }

    #[test]
    fn test_resize_only_recreates_depth() {
        let (mut table, scene, shaders) = scene_fixture();
        let pass = DepthPrePass::new();
        pass.create_resources(&mut context(&mut table, &scene, &shaders, Viewport::new(64, 32)))
            .unwrap();
        let depth = table.version(prepass::DEPTH);
        let pipeline = table.version(prepass::PIPELINE);

        pass.create_targets(&mut context(&mut table, &scene, &shaders, Viewport::new(128, 64)))
            .unwrap();
        assert!(table.version(prepass::DEPTH) > depth);
        assert_eq!(table.version(prepass::PIPELINE), pipeline);
    }
}
