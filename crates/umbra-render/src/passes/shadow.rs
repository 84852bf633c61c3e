//! Cascaded shadow map rendering.
//!
//! `Shadow/CascadeMap` is a depth texture array with one layer per cascade.
//! Its size comes from configuration, not from the window, so resizing the
//! window leaves it alone. When the directional light's cascade count changes
//! the array is recreated with the new layer count.

use log::{debug, trace};

use super::{draw_instances, mesh_pipeline_desc, pipeline_layout_desc, DEPTH_FORMAT};
use crate::device::GpuDevice;
use crate::gpu::WgpuDevice;
use crate::names::{light, scene, shadow};
use crate::pass::{FrameContext, PassDescriptor, PassError, RenderPass, SetupContext};
use crate::resource::{ResourceDesc, ResourceTable, TextureDesc};
use crate::scene::GpuScene;

/// Shadow depth is not reversed; cleared to the far plane.
const SHADOW_CLEAR: f32 = 1.0;

#[derive(Debug)]
pub struct ShadowPass {
    resolution: u32,
    layers: u32,
}

impl ShadowPass {
    pub fn new(resolution: u32) -> Self {
        Self {
            resolution: resolution.max(1),
            layers: 0,
        }
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Layers in the current cascade map.
    pub fn layers(&self) -> u32 {
        self.layers
    }

    fn wanted_layers(scene: &GpuScene) -> u32 {
        scene
            .directional_light()
            .map_or(1, |light| light.cascade_count())
    }

    pub(crate) fn create_resources<D: GpuDevice>(
        &mut self,
        ctx: &mut SetupContext<'_, D>,
    ) -> Result<(), PassError> {
        ctx.create_shader(shadow::SHADER, "shadow.wgsl")?;
        ctx.table.create_resource(
            shadow::PIPELINE_LAYOUT,
            pipeline_layout_desc(&[
                light::DIRECTIONAL_CASCADE_LAYOUT,
                scene::INSTANCE_BIND_GROUP_LAYOUT,
            ]),
        )?;
        ctx.table.create_resource(
            shadow::PIPELINE,
            mesh_pipeline_desc(
                shadow::PIPELINE_LAYOUT,
                shadow::SHADER,
                None,
                wgpu::Face::Front,
                wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState {
                        constant: 2,
                        slope_scale: 1.75,
                        clamp: 0.0,
                    },
                },
            ),
        )?;
        self.create_map(ctx.table, Self::wanted_layers(ctx.scene))
    }

    pub(crate) fn create_map<D: GpuDevice>(
        &mut self,
        table: &mut ResourceTable<D>,
        layers: u32,
    ) -> Result<(), PassError> {
        table.create_resource(
            shadow::CASCADE_MAP,
            ResourceDesc::Texture(TextureDesc::d2_array(
                self.resolution,
                self.resolution,
                layers,
                DEPTH_FORMAT,
                wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            )),
        )?;
        self.layers = layers;
        debug!(
            "Cascade map {}x{} with {layers} layers",
            self.resolution, self.resolution
        );
        Ok(())
    }

    /// Recreate the map if the light now wants a different number of cascades.
    pub(crate) fn sync_layers<D: GpuDevice>(
        &mut self,
        table: &mut ResourceTable<D>,
        scene: &GpuScene,
    ) -> Result<bool, PassError> {
        let wanted = Self::wanted_layers(scene);
        if wanted == self.layers {
            return Ok(false);
        }
        self.create_map(table, wanted)?;
        Ok(true)
    }
}

impl RenderPass<WgpuDevice> for ShadowPass {
    fn name(&self) -> &str {
        "ShadowPass"
    }

    fn declare(&self) -> PassDescriptor {
        PassDescriptor::new("ShadowPass")
            .inputs([light::DIRECTIONAL_CASCADE_BIND_GROUP])
            .managed([
                shadow::CASCADE_MAP,
                shadow::SHADER,
                shadow::PIPELINE_LAYOUT,
                shadow::PIPELINE,
            ])
            .outputs([shadow::CASCADE_MAP])
    }

    fn initialize(&mut self, ctx: &mut SetupContext<'_, WgpuDevice>) -> Result<(), PassError> {
        self.create_resources(ctx)
    }

    fn on_resize(&mut self, _ctx: &mut SetupContext<'_, WgpuDevice>) -> Result<(), PassError> {
        Ok(())
    }

    fn render(&mut self, frame: &mut FrameContext<'_, WgpuDevice>) -> Result<(), PassError> {
        let Some(sun) = frame.scene.directional_light() else {
            return Ok(());
        };
        self.sync_layers(frame.table, frame.scene)?;

        let table = &*frame.table;
        let map = table.texture(shadow::CASCADE_MAP)?;
        let pipeline = table.render_pipeline(shadow::PIPELINE)?;
        let cascade_group = table.bind_group(light::DIRECTIONAL_CASCADE_BIND_GROUP)?;

        let count = (sun.cascades().len() as u32).min(self.layers);
        for index in 0..count {
            let layer = map.create_view(&wgpu::TextureViewDescriptor {
                label: Some("shadow-cascade-layer"),
                dimension: Some(wgpu::TextureViewDimension::D2),
                base_array_layer: index,
                array_layer_count: Some(1),
                ..Default::default()
            });
            let mut pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("shadow-cascade"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &layer,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(SHADOW_CLEAR),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, cascade_group, &[sun.cascade_offset(index)]);
            let draws = draw_instances(&mut pass, table, frame.scene)?;
            trace!("Cascade {index} recorded {draws} draws");
        }
        Ok(())
    }
}
