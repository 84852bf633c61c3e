//! Fullscreen lighting pass.
//!
//! Reads the GBuffer, pre-pass depth and cascade map and writes the shaded
//! image to `Lighting/Output`. The input bind group refers to textures that
//! other passes recreate on resize, so it is rebuilt whenever the table
//! version of any source changes.

use log::debug;

use super::{pipeline_layout_desc, target_desc};
use crate::device::GpuDevice;
use crate::gpu::WgpuDevice;
use crate::names::{gbuffer, light, lighting, prepass, scene, shadow};
use crate::pass::{FrameContext, PassDescriptor, PassError, RenderPass, SetupContext};
use crate::resource::{
    BindGroupDesc, BindGroupEntryDesc, BindGroupLayoutDesc, BindingResourceDesc, FragmentDesc,
    RenderPipelineDesc, ResourceDesc, ResourceTable, SamplerDesc,
};

/// Resources bound in the input group, in binding order.
const BOUND_INPUTS: [&str; 7] = [
    gbuffer::A,
    gbuffer::B,
    gbuffer::C,
    gbuffer::D,
    prepass::DEPTH,
    shadow::CASCADE_MAP,
    light::AMBIENT_BUFFER,
];

#[derive(Debug, Default)]
pub struct LightingPass {
    /// Versions of [`BOUND_INPUTS`] when the input group was last built.
    bound_versions: Vec<Option<u64>>,
}

fn texture_entry(
    binding: u32,
    sample_type: wgpu::TextureSampleType,
    dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension: dimension,
            multisampled: false,
        },
        count: None,
    }
}

fn input_layout() -> ResourceDesc {
    let color = wgpu::TextureSampleType::Float { filterable: false };
    let mut entries: Vec<_> = (0..4)
        .map(|binding| texture_entry(binding, color, wgpu::TextureViewDimension::D2))
        .collect();
    entries.push(texture_entry(
        4,
        wgpu::TextureSampleType::Depth,
        wgpu::TextureViewDimension::D2,
    ));
    entries.push(texture_entry(
        5,
        wgpu::TextureSampleType::Depth,
        wgpu::TextureViewDimension::D2Array,
    ));
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: 6,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
        count: None,
    });
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: 7,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(32),
        },
        count: None,
    });
    ResourceDesc::BindGroupLayout(BindGroupLayoutDesc { entries })
}

fn input_bind_group() -> ResourceDesc {
    let mut entries: Vec<BindGroupEntryDesc> = BOUND_INPUTS[..5]
        .iter()
        .enumerate()
        .map(|(binding, name)| BindGroupEntryDesc {
            binding: binding as u32,
            resource: BindingResourceDesc::texture(*name),
        })
        .collect();
    entries.push(BindGroupEntryDesc {
        binding: 5,
        // A single cascade still has to be viewed as an array.
        resource: BindingResourceDesc::TextureView {
            name: shadow::CASCADE_MAP.to_string(),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            aspect: wgpu::TextureAspect::DepthOnly,
        },
    });
    entries.push(BindGroupEntryDesc {
        binding: 6,
        resource: BindingResourceDesc::sampler(lighting::SHADOW_SAMPLER),
    });
    entries.push(BindGroupEntryDesc {
        binding: 7,
        resource: BindingResourceDesc::buffer(light::AMBIENT_BUFFER),
    });
    ResourceDesc::BindGroup(BindGroupDesc {
        layout: lighting::INPUT_LAYOUT.to_string(),
        entries,
    })
}

impl LightingPass {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_versions<D: GpuDevice>(table: &ResourceTable<D>) -> Vec<Option<u64>> {
        BOUND_INPUTS.iter().map(|name| table.version(name)).collect()
    }

    pub(crate) fn create_resources<D: GpuDevice>(
        &mut self,
        ctx: &mut SetupContext<'_, D>,
    ) -> Result<(), PassError> {
        ctx.create_shader(lighting::SHADER, "lighting.wgsl")?;
        ctx.table.create_resource(lighting::INPUT_LAYOUT, input_layout())?;
        ctx.table.create_resource(
            lighting::SHADOW_SAMPLER,
            ResourceDesc::Sampler(SamplerDesc::comparison(wgpu::CompareFunction::LessEqual)),
        )?;
        ctx.table.create_resource(
            lighting::PIPELINE_LAYOUT,
            pipeline_layout_desc(&[
                scene::FRAME_BIND_GROUP_LAYOUT,
                lighting::INPUT_LAYOUT,
                light::DIRECTIONAL_LAYOUT,
            ]),
        )?;
        ctx.table.create_resource(
            lighting::PIPELINE,
            ResourceDesc::RenderPipeline(RenderPipelineDesc {
                layout: lighting::PIPELINE_LAYOUT.to_string(),
                vertex_shader: lighting::SHADER.to_string(),
                vertex_entry_point: "vs_main".to_string(),
                vertex_buffers: Vec::new(),
                fragment: Some(FragmentDesc {
                    shader: lighting::SHADER.to_string(),
                    entry_point: "fs_main".to_string(),
                    targets: vec![Some(wgpu::ColorTargetState::from(ctx.output_format))],
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
            }),
        )?;
        self.create_output(ctx)?;
        self.refresh_inputs(ctx.table)?;
        Ok(())
    }

    pub(crate) fn create_output<D: GpuDevice>(
        &mut self,
        ctx: &mut SetupContext<'_, D>,
    ) -> Result<(), PassError> {
        let mut desc = target_desc(ctx.viewport, ctx.output_format);
        if let ResourceDesc::Texture(texture) = &mut desc {
            texture.usage |= wgpu::TextureUsages::COPY_SRC;
        }
        ctx.table.create_resource(lighting::OUTPUT, desc)?;
        Ok(())
    }

    /// Rebuild the input bind group if any bound resource was recreated.
    ///
    /// Returns whether the group was rebuilt.
    pub(crate) fn refresh_inputs<D: GpuDevice>(
        &mut self,
        table: &mut ResourceTable<D>,
    ) -> Result<bool, PassError> {
        let versions = Self::current_versions(table);
        if table.has_resource(lighting::INPUT_BIND_GROUP) && versions == self.bound_versions {
            return Ok(false);
        }
        table.create_resource(lighting::INPUT_BIND_GROUP, input_bind_group())?;
        self.bound_versions = versions;
        debug!("Lighting inputs rebound");
        Ok(true)
    }
}

impl RenderPass<WgpuDevice> for LightingPass {
    fn name(&self) -> &str {
        "LightingPass"
    }

    fn declare(&self) -> PassDescriptor {
        PassDescriptor::new("LightingPass")
            .inputs([scene::FRAME_BIND_GROUP, light::DIRECTIONAL_BIND_GROUP])
            .inputs(BOUND_INPUTS)
            .managed([
                lighting::OUTPUT,
                lighting::SHADER,
                lighting::INPUT_LAYOUT,
                lighting::INPUT_BIND_GROUP,
                lighting::SHADOW_SAMPLER,
                lighting::PIPELINE_LAYOUT,
                lighting::PIPELINE,
            ])
            .outputs([lighting::OUTPUT])
    }

    fn initialize(&mut self, ctx: &mut SetupContext<'_, WgpuDevice>) -> Result<(), PassError> {
        self.create_resources(ctx)
    }

    fn on_resize(&mut self, ctx: &mut SetupContext<'_, WgpuDevice>) -> Result<(), PassError> {
        self.create_output(ctx)
    }

    fn render(&mut self, frame: &mut FrameContext<'_, WgpuDevice>) -> Result<(), PassError> {
        self.refresh_inputs(frame.table)?;

        let table = &*frame.table;
        let output = table.texture_view(lighting::OUTPUT)?;
        let pipeline = table.render_pipeline(lighting::PIPELINE)?;
        let frame_group = table.bind_group(scene::FRAME_BIND_GROUP)?;
        let inputs = table.bind_group(lighting::INPUT_BIND_GROUP)?;
        let sun = table.bind_group(light::DIRECTIONAL_BIND_GROUP)?;

        let mut pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("lighting"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(frame.scene.clear_color),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, frame_group, &[]);
        pass.set_bind_group(1, inputs, &[]);
        pass.set_bind_group(2, sun, &[]);
        pass.draw(0..3, 0..1);
        Ok(())
    }
}
