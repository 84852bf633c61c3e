//! The four passes of the deferred pipeline, in frame order.

mod gbuffer;
mod lighting;
mod prepass;
mod shadow;

pub use gbuffer::{GBufferPass, GBUFFER_FORMATS};
pub use lighting::LightingPass;
pub use prepass::DepthPrePass;
pub use shadow::ShadowPass;

use crate::gpu::WgpuDevice;
use crate::names;
use crate::pass::Viewport;
use crate::resource::{
    FragmentDesc, PipelineLayoutDesc, RenderPipelineDesc, ResourceDesc, ResourceError,
    ResourceTable, TextureDesc,
};
use crate::scene::{GpuScene, StaticVertex};

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Names the GPU scene and its lights create before any pass initializes.
pub const SCENE_RESOURCES: [&str; 9] = [
    names::scene::FRAME_BUFFER,
    names::scene::FRAME_BIND_GROUP_LAYOUT,
    names::scene::FRAME_BIND_GROUP,
    names::scene::INSTANCE_BIND_GROUP_LAYOUT,
    names::light::AMBIENT_BUFFER,
    names::light::DIRECTIONAL_LAYOUT,
    names::light::DIRECTIONAL_BIND_GROUP,
    names::light::DIRECTIONAL_CASCADE_LAYOUT,
    names::light::DIRECTIONAL_CASCADE_BIND_GROUP,
];

/// Screen-sized render target that can also be sampled by a later pass.
pub(crate) fn target_desc(viewport: Viewport, format: wgpu::TextureFormat) -> ResourceDesc {
    ResourceDesc::Texture(TextureDesc::d2(
        viewport.width,
        viewport.height,
        format,
        wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
    ))
}

pub(crate) fn pipeline_layout_desc(layouts: &[&str]) -> ResourceDesc {
    ResourceDesc::PipelineLayout(PipelineLayoutDesc {
        bind_group_layouts: layouts.iter().map(|name| name.to_string()).collect(),
    })
}

/// Pipeline drawing [`StaticVertex`] meshes with the instance record in group 1.
pub(crate) fn mesh_pipeline_desc(
    layout: &str,
    shader: &str,
    fragment_targets: Option<Vec<Option<wgpu::ColorTargetState>>>,
    cull_mode: wgpu::Face,
    depth_stencil: wgpu::DepthStencilState,
) -> ResourceDesc {
    ResourceDesc::RenderPipeline(RenderPipelineDesc {
        layout: layout.to_string(),
        vertex_shader: shader.to_string(),
        vertex_entry_point: "vs_main".to_string(),
        vertex_buffers: vec![StaticVertex::layout()],
        fragment: fragment_targets.map(|targets| FragmentDesc {
            shader: shader.to_string(),
            entry_point: "fs_main".to_string(),
            targets,
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: Some(cull_mode),
            ..Default::default()
        },
        depth_stencil: Some(depth_stencil),
        multisample: wgpu::MultisampleState::default(),
    })
}

/// Bind group 1 and the mesh buffers for every scene instance, then draw it.
///
/// Returns the number of draw calls recorded.
pub(crate) fn draw_instances(
    pass: &mut wgpu::RenderPass<'_>,
    table: &ResourceTable<WgpuDevice>,
    scene: &GpuScene,
) -> Result<u32, ResourceError> {
    let mut items = scene.draw_items().peekable();
    if items.peek().is_none() {
        return Ok(0);
    }
    let instances = table.bind_group(names::scene::INSTANCE_BIND_GROUP)?;
    let mut draws = 0;
    for item in items {
        let vertices = table.buffer(&item.mesh.vertex_buffer)?;
        let indices = table.buffer(&item.mesh.index_buffer)?;
        pass.set_bind_group(1, instances, &[item.instance_offset]);
        pass.set_vertex_buffer(0, vertices.slice(..));
        pass.set_index_buffer(indices.slice(..), item.mesh.index_format);
        pass.draw_indexed(0..item.mesh.index_count, 0, 0..1);
        draws += 1;
    }
    Ok(draws)
}

#[cfg(test)]
pub(crate) mod tests {
    use glam::Mat4;

    use crate::camera::Camera;
    use crate::headless::HeadlessDevice;
    use crate::pass::SetupContext;
    use crate::resource::ResourceTable;
    use crate::scene::{GpuScene, MaterialBlock, MeshData};
    use crate::shader::ShaderLibrary;

    use super::*;

    /// A table holding an initialized scene with one cube.
    pub(crate) fn scene_fixture() -> (ResourceTable<HeadlessDevice>, GpuScene, ShaderLibrary) {
        let mut table = ResourceTable::with_device(HeadlessDevice::new());
        let mut scene = GpuScene::new(Camera::default(), 128);
        scene.init(&mut table).unwrap();
        scene
            .add_mesh(
                &mut table,
                "cube",
                &MeshData::cube(1.0),
                Mat4::IDENTITY,
                MaterialBlock::default(),
            )
            .unwrap();
        scene.update(&mut table, 0.016).unwrap();
        (table, scene, ShaderLibrary::new())
    }

    pub(crate) fn context<'a>(
        table: &'a mut ResourceTable<HeadlessDevice>,
        scene: &'a GpuScene,
        shaders: &'a ShaderLibrary,
        viewport: Viewport,
    ) -> SetupContext<'a, HeadlessDevice> {
        SetupContext {
            table,
            scene,
            shaders,
            viewport,
            output_format: wgpu::TextureFormat::Bgra8UnormSrgb,
        }
    }

    #[test]
    fn test_scene_fixture_provides_scene_resources() {
        let (table, _scene, _shaders) = scene_fixture();
        for name in SCENE_RESOURCES {
            assert!(table.has_resource(name), "{name} missing");
        }
    }

    #[test]
    fn test_mesh_pipeline_depends_on_layout_and_shader() {
        let desc = mesh_pipeline_desc(
            "Layout",
            "Shader",
            None,
            wgpu::Face::Back,
            wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Greater,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            },
        );
        let deps: Vec<&str> = desc.dependencies().into_iter().map(|(n, _)| n).collect();
        assert_eq!(deps, vec!["Layout", "Shader"]);
    }
}
