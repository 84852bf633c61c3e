//! Per-frame camera and timing uniform.

use bytemuck::{Pod, Zeroable};
use log::debug;

use crate::camera::Camera;
use crate::device::GpuDevice;
use crate::names::scene;
use crate::resource::{
    BindGroupDesc, BindGroupEntryDesc, BindGroupLayoutDesc, BindingResourceDesc, BufferDesc,
    ResourceDesc, ResourceError, ResourceTable,
};

/// Camera and timing data rewritten every frame.
///
/// Column-major matrices followed by `vec4` rows, so the WGSL struct has the
/// same layout with no implicit padding.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct FrameUniform {
    pub view: [[f32; 4]; 4],
    pub inverse_view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub inverse_projection: [[f32; 4]; 4],
    pub position: [f32; 4],
    pub direction: [f32; 4],
    pub up: [f32; 4],
    pub right: [f32; 4],
    /// Accumulated seconds, delta seconds.
    pub time: [f32; 4],
    /// Near, far, aspect, vertical fov.
    pub params: [f32; 4],
}

static_assertions::assert_eq_size!(FrameUniform, [u8; 352]);

impl FrameUniform {
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    pub fn from_camera(camera: &Camera, elapsed: f32, delta: f32) -> Self {
        let view = camera.view_matrix();
        let projection = camera.projection_matrix();
        Self {
            view: view.to_cols_array_2d(),
            inverse_view: view.inverse().to_cols_array_2d(),
            projection: projection.to_cols_array_2d(),
            inverse_projection: projection.inverse().to_cols_array_2d(),
            position: camera.position.extend(1.0).to_array(),
            direction: camera.forward().extend(0.0).to_array(),
            up: camera.up().extend(0.0).to_array(),
            right: camera.right().extend(0.0).to_array(),
            time: [elapsed, delta, 0.0, 0.0],
            params: [camera.near, camera.far, camera.aspect_ratio(), camera.fov_y()],
        }
    }
}

/// Owner of `Scene/FrameBuffer` and the bind group every pass uses at group 0.
#[derive(Debug, Default)]
pub struct FrameUniformBlock {
    elapsed: f32,
    current: Option<FrameUniform>,
}

impl FrameUniformBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init<D: GpuDevice>(&mut self, table: &mut ResourceTable<D>) -> Result<(), ResourceError> {
        table.create_resource(
            scene::FRAME_BUFFER,
            ResourceDesc::Buffer(BufferDesc {
                size: FrameUniform::SIZE,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            }),
        )?;
        table.create_resource(
            scene::FRAME_BIND_GROUP_LAYOUT,
            ResourceDesc::BindGroupLayout(BindGroupLayoutDesc {
                entries: vec![wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(FrameUniform::SIZE),
                    },
                    count: None,
                }],
            }),
        )?;
        table.create_resource(
            scene::FRAME_BIND_GROUP,
            ResourceDesc::BindGroup(BindGroupDesc {
                layout: scene::FRAME_BIND_GROUP_LAYOUT.to_string(),
                entries: vec![BindGroupEntryDesc {
                    binding: 0,
                    resource: BindingResourceDesc::buffer(scene::FRAME_BUFFER),
                }],
            }),
        )?;
        debug!("Frame uniform block initialized");
        Ok(())
    }

    /// Recompute the whole record from `camera` and upload it.
    pub fn update_camera<D: GpuDevice>(
        &mut self,
        table: &ResourceTable<D>,
        camera: &Camera,
        delta: f32,
    ) -> Result<(), ResourceError> {
        self.elapsed += delta;
        let uniform = FrameUniform::from_camera(camera, self.elapsed, delta);
        table.write_buffer(scene::FRAME_BUFFER, 0, bytemuck::bytes_of(&uniform))?;
        self.current = Some(uniform);
        Ok(())
    }

    /// Seconds accumulated over every update.
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// The record uploaded by the last update.
    pub fn current(&self) -> Option<&FrameUniform> {
        self.current.as_ref()
    }

    pub fn destroy<D: GpuDevice>(&mut self, table: &mut ResourceTable<D>) {
        table.delete_resource(scene::FRAME_BIND_GROUP);
        table.delete_resource(scene::FRAME_BIND_GROUP_LAYOUT);
        table.delete_resource(scene::FRAME_BUFFER);
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;
    use glam::Vec3;

    #[test]
    fn test_update_uploads_full_record() {
        let mut table = ResourceTable::with_device(HeadlessDevice::new());
        let mut block = FrameUniformBlock::new();
        block.init(&mut table).unwrap();

        let camera = Camera {
            position: Vec3::new(1.0, 2.0, 3.0),
            ..Camera::default()
        };
        block.update_camera(&table, &camera, 0.25).unwrap();
        block.update_camera(&table, &camera, 0.5).unwrap();

        let handle = table.get_resource(scene::FRAME_BUFFER).unwrap();
        let bytes = table.device().unwrap().buffer_contents(handle).unwrap();
        assert_eq!(bytes.len(), 352);
        let uniform: FrameUniform = bytemuck::pod_read_unaligned(&bytes);
        assert_eq!(uniform.position, [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(uniform.time[0], 0.75);
        assert_eq!(uniform.time[1], 0.5);
        assert_eq!(uniform.params[0], camera.near);
        assert_eq!(uniform.params[1], camera.far);
    }

    #[test]
    fn test_inverse_matrices_match() {
        let camera = Camera {
            position: Vec3::new(-4.0, 1.0, 9.0),
            ..Camera::default()
        };
        let uniform = FrameUniform::from_camera(&camera, 0.0, 0.0);
        let view = glam::Mat4::from_cols_array_2d(&uniform.view);
        let inverse = glam::Mat4::from_cols_array_2d(&uniform.inverse_view);
        assert!((view * inverse).abs_diff_eq(glam::Mat4::IDENTITY, 1e-4));
    }

    #[test]
    fn test_update_before_init_fails() {
        let table = ResourceTable::with_device(HeadlessDevice::new());
        let mut block = FrameUniformBlock::new();
        let err = block
            .update_camera(&table, &Camera::default(), 0.016)
            .unwrap_err();
        assert!(matches!(err, ResourceError::NotFound { .. }));
    }

    #[test]
    fn test_destroy_removes_resources() {
        let mut table = ResourceTable::with_device(HeadlessDevice::new());
        let mut block = FrameUniformBlock::new();
        block.init(&mut table).unwrap();
        assert_eq!(table.len(), 3);
        block.destroy(&mut table);
        assert!(table.is_empty());
    }
}
