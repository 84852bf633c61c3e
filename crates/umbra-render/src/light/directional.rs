//! Directional light with cascaded shadows.
//!
//! `Light/DirectionalBuffer` holds the base record at offset 0 followed by one
//! record per cascade, every record padded to the dynamic offset alignment:
//!
//! ```text
//! [ base (64 B) | pad ][ cascade 0 ][ cascade 1 ] ...
//! ```
//!
//! The lighting pass binds the whole buffer. The shadow pass binds one
//! cascade at a time through a dynamic offset.

use bytemuck::{Pod, Zeroable};
use glam::{Quat, Vec3};
use log::debug;

use super::cascade::{self, Cascade, CascadeSettings};
use super::GpuLight;
use crate::camera::Camera;
use crate::device::GpuDevice;
use crate::inspect::{self, InspectError, Inspectable, Property, PropertyValue};
use crate::names::light;
use crate::resource::{
    BindGroupDesc, BindGroupEntryDesc, BindGroupLayoutDesc, BindingResourceDesc, BufferDesc,
    ResourceDesc, ResourceError, ResourceTable,
};

/// Size of one padded record in the light buffer at the default alignment.
pub const DIRECTIONAL_RECORD_SIZE: u64 = 256;

/// Most cascades a light may use.
pub const MAX_CASCADES: u32 = 8;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct DirectionalBaseRecord {
    pub direction: [f32; 4],
    pub color: [f32; 4],
    /// Intensity, show-cascades flag.
    pub params: [f32; 4],
    /// Cascade count.
    pub counts: [u32; 4],
}

static_assertions::assert_eq_size!(DirectionalBaseRecord, [u8; 64]);

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct CascadeRecord {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub view_projection: [[f32; 4]; 4],
    /// World-space center and radius.
    pub sphere: [f32; 4],
    /// Slice near and far in view depth.
    pub depth: [f32; 4],
    /// Depth bias, normal bias.
    pub bias: [f32; 4],
    pub _pad: [f32; 4],
}

static_assertions::assert_eq_size!(CascadeRecord, [u8; 256]);

impl CascadeRecord {
    fn new(cascade: &Cascade, depth_bias: f32, normal_bias: f32) -> Self {
        let scale = 2f32.powi(cascade.index as i32);
        Self {
            view: cascade.view.to_cols_array_2d(),
            projection: cascade.projection.to_cols_array_2d(),
            view_projection: cascade.view_projection().to_cols_array_2d(),
            sphere: cascade.sphere.center.extend(cascade.sphere.radius).to_array(),
            depth: [cascade.near, cascade.far, 0.0, 0.0],
            bias: [depth_bias * scale, normal_bias * scale, 0.0, 0.0],
            _pad: [0.0; 4],
        }
    }
}

/// Sun-like light shining along its orientation's -Z axis.
#[derive(Debug, Clone)]
pub struct DirectionalLight {
    pub orientation: Quat,
    pub color: Vec3,
    pub intensity: f32,
    /// Tint surfaces by cascade index in the lighting pass.
    pub show_cascades: bool,
    pub cascade: CascadeSettings,
    /// Bias of cascade 0; cascade `i` uses `depth_bias * 2^i`.
    pub depth_bias: f32,
    pub normal_bias: f32,
    cascades: Vec<Cascade>,
    record_stride: u64,
    /// Cascade count the buffer is currently sized for.
    allocated: Option<u32>,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self::new(Vec3::new(-0.5, -1.0, -0.5))
    }
}

impl DirectionalLight {
    pub fn new(direction: Vec3) -> Self {
        let mut light = Self {
            orientation: Quat::IDENTITY,
            color: Vec3::ONE,
            intensity: 3.0,
            show_cascades: false,
            cascade: CascadeSettings::default(),
            depth_bias: 0.000_01,
            normal_bias: 0.002,
            cascades: Vec::new(),
            record_stride: DIRECTIONAL_RECORD_SIZE,
            allocated: None,
        };
        light.set_direction(direction);
        light
    }

    pub fn direction(&self) -> Vec3 {
        (self.orientation * Vec3::NEG_Z).normalize()
    }

    /// Point the light along `direction`. Zero vectors are ignored.
    pub fn set_direction(&mut self, direction: Vec3) {
        if let Some(direction) = direction.try_normalize() {
            self.orientation = Quat::from_rotation_arc(Vec3::NEG_Z, direction);
        }
    }

    /// Cascades computed by the last update.
    pub fn cascades(&self) -> &[Cascade] {
        &self.cascades
    }

    pub fn cascade_count(&self) -> u32 {
        self.cascade.count.clamp(1, MAX_CASCADES)
    }

    /// Byte distance between records in the light buffer.
    pub fn record_stride(&self) -> u64 {
        self.record_stride
    }

    /// Dynamic offset selecting cascade `index` in the cascade bind group.
    pub fn cascade_offset(&self, index: u32) -> u32 {
        (self.record_stride * (u64::from(index) + 1)) as u32
    }

    pub fn base_record(&self) -> DirectionalBaseRecord {
        DirectionalBaseRecord {
            direction: self.direction().extend(0.0).to_array(),
            color: self.color.extend(1.0).to_array(),
            params: [
                self.intensity,
                if self.show_cascades { 1.0 } else { 0.0 },
                0.0,
                0.0,
            ],
            counts: [self.cascade_count(), 0, 0, 0],
        }
    }

    /// (Re)create the buffer and both bind groups for the current cascade count.
    fn allocate<D: GpuDevice>(&mut self, table: &mut ResourceTable<D>) -> Result<(), ResourceError> {
        let count = self.cascade_count();
        let size = self.record_stride * (u64::from(count) + 1);
        table.create_resource(
            light::DIRECTIONAL_BUFFER,
            ResourceDesc::Buffer(BufferDesc {
                size,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            }),
        )?;
        table.create_resource(
            light::DIRECTIONAL_BIND_GROUP,
            ResourceDesc::BindGroup(BindGroupDesc {
                layout: light::DIRECTIONAL_LAYOUT.to_string(),
                entries: vec![BindGroupEntryDesc {
                    binding: 0,
                    resource: BindingResourceDesc::buffer(light::DIRECTIONAL_BUFFER),
                }],
            }),
        )?;
        table.create_resource(
            light::DIRECTIONAL_CASCADE_BIND_GROUP,
            ResourceDesc::BindGroup(BindGroupDesc {
                layout: light::DIRECTIONAL_CASCADE_LAYOUT.to_string(),
                entries: vec![BindGroupEntryDesc {
                    binding: 0,
                    resource: BindingResourceDesc::Buffer {
                        name: light::DIRECTIONAL_BUFFER.to_string(),
                        offset: 0,
                        size: wgpu::BufferSize::new(std::mem::size_of::<CascadeRecord>() as u64),
                    },
                }],
            }),
        )?;
        self.allocated = Some(count);
        debug!("Directional light buffer sized for {count} cascades");
        Ok(())
    }

    /// The bytes uploaded by one update.
    fn encode(&self) -> Vec<u8> {
        let stride = self.record_stride as usize;
        let mut bytes = vec![0u8; stride * (self.cascades.len() + 1)];
        let base = self.base_record();
        bytes[..std::mem::size_of::<DirectionalBaseRecord>()]
            .copy_from_slice(bytemuck::bytes_of(&base));
        for (i, cascade) in self.cascades.iter().enumerate() {
            let record = CascadeRecord::new(cascade, self.depth_bias, self.normal_bias);
            let start = stride * (i + 1);
            bytes[start..start + std::mem::size_of::<CascadeRecord>()]
                .copy_from_slice(bytemuck::bytes_of(&record));
        }
        bytes
    }
}

fn storage_layout(
    visibility: wgpu::ShaderStages,
    dynamic: bool,
    min_size: u64,
) -> ResourceDesc {
    ResourceDesc::BindGroupLayout(BindGroupLayoutDesc {
        entries: vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: dynamic,
                min_binding_size: wgpu::BufferSize::new(min_size),
            },
            count: None,
        }],
    })
}

impl GpuLight for DirectionalLight {
    fn name(&self) -> &str {
        "directional"
    }

    fn init<D: GpuDevice>(&mut self, table: &mut ResourceTable<D>) -> Result<(), ResourceError> {
        let alignment = u64::from(table.min_storage_buffer_offset_alignment()?);
        self.record_stride = DIRECTIONAL_RECORD_SIZE.div_ceil(alignment) * alignment;

        table.create_resource(
            light::DIRECTIONAL_LAYOUT,
            storage_layout(
                wgpu::ShaderStages::FRAGMENT,
                false,
                self.record_stride + std::mem::size_of::<CascadeRecord>() as u64,
            ),
        )?;
        table.create_resource(
            light::DIRECTIONAL_CASCADE_LAYOUT,
            storage_layout(
                wgpu::ShaderStages::VERTEX,
                true,
                std::mem::size_of::<CascadeRecord>() as u64,
            ),
        )?;
        self.allocate(table)
    }

    fn update<D: GpuDevice>(
        &mut self,
        table: &mut ResourceTable<D>,
        camera: &Camera,
    ) -> Result<(), ResourceError> {
        if self.allocated != Some(self.cascade_count()) {
            self.allocate(table)?;
        }
        let settings = CascadeSettings {
            count: self.cascade_count(),
            ..self.cascade
        };
        self.cascades = cascade::compute_cascades(camera, self.direction(), &settings);
        table.write_buffer(light::DIRECTIONAL_BUFFER, 0, &self.encode())
    }

    fn destroy<D: GpuDevice>(&mut self, table: &mut ResourceTable<D>) {
        table.delete_resource(light::DIRECTIONAL_CASCADE_BIND_GROUP);
        table.delete_resource(light::DIRECTIONAL_BIND_GROUP);
        table.delete_resource(light::DIRECTIONAL_BUFFER);
        table.delete_resource(light::DIRECTIONAL_CASCADE_LAYOUT);
        table.delete_resource(light::DIRECTIONAL_LAYOUT);
        self.allocated = None;
        self.cascades.clear();
    }
}

impl Inspectable for DirectionalLight {
    fn properties(&self) -> Vec<Property> {
        vec![
            Property::new("direction", "Direction", PropertyValue::Vec3(self.direction())),
            Property::new("color", "Color", PropertyValue::Color(self.color)),
            Property::new("intensity", "Intensity", PropertyValue::Float(self.intensity))
                .with_range(0.0, 100.0, 0.1),
            Property::new(
                "shadow.show_cascades",
                "Show cascades",
                PropertyValue::Bool(self.show_cascades),
            ),
            Property::new(
                "shadow.cascade_count",
                "Cascades",
                PropertyValue::Int(i64::from(self.cascade_count())),
            )
            .with_range(1.0, MAX_CASCADES as f32, 1.0),
            Property::new(
                "shadow.split_blend",
                "Split blend",
                PropertyValue::Float(self.cascade.split_blend),
            )
            .with_range(0.0, 1.0, 0.0001),
            Property::new(
                "shadow.depth_bias",
                "Depth bias",
                PropertyValue::Float(self.depth_bias),
            ),
            Property::new(
                "shadow.normal_bias",
                "Normal bias",
                PropertyValue::Float(self.normal_bias),
            ),
        ]
    }

    fn set_property(&mut self, path: &str, value: PropertyValue) -> Result<(), InspectError> {
        match path {
            "direction" => self.set_direction(inspect::expect_vec3(path, value)?),
            "color" => self.color = inspect::expect_vec3(path, value)?,
            "intensity" => self.intensity = inspect::expect_float_in(path, value, 0.0, 100.0)?,
            "shadow.show_cascades" => self.show_cascades = inspect::expect_bool(path, value)?,
            "shadow.cascade_count" => {
                self.cascade.count =
                    inspect::expect_int_in(path, value, 1, i64::from(MAX_CASCADES))? as u32;
            }
            "shadow.split_blend" => {
                self.cascade.split_blend = inspect::expect_float_in(path, value, 0.0, 1.0)?;
            }
            "shadow.depth_bias" => self.depth_bias = inspect::expect_float(path, value)?,
            "shadow.normal_bias" => self.normal_bias = inspect::expect_float(path, value)?,
            _ => return Err(InspectError::UnknownPath(path.to_string())),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;

    fn setup() -> (ResourceTable<HeadlessDevice>, DirectionalLight) {
        let mut table = ResourceTable::with_device(HeadlessDevice::new());
        let mut light = DirectionalLight::default();
        light.init(&mut table).unwrap();
        (table, light)
    }

    fn buffer_bytes(table: &ResourceTable<HeadlessDevice>) -> Vec<u8> {
        let handle = table.get_resource(light::DIRECTIONAL_BUFFER).unwrap();
        table.device().unwrap().buffer_contents(handle).unwrap()
    }

    #[test]
    fn test_direction_round_trips_through_orientation() {
        let light = DirectionalLight::new(Vec3::new(1.0, -2.0, 0.5));
        let expected = Vec3::new(1.0, -2.0, 0.5).normalize();
        assert!((light.direction() - expected).length() < 1e-5);
    }

    #[test]
    fn test_update_uploads_base_and_cascades_in_one_write() {
        let (mut table, mut light) = setup();
        let writes = table.device().unwrap().write_count();
        light.update(&mut table, &Camera::default()).unwrap();
        assert_eq!(table.device().unwrap().write_count(), writes + 1);

        let bytes = buffer_bytes(&table);
        assert_eq!(bytes.len(), 256 * 5);
        let base: DirectionalBaseRecord = bytemuck::pod_read_unaligned(&bytes[..64]);
        assert_eq!(base.counts[0], 4);
        assert_eq!(base.params[0], light.intensity);

        for i in 0..4u32 {
            let start = light.cascade_offset(i) as usize;
            let record: CascadeRecord = bytemuck::pod_read_unaligned(&bytes[start..start + 256]);
            let cascade = &light.cascades()[i as usize];
            assert_eq!(record.sphere[3], cascade.sphere.radius);
            let scale = 2f32.powi(i as i32);
            assert_eq!(record.bias[0], light.depth_bias * scale);
            assert_eq!(record.bias[1], light.normal_bias * scale);
        }
    }

    #[test]
    fn test_cascade_count_change_recreates_buffer_and_groups() {
        let (mut table, mut light) = setup();
        light.update(&mut table, &Camera::default()).unwrap();
        assert_eq!(table.version(light::DIRECTIONAL_BUFFER), Some(1));

        light
            .set_property("shadow.cascade_count", PropertyValue::Int(2))
            .unwrap();
        light.update(&mut table, &Camera::default()).unwrap();
        assert_eq!(table.version(light::DIRECTIONAL_BUFFER), Some(2));
        assert_eq!(table.version(light::DIRECTIONAL_BIND_GROUP), Some(2));
        assert_eq!(table.version(light::DIRECTIONAL_CASCADE_BIND_GROUP), Some(2));
        assert_eq!(buffer_bytes(&table).len(), 256 * 3);
        assert_eq!(light.cascades().len(), 2);
    }

    #[test]
    fn test_steady_state_update_does_not_recreate() {
        let (mut table, mut light) = setup();
        for _ in 0..3 {
            light.update(&mut table, &Camera::default()).unwrap();
        }
        assert_eq!(table.version(light::DIRECTIONAL_BUFFER), Some(1));
    }

    #[test]
    fn test_inspector_rejects_bad_cascade_count() {
        let mut light = DirectionalLight::default();
        assert!(matches!(
            light.set_property("shadow.cascade_count", PropertyValue::Int(0)),
            Err(InspectError::OutOfRange { .. })
        ));
        light
            .set_property("direction", PropertyValue::Vec3(Vec3::NEG_Y))
            .unwrap();
        assert!((light.direction() - Vec3::NEG_Y).length() < 1e-5);
    }

    #[test]
    fn test_destroy_releases_everything() {
        let (mut table, mut light) = setup();
        light.update(&mut table, &Camera::default()).unwrap();
        light.destroy(&mut table);
        assert!(table.is_empty());
        assert!(light.cascades().is_empty());
    }
}
