use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use super::GpuLight;
use crate::camera::Camera;
use crate::device::GpuDevice;
use crate::inspect::{self, InspectError, Inspectable, Property, PropertyValue};
use crate::names::light;
use crate::resource::{BufferDesc, ResourceDesc, ResourceError, ResourceTable};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct AmbientRecord {
    pub color: [f32; 4],
    pub intensity: f32,
    pub _pad: [f32; 3],
}

static_assertions::assert_eq_size!(AmbientRecord, [u8; 32]);

/// Uniform light applied to every surface.
#[derive(Debug, Clone)]
pub struct AmbientLight {
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for AmbientLight {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            intensity: 0.1,
        }
    }
}

impl AmbientLight {
    pub fn record(&self) -> AmbientRecord {
        AmbientRecord {
            color: self.color.extend(1.0).to_array(),
            intensity: self.intensity,
            _pad: [0.0; 3],
        }
    }
}

impl GpuLight for AmbientLight {
    fn name(&self) -> &str {
        "ambient"
    }

    fn init<D: GpuDevice>(&mut self, table: &mut ResourceTable<D>) -> Result<(), ResourceError> {
        table.create_resource(
            light::AMBIENT_BUFFER,
            ResourceDesc::Buffer(BufferDesc {
                size: std::mem::size_of::<AmbientRecord>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            }),
        )?;
        Ok(())
    }

    fn update<D: GpuDevice>(
        &mut self,
        table: &mut ResourceTable<D>,
        _camera: &Camera,
    ) -> Result<(), ResourceError> {
        table.write_buffer(light::AMBIENT_BUFFER, 0, bytemuck::bytes_of(&self.record()))
    }

    fn destroy<D: GpuDevice>(&mut self, table: &mut ResourceTable<D>) {
        table.delete_resource(light::AMBIENT_BUFFER);
    }
}

impl Inspectable for AmbientLight {
    fn properties(&self) -> Vec<Property> {
        vec![
            Property::new("color", "Color", PropertyValue::Color(self.color)),
            Property::new("intensity", "Intensity", PropertyValue::Float(self.intensity))
                .with_range(0.0, 10.0, 0.01),
        ]
    }

    fn set_property(&mut self, path: &str, value: PropertyValue) -> Result<(), InspectError> {
        match path {
            "color" => self.color = inspect::expect_vec3(path, value)?,
            "intensity" => self.intensity = inspect::expect_float_in(path, value, 0.0, 10.0)?,
            _ => return Err(InspectError::UnknownPath(path.to_string())),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;

    #[test]
    fn test_update_writes_color_and_intensity() {
        let mut table = ResourceTable::with_device(HeadlessDevice::new());
        let mut ambient = AmbientLight {
            color: Vec3::new(0.2, 0.4, 0.6),
            intensity: 0.5,
        };
        ambient.init(&mut table).unwrap();
        ambient.update(&mut table, &Camera::default()).unwrap();

        let handle = table.get_resource(light::AMBIENT_BUFFER).unwrap();
        let bytes = table.device().unwrap().buffer_contents(handle).unwrap();
        let record: AmbientRecord = bytemuck::pod_read_unaligned(&bytes);
        assert_eq!(record, ambient.record());
        assert_eq!(record.intensity, 0.5);
    }

    #[test]
    fn test_inspector_edits_intensity() {
        let mut ambient = AmbientLight::default();
        ambient
            .set_property("intensity", PropertyValue::Float(2.0))
            .unwrap();
        assert_eq!(
            inspect::get_property(&ambient, "intensity"),
            Some(PropertyValue::Float(2.0))
        );
        assert!(ambient
            .set_property("intensity", PropertyValue::Float(-1.0))
            .is_err());
        assert!(matches!(
            ambient.set_property("radius", PropertyValue::Float(1.0)),
            Err(InspectError::UnknownPath(_))
        ));
    }
}
