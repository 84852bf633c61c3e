//! GPU-side scene state: camera uniform, per-instance records, meshes, lights.

mod frame;
mod instance;
mod mesh;

pub use frame::{FrameUniform, FrameUniformBlock};
pub use instance::{
    InstanceAllocator, InstanceError, InstanceRecord, MaterialBlock, GROWTH_GRANULARITY,
};
pub use mesh::{GpuMesh, IndexData, MeshData, MeshError, StaticVertex};

use glam::Mat4;
use log::{debug, info};
use rustc_hash::FxHashMap;

use crate::camera::Camera;
use crate::device::GpuDevice;
use crate::light::{AmbientLight, DirectionalLight, GpuLight};
use crate::resource::{ResourceError, ResourceTable};

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    /// A mesh with this id is already in the scene.
    #[error("mesh '{0}' already exists")]
    DuplicateMesh(String),

    /// No mesh with this id is in the scene.
    #[error("mesh '{0}' not found")]
    UnknownMesh(String),

    /// The instance allocator rejected the operation.
    #[error(transparent)]
    Instance(#[from] InstanceError),

    /// A mesh buffer could not be created or written.
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

#[derive(Debug)]
struct SceneObject {
    mesh: GpuMesh,
    transform: Mat4,
    material: MaterialBlock,
}

impl SceneObject {
    fn record(&self) -> InstanceRecord {
        InstanceRecord::new(self.transform, self.material)
    }
}

/// One mesh to draw, with the dynamic offset of its instance record.
#[derive(Debug, Clone, Copy)]
pub struct DrawItem<'a> {
    pub mesh: &'a GpuMesh,
    pub instance_offset: u32,
}

/// Everything the passes read from the scene each frame.
pub struct GpuScene {
    pub camera: Camera,
    pub ambient: AmbientLight,
    /// Shown wherever no geometry was drawn.
    pub clear_color: wgpu::Color,
    directional: Option<DirectionalLight>,
    frame: FrameUniformBlock,
    instances: InstanceAllocator,
    objects: FxHashMap<String, SceneObject>,
    initialized: bool,
}

impl GpuScene {
    pub fn new(camera: Camera, instance_growth: u32) -> Self {
        Self {
            camera,
            ambient: AmbientLight::default(),
            clear_color: wgpu::Color::BLACK,
            directional: Some(DirectionalLight::default()),
            frame: FrameUniformBlock::new(),
            instances: InstanceAllocator::new(instance_growth),
            objects: FxHashMap::default(),
            initialized: false,
        }
    }

    /// Create the scene-wide buffers and light resources.
    pub fn init<D: GpuDevice>(&mut self, table: &mut ResourceTable<D>) -> Result<(), SceneError> {
        self.frame.init(table)?;
        self.instances.init(table)?;
        self.ambient.init(table)?;
        if let Some(light) = &mut self.directional {
            light.init(table)?;
        }
        self.initialized = true;
        info!("GPU scene initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Upload `data` and give it an instance slot.
    pub fn add_mesh<D: GpuDevice>(
        &mut self,
        table: &mut ResourceTable<D>,
        id: &str,
        data: &MeshData,
        transform: Mat4,
        material: MaterialBlock,
    ) -> Result<(), SceneError> {
        if self.objects.contains_key(id) {
            return Err(SceneError::DuplicateMesh(id.to_string()));
        }
        let mesh = GpuMesh::upload(table, id, data)?;
        if let Err(err) = self.instances.allocate_slot(table, id) {
            mesh.destroy(table);
            return Err(err.into());
        }
        let object = SceneObject {
            mesh,
            transform,
            material,
        };
        self.instances.stage_record(id, &object.record())?;
        self.objects.insert(id.to_string(), object);
        debug!("Added mesh '{id}'");
        Ok(())
    }

    /// Delete the mesh buffers and free the instance slot.
    ///
    /// The instance that held the last slot moves into the freed one.
    pub fn remove_mesh<D: GpuDevice>(
        &mut self,
        table: &mut ResourceTable<D>,
        id: &str,
    ) -> Result<(), SceneError> {
        let object = self
            .objects
            .remove(id)
            .ok_or_else(|| SceneError::UnknownMesh(id.to_string()))?;
        let released = self.instances.release_slot(table, id);
        object.mesh.destroy(table);
        released?;
        debug!("Removed mesh '{id}'");
        Ok(())
    }

    pub fn set_transform(&mut self, id: &str, transform: Mat4) -> Result<(), SceneError> {
        let object = self
            .objects
            .get_mut(id)
            .ok_or_else(|| SceneError::UnknownMesh(id.to_string()))?;
        object.transform = transform;
        self.instances.stage_record(id, &object.record())?;
        Ok(())
    }

    pub fn set_material(&mut self, id: &str, material: MaterialBlock) -> Result<(), SceneError> {
        let object = self
            .objects
            .get_mut(id)
            .ok_or_else(|| SceneError::UnknownMesh(id.to_string()))?;
        object.material = material;
        self.instances.stage_record(id, &object.record())?;
        Ok(())
    }

    /// Per-frame refresh: camera uniform, one batched instance upload, lights.
    pub fn update<D: GpuDevice>(
        &mut self,
        table: &mut ResourceTable<D>,
        delta: f32,
    ) -> Result<(), SceneError> {
        self.frame.update_camera(table, &self.camera, delta)?;
        self.instances.flush(table)?;
        self.ambient.update(table, &self.camera)?;
        if let Some(light) = &mut self.directional {
            light.update(table, &self.camera)?;
        }
        Ok(())
    }

    /// Replace the directional light, moving its resources over if the scene is live.
    pub fn set_directional_light<D: GpuDevice>(
        &mut self,
        table: &mut ResourceTable<D>,
        light: Option<DirectionalLight>,
    ) -> Result<(), SceneError> {
        if let Some(old) = &mut self.directional {
            if self.initialized {
                old.destroy(table);
            }
        }
        self.directional = light;
        if self.initialized {
            if let Some(light) = &mut self.directional {
                light.init(table)?;
            }
        }
        Ok(())
    }

    pub fn directional_light(&self) -> Option<&DirectionalLight> {
        self.directional.as_ref()
    }

    pub fn directional_light_mut(&mut self) -> Option<&mut DirectionalLight> {
        self.directional.as_mut()
    }

    /// Meshes in instance-slot order with their current dynamic offsets.
    pub fn draw_items(&self) -> impl Iterator<Item = DrawItem<'_>> + '_ {
        self.instances.ids().iter().filter_map(|id| {
            Some(DrawItem {
                mesh: &self.objects.get(id)?.mesh,
                instance_offset: self.instances.dynamic_offset(id)?,
            })
        })
    }

    pub fn mesh_count(&self) -> usize {
        self.objects.len()
    }

    pub fn instances(&self) -> &InstanceAllocator {
        &self.instances
    }

    pub fn frame(&self) -> &FrameUniformBlock {
        &self.frame
    }

    pub fn destroy<D: GpuDevice>(&mut self, table: &mut ResourceTable<D>) {
        for object in self.objects.values() {
            object.mesh.destroy(table);
        }
        self.objects.clear();
        self.instances.destroy(table);
        self.frame.destroy(table);
        self.ambient.destroy(table);
        if let Some(light) = &mut self.directional {
            light.destroy(table);
        }
        self.initialized = false;
    }
}
