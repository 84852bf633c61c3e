//! Light data blocks.
//!
//! Each light owns its buffers in the resource table and rewrites its whole
//! GPU record every frame.

mod ambient;
pub mod cascade;
mod directional;

pub use ambient::{AmbientLight, AmbientRecord};
pub use cascade::{BoundingSphere, Cascade, CascadeSettings};
pub use directional::{
    CascadeRecord, DirectionalBaseRecord, DirectionalLight, DIRECTIONAL_RECORD_SIZE, MAX_CASCADES,
};

use crate::camera::Camera;
use crate::device::GpuDevice;
use crate::resource::{ResourceError, ResourceTable};

/// GPU lifecycle shared by every light type.
pub trait GpuLight {
    fn name(&self) -> &str;

    /// Create the light's buffers and bind groups.
    fn init<D: GpuDevice>(&mut self, table: &mut ResourceTable<D>) -> Result<(), ResourceError>;

    /// Recompute the record from current state and upload it.
    fn update<D: GpuDevice>(
        &mut self,
        table: &mut ResourceTable<D>,
        camera: &Camera,
    ) -> Result<(), ResourceError>;

    fn destroy<D: GpuDevice>(&mut self, table: &mut ResourceTable<D>);
}
