//! The seam between the resource table and the graphics API.
//!
//! [`GpuDevice`] is implemented by [`crate::gpu::WgpuDevice`] for real rendering
//! and by [`crate::headless::HeadlessDevice`] for running the table, the GPU scene
//! and the pass framework without an adapter.

use crate::resource::{ResourceDesc, ResourceError, Resolver};

/// Object-creation and submission surface of a graphics device.
///
/// Implementations only build and destroy objects; name bookkeeping, versions
/// and statistics live in [`crate::resource::ResourceTable`].
pub trait GpuDevice {
    /// Opaque handle to one GPU object of any kind.
    type Handle;
    /// Command recorder for one frame.
    type Encoder;

    /// Build the object described by `desc`.
    ///
    /// Named dependencies (layouts, shader modules, bound resources) have been
    /// checked for existence and kind before this is called and are looked up
    /// through `deps`.
    fn create_resource(
        &self,
        name: &str,
        desc: &ResourceDesc,
        deps: &Resolver<'_, Self::Handle>,
    ) -> Result<Self::Handle, ResourceError>;

    /// Release the object. The handle is never used again.
    fn destroy_resource(&self, handle: Self::Handle);

    /// Queue a write of `data` into a buffer at `offset`.
    fn write_buffer(
        &self,
        buffer: &Self::Handle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), ResourceError>;

    fn create_encoder(&self, label: &str) -> Self::Encoder;

    /// Finish the encoder and hand it to the queue.
    fn submit(&self, encoder: Self::Encoder);

    /// Required alignment of dynamic storage-buffer offsets, in bytes.
    fn min_storage_buffer_offset_alignment(&self) -> u32;
}
