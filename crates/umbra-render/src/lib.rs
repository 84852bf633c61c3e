//! Deferred renderer core: resource table, GPU scene, cascaded shadows and a
//! fixed pipeline of depth, GBuffer, shadow and lighting passes.

pub mod camera;
pub mod device;
pub mod gpu;
pub mod headless;
pub mod inspect;
pub mod light;
pub mod names;
pub mod pass;
pub mod passes;
pub mod renderer;
pub mod resource;
pub mod scene;
pub mod shader;

pub use camera::{Camera, Projection};
pub use device::GpuDevice;
pub use gpu::{
    DeviceError, GpuHandle, SurfaceContext, SurfaceError, WgpuDevice, init_surface_blocking,
    request_headless_device_blocking,
};
pub use headless::{HeadlessDevice, HeadlessEncoder, HeadlessHandle};
pub use inspect::{InspectError, Inspectable, Property, PropertyOptions, PropertyValue};
pub use light::{AmbientLight, CascadeSettings, DirectionalLight, GpuLight};
pub use pass::{
    FrameContext, PassDescriptor, PassError, PassNode, PassOutcome, PassState, RenderPass,
    SetupContext, Viewport, validate_passes,
};
pub use renderer::{DeferredRenderer, FrameReport, RenderError};
pub use resource::{ResourceDesc, ResourceError, ResourceKind, ResourceTable};
pub use scene::{GpuScene, MaterialBlock, MeshData, SceneError};
pub use shader::{ShaderError, ShaderLibrary, ShaderSource};
