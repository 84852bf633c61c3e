//! Name-keyed ownership of every GPU object the renderer creates.

pub mod desc;
mod error;
mod table;

pub use desc::{
    BindGroupDesc, BindGroupEntryDesc, BindGroupLayoutDesc, BindingResourceDesc, BufferDesc,
    ComputePipelineDesc, FragmentDesc, PipelineLayoutDesc, RenderPipelineDesc, ResourceDesc,
    ResourceKind, SamplerDesc, ShaderModuleDesc, TextureDesc, VertexLayoutDesc,
};
pub use error::ResourceError;
pub use table::{KindStats, Resolver, ResourceEntry, ResourceStats, ResourceTable};
