//! Well-known resource table names shared between the scene, lights and passes.

/// Scene-wide resources owned by the GPU scene.
pub mod scene {
    pub const FRAME_BUFFER: &str = "Scene/FrameBuffer";
    pub const FRAME_BIND_GROUP_LAYOUT: &str = "Scene/FrameBindGroupLayout";
    pub const FRAME_BIND_GROUP: &str = "Scene/FrameBindGroup";
    pub const INSTANCE_BUFFER: &str = "Scene/InstanceBuffer";
    pub const INSTANCE_BIND_GROUP_LAYOUT: &str = "Scene/InstanceBindGroupLayout";
    pub const INSTANCE_BIND_GROUP: &str = "Scene/InstanceBindGroup";

    /// Vertex buffer name for a mesh id.
    pub fn mesh_vertices(id: &str) -> String {
        format!("Mesh/{id}/Vertices")
    }

    /// Index buffer name for a mesh id.
    pub fn mesh_indices(id: &str) -> String {
        format!("Mesh/{id}/Indices")
    }
}

pub mod light {
    pub const AMBIENT_BUFFER: &str = "Light/AmbientBuffer";
    pub const DIRECTIONAL_BUFFER: &str = "Light/DirectionalBuffer";
    /// Whole cascade array, read by the lighting pass.
    pub const DIRECTIONAL_LAYOUT: &str = "Light/DirectionalLayout";
    pub const DIRECTIONAL_BIND_GROUP: &str = "Light/DirectionalBindGroup";
    /// One cascade at a time through a dynamic offset, read by the shadow pass.
    pub const DIRECTIONAL_CASCADE_LAYOUT: &str = "Light/DirectionalCascadeLayout";
    pub const DIRECTIONAL_CASCADE_BIND_GROUP: &str = "Light/DirectionalCascadeBindGroup";
}

pub mod prepass {
    pub const DEPTH: &str = "PrePass/Depth";
    pub const SHADER: &str = "PrePass/Shader";
    pub const PIPELINE_LAYOUT: &str = "PrePass/PipelineLayout";
    pub const PIPELINE: &str = "PrePass/Pipeline";
}

pub mod gbuffer {
    /// World-space normal.
    pub const A: &str = "GBuffer/A";
    /// Specular, roughness, metallic.
    pub const B: &str = "GBuffer/B";
    /// Base color.
    pub const C: &str = "GBuffer/C";
    /// Emissive and occlusion.
    pub const D: &str = "GBuffer/D";
    pub const SHADER: &str = "GBuffer/Shader";
    pub const PIPELINE_LAYOUT: &str = "GBuffer/PipelineLayout";
    pub const PIPELINE: &str = "GBuffer/Pipeline";
}

pub mod shadow {
    pub const CASCADE_MAP: &str = "Shadow/CascadeMap";
    pub const SHADER: &str = "Shadow/Shader";
    pub const PIPELINE_LAYOUT: &str = "Shadow/PipelineLayout";
    pub const PIPELINE: &str = "Shadow/Pipeline";
}

pub mod lighting {
    pub const OUTPUT: &str = "Lighting/Output";
    pub const SHADER: &str = "Lighting/Shader";
    pub const INPUT_LAYOUT: &str = "Lighting/InputLayout";
    pub const INPUT_BIND_GROUP: &str = "Lighting/InputBindGroup";
    pub const SHADOW_SAMPLER: &str = "Lighting/ShadowSampler";
    pub const PIPELINE_LAYOUT: &str = "Lighting/PipelineLayout";
    pub const PIPELINE: &str = "Lighting/Pipeline";
}

/// Fallback objects for bind-group slots that have no real data yet.
pub mod placeholder {
    pub const TEXTURE: &str = "Placeholder/Texture";
    pub const UNIFORM_BUFFER: &str = "Placeholder/UniformBuffer";
    pub const STORAGE_BUFFER: &str = "Placeholder/StorageBuffer";
    pub const SAMPLER: &str = "Placeholder/Sampler";
}
