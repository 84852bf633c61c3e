//! Strongly typed creation parameters for every kind of GPU object.
//!
//! A [`ResourceDesc`] is retained by the resource table alongside the handle it
//! produced, so it can be inspected or replayed when the object is recreated.
//! Descriptors that depend on other objects (bind groups, pipeline layouts,
//! pipelines) reference them by resource name, never by handle.

use std::fmt;

/// The kind of GPU object a resource entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Buffer,
    Texture,
    Sampler,
    BindGroup,
    BindGroupLayout,
    PipelineLayout,
    RenderPipeline,
    ComputePipeline,
    ShaderModule,
}

impl ResourceKind {
    /// Every kind, in declaration order.
    pub const ALL: [ResourceKind; 9] = [
        ResourceKind::Buffer,
        ResourceKind::Texture,
        ResourceKind::Sampler,
        ResourceKind::BindGroup,
        ResourceKind::BindGroupLayout,
        ResourceKind::PipelineLayout,
        ResourceKind::RenderPipeline,
        ResourceKind::ComputePipeline,
        ResourceKind::ShaderModule,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Buffer => "buffer",
            ResourceKind::Texture => "texture",
            ResourceKind::Sampler => "sampler",
            ResourceKind::BindGroup => "bind group",
            ResourceKind::BindGroupLayout => "bind group layout",
            ResourceKind::PipelineLayout => "pipeline layout",
            ResourceKind::RenderPipeline => "render pipeline",
            ResourceKind::ComputePipeline => "compute pipeline",
            ResourceKind::ShaderModule => "shader module",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BufferDesc {
    pub size: u64,
    pub usage: wgpu::BufferUsages,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub size: wgpu::Extent3d,
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
    pub dimension: wgpu::TextureDimension,
    pub mip_level_count: u32,
    pub sample_count: u32,
}

impl TextureDesc {
    /// Single-layer 2D texture without mips.
    pub fn d2(
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Self {
        Self::d2_array(width, height, 1, format, usage)
    }

    /// Layered 2D texture; each layer is addressed through its own view.
    pub fn d2_array(
        width: u32,
        height: u32,
        layers: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Self {
        Self {
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: layers,
            },
            format,
            usage,
            dimension: wgpu::TextureDimension::D2,
            mip_level_count: 1,
            sample_count: 1,
        }
    }

    /// View dimension used for the default view of this texture.
    pub fn default_view_dimension(&self) -> wgpu::TextureViewDimension {
        match self.dimension {
            wgpu::TextureDimension::D1 => wgpu::TextureViewDimension::D1,
            wgpu::TextureDimension::D3 => wgpu::TextureViewDimension::D3,
            wgpu::TextureDimension::D2 if self.size.depth_or_array_layers > 1 => {
                wgpu::TextureViewDimension::D2Array
            }
            wgpu::TextureDimension::D2 => wgpu::TextureViewDimension::D2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplerDesc {
    pub address_mode: wgpu::AddressMode,
    pub mag_filter: wgpu::FilterMode,
    pub min_filter: wgpu::FilterMode,
    pub mipmap_filter: wgpu::MipmapFilterMode,
    /// Set for depth-comparison samplers.
    pub compare: Option<wgpu::CompareFunction>,
}

impl SamplerDesc {
    pub fn nearest_clamp() -> Self {
        Self {
            address_mode: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            compare: None,
        }
    }

    pub fn linear_clamp() -> Self {
        Self {
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Self::nearest_clamp()
        }
    }

    pub fn comparison(compare: wgpu::CompareFunction) -> Self {
        Self {
            compare: Some(compare),
            ..Self::linear_clamp()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BindGroupLayoutDesc {
    pub entries: Vec<wgpu::BindGroupLayoutEntry>,
}

/// What a bind group entry points at, by resource name.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingResourceDesc {
    Buffer {
        name: String,
        offset: u64,
        /// `None` binds the rest of the buffer.
        size: Option<wgpu::BufferSize>,
    },
    TextureView {
        name: String,
        /// `None` uses the texture's default view.
        dimension: Option<wgpu::TextureViewDimension>,
        aspect: wgpu::TextureAspect,
    },
    Sampler {
        name: String,
    },
}

impl BindingResourceDesc {
    pub fn buffer(name: impl Into<String>) -> Self {
        BindingResourceDesc::Buffer {
            name: name.into(),
            offset: 0,
            size: None,
        }
    }

    pub fn texture(name: impl Into<String>) -> Self {
        BindingResourceDesc::TextureView {
            name: name.into(),
            dimension: None,
            aspect: wgpu::TextureAspect::All,
        }
    }

    pub fn sampler(name: impl Into<String>) -> Self {
        BindingResourceDesc::Sampler { name: name.into() }
    }

    pub fn name(&self) -> &str {
        match self {
            BindingResourceDesc::Buffer { name, .. }
            | BindingResourceDesc::TextureView { name, .. }
            | BindingResourceDesc::Sampler { name } => name,
        }
    }

    fn expected_kind(&self) -> ResourceKind {
        match self {
            BindingResourceDesc::Buffer { .. } => ResourceKind::Buffer,
            BindingResourceDesc::TextureView { .. } => ResourceKind::Texture,
            BindingResourceDesc::Sampler { .. } => ResourceKind::Sampler,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BindGroupEntryDesc {
    pub binding: u32,
    pub resource: BindingResourceDesc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BindGroupDesc {
    pub layout: String,
    pub entries: Vec<BindGroupEntryDesc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineLayoutDesc {
    pub bind_group_layouts: Vec<String>,
}

/// Owned counterpart of [`wgpu::VertexBufferLayout`].
#[derive(Debug, Clone, PartialEq)]
pub struct VertexLayoutDesc {
    pub array_stride: wgpu::BufferAddress,
    pub step_mode: wgpu::VertexStepMode,
    pub attributes: Vec<wgpu::VertexAttribute>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FragmentDesc {
    pub shader: String,
    pub entry_point: String,
    pub targets: Vec<Option<wgpu::ColorTargetState>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderPipelineDesc {
    pub layout: String,
    pub vertex_shader: String,
    pub vertex_entry_point: String,
    pub vertex_buffers: Vec<VertexLayoutDesc>,
    /// `None` for depth-only pipelines.
    pub fragment: Option<FragmentDesc>,
    pub primitive: wgpu::PrimitiveState,
    pub depth_stencil: Option<wgpu::DepthStencilState>,
    pub multisample: wgpu::MultisampleState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComputePipelineDesc {
    pub layout: String,
    pub shader: String,
    pub entry_point: String,
}

/// Fully resolved WGSL source.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderModuleDesc {
    pub source: String,
}

/// Creation parameters tagged by resource kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceDesc {
    Buffer(BufferDesc),
    Texture(TextureDesc),
    Sampler(SamplerDesc),
    BindGroupLayout(BindGroupLayoutDesc),
    BindGroup(BindGroupDesc),
    PipelineLayout(PipelineLayoutDesc),
    RenderPipeline(RenderPipelineDesc),
    ComputePipeline(ComputePipelineDesc),
    ShaderModule(ShaderModuleDesc),
}

impl ResourceDesc {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceDesc::Buffer(_) => ResourceKind::Buffer,
            ResourceDesc::Texture(_) => ResourceKind::Texture,
            ResourceDesc::Sampler(_) => ResourceKind::Sampler,
            ResourceDesc::BindGroupLayout(_) => ResourceKind::BindGroupLayout,
            ResourceDesc::BindGroup(_) => ResourceKind::BindGroup,
            ResourceDesc::PipelineLayout(_) => ResourceKind::PipelineLayout,
            ResourceDesc::RenderPipeline(_) => ResourceKind::RenderPipeline,
            ResourceDesc::ComputePipeline(_) => ResourceKind::ComputePipeline,
            ResourceDesc::ShaderModule(_) => ResourceKind::ShaderModule,
        }
    }

    /// Named resources this descriptor refers to, with the kind each must have.
    pub fn dependencies(&self) -> Vec<(&str, ResourceKind)> {
        match self {
            ResourceDesc::Buffer(_)
            | ResourceDesc::Texture(_)
            | ResourceDesc::Sampler(_)
            | ResourceDesc::BindGroupLayout(_)
            | ResourceDesc::ShaderModule(_) => Vec::new(),
            ResourceDesc::BindGroup(desc) => {
                let mut deps = vec![(desc.layout.as_str(), ResourceKind::BindGroupLayout)];
                deps.extend(
                    desc.entries
                        .iter()
                        .map(|e| (e.resource.name(), e.resource.expected_kind())),
                );
                deps
            }
            ResourceDesc::PipelineLayout(desc) => desc
                .bind_group_layouts
                .iter()
                .map(|name| (name.as_str(), ResourceKind::BindGroupLayout))
                .collect(),
            ResourceDesc::RenderPipeline(desc) => {
                let mut deps = vec![
                    (desc.layout.as_str(), ResourceKind::PipelineLayout),
                    (desc.vertex_shader.as_str(), ResourceKind::ShaderModule),
                ];
                if let Some(fragment) = &desc.fragment {
                    deps.push((fragment.shader.as_str(), ResourceKind::ShaderModule));
                }
                deps
            }
            ResourceDesc::ComputePipeline(desc) => vec![
                (desc.layout.as_str(), ResourceKind::PipelineLayout),
                (desc.shader.as_str(), ResourceKind::ShaderModule),
            ],
        }
    }

    /// Checks the parameters a device would reject outright.
    ///
    /// Returns a human-readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            ResourceDesc::Buffer(desc) => {
                if desc.size % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
                    return Err(format!(
                        "buffer size {} is not a multiple of {}",
                        desc.size,
                        wgpu::COPY_BUFFER_ALIGNMENT
                    ));
                }
                Ok(())
            }
            ResourceDesc::Texture(desc) => {
                let wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers,
                } = desc.size;
                if width == 0 || height == 0 || depth_or_array_layers == 0 {
                    return Err(format!(
                        "texture extent {width}x{height}x{depth_or_array_layers} has a zero dimension"
                    ));
                }
                if desc.mip_level_count == 0 || desc.sample_count == 0 {
                    return Err("mip level and sample counts must be at least 1".to_string());
                }
                Ok(())
            }
            ResourceDesc::ShaderModule(desc) if desc.source.trim().is_empty() => {
                Err("shader source is empty".to_string())
            }
            _ => Ok(()),
        }
    }

    /// Byte size for buffers, `None` for everything else.
    pub fn buffer_size(&self) -> Option<u64> {
        match self {
            ResourceDesc::Buffer(desc) => Some(desc.size),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        let desc = ResourceDesc::Buffer(BufferDesc {
            size: 16,
            usage: wgpu::BufferUsages::UNIFORM,
        });
        assert_eq!(desc.kind(), ResourceKind::Buffer);
        let desc = ResourceDesc::Sampler(SamplerDesc::nearest_clamp());
        assert_eq!(desc.kind(), ResourceKind::Sampler);
    }

    #[test]
    fn test_bind_group_dependencies_include_layout_and_entries() {
        let desc = ResourceDesc::BindGroup(BindGroupDesc {
            layout: "layout".into(),
            entries: vec![
                BindGroupEntryDesc {
                    binding: 0,
                    resource: BindingResourceDesc::buffer("buf"),
                },
                BindGroupEntryDesc {
                    binding: 1,
                    resource: BindingResourceDesc::texture("tex"),
                },
                BindGroupEntryDesc {
                    binding: 2,
                    resource: BindingResourceDesc::sampler("smp"),
                },
            ],
        });
        assert_eq!(
            desc.dependencies(),
            vec![
                ("layout", ResourceKind::BindGroupLayout),
                ("buf", ResourceKind::Buffer),
                ("tex", ResourceKind::Texture),
                ("smp", ResourceKind::Sampler),
            ]
        );
    }

    #[test]
    fn test_depth_only_pipeline_has_no_fragment_dependency() {
        let desc = ResourceDesc::RenderPipeline(RenderPipelineDesc {
            layout: "layout".into(),
            vertex_shader: "shader".into(),
            vertex_entry_point: "vs_main".into(),
            vertex_buffers: Vec::new(),
            fragment: None,
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
        });
        assert_eq!(desc.dependencies().len(), 2);
    }

    #[test]
    fn test_zero_sized_texture_is_rejected() {
        let desc = ResourceDesc::Texture(TextureDesc::d2(
            0,
            720,
            wgpu::TextureFormat::Rgba8Unorm,
            wgpu::TextureUsages::TEXTURE_BINDING,
        ));
        assert!(desc.validate().is_err());
    }

    #[test]
    fn test_unaligned_buffer_is_rejected() {
        let desc = ResourceDesc::Buffer(BufferDesc {
            size: 6,
            usage: wgpu::BufferUsages::INDEX,
        });
        assert!(desc.validate().is_err());
    }

    #[test]
    fn test_array_texture_defaults_to_array_view() {
        let desc = TextureDesc::d2_array(
            1024,
            1024,
            4,
            wgpu::TextureFormat::Depth32Float,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
        );
        assert_eq!(
            desc.default_view_dimension(),
            wgpu::TextureViewDimension::D2Array
        );
        let single = TextureDesc::d2(
            8,
            8,
            wgpu::TextureFormat::Rgba8Unorm,
            wgpu::TextureUsages::TEXTURE_BINDING,
        );
        assert_eq!(
            single.default_view_dimension(),
            wgpu::TextureViewDimension::D2
        );
    }
}
