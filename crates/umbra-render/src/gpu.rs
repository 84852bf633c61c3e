//! wgpu device acquisition, the wgpu implementation of [`GpuDevice`], and
//! presentation-surface management.

use std::sync::Arc;

use winit::window::Window;

use crate::device::GpuDevice;
use crate::resource::{
    BindingResourceDesc, ResourceDesc, ResourceError, ResourceKind, ResourceTable, Resolver,
};

/// Errors raised while acquiring an adapter, a device or a surface.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// No compatible GPU adapter found.
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    /// Failed to request GPU device.
    #[error("failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    /// Failed to create surface.
    #[error("failed to create surface: {0}")]
    SurfaceCreation(#[from] wgpu::CreateSurfaceError),
}

/// Error type for surface acquisition failures.
#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    /// Surface was lost and could not be recovered.
    #[error("surface lost")]
    Lost,

    /// GPU ran out of memory.
    #[error("out of memory")]
    OutOfMemory,

    /// Operation timed out (recoverable - skip frame).
    #[error("timeout")]
    Timeout,
}

/// A wgpu object owned by the resource table.
#[derive(Debug)]
pub enum GpuHandle {
    Buffer(wgpu::Buffer),
    /// Textures carry their default view.
    Texture {
        texture: wgpu::Texture,
        view: wgpu::TextureView,
    },
    Sampler(wgpu::Sampler),
    BindGroupLayout(wgpu::BindGroupLayout),
    BindGroup(wgpu::BindGroup),
    PipelineLayout(wgpu::PipelineLayout),
    RenderPipeline(wgpu::RenderPipeline),
    ComputePipeline(wgpu::ComputePipeline),
    ShaderModule(wgpu::ShaderModule),
}

impl GpuHandle {
    pub fn kind(&self) -> ResourceKind {
        match self {
            GpuHandle::Buffer(_) => ResourceKind::Buffer,
            GpuHandle::Texture { .. } => ResourceKind::Texture,
            GpuHandle::Sampler(_) => ResourceKind::Sampler,
            GpuHandle::BindGroupLayout(_) => ResourceKind::BindGroupLayout,
            GpuHandle::BindGroup(_) => ResourceKind::BindGroup,
            GpuHandle::PipelineLayout(_) => ResourceKind::PipelineLayout,
            GpuHandle::RenderPipeline(_) => ResourceKind::RenderPipeline,
            GpuHandle::ComputePipeline(_) => ResourceKind::ComputePipeline,
            GpuHandle::ShaderModule(_) => ResourceKind::ShaderModule,
        }
    }

    pub fn as_buffer(&self) -> Option<&wgpu::Buffer> {
        match self {
            GpuHandle::Buffer(buffer) => Some(buffer),
            _ => None,
        }
    }

    pub fn as_texture(&self) -> Option<&wgpu::Texture> {
        match self {
            GpuHandle::Texture { texture, .. } => Some(texture),
            _ => None,
        }
    }

    pub fn as_texture_view(&self) -> Option<&wgpu::TextureView> {
        match self {
            GpuHandle::Texture { view, .. } => Some(view),
            _ => None,
        }
    }

    pub fn as_sampler(&self) -> Option<&wgpu::Sampler> {
        match self {
            GpuHandle::Sampler(sampler) => Some(sampler),
            _ => None,
        }
    }

    pub fn as_bind_group_layout(&self) -> Option<&wgpu::BindGroupLayout> {
        match self {
            GpuHandle::BindGroupLayout(layout) => Some(layout),
            _ => None,
        }
    }

    pub fn as_bind_group(&self) -> Option<&wgpu::BindGroup> {
        match self {
            GpuHandle::BindGroup(group) => Some(group),
            _ => None,
        }
    }

    pub fn as_pipeline_layout(&self) -> Option<&wgpu::PipelineLayout> {
        match self {
            GpuHandle::PipelineLayout(layout) => Some(layout),
            _ => None,
        }
    }

    pub fn as_render_pipeline(&self) -> Option<&wgpu::RenderPipeline> {
        match self {
            GpuHandle::RenderPipeline(pipeline) => Some(pipeline),
            _ => None,
        }
    }

    pub fn as_compute_pipeline(&self) -> Option<&wgpu::ComputePipeline> {
        match self {
            GpuHandle::ComputePipeline(pipeline) => Some(pipeline),
            _ => None,
        }
    }

    pub fn as_shader_module(&self) -> Option<&wgpu::ShaderModule> {
        match self {
            GpuHandle::ShaderModule(module) => Some(module),
            _ => None,
        }
    }
}

fn expect_kind<'a, T>(
    name: &str,
    handle: &'a GpuHandle,
    expected: ResourceKind,
    pick: impl FnOnce(&'a GpuHandle) -> Option<&'a T>,
) -> Result<&'a T, ResourceError> {
    pick(handle).ok_or_else(|| ResourceError::KindMismatch {
        name: name.to_string(),
        expected,
        found: handle.kind(),
    })
}

/// wgpu device and queue behind the [`GpuDevice`] seam.
pub struct WgpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl WgpuDevice {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self { device, queue }
    }

    fn resolve<'a>(
        deps: &Resolver<'a, GpuHandle>,
        owner: &str,
        name: &str,
    ) -> Result<&'a GpuHandle, ResourceError> {
        deps.get(owner, name)
    }

    fn create_bind_group(
        &self,
        name: &str,
        desc: &crate::resource::BindGroupDesc,
        deps: &Resolver<'_, GpuHandle>,
    ) -> Result<wgpu::BindGroup, ResourceError> {
        let layout = expect_kind(
            &desc.layout,
            Self::resolve(deps, name, &desc.layout)?,
            ResourceKind::BindGroupLayout,
            GpuHandle::as_bind_group_layout,
        )?;

        // Views that differ from a texture's default must outlive the descriptor.
        let mut custom_views: Vec<Option<wgpu::TextureView>> = Vec::with_capacity(desc.entries.len());
        for entry in &desc.entries {
            let view = match &entry.resource {
                BindingResourceDesc::TextureView {
                    name: texture_name,
                    dimension,
                    aspect,
                } if dimension.is_some() || *aspect != wgpu::TextureAspect::All => {
                    let texture = expect_kind(
                        texture_name,
                        Self::resolve(deps, name, texture_name)?,
                        ResourceKind::Texture,
                        GpuHandle::as_texture,
                    )?;
                    Some(texture.create_view(&wgpu::TextureViewDescriptor {
                        label: Some(texture_name),
                        dimension: *dimension,
                        aspect: *aspect,
                        ..Default::default()
                    }))
                }
                _ => None,
            };
            custom_views.push(view);
        }

        let mut entries = Vec::with_capacity(desc.entries.len());
        for (entry, custom_view) in desc.entries.iter().zip(&custom_views) {
            let resource = match &entry.resource {
                BindingResourceDesc::Buffer {
                    name: buffer_name,
                    offset,
                    size,
                } => wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: expect_kind(
                        buffer_name,
                        Self::resolve(deps, name, buffer_name)?,
                        ResourceKind::Buffer,
                        GpuHandle::as_buffer,
                    )?,
                    offset: *offset,
                    size: *size,
                }),
                BindingResourceDesc::TextureView {
                    name: texture_name, ..
                } => match custom_view {
                    Some(view) => wgpu::BindingResource::TextureView(view),
                    None => wgpu::BindingResource::TextureView(expect_kind(
                        texture_name,
                        Self::resolve(deps, name, texture_name)?,
                        ResourceKind::Texture,
                        GpuHandle::as_texture_view,
                    )?),
                },
                BindingResourceDesc::Sampler { name: sampler_name } => {
                    wgpu::BindingResource::Sampler(expect_kind(
                        sampler_name,
                        Self::resolve(deps, name, sampler_name)?,
                        ResourceKind::Sampler,
                        GpuHandle::as_sampler,
                    )?)
                }
            };
            entries.push(wgpu::BindGroupEntry {
                binding: entry.binding,
                resource,
            });
        }

        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(name),
            layout,
            entries: &entries,
        }))
    }

    fn create_render_pipeline(
        &self,
        name: &str,
        desc: &crate::resource::RenderPipelineDesc,
        deps: &Resolver<'_, GpuHandle>,
    ) -> Result<wgpu::RenderPipeline, ResourceError> {
        let layout = expect_kind(
            &desc.layout,
            Self::resolve(deps, name, &desc.layout)?,
            ResourceKind::PipelineLayout,
            GpuHandle::as_pipeline_layout,
        )?;
        let vertex_module = expect_kind(
            &desc.vertex_shader,
            Self::resolve(deps, name, &desc.vertex_shader)?,
            ResourceKind::ShaderModule,
            GpuHandle::as_shader_module,
        )?;
        let vertex_buffers: Vec<wgpu::VertexBufferLayout<'_>> = desc
            .vertex_buffers
            .iter()
            .map(|layout| wgpu::VertexBufferLayout {
                array_stride: layout.array_stride,
                step_mode: layout.step_mode,
                attributes: &layout.attributes,
            })
            .collect();

        let fragment = match &desc.fragment {
            Some(fragment) => Some((
                expect_kind(
                    &fragment.shader,
                    Self::resolve(deps, name, &fragment.shader)?,
                    ResourceKind::ShaderModule,
                    GpuHandle::as_shader_module,
                )?,
                fragment,
            )),
            None => None,
        };

        Ok(self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(name),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module: vertex_module,
                    entry_point: Some(&desc.vertex_entry_point),
                    buffers: &vertex_buffers,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: desc.primitive,
                depth_stencil: desc.depth_stencil.clone(),
                multisample: desc.multisample,
                fragment: fragment.map(|(module, fragment)| wgpu::FragmentState {
                    module,
                    entry_point: Some(&fragment.entry_point),
                    targets: &fragment.targets,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview_mask: None,
                cache: None,
            }))
    }
}

impl GpuDevice for WgpuDevice {
    type Handle = GpuHandle;
    type Encoder = wgpu::CommandEncoder;

    fn create_resource(
        &self,
        name: &str,
        desc: &ResourceDesc,
        deps: &Resolver<'_, GpuHandle>,
    ) -> Result<GpuHandle, ResourceError> {
        let handle = match desc {
            ResourceDesc::Buffer(buffer) => {
                GpuHandle::Buffer(self.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(name),
                    size: buffer.size,
                    usage: buffer.usage,
                    mapped_at_creation: false,
                }))
            }
            ResourceDesc::Texture(texture) => {
                let created = self.device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(name),
                    size: texture.size,
                    mip_level_count: texture.mip_level_count,
                    sample_count: texture.sample_count,
                    dimension: texture.dimension,
                    format: texture.format,
                    usage: texture.usage,
                    view_formats: &[],
                });
                let view = created.create_view(&wgpu::TextureViewDescriptor {
                    label: Some(name),
                    dimension: Some(texture.default_view_dimension()),
                    ..Default::default()
                });
                GpuHandle::Texture {
                    texture: created,
                    view,
                }
            }
            ResourceDesc::Sampler(sampler) => {
                GpuHandle::Sampler(self.device.create_sampler(&wgpu::SamplerDescriptor {
                    label: Some(name),
                    address_mode_u: sampler.address_mode,
                    address_mode_v: sampler.address_mode,
                    address_mode_w: sampler.address_mode,
                    mag_filter: sampler.mag_filter,
                    min_filter: sampler.min_filter,
                    mipmap_filter: sampler.mipmap_filter,
                    compare: sampler.compare,
                    ..Default::default()
                }))
            }
            ResourceDesc::BindGroupLayout(layout) => GpuHandle::BindGroupLayout(
                self.device
                    .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some(name),
                        entries: &layout.entries,
                    }),
            ),
            ResourceDesc::BindGroup(group) => {
                GpuHandle::BindGroup(self.create_bind_group(name, group, deps)?)
            }
            ResourceDesc::PipelineLayout(layout) => {
                let layouts = layout
                    .bind_group_layouts
                    .iter()
                    .map(|layout_name| {
                        expect_kind(
                            layout_name,
                            Self::resolve(deps, name, layout_name)?,
                            ResourceKind::BindGroupLayout,
                            GpuHandle::as_bind_group_layout,
                        )
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                GpuHandle::PipelineLayout(self.device.create_pipeline_layout(
                    &wgpu::PipelineLayoutDescriptor {
                        label: Some(name),
                        bind_group_layouts: &layouts,
                        immediate_size: 0,
                    },
                ))
            }
            ResourceDesc::RenderPipeline(pipeline) => {
                GpuHandle::RenderPipeline(self.create_render_pipeline(name, pipeline, deps)?)
            }
            ResourceDesc::ComputePipeline(pipeline) => {
                let layout = expect_kind(
                    &pipeline.layout,
                    Self::resolve(deps, name, &pipeline.layout)?,
                    ResourceKind::PipelineLayout,
                    GpuHandle::as_pipeline_layout,
                )?;
                let module = expect_kind(
                    &pipeline.shader,
                    Self::resolve(deps, name, &pipeline.shader)?,
                    ResourceKind::ShaderModule,
                    GpuHandle::as_shader_module,
                )?;
                GpuHandle::ComputePipeline(self.device.create_compute_pipeline(
                    &wgpu::ComputePipelineDescriptor {
                        label: Some(name),
                        layout: Some(layout),
                        module,
                        entry_point: Some(&pipeline.entry_point),
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                        cache: None,
                    },
                ))
            }
            ResourceDesc::ShaderModule(shader) => GpuHandle::ShaderModule(
                self.device
                    .create_shader_module(wgpu::ShaderModuleDescriptor {
                        label: Some(name),
                        source: wgpu::ShaderSource::Wgsl(shader.source.as_str().into()),
                    }),
            ),
        };
        Ok(handle)
    }

    fn destroy_resource(&self, handle: GpuHandle) {
        match handle {
            GpuHandle::Buffer(buffer) => buffer.destroy(),
            GpuHandle::Texture { texture, .. } => texture.destroy(),
            // Everything else is released when the last reference drops.
            other => drop(other),
        }
    }

    fn write_buffer(
        &self,
        buffer: &GpuHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), ResourceError> {
        let target = buffer.as_buffer().ok_or_else(|| ResourceError::KindMismatch {
            name: "write target".to_string(),
            expected: ResourceKind::Buffer,
            found: buffer.kind(),
        })?;
        self.queue.write_buffer(target, offset, data);
        Ok(())
    }

    fn create_encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    fn submit(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit([encoder.finish()]);
    }

    fn min_storage_buffer_offset_alignment(&self) -> u32 {
        self.device.limits().min_storage_buffer_offset_alignment
    }
}

/// Typed lookups for passes recording wgpu commands.
impl ResourceTable<WgpuDevice> {
    fn typed<'a, T>(
        &'a self,
        name: &str,
        expected: ResourceKind,
        pick: impl FnOnce(&'a GpuHandle) -> Option<&'a T>,
    ) -> Result<&'a T, ResourceError> {
        let handle = self
            .get_resource(name)
            .ok_or_else(|| ResourceError::NotFound {
                name: name.to_string(),
            })?;
        expect_kind(name, handle, expected, pick)
    }

    pub fn buffer(&self, name: &str) -> Result<&wgpu::Buffer, ResourceError> {
        self.typed(name, ResourceKind::Buffer, GpuHandle::as_buffer)
    }

    pub fn texture(&self, name: &str) -> Result<&wgpu::Texture, ResourceError> {
        self.typed(name, ResourceKind::Texture, GpuHandle::as_texture)
    }

    pub fn texture_view(&self, name: &str) -> Result<&wgpu::TextureView, ResourceError> {
        self.typed(name, ResourceKind::Texture, GpuHandle::as_texture_view)
    }

    pub fn bind_group(&self, name: &str) -> Result<&wgpu::BindGroup, ResourceError> {
        self.typed(name, ResourceKind::BindGroup, GpuHandle::as_bind_group)
    }

    pub fn render_pipeline(&self, name: &str) -> Result<&wgpu::RenderPipeline, ResourceError> {
        self.typed(name, ResourceKind::RenderPipeline, GpuHandle::as_render_pipeline)
    }
}

/// Request an adapter and a device, optionally compatible with `surface`.
pub async fn request_device(
    instance: &wgpu::Instance,
    surface: Option<&wgpu::Surface<'_>>,
) -> Result<(wgpu::Adapter, WgpuDevice), DeviceError> {
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: surface,
            force_fallback_adapter: false,
        })
        .await
        .map_err(|_| DeviceError::NoAdapter)?;

    let info = adapter.get_info();
    log::info!(
        "Selected GPU: {} ({:?}, {:?})",
        info.name,
        info.backend,
        info.device_type
    );

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("umbra-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            trace: wgpu::Trace::Off,
        })
        .await?;

    Ok((adapter, WgpuDevice::new(device, queue)))
}

/// Acquire a device without a surface, blocking on `pollster`.
pub fn request_headless_device_blocking() -> Result<WgpuDevice, DeviceError> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    pollster::block_on(request_device(&instance, None)).map(|(_, device)| device)
}

/// A window surface configured for presenting the lighting output.
pub struct SurfaceContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,
    pub format: wgpu::TextureFormat,
    device: wgpu::Device,
}

impl SurfaceContext {
    /// Create the surface for `window` and the device that will drive it.
    pub async fn new(
        window: Arc<Window>,
        vsync: bool,
    ) -> Result<(Self, WgpuDevice), DeviceError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let size = window.inner_size();
        let surface = instance.create_surface(window)?;
        let (adapter, gpu) = request_device(&instance, Some(&surface)).await?;

        let caps = surface.get_capabilities(&adapter);
        let format = select_preferred_srgb_format(&caps.formats);
        let present_mode = if vsync || !caps.present_modes.contains(&wgpu::PresentMode::Mailbox) {
            wgpu::PresentMode::Fifo
        } else {
            wgpu::PresentMode::Mailbox
        };
        let config = wgpu::SurfaceConfiguration {
            // The lighting output is copied into the swapchain image.
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_DST,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&gpu.device, &config);

        Ok((
            Self {
                instance,
                adapter,
                surface,
                config,
                format,
                device: gpu.device.clone(),
            },
            gpu,
        ))
    }

    /// Reconfigure after a window resize. Zero sizes are clamped to 1.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.surface.configure(&self.device, &self.config);
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Get the next swapchain image, reconfiguring once on loss.
    pub fn get_current_texture(&self) -> Result<wgpu::SurfaceTexture, SurfaceError> {
        match self.surface.get_current_texture() {
            Ok(texture) => Ok(texture),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("Surface lost or outdated, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                self.surface
                    .get_current_texture()
                    .map_err(|_| SurfaceError::Lost)
            }
            Err(wgpu::SurfaceError::OutOfMemory) => Err(SurfaceError::OutOfMemory),
            Err(wgpu::SurfaceError::Timeout) => Err(SurfaceError::Timeout),
            Err(wgpu::SurfaceError::Other) => {
                log::error!("Unknown surface error occurred");
                Err(SurfaceError::Lost)
            }
        }
    }
}

/// Initialize the surface synchronously using `pollster`.
pub fn init_surface_blocking(
    window: Arc<Window>,
    vsync: bool,
) -> Result<(SurfaceContext, WgpuDevice), DeviceError> {
    pollster::block_on(SurfaceContext::new(window, vsync))
}

/// Prefer Bgra8UnormSrgb, then Rgba8UnormSrgb, then any sRGB format.
fn select_preferred_srgb_format(formats: &[wgpu::TextureFormat]) -> wgpu::TextureFormat {
    if formats.contains(&wgpu::TextureFormat::Bgra8UnormSrgb) {
        wgpu::TextureFormat::Bgra8UnormSrgb
    } else if formats.contains(&wgpu::TextureFormat::Rgba8UnormSrgb) {
        wgpu::TextureFormat::Rgba8UnormSrgb
    } else {
        formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or(wgpu::TextureFormat::Bgra8UnormSrgb)
    }
}
