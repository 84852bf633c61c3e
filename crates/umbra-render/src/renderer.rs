//! Frame orchestration.
//!
//! [`DeferredRenderer`] owns the resource table, the GPU scene and an ordered
//! list of passes. Each frame it updates the scene, opens one encoder, renders
//! every pass in the order they were pushed, runs the presentation hook and
//! submits. Pass order is fixed; declared dependencies are only validated.

use log::{error, info};

use crate::device::GpuDevice;
use crate::gpu::WgpuDevice;
use crate::pass::{
    validate_passes, FrameContext, PassDescriptor, PassError, PassNode, PassOutcome, PassState,
    RenderPass, SetupContext, Viewport,
};
use crate::passes::{DepthPrePass, GBufferPass, LightingPass, ShadowPass};
use crate::resource::{ResourceError, ResourceKind, ResourceTable};
use crate::scene::{GpuScene, SceneError};
use crate::shader::ShaderSource;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// A frame or resize was requested before `initialize`.
    #[error("renderer is not initialized")]
    NotInitialized,

    /// A shared resource could not be created or written.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// A pass failed to set up or to resize.
    #[error(transparent)]
    Pass(#[from] PassError),

    /// The scene failed to initialize or update.
    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// What each pass did during one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub frame: u64,
    pub rendered: Vec<String>,
    /// Passes skipped because an input was missing.
    pub skipped: Vec<String>,
    /// Passes whose render returned an error.
    pub failed: Vec<String>,
}

impl FrameReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty() && self.failed.is_empty()
    }
}

pub struct DeferredRenderer<D: GpuDevice> {
    table: ResourceTable<D>,
    scene: GpuScene,
    shaders: Box<dyn ShaderSource>,
    passes: Vec<PassNode<D>>,
    viewport: Viewport,
    output_format: wgpu::TextureFormat,
    initialized: bool,
    frame: u64,
}

impl<D: GpuDevice> DeferredRenderer<D> {
    pub fn new(
        table: ResourceTable<D>,
        scene: GpuScene,
        shaders: Box<dyn ShaderSource>,
        output_format: wgpu::TextureFormat,
    ) -> Self {
        Self {
            table,
            scene,
            shaders,
            passes: Vec::new(),
            viewport: Viewport::new(1, 1),
            output_format,
            initialized: false,
            frame: 0,
        }
    }

    /// Append a pass. Passes render in the order they are pushed.
    pub fn push_pass(&mut self, pass: Box<dyn RenderPass<D>>) {
        self.passes.push(PassNode::new(pass));
    }

    /// Initialize the scene if needed, validate pass dependencies and
    /// initialize every pass in order.
    pub fn initialize(&mut self, viewport: Viewport) -> Result<(), RenderError> {
        if !self.scene.is_initialized() {
            self.scene.init(&mut self.table)?;
        }
        self.viewport = viewport;
        self.scene
            .camera
            .set_aspect_ratio(viewport.width as f32, viewport.height as f32);

        let descriptors: Vec<PassDescriptor> =
            self.passes.iter().map(|p| p.descriptor().clone()).collect();
        let external: Vec<&str> = ResourceKind::ALL
            .iter()
            .flat_map(|kind| self.table.names_of_kind(*kind))
            .collect();
        validate_passes(&descriptors, &external)?;

        let Self {
            table,
            scene,
            shaders,
            passes,
            output_format,
            ..
        } = &mut *self;
        for node in passes.iter_mut() {
            node.initialize(&mut SetupContext {
                table: &mut *table,
                scene: &*scene,
                shaders: &**shaders,
                viewport,
                output_format: *output_format,
            })?;
        }
        self.initialized = true;
        info!(
            "Renderer initialized with {} passes at {}x{}",
            self.passes.len(),
            viewport.width,
            viewport.height
        );
        Ok(())
    }

    /// Recreate size-dependent targets. Zero-sized requests are ignored.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if !self.initialized {
            return Err(RenderError::NotInitialized);
        }
        if width == 0 || height == 0 {
            return Ok(());
        }
        let viewport = Viewport::new(width, height);
        if viewport == self.viewport {
            return Ok(());
        }
        self.viewport = viewport;
        self.scene
            .camera
            .set_aspect_ratio(width as f32, height as f32);

        let Self {
            table,
            scene,
            shaders,
            passes,
            output_format,
            ..
        } = &mut *self;
        for node in passes.iter_mut().filter(|n| n.state() == PassState::Ready) {
            node.resize(&mut SetupContext {
                table: &mut *table,
                scene: &*scene,
                shaders: &**shaders,
                viewport,
                output_format: *output_format,
            })?;
        }
        info!("Renderer resized to {width}x{height}");
        Ok(())
    }

    /// Update the scene, render every pass and submit.
    ///
    /// `present` runs after the last pass with the same encoder, so it can
    /// copy an output into the swapchain image. A pass that fails is logged
    /// and reported; the rest of the frame still runs.
    pub fn render_frame<F>(&mut self, delta: f32, present: F) -> Result<FrameReport, RenderError>
    where
        F: FnOnce(&ResourceTable<D>, &mut D::Encoder),
    {
        if !self.initialized {
            return Err(RenderError::NotInitialized);
        }
        self.scene.update(&mut self.table, delta)?;

        let mut encoder = self.table.create_encoder("frame")?;
        let mut report = FrameReport {
            frame: self.frame,
            ..FrameReport::default()
        };
        for node in &mut self.passes {
            let mut ctx = FrameContext {
                table: &mut self.table,
                scene: &self.scene,
                encoder: &mut encoder,
                delta,
            };
            let name = node.name().to_string();
            match node.render(&mut ctx) {
                Ok(PassOutcome::Rendered) => report.rendered.push(name),
                Ok(PassOutcome::Skipped { .. }) => report.skipped.push(name),
                Err(err) => {
                    error!("Pass '{name}' failed: {err}");
                    report.failed.push(name);
                }
            }
        }
        present(&self.table, &mut encoder);
        self.table.submit(encoder)?;
        self.frame += 1;
        Ok(report)
    }

    /// Destroy passes in reverse order, then the scene.
    pub fn destroy(&mut self) {
        for node in self.passes.iter_mut().rev() {
            node.destroy(&mut self.table);
        }
        self.scene.destroy(&mut self.table);
        self.initialized = false;
        info!("Renderer destroyed");
    }

    pub fn table(&self) -> &ResourceTable<D> {
        &self.table
    }

    /// Table and scene together, for adding or removing meshes.
    pub fn scene_and_table(&mut self) -> (&mut GpuScene, &mut ResourceTable<D>) {
        (&mut self.scene, &mut self.table)
    }

    pub fn scene(&self) -> &GpuScene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut GpuScene {
        &mut self.scene
    }

    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(PassNode::name).collect()
    }

    pub fn pass_state(&self, name: &str) -> Option<PassState> {
        self.passes
            .iter()
            .find(|p| p.name() == name)
            .map(PassNode::state)
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn output_format(&self) -> wgpu::TextureFormat {
        self.output_format
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Frames submitted so far.
    pub fn frame_count(&self) -> u64 {
        self.frame
    }
}

impl DeferredRenderer<WgpuDevice> {
    /// Depth pre-pass, GBuffer, shadow and lighting, in that order.
    pub fn standard(
        table: ResourceTable<WgpuDevice>,
        scene: GpuScene,
        shaders: Box<dyn ShaderSource>,
        output_format: wgpu::TextureFormat,
        shadow_resolution: u32,
    ) -> Self {
        let mut renderer = Self::new(table, scene, shaders, output_format);
        renderer.push_pass(Box::new(DepthPrePass::new()));
        renderer.push_pass(Box::new(GBufferPass::new()));
        renderer.push_pass(Box::new(ShadowPass::new(shadow_resolution)));
        renderer.push_pass(Box::new(LightingPass::new()));
        renderer
    }
}
