//! Render pass abstraction.
//!
//! A pass declares the resource names it reads ([`PassDescriptor::inputs`]),
//! owns ([`PassDescriptor::managed`]) and writes ([`PassDescriptor::outputs`])
//! before any GPU object exists. [`PassNode`] wraps a [`RenderPass`] with the
//! lifecycle `Uninitialized -> Initializing -> Ready -> Destroyed`, checks
//! inputs before every render and deletes managed resources on destroy.

use std::fmt;

use log::{debug, warn};
use rustc_hash::FxHashMap;

use crate::device::GpuDevice;
use crate::resource::{ResourceDesc, ResourceError, ResourceTable, ShaderModuleDesc};
use crate::scene::GpuScene;
use crate::shader::{ShaderError, ShaderSource};

/// Reverse-Z depth clear value (the far plane).
pub const DEPTH_CLEAR: f32 = 0.0;

/// Named resource dependencies of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassDescriptor {
    pub name: String,
    /// Must exist in the table whenever the pass renders.
    pub inputs: Vec<String>,
    /// Created by this pass's initialize and deleted by its destroy, nowhere else.
    pub managed: Vec<String>,
    /// Written by the pass each frame. Usually a subset of `managed`.
    pub outputs: Vec<String>,
}

impl PassDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn inputs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn managed<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.managed.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn outputs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs.extend(names.into_iter().map(Into::into));
        self
    }

    /// Names this pass makes available to later passes.
    pub fn provides(&self) -> impl Iterator<Item = &str> {
        self.managed
            .iter()
            .chain(self.outputs.iter())
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Uninitialized,
    Initializing,
    Ready,
    Destroyed,
}

impl fmt::Display for PassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PassState::Uninitialized => "uninitialized",
            PassState::Initializing => "initializing",
            PassState::Ready => "ready",
            PassState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PassError {
    /// Initialize was called on a pass that is already initialized.
    #[error("pass '{pass}' is already initialized")]
    AlreadyInitialized { pass: String },

    /// The pass was asked to render or resize outside the ready state.
    #[error("pass '{pass}' is {state}, not ready")]
    NotReady { pass: String, state: PassState },

    /// Initialize returned without creating a declared managed resource.
    #[error("pass '{pass}' did not create managed resource '{name}'")]
    ManagedNotCreated { pass: String, name: String },

    /// An input is neither provided externally nor produced by an earlier pass.
    #[error("pass '{pass}' reads '{input}', which no earlier pass provides")]
    UnsatisfiedInput { pass: String, input: String },

    /// Two passes claim ownership of the same resource.
    #[error("resource '{name}' is managed by both '{first}' and '{second}'")]
    DuplicateManaged {
        name: String,
        first: String,
        second: String,
    },

    /// A pass-managed resource could not be created.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// A pass's shader failed to load.
    #[error(transparent)]
    Shader(#[from] ShaderError),
}

/// Size of the render targets that follow the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Clamps each side to at least one pixel.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }
}

/// Everything a pass may touch while creating or recreating its resources.
pub struct SetupContext<'a, D: GpuDevice> {
    pub table: &'a mut ResourceTable<D>,
    pub scene: &'a GpuScene,
    pub shaders: &'a dyn ShaderSource,
    pub viewport: Viewport,
    /// Format of the final color target.
    pub output_format: wgpu::TextureFormat,
}

impl<D: GpuDevice> SetupContext<'_, D> {
    /// Resolve `path` and create a shader module resource called `name`.
    pub fn create_shader(&mut self, name: &str, path: &str) -> Result<(), PassError> {
        let source = self.shaders.resolve(path)?;
        self.table
            .create_resource(name, ResourceDesc::ShaderModule(ShaderModuleDesc { source }))?;
        Ok(())
    }
}

/// Per-frame inputs to [`RenderPass::render`].
pub struct FrameContext<'a, D: GpuDevice> {
    pub table: &'a mut ResourceTable<D>,
    pub scene: &'a GpuScene,
    pub encoder: &'a mut D::Encoder,
    pub delta: f32,
}

/// One stage of the frame.
pub trait RenderPass<D: GpuDevice> {
    fn name(&self) -> &str;

    /// Declare resource names. Called once, before any GPU object exists.
    fn declare(&self) -> PassDescriptor;

    /// Create every managed resource.
    fn initialize(&mut self, ctx: &mut SetupContext<'_, D>) -> Result<(), PassError>;

    /// Recreate size-dependent managed resources under the same names.
    fn on_resize(&mut self, ctx: &mut SetupContext<'_, D>) -> Result<(), PassError>;

    /// Record this pass's commands. Every declared input exists when called.
    fn render(&mut self, frame: &mut FrameContext<'_, D>) -> Result<(), PassError>;
}

/// What happened to a pass in one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Rendered,
    /// Declared inputs that were absent; nothing was recorded.
    Skipped { missing: Vec<String> },
}

/// A pass plus its lifecycle state and declared dependencies.
pub struct PassNode<D: GpuDevice> {
    pass: Box<dyn RenderPass<D>>,
    descriptor: PassDescriptor,
    state: PassState,
}

impl<D: GpuDevice> PassNode<D> {
    pub fn new(pass: Box<dyn RenderPass<D>>) -> Self {
        let descriptor = pass.declare();
        Self {
            pass,
            descriptor,
            state: PassState::Uninitialized,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &PassDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    pub fn initialize(&mut self, ctx: &mut SetupContext<'_, D>) -> Result<(), PassError> {
        if matches!(self.state, PassState::Initializing | PassState::Ready) {
            return Err(PassError::AlreadyInitialized {
                pass: self.descriptor.name.clone(),
            });
        }
        self.state = PassState::Initializing;

        let result = self.pass.initialize(ctx).and_then(|()| {
            match self
                .descriptor
                .managed
                .iter()
                .find(|name| !ctx.table.has_resource(name))
            {
                Some(name) => Err(PassError::ManagedNotCreated {
                    pass: self.descriptor.name.clone(),
                    name: name.clone(),
                }),
                None => Ok(()),
            }
        });

        match result {
            Ok(()) => {
                self.state = PassState::Ready;
                debug!("Pass '{}' ready", self.descriptor.name);
                Ok(())
            }
            Err(err) => {
                self.delete_managed(ctx.table);
                self.state = PassState::Uninitialized;
                Err(err)
            }
        }
    }

    pub fn resize(&mut self, ctx: &mut SetupContext<'_, D>) -> Result<(), PassError> {
        self.ensure_ready()?;
        self.pass.on_resize(ctx)
    }

    /// Render unless an input is missing, in which case the pass is skipped
    /// with a warning and the table is left as it was.
    pub fn render(&mut self, frame: &mut FrameContext<'_, D>) -> Result<PassOutcome, PassError> {
        self.ensure_ready()?;
        let missing: Vec<String> = self
            .descriptor
            .inputs
            .iter()
            .filter(|name| !frame.table.has_resource(name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            warn!(
                "Skipping pass '{}': missing inputs {:?}",
                self.descriptor.name, missing
            );
            return Ok(PassOutcome::Skipped { missing });
        }
        self.pass.render(frame)?;
        Ok(PassOutcome::Rendered)
    }

    /// Delete every managed resource. The pass may be initialized again afterwards.
    pub fn destroy(&mut self, table: &mut ResourceTable<D>) {
        self.delete_managed(table);
        self.state = PassState::Destroyed;
        debug!("Pass '{}' destroyed", self.descriptor.name);
    }

    fn delete_managed(&self, table: &mut ResourceTable<D>) {
        for name in &self.descriptor.managed {
            table.delete_resource(name);
        }
    }

    fn ensure_ready(&self) -> Result<(), PassError> {
        if self.state == PassState::Ready {
            Ok(())
        } else {
            Err(PassError::NotReady {
                pass: self.descriptor.name.clone(),
                state: self.state,
            })
        }
    }
}

/// Check that passes in this order can be satisfied.
///
/// Every input must be in `external` or provided by an earlier pass, and no
/// resource may be managed by two passes. Execution order is not changed.
pub fn validate_passes(passes: &[PassDescriptor], external: &[&str]) -> Result<(), PassError> {
    let mut available: Vec<&str> = external.to_vec();
    let mut owners: FxHashMap<&str, &str> = FxHashMap::default();

    for pass in passes {
        for name in &pass.managed {
            if let Some(first) = owners.insert(name.as_str(), pass.name.as_str()) {
                return Err(PassError::DuplicateManaged {
                    name: name.clone(),
                    first: first.to_string(),
                    second: pass.name.clone(),
                });
            }
        }
        // A pass may read what it manages itself, such as its own pipeline.
        let own: Vec<&str> = pass.managed.iter().map(String::as_str).collect();
        if let Some(input) = pass
            .inputs
            .iter()
            .find(|input| !available.contains(&input.as_str()) && !own.contains(&input.as_str()))
        {
            return Err(PassError::UnsatisfiedInput {
                pass: pass.name.clone(),
                input: input.clone(),
            });
        }
        available.extend(pass.provides());
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::headless::HeadlessDevice;
    use crate::resource::BufferDesc;
    use crate::shader::ShaderLibrary;

    /// Minimal pass that owns one buffer and records a command per frame.
    pub(crate) struct CountingPass {
        pub name: &'static str,
        pub inputs: Vec<&'static str>,
        pub output: &'static str,
        pub skip_create: bool,
    }

    impl CountingPass {
        pub(crate) fn new(name: &'static str, inputs: Vec<&'static str>, output: &'static str) -> Self {
            Self {
                name,
                inputs,
                output,
                skip_create: false,
            }
        }
    }

    impl RenderPass<HeadlessDevice> for CountingPass {
        fn name(&self) -> &str {
            self.name
        }

        fn declare(&self) -> PassDescriptor {
            PassDescriptor::new(self.name)
                .inputs(self.inputs.iter().copied())
                .managed([self.output])
                .outputs([self.output])
        }

        fn initialize(
            &mut self,
            ctx: &mut SetupContext<'_, HeadlessDevice>,
        ) -> Result<(), PassError> {
            if !self.skip_create {
                self.on_resize(ctx)?;
            }
            Ok(())
        }

        fn on_resize(
            &mut self,
            ctx: &mut SetupContext<'_, HeadlessDevice>,
        ) -> Result<(), PassError> {
            let size = u64::from(ctx.viewport.width * ctx.viewport.height) * 4;
            ctx.table.create_resource(
                self.output,
                ResourceDesc::Buffer(BufferDesc {
                    size,
                    usage: wgpu::BufferUsages::STORAGE,
                }),
            )?;
            Ok(())
        }

        fn render(&mut self, frame: &mut FrameContext<'_, HeadlessDevice>) -> Result<(), PassError> {
            frame.encoder.record(format!("{} -> {}", self.name, self.output));
            Ok(())
        }
    }

    pub(crate) fn setup_context<'a>(
        table: &'a mut ResourceTable<HeadlessDevice>,
        scene: &'a GpuScene,
        shaders: &'a ShaderLibrary,
    ) -> SetupContext<'a, HeadlessDevice> {
        SetupContext {
            table,
            scene,
            shaders,
            viewport: Viewport::new(4, 4),
            output_format: wgpu::TextureFormat::Rgba8Unorm,
        }
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut table = ResourceTable::with_device(HeadlessDevice::new());
        let scene = GpuScene::new(Camera::default(), 128);
        let shaders = ShaderLibrary::new();
        let mut node = PassNode::new(Box::new(CountingPass::new("a", vec![], "A/Out")));
        assert_eq!(node.state(), PassState::Uninitialized);

        node.initialize(&mut setup_context(&mut table, &scene, &shaders))
            .unwrap();
        assert_eq!(node.state(), PassState::Ready);
        assert!(table.has_resource("A/Out"));

        let err = node
            .initialize(&mut setup_context(&mut table, &scene, &shaders))
            .unwrap_err();
        assert!(matches!(err, PassError::AlreadyInitialized { .. }));

        node.destroy(&mut table);
        assert_eq!(node.state(), PassState::Destroyed);
        assert!(!table.has_resource("A/Out"));

        node.initialize(&mut setup_context(&mut table, &scene, &shaders))
            .unwrap();
        assert_eq!(node.state(), PassState::Ready);
    }

    #[test]
    fn test_render_before_initialize_is_rejected() {
        let mut table = ResourceTable::with_device(HeadlessDevice::new());
        let scene = GpuScene::new(Camera::default(), 128);
        let mut node = PassNode::new(Box::new(CountingPass::new("a", vec![], "A/Out")));
        let mut encoder = table.create_encoder("frame").unwrap();
        let mut frame = FrameContext {
            table: &mut table,
            scene: &scene,
            encoder: &mut encoder,
            delta: 0.0,
        };
        assert!(matches!(
            node.render(&mut frame),
            Err(PassError::NotReady {
                state: PassState::Uninitialized,
                ..
            })
        ));
    }

    #[test]
    fn test_missing_input_skips_without_touching_outputs() {
        let mut table = ResourceTable::with_device(HeadlessDevice::new());
        let scene = GpuScene::new(Camera::default(), 128);
        let shaders = ShaderLibrary::new();
        let mut node = PassNode::new(Box::new(CountingPass::new(
            "b",
            vec!["Missing/Input"],
            "B/Out",
        )));
        node.initialize(&mut setup_context(&mut table, &scene, &shaders))
            .unwrap();
        let version = table.version("B/Out");

        let mut encoder = table.create_encoder("frame").unwrap();
        let outcome = node
            .render(&mut FrameContext {
                table: &mut table,
                scene: &scene,
                encoder: &mut encoder,
                delta: 0.016,
            })
            .unwrap();

        assert_eq!(
            outcome,
            PassOutcome::Skipped {
                missing: vec!["Missing/Input".to_string()]
            }
        );
        assert_eq!(table.version("B/Out"), version);
        assert!(encoder.commands.is_empty());
    }

    #[test]
    fn test_resize_bumps_managed_version() {
        let mut table = ResourceTable::with_device(HeadlessDevice::new());
        let scene = GpuScene::new(Camera::default(), 128);
        let shaders = ShaderLibrary::new();
        let mut node = PassNode::new(Box::new(CountingPass::new("a", vec![], "A/Out")));
        node.initialize(&mut setup_context(&mut table, &scene, &shaders))
            .unwrap();
        let before = table.version("A/Out").unwrap();

        let mut ctx = setup_context(&mut table, &scene, &shaders);
        ctx.viewport = Viewport::new(8, 8);
        node.resize(&mut ctx).unwrap();

        assert!(table.version("A/Out").unwrap() > before);
        assert_eq!(table.descriptor("A/Out").and_then(|d| d.buffer_size()), Some(256));
    }

    #[test]
    fn test_initialize_without_managed_resource_fails() {
        let mut table = ResourceTable::with_device(HeadlessDevice::new());
        let scene = GpuScene::new(Camera::default(), 128);
        let shaders = ShaderLibrary::new();
        let mut pass = CountingPass::new("lazy", vec![], "Lazy/Out");
        pass.skip_create = true;
        let mut node = PassNode::new(Box::new(pass));

        let err = node
            .initialize(&mut setup_context(&mut table, &scene, &shaders))
            .unwrap_err();
        assert!(matches!(err, PassError::ManagedNotCreated { .. }));
        assert_eq!(node.state(), PassState::Uninitialized);
    }

    #[test]
    fn test_create_shader_reports_unknown_path() {
        let mut table = ResourceTable::with_device(HeadlessDevice::new());
        let scene = GpuScene::new(Camera::default(), 128);
        let shaders = ShaderLibrary::new();
        let mut ctx = setup_context(&mut table, &scene, &shaders);
        ctx.create_shader("Test/Shader", "prepass.wgsl").unwrap();
        assert!(matches!(
            ctx.create_shader("Test/Other", "missing.wgsl"),
            Err(PassError::Shader(ShaderError::NotFound { .. }))
        ));
        assert!(table.has_resource("Test/Shader"));
        assert!(!table.has_resource("Test/Other"));
    }

    #[test]
    fn test_validate_passes_in_order() {
        let passes = vec![
            PassDescriptor::new("depth").managed(["Depth"]).outputs(["Depth"]),
            PassDescriptor::new("gbuffer")
                .inputs(["Depth", "Scene/Frame"])
                .managed(["GBuffer"])
                .outputs(["GBuffer"]),
            PassDescriptor::new("lighting")
                .inputs(["GBuffer", "Depth"])
                .managed(["Output"]),
        ];
        validate_passes(&passes, &["Scene/Frame"]).unwrap();

        let reversed: Vec<_> = passes.iter().rev().cloned().collect();
        assert!(matches!(
            validate_passes(&reversed, &["Scene/Frame"]),
            Err(PassError::UnsatisfiedInput { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_shared_managed_names() {
        let passes = vec![
            PassDescriptor::new("a").managed(["Shared"]),
            PassDescriptor::new("b").managed(["Shared"]),
        ];
        match validate_passes(&passes, &[]) {
            Err(PassError::DuplicateManaged { name, first, second }) => {
                assert_eq!(name, "Shared");
                assert_eq!(first, "a");
                assert_eq!(second, "b");
            }
            other => panic!("expected duplicate managed error, got {other:?}"),
        }
    }
}
