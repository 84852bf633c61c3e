//! Window, surface and per-frame driving of the deferred renderer.
//!
//! The lighting pass renders into `Lighting/Output` with the surface format;
//! presenting copies that texture into the swapchain image with the frame's
//! own encoder.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};
use umbra_config::Config;
use umbra_render::names::lighting;
use umbra_render::{
    DeferredRenderer, DeviceError, RenderError, ResourceTable, SceneError, ShaderLibrary,
    SurfaceContext, SurfaceError, Viewport, WgpuDevice, init_surface_blocking,
};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::clock::FrameClock;
use crate::demo;

/// Returns [`WindowAttributes`] based on the given configuration.
pub fn window_attributes_from_config(config: &Config) -> WindowAttributes {
    WindowAttributes::default()
        .with_title(config.window.title.clone())
        .with_inner_size(winit::dpi::LogicalSize::new(
            config.window.width as f64,
            config.window.height as f64,
        ))
}

/// Errors that stop the viewer before or while the event loop runs.
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),

    #[error("failed to create window: {0}")]
    Window(#[from] winit::error::OsError),

    #[error("GPU initialization failed: {0}")]
    Device(#[from] DeviceError),

    #[error("renderer initialization failed: {0}")]
    Render(#[from] RenderError),

    #[error("demo scene upload failed: {0}")]
    Scene(#[from] SceneError),
}

struct Gpu {
    window: Arc<Window>,
    surface: SurfaceContext,
    renderer: DeferredRenderer<WgpuDevice>,
}

/// Application state driven by winit.
pub struct Viewer {
    config: Config,
    config_dir: Option<PathBuf>,
    gpu: Option<Gpu>,
    clock: FrameClock,
    elapsed: f32,
    paused: bool,
}

impl Viewer {
    pub fn new(config: Config, config_dir: Option<PathBuf>) -> Self {
        Self {
            config,
            config_dir,
            gpu: None,
            clock: FrameClock::new(),
            elapsed: 0.0,
            paused: false,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Create the surface, build the standard pipeline and upload the demo scene.
    fn create_gpu(&self, window: Arc<Window>) -> Result<Gpu, ViewerError> {
        let (surface, device) = init_surface_blocking(window.clone(), self.config.window.vsync)?;
        let (width, height) = surface.size();

        let mut renderer = DeferredRenderer::standard(
            ResourceTable::with_device(device),
            demo::scene_from_config(&self.config),
            Box::new(ShaderLibrary::new()),
            surface.format,
            self.config.shadow.resolution,
        );
        renderer.initialize(Viewport::new(width, height))?;
        let (scene, table) = renderer.scene_and_table();
        demo::populate(scene, table)?;

        info!(
            "Viewer ready: {width}x{height} {:?}, passes {:?}",
            surface.format,
            renderer.pass_names()
        );
        Ok(Gpu {
            window,
            surface,
            renderer,
        })
    }

    fn resize(&mut self, width: u32, height: u32) {
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        if width == 0 || height == 0 {
            return;
        }
        gpu.surface.resize(width, height);
        if let Err(e) = gpu.renderer.resize(width, height) {
            error!("Renderer resize failed: {e}");
        }
        debug!("Window resized to {width}x{height}");
    }

    /// Re-read `config.ron` and apply what can change at runtime.
    fn reload_config(&mut self) {
        let Some(dir) = &self.config_dir else {
            warn!("No config directory, nothing to reload");
            return;
        };
        match self.config.reload(dir) {
            Ok(Some(new_config)) => {
                if let Err(e) = new_config.validate() {
                    warn!("Ignoring reloaded config: {e}");
                    return;
                }
                if let Some(gpu) = &mut self.gpu {
                    let scene = gpu.renderer.scene_mut();
                    if let Some(light) = scene.directional_light_mut() {
                        demo::apply_shadow_config(light, &new_config.shadow);
                    }
                    scene.clear_color = demo::clear_color(&new_config.render);
                }
                self.config = new_config;
                info!("Applied reloaded config");
            }
            Ok(None) => debug!("Config unchanged"),
            Err(e) => warn!("Config reload failed: {e}"),
        }
    }

    fn toggle_cascade_tint(&mut self) {
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        if let Some(light) = gpu.renderer.scene_mut().directional_light_mut() {
            light.show_cascades = !light.show_cascades;
            info!("Cascade tint {}", if light.show_cascades { "on" } else { "off" });
        }
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, event: &KeyEvent) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        match event.physical_key {
            PhysicalKey::Code(KeyCode::Escape) => event_loop.exit(),
            PhysicalKey::Code(KeyCode::KeyC) => self.toggle_cascade_tint(),
            PhysicalKey::Code(KeyCode::Space) => self.paused = !self.paused,
            PhysicalKey::Code(KeyCode::F5) => self.reload_config(),
            _ => {}
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let delta = self.clock.tick();
        if !self.paused {
            self.elapsed += delta;
        }
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        if let Err(e) = demo::animate(gpu.renderer.scene_mut(), self.elapsed) {
            warn!("Animation update failed: {e}");
        }

        let frame = match gpu.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(SurfaceError::Timeout) => {
                warn!("Surface timeout, skipping frame");
                return;
            }
            Err(e) => {
                error!("Cannot acquire surface texture: {e}");
                event_loop.exit();
                return;
            }
        };

        let target = &frame.texture;
        let result = gpu.renderer.render_frame(delta, |table, encoder| {
            present_output(table, encoder, target);
        });
        match result {
            Ok(report) if !report.is_complete() => {
                warn!(
                    "Frame {} incomplete: skipped {:?}, failed {:?}",
                    report.frame, report.skipped, report.failed
                );
            }
            Ok(_) => {}
            Err(e) => error!("Frame failed: {e}"),
        }
        gpu.window.pre_present_notify();
        frame.present();
    }
}

/// Copy the lit output into the swapchain image when sizes agree.
fn present_output(
    table: &ResourceTable<WgpuDevice>,
    encoder: &mut wgpu::CommandEncoder,
    target: &wgpu::Texture,
) {
    let output = match table.texture(lighting::OUTPUT) {
        Ok(output) => output,
        Err(e) => {
            warn!("Nothing to present: {e}");
            return;
        }
    };
    if output.size() != target.size() {
        debug!(
            "Output {:?} and surface {:?} differ, skipping present copy",
            output.size(),
            target.size()
        );
        return;
    }
    encoder.copy_texture_to_texture(
        output.as_image_copy(),
        target.as_image_copy(),
        target.size(),
    );
}

impl ApplicationHandler for Viewer {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.gpu.is_some() {
            return;
        }
        let created = event_loop
            .create_window(window_attributes_from_config(&self.config))
            .map_err(ViewerError::from)
            .and_then(|window| self.create_gpu(Arc::new(window)));
        match created {
            Ok(gpu) => {
                gpu.window.request_redraw();
                self.gpu = Some(gpu);
            }
            Err(e) => {
                error!("{e}");
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => self.resize(size.width, size.height),
            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(size) = self.gpu.as_ref().map(|gpu| gpu.window.inner_size()) {
                    self.resize(size.width, size.height);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(event_loop, &event),
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(gpu) = &self.gpu {
            gpu.window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut gpu) = self.gpu.take() {
            info!(
                "Rendered {} frames in {:.1}s",
                gpu.renderer.frame_count(),
                self.clock.uptime().as_secs_f32()
            );
            gpu.renderer.destroy();
        }
    }
}

/// Create an event loop and run the viewer until the window closes.
#[instrument(skip_all)]
pub fn run(config: Config, config_dir: Option<PathBuf>) -> Result<(), ViewerError> {
    let event_loop = EventLoop::new()?;
    let mut viewer = Viewer::new(config, config_dir);
    event_loop.run_app(&mut viewer)?;
    Ok(())
}
