//! vkframe: opens a window, prepares image-based lighting and draws the
//! environment through the frame orchestrator.
//!
//! Usage: `vkframe [config.toml]`. Without an argument `vkframe.toml` in the
//! working directory is used when present.
//!
//! Controls: drag to rotate, WASD/QE to move, scroll to zoom, `Tab` to
//! switch between the prefiltered and irradiance cubes, `L` to step the
//! prefiltered roughness level, `Esc` to quit.

mod controls;
mod skybox;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use vkframe_core::{Config, FrameTimer};
use vkframe_platform::{FramebufferSource, InputContext, KeyCode, Window};
use vkframe_renderer::{EnvironmentMaps, Renderer, SHADER_DIR};
use vkframe_resources::Cubemap;
use vkframe_scene::{Camera, CameraPositioner};

use crate::skybox::Skybox;

/// GPU objects that must be released before the renderer.
struct Scene {
    skybox: Skybox,
    _environment: EnvironmentMaps,
}

struct App {
    config: Config,
    // Field order matters for teardown: scene before renderer.
    scene: Option<Scene>,
    renderer: Option<Renderer>,
    window: Option<Window>,
    input: InputContext,
    timer: FrameTimer,
    camera: Camera,
    positioner: CameraPositioner,
}

impl App {
    fn new(config: Config) -> Self {
        let positioner = controls::make_positioner(&config.camera);
        info!("Camera positioner: {}", positioner.name());
        Self {
            config,
            scene: None,
            renderer: None,
            window: None,
            input: InputContext::new(),
            timer: FrameTimer::new(),
            camera: Camera::new(),
            positioner,
        }
    }

    fn initialize(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(event_loop, &self.config.window)?;
        let mut renderer = Renderer::new(&window, &self.config)?;

        let source = load_environment(&self.config)?;
        let shader_dir = Path::new(SHADER_DIR);
        let environment = renderer
            .precompute_environment(&self.config.precompute, &source, shader_dir)
            .context("lighting precompute failed")?;
        let skybox = Skybox::new(&mut renderer, &environment, shader_dir)?;

        self.camera.set_aspect(window.aspect_ratio());
        self.scene = Some(Scene {
            skybox,
            _environment: environment,
        });
        self.renderer = Some(renderer);
        self.window = Some(window);
        info!("Initialization complete, entering main loop");
        Ok(())
    }

    fn update(&mut self) {
        let dt = self.timer.tick();
        if self.input.is_key_just_pressed(KeyCode::Tab)
            && let Some(scene) = self.scene.as_mut()
        {
            scene.skybox.toggle_view();
        }
        if self.input.is_key_just_pressed(KeyCode::KeyL)
            && let Some(scene) = self.scene.as_mut()
        {
            scene.skybox.next_lod();
        }

        let controls = controls::positioner_input(&self.input);
        self.positioner.update(
            &controls,
            self.config.camera.mouse_sensitivity,
            dt,
            &mut self.camera,
        );

        if self.timer.frame_count() % 600 == 0 {
            tracing::debug!("{:.1} fps", self.timer.fps());
        }
    }

    fn draw(&mut self) -> Result<()> {
        let (Some(renderer), Some(scene)) = (self.renderer.as_mut(), self.scene.as_ref()) else {
            return Ok(());
        };

        let Some(cmd) = renderer.begin_frame()? else {
            return Ok(());
        };
        renderer.begin_render(&cmd)?;
        scene.skybox.draw(&cmd, &self.camera);
        renderer.end_render(&cmd)?;
        renderer.end_frame()?;
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(renderer) = self.renderer.as_ref()
            && let Err(e) = renderer.wait_idle()
        {
            warn!("Device did not go idle before shutdown: {}", e);
        }
        self.scene = None;
        self.renderer = None;
        self.window = None;
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.initialize(event_loop) {
            error!("Startup failed: {:#}", e);
            self.shutdown();
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if self.input.handle_window_event(&event) {
            if self.input.is_key_just_pressed(KeyCode::Escape) {
                event_loop.exit();
            }
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(window) = self.window.as_ref() {
                    window.mark_resized();
                    self.camera.set_aspect(window.aspect_ratio());
                }
                tracing::debug!("Window resized to {}x{}", size.width, size.height);
            }
            WindowEvent::RedrawRequested => {
                let minimized = self.window.as_ref().is_some_and(|window| {
                    let (width, height) = window.framebuffer_extent();
                    width == 0 || height == 0
                });
                if minimized {
                    return;
                }

                self.update();
                if let Err(e) = self.draw() {
                    error!("Frame failed: {:#}", e);
                    event_loop.exit();
                }
                self.input.begin_frame();
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

/// The configured HDR cubemap, or a procedural sky when none is set.
fn load_environment(config: &Config) -> Result<Cubemap> {
    match &config.precompute.environment {
        Some(path) => Cubemap::load(path)
            .with_context(|| format!("failed to load environment '{}'", path.display())),
        None => {
            info!(
                "No environment configured, using a {}x{} procedural sky",
                config.precompute.fallback_face_size, config.precompute.fallback_face_size
            );
            Ok(Cubemap::procedural_sky(config.precompute.fallback_face_size))
        }
    }
}

fn config_path() -> PathBuf {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(Config::DEFAULT_PATH))
}

fn main() -> Result<()> {
    vkframe_core::init_logging();
    info!("Starting vkframe");

    let path = config_path();
    let config = Config::load_or_default(&path)
        .with_context(|| format!("invalid config '{}'", path.display()))?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    info!("Exited after {} frame(s)", app.timer.frame_count());
    Ok(())
}
