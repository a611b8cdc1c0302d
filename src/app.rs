use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use glam::Vec2;
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

use crate::camera::OrbitCamera;
use crate::frame::{FrameInputs, FrameRenderer, MeshHandle};
use crate::input::InputState;
use crate::mesh::{box_mesh, receiver_quad, Mesh};
use crate::render::Renderer;
use crate::scene::{CasterMeshes, SceneConfig};

/// Pixels of trackpad scroll treated as one wheel line.
const PIXELS_PER_LINE: f32 = 40.0;

/// Raised when no window can be opened, so callers can fall back to a
/// headless run.
#[derive(Debug)]
pub struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

/// Opens a window and renders the scene until it is closed.
pub fn run_interactive(scene: SceneConfig, model: Mesh) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = ShadowApp::new(scene, model)?;
    event_loop
        .run_app(&mut app)
        .context("event loop terminated with error")?;

    match app.error.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

struct Graphics {
    renderer: Renderer,
    receiver: MeshHandle,
    casters: CasterMeshes,
}

struct ShadowApp {
    scene: SceneConfig,
    model: Mesh,
    frames: FrameRenderer,
    camera: OrbitCamera,
    input: InputState,
    tick: u64,
    graphics: Option<Graphics>,
    error: Option<anyhow::Error>,
}

impl ShadowApp {
    fn new(scene: SceneConfig, model: Mesh) -> Result<Self> {
        let frames = FrameRenderer::new(scene.plane()?);
        let camera = OrbitCamera::new(scene.camera);
        Ok(Self {
            scene,
            model,
            frames,
            camera,
            input: InputState::new(),
            tick: 0,
            graphics: None,
            error: None,
        })
    }

    fn create_graphics(&self, event_loop: &ActiveEventLoop) -> Result<Graphics> {
        let attributes = Window::default_attributes()
            .with_title("Planar Shadows")
            .with_inner_size(LogicalSize::new(1280.0, 720.0));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .map_err(|err| WindowInitError::from_error("window", err))?,
        );

        let mut renderer = block_on(Renderer::new(window))?;
        let receiver = renderer.upload_mesh(
            &receiver_quad(self.frames.plane(), self.scene.receiver.half_size),
            "receiver",
        );
        let casters = CasterMeshes {
            model: renderer.upload_mesh(&self.model, "model"),
            cube: renderer.upload_mesh(&box_mesh(), "box"),
        };
        log::info!(
            "scene ready: {} caster rings, light base {}",
            self.scene.rings.len(),
            self.scene.light.base
        );
        Ok(Graphics {
            renderer,
            receiver,
            casters,
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        self.error = Some(err);
        event_loop.exit();
    }

    fn redraw(&mut self) -> Result<()> {
        let Some(graphics) = self.graphics.as_mut() else {
            return Ok(());
        };

        let (drag, wheel) = self.input.take_deltas();
        self.camera.rotate(drag);
        self.camera.zoom(wheel);
        let camera = self.camera.params(graphics.renderer.aspect());

        let inputs = FrameInputs {
            view: camera.view,
            projection: camera.projection,
            light: self.scene.light.position(self.tick),
        };
        let receiver = self.scene.receiver(graphics.receiver);
        let casters = self.scene.casters(self.tick, &graphics.casters);
        self.frames
            .render_frame(&mut graphics.renderer, inputs, &receiver, &casters);
        self.tick += 1;

        match graphics.renderer.present() {
            Ok(()) => Ok(()),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let size = graphics.renderer.window().inner_size();
                graphics.renderer.resize(size);
                Ok(())
            }
            Err(wgpu::SurfaceError::OutOfMemory) => Err(anyhow!("GPU is out of memory")),
            Err(err) => {
                log::warn!("skipping frame: {err}");
                Ok(())
            }
        }
    }
}

impl ApplicationHandler for ShadowApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.graphics.is_some() {
            return;
        }
        match self.create_graphics(event_loop) {
            Ok(graphics) => {
                graphics.renderer.window().request_redraw();
                self.graphics = Some(graphics);
            }
            Err(err) => self.fail(event_loop, err),
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(graphics) = &self.graphics {
            graphics.renderer.window().request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(graphics) = self.graphics.as_mut() else {
            return;
        };
        if window_id != graphics.renderer.window_id() {
            return;
        }

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::KeyboardInput { event, .. }
                if event.state == ElementState::Pressed
                    && event.logical_key == Key::Named(NamedKey::Escape) =>
            {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => graphics.renderer.resize(size),
            WindowEvent::ScaleFactorChanged { .. } => {
                let size = graphics.renderer.window().inner_size();
                graphics.renderer.resize(size);
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => self.input.set_drag_button(state == ElementState::Pressed),
            WindowEvent::CursorMoved { position, .. } => self
                .input
                .set_mouse_position(Vec2::new(position.x as f32, position.y as f32)),
            WindowEvent::CursorLeft { .. } => self.input.cursor_left(),
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(offset) => offset.y as f32 / PIXELS_PER_LINE,
                };
                self.input.add_wheel(lines);
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.redraw() {
                    self.fail(event_loop, err);
                }
            }
            _ => {}
        }
    }
}
