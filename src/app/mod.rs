pub mod args;

use std::path::{Path, PathBuf};
use ash::vk;
use color_eyre::eyre::{eyre, Report};
use color_eyre::Result;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

use crate::app::args::AppArgs;
use crate::renderer::camera::{Camera, ModelRotation};
use crate::renderer::config::RenderConfig;
use crate::renderer::resources::material::MaterialTable;
use crate::renderer::resources::mesh::Mesh;
use crate::renderer::{FrameStatus, GraphicsContext};

pub struct App {
    // Dropped before the window it renders into
    context: Option<GraphicsContext>,
    window: Option<Window>,

    config: RenderConfig,
    mesh: Mesh,
    materials: MaterialTable,
    model_dir: PathBuf,
    camera: Camera,
    rotation: ModelRotation,

    // State
    frame_number: u64,
    frame_limit: Option<u64>,
    dropped_frames: u64,
    error: Option<Report>,
}

impl App {
    pub fn new(args: AppArgs) -> Result<Self> {
        let mut materials = MaterialTable::new();
        let mesh = Mesh::load_obj(&args.model, &mut materials)?;
        log::info!(
            "Loaded {}: {} faces, {} materials",
            args.model.display(),
            mesh.face_count,
            materials.len(),
        );

        let config = RenderConfig {
            window_extent: vk::Extent2D {
                width: args.width,
                height: args.height,
            },
            ..RenderConfig::default()
        };

        Ok(Self {
            context: None,
            window: None,
            config,
            mesh,
            materials,
            model_dir: args.model.parent().map(Path::to_path_buf).unwrap_or_default(),
            camera: Camera::new(),
            rotation: ModelRotation::default(),
            frame_number: 0,
            frame_limit: args.frames,
            dropped_frames: 0,
            error: None,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);
        event_loop.run_app(&mut self)?;

        if let Some(e) = self.error.take() {
            return Err(e);
        }
        log::info!(
            "Rendered {} frames, {} dropped",
            self.frame_number,
            self.dropped_frames,
        );
        Ok(())
    }

    fn init_graphics(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let extent = self.config.window_extent;
        let attributes = Window::default_attributes()
            .with_title("Wavefront Object Model Viewer")
            .with_inner_size(PhysicalSize::new(extent.width, extent.height))
            // The swapchain is never recreated
            .with_resizable(false);
        let window = event_loop.create_window(attributes)?;

        let mut context = GraphicsContext::new(&window, self.config.clone())?;
        context.upload_textures(&mut self.materials, &self.model_dir);
        context.build_static_resources(&self.mesh, &self.materials)?;

        self.window = Some(window);
        self.context = Some(context);
        Ok(())
    }

    fn draw(&mut self) -> Result<()> {
        let context = self
            .context
            .as_mut()
            .ok_or_else(|| eyre!("redraw before the graphics context exists"))?;

        self.rotation.advance();
        let frame_data = self.camera.frame_data(self.config.aspect_ratio(), &self.rotation);
        let scene = self.camera.scene_properties();

        match context.render_frame(self.frame_number, &frame_data, &scene)? {
            FrameStatus::Presented { image_index } => {
                log::trace!("Frame {} presented image {}", self.frame_number, image_index);
            }
            FrameStatus::Dropped => self.dropped_frames += 1,
        }
        self.frame_number += 1;
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: Report) {
        log::error!("{:#}", error);
        self.error.get_or_insert(error);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.context.is_some() {
            return;
        }
        if let Err(e) = self.init_graphics(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.window.as_ref().map(Window::id) != Some(window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}, swapchain is kept", size.width, size.height);
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.draw() {
                    self.fail(event_loop, e);
                    return;
                }
                if self.frame_limit.is_some_and(|limit| self.frame_number >= limit) {
                    log::info!("Reached the frame limit");
                    event_loop.exit();
                }
            }
            WindowEvent::KeyboardInput {
                event:
                KeyEvent {
                    logical_key: Key::Named(NamedKey::Escape),
                    state: ElementState::Pressed,
                    ..
                },
                ..
            } => {
                event_loop.exit();
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if event_loop.exiting() {
            return;
        }
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}
