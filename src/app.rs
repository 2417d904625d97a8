//! Window loop.
//!
//! The mouse wheel and the page keys move a [`ScrollTrack`]; the digit keys
//! select a section directly; `R` tears the session down. Every redraw runs
//! one [`Scene::step`] and hands the result to the [`Renderer`].

use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use crate::config::Config;
use crate::error::RunError;
use crate::gpu::Renderer;
use crate::input::PointerInput;
use crate::scene::{Scene, SectionSignal};
use crate::scroll::ScrollTrack;
use crate::section::SectionKey;
use crate::time::FrameClock;

/// Pages scrolled per wheel line.
const WHEEL_PAGES: f32 = 0.1;
const ARROW_PAGES: f32 = 0.25;

/// Open a window and run until it closes.
pub fn run(config: Config) -> Result<(), RunError> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

pub struct App {
    config: Config,
    scene: Scene,
    scroll: ScrollTrack,
    pointer: PointerInput,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    /// Wall-clock timing; the scene keeps its own animation clock.
    wall: FrameClock,
    /// Startup failure raised inside the event loop.
    error: Option<RunError>,
}

impl App {
    pub fn new(config: Config) -> Self {
        let scene = Scene::with_file_assets(&config);
        Self {
            config,
            scene,
            scroll: ScrollTrack::default(),
            pointer: PointerInput::new(),
            window: None,
            renderer: None,
            wall: FrameClock::new(),
            error: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<(), RunError> {
        let window_attrs = Window::default_attributes()
            .with_title("vatflow")
            .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));

        let window = Arc::new(event_loop.create_window(window_attrs)?);
        let size = window.inner_size();
        let renderer = pollster::block_on(Renderer::new(window.clone(), &self.config))?;

        self.pointer.set_surface_size(size.width, size.height);
        self.scene.resize(size.width, size.height);
        window.request_redraw();
        self.window = Some(window);
        self.renderer = Some(renderer);
        self.wall = FrameClock::new();
        Ok(())
    }

    fn signal_all(&mut self, signals: Vec<SectionSignal>) {
        for signal in signals {
            log::debug!("{:?}", signal);
            self.scene.handle_signal(signal);
        }
    }

    fn scroll_by(&mut self, pages: f32) {
        let signals = self.scroll.scroll_by(pages);
        self.signal_all(signals);
    }

    fn handle_key(&mut self, event: &KeyEvent) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        let PhysicalKey::Code(code) = event.physical_key else {
            return;
        };
        let digit = match code {
            KeyCode::Digit1 => Some(0),
            KeyCode::Digit2 => Some(1),
            KeyCode::Digit3 => Some(2),
            KeyCode::Digit4 => Some(3),
            KeyCode::Digit5 => Some(4),
            KeyCode::Digit6 => Some(5),
            KeyCode::Digit7 => Some(6),
            KeyCode::Digit8 => Some(7),
            KeyCode::Digit9 => Some(8),
            _ => None,
        };
        if let Some(index) = digit {
            if let Some(&key) = SectionKey::ALL.get(index) {
                self.scene.handle_signal(SectionSignal::Select(key));
            }
            return;
        }
        match code {
            KeyCode::ArrowDown => self.scroll_by(ARROW_PAGES),
            KeyCode::ArrowUp => self.scroll_by(-ARROW_PAGES),
            KeyCode::PageDown | KeyCode::Space => self.scroll_by(1.0),
            KeyCode::PageUp => self.scroll_by(-1.0),
            KeyCode::KeyR => {
                self.scene.teardown();
                self.scroll = ScrollTrack::default();
            }
            _ => {}
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let dt = self.wall.tick();
        if self.wall.frame() % 600 == 0 {
            log::debug!("{:.1} fps", self.wall.fps());
        }

        let state = self.scene.step(dt, self.pointer.sample());
        let Some(renderer) = &mut self.renderer else {
            return;
        };
        match renderer.render(&state) {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("surface lost, reconfiguring");
                renderer.reconfigure();
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("out of GPU memory, exiting");
                event_loop.exit();
            }
            Err(e) => log::error!("render error: {:?}", e),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            log::error!("{}", e);
            self.error = Some(e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        self.pointer.handle_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(physical_size) => {
                self.scene.resize(physical_size.width, physical_size.height);
                if let Some(renderer) = &mut self.renderer {
                    renderer.resize(physical_size.width, physical_size.height);
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let pages = match delta {
                    MouseScrollDelta::LineDelta(_, y) => -y * WHEEL_PAGES,
                    MouseScrollDelta::PixelDelta(pos) => {
                        let height = self.scene.viewport().1 as f32;
                        -(pos.y as f32) / height
                    }
                };
                self.scroll_by(pages);
            }
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(&event),
            WindowEvent::RedrawRequested => {
                self.redraw(event_loop);
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.scene.teardown();
    }
}
