use std::sync::Arc;

use froxel_core::time::Time;
use thiserror::Error;
use winit::{
    application::ApplicationHandler,
    error::{EventLoopError, OsError},
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("event loop failed: {0}")]
    EventLoop(#[from] EventLoopError),
    #[error("failed to create window: {0}")]
    CreateWindow(#[from] OsError),
    /// The application refused to start or failed mid-frame.
    #[error("application error: {0}")]
    App(Box<dyn std::error::Error>),
}

/// What the window loop drives. Errors returned from any hook stop the loop
/// and surface from [`run_froxel_app`].
pub trait WindowApp {
    type Error: std::error::Error + 'static;

    /// Called once, after the window exists.
    fn resumed(&mut self, window: Arc<Window>) -> Result<(), Self::Error>;

    fn resized(&mut self, width: u32, height: u32);

    fn redraw(&mut self, time: &Time) -> Result<(), Self::Error>;

    fn key_pressed(&mut self, _code: KeyCode) {}
}

// Holds the app while waiting for the OS to hand out a window
struct FroxelRunner<A: WindowApp> {
    app: A,
    title: String,
    window: Option<Arc<Window>>,
    time: Time,
    error: Option<WindowError>,
}

impl<A: WindowApp> FroxelRunner<A> {
    fn new(app: A, title: &str) -> Self {
        Self {
            app,
            title: title.to_string(),
            window: None,
            time: Time::default(),
            error: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: WindowError) {
        log::error!("{error}");
        self.error = Some(error);
        event_loop.exit();
    }
}

impl<A: WindowApp> ApplicationHandler for FroxelRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match event_loop
            .create_window(Window::default_attributes().with_title(self.title.as_str()))
        {
            Ok(window) => Arc::new(window),
            Err(err) => return self.fail(event_loop, err.into()),
        };
        log::info!("window created: {:?}", window.inner_size());

        if let Err(err) = self.app.resumed(window.clone()) {
            return self.fail(event_loop, WindowError::App(Box::new(err)));
        }
        self.window = Some(window);
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                if code == KeyCode::Escape {
                    event_loop.exit();
                } else {
                    self.app.key_pressed(code);
                }
            }
            WindowEvent::Resized(size) => self.app.resized(size.width, size.height),
            WindowEvent::CloseRequested => {
                log::info!("close requested; stopping");
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                self.time.update();

                if let Err(err) = self.app.redraw(&self.time) {
                    return self.fail(event_loop, WindowError::App(Box::new(err)));
                }

                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => (),
        }
    }
}

/// Opens a window titled `title` and runs `app` until the window closes or
/// a hook fails.
pub fn run_froxel_app<A: WindowApp>(app: A, title: &str) -> Result<(), WindowError> {
    let event_loop = EventLoop::new()?;

    // Redraw continuously; the lights move every frame.
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = FroxelRunner::new(app, title);
    event_loop.run_app(&mut runner)?;

    match runner.error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
