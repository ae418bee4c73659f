use std::{process::ExitCode, sync::Arc};

use froxel_core::{RenderConfig, time::Time};
use froxel_renderer::{ClusteredDeferredRenderer, RenderError, Scene};
use froxel_window::{WindowApp, run_froxel_app};
use winit::{keyboard::KeyCode, window::Window};

/// Lights added or removed per arrow key press.
const LIGHT_STEP: u32 = 100;

struct FroxelApp {
    config: RenderConfig,
    scene: Scene,
    renderer: Option<ClusteredDeferredRenderer>,
}

impl WindowApp for FroxelApp {
    type Error = RenderError;

    fn resumed(&mut self, window: Arc<Window>) -> Result<(), RenderError> {
        let size = window.inner_size();
        let renderer = ClusteredDeferredRenderer::new(
            window,
            size.width,
            size.height,
            self.config.clone(),
            &self.scene,
        )?;
        log::info!(
            "scene: {} objects, {} meshes, {} materials",
            self.scene.objects.len(),
            self.scene.meshes.len(),
            self.scene.materials.len()
        );
        self.renderer = Some(renderer);
        Ok(())
    }

    fn resized(&mut self, width: u32, height: u32) {
        if let Some(renderer) = &mut self.renderer {
            renderer.resize(width, height);
        }
    }

    fn redraw(&mut self, time: &Time) -> Result<(), RenderError> {
        match &mut self.renderer {
            Some(renderer) => renderer.render(time),
            None => Ok(()),
        }
    }

    fn key_pressed(&mut self, code: KeyCode) {
        let Some(renderer) = &mut self.renderer else {
            return;
        };
        let current = renderer.active_lights();
        match code {
            KeyCode::ArrowUp => {
                renderer.set_active_lights(current.saturating_add(LIGHT_STEP));
            }
            KeyCode::ArrowDown => {
                renderer.set_active_lights(current.saturating_sub(LIGHT_STEP));
            }
            _ => {}
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => match RenderConfig::from_json_file(&path) {
            Ok(config) => {
                log::info!("loaded config from {path}");
                config
            }
            Err(err) => {
                log::error!("{err}");
                return ExitCode::FAILURE;
            }
        },
        None => RenderConfig::default(),
    };

    let app = FroxelApp {
        config,
        scene: Scene::demo(),
        renderer: None,
    };

    match run_froxel_app(app, "Froxel") {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
