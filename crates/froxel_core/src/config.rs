//! Render configuration. Everything here is fixed once the renderer is
//! built; nothing is mutated per frame except the active light count, which
//! the light store owns after initialization.

use std::path::{Path, PathBuf};

use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::camera::Camera;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// How the view-space depth range is cut into cluster slices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepthSlicing {
    Linear,
    /// Slice thickness grows with distance, matching perspective foreshortening.
    #[default]
    Logarithmic,
}

impl DepthSlicing {
    /// Value the shaders switch on.
    pub fn shader_id(self) -> u32 {
        match self {
            DepthSlicing::Linear => 0,
            DepthSlicing::Logarithmic => 1,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    pub dims: [u32; 3],
    pub max_lights_per_cluster: u32,
    /// View-space distance of the far face of the last depth slice.
    pub max_depth: f32,
    pub depth_slicing: DepthSlicing,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            dims: [32, 16, 64],
            max_lights_per_cluster: 511,
            max_depth: 20.0,
            depth_slicing: DepthSlicing::Logarithmic,
        }
    }
}

impl ClusterSettings {
    pub fn cluster_count(&self) -> usize {
        self.dims.iter().map(|&d| d as usize).product()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LightSettings {
    pub capacity: u32,
    pub active_count: u32,
    pub radius: f32,
    pub intensity: f32,
    pub seed: u64,
}

impl Default for LightSettings {
    fn default() -> Self {
        Self {
            capacity: 5000,
            active_count: 500,
            radius: 2.0,
            intensity: 0.1,
            seed: 0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionSettings {
    /// Lights handled by one parallel work item.
    pub batch_size: u32,
    pub bounds_min: Vec3,
    pub bounds_max: Vec3,
    pub speed: f32,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            batch_size: 128,
            bounds_min: Vec3::new(-14.0, -1.0, -6.0),
            bounds_max: Vec3::new(14.0, 20.0, 6.0),
            speed: 1.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
    pub target: Vec3,
}

impl Default for CameraSettings {
    fn default() -> Self {
        let camera = Camera::default();
        Self {
            fov_y_degrees: camera.fov_y.to_degrees(),
            near: camera.near,
            far: camera.far,
            position: camera.position,
            target: camera.target,
        }
    }
}

impl CameraSettings {
    pub fn to_camera(&self, width: u32, height: u32) -> Camera {
        let mut camera = Camera {
            fov_y: self.fov_y_degrees.to_radians(),
            near: self.near,
            far: self.far,
            position: self.position,
            target: self.target,
            ..Camera::default()
        };
        camera.set_viewport(width, height);
        camera
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub cluster: ClusterSettings,
    pub lights: LightSettings,
    pub motion: MotionSettings,
    pub camera: CameraSettings,
    pub clear_color: [f32; 4],
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            cluster: ClusterSettings::default(),
            lights: LightSettings::default(),
            motion: MotionSettings::default(),
            camera: CameraSettings::default(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl RenderConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: RenderConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Checks the invariants the renderer sizes its buffers from.
    /// `lights.active_count` is deliberately not checked: it is clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster.dims.contains(&0) {
            return Err(invalid("cluster.dims", "every grid dimension must be non-zero"));
        }
        if self.cluster.max_lights_per_cluster == 0 {
            return Err(invalid("cluster.max_lights_per_cluster", "must be at least 1"));
        }
        // Shaders address cells and record slots with u32 indices.
        let cells = self.cluster.dims.iter().try_fold(1u32, |acc, &d| acc.checked_mul(d));
        let Some(cells) = cells else {
            return Err(invalid("cluster.dims", "cell count overflows u32"));
        };
        let slots = self
            .cluster
            .max_lights_per_cluster
            .checked_add(1)
            .and_then(|stride| stride.checked_mul(cells));
        if slots.is_none() {
            return Err(invalid(
                "cluster.max_lights_per_cluster",
                "record slots across all cells overflow u32",
            ));
        }
        if self.lights.capacity == 0 {
            return Err(invalid("lights.capacity", "must be at least 1"));
        }
        if !(self.lights.radius > 0.0) {
            return Err(invalid("lights.radius", "must be positive"));
        }
        if self.motion.batch_size == 0 {
            return Err(invalid("motion.batch_size", "must be at least 1"));
        }
        if self.motion.bounds_min.cmpgt(self.motion.bounds_max).any() {
            return Err(invalid("motion.bounds_min", "must not exceed motion.bounds_max"));
        }
        if !(self.camera.near > 0.0 && self.camera.far > self.camera.near) {
            return Err(invalid("camera.near", "require 0 < near < far"));
        }
        if !(self.cluster.max_depth > self.camera.near) {
            return Err(invalid("cluster.max_depth", "must lie beyond camera.near"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}
