pub mod camera;
pub mod config;
pub mod pipeline;
pub mod time;

pub use config::{ConfigError, DepthSlicing, RenderConfig};
pub use pipeline::{PassExecutor, PassGraph, PassGraphError, PassId, PassNode, ResourceId, Schedule};
