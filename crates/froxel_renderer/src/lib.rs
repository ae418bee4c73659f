//! Clustered deferred renderer.
//!
//! Per frame: lights move, lights are binned into a 3-D grid of view-space
//! cells, the scene is rasterized into a G-buffer, and a full-screen pass
//! shades every pixel with only the lights binned to its cell. The same
//! pass schedule runs on the GPU ([`ClusteredDeferredRenderer`]) or on the
//! host ([`SoftwareRenderer`]).

pub mod cluster;
pub mod deferred;
pub mod error;
pub mod frame;
pub mod gbuffer;
pub mod global_resources;
pub mod light;
pub mod material;
pub mod mesh;
pub mod motion;
pub mod programs;
pub mod render;
pub mod scene;
pub mod software;
pub mod texture;

pub use cluster::{ClusterCoord, ClusterGrid, ClusterRecords, assign_lights};
pub use error::RenderError;
pub use light::{Light, LightStore};
pub use motion::LightMotion;
pub use render::ClusteredDeferredRenderer;
pub use scene::Scene;
pub use software::{FrameImage, SoftwareGBuffer, SoftwareRenderer};
