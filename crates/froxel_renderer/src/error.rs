use froxel_core::{ConfigError, PassGraphError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no compatible GPU adapter: {0}")]
    AdapterUnavailable(#[from] wgpu::RequestAdapterError),
    #[error("failed to open GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
    #[error("failed to create window surface: {0}")]
    SurfaceCreation(#[from] wgpu::CreateSurfaceError),
    #[error("surface supports no usable format")]
    SurfaceUnsupported,
    /// The per-cluster record arena exceeds what one storage binding may hold.
    #[error("cluster records need {required} bytes but the device binds at most {limit}")]
    ClusterStorageTooLarge { required: u64, limit: u64 },
    #[error("failed to acquire swapchain image: {0}")]
    Surface(#[from] wgpu::SurfaceError),
    /// A pass was handed a surface whose size differs from the output.
    #[error("{surface} is {found:?} but the output frame is {expected:?}")]
    TargetSizeMismatch {
        surface: &'static str,
        expected: (u32, u32),
        found: (u32, u32),
    },
    #[error(transparent)]
    PassGraph(#[from] PassGraphError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Fails with `TargetSizeMismatch` unless `found` equals `expected`.
pub(crate) fn ensure_extent(
    surface: &'static str,
    expected: (u32, u32),
    found: (u32, u32),
) -> Result<(), RenderError> {
    if expected == found {
        Ok(())
    } else {
        Err(RenderError::TargetSizeMismatch {
            surface,
            expected,
            found,
        })
    }
}
