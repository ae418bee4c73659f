pub mod clustering_program;
pub mod geometry_program;
pub mod lighting_program;
pub mod move_lights_program;

pub use clustering_program::ClusteringProgram;
pub use geometry_program::GeometryProgram;
pub use lighting_program::LightingProgram;
pub use move_lights_program::MoveLightsProgram;

/// Holds common WGPU references to simplify function signatures.
pub struct GpuProgramRenderContext<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub format: wgpu::TextureFormat, // The output format (Swapchain)
}

/// Shared WGSL prelude: uniform layouts, light set, cluster math.
pub(crate) const COMMON_WGSL: &str = include_str!("shaders/common.wgsl");

/// Prepends the shared prelude to a shader body.
pub(crate) fn shader_source(body: &str) -> String {
    format!("{COMMON_WGSL}\n{body}")
}

pub(crate) fn create_shader(ctx: &GpuProgramRenderContext, label: &str, body: &str) -> wgpu::ShaderModule {
    let source = shader_source(body);
    ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    })
}

pub trait GpuProgram {
    /// Data required to initialize the pipeline (e.g., global layouts)
    type InitData<'a>;

    /// Data required to draw a frame (bind groups, scene)
    type DrawData<'a>;

    /// Compiles shaders, creates pipeline layouts and the pipeline itself.
    fn new(ctx: &GpuProgramRenderContext, init_data: Self::InitData<'_>) -> Self;

    /// Encodes this program's draws into an open render pass.
    fn record(&self, rpass: &mut wgpu::RenderPass<'_>, data: Self::DrawData<'_>);
}

pub trait ComputeProgram {
    type InitData<'a>;

    type DispatchData<'a>;

    fn new(ctx: &GpuProgramRenderContext, init_data: Self::InitData<'_>) -> Self;

    /// Encodes this program's dispatches into an open compute pass.
    fn dispatch(&self, cpass: &mut wgpu::ComputePass<'_>, data: Self::DispatchData<'_>);
}

pub(crate) fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub(crate) fn storage_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    read_only: bool,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
