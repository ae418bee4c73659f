use wgpu::TextureFormat;

use crate::{
    error::{RenderError, ensure_extent},
    texture::TextureHelper,
};

pub const POSITION_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
pub const NORMAL_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
pub const UV_FORMAT: TextureFormat = TextureFormat::Rg16Float;
pub const DIFFUSE_FORMAT: TextureFormat = TextureFormat::Rgba16Float;

/// Color target formats in attachment order.
pub const COLOR_FORMATS: [TextureFormat; 4] =
    [POSITION_FORMAT, NORMAL_FORMAT, UV_FORMAT, DIFFUSE_FORMAT];

struct Target {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl Target {
    fn new(device: &wgpu::Device, width: u32, height: u32, format: TextureFormat, label: &str) -> Self {
        let (texture, view) = TextureHelper::create_render_target(device, width, height, format, label);
        Self {
            _texture: texture,
            view,
        }
    }
}

/// Geometry pass outputs. Every surface is allocated at one size; a resize
/// replaces the whole set, including the bind group the lighting pass reads
/// it through.
pub struct GBuffer {
    width: u32,
    height: u32,
    position: Target,
    normal: Target,
    uv: Target,
    diffuse: Target,
    depth: Target,
    pub bind_group: wgpu::BindGroup,
}

impl GBuffer {
    pub fn bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        let color = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                multisampled: false,
                view_dimension: wgpu::TextureViewDimension::D2,
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
            },
            count: None,
        };

        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("G-Buffer Bind Group Layout"),
            entries: &[
                color(0), // position
                color(1), // normal
                color(2), // uv
                color(3), // diffuse
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Depth,
                    },
                    count: None,
                },
            ],
        })
    }

    pub fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, width: u32, height: u32) -> Self {
        let position = Target::new(device, width, height, POSITION_FORMAT, "G-Buffer Position");
        let normal = Target::new(device, width, height, NORMAL_FORMAT, "G-Buffer Normal");
        let uv = Target::new(device, width, height, UV_FORMAT, "G-Buffer UV");
        let diffuse = Target::new(device, width, height, DIFFUSE_FORMAT, "G-Buffer Diffuse");
        let depth = Target::new(
            device,
            width,
            height,
            TextureHelper::DEPTH_FORMAT,
            "G-Buffer Depth",
        );

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("G-Buffer Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&position.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&normal.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&uv.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&diffuse.view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&depth.view),
                },
            ],
        });

        log::info!("allocated G-buffer at {width}x{height}");

        Self {
            width,
            height,
            position,
            normal,
            uv,
            diffuse,
            depth,
            bind_group,
        }
    }

    pub fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Fails unless the surfaces match the output frame exactly.
    pub fn ensure_matches(&self, width: u32, height: u32) -> Result<(), RenderError> {
        ensure_extent("G-buffer", (width, height), self.extent())
    }

    pub fn color_views(&self) -> [&wgpu::TextureView; 4] {
        [
            &self.position.view,
            &self.normal.view,
            &self.uv.view,
            &self.diffuse.view,
        ]
    }

    pub fn depth_view(&self) -> &wgpu::TextureView {
        &self.depth.view
    }
}
