use glam::{Vec2, Vec4};
use wgpu::util::DeviceExt;

use crate::texture::{GpuTexture, TextureData};

/// Diffuse-only material: base color times an optional texture.
#[derive(Clone, Debug)]
pub struct MaterialData {
    pub name: String,
    pub base_color: [f32; 4],
    pub diffuse_texture: Option<TextureData>,
}

impl MaterialData {
    pub fn solid(name: &str, base_color: [f32; 4]) -> Self {
        Self {
            name: name.to_string(),
            base_color,
            diffuse_texture: None,
        }
    }

    /// What the geometry pass writes into the diffuse G-buffer target.
    pub fn sample_diffuse(&self, uv: Vec2) -> Vec4 {
        let base = Vec4::from(self.base_color);
        match &self.diffuse_texture {
            Some(texture) => base * texture.sample(uv),
            None => base,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuMaterialUniform {
    pub base_color: [f32; 4], // 16 bytes
}

impl From<&MaterialData> for GpuMaterialUniform {
    fn from(data: &MaterialData) -> Self {
        Self {
            base_color: data.base_color,
        }
    }
}

pub struct GpuMaterial {
    pub bind_group: wgpu::BindGroup,
    // Kept alive for the bind group.
    _uniform_buffer: wgpu::Buffer,
    _texture: Option<GpuTexture>,
}

impl GpuMaterial {
    /// Materials without a texture bind `fallback` (a 1x1 white pixel).
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        data: &MaterialData,
        fallback: &GpuTexture,
    ) -> Self {
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Material Uniforms"),
            contents: bytemuck::bytes_of(&GpuMaterialUniform::from(data)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let texture = data
            .diffuse_texture
            .as_ref()
            .map(|image| GpuTexture::from_image(device, queue, image, Some(&image.name)));
        let diffuse = texture.as_ref().unwrap_or(fallback);

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Material Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&diffuse.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&diffuse.sampler),
                },
            ],
        });

        Self {
            bind_group,
            _uniform_buffer: uniform_buffer,
            _texture: texture,
        }
    }
}
