use froxel_core::camera::Camera;
use wgpu::util::DeviceExt;

use crate::light::GpuLightSet;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub inv_proj: [[f32; 4]; 4],
    pub position: [f32; 4], // .w unused
    pub near: f32,
    pub far: f32,
    pub _padding: [f32; 2],
}

impl From<&Camera> for CameraUniforms {
    fn from(camera: &Camera) -> Self {
        Self {
            view_proj: camera.compute_view_projection_matrix().to_cols_array_2d(),
            view: camera.compute_view_matrix().to_cols_array_2d(),
            inv_proj: camera.compute_projection_matrix().inverse().to_cols_array_2d(),
            position: camera.position.extend(1.0).to_array(),
            near: camera.near,
            far: camera.far,
            _padding: [0.0; 2],
        }
    }
}

/// Group 0 of every pipeline: camera uniforms and the light set.
pub struct GlobalResources {
    pub layout: wgpu::BindGroupLayout,
    pub bind_group: wgpu::BindGroup,
    cam_buffer: wgpu::Buffer,
}

impl GlobalResources {
    pub fn new(device: &wgpu::Device, camera: &Camera, light_set: &GpuLightSet) -> Self {
        let global_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Global Bind Group Layout"),
            entries: &[
                // --- BINDING 0: Camera ---
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX
                        | wgpu::ShaderStages::FRAGMENT
                        | wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // --- BINDING 1: Light Set ---
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT | wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::bytes_of(&CameraUniforms::from(camera)),
            // COPY_DST so update_camera can overwrite it every frame.
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let global_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Global Bind Group"),
            layout: &global_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: light_set.buffer.as_entire_binding(),
                },
            ],
        });

        Self {
            layout: global_layout,
            bind_group: global_bind_group,
            cam_buffer: camera_buffer,
        }
    }

    pub fn update_camera(&self, queue: &wgpu::Queue, camera: &Camera) {
        queue.write_buffer(
            &self.cam_buffer,
            0,
            bytemuck::bytes_of(&CameraUniforms::from(camera)),
        );
    }
}
