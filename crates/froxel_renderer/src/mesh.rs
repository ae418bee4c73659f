use std::mem;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};
use wgpu::util::DeviceExt;

// #[repr(C)] keeps the field order the shaders expect.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct MeshUniform {
    // Object -> world.
    pub model: [[f32; 4]; 4],

    // Transpose(Inverse(Model)), so non-uniform scale doesn't skew normals.
    // 4x4 for alignment even though 3x3 would do.
    pub normal_matrix: [[f32; 4]; 4],
}

impl MeshUniform {
    pub fn from_transform(model_matrix: Mat4) -> Self {
        let normal_matrix = model_matrix.inverse().transpose();

        Self {
            model: model_matrix.to_cols_array_2d(),
            normal_matrix: normal_matrix.to_cols_array_2d(),
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0, // @location(0) in shader
                    format: wgpu::VertexFormat::Float32x3, // position
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: (mem::size_of::<[f32; 3]>() * 2) as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

/// Indexed triangle list. Front faces wind counter-clockwise.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Unit cube centered on the origin.
    pub fn cube() -> Self {
        let mut mesh = Self::default();
        for normal in [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z] {
            let u = if normal.y.abs() > 0.5 { Vec3::X } else { Vec3::Y };
            let v = normal.cross(u);
            mesh.push_quad(normal * 0.5, u * 0.5, v * 0.5, normal, 1.0);
        }
        mesh
    }

    /// Square in the XZ plane facing +Y, `size` on a side. UVs repeat
    /// `uv_repeat` times across it.
    pub fn plane(size: f32, uv_repeat: f32) -> Self {
        let mut mesh = Self::default();
        let half = size * 0.5;
        mesh.push_quad(Vec3::ZERO, Vec3::X * half, Vec3::NEG_Z * half, Vec3::Y, uv_repeat);
        mesh
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// `u x v` must point along `normal` for the quad to face it.
    fn push_quad(&mut self, center: Vec3, u: Vec3, v: Vec3, normal: Vec3, uv_repeat: f32) {
        let base = self.vertices.len() as u32;
        for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let uv = (Vec2::new(su, -sv) * 0.5 + 0.5) * uv_repeat;
            self.vertices.push(Vertex {
                position: (center + u * su + v * sv).to_array(),
                normal: normal.to_array(),
                uv: uv.to_array(),
            });
        }
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
}

pub struct GpuGeometry {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

impl GpuGeometry {
    pub fn new(device: &wgpu::Device, data: &MeshData) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Vertex Buffer"),
            contents: bytemuck::cast_slice(&data.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Index Buffer"),
            contents: bytemuck::cast_slice(&data.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            vertex_buffer,
            index_buffer,
            index_count: data.indices.len() as u32,
        }
    }
}

/// Per-object transform uniform and the group 2 bind group pointing at it.
pub struct MeshInstance {
    pub bind_group: wgpu::BindGroup,
    pub buffer: wgpu::Buffer,
}

impl MeshInstance {
    pub fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, transform: Mat4) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Uniform Buffer"),
            contents: bytemuck::bytes_of(&MeshUniform::from_transform(transform)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Mesh Bind Group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });

        Self { bind_group, buffer }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_faces_wind_counter_clockwise_from_outside() {
        let cube = MeshData::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.triangle_count(), 12);

        for tri in cube.indices.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| Vec3::from(cube.vertices[i as usize].position));
            let face_normal = (b - a).cross(c - a).normalize();
            let stored = Vec3::from(cube.vertices[tri[0] as usize].normal);
            assert!(face_normal.dot(stored) > 0.99);
            assert!(a.dot(stored) > 0.0, "normal should point away from the center");
        }
    }

    #[test]
    fn plane_faces_up() {
        let plane = MeshData::plane(10.0, 4.0);
        let v: Vec<Vec3> = plane.vertices.iter().map(|v| Vec3::from(v.position)).collect();
        let n = (v[1] - v[0]).cross(v[2] - v[0]).normalize();
        assert!(n.dot(Vec3::Y) > 0.99);
        assert!(plane.vertices.iter().all(|v| v.uv[0] <= 4.0 && v.uv[1] <= 4.0));
    }

    #[test]
    fn normal_matrix_undoes_scale() {
        let uniform = MeshUniform::from_transform(Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0)));
        let normal = Mat4::from_cols_array_2d(&uniform.normal_matrix).transform_vector3(Vec3::X);
        assert!((normal.x - 0.5).abs() < 1e-6);
    }
}
