//! Geometry the geometry pass draws. Loading assets is not the renderer's
//! job; callers hand over meshes and materials already in memory.

use glam::{Mat4, Quat, Vec3};

use crate::{
    material::{GpuMaterial, MaterialData},
    mesh::{GpuGeometry, MeshData, MeshInstance},
    texture::{GpuTexture, TextureData},
};

#[derive(Clone, Debug)]
pub struct SceneObject {
    pub name: String,
    pub mesh: usize,
    pub material: usize,
    pub transform: Mat4,
}

#[derive(Clone, Debug, Default)]
pub struct Scene {
    pub meshes: Vec<MeshData>,
    pub materials: Vec<MaterialData>,
    pub objects: Vec<SceneObject>,
}

impl Scene {
    pub fn add_mesh(&mut self, mesh: MeshData) -> usize {
        self.meshes.push(mesh);
        self.meshes.len() - 1
    }

    pub fn add_material(&mut self, material: MaterialData) -> usize {
        self.materials.push(material);
        self.materials.len() - 1
    }

    pub fn add_object(&mut self, name: &str, mesh: usize, material: usize, transform: Mat4) {
        self.objects.push(SceneObject {
            name: name.to_string(),
            mesh,
            material,
            transform,
        });
    }

    /// Checkered floor with rows of boxes and a few pillars, laid out inside
    /// the default light bounds.
    pub fn demo() -> Self {
        let mut scene = Self::default();
        let plane = scene.add_mesh(MeshData::plane(30.0, 15.0));
        let cube = scene.add_mesh(MeshData::cube());

        let floor = scene.add_material(MaterialData {
            name: "floor".to_string(),
            base_color: [1.0; 4],
            diffuse_texture: Some(TextureData::checker(
                "floor checker",
                64,
                2,
                [230, 230, 230, 255],
                [90, 90, 100, 255],
            )),
        });
        let palette = [
            scene.add_material(MaterialData::solid("stone", [0.8, 0.78, 0.72, 1.0])),
            scene.add_material(MaterialData::solid("clay", [0.85, 0.45, 0.3, 1.0])),
            scene.add_material(MaterialData::solid("slate", [0.4, 0.5, 0.65, 1.0])),
        ];

        scene.add_object("floor", plane, floor, Mat4::IDENTITY);

        for row in 0..3 {
            for column in 0..6 {
                let x = -4.0 + column as f32 * 3.0;
                let z = -4.0 + row as f32 * 4.0;
                let height = 0.5 + ((row * 6 + column) % 4) as f32 * 0.5;
                let transform = Mat4::from_scale_rotation_translation(
                    Vec3::new(1.2, height, 1.2),
                    Quat::from_rotation_y(0.3 * (row + column) as f32),
                    Vec3::new(x, height * 0.5, z),
                );
                let material = palette[(row + column) % palette.len()];
                scene.add_object(&format!("box {row}x{column}"), cube, material, transform);
            }
        }

        for (i, z) in [-5.0, 5.0].into_iter().enumerate() {
            let transform = Mat4::from_scale_rotation_translation(
                Vec3::new(0.8, 8.0, 0.8),
                Quat::IDENTITY,
                Vec3::new(10.0, 4.0, z),
            );
            scene.add_object(&format!("pillar {i}"), cube, palette[0], transform);
        }

        scene
    }
}

/// Device copies of every mesh, material and object transform in a scene.
pub struct GpuScene {
    pub geometries: Vec<GpuGeometry>,
    pub materials: Vec<GpuMaterial>,
    pub instances: Vec<GpuSceneObject>,
    _fallback_texture: GpuTexture,
}

pub struct GpuSceneObject {
    pub mesh: usize,
    pub material: usize,
    pub instance: MeshInstance,
}

impl GpuScene {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        scene: &Scene,
        material_layout: &wgpu::BindGroupLayout,
        mesh_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        // 1x1 white pixel for untextured materials.
        let fallback = GpuTexture::from_image(
            device,
            queue,
            &TextureData::solid("Default White Pixel", [255, 255, 255, 255]),
            Some("Default White Texture"),
        );

        let geometries = scene
            .meshes
            .iter()
            .map(|mesh| GpuGeometry::new(device, mesh))
            .collect();
        let materials = scene
            .materials
            .iter()
            .map(|material| GpuMaterial::new(device, queue, material_layout, material, &fallback))
            .collect();
        let instances = scene
            .objects
            .iter()
            .map(|object| GpuSceneObject {
                mesh: object.mesh,
                material: object.material,
                instance: MeshInstance::new(device, mesh_layout, object.transform),
            })
            .collect();

        log::info!(
            "uploaded scene: {} meshes, {} materials, {} objects",
            scene.meshes.len(),
            scene.materials.len(),
            scene.objects.len()
        );

        Self {
            geometries,
            materials,
            instances,
            _fallback_texture: fallback,
        }
    }
}
