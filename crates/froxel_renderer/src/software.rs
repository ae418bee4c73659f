//! Host-memory executor of the frame schedule. Runs the same passes as the
//! wgpu path with rayon workers standing in for shader invocations, so the
//! whole pipeline can be rendered and inspected without a GPU.

use froxel_core::{PassExecutor, PassNode, RenderConfig, Schedule, camera::Camera};
use glam::{Mat4, Vec2, Vec3, Vec4, Vec4Swizzles};
use half::f16;
use rayon::prelude::*;

use crate::{
    cluster::{ClusterGrid, ClusterRecords, assign_lights},
    deferred::{BACKGROUND_DEPTH, GBufferTexel, LightingInputs, shade_pixel},
    error::{RenderError, ensure_extent},
    frame::{FramePass, build_frame_schedule},
    light::LightStore,
    motion::LightMotion,
    scene::Scene,
};

/// Host G-buffer. Color surfaces hold half floats like the rgba16float /
/// rg16float device targets; depth is f32 like Depth32Float.
#[derive(Clone, Debug)]
pub struct SoftwareGBuffer {
    width: u32,
    height: u32,
    position: Vec<[f16; 4]>,
    normal: Vec<[f16; 4]>,
    uv: Vec<[f16; 2]>,
    diffuse: Vec<[f16; 4]>,
    depth: Vec<f32>,
}

fn pack4(v: Vec4) -> [f16; 4] {
    v.to_array().map(f16::from_f32)
}

fn unpack4(v: [f16; 4]) -> Vec4 {
    Vec4::from_array(v.map(f16::to_f32))
}

impl SoftwareGBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        let len = (width * height) as usize;
        Self {
            width,
            height,
            position: vec![[f16::ZERO; 4]; len],
            normal: vec![[f16::ZERO; 4]; len],
            uv: vec![[f16::ZERO; 2]; len],
            diffuse: vec![[f16::ZERO; 4]; len],
            depth: vec![BACKGROUND_DEPTH; len],
        }
    }

    pub fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Clear-to-zero for color, far depth for depth.
    pub fn clear(&mut self) {
        self.position.fill([f16::ZERO; 4]);
        self.normal.fill([f16::ZERO; 4]);
        self.uv.fill([f16::ZERO; 2]);
        self.diffuse.fill([f16::ZERO; 4]);
        self.depth.fill(BACKGROUND_DEPTH);
    }

    pub fn depth(&self, x: u32, y: u32) -> f32 {
        self.depth[(y * self.width + x) as usize]
    }

    pub fn texel(&self, x: u32, y: u32) -> GBufferTexel {
        let i = (y * self.width + x) as usize;
        let uv = self.uv[i];
        GBufferTexel {
            position: unpack4(self.position[i]).xyz(),
            normal: unpack4(self.normal[i]).xyz(),
            uv: Vec2::new(uv[0].to_f32(), uv[1].to_f32()),
            diffuse: unpack4(self.diffuse[i]),
        }
    }
}

/// RGBA f32 frame, row-major from the top-left.
#[derive(Clone, Debug)]
pub struct FrameImage {
    width: u32,
    height: u32,
    pixels: Vec<Vec4>,
}

impl FrameImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![Vec4::ZERO; (width * height) as usize],
        }
    }

    pub fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Vec4 {
        self.pixels[(y * self.width + x) as usize]
    }

    pub fn pixels(&self) -> &[Vec4] {
        &self.pixels
    }
}

/// Post-projection vertex, attributes pre-divided by clip w.
#[derive(Clone, Copy)]
struct RasterVertex {
    screen: Vec2,
    depth: f32,
    inv_w: f32,
    position_w: Vec3,
    normal_w: Vec3,
    uv_w: Vec2,
}

struct RasterTriangle {
    v: [RasterVertex; 3],
    area: f32,
    material: usize,
    min: Vec2,
    max: Vec2,
}

fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Projects every scene triangle, dropping back faces and any triangle with
/// a vertex at or behind the camera plane (no clipping).
fn setup_triangles(scene: &Scene, view_proj: Mat4, viewport: Vec2) -> Vec<RasterTriangle> {
    let mut triangles = Vec::new();

    for object in &scene.objects {
        let Some(mesh) = scene.meshes.get(object.mesh) else {
            continue;
        };
        let normal_matrix = object.transform.inverse().transpose();

        let vertices: Vec<Option<RasterVertex>> = mesh
            .vertices
            .iter()
            .map(|vertex| {
                let world = object.transform.transform_point3(Vec3::from(vertex.position));
                let clip = view_proj * world.extend(1.0);
                if clip.w <= f32::EPSILON {
                    return None;
                }
                let inv_w = 1.0 / clip.w;
                let ndc = clip.xyz() * inv_w;
                let normal = normal_matrix.transform_vector3(Vec3::from(vertex.normal));
                Some(RasterVertex {
                    screen: Vec2::new(
                        (ndc.x * 0.5 + 0.5) * viewport.x,
                        (0.5 - ndc.y * 0.5) * viewport.y,
                    ),
                    depth: ndc.z,
                    inv_w,
                    position_w: world * inv_w,
                    normal_w: normal * inv_w,
                    uv_w: Vec2::from(vertex.uv) * inv_w,
                })
            })
            .collect();

        for tri in mesh.indices.chunks_exact(3) {
            let (Some(Some(a)), Some(Some(b)), Some(Some(c))) = (
                vertices.get(tri[0] as usize),
                vertices.get(tri[1] as usize),
                vertices.get(tri[2] as usize),
            ) else {
                continue;
            };
            // Counter-clockwise in NDC is clockwise once y points down.
            let area = edge(a.screen, b.screen, c.screen);
            if area >= 0.0 {
                continue;
            }
            triangles.push(RasterTriangle {
                v: [*a, *b, *c],
                area,
                material: object.material,
                min: a.screen.min(b.screen).min(c.screen),
                max: a.screen.max(b.screen).max(c.screen),
            });
        }
    }

    triangles
}

/// Everything the CPU passes read and write between frames.
pub struct SoftwareState {
    config: RenderConfig,
    camera: Camera,
    scene: Scene,
    lights: LightStore,
    motion: LightMotion,
    grid: ClusterGrid,
    records: ClusterRecords,
    gbuffer: SoftwareGBuffer,
    output: FrameImage,
    frame_delta: f32,
}

impl SoftwareState {
    fn viewport(&self) -> Vec2 {
        let (width, height) = self.output.extent();
        Vec2::new(width as f32, height as f32)
    }

    fn move_lights(&mut self) {
        self.motion.advance(&mut self.lights, self.frame_delta);
    }

    fn assign_clusters(&mut self) {
        assign_lights(
            &self.grid,
            self.camera.compute_view_matrix(),
            self.lights.active_lights(),
            &mut self.records,
        );
    }

    fn geometry(&mut self) -> Result<(), RenderError> {
        ensure_extent("G-buffer", self.output.extent(), self.gbuffer.extent())?;

        let viewport = self.viewport();
        let triangles = setup_triangles(&self.scene, self.camera.compute_view_projection_matrix(), viewport);
        let materials = &self.scene.materials;

        self.gbuffer.clear();
        let width = self.gbuffer.width as usize;
        let g = &mut self.gbuffer;

        g.position
            .par_chunks_mut(width)
            .zip(g.normal.par_chunks_mut(width))
            .zip(g.uv.par_chunks_mut(width))
            .zip(g.diffuse.par_chunks_mut(width))
            .zip(g.depth.par_chunks_mut(width))
            .enumerate()
            .for_each(|(y, ((((position, normal), uv), diffuse), depth))| {
                let py = y as f32 + 0.5;
                for tri in &triangles {
                    if py < tri.min.y || py > tri.max.y {
                        continue;
                    }
                    let x_start = (tri.min.x - 0.5).ceil().max(0.0) as usize;
                    let x_end = ((tri.max.x - 0.5).floor() as isize).min(width as isize - 1);
                    if x_end < x_start as isize {
                        continue;
                    }
                    let [a, b, c] = &tri.v;

                    for x in x_start..=x_end as usize {
                        let p = Vec2::new(x as f32 + 0.5, py);
                        let w0 = edge(b.screen, c.screen, p) / tri.area;
                        let w1 = edge(c.screen, a.screen, p) / tri.area;
                        let w2 = edge(a.screen, b.screen, p) / tri.area;
                        if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                            continue;
                        }

                        let z = w0 * a.depth + w1 * b.depth + w2 * c.depth;
                        if z < 0.0 || z >= depth[x] {
                            continue;
                        }

                        let inv_w = w0 * a.inv_w + w1 * b.inv_w + w2 * c.inv_w;
                        let interp = |fa: Vec3, fb: Vec3, fc: Vec3| (fa * w0 + fb * w1 + fc * w2) / inv_w;
                        let world = interp(a.position_w, b.position_w, c.position_w);
                        let n = interp(a.normal_w, b.normal_w, c.normal_w).normalize_or_zero();
                        let tex = (a.uv_w * w0 + b.uv_w * w1 + c.uv_w * w2) / inv_w;
                        let albedo = materials
                            .get(tri.material)
                            .map_or(Vec4::ONE, |material| material.sample_diffuse(tex));

                        depth[x] = z;
                        position[x] = pack4(world.extend(1.0));
                        normal[x] = pack4(n.extend(0.0));
                        uv[x] = [f16::from_f32(tex.x), f16::from_f32(tex.y)];
                        diffuse[x] = pack4(albedo);
                    }
                }
            });

        Ok(())
    }

    fn lighting(&mut self) -> Result<(), RenderError> {
        ensure_extent("G-buffer", self.output.extent(), self.gbuffer.extent())?;

        let inputs = LightingInputs {
            grid: &self.grid,
            records: &self.records,
            lights: self.lights.lights(),
            viewport: self.viewport(),
            near: self.camera.near,
            far: self.camera.far,
            clear_color: Vec4::from(self.config.clear_color),
        };
        let gbuffer = &self.gbuffer;
        let width = self.output.width as usize;

        self.output
            .pixels
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, out) in row.iter_mut().enumerate() {
                    let (x, y) = (x as u32, y as u32);
                    let pixel = Vec2::new(x as f32, y as f32);
                    *out = shade_pixel(&inputs, pixel, gbuffer.depth(x, y), &gbuffer.texel(x, y));
                }
            });

        Ok(())
    }
}

impl PassExecutor<FramePass> for SoftwareState {
    type Error = RenderError;

    fn execute(&mut self, pass: &PassNode<FramePass>) -> Result<(), RenderError> {
        match pass.payload() {
            FramePass::MoveLights => self.move_lights(),
            FramePass::AssignClusters => self.assign_clusters(),
            FramePass::Geometry => self.geometry()?,
            FramePass::Lighting => self.lighting()?,
        }
        Ok(())
    }
}

/// Headless clustered deferred renderer.
pub struct SoftwareRenderer {
    schedule: Schedule<FramePass>,
    state: SoftwareState,
}

impl SoftwareRenderer {
    pub fn new(config: RenderConfig, scene: Scene, width: u32, height: u32) -> Result<Self, RenderError> {
        config.validate()?;
        let schedule = build_frame_schedule()?;
        let (width, height) = (width.max(1), height.max(1));

        let camera = config.camera.to_camera(width, height);
        let grid = ClusterGrid::new(&config.cluster, &camera);
        let records = ClusterRecords::new(grid.cluster_count(), config.cluster.max_lights_per_cluster);
        let lights = LightStore::new(&config.lights, &config.motion);
        let motion = LightMotion::new(&config.motion);

        log::info!(
            "software renderer: {width}x{height}, {} of {} lights active",
            lights.active_count(),
            lights.capacity()
        );

        Ok(Self {
            schedule,
            state: SoftwareState {
                config,
                camera,
                scene,
                lights,
                motion,
                grid,
                records,
                gbuffer: SoftwareGBuffer::new(width, height),
                output: FrameImage::new(width, height),
                frame_delta: 0.0,
            },
        })
    }

    /// Reallocates every surface at the new size and rebuilds the grid for
    /// the new projection. Takes effect before the next geometry pass.
    pub fn resize(&mut self, width: u32, height: u32) {
        if (width, height) == self.state.output.extent() || width == 0 || height == 0 {
            return;
        }
        log::info!("resizing software surfaces to {width}x{height}");
        let state = &mut self.state;
        state.camera.set_viewport(width, height);
        state.grid = ClusterGrid::new(&state.config.cluster, &state.camera);
        state.gbuffer = SoftwareGBuffer::new(width, height);
        state.output = FrameImage::new(width, height);
    }

    /// Replaces the G-buffer with externally allocated surfaces. A size that
    /// doesn't match the output fails the next frame.
    pub fn attach_gbuffer(&mut self, gbuffer: SoftwareGBuffer) {
        self.state.gbuffer = gbuffer;
    }

    /// Moves the camera; the grid follows the new projection.
    pub fn set_camera(&mut self, mut camera: Camera) {
        let (width, height) = self.state.output.extent();
        camera.set_viewport(width, height);
        self.state.grid = ClusterGrid::new(&self.state.config.cluster, &camera);
        self.state.camera = camera;
    }

    pub fn set_active_lights(&mut self, count: u32) -> u32 {
        self.state.lights.set_active_count(count)
    }

    /// Runs one whole frame. On error the frame is abandoned.
    pub fn render_frame(&mut self, dt: f32) -> Result<&FrameImage, RenderError> {
        self.state.frame_delta = dt;
        self.schedule.run(&mut self.state)?;
        Ok(&self.state.output)
    }

    pub fn frame(&self) -> &FrameImage {
        &self.state.output
    }

    pub fn gbuffer(&self) -> &SoftwareGBuffer {
        &self.state.gbuffer
    }

    pub fn grid(&self) -> &ClusterGrid {
        &self.state.grid
    }

    pub fn records(&self) -> &ClusterRecords {
        &self.state.records
    }

    pub fn lights(&self) -> &LightStore {
        &self.state.lights
    }

    pub fn camera(&self) -> &Camera {
        &self.state.camera
    }

    pub fn config(&self) -> &RenderConfig {
        &self.state.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{material::MaterialData, mesh::MeshData};

    fn facing_quad_scene() -> Scene {
        let mut scene = Scene::default();
        let plane = scene.add_mesh(MeshData::plane(2.0, 1.0));
        let white = scene.add_material(MaterialData::solid("white", [1.0; 4]));
        // Rotate the +Y plane to face +Z, 5 units in front of a camera at the origin.
        let transform = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0))
            * Mat4::from_rotation_x(std::f32::consts::FRAC_PI_2);
        scene.add_object("quad", plane, white, transform);
        scene
    }

    fn config() -> RenderConfig {
        let mut config = RenderConfig::default();
        config.camera.position = Vec3::ZERO;
        config.camera.target = Vec3::NEG_Z;
        config.cluster.dims = [4, 4, 8];
        config.cluster.max_lights_per_cluster = 16;
        config.lights.capacity = 8;
        config.lights.active_count = 0;
        config
    }

    #[test]
    fn geometry_covers_center_and_leaves_corners_empty() {
        let mut renderer = SoftwareRenderer::new(config(), facing_quad_scene(), 32, 32).unwrap();
        renderer.render_frame(0.0).unwrap();

        let gbuffer = renderer.gbuffer();
        assert!(gbuffer.depth(16, 16) < 1.0);
        assert_eq!(gbuffer.depth(0, 0), 1.0);

        let texel = gbuffer.texel(16, 16);
        assert!((texel.position.z - -5.0).abs() < 0.01);
        assert!(texel.normal.dot(Vec3::Z) > 0.99);
        assert_eq!(texel.diffuse, Vec4::ONE);
    }

    #[test]
    fn back_faces_are_culled() {
        let mut scene = facing_quad_scene();
        scene.objects[0].transform = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0))
            * Mat4::from_rotation_x(-std::f32::consts::FRAC_PI_2);
        let mut renderer = SoftwareRenderer::new(config(), scene, 32, 32).unwrap();
        renderer.render_frame(0.0).unwrap();
        assert_eq!(renderer.gbuffer().depth(16, 16), 1.0);
    }

    #[test]
    fn nearer_surface_wins_depth_test() {
        let mut scene = facing_quad_scene();
        let red = scene.add_material(MaterialData::solid("red", [1.0, 0.0, 0.0, 1.0]));
        let near = Mat4::from_translation(Vec3::new(0.0, 0.0, -3.0))
            * Mat4::from_rotation_x(std::f32::consts::FRAC_PI_2);
        // Near quad drawn first, so the far one has to lose the depth test.
        scene.add_object("near", 0, red, near);
        scene.objects.swap(0, 1);

        let mut renderer = SoftwareRenderer::new(config(), scene, 32, 32).unwrap();
        renderer.render_frame(0.0).unwrap();
        let texel = renderer.gbuffer().texel(16, 16);
        assert_eq!(texel.diffuse, Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert!((texel.position.z - -3.0).abs() < 0.01);
    }
}
