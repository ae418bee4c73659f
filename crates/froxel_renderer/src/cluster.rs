//! Cluster grid and light assignment.
//!
//! The view frustum is cut into `x * y` screen tiles and `z` depth slices.
//! Each cell is bounded by a view-space AABB that encloses its frustum
//! chunk; lights are assigned by testing their view-space sphere against
//! that box. `shaders/common.wgsl` mirrors every formula in this file.

use froxel_core::{DepthSlicing, camera::Camera, config::ClusterSettings};
use glam::{Mat4, UVec3, Vec2, Vec3, Vec4Swizzles};
use rayon::prelude::*;

use crate::light::Light;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClusterCoord {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl ClusterCoord {
    pub fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }
}

/// Bounding volume of one cell.
#[derive(Clone, Copy, Debug)]
pub struct ClusterBounds {
    /// View-space AABB.
    pub min: Vec3,
    pub max: Vec3,
    /// Screen rectangle in NDC (+y up).
    pub ndc_min: Vec2,
    pub ndc_max: Vec2,
    /// Positive view-space distances of the slice faces.
    pub depth_near: f32,
    pub depth_far: f32,
    /// Representative depth inside the slice under the grid's slicing policy.
    pub center_depth: f32,
}

impl ClusterBounds {
    /// Closest-point sphere/AABB test.
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        let closest = center.clamp(self.min, self.max);
        closest.distance_squared(center) <= radius * radius
    }

    /// Pixel (origin top-left) at the center of the cell's screen tile.
    pub fn center_pixel(&self, viewport: Vec2) -> Vec2 {
        let ndc = (self.ndc_min + self.ndc_max) * 0.5;
        Vec2::new((ndc.x * 0.5 + 0.5) * viewport.x, (0.5 - ndc.y * 0.5) * viewport.y)
    }
}

/// Static partition of the view volume. Dimensions and slicing are fixed at
/// construction; only a projection change (resize) rebuilds it.
#[derive(Clone, Debug)]
pub struct ClusterGrid {
    dims: UVec3,
    slicing: DepthSlicing,
    z_near: f32,
    z_far: f32,
    /// Far face of the last slice's volume. Depths past `z_far` clamp into
    /// that slice, so its cells must reach the far plane.
    camera_far: f32,
    inverse_projection: Mat4,
}

impl ClusterGrid {
    pub fn new(settings: &ClusterSettings, camera: &Camera) -> Self {
        Self {
            dims: UVec3::from_array(settings.dims),
            slicing: settings.depth_slicing,
            z_near: camera.near,
            z_far: settings.max_depth.min(camera.far),
            camera_far: camera.far,
            inverse_projection: camera.compute_projection_matrix().inverse(),
        }
    }

    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    pub fn slicing(&self) -> DepthSlicing {
        self.slicing
    }

    pub fn depth_range(&self) -> (f32, f32) {
        (self.z_near, self.z_far)
    }

    pub fn cluster_count(&self) -> usize {
        self.dims.x as usize * self.dims.y as usize * self.dims.z as usize
    }

    pub fn index_of(&self, coord: ClusterCoord) -> usize {
        (coord.x + coord.y * self.dims.x + coord.z * self.dims.x * self.dims.y) as usize
    }

    pub fn coord_of(&self, index: usize) -> ClusterCoord {
        let index = index as u32;
        let plane = self.dims.x * self.dims.y;
        ClusterCoord {
            x: index % self.dims.x,
            y: (index % plane) / self.dims.x,
            z: index / plane,
        }
    }

    pub fn coords(&self) -> impl Iterator<Item = ClusterCoord> + '_ {
        (0..self.cluster_count()).map(|index| self.coord_of(index))
    }

    /// View-space distance of slice boundary `slice` (fractional allowed).
    pub fn slice_depth(&self, slice: f32) -> f32 {
        let t = slice / self.dims.z as f32;
        match self.slicing {
            DepthSlicing::Linear => self.z_near + (self.z_far - self.z_near) * t,
            DepthSlicing::Logarithmic => self.z_near * (self.z_far / self.z_near).powf(t),
        }
    }

    /// Slice containing view-space distance `depth`, clamped to the grid.
    pub fn depth_to_slice(&self, depth: f32) -> u32 {
        let t = match self.slicing {
            DepthSlicing::Linear => (depth - self.z_near) / (self.z_far - self.z_near),
            DepthSlicing::Logarithmic => {
                (depth.max(self.z_near) / self.z_near).ln() / (self.z_far / self.z_near).ln()
            }
        };
        let slice = (t * self.dims.z as f32).floor().max(0.0) as u32;
        slice.min(self.dims.z - 1)
    }

    pub fn cell_bounds(&self, coord: ClusterCoord) -> ClusterBounds {
        let dims = self.dims.as_vec3();
        let ndc_min = Vec2::new(
            -1.0 + 2.0 * coord.x as f32 / dims.x,
            1.0 - 2.0 * (coord.y + 1) as f32 / dims.y,
        );
        let ndc_max = Vec2::new(
            -1.0 + 2.0 * (coord.x + 1) as f32 / dims.x,
            1.0 - 2.0 * coord.y as f32 / dims.y,
        );
        let depth_near = self.slice_depth(coord.z as f32);
        let depth_far = if coord.z + 1 == self.dims.z {
            self.slice_depth(self.dims.z as f32).max(self.camera_far)
        } else {
            self.slice_depth((coord.z + 1) as f32)
        };

        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for ndc in [
            ndc_min,
            Vec2::new(ndc_max.x, ndc_min.y),
            Vec2::new(ndc_min.x, ndc_max.y),
            ndc_max,
        ] {
            let ray = self.view_ray(ndc);
            for depth in [depth_near, depth_far] {
                let point = ray * depth;
                min = min.min(point);
                max = max.max(point);
            }
        }

        ClusterBounds {
            min,
            max,
            ndc_min,
            ndc_max,
            depth_near,
            depth_far,
            center_depth: self.slice_depth(coord.z as f32 + 0.5),
        }
    }

    /// Inverse of `cell_bounds`: the cell containing `pixel` (origin
    /// top-left) at view-space distance `depth`.
    pub fn screen_to_cell_coord(&self, pixel: Vec2, viewport: Vec2, depth: f32) -> ClusterCoord {
        let tile = (pixel / viewport * self.dims.truncate().as_vec2()).floor();
        ClusterCoord {
            x: (tile.x.max(0.0) as u32).min(self.dims.x - 1),
            y: (tile.y.max(0.0) as u32).min(self.dims.y - 1),
            z: self.depth_to_slice(depth),
        }
    }

    /// View-space direction through `ndc`, scaled so that z == -1.
    fn view_ray(&self, ndc: Vec2) -> Vec3 {
        let on_near = self.inverse_projection * ndc.extend(0.0).extend(1.0);
        let point = on_near.xyz() / on_near.w;
        point / -point.z
    }
}

/// Light indices bound to one cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClusterRecord<'a> {
    pub count: u32,
    pub lights: &'a [u32],
}

/// Fixed-capacity per-cell light lists in one flat arena, laid out exactly
/// like the device buffer: `[count, idx0, idx1, ...]` per cell, stride
/// `max_lights_per_cluster + 1`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterRecords {
    max_lights_per_cluster: u32,
    data: Vec<u32>,
}

impl ClusterRecords {
    pub fn new(cluster_count: usize, max_lights_per_cluster: u32) -> Self {
        Self {
            max_lights_per_cluster,
            data: vec![0; cluster_count * (max_lights_per_cluster as usize + 1)],
        }
    }

    pub fn byte_size(cluster_count: usize, max_lights_per_cluster: u32) -> u64 {
        (cluster_count * (max_lights_per_cluster as usize + 1) * std::mem::size_of::<u32>()) as u64
    }

    pub fn max_lights_per_cluster(&self) -> u32 {
        self.max_lights_per_cluster
    }

    pub fn stride(&self) -> usize {
        self.max_lights_per_cluster as usize + 1
    }

    pub fn cluster_count(&self) -> usize {
        self.data.len() / self.stride()
    }

    pub fn record(&self, index: usize) -> ClusterRecord<'_> {
        let slot = &self.data[index * self.stride()..(index + 1) * self.stride()];
        let count = slot[0].min(self.max_lights_per_cluster);
        ClusterRecord {
            count,
            lights: &slot[1..=count as usize],
        }
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.data
    }
}

/// Host-side assignment pass. One rayon task per cell; every task scans the
/// full active light list in index order and stops appending once the cell
/// is full. Lights past the cutoff are dropped silently.
pub fn assign_lights(grid: &ClusterGrid, view: Mat4, lights: &[Light], records: &mut ClusterRecords) {
    debug_assert_eq!(grid.cluster_count(), records.cluster_count());

    let view_spheres: Vec<(Vec3, f32)> = lights
        .iter()
        .map(|light| (view.transform_point3(light.position), light.radius))
        .collect();
    let max = records.max_lights_per_cluster as usize;
    let stride = records.stride();

    records
        .data
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(index, slot)| {
            let bounds = grid.cell_bounds(grid.coord_of(index));
            let mut count = 0;
            for (light_index, &(center, radius)) in view_spheres.iter().enumerate() {
                if count == max {
                    break;
                }
                if bounds.intersects_sphere(center, radius) {
                    slot[1 + count] = light_index as u32;
                    count += 1;
                }
            }
            slot[0] = count as u32;
        });
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ClusterUniforms {
    pub dims: [u32; 3],
    pub max_lights_per_cluster: u32,
    pub viewport: [f32; 2],
    pub z_near: f32,
    pub z_far: f32,
    pub depth_slicing: u32,
    pub _padding: [u32; 3],
}

impl ClusterUniforms {
    pub fn new(grid: &ClusterGrid, max_lights_per_cluster: u32, width: u32, height: u32) -> Self {
        Self {
            dims: grid.dims.to_array(),
            max_lights_per_cluster,
            viewport: [width as f32, height as f32],
            z_near: grid.z_near,
            z_far: grid.z_far,
            depth_slicing: grid.slicing.shader_id(),
            _padding: [0; 3],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn camera() -> Camera {
        Camera {
            position: Vec3::ZERO,
            target: Vec3::NEG_Z,
            ..Camera::default()
        }
    }

    fn grid(dims: [u32; 3], slicing: DepthSlicing) -> ClusterGrid {
        let settings = ClusterSettings {
            dims,
            depth_slicing: slicing,
            ..ClusterSettings::default()
        };
        ClusterGrid::new(&settings, &camera())
    }

    fn light(position: Vec3, radius: f32) -> Light {
        Light {
            position,
            radius,
            color: Vec3::ONE,
        }
    }

    #[test]
    fn index_and_coord_round_trip() {
        let grid = grid([5, 3, 4], DepthSlicing::Linear);
        for index in 0..grid.cluster_count() {
            assert_eq!(grid.index_of(grid.coord_of(index)), index);
        }
    }

    #[test]
    fn slices_cover_depth_range() {
        for slicing in [DepthSlicing::Linear, DepthSlicing::Logarithmic] {
            let grid = grid([4, 4, 16], slicing);
            let (near, far) = grid.depth_range();
            assert!((grid.slice_depth(0.0) - near).abs() < 1e-5);
            assert!((grid.slice_depth(16.0) - far).abs() < 1e-3);
            for k in 0..16 {
                assert!(grid.slice_depth(k as f32) < grid.slice_depth(k as f32 + 1.0));
            }
            assert_eq!(grid.depth_to_slice(near * 0.5), 0);
            assert_eq!(grid.depth_to_slice(far * 10.0), 15);
        }
    }

    #[test]
    fn screen_to_cell_round_trips_cell_centers() {
        let viewport = Vec2::new(1920.0, 1080.0);
        for slicing in [DepthSlicing::Linear, DepthSlicing::Logarithmic] {
            let grid = grid([32, 16, 64], slicing);
            for coord in grid.coords() {
                let bounds = grid.cell_bounds(coord);
                let back = grid.screen_to_cell_coord(
                    bounds.center_pixel(viewport),
                    viewport,
                    bounds.center_depth,
                );
                assert_eq!(back, coord, "{slicing:?}");
            }
        }
    }

    #[test]
    fn aabb_contains_frustum_chunk_center() {
        let grid = grid([8, 4, 8], DepthSlicing::Logarithmic);
        let cam = camera();
        let viewport = Vec2::new(800.0, 400.0);
        for coord in grid.coords() {
            let bounds = grid.cell_bounds(coord);
            let ndc = (bounds.ndc_min + bounds.ndc_max) * 0.5;
            let center = grid.view_ray(ndc) * bounds.center_depth;
            assert!(bounds.intersects_sphere(center, 0.0));
            assert!(bounds.min.z <= -bounds.depth_far + 1e-4);
            assert!(bounds.max.z >= -bounds.depth_near - 1e-4);

            let pixel = cam.view_to_pixel(center, viewport);
            assert_eq!(grid.screen_to_cell_coord(pixel, viewport, bounds.center_depth), coord);
        }
    }

    #[test]
    fn sphere_aabb_test() {
        let bounds = ClusterBounds {
            min: Vec3::ZERO,
            max: Vec3::splat(10.0),
            ndc_min: Vec2::ZERO,
            ndc_max: Vec2::ZERO,
            depth_near: 0.0,
            depth_far: 0.0,
            center_depth: 0.0,
        };
        assert!(bounds.intersects_sphere(Vec3::splat(5.0), 1.0));
        assert!(bounds.intersects_sphere(Vec3::new(11.0, 5.0, 5.0), 1.0));
        assert!(!bounds.intersects_sphere(Vec3::new(15.0, 5.0, 5.0), 1.0));
        let d = 3.0f32.sqrt();
        assert!(!bounds.intersects_sphere(Vec3::splat(11.0), d - 0.01));
        assert!(bounds.intersects_sphere(Vec3::splat(11.0), d + 0.01));
    }

    #[test]
    fn assignment_is_sound_and_bounded() {
        let grid = grid([8, 4, 16], DepthSlicing::Logarithmic);
        let mut rng = StdRng::seed_from_u64(7);
        let lights: Vec<Light> = (0..300)
            .map(|_| {
                let p = Vec3::new(
                    rng.gen_range(-10.0..10.0),
                    rng.gen_range(-6.0..6.0),
                    rng.gen_range(-22.0..1.0),
                );
                light(p, rng.gen_range(0.2..3.0))
            })
            .collect();
        let mut records = ClusterRecords::new(grid.cluster_count(), 6);
        assign_lights(&grid, Mat4::IDENTITY, &lights, &mut records);

        let mut saw_overflow = false;
        for index in 0..grid.cluster_count() {
            let bounds = grid.cell_bounds(grid.coord_of(index));
            let record = records.record(index);
            assert!(record.count <= 6);

            for &light_index in record.lights {
                let l = lights[light_index as usize];
                assert!(bounds.intersects_sphere(l.position, l.radius));
            }
            // Scan order: indices strictly increase.
            assert!(record.lights.windows(2).all(|w| w[0] < w[1]));

            let hits: Vec<u32> = (0..lights.len() as u32)
                .filter(|&i| bounds.intersects_sphere(lights[i as usize].position, lights[i as usize].radius))
                .collect();
            if record.count < 6 {
                assert_eq!(record.lights, hits.as_slice());
            } else {
                saw_overflow |= hits.len() > 6;
                assert_eq!(record.lights, &hits[..6]);
            }
        }
        assert!(saw_overflow, "test scene should overflow some cluster");
    }

    #[test]
    fn last_slice_reaches_far_plane() {
        let grid = grid([4, 2, 8], DepthSlicing::Logarithmic);
        let (_, z_far) = grid.depth_range();
        assert!(z_far < 25.0);

        // Light centered past the slice range, in front of the view axis.
        let lights = [light(Vec3::new(0.0, 0.0, -25.0), 2.0)];
        let mut records = ClusterRecords::new(grid.cluster_count(), 4);
        assign_lights(&grid, Mat4::IDENTITY, &lights, &mut records);

        let viewport = Vec2::new(64.0, 64.0);
        let coord = grid.screen_to_cell_coord(Vec2::new(32.5, 32.5), viewport, 26.0);
        assert_eq!(coord.z, 7);
        assert!(grid.cell_bounds(coord).depth_far >= camera().far);
        assert_eq!(records.record(grid.index_of(coord)).lights, &[0]);
    }

    #[test]
    fn assignment_uses_view_transform() {
        let grid = grid([1, 1, 4], DepthSlicing::Linear);
        let cam = Camera {
            position: Vec3::new(0.0, 0.0, 10.0),
            target: Vec3::ZERO,
            ..Camera::default()
        };
        let lights = [light(Vec3::ZERO, 0.5)];
        let mut records = ClusterRecords::new(grid.cluster_count(), 4);
        assign_lights(&grid, cam.compute_view_matrix(), &lights, &mut records);

        // World origin is 10 units in front of the camera.
        let slice = grid.depth_to_slice(10.0) as usize;
        assert_eq!(records.record(slice).lights, &[0]);
    }

    #[test]
    fn assignment_is_idempotent() {
        let grid = grid([6, 6, 6], DepthSlicing::Logarithmic);
        let lights: Vec<Light> = (0..40)
            .map(|i| light(Vec3::new(i as f32 * 0.3 - 6.0, 0.5, -(i as f32) * 0.4 - 1.0), 1.5))
            .collect();
        let mut records = ClusterRecords::new(grid.cluster_count(), 3);
        assign_lights(&grid, Mat4::IDENTITY, &lights, &mut records);
        let first = records.clone();
        assign_lights(&grid, Mat4::IDENTITY, &lights, &mut records);
        assert_eq!(first, records);
    }

    #[test]
    fn record_count_never_exceeds_capacity_even_if_corrupted() {
        let mut records = ClusterRecords::new(2, 2);
        records.data[0] = 99;
        assert_eq!(records.record(0).count, 2);
        assert_eq!(records.record(0).lights.len(), 2);
    }

    #[test]
    fn uniforms_are_48_bytes() {
        assert_eq!(std::mem::size_of::<ClusterUniforms>(), 48);
    }
}
