//! Per-pixel deferred shading shared by the CPU executor. The lighting
//! shader implements the same functions in WGSL.

use froxel_core::camera::linearize_depth;
use glam::{Vec2, Vec3, Vec4};

use crate::{
    cluster::{ClusterGrid, ClusterRecords},
    light::Light,
};

/// Depth-buffer values at or beyond this mark a pixel no geometry touched.
pub const BACKGROUND_DEPTH: f32 = 1.0;

/// Reconstructed shading inputs of one G-buffer pixel.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GBufferTexel {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub diffuse: Vec4,
}

pub fn is_background(depth: f32) -> bool {
    depth >= BACKGROUND_DEPTH
}

/// Smooth falloff reaching zero at `radius`, on top of inverse-square.
pub fn range_attenuation(distance: f32, radius: f32) -> f32 {
    let falloff = (1.0 - (distance / radius).powi(4)).clamp(0.0, 1.0);
    falloff / (distance * distance).max(1e-4)
}

/// Lambert term times range attenuation, tinted by the light color.
pub fn light_contribution(light: &Light, position: Vec3, normal: Vec3) -> Vec3 {
    let to_light = light.position - position;
    let distance = to_light.length();
    let lambert = normal.dot(to_light.normalize_or_zero()).max(0.0);
    light.color * lambert * range_attenuation(distance, light.radius)
}

/// Everything the lighting pass reads besides the G-buffer itself.
pub struct LightingInputs<'a> {
    pub grid: &'a ClusterGrid,
    pub records: &'a ClusterRecords,
    /// Full light store; records index into it.
    pub lights: &'a [Light],
    pub viewport: Vec2,
    pub near: f32,
    pub far: f32,
    pub clear_color: Vec4,
}

/// Final color of the pixel whose top-left corner is `pixel`.
pub fn shade_pixel(inputs: &LightingInputs, pixel: Vec2, depth: f32, texel: &GBufferTexel) -> Vec4 {
    if is_background(depth) {
        return inputs.clear_color;
    }

    let view_depth = linearize_depth(depth, inputs.near, inputs.far);
    let coord = inputs
        .grid
        .screen_to_cell_coord(pixel + Vec2::splat(0.5), inputs.viewport, view_depth);
    let record = inputs.records.record(inputs.grid.index_of(coord));

    let normal = texel.normal.normalize_or_zero();
    let total_light = record
        .lights
        .iter()
        .filter_map(|&index| inputs.lights.get(index as usize))
        .fold(Vec3::ZERO, |acc, light| {
            acc + light_contribution(light, texel.position, normal)
        });

    (texel.diffuse.truncate() * total_light).extend(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ClusterCoord, assign_lights};
    use approx::assert_relative_eq;
    use froxel_core::{camera::Camera, config::ClusterSettings};

    #[test]
    fn attenuation_vanishes_at_radius() {
        assert_relative_eq!(range_attenuation(2.0, 2.0), 0.0);
        assert_relative_eq!(range_attenuation(3.0, 2.0), 0.0);
        assert_relative_eq!(range_attenuation(1.0, 2.0), 1.0 - 1.0 / 16.0);
        assert!(range_attenuation(0.0, 2.0).is_finite());
    }

    #[test]
    fn back_facing_light_contributes_nothing() {
        let light = Light {
            position: Vec3::new(0.0, -1.0, 0.0),
            radius: 5.0,
            color: Vec3::ONE,
        };
        assert_eq!(light_contribution(&light, Vec3::ZERO, Vec3::Y), Vec3::ZERO);

        let above = Light {
            position: Vec3::new(0.0, 1.0, 0.0),
            ..light
        };
        assert!(light_contribution(&above, Vec3::ZERO, Vec3::Y).x > 0.0);
    }

    fn setup() -> (ClusterGrid, Camera, Vec<Light>, ClusterRecords) {
        let camera = Camera {
            position: Vec3::ZERO,
            target: Vec3::NEG_Z,
            aspect_ratio: 1.0,
            ..Camera::default()
        };
        let grid = ClusterGrid::new(&ClusterSettings::default(), &camera);
        let lights = vec![Light {
            position: Vec3::new(0.0, 0.0, -4.0),
            radius: 3.0,
            color: Vec3::ONE,
        }];
        let mut records = ClusterRecords::new(grid.cluster_count(), 8);
        assign_lights(&grid, camera.compute_view_matrix(), &lights, &mut records);
        (grid, camera, lights, records)
    }

    #[test]
    fn background_is_clear_color_even_under_lights() {
        let (grid, camera, lights, records) = setup();
        let inputs = LightingInputs {
            grid: &grid,
            records: &records,
            lights: &lights,
            viewport: Vec2::new(64.0, 64.0),
            near: camera.near,
            far: camera.far,
            clear_color: Vec4::new(0.1, 0.2, 0.3, 1.0),
        };
        // Garbage G-buffer contents must not matter for background pixels.
        let texel = GBufferTexel {
            position: Vec3::new(0.0, 0.0, -4.0),
            normal: Vec3::Z,
            uv: Vec2::ZERO,
            diffuse: Vec4::ONE,
        };
        assert_eq!(shade_pixel(&inputs, Vec2::new(31.0, 31.0), 1.0, &texel), inputs.clear_color);
    }

    #[test]
    fn lit_pixel_uses_its_cluster_lights() {
        let (grid, camera, lights, records) = setup();
        let inputs = LightingInputs {
            grid: &grid,
            records: &records,
            lights: &lights,
            viewport: Vec2::new(64.0, 64.0),
            near: camera.near,
            far: camera.far,
            clear_color: Vec4::ZERO,
        };

        // Surface facing the camera 5 units away, 1 unit behind the light.
        let surface = Vec3::new(0.0, 0.0, -5.0);
        let clip = camera.compute_projection_matrix() * surface.extend(1.0);
        let depth = clip.z / clip.w;
        let texel = GBufferTexel {
            position: surface,
            normal: Vec3::Z,
            uv: Vec2::ZERO,
            diffuse: Vec4::new(1.0, 0.5, 0.0, 1.0),
        };

        let pixel = Vec2::new(31.0, 31.0);
        let coord = grid.screen_to_cell_coord(pixel + 0.5, inputs.viewport, 5.0);
        assert_ne!(coord, ClusterCoord::new(0, 0, 0));
        assert_eq!(records.record(grid.index_of(coord)).lights, &[0]);

        let color = shade_pixel(&inputs, pixel, depth, &texel);
        let expected = light_contribution(&lights[0], surface, Vec3::Z).x;
        assert_relative_eq!(color.x, expected, max_relative = 1e-4);
        assert_relative_eq!(color.y, expected * 0.5, max_relative = 1e-4);
        assert_eq!(color.z, 0.0);
        assert_eq!(color.w, 1.0);
    }

    #[test]
    fn surfaces_past_max_depth_keep_their_lights() {
        let camera = Camera {
            position: Vec3::ZERO,
            target: Vec3::NEG_Z,
            aspect_ratio: 1.0,
            ..Camera::default()
        };
        let grid = ClusterGrid::new(&ClusterSettings::default(), &camera);
        assert!(grid.depth_range().1 < 25.0);

        let lights = vec![Light {
            position: Vec3::new(0.0, 0.0, -25.0),
            radius: 2.0,
            color: Vec3::ONE,
        }];
        let mut records = ClusterRecords::new(grid.cluster_count(), 8);
        assign_lights(&grid, camera.compute_view_matrix(), &lights, &mut records);

        let inputs = LightingInputs {
            grid: &grid,
            records: &records,
            lights: &lights,
            viewport: Vec2::new(64.0, 64.0),
            near: camera.near,
            far: camera.far,
            clear_color: Vec4::ZERO,
        };
        let surface = Vec3::new(0.0, 0.0, -26.0);
        let clip = camera.compute_projection_matrix() * surface.extend(1.0);
        let texel = GBufferTexel {
            position: surface,
            normal: Vec3::Z,
            uv: Vec2::ZERO,
            diffuse: Vec4::ONE,
        };

        let color = shade_pixel(&inputs, Vec2::new(31.0, 31.0), clip.z / clip.w, &texel);
        let expected = light_contribution(&lights[0], surface, Vec3::Z);
        assert_relative_eq!(expected.x, 0.9375, max_relative = 1e-4);
        assert_relative_eq!(color.x, expected.x, max_relative = 1e-3);
        assert_relative_eq!(color.z, expected.z, max_relative = 1e-3);
    }
}
