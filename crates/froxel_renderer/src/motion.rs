//! Light motion. The same velocity field and wrap rule run in
//! `shaders/move_lights.wgsl`; keep the two in sync.

use std::f32::consts::TAU;

use froxel_core::config::MotionSettings;
use glam::Vec3;
use rayon::prelude::*;

use crate::light::LightStore;

pub fn pcg_hash(input: u32) -> u32 {
    let state = input.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

/// Maps a hash to [0, 1) using its top 24 bits.
fn unit(hash: u32) -> f32 {
    (hash >> 8) as f32 / 16_777_216.0
}

/// Velocity of light `index` at `time`. Each light gets its own phase and
/// rate, so the field is deterministic per index but looks unstructured.
pub fn light_velocity(index: u32, time: f32, speed: f32) -> Vec3 {
    let seed = pcg_hash(index);
    let phase = Vec3::new(
        unit(seed),
        unit(pcg_hash(seed)),
        unit(pcg_hash(seed ^ 0x9e37_79b9)),
    ) * TAU;
    let rate = 0.5 + unit(pcg_hash(seed.wrapping_add(1)));
    let t = time * rate;

    Vec3::new(
        (t + phase.x).cos(),
        0.6 * (1.3 * t + phase.y).sin(),
        (0.7 * t + phase.z).sin(),
    ) * (2.0 * speed)
}

/// Wraps `position` back into the closed box `[min, max]`.
pub fn wrap_into_bounds(position: Vec3, min: Vec3, max: Vec3) -> Vec3 {
    let extent = max - min;
    let wrapped = min + (position - min).rem_euclid(extent.max(Vec3::splat(f32::MIN_POSITIVE)));
    Vec3::select(extent.cmpgt(Vec3::ZERO), wrapped, min).clamp(min, max)
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MotionUniforms {
    pub bounds_min: [f32; 4],
    pub bounds_max: [f32; 4],
    pub time: f32,
    pub dt: f32,
    pub speed: f32,
    pub _padding: f32,
}

/// Advances active light positions. Owns the motion clock; touches nothing
/// but positions.
pub struct LightMotion {
    bounds_min: Vec3,
    bounds_max: Vec3,
    speed: f32,
    batch_size: usize,
    elapsed: f32,
}

impl LightMotion {
    pub fn new(settings: &MotionSettings) -> Self {
        Self {
            bounds_min: settings.bounds_min,
            bounds_max: settings.bounds_max,
            speed: settings.speed,
            batch_size: settings.batch_size.max(1) as usize,
            elapsed: 0.0,
        }
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Host-side motion pass: one rayon task per `batch_size` active lights.
    pub fn advance(&mut self, store: &mut LightStore, dt: f32) {
        let time = self.elapsed;
        let (min, max, speed, batch) = (self.bounds_min, self.bounds_max, self.speed, self.batch_size);

        store
            .active_lights_mut()
            .par_chunks_mut(batch)
            .enumerate()
            .for_each(|(chunk, lights)| {
                for (offset, light) in lights.iter_mut().enumerate() {
                    let index = (chunk * batch + offset) as u32;
                    let moved = light.position + light_velocity(index, time, speed) * dt;
                    light.position = wrap_into_bounds(moved, min, max);
                }
            });

        self.elapsed += dt;
    }

    /// Uniforms for the device-side pass covering the same step as
    /// [`advance`](Self::advance). Call before `step_clock`.
    pub fn uniforms(&self, dt: f32) -> MotionUniforms {
        MotionUniforms {
            bounds_min: self.bounds_min.extend(0.0).to_array(),
            bounds_max: self.bounds_max.extend(0.0).to_array(),
            time: self.elapsed,
            dt,
            speed: self.speed,
            _padding: 0.0,
        }
    }

    /// Advances the clock without touching host positions, for frames where
    /// the device owns the positions.
    pub fn step_clock(&mut self, dt: f32) {
        self.elapsed += dt;
    }
}
