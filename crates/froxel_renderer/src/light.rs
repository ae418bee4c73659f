use froxel_core::config::{LightSettings, MotionSettings};
use glam::Vec3;
use rand::{Rng, SeedableRng, rngs::StdRng};
use wgpu::util::DeviceExt;

/// Point light. Identity is the slot index inside the store.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    pub position: Vec3,
    pub radius: f32,
    /// Intensity is already baked in.
    pub color: Vec3,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuLight {
    pub position: [f32; 3],
    pub radius: f32,
    pub color: [f32; 3],
    pub _padding: f32, // vec3f is aligned at 16 byte boundaries
}

impl From<&Light> for GpuLight {
    fn from(light: &Light) -> Self {
        Self {
            position: light.position.to_array(),
            radius: light.radius,
            color: light.color.to_array(),
            _padding: 0.0,
        }
    }
}

/// Leading 16 bytes of the light set buffer; the light array follows.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightSetHeader {
    pub num_lights: u32,
    pub _padding: [u32; 3],
}

pub const LIGHT_SET_HEADER_SIZE: wgpu::BufferAddress =
    std::mem::size_of::<LightSetHeader>() as wgpu::BufferAddress;

/// `h` in [0, 1]. Saturated hue, then pulled 80% of the way from white.
pub fn hue_to_rgb(h: f32) -> Vec3 {
    let f = |n: f32| {
        let k = (n + h * 6.0) % 6.0;
        1.0 - k.min(4.0 - k).min(1.0).max(0.0)
    };
    Vec3::ONE.lerp(Vec3::new(f(5.0), f(3.0), f(1.0)), 0.8)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PendingUpload {
    None,
    Count,
    All,
}

/// Authoritative light array. Capacity is fixed; "removing" lights means
/// lowering the active count, never freeing slots.
pub struct LightStore {
    lights: Vec<Light>,
    active_count: u32,
    radius: f32,
    intensity: f32,
    bounds: (Vec3, Vec3),
    rng: StdRng,
    pending: PendingUpload,
}

impl LightStore {
    pub fn new(settings: &LightSettings, motion: &MotionSettings) -> Self {
        let mut store = Self {
            lights: Vec::with_capacity(settings.capacity as usize),
            active_count: 0,
            radius: settings.radius,
            intensity: settings.intensity,
            bounds: (motion.bounds_min, motion.bounds_max),
            rng: StdRng::seed_from_u64(settings.seed),
            pending: PendingUpload::All,
        };
        store.lights.resize(
            settings.capacity as usize,
            Light {
                position: Vec3::ZERO,
                radius: settings.radius,
                color: Vec3::ZERO,
            },
        );
        store.populate();
        store.set_active_count(settings.active_count);
        store
    }

    /// Refills every slot with a random hue and a starting position inside
    /// the motion bounds, and schedules a full upload.
    pub fn populate(&mut self) {
        let (min, max) = self.bounds;
        for light in &mut self.lights {
            let hue: f32 = self.rng.r#gen();
            let t = Vec3::new(self.rng.r#gen(), self.rng.r#gen(), self.rng.r#gen());
            *light = Light {
                position: min + (max - min) * t,
                radius: self.radius,
                color: hue_to_rgb(hue) * self.intensity,
            };
        }
        self.pending = PendingUpload::All;
    }

    /// Clamps `count` to the capacity and schedules a count-only upload.
    pub fn set_active_count(&mut self, count: u32) -> u32 {
        let clamped = count.min(self.capacity());
        if clamped != count {
            log::warn!(
                "requested {count} active lights, clamped to capacity {}",
                self.capacity()
            );
        }
        self.active_count = clamped;
        if self.pending == PendingUpload::None {
            self.pending = PendingUpload::Count;
        }
        clamped
    }

    pub fn capacity(&self) -> u32 {
        self.lights.len() as u32
    }

    pub fn active_count(&self) -> u32 {
        self.active_count
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Every slot, active or not.
    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn active_lights(&self) -> &[Light] {
        &self.lights[..self.active_count as usize]
    }

    pub(crate) fn active_lights_mut(&mut self) -> &mut [Light] {
        &mut self.lights[..self.active_count as usize]
    }

    pub fn gpu_lights(&self) -> Vec<GpuLight> {
        self.lights.iter().map(GpuLight::from).collect()
    }

    pub fn take_pending_upload(&mut self) -> PendingUpload {
        std::mem::replace(&mut self.pending, PendingUpload::None)
    }
}

/// Device-resident mirror of the light store: header + `capacity` lights.
pub struct GpuLightSet {
    pub buffer: wgpu::Buffer,
    capacity: u32,
}

impl GpuLightSet {
    pub fn new(device: &wgpu::Device, store: &mut LightStore) -> Self {
        let mut contents = bytemuck::bytes_of(&LightSetHeader {
            num_lights: store.active_count(),
            _padding: [0; 3],
        })
        .to_vec();
        contents.extend_from_slice(bytemuck::cast_slice(&store.gpu_lights()));

        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Light Set Buffer"),
            contents: &contents,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });
        store.take_pending_upload();

        Self {
            buffer,
            capacity: store.capacity(),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Pushes whatever the store changed since the last sync.
    pub fn sync(&self, queue: &wgpu::Queue, store: &mut LightStore) {
        match store.take_pending_upload() {
            PendingUpload::None => {}
            PendingUpload::Count => self.write_count(queue, store.active_count()),
            PendingUpload::All => {
                self.write_count(queue, store.active_count());
                queue.write_buffer(
                    &self.buffer,
                    LIGHT_SET_HEADER_SIZE,
                    bytemuck::cast_slice(&store.gpu_lights()),
                );
            }
        }
    }

    fn write_count(&self, queue: &wgpu::Queue, count: u32) {
        queue.write_buffer(
            &self.buffer,
            0,
            bytemuck::bytes_of(&LightSetHeader {
                num_lights: count,
                _padding: [0; 3],
            }),
        );
    }
}
