//! wgpu executor of the frame schedule.

use froxel_core::{PassExecutor, PassNode, RenderConfig, Schedule, camera::Camera, time::Time};
use wgpu::{Device, Queue, Surface, SurfaceConfiguration};

use crate::{
    cluster::{ClusterGrid, ClusterRecords, ClusterUniforms},
    error::RenderError,
    frame::{FramePass, build_frame_schedule},
    gbuffer::GBuffer,
    global_resources::GlobalResources,
    light::{GpuLightSet, LightStore},
    motion::LightMotion,
    programs::{
        ClusteringProgram, ComputeProgram, GeometryProgram, GpuProgram, GpuProgramRenderContext,
        LightingProgram, MoveLightsProgram, clustering_program::ClusteringInit,
        clustering_program::check_record_storage, lighting_program::LightingInit,
    },
    scene::{GpuScene, Scene},
};

/// Swapchain image and command encoder of the frame being recorded.
struct FrameInFlight {
    encoder: wgpu::CommandEncoder,
    surface_texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

/// Device objects created once at startup, plus the per-frame state the
/// passes touch.
pub struct GpuFrameState {
    device: Device,
    queue: Queue,
    surface: Surface<'static>,
    config: SurfaceConfiguration,

    render_config: RenderConfig,
    camera: Camera,
    grid: ClusterGrid,
    lights: LightStore,
    light_set: GpuLightSet,
    motion: LightMotion,

    global_resources: GlobalResources,
    move_lights_program: MoveLightsProgram,
    clustering_program: ClusteringProgram,
    geometry_program: GeometryProgram,
    lighting_program: LightingProgram,

    gbuffer: GBuffer,
    scene: GpuScene,

    frame: Option<FrameInFlight>,
    frame_delta: f32,
}

impl GpuFrameState {
    fn cluster_uniforms(&self) -> ClusterUniforms {
        ClusterUniforms::new(
            &self.grid,
            self.render_config.cluster.max_lights_per_cluster,
            self.config.width,
            self.config.height,
        )
    }

    /// Motion gets its own submission so it has finished before clustering
    /// reads the positions.
    fn move_lights(&mut self) {
        self.light_set.sync(&self.queue, &mut self.lights);
        self.move_lights_program
            .update(&self.queue, &self.motion.uniforms(self.frame_delta));
        self.motion.step_clock(self.frame_delta);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Move Lights Encoder"),
            });
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Move Lights Pass"),
                timestamp_writes: None,
            });
            self.move_lights_program
                .dispatch(&mut cpass, self.lights.active_count());
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn assign_clusters(&mut self) {
        let Some(frame) = self.frame.as_mut() else {
            return;
        };
        let mut cpass = frame.encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Cluster Assignment Pass"),
            timestamp_writes: None,
        });
        self.clustering_program
            .dispatch(&mut cpass, &self.global_resources.bind_group);
    }

    fn geometry(&mut self) -> Result<(), RenderError> {
        self.gbuffer
            .ensure_matches(self.config.width, self.config.height)?;
        let Some(frame) = self.frame.as_mut() else {
            return Ok(());
        };

        let clear_to_zero = wgpu::Operations {
            load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
            store: wgpu::StoreOp::Store,
        };
        let color_attachments = self.gbuffer.color_views().map(|view| {
            Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                depth_slice: None,
                ops: clear_to_zero,
            })
        });

        let mut render_pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("G-Buffer Pass"),
            color_attachments: &color_attachments,
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: self.gbuffer.depth_view(),
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0), // Clear to "Far" (1.0)
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            ..Default::default()
        });

        self.geometry_program.record(
            &mut render_pass,
            (&self.global_resources.bind_group, &self.scene),
        );
        Ok(())
    }

    fn lighting(&mut self) -> Result<(), RenderError> {
        self.gbuffer
            .ensure_matches(self.config.width, self.config.height)?;
        let Some(frame) = self.frame.as_mut() else {
            return Ok(());
        };

        let [r, g, b, a] = self.render_config.clear_color.map(f64::from);
        let mut render_pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Deferred Lighting Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &frame.view,
                resolve_target: None,
                depth_slice: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            ..Default::default()
        });

        self.lighting_program.record(
            &mut render_pass,
            (&self.global_resources.bind_group, &self.gbuffer),
        );
        Ok(())
    }
}

impl PassExecutor<FramePass> for GpuFrameState {
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

pub struct ClusteredDeferredRenderer {
    schedule: Schedule<FramePass>,
    gpu: GpuFrameState,
}

impl ClusteredDeferredRenderer {
    pub fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
        render_config: RenderConfig,
        scene: &Scene,
    ) -> Result<Self, RenderError> {
        render_config.validate()?;
        let schedule = build_frame_schedule()?;
        let (width, height) = (width.max(1), height.max(1));

        log::info!("initializing GPU");

        // Vulkan/Metal/DX12
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let surface = instance.create_surface(target)?;

        // 'pollster' blocks on the async adapter/device requests.
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))?;
        log::info!("using adapter {:?}", adapter.get_info().name);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Froxel Device"),
            ..Default::default()
        }))?;
        check_record_storage(
            ClusterRecords::byte_size(
                render_config.cluster.cluster_count(),
                render_config.cluster.max_lights_per_cluster,
            ),
            &device.limits(),
        )?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|format| format.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or(RenderError::SurfaceUnsupported)?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .ok_or(RenderError::SurfaceUnsupported)?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode: wgpu::PresentMode::Fifo, // VSync On
            desired_maximum_frame_latency: 2,
            alpha_mode,
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let camera = render_config.camera.to_camera(width, height);
        let grid = ClusterGrid::new(&render_config.cluster, &camera);
        let mut lights = LightStore::new(&render_config.lights, &render_config.motion);
        let light_set = GpuLightSet::new(&device, &mut lights);
        let motion = LightMotion::new(&render_config.motion);

        let global_resources = GlobalResources::new(&device, &camera, &light_set);

        let ctx = GpuProgramRenderContext {
            device: &device,
            queue: &queue,
            format: config.format,
        };
        let move_lights_program = MoveLightsProgram::new(&ctx, &light_set);
        let clustering_program = ClusteringProgram::new(
            &ctx,
            ClusteringInit {
                global_layout: &global_resources.layout,
                uniforms: ClusterUniforms::new(
                    &grid,
                    render_config.cluster.max_lights_per_cluster,
                    width,
                    height,
                ),
            },
        );
        let geometry_program = GeometryProgram::new(&ctx, &global_resources.layout);
        let lighting_program = LightingProgram::new(
            &ctx,
            LightingInit {
                global_layout: &global_resources.layout,
                clustering: &clustering_program,
                clear_color: render_config.clear_color,
            },
        );

        let gbuffer = GBuffer::new(&device, &lighting_program.gbuffer_layout, width, height);
        let scene = GpuScene::new(
            &device,
            &queue,
            scene,
            &geometry_program.material_layout,
            &geometry_program.mesh_layout,
        );

        log::info!(
            "pipelines compiled; {} of {} lights active",
            lights.active_count(),
            lights.capacity()
        );

        Ok(Self {
            schedule,
            gpu: GpuFrameState {
                device,
                queue,
                surface,
                config,
                render_config,
                camera,
                grid,
                lights,
                light_set,
                motion,
                global_resources,
                move_lights_program,
                clustering_program,
                geometry_program,
                lighting_program,
                gbuffer,
                scene,
                frame: None,
                frame_delta: 0.0,
            },
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.gpu.config.width, self.gpu.config.height)
    }

    /// Reconfigures the surface and reallocates the G-buffer before the next
    /// frame records anything.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 || (width, height) == self.size() {
            return;
        }
        log::info!("resizing to {width}x{height}");

        let gpu = &mut self.gpu;
        gpu.config.width = width;
        gpu.config.height = height;
        gpu.surface.configure(&gpu.device, &gpu.config);

        gpu.camera.set_viewport(width, height);
        gpu.grid = ClusterGrid::new(&gpu.render_config.cluster, &gpu.camera);
        gpu.clustering_program
            .update(&gpu.queue, &gpu.cluster_uniforms());
        gpu.gbuffer = GBuffer::new(
            &gpu.device,
            &gpu.lighting_program.gbuffer_layout,
            width,
            height,
        );
    }

    /// Clamped to the light capacity; returns the count actually applied.
    pub fn set_active_lights(&mut self, count: u32) -> u32 {
        let applied = self.gpu.lights.set_active_count(count);
        log::info!("active lights: {applied}");
        applied
    }

    pub fn active_lights(&self) -> u32 {
        self.gpu.lights.active_count()
    }

    pub fn camera(&self) -> &Camera {
        &self.gpu.camera
    }

    /// Records and submits one frame, then presents it. A stale surface
    /// drops the frame and reconfigures; the next call starts clean.
    pub fn render(&mut self, time: &Time) -> Result<(), RenderError> {
        let gpu = &mut self.gpu;

        let surface_texture = match gpu.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(err @ (wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost)) => {
                log::warn!("dropping frame: {err}");
                gpu.surface.configure(&gpu.device, &gpu.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("dropping frame: swapchain timeout");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        gpu.global_resources.update_camera(&gpu.queue, &gpu.camera);
        gpu.frame_delta = time.delta_seconds();
        gpu.frame = Some(FrameInFlight {
            encoder,
            surface_texture,
            view,
        });

        let result = self.schedule.run(gpu);
        let frame = gpu.frame.take();
        result?;

        if let Some(frame) = frame {
            gpu.queue.submit(std::iter::once(frame.encoder.finish()));
            frame.surface_texture.present();
        }
        Ok(())
    }
}
