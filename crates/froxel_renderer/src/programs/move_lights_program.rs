use wgpu::util::DeviceExt;

use crate::{
    light::GpuLightSet,
    motion::MotionUniforms,
    programs::{ComputeProgram, GpuProgramRenderContext, create_shader, storage_entry, uniform_entry},
};

/// Must match `@workgroup_size` in move_lights.wgsl.
pub const MOVE_LIGHTS_WORKGROUP_SIZE: u32 = 128;

pub struct MoveLightsProgram {
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    uniform_buffer: wgpu::Buffer,
}

impl MoveLightsProgram {
    pub fn update(&self, queue: &wgpu::Queue, uniforms: &MotionUniforms) {
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));
    }
}

impl ComputeProgram for MoveLightsProgram {
    type InitData<'a> = &'a GpuLightSet;
    /// Active light count.
    type DispatchData<'a> = u32;

    fn new(ctx: &GpuProgramRenderContext, light_set: Self::InitData<'_>) -> Self {
        let shader = create_shader(ctx, "Move Lights Shader", include_str!("../shaders/move_lights.wgsl"));

        let layout = ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Move Lights Bind Group Layout"),
                entries: &[
                    storage_entry(0, wgpu::ShaderStages::COMPUTE, false),
                    uniform_entry(1, wgpu::ShaderStages::COMPUTE),
                ],
            });

        let uniform_buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Motion Uniforms"),
                contents: bytemuck::bytes_of(&MotionUniforms {
                    bounds_min: [0.0; 4],
                    bounds_max: [0.0; 4],
                    time: 0.0,
                    dt: 0.0,
                    speed: 0.0,
                    _padding: 0.0,
                }),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Move Lights Bind Group"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: light_set.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: uniform_buffer.as_entire_binding(),
                },
            ],
        });

        let pipeline_layout = ctx
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Move Lights Pipeline Layout"),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });

        let pipeline = ctx
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Move Lights Pipeline"),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            });

        Self {
            pipeline,
            bind_group,
            uniform_buffer,
        }
    }

    fn dispatch(&self, cpass: &mut wgpu::ComputePass<'_>, active_count: Self::DispatchData<'_>) {
        if active_count == 0 {
            return;
        }
        let workgroups = active_count.div_ceil(MOVE_LIGHTS_WORKGROUP_SIZE);
        log::debug!("move_lights: {workgroups} workgroups for {active_count} lights");

        cpass.set_pipeline(&self.pipeline);
        cpass.set_bind_group(0, &self.bind_group, &[]);
        cpass.dispatch_workgroups(workgroups, 1, 1);
    }
}
