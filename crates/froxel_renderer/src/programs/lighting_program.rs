use wgpu::util::DeviceExt;

use crate::{
    gbuffer::GBuffer,
    programs::{
        ClusteringProgram, GpuProgram, GpuProgramRenderContext, create_shader, storage_entry,
        uniform_entry,
    },
};

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightingUniforms {
    pub clear_color: [f32; 4],
}

pub struct LightingInit<'a> {
    pub global_layout: &'a wgpu::BindGroupLayout,
    pub clustering: &'a ClusteringProgram,
    pub clear_color: [f32; 4],
}

/// Full-screen deferred shading into the output surface.
pub struct LightingProgram {
    pipeline: wgpu::RenderPipeline,
    pub gbuffer_layout: wgpu::BindGroupLayout,
    cluster_bind_group: wgpu::BindGroup,
    _uniform_buffer: wgpu::Buffer,
}

impl GpuProgram for LightingProgram {
    type InitData<'a> = LightingInit<'a>;
    type DrawData<'a> = (
        &'a wgpu::BindGroup, // Global (Camera/Lights) - Group 0
        &'a GBuffer,         // Group 2
    );

    fn new(ctx: &GpuProgramRenderContext, init: Self::InitData<'_>) -> Self {
        let shader = create_shader(ctx, "Lighting Shader", include_str!("../shaders/lighting.wgsl"));

        let uniform_buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Lighting Uniforms"),
                contents: bytemuck::bytes_of(&LightingUniforms {
                    clear_color: init.clear_color,
                }),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let cluster_layout = ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Lighting Cluster Bind Group Layout"),
                entries: &[
                    uniform_entry(0, wgpu::ShaderStages::FRAGMENT),
                    storage_entry(1, wgpu::ShaderStages::FRAGMENT, true),
                    uniform_entry(2, wgpu::ShaderStages::FRAGMENT),
                ],
            });

        let cluster_bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Lighting Cluster Bind Group"),
            layout: &cluster_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: init.clustering.uniform_buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: init.clustering.records_buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniform_buffer.as_entire_binding(),
                },
            ],
        });

        let gbuffer_layout = GBuffer::bind_group_layout(ctx.device);

        let pipeline_layout = ctx
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Lighting Pipeline Layout"),
                bind_group_layouts: &[init.global_layout, &cluster_layout, &gbuffer_layout],
                push_constant_ranges: &[],
            });

        let pipeline = ctx
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                cache: None,
                label: Some("Lighting Pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: ctx.format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                depth_stencil: None,
                primitive: wgpu::PrimitiveState::default(),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });

        Self {
            pipeline,
            gbuffer_layout,
            cluster_bind_group,
            _uniform_buffer: uniform_buffer,
        }
    }

    fn record(&self, render_pass: &mut wgpu::RenderPass<'_>, data: Self::DrawData<'_>) {
        let (global_bind_group, gbuffer) = data;

        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, global_bind_group, &[]);
        render_pass.set_bind_group(1, &self.cluster_bind_group, &[]);
        render_pass.set_bind_group(2, &gbuffer.bind_group, &[]);
        render_pass.draw(0..3, 0..1);
    }
}
