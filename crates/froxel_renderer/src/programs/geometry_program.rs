use wgpu::RenderPipeline;

use crate::{
    gbuffer::COLOR_FORMATS,
    mesh::Vertex,
    programs::{GpuProgram, GpuProgramRenderContext, create_shader, uniform_entry},
    scene::GpuScene,
    texture::TextureHelper,
};

/// Rasterizes the scene into the G-buffer. Writes surface attributes only.
pub struct GeometryProgram {
    pipeline: RenderPipeline,
    pub material_layout: wgpu::BindGroupLayout,
    pub mesh_layout: wgpu::BindGroupLayout,
}

impl GpuProgram for GeometryProgram {
    type InitData<'a> = &'a wgpu::BindGroupLayout;
    type DrawData<'a> = (
        &'a wgpu::BindGroup, // Global (Camera) - Group 0
        &'a GpuScene,        // Materials and meshes - Group 1 & 2
    );

    fn new(ctx: &GpuProgramRenderContext, global_layout: Self::InitData<'_>) -> Self {
        let shader = create_shader(ctx, "Geometry Shader", include_str!("../shaders/geometry.wgsl"));

        let material_bind_group_layout =
            ctx.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("Material Bind Group Layout"),
                    entries: &[
                        // --- BINDING 0: Material Settings (Uniform Buffer) ---
                        uniform_entry(0, wgpu::ShaderStages::FRAGMENT),
                        // --- BINDING 1: Diffuse Texture ---
                        wgpu::BindGroupLayoutEntry {
                            binding: 1,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Texture {
                                multisampled: false,
                                view_dimension: wgpu::TextureViewDimension::D2,
                                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            },
                            count: None,
                        },
                        // --- BINDING 2: Sampler ---
                        wgpu::BindGroupLayoutEntry {
                            binding: 2,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                            count: None,
                        },
                    ],
                });

        let mesh_bind_group_layout =
            ctx.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("Mesh Bind Group Layout"),
                    entries: &[
                        // --- BINDING 0: Model + Normal Matrix ---
                        uniform_entry(0, wgpu::ShaderStages::VERTEX),
                    ],
                });

        let render_pipeline_layout =
            ctx.device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("Geometry Pipeline Layout"),
                    bind_group_layouts: &[
                        global_layout,
                        &material_bind_group_layout,
                        &mesh_bind_group_layout,
                    ],
                    push_constant_ranges: &[],
                });

        let targets = COLOR_FORMATS.map(|format| {
            Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })
        });

        let pipeline = ctx
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                cache: None,
                label: Some("Geometry Pipeline"),
                layout: Some(&render_pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &[Vertex::desc()],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &targets,
                }),
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: TextureHelper::DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less, // Closer pixels win
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: Some(wgpu::Face::Back),
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });

        Self {
            pipeline,
            material_layout: material_bind_group_layout,
            mesh_layout: mesh_bind_group_layout,
        }
    }

    fn record(&self, render_pass: &mut wgpu::RenderPass<'_>, data: Self::DrawData<'_>) {
        let (global_bind_group, scene) = data;

        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, global_bind_group, &[]);

        for object in &scene.instances {
            let (Some(material), Some(geometry)) = (
                scene.materials.get(object.material),
                scene.geometries.get(object.mesh),
            ) else {
                continue;
            };

            render_pass.set_bind_group(1, &material.bind_group, &[]);
            render_pass.set_bind_group(2, &object.instance.bind_group, &[]);
            render_pass.set_vertex_buffer(0, geometry.vertex_buffer.slice(..));
            render_pass.set_index_buffer(geometry.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(0..geometry.index_count, 0, 0..1);
        }
    }
}
