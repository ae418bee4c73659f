use glam::UVec3;
use wgpu::util::DeviceExt;

use crate::{
    cluster::{ClusterRecords, ClusterUniforms},
    error::RenderError,
    programs::{ComputeProgram, GpuProgramRenderContext, create_shader, storage_entry, uniform_entry},
};

/// Must match `@workgroup_size` in clustering.wgsl.
pub const CLUSTER_WORKGROUP_SIZE: UVec3 = UVec3::new(4, 4, 4);

pub struct ClusteringInit<'a> {
    pub global_layout: &'a wgpu::BindGroupLayout,
    pub uniforms: ClusterUniforms,
}

/// Cluster assignment on the device. Owns the per-cell record buffer the
/// lighting pass later binds read-only.
pub struct ClusteringProgram {
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    uniform_buffer: wgpu::Buffer,
    records_buffer: wgpu::Buffer,
    dims: UVec3,
}

/// Fails unless a record arena of `required` bytes can be created and bound
/// as one storage buffer under `limits`.
pub fn check_record_storage(required: u64, limits: &wgpu::Limits) -> Result<(), RenderError> {
    let limit = u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size);
    if required > limit {
        return Err(RenderError::ClusterStorageTooLarge { required, limit });
    }
    Ok(())
}

impl ClusteringProgram {
    pub fn uniform_buffer(&self) -> &wgpu::Buffer {
        &self.uniform_buffer
    }

    pub fn records_buffer(&self) -> &wgpu::Buffer {
        &self.records_buffer
    }

    /// Rewrites the uniforms, e.g. after the viewport changed.
    pub fn update(&self, queue: &wgpu::Queue, uniforms: &ClusterUniforms) {
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));
    }
}

impl ComputeProgram for ClusteringProgram {
    type InitData<'a> = ClusteringInit<'a>;
    /// Global bind group (camera + light set).
    type DispatchData<'a> = &'a wgpu::BindGroup;

    fn new(ctx: &GpuProgramRenderContext, init: Self::InitData<'_>) -> Self {
        let shader = create_shader(ctx, "Clustering Shader", include_str!("../shaders/clustering.wgsl"));

        let dims = UVec3::from_array(init.uniforms.dims);
        let cluster_count = dims.x as usize * dims.y as usize * dims.z as usize;
        let records_size =
            ClusterRecords::byte_size(cluster_count, init.uniforms.max_lights_per_cluster);
        log::info!(
            "cluster grid {}x{}x{}, {} lights per cluster, {:.1} MiB of records",
            dims.x,
            dims.y,
            dims.z,
            init.uniforms.max_lights_per_cluster,
            records_size as f64 / (1024.0 * 1024.0)
        );

        let uniform_buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Cluster Uniforms"),
                contents: bytemuck::bytes_of(&init.uniforms),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });

        let records_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Cluster Records"),
            size: records_size,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        let layout = ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Clustering Bind Group Layout"),
                entries: &[
                    uniform_entry(0, wgpu::ShaderStages::COMPUTE),
                    storage_entry(1, wgpu::ShaderStages::COMPUTE, false),
                ],
            });

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Clustering Bind Group"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: records_buffer.as_entire_binding(),
                },
            ],
        });

        let pipeline_layout = ctx
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Clustering Pipeline Layout"),
                bind_group_layouts: &[init.global_layout, &layout],
                push_constant_ranges: &[],
            });

        let pipeline = ctx
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Clustering Pipeline"),
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
            records_buffer,
            dims,
        }
    }

    fn dispatch(&self, cpass: &mut wgpu::ComputePass<'_>, global_bind_group: Self::DispatchData<'_>) {
        let workgroups = (self.dims + CLUSTER_WORKGROUP_SIZE - UVec3::ONE) / CLUSTER_WORKGROUP_SIZE;
        log::debug!("assign_clusters: {workgroups} workgroups");

        cpass.set_pipeline(&self.pipeline);
        cpass.set_bind_group(0, global_bind_group, &[]);
        cpass.set_bind_group(1, &self.bind_group, &[]);
        cpass.dispatch_workgroups(workgroups.x, workgroups.y, workgroups.z);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_grid_fits_default_limits() {
        let required = ClusterRecords::byte_size(32 * 16 * 64, 511);
        assert_eq!(required, 64 * 1024 * 1024);
        assert!(check_record_storage(required, &wgpu::Limits::default()).is_ok());
    }

    #[test]
    fn oversized_grid_is_an_error() {
        let limits = wgpu::Limits::default();
        let required = ClusterRecords::byte_size(64 * 32 * 128, 511);
        let err = check_record_storage(required, &limits).unwrap_err();
        assert!(matches!(
            err,
            RenderError::ClusterStorageTooLarge { required: r, limit }
                if r == required && limit == u64::from(limits.max_storage_buffer_binding_size)
        ));
    }
}
