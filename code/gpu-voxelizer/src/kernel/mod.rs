// src/kernel/mod.rs
//! GPU operator: 网格体素化
//!
//! 每个格点一个调用，输出 `OccupancySample`。绑定布局：
//! binding 0: VoxelizeParams（统一体）
//! binding 1: 源网格顶点（vec4，w 为填充）
//! binding 2: 源网格三角形索引
//! binding 3: 占用缓冲区（输出）

mod params;
pub mod reference;
mod source;

use glam::{UVec3, Vec3};
use wgpu::ShaderStages;

use crate::buffers::{BufferManager, GpuElement};
use crate::context::GpuContext;
use crate::error::ComputeError;
use crate::grid::GridParams;
use crate::occupancy::OccupancySample;
pub use params::VoxelizeParams;
pub use source::{BUILTIN_WGSL, DEFAULT_ENTRY_POINT, KernelSource};

/// 已编译的体素化程序
pub struct VoxelizeKernel {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,
    workgroup_size: UVec3,
    entry_point: String,
}

impl VoxelizeKernel {
    /// 加载内置程序
    pub async fn builtin(device: &wgpu::Device) -> Result<Self, ComputeError> {
        Self::load(device, &KernelSource::builtin()).await
    }

    /// 检查并编译计算程序；入口、工作组大小与绑定任何一项不符都立即失败
    pub async fn load(
        device: &wgpu::Device,
        source: &KernelSource<'_>,
    ) -> Result<Self, ComputeError> {
        let workgroup_size = source::workgroup_size(source)?;
        source::validate_bindings(source)?;
        check_workgroup_limits(device, workgroup_size)?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("voxelize_mesh.wgsl"),
            source: wgpu::ShaderSource::Wgsl(source.wgsl.clone()),
        });
        let desc = |i, read_only, min_size| wgpu::BindGroupLayoutEntry {
            binding: i,
            visibility: ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: Some(min_size),
            },
            count: None,
        };
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("voxelize_mesh_layout"),
            entries: &[
                // binding 0: 常量统一体
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: Some(VoxelizeParams::min_binding_size()),
                    },
                    count: None,
                },
                desc(1, true, <Vec3 as GpuElement>::MIN_BINDING_SIZE),
                desc(2, true, <u32 as GpuElement>::MIN_BINDING_SIZE),
                desc(3, false, <OccupancySample as GpuElement>::MIN_BINDING_SIZE),
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("voxelize_mesh_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("voxelize_mesh_pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some(source.entry_point.as_ref()),
            compilation_options: Default::default(),
            cache: None,
        });
        if let Some(error) = device.pop_error_scope().await {
            return Err(ComputeError::ShaderCompilation(error.to_string()));
        }

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("voxelize_params_buffer"),
            size: std::mem::size_of::<VoxelizeParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        log::info!(
            "loaded voxelize kernel `{}` with workgroup size {workgroup_size}",
            source.entry_point
        );
        Ok(Self {
            pipeline,
            bind_group_layout,
            params_buffer,
            workgroup_size,
            entry_point: source.entry_point.to_string(),
        })
    }

    pub fn workgroup_size(&self) -> UVec3 {
        self.workgroup_size
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// 检查网格是否在设备限制内，返回每轴工作组数
    pub fn check_grid(
        &self,
        device: &wgpu::Device,
        grid: &GridParams,
    ) -> Result<UVec3, ComputeError> {
        let limits = device.limits();
        let cells = grid.cell_count();
        let bytes = cells.saturating_mul(<OccupancySample as GpuElement>::STRIDE_SIZE as u64);
        if bytes > limits.max_storage_buffer_binding_size as u64 {
            return Err(ComputeError::GridTooLarge {
                cells,
                reason: format!(
                    "{bytes} bytes > max_storage_buffer_binding_size {}",
                    limits.max_storage_buffer_binding_size
                ),
            });
        }
        let groups = grid.dispatch_groups(self.workgroup_size);
        if groups.max_element() > limits.max_compute_workgroups_per_dimension {
            return Err(ComputeError::GridTooLarge {
                cells,
                reason: format!(
                    "{groups} workgroups > max_compute_workgroups_per_dimension {}",
                    limits.max_compute_workgroups_per_dimension
                ),
            });
        }
        Ok(groups)
    }

    /// 编码并提交一次体素化分派
    /// 缓冲区必须已经由 `BufferManager::ensure_*` 准备好
    pub fn dispatch(
        &self,
        ctx: &GpuContext,
        grid: &GridParams,
        buffers: &BufferManager,
    ) -> Result<UVec3, ComputeError> {
        let device = ctx.device();
        let groups = self.check_grid(device, grid)?;
        let (Some(points), Some(vertices), Some(triangles)) =
            (buffers.occupancy(), buffers.vertices(), buffers.triangles())
        else {
            return Err(ComputeError::Execution(
                "voxelize dispatched before buffers were allocated".to_string(),
            ));
        };
        if points.len() as u64 != grid.cell_count() {
            return Err(ComputeError::Execution(format!(
                "occupancy buffer holds {} cells, grid has {}",
                points.len(),
                grid.cell_count()
            )));
        }

        let params = VoxelizeParams::new(grid, buffers.uploaded_triangle_count());
        ctx.queue()
            .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("voxelize_mesh_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: vertices.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: triangles.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: points.buffer().as_entire_binding(),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("voxelize_mesh_command_encoder"),
        });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("voxelize_mesh_compute_pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.pipeline);
            compute_pass.set_bind_group(0, &bind_group, &[]);
            compute_pass.dispatch_workgroups(groups.x, groups.y, groups.z);
        }
        ctx.queue().submit(std::iter::once(encoder.finish()));
        log::debug!(
            "dispatched {} with {groups} workgroups for {} cells",
            self.entry_point,
            grid.cell_count()
        );
        Ok(groups)
    }
}

fn check_workgroup_limits(device: &wgpu::Device, size: UVec3) -> Result<(), ComputeError> {
    let limits = device.limits();
    let max = UVec3::new(
        limits.max_compute_workgroup_size_x,
        limits.max_compute_workgroup_size_y,
        limits.max_compute_workgroup_size_z,
    );
    let invocations = size.x as u64 * size.y as u64 * size.z as u64;
    if size.cmpgt(max).any() || invocations > limits.max_compute_invocations_per_workgroup as u64 {
        return Err(ComputeError::ShaderCompilation(format!(
            "workgroup size {size} exceeds device limits {max} / {} invocations",
            limits.max_compute_invocations_per_workgroup
        )));
    }
    Ok(())
}
