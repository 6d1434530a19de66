//! 可视化提交
//!
//! 两条互相独立的间接绘制路径，都直接读取占用缓冲区，不做主机端拷贝：
//! 点路径 `{1, N, 0, 0, 0}`，实例化立方体路径 `{T, N, 0, 0, 0}`。

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use wgpu::ShaderStages;
use wgpu::util::DeviceExt;

use crate::buffers::GpuElement;
use crate::context::GpuContext;
use crate::grid::Aabb;
use crate::mesh::{CellVertex, GpuCellMesh};
use crate::occupancy::OccupancySample;

/// 内置材质程序：`vs_points`、`vs_blocks`、`fs_main`
pub const MATERIAL_WGSL: &str = include_str!("voxel_material.wgsl");

/// 间接过程化点绘制
pub struct ProceduralDraw<'a> {
    pub topology: wgpu::PrimitiveTopology,
    pub points: &'a wgpu::Buffer,
    pub local_to_world: Mat4,
    pub bounds_min: Vec3,
    /// 世界空间包围盒，供宿主剔除
    pub bounds: Aabb,
    pub args: &'a wgpu::Buffer,
}

/// 间接实例化网格绘制
pub struct InstancedDraw<'a> {
    pub mesh: &'a GpuCellMesh,
    pub submesh: u32,
    pub positions: &'a wgpu::Buffer,
    pub local_to_world: Mat4,
    pub bounds_min: Vec3,
    pub bounds: Aabb,
    pub args: &'a wgpu::Buffer,
}

/// 绘制提交层
pub trait DrawSubmitter {
    fn draw_procedural_indirect(&mut self, draw: &ProceduralDraw<'_>);
    fn draw_mesh_instanced_indirect(&mut self, draw: &InstancedDraw<'_>);
}

/// 材质统一体：binding 0
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct MaterialUniforms {
    pub view_proj: Mat4,
    pub local_to_world: Mat4,
    pub bounds_min: Vec3,
    /// 体素边长；点路径为 0
    pub cell_size: f32,
}

/// 绘制材质：渲染管线 + 本库约定的绑定布局
/// binding 0: MaterialUniforms，binding 1: 占用缓冲区（只读存储）
pub struct VoxelMaterial {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    topology: wgpu::PrimitiveTopology,
}

impl VoxelMaterial {
    /// 宿主用它构建管线布局
    pub fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("voxel_material_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<MaterialUniforms>() as u64,
                        ),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: Some(<OccupancySample as GpuElement>::MIN_BINDING_SIZE),
                    },
                    count: None,
                },
            ],
        })
    }

    /// 包装宿主自建的管线；`topology` 必须与管线的图元拓扑一致
    pub fn new(
        pipeline: wgpu::RenderPipeline,
        bind_group_layout: wgpu::BindGroupLayout,
        topology: wgpu::PrimitiveTopology,
    ) -> Self {
        Self {
            pipeline,
            bind_group_layout,
            topology,
        }
    }

    /// 内置点材质，输出到 `format`
    pub fn points(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        Self::builtin(device, format, "vs_points", &[], wgpu::PrimitiveTopology::PointList)
    }

    /// 内置立方体材质，顶点格式为 `CellVertex`，双面绘制
    pub fn blocks(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        Self::builtin(
            device,
            format,
            "vs_blocks",
            &[CellVertex::layout()],
            wgpu::PrimitiveTopology::TriangleList,
        )
    }

    fn builtin(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        vertex_entry: &str,
        buffers: &[wgpu::VertexBufferLayout<'_>],
        topology: wgpu::PrimitiveTopology,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("voxel_material.wgsl"),
            source: wgpu::ShaderSource::Wgsl(MATERIAL_WGSL.into()),
        });
        let bind_group_layout = Self::create_bind_group_layout(device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("voxel_material_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(vertex_entry),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some(vertex_entry),
                compilation_options: Default::default(),
                buffers,
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        Self::new(pipeline, bind_group_layout, topology)
    }

    pub fn topology(&self) -> wgpu::PrimitiveTopology {
        self.topology
    }

    /// 每次绘制一个新的统一体缓冲区，同一通道内的多次绘制互不覆盖
    fn bind(
        &self,
        device: &wgpu::Device,
        uniforms: &MaterialUniforms,
        points: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        let uniforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("voxel_material_uniforms"),
            contents: bytemuck::bytes_of(uniforms),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("voxel_material_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: points.as_entire_binding(),
                },
            ],
        })
    }
}

/// 把绘制录制进一个 `wgpu::RenderPass`
pub struct PassSubmitter<'p, 'e> {
    ctx: &'p GpuContext,
    pass: &'p mut wgpu::RenderPass<'e>,
    view_proj: Mat4,
    points_material: Option<&'p VoxelMaterial>,
    blocks_material: Option<&'p VoxelMaterial>,
}

impl<'p, 'e> PassSubmitter<'p, 'e> {
    pub fn new(ctx: &'p GpuContext, pass: &'p mut wgpu::RenderPass<'e>) -> Self {
        Self {
            ctx,
            pass,
            view_proj: Mat4::IDENTITY,
            points_material: None,
            blocks_material: None,
        }
    }

    /// 相机的观察投影矩阵，默认单位矩阵（世界坐标即裁剪坐标）
    pub fn with_view_proj(mut self, view_proj: Mat4) -> Self {
        self.view_proj = view_proj;
        self
    }

    pub fn with_points_material(mut self, material: &'p VoxelMaterial) -> Self {
        self.points_material = Some(material);
        self
    }

    pub fn with_blocks_material(mut self, material: &'p VoxelMaterial) -> Self {
        self.blocks_material = Some(material);
        self
    }
}

impl DrawSubmitter for PassSubmitter<'_, '_> {
    fn draw_procedural_indirect(&mut self, draw: &ProceduralDraw<'_>) {
        let Some(material) = self.points_material else {
            log::warn!("point draw skipped: no points material");
            return;
        };
        if material.topology != draw.topology {
            log::warn!(
                "point draw skipped: material topology {:?} != {:?}",
                material.topology,
                draw.topology
            );
            return;
        }
        let uniforms = MaterialUniforms {
            view_proj: self.view_proj,
            local_to_world: draw.local_to_world,
            bounds_min: draw.bounds_min,
            cell_size: 0.0,
        };
        let bind_group = material.bind(self.ctx.device(), &uniforms, draw.points);
        self.pass.set_pipeline(&material.pipeline);
        self.pass.set_bind_group(0, &bind_group, &[]);
        self.pass.draw_indirect(draw.args, 0);
    }

    fn draw_mesh_instanced_indirect(&mut self, draw: &InstancedDraw<'_>) {
        let Some(material) = self.blocks_material else {
            log::warn!("block draw skipped: no blocks material");
            return;
        };
        if material.topology != wgpu::PrimitiveTopology::TriangleList {
            log::warn!(
                "block draw skipped: material topology {:?} is not a triangle list",
                material.topology
            );
            return;
        }
        let uniforms = MaterialUniforms {
            view_proj: self.view_proj,
            local_to_world: draw.local_to_world,
            bounds_min: draw.bounds_min,
            cell_size: draw.mesh.size,
        };
        let bind_group = material.bind(self.ctx.device(), &uniforms, draw.positions);
        self.pass.set_pipeline(&material.pipeline);
        self.pass.set_bind_group(0, &bind_group, &[]);
        self.pass.set_vertex_buffer(0, draw.mesh.vertex_buffer.slice(..));
        self.pass
            .set_index_buffer(draw.mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        self.pass.draw_indexed_indirect(draw.args, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn material_uniforms_match_wgsl_layout() {
        assert_eq!(std::mem::size_of::<MaterialUniforms>(), 144);
        assert_eq!(std::mem::offset_of!(MaterialUniforms, local_to_world), 64);
        assert_eq!(std::mem::offset_of!(MaterialUniforms, bounds_min), 128);
        assert_eq!(std::mem::offset_of!(MaterialUniforms, cell_size), 140);
    }

    #[test]
    fn material_shader_declares_both_paths() {
        for entry in ["fn vs_points(", "fn vs_blocks(", "fn fs_main("] {
            assert!(MATERIAL_WGSL.contains(entry), "missing {entry}");
        }
    }
}
