//! 单个体素的立方体网格
//!
//! 每个面 4 个独立顶点（共 24 个），以便每面使用平直法线；12 个三角形，
//! 从外部看为逆时针（`wgpu::FrontFace::Ccw`）。

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use wgpu::util::DeviceExt;

use crate::grid::Aabb;

pub const CELL_VERTEX_COUNT: usize = 24;
pub const CELL_INDEX_COUNT: usize = 36;

// 面顺序：前(-Z) 上(+Y) 右(+X) 左(-X) 后(+Z) 下(-Y)
const UNIT_CORNERS: [[f32; 3]; CELL_VERTEX_COUNT] = [
    // Front
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [1.0, 1.0, 0.0],
    [0.0, 1.0, 0.0],
    // Top
    [1.0, 1.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 1.0, 1.0],
    [1.0, 1.0, 1.0],
    // Right
    [1.0, 0.0, 0.0],
    [1.0, 1.0, 0.0],
    [1.0, 1.0, 1.0],
    [1.0, 0.0, 1.0],
    // Left
    [0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 1.0, 1.0],
    [0.0, 0.0, 1.0],
    // Back
    [0.0, 1.0, 1.0],
    [1.0, 1.0, 1.0],
    [1.0, 0.0, 1.0],
    [0.0, 0.0, 1.0],
    // Bottom
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [1.0, 0.0, 1.0],
    [0.0, 0.0, 1.0],
];

const CELL_INDICES: [u32; CELL_INDEX_COUNT] = [
    0, 2, 1, 0, 3, 2, // Front
    4, 5, 6, 4, 6, 7, // Top
    8, 9, 10, 8, 10, 11, // Right
    12, 15, 14, 12, 14, 13, // Left
    17, 16, 19, 17, 19, 18, // Back
    20, 22, 23, 20, 21, 22, // Bottom
];

/// 顶点格式：位置 + 法线
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct CellVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl CellVertex {
    pub const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// CPU 端立方体网格
#[derive(Debug, Clone, PartialEq)]
pub struct CellMesh {
    pub size: f32,
    pub vertices: Vec<CellVertex>,
    pub indices: Vec<u32>,
    pub bounds: Aabb,
}

impl CellMesh {
    /// 生成覆盖 `[0, size]^3` 的立方体
    pub fn generate(size: f32) -> Self {
        let positions: Vec<Vec3> = UNIT_CORNERS
            .iter()
            .map(|c| Vec3::from(*c) * size)
            .collect();
        let indices = CELL_INDICES.to_vec();
        let normals = recalculate_normals(&positions, &indices);
        let vertices = positions
            .iter()
            .zip(&normals)
            .map(|(p, n)| CellVertex {
                position: p.to_array(),
                normal: n.to_array(),
            })
            .collect();
        Self {
            size,
            vertices,
            indices,
            bounds: Aabb::from_points(&positions),
        }
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn upload(&self, device: &wgpu::Device) -> GpuCellMesh {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("cell_mesh_vertices"),
            contents: bytemuck::cast_slice(&self.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("cell_mesh_indices"),
            contents: bytemuck::cast_slice(&self.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        GpuCellMesh {
            size: self.size,
            vertex_buffer,
            index_buffer,
            index_count: self.index_count(),
        }
    }
}

/// 按面积加权累加面法线后归一化
fn recalculate_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| positions[i as usize]);
        let face = (b - a).cross(c - a);
        for &i in tri {
            normals[i as usize] += face;
        }
    }
    normals.into_iter().map(Vec3::normalize_or_zero).collect()
}

/// 已上传到 GPU 的立方体网格
pub struct GpuCellMesh {
    pub size: f32,
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

impl GpuCellMesh {
    pub(crate) fn release(self) {
        self.vertex_buffer.destroy();
        self.index_buffer.destroy();
    }
}
