use bytemuck::{Pod, Zeroable};
use glam::{UVec3, Vec3};

use crate::grid::GridParams;

/// 对应 WGSL 中的 `VoxelizeParams` 统一体（32 字节）
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct VoxelizeParams {
    pub bounds_min: Vec3, // 网格最小角（局部空间）
    pub cell_half_size: f32,
    pub grid_dims: UVec3, // 每轴格点数
    pub triangle_count: u32,
}

impl VoxelizeParams {
    pub fn new(grid: &GridParams, triangle_count: u32) -> Self {
        Self {
            bounds_min: grid.bounds_min,
            cell_half_size: grid.cell_half_size,
            grid_dims: grid.dims,
            triangle_count,
        }
    }

    pub fn min_binding_size() -> wgpu::BufferSize {
        match wgpu::BufferSize::new(std::mem::size_of::<Self>() as u64) {
            Some(size) => size,
            None => unreachable!("VoxelizeParams is not zero-sized"),
        }
    }
}
