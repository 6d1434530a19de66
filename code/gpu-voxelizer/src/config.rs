use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

bitflags! {
    /// 启用的可视化绘制路径
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DrawPaths: u8 {
        /// 每个格点一个点图元
        const POINTS = 0b01;
        /// 每个格点一个实例化立方体
        const BLOCKS = 0b10;
    }
}

/// 体素化配置
/// 宿主通过构造注入；由 `validate` 在构造 `Voxelizer` 时检查
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoxelizerConfig {
    /// 体素边长的一半，网格线性分辨率
    pub cell_half_size: f32,
    pub draw_points: bool,
    pub draw_blocks: bool,
    /// 每次计算后是否同步回读占用缓冲区
    /// 关闭时只报告格点数量（由维度推出）
    pub readback: bool,
}

impl Default for VoxelizerConfig {
    fn default() -> Self {
        Self {
            cell_half_size: 0.05,
            draw_points: false,
            draw_blocks: false,
            readback: true,
        }
    }
}

impl VoxelizerConfig {
    pub fn with_cell_half_size(mut self, cell_half_size: f32) -> Self {
        self.cell_half_size = cell_half_size;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.cell_half_size.is_finite() || self.cell_half_size <= 0.0 {
            return Err(ConfigError::InvalidCellHalfSize(self.cell_half_size));
        }
        Ok(())
    }

    pub fn draw_paths(&self) -> DrawPaths {
        let mut paths = DrawPaths::empty();
        paths.set(DrawPaths::POINTS, self.draw_points);
        paths.set(DrawPaths::BLOCKS, self.draw_blocks);
        paths
    }
}
