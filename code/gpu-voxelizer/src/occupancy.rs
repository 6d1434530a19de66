use bytemuck::{Pod, Zeroable};
use glam::{UVec3, Vec3};

use crate::grid::GridParams;

/// 每个格点一条记录，对应着色器中的 `vec4<f32>`
/// xyz = 局部空间格点中心，w = 占用标记
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct OccupancySample {
    pub center: [f32; 3],
    pub occupancy: f32,
}

impl OccupancySample {
    pub const OCCUPIED: f32 = 1.0;
    pub const EMPTY: f32 = 0.0;

    pub fn new(center: Vec3, occupied: bool) -> Self {
        Self {
            center: center.to_array(),
            occupancy: if occupied { Self::OCCUPIED } else { Self::EMPTY },
        }
    }

    pub fn center(&self) -> Vec3 {
        Vec3::from(self.center)
    }

    pub fn is_occupied(&self) -> bool {
        self.occupancy >= 0.5
    }
}

/// 一次体素化的结果
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyGrid {
    pub params: GridParams,
    /// 关闭回读时为空
    pub samples: Vec<OccupancySample>,
}

impl OccupancyGrid {
    pub fn new(params: GridParams, samples: Vec<OccupancySample>) -> Self {
        Self { params, samples }
    }

    pub fn cell_count(&self) -> u64 {
        self.params.cell_count()
    }

    pub fn has_samples(&self) -> bool {
        !self.samples.is_empty()
    }

    pub fn sample(&self, coord: UVec3) -> Option<&OccupancySample> {
        self.params
            .index_of(coord)
            .and_then(|i| self.samples.get(i))
    }

    pub fn is_occupied(&self, coord: UVec3) -> bool {
        self.sample(coord).is_some_and(OccupancySample::is_occupied)
    }

    pub fn occupied_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_occupied()).count()
    }

    /// 被占用格点的 (坐标, 局部中心)
    pub fn occupied(&self) -> impl Iterator<Item = (UVec3, Vec3)> + '_ {
        self.samples
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_occupied())
            .filter_map(|(i, s)| self.params.coord_of(i).map(|c| (c, s.center())))
    }
}
