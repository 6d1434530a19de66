//! 网格几何：由包围盒与体素半边长推出网格维度与 `bounds_min`
//!
//! 线性化顺序 `i = x + y * W + z * W * H`，与 `voxelize_mesh.wgsl` 的写入顺序一致。

use glam::{Mat4, UVec3, Vec3};

use crate::error::ConfigError;

/// 轴对齐包围盒
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// 点集的包围盒；空集返回原点处的退化盒
    pub fn from_points(points: &[Vec3]) -> Self {
        let Some(first) = points.first() else {
            return Self::new(Vec3::ZERO, Vec3::ZERO);
        };
        points.iter().fold(Self::new(*first, *first), |acc, p| {
            Self::new(acc.min.min(*p), acc.max.max(*p))
        })
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// 半尺寸（盒中心到各面的距离）
    pub fn half_extents(&self) -> Vec3 {
        self.size() * 0.5
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// 变换 8 个角点后重新求包围盒
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        let corners: [Vec3; 8] = std::array::from_fn(|i| {
            Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            )
        });
        let world = corners.map(|c| matrix.transform_point3(c));
        Self::from_points(&world)
    }
}

/// 网格参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridParams {
    pub cell_half_size: f32,
    /// 体素化器局部空间中的网格最小角
    pub bounds_min: Vec3,
    /// 每轴格点数，均 >= 1
    pub dims: UVec3,
}

impl GridParams {
    /// `dims = max(1, ceil(half_extents / cell_half_size))`
    ///
    /// `bounds` 是世界空间包围盒，`bounds_min_local` 是其最小角在局部空间中的位置。
    pub fn compute(
        bounds: &Aabb,
        bounds_min_local: Vec3,
        cell_half_size: f32,
    ) -> Result<Self, ConfigError> {
        if !cell_half_size.is_finite() || cell_half_size <= 0.0 {
            return Err(ConfigError::InvalidCellHalfSize(cell_half_size));
        }
        let counts = (bounds.half_extents() / cell_half_size).ceil();
        let dims = UVec3::new(axis_dim(counts.x), axis_dim(counts.y), axis_dim(counts.z));
        Ok(Self {
            cell_half_size,
            bounds_min: bounds_min_local,
            dims,
        })
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_half_size * 2.0
    }

    /// 格点总数，u64 避免大网格溢出
    pub fn cell_count(&self) -> u64 {
        self.dims.x as u64 * self.dims.y as u64 * self.dims.z as u64
    }

    pub fn contains(&self, coord: UVec3) -> bool {
        coord.cmplt(self.dims).all()
    }

    pub fn index_of(&self, coord: UVec3) -> Option<usize> {
        if !self.contains(coord) {
            return None;
        }
        let (w, h) = (self.dims.x as usize, self.dims.y as usize);
        Some(coord.x as usize + coord.y as usize * w + coord.z as usize * w * h)
    }

    pub fn coord_of(&self, index: usize) -> Option<UVec3> {
        if index as u64 >= self.cell_count() {
            return None;
        }
        let (w, h) = (self.dims.x as usize, self.dims.y as usize);
        Some(UVec3::new(
            (index % w) as u32,
            ((index / w) % h) as u32,
            (index / (w * h)) as u32,
        ))
    }

    /// 局部空间中的格点中心
    pub fn cell_center(&self, coord: UVec3) -> Vec3 {
        self.bounds_min + (coord.as_vec3() + Vec3::splat(0.5)) * self.cell_size()
    }

    /// 覆盖整个网格所需的工作组数 `ceil(dims / group_size)`
    pub fn dispatch_groups(&self, group_size: UVec3) -> UVec3 {
        UVec3::new(
            self.dims.x.div_ceil(group_size.x.max(1)),
            self.dims.y.div_ceil(group_size.y.max(1)),
            self.dims.z.div_ceil(group_size.z.max(1)),
        )
    }
}

fn axis_dim(count: f32) -> u32 {
    // NaN 与负数都落到 1
    if count >= 1.0 { count as u32 } else { 1 }
}
