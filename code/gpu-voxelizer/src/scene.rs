use glam::{Mat4, Vec3};

use crate::grid::Aabb;
use crate::mesh::MeshSnapshot;

/// 宿主场景/变换系统
/// 每个周期调用一次，用于推出网格参数
pub trait SceneTransform {
    fn local_to_world(&self) -> Mat4;

    /// 源网格的世界空间包围盒
    fn world_bounds(&self) -> Aabb;

    fn inverse_transform_point(&self, world: Vec3) -> Vec3 {
        self.local_to_world().inverse().transform_point3(world)
    }
}

/// 固定变换 + 固定包围盒
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticScene {
    pub local_to_world: Mat4,
    pub world_bounds: Aabb,
}

impl StaticScene {
    pub fn new(local_to_world: Mat4, world_bounds: Aabb) -> Self {
        Self {
            local_to_world,
            world_bounds,
        }
    }

    /// 由网格局部包围盒经变换得到世界包围盒
    pub fn from_mesh(mesh: &MeshSnapshot, local_to_world: Mat4) -> Self {
        Self::new(local_to_world, mesh.local_bounds().transformed(&local_to_world))
    }
}

impl SceneTransform for StaticScene {
    fn local_to_world(&self) -> Mat4 {
        self.local_to_world
    }

    fn world_bounds(&self) -> Aabb {
        self.world_bounds
    }
}
