use glam::Vec3;

use crate::error::MeshError;
use crate::grid::Aabb;

/// 源网格快照
/// 局部空间顶点 + 扁平化三角形索引（每 3 个一组）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshSnapshot {
    vertices: Vec<Vec3>,
    triangles: Vec<u32>,
}

impl MeshSnapshot {
    /// 校验索引后构造
    pub fn new(vertices: Vec<Vec3>, triangles: Vec<u32>) -> Result<Self, MeshError> {
        if triangles.len() % 3 != 0 {
            return Err(MeshError::RaggedTriangles(triangles.len()));
        }
        if let Some(&index) = triangles.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(MeshError::IndexOutOfRange {
                index,
                vertex_count: vertices.len(),
            });
        }
        Ok(Self {
            vertices,
            triangles,
        })
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    pub fn triangles(&self) -> &[u32] {
        &self.triangles
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len() / 3
    }

    pub fn triangle(&self, t: usize) -> [Vec3; 3] {
        let i = &self.triangles[t * 3..t * 3 + 3];
        [
            self.vertices[i[0] as usize],
            self.vertices[i[1] as usize],
            self.vertices[i[2] as usize],
        ]
    }

    pub fn local_bounds(&self) -> Aabb {
        Aabb::from_points(&self.vertices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_ragged_index_list() {
        let err = MeshSnapshot::new(vec![Vec3::ZERO; 3], vec![0, 1]).unwrap_err();
        assert_eq!(err, MeshError::RaggedTriangles(2));
    }

    #[test]
    fn rejects_out_of_range_index() {
        let err = MeshSnapshot::new(vec![Vec3::ZERO; 3], vec![0, 1, 3]).unwrap_err();
        assert_eq!(
            err,
            MeshError::IndexOutOfRange {
                index: 3,
                vertex_count: 3
            }
        );
    }

    #[test]
    fn empty_mesh_is_valid() {
        let mesh = MeshSnapshot::new(Vec::new(), Vec::new()).unwrap();
        assert_eq!(mesh.triangle_count(), 0);
        assert_eq!(mesh.local_bounds(), Aabb::new(Vec3::ZERO, Vec3::ZERO));
    }
}
