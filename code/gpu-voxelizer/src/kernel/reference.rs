//! CPU 参考实现
//!
//! 与 `voxelize_mesh.wgsl` 逐步对应：相同的退化阈值、表面距离阈值与三角形遍历顺序。
//! 用于无计算设备的宿主以及 GPU 结果校验。

use glam::{UVec3, Vec3};

use crate::grid::GridParams;
use crate::mesh::MeshSnapshot;
use crate::occupancy::{OccupancyGrid, OccupancySample};

const SURFACE_EPSILON: f32 = 1e-4;
const DEGENERATE_AREA: f32 = 1e-12;

fn closest_point_on_triangle(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        return a + ab * (d1 / (d1 - d3));
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        return a + ac * (d2 / (d2 - d6));
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        return b + (c - b) * ((d4 - d3) / ((d4 - d3) + (d5 - d6)));
    }

    let denom = 1.0 / (va + vb + vc);
    a + ab * (vb * denom) + ac * (vc * denom)
}

fn solid_angle(a: Vec3, b: Vec3, c: Vec3) -> f32 {
    let (la, lb, lc) = (a.length(), b.length(), c.length());
    let numerator = a.dot(b.cross(c));
    let denominator = la * lb * lc + a.dot(b) * lc + b.dot(c) * la + c.dot(a) * lb;
    2.0 * numerator.atan2(denominator)
}

/// 点是否在网格内部或表面上
pub fn classify_point(mesh: &MeshSnapshot, point: Vec3, cell_size: f32) -> bool {
    let epsilon = SURFACE_EPSILON * cell_size;
    let mut winding = 0.0f32;
    for t in 0..mesh.triangle_count() {
        let [a, b, c] = mesh.triangle(t);
        let normal = (b - a).cross(c - a);
        if normal.length_squared() <= DEGENERATE_AREA {
            continue;
        }
        if closest_point_on_triangle(point, a, b, c).distance(point) <= epsilon {
            return true;
        }
        winding += solid_angle(a - point, b - point, c - point);
    }
    (winding / (4.0 * std::f32::consts::PI)).abs() >= 0.5
}

/// 在 CPU 上对整个网格体素化
pub fn voxelize(mesh: &MeshSnapshot, grid: &GridParams) -> OccupancyGrid {
    let dims = grid.dims;
    let mut samples = Vec::with_capacity(grid.cell_count() as usize);
    for z in 0..dims.z {
        for y in 0..dims.y {
            for x in 0..dims.x {
                let center = grid.cell_center(UVec3::new(x, y, z));
                let occupied = classify_point(mesh, center, grid.cell_size());
                samples.push(OccupancySample::new(center, occupied));
            }
        }
    }
    OccupancyGrid::new(*grid, samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Aabb;
    use crate::mesh::CellMesh;

    fn unit_cube() -> MeshSnapshot {
        let cube = CellMesh::generate(1.0);
        let vertices = cube.vertices.iter().map(|v| Vec3::from(v.position)).collect();
        MeshSnapshot::new(vertices, cube.indices).unwrap()
    }

    fn grid_over(min: f32, max: f32, half: f32) -> GridParams {
        let bounds = Aabb::new(Vec3::splat(min), Vec3::splat(max));
        GridParams::compute(&bounds, bounds.min, half).unwrap()
    }

    #[test]
    fn unit_cube_in_double_grid_occupies_one_corner_cell() {
        let grid = grid_over(0.0, 2.0, 0.5);
        let result = voxelize(&unit_cube(), &grid);

        assert_eq!(result.cell_count(), 8);
        assert_eq!(result.occupied_count(), 1);
        assert!(result.is_occupied(UVec3::ZERO));
        for (i, sample) in result.samples.iter().enumerate() {
            let c = sample.center();
            for axis in c.to_array() {
                assert!(axis == 0.5 || axis == 1.5, "sample {i} at {c}");
            }
        }
    }

    #[test]
    fn cells_inside_unit_cube_are_all_occupied() {
        let grid = grid_over(0.0, 1.0, 0.25);
        let result = voxelize(&unit_cube(), &grid);
        assert_eq!(grid.dims, UVec3::splat(2));
        assert_eq!(result.occupied_count(), 8);
        assert_eq!(result.sample(UVec3::ONE).unwrap().center(), Vec3::splat(0.75));
    }

    #[test]
    fn centers_on_the_surface_count_as_occupied() {
        // 中心恰好落在立方体角点与面上
        let grid = grid_over(-0.5, 1.5, 0.5);
        let result = voxelize(&unit_cube(), &grid);
        assert_eq!(result.sample(UVec3::ZERO).unwrap().center(), Vec3::ZERO);
        assert_eq!(result.occupied_count(), 8);
    }

    #[test]
    fn zero_triangle_mesh_is_all_empty() {
        let mesh = MeshSnapshot::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], Vec::new()).unwrap();
        let grid = grid_over(0.0, 1.0, 0.125);
        let result = voxelize(&mesh, &grid);
        assert_eq!(result.samples.len(), 64);
        assert_eq!(result.occupied_count(), 0);
    }

    #[test]
    fn inverted_winding_is_still_inside() {
        let cube = unit_cube();
        let flipped: Vec<u32> = cube
            .triangles()
            .chunks_exact(3)
            .flat_map(|t| [t[0], t[2], t[1]])
            .collect();
        let mesh = MeshSnapshot::new(cube.vertices().to_vec(), flipped).unwrap();
        assert!(classify_point(&mesh, Vec3::splat(0.5), 0.1));
        assert!(!classify_point(&mesh, Vec3::splat(1.5), 0.1));
    }

    #[test]
    fn point_outside_in_every_direction_is_empty() {
        let mesh = unit_cube();
        for p in [
            Vec3::new(-0.5, 0.5, 0.5),
            Vec3::new(0.5, 2.0, 0.5),
            Vec3::new(0.5, 0.5, -3.0),
            Vec3::splat(10.0),
        ] {
            assert!(!classify_point(&mesh, p, 0.1), "{p} should be outside");
        }
    }
}
