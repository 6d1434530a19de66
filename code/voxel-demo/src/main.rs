use std::error::Error;
use std::path::Path;

use glam::{Mat4, Vec3};
use gpu_voxelizer::kernel::reference;
use gpu_voxelizer::{
    CellMesh, GpuContext, MeshSnapshot, StaticScene, VoxelizeKernel, Voxelizer, VoxelizerConfig,
};
use serde::Deserialize;

/// 演示参数，可由 TOML 文件覆盖
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
struct DemoConfig {
    cycles: u32,
    degrees_per_cycle: f32,
    /// 源立方体边长
    mesh_size: f32,
    voxelizer: VoxelizerConfig,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            cycles: 4,
            degrees_per_cycle: 30.0,
            mesh_size: 1.0,
            voxelizer: VoxelizerConfig::default(),
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<DemoConfig, Box<dyn Error>> {
    let Some(path) = path else {
        return Ok(DemoConfig::default());
    };
    let text = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&text)?)
}

/// 以原点为中心的立方体
fn centered_cube(size: f32) -> Result<MeshSnapshot, Box<dyn Error>> {
    let cube = CellMesh::generate(size);
    let offset = Vec3::splat(size * 0.5);
    let vertices = cube
        .vertices
        .iter()
        .map(|v| Vec3::from(v.position) - offset)
        .collect();
    Ok(MeshSnapshot::new(vertices, cube.indices)?)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let path = std::env::args().nth(1);
    let config = load_config(path.as_deref().map(Path::new))?;
    log::info!("demo config: {config:?}");

    let ctx = pollster::block_on(GpuContext::request())?;
    let kernel = pollster::block_on(VoxelizeKernel::builtin(ctx.device()))?;
    let mut voxelizer = Voxelizer::new(ctx, kernel, config.voxelizer)?;
    let mesh = centered_cube(config.mesh_size)?;

    for cycle in 0..config.cycles {
        let angle = (cycle as f32 * config.degrees_per_cycle).to_radians();
        let scene = StaticScene::from_mesh(&mesh, Mat4::from_rotation_y(angle));
        let Some(grid) = voxelizer.recompute(Some(&mesh), &scene)? else {
            continue;
        };

        if grid.has_samples() {
            let cpu = reference::voxelize(&mesh, &grid.params);
            if cpu.occupied_count() != grid.occupied_count() {
                log::warn!(
                    "cycle {cycle}: gpu occupied {} != cpu occupied {}",
                    grid.occupied_count(),
                    cpu.occupied_count()
                );
            }
        }
        log::info!(
            "cycle {cycle}: {:.0} deg, dims {}, {} cells, {} occupied",
            angle.to_degrees(),
            grid.params.dims,
            grid.cell_count(),
            grid.occupied_count()
        );
    }

    let released = voxelizer.deactivate();
    log::info!("released {released} buffers");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_toml() {
        let config: DemoConfig = toml::from_str(
            r#"
            cycles = 2

            [voxelizer]
            cell_half_size = 0.25
            draw_points = true
            "#,
        )
        .unwrap();
        assert_eq!(config.cycles, 2);
        assert_eq!(config.mesh_size, 1.0);
        assert_eq!(config.voxelizer.cell_half_size, 0.25);
        assert!(config.voxelizer.draw_points);
        assert!(config.voxelizer.readback);
    }

    #[test]
    fn bundled_config_is_valid() {
        let config: DemoConfig = toml::from_str(include_str!("../demo.toml")).unwrap();
        assert!(config.voxelizer.validate().is_ok());
    }

    #[test]
    fn centered_cube_is_centered() {
        let mesh = centered_cube(2.0).unwrap();
        let bounds = mesh.local_bounds();
        assert_eq!(bounds.min, Vec3::splat(-1.0));
        assert_eq!(bounds.max, Vec3::splat(1.0));
    }
}
