//! 每周期的计算与绘制编排

use crate::buffers::{BufferManager, IndirectArgs};
use crate::config::{DrawPaths, VoxelizerConfig};
use crate::context::GpuContext;
use crate::draw::{DrawSubmitter, InstancedDraw, ProceduralDraw};
use crate::error::ComputeError;
use crate::grid::GridParams;
use crate::kernel::VoxelizeKernel;
use crate::mesh::MeshSnapshot;
use crate::occupancy::OccupancyGrid;
use crate::scene::SceneTransform;

/// 网格体素化组件
/// 持有内核与全部设备缓冲区，`recompute` 与 `draw` 在同一队列上按序提交
pub struct Voxelizer {
    ctx: GpuContext,
    kernel: VoxelizeKernel,
    config: VoxelizerConfig,
    buffers: BufferManager,
    last: Option<GridParams>,
}

impl Voxelizer {
    /// 校验配置并激活：分配两个间接参数缓冲区
    pub fn new(
        ctx: GpuContext,
        kernel: VoxelizeKernel,
        config: VoxelizerConfig,
    ) -> Result<Self, ComputeError> {
        config.validate()?;
        let mut buffers = BufferManager::new(ctx.clone());
        buffers.activate();
        log::info!(
            "voxelizer active: cell half size {}, draw paths {:?}",
            config.cell_half_size,
            config.draw_paths()
        );
        Ok(Self {
            ctx,
            kernel,
            config,
            buffers,
            last: None,
        })
    }

    /// 重新体素化
    ///
    /// 没有源网格时跳过本周期，返回 `Ok(None)`。
    /// 关闭回读时返回的 `OccupancyGrid` 只有网格参数，没有样本。
    pub fn recompute(
        &mut self,
        mesh: Option<&MeshSnapshot>,
        scene: &dyn SceneTransform,
    ) -> Result<Option<OccupancyGrid>, ComputeError> {
        if self.ctx.is_lost() {
            return Err(ComputeError::DeviceLost);
        }
        if !self.buffers.is_active() {
            self.buffers.activate();
        }
        let Some(mesh) = mesh else {
            log::debug!("no source mesh, skipping voxelization");
            return Ok(None);
        };

        let world_bounds = scene.world_bounds();
        let bounds_min = scene.inverse_transform_point(world_bounds.min);
        let grid = GridParams::compute(&world_bounds, bounds_min, self.config.cell_half_size)?;
        self.kernel.check_grid(self.ctx.device(), &grid)?;

        // 下面任一步失败都不再按旧网格绘制
        self.last = None;
        let cell_count = grid.cell_count() as usize;
        self.buffers
            .ensure_occupancy(cell_count, self.config.cell_half_size)?;
        self.buffers.ensure_mesh(mesh)?;
        self.kernel.dispatch(&self.ctx, &grid, &self.buffers)?;
        self.last = Some(grid);

        let samples = if self.config.readback {
            self.buffers.read_occupancy()?
        } else {
            Vec::new()
        };
        Ok(Some(OccupancyGrid::new(grid, samples)))
    }

    /// 写入间接参数并提交启用的绘制路径
    /// 尚未计算过任何网格时不绘制
    pub fn draw(&mut self, submitter: &mut dyn DrawSubmitter, scene: &dyn SceneTransform) {
        let Some(grid) = self.last else {
            return;
        };
        let paths = self.config.draw_paths();
        if paths.is_empty() {
            return;
        }
        let Some(cell_mesh) = self.buffers.cell_mesh() else {
            return;
        };
        let cells = grid.cell_count() as u32;
        let index_count = cell_mesh.index_count;
        self.buffers.write_draw_args(
            IndirectArgs::points(cells),
            IndirectArgs::instanced(index_count, cells),
        );

        let (Some(points), Some(cell_mesh), Some(points_args), Some(blocks_args)) = (
            self.buffers.occupancy(),
            self.buffers.cell_mesh(),
            self.buffers.points_args(),
            self.buffers.blocks_args(),
        ) else {
            return;
        };
        let local_to_world = scene.local_to_world();
        let bounds = scene.world_bounds();

        if paths.contains(DrawPaths::POINTS) {
            submitter.draw_procedural_indirect(&ProceduralDraw {
                topology: wgpu::PrimitiveTopology::PointList,
                points: points.buffer(),
                local_to_world,
                bounds_min: grid.bounds_min,
                bounds,
                args: points_args,
            });
        }
        if paths.contains(DrawPaths::BLOCKS) {
            submitter.draw_mesh_instanced_indirect(&InstancedDraw {
                mesh: cell_mesh,
                submesh: 0,
                positions: points.buffer(),
                local_to_world,
                bounds_min: grid.bounds_min,
                bounds,
                args: blocks_args,
            });
        }
    }

    /// 源网格被原地修改后调用
    pub fn invalidate_mesh(&mut self) {
        self.buffers.invalidate_mesh();
    }

    /// 占用缓冲区失效（例如宿主重建了设备资源），下次 `recompute` 重新分配并清零
    pub fn invalidate_occupancy(&mut self) {
        self.buffers.invalidate_occupancy();
    }

    /// 停用：释放全部缓冲区，返回释放数量
    /// 之后再次 `recompute` 会重新激活
    pub fn deactivate(&mut self) -> usize {
        self.last = None;
        let released = self.buffers.release_all();
        log::info!("voxelizer deactivated, released {released} buffers");
        released
    }

    pub fn config(&self) -> &VoxelizerConfig {
        &self.config
    }

    /// 更换配置；下次 `recompute` 生效
    pub fn set_config(&mut self, config: VoxelizerConfig) -> Result<(), ComputeError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    pub fn buffers(&self) -> &BufferManager {
        &self.buffers
    }

    pub fn kernel(&self) -> &VoxelizeKernel {
        &self.kernel
    }

    /// 最近一次计算的网格参数
    pub fn last_grid(&self) -> Option<&GridParams> {
        self.last.as_ref()
    }
}
