//! 设备缓冲区管理
//!
//! 占用缓冲区、源网格顶点/索引缓冲区与两个间接绘制参数缓冲区。
//! 只在数量变化或缓冲区失效时重新分配，否则原地复用。

pub mod elem;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::context::GpuContext;
use crate::error::ComputeError;
use crate::mesh::{CellMesh, GpuCellMesh, MeshSnapshot};
use crate::occupancy::OccupancySample;
pub use elem::{GpuElement, padded_size};

/// 间接绘制参数，5 个 4 字节字段
/// 与 `draw_indexed_indirect` 的布局一致；`draw_indirect` 只读前 4 个字段
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct IndirectArgs {
    /// 索引数（实例化网格）或每实例顶点数（点）
    pub count: u32,
    pub instance_count: u32,
    pub first: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

impl IndirectArgs {
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// 点路径：每实例 1 个顶点
    pub fn points(cell_count: u32) -> Self {
        Self {
            count: 1,
            instance_count: cell_count,
            ..Default::default()
        }
    }

    /// 实例化立方体路径
    pub fn instanced(index_count: u32, cell_count: u32) -> Self {
        Self {
            count: index_count,
            instance_count: cell_count,
            ..Default::default()
        }
    }

    pub fn to_array(self) -> [u32; 5] {
        bytemuck::cast(self)
    }
}

/// 带有效性标记的设备缓冲区
pub struct DeviceBuffer {
    buffer: wgpu::Buffer,
    len: usize,
    valid: bool,
}

impl DeviceBuffer {
    fn new(buffer: wgpu::Buffer, len: usize) -> Self {
        Self {
            buffer,
            len,
            valid: true,
        }
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// 元素数量（不含对齐填充）
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    fn release(self) {
        self.buffer.destroy();
    }
}

/// 缓冲区缺失、失效或容量不符时需要重新分配
pub fn needs_reallocation(current: Option<&DeviceBuffer>, len: usize) -> bool {
    match current {
        Some(buffer) => !buffer.is_valid() || buffer.len() != len,
        None => true,
    }
}

/// 同上，但不关心容量（源网格缓冲区）
fn is_missing_or_invalid(current: Option<&DeviceBuffer>) -> bool {
    current.is_none_or(|buffer| !buffer.is_valid())
}

fn release(slot: &mut Option<DeviceBuffer>) -> usize {
    slot.take().map(DeviceBuffer::release).map_or(0, |_| 1)
}

fn release_raw(slot: &mut Option<wgpu::Buffer>) -> usize {
    slot.take().map(|b| b.destroy()).map_or(0, |_| 1)
}

/// 独占全部设备缓冲区
pub struct BufferManager {
    ctx: GpuContext,
    occupancy: Option<DeviceBuffer>,
    staging: Option<wgpu::Buffer>,
    vertices: Option<DeviceBuffer>,
    triangles: Option<DeviceBuffer>,
    points_args: Option<wgpu::Buffer>,
    blocks_args: Option<wgpu::Buffer>,
    cell_mesh: Option<GpuCellMesh>,
    occupancy_generation: u64,
    mesh_generation: u64,
    last_args: Option<(IndirectArgs, IndirectArgs)>,
}

impl BufferManager {
    pub fn new(ctx: GpuContext) -> Self {
        Self {
            ctx,
            occupancy: None,
            staging: None,
            vertices: None,
            triangles: None,
            points_args: None,
            blocks_args: None,
            cell_mesh: None,
            occupancy_generation: 0,
            mesh_generation: 0,
            last_args: None,
        }
    }

    /// 激活：分配两个固定大小的间接参数缓冲区
    pub fn activate(&mut self) {
        let device = self.ctx.device();
        let args = |label| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: IndirectArgs::SIZE,
                usage: wgpu::BufferUsages::INDIRECT
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        };
        if self.points_args.is_none() {
            self.points_args = Some(args("points_args_buffer"));
        }
        if self.blocks_args.is_none() {
            self.blocks_args = Some(args("blocks_args_buffer"));
        }
    }

    pub fn is_active(&self) -> bool {
        self.points_args.is_some() && self.blocks_args.is_some()
    }

    /// 确保占用缓冲区容量为 `cell_count`
    /// 重新分配时上传全零数组并重新生成立方体网格；返回是否重新分配
    pub fn ensure_occupancy(
        &mut self,
        cell_count: usize,
        cell_half_size: f32,
    ) -> Result<bool, ComputeError> {
        let reallocate = needs_reallocation(self.occupancy.as_ref(), cell_count);
        if reallocate {
            release(&mut self.occupancy);
            release_raw(&mut self.staging);

            let device = self.ctx.device();
            check_buffer_size(
                device,
                padded_size::<OccupancySample>(cell_count),
                "voxel_grid_points",
            )?;
            let seed = vec![OccupancySample::zeroed(); cell_count.max(1)];
            let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("voxel_grid_points"),
                contents: bytemuck::cast_slice(&seed),
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
            });
            let staging = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("voxel_grid_points_staging"),
                size: padded_size::<OccupancySample>(cell_count),
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            });
            self.occupancy = Some(DeviceBuffer::new(buffer, cell_count));
            self.staging = Some(staging);
            self.occupancy_generation += 1;
            log::debug!(
                "reallocated occupancy buffer: {cell_count} cells (generation {})",
                self.occupancy_generation
            );
        }

        let cell_size = cell_half_size * 2.0;
        let stale_mesh = self
            .cell_mesh
            .as_ref()
            .is_none_or(|mesh| mesh.size != cell_size);
        if reallocate || stale_mesh {
            if let Some(old) = self.cell_mesh.take() {
                old.release();
            }
            self.cell_mesh = Some(CellMesh::generate(cell_size).upload(self.ctx.device()));
        }
        Ok(reallocate)
    }

    /// 确保源网格已上传
    /// 仅在缺失或失效时上传；原地修改的网格需要先调用 `invalidate_mesh`
    pub fn ensure_mesh(&mut self, mesh: &MeshSnapshot) -> Result<bool, ComputeError> {
        let upload = is_missing_or_invalid(self.vertices.as_ref())
            || is_missing_or_invalid(self.triangles.as_ref());
        if !upload {
            return Ok(false);
        }
        // 先检查再释放：超限时保留旧缓冲区
        let device = self.ctx.device();
        let limits = device.limits();
        check_storage_binding(
            &limits,
            padded_size::<glam::Vec3>(mesh.vertices().len()),
            "mesh_vertices",
        )?;
        check_storage_binding(
            &limits,
            padded_size::<u32>(mesh.triangles().len()),
            "mesh_triangle_indices",
        )?;
        release(&mut self.vertices);
        release(&mut self.triangles);

        let vertices = upload_elements(device, "mesh_vertices", mesh.vertices())?;
        let triangles = upload_elements(device, "mesh_triangle_indices", mesh.triangles())?;
        self.vertices = Some(DeviceBuffer::new(vertices, mesh.vertices().len()));
        self.triangles = Some(DeviceBuffer::new(triangles, mesh.triangles().len()));
        self.mesh_generation += 1;
        log::debug!(
            "uploaded source mesh: {} vertices, {} triangles",
            mesh.vertices().len(),
            mesh.triangle_count()
        );
        Ok(true)
    }

    /// 标记源网格缓冲区失效，下次 `ensure_mesh` 重新上传
    pub fn invalidate_mesh(&mut self) {
        for slot in [&mut self.vertices, &mut self.triangles] {
            if let Some(buffer) = slot.as_mut() {
                buffer.invalidate();
            }
        }
    }

    /// 标记占用缓冲区失效，下次 `ensure_occupancy` 重新分配
    pub fn invalidate_occupancy(&mut self) {
        if let Some(buffer) = self.occupancy.as_mut() {
            buffer.invalidate();
        }
    }

    /// 写入两个间接参数缓冲区
    pub fn write_draw_args(&mut self, points: IndirectArgs, blocks: IndirectArgs) {
        let queue = self.ctx.queue();
        if let Some(buffer) = &self.points_args {
            queue.write_buffer(buffer, 0, bytemuck::bytes_of(&points));
        }
        if let Some(buffer) = &self.blocks_args {
            queue.write_buffer(buffer, 0, bytemuck::bytes_of(&blocks));
        }
        self.last_args = Some((points, blocks));
    }

    /// 回读占用缓冲区
    pub fn read_occupancy(&self) -> Result<Vec<OccupancySample>, ComputeError> {
        match (&self.occupancy, &self.staging) {
            (Some(occupancy), Some(staging)) => {
                self.ctx.read_buffer(occupancy.buffer(), staging, occupancy.len())
            }
            _ => Ok(Vec::new()),
        }
    }

    /// 释放全部缓冲区；返回实际释放的数量，未分配的槽位不计
    pub fn release_all(&mut self) -> usize {
        let mut released = release(&mut self.occupancy)
            + release_raw(&mut self.staging)
            + release(&mut self.vertices)
            + release(&mut self.triangles)
            + release_raw(&mut self.points_args)
            + release_raw(&mut self.blocks_args);
        if let Some(mesh) = self.cell_mesh.take() {
            mesh.release();
            released += 1;
        }
        self.last_args = None;
        if released > 0 {
            log::debug!("released {released} device buffers");
        }
        released
    }

    pub fn occupancy(&self) -> Option<&DeviceBuffer> {
        self.occupancy.as_ref()
    }

    pub fn vertices(&self) -> Option<&DeviceBuffer> {
        self.vertices.as_ref()
    }

    pub fn triangles(&self) -> Option<&DeviceBuffer> {
        self.triangles.as_ref()
    }

    /// 已上传网格的三角形数量（按上传时的索引数计算）
    pub fn uploaded_triangle_count(&self) -> u32 {
        self.triangles.as_ref().map_or(0, |t| (t.len() / 3) as u32)
    }

    pub fn points_args(&self) -> Option<&wgpu::Buffer> {
        self.points_args.as_ref()
    }

    pub fn blocks_args(&self) -> Option<&wgpu::Buffer> {
        self.blocks_args.as_ref()
    }

    pub fn cell_mesh(&self) -> Option<&GpuCellMesh> {
        self.cell_mesh.as_ref()
    }

    /// 每次重新分配占用缓冲区时加一
    pub fn occupancy_generation(&self) -> u64 {
        self.occupancy_generation
    }

    /// 每次上传源网格时加一
    pub fn mesh_generation(&self) -> u64 {
        self.mesh_generation
    }

    /// 最近一次写入的 (点, 立方体) 参数
    pub fn last_draw_args(&self) -> Option<(IndirectArgs, IndirectArgs)> {
        self.last_args
    }
}

impl Drop for BufferManager {
    fn drop(&mut self) {
        self.release_all();
    }
}

fn upload_elements<E: GpuElement>(
    device: &wgpu::Device,
    label: &str,
    values: &[E],
) -> Result<wgpu::Buffer, ComputeError> {
    check_buffer_size(device, padded_size::<E>(values.len()), label)?;
    let mut padded = E::pad_all(values);
    if padded.is_empty() {
        // 空网格仍需可绑定的非零大小缓冲区
        padded.push(E::Padded::zeroed());
    }
    Ok(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::cast_slice(&padded),
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
    }))
}

/// 作为存储缓冲区绑定的大小上限
pub fn check_storage_binding(
    limits: &wgpu::Limits,
    bytes: u64,
    label: &'static str,
) -> Result<(), ComputeError> {
    let limit = limits.max_storage_buffer_binding_size as u64;
    if bytes > limit {
        return Err(ComputeError::BindingTooLarge {
            label,
            bytes,
            limit,
        });
    }
    Ok(())
}

fn check_buffer_size(device: &wgpu::Device, bytes: u64, label: &str) -> Result<(), ComputeError> {
    let limit = device.limits().max_buffer_size;
    if bytes > limit {
        return Err(ComputeError::BufferCreation(format!(
            "{label}: {bytes} bytes exceeds max_buffer_size {limit}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indirect_args_layout_is_five_words() {
        assert_eq!(IndirectArgs::SIZE, 20);
        assert_eq!(IndirectArgs::points(64).to_array(), [1, 64, 0, 0, 0]);
        assert_eq!(IndirectArgs::instanced(36, 64).to_array(), [36, 64, 0, 0, 0]);
    }

    #[test]
    fn storage_binding_limit_is_inclusive() {
        let limits = wgpu::Limits::default();
        let limit = limits.max_storage_buffer_binding_size as u64;
        assert!(check_storage_binding(&limits, limit, "mesh_vertices").is_ok());
        assert!(matches!(
            check_storage_binding(&limits, limit + 16, "mesh_vertices"),
            Err(ComputeError::BindingTooLarge { label: "mesh_vertices", .. })
        ));
    }

    #[test]
    fn missing_buffer_always_reallocates() {
        assert!(needs_reallocation(None, 0));
        assert!(needs_reallocation(None, 64));
        assert!(is_missing_or_invalid(None));
    }
}
