pub mod buffers;
pub mod config;
pub mod context;
pub mod draw;
mod error;
pub mod grid;
pub mod kernel;
pub mod mesh;
pub mod occupancy;
pub mod scene;
mod voxelizer;

pub use buffers::{BufferManager, IndirectArgs};
pub use config::{DrawPaths, VoxelizerConfig};
pub use context::GpuContext;
pub use draw::{
    DrawSubmitter, InstancedDraw, MaterialUniforms, PassSubmitter, ProceduralDraw, VoxelMaterial,
};
pub use error::{ComputeError, ConfigError, MeshError};
pub use grid::{Aabb, GridParams};
pub use kernel::{KernelSource, VoxelizeKernel};
pub use mesh::{CellMesh, MeshSnapshot};
pub use occupancy::{OccupancyGrid, OccupancySample};
pub use scene::{SceneTransform, StaticScene};
pub use voxelizer::Voxelizer;
