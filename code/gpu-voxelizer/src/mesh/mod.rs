mod cell_mesh;
mod snapshot;

pub use cell_mesh::{CELL_INDEX_COUNT, CELL_VERTEX_COUNT, CellMesh, CellVertex, GpuCellMesh};
pub use snapshot::MeshSnapshot;
