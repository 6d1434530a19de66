// ===============================================================================
// 错误类型定义
// ===============================================================================

/// GPU 计算错误类型
/// 体素化流程中所有可失败操作的统一错误
#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    #[error("Shader compilation failed: {0}")]
    ShaderCompilation(String),

    #[error("Kernel entry point `{0}` not found")]
    MissingEntryPoint(String),

    #[error("Kernel binding @binding({binding}) `{name}` missing or mistyped, expected `{expected}`")]
    MissingBinding {
        binding: u32,
        name: &'static str,
        expected: String,
    },

    #[error("Buffer creation failed: {0}")]
    BufferCreation(String),

    #[error("GPU execution failed: {0}")]
    Execution(String),

    #[error("GPU device lost")]
    DeviceLost,

    #[error("No suitable GPU adapter: {0}")]
    AdapterUnavailable(String),

    #[error("Storage binding `{label}` of {bytes} bytes exceeds max_storage_buffer_binding_size {limit}")]
    BindingTooLarge {
        label: &'static str,
        bytes: u64,
        limit: u64,
    },

    #[error("Grid of {cells} cells exceeds device limit: {reason}")]
    GridTooLarge { cells: u64, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Mesh(#[from] MeshError),
}

/// 配置错误
/// 在配置阶段拒绝，而不是在计算时产生负维度
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("cell half size must be finite and > 0, got {0}")]
    InvalidCellHalfSize(f32),
}

/// 源网格错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MeshError {
    #[error("triangle index count {0} is not a multiple of 3")]
    RaggedTriangles(usize),

    #[error("triangle index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },
}
