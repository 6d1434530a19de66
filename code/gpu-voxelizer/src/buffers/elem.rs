use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use wgpu::BufferSize;

use crate::OccupancySample;

// ============================================================================
// 1. 统一的 compile-time stride 计算器
// ============================================================================
const fn gpu_stride(bytes: usize) -> usize {
    match bytes {
        0..=4 => 4,
        5..=8 => 8,
        9..=12 => 16,
        _ => bytes.div_ceil(16) * 16,
    }
}

const fn stride_to_bufsize(n: usize) -> BufferSize {
    match BufferSize::new(n as u64) {
        Some(size) => size,
        None => panic!("stride must be non-zero"),
    }
}

/// 计算满足 GPU 对齐要求的缓冲区大小
/// 至少一个元素：空网格/空网格索引也能绑定
#[inline]
pub fn padded_size<E: GpuElement>(count: usize) -> u64 {
    let stride = E::STRIDE_SIZE as u64;
    (count as u64).saturating_mul(stride).max(stride)
}

// ============================================================================
// 2. Trait：上传到存储缓冲区的元素类型
// ============================================================================
pub trait GpuElement: Copy + Send + Sync + 'static {
    /// 对齐后的类型 (padded)
    type Padded: Pod + Zeroable;

    /// 将原始类型填充到对齐类型
    fn pad(v: Self) -> Self::Padded;

    /// 着色器中 `array<...>` 的元素类型
    const WGSL_TYPE: &'static str;
    const SIZE: usize = core::mem::size_of::<Self::Padded>();
    const STRIDE_SIZE: usize = gpu_stride(Self::SIZE);
    const MIN_BINDING_SIZE: BufferSize = stride_to_bufsize(Self::STRIDE_SIZE);

    fn pad_all(values: &[Self]) -> Vec<Self::Padded> {
        values.iter().copied().map(Self::pad).collect()
    }
}

// ============================================================================
// 3. 默认实现宏：unpadded == padded
// ============================================================================
macro_rules! impl_gpu_element {
    ($ty:ty, $wgsl:literal) => {
        impl GpuElement for $ty {
            type Padded = Self;
            #[inline]
            fn pad(v: Self) -> Self::Padded {
                v
            }
            const WGSL_TYPE: &'static str = $wgsl;
        }
    };
}

impl_gpu_element!(u32, "u32");
impl_gpu_element!(Vec4, "vec4<f32>");
impl_gpu_element!(OccupancySample, "vec4<f32>");

// ============================================================================
// 4. 对齐填充 Vec3 -> Vec4
// ⚠️ array<vec3<f32>> 步长为 16 字节，上传时必须补齐
// ============================================================================
impl GpuElement for Vec3 {
    type Padded = Vec4;
    #[inline]
    fn pad(v: Self) -> Self::Padded {
        v.extend(1.0)
    }
    const WGSL_TYPE: &'static str = "vec4<f32>";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec3_is_padded_to_sixteen_bytes() {
        assert_eq!(<Vec3 as GpuElement>::STRIDE_SIZE, 16);
        assert_eq!(<u32 as GpuElement>::STRIDE_SIZE, 4);
        assert_eq!(<OccupancySample as GpuElement>::STRIDE_SIZE, 16);
    }

    #[test]
    fn padded_size_never_returns_zero() {
        assert_eq!(padded_size::<u32>(0), 4);
        assert_eq!(padded_size::<Vec3>(0), 16);
        assert_eq!(padded_size::<Vec3>(10), 160);
    }
}
