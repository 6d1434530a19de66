//! 计算程序源码检查
//!
//! 加载时一次性校验入口函数、工作组大小与绑定槽位，失败立即返回错误，
//! 而不是在每次分派时按名字查找。

use std::borrow::Cow;

use glam::{UVec3, Vec3};
use regex::Regex;

use crate::buffers::GpuElement;
use crate::error::ComputeError;
use crate::occupancy::OccupancySample;

pub const DEFAULT_ENTRY_POINT: &str = "voxelize_mesh";

/// 内置 WGSL 体素化程序
pub const BUILTIN_WGSL: &str = include_str!("voxelize_mesh.wgsl");

/// WGSL 源码 + 入口函数名
#[derive(Debug, Clone)]
pub struct KernelSource<'a> {
    pub wgsl: Cow<'a, str>,
    pub entry_point: Cow<'a, str>,
}

impl KernelSource<'static> {
    pub fn builtin() -> Self {
        Self::new(BUILTIN_WGSL, DEFAULT_ENTRY_POINT)
    }
}

impl<'a> KernelSource<'a> {
    pub fn new(wgsl: impl Into<Cow<'a, str>>, entry_point: impl Into<Cow<'a, str>>) -> Self {
        Self {
            wgsl: wgsl.into(),
            entry_point: entry_point.into(),
        }
    }
}

/// 内核期望的绑定槽位（group 0）
struct ExpectedBinding {
    binding: u32,
    name: &'static str,
    address_space: &'static str,
    ty: String,
}

fn expected_bindings() -> [ExpectedBinding; 4] {
    let array_of = |wgsl: &str| format!("array<{wgsl}>");
    [
        ExpectedBinding {
            binding: 0,
            name: "params",
            address_space: "uniform",
            ty: "VoxelizeParams".to_string(),
        },
        ExpectedBinding {
            binding: 1,
            name: "mesh_vertices",
            address_space: "storage,read",
            ty: array_of(<Vec3 as GpuElement>::WGSL_TYPE),
        },
        ExpectedBinding {
            binding: 2,
            name: "mesh_triangle_indices",
            address_space: "storage,read",
            ty: array_of(<u32 as GpuElement>::WGSL_TYPE),
        },
        ExpectedBinding {
            binding: 3,
            name: "voxel_grid_points",
            address_space: "storage,read_write",
            ty: array_of(<OccupancySample as GpuElement>::WGSL_TYPE),
        },
    ]
}

fn compile(pattern: &str) -> Result<Regex, ComputeError> {
    Regex::new(pattern).map_err(|e| ComputeError::ShaderCompilation(e.to_string()))
}

fn squash(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

/// 读取入口函数的 `@workgroup_size`
pub fn workgroup_size(source: &KernelSource<'_>) -> Result<UVec3, ComputeError> {
    let entry = compile(r"@compute\s*@workgroup_size\(([^)]*)\)\s*fn\s+(\w+)\s*\(")?;
    let args = entry
        .captures_iter(&source.wgsl)
        .find(|caps| &caps[2] == source.entry_point.as_ref())
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| ComputeError::MissingEntryPoint(source.entry_point.to_string()))?;

    let sizes = args
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches('u').parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| {
            ComputeError::ShaderCompilation(format!(
                "workgroup size of `{}` must be integer literals, got ({args})",
                source.entry_point
            ))
        })?;
    if sizes.is_empty() || sizes.len() > 3 || sizes.contains(&0) {
        return Err(ComputeError::ShaderCompilation(format!(
            "invalid workgroup size ({args}) for `{}`",
            source.entry_point
        )));
    }
    let axis = |i: usize| sizes.get(i).copied().unwrap_or(1);
    Ok(UVec3::new(axis(0), axis(1), axis(2)))
}

/// 检查 group 0 的四个绑定槽位的地址空间与类型
pub fn validate_bindings(source: &KernelSource<'_>) -> Result<(), ComputeError> {
    let decl = compile(
        r"@group\(\s*0\s*\)\s*@binding\(\s*(\d+)\s*\)\s*var\s*<([^>]*)>\s*(\w+)\s*:\s*([^;]+);",
    )?;
    let declared: Vec<(u32, String, String)> = decl
        .captures_iter(&source.wgsl)
        .filter_map(|caps| {
            let binding = caps[1].parse().ok()?;
            Some((binding, squash(&caps[2]), squash(&caps[4])))
        })
        .collect();

    for expected in expected_bindings() {
        let found = declared.iter().find(|(b, _, _)| *b == expected.binding);
        let matches = found.is_some_and(|(_, space, ty)| {
            let space_ok = space == expected.address_space
                || (expected.address_space == "storage,read" && space == "storage");
            space_ok && *ty == expected.ty
        });
        if !matches {
            return Err(ComputeError::MissingBinding {
                binding: expected.binding,
                name: expected.name,
                expected: format!("var<{}> {}", expected.address_space, expected.ty),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_kernel_passes_inspection() {
        let source = KernelSource::builtin();
        assert_eq!(workgroup_size(&source).unwrap(), UVec3::splat(4));
        validate_bindings(&source).unwrap();
    }

    #[test]
    fn missing_entry_point_is_reported() {
        let source = KernelSource::new(BUILTIN_WGSL, "voxelize");
        assert!(matches!(
            workgroup_size(&source),
            Err(ComputeError::MissingEntryPoint(name)) if name == "voxelize"
        ));
    }

    #[test]
    fn partial_workgroup_size_defaults_to_one() {
        let wgsl = "@compute @workgroup_size(64u)\nfn main(@builtin(global_invocation_id) id: vec3<u32>) {}";
        let source = KernelSource::new(wgsl, "main");
        assert_eq!(workgroup_size(&source).unwrap(), UVec3::new(64, 1, 1));
    }

    #[test]
    fn override_workgroup_size_is_rejected() {
        let wgsl = "override WG: u32 = 8u;\n@compute @workgroup_size(WG, 1)\nfn main() {}";
        let source = KernelSource::new(wgsl, "main");
        assert!(matches!(
            workgroup_size(&source),
            Err(ComputeError::ShaderCompilation(_))
        ));
    }

    #[test]
    fn mistyped_output_binding_is_reported() {
        let wgsl = BUILTIN_WGSL.replace(
            "var<storage, read_write> voxel_grid_points: array<vec4<f32>>",
            "var<storage, read_write> voxel_grid_points: array<f32>",
        );
        let source = KernelSource::new(wgsl, DEFAULT_ENTRY_POINT);
        assert!(matches!(
            validate_bindings(&source),
            Err(ComputeError::MissingBinding { binding: 3, .. })
        ));
    }
}
