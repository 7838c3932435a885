//! 种子点与连接矩阵.
//!
//! 纤维追踪本身由外部工具完成; 这里只负责追踪前的种子点准备,
//! 以及追踪后由纤维端点统计分区之间的连接矩阵.

use crate::motion::Affine;
use crate::{DtiError, DtiResult, DtiVolume};
use ndarray::ArrayView3;

mod connectivity;
mod streamlines;

pub use connectivity::{
    connectivity_matrix, directed_difference, label_volume, prepare_parcellation,
    ConnectivityJob, ConnectivityMatrices, MAX_LABEL,
};
pub use streamlines::Streamlines;

/// 三维点, 体素坐标或世界坐标 (mm).
pub type Point = [f64; 3];

/// 种子点推回边界时的默认容差 (体素).
pub const SEED_TOLERANCE: f64 = 0.2;

/// 推回时额外向内移动 `fudge * tol`, 避免落在边界上.
pub const SEED_FUDGE: f64 = 0.05;

/// 在掩膜的每个非零体素内均匀放置 `density³` 个种子点, 返回体素坐标.
///
/// 体素中心为整数坐标, 种子点偏移为 `(i + 0.5) / density - 0.5`.
pub fn seeds_from_mask(mask: ArrayView3<f32>, density: usize) -> DtiResult<Vec<Point>> {
    if density == 0 {
        return Err(DtiError::InvalidArgument("种子点密度必须大于 0".to_string()));
    }
    let d = density as f64;
    let offsets: Vec<f64> = (0..density).map(|i| (i as f64 + 0.5) / d - 0.5).collect();

    let mut ans = Vec::new();
    for ((x, y, z), &v) in mask.indexed_iter() {
        if v == 0.0 {
            continue;
        }
        for &oz in &offsets {
            for &oy in &offsets {
                for &ox in &offsets {
                    ans.push([x as f64 + ox, y as f64 + oy, z as f64 + oz]);
                }
            }
        }
    }
    Ok(ans)
}

/// 同 [`seeds_from_mask`], 但直接使用体积的非零体素.
#[inline]
pub fn seeds_from_volume(mask: &DtiVolume, density: usize) -> DtiResult<Vec<Point>> {
    seeds_from_mask(mask.data(), density)
}

/// 种子区域: 分区图, 脑掩膜与白质掩膜三者交集的二值体积.
pub fn seed_region(parcellation: &DtiVolume, brain: &DtiVolume, wm: &DtiVolume) -> DtiResult<DtiVolume> {
    Ok(prepare_parcellation(parcellation, brain, wm)?.binarize())
}

/// [`condition_seeds`] 的结果.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConditionedSeeds {
    /// 保留 (含推回) 的种子点, 世界坐标.
    pub seeds: Vec<Point>,

    /// 被删除的个数.
    pub removed: usize,

    /// 被推回的个数.
    pub nudged: usize,
}

/// 检查世界坐标系下的种子点是否落在 `box_shape` 体素网格内.
///
/// 体素坐标越界但与网格距离不超过 `tol` 的种子点被推回网格内
/// (截断到 `[fudge·tol, max − fudge·tol]`), 距离更远的被删除.
/// 追踪工具遇到网格外的种子点会直接中止, 因此必须在追踪前处理.
pub fn condition_seeds(
    seeds: &[Point],
    affine: &Affine,
    box_shape: (usize, usize, usize),
    tol: f64,
    fudge_factor: f64,
) -> DtiResult<ConditionedSeeds> {
    let inv = affine
        .inverse()
        .ok_or_else(|| DtiError::InvalidArgument("仿射矩阵不可逆".to_string()))?;
    let (a, b, c) = box_shape;
    let maxs = [a as f64 - 1.0, b as f64 - 1.0, c as f64 - 1.0];
    let fudge = fudge_factor * tol;

    let mut ans = ConditionedSeeds::default();
    for s in seeds {
        let vox = inv.apply(*s);
        let outside = (0..3).any(|i| vox[i] < 0.0 || vox[i] > maxs[i]);
        if !outside {
            ans.seeds.push(*s);
            continue;
        }
        let dist2: f64 = (0..3)
            .map(|i| {
                let d = vox[i] - vox[i].clamp(0.0, maxs[i].max(0.0));
                d * d
            })
            .sum();
        if dist2 > tol * tol {
            log::debug!("removed seed {s:.2?} (voxel {vox:.2?})");
            ans.removed += 1;
        } else {
            let nudged = [0, 1, 2].map(|i| vox[i].clamp(fudge, (maxs[i] - fudge).max(fudge)));
            log::debug!("nudged seed {s:.2?} (voxel {vox:.2?})");
            ans.seeds.push(affine.apply(nudged));
            ans.nudged += 1;
        }
    }
    log::info!("removed {} seeds, nudged {} seeds", ans.removed, ans.nudged);
    Ok(ans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_seeds_density() {
        let mut mask = Array3::<f32>::zeros((3, 3, 3));
        mask[(1, 2, 0)] = 1.0;
        let seeds = seeds_from_mask(mask.view(), 2).unwrap();
        assert_eq!(seeds.len(), 8);
        assert_eq!(seeds[0], [0.75, 1.75, -0.25]);
        assert_eq!(seeds[7], [1.25, 2.25, 0.25]);

        let one = seeds_from_mask(mask.view(), 1).unwrap();
        assert_eq!(one, vec![[1.0, 2.0, 0.0]]);
        assert!(seeds_from_mask(mask.view(), 0).is_err());
    }

    #[test]
    fn test_seed_region_applies_brain_mask() {
        let vol = |v: [f32; 3]| DtiVolume::from_array(Array3::from_shape_fn((3, 1, 1), |(x, _, _)| v[x]), [1.0; 3]);
        let parc = vol([2.0, 3.0, 4.0]);
        let brain = vol([100.0, 0.0, 80.0]);
        let wm = vol([1.0, 1.0, 0.0]);
        let region = seed_region(&parc, &brain, &wm).unwrap();
        assert_eq!(region.data().iter().copied().collect::<Vec<_>>(), vec![1.0, 0.0, 0.0]);
        assert_eq!(seeds_from_volume(&region, 1).unwrap(), vec![[0.0, 0.0, 0.0]]);
    }

    #[test]
    fn test_condition_seeds() {
        let seeds = [
            [1.0, 1.0, 1.0],   // 内部
            [-0.1, 1.0, 1.0],  // 轻微越界, 推回
            [1.0, 1.0, 2.15],  // 轻微越界, 推回
            [-1.0, 1.0, 1.0],  // 删除
            [1.0, 3.0, 1.0],   // 删除
        ];
        let out = condition_seeds(&seeds, &Affine::identity(), (3, 3, 3), SEED_TOLERANCE, SEED_FUDGE)
            .unwrap();
        assert_eq!(out.removed, 2);
        assert_eq!(out.nudged, 2);
        assert_eq!(out.seeds.len(), 3);
        let fudge = SEED_TOLERANCE * SEED_FUDGE;
        assert!((out.seeds[1][0] - fudge).abs() < 1e-12);
        assert!((out.seeds[2][2] - (2.0 - fudge)).abs() < 1e-12);
    }

    #[test]
    fn test_condition_seeds_world_coords() {
        // 体素 2mm, 世界坐标 4.3mm 对应体素 2.15, 网格上限为 2.
        let affine = Affine([
            [2.0, 0.0, 0.0, 0.0],
            [0.0, 2.0, 0.0, 0.0],
            [0.0, 0.0, 2.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        let out = condition_seeds(&[[4.3, 2.0, 2.0]], &affine, (3, 3, 3), 0.2, 0.05).unwrap();
        assert_eq!(out.nudged, 1);
        assert!((out.seeds[0][0] - 2.0 * (2.0 - 0.01)).abs() < 1e-9);
    }
}
