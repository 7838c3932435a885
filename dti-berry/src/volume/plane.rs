//! 三个方向的 2D 切片提取, 用于 QA 报告的拼图.

use crate::{DtiError, DtiResult};
use ndarray::{Array2, ArrayView3};

/// 切片方向.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Orientation {
    /// 矢状面, 沿 x 轴切.
    Sagittal,

    /// 冠状面, 沿 y 轴切.
    Coronal,

    /// 轴状面 (水平面), 沿 z 轴切.
    Axial,
}

impl Orientation {
    /// QA 报告中自上而下的顺序.
    pub const ALL: [Orientation; 3] = [Orientation::Sagittal, Orientation::Coronal, Orientation::Axial];

    /// 该方向上的切片个数.
    #[inline]
    pub const fn depth(&self, (x, y, z): (usize, usize, usize)) -> usize {
        match self {
            Orientation::Sagittal => x,
            Orientation::Coronal => y,
            Orientation::Axial => z,
        }
    }

    /// 切片图像的 `(行数, 列数)`.
    #[inline]
    pub const fn plane_shape(&self, (x, y, z): (usize, usize, usize)) -> (usize, usize) {
        match self {
            Orientation::Sagittal => (z, y),
            Orientation::Coronal => (z, x),
            Orientation::Axial => (y, x),
        }
    }
}

/// 取出 `o` 方向上的第 `k` 张切片, 已旋转为显示方向 (上为头顶/前方, 右为被试右侧).
///
/// `k` 越界时返回 `Err`.
pub fn plane(data: ArrayView3<f32>, o: Orientation, k: usize) -> DtiResult<Array2<f32>> {
    let shape = data.dim();
    let depth = o.depth(shape);
    if k >= depth {
        return Err(DtiError::InvalidArgument(format!(
            "{o:?} 方向只有 {depth} 张切片, 无法取第 {k} 张"
        )));
    }
    let (nx, ny, nz) = shape;
    Ok(Array2::from_shape_fn(o.plane_shape(shape), |(r, c)| match o {
        Orientation::Sagittal => data[(k, c, nz - 1 - r)],
        Orientation::Coronal => data[(c, ny - 1 - k, nz - 1 - r)],
        Orientation::Axial => data[(nx - 1 - c, ny - 1 - r, k)],
    }))
}

/// 拼图中一行展示的切片下标.
///
/// 切片个数为 `floor(列数 / 深度 * row_aspect)`, 其中 `row_aspect` 为一行拼图区域的宽高比;
/// 下标在 `(0, 深度)` 上等距分布 (不含两端).
pub fn montage_slices(o: Orientation, shape: (usize, usize, usize), row_aspect: f64) -> Vec<usize> {
    let depth = o.depth(shape);
    if depth == 0 {
        return Vec::new();
    }
    let (_, cols) = o.plane_shape(shape);
    let n = (cols as f64 / depth as f64 * row_aspect).floor().max(0.0) as usize;
    (1..=n)
        .map(|i| ((depth as f64 * i as f64 / (n + 1) as f64).floor() as usize).min(depth - 1))
        .collect()
}
