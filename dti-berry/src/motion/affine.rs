//! 4×4 仿射变换, 以及 FSL `rmsdiff` / `avscale` 的等价计算.

use crate::consts::RMS_RADIUS_MM;
use std::ops::{Index, Mul, Sub};

/// 行优先存储的 4×4 仿射矩阵. 世界坐标 = `self · 体素坐标`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Affine(pub [[f64; 4]; 4]);

impl Index<(usize, usize)> for Affine {
    type Output = f64;

    #[inline]
    fn index(&self, (r, c): (usize, usize)) -> &Self::Output {
        &self.0[r][c]
    }
}

impl Mul for Affine {
    type Output = Affine;

    fn mul(self, rhs: Self) -> Self::Output {
        let mut out = [[0.0; 4]; 4];
        for (r, row) in out.iter_mut().enumerate() {
            for (c, slot) in row.iter_mut().enumerate() {
                *slot = (0..4).map(|k| self.0[r][k] * rhs.0[k][c]).sum();
            }
        }
        Affine(out)
    }
}

impl Sub for Affine {
    type Output = Affine;

    fn sub(self, rhs: Self) -> Self::Output {
        let mut out = self.0;
        for (r, row) in out.iter_mut().enumerate() {
            for (c, slot) in row.iter_mut().enumerate() {
                *slot -= rhs.0[r][c];
            }
        }
        Affine(out)
    }
}

impl Default for Affine {
    fn default() -> Self {
        Self::identity()
    }
}

impl Affine {
    /// 单位变换.
    pub const fn identity() -> Self {
        Affine([
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    /// 纯平移.
    pub const fn translation(t: [f64; 3]) -> Self {
        Affine([
            [1.0, 0.0, 0.0, t[0]],
            [0.0, 1.0, 0.0, t[1]],
            [0.0, 0.0, 1.0, t[2]],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    /// 按 `R = Rx · Ry · Rz` 的约定, 由三个欧拉角 (弧度) 构造旋转.
    pub fn from_euler([ax, ay, az]: [f64; 3]) -> Self {
        let (sx, cx) = ax.sin_cos();
        let (sy, cy) = ay.sin_cos();
        let (sz, cz) = az.sin_cos();
        let rx = Affine([
            [1.0, 0.0, 0.0, 0.0],
            [0.0, cx, sx, 0.0],
            [0.0, -sx, cx, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        let ry = Affine([
            [cy, 0.0, -sy, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [sy, 0.0, cy, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        let rz = Affine([
            [cz, sz, 0.0, 0.0],
            [-sz, cz, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        rx * ry * rz
    }

    /// 平移部分.
    #[inline]
    pub fn translation_part(&self) -> [f64; 3] {
        [self.0[0][3], self.0[1][3], self.0[2][3]]
    }

    /// 线性 (3×3) 部分.
    #[inline]
    pub fn linear_part(&self) -> [[f64; 3]; 3] {
        let m = &self.0;
        [
            [m[0][0], m[0][1], m[0][2]],
            [m[1][0], m[1][1], m[1][2]],
            [m[2][0], m[2][1], m[2][2]],
        ]
    }

    /// 作用于三维点.
    pub fn apply(&self, p: [f64; 3]) -> [f64; 3] {
        let m = &self.0;
        let mut out = [0.0; 3];
        for (r, slot) in out.iter_mut().enumerate() {
            *slot = m[r][0] * p[0] + m[r][1] * p[1] + m[r][2] * p[2] + m[r][3];
        }
        out
    }

    /// Gauss-Jordan 消元求逆 (列主元). 矩阵奇异时返回 `None`.
    pub fn inverse(&self) -> Option<Affine> {
        let mut a = self.0;
        let mut inv = Self::identity().0;
        for col in 0..4 {
            let pivot = (col..4).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
            if a[pivot][col].abs() < 1e-12 {
                return None;
            }
            a.swap(col, pivot);
            inv.swap(col, pivot);

            let p = a[col][col];
            for k in 0..4 {
                a[col][k] /= p;
                inv[col][k] /= p;
            }
            for row in 0..4 {
                if row == col {
                    continue;
                }
                let f = a[row][col];
                if f == 0.0 {
                    continue;
                }
                for k in 0..4 {
                    a[row][k] -= f * a[col][k];
                    inv[row][k] -= f * inv[col][k];
                }
            }
        }
        Some(Affine(inv))
    }
}

/// 两个仿射变换在半径为 `radius` (mm) 的球体上引起的均方根位移 (mm).
///
/// 球心为 `centre` (mm). 计算式为
/// `sqrt(R² / 5 · tr(AᵀA) + |A·c + t|²)`, 其中 `A`, `t` 分别为 `a · b⁻¹ − I`
/// 的线性部分与平移部分. `b` 不可逆时返回 `None`.
pub fn rms_diff(a: &Affine, b: &Affine, centre: [f64; 3], radius: f64) -> Option<f64> {
    let delta = *a * b.inverse()? - Affine::identity();
    let lin = delta.linear_part();
    let t = delta.translation_part();

    let trace: f64 = lin.iter().flatten().map(|v| v * v).sum();
    let mut shift = 0.0;
    for r in 0..3 {
        let d = lin[r][0] * centre[0] + lin[r][1] * centre[1] + lin[r][2] * centre[2] + t[r];
        shift += d * d;
    }
    Some((radius * radius / 5.0 * trace + shift).sqrt())
}

/// 同 [`rms_diff`], 使用默认的 80mm 半径.
#[inline]
pub fn rms_diff_default(a: &Affine, b: &Affine, centre: [f64; 3]) -> Option<f64> {
    rms_diff(a, b, centre, RMS_RADIUS_MM)
}

/// 仿射变换分解结果.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Decomposition {
    /// 绕 x, y, z 轴的旋转角 (弧度).
    pub rotation: [f64; 3],

    /// 平移 (mm).
    pub translation: [f64; 3],

    /// 三个方向的缩放.
    pub scale: [f64; 3],
}

#[inline]
fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
fn norm(a: [f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

#[inline]
fn axpy(k: f64, x: [f64; 3], y: [f64; 3]) -> [f64; 3] {
    [y[0] + k * x[0], y[1] + k * x[1], y[2] + k * x[2]]
}

/// 将仿射变换分解为旋转角, 平移与缩放.
///
/// 线性部分的列向量经 Gram-Schmidt 正交化得到旋转矩阵, 之后按
/// `R = Rx · Ry · Rz` 的约定提取欧拉角.
pub fn decompose(m: &Affine) -> Decomposition {
    let lin = m.linear_part();
    let col = |c: usize| [lin[0][c], lin[1][c], lin[2][c]];

    let mut x = col(0);
    let sx = norm(x);
    x = x.map(|v| v / sx);

    let mut y = col(1);
    y = axpy(-dot(x, y), x, y);
    let sy = norm(y);
    y = y.map(|v| v / sy);

    let mut z = col(2);
    z = axpy(-dot(x, z), x, z);
    z = axpy(-dot(y, z), y, z);
    let sz = norm(z);
    z = z.map(|v| v / sz);

    // r[row][col], 列为 x, y, z.
    let r = [[x[0], y[0], z[0]], [x[1], y[1], z[1]], [x[2], y[2], z[2]]];

    let cy = (r[0][0] * r[0][0] + r[0][1] * r[0][1]).sqrt();
    let rotation = if cy < 1e-4 {
        let (cx, sx) = (r[1][1], -r[2][1]);
        let sy = -r[0][2];
        [sx.atan2(cx), sy.atan2(0.0), 0.0]
    } else {
        let (cz, sz) = (r[0][0] / cy, r[0][1] / cy);
        let (cx, sx) = (r[2][2] / cy, r[1][2] / cy);
        let sy = -r[0][2];
        [sx.atan2(cx), sy.atan2(cy), sz.atan2(cz)]
    };

    Decomposition {
        rotation,
        translation: m.translation_part(),
        scale: [sx, sy, sz],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_inverse_roundtrip() {
        let m = Affine::from_euler([0.1, -0.2, 0.3]) * Affine::translation([1.0, 2.0, -3.0]);
        let id = m * m.inverse().unwrap();
        for r in 0..4 {
            for c in 0..4 {
                assert!(close(id[(r, c)], if r == c { 1.0 } else { 0.0 }));
            }
        }
    }

    #[test]
    fn test_singular() {
        let mut m = Affine::identity();
        m.0[2][2] = 0.0;
        assert!(m.inverse().is_none());
    }

    #[test]
    fn test_rms_identity_is_zero() {
        let m = Affine::from_euler([0.01, 0.02, 0.03]);
        assert!(close(rms_diff_default(&m, &m, [0.0; 3]).unwrap(), 0.0));
    }

    #[test]
    fn test_rms_pure_translation() {
        let a = Affine::translation([3.0, 4.0, 0.0]);
        let d = rms_diff_default(&a, &Affine::identity(), [10.0, 20.0, 30.0]).unwrap();
        assert!(close(d, 5.0));
    }

    #[test]
    fn test_rms_scaling_uses_radius() {
        // A = 0.1 I, c = 0: tr(AᵀA) = 0.03, rms = sqrt(80² / 5 · 0.03).
        let mut a = Affine::identity();
        for i in 0..3 {
            a.0[i][i] = 1.1;
        }
        let d = rms_diff_default(&a, &Affine::identity(), [0.0; 3]).unwrap();
        assert!(close(d, (6400.0 / 5.0 * 0.03f64).sqrt()));
    }

    #[test]
    fn test_decompose_recovers_angles() {
        let angles = [0.05, -0.12, 0.3];
        let mut m = Affine::from_euler(angles);
        m.0[0][3] = 1.5;
        m.0[1][3] = -0.5;
        m.0[2][3] = 2.0;
        let d = decompose(&m);
        for i in 0..3 {
            assert!(close(d.rotation[i], angles[i]), "{:?}", d.rotation);
            assert!(close(d.scale[i], 1.0));
        }
        assert_eq!(d.translation, [1.5, -0.5, 2.0]);
    }
}
