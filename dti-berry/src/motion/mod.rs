//! 涡流校正 (eddy current correction) 头动估计.
//!
//! 包括:
//!
//! 1. 解析 `eddy_correct` 的 `.ecclog` 日志, 计算每个体积的绝对/相对位移,
//!   旋转角与平移 (`ecclog`);
//! 2. 读写 `ec_disp*.txt` 位移文件, 以 `.` 表示缺失值;
//! 3. 按 b 值将位移拆分为 b0 与扩散加权两组, 并求汇总统计量.

use crate::consts::NA_TOKEN;
use crate::{DtiError, DtiResult};
use std::fmt;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

mod affine;
mod ecclog;

pub use affine::{decompose, rms_diff, rms_diff_default, Affine, Decomposition};
pub use ecclog::{displacement_series, write_motion_outputs, MotionParams, RegistrationLog};

/// 位移度量: 相对于第一个体积 (绝对) 或相对于上一个体积 (相对).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Measure {
    /// 绝对位移.
    Abs,

    /// 相对位移.
    Rel,
}

impl Measure {
    /// 全部度量, 按输出列顺序.
    pub const ALL: [Measure; 2] = [Measure::Abs, Measure::Rel];

    /// 列名中使用的简称.
    pub const fn name(&self) -> &'static str {
        match self {
            Measure::Abs => "abs",
            Measure::Rel => "rel",
        }
    }
}

/// 参与统计的体积分组.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum VolumeGroup {
    /// 全部体积 (`ec_disp.txt`).
    All,

    /// 仅 b0 体积 (`ec_disp_b0.txt`).
    B0,

    /// 仅扩散加权体积 (`ec_disp_notb0.txt`).
    NotB0,
}

impl VolumeGroup {
    /// 全部分组, 按输出列顺序.
    pub const ALL: [VolumeGroup; 3] = [VolumeGroup::All, VolumeGroup::B0, VolumeGroup::NotB0];

    /// 列名/文件名后缀.
    pub const fn suffix(&self) -> &'static str {
        match self {
            VolumeGroup::All => "",
            VolumeGroup::B0 => "_b0",
            VolumeGroup::NotB0 => "_notb0",
        }
    }

    /// 该分组对应的位移文件名.
    pub fn disp_file(&self) -> String {
        format!("ec_disp{}.txt", self.suffix())
    }
}

/// 一个位移文件的内容: 每个体积一行, 两列 (绝对, 相对), 允许缺失值.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DispSeries {
    /// 绝对位移 (mm).
    pub abs: Vec<Option<f64>>,

    /// 相对位移 (mm).
    pub rel: Vec<Option<f64>>,
}

fn parse_cell(token: &str) -> Result<Option<f64>, String> {
    if token == NA_TOKEN {
        return Ok(None);
    }
    token
        .parse::<f64>()
        .map(|v| if v.is_nan() { None } else { Some(v) })
        .map_err(|_| format!("`{token}` 既不是数值也不是 `{NA_TOKEN}`"))
}

impl DispSeries {
    /// 由两列完整数值构造.
    pub fn from_values(abs: &[f64], rel: &[f64]) -> Self {
        Self {
            abs: abs.iter().copied().map(Some).collect(),
            rel: rel.iter().copied().map(Some).collect(),
        }
    }

    /// 读取以空格分隔的两列位移文件.
    pub fn read<P: AsRef<Path>>(path: P) -> DtiResult<Self> {
        let path = path.as_ref();
        let text = crate::text::read_to_string(path)?;
        let mut ans = Self::default();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let cells: Vec<&str> = line.split_whitespace().collect();
            let [a, r] = cells.as_slice() else {
                return Err(DtiError::parse(path, lineno + 1, "位移文件每行必须恰好两列"));
            };
            let a = parse_cell(a).map_err(|e| DtiError::parse(path, lineno + 1, e))?;
            let r = parse_cell(r).map_err(|e| DtiError::parse(path, lineno + 1, e))?;
            ans.abs.push(a);
            ans.rel.push(r);
        }
        Ok(ans)
    }

    /// 写出位移文件, 缺失值写作 `.`.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> DtiResult<()> {
        let path = path.as_ref();
        let file = fs::File::create(path).map_err(|e| DtiError::io(path, e))?;
        let mut w = BufWriter::new(file);
        let fmt_cell = |v: &Option<f64>| match v {
            Some(v) => format!("{v:.6}"),
            None => NA_TOKEN.to_string(),
        };
        for (a, r) in self.abs.iter().zip(self.rel.iter()) {
            writeln!(w, "{} {}", fmt_cell(a), fmt_cell(r)).map_err(|e| DtiError::io(path, e))?;
        }
        w.flush().map_err(|e| DtiError::io(path, e))
    }

    /// 体积个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.abs.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.abs.is_empty()
    }

    /// 获取某一度量的序列.
    #[inline]
    pub fn get(&self, m: Measure) -> &[Option<f64>] {
        match m {
            Measure::Abs => &self.abs,
            Measure::Rel => &self.rel,
        }
    }

    /// 按 b 值拆分为 `(b0, notb0)` 两组. 两组长度均与原序列相同,
    /// 不属于该组的体积记为缺失.
    ///
    /// b 值个数必须与体积个数一致.
    pub fn split(&self, bvals: &[f64], b0_threshold: f64) -> DtiResult<(DispSeries, DispSeries)> {
        if bvals.len() != self.len() {
            return Err(DtiError::Shape {
                expected: vec![self.len()],
                found: vec![bvals.len()],
            });
        }
        let keep = |want_b0: bool| {
            let pick = |col: &[Option<f64>]| {
                col.iter()
                    .zip(bvals)
                    .map(|(v, &b)| if (b <= b0_threshold) == want_b0 { *v } else { None })
                    .collect::<Vec<_>>()
            };
            DispSeries {
                abs: pick(&self.abs),
                rel: pick(&self.rel),
            }
        };
        Ok((keep(true), keep(false)))
    }
}

/// 去掉 b0 体积以及紧随其后的体积.
///
/// 跨越 b0 的相对位移由图像对比度突变主导, 不反映真实头动.
/// 返回与 `len` 等长的保留掩膜.
pub fn exclude_b0_neighbours(bvals: &[f64], b0_threshold: f64) -> Vec<bool> {
    let mut keep = vec![true; bvals.len()];
    for (i, &b) in bvals.iter().enumerate() {
        if b <= b0_threshold {
            keep[i] = false;
            if let Some(next) = keep.get_mut(i + 1) {
                *next = false;
            }
        }
    }
    keep
}

/// 汇总统计量. 缺失值不参与计算.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct SeriesStats {
    /// 均值.
    pub mean: Option<f64>,

    /// 样本标准差 (自由度 n - 1).
    pub std: Option<f64>,

    /// 最大值.
    pub max: Option<f64>,
}

impl SeriesStats {
    /// 计算 `values` 中非缺失值的统计量.
    pub fn of(values: &[Option<f64>]) -> Self {
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        let n = present.len();
        if n == 0 {
            return Self::default();
        }
        let mean = present.iter().sum::<f64>() / n as f64;
        let std = (n > 1).then(|| {
            let ss: f64 = present.iter().map(|v| (v - mean) * (v - mean)).sum();
            (ss / (n - 1) as f64).sqrt()
        });
        let max = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Self {
            mean: Some(mean),
            std,
            max: Some(max),
        }
    }
}

impl fmt::Display for SeriesStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: Option<f64>| v.map_or_else(|| NA_TOKEN.to_string(), |v| format!("{v:.4}"));
        write!(
            f,
            "mean {} / std {} / max {}",
            show(self.mean),
            show(self.std),
            show(self.max)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_with_missing() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("ec_disp_b0.txt");
        fs::write(&p, "0.1 0.0\n. .\n0.3 0.2\n").unwrap();
        let d = DispSeries::read(&p).unwrap();
        assert_eq!(d.abs, vec![Some(0.1), None, Some(0.3)]);
        assert_eq!(d.rel, vec![Some(0.0), None, Some(0.2)]);
    }

    #[test]
    fn test_read_bad_row() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("ec_disp.txt");
        fs::write(&p, "0.1 0.0 9\n").unwrap();
        assert!(matches!(
            DispSeries::read(&p),
            Err(DtiError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_split_and_write() {
        let d = DispSeries::from_values(&[0.0, 0.2, 0.4, 0.6], &[0.0, 0.2, 0.2, 0.2]);
        let (b0, dw) = d.split(&[0.0, 1000.0, 5.0, 1000.0], 5.0).unwrap();
        assert_eq!(b0.abs, vec![Some(0.0), None, Some(0.4), None]);
        assert_eq!(dw.rel, vec![None, Some(0.2), None, Some(0.2)]);

        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("ec_disp_notb0.txt");
        dw.write(&p).unwrap();
        assert_eq!(DispSeries::read(&p).unwrap(), dw);
    }

    #[test]
    fn test_split_length_mismatch() {
        let d = DispSeries::from_values(&[0.0], &[0.0]);
        assert!(matches!(d.split(&[0.0, 0.0], 0.0), Err(DtiError::Shape { .. })));
    }

    #[test]
    fn test_stats() {
        let s = SeriesStats::of(&[Some(1.0), None, Some(2.0), Some(3.0)]);
        assert_eq!(s.mean, Some(2.0));
        assert_eq!(s.std, Some(1.0));
        assert_eq!(s.max, Some(3.0));

        let one = SeriesStats::of(&[Some(4.0)]);
        assert_eq!(one.std, None);
        assert_eq!(SeriesStats::of(&[None]), SeriesStats::default());
    }

    #[test]
    fn test_exclude_b0_neighbours() {
        let keep = exclude_b0_neighbours(&[0.0, 1000.0, 1000.0, 0.0, 1000.0, 0.0], 0.0);
        assert_eq!(keep, vec![false, false, true, false, false, false]);
    }
}
