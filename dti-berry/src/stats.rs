//! 简单统计量: 分位数与箱线图统计.

use crate::consts::WHISKER;
use ordered_float::OrderedFloat;

/// 线性插值分位数 (位置为 `(n − 1)·q/100`).
///
/// `sorted` 必须已升序排列且非空; `q` 取值 `0.0..=100.0`.
pub fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let pos = (sorted.len() - 1) as f64 * q.clamp(0.0, 100.0) / 100.0;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// 升序排序 (NaN 排在最后).
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by_key(|&x| OrderedFloat(x));
    v
}

/// 一组数据的箱线图统计量.
///
/// 须延伸到 `[q1 - whis·iqr, q3 + whis·iqr]` 内最极端的数据点, 之外的点为离群点.
#[derive(Clone, Debug, PartialEq)]
pub struct BoxStats {
    /// 下四分位数.
    pub q1: f64,

    /// 中位数.
    pub median: f64,

    /// 上四分位数.
    pub q3: f64,

    /// 下须.
    pub whisker_lo: f64,

    /// 上须.
    pub whisker_hi: f64,

    /// 离群点, 升序.
    pub fliers: Vec<f64>,
}

impl BoxStats {
    /// 使用默认须长 (1.5 IQR) 计算. `values` 为空时返回 `None`. NaN 会被忽略.
    #[inline]
    pub fn of(values: &[f64]) -> Option<Self> {
        Self::with_whisker(values, WHISKER)
    }

    /// 以须长 `whis` 计算.
    pub fn with_whisker(values: &[f64], whis: f64) -> Option<Self> {
        let clean: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if clean.is_empty() {
            return None;
        }
        let s = sorted(&clean);
        let q1 = percentile_sorted(&s, 25.0);
        let median = percentile_sorted(&s, 50.0);
        let q3 = percentile_sorted(&s, 75.0);
        let iqr = q3 - q1;
        let lo_limit = q1 - whis * iqr;
        let hi_limit = q3 + whis * iqr;

        let whisker_lo = s
            .iter()
            .copied()
            .find(|&v| v >= lo_limit)
            .map_or(q1, |v| v.min(q1));
        let whisker_hi = s
            .iter()
            .rev()
            .copied()
            .find(|&v| v <= hi_limit)
            .map_or(q3, |v| v.max(q3));

        let fliers = s
            .iter()
            .copied()
            .filter(|&v| v < whisker_lo || v > whisker_hi)
            .collect();

        Some(Self {
            q1,
            median,
            q3,
            whisker_lo,
            whisker_hi,
            fliers,
        })
    }

    /// 数据的最小值与最大值 (包括离群点).
    pub fn extent(&self) -> (f64, f64) {
        let lo = self.fliers.first().map_or(self.whisker_lo, |f| f.min(self.whisker_lo));
        let hi = self.fliers.last().map_or(self.whisker_hi, |f| f.max(self.whisker_hi));
        (lo, hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile() {
        let s = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile_sorted(&s, 0.0), 1.0);
        assert_eq!(percentile_sorted(&s, 50.0), 2.5);
        assert_eq!(percentile_sorted(&s, 25.0), 1.75);
        assert_eq!(percentile_sorted(&s, 100.0), 4.0);
    }

    #[test]
    fn test_box_stats_with_flier() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 100.0];
        let b = BoxStats::of(&v).unwrap();
        assert_eq!(b.q1, 3.0);
        assert_eq!(b.median, 5.0);
        assert_eq!(b.q3, 7.0);
        assert_eq!(b.whisker_lo, 1.0);
        assert_eq!(b.whisker_hi, 8.0);
        assert_eq!(b.fliers, vec![100.0]);
        assert_eq!(b.extent(), (1.0, 100.0));
    }

    #[test]
    fn test_box_stats_constant() {
        let b = BoxStats::of(&[2.0, 2.0, 2.0]).unwrap();
        assert_eq!(b.whisker_lo, 2.0);
        assert_eq!(b.whisker_hi, 2.0);
        assert!(b.fliers.is_empty());
    }

    #[test]
    fn test_box_stats_empty() {
        assert!(BoxStats::of(&[]).is_none());
        assert!(BoxStats::of(&[f64::NAN]).is_none());
    }
}
