//! 直方图.

use super::{Canvas, Panel, Rect};
use crate::consts::rgb;
use crate::{DtiError, DtiResult};

/// 等宽分箱直方图.
///
/// 区间 `[min, max]` 之外的值被丢弃,
/// 除最后一个分箱为闭区间外其余分箱均为左闭右开.
#[derive(Clone, Debug, PartialEq)]
pub struct Histogram {
    min: f64,
    max: f64,
    counts: Vec<u64>,
}

impl Histogram {
    /// 统计 `values` 在 `[min, max]` 上的 `bins` 个分箱计数.
    pub fn new<I: IntoIterator<Item = f64>>(
        values: I,
        min: f64,
        max: f64,
        bins: usize,
    ) -> DtiResult<Self> {
        if bins == 0 || !(max > min) {
            return Err(DtiError::InvalidArgument(format!(
                "直方图范围 [{min}, {max}] 或分箱数 {bins} 无效"
            )));
        }
        let mut counts = vec![0u64; bins];
        let width = (max - min) / bins as f64;
        for v in values {
            if !(min..=max).contains(&v) {
                continue;
            }
            let idx = (((v - min) / width).floor() as usize).min(bins - 1);
            counts[idx] += 1;
        }
        Ok(Self { min, max, counts })
    }

    /// 各分箱计数.
    #[inline]
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// 落在范围内的样本总数.
    #[inline]
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// 分箱边界, 共 `bins + 1` 个.
    pub fn edges(&self) -> Vec<f64> {
        let n = self.counts.len();
        (0..=n)
            .map(|i| self.min + (self.max - self.min) * i as f64 / n as f64)
            .collect()
    }

    /// 在 `panel` 中以实心柱绘制. `panel` 的横轴范围应覆盖 `[min, max]`.
    pub fn draw(&self, c: &mut Canvas, panel: &Panel, color: [u8; 3]) {
        let edges = self.edges();
        for (i, &n) in self.counts.iter().enumerate() {
            if n == 0 {
                continue;
            }
            let x0 = panel.px(edges[i]);
            let x1 = panel.px(edges[i + 1]).max(x0 + 1);
            let top = panel.py(n as f64);
            let bottom = panel.bottom();
            if top > bottom {
                continue;
            }
            c.fill_rect(
                Rect::new(x0 as u32, top as u32, (x1 - x0) as u32, (bottom - top + 1) as u32),
                color,
            );
        }
    }

    /// 生成独立的直方图图像.
    ///
    /// `y_cap` 为纵轴上限 (与原始 QA 报告中固定的 `set_ylim` 相同);
    /// 为 `None` 时取最大计数的 1.05 倍.
    pub fn figure(&self, size: (u32, u32), color: [u8; 3], log_y: bool, y_cap: Option<f64>) -> Canvas {
        let mut c = Canvas::new(size.0, size.1, rgb::WHITE);
        let area = c.bounds().shrink(size.0.min(size.1) / 12);
        self.draw_into(&mut c, area, color, log_y, y_cap);
        c
    }

    /// 在画布的 `area` 区域中绘制带边框的直方图.
    pub fn draw_into(&self, c: &mut Canvas, area: Rect, color: [u8; 3], log_y: bool, y_cap: Option<f64>) {
        let peak = self.counts.iter().copied().max().unwrap_or(0) as f64;
        let panel = if log_y {
            let top = y_cap.unwrap_or_else(|| (peak * 2.0).max(10.0));
            Panel::new_log(area, (self.min, self.max), (0.8, top))
        } else {
            let top = y_cap.unwrap_or_else(|| (peak * 1.05).max(1.0));
            Panel::new(area, (self.min, self.max), (0.0, top))
        };
        panel.draw_frame(c, 4);
        self.draw(c, &panel, color);
        c.stroke_rect(area, rgb::BLACK);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binning_last_bin_closed() {
        let h = Histogram::new([0.0, 0.1, 0.5, 0.99, 1.0, 1.5, -0.1], 0.0, 1.0, 4).unwrap();
        // [0, .25) [.25, .5) [.5, .75) [.75, 1]
        assert_eq!(h.counts(), &[2, 0, 1, 2]);
        assert_eq!(h.total(), 5);
        assert_eq!(h.edges(), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_invalid() {
        assert!(Histogram::new([1.0], 1.0, 1.0, 3).is_err());
        assert!(Histogram::new([1.0], 0.0, 1.0, 0).is_err());
    }

    #[test]
    fn test_draw_colours_pixels() {
        let h = Histogram::new([0.1, 0.1, 0.9], 0.0, 1.0, 2).unwrap();
        let c = h.figure((120, 120), rgb::RED, false, None);
        let red = c.image().pixels().filter(|p| p.0 == rgb::RED).count();
        assert!(red > 0);
    }
}
