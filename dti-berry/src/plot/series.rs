//! 时间序列折线图.

use super::{Canvas, Panel, Rect};
use crate::consts::rgb;

/// 一条待绘制的序列.
#[derive(Copy, Clone, Debug)]
pub struct Series<'a> {
    /// 每个体积一个值, 允许缺失.
    pub values: &'a [Option<f64>],

    /// 线条颜色.
    pub color: [u8; 3],
}

/// 所有序列中有效值的最小/最大值.
fn value_range(series: &[Series]) -> Option<(f64, f64)> {
    let mut it = series.iter().flat_map(|s| s.values.iter().flatten().copied());
    let first = it.next()?;
    Some(it.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
}

/// 在 `area` 中绘制多条序列. `y_range` 为 `None` 时根据数据自动确定.
pub fn draw_series_into(c: &mut Canvas, area: Rect, series: &[Series], y_range: Option<(f64, f64)>) {
    let n = series.iter().map(|s| s.values.len()).max().unwrap_or(0);
    let x_range = (0.0, n.saturating_sub(1).max(1) as f64);
    let y_range = y_range.unwrap_or_else(|| match value_range(series) {
        Some((lo, hi)) if hi > lo => {
            let pad = (hi - lo) * 0.05;
            (lo - pad, hi + pad)
        }
        Some((lo, _)) => (lo - 1.0, lo + 1.0),
        None => (0.0, 1.0),
    });
    let panel = Panel::new(area, x_range, y_range);
    panel.draw_frame(c, 4);
    if y_range.0 < 0.0 && y_range.1 > 0.0 {
        let y = panel.py(0.0);
        c.line(area.x as i64, y, (area.x + area.w) as i64 - 1, y, rgb::GRAY);
    }
    for s in series {
        panel.draw_series(c, s.values, s.color);
    }
}

/// 生成独立的时间序列图 (对应 `fsl_tsplot`).
pub fn time_series_figure(size: (u32, u32), series: &[Series], y_range: Option<(f64, f64)>) -> Canvas {
    let mut c = Canvas::new(size.0, size.1, rgb::WHITE);
    let area = c.bounds().shrink(size.0.min(size.1) / 12);
    draw_series_into(&mut c, area, series, y_range);
    c
}
