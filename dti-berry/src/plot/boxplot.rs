//! 箱线图.

use super::{Canvas, Panel, Rect};
use crate::consts::rgb;
use crate::stats::BoxStats;

/// 一个需要着色的离群点: 第 `column` 个箱子上, 数值为 `value`, 颜色为 `color`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ColoredFlier {
    /// 箱子下标.
    pub column: usize,

    /// 数值.
    pub value: f64,

    /// 颜色.
    pub color: [u8; 3],
}

/// 绘制一组箱线图. 未在 `colored` 中出现的离群点以黑色空心圆绘制.
///
/// 纵轴范围会在数据范围基础上, 向上额外留出 `head_room` 的空间 (原始脚本中留给标注).
pub fn boxplot_figure(
    size: (u32, u32),
    boxes: &[BoxStats],
    colored: &[ColoredFlier],
    head_room: f64,
) -> Canvas {
    let mut c = Canvas::new(size.0, size.1, rgb::WHITE);
    let area = c.bounds().shrink(size.0.min(size.1) / 12);
    draw_boxes_into(&mut c, area, boxes, colored, head_room);
    c
}

/// 在 `area` 中绘制箱线图.
pub fn draw_boxes_into(
    c: &mut Canvas,
    area: Rect,
    boxes: &[BoxStats],
    colored: &[ColoredFlier],
    head_room: f64,
) {
    let (lo, hi) = boxes
        .iter()
        .map(BoxStats::extent)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(a, b), (l, h)| (a.min(l), b.max(h)));
    let (lo, hi) = if lo.is_finite() && hi > lo {
        let pad = (hi - lo) * 0.05;
        (lo - pad, hi + pad + head_room)
    } else {
        (0.0, 1.0 + head_room)
    };

    // 第 i 个箱子位于 x = i + 1.
    let panel = Panel::new(area, (0.5, boxes.len() as f64 + 0.5), (lo, hi));
    panel.draw_frame(c, 4);

    let half = (area.w as f64 / (boxes.len().max(1) as f64) * 0.25).max(2.0) as i64;
    for (i, b) in boxes.iter().enumerate() {
        let x = panel.px(i as f64 + 1.0);
        let (y_q1, y_q3) = (panel.py(b.q1), panel.py(b.q3));
        let (y_lo, y_hi) = (panel.py(b.whisker_lo), panel.py(b.whisker_hi));
        let y_med = panel.py(b.median);

        // 箱体
        c.line(x - half, y_q3, x + half, y_q3, rgb::BLACK);
        c.line(x - half, y_q1, x + half, y_q1, rgb::BLACK);
        c.line(x - half, y_q3, x - half, y_q1, rgb::BLACK);
        c.line(x + half, y_q3, x + half, y_q1, rgb::BLACK);
        c.line(x - half, y_med, x + half, y_med, rgb::ORANGE);

        // 须
        c.line(x, y_q1, x, y_lo, rgb::BLACK);
        c.line(x, y_q3, x, y_hi, rgb::BLACK);
        c.line(x - half / 2, y_lo, x + half / 2, y_lo, rgb::BLACK);
        c.line(x - half / 2, y_hi, x + half / 2, y_hi, rgb::BLACK);

        for &f in &b.fliers {
            let y = panel.py(f);
            match colored.iter().find(|cf| cf.column == i && cf.value == f) {
                Some(cf) => c.marker(x, y, 4, cf.color),
                None => c.ring(x, y, 4, rgb::BLACK),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colored_flier_is_drawn() {
        let b = BoxStats::of(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 100.0]).unwrap();
        let colored = [ColoredFlier {
            column: 0,
            value: 100.0,
            color: rgb::RED,
        }];
        let c = boxplot_figure((200, 300), &[b], &colored, 0.0);
        assert!(c.image().pixels().any(|p| p.0 == rgb::RED));
        assert!(c.image().pixels().any(|p| p.0 == rgb::ORANGE));
    }
}
