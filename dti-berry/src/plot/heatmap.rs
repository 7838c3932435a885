//! 矩阵热图 (最近邻插值), 附带色条.

use super::{Canvas, Colormap, Rect};
use crate::consts::rgb;
use ndarray::ArrayView2;

/// 热图的颜色范围.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ColorRange {
    /// 使用数据自身的最小/最大值.
    Auto,

    /// 固定范围.
    Fixed(f64, f64),
}

/// 求有限值的最小/最大值. 没有有限值时返回 `(0.0, 0.0)`.
fn finite_min_max(m: ArrayView2<f64>) -> (f64, f64) {
    let mut it = m.iter().copied().filter(|v| v.is_finite());
    let Some(first) = it.next() else {
        return (0.0, 0.0);
    };
    it.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)))
}

/// 将矩阵 `m` 绘制到画布的 `area` 区域中. 矩阵的行向下增长, 列向右增长.
/// NaN 表示缺失, 画为白色.
pub fn draw_matrix(c: &mut Canvas, area: Rect, m: ArrayView2<f64>, cmap: Colormap, range: ColorRange) {
    let (rows, cols) = m.dim();
    if rows == 0 || cols == 0 || area.w == 0 || area.h == 0 {
        return;
    }
    let (vmin, vmax) = match range {
        ColorRange::Auto => finite_min_max(m),
        ColorRange::Fixed(lo, hi) => (lo, hi),
    };
    for py in 0..area.h {
        let r = (py as usize * rows) / area.h as usize;
        for px in 0..area.w {
            let col = (px as usize * cols) / area.w as usize;
            let v = m[(r, col)];
            let color = if v.is_nan() { rgb::WHITE } else { cmap.eval_range(v, vmin, vmax) };
            c.put((area.x + px) as i64, (area.y + py) as i64, color);
        }
    }
}

/// 在 `area` 中绘制竖直色条 (底部为最小值).
pub fn draw_colorbar(c: &mut Canvas, area: Rect, cmap: Colormap) {
    if area.h == 0 {
        return;
    }
    for py in 0..area.h {
        let t = 1.0 - py as f64 / (area.h.max(2) - 1) as f64;
        let color = cmap.eval(t);
        for px in 0..area.w {
            c.put((area.x + px) as i64, (area.y + py) as i64, color);
        }
    }
    c.stroke_rect(area, rgb::BLACK);
}

/// 生成带色条的热图. `cell` 为每个矩阵元素的边长 (像素), 至少为 1.
pub fn heatmap(m: ArrayView2<f64>, cmap: Colormap, range: ColorRange, cell: u32) -> Canvas {
    let (rows, cols) = m.dim();
    let cell = cell.max(1);
    let margin = 16;
    let bar_w = 16;
    let w = cols as u32 * cell;
    let h = rows as u32 * cell;
    let mut c = Canvas::new(w + 3 * margin + bar_w, h + 2 * margin, rgb::WHITE);
    let area = Rect::new(margin, margin, w, h);
    draw_matrix(&mut c, area, m, cmap, range);
    c.stroke_rect(Rect::new(margin - 1, margin - 1, w + 2, h + 2), rgb::BLACK);
    draw_colorbar(&mut c, Rect::new(2 * margin + w, margin, bar_w, h), cmap);
    c
}

/// 计算使热图边长约为 `target` 像素的单元格大小.
#[inline]
pub fn cell_for(n: usize, target: u32) -> u32 {
    if n == 0 {
        return 1;
    }
    (target / n as u32).max(1)
}
