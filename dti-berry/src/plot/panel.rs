//! 坐标轴面板: 把数据坐标映射到画布像素.

use super::{Canvas, Rect};
use crate::consts::rgb;

/// 带数据范围的绘图区域.
///
/// `y` 轴向上增长. 对数坐标下, 非正值会被映射到面板底部.
#[derive(Copy, Clone, Debug)]
pub struct Panel {
    /// 像素区域.
    pub rect: Rect,

    /// 横轴范围.
    pub x_range: (f64, f64),

    /// 纵轴范围.
    pub y_range: (f64, f64),

    /// 纵轴是否为对数坐标 (以 10 为底).
    pub log_y: bool,
}

impl Panel {
    /// 线性坐标面板.
    pub fn new(rect: Rect, x_range: (f64, f64), y_range: (f64, f64)) -> Self {
        Self {
            rect,
            x_range,
            y_range,
            log_y: false,
        }
    }

    /// 纵轴对数坐标面板. `y_range` 必须为正.
    pub fn new_log(rect: Rect, x_range: (f64, f64), y_range: (f64, f64)) -> Self {
        Self {
            rect,
            x_range,
            y_range,
            log_y: true,
        }
    }

    /// 数据横坐标 → 像素横坐标.
    pub fn px(&self, x: f64) -> i64 {
        let (x0, x1) = self.x_range;
        let span = if x1 > x0 { x1 - x0 } else { 1.0 };
        let t = (x - x0) / span;
        self.rect.x as i64 + (t * (self.rect.w.saturating_sub(1)) as f64).round() as i64
    }

    /// 数据纵坐标 → 像素纵坐标.
    pub fn py(&self, y: f64) -> i64 {
        let (mut y0, mut y1) = self.y_range;
        let mut y = y;
        if self.log_y {
            if y <= 0.0 {
                return self.bottom();
            }
            y = y.log10();
            y0 = y0.max(f64::MIN_POSITIVE).log10();
            y1 = y1.max(f64::MIN_POSITIVE).log10();
        }
        let span = if y1 > y0 { y1 - y0 } else { 1.0 };
        let t = ((y - y0) / span).clamp(0.0, 1.0);
        self.bottom() - (t * (self.rect.h.saturating_sub(1)) as f64).round() as i64
    }

    /// 面板最底部像素行.
    #[inline]
    pub fn bottom(&self) -> i64 {
        self.rect.y as i64 + self.rect.h as i64 - 1
    }

    /// 绘制边框和若干条水平网格线.
    pub fn draw_frame(&self, c: &mut Canvas, grid_lines: u32) {
        if grid_lines > 0 {
            for i in 1..=grid_lines {
                let y = self.rect.y as i64
                    + (self.rect.h as f64 * i as f64 / (grid_lines + 1) as f64).round() as i64;
                let x0 = self.rect.x as i64;
                c.line(x0, y, x0 + self.rect.w as i64 - 1, y, rgb::LIGHT_GRAY);
            }
        }
        c.stroke_rect(self.rect, rgb::BLACK);
    }

    /// 以折线绘制 `ys` (横坐标为下标). 缺失值被跳过, 相邻的有效点直接相连.
    pub fn draw_series(&self, c: &mut Canvas, ys: &[Option<f64>], color: [u8; 3]) {
        let mut prev: Option<(i64, i64)> = None;
        for (i, y) in ys.iter().enumerate() {
            let Some(y) = y else { continue };
            let p = (self.px(i as f64), self.py(*y));
            if let Some((x0, y0)) = prev {
                c.line(x0, y0, p.0, p.1, color);
            } else {
                c.put(p.0, p.1, color);
            }
            prev = Some(p);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping() {
        let p = Panel::new(Rect::new(10, 10, 101, 51), (0.0, 100.0), (0.0, 50.0));
        assert_eq!(p.px(0.0), 10);
        assert_eq!(p.px(100.0), 110);
        assert_eq!(p.py(0.0), 60);
        assert_eq!(p.py(50.0), 10);
        assert_eq!(p.py(1e9), 10);
    }

    #[test]
    fn test_log_mapping() {
        let p = Panel::new_log(Rect::new(0, 0, 10, 101), (0.0, 1.0), (1.0, 100.0));
        assert_eq!(p.py(10.0), 50);
        assert_eq!(p.py(0.0), p.bottom());
    }
}
