//! RGB 画布与基础绘制原语.

use crate::{DtiError, DtiResult};
use image::{Rgb, RgbImage};
use std::path::Path;

/// 画布上的矩形区域, 以像素为单位. `(x, y)` 为左上角.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Rect {
    /// 左上角横坐标.
    pub x: u32,

    /// 左上角纵坐标.
    pub y: u32,

    /// 宽.
    pub w: u32,

    /// 高.
    pub h: u32,
}

impl Rect {
    /// 构造矩形.
    #[inline]
    pub const fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// 按比例 (左, 右, 上, 下, 均为 `0.0..=1.0`, 从左上角量起) 从 `self` 中切出子区域.
    /// `top`/`bottom` 都从上边缘开始计算.
    pub fn fraction(&self, left: f64, right: f64, top: f64, bottom: f64) -> Rect {
        let x0 = self.x + (self.w as f64 * left).round() as u32;
        let x1 = self.x + (self.w as f64 * right).round() as u32;
        let y0 = self.y + (self.h as f64 * top).round() as u32;
        let y1 = self.y + (self.h as f64 * bottom).round() as u32;
        Rect::new(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
    }

    /// 水平等分为 `n` 列, 列间留 `gap` 像素.
    pub fn split_columns(&self, n: u32, gap: u32) -> Vec<Rect> {
        if n == 0 {
            return Vec::new();
        }
        let total_gap = gap * (n - 1);
        let w = self.w.saturating_sub(total_gap) / n;
        (0..n)
            .map(|i| Rect::new(self.x + i * (w + gap), self.y, w, self.h))
            .collect()
    }

    /// 垂直等分为 `n` 行, 行间留 `gap` 像素.
    pub fn split_rows(&self, n: u32, gap: u32) -> Vec<Rect> {
        if n == 0 {
            return Vec::new();
        }
        let total_gap = gap * (n - 1);
        let h = self.h.saturating_sub(total_gap) / n;
        (0..n)
            .map(|i| Rect::new(self.x, self.y + i * (h + gap), self.w, h))
            .collect()
    }

    /// 四周各收缩 `m` 像素.
    pub fn shrink(&self, m: u32) -> Rect {
        Rect::new(
            self.x + m,
            self.y + m,
            self.w.saturating_sub(2 * m),
            self.h.saturating_sub(2 * m),
        )
    }
}

/// 可保存为 PNG/JPEG 的 RGB 画布.
///
/// 所有绘制操作都会自动裁剪越界部分.
#[derive(Clone, Debug)]
pub struct Canvas {
    img: RgbImage,
}

impl Canvas {
    /// 以背景色 `bg` 创建 `width × height` 的画布.
    pub fn new(width: u32, height: u32, bg: [u8; 3]) -> Self {
        Self {
            img: RgbImage::from_pixel(width, height, Rgb(bg)),
        }
    }

    /// 画布宽度.
    #[inline]
    pub fn width(&self) -> u32 {
        self.img.width()
    }

    /// 画布高度.
    #[inline]
    pub fn height(&self) -> u32 {
        self.img.height()
    }

    /// 整个画布对应的矩形.
    #[inline]
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width(), self.height())
    }

    /// 底层图像.
    #[inline]
    pub fn image(&self) -> &RgbImage {
        &self.img
    }

    /// 读取像素. 越界返回 `None`.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        (x < self.width() && y < self.height()).then(|| self.img.get_pixel(x, y).0)
    }

    /// 设置像素. 越界时忽略.
    #[inline]
    pub fn put(&mut self, x: i64, y: i64, color: [u8; 3]) {
        if x >= 0 && y >= 0 && (x as u32) < self.width() && (y as u32) < self.height() {
            self.img.put_pixel(x as u32, y as u32, Rgb(color));
        }
    }

    /// 以不透明度 `alpha` 将 `color` 叠加到像素上. 越界时忽略.
    pub fn blend(&mut self, x: i64, y: i64, color: [u8; 3], alpha: f64) {
        if x < 0 || y < 0 || x as u32 >= self.width() || y as u32 >= self.height() {
            return;
        }
        let alpha = alpha.clamp(0.0, 1.0);
        let p = self.img.get_pixel_mut(x as u32, y as u32);
        for (dst, src) in p.0.iter_mut().zip(color) {
            *dst = (*dst as f64 * (1.0 - alpha) + src as f64 * alpha).round() as u8;
        }
    }

    /// 填充矩形.
    pub fn fill_rect(&mut self, r: Rect, color: [u8; 3]) {
        for y in r.y..r.y.saturating_add(r.h) {
            for x in r.x..r.x.saturating_add(r.w) {
                self.put(x as i64, y as i64, color);
            }
        }
    }

    /// 半透明填充矩形.
    pub fn blend_rect(&mut self, r: Rect, color: [u8; 3], alpha: f64) {
        for y in r.y..r.y.saturating_add(r.h) {
            for x in r.x..r.x.saturating_add(r.w) {
                self.blend(x as i64, y as i64, color, alpha);
            }
        }
    }

    /// 绘制矩形边框 (1 像素宽).
    pub fn stroke_rect(&mut self, r: Rect, color: [u8; 3]) {
        if r.w == 0 || r.h == 0 {
            return;
        }
        let (x0, y0) = (r.x as i64, r.y as i64);
        let (x1, y1) = (x0 + r.w as i64 - 1, y0 + r.h as i64 - 1);
        self.line(x0, y0, x1, y0, color);
        self.line(x0, y1, x1, y1, color);
        self.line(x0, y0, x0, y1, color);
        self.line(x1, y0, x1, y1, color);
    }

    /// Bresenham 直线.
    pub fn line(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, color: [u8; 3]) {
        let (dx, dy) = ((x1 - x0).abs(), -(y1 - y0).abs());
        let (sx, sy) = (if x0 < x1 { 1 } else { -1 }, if y0 < y1 { 1 } else { -1 });
        let (mut x, mut y, mut err) = (x0, y0, dx + dy);
        loop {
            self.put(x, y, color);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// 以 `(cx, cy)` 为中心绘制半径为 `r` 的实心圆点.
    pub fn marker(&mut self, cx: i64, cy: i64, r: i64, color: [u8; 3]) {
        for y in -r..=r {
            for x in -r..=r {
                if x * x + y * y <= r * r {
                    self.put(cx + x, cy + y, color);
                }
            }
        }
    }

    /// 以 `(cx, cy)` 为中心绘制半径为 `r` 的空心圆.
    pub fn ring(&mut self, cx: i64, cy: i64, r: i64, color: [u8; 3]) {
        let inner = (r - 1).max(0);
        for y in -r..=r {
            for x in -r..=r {
                let d = x * x + y * y;
                if d <= r * r && d > inner * inner {
                    self.put(cx + x, cy + y, color);
                }
            }
        }
    }

    /// 将 `other` 贴到 `(x, y)` 处.
    pub fn paste(&mut self, other: &Canvas, x: u32, y: u32) {
        for (ox, oy, p) in other.img.enumerate_pixels() {
            self.put((x + ox) as i64, (y + oy) as i64, p.0);
        }
    }

    /// 按扩展名保存 (`.png`, `.jpg`, ...). 父目录不存在时会被创建.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> DtiResult<()> {
        let path = path.as_ref();
        crate::text::ensure_parent(path)?;
        self.img.save(path).map_err(|e| DtiError::image(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clipping() {
        let mut c = Canvas::new(4, 4, [0; 3]);
        c.put(-1, 2, [255; 3]);
        c.put(4, 0, [255; 3]);
        c.fill_rect(Rect::new(2, 2, 10, 10), [9, 9, 9]);
        assert_eq!(c.get(3, 3), Some([9, 9, 9]));
        assert_eq!(c.get(1, 1), Some([0, 0, 0]));
        assert_eq!(c.get(4, 4), None);
    }

    #[test]
    fn test_line_endpoints() {
        let mut c = Canvas::new(10, 10, [0; 3]);
        c.line(1, 8, 7, 2, [255, 0, 0]);
        assert_eq!(c.get(1, 8), Some([255, 0, 0]));
        assert_eq!(c.get(7, 2), Some([255, 0, 0]));
    }

    #[test]
    fn test_blend() {
        let mut c = Canvas::new(1, 1, [0; 3]);
        c.blend(0, 0, [200, 100, 0], 0.5);
        assert_eq!(c.get(0, 0), Some([100, 50, 0]));
    }

    #[test]
    fn test_split() {
        let r = Rect::new(0, 0, 100, 40);
        let cols = r.split_columns(3, 5);
        assert_eq!(cols.len(), 3);
        assert_eq!(cols[1], Rect::new(35, 0, 30, 40));
        let sub = r.fraction(0.1, 0.5, 0.25, 0.75);
        assert_eq!(sub, Rect::new(10, 10, 40, 20));
    }
}
