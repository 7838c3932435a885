//! 颜色映射表.

use once_cell::sync::Lazy;

/// 连续颜色映射.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Colormap {
    /// 蓝 → 青 → 黄 → 红.
    Jet,

    /// 青 → 品红.
    Cool,

    /// 品红 → 青.
    CoolR,

    /// 黑 → 白.
    Gray,
}

/// (位置, 取值) 分段线性控制点.
type Segments = &'static [(f64, f64)];

const JET_R: Segments = &[(0.0, 0.0), (0.35, 0.0), (0.66, 1.0), (0.89, 1.0), (1.0, 0.5)];
const JET_G: Segments = &[
    (0.0, 0.0),
    (0.125, 0.0),
    (0.375, 1.0),
    (0.64, 1.0),
    (0.91, 0.0),
    (1.0, 0.0),
];
const JET_B: Segments = &[(0.0, 0.5), (0.11, 1.0), (0.34, 1.0), (0.65, 0.0), (1.0, 0.0)];

fn interp(seg: Segments, t: f64) -> f64 {
    for w in seg.windows(2) {
        let ((x0, y0), (x1, y1)) = (w[0], w[1]);
        if t <= x1 {
            if x1 <= x0 {
                return y1;
            }
            return y0 + (t - x0) / (x1 - x0) * (y1 - y0);
        }
    }
    seg.last().map_or(0.0, |p| p.1)
}

#[inline]
fn to_u8(v: f64) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// 256 级 jet 查找表.
static JET_LUT: Lazy<[[u8; 3]; 256]> = Lazy::new(|| {
    let mut lut = [[0u8; 3]; 256];
    for (i, slot) in lut.iter_mut().enumerate() {
        let t = i as f64 / 255.0;
        *slot = [
            to_u8(interp(JET_R, t)),
            to_u8(interp(JET_G, t)),
            to_u8(interp(JET_B, t)),
        ];
    }
    lut
});

impl Colormap {
    /// 求 `t` (`0.0..=1.0`, 越界截断; NaN 视为 0) 对应的颜色.
    pub fn eval(&self, t: f64) -> [u8; 3] {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        match self {
            Colormap::Jet => JET_LUT[(t * 255.0).round() as usize],
            Colormap::Cool => [to_u8(t), to_u8(1.0 - t), 255],
            Colormap::CoolR => [to_u8(1.0 - t), to_u8(t), 255],
            Colormap::Gray => {
                let g = to_u8(t);
                [g, g, g]
            }
        }
    }

    /// 将 `v` 按 `[vmin, vmax]` 归一化后求颜色.
    pub fn eval_range(&self, v: f64, vmin: f64, vmax: f64) -> [u8; 3] {
        if vmax <= vmin {
            return self.eval(0.0);
        }
        self.eval((v - vmin) / (vmax - vmin))
    }
}

/// 定性调色板, 用于区分不同被试.
const PALETTE: [[u8; 3]; 10] = [
    [31, 119, 180],
    [255, 127, 14],
    [44, 160, 44],
    [214, 39, 40],
    [148, 103, 189],
    [140, 86, 75],
    [227, 119, 194],
    [127, 127, 127],
    [188, 189, 34],
    [23, 190, 207],
];

/// 获取第 `i` 个定性颜色 (循环使用).
#[inline]
pub fn palette(i: usize) -> [u8; 3] {
    PALETTE[i % PALETTE.len()]
}

/// 解析颜色: `#rrggbb` 或常用颜色名 (`blue`, `red`, `green`, `orange`, `black`, `gray`).
pub fn parse_color(s: &str) -> Option<[u8; 3]> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix('#') {
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        return Some([channel(0)?, channel(2)?, channel(4)?]);
    }
    let c = match s.to_ascii_lowercase().as_str() {
        "blue" => [0, 0, 255],
        "red" => [255, 0, 0],
        "green" => [0, 128, 0],
        "orange" => [255, 165, 0],
        "black" => [0, 0, 0],
        "gray" | "grey" => [128, 128, 128],
        _ => return None,
    };
    Some(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#3670f1"), Some([0x36, 0x70, 0xf1]));
        assert_eq!(parse_color("Orange"), Some([255, 165, 0]));
        assert_eq!(parse_color("#36"), None);
        assert_eq!(parse_color("teal"), None);
    }

    #[test]
    fn test_jet_ends() {
        assert_eq!(Colormap::Jet.eval(0.0), [0, 0, 128]);
        assert_eq!(Colormap::Jet.eval(1.0), [128, 0, 0]);
        assert_eq!(Colormap::Jet.eval(0.5)[1], 255);
    }

    #[test]
    fn test_cool() {
        assert_eq!(Colormap::Cool.eval(0.0), [0, 255, 255]);
        assert_eq!(Colormap::CoolR.eval(0.0), [255, 0, 255]);
        assert_eq!(Colormap::Gray.eval(2.0), [255, 255, 255]);
        assert_eq!(Colormap::Gray.eval(f64::NAN), [0, 0, 0]);
    }

    #[test]
    fn test_eval_range_degenerate() {
        assert_eq!(Colormap::Gray.eval_range(3.0, 1.0, 1.0), [0, 0, 0]);
        assert_eq!(Colormap::Gray.eval_range(3.0, 1.0, 5.0), [128, 128, 128]);
    }
}
