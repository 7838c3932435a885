//! 单被试 QA 报告.
//!
//! 一页 A4 比例的图像, 自上而下依次为:
//!
//! 1. 表头, 右侧是 Pass/Fail 两个勾选框;
//! 2. b0 图像叠加脑掩膜的三方向拼图;
//! 3. 三组体积 (全部, b0, 非 b0) 的绝对/相对位移曲线;
//! 4. FA 图像叠加白质掩膜的三方向拼图;
//! 5. FA, MO, SSE 的直方图.

use crate::consts::{files, rgb};
use crate::motion::{DispSeries, Measure, VolumeGroup};
use crate::plot::{draw_series_into, Canvas, Colormap, Histogram, Rect, Series};
use crate::volume::{montage_slices, plane, Orientation};
use crate::{DtiError, DtiResult, DtiVolume};
use ndarray::{Array2, ArrayView3};
use std::path::{Path, PathBuf};

/// 页面尺寸 (英寸).
pub const PAGE_INCHES: (f64, f64) = (8.3, 11.6);

/// 默认分辨率.
pub const DEFAULT_DPI: f64 = 150.0;

/// 拼图一行所占页面高度的比例.
const MONTAGE_ROW_HEIGHT: f64 = 0.15;

/// 叠加层的不透明度.
const OVERLAY_ALPHA: f64 = 0.3;

/// 直方图分箱数.
const HIST_BINS: usize = 99;

/// 头动曲线的纵轴范围 (mm).
const MOTION_Y_RANGE: (f64, f64) = (0.0, 3.0);

/// 一行拼图区域的宽高比.
fn row_aspect() -> f64 {
    PAGE_INCHES.0 / (MONTAGE_ROW_HEIGHT * PAGE_INCHES.1)
}

/// QA 报告需要的输入文件.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QaInputs {
    /// 被试的 DTI 目录.
    pub dir: PathBuf,

    /// 第一个 (b0) 体积.
    pub b0: PathBuf,

    /// 脑掩膜.
    pub brain_mask: PathBuf,

    /// 白质掩膜.
    pub wm_mask: PathBuf,

    /// FA 图像.
    pub fa: PathBuf,

    /// MO 图像.
    pub mo: PathBuf,

    /// SSE 图像.
    pub sse: PathBuf,
}

fn find_one(dir: &Path, pattern: &str) -> DtiResult<PathBuf> {
    let full = dir.join(pattern).to_string_lossy().into_owned();
    let mut paths: Vec<PathBuf> = glob::glob(&full)
        .map_err(|e| DtiError::InvalidArgument(format!("路径模式 `{full}` 无效: {e}")))?
        .filter_map(Result::ok)
        .collect();
    paths.sort();
    paths
        .into_iter()
        .next()
        .ok_or_else(|| DtiError::Missing(full))
}

fn existing(dir: &Path, name: &str) -> DtiResult<PathBuf> {
    let p = dir.join(name);
    if p.is_file() {
        Ok(p)
    } else {
        Err(DtiError::Missing(p.display().to_string()))
    }
}

impl QaInputs {
    /// 在 `dir` 中定位所有输入. FA/MO/SSE 按通配符匹配, 取第一个.
    pub fn locate<P: AsRef<Path>>(dir: P) -> DtiResult<Self> {
        let dir = dir.as_ref();
        Ok(Self {
            dir: dir.to_owned(),
            b0: existing(dir, files::DTI_EC_VOL0)?,
            brain_mask: existing(dir, files::BRAIN_MASK)?,
            wm_mask: existing(dir, files::WM_MASK)?,
            fa: find_one(dir, files::FA_GLOB)?,
            mo: find_one(dir, files::MO_GLOB)?,
            sse: find_one(dir, files::SSE_GLOB)?,
        })
    }
}

fn check_same_shape(a: &DtiVolume, b: &DtiVolume) -> DtiResult<()> {
    let (sa, sb) = (a.data().dim(), b.data().dim());
    if sa != sb {
        return Err(DtiError::Shape {
            expected: vec![sa.0, sa.1, sa.2],
            found: vec![sb.0, sb.1, sb.2],
        });
    }
    Ok(())
}

/// 在 `cell` 中居中绘制一张切片 (保持宽高比, 最近邻采样).
/// 背景按灰度 `[0, 1]` 显示, 叠加层只在大于 0 处以 `cmap` 半透明叠加.
fn draw_slice(c: &mut Canvas, cell: Rect, bg: &Array2<f32>, overlay: &Array2<f32>, cmap: Colormap) {
    let (rows, cols) = bg.dim();
    if rows == 0 || cols == 0 || cell.w == 0 || cell.h == 0 {
        return;
    }
    let scale = (cell.w as f64 / cols as f64).min(cell.h as f64 / rows as f64);
    let (dw, dh) = ((cols as f64 * scale) as u32, (rows as f64 * scale) as u32);
    let x0 = cell.x + (cell.w - dw) / 2;
    let y0 = cell.y + (cell.h - dh) / 2;
    for py in 0..dh {
        let r = ((py as f64 / scale) as usize).min(rows - 1);
        for px in 0..dw {
            let col = ((px as f64 / scale) as usize).min(cols - 1);
            let (x, y) = ((x0 + px) as i64, (y0 + py) as i64);
            c.put(x, y, Colormap::Gray.eval_range(bg[(r, col)] as f64, 0.0, 1.0));
            let ov = overlay[(r, col)];
            if ov > 0.0 {
                c.blend(x, y, cmap.eval_range(ov as f64, 0.0, 1.0), OVERLAY_ALPHA);
            }
        }
    }
}

/// 三行 (矢状, 冠状, 轴状) 拼图. 两个体积均应已按最大值归一化.
fn draw_montage(
    c: &mut Canvas,
    area: Rect,
    bg: ArrayView3<f32>,
    overlay: ArrayView3<f32>,
    cmap: Colormap,
) -> DtiResult<()> {
    let shape = bg.dim();
    for (o, row) in Orientation::ALL.into_iter().zip(area.split_rows(3, 0)) {
        let slices = montage_slices(o, shape, row_aspect());
        let cells = row.split_columns(slices.len() as u32, 0);
        for (k, cell) in slices.into_iter().zip(cells) {
            draw_slice(c, cell, &plane(bg, o, k)?, &plane(overlay, o, k)?, cmap);
        }
    }
    Ok(())
}

fn volume_montage(
    c: &mut Canvas,
    area: Rect,
    bg: &Path,
    overlay: &Path,
    cmap: Colormap,
) -> DtiResult<()> {
    let bg = DtiVolume::open(bg)?.normalized();
    let overlay = DtiVolume::open(overlay)?.normalized();
    check_same_shape(&bg, &overlay)?;
    draw_montage(c, area, bg.data(), overlay.data(), cmap)
}

fn movement_panels(c: &mut Canvas, area: Rect, dir: &Path) -> DtiResult<()> {
    let gap = area.w / 40;
    for (g, cell) in VolumeGroup::ALL.into_iter().zip(area.split_columns(3, gap)) {
        let disp = DispSeries::read(dir.join(g.disp_file()))?;
        let series = [
            Series {
                values: disp.get(Measure::Abs),
                color: rgb::BLUE,
            },
            Series {
                values: disp.get(Measure::Rel),
                color: rgb::SECOND,
            },
        ];
        draw_series_into(c, cell, &series, Some(MOTION_Y_RANGE));
    }
    Ok(())
}

fn tensor_histograms(c: &mut Canvas, area: Rect, inputs: &QaInputs) -> DtiResult<()> {
    let wm = DtiVolume::open(&inputs.wm_mask)?;
    let fa = DtiVolume::open(&inputs.fa)?.masked(&wm)?;
    let mo = DtiVolume::open(&inputs.mo)?;
    let sse = DtiVolume::open(&inputs.sse)?;

    let panels = [
        (fa.values_where(&fa)?, (0.0, 1.0), rgb::GREEN, 2500.0),
        (mo.values_where(&fa)?, (-1.0, 1.0), rgb::ORANGE, 3500.0),
        (sse.values_where(&fa)?, (0.0, 5.0), rgb::RED, 100.0),
    ];
    let gap = area.w / 40;
    for ((values, (lo, hi), color, cap), cell) in panels.into_iter().zip(area.split_columns(3, gap)) {
        let h = Histogram::new(values.into_iter().map(f64::from), lo, hi, HIST_BINS)?;
        h.draw_into(c, cell, color, false, Some(cap));
    }
    Ok(())
}

fn header(c: &mut Canvas, area: Rect) {
    c.stroke_rect(area.fraction(0.84, 0.94, 0.10, 0.45), rgb::BLACK);
    c.stroke_rect(area.fraction(0.84, 0.94, 0.50, 0.85), rgb::BLACK);
}

/// 绘制 QA 报告页.
pub fn render(inputs: &QaInputs, dpi: f64) -> DtiResult<Canvas> {
    if !(dpi > 0.0) {
        return Err(DtiError::InvalidArgument(format!("分辨率 {dpi} 无效")));
    }
    let (w, h) = (
        (PAGE_INCHES.0 * dpi).round() as u32,
        (PAGE_INCHES.1 * dpi).round() as u32,
    );
    let mut c = Canvas::new(w, h, rgb::WHITE);
    let page = c.bounds();

    header(&mut c, page.fraction(0.05, 0.95, 0.02, 0.10));

    let brain_a = page.fraction(0.05, 0.95, 0.10, 0.35);
    c.fill_rect(brain_a, rgb::BLACK);
    volume_montage(&mut c, brain_a, &inputs.b0, &inputs.brain_mask, Colormap::CoolR)?;

    movement_panels(&mut c, page.fraction(0.10, 0.95, 0.37, 0.50), &inputs.dir)?;

    let brain_b = page.fraction(0.05, 0.95, 0.55, 0.80);
    c.fill_rect(brain_b, rgb::BLACK);
    volume_montage(&mut c, brain_b, &inputs.fa, &inputs.wm_mask, Colormap::Cool)?;

    tensor_histograms(&mut c, page.fraction(0.10, 0.95, 0.82, 0.95), inputs)?;
    Ok(c)
}

/// 生成 `dir/QA_OUTPUT/QAReport.jpg`, 返回其路径.
pub fn qa_report<P: AsRef<Path>>(dir: P, dpi: f64) -> DtiResult<PathBuf> {
    let inputs = QaInputs::locate(dir)?;
    let page = render(&inputs, dpi)?;
    let out = inputs.dir.join(files::QA_DIR).join(files::QA_REPORT);
    page.save(&out)?;
    log::info!("saved QA report to {}", out.display());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_draw_slice_blends_overlay() {
        let mut c = Canvas::new(4, 4, rgb::BLACK);
        let bg = Array2::<f32>::ones((2, 2));
        let mut ov = Array2::<f32>::zeros((2, 2));
        ov[(0, 0)] = 1.0;
        let cell = c.bounds();
        draw_slice(&mut c, cell, &bg, &ov, Colormap::Cool);
        let [r, g, b] = c.get(0, 0).unwrap();
        assert_eq!((r, b), (255, 255));
        assert!((178..=179).contains(&g));
        assert_eq!(c.get(3, 3), Some(rgb::WHITE));
    }

    #[test]
    fn test_draw_slice_keeps_aspect() {
        let mut c = Canvas::new(8, 4, rgb::BLACK);
        let bg = Array2::<f32>::ones((2, 2));
        let ov = Array2::<f32>::zeros((2, 2));
        let cell = c.bounds();
        draw_slice(&mut c, cell, &bg, &ov, Colormap::Cool);
        assert_eq!(c.get(0, 0), Some(rgb::BLACK));
        assert_eq!(c.get(2, 0), Some(rgb::WHITE));
        assert_eq!(c.get(5, 3), Some(rgb::WHITE));
        assert_eq!(c.get(7, 3), Some(rgb::BLACK));
    }

    fn write_inputs(dir: &Path) {
        let shape = (12, 14, 10);
        let blob = Array3::from_shape_fn(shape, |(x, y, z)| {
            let d = (x as f32 - 6.0).powi(2) + (y as f32 - 7.0).powi(2) + (z as f32 - 5.0).powi(2);
            if d < 16.0 {
                1.0 - d / 32.0
            } else {
                0.0
            }
        });
        let save = |name: &str, data: Array3<f32>| {
            DtiVolume::from_array(data, [2.0, 2.0, 2.0]).save(dir.join(name)).unwrap();
        };
        save(files::DTI_EC_VOL0, blob.mapv(|v| v * 800.0));
        save(files::BRAIN_MASK, blob.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }));
        save(files::WM_MASK, blob.mapv(|v| if v > 0.8 { 1.0 } else { 0.0 }));
        save("sub_FA.nii.gz", blob.mapv(|v| v * 0.7));
        save("sub_MO.nii.gz", blob.mapv(|v| v - 0.5));
        save("sub_sse.nii.gz", blob.mapv(|v| v * 2.0));
        for g in VolumeGroup::ALL {
            DispSeries::from_values(&[0.1, 0.5, 1.2], &[0.0, 0.4, 0.7])
                .write(dir.join(g.disp_file()))
                .unwrap();
        }
    }

    #[test]
    fn test_qa_report() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(QaInputs::locate(dir.path()), Err(DtiError::Missing(_))));

        write_inputs(dir.path());
        let inputs = QaInputs::locate(dir.path()).unwrap();
        assert!(inputs.fa.ends_with("sub_FA.nii.gz"));

        let page = render(&inputs, 40.0).unwrap();
        assert_eq!((page.width(), page.height()), (332, 464));
        // 表头为白色, 拼图背景为黑色.
        assert_eq!(page.get(20, 20), Some(rgb::WHITE));
        assert_eq!(page.get(20, 50), Some(rgb::BLACK));

        let out = qa_report(dir.path(), 30.0).unwrap();
        assert!(out.ends_with("QA_OUTPUT/QAReport.jpg"));
        assert!(out.is_file());
    }
}
