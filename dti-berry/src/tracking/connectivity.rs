//! 由纤维端点统计分区之间的连接矩阵.

use super::{Point, Streamlines};
use crate::consts::files;
use crate::matrix::{log_heatmap, save_matrix, ALL_MATRICES_VMAX};
use crate::motion::Affine;
use crate::plot::{cell_for, Canvas, ColorRange};
use crate::{consts::rgb, DtiError, DtiResult, DtiVolume, NiftiHeaderAttr};
use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3, Zip};
use std::path::{Path, PathBuf};

/// 允许的最大分区标签.
pub const MAX_LABEL: f32 = u16::MAX as f32;

/// 将分区图转换为整数标签 (小数部分截断).
///
/// 负数, NaN, 无穷大或超过 [`MAX_LABEL`] 的标签返回 `Err`.
pub fn label_volume(parcellation: &DtiVolume) -> DtiResult<Array3<usize>> {
    let data = parcellation.data();
    if let Some(v) = data.iter().find(|v| !v.is_finite() || **v < 0.0 || **v > MAX_LABEL) {
        return Err(DtiError::InvalidArgument(format!(
            "分区标签必须位于 [0, {MAX_LABEL}] 之间: {v}"
        )));
    }
    Ok(data.mapv(|v| v as usize))
}

/// 只保留同时位于脑内和白质内的分区标签: `parcellation × bin(brain) × bin(wm)`.
pub fn prepare_parcellation(
    parcellation: &DtiVolume,
    brain: &DtiVolume,
    wm: &DtiVolume,
) -> DtiResult<DtiVolume> {
    let labels = parcellation.data().mapv(f32::trunc);
    parcellation
        .with_data(labels)?
        .masked(&brain.binarize())?
        .masked(&wm.binarize())
}

/// 端点所在体素: 先用逆变换转到体素坐标, 再四舍五入 (`floor(p + 0.5)`).
fn voxel_of(inv: &Affine, p: Point, shape: (usize, usize, usize)) -> Option<(usize, usize, usize)> {
    let v = inv.apply(p).map(|c| (c + 0.5).floor());
    let (a, b, c) = shape;
    let inside = |x: f64, n: usize| x >= 0.0 && x < n as f64;
    (inside(v[0], a) && inside(v[1], b) && inside(v[2], c))
        .then(|| (v[0] as usize, v[1] as usize, v[2] as usize))
}

/// 统计连接矩阵: 第 `(i, j)` 个元素为起点落在分区 `i`, 终点落在分区 `j` 的纤维条数.
///
/// 矩阵大小为 `(最大标签 + 1)²`, 第 0 行/列对应未分区的体素.
/// `symmetric` 为真时, 先将每条纤维的两个标签排序, 再取 `max(M, Mᵀ)`.
/// 端点落在体积外时返回 `Err`.
pub fn connectivity_matrix(
    streamlines: &Streamlines,
    labels: ArrayView3<usize>,
    affine: &Affine,
    symmetric: bool,
) -> DtiResult<Array2<f64>> {
    let inv = affine
        .inverse()
        .ok_or_else(|| DtiError::InvalidArgument("仿射矩阵不可逆".to_string()))?;
    let n = labels
        .iter()
        .copied()
        .max()
        .ok_or_else(|| DtiError::Empty("分区图".to_string()))?
        .checked_add(1)
        .ok_or_else(|| DtiError::InvalidArgument("分区标签过大".to_string()))?;
    let shape = labels.dim();

    let mut m = Array2::<f64>::zeros((n, n));
    for (i, (start, end)) in streamlines.endpoints().enumerate() {
        let lookup = |p: Point| {
            voxel_of(&inv, p, shape).map(|idx| labels[idx]).ok_or_else(|| {
                DtiError::InvalidArgument(format!("第 {i} 条纤维的端点 {p:?} 落在体积之外"))
            })
        };
        let (a, b) = (lookup(start)?, lookup(end)?);
        let (a, b) = if symmetric && a > b { (b, a) } else { (a, b) };
        m[(a, b)] += 1.0;
    }

    if symmetric {
        let t = m.t().to_owned();
        Zip::from(&mut m).and(&t).for_each(|v, &w| *v = v.max(w));
    }
    Ok(m)
}

/// 有向差异矩阵 `max(M − Mᵀ, 0)`.
pub fn directed_difference(m: ArrayView2<f64>) -> Array2<f64> {
    let mut d = &m - &m.t();
    d.mapv_inplace(|v| v.max(0.0));
    d
}

/// 去掉第 0 行/列 (未分区体素).
fn drop_background(m: Array2<f64>) -> Array2<f64> {
    if m.nrows() == 0 || m.ncols() == 0 {
        return m;
    }
    m.slice(s![1.., 1..]).to_owned()
}

/// 对称与有向连接矩阵, 已去掉标签 0.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectivityMatrices {
    /// 对称矩阵.
    pub msym: Array2<f64>,

    /// 有向矩阵.
    pub mdir: Array2<f64>,
}

impl ConnectivityMatrices {
    /// 由纤维与分区标签计算.
    pub fn compute(streamlines: &Streamlines, labels: ArrayView3<usize>, affine: &Affine) -> DtiResult<Self> {
        log::info!("creating connectivity matrices from {} streamlines", streamlines.len());
        let msym = connectivity_matrix(streamlines, labels, affine, true)?;
        let mdir = connectivity_matrix(streamlines, labels, affine, false)?;
        Ok(Self {
            msym: drop_background(msym),
            mdir: drop_background(mdir),
        })
    }

    /// 若 `dir` 下已有 `Msym.txt` 和 `Mdir.txt`, 则读取它们.
    pub fn load<P: AsRef<Path>>(dir: P) -> DtiResult<Option<Self>> {
        let dir = dir.as_ref();
        let (sym, dir_) = (dir.join("Msym.txt"), dir.join("Mdir.txt"));
        if !(sym.exists() && dir_.exists()) {
            return Ok(None);
        }
        Ok(Some(Self {
            msym: crate::text::load_txt(sym)?,
            mdir: crate::text::load_txt(dir_)?,
        }))
    }

    /// 有向差异矩阵.
    #[inline]
    pub fn mdiff(&self) -> Array2<f64> {
        directed_difference(self.mdir.view())
    }

    /// 将三个矩阵保存为 `%.5f` 制表符分隔的文本和 log1p 热图, 并生成三者并排的
    /// `AllMatrices.png` (统一色阶 `[0, log1p(1000)]`). 已存在的文件不会被覆盖.
    ///
    /// 返回本次新写出的文件.
    pub fn write<P: AsRef<Path>>(&self, dir: P) -> DtiResult<Vec<PathBuf>> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| DtiError::io(dir, e))?;
        let mdiff = self.mdiff();
        let named = [("Msym", &self.msym), ("Mdir", &self.mdir), ("Mdiff", &mdiff)];

        let mut written = Vec::new();
        for (name, m) in named {
            let txt = dir.join(format!("{name}.txt"));
            if txt.exists() {
                log::info!("{} already exists", txt.display());
            } else {
                save_matrix(&txt, m.view())?;
                written.push(txt);
            }
            let png = dir.join(format!("{name}.png"));
            if !png.exists() {
                log_heatmap(m.view(), ColorRange::Auto).save(&png)?;
                written.push(png);
            }
        }

        let all = dir.join("AllMatrices.png");
        if !all.exists() {
            let range = ColorRange::Fixed(0.0, ALL_MATRICES_VMAX);
            let panels: Vec<Canvas> = named.iter().map(|(_, m)| log_heatmap(m.view(), range)).collect();
            let gap = 8;
            let w = panels.iter().map(Canvas::width).sum::<u32>() + gap * (panels.len() as u32 + 1);
            let h = panels.iter().map(Canvas::height).max().unwrap_or(0) + 2 * gap;
            let mut c = Canvas::new(w, h, rgb::WHITE);
            let mut x = gap;
            for p in &panels {
                c.paste(p, x, gap);
                x += p.width() + gap;
            }
            c.save(&all)?;
            written.push(all);
        }
        Ok(written)
    }
}

/// 连接矩阵流程的输入.
#[derive(Clone, Debug)]
pub struct ConnectivityJob {
    /// 预处理目录, 包含 `dti_ec_brain.nii.gz`. 输出写入其 `CONNECTIVITY` 子目录.
    pub dti_dir: PathBuf,

    /// 分区图. 不存在时在 `dti_dir` 下查找同名文件.
    pub parcellation: PathBuf,

    /// 白质掩膜.
    pub wm_mask: PathBuf,

    /// 纤维文件. 只有在输出目录中尚无矩阵时才需要.
    pub streamlines: Option<PathBuf>,

    /// 纤维坐标是否为世界坐标 (使用分区图的仿射变换); 否则视为体素坐标.
    pub world_coords: bool,
}

impl ConnectivityJob {
    /// 执行流程, 返回新写出的文件.
    pub fn run(&self) -> DtiResult<Vec<PathBuf>> {
        let parcellation = if self.parcellation.exists() {
            self.parcellation.clone()
        } else {
            self.dti_dir.join(&self.parcellation)
        };
        for p in [&parcellation, &self.wm_mask] {
            if !p.exists() {
                return Err(DtiError::Missing(p.display().to_string()));
            }
        }
        let out_dir = self.dti_dir.join(files::CONNECTIVITY_DIR);
        log::info!("parcellation file: {}", parcellation.display());

        let matrices = match ConnectivityMatrices::load(&out_dir)? {
            Some(m) => {
                log::info!("connectivity matrices already computed");
                m
            }
            None => {
                let streamlines_file = self
                    .streamlines
                    .as_ref()
                    .ok_or_else(|| DtiError::Missing("纤维文件 (streamlines)".to_string()))?;
                let parc = DtiVolume::open(&parcellation)?;
                let brain = DtiVolume::open(self.dti_dir.join(files::BRAIN))?;
                let wm = DtiVolume::open(&self.wm_mask)?;
                let prepared = prepare_parcellation(&parc, &brain, &wm)?;
                let labels = label_volume(&prepared)?;
                let affine = if self.world_coords {
                    parc.affine()
                } else {
                    Affine::identity()
                };
                let streamlines = Streamlines::read(streamlines_file)?;
                ConnectivityMatrices::compute(&streamlines, labels.view(), &affine)?
            }
        };
        log::info!("making pictures");
        matrices.write(&out_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    /// 沿 x 轴排列的 3 个分区: x = 0 为背景, x = 1 为 1, x = 2 为 2.
    fn labels() -> Array3<usize> {
        Array3::from_shape_fn((3, 2, 2), |(x, _, _)| x)
    }

    #[test]
    fn test_connectivity_symmetric_and_directed() {
        let s = Streamlines::new(vec![
            vec![[1.0, 0.0, 0.0], [2.0, 0.0, 0.0]],
            vec![[2.0, 1.0, 1.0], [1.6, 0.0, 0.0], [1.0, 1.0, 0.0]],
            vec![[1.2, 0.0, 0.0], [2.4, 0.0, 0.0]],
        ]);
        let l = labels();
        let dir = connectivity_matrix(&s, l.view(), &Affine::identity(), false).unwrap();
        assert_eq!(dir[(1, 2)], 2.0);
        assert_eq!(dir[(2, 1)], 1.0);

        let sym = connectivity_matrix(&s, l.view(), &Affine::identity(), true).unwrap();
        assert_eq!(sym[(1, 2)], 3.0);
        assert_eq!(sym[(2, 1)], 3.0);
        assert_eq!(sym.sum(), 6.0);
    }

    #[test]
    fn test_rounding_and_outside() {
        let l = labels();
        // 1.49 四舍五入到体素 1, 1.5 到体素 2.
        let s = Streamlines::new(vec![vec![[1.49, 0.0, 0.0], [1.5, 0.0, 0.0]]]);
        let m = connectivity_matrix(&s, l.view(), &Affine::identity(), false).unwrap();
        assert_eq!(m[(1, 2)], 1.0);

        let bad = Streamlines::new(vec![vec![[-0.6, 0.0, 0.0]]]);
        assert!(connectivity_matrix(&bad, l.view(), &Affine::identity(), false).is_err());
        let bad = Streamlines::new(vec![vec![[2.5, 0.0, 0.0]]]);
        assert!(connectivity_matrix(&bad, l.view(), &Affine::identity(), false).is_err());
    }

    #[test]
    fn test_directed_difference() {
        let m = array![[0.0, 3.0], [1.0, 0.0]];
        assert_eq!(directed_difference(m.view()), array![[0.0, 2.0], [0.0, 0.0]]);
    }

    #[test]
    fn test_prepare_parcellation() {
        let parc = DtiVolume::from_array(Array3::from_elem((2, 1, 1), 3.7), [1.0; 3]);
        let brain = DtiVolume::from_array(array![[[5.0]], [[5.0]]], [1.0; 3]);
        let wm = DtiVolume::from_array(array![[[0.2]], [[0.0]]], [1.0; 3]);
        let p = prepare_parcellation(&parc, &brain, &wm).unwrap();
        let l = label_volume(&p).unwrap();
        assert_eq!(l[(0, 0, 0)], 3);
        assert_eq!(l[(1, 0, 0)], 0);
    }

    #[test]
    fn test_label_volume_rejects_out_of_range() {
        let vol = |v: f32| DtiVolume::from_array(Array3::from_elem((1, 1, 2), v), [1.0; 3]);
        assert!(label_volume(&vol(f32::INFINITY)).is_err());
        assert!(label_volume(&vol(f32::NAN)).is_err());
        assert!(label_volume(&vol(-1.0)).is_err());
        assert!(label_volume(&vol(1e9)).is_err());
        assert_eq!(label_volume(&vol(MAX_LABEL)).unwrap()[(0, 0, 1)], u16::MAX as usize);
    }

    #[test]
    fn test_connectivity_label_overflow() {
        let l = Array3::from_elem((1, 1, 1), usize::MAX);
        let s = Streamlines::new(vec![]);
        assert!(connectivity_matrix(&s, l.view(), &Affine::identity(), false).is_err());
    }

    #[test]
    fn test_write_skips_existing() {
        let dir = tempfile::tempdir().unwrap();
        let m = ConnectivityMatrices {
            msym: array![[0.0, 2.0], [2.0, 0.0]],
            mdir: array![[0.0, 2.0], [0.0, 0.0]],
        };
        let first = m.write(dir.path()).unwrap();
        assert_eq!(first.len(), 7);
        let second = m.write(dir.path()).unwrap();
        assert!(second.is_empty());

        let back = ConnectivityMatrices::load(dir.path()).unwrap().unwrap();
        assert_eq!(back, m);
        let diff = crate::text::load_txt(dir.path().join("Mdiff.txt")).unwrap();
        assert_eq!(diff, array![[0.0, 2.0], [0.0, 0.0]]);
    }
}
