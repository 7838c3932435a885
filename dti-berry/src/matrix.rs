//! 连接矩阵后处理: 阈值化, 求平均, 权重直方图.

use crate::plot::{cell_for, heatmap, Canvas, ColorRange, Colormap, Histogram, FIGURE_SIZE};
use crate::text::{load_txt, save_txt};
use crate::{consts::rgb, DtiError, DtiResult};
use ndarray::{Array2, ArrayView2, Zip};
use ordered_float::OrderedFloat;
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::{Path, PathBuf};

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
    }
}

/// `AllMatrices.png` 的统一色阶上限, 即 `log1p(1000)`.
pub const ALL_MATRICES_VMAX: f64 = 6.908_754_779_315_221;

/// 直方图默认范围.
pub const WEIGHT_RANGE: (f64, f64) = (0.0, 300.0);

/// 直方图默认分箱数.
pub const WEIGHT_BINS: usize = 10;

/// 热图的目标边长 (像素).
const HEATMAP_SIDE: u32 = 480;

/// 以 `%.5f`, 制表符分隔保存矩阵.
#[inline]
pub fn save_matrix<P: AsRef<Path>>(path: P, m: ArrayView2<f64>) -> DtiResult<()> {
    save_txt(path, m, 5, "\t")
}

/// `log1p(m)` 的 jet 热图.
pub fn log_heatmap(m: ArrayView2<f64>, range: ColorRange) -> Canvas {
    let logged = m.mapv(f64::ln_1p);
    let n = m.nrows().max(m.ncols());
    heatmap(logged.view(), Colormap::Jet, range, cell_for(n, HEATMAP_SIDE))
}

/// 方阵形式的连接矩阵.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnMatrix {
    m: Array2<f64>,
}

impl ConnMatrix {
    /// 包装方阵. 非方阵返回 `Err`.
    pub fn new(m: Array2<f64>) -> DtiResult<Self> {
        let (r, c) = m.dim();
        if r != c {
            return Err(DtiError::Shape {
                expected: vec![r, r],
                found: vec![r, c],
            });
        }
        Ok(Self { m })
    }

    /// 读取文本矩阵.
    pub fn load<P: AsRef<Path>>(path: P) -> DtiResult<Self> {
        Self::new(load_txt(path)?)
    }

    /// 节点 (分区) 个数.
    #[inline]
    pub fn n(&self) -> usize {
        self.m.nrows()
    }

    /// 矩阵视图.
    #[inline]
    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.m.view()
    }

    /// 取出矩阵.
    #[inline]
    pub fn into_inner(self) -> Array2<f64> {
        self.m
    }

    /// 严格上三角部分 (不含对角线), 其余位置为 0.
    pub fn upper_triangle(&self) -> Array2<f64> {
        let mut t = self.m.clone();
        for ((r, c), v) in t.indexed_iter_mut() {
            if c <= r {
                *v = 0.0;
            }
        }
        t
    }

    /// 由上三角矩阵 `triu` 重建对称矩阵 `triu + triuᵀ`, 对角线取自原矩阵.
    pub fn symmetrize_from_upper(&self, triu: ArrayView2<f64>) -> DtiResult<Array2<f64>> {
        if triu.dim() != self.m.dim() {
            return Err(DtiError::Shape {
                expected: self.m.shape().to_vec(),
                found: triu.shape().to_vec(),
            });
        }
        let mut ans = &triu + &triu.t();
        for i in 0..self.n() {
            ans[(i, i)] = self.m[(i, i)];
        }
        Ok(ans)
    }

    /// 连接密度 (cost): 非零非对角元素个数 / `n(n − 1)`. 少于 2 个节点时为 0.
    pub fn density(&self) -> f64 {
        let n = self.n();
        if n < 2 {
            return 0.0;
        }
        let nonzero = self
            .m
            .indexed_iter()
            .filter(|((r, c), v)| r != c && **v != 0.0)
            .count();
        nonzero as f64 / (n * (n - 1)) as f64
    }

    /// 上三角中的正权重.
    pub fn upper_weights(&self) -> Vec<f64> {
        self.m
            .indexed_iter()
            .filter(|((r, c), v)| c > r && **v > 0.0)
            .map(|(_, v)| *v)
            .collect()
    }
}

/// 按 cost 计算需要保留的边数 `round(cost · n(n − 1) / 2)`.
pub fn n_keep_for_cost(n: usize, cost: f64) -> DtiResult<usize> {
    if !(0.0..=1.0).contains(&cost) {
        return Err(DtiError::InvalidArgument(format!("cost 必须位于 [0, 1], 实际 {cost}")));
    }
    Ok((cost * (n * n.saturating_sub(1)) as f64 * 0.5).round() as usize)
}

/// 保留上三角矩阵 `triu` 中最大的 `n_keep` 个元素, 其余置 0.
///
/// 与阈值相等的元素若多于所需个数, 则随机 (由 `rng` 决定) 保留恰好所需的个数.
/// `n_keep = 0` 时全部置 0; `n_keep` 不小于元素总数时原样返回.
pub fn threshold_upper<R: Rng + ?Sized>(triu: ArrayView2<f64>, n_keep: usize, rng: &mut R) -> Array2<f64> {
    let total = triu.len();
    if n_keep >= total {
        return triu.to_owned();
    }
    if n_keep == 0 {
        return Array2::zeros(triu.dim());
    }
    let mut sorted: Vec<f64> = triu.iter().copied().collect();
    sorted.sort_unstable_by_key(|v| OrderedFloat(*v));
    let thresh = sorted[total - n_keep];
    let n_thresh_keep = sorted[total - n_keep..].iter().filter(|v| **v == thresh).count();
    log::debug!("n_keep {n_keep}, thresh {thresh}, n_thresh_keep {n_thresh_keep}");

    let mut ans = triu.to_owned();
    let mut ties = Vec::new();
    for (idx, v) in ans.indexed_iter_mut() {
        if *v < thresh {
            *v = 0.0;
        } else if *v == thresh {
            ties.push(idx);
        }
    }
    ties.shuffle(rng);
    for idx in &ties[n_thresh_keep..] {
        ans[*idx] = 0.0;
    }
    ans
}

/// 阈值的两种给法.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Threshold {
    /// 目标连接密度.
    Cost(f64),

    /// 直接给出保留的边数.
    NKeep(usize),
}

/// 在 `path` 的文件名 (去掉扩展名) 后追加 `suffix`, 得到同目录下的新路径.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    path.with_file_name(format!("{stem}{suffix}"))
}

/// 阈值化文本矩阵, 写出 `<stem>_thrNkeep{n_keep:05}.txt` 与同名 `.png`.
///
/// 返回 `(文本路径, 图像路径)`.
pub fn threshold_file<P: AsRef<Path>, R: Rng + ?Sized>(
    path: P,
    threshold: Threshold,
    rng: &mut R,
) -> DtiResult<(PathBuf, PathBuf)> {
    let path = path.as_ref();
    let m = ConnMatrix::load(path)?;
    let n_keep = match threshold {
        Threshold::Cost(cost) => n_keep_for_cost(m.n(), cost)?,
        Threshold::NKeep(k) => k,
    };
    log::info!("thresholding {} ({} nodes), n_keep {n_keep}", path.display(), m.n());

    let triu = m.upper_triangle();
    let thr = threshold_upper(triu.view(), n_keep, rng);
    let thr = m.symmetrize_from_upper(thr.view())?;

    let txt = sibling(path, &format!("_thrNkeep{n_keep:05}.txt"));
    save_matrix(&txt, thr.view())?;
    let png = txt.with_extension("png");
    log_heatmap(thr.view(), ColorRange::Auto).save(&png)?;
    Ok((txt, png))
}

#[cfg(feature = "rayon")]
fn load_all(paths: &[PathBuf]) -> DtiResult<Vec<Array2<f64>>> {
    paths.par_iter().map(load_txt).collect()
}

#[cfg(not(feature = "rayon"))]
fn load_all(paths: &[PathBuf]) -> DtiResult<Vec<Array2<f64>>> {
    paths.iter().map(load_txt).collect()
}

/// 逐元素平均. 列表为空或形状不一致时返回 `Err`.
pub fn average(paths: &[PathBuf]) -> DtiResult<Array2<f64>> {
    let matrices = load_all(paths)?;
    let (first, rest) = matrices
        .split_first()
        .ok_or_else(|| DtiError::Empty("矩阵列表".to_string()))?;
    let mut sum = first.clone();
    for (m, p) in rest.iter().zip(&paths[1..]) {
        if m.dim() != sum.dim() {
            log::warn!("{} has a different shape", p.display());
            return Err(DtiError::Shape {
                expected: sum.shape().to_vec(),
                found: m.shape().to_vec(),
            });
        }
        Zip::from(&mut sum).and(m).for_each(|s, &v| *s += v);
    }
    log::info!("averaged {} matrices", matrices.len());
    Ok(sum / matrices.len() as f64)
}

/// 读取路径列表文件, 求平均后写出 `out` (文本) 与同名 `.png`.
pub fn average_files<P: AsRef<Path>, Q: AsRef<Path>>(list_file: P, out: Q) -> DtiResult<(PathBuf, PathBuf)> {
    let paths: Vec<PathBuf> = crate::text::read_lines(list_file)?
        .into_iter()
        .map(PathBuf::from)
        .collect();
    let avg = average(&paths)?;
    let txt = out.as_ref().to_owned();
    crate::text::ensure_parent(&txt)?;
    save_matrix(&txt, avg.view())?;
    let png = txt.with_extension("png");
    log_heatmap(avg.view(), ColorRange::Auto).save(&png)?;
    Ok((txt, png))
}

/// 上三角正权重的直方图 (超出 `[min, max]` 的值被忽略).
pub fn weights_histogram(m: &ConnMatrix, range: (f64, f64), bins: usize) -> DtiResult<Histogram> {
    Histogram::new(m.upper_weights(), range.0, range.1, bins)
}

/// 画对数计数的权重直方图. `cost` 不为 `None` 时在右上角画出 cost 标注框.
pub fn weights_figure(hist: &Histogram, color: [u8; 3], cost: Option<f64>) -> Canvas {
    let mut c = hist.figure(FIGURE_SIZE, color, true, None);
    if cost.is_some() {
        let area = c.bounds().shrink(FIGURE_SIZE.0.min(FIGURE_SIZE.1) / 12);
        let bx = area.fraction(0.62, 0.95, 0.05, 0.15);
        c.fill_rect(bx, [245, 222, 179]);
        c.stroke_rect(bx, rgb::BLACK);
    }
    c
}

/// 为 `path` 处的矩阵写出 `<stem>_weights.png`, 以及记录 cost 的 `<stem>_weights.txt`.
pub fn weights_file<P: AsRef<Path>>(
    path: P,
    range: (f64, f64),
    bins: usize,
    color: [u8; 3],
    cost_box: bool,
) -> DtiResult<PathBuf> {
    let path = path.as_ref();
    let m = ConnMatrix::load(path)?;
    let cost = m.density();
    let hist = weights_histogram(&m, range, bins)?;
    let png = sibling(path, "_weights.png");
    weights_figure(&hist, color, cost_box.then_some(cost)).save(&png)?;
    if cost_box {
        let note = png.with_extension("txt");
        std::fs::write(&note, format!("cost = {:.2}%\n", cost * 100.0)).map_err(|e| DtiError::io(&note, e))?;
    }
    log::info!("cost of {} is {:.2}%", path.display(), cost * 100.0);
    Ok(png)
}

/// 为 `Msym.txt` 写出纤维条数直方图 `Msym_Ntracts.png`.
pub fn ntracts_file<P: AsRef<Path>>(msym: P) -> DtiResult<PathBuf> {
    let msym = msym.as_ref();
    let m = ConnMatrix::load(msym)?;
    let hist = weights_histogram(&m, WEIGHT_RANGE, WEIGHT_BINS)?;
    let png = sibling(msym, "_Ntracts.png");
    hist.figure(FIGURE_SIZE, rgb::HIST_BLUE, true, None).save(&png)?;
    Ok(png)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sample() -> ConnMatrix {
        ConnMatrix::new(array![
            [9.0, 5.0, 3.0, 3.0],
            [5.0, 9.0, 3.0, 0.0],
            [3.0, 3.0, 9.0, 1.0],
            [3.0, 0.0, 1.0, 9.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_square_required() {
        assert!(matches!(
            ConnMatrix::new(Array2::zeros((2, 3))),
            Err(DtiError::Shape { .. })
        ));
    }

    #[test]
    fn test_upper_and_density() {
        let m = sample();
        let t = m.upper_triangle();
        assert_eq!(t[(0, 1)], 5.0);
        assert_eq!(t[(1, 0)], 0.0);
        assert_eq!(t[(2, 2)], 0.0);
        // 10 个非零非对角元素, 12 个非对角位置.
        assert!((m.density() - 10.0 / 12.0).abs() < 1e-12);
        let mut w = m.upper_weights();
        w.sort_by(f64::total_cmp);
        assert_eq!(w, vec![1.0, 3.0, 3.0, 3.0, 5.0]);
    }

    #[test]
    fn test_n_keep_for_cost() {
        assert_eq!(n_keep_for_cost(4, 0.5).unwrap(), 3);
        assert_eq!(n_keep_for_cost(68, 0.1).unwrap(), 228);
        assert!(n_keep_for_cost(4, 1.5).is_err());
    }

    #[test]
    fn test_threshold_ties_random() {
        let m = sample();
        let t = m.upper_triangle();
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let thr = threshold_upper(t.view(), 2, &mut rng);
            // 5 一定保留, 三个 3 中随机保留一个, 1 被去掉.
            assert_eq!(thr[(0, 1)], 5.0);
            assert_eq!(thr.iter().filter(|v| **v == 3.0).count(), 1);
            assert_eq!(thr[(2, 3)], 0.0);
        }
    }

    #[test]
    fn test_threshold_edges() {
        let t = sample().upper_triangle();
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(threshold_upper(t.view(), 0, &mut rng), Array2::zeros((4, 4)));
        assert_eq!(threshold_upper(t.view(), 16, &mut rng), t);
    }

    #[test]
    fn test_threshold_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("Msym.txt");
        save_matrix(&p, sample().view()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let (txt, png) = threshold_file(&p, Threshold::Cost(0.5), &mut rng).unwrap();
        assert!(txt.ends_with("Msym_thrNkeep00003.txt"));
        assert!(png.exists());
        let thr = load_txt(&txt).unwrap();
        assert_eq!(thr, thr.t());
        assert_eq!(thr[(0, 0)], 9.0);
        assert_eq!(thr[(1, 0)], 5.0);
        // 3 条边: 5 和两个 3.
        assert_eq!(ConnMatrix::new(thr).unwrap().upper_weights().len(), 3);
    }

    #[test]
    fn test_average() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        save_matrix(&a, array![[1.0, 2.0], [3.0, 4.0]].view()).unwrap();
        save_matrix(&b, array![[3.0, 2.0], [1.0, 0.0]].view()).unwrap();
        let avg = average(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(avg, array![[2.0, 2.0], [2.0, 2.0]]);

        let c = dir.path().join("c.txt");
        save_matrix(&c, array![[1.0]].view()).unwrap();
        assert!(matches!(average(&[a, c]), Err(DtiError::Shape { .. })));
        assert!(matches!(average(&[]), Err(DtiError::Empty(_))));

        let list = dir.path().join("list.txt");
        std::fs::write(&list, format!("{}\n{}\n", dir.path().join("a.txt").display(), b.display())).unwrap();
        let (txt, png) = average_files(&list, dir.path().join("out/avg.txt")).unwrap();
        assert!(txt.exists() && png.exists());
    }

    #[test]
    fn test_weights_and_ntracts_files() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("Msym.txt");
        save_matrix(&p, sample().view()).unwrap();
        let png = weights_file(&p, WEIGHT_RANGE, WEIGHT_BINS, rgb::HIST_BLUE, true).unwrap();
        assert!(png.ends_with("Msym_weights.png"));
        let note = std::fs::read_to_string(png.with_extension("txt")).unwrap();
        assert_eq!(note, "cost = 83.33%\n");

        let png = ntracts_file(&p).unwrap();
        assert!(png.ends_with("Msym_Ntracts.png") && png.exists());

        let h = weights_histogram(&sample(), (0.0, 5.0), 5).unwrap();
        assert_eq!(h.counts(), &[0, 1, 0, 3, 1]);
    }
}
