//! 队列头动 QC.
//!
//! 汇总每个被试三个位移文件 (`ec_disp{,_b0,_notb0}.txt`) 的均值/标准差/最大值,
//! 按某一列排序后输出表格, 并以箱线图标出离群被试.

use crate::consts::{files, B0_THRESHOLD};
use crate::motion::{exclude_b0_neighbours, DispSeries, Measure, SeriesStats, VolumeGroup};
use crate::plot::{boxplot_figure, cell_for, heatmap, palette, ColorRange, ColoredFlier, Colormap, FIGURE_SIZE};
use crate::stats::BoxStats;
use crate::{DtiError, DtiResult};
use itertools::Itertools;
use ndarray::Array2;
use std::fmt;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
    }
}

/// 原始流程中用于剔除极端被试的默认上限 (mm).
pub const DEFAULT_MAX_VALUE: f64 = 2.5;

/// 箱线图上方留白 (mm).
const HEAD_ROOM: f64 = 0.5;

/// 汇总统计量的种类.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Stat {
    /// 均值.
    Mean,

    /// 标准差.
    Std,

    /// 最大值.
    Max,
}

impl Stat {
    /// 全部统计量, 按列顺序.
    pub const ALL: [Stat; 3] = [Stat::Mean, Stat::Std, Stat::Max];

    /// 列名前缀.
    pub const fn name(&self) -> &'static str {
        match self {
            Stat::Mean => "mean",
            Stat::Std => "std",
            Stat::Max => "max",
        }
    }

    fn pick(&self, s: &SeriesStats) -> Option<f64> {
        match self {
            Stat::Mean => s.mean,
            Stat::Std => s.std,
            Stat::Max => s.max,
        }
    }
}

/// 汇总表中的一列, 形如 `mean_rms_rel_notb0`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Column {
    /// 统计量.
    pub stat: Stat,

    /// 度量.
    pub measure: Measure,

    /// 体积分组.
    pub group: VolumeGroup,
}

impl Column {
    /// 构造列.
    #[inline]
    pub const fn new(stat: Stat, measure: Measure, group: VolumeGroup) -> Self {
        Self { stat, measure, group }
    }

    /// 默认排序列 `mean_rms_rel_notb0`.
    pub const SORT_DEFAULT: Column = Column::new(Stat::Mean, Measure::Rel, VolumeGroup::NotB0);

    /// 全部 18 列, 顺序为 度量 × 分组 × 统计量.
    pub fn all() -> Vec<Column> {
        Measure::ALL
            .into_iter()
            .cartesian_product(VolumeGroup::ALL)
            .cartesian_product(Stat::ALL)
            .map(|((m, g), s)| Column::new(s, m, g))
            .collect()
    }

    /// 全部均值列 (箱线图的 6 个箱子).
    pub fn means() -> Vec<Column> {
        Self::all().into_iter().filter(|c| c.stat == Stat::Mean).collect()
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_rms_{}{}",
            self.stat.name(),
            self.measure.name(),
            self.group.suffix()
        )
    }
}

impl FromStr for Column {
    type Err = DtiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|c| c.to_string() == s)
            .ok_or_else(|| DtiError::InvalidArgument(format!("未知的列名 `{s}`")))
    }
}

/// 单个被试的头动汇总.
#[derive(Clone, Debug, PartialEq)]
pub struct SubjectMotion {
    /// 被试编号.
    pub subid: String,

    /// DTI 目录.
    pub dirname: PathBuf,

    /// `[度量][分组]` 的统计量.
    stats: [[SeriesStats; 3]; 2],
}

fn measure_idx(m: Measure) -> usize {
    match m {
        Measure::Abs => 0,
        Measure::Rel => 1,
    }
}

fn group_idx(g: VolumeGroup) -> usize {
    match g {
        VolumeGroup::All => 0,
        VolumeGroup::B0 => 1,
        VolumeGroup::NotB0 => 2,
    }
}

impl SubjectMotion {
    /// 由三个分组的位移序列计算, 顺序同 [`VolumeGroup::ALL`].
    pub fn from_series<S: Into<String>, P: Into<PathBuf>>(subid: S, dirname: P, series: &[DispSeries; 3]) -> Self {
        let mut stats = [[SeriesStats::default(); 3]; 2];
        for (g, disp) in VolumeGroup::ALL.into_iter().zip(series) {
            for m in Measure::ALL {
                // 每个度量使用各自的列.
                stats[measure_idx(m)][group_idx(g)] = SeriesStats::of(disp.get(m));
            }
        }
        Self {
            subid: subid.into(),
            dirname: dirname.into(),
            stats,
        }
    }

    /// 读取 `dir` 下的三个位移文件.
    pub fn load<P: AsRef<Path>>(subid: &str, dir: P) -> DtiResult<Self> {
        let dir = dir.as_ref();
        let read = |g: VolumeGroup| DispSeries::read(dir.join(g.disp_file()));
        let series = [
            read(VolumeGroup::All)?,
            read(VolumeGroup::B0)?,
            read(VolumeGroup::NotB0)?,
        ];
        Ok(Self::from_series(subid, dir, &series))
    }

    /// 某一度量与分组的统计量.
    #[inline]
    pub fn stats(&self, m: Measure, g: VolumeGroup) -> SeriesStats {
        self.stats[measure_idx(m)][group_idx(g)]
    }

    /// 某一列的取值.
    #[inline]
    pub fn value(&self, c: Column) -> Option<f64> {
        c.stat.pick(&self.stats(c.measure, c.group))
    }
}

/// 一个离群点.
#[derive(Clone, Debug, PartialEq)]
pub struct Outlier {
    /// 所在列.
    pub column: Column,

    /// 被试编号.
    pub subid: String,

    /// 数值.
    pub value: f64,

    /// 被试的颜色编号, 从 1 开始.
    pub colour: usize,
}

/// [`CohortTable::label_outliers`] 的结果.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OutlierReport {
    /// 按列, 列内按数值升序排列的离群点.
    pub outliers: Vec<Outlier>,

    /// 每个被试 (与表格行对应) 的颜色编号, 0 表示从未成为离群点.
    pub colours: Vec<usize>,
}

/// 队列头动汇总表, 每个被试一行.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CohortTable {
    rows: Vec<SubjectMotion>,
}

#[cfg(feature = "rayon")]
fn load_rows(data_dir: &Path, subs: &[String]) -> DtiResult<Vec<SubjectMotion>> {
    subs.par_iter()
        .map(|s| crate::dataset::subject_dti_dir(data_dir, s).and_then(|d| SubjectMotion::load(s, d)))
        .collect()
}

#[cfg(not(feature = "rayon"))]
fn load_rows(data_dir: &Path, subs: &[String]) -> DtiResult<Vec<SubjectMotion>> {
    crate::dataset::motion_loader(subs.iter().cloned(), data_dir)
        .map(|(_, r)| r)
        .collect()
}

impl CohortTable {
    /// 由若干行构造.
    #[inline]
    pub fn new(rows: Vec<SubjectMotion>) -> Self {
        Self { rows }
    }

    /// 读取 `data_dir` 下所有被试的位移文件. 任一被试缺失都返回 `Err`.
    pub fn load<P: AsRef<Path>>(data_dir: P, subs: &[String]) -> DtiResult<Self> {
        let rows = load_rows(data_dir.as_ref(), subs)?;
        log::info!("loaded motion summaries of {} subjects", rows.len());
        Ok(Self { rows })
    }

    /// 各行.
    #[inline]
    pub fn rows(&self) -> &[SubjectMotion] {
        &self.rows
    }

    /// 被试个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 按某列升序 (稳定) 排序, 缺失值排在最后.
    pub fn sort_by(&mut self, c: Column) {
        self.rows.sort_by(|a, b| match (a.value(c), b.value(c)) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
    }

    /// 只保留 `c` 列取值小于 `max` 的被试 (缺失值也被去掉).
    pub fn filter_below(&self, c: Column, max: f64) -> Self {
        let rows = self
            .rows
            .iter()
            .filter(|r| r.value(c).is_some_and(|v| v < max))
            .cloned()
            .collect();
        Self { rows }
    }

    /// 某一列的全部非缺失值.
    pub fn column_values(&self, c: Column) -> Vec<f64> {
        self.rows.iter().filter_map(|r| r.value(c)).collect()
    }

    /// 写出制表符分隔的汇总表: `subid`, `dirname` 和 18 列统计量, 缺失值写作 `.`.
    pub fn write_tsv<P: AsRef<Path>>(&self, path: P) -> DtiResult<()> {
        let path = path.as_ref();
        crate::text::ensure_parent(path)?;
        let file = fs::File::create(path).map_err(|e| DtiError::io(path, e))?;
        let mut w = BufWriter::new(file);
        let cols = Column::all();
        let io = |e: std::io::Error| DtiError::io(path, e);

        writeln!(w, "subid\tdirname\t{}", cols.iter().join("\t")).map_err(io)?;
        for r in &self.rows {
            let cells = cols.iter().map(|c| match r.value(*c) {
                Some(v) => format!("{v:.6}"),
                None => crate::consts::NA_TOKEN.to_string(),
            });
            writeln!(w, "{}\t{}\t{}", r.subid, r.dirname.display(), cells.format("\t")).map_err(io)?;
        }
        w.flush().map_err(io)
    }

    /// 标记 `columns` 中每一列的离群点.
    ///
    /// 离群点按数值升序, 每个离群值对应表中第一个取该值的被试;
    /// 被试第一次成为离群点时获得下一个颜色编号 (从 1 开始).
    pub fn label_outliers(&self, columns: &[Column]) -> OutlierReport {
        let mut colours = vec![0usize; self.rows.len()];
        let mut next = 1;
        let mut outliers = Vec::new();
        for &c in columns {
            let Some(b) = BoxStats::of(&self.column_values(c)) else {
                continue;
            };
            for &y in &b.fliers {
                let Some(i) = self.rows.iter().position(|r| r.value(c) == Some(y)) else {
                    continue;
                };
                if colours[i] == 0 {
                    colours[i] = next;
                    next += 1;
                }
                outliers.push(Outlier {
                    column: c,
                    subid: self.rows[i].subid.clone(),
                    value: y,
                    colour: colours[i],
                });
            }
        }
        OutlierReport { outliers, colours }
    }

    /// 画出 `columns` 的箱线图, 离群点按被试着色; 同时写出 `<stem>_outliers.txt`.
    pub fn boxplot<P: AsRef<Path>>(&self, columns: &[Column], path: P) -> DtiResult<OutlierReport> {
        let path = path.as_ref();
        let report = self.label_outliers(columns);

        let mut boxes = Vec::new();
        let mut kept = Vec::new();
        for &c in columns {
            if let Some(b) = BoxStats::of(&self.column_values(c)) {
                boxes.push(b);
                kept.push(c);
            }
        }
        let colored: Vec<ColoredFlier> = report
            .outliers
            .iter()
            .filter_map(|o| {
                let column = kept.iter().position(|c| *c == o.column)?;
                Some(ColoredFlier {
                    column,
                    value: o.value,
                    color: palette(o.colour - 1),
                })
            })
            .collect();
        boxplot_figure(FIGURE_SIZE, &boxes, &colored, HEAD_ROOM).save(path)?;

        let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
        let note = path.with_file_name(format!("{stem}_outliers.txt"));
        let mut text = String::from("column\tsubid\tvalue\tcolour\n");
        for o in &report.outliers {
            text.push_str(&format!("{}\t{}\t{:.6}\t{}\n", o.column, o.subid, o.value, o.colour));
        }
        fs::write(&note, text).map_err(|e| DtiError::io(&note, e))?;
        Ok(report)
    }

    /// "被试 × 体积" 的相对位移矩阵 (去掉 b0 及其后一个体积), 行顺序同表格.
    /// 各被试体积数不同时以 NaN 补齐.
    pub fn motion_matrix(&self, b0_threshold: f64) -> DtiResult<Array2<f64>> {
        let mut series = Vec::with_capacity(self.rows.len());
        for r in &self.rows {
            let disp = DispSeries::read(r.dirname.join(files::EC_DISP))?;
            let bvals = crate::text::load_vector(r.dirname.join(files::BVALS))?;
            if bvals.len() != disp.len() {
                return Err(DtiError::Shape {
                    expected: vec![disp.len()],
                    found: vec![bvals.len()],
                });
            }
            let keep = exclude_b0_neighbours(&bvals, b0_threshold);
            let rel: Vec<f64> = disp
                .rel
                .iter()
                .zip(keep)
                .filter(|(_, k)| *k)
                .map(|(v, _)| v.unwrap_or(f64::NAN))
                .collect();
            series.push(rel);
        }
        let width = series.iter().map(Vec::len).max().unwrap_or(0);
        Ok(Array2::from_shape_fn((series.len(), width), |(i, j)| {
            series[i].get(j).copied().unwrap_or(f64::NAN)
        }))
    }
}

/// 队列 QC 的选项.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CohortOptions {
    /// 排序列.
    pub sort_by: Column,

    /// 画箱线图前剔除 `mean_rms_abs` 不小于该值的被试.
    pub max_value: Option<f64>,

    /// b 值不超过该值的体积视为 b0.
    pub b0_threshold: f64,
}

impl Default for CohortOptions {
    fn default() -> Self {
        Self {
            sort_by: Column::SORT_DEFAULT,
            max_value: None,
            b0_threshold: B0_THRESHOLD,
        }
    }
}

/// 完整的队列 QC: 在 `out_dir` 下写出 `dti_motion.tsv`, `dti_motion_boxplot.png`
/// (及其离群点旁注) 和 `dti_motion_heatmap.png`. 返回写出的文件.
pub fn cohort_report<P: AsRef<Path>, Q: AsRef<Path>>(
    data_dir: P,
    subs: &[String],
    out_dir: Q,
    opts: &CohortOptions,
) -> DtiResult<Vec<PathBuf>> {
    let out_dir = out_dir.as_ref();
    fs::create_dir_all(out_dir).map_err(|e| DtiError::io(out_dir, e))?;

    let mut table = CohortTable::load(data_dir, subs)?;
    table.sort_by(opts.sort_by);

    let tsv = out_dir.join("dti_motion.tsv");
    table.write_tsv(&tsv)?;

    let plotted = match opts.max_value {
        Some(max) => {
            let first = Column::new(Stat::Mean, Measure::Abs, VolumeGroup::All);
            let t = table.filter_below(first, max);
            log::info!("{} of {} subjects below {max} mm", t.len(), table.len());
            t
        }
        None => table.clone(),
    };
    let boxplot = out_dir.join("dti_motion_boxplot.png");
    let report = plotted.boxplot(&Column::means(), &boxplot)?;
    for o in &report.outliers {
        log::info!("outlier {} in {}: {:.3}", o.subid, o.column, o.value);
    }
    let note = out_dir.join("dti_motion_boxplot_outliers.txt");

    let m = table.motion_matrix(opts.b0_threshold)?;
    let heat = out_dir.join("dti_motion_heatmap.png");
    let cell = cell_for(m.ncols().max(m.nrows()), 600);
    heatmap(m.view(), Colormap::Jet, ColorRange::Auto, cell).save(&heat)?;

    Ok(vec![tsv, boxplot, note, heat])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(id: &str, abs_mean: f64) -> SubjectMotion {
        let all = DispSeries::from_values(&[abs_mean, abs_mean], &[0.0, 0.1]);
        let b0 = DispSeries {
            abs: vec![Some(abs_mean), None],
            rel: vec![Some(0.0), None],
        };
        let notb0 = DispSeries {
            abs: vec![None, Some(abs_mean)],
            rel: vec![None, Some(abs_mean / 10.0)],
        };
        SubjectMotion::from_series(id, format!("/data/{id}"), &[all, b0, notb0])
    }

    #[test]
    fn test_columns() {
        let all = Column::all();
        assert_eq!(all.len(), 18);
        assert_eq!(all[0].to_string(), "mean_rms_abs");
        assert_eq!(all[5].to_string(), "max_rms_abs_b0");
        assert_eq!(all[17].to_string(), "max_rms_rel_notb0");
        assert_eq!("mean_rms_rel_notb0".parse::<Column>().unwrap(), Column::SORT_DEFAULT);
        assert!("mean_rms".parse::<Column>().is_err());
        assert_eq!(Column::means().len(), 6);
    }

    #[test]
    fn test_measures_use_own_column() {
        let s = subject("a", 1.0);
        let rel = s.stats(Measure::Rel, VolumeGroup::All);
        assert!((rel.mean.unwrap() - 0.05).abs() < 1e-12);
        assert_eq!(s.stats(Measure::Abs, VolumeGroup::All).mean, Some(1.0));
        assert_eq!(s.stats(Measure::Abs, VolumeGroup::B0).std, None);
    }

    #[test]
    fn test_sort_and_filter() {
        let mut t = CohortTable::new(vec![subject("c", 3.0), subject("a", 1.0), subject("b", 2.0)]);
        t.sort_by(Column::SORT_DEFAULT);
        let ids: Vec<_> = t.rows().iter().map(|r| r.subid.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        let f = t.filter_below(Column::new(Stat::Mean, Measure::Abs, VolumeGroup::All), 2.5);
        assert_eq!(f.len(), 2);
    }

    #[test]
    fn test_label_outliers() {
        let t = CohortTable::new(vec![
            subject("s1", 1.0),
            subject("s2", 1.1),
            subject("big", 9.0),
            subject("s3", 1.2),
            subject("s4", 1.3),
            subject("s5", 1.15),
        ]);
        let cols = [
            Column::new(Stat::Mean, Measure::Abs, VolumeGroup::All),
            Column::new(Stat::Mean, Measure::Abs, VolumeGroup::NotB0),
        ];
        let r = t.label_outliers(&cols);
        assert_eq!(r.outliers.len(), 2);
        assert!(r.outliers.iter().all(|o| o.subid == "big" && o.colour == 1));
        assert_eq!(r.colours, vec![0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn test_write_tsv_and_boxplot() {
        let dir = tempfile::tempdir().unwrap();
        let t = CohortTable::new(vec![subject("a", 1.0), subject("b", 2.0)]);
        let p = dir.path().join("motion.tsv");
        t.write_tsv(&p).unwrap();
        let text = fs::read_to_string(&p).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("subid\tdirname\tmean_rms_abs\tstd_rms_abs\tmax_rms_abs\t"));
        let cells: Vec<_> = lines[1].split('\t').collect();
        assert_eq!(cells.len(), 20);
        assert_eq!(cells[0], "a");
        // b0 组只有一个值, 标准差缺失.
        assert_eq!(cells[6], ".");

        let png = dir.path().join("box.png");
        t.boxplot(&Column::means(), &png).unwrap();
        assert!(png.exists());
        assert!(dir.path().join("box_outliers.txt").exists());
    }
}
