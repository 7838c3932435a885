//! FSL `randomise` 设计文件.
//!
//! - [`DesignMatrix`], [`Contrasts`]: 最简单的 `.mat` / `.con` / `.fts` 文件.
//! - [`factorial_designs`]: 由被试编号推出的 LL/SS × CA 因子设计.
//! - [`Design`]: 行为数据驱动的相关/t 检验设计, 由 [`RandomiseSetup`] 批量生成.

use crate::{DtiError, DtiResult};
use std::fs;
use std::path::{Path, PathBuf};

mod design;
mod randomise;
mod table;

pub use design::{correlation_design, ttest_designs, Design};
pub use randomise::{base_mask, RandomiseOptions, RandomiseSetup};
pub use table::{Table, TableColumn};

/// 设计矩阵, 每个 EV (explanatory variable) 一个向量.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DesignMatrix {
    /// 各 EV, 长度相同.
    pub waves: Vec<Vec<f64>>,
}

/// 对比矩阵 (或 F 检验矩阵), 每行一个对比.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Contrasts {
    /// 各行, 长度等于 EV 个数.
    pub rows: Vec<Vec<f64>>,
}

impl Contrasts {
    /// 由整数行构造.
    pub fn from_ints<const N: usize>(rows: &[[i32; N]]) -> Self {
        Self {
            rows: rows.iter().map(|r| r.iter().map(|&v| v as f64).collect()).collect(),
        }
    }
}

fn with_ext(root: &Path, ext: &str) -> PathBuf {
    let mut s = root.as_os_str().to_owned();
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}

fn join_row(row: &[f64]) -> String {
    row.iter().map(f64::to_string).collect::<Vec<_>>().join(" ")
}

fn write_text(path: &Path, text: &str) -> DtiResult<()> {
    crate::text::ensure_parent(path)?;
    fs::write(path, text).map_err(|e| DtiError::io(path, e))
}

impl DesignMatrix {
    /// EV 个数.
    #[inline]
    pub fn num_waves(&self) -> usize {
        self.waves.len()
    }

    /// 观测 (被试) 个数.
    #[inline]
    pub fn num_points(&self) -> usize {
        self.waves.first().map_or(0, Vec::len)
    }

    /// 写出 `<root>.mat`.
    pub fn write_mat<P: AsRef<Path>>(&self, root: P) -> DtiResult<PathBuf> {
        let n = self.num_points();
        if self.waves.iter().any(|w| w.len() != n) {
            return Err(DtiError::Shape {
                expected: vec![n],
                found: self.waves.iter().map(Vec::len).collect(),
            });
        }
        let mut text = format!("/NumWaves {}\n/NumPoints {n}\n\n/Matrix \n", self.num_waves());
        for i in 0..n {
            let row: Vec<f64> = self.waves.iter().map(|w| w[i]).collect();
            text.push_str(&format!("{}\n", join_row(&row)));
        }
        let path = with_ext(root.as_ref(), "mat");
        write_text(&path, &text)?;
        Ok(path)
    }
}

impl Contrasts {
    fn write_ext(&self, root: &Path, ext: &str) -> DtiResult<PathBuf> {
        let waves = self.rows.first().map_or(0, Vec::len);
        let mut text = format!("/NumWaves {waves}\n/NumContrasts {}\n\n/Matrix \n", self.rows.len());
        for r in &self.rows {
            text.push_str(&format!("{}\n", join_row(r)));
        }
        let path = with_ext(root, ext);
        write_text(&path, &text)?;
        Ok(path)
    }

    /// 写出 `<root>.con`.
    #[inline]
    pub fn write_con<P: AsRef<Path>>(&self, root: P) -> DtiResult<PathBuf> {
        self.write_ext(root.as_ref(), "con")
    }

    /// 写出 F 检验文件 `<root>.fts`.
    #[inline]
    pub fn write_fts<P: AsRef<Path>>(&self, root: P) -> DtiResult<PathBuf> {
        self.write_ext(root.as_ref(), "fts")
    }
}

fn indicator<F: Fn(&str) -> bool>(subjects: &[String], f: F) -> Vec<f64> {
    subjects.iter().map(|s| if f(s) { 1.0 } else { 0.0 }).collect()
}

fn product(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| x * y).collect()
}

/// 由被试编号生成因子设计, 写入 `out_dir`:
///
/// - `LLSS`: 编号含 `A` 为 LL, 含 `B` 为 SS;
/// - `CANoCA`: 编号以 `1` 结尾为 CA, 以 `2` 结尾为 NoCA;
/// - `Anova_AlleleCA`: 上面两个因子交叉出的四格设计, 附带 F 检验.
///
/// 返回写出的文件.
pub fn factorial_designs<P: AsRef<Path>>(subjects: &[String], out_dir: P) -> DtiResult<Vec<PathBuf>> {
    if subjects.is_empty() {
        return Err(DtiError::Empty("被试列表".to_string()));
    }
    let out_dir = out_dir.as_ref();
    let ll = indicator(subjects, |s| s.contains('A'));
    let ss = indicator(subjects, |s| s.contains('B'));
    let ca = indicator(subjects, |s| s.ends_with('1'));
    let noca = indicator(subjects, |s| s.ends_with('2'));

    let two_groups = Contrasts::from_ints(&[[1, -1], [-1, 1]]);
    let anova = Contrasts::from_ints(&[[1, 1, -1, -1], [1, -1, 1, -1], [1, -1, -1, 1], [-1, 1, 1, -1]]);
    let ftests = Contrasts::from_ints(&[[1, 0, 0, 0], [0, 1, 0, 0], [0, 0, 1, 0]]);

    let mut written = Vec::new();
    for (name, waves) in [("LLSS", vec![ll.clone(), ss.clone()]), ("CANoCA", vec![ca.clone(), noca.clone()])] {
        let root = out_dir.join(name);
        written.push(DesignMatrix { waves }.write_mat(&root)?);
        written.push(two_groups.write_con(&root)?);
    }

    let root = out_dir.join("Anova_AlleleCA");
    let waves = vec![product(&ll, &ca), product(&ll, &noca), product(&ss, &ca), product(&ss, &noca)];
    written.push(DesignMatrix { waves }.write_mat(&root)?);
    written.push(anova.write_con(&root)?);
    written.push(ftests.write_fts(&root)?);
    log::info!("wrote factorial designs of {} subjects to {}", subjects.len(), out_dir.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_mat_and_con() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("sub/dir/Test");
        let m = DesignMatrix {
            waves: vec![vec![1.0, 0.0, 1.0], vec![0.0, 1.0, 0.5]],
        };
        let p = m.write_mat(&root).unwrap();
        assert_eq!(p, dir.path().join("sub/dir/Test.mat"));
        assert_eq!(
            fs::read_to_string(p).unwrap(),
            "/NumWaves 2\n/NumPoints 3\n\n/Matrix \n1 0\n0 1\n1 0.5\n"
        );
        let c = Contrasts::from_ints(&[[1, -1], [-1, 1]]).write_con(&root).unwrap();
        assert_eq!(
            fs::read_to_string(c).unwrap(),
            "/NumWaves 2\n/NumContrasts 2\n\n/Matrix \n1 -1\n-1 1\n"
        );

        let bad = DesignMatrix {
            waves: vec![vec![1.0], vec![1.0, 2.0]],
        };
        assert!(bad.write_mat(&root).is_err());
    }

    #[test]
    fn test_factorial_designs() {
        let dir = tempfile::tempdir().unwrap();
        let subs: Vec<String> = ["A01", "A02", "B11", "B12"].map(String::from).to_vec();
        let files = factorial_designs(&subs, dir.path()).unwrap();
        assert_eq!(files.len(), 7);

        let llss = fs::read_to_string(dir.path().join("LLSS.mat")).unwrap();
        assert!(llss.ends_with("/Matrix \n1 0\n1 0\n0 1\n0 1\n"));
        let anova = fs::read_to_string(dir.path().join("Anova_AlleleCA.mat")).unwrap();
        assert!(anova.starts_with("/NumWaves 4\n/NumPoints 4\n"));
        assert!(anova.ends_with("1 0 0 0\n0 1 0 0\n0 0 1 0\n0 0 0 1\n"));
        let fts = fs::read_to_string(dir.path().join("Anova_AlleleCA.fts")).unwrap();
        assert_eq!(fts, "/NumWaves 4\n/NumContrasts 3\n\n/Matrix \n1 0 0 0\n0 1 0 0\n0 0 1 0\n");

        assert!(factorial_designs(&[], dir.path()).is_err());
    }
}
