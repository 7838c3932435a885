//! 相关与 t 检验设计.

use super::Table;
use crate::{DtiError, DtiResult};
use std::fs;
use std::path::{Path, PathBuf};

/// 一个 randomise 设计: 设计矩阵, 对比矩阵, 以及参与的被试.
#[derive(Clone, Debug, PartialEq)]
pub struct Design {
    /// 文件名主干, 如 `Corr_Age_Covar_Male`.
    pub name: String,

    /// 各 EV, 只包含 `mask` 选中的行.
    pub evs: Vec<Vec<f64>>,

    /// 对比矩阵的行.
    pub contrasts: Vec<Vec<f64>>,

    /// 数据表中参与该设计的行.
    pub mask: Vec<bool>,
}

fn std_dev(v: &[f64]) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    let n = v.len() as f64;
    let mean = v.iter().sum::<f64>() / n;
    (v.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n).sqrt()
}

impl Design {
    /// 是否有某个 EV 取值恒定 (例如只含对照组时的 `Meds` 列).
    /// 这样的设计矩阵秩亏, 不应写出.
    pub fn has_constant_ev(&self) -> bool {
        self.evs.iter().any(|ev| {
            let scale = ev.iter().fold(1.0_f64, |m, v| m.max(v.abs()));
            std_dev(ev) <= 1e-12 * scale
        })
    }

    /// 参与的被试个数.
    #[inline]
    pub fn num_points(&self) -> usize {
        self.evs.first().map_or(0, Vec::len)
    }

    /// 在 `dir` 下写出 `<name>.mat`, `<name>.con` 以及参与被试列表 `<name>.subs`.
    ///
    /// `ids` 与数据表的行一一对应. 含恒定 EV 的设计不写出, 返回 `Ok(None)`.
    pub fn write<P: AsRef<Path>>(&self, dir: P, ids: &[String]) -> DtiResult<Option<PathBuf>> {
        if self.has_constant_ev() {
            log::debug!("skipped design {} with a constant EV", self.name);
            return Ok(None);
        }
        if ids.len() != self.mask.len() {
            return Err(DtiError::Shape {
                expected: vec![self.mask.len()],
                found: vec![ids.len()],
            });
        }
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| DtiError::io(dir, e))?;
        let waves = self.evs.len();
        let points = self.num_points();

        let mut mat = format!("/NumWaves    {waves}\n/NumPoints    {points}\n/Matrix \n");
        for i in 0..points {
            let row: Vec<String> = self.evs.iter().map(|ev| format!("{:2.6}", ev[i])).collect();
            mat.push_str(&format!("{}\n", row.join(" ")));
        }
        let mut con = format!("/NumWaves    {waves}\n/NumContrasts    {}\n/Matrix \n", self.contrasts.len());
        for r in &self.contrasts {
            let row: Vec<String> = r.iter().map(|v| format!("{v:2.4}")).collect();
            con.push_str(&format!("{}\n", row.join(" ")));
        }
        let subs: String = ids
            .iter()
            .zip(&self.mask)
            .filter(|(_, m)| **m)
            .map(|(id, _)| format!("{id}\n"))
            .collect();

        let mat_path = dir.join(format!("{}.mat", self.name));
        for (path, text) in [
            (mat_path.clone(), mat),
            (dir.join(format!("{}.con", self.name)), con),
            (dir.join(format!("{}.subs", self.name)), subs),
        ] {
            fs::write(&path, text).map_err(|e| DtiError::io(&path, e))?;
        }
        Ok(Some(mat_path))
    }
}

/// 去掉 `vars` 任一列为缺失码的行.
fn exclude_missing(table: &Table, mask: &[bool], vars: &[&str], missing: f64) -> DtiResult<Vec<bool>> {
    let mut mask = mask.to_vec();
    for v in vars {
        for (m, x) in mask.iter_mut().zip(table.num(v)?) {
            *m &= *x != missing;
        }
    }
    Ok(mask)
}

fn select(table: &Table, mask: &[bool], var: &str) -> DtiResult<Vec<f64>> {
    Ok(table
        .num(var)?
        .iter()
        .zip(mask)
        .filter(|(_, m)| **m)
        .map(|(x, _)| *x)
        .collect())
}

fn demeaned(mut v: Vec<f64>) -> Vec<f64> {
    if !v.is_empty() {
        let mean = v.iter().sum::<f64>() / v.len() as f64;
        v.iter_mut().for_each(|x| *x -= mean);
    }
    v
}

fn covar_suffix(covars: &[&str]) -> String {
    if covars.is_empty() {
        String::new()
    } else {
        format!("_Covar_{}", covars.join("_"))
    }
}

/// 在 `width` 列的对比矩阵中, 从 `at` 列开始放置 `[1, -1]` 和 `[-1, 1]`.
fn contrast_pair(width: usize, at: usize) -> Vec<Vec<f64>> {
    let mut rows = vec![vec![0.0; width]; 2];
    if at + 1 < width {
        rows[0][at] = 1.0;
        rows[0][at + 1] = -1.0;
        rows[1][at] = -1.0;
        rows[1][at + 1] = 1.0;
    }
    rows
}

fn demeaned_evs(table: &Table, mask: &[bool], vars: &[&str]) -> DtiResult<Vec<Vec<f64>>> {
    vars.iter().map(|v| select(table, mask, v).map(demeaned)).collect()
}

/// 相关设计: 感兴趣的测量 `measure` (可无) 加上无关协变量 `covars`.
///
/// 任一变量缺失的被试被排除, 之后各 EV 去均值. 对比为 `[1, 0…]` 和 `[-1, 0…]`.
/// `measure` 与 `covars` 均为空时返回 `Ok(None)`.
pub fn correlation_design(
    table: &Table,
    mask: &[bool],
    measure: Option<&str>,
    covars: &[&str],
    missing: f64,
) -> DtiResult<Option<Design>> {
    let vars: Vec<&str> = measure.into_iter().chain(covars.iter().copied()).collect();
    if vars.is_empty() {
        return Ok(None);
    }
    let mask = exclude_missing(table, mask, &vars, missing)?;
    let evs = demeaned_evs(table, &mask, &vars)?;

    let name = match measure {
        Some(m) => format!("Corr_{m}{}", covar_suffix(covars)),
        None => format!("Covar_{}", covars.join("_")),
    };
    let mut contrasts = vec![vec![0.0; evs.len()]; 2];
    contrasts[0][0] = 1.0;
    contrasts[1][0] = -1.0;
    Ok(Some(Design {
        name,
        evs,
        contrasts,
        mask,
    }))
}

/// 以二值列 `split_var` 分组的 t 检验设计.
///
/// EV 为 `split_var`, `1 − split_var`, 再加上相关设计的 EV; 对比为 `[1, -1, 0…]`, `[-1, 1, 0…]`.
/// 给定 `measure` 时另返回交互设计, 其 EV 为两组列, 两组列与测量的乘积, 以及协变量,
/// 对比放在第 3, 4 列. `groups` 为 (取 1 的组名, 取 0 的组名).
pub fn ttest_designs(
    table: &Table,
    mask: &[bool],
    split_var: &str,
    groups: (&str, &str),
    measure: Option<&str>,
    covars: &[&str],
    missing: f64,
) -> DtiResult<Vec<Design>> {
    let vars: Vec<&str> = measure.into_iter().chain(covars.iter().copied()).collect();
    let mut all = vars.clone();
    all.push(split_var);
    let mask = exclude_missing(table, mask, &all, missing)?;

    let col1 = select(table, &mask, split_var)?;
    let col2: Vec<f64> = col1.iter().map(|x| 1.0 - x).collect();
    let corr = demeaned_evs(table, &mask, &vars)?;
    let prefix = format!("TTest_{}{}", groups.0, groups.1);
    let covar_name = covar_suffix(covars);

    let mut evs = vec![col1.clone(), col2.clone()];
    evs.extend(corr.iter().cloned());
    let measure_name = measure.map(|m| format!("_Corr_{m}")).unwrap_or_default();
    let mut designs = vec![Design {
        name: format!("{prefix}{measure_name}{covar_name}"),
        contrasts: contrast_pair(evs.len(), 0),
        evs,
        mask: mask.clone(),
    }];

    if let Some(m) = measure {
        let mv = &corr[0];
        let mut evs = vec![col1.clone(), col2.clone()];
        evs.push(col1.iter().zip(mv).map(|(a, b)| a * b).collect());
        evs.push(col2.iter().zip(mv).map(|(a, b)| a * b).collect());
        evs.extend(corr[1..].iter().cloned());
        designs.push(Design {
            name: format!("{prefix}_Int_{m}{covar_name}"),
            contrasts: contrast_pair(evs.len(), 2),
            evs,
            mask,
        });
    }
    Ok(designs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::MISSING_CODE;

    fn table() -> Table {
        Table::parse(
            "SubID,Depressed,Age,Male\n1,0,10,1\n2,0,12,0\n3,1,14,1\n4,1,999,0\n",
            "t.csv",
        )
        .unwrap()
    }

    #[test]
    fn test_correlation_design() {
        let t = table();
        let mask = vec![true; 4];
        let d = correlation_design(&t, &mask, Some("Age"), &["Male"], MISSING_CODE)
            .unwrap()
            .unwrap();
        assert_eq!(d.name, "Corr_Age_Covar_Male");
        assert_eq!(d.mask, [true, true, true, false]);
        assert_eq!(d.evs[0], [-2.0, 0.0, 2.0]);
        assert_eq!(d.contrasts, [vec![1.0, 0.0], vec![-1.0, 0.0]]);

        let c = correlation_design(&t, &mask, None, &["Male"], MISSING_CODE).unwrap().unwrap();
        assert_eq!(c.name, "Covar_Male");
        assert!(correlation_design(&t, &mask, None, &[], MISSING_CODE).unwrap().is_none());
    }

    #[test]
    fn test_ttest_designs() {
        let t = table();
        let mask = vec![true; 4];
        let ds = ttest_designs(&t, &mask, "Depressed", ("Dep", "Ctrl"), Some("Age"), &[], MISSING_CODE).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds[0].name, "TTest_DepCtrl_Corr_Age");
        assert_eq!(ds[0].evs[0], [0.0, 0.0, 1.0]);
        assert_eq!(ds[0].evs[1], [1.0, 1.0, 0.0]);
        assert_eq!(ds[0].contrasts[0], [1.0, -1.0, 0.0]);
        assert_eq!(ds[1].name, "TTest_DepCtrl_Int_Age");
        assert_eq!(ds[1].evs.len(), 4);
        assert_eq!(ds[1].evs[2], [0.0, 0.0, 2.0]);
        assert_eq!(ds[1].contrasts[1], [0.0, 0.0, -1.0, 1.0]);

        let plain = ttest_designs(&t, &mask, "Depressed", ("Dep", "Ctrl"), None, &[], MISSING_CODE).unwrap();
        assert_eq!(plain.len(), 1);
        assert_eq!(plain[0].name, "TTest_DepCtrl");
        assert_eq!(plain[0].mask, [true; 4]);
    }

    #[test]
    fn test_write_design() {
        let dir = tempfile::tempdir().unwrap();
        let t = table();
        let ids = t.text("SubID").unwrap();
        let d = correlation_design(&t, &[true; 4], Some("Age"), &[], MISSING_CODE)
            .unwrap()
            .unwrap();
        let p = d.write(dir.path(), &ids).unwrap().unwrap();
        let mat = fs::read_to_string(p).unwrap();
        assert_eq!(mat, "/NumWaves    1\n/NumPoints    3\n/Matrix \n-2.000000\n0.000000\n2.000000\n");
        let con = fs::read_to_string(dir.path().join("Corr_Age.con")).unwrap();
        assert_eq!(con, "/NumWaves    1\n/NumContrasts    2\n/Matrix \n1.0000\n-1.0000\n");
        let subs = fs::read_to_string(dir.path().join("Corr_Age.subs")).unwrap();
        assert_eq!(subs, "1\n2\n3\n");

        // 只有对照组时 Depressed 列恒定.
        let ctrl = [true, true, false, false];
        let ds = ttest_designs(&t, &ctrl, "Depressed", ("Dep", "Ctrl"), None, &[], MISSING_CODE).unwrap();
        assert!(ds[0].has_constant_ev());
        assert!(ds[0].write(dir.path(), &ids).unwrap().is_none());
    }
}
