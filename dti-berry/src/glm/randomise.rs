//! 批量生成 randomise 设计目录.

use super::{correlation_design, ttest_designs, Design, Table, TableColumn};
use crate::consts::MISSING_CODE;
use crate::{DtiError, DtiResult};
use itertools::Itertools;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// 分组变量的取值个数: 0, 1, 以及 2 (忽略该变量).
const SPLIT_CODES: usize = 3;

/// 表示 "忽略该分组变量" 的取值.
const IGNORE: usize = 2;

/// 输出目录下的设计根目录名.
pub const GLM_DIR: &str = "GLM";

/// randomise 设计选项, 从 TOML 文件读取.
///
/// ```toml
/// measures = ["Age"]
/// covars = ["Male"]
/// split_vars = ["Depressed", "Meds"]
///
/// [group_names]
/// Depressed_0 = "Ctrl"
/// Depressed_1 = "Dep"
/// Depressed_2 = "IgDep"
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct RandomiseOptions {
    /// 感兴趣的测量.
    pub measures: Vec<String>,

    /// 无关协变量.
    pub covars: Vec<String>,

    /// 分组变量, 取值 0/1.
    pub split_vars: Vec<String>,

    /// `"<变量>_<0|1|2>"` 到组名的映射.
    pub group_names: BTreeMap<String, String>,

    /// 是否排除任一测量或协变量缺失的被试.
    pub require_all_measures: bool,

    /// 缺失码.
    pub missing: f64,

    /// 取值非 0 即排除的列.
    pub exclude_columns: Vec<String>,

    /// 服药列. 对照组的该列取值跟随当前分组.
    pub meds_column: String,
}

impl Default for RandomiseOptions {
    fn default() -> Self {
        Self {
            measures: Vec::new(),
            covars: Vec::new(),
            split_vars: Vec::new(),
            group_names: BTreeMap::new(),
            require_all_measures: false,
            missing: MISSING_CODE,
            exclude_columns: vec!["AbnormalBrain".to_string(), "Braces".to_string()],
            meds_column: "Meds".to_string(),
        }
    }
}

impl RandomiseOptions {
    /// 解析 TOML 文本.
    pub fn parse<P: AsRef<Path>>(text: &str, origin: P) -> DtiResult<Self> {
        toml::from_str(text).map_err(|source| DtiError::Config {
            path: origin.as_ref().to_owned(),
            source,
        })
    }

    /// 读取 TOML 文件.
    pub fn read<P: AsRef<Path>>(path: P) -> DtiResult<Self> {
        let path = path.as_ref();
        Self::parse(&crate::text::read_to_string(path)?, path)
    }

    /// 分组变量 `var` 取 `code` 时的组名.
    pub fn group_name(&self, var: &str, code: usize) -> DtiResult<&str> {
        let key = format!("{var}_{code}");
        self.group_names
            .get(&key)
            .map(String::as_str)
            .ok_or_else(|| DtiError::Missing(format!("组名 `{key}`")))
    }

    /// 所有 "忽略" 组名.
    fn ignore_names(&self) -> Vec<&str> {
        self.split_vars
            .iter()
            .filter_map(|v| self.group_names.get(&format!("{v}_{IGNORE}")))
            .map(String::as_str)
            .collect()
    }
}

/// 所有分析共用的被试掩膜: 排除 `exclude_columns` 非 0 的被试 (数据表中缺少的列被跳过)
/// 以及不在 `usable` 列表中的被试. `usable` 中的编号可以带 `t1` 后缀.
/// 若 `require_all_measures`, 还排除任一测量或协变量缺失的被试.
pub fn base_mask(table: &Table, usable: &[String], opts: &RandomiseOptions) -> DtiResult<Vec<bool>> {
    let ids = table.text("SubID")?;
    let usable: Vec<String> = usable.iter().map(|s| s.replace("t1", "").trim().to_string()).collect();
    let mut mask: Vec<bool> = ids.iter().map(|id| usable.contains(id)).collect();

    for col in &opts.exclude_columns {
        if !table.has(col) {
            log::warn!("exclusion column {col} not found");
            continue;
        }
        for (m, v) in mask.iter_mut().zip(table.num(col)?) {
            *m &= *v == 0.0;
        }
    }
    if opts.require_all_measures {
        for var in opts.measures.iter().chain(&opts.covars).unique() {
            for (m, v) in mask.iter_mut().zip(table.num(var)?) {
                *m &= *v != opts.missing;
            }
        }
    }
    Ok(mask)
}

/// randomise 设计的批量生成.
#[derive(Clone, Debug)]
pub struct RandomiseSetup {
    table: Table,
    usable: Vec<String>,
    options: RandomiseOptions,
}

/// 第 `code` 个分组排列, 即 `code` 的 `k` 位三进制表示 (高位在前).
fn split_permutation(mut code: usize, k: usize) -> Vec<usize> {
    let mut perm = vec![0; k];
    for p in perm.iter_mut().rev() {
        *p = code % SPLIT_CODES;
        code /= SPLIT_CODES;
    }
    perm
}

fn covar_combinations(covars: &[String]) -> Vec<Vec<&str>> {
    (0..=covars.len())
        .flat_map(|i| covars.iter().map(String::as_str).combinations(i))
        .collect()
}

impl RandomiseSetup {
    /// 构造. 数据表中缺少的派生列 (`SubID` 等) 会先补齐.
    pub fn new(mut table: Table, usable: Vec<String>, options: RandomiseOptions) -> DtiResult<Self> {
        table.derive_columns()?;
        if options.split_vars.is_empty() {
            return Err(DtiError::InvalidArgument("至少需要一个分组变量".to_string()));
        }
        Ok(Self {
            table,
            usable,
            options,
        })
    }

    /// 设计选项.
    #[inline]
    pub fn options(&self) -> &RandomiseOptions {
        &self.options
    }

    /// 对照组的服药列跟随当前排列; 忽略服药分组时对照组视为未服药.
    fn table_for(&self, perm: &[usize]) -> DtiResult<Table> {
        let mut table = self.table.clone();
        let meds = &self.options.meds_column;
        let Some(j) = self.options.split_vars.iter().position(|v| v == meds) else {
            return Ok(table);
        };
        if !table.has(meds) || !table.has("Depressed") {
            return Ok(table);
        }
        let value = if perm[j] < IGNORE { perm[j] as f64 } else { 0.0 };
        let column = table
            .num(meds)?
            .iter()
            .zip(table.num("Depressed")?)
            .map(|(&m, &d)| if d == 0.0 { value } else { m })
            .collect();
        table.set(meds, TableColumn::Num(column))?;
        Ok(table)
    }

    fn write_one(&self, design: Option<Design>, dir: &Path, ids: &[String]) -> DtiResult<usize> {
        match design {
            Some(d) => Ok(d.write(dir, ids)?.map_or(0, |_| 1)),
            None => Ok(0),
        }
    }

    fn write_group(&self, table: &Table, mask: &[bool], perm: &[usize], dir: &Path) -> DtiResult<usize> {
        let opts = &self.options;
        let ids = table.text("SubID")?;
        fs::create_dir_all(dir).map_err(|e| DtiError::io(dir, e))?;
        let subs: Vec<&String> = ids.iter().zip(mask).filter(|(_, m)| **m).map(|(id, _)| id).collect();
        let subs_text: String = subs.iter().map(|s| format!("{s}\n")).collect();
        let subs_t1_text: String = subs.iter().map(|s| format!("{s}t1\n")).collect();
        for (name, text) in [("subs", subs_text), ("subs_t1", subs_t1_text)] {
            let p = dir.join(name);
            fs::write(&p, text).map_err(|e| DtiError::io(&p, e))?;
        }

        let combos = covar_combinations(&opts.covars);
        let mut written = 0;
        for m in &opts.measures {
            for combo in combos.iter().filter(|c| !c.contains(&m.as_str())) {
                let d = correlation_design(table, mask, Some(m.as_str()), combo, opts.missing)?;
                written += self.write_one(d, dir, &ids)?;
            }
        }

        for (j, var) in opts.split_vars.iter().enumerate() {
            if perm[j] != IGNORE {
                continue;
            }
            let groups = (opts.group_name(var, 1)?, opts.group_name(var, 0)?);
            let measures = std::iter::once(None).chain(opts.measures.iter().map(|m| Some(m.as_str())));
            for m in measures {
                for combo in combos.iter().filter(|c| m.map_or(true, |m| !c.contains(&m))) {
                    for d in ttest_designs(table, mask, var, groups, m, combo, opts.missing)? {
                        written += self.write_one(Some(d), dir, &ids)?;
                    }
                }
            }
        }
        Ok(written)
    }

    /// 在 `out_dir/GLM` 下为每个分组排列生成一个目录, 写入相关与 t 检验设计,
    /// 最后删除内容重复的目录. 返回保留的目录.
    pub fn run<P: AsRef<Path>>(&self, out_dir: P) -> DtiResult<Vec<PathBuf>> {
        let glm_dir = out_dir.as_ref().join(GLM_DIR);
        let opts = &self.options;
        let base = base_mask(&self.table, &self.usable, opts)?;
        let k = opts.split_vars.len();

        let mut dirs = Vec::new();
        for code in 0..SPLIT_CODES.pow(k as u32) {
            let perm = split_permutation(code, k);
            let names = opts
                .split_vars
                .iter()
                .zip(&perm)
                .map(|(v, &p)| opts.group_name(v, p))
                .collect::<DtiResult<Vec<_>>>()?;
            let group_dir = glm_dir.join(names.join("_"));

            let table = self.table_for(&perm)?;
            let mut mask = base.clone();
            for (var, &p) in opts.split_vars.iter().zip(&perm) {
                if p == IGNORE {
                    continue;
                }
                for (m, v) in mask.iter_mut().zip(table.num(var)?) {
                    *m &= *v == p as f64;
                }
            }
            if !mask.iter().any(|&m| m) {
                log::debug!("no subjects in group {}", names.join("_"));
                continue;
            }
            let n = self.write_group(&table, &mask, &perm, &group_dir)?;
            log::info!("wrote {n} designs to {}", group_dir.display());
            dirs.push(group_dir);
        }

        let removed = dedupe_dirs(&dirs, &opts.ignore_names())?;
        dirs.retain(|d| !removed.contains(d));
        Ok(dirs)
    }
}

/// 两个目录是否包含同名且内容相同的文件 (忽略文件名含 `matlist` 的文件).
fn same_contents(a: &Path, b: &Path) -> DtiResult<bool> {
    let list = |d: &Path| -> DtiResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(d).map_err(|e| DtiError::io(d, e))? {
            let entry = entry.map_err(|e| DtiError::io(d, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.contains("matlist") {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    };
    let names = list(a)?;
    if names != list(b)? {
        return Ok(false);
    }
    for name in &names {
        let (pa, pb) = (a.join(name), b.join(name));
        let da = fs::read(&pa).map_err(|e| DtiError::io(&pa, e))?;
        let db = fs::read(&pb).map_err(|e| DtiError::io(&pb, e))?;
        if da != db {
            return Ok(false);
        }
    }
    Ok(true)
}

/// 删除内容重复的目录. 每对重复目录中保留名字里 "忽略" 组名较多的一个,
/// 一样多时保留排在前面的一个. 返回被删除的目录.
fn dedupe_dirs(dirs: &[PathBuf], ignore_names: &[&str]) -> DtiResult<Vec<PathBuf>> {
    let score = |d: &Path| {
        d.file_name()
            .map(|n| {
                n.to_string_lossy()
                    .split('_')
                    .filter(|part| ignore_names.contains(part))
                    .count()
            })
            .unwrap_or(0)
    };

    let mut removed: Vec<PathBuf> = Vec::new();
    for (a, b) in dirs.iter().tuple_combinations() {
        if removed.contains(a) || removed.contains(b) {
            continue;
        }
        if !same_contents(a, b)? {
            continue;
        }
        let victim = if score(b) > score(a) { a } else { b };
        fs::remove_dir_all(victim).map_err(|e| DtiError::io(victim, e))?;
        log::info!("removed duplicated design directory {}", victim.display());
        removed.push(victim.clone());
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPTIONS: &str = r#"
measures = ["Age"]
covars = ["Male"]
split_vars = ["Depressed", "Meds"]

[group_names]
Depressed_0 = "Ctrl"
Depressed_1 = "Dep"
Depressed_2 = "IgDep"
Meds_0 = "NoMed"
Meds_1 = "Med"
Meds_2 = "IgMed"
"#;

    const BEHAV: &str = "SubID,Depressed,Meds,Age,Male,AbnormalBrain,Braces\n\
                         1,0,0,10,1,0,0\n\
                         2,0,0,12,0,0,0\n\
                         3,1,0,14,1,0,0\n\
                         4,1,1,15,0,0,0\n\
                         5,1,1,11,1,0,0\n\
                         6,1,0,13,0,1,0\n";

    fn usable() -> Vec<String> {
        (1..=6).map(|i| format!("{i}t1")).collect()
    }

    #[test]
    fn test_options() {
        let o = RandomiseOptions::parse(OPTIONS, "opts.toml").unwrap();
        assert_eq!(o.split_vars, ["Depressed", "Meds"]);
        assert_eq!(o.missing, MISSING_CODE);
        assert_eq!(o.group_name("Meds", 2).unwrap(), "IgMed");
        assert!(o.group_name("Meds", 3).is_err());
        assert_eq!(o.ignore_names(), ["IgDep", "IgMed"]);
        assert!(RandomiseOptions::parse("measures = 1", "bad.toml").is_err());
    }

    #[test]
    fn test_split_permutation() {
        assert_eq!(split_permutation(0, 2), [0, 0]);
        assert_eq!(split_permutation(5, 2), [1, 2]);
        assert_eq!(split_permutation(8, 2), [2, 2]);
        assert_eq!(covar_combinations(&["a".to_string(), "b".to_string()]).len(), 4);
    }

    #[test]
    fn test_base_mask() {
        let t = Table::parse(BEHAV, "b.csv").unwrap();
        let mut o = RandomiseOptions::parse(OPTIONS, "o.toml").unwrap();
        let mut usable = usable();
        usable.retain(|s| s != "2t1");
        assert_eq!(
            base_mask(&t, &usable, &o).unwrap(),
            [true, false, true, true, true, false]
        );
        o.measures.push("Missing".to_string());
        o.require_all_measures = true;
        assert!(base_mask(&t, &usable, &o).is_err());
    }

    #[test]
    fn test_run() {
        let dir = tempfile::tempdir().unwrap();
        let t = Table::parse(BEHAV, "b.csv").unwrap();
        let o = RandomiseOptions::parse(OPTIONS, "o.toml").unwrap();
        let setup = RandomiseSetup::new(t, usable(), o).unwrap();
        let kept = setup.run(dir.path()).unwrap();
        let glm = dir.path().join(GLM_DIR);

        // 三个对照组目录内容相同, 只保留带忽略组名的一个.
        assert!(glm.join("Ctrl_IgMed").is_dir());
        assert!(!glm.join("Ctrl_Med").exists());
        assert!(!glm.join("Ctrl_NoMed").exists());
        assert!(kept.contains(&glm.join("Ctrl_IgMed")));
        assert!(!kept.contains(&glm.join("Ctrl_Med")));

        let all = glm.join("IgDep_IgMed");
        assert_eq!(fs::read_to_string(all.join("subs")).unwrap(), "1\n2\n3\n4\n5\n");
        assert!(fs::read_to_string(all.join("subs_t1")).unwrap().starts_with("1t1\n2t1\n"));
        assert!(all.join("TTest_DepCtrl.mat").exists());
        assert!(all.join("TTest_DepCtrl_Int_Age_Covar_Male.con").exists());
        assert!(all.join("TTest_MedNoMed.mat").exists());
        assert!(all.join("Corr_Age_Covar_Male.mat").exists());
        assert!(glm.join("Dep_Med/Corr_Age.mat").exists());
        // 单个被试的组中所有设计都是恒定 EV.
        assert!(!glm.join("Dep_NoMed/Corr_Age.mat").exists());
    }
}
