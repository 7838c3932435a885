//! 数据集目录约定与被试数据加载器.
//!
//! 数据根目录的组织方式为 `<root>/SUB_DATA/<subid>/DTI/MRI0`, 被试列表文件 `sublist`
//! 每行一个被试编号.

use crate::qc::SubjectMotion;
use crate::{DtiError, DtiResult};
use std::path::{Path, PathBuf};

/// 指定数据根目录的环境变量.
pub const DATA_DIR_ENV: &str = "DTI_DATA_DIR";

/// 被试数据子目录.
pub const SUB_DATA: &str = "SUB_DATA";

/// 被试目录下的 DTI 预处理目录.
pub const DTI_IDENTIFIER: [&str; 2] = ["DTI", "MRI0"];

/// 默认被试列表文件名.
pub const SUBLIST: &str = "sublist";

/// 获取 `{用户主目录}/dataset/dti` 目录.
pub fn home_dataset_dir() -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    ans.push("dti");
    Some(ans)
}

/// 获取 `{用户主目录}/dataset/dti` 目录下给定继续项组成的全路径.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = home_dataset_dir()?;
    ans.extend(it);
    Some(ans)
}

/// 数据根目录: 优先取环境变量 `DTI_DATA_DIR`, 否则为 `{用户主目录}/dataset/dti`.
pub fn data_dir() -> Option<PathBuf> {
    match std::env::var_os(DATA_DIR_ENV) {
        Some(v) if !v.is_empty() => Some(PathBuf::from(v)),
        _ => home_dataset_dir(),
    }
}

/// 定位被试的 DTI 目录. `subid` 可以包含 glob 通配符, 取第一个匹配项.
pub fn subject_dti_dir<P: AsRef<Path>>(data_dir: P, subid: &str) -> DtiResult<PathBuf> {
    let mut pattern = data_dir.as_ref().join(SUB_DATA);
    pattern.push(subid);
    pattern.extend(DTI_IDENTIFIER);
    let pattern = pattern.to_string_lossy().into_owned();
    let paths = glob::glob(&pattern)
        .map_err(|e| DtiError::InvalidArgument(format!("被试 `{subid}` 的路径模式无效: {e}")))?;
    paths
        .filter_map(Result::ok)
        .find(|p| p.is_dir())
        .ok_or_else(|| DtiError::Missing(format!("被试 `{subid}` 的 DTI 目录 ({pattern})")))
}

/// 读取被试列表.
#[inline]
pub fn read_sublist<P: AsRef<Path>>(path: P) -> DtiResult<Vec<String>> {
    crate::text::read_lines(path)
}

/// 从被试列表和数据根目录创建头动统计量加载器.
pub fn motion_loader<I: IntoIterator<Item = String>, P: AsRef<Path>>(subs: I, data_dir: P) -> MotionLoader {
    let mut subs: Vec<String> = subs.into_iter().collect();
    subs.reverse();
    MotionLoader {
        data_dir: data_dir.as_ref().to_owned(),
        subs_rev: subs,
    }
}

/// 被试头动统计量加载器, 按被试列表顺序迭代.
#[derive(Debug)]
pub struct MotionLoader {
    data_dir: PathBuf,
    subs_rev: Vec<String>,
}

impl Iterator for MotionLoader {
    type Item = (String, DtiResult<SubjectMotion>);

    fn next(&mut self) -> Option<Self::Item> {
        let sub = self.subs_rev.pop()?;
        let data = subject_dti_dir(&self.data_dir, &sub).and_then(|dir| SubjectMotion::load(&sub, dir));
        Some((sub, data))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.subs_rev.len(), Some(self.subs_rev.len()))
    }
}

impl ExactSizeIterator for MotionLoader {
    #[inline]
    fn len(&self) -> usize {
        self.subs_rev.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_subject_dti_dir() {
        let root = tempfile::tempdir().unwrap();
        let d = root.path().join("SUB_DATA/10001/DTI/MRI0");
        fs::create_dir_all(&d).unwrap();
        assert_eq!(subject_dti_dir(root.path(), "10001").unwrap(), d);
        assert_eq!(subject_dti_dir(root.path(), "1000*").unwrap(), d);
        assert!(matches!(
            subject_dti_dir(root.path(), "20002"),
            Err(DtiError::Missing(_))
        ));
    }

    #[test]
    fn test_home_dataset_dir_with() {
        if let Some(p) = home_dataset_dir_with(["a", "b"]) {
            assert!(p.ends_with("dataset/dti/a/b"));
        }
    }
}
