//! 纤维 (streamline) 文本文件.

use super::Point;
use crate::{DtiError, DtiResult};
use std::path::Path;

/// 一组纤维, 每条纤维是按追踪顺序排列的点 (世界坐标).
///
/// 文本格式: 每行一个点 `x y z`, 纤维之间以空行分隔, `#` 开头的行为注释.
///
/// ```text
/// 1.0 2.0 3.0
/// 1.5 2.0 3.0
///
/// 4.0 4.0 4.0
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Streamlines {
    lines: Vec<Vec<Point>>,
}

impl Streamlines {
    /// 直接由点列构造. 空纤维会被丢弃.
    pub fn new(lines: Vec<Vec<Point>>) -> Self {
        Self {
            lines: lines.into_iter().filter(|l| !l.is_empty()).collect(),
        }
    }

    /// 从文本解析. `origin` 仅用于错误信息.
    pub fn parse<P: AsRef<Path>>(text: &str, origin: P) -> DtiResult<Self> {
        let origin = origin.as_ref();
        let mut lines = Vec::new();
        let mut current = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            if line.is_empty() {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                continue;
            }
            let values: Vec<f64> = line
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|t| !t.is_empty())
                .map(str::parse::<f64>)
                .collect::<Result<_, _>>()
                .map_err(|_| DtiError::parse(origin, lineno + 1, "纤维坐标包含非数值"))?;
            let [x, y, z] = values.as_slice() else {
                return Err(DtiError::parse(origin, lineno + 1, "每个点需要 3 个坐标"));
            };
            current.push([*x, *y, *z]);
        }
        if !current.is_empty() {
            lines.push(current);
        }
        Ok(Self { lines })
    }

    /// 读取纤维文件.
    pub fn read<P: AsRef<Path>>(path: P) -> DtiResult<Self> {
        let path = path.as_ref();
        Self::parse(&crate::text::read_to_string(path)?, path)
    }

    /// 纤维条数.
    #[inline]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// 是否没有纤维.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// 按顺序迭代每条纤维.
    #[inline]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &[Point]> {
        self.lines.iter().map(Vec::as_slice)
    }

    /// 每条纤维的首尾两个端点. 只有一个点的纤维首尾相同.
    pub fn endpoints(&self) -> impl ExactSizeIterator<Item = (Point, Point)> + '_ {
        self.lines.iter().map(|l| (l[0], l[l.len() - 1]))
    }
}
