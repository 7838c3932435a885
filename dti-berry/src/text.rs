//! 纯文本数值表格的读写.
//!
//! FSL 和 dipy 的大部分中间结果都以空白分隔的纯文本矩阵保存,
//! 这里提供读写这类文件的最小实现.

use crate::{DtiError, DtiResult};
use ndarray::{Array2, ArrayView2};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

/// 读取整个文本文件.
pub(crate) fn read_to_string<P: AsRef<Path>>(path: P) -> DtiResult<String> {
    let path = path.as_ref();
    fs::read_to_string(path).map_err(|e| DtiError::io(path, e))
}

/// 读取空白分隔的数值矩阵.
///
/// 空行和 `#` 开头的注释行会被跳过. 各行长度必须一致, 否则返回带行号的错误.
/// 只有一行时返回形状为 `(1, n)` 的矩阵.
pub fn load_txt<P: AsRef<Path>>(path: P) -> DtiResult<Array2<f64>> {
    let path = path.as_ref();
    parse_txt(&read_to_string(path)?, path)
}

/// 同 [`load_txt`], 但从内存中的文本解析. `origin` 仅用于错误信息.
pub fn parse_txt<P: AsRef<Path>>(text: &str, origin: P) -> DtiResult<Array2<f64>> {
    let origin = origin.as_ref();
    let mut width = None;
    let mut flat = Vec::new();
    let mut rows = 0usize;

    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let before = flat.len();
        for token in line.split(|c: char| c.is_whitespace() || c == ',') {
            if token.is_empty() {
                continue;
            }
            let v = token.parse::<f64>().map_err(|_| {
                DtiError::parse(origin, lineno + 1, format!("`{token}` 不是数值"))
            })?;
            flat.push(v);
        }
        let n = flat.len() - before;
        match width {
            None => width = Some(n),
            Some(w) if w != n => {
                return Err(DtiError::parse(
                    origin,
                    lineno + 1,
                    format!("该行有 {n} 列, 但之前的行有 {w} 列"),
                ))
            }
            _ => {}
        }
        rows += 1;
    }

    let width = width.ok_or_else(|| DtiError::Empty(format!("`{}`", origin.display())))?;
    Array2::from_shape_vec((rows, width), flat).map_err(|_| DtiError::Shape {
        expected: vec![rows, width],
        found: vec![rows * width],
    })
}

/// 按 `%.{precision}f` 格式保存矩阵, 列之间以 `delimiter` 分隔.
pub fn save_txt<P: AsRef<Path>>(
    path: P,
    m: ArrayView2<f64>,
    precision: usize,
    delimiter: &str,
) -> DtiResult<()> {
    let path = path.as_ref();
    let file = fs::File::create(path).map_err(|e| DtiError::io(path, e))?;
    let mut w = BufWriter::new(file);
    write_rows(&mut w, m, precision, delimiter).map_err(|e| DtiError::io(path, e))
}

/// 将矩阵逐行写入 `w`.
pub(crate) fn write_rows<W: Write>(
    w: &mut W,
    m: ArrayView2<f64>,
    precision: usize,
    delimiter: &str,
) -> std::io::Result<()> {
    for row in m.rows() {
        let line = row
            .iter()
            .map(|v| format!("{v:.precision$}"))
            .collect::<Vec<_>>()
            .join(delimiter);
        writeln!(w, "{line}")?;
    }
    w.flush()
}

/// 读取文件中所有非空行 (已去掉首尾空白). 常用于被试列表与路径列表.
pub fn read_lines<P: AsRef<Path>>(path: P) -> DtiResult<Vec<String>> {
    Ok(read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect())
}

/// 读取一维数值序列 (例如 bvals). 行列布局均可.
pub fn load_vector<P: AsRef<Path>>(path: P) -> DtiResult<Vec<f64>> {
    let m = load_txt(path)?;
    Ok(m.iter().copied().collect())
}

/// 确保 `path` 的父目录存在.
pub(crate) fn ensure_parent<P: AsRef<Path>>(path: P) -> DtiResult<()> {
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| DtiError::io(parent, e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_parse_square() {
        let m = parse_txt("1 2 3\n4 5 6\n\n# comment\n7\t8\t9\n", "mem").unwrap();
        assert_eq!(m, array![[1., 2., 3.], [4., 5., 6.], [7., 8., 9.]]);
    }

    #[test]
    fn test_parse_single_row() {
        let m = parse_txt("0 0 1000 1000\n", "bvals").unwrap();
        assert_eq!(m.shape(), &[1, 4]);
    }

    #[test]
    fn test_parse_ragged() {
        let err = parse_txt("1 2\n3\n", "mem").unwrap_err();
        assert!(matches!(err, DtiError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_parse_not_number() {
        let err = parse_txt("1 x\n", "mem").unwrap_err();
        assert!(matches!(err, DtiError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_parse_empty() {
        assert!(matches!(parse_txt("\n\n", "mem"), Err(DtiError::Empty(_))));
    }

    #[test]
    fn test_save_format() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("m.txt");
        save_txt(&p, array![[1.0, 0.5], [2.0, 1.0 / 3.0]].view(), 5, "\t").unwrap();
        let s = std::fs::read_to_string(&p).unwrap();
        assert_eq!(s, "1.00000\t0.50000\n2.00000\t0.33333\n");
    }

    #[test]
    fn test_read_lines_skips_blank() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("subs");
        std::fs::write(&p, "  10001 \n\n10002\n").unwrap();
        assert_eq!(read_lines(&p).unwrap(), vec!["10001", "10002"]);
    }
}
