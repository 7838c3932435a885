//! `eddy_correct` 配准日志 (`.ecclog`) 的解析与头动参数计算.

use super::affine::{decompose, rms_diff, Affine};
use super::DispSeries;
use crate::consts::{files, rgb, RMS_RADIUS_MM};
use crate::plot::{time_series_figure, Series, TS_FIGURE_SIZE};
use crate::{DtiError, DtiResult};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// 按体积顺序排列的配准矩阵.
///
/// 日志中每个 `Final result:` 行之后紧跟 4 行, 每行 4 个数, 构成该体积的配准矩阵:
///
/// ```text
/// Final result:
/// 1.011887 -0.002517 0.010715 -1.205730
/// 0.002287 1.007846 0.002932 -1.780132
/// -0.012578 -0.000272 1.002718 1.177598
/// 0.000000 0.000000 0.000000 1.000000
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct RegistrationLog {
    matrices: Vec<Affine>,
}

/// 单个体积的头动参数.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MotionParams {
    /// 相对第一个体积的均方根位移 (mm).
    pub abs: f64,

    /// 相对上一个体积的均方根位移 (mm).
    pub rel: f64,

    /// 旋转角 (弧度).
    pub rotation: [f64; 3],

    /// 平移 (mm).
    pub translation: [f64; 3],
}

impl RegistrationLog {
    /// 从文本解析. `origin` 仅用于错误信息.
    pub fn parse<P: AsRef<Path>>(text: &str, origin: P) -> DtiResult<Self> {
        let origin = origin.as_ref();
        let lines: Vec<&str> = text.lines().collect();
        let mut matrices = Vec::new();

        for (n, line) in lines.iter().enumerate() {
            if !line.contains("Final") {
                continue;
            }
            let mut m = [[0.0; 4]; 4];
            for (r, row) in m.iter_mut().enumerate() {
                let lineno = n + 1 + r;
                let Some(text) = lines.get(lineno) else {
                    return Err(DtiError::parse(origin, lineno + 1, "配准矩阵不完整"));
                };
                let values: Vec<f64> = text
                    .split_whitespace()
                    .map(str::parse::<f64>)
                    .collect::<Result<_, _>>()
                    .map_err(|_| DtiError::parse(origin, lineno + 1, "配准矩阵包含非数值"))?;
                if values.len() != 4 {
                    return Err(DtiError::parse(
                        origin,
                        lineno + 1,
                        format!("配准矩阵每行需要 4 个数, 实际 {}", values.len()),
                    ));
                }
                row.copy_from_slice(&values);
            }
            matrices.push(Affine(m));
        }

        if matrices.is_empty() {
            return Err(DtiError::Empty(format!(
                "`{}` 中没有找到配准矩阵",
                origin.display()
            )));
        }
        Ok(Self { matrices })
    }

    /// 读取 `.ecclog` 文件.
    pub fn read<P: AsRef<Path>>(path: P) -> DtiResult<Self> {
        let path = path.as_ref();
        Self::parse(&crate::text::read_to_string(path)?, path)
    }

    /// 配准矩阵.
    #[inline]
    pub fn matrices(&self) -> &[Affine] {
        &self.matrices
    }

    /// 体积个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.matrices.len()
    }

    /// 是否为空. 成功解析的日志永不为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }

    /// 计算每个体积的头动参数.
    ///
    /// 绝对位移以第一个矩阵为参考, 相对位移以上一个矩阵为参考 (第一个体积为 0).
    /// `centre` 为 rms 球体中心 (mm), 一般取参考体积的质心.
    pub fn motion(&self, centre: [f64; 3], radius: f64) -> DtiResult<Vec<MotionParams>> {
        let reference = self.matrices[0];
        let mut previous = reference;
        let singular = |i: usize| DtiError::InvalidArgument(format!("第 {i} 个配准矩阵不可逆"));

        let mut ans = Vec::with_capacity(self.len());
        for (i, m) in self.matrices.iter().enumerate() {
            log::debug!("Timepoint {}", i + 1);
            let abs = rms_diff(m, &reference, centre, radius).ok_or_else(|| singular(0))?;
            let rel = rms_diff(m, &previous, centre, radius).ok_or_else(|| singular(i.max(1) - 1))?;
            let d = decompose(m);
            ans.push(MotionParams {
                abs,
                rel,
                rotation: d.rotation,
                translation: d.translation,
            });
            previous = *m;
        }
        Ok(ans)
    }

    /// 同 [`Self::motion`], 使用默认的 80mm 半径.
    #[inline]
    pub fn motion_default(&self, centre: [f64; 3]) -> DtiResult<Vec<MotionParams>> {
        self.motion(centre, RMS_RADIUS_MM)
    }
}

/// 以 `abs rel` 两列形式组织位移.
pub fn displacement_series(params: &[MotionParams]) -> DispSeries {
    let abs: Vec<f64> = params.iter().map(|p| p.abs).collect();
    let rel: Vec<f64> = params.iter().map(|p| p.rel).collect();
    DispSeries::from_values(&abs, &rel)
}

fn write_triples(path: &Path, rows: impl Iterator<Item = [f64; 3]>) -> DtiResult<()> {
    let file = fs::File::create(path).map_err(|e| DtiError::io(path, e))?;
    let mut w = BufWriter::new(file);
    for [x, y, z] in rows {
        writeln!(w, "{x:.6} {y:.6} {z:.6}").map_err(|e| DtiError::io(path, e))?;
    }
    w.flush().map_err(|e| DtiError::io(path, e))
}

/// 将头动参数写入 `dir` 下的 `ec_disp.txt`, `ec_rot.txt`, `ec_trans.txt`,
/// 并生成对应的 `.png` 时间序列图. 旧的输出会先被删除.
///
/// 返回写出的全部文件路径.
pub fn write_motion_outputs<P: AsRef<Path>>(dir: P, params: &[MotionParams]) -> DtiResult<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let disp_path = dir.join(files::EC_DISP);
    let rot_path = dir.join(files::EC_ROT);
    let trans_path = dir.join(files::EC_TRANS);
    for p in [&disp_path, &rot_path, &trans_path] {
        if p.exists() {
            fs::remove_file(p).map_err(|e| DtiError::io(p, e))?;
        }
    }

    let disp = displacement_series(params);
    disp.write(&disp_path)?;
    write_triples(&rot_path, params.iter().map(|p| p.rotation))?;
    write_triples(&trans_path, params.iter().map(|p| p.translation))?;

    let mut written = vec![disp_path.clone(), rot_path.clone(), trans_path.clone()];

    let disp_png = disp_path.with_extension("png");
    time_series_figure(
        TS_FIGURE_SIZE,
        &[
            Series { values: &disp.abs, color: rgb::BLUE },
            Series { values: &disp.rel, color: rgb::SECOND },
        ],
        None,
    )
    .save(&disp_png)?;
    written.push(disp_png);

    let axes = |f: fn(&MotionParams) -> [f64; 3]| -> [Vec<Option<f64>>; 3] {
        let mut out: [Vec<Option<f64>>; 3] = Default::default();
        for p in params {
            for (col, v) in out.iter_mut().zip(f(p)) {
                col.push(Some(v));
            }
        }
        out
    };
    for (path, cols) in [
        (&rot_path, axes(|p| p.rotation)),
        (&trans_path, axes(|p| p.translation)),
    ] {
        let png = path.with_extension("png");
        time_series_figure(
            TS_FIGURE_SIZE,
            &[
                Series { values: &cols[0], color: rgb::BLUE },
                Series { values: &cols[1], color: rgb::SECOND },
                Series { values: &cols[2], color: rgb::THIRD },
            ],
            None,
        )
        .save(&png)?;
        written.push(png);
    }

    log::info!("wrote motion parameters for {} volumes to {}", params.len(), dir.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "\
processing dti_ec_0000
Final result:
1.000000 0.000000 0.000000 0.000000
0.000000 1.000000 0.000000 0.000000
0.000000 0.000000 1.000000 0.000000
0.000000 0.000000 0.000000 1.000000

processing dti_ec_0001
Final result:
1.000000 0.000000 0.000000 3.000000
0.000000 1.000000 0.000000 4.000000
0.000000 0.000000 1.000000 0.000000
0.000000 0.000000 0.000000 1.000000

processing dti_ec_0002
Final result:
1.000000 0.000000 0.000000 3.000000
0.000000 1.000000 0.000000 4.000000
0.000000 0.000000 1.000000 12.000000
0.000000 0.000000 0.000000 1.000000
";

    #[test]
    fn test_parse() {
        let log = RegistrationLog::parse(LOG, "x.ecclog").unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log.matrices()[2].translation_part(), [3.0, 4.0, 12.0]);
    }

    #[test]
    fn test_parse_truncated() {
        let text = "Final result:\n1 0 0 0\n0 1 0 0\n";
        assert!(matches!(
            RegistrationLog::parse(text, "x"),
            Err(DtiError::Parse { line: 4, .. })
        ));
    }

    #[test]
    fn test_parse_empty() {
        assert!(matches!(
            RegistrationLog::parse("nothing here", "x"),
            Err(DtiError::Empty(_))
        ));
    }

    #[test]
    fn test_motion() {
        let log = RegistrationLog::parse(LOG, "x").unwrap();
        let m = log.motion_default([0.0; 3]).unwrap();
        let close = |a: f64, b: f64| (a - b).abs() < 1e-9;
        assert!(close(m[0].abs, 0.0) && close(m[0].rel, 0.0));
        assert!(close(m[1].abs, 5.0) && close(m[1].rel, 5.0));
        assert!(close(m[2].abs, 13.0) && close(m[2].rel, 12.0));
        assert_eq!(m[2].translation, [3.0, 4.0, 12.0]);
        assert_eq!(m[2].rotation, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_write_outputs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(files::EC_DISP), "stale\n").unwrap();
        let log = RegistrationLog::parse(LOG, "x").unwrap();
        let m = log.motion_default([0.0; 3]).unwrap();
        let written = write_motion_outputs(dir.path(), &m).unwrap();
        assert_eq!(written.len(), 6);
        for p in &written {
            assert!(p.exists(), "{}", p.display());
        }
        let disp = DispSeries::read(dir.path().join(files::EC_DISP)).unwrap();
        assert_eq!(disp.len(), 3);
        assert_eq!(disp.rel[2], Some(12.0));
    }
}
