//! 带表头的行为数据表 (CSV 或 TSV).

use crate::consts::MISSING_CODE;
use crate::{DtiError, DtiResult};
use std::path::Path;

/// 数据表中的一列.
#[derive(Clone, Debug, PartialEq)]
pub enum TableColumn {
    /// 数值列, 空单元格记为缺失码.
    Num(Vec<f64>),

    /// 文本列.
    Text(Vec<String>),
}

impl TableColumn {
    fn len(&self) -> usize {
        match self {
            TableColumn::Num(v) => v.len(),
            TableColumn::Text(v) => v.len(),
        }
    }

    fn cell(&self, i: usize) -> String {
        match self {
            TableColumn::Num(v) => format_number(v[i]),
            TableColumn::Text(v) => v[i].clone(),
        }
    }
}

/// 整数值不带小数点.
pub(crate) fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

/// 治疗组名称, 下标即 `TreatmentArm` 的取值.
const TREATMENT_GROUPS: [&str; 4] = ["Control", "CBT", "STPP", "SCC"];

/// 按列存储的数据表.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<TableColumn>,
    rows: usize,
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(s)
}

impl Table {
    /// 解析文本. 表头含制表符时按 TSV 解析, 否则按 CSV.
    pub fn parse<P: AsRef<Path>>(text: &str, origin: P) -> DtiResult<Self> {
        let origin = origin.as_ref();
        let mut lines = text
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty());
        let (_, header) = lines
            .next()
            .ok_or_else(|| DtiError::Empty(format!("`{}`", origin.display())))?;
        let delim = if header.contains('\t') { '\t' } else { ',' };
        let names: Vec<String> = header.split(delim).map(|s| unquote(s).to_string()).collect();

        let mut cells: Vec<Vec<String>> = vec![Vec::new(); names.len()];
        for (no, line) in lines {
            let row: Vec<&str> = line.split(delim).map(unquote).collect();
            if row.len() != names.len() {
                return Err(DtiError::parse(
                    origin,
                    no + 1,
                    format!("期望 {} 列, 实际 {} 列", names.len(), row.len()),
                ));
            }
            for (col, v) in cells.iter_mut().zip(row) {
                col.push(v.to_string());
            }
        }

        let rows = cells.first().map_or(0, Vec::len);
        let columns = cells
            .into_iter()
            .map(|col| {
                let parsed: Option<Vec<f64>> = col
                    .iter()
                    .map(|s| if s.is_empty() { Some(MISSING_CODE) } else { s.parse().ok() })
                    .collect();
                match parsed {
                    Some(v) if col.iter().any(|s| !s.is_empty()) => TableColumn::Num(v),
                    _ => TableColumn::Text(col),
                }
            })
            .collect();
        Ok(Self { names, columns, rows })
    }

    /// 读取文件.
    pub fn read<P: AsRef<Path>>(path: P) -> DtiResult<Self> {
        let path = path.as_ref();
        Self::parse(&crate::text::read_to_string(path)?, path)
    }

    /// 行数.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows
    }

    /// 是否没有数据行.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// 列名.
    #[inline]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// 是否有名为 `name` 的列.
    #[inline]
    pub fn has(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    fn index(&self, name: &str) -> DtiResult<usize> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| DtiError::Missing(format!("数据表中没有 `{name}` 列")))
    }

    /// 数值列.
    pub fn num(&self, name: &str) -> DtiResult<&[f64]> {
        match &self.columns[self.index(name)?] {
            TableColumn::Num(v) => Ok(v),
            TableColumn::Text(_) => Err(DtiError::InvalidArgument(format!("`{name}` 列不是数值列"))),
        }
    }

    /// 任意列, 数值按整数格式化.
    pub fn text(&self, name: &str) -> DtiResult<Vec<String>> {
        let c = &self.columns[self.index(name)?];
        Ok((0..self.rows).map(|i| c.cell(i)).collect())
    }

    /// 添加或替换一列.
    pub fn set(&mut self, name: &str, column: TableColumn) -> DtiResult<()> {
        if column.len() != self.rows {
            return Err(DtiError::Shape {
                expected: vec![self.rows],
                found: vec![column.len()],
            });
        }
        match self.index(name) {
            Ok(i) => self.columns[i] = column,
            Err(_) => {
                self.names.push(name.to_string());
                self.columns.push(column);
            }
        }
        Ok(())
    }

    /// 补齐派生列 (已存在的列保持不变):
    ///
    /// - `SubID`: `ParticipantID` 去掉首尾的 `M`;
    /// - `TreatmentArm`: `TreatmentGroup` 为 Control/CBT/STPP/SCC 时取 0..3, 否则为缺失码;
    /// - `Depressed`: `TreatmentArm > 0` 时为 1, 否则同 `TreatmentArm`;
    /// - `Male`: `Sex` 为 M/F 时取 1/0, 否则为缺失码.
    ///
    /// 缺少来源列的派生列被跳过.
    pub fn derive_columns(&mut self) -> DtiResult<()> {
        if !self.has("SubID") && self.has("ParticipantID") {
            let ids = self
                .text("ParticipantID")?
                .iter()
                .map(|s| s.trim_matches('M').parse::<f64>().unwrap_or(MISSING_CODE))
                .collect();
            self.set("SubID", TableColumn::Num(ids))?;
        }
        if !self.has("TreatmentArm") && self.has("TreatmentGroup") {
            let arm = self
                .text("TreatmentGroup")?
                .iter()
                .map(|g| {
                    TREATMENT_GROUPS
                        .iter()
                        .position(|t| t == g)
                        .map_or(MISSING_CODE, |i| i as f64)
                })
                .collect();
            self.set("TreatmentArm", TableColumn::Num(arm))?;
        }
        if !self.has("Depressed") && self.has("TreatmentArm") {
            let dep = self
                .num("TreatmentArm")?
                .iter()
                .map(|&a| if a > 0.0 { 1.0 } else { a })
                .collect();
            self.set("Depressed", TableColumn::Num(dep))?;
        }
        if !self.has("Male") && self.has("Sex") {
            let male = self
                .text("Sex")?
                .iter()
                .map(|s| match s.as_str() {
                    "M" => 1.0,
                    "F" => 0.0,
                    _ => MISSING_CODE,
                })
                .collect();
            self.set("Male", TableColumn::Num(male))?;
        }
        Ok(())
    }

    /// 以 `key` 列左连接 `other` 的全部其他列. 未匹配的单元格记为缺失码 (文本列为空串).
    ///
    /// 给定 `flag` 时另加一列: 合并进来的数值中任一不是缺失码即为 1, 否则为 0.
    pub fn merge_left(&mut self, other: &Table, key: &str, flag: Option<&str>) -> DtiResult<()> {
        let keys = self.text(key)?;
        let other_keys = other.text(key)?;
        let lookup: Vec<Option<usize>> = keys
            .iter()
            .map(|k| other_keys.iter().position(|o| o == k))
            .collect();

        let mut present = vec![false; self.rows];
        for (name, col) in other.names.iter().zip(&other.columns) {
            if name == key {
                continue;
            }
            let merged = match col {
                TableColumn::Num(v) => {
                    let m: Vec<f64> = lookup.iter().map(|j| j.map_or(MISSING_CODE, |j| v[j])).collect();
                    for (p, x) in present.iter_mut().zip(&m) {
                        *p |= *x != MISSING_CODE;
                    }
                    TableColumn::Num(m)
                }
                TableColumn::Text(v) => {
                    TableColumn::Text(lookup.iter().map(|j| j.map(|j| v[j].clone()).unwrap_or_default()).collect())
                }
            };
            self.set(name, merged)?;
        }
        if let Some(flag) = flag {
            let f = present.iter().map(|&p| if p { 1.0 } else { 0.0 }).collect();
            self.set(flag, TableColumn::Num(f))?;
        }
        Ok(())
    }
}
