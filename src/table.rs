use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use calamine::{Data, Reader, Xlsx, open_workbook};
use rust_xlsxwriter::Workbook;
use time::OffsetDateTime;
use time::macros::format_description;

use crate::models::MetricSummary;

/// Infix separating the method name from the timestamp in table file names
pub const TABLE_INFIX: &str = "_cell_segmentation_";

pub const TABLE_EXTENSION: &str = "xlsx";

/// One file's statistics, aligned with `MetricTable::columns`
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    pub file: String,
    pub values: Vec<f64>,
}

/// Per-file metric rows for one method at one cutoff
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricTable {
    pub columns: Vec<String>,
    pub rows: Vec<MetricRow>,
}

impl MetricTable {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, file: impl Into<String>, values: Vec<f64>) -> Result<()> {
        if values.len() != self.columns.len() {
            anyhow::bail!(
                "row has {} values but table has {} columns",
                values.len(),
                self.columns.len()
            );
        }
        self.rows.push(MetricRow {
            file: file.into(),
            values,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Remove every listed column that is present
    pub fn drop_columns(&mut self, names: &[&str]) {
        let keep: Vec<bool> = self
            .columns
            .iter()
            .map(|c| !names.contains(&c.as_str()))
            .collect();
        let filter = |values: &[f64]| -> Vec<f64> {
            values
                .iter()
                .zip(&keep)
                .filter(|(_, k)| **k)
                .map(|(v, _)| *v)
                .collect()
        };
        for row in &mut self.rows {
            row.values = filter(&row.values);
        }
        self.columns = self
            .columns
            .iter()
            .zip(&keep)
            .filter(|(_, k)| **k)
            .map(|(c, _)| c.clone())
            .collect();
    }

    /// Replace row keys, e.g. with DT basenames
    pub fn set_index(&mut self, names: &[String]) -> Result<()> {
        if names.len() != self.rows.len() {
            anyhow::bail!(
                "index has {} names but table has {} rows",
                names.len(),
                self.rows.len()
            );
        }
        for (row, name) in self.rows.iter_mut().zip(names) {
            row.file = name.clone();
        }
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| r.values[idx]).collect())
    }

    /// Column means, skipping NaN cells; an all-NaN column stays NaN
    pub fn mean(&self) -> MetricSummary {
        let mut out = BTreeMap::new();
        for (idx, name) in self.columns.iter().enumerate() {
            let (sum, count) = self
                .rows
                .iter()
                .map(|r| r.values[idx])
                .filter(|v| !v.is_nan())
                .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            let mean = if count == 0 { f64::NAN } else { sum / count as f64 };
            out.insert(name.clone(), mean);
        }
        MetricSummary(out)
    }
}

/// Reads and writes `<method>_cell_segmentation_<timestamp>.xlsx` tables.
///
/// One sheet: a header row of metric names after an empty index cell, then one
/// row per file keyed by its DT basename. NaN cells are left blank.
#[derive(Debug, Clone)]
pub struct TableStore {
    dir: PathBuf,
}

impl TableStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write(&self, method: &str, table: &MetricTable) -> Result<PathBuf> {
        let path = self
            .dir
            .join(format!("{}{}{}.{}", method, TABLE_INFIX, timestamp()?, TABLE_EXTENSION));

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        let fail = |e: rust_xlsxwriter::XlsxError| anyhow::anyhow!("Failed to write table {:?}: {}", path, e);
        for (i, name) in table.columns.iter().enumerate() {
            sheet.write_string(0, u16::try_from(i + 1)?, name).map_err(fail)?;
        }
        for (r, row) in table.rows.iter().enumerate() {
            let r = u32::try_from(r + 1)?;
            sheet.write_string(r, 0, &row.file).map_err(fail)?;
            for (i, value) in row.values.iter().enumerate() {
                if value.is_finite() {
                    sheet.write_number(r, u16::try_from(i + 1)?, *value).map_err(fail)?;
                }
            }
        }
        workbook.save(&path).map_err(fail)?;
        Ok(path)
    }

    /// Every persisted table in the directory, keyed by method, sorted by file name
    pub fn read_all(&self) -> Result<Vec<(String, MetricTable)>> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list {:?}", self.dir))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| method_of(p).is_some())
            .collect();
        paths.sort();

        let mut out = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(method) = method_of(&path) else {
                continue;
            };
            out.push((method, read_table(&path)?));
        }
        Ok(out)
    }
}

/// Parse one table written by [`TableStore::write`]
pub fn read_table(path: &Path) -> Result<MetricTable> {
    let mut workbook: Xlsx<_> = open_workbook(path)
        .map_err(|e| anyhow::anyhow!("Failed to open table {:?}: {}", path, e))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow::anyhow!("Table {:?} has no sheets", path))?
        .map_err(|e| anyhow::anyhow!("Failed to read table {:?}: {}", path, e))?;

    // The range starts at the first used cell, so shift back to sheet columns
    let Some((first_row, first_col)) = range.start() else {
        return Ok(MetricTable::default());
    };
    let first_col = first_col as usize;
    let mut rows = range.rows();
    let header = if first_row == 0 { rows.next().unwrap_or(&[]) } else { &[] };

    let metric_cells: Vec<usize> = (0..header.len()).filter(|j| first_col + j >= 1).collect();
    let mut table = MetricTable::new(metric_cells.iter().map(|&j| cell_text(&header[j])));
    for row in rows {
        let file = if first_col == 0 {
            row.first().map(cell_text).unwrap_or_default()
        } else {
            String::new()
        };
        let values = metric_cells
            .iter()
            .map(|&j| row.get(j).map(cell_number).unwrap_or(f64::NAN))
            .collect();
        table.push_row(file, values)?;
    }
    Ok(table)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Float(v) => v.to_string(),
        Data::Int(v) => v.to_string(),
        _ => String::new(),
    }
}

fn cell_number(cell: &Data) -> f64 {
    match cell {
        Data::Float(v) => *v,
        Data::Int(v) => *v as f64,
        _ => f64::NAN,
    }
}

/// Method name encoded in a table file name
pub fn method_of(path: &Path) -> Option<String> {
    if path.extension().and_then(|s| s.to_str()) != Some(TABLE_EXTENSION) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let (method, _) = stem.rsplit_once(TABLE_INFIX)?;
    Some(method.to_string())
}

/// Local time as `YYYYmmdd_HHMMSS`, UTC when the offset is unknown
pub fn timestamp() -> Result<String> {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    Ok(now.format(format_description!(
        "[year][month][day]_[hour][minute][second]"
    ))?)
}
