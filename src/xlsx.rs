//! Workbook loading backed by `calamine`.
//!
//! Only the named sheet of a layout is materialized; the extraction core then
//! reads it through the [`Grid`](crate::grid::Grid) trait like any other grid.

use crate::error::{ExtractionError, Result};
use crate::grid::{CellGrid, CellValue, Column};
use crate::schema::LayoutSpec;
use crate::{process_dataset, DatasetOutput};
use calamine::{open_workbook_auto, Data, Reader, Sheets};
use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub struct Workbook {
    path: PathBuf,
    sheets: Sheets<BufReader<File>>,
}

impl Workbook {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(ExtractionError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Workbook not found: {}", path.display()),
            )));
        }

        let sheets = open_workbook_auto(&path).map_err(|e| ExtractionError::Workbook {
            path: path.display().to_string(),
            details: e.to_string(),
        })?;

        Ok(Self { path, sheets })
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.sheet_names().to_vec()
    }

    /// Loads one sheet into memory. Rows in the returned grid are 1-based.
    pub fn sheet(&mut self, name: &str) -> Result<CellGrid> {
        let available = self.sheet_names();
        if !available.iter().any(|s| s == name) {
            return Err(ExtractionError::MissingSheet {
                sheet: name.to_string(),
                available,
            });
        }

        let range = self
            .sheets
            .worksheet_range(name)
            .map_err(|e| ExtractionError::Workbook {
                path: self.path.display().to_string(),
                details: e.to_string(),
            })?;

        let (row_offset, col_offset) = range.start().unwrap_or((0, 0));
        let mut grid = CellGrid::new();
        for (row, col, data) in range.used_cells() {
            let value = cell_from_data(data);
            if value.is_empty() {
                continue;
            }
            grid.set(
                row_offset + row as u32 + 1,
                Column::from_index(col_offset + col as u32),
                value,
            );
        }

        debug!(
            "Loaded sheet '{}' from {}: {} cells, last row {}",
            name,
            self.path.display(),
            grid.len(),
            grid.last_row()
        );
        Ok(grid)
    }
}

pub fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::String(s) => CellValue::Text(s.clone()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(datetime) => CellValue::DateTime(datetime),
            None => CellValue::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => parse_iso(s).unwrap_or_else(|| CellValue::Text(s.clone())),
        Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(e.to_string()),
    }
}

fn parse_iso(s: &str) -> Option<CellValue> {
    if let Ok(datetime) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(CellValue::DateTime(datetime));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(CellValue::Date)
}

/// Opens a workbook, loads the layout's sheet and runs the full pipeline.
pub fn open_dataset(path: impl AsRef<Path>, layout: &LayoutSpec) -> Result<DatasetOutput> {
    let path = path.as_ref();
    info!("Reading {} for dataset '{}'", path.display(), layout.dataset);

    let mut workbook = Workbook::open(path)?;
    let grid = workbook.sheet(&layout.sheet)?;
    process_dataset(&grid, layout)
}
