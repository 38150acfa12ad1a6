//! Read-only spreadsheet access.
//!
//! The extraction core never opens files itself; it reads cells through the
//! [`Grid`] trait. [`CellGrid`] is the in-memory implementation used both by
//! the workbook loader and by tests.

use crate::error::{ExtractionError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Highest column a worksheet can address (`XFD`).
const MAX_COLUMNS: u32 = 16_384;

/// A zero-based column index, written in configuration as spreadsheet letters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Column(u32);

impl Column {
    pub fn from_index(index: u32) -> Self {
        Self(index)
    }

    pub fn index(&self) -> u32 {
        self.0
    }

    pub fn letters(&self) -> String {
        let mut n = self.0 + 1;
        let mut letters = Vec::new();
        while n > 0 {
            n -= 1;
            letters.push((b'A' + (n % 26) as u8) as char);
            n /= 26;
        }
        letters.iter().rev().collect()
    }
}

impl FromStr for Column {
    type Err = ExtractionError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ExtractionError::InvalidColumn(s.to_string()));
        }

        let mut index: u32 = 0;
        for c in trimmed.chars() {
            let digit = (c.to_ascii_uppercase() as u8 - b'A') as u32 + 1;
            index = index
                .checked_mul(26)
                .and_then(|i| i.checked_add(digit))
                .filter(|i| *i <= MAX_COLUMNS)
                .ok_or_else(|| ExtractionError::InvalidColumn(s.to_string()))?;
        }

        Ok(Self(index - 1))
    }
}

impl TryFrom<String> for Column {
    type Error = ExtractionError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Column> for String {
    fn from(column: Column) -> Self {
        column.letters()
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.letters())
    }
}

impl JsonSchema for Column {
    fn schema_name() -> String {
        "Column".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        String::json_schema(gen)
    }
}

/// An A1-style reference such as `B13`. Rows are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRef {
    pub row: u32,
    pub column: Column,
}

impl FromStr for CellRef {
    type Err = ExtractionError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| ExtractionError::InvalidCellRef(s.to_string()))?;
        let (letters, digits) = trimmed.split_at(split);

        let column = letters
            .parse::<Column>()
            .map_err(|_| ExtractionError::InvalidCellRef(s.to_string()))?;
        let row = digits
            .parse::<u32>()
            .ok()
            .filter(|r| *r >= 1)
            .ok_or_else(|| ExtractionError::InvalidCellRef(s.to_string()))?;

        Ok(Self { row, column })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.column, self.row)
    }
}

/// A typed raw cell value as delivered by the workbook reader.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl CellValue {
    /// Absent cells and whitespace-only text both count as empty.
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Numeric coercion: numbers pass through, text is trimmed and parsed,
    /// everything else is unparsable.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Textual form of the cell, `None` when empty.
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Empty => None,
            CellValue::Text(s) if s.trim().is_empty() => None,
            CellValue::Text(s) => Some(s.trim().to_string()),
            CellValue::Number(n) => Some(n.to_string()),
            CellValue::Bool(b) => Some(b.to_string()),
            CellValue::Date(d) => Some(d.to_string()),
            CellValue::DateTime(dt) => Some(dt.to_string()),
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        CellValue::Date(value)
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(value: NaiveDateTime) -> Self {
        CellValue::DateTime(value)
    }
}

/// Random read access to one sheet. `row` is the 1-based spreadsheet row.
pub trait Grid {
    fn cell(&self, row: u32, column: Column) -> Option<&CellValue>;

    fn is_empty_at(&self, row: u32, column: Column) -> bool {
        self.cell(row, column).map_or(true, CellValue::is_empty)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CellGrid {
    cells: HashMap<(u32, u32), CellValue>,
    last_row: u32,
}

impl CellGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, row: u32, column: Column, value: impl Into<CellValue>) {
        let value = value.into();
        if matches!(value, CellValue::Empty) {
            self.cells.remove(&(row, column.index()));
            return;
        }
        self.last_row = self.last_row.max(row);
        self.cells.insert((row, column.index()), value);
    }

    /// Sets a cell by A1 reference, e.g. `grid.set_a1("Q79", 1250.0)`.
    pub fn set_a1(&mut self, reference: &str, value: impl Into<CellValue>) -> Result<()> {
        let cell: CellRef = reference.parse()?;
        self.set(cell.row, cell.column, value);
        Ok(())
    }

    pub fn last_row(&self) -> u32 {
        self.last_row
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl Grid for CellGrid {
    fn cell(&self, row: u32, column: Column) -> Option<&CellValue> {
        self.cells.get(&(row, column.index()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letters_round_trip() {
        assert_eq!("A".parse::<Column>().unwrap().index(), 0);
        assert_eq!("q".parse::<Column>().unwrap().index(), 16);
        assert_eq!("AA".parse::<Column>().unwrap().index(), 26);
        assert_eq!("XFD".parse::<Column>().unwrap().index(), 16_383);
        assert_eq!(Column::from_index(27).letters(), "AB");
    }

    #[test]
    fn test_invalid_columns_are_rejected() {
        assert!("".parse::<Column>().is_err());
        assert!("B2".parse::<Column>().is_err());
        assert!("XFE".parse::<Column>().is_err());
        assert!("ÑA".parse::<Column>().is_err());
    }

    #[test]
    fn test_cell_ref_parsing() {
        let cell: CellRef = "Q79".parse().unwrap();
        assert_eq!(cell.row, 79);
        assert_eq!(cell.column.letters(), "Q");
        assert_eq!(cell.to_string(), "Q79");

        assert!("79".parse::<CellRef>().is_err());
        assert!("Q0".parse::<CellRef>().is_err());
        assert!("Q".parse::<CellRef>().is_err());
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(CellValue::Number(3.5).as_number(), Some(3.5));
        assert_eq!(CellValue::from(" 1200 ").as_number(), Some(1200.0));
        assert_eq!(CellValue::from("n/d").as_number(), None);
        assert_eq!(CellValue::Bool(true).as_number(), None);
        assert_eq!(CellValue::Empty.as_number(), None);
    }

    #[test]
    fn test_emptiness() {
        assert!(CellValue::Empty.is_empty());
        assert!(CellValue::from("   ").is_empty());
        assert!(!CellValue::from(0.0).is_empty());

        let mut grid = CellGrid::new();
        grid.set_a1("A13", "Ene 2009").unwrap();
        assert!(!grid.is_empty_at(13, "A".parse().unwrap()));
        assert!(grid.is_empty_at(14, "A".parse().unwrap()));
        assert_eq!(grid.last_row(), 13);
    }

    #[test]
    fn test_setting_empty_clears_cell() {
        let mut grid = CellGrid::new();
        grid.set_a1("B2", 5.0).unwrap();
        grid.set_a1("B2", CellValue::Empty).unwrap();
        assert!(grid.is_empty());
    }
}
