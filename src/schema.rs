use crate::error::{ExtractionError, Result};
use crate::grid::Column;
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SCAN_LIMIT: u32 = 3000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingValuePolicy {
    #[schemars(
        description = "Absent or non-numeric category cells produce no record and add nothing to the check sum. Non-numeric declared totals are recorded with a null value."
    )]
    #[default]
    Skip,

    #[schemars(
        description = "Absent or non-numeric cells, category and total alike, are recorded as 0.0."
    )]
    Zero,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct EntityBlock {
    #[schemars(description = "Reporting entity name as it should appear in the output (e.g. 'CONECEL S.A.')")]
    pub name: String,

    #[schemars(
        description = "Ordered category columns (spreadsheet letters). Position i corresponds to category i taken from the first block's header row."
    )]
    pub category_columns: Vec<Column>,

    #[schemars(description = "Column holding the entity's declared total")]
    pub total_column: Column,
}

impl EntityBlock {
    pub fn new(name: &str, category_columns: &[&str], total_column: &str) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            category_columns: category_columns
                .iter()
                .map(|c| c.parse())
                .collect::<Result<Vec<Column>>>()?,
            total_column: total_column.parse()?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct LayoutSpec {
    #[schemars(description = "Short dataset name used in logs (e.g. 'servicios')")]
    pub dataset: String,

    #[schemars(description = "Exact name of the worksheet holding the grid")]
    pub sheet: String,

    #[schemars(description = "1-based row holding the category headers of the first entity block")]
    pub header_row: u32,

    #[schemars(description = "1-based row of the first month to extract")]
    pub start_row: u32,

    #[schemars(description = "Column holding the month label")]
    pub date_column: Column,

    #[schemars(description = "Column holding the declared market total")]
    pub market_total_column: Column,

    #[schemars(description = "Entity blocks in output order")]
    pub blocks: Vec<EntityBlock>,

    #[schemars(
        description = "First-of-month date used as the anchor when the start row's date cell cannot be parsed"
    )]
    pub fallback_anchor: NaiveDate,

    #[serde(default)]
    #[schemars(description = "How absent or non-numeric value cells are recorded")]
    pub missing_values: MissingValuePolicy,

    #[serde(default = "default_scan_limit")]
    #[schemars(description = "Maximum number of rows scanned past start_row")]
    pub scan_limit: u32,
}

fn default_scan_limit() -> u32 {
    DEFAULT_SCAN_LIMIT
}

impl LayoutSpec {
    /// "Líneas activas por servicio": three operators with four service
    /// columns each, data from July 2014 onwards.
    pub fn active_lines_by_service() -> Result<Self> {
        Ok(Self {
            dataset: "servicios".to_string(),
            sheet: "Líneas por servicio".to_string(),
            header_row: 11,
            start_row: 79,
            date_column: "A".parse()?,
            market_total_column: "Q".parse()?,
            blocks: vec![
                EntityBlock::new("CONECEL S.A.", &["B", "C", "D", "E"], "F")?,
                EntityBlock::new("OTECEL S.A.", &["G", "H", "I", "J"], "K")?,
                EntityBlock::new("CNT EP", &["L", "M", "N", "O"], "P")?,
            ],
            fallback_anchor: anchor(2014, 7)?,
            missing_values: MissingValuePolicy::default(),
            scan_limit: DEFAULT_SCAN_LIMIT,
        })
    }

    /// "Líneas activas por modalidad": three operators with three modality
    /// columns each, data from December 2008 onwards.
    pub fn active_lines_by_modality() -> Result<Self> {
        Ok(Self {
            dataset: "modalidad".to_string(),
            sheet: "Lineas por modalidad".to_string(),
            header_row: 12,
            start_row: 13,
            date_column: "A".parse()?,
            market_total_column: "Q".parse()?,
            blocks: vec![
                EntityBlock::new("CONECEL S.A.", &["B", "C", "D"], "E")?,
                EntityBlock::new("OTECEL S.A.", &["F", "G", "H"], "I")?,
                EntityBlock::new("CNT EP", &["J", "K", "L"], "M")?,
            ],
            fallback_anchor: anchor(2008, 12)?,
            missing_values: MissingValuePolicy::default(),
            scan_limit: DEFAULT_SCAN_LIMIT,
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let layout: LayoutSpec = serde_json::from_str(json)?;
        layout.validate()?;
        Ok(layout)
    }

    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(LayoutSpec)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::json_schema())
    }

    pub fn with_missing_values(mut self, policy: MissingValuePolicy) -> Self {
        self.missing_values = policy;
        self
    }

    pub fn category_count(&self) -> usize {
        self.blocks
            .first()
            .map(|b| b.category_columns.len())
            .unwrap_or(0)
    }

    /// Last row the walker may look at (exclusive).
    pub fn scan_end(&self) -> u32 {
        self.start_row.saturating_add(self.scan_limit)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |details: String| ExtractionError::InvalidLayout {
            dataset: self.dataset.clone(),
            details,
        };

        if self.header_row == 0 || self.start_row == 0 {
            return Err(invalid(
                "Rows are 1-based; header_row and start_row must be at least 1".to_string(),
            ));
        }

        if self.start_row <= self.header_row {
            return Err(invalid(format!(
                "start_row {} must come after header_row {}",
                self.start_row, self.header_row
            )));
        }

        if self.scan_limit == 0 {
            return Err(invalid("scan_limit must be greater than zero".to_string()));
        }

        let Some(first) = self.blocks.first() else {
            return Err(invalid("At least one entity block is required".to_string()));
        };

        if first.category_columns.is_empty() {
            return Err(invalid(format!(
                "Entity block '{}' has no category columns",
                first.name
            )));
        }

        for block in &self.blocks[1..] {
            if block.category_columns.len() != first.category_columns.len() {
                return Err(invalid(format!(
                    "Entity block '{}' has {} category columns but '{}' has {}",
                    block.name,
                    block.category_columns.len(),
                    first.name,
                    first.category_columns.len()
                )));
            }
        }

        Ok(())
    }
}

fn anchor(year: i32, month: u32) -> Result<NaiveDate> {
    crate::utils::first_of_month(year, month)
        .ok_or_else(|| ExtractionError::DateError(format!("Invalid anchor {}-{}", year, month)))
}
