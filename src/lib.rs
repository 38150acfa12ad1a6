//! # Monthly Series Extractor
//!
//! A library for turning fixed-layout monthly spreadsheets (one row per month,
//! one column block per reporting entity) into long-format records, while
//! cross-checking every declared subtotal against the sum it should equal.
//!
//! ## Core Concepts
//!
//! - **Layout**: A [`LayoutSpec`] names the sheet, header row, first data row,
//!   date and market-total columns, and the entity blocks to read
//! - **Sequenced dates**: Row `i` is always `anchor + i months`; noisy labels are
//!   audited, never trusted
//! - **Check records**: Recomputed sums are emitted next to declared totals so the
//!   reconciliation step can compare them
//! - **Two views**: An audit view with every record and a fact view without checks
//!
//! ## Example
//!
//! ```rust,ignore
//! use monthly_series_extractor::*;
//!
//! let layout = LayoutSpec::active_lines_by_modality()?;
//! let output = open_dataset("1.1.2-Lineas-activas-por-modalidad.xlsx", &layout)?;
//!
//! output.report.log_findings(20);
//! for record in &output.facts {
//!     println!("{} {} {} {:?}", record.date, record.entity, record.category, record.value);
//! }
//! ```

pub mod dates;
pub mod engine;
pub mod error;
pub mod grid;
pub mod projection;
pub mod reconciliation;
pub mod schema;
pub mod utils;
pub mod walker;

#[cfg(feature = "xlsx")]
pub mod xlsx;

pub use dates::{normalize_label, DateResolver};
pub use engine::{read_categories, Extraction, Extractor, RecordExtractor};
pub use error::{ExtractionError, Result};
pub use grid::{CellGrid, CellRef, CellValue, Column, Grid};
pub use projection::{OutputProjector, ProjectedOutput};
pub use reconciliation::{
    ReconciliationEntry, ReconciliationReport, ReconciliationScope, ReconciliationValidator,
    DEFAULT_TOLERANCE,
};
pub use schema::*;
pub use utils::*;
pub use walker::{GridWalker, EMPTY_ROW_STREAK};

#[cfg(feature = "xlsx")]
pub use xlsx::{open_dataset, Workbook};

use chrono::NaiveDate;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity name of the synthetic market-wide aggregate.
pub const MARKET_ENTITY: &str = "TOTAL_MARKET";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Category {
    /// A real category label taken from the header row
    Named(String),
    /// Declared total of one entity block
    TotalEntity,
    /// Recomputed sum of one entity's category values
    CheckSumCategories,
    /// Declared market total
    TotalMarket,
    /// Recomputed sum of declared entity totals
    CheckSumEntityTotals,
}

impl Category {
    pub fn as_str(&self) -> &str {
        match self {
            Category::Named(name) => name,
            Category::TotalEntity => "TOTAL_ENTITY",
            Category::CheckSumCategories => "CHECK_SUM_CATEGORIES",
            Category::TotalMarket => "TOTAL_MARKET",
            Category::CheckSumEntityTotals => "CHECK_SUM_ENTITY_TOTALS",
        }
    }

    /// Recomputed sums exist only for reconciliation.
    pub fn is_check(&self) -> bool {
        matches!(
            self,
            Category::CheckSumCategories | Category::CheckSumEntityTotals
        )
    }

    pub fn is_declared_total(&self) -> bool {
        matches!(self, Category::TotalEntity | Category::TotalMarket)
    }
}

impl From<String> for Category {
    fn from(value: String) -> Self {
        match value.as_str() {
            "TOTAL_ENTITY" => Category::TotalEntity,
            "CHECK_SUM_CATEGORIES" => Category::CheckSumCategories,
            "TOTAL_MARKET" => Category::TotalMarket,
            "CHECK_SUM_ENTITY_TOTALS" => Category::CheckSumEntityTotals,
            _ => Category::Named(value),
        }
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        match category {
            Category::Named(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value for one month, entity and category. Field order is the output
/// column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthRecord {
    pub date: NaiveDate,
    pub entity: String,
    pub category: Category,
    pub value: Option<f64>,
    pub source_row: u32,
}

/// How the literal label of one processed row compares with its sequenced date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateQualityEntry {
    pub source_row: u32,
    pub raw_value: Option<String>,
    pub expected_date: NaiveDate,
    pub parsed_date: Option<NaiveDate>,
    pub unparseable: bool,
    pub mismatch: bool,
}

impl DateQualityEntry {
    pub fn is_finding(&self) -> bool {
        self.unparseable || self.mismatch
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetOutput {
    pub dataset: String,
    pub anchor_date: NaiveDate,
    pub months_processed: usize,
    pub categories: Vec<String>,
    /// Every record, checks included
    pub audit: Vec<MonthRecord>,
    /// Records for consumers, checks removed
    pub facts: Vec<MonthRecord>,
    pub report: ReconciliationReport,
    /// The walk stopped at the scan limit rather than at an empty streak
    pub hit_scan_limit: bool,
}

pub struct DatasetProcessor;

impl DatasetProcessor {
    pub fn process<G: Grid + ?Sized>(grid: &G, layout: &LayoutSpec) -> Result<DatasetOutput> {
        Self::process_with_tolerance(grid, layout, DEFAULT_TOLERANCE)
    }

    pub fn process_with_tolerance<G: Grid + ?Sized>(
        grid: &G,
        layout: &LayoutSpec,
        tolerance: f64,
    ) -> Result<DatasetOutput> {
        layout.validate()?;

        info!("Processing dataset '{}' (sheet '{}')", layout.dataset, layout.sheet);
        debug!(
            "Layout has {} entity blocks of {} categories, data from row {}",
            layout.blocks.len(),
            layout.category_count(),
            layout.start_row
        );

        let extraction = Extractor::new(layout).run(grid)?;

        let validator = ReconciliationValidator::new(tolerance);
        let report = validator.report(&extraction.records, &extraction.date_quality);

        let months_processed = extraction.months_processed();
        let hit_scan_limit = extraction.hit_scan_limit;
        let ProjectedOutput { audit, facts } = OutputProjector::project(extraction.records);

        debug!(
            "[{}] {} audit records, {} fact records",
            layout.dataset,
            audit.len(),
            facts.len()
        );

        Ok(DatasetOutput {
            dataset: layout.dataset.clone(),
            anchor_date: extraction.anchor_date,
            months_processed,
            categories: extraction.categories,
            audit,
            facts,
            report,
            hit_scan_limit,
        })
    }
}

pub fn process_dataset<G: Grid + ?Sized>(grid: &G, layout: &LayoutSpec) -> Result<DatasetOutput> {
    DatasetProcessor::process(grid, layout)
}
