use crate::dates::DateResolver;
use crate::error::Result;
use crate::grid::{CellValue, Grid};
use crate::schema::{LayoutSpec, MissingValuePolicy};
use crate::utils::add_months;
use crate::walker::GridWalker;
use crate::{Category, DateQualityEntry, MonthRecord, MARKET_ENTITY};
use chrono::NaiveDate;
use log::{debug, info};

/// Result of walking one sheet: every record in emission order plus the
/// date audit trail.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub anchor_date: NaiveDate,
    /// False when the start row's label was unusable and the layout fallback was taken.
    pub anchor_parsed: bool,
    pub categories: Vec<String>,
    pub records: Vec<MonthRecord>,
    pub date_quality: Vec<DateQualityEntry>,
    pub hit_scan_limit: bool,
}

impl Extraction {
    pub fn months_processed(&self) -> usize {
        self.date_quality.len()
    }
}

/// Category labels come from the first entity block's header cells and
/// apply positionally to every block. An empty header falls back to the
/// column letter.
pub fn read_categories<G: Grid + ?Sized>(grid: &G, layout: &LayoutSpec) -> Vec<String> {
    let Some(first) = layout.blocks.first() else {
        return Vec::new();
    };

    first
        .category_columns
        .iter()
        .map(|&column| {
            grid.cell(layout.header_row, column)
                .and_then(CellValue::as_text)
                .unwrap_or_else(|| column.letters())
        })
        .collect()
}

/// Converts one spreadsheet row into its atomic, total and check records.
pub struct RecordExtractor<'a> {
    layout: &'a LayoutSpec,
    categories: &'a [String],
}

impl<'a> RecordExtractor<'a> {
    pub fn new(layout: &'a LayoutSpec, categories: &'a [String]) -> Self {
        Self { layout, categories }
    }

    fn numeric(&self, cell: Option<&CellValue>) -> Option<f64> {
        match cell.and_then(CellValue::as_number) {
            Some(v) => Some(v),
            None => match self.layout.missing_values {
                MissingValuePolicy::Zero => Some(0.0),
                MissingValuePolicy::Skip => None,
            },
        }
    }

    pub fn extract_row<G: Grid + ?Sized>(
        &self,
        grid: &G,
        row: u32,
        date: NaiveDate,
    ) -> Vec<MonthRecord> {
        let record = |entity: &str, category: Category, value: Option<f64>| MonthRecord {
            date,
            entity: entity.to_string(),
            category,
            value,
            source_row: row,
        };

        let mut records = Vec::new();
        let mut declared_entity_sum = 0.0;

        for block in &self.layout.blocks {
            let mut category_sum = 0.0;

            for (name, &column) in self.categories.iter().zip(&block.category_columns) {
                let Some(value) = self.numeric(grid.cell(row, column)) else {
                    continue;
                };
                category_sum += value;
                records.push(record(&block.name, Category::Named(name.clone()), Some(value)));
            }

            let declared = self.numeric(grid.cell(row, block.total_column));
            if let Some(total) = declared {
                declared_entity_sum += total;
            }

            records.push(record(&block.name, Category::TotalEntity, declared));
            records.push(record(
                &block.name,
                Category::CheckSumCategories,
                Some(category_sum),
            ));
        }

        let market = self.numeric(grid.cell(row, self.layout.market_total_column));
        records.push(record(MARKET_ENTITY, Category::TotalMarket, market));
        records.push(record(
            MARKET_ENTITY,
            Category::CheckSumEntityTotals,
            Some(declared_entity_sum),
        ));

        records
    }
}

/// Drives a full extraction run over one sheet.
pub struct Extractor<'a> {
    layout: &'a LayoutSpec,
    resolver: DateResolver,
}

impl<'a> Extractor<'a> {
    pub fn new(layout: &'a LayoutSpec) -> Self {
        Self {
            layout,
            resolver: DateResolver::new(),
        }
    }

    pub fn with_resolver(layout: &'a LayoutSpec, resolver: DateResolver) -> Self {
        Self { layout, resolver }
    }

    /// Parses the start row's date label, falling back to the configured anchor.
    pub fn resolve_anchor<G: Grid + ?Sized>(&self, grid: &G) -> (NaiveDate, bool) {
        let raw = grid.cell(self.layout.start_row, self.layout.date_column);
        match self.resolver.resolve(raw) {
            Some(date) => (date, true),
            None => (self.layout.fallback_anchor, false),
        }
    }

    /// Every emitted row is dated `anchor + month_index`, whatever its label
    /// says. Source rows are assumed to be contiguous months that are never
    /// reordered; the parsed label only feeds the date audit.
    pub fn run<G: Grid + ?Sized>(&self, grid: &G) -> Result<Extraction> {
        let layout = self.layout;
        layout.validate()?;

        let categories = read_categories(grid, layout);
        debug!("[{}] Categories: {:?}", layout.dataset, categories);

        let (anchor_date, anchor_parsed) = self.resolve_anchor(grid);
        if anchor_parsed {
            info!(
                "[{}] Anchor date {} parsed from {}{}",
                layout.dataset, anchor_date, layout.date_column, layout.start_row
            );
        } else {
            info!(
                "[{}] Start row label unusable, using fallback anchor {}",
                layout.dataset, anchor_date
            );
        }

        let extractor = RecordExtractor::new(layout, &categories);
        let mut walker = GridWalker::new(grid, layout);
        let mut records = Vec::new();
        let mut date_quality = Vec::new();

        for (month_index, row) in walker.by_ref().enumerate() {
            let expected = add_months(anchor_date, month_index as u32)?;

            let raw = grid.cell(row, layout.date_column);
            let parsed = self.resolver.resolve(raw);
            date_quality.push(DateQualityEntry {
                source_row: row,
                raw_value: raw.and_then(CellValue::as_text),
                expected_date: expected,
                parsed_date: parsed,
                unparseable: parsed.is_none(),
                mismatch: parsed.is_some_and(|p| p != expected),
            });

            records.extend(extractor.extract_row(grid, row, expected));
        }

        info!(
            "[{}] Months processed: {} ({} records)",
            layout.dataset,
            date_quality.len(),
            records.len()
        );

        Ok(Extraction {
            anchor_date,
            anchor_parsed,
            categories,
            records,
            date_quality,
            hit_scan_limit: walker.hit_scan_limit(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractionError;
    use crate::grid::CellGrid;
    use crate::schema::EntityBlock;

    fn layout() -> LayoutSpec {
        LayoutSpec {
            dataset: "unit".to_string(),
            sheet: "Sheet1".to_string(),
            header_row: 1,
            start_row: 2,
            date_column: "A".parse().unwrap(),
            market_total_column: "H".parse().unwrap(),
            blocks: vec![
                EntityBlock::new("E1", &["B", "C"], "D").unwrap(),
                EntityBlock::new("E2", &["E", "F"], "G").unwrap(),
            ],
            fallback_anchor: NaiveDate::from_ymd_opt(2014, 7, 1).unwrap(),
            missing_values: MissingValuePolicy::Skip,
            scan_limit: 100,
        }
    }

    fn grid() -> CellGrid {
        let mut grid = CellGrid::new();
        grid.set_a1("B1", " Prepago ").unwrap();
        grid.set_a1("C1", "Pospago").unwrap();
        // E1/F1 headers differ on purpose; the first block's labels win
        grid.set_a1("E1", "Other").unwrap();

        grid.set_a1("A2", "jul-2014").unwrap();
        grid.set_a1("B2", 10.0).unwrap();
        grid.set_a1("C2", 20.0).unwrap();
        grid.set_a1("D2", 30.0).unwrap();
        grid.set_a1("E2", 1.0).unwrap();
        grid.set_a1("F2", "n/d").unwrap();
        grid.set_a1("G2", 2.0).unwrap();
        grid.set_a1("H2", 32.0).unwrap();
        grid
    }

    fn ymd(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    #[test]
    fn test_categories_from_first_block() {
        let mut grid = grid();
        grid.set_a1("C1", CellValue::Empty).unwrap();
        let categories = read_categories(&grid, &layout());
        assert_eq!(categories, vec!["Prepago".to_string(), "C".to_string()]);
    }

    #[test]
    fn test_extract_row_emits_totals_and_checks() {
        let layout = layout();
        let grid = grid();
        let categories = read_categories(&grid, &layout);
        let records = RecordExtractor::new(&layout, &categories).extract_row(&grid, 2, ymd(2014, 7));

        let summary: Vec<(String, String, Option<f64>)> = records
            .iter()
            .map(|r| (r.entity.clone(), r.category.to_string(), r.value))
            .collect();

        let expected: Vec<(String, String, Option<f64>)> = vec![
            ("E1".into(), "Prepago".into(), Some(10.0)),
            ("E1".into(), "Pospago".into(), Some(20.0)),
            ("E1".into(), "TOTAL_ENTITY".into(), Some(30.0)),
            ("E1".into(), "CHECK_SUM_CATEGORIES".into(), Some(30.0)),
            ("E2".into(), "Prepago".into(), Some(1.0)),
            ("E2".into(), "TOTAL_ENTITY".into(), Some(2.0)),
            ("E2".into(), "CHECK_SUM_CATEGORIES".into(), Some(1.0)),
            ("TOTAL_MARKET".into(), "TOTAL_MARKET".into(), Some(32.0)),
            ("TOTAL_MARKET".into(), "CHECK_SUM_ENTITY_TOTALS".into(), Some(32.0)),
        ];
        assert_eq!(summary, expected);
        assert!(records.iter().all(|r| r.source_row == 2 && r.date == ymd(2014, 7)));
    }

    #[test]
    fn test_zero_policy_fills_gaps() {
        let layout = layout().with_missing_values(MissingValuePolicy::Zero);
        let mut grid = grid();
        grid.set_a1("G2", "--").unwrap();
        let categories = read_categories(&grid, &layout);
        let records = RecordExtractor::new(&layout, &categories).extract_row(&grid, 2, ymd(2014, 7));

        let e2: Vec<Option<f64>> = records
            .iter()
            .filter(|r| r.entity == "E2")
            .map(|r| r.value)
            .collect();
        assert_eq!(e2, vec![Some(1.0), Some(0.0), Some(0.0), Some(1.0)]);

        let market_check = records
            .iter()
            .find(|r| r.category == Category::CheckSumEntityTotals)
            .unwrap();
        assert_eq!(market_check.value, Some(30.0));
    }

    #[test]
    fn test_skip_policy_leaves_null_declared_total() {
        let layout = layout();
        let mut grid = grid();
        grid.set_a1("D2", "s/d").unwrap();
        let categories = read_categories(&grid, &layout);
        let records = RecordExtractor::new(&layout, &categories).extract_row(&grid, 2, ymd(2014, 7));

        let total = records
            .iter()
            .find(|r| r.entity == "E1" && r.category == Category::TotalEntity)
            .unwrap();
        assert_eq!(total.value, None);

        let market_check = records
            .iter()
            .find(|r| r.category == Category::CheckSumEntityTotals)
            .unwrap();
        assert_eq!(market_check.value, Some(2.0));
    }

    #[test]
    fn test_run_sequences_dates_and_audits_labels() {
        let layout = layout();
        let mut grid = grid();
        grid.set_a1("A3", "ago-2014").unwrap();
        grid.set_a1("H3", 1.0).unwrap();
        grid.set_a1("A4", "xyz-qqqq").unwrap();
        grid.set_a1("A5", "dic 2014").unwrap(); // should be oct-2014

        let extraction = Extractor::new(&layout).run(&grid).unwrap();
        assert!(extraction.anchor_parsed);
        assert_eq!(extraction.anchor_date, ymd(2014, 7));
        assert_eq!(extraction.months_processed(), 4);

        let expected: Vec<NaiveDate> = extraction
            .date_quality
            .iter()
            .map(|q| q.expected_date)
            .collect();
        assert_eq!(expected, vec![ymd(2014, 7), ymd(2014, 8), ymd(2014, 9), ymd(2014, 10)]);

        let garbage = &extraction.date_quality[2];
        assert!(garbage.unparseable);
        assert!(!garbage.mismatch);
        assert_eq!(garbage.raw_value.as_deref(), Some("xyz-qqqq"));

        let wrong = &extraction.date_quality[3];
        assert!(!wrong.unparseable);
        assert!(wrong.mismatch);
        assert_eq!(wrong.parsed_date, Some(ymd(2014, 12)));

        let row5_dates: Vec<NaiveDate> = extraction
            .records
            .iter()
            .filter(|r| r.source_row == 5)
            .map(|r| r.date)
            .collect();
        assert!(row5_dates.iter().all(|d| *d == ymd(2014, 10)));
    }

    #[test]
    fn test_fallback_anchor_when_start_label_unusable() {
        let layout = layout();
        let mut grid = grid();
        grid.set_a1("A2", "Total").unwrap();

        let extraction = Extractor::new(&layout).run(&grid).unwrap();
        assert!(!extraction.anchor_parsed);
        assert_eq!(extraction.anchor_date, layout.fallback_anchor);
        assert!(extraction.date_quality[0].unparseable);
    }

    #[test]
    fn test_year_zero_start_label_uses_fallback_anchor() {
        let layout = layout();
        let mut grid = grid();
        grid.set_a1("A2", "ene 0000").unwrap();

        let extraction = Extractor::new(&layout).run(&grid).unwrap();
        assert!(!extraction.anchor_parsed);
        assert_eq!(extraction.anchor_date, layout.fallback_anchor);
    }

    #[test]
    fn test_run_rejects_mismatched_block_widths() {
        let mut layout = layout();
        layout.blocks[1] = EntityBlock::new("E2", &["E"], "G").unwrap();

        let result = Extractor::new(&layout).run(&grid());
        assert!(matches!(result, Err(ExtractionError::InvalidLayout { .. })));
    }

    #[test]
    fn test_empty_rows_do_not_consume_months() {
        let layout = layout();
        let mut grid = grid();
        grid.set_a1("H4", 5.0).unwrap(); // row 3 empty, row 4 data

        let extraction = Extractor::new(&layout).run(&grid).unwrap();
        let rows: Vec<(u32, NaiveDate)> = extraction
            .date_quality
            .iter()
            .map(|q| (q.source_row, q.expected_date))
            .collect();
        assert_eq!(rows, vec![(2, ymd(2014, 7)), (4, ymd(2014, 8))]);
    }

    #[test]
    fn test_custom_month_spellings() {
        let layout = layout();
        let mut grid = grid();
        grid.set_a1("A2", "Juli 2014").unwrap();

        let default_run = Extractor::new(&layout).run(&grid).unwrap();
        assert!(default_run.date_quality[0].unparseable);

        let resolver = DateResolver::new().with_month_name("juli", 7);
        let custom_run = Extractor::with_resolver(&layout, resolver).run(&grid).unwrap();
        assert!(custom_run.anchor_parsed);
        assert!(!custom_run.date_quality[0].unparseable);
    }
}
