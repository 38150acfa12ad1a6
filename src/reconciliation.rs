use crate::{Category, DateQualityEntry, MonthRecord};
use chrono::NaiveDate;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Differences up to this size are rounding noise in the source sheets.
pub const DEFAULT_TOLERANCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationScope {
    /// Declared market total vs. sum of declared entity totals
    Market,
    /// Declared entity total vs. sum of its category values
    Entity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationEntry {
    pub date: NaiveDate,
    pub source_row: u32,
    pub scope: ReconciliationScope,
    pub entity: String,
    pub declared_total: Option<f64>,
    pub computed_total: Option<f64>,
    /// `declared_total - computed_total`; null when either side is missing
    pub diff: Option<f64>,
}

impl ReconciliationEntry {
    pub fn exceeds(&self, tolerance: f64) -> bool {
        self.diff.is_some_and(|d| d.abs() > tolerance)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub tolerance: f64,
    pub market: Vec<ReconciliationEntry>,
    pub entity: Vec<ReconciliationEntry>,
    pub date_findings: Vec<DateQualityEntry>,
}

impl ReconciliationReport {
    /// All entries, market scope first.
    pub fn entries(&self) -> impl Iterator<Item = &ReconciliationEntry> {
        self.market.iter().chain(self.entity.iter())
    }

    pub fn flagged(&self) -> impl Iterator<Item = &ReconciliationEntry> {
        let tolerance = self.tolerance;
        self.entries().filter(move |e| e.exceeds(tolerance))
    }

    pub fn flagged_market(&self) -> Vec<&ReconciliationEntry> {
        self.market.iter().filter(|e| e.exceeds(self.tolerance)).collect()
    }

    pub fn flagged_entity(&self) -> Vec<&ReconciliationEntry> {
        self.entity.iter().filter(|e| e.exceeds(self.tolerance)).collect()
    }

    pub fn is_clean(&self) -> bool {
        self.flagged().next().is_none() && self.date_findings.is_empty()
    }

    /// Surfaces findings through the logger, at most `limit` rows per section.
    pub fn log_findings(&self, limit: usize) {
        let market = self.flagged_market();
        if !market.is_empty() {
            warn!(
                "{} market totals differ from the sum of entity totals by more than {}",
                market.len(),
                self.tolerance
            );
            for entry in market.iter().take(limit) {
                warn!(
                    "  {} row {}: diff {:.2}",
                    entry.date,
                    entry.source_row,
                    entry.diff.unwrap_or_default()
                );
            }
        }

        let entity = self.flagged_entity();
        if !entity.is_empty() {
            warn!(
                "{} entity totals differ from the sum of their categories by more than {}",
                entity.len(),
                self.tolerance
            );
            for entry in entity.iter().take(limit) {
                warn!(
                    "  {} row {} {}: diff {:.2}",
                    entry.date,
                    entry.source_row,
                    entry.entity,
                    entry.diff.unwrap_or_default()
                );
            }
        }

        if !self.date_findings.is_empty() {
            warn!(
                "{} date labels were unparseable or out of sequence; corrected by monthly sequence",
                self.date_findings.len()
            );
            for finding in self.date_findings.iter().take(limit) {
                warn!(
                    "  row {}: raw {:?}, expected {}, parsed {:?}",
                    finding.source_row,
                    finding.raw_value.as_deref().unwrap_or(""),
                    finding.expected_date,
                    finding.parsed_date
                );
            }
        }
    }
}

pub struct ReconciliationValidator {
    tolerance: f64,
}

impl Default for ReconciliationValidator {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl ReconciliationValidator {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Pairs declared totals with their check records at both scopes.
    pub fn reconcile(&self, records: &[MonthRecord]) -> Vec<ReconciliationEntry> {
        let mut entries = self.reconcile_market(records);
        entries.extend(self.reconcile_entities(records));
        entries
    }

    pub fn reconcile_market(&self, records: &[MonthRecord]) -> Vec<ReconciliationEntry> {
        pair_totals(
            records,
            ReconciliationScope::Market,
            &Category::TotalMarket,
            &Category::CheckSumEntityTotals,
        )
    }

    pub fn reconcile_entities(&self, records: &[MonthRecord]) -> Vec<ReconciliationEntry> {
        pair_totals(
            records,
            ReconciliationScope::Entity,
            &Category::TotalEntity,
            &Category::CheckSumCategories,
        )
    }

    pub fn report(
        &self,
        records: &[MonthRecord],
        date_quality: &[DateQualityEntry],
    ) -> ReconciliationReport {
        ReconciliationReport {
            tolerance: self.tolerance,
            market: self.reconcile_market(records),
            entity: self.reconcile_entities(records),
            date_findings: date_quality
                .iter()
                .filter(|q| q.is_finding())
                .cloned()
                .collect(),
        }
    }
}

/// Groups by (date, source_row, entity) in first-seen order; the first
/// non-null value on each side wins.
fn pair_totals(
    records: &[MonthRecord],
    scope: ReconciliationScope,
    declared: &Category,
    computed: &Category,
) -> Vec<ReconciliationEntry> {
    let mut entries: Vec<ReconciliationEntry> = Vec::new();
    let mut index: HashMap<(NaiveDate, u32, &str), usize> = HashMap::new();

    for record in records {
        let is_declared = record.category == *declared;
        if !is_declared && record.category != *computed {
            continue;
        }

        let key = (record.date, record.source_row, record.entity.as_str());
        let slot = *index.entry(key).or_insert_with(|| {
            entries.push(ReconciliationEntry {
                date: record.date,
                source_row: record.source_row,
                scope,
                entity: record.entity.clone(),
                declared_total: None,
                computed_total: None,
                diff: None,
            });
            entries.len() - 1
        });

        let entry = &mut entries[slot];
        let side = if is_declared {
            &mut entry.declared_total
        } else {
            &mut entry.computed_total
        };
        if side.is_none() {
            *side = record.value;
        }
    }

    for entry in &mut entries {
        entry.diff = match (entry.declared_total, entry.computed_total) {
            (Some(declared), Some(computed)) => Some(declared - computed),
            _ => None,
        };
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MARKET_ENTITY;

    fn record(row: u32, entity: &str, category: Category, value: Option<f64>) -> MonthRecord {
        MonthRecord {
            date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + chrono::Months::new(row),
            entity: entity.to_string(),
            category,
            value,
            source_row: row,
        }
    }

    fn row_records(row: u32, declared: Option<f64>, market: Option<f64>) -> Vec<MonthRecord> {
        vec![
            record(row, "E", Category::Named("A".into()), Some(10.0)),
            record(row, "E", Category::Named("B".into()), Some(20.0)),
            record(row, "E", Category::TotalEntity, declared),
            record(row, "E", Category::CheckSumCategories, Some(30.0)),
            record(row, MARKET_ENTITY, Category::TotalMarket, market),
            record(
                row,
                MARKET_ENTITY,
                Category::CheckSumEntityTotals,
                Some(declared.unwrap_or(0.0)),
            ),
        ]
    }

    #[test]
    fn test_balanced_row_is_not_flagged() {
        let records = row_records(1, Some(30.0), Some(30.0));
        let report = ReconciliationValidator::default().report(&records, &[]);

        assert_eq!(report.entity.len(), 1);
        assert_eq!(report.entity[0].diff, Some(0.0));
        assert_eq!(report.market[0].diff, Some(0.0));
        assert!(report.is_clean());
    }

    #[test]
    fn test_entity_mismatch_is_flagged() {
        let records = row_records(1, Some(25.0), Some(25.0));
        let report = ReconciliationValidator::default().report(&records, &[]);

        let flagged = report.flagged_entity();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].diff, Some(-5.0));
        assert_eq!(flagged[0].scope, ReconciliationScope::Entity);
        assert!(report.flagged_market().is_empty());
    }

    #[test]
    fn test_tolerance_boundary() {
        let mut records = row_records(1, Some(30.5), Some(30.5));
        records.extend(row_records(2, Some(30.6), Some(30.6)));
        let report = ReconciliationValidator::default().report(&records, &[]);

        let flagged: Vec<u32> = report.flagged().map(|e| e.source_row).collect();
        assert_eq!(flagged, vec![2]);
    }

    #[test]
    fn test_market_mismatch() {
        let records = row_records(3, Some(30.0), Some(31.0));
        let entries = ReconciliationValidator::new(0.5).reconcile(&records);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].scope, ReconciliationScope::Market);
        assert_eq!(entries[0].entity, MARKET_ENTITY);
        assert_eq!(entries[0].diff, Some(1.0));
        assert!(entries[0].exceeds(0.5));
    }

    #[test]
    fn test_missing_declared_total_is_never_flagged() {
        let records = row_records(1, None, None);
        let report = ReconciliationValidator::default().report(&records, &[]);
        assert_eq!(report.entity[0].declared_total, None);
        assert_eq!(report.entity[0].diff, None);
        assert_eq!(report.flagged().count(), 0);
    }

    #[test]
    fn test_date_findings_are_collected() {
        let date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let quality = vec![
            DateQualityEntry {
                source_row: 1,
                raw_value: Some("ene 2020".into()),
                expected_date: date,
                parsed_date: Some(date),
                unparseable: false,
                mismatch: false,
            },
            DateQualityEntry {
                source_row: 2,
                raw_value: Some("???".into()),
                expected_date: date,
                parsed_date: None,
                unparseable: true,
                mismatch: false,
            },
        ];

        let report = ReconciliationValidator::default().report(&[], &quality);
        assert_eq!(report.date_findings.len(), 1);
        assert_eq!(report.date_findings[0].source_row, 2);
        assert!(!report.is_clean());
        report.log_findings(10);
    }
}
