use crate::MonthRecord;

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedOutput {
    pub audit: Vec<MonthRecord>,
    pub facts: Vec<MonthRecord>,
}

/// Splits a record set into the audit view (everything) and the fact view
/// (check records removed). Order is preserved in both.
pub struct OutputProjector;

impl OutputProjector {
    pub fn project(records: Vec<MonthRecord>) -> ProjectedOutput {
        let facts = Self::fact_view(&records);
        ProjectedOutput {
            audit: records,
            facts,
        }
    }

    pub fn fact_view(records: &[MonthRecord]) -> Vec<MonthRecord> {
        records
            .iter()
            .filter(|r| !r.category.is_check())
            .cloned()
            .collect()
    }
}
