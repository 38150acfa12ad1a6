//! Month-label normalization.
//!
//! Source sheets label months inconsistently: native dates, "Ene 2009",
//! "oct-2025", "07/2014", "2014-07", occasionally garbage. [`DateResolver`]
//! turns any of these into the first day of the month, or `None`.

use crate::grid::CellValue;
use crate::utils::{first_of_month, pivot_two_digit_year, truncate_to_month};
use chrono::NaiveDate;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

static NAME_YEAR_JOINED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-z]{3,12})([0-9]{4})$").expect("valid month regex"));
static NAME_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z]{3,12})[^0-9]+([0-9]{4})").expect("valid month regex"));
static NAME_SHORT_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z]{3,12})[^0-9]+([0-9]{2})$").expect("valid month regex"));
static MONTH_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]{1,2})[^0-9]+([0-9]{4})").expect("valid month regex"));
static YEAR_MONTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]{4})[^0-9]+([0-9]{1,2})").expect("valid month regex"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

const MONTH_NAMES: &[(&str, u32)] = &[
    ("ene", 1),
    ("enero", 1),
    ("jan", 1),
    ("january", 1),
    ("feb", 2),
    ("febrero", 2),
    ("february", 2),
    ("mar", 3),
    ("marzo", 3),
    ("march", 3),
    ("abr", 4),
    ("abril", 4),
    ("apr", 4),
    ("april", 4),
    ("may", 5),
    ("mayo", 5),
    ("jun", 6),
    ("junio", 6),
    ("june", 6),
    ("jul", 7),
    ("julio", 7),
    ("july", 7),
    ("ago", 8),
    ("agosto", 8),
    ("aug", 8),
    ("august", 8),
    ("sep", 9),
    ("sept", 9),
    ("septiembre", 9),
    ("september", 9),
    ("oct", 10),
    ("octubre", 10),
    ("october", 10),
    ("nov", 11),
    ("noviembre", 11),
    ("november", 11),
    ("dic", 12),
    ("diciembre", 12),
    ("dec", 12),
    ("december", 12),
];

/// Lowercases, strips diacritics and collapses whitespace.
pub fn normalize_label(raw: &str) -> String {
    let folded: String = raw
        .trim()
        .to_lowercase()
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect();
    WHITESPACE.replace_all(&folded, " ").into_owned()
}

#[derive(Debug, Clone)]
pub struct DateResolver {
    months: HashMap<String, u32>,
}

impl Default for DateResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl DateResolver {
    /// Resolver preloaded with Spanish and English month names and abbreviations.
    pub fn new() -> Self {
        let months = MONTH_NAMES
            .iter()
            .map(|(name, month)| (name.to_string(), *month))
            .collect();
        Self { months }
    }

    /// Registers an extra spelling. Names are normalized the same way labels are.
    pub fn with_month_name(mut self, name: &str, month: u32) -> Self {
        if (1..=12).contains(&month) {
            self.months.insert(normalize_label(name), month);
        }
        self
    }

    pub fn month_number(&self, name: &str) -> Option<u32> {
        self.months.get(name).copied()
    }

    pub fn resolve(&self, raw: Option<&CellValue>) -> Option<NaiveDate> {
        match raw? {
            CellValue::Empty => None,
            CellValue::Date(d) => Some(truncate_to_month(*d)),
            CellValue::DateTime(dt) => Some(truncate_to_month(dt.date())),
            other => self.parse_label(&other.as_text()?),
        }
    }

    /// Tries each label pattern in a fixed order; the first pattern whose
    /// leftmost match yields a valid month wins.
    pub fn parse_label(&self, raw: &str) -> Option<NaiveDate> {
        let s = normalize_label(raw);

        if let Some(date) = self.named_month(&NAME_YEAR_JOINED, &s, false) {
            return Some(date);
        }
        if let Some(date) = self.named_month(&NAME_YEAR, &s, false) {
            return Some(date);
        }
        if let Some(date) = self.named_month(&NAME_SHORT_YEAR, &s, true) {
            return Some(date);
        }
        if let Some(date) = numeric_month(&MONTH_YEAR, &s, 1, 2) {
            return Some(date);
        }
        numeric_month(&YEAR_MONTH, &s, 2, 1)
    }

    fn named_month(&self, pattern: &Regex, s: &str, short_year: bool) -> Option<NaiveDate> {
        let caps = pattern.captures(s)?;
        let month = self.month_number(caps.get(1)?.as_str())?;
        let digits: u32 = caps.get(2)?.as_str().parse().ok()?;
        let year = if short_year {
            pivot_two_digit_year(digits)
        } else {
            digits as i32
        };
        first_of_month(year, month)
    }
}

fn numeric_month(pattern: &Regex, s: &str, month_group: usize, year_group: usize) -> Option<NaiveDate> {
    let caps = pattern.captures(s)?;
    let month: u32 = caps.get(month_group)?.as_str().parse().ok()?;
    let year: i32 = caps.get(year_group)?.as_str().parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    first_of_month(year, month)
}
