//! Locale-aware date normalization.
//!
//! Publisher sites print dates in two shapes: spelled-out month names
//! ("24 Janvier 2026", per-source month table) and numeric day/month/year
//! ("05/03/25", two-digit years assumed 2000s). [`normalize`] turns either
//! into a [`NaiveDate`], returning `None` when the text does not match —
//! callers must treat an unknown date as "do not filter out", because some
//! sources omit dates entirely.
//!
//! Everything here is pure: the reference "today" used for filtering lives in
//! the orchestrator, never in this module.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;

static MONTH_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})\s+(\p{L}+)\s+(\d{4})").unwrap());
static SLASH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{1,2})/(\d{1,2})/(\d{2,4})").unwrap());

/// Per-source descriptor of how raw date text is shaped.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum DateFormat {
    /// "`<day> <MonthName> <year>`", resolved through a month-name table.
    /// Lookup is case-insensitive and accent-folded, so "Février" and
    /// "fevrier" both hit the same entry.
    MonthName { months: HashMap<String, u32> },
    /// "`<day>/<month>/<year>`" with a 2- or 4-digit year.
    DayMonthYearSlash,
}

/// The run's date filter: the reference date plus an optional catch-up
/// window of earlier days.
#[derive(Debug, Clone, Copy)]
pub struct DateWindow {
    pub reference: NaiveDate,
    pub lookback_days: u32,
}

impl DateWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date <= self.reference
            && (self.reference - date).num_days() <= i64::from(self.lookback_days)
    }
}

/// Parse locale-specific date text into a calendar date.
///
/// Returns `None` (not an error) when the pattern does not match, the month
/// name is unrecognized, or the numbers do not form a real date.
pub fn normalize(raw: &str, format: &DateFormat) -> Option<NaiveDate> {
    match format {
        DateFormat::MonthName { months } => {
            let caps = MONTH_NAME_RE.captures(raw)?;
            let day: u32 = caps[1].parse().ok()?;
            let year: i32 = caps[3].parse().ok()?;
            let wanted = fold_accents(&caps[2].to_lowercase());
            let month = months
                .iter()
                .find(|(name, _)| fold_accents(&name.to_lowercase()) == wanted)
                .map(|(_, m)| *m)?;
            NaiveDate::from_ymd_opt(year, month, day)
        }
        DateFormat::DayMonthYearSlash => {
            let caps = SLASH_RE.captures(raw)?;
            let day: u32 = caps[1].parse().ok()?;
            let month: u32 = caps[2].parse().ok()?;
            let mut year: i32 = caps[3].parse().ok()?;
            if caps[3].len() <= 2 {
                year += 2000;
            }
            NaiveDate::from_ymd_opt(year, month, day)
        }
    }
}

/// Strip the diacritics that appear in French and Spanish month names.
fn fold_accents(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'à' | 'â' | 'ä' | 'á' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'î' | 'ï' | 'í' => 'i',
            'ô' | 'ö' | 'ó' => 'o',
            'ù' | 'û' | 'ü' | 'ú' => 'u',
            'ç' => 'c',
            other => other,
        })
        .collect()
}
