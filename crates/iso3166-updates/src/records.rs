use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use crate::iso::catalogue_url;
use crate::table::{Grid, TableError, normalize_headers};
use crate::types::{
    CODE_SUBDIVISION_CHANGE, CountryCode, DATE_ISSUED, DESCRIPTION_OF_CHANGE, EDITION_NEWSLETTER,
    parse_iso_date,
};
use crate::utils::YearExpression;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Malformed changes table for {country}: {reason}. Raw table: {table:?}")]
    MalformedTable {
        country: String,
        reason: String,
        table: Grid,
    },
    #[error(transparent)]
    Table(#[from] TableError),
}

static RE_CORRECTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)corrected").expect("invalid regex: corrected marker"));

static RE_ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").expect("invalid regex: iso date"));

/// One table row in canonical shape, still carrying the correction note
/// that reconciliation folds back into the date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRecord {
    pub date_issued: String,
    pub corrected: Option<String>,
    pub code_subdivision_change: String,
    pub description_of_change: String,
    pub edition_newsletter: String,
}

impl ParsedRecord {
    pub fn issue_date(&self) -> Option<NaiveDate> {
        parse_iso_date(&self.date_issued)
    }

    /// `" (corrected YYYY-MM-DD)"`, or empty when uncorrected.
    pub fn corrected_note(&self) -> String {
        self.corrected
            .as_deref()
            .map(|date| format!(" (corrected {})", date))
            .unwrap_or_default()
    }
}

pub(crate) fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_date_noise(text: &str) -> String {
    text.trim_matches(|c: char| c.is_whitespace() || (c.is_ascii_punctuation() && c != '-'))
        .to_string()
}

/// Splits `"2014-05-13 (corrected 2014-06-01)"` into the issued date and the
/// corrected date.
pub fn split_corrected_date(raw: &str) -> (String, Option<String>) {
    let Some(marker) = RE_CORRECTED.find(raw) else {
        return (strip_date_noise(raw), None);
    };

    let before = &raw[..marker.start()];
    let before = before.split('(').next().unwrap_or(before);
    let after = &raw[marker.end()..];
    let corrected = RE_ISO_DATE
        .find(after)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| strip_date_noise(after));

    (
        strip_date_noise(before),
        (!corrected.is_empty()).then_some(corrected),
    )
}

fn cell_at(row: &[String], col: Option<usize>) -> String {
    col.and_then(|c| row.get(c)).cloned().unwrap_or_default()
}

fn issue_year(date: &str) -> String {
    parse_iso_date(date)
        .map(|d| format!("{:04}", d.year()))
        .or_else(|| date.get(..4).map(str::to_string))
        .unwrap_or_default()
}

/// Turns a normalised changes grid into records for `country`, dropping rows
/// outside `year` and rows with neither a code change nor a description.
pub fn parse_records(
    grid: &Grid,
    year: &YearExpression,
    country: &CountryCode,
) -> Result<Vec<ParsedRecord>, ParseError> {
    let Some((header, rows)) = grid.split_first() else {
        return Ok(Vec::new());
    };

    let malformed = |reason: &str| ParseError::MalformedTable {
        country: country.to_string(),
        reason: reason.to_string(),
        table: grid.clone(),
    };

    if header.iter().all(|h| h.trim().is_empty()) {
        return Err(malformed("empty header row"));
    }
    let header = normalize_headers(header);
    let column = |name: &str| header.iter().position(|h| h == name);

    let date_col = column(DATE_ISSUED).ok_or_else(|| malformed("no Date Issued column"))?;
    let code_col = column(CODE_SUBDIVISION_CHANGE);
    let description_col = column(DESCRIPTION_OF_CHANGE);
    let edition_col = column(EDITION_NEWSLETTER);

    let mut records = Vec::new();
    for row in rows {
        let (date_issued, corrected) = split_corrected_date(&cell_at(row, Some(date_col)));

        if !year.includes(&issue_year(&date_issued)) {
            log::debug!("{}: skipping {} outside year filter {}", country, date_issued, year);
            continue;
        }

        let mut edition = cell_at(row, edition_col);
        if edition.trim().is_empty() {
            edition = catalogue_url(country);
        }
        let edition = edition.replace("BrowsingPlatform", "Browsing Platform");

        let code_subdivision_change = normalize_whitespace(&cell_at(row, code_col));
        let description_of_change = normalize_whitespace(&cell_at(row, description_col));
        if code_subdivision_change.is_empty() && description_of_change.is_empty() {
            log::debug!("{}: dropping empty row dated {}", country, date_issued);
            continue;
        }

        records.push(ParsedRecord {
            date_issued,
            corrected,
            code_subdivision_change,
            description_of_change,
            edition_newsletter: normalize_whitespace(&edition),
        });
    }

    Ok(records)
}
