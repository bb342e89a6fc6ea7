use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::countries;

pub const DATE_ISSUED: &str = "Date Issued";
pub const EDITION_NEWSLETTER: &str = "Edition/Newsletter";
pub const CODE_SUBDIVISION_CHANGE: &str = "Code/Subdivision Change";
pub const DESCRIPTION_OF_CHANGE: &str = "Description of Change";

/// Alpha-2 code to its change records, newest first.
pub type Aggregate = BTreeMap<String, Vec<ChangeRecord>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    #[serde(rename = "Date Issued")]
    pub date_issued: String,
    #[serde(rename = "Code/Subdivision Change")]
    pub code_subdivision_change: String,
    #[serde(rename = "Description of Change")]
    pub description_of_change: String,
    #[serde(rename = "Edition/Newsletter")]
    pub edition_newsletter: String,
}

impl ChangeRecord {
    /// Issue date without any `(corrected ...)` annotation.
    pub fn issue_date(&self) -> Option<NaiveDate> {
        parse_iso_date(&self.date_issued)
    }

    pub fn issue_year(&self) -> &str {
        self.date_issued.get(..4).unwrap_or_default()
    }
}

impl Display for ChangeRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "[{}]", self.date_issued)?;
        if !self.code_subdivision_change.is_empty() {
            writeln!(f, "  Change: {}", self.code_subdivision_change)?;
        }
        if !self.description_of_change.is_empty() {
            writeln!(f, "  Description: {}", self.description_of_change)?;
        }
        write!(f, "  Source: {}", self.edition_newsletter)
    }
}

/// Parses the leading `YYYY-MM-DD` of a date cell.
pub fn parse_iso_date(text: &str) -> Option<NaiveDate> {
    let head = text.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Wiki,
    Iso,
}

impl Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Wiki => write!(f, "Wikipedia"),
            Source::Iso => write!(f, "ISO Online Browsing Platform"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CountryCodeError {
    #[error("Invalid country code format '{0}'. Expected alpha-2, alpha-3 or numeric code")]
    InvalidFormat(String),
    #[error("Unknown country code '{0}'")]
    Unknown(String),
}

/// ISO 3166-1 alpha-2 code, validated against the reference table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CountryCode(String);

impl CountryCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn name(&self) -> &'static str {
        countries::by_alpha2(&self.0)
            .map(|c| c.name)
            .unwrap_or_default()
    }
}

impl FromStr for CountryCode {
    type Err = CountryCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_uppercase();
        let entry = if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            countries::by_alpha2(&code)
        } else if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            countries::by_alpha3(&code)
        } else if !code.is_empty() && code.len() <= 3 && code.chars().all(|c| c.is_ascii_digit())
        {
            countries::by_numeric(&format!("{:0>3}", code))
        } else {
            return Err(CountryCodeError::InvalidFormat(s.to_string()));
        };

        entry
            .map(|c| CountryCode(c.alpha2.to_string()))
            .ok_or_else(|| CountryCodeError::Unknown(s.to_string()))
    }
}

impl TryFrom<String> for CountryCode {
    type Error = CountryCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CountryCode> for String {
    fn from(code: CountryCode) -> Self {
        code.0
    }
}

impl Display for CountryCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Supplementary "Remark part N" notes from a catalogue summary panel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemarksBundle {
    parts: [Option<String>; 4],
}

impl RemarksBundle {
    pub const SLOTS: usize = 4;

    /// Stores `remark` in 1-based `part`. Out-of-range parts and empty
    /// remarks are ignored; a trailing period is dropped.
    pub fn set(&mut self, part: usize, remark: &str) {
        let Some(slot) = part.checked_sub(1).and_then(|i| self.parts.get_mut(i)) else {
            return;
        };
        let remark = remark.trim().trim_end_matches('.').trim_end();
        if !remark.is_empty() {
            *slot = Some(remark.to_string());
        }
    }

    pub fn get(&self, part: usize) -> Option<&str> {
        part.checked_sub(1)
            .and_then(|i| self.parts.get(i))
            .and_then(|p| p.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(Option::is_none)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_country_code_translates_alpha3_and_numeric() {
        assert_eq!("fi".parse::<CountryCode>().unwrap().as_str(), "FI");
        assert_eq!("FIN".parse::<CountryCode>().unwrap().as_str(), "FI");
        assert_eq!("246".parse::<CountryCode>().unwrap().as_str(), "FI");
        assert_eq!("4".parse::<CountryCode>().unwrap().as_str(), "AF");
        assert_eq!(" deu ".parse::<CountryCode>().unwrap().as_str(), "DE");
    }

    #[test]
    fn test_country_code_rejects_bad_input() {
        assert_eq!(
            "ZZ".parse::<CountryCode>(),
            Err(CountryCodeError::Unknown("ZZ".to_string()))
        );
        assert!(matches!(
            "F1N".parse::<CountryCode>(),
            Err(CountryCodeError::InvalidFormat(_))
        ));
        assert!(matches!(
            "".parse::<CountryCode>(),
            Err(CountryCodeError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_country_code_serde_validates() {
        let code: CountryCode = serde_json::from_str("\"GBR\"").unwrap();
        assert_eq!(code.as_str(), "GB");
        assert!(serde_json::from_str::<CountryCode>("\"QQ\"").is_err());
    }

    #[test]
    fn test_change_record_json_keys() {
        let record = ChangeRecord {
            date_issued: "2014-06-01 (corrected 2014-06-01)".to_string(),
            code_subdivision_change: "Subdivisions added: FI-13.".to_string(),
            description_of_change: String::new(),
            edition_newsletter: "Newsletter II-3.".to_string(),
        };
        let json = serde_json::to_value(&record).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        assert_eq!(keys.len(), 4);
        for key in [DATE_ISSUED, CODE_SUBDIVISION_CHANGE, DESCRIPTION_OF_CHANGE, EDITION_NEWSLETTER] {
            assert!(keys.contains(&key), "missing key {key}");
        }
        assert_eq!(record.issue_year(), "2014");
        assert_eq!(record.issue_date().unwrap().to_string(), "2014-06-01");
    }

    #[test]
    fn test_remarks_bundle_slots() {
        let mut remarks = RemarksBundle::default();
        assert!(remarks.is_empty());
        remarks.set(2, "Second remark.");
        remarks.set(5, "ignored");
        remarks.set(0, "ignored");
        remarks.set(3, "   ");
        assert_eq!(remarks.get(2), Some("Second remark"));
        assert_eq!(remarks.get(3), None);
        assert!(!remarks.is_empty());
    }
}
