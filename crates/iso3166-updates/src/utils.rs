use std::collections::BTreeSet;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::countries::parse_country_codes;
use crate::types::{Aggregate, ChangeRecord, CountryCode, CountryCodeError};

static RE_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[12]\d{3}$").expect("invalid regex: year"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum YearExpressionError {
    #[error("Invalid year '{0}'. Years must be 4 digits starting with 1 or 2")]
    InvalidYear(String),
}

/// Which issue years a request covers.
///
/// Parsed from `"2010"`, `"2010,2015"`, `"2010-2015"`, `">2010"` (2010 and
/// later) or `"<2010"` (before 2010). Years are validated to four digits, so
/// string comparison orders them correctly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum YearExpression {
    #[default]
    Any,
    Exact(BTreeSet<String>),
    Range(String, String),
    AtLeast(String),
    Before(String),
}

impl YearExpression {
    pub fn includes(&self, year: &str) -> bool {
        match self {
            YearExpression::Any => true,
            // Undated rows only pass an unrestricted filter.
            _ if year.is_empty() => false,
            YearExpression::Exact(years) => years.contains(year),
            YearExpression::Range(lo, hi) => lo.as_str() <= year && year <= hi.as_str(),
            YearExpression::AtLeast(from) => year >= from.as_str(),
            YearExpression::Before(until) => year < until.as_str(),
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, YearExpression::Any)
    }

    /// Filename-safe spelling, e.g. `gt2010` for `>2010`.
    pub fn slug(&self) -> String {
        match self {
            YearExpression::AtLeast(y) => format!("gt{}", y),
            YearExpression::Before(y) => format!("lt{}", y),
            other => other.to_string(),
        }
    }
}

fn validate_year(token: &str) -> Result<String, YearExpressionError> {
    if RE_YEAR.is_match(token) {
        Ok(token.to_string())
    } else {
        Err(YearExpressionError::InvalidYear(token.to_string()))
    }
}

fn parse_comparator(
    expr: &str,
    bound: &str,
    build: fn(String) -> YearExpression,
) -> Result<YearExpression, YearExpressionError> {
    if bound.is_empty() || bound.contains([',', '-', '<', '>']) {
        log::warn!("Ignoring malformed year comparison '{}'", expr);
        return Ok(YearExpression::Any);
    }
    validate_year(bound).map(build)
}

impl FromStr for YearExpression {
    type Err = YearExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let expr: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        if expr.is_empty() {
            return Ok(YearExpression::Any);
        }

        if let Some(bound) = expr.strip_prefix('>') {
            return parse_comparator(&expr, bound, YearExpression::AtLeast);
        }
        if let Some(bound) = expr.strip_prefix('<') {
            return parse_comparator(&expr, bound, YearExpression::Before);
        }

        if expr.contains('-') {
            let bounds: Vec<&str> = expr.split('-').collect();
            let [lo, hi] = bounds.as_slice() else {
                log::warn!("Ignoring malformed year range '{}'", expr);
                return Ok(YearExpression::Any);
            };
            let (lo, hi) = (validate_year(lo)?, validate_year(hi)?);
            return Ok(if lo <= hi {
                YearExpression::Range(lo, hi)
            } else {
                YearExpression::Range(hi, lo)
            });
        }

        let years = expr
            .split(',')
            .filter(|t| !t.is_empty())
            .map(validate_year)
            .collect::<Result<BTreeSet<_>, _>>()?;
        if years.is_empty() {
            return Ok(YearExpression::Any);
        }
        Ok(YearExpression::Exact(years))
    }
}

impl Display for YearExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            YearExpression::Any => Ok(()),
            YearExpression::Exact(years) => {
                write!(f, "{}", years.iter().cloned().collect::<Vec<_>>().join(","))
            }
            YearExpression::Range(lo, hi) => write!(f, "{}-{}", lo, hi),
            YearExpression::AtLeast(y) => write!(f, ">{}", y),
            YearExpression::Before(y) => write!(f, "<{}", y),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error(transparent)]
    Country(#[from] CountryCodeError),
    #[error(transparent)]
    Year(#[from] YearExpressionError),
}

/// Country and year selection over a harvested [`Aggregate`].
#[derive(Debug, Clone, Default)]
pub struct UpdatesFilter {
    pub countries: Vec<CountryCode>,
    pub year: YearExpression,
}

impl UpdatesFilter {
    pub fn parse(countries: Option<&str>, year: Option<&str>) -> Result<Self, FilterError> {
        Ok(Self {
            countries: countries
                .map(parse_country_codes)
                .transpose()?
                .unwrap_or_default(),
            year: year.map(str::parse).transpose()?.unwrap_or_default(),
        })
    }

    /// Countries that were named explicitly keep an entry even when nothing
    /// matches; an all-countries selection drops empty entries.
    pub fn apply(&self, aggregate: &Aggregate) -> Aggregate {
        if self.countries.is_empty() {
            return aggregate
                .iter()
                .map(|(code, records)| (code.clone(), self.filter_records(records)))
                .filter(|(_, records)| !records.is_empty())
                .collect();
        }

        self.countries
            .iter()
            .map(|code| {
                let records = aggregate
                    .get(code.as_str())
                    .map(|r| self.filter_records(r))
                    .unwrap_or_default();
                (code.to_string(), records)
            })
            .collect()
    }

    fn filter_records(&self, records: &[ChangeRecord]) -> Vec<ChangeRecord> {
        records
            .iter()
            .filter(|r| self.year.includes(r.issue_year()))
            .cloned()
            .collect()
    }
}

#[derive(Debug)]
pub struct UpdateStats {
    pub countries: usize,
    pub records: usize,
    pub latest: Option<NaiveDate>,
}

impl UpdateStats {
    pub fn from_aggregate(aggregate: &Aggregate) -> UpdateStats {
        UpdateStats {
            countries: aggregate.len(),
            records: aggregate.values().map(Vec::len).sum(),
            latest: aggregate
                .values()
                .flatten()
                .filter_map(ChangeRecord::issue_date)
                .max(),
        }
    }
}

impl Display for UpdateStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\nStatistics:")?;
        writeln!(f, "  Countries:      {}", self.countries)?;
        writeln!(f, "  Change records: {}", self.records)?;
        match self.latest {
            Some(date) => writeln!(f, "  Latest change:  {}", date),
            None => writeln!(f, "  Latest change:  -"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(date: &str) -> ChangeRecord {
        ChangeRecord {
            date_issued: date.to_string(),
            code_subdivision_change: format!("Change on {date}."),
            description_of_change: String::new(),
            edition_newsletter: String::new(),
        }
    }

    fn expr(s: &str) -> YearExpression {
        s.parse().unwrap()
    }

    #[test]
    fn test_year_expression_inclusion_rules() {
        assert!(expr("2010-2015").includes("2012"));
        assert!(!expr("2010-2015").includes("2009"));
        assert!(expr("2010-2015").includes("2015"));
        assert!(expr(">2010").includes("2010"));
        assert!(!expr(">2010").includes("2009"));
        assert!(expr("<2010").includes("2009"));
        assert!(!expr("<2010").includes("2010"));
        assert!(expr("2010,2015").includes("2015"));
        assert!(!expr("2010,2015").includes("2012"));
        assert!(expr("").includes("1999"));
    }

    #[test]
    fn test_empty_year_only_matches_any() {
        assert!(expr("").includes(""));
        assert!(!expr("<2010").includes(""));
        assert!(!expr(">2010").includes(""));
        assert!(!expr("2010-2015").includes(""));
        assert!(!expr("2010").includes(""));
    }

    #[test]
    fn test_year_expression_parsing() {
        assert_eq!(expr(" "), YearExpression::Any);
        assert_eq!(expr("2016"), YearExpression::Exact(["2016".to_string()].into()));
        assert_eq!(
            expr("2015 - 2010"),
            YearExpression::Range("2010".to_string(), "2015".to_string())
        );
        assert_eq!(expr("> 2020"), YearExpression::AtLeast("2020".to_string()));
        assert_eq!(expr("<2004"), YearExpression::Before("2004".to_string()));
    }

    #[test]
    fn test_year_expression_rejects_bad_tokens() {
        for bad in ["201", "abcd", "3010", "2010,20x1", ">99999", "<0999", "2010-"] {
            assert!(bad.parse::<YearExpression>().is_err(), "{bad} should be rejected");
        }
        assert_eq!(
            "2010,abc".parse::<YearExpression>(),
            Err(YearExpressionError::InvalidYear("abc".to_string()))
        );
    }

    #[test]
    fn test_malformed_ranges_degrade_to_no_filter() {
        assert_eq!(expr("2010-2012-2014"), YearExpression::Any);
        assert_eq!(expr(">2010,2012"), YearExpression::Any);
        assert_eq!(expr("<"), YearExpression::Any);
    }

    #[test]
    fn test_year_expression_display_round_trip() {
        for s in ["2010,2015", "2010-2015", ">2010", "<2010"] {
            assert_eq!(expr(s).to_string(), s);
        }
        assert_eq!(expr(">2010").slug(), "gt2010");
    }

    #[test]
    fn test_filter_omits_empty_countries_only_for_all() {
        let mut aggregate = Aggregate::new();
        aggregate.insert("FI".into(), vec![record("2022-11-29"), record("2018-11-26")]);
        aggregate.insert("AD".into(), vec![record("2015-11-27")]);

        let all = UpdatesFilter::parse(None, Some(">2020")).unwrap();
        let result = all.apply(&aggregate);
        assert_eq!(result.keys().collect::<Vec<_>>(), vec!["FI"]);
        assert_eq!(result["FI"].len(), 1);

        let explicit = UpdatesFilter::parse(Some("AD,FI,DE"), Some(">2020")).unwrap();
        let result = explicit.apply(&aggregate);
        assert_eq!(result.keys().collect::<Vec<_>>(), vec!["AD", "DE", "FI"]);
        assert!(result["AD"].is_empty());
        assert!(result["DE"].is_empty());
    }

    #[test]
    fn test_filter_parse_errors() {
        assert!(matches!(
            UpdatesFilter::parse(Some("QQ"), None),
            Err(FilterError::Country(_))
        ));
        assert!(matches!(
            UpdatesFilter::parse(None, Some("20100")),
            Err(FilterError::Year(_))
        ));
    }

    #[test]
    fn test_update_stats() {
        let mut aggregate = Aggregate::new();
        aggregate.insert("FI".into(), vec![record("2022-11-29"), record("2018-11-26")]);
        aggregate.insert("AD".into(), vec![record("2015-11-27 (corrected 2015-12-01)")]);
        let stats = UpdateStats::from_aggregate(&aggregate);
        assert_eq!(stats.countries, 2);
        assert_eq!(stats.records, 3);
        assert_eq!(stats.latest.unwrap().to_string(), "2022-11-29");
    }
}
