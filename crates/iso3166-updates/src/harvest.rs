use std::collections::BTreeMap;
use std::fmt::Display;

use futures::{StreamExt, future, stream};

use crate::countries::all_countries;
use crate::iso::{self, RenderConfig};
use crate::reconcile::{merge_remarks, reconcile};
use crate::records::{ParseError, parse_records};
use crate::types::{Aggregate, ChangeRecord, CountryCode, Source};
use crate::utils::YearExpression;
use crate::wiki;

#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error("Wiki scraper error: {0}")]
    Wiki(#[from] wiki::ScraperError),
    #[error("Catalogue scraper error: {0}")]
    Iso(#[from] iso::ScraperError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Runs the whole pipeline for one country over already fetched pages.
/// A missing page contributes no records.
pub fn country_updates(
    country: &CountryCode,
    wiki_html: Option<&str>,
    iso_html: Option<&str>,
    year: &YearExpression,
) -> Result<Vec<ChangeRecord>, ParseError> {
    let mut wiki_records = Vec::new();
    if let Some(html) = wiki_html {
        for grid in wiki::parse_changes_tables(html)? {
            wiki_records.extend(parse_records(&grid, year, country)?);
        }
    }

    let mut iso_records = Vec::new();
    if let Some(html) = iso_html {
        let grid = iso::parse_changes_table(html)?;
        iso_records = parse_records(&grid, year, country)?;
        merge_remarks(&mut iso_records, &iso::parse_remarks(html));
    }

    log::debug!(
        "{}: {} record(s) from {}, {} from {}",
        country,
        wiki_records.len(),
        Source::Wiki,
        iso_records.len(),
        Source::Iso
    );
    Ok(reconcile(wiki_records, iso_records))
}

#[derive(Debug, Clone)]
pub struct HarvestOptions {
    pub year: YearExpression,
    /// Countries fetched at once; 1 runs them one after another.
    pub concurrency: usize,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            year: YearExpression::Any,
            concurrency: 1,
        }
    }
}

#[derive(Debug, Default)]
pub struct HarvestReport {
    pub updates: Aggregate,
    /// Alpha-2 code to the error that stopped that country.
    pub failures: BTreeMap<String, String>,
}

impl Display for HarvestReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\nHarvest summary:")?;
        writeln!(f, "  Countries:      {}", self.updates.len())?;
        writeln!(
            f,
            "  Change records: {}",
            self.updates.values().map(Vec::len).sum::<usize>()
        )?;
        writeln!(f, "  Failures:       {}", self.failures.len())?;
        for (code, reason) in &self.failures {
            writeln!(f, "    {}: {}", code, reason)?;
        }
        Ok(())
    }
}

pub struct Harvester {
    wiki: wiki::WebScraper,
    iso: iso::WebScraper,
    options: HarvestOptions,
}

impl Harvester {
    pub fn new(render: RenderConfig, options: HarvestOptions) -> Result<Self, HarvestError> {
        Ok(Self::with_scrapers(
            wiki::WebScraper::new()?,
            iso::WebScraper::new(render)?,
            options,
        ))
    }

    pub fn with_scrapers(
        wiki: wiki::WebScraper,
        iso: iso::WebScraper,
        options: HarvestOptions,
    ) -> Self {
        Self { wiki, iso, options }
    }

    pub async fn harvest_country(
        &self,
        country: &CountryCode,
    ) -> Result<Vec<ChangeRecord>, HarvestError> {
        let (wiki_html, iso_html) = future::join(
            self.wiki.fetch_country_page(country),
            self.iso.fetch_catalogue_page(country),
        )
        .await;

        let wiki_html = wiki_html
            .inspect_err(|e| log::warn!("{}: {} fetch failed, no changes used: {}", country, Source::Wiki, e))
            .ok();
        let iso_html = iso_html?;

        Ok(country_updates(
            country,
            wiki_html.as_deref(),
            Some(iso_html.as_str()),
            &self.options.year,
        )?)
    }

    /// Harvests `countries`, or every country when empty. A failing country is
    /// recorded in the report and the rest carry on, unless it was the only
    /// one requested.
    pub async fn harvest(&self, countries: &[CountryCode]) -> Result<HarvestReport, HarvestError> {
        let explicit = !countries.is_empty();
        let targets = if explicit {
            countries.to_vec()
        } else {
            all_countries()
        };
        log::info!("Harvesting {} country(ies)...", targets.len());

        let mut results: Vec<(CountryCode, Result<Vec<ChangeRecord>, HarvestError>)> =
            stream::iter(targets.iter())
                .map(|country| async move { (country.clone(), self.harvest_country(country).await) })
                .buffer_unordered(self.options.concurrency.max(1))
                .collect()
                .await;

        let single_failure = explicit && matches!(results.as_slice(), [(_, Err(_))]);
        if single_failure && let Some((_, Err(e))) = results.pop() {
            return Err(e);
        }

        let mut report = HarvestReport::default();
        for (country, result) in results {
            match result {
                Ok(records) if records.is_empty() && !explicit => {
                    log::debug!("{}: no matching records, omitted", country);
                }
                Ok(records) => {
                    report.updates.insert(country.to_string(), records);
                }
                Err(e) => {
                    log::error!("{}: {}", country, e);
                    report.failures.insert(country.to_string(), e.to_string());
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fi() -> CountryCode {
        "FI".parse().unwrap()
    }

    fn fixtures() -> (String, String) {
        (
            fs::read_to_string("fixtures/wiki_ISO_3166-2_FI.html").expect("Failed to read fixture"),
            fs::read_to_string("fixtures/iso_obp_FI.html").expect("Failed to read fixture"),
        )
    }

    #[test]
    fn test_country_updates_merges_both_sources() {
        let (wiki_html, iso_html) = fixtures();
        let records =
            country_updates(&fi(), Some(wiki_html.as_str()), Some(iso_html.as_str()), &YearExpression::Any)
                .expect("Should build records");

        let dates: Vec<&str> = records.iter().map(|r| r.date_issued.as_str()).collect();
        assert_eq!(
            dates,
            vec![
                "2022-11-29",
                "2021-11-25",
                "2020-11-24",
                "2014-06-01 (corrected 2014-06-01)",
                "2011-12-15 (corrected 2011-12-15)",
            ]
        );
        assert_eq!(records[3].code_subdivision_change, "Subdivisions added: FI-13.");
        assert_eq!(
            records[2].code_subdivision_change,
            "Update of Remark part 1 (åland Islands is also a separate code in ISO 3166-1 (AX))."
        );
        assert_eq!(records[0].edition_newsletter, crate::iso::catalogue_url(&fi()));
    }

    #[test]
    fn test_country_updates_applies_year_filter() {
        let (wiki_html, iso_html) = fixtures();
        let year: YearExpression = ">2020".parse().unwrap();
        let records = country_updates(&fi(), Some(wiki_html.as_str()), Some(iso_html.as_str()), &year).unwrap();
        let years: Vec<&str> = records.iter().map(ChangeRecord::issue_year).collect();
        assert_eq!(years, vec!["2022", "2021", "2020"]);
    }

    #[test]
    fn test_country_updates_without_pages_is_empty() {
        let records = country_updates(&fi(), None, None, &YearExpression::Any).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_country_updates_ignores_codes_changed_subtable() {
        let wiki_html = r#"<html><body>
            <h2 id="Changes">Changes</h2>
            <table><tr><th>Date issued</th><th>Description of change</th></tr>
            <tr><td>2014-11-03</td><td>Subdivisions added: FI-13</td></tr></table>
            <h3>Codes changed</h3>
            <table><tr><th>Before</th><th>After</th><th>Subdivision name</th></tr>
            <tr><td>FI-AL</td><td>FI-01</td><td>Ahvenanmaan maakunta</td></tr></table>
        </body></html>"#;
        let records = country_updates(&fi(), Some(wiki_html), None, &YearExpression::Any)
            .expect("Date-less subtable should not fail the country");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].date_issued, "2014-11-03");
    }

    #[test]
    fn test_report_summary() {
        let mut report = HarvestReport::default();
        report.updates.insert("FI".into(), Vec::new());
        report.failures.insert("AD".into(), "timed out".into());
        let summary = report.to_string();
        assert!(summary.contains("Countries:      1"));
        assert!(summary.contains("AD: timed out"));
    }

    fn offline_harvester() -> Harvester {
        let render = RenderConfig {
            endpoint: "http://127.0.0.1:9/render.html".to_string(),
            wait_secs: 0.0,
            max_attempts: 1,
            retry_delay: std::time::Duration::from_millis(1),
        };
        let wiki = wiki::WebScraper::new()
            .unwrap()
            .with_base_url("http://127.0.0.1:9/wiki");
        Harvester::with_scrapers(
            wiki,
            iso::WebScraper::new(render).unwrap(),
            HarvestOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_single_country_failure_is_returned() {
        let err = offline_harvester().harvest(&[fi()]).await.unwrap_err();
        assert!(matches!(
            err,
            HarvestError::Iso(iso::ScraperError::SectionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_batch_failures_are_isolated() {
        let countries = vec!["AD".parse().unwrap(), fi()];
        let report = offline_harvester().harvest(&countries).await.unwrap();
        assert!(report.updates.is_empty());
        assert_eq!(report.failures.keys().collect::<Vec<_>>(), vec!["AD", "FI"]);
    }
}
