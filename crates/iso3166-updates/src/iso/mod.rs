//! ISO Online Browsing Platform catalogue pages. The page is built client
//! side, so it is fetched through a rendering service.

mod parser;
pub mod scraper;

pub use parser::{has_summary_panel, parse_changes_table, parse_remarks};
pub use scraper::{RenderConfig, ScraperError, WebScraper};

use crate::types::CountryCode;

pub(crate) const BASE_URL: &str = "https://www.iso.org/obp/ui/";

/// Catalogue page of `country`, also used as the default edition reference.
pub fn catalogue_url(country: &CountryCode) -> String {
    format!("{}#iso:code:3166:{}", BASE_URL, country)
}
