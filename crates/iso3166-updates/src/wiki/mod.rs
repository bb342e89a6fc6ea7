mod parser;
pub mod scraper;

pub use parser::parse_changes_tables;
pub use scraper::{ScraperError, WebScraper};

pub(crate) const BASE_URL: &str = "https://en.wikipedia.org/wiki";
