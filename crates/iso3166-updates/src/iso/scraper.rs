use super::parser::has_summary_panel;
use crate::types::CountryCode;

use reqwest::{Client, Url};
use std::time::Duration;

pub const DEFAULT_RENDER_ENDPOINT: &str = "http://localhost:8050/render.html";

#[derive(Debug, thiserror::Error)]
pub enum ScraperError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Invalid render endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("Summary section for {country} not found after {attempts} attempt(s)")]
    SectionNotFound { country: String, attempts: u32 },
}

/// Where and how the catalogue page gets rendered.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub endpoint: String,
    pub wait_secs: f64,
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_RENDER_ENDPOINT.to_string(),
            wait_secs: 5.0,
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebScraper {
    client: Client,
    config: RenderConfig,
}

impl WebScraper {
    pub fn new(config: RenderConfig) -> Result<Self, ScraperError> {
        Url::parse(&config.endpoint).map_err(|e| ScraperError::InvalidEndpoint {
            endpoint: config.endpoint.clone(),
            reason: e.to_string(),
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(60) + Duration::from_secs_f64(config.wait_secs.max(0.0)))
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self { client, config })
    }

    fn render_url(&self, country: &CountryCode) -> Result<Url, ScraperError> {
        Url::parse_with_params(
            &self.config.endpoint,
            &[
                ("url", super::catalogue_url(country)),
                ("wait", self.config.wait_secs.to_string()),
            ],
        )
        .map_err(|e| ScraperError::InvalidEndpoint {
            endpoint: self.config.endpoint.clone(),
            reason: e.to_string(),
        })
    }

    /// Fetches the rendered catalogue page, retrying until the summary panel
    /// shows up or the attempts run out.
    pub async fn fetch_catalogue_page(&self, country: &CountryCode) -> Result<String, ScraperError> {
        let url = self.render_url(country)?;
        let attempts = self.config.max_attempts.max(1);

        for attempt in 1..=attempts {
            log::info!("Fetching catalogue page for {} (attempt {}/{})...", country, attempt, attempts);
            match self.get_html(url.clone()).await {
                Ok(html) if has_summary_panel(&html) => return Ok(html),
                Ok(_) => log::warn!("{}: rendered page has no summary section", country),
                Err(e) => log::warn!("{}: render request failed: {}", country, e),
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        Err(ScraperError::SectionNotFound {
            country: country.to_string(),
            attempts,
        })
    }

    async fn get_html(&self, url: Url) -> Result<String, ScraperError> {
        Ok(self
            .client
            .get(url)
            .send()
            .await
            .inspect_err(|e| log::error!("HTTP error: {e:?}"))?
            .error_for_status()?
            .text()
            .await
            .inspect_err(|e| log::error!("Decode error: {e:?}"))?)
    }
}
