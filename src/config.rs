use crate::reconciler::Schedule;
use crate::scrapers::types::{DEFAULT_BASE_URL, DEFAULT_PAGE_DELAY, DEFAULT_SEARCH_URL};
use crate::scrapers::SearchRequest;
use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub form_file: PathBuf,
    pub max_pages: usize,
    pub update_interval: Duration,
    pub startup_grace: Duration,
    pub page_delay: Duration,
    pub base_url: String,
    pub search_url: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key/value source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            data_dir: lookup("VUOKRA_DATA_DIR")
                .unwrap_or_else(|| "data".to_string())
                .into(),
            form_file: lookup("VUOKRA_FORM_FILE")
                .unwrap_or_else(|| "form_data.txt".to_string())
                .into(),
            max_pages: parse_or(&lookup, "VUOKRA_MAX_PAGES", 0)?,
            update_interval: Duration::from_secs(non_zero(
                parse_or(&lookup, "VUOKRA_UPDATE_INTERVAL_SECS", 600)?,
                "VUOKRA_UPDATE_INTERVAL_SECS",
            )?),
            startup_grace: Duration::from_secs(parse_or(&lookup, "VUOKRA_STARTUP_GRACE_SECS", 30)?),
            page_delay: Duration::from_millis(parse_or(
                &lookup,
                "VUOKRA_PAGE_DELAY_MS",
                DEFAULT_PAGE_DELAY.as_millis() as u64,
            )?),
            base_url: lookup("VUOKRA_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            search_url: lookup("VUOKRA_SEARCH_URL").unwrap_or_else(|| DEFAULT_SEARCH_URL.to_string()),
        })
    }

    pub fn schedule(&self) -> Schedule {
        Schedule {
            interval: self.update_interval,
            startup_grace: self.startup_grace,
        }
    }

    /// Read the form file and build the search it describes.
    /// The form body is posted exactly as stored.
    pub async fn search_request(&self) -> Result<SearchRequest> {
        let form_body = tokio::fs::read_to_string(&self.form_file)
            .await
            .with_context(|| format!("error reading form data from {}", self.form_file.display()))?;

        Ok(SearchRequest::new(form_body, self.max_pages)
            .with_base_url(&self.base_url)
            .with_search_url(&self.search_url)
            .with_page_delay(self.page_delay))
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a valid number")),
        None => Ok(default),
    }
}

fn non_zero(value: u64, key: &str) -> Result<u64> {
    if value == 0 {
        bail!("{key} must be greater than zero");
    }
    Ok(value)
}
