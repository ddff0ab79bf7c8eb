use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://www.vuokraovi.com";
pub const DEFAULT_SEARCH_URL: &str = "https://www.vuokraovi.com/haku/vuokra-asunnot?locale=fi";
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_millis(500);

/// Parameters of one search run
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// URL-encoded search form, posted verbatim
    pub form_body: String,
    /// Maximum number of pages to fetch (0 = no limit)
    pub max_pages: usize,
    /// Origin used to resolve relative links
    pub base_url: String,
    /// Endpoint the initial POST goes to
    pub search_url: String,
    /// Pause between successive page requests
    pub page_delay: Duration,
}

impl SearchRequest {
    /// Search against the live site with the default endpoints
    pub fn new(form_body: impl Into<String>, max_pages: usize) -> Self {
        Self {
            form_body: form_body.into(),
            max_pages,
            base_url: DEFAULT_BASE_URL.to_string(),
            search_url: DEFAULT_SEARCH_URL.to_string(),
            page_delay: DEFAULT_PAGE_DELAY,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_search_url(mut self, search_url: impl Into<String>) -> Self {
        self.search_url = search_url.into();
        self
    }

    pub fn with_page_delay(mut self, page_delay: Duration) -> Self {
        self.page_delay = page_delay;
        self
    }

    /// Whether page number `page` (1-based) is beyond the configured limit
    pub fn exceeds_limit(&self, page: usize) -> bool {
        self.max_pages > 0 && page > self.max_pages
    }
}
