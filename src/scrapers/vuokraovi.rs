use crate::error::FetchError;
use crate::models::Listing;
use crate::scrapers::extract::parse_page;
use crate::scrapers::traits::{ListingSource, Method, Transport};
use crate::scrapers::transport::HttpTransport;
use crate::scrapers::types::SearchRequest;
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Paginating scraper for vuokraovi.com search results
#[derive(Debug, Default, Clone, Copy)]
pub struct VuokraoviScraper;

impl VuokraoviScraper {
    pub fn new() -> Self {
        Self
    }

    /// Run one search over `transport`.
    ///
    /// The search is posted first, then `rel="next"` links are followed with
    /// GET requests. A failure on the first page is an error; a failure on any
    /// later page ends pagination and keeps the pages fetched so far.
    pub async fn fetch_with(
        &self,
        transport: &dyn Transport,
        request: &SearchRequest,
    ) -> Result<Vec<Listing>, FetchError> {
        info!(url = %request.search_url, "Sending initial search request");

        let body = transport
            .fetch_page(Method::Post, &request.search_url, &request.form_body)
            .await?;
        let first = parse_page(&body, &request.base_url);
        info!(page = 1, count = first.listings.len(), "Found listings on page");

        let mut listings = first.listings;
        let mut next_page = first.next_page;
        let mut page_num = 2;

        while let Some(url) = next_page.take() {
            if request.exceeds_limit(page_num) {
                info!(max_pages = request.max_pages, "Reached maximum number of pages, stopping pagination");
                break;
            }

            tokio::time::sleep(request.page_delay).await;
            debug!(page = page_num, %url, "Fetching page");

            let body = match transport.fetch_page(Method::Get, &url, "").await {
                Ok(body) => body,
                Err(err) => {
                    warn!(page = page_num, error = %err, "Error fetching page, keeping earlier pages");
                    break;
                }
            };

            let parsed = parse_page(&body, &request.base_url);
            info!(page = page_num, count = parsed.listings.len(), "Found listings on page");
            listings.extend(parsed.listings);
            next_page = parsed.next_page;
            page_num += 1;
        }

        Ok(listings)
    }
}

#[async_trait]
impl ListingSource for VuokraoviScraper {
    async fn fetch_all(&self, request: &SearchRequest) -> Result<Vec<Listing>, FetchError> {
        // Fresh cookie session for every run
        let transport = HttpTransport::new()?;
        self.fetch_with(&transport, request).await
    }

    fn source_name(&self) -> &'static str {
        "Vuokraovi"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use crate::scrapers::types::DEFAULT_PAGE_DELAY;
    use std::time::Duration;
    use tokio::time::Instant;

    const BASE: &str = "https://site.test";
    const SEARCH: &str = "https://site.test/haku";

    /// Serves canned bodies by URL and records every request
    #[derive(Default)]
    struct ScriptedTransport {
        pages: HashMap<String, Result<String, u16>>,
        requests: Mutex<Vec<(Method, String, String)>>,
        sent_at: Mutex<Vec<Instant>>,
    }

    impl ScriptedTransport {
        fn page(mut self, url: &str, body: String) -> Self {
            self.pages.insert(url.to_string(), Ok(body));
            self
        }

        fn failing(mut self, url: &str, status: u16) -> Self {
            self.pages.insert(url.to_string(), Err(status));
            self
        }

        fn requests(&self) -> Vec<(Method, String, String)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn fetch_page(&self, method: Method, url: &str, form: &str) -> Result<String, FetchError> {
            self.requests
                .lock()
                .unwrap()
                .push((method, url.to_string(), form.to_string()));
            self.sent_at.lock().unwrap().push(Instant::now());
            match self.pages.get(url) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(status)) => Err(FetchError::Status { url: url.to_string(), status: *status }),
                None => Err(FetchError::Status { url: url.to_string(), status: 404 }),
            }
        }
    }

    fn result_page(id: usize, next: Option<&str>) -> String {
        let next = next
            .map(|href| format!(r#"<link rel="next" href="{href}">"#))
            .unwrap_or_default();
        format!(
            r#"<html><head>{next}</head><body>
               <div class="list-item-container">
                 <span class="price">{id}00 €/kk</span>
                 <a class="list-item-link" href="/vuokra-asunto/helsinki/kallio/kerrostalo/{id}">x</a>
               </div></body></html>"#
        )
    }

    fn request(max_pages: usize) -> SearchRequest {
        SearchRequest::new("rooms=2&city=helsinki", max_pages)
            .with_base_url(BASE)
            .with_search_url(SEARCH)
            .with_page_delay(Duration::ZERO)
    }

    fn five_page_chain() -> ScriptedTransport {
        let mut transport = ScriptedTransport::default().page(SEARCH, result_page(1, Some("/haku?page=2")));
        for id in 2..=5 {
            transport = transport.page(
                &format!("{BASE}/haku?page={id}"),
                result_page(id, Some(&format!("/haku?page={}", id + 1))),
            );
        }
        transport
    }

    #[tokio::test]
    async fn stops_at_max_pages() {
        let transport = five_page_chain();
        let listings = VuokraoviScraper::new()
            .fetch_with(&transport, &request(2))
            .await
            .unwrap();

        let prices: Vec<_> = listings.iter().map(|l| l.price.as_str()).collect();
        assert_eq!(prices, ["100 €/kk", "200 €/kk"]);
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_between_pages_but_not_before_the_search() {
        let transport = five_page_chain();
        let started = Instant::now();
        VuokraoviScraper::new()
            .fetch_with(&transport, &request(3).with_page_delay(DEFAULT_PAGE_DELAY))
            .await
            .unwrap();

        let sent_at = transport.sent_at.lock().unwrap().clone();
        assert_eq!(sent_at.len(), 3);
        assert_eq!(sent_at[0].duration_since(started), Duration::ZERO);
        for pair in sent_at.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= DEFAULT_PAGE_DELAY);
        }
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn posts_form_then_follows_with_get() {
        let transport = five_page_chain();
        VuokraoviScraper::new()
            .fetch_with(&transport, &request(3))
            .await
            .unwrap();

        let requests = transport.requests();
        assert_eq!(
            requests[0],
            (Method::Post, SEARCH.to_string(), "rooms=2&city=helsinki".to_string())
        );
        assert_eq!(requests[1].0, Method::Get);
        assert_eq!(requests[1].1, "https://site.test/haku?page=2");
        assert_eq!(requests[2].1, "https://site.test/haku?page=3");
    }

    #[tokio::test]
    async fn later_page_failure_keeps_earlier_pages() {
        let transport = ScriptedTransport::default()
            .page(SEARCH, result_page(1, Some("/haku?page=2")))
            .page(&format!("{BASE}/haku?page=2"), result_page(2, Some("/haku?page=3")))
            .failing(&format!("{BASE}/haku?page=3"), 503);

        let listings = VuokraoviScraper::new()
            .fetch_with(&transport, &request(0))
            .await
            .unwrap();
        assert_eq!(listings.len(), 2);
    }

    #[tokio::test]
    async fn stops_without_next_link() {
        let transport = ScriptedTransport::default().page(SEARCH, result_page(1, None));
        let listings = VuokraoviScraper::new()
            .fetch_with(&transport, &request(0))
            .await
            .unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(
            listings[0].link,
            "https://site.test/vuokra-asunto/helsinki/kallio/kerrostalo/1"
        );
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn first_page_failure_is_an_error() {
        let transport = ScriptedTransport::default().failing(SEARCH, 500);
        let err = VuokraoviScraper::new()
            .fetch_with(&transport, &request(0))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 500, .. }));
    }
}
