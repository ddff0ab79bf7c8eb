use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use vuokra_watch::scrapers::extract::parse_page;
use vuokra_watch::scrapers::{Method, Transport};
use vuokra_watch::{
    FetchError, Listing, ListingSource, Reconciler, SearchRequest, Store, SubscriberProfile,
    VuokraoviScraper,
};

const BASE: &str = "https://www.vuokraovi.com";
const SEARCH: &str = "https://www.vuokraovi.com/haku/vuokra-asunnot?locale=fi";
const RESULTS: &str = include_str!("fixtures/results_page.html");
const NO_RESULTS: &str = include_str!("fixtures/no_results.html");

#[test]
fn results_fixture_extracts_in_document_order() {
    let parsed = parse_page(RESULTS, BASE);

    assert_eq!(
        parsed.listings,
        vec![
            Listing {
                title: "Helsinginkatu 12 B 34".into(),
                address: "Helsinginkatu 12 B 34, 00500 Helsinki".into(),
                price: "895 €/kk".into(),
                size: "34 m²".into(),
                rooms: "1h + kk + parveke".into(),
                available_from: "Vapaa 1.11.2024".into(),
                link: "https://www.vuokraovi.com/vuokra-asunto/helsinki/kallio/kerrostalo/833421?rt=Kerrostalo&ref=search".into(),
            },
            Listing {
                title: "Etela-Tapiola".into(),
                address: "Etela-Tapiola, Espoo".into(),
                price: "1 450 €/kk".into(),
                size: "78,5 m²".into(),
                rooms: "3h + k + s".into(),
                available_from: String::new(),
                link: "https://www.vuokraovi.com/vuokra-asunto/espoo/etela-tapiola/rivitalo/840012".into(),
            },
            Listing {
                title: "Tikkurila".into(),
                address: "Tikkurila, Vantaa".into(),
                link: "https://www.vuokraovi.com/vuokra-asunto/vantaa/tikkurila/kerrostalo/851177".into(),
                ..Listing::default()
            },
        ]
    );
    assert_eq!(
        parsed.next_page.as_deref(),
        Some("https://www.vuokraovi.com/haku/vuokra-asunnot?page=2&pageType=")
    );
}

#[test]
fn no_results_fixture_is_empty() {
    let parsed = parse_page(NO_RESULTS, BASE);
    assert!(parsed.listings.is_empty());
    assert_eq!(parsed.next_page, None);
}

/// Serves the results fixture for the search and a no-results page after it
struct FixtureTransport {
    pages: HashMap<String, String>,
    calls: Mutex<Vec<Method>>,
}

impl FixtureTransport {
    fn new() -> Self {
        let mut pages = HashMap::new();
        pages.insert(SEARCH.to_string(), RESULTS.to_string());
        pages.insert(
            format!("{BASE}/haku/vuokra-asunnot?page=2&pageType="),
            NO_RESULTS.to_string(),
        );
        Self {
            pages,
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Transport for FixtureTransport {
    async fn fetch_page(&self, method: Method, url: &str, _form: &str) -> Result<String, FetchError> {
        self.calls.lock().unwrap().push(method);
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

/// Runs the real scraper over the fixture transport
struct FixtureSource {
    transport: FixtureTransport,
}

#[async_trait]
impl ListingSource for FixtureSource {
    async fn fetch_all(&self, request: &SearchRequest) -> Result<Vec<Listing>, FetchError> {
        VuokraoviScraper::new()
            .fetch_with(&self.transport, request)
            .await
    }

    fn source_name(&self) -> &'static str {
        "fixture"
    }
}

fn search_request() -> SearchRequest {
    SearchRequest::new("hakutyyppi=vuokra", 0).with_page_delay(Duration::ZERO)
}

#[tokio::test]
async fn pipeline_registers_usable_listings_once() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(Store::open(dir.path()).await);
    let source = Arc::new(FixtureSource {
        transport: FixtureTransport::new(),
    });
    let reconciler = Reconciler::new(source.clone(), Arc::clone(&store), search_request());

    let new = reconciler.run().await.unwrap();

    let links: Vec<_> = new.iter().map(|l| l.link.as_str()).collect();
    assert_eq!(
        links,
        [
            "https://www.vuokraovi.com/vuokra-asunto/helsinki/kallio/kerrostalo/833421",
            "https://www.vuokraovi.com/vuokra-asunto/espoo/etela-tapiola/rivitalo/840012",
        ]
    );
    assert_eq!(
        *source.transport.calls.lock().unwrap(),
        vec![Method::Post, Method::Get]
    );

    assert!(reconciler.run().await.unwrap().is_empty());
}

#[tokio::test]
async fn known_listings_survive_restart() {
    let dir = TempDir::new().unwrap();

    {
        let store = Arc::new(Store::open(dir.path()).await);
        store
            .add_or_update_subscriber(11, SubscriberProfile::default())
            .await
            .unwrap();
        let source = Arc::new(FixtureSource {
            transport: FixtureTransport::new(),
        });
        let reconciler = Reconciler::new(source, Arc::clone(&store), search_request());
        assert_eq!(reconciler.run().await.unwrap().len(), 2);
        store
            .mark_seen(11, "https://www.vuokraovi.com/vuokra-asunto/espoo/etela-tapiola/rivitalo/840012?x=1")
            .await
            .unwrap();
    }

    let store = Arc::new(Store::open(dir.path()).await);
    let source = Arc::new(FixtureSource {
        transport: FixtureTransport::new(),
    });
    let reconciler = Reconciler::new(source, Arc::clone(&store), search_request());
    assert!(reconciler.run().await.unwrap().is_empty());

    let unseen = store.unseen_listings(11).await.unwrap();
    assert_eq!(unseen.len(), 1);
    assert_eq!(unseen[0].title, "Helsinginkatu 12 B 34");
}
