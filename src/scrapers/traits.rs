use crate::error::FetchError;
use crate::models::Listing;
use crate::scrapers::types::SearchRequest;
use async_trait::async_trait;

/// HTTP method used for one page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One request/response exchange against the listing site.
///
/// Implementations keep a single session (cookies) across calls; the
/// paginated results are only served to the session that posted the search.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and return the body of a 200 response.
    ///
    /// `form` is the URL-encoded body for POST requests and ignored for GET.
    async fn fetch_page(&self, method: Method, url: &str, form: &str) -> Result<String, FetchError>;
}

/// Common trait for listing sources.
/// The reconciler only needs "give me every listing of one search run".
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch all pages of one search
    async fn fetch_all(&self, request: &SearchRequest) -> Result<Vec<Listing>, FetchError>;

    /// Get the name of the listing source
    fn source_name(&self) -> &'static str;
}
