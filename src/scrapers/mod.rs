pub mod extract;
pub mod traits;
pub mod transport;
pub mod types;
pub mod vuokraovi;

pub use traits::{ListingSource, Method, Transport};
pub use transport::HttpTransport;
pub use types::SearchRequest;
pub use vuokraovi::VuokraoviScraper;
