//! Scrape vuokraovi.com rental listings and surface only the new ones.
//!
//! The pipeline is fetch ([`scrapers`]) → register and diff ([`store`]) →
//! notify ([`reconciler`]). The chat layer that consumes it lives elsewhere.

pub mod config;
pub mod error;
pub mod models;
pub mod reconciler;
pub mod scrapers;
pub mod store;

pub use error::{FetchError, NotPersisted, Persisted, StoreError};
pub use models::{canonical_link, Listing, Subscriber, SubscriberId, SubscriberProfile};
pub use reconciler::{LogNotifier, Notifier, Reconciler, Schedule};
pub use scrapers::{ListingSource, SearchRequest, VuokraoviScraper};
pub use store::Store;
