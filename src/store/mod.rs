//! Durable registry of known listings and subscribers.
//!
//! One lock covers both collections. Every mutating call normalizes and
//! writes the full snapshot before releasing it, so snapshot writes never
//! interleave with each other or with mutations.

pub mod snapshot;

use crate::error::{NotPersisted, Persisted};
use crate::models::{canonical_link, Listing, Subscriber, SubscriberId, SubscriberProfile};
use chrono::{DateTime, Duration, Utc};
use std::collections::btree_map::Entry;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

pub use snapshot::{Registry, SNAPSHOT_FILE};

/// Default inactivity window for [`Store::purge_inactive`]
pub fn default_inactivity() -> Duration {
    Duration::days(30)
}

/// Summary shown to a subscriber asking for status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub total_listings: usize,
    pub last_updated: DateTime<Utc>,
    pub notifications_enabled: Option<bool>,
}

pub struct Store {
    path: PathBuf,
    registry: Mutex<Registry>,
}

impl Store {
    /// Open the store in `data_dir`, loading the snapshot if there is one
    pub async fn open(data_dir: impl AsRef<Path>) -> Self {
        let path = data_dir.as_ref().join(SNAPSHOT_FILE);
        let registry = Registry::load(&path).await;
        info!(
            path = %path.display(),
            listings = registry.known_listings.len(),
            subscribers = registry.subscribers.len(),
            "Loaded registry"
        );
        Self {
            path,
            registry: Mutex::new(registry),
        }
    }

    /// Persist while still holding the lock, handing `value` back either way
    async fn commit<T: std::fmt::Debug>(
        &self,
        mut registry: MutexGuard<'_, Registry>,
        value: T,
    ) -> Persisted<T> {
        match registry.save(&self.path).await {
            Ok(()) => Ok(value),
            Err(source) => {
                warn!(error = %source, "Failed to persist registry");
                Err(NotPersisted { applied: value, source })
            }
        }
    }

    /// Register `listings` and return the ones not seen before, in input order.
    ///
    /// Identity is the canonical link; listings without a link are skipped.
    /// Stored copies carry the canonical link.
    pub async fn register_and_diff(&self, listings: &[Listing]) -> Persisted<Vec<Listing>> {
        let mut registry = self.registry.lock().await;
        let mut new_listings = Vec::new();

        for listing in listings {
            let key = canonical_link(&listing.link);
            if key.is_empty() || registry.known_listings.contains_key(key) {
                continue;
            }
            let stored = Listing {
                link: key.to_string(),
                ..listing.clone()
            };
            registry
                .known_listings
                .insert(stored.link.clone(), stored.clone());
            new_listings.push(stored);
        }

        registry.last_updated = Utc::now();
        debug!(incoming = listings.len(), new = new_listings.len(), "Registered listings");
        self.commit(registry, new_listings).await
    }

    /// Create the subscriber, or refresh only its display fields
    pub async fn add_or_update_subscriber(
        &self,
        id: SubscriberId,
        profile: SubscriberProfile,
    ) -> Persisted<Subscriber> {
        let mut registry = self.registry.lock().await;
        let subscriber = match registry.subscribers.entry(id) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().apply_profile(profile);
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                info!(subscriber = id, "Adding subscriber");
                entry.insert(Subscriber::new(id, profile)).clone()
            }
        };
        self.commit(registry, subscriber).await
    }

    pub async fn subscriber(&self, id: SubscriberId) -> Option<Subscriber> {
        self.registry.lock().await.subscribers.get(&id).cloned()
    }

    pub async fn subscribers(&self) -> Vec<Subscriber> {
        self.registry.lock().await.subscribers.values().cloned().collect()
    }

    pub async fn known_listings(&self) -> Vec<Listing> {
        self.registry.lock().await.known_listings.values().cloned().collect()
    }

    pub async fn last_updated(&self) -> DateTime<Utc> {
        self.registry.lock().await.last_updated
    }

    /// `None` if the subscriber is unknown
    pub async fn notifications_enabled(&self, id: SubscriberId) -> Option<bool> {
        self.registry
            .lock()
            .await
            .subscribers
            .get(&id)
            .map(|s| s.notifications_enabled)
    }

    /// Known listings the subscriber has not seen yet
    pub async fn unseen_listings(&self, id: SubscriberId) -> Option<Vec<Listing>> {
        let registry = self.registry.lock().await;
        let subscriber = registry.subscribers.get(&id)?;
        Some(
            registry
                .known_listings
                .iter()
                .filter(|(link, _)| !subscriber.seen_links.contains(*link))
                .map(|(_, listing)| listing.clone())
                .collect(),
        )
    }

    pub async fn status(&self, id: SubscriberId) -> Status {
        let registry = self.registry.lock().await;
        Status {
            total_listings: registry.known_listings.len(),
            last_updated: registry.last_updated,
            notifications_enabled: registry.subscribers.get(&id).map(|s| s.notifications_enabled),
        }
    }

    /// Mark one link as seen; unknown subscribers are ignored
    pub async fn mark_seen(&self, id: SubscriberId, link: &str) -> Persisted<()> {
        self.mark_all_seen(id, std::iter::once(link)).await
    }

    /// Mark several links as seen with a single snapshot write
    pub async fn mark_all_seen<'a>(
        &self,
        id: SubscriberId,
        links: impl IntoIterator<Item = &'a str>,
    ) -> Persisted<()> {
        let mut registry = self.registry.lock().await;
        if let Some(subscriber) = registry.subscribers.get_mut(&id) {
            subscriber
                .seen_links
                .extend(links.into_iter().map(|link| canonical_link(link).to_string()));
        }
        self.commit(registry, ()).await
    }

    /// Forget everything the subscriber has seen. Returns whether it exists.
    pub async fn reset_subscriber(&self, id: SubscriberId) -> Persisted<bool> {
        let mut registry = self.registry.lock().await;
        let Some(subscriber) = registry.subscribers.get_mut(&id) else {
            return Ok(false);
        };
        subscriber.seen_links.clear();
        subscriber.last_notified_at = None;
        self.commit(registry, true).await
    }

    /// Reset plus re-enabling notifications
    pub async fn clear_subscriber(&self, id: SubscriberId) -> Persisted<bool> {
        let mut registry = self.registry.lock().await;
        let Some(subscriber) = registry.subscribers.get_mut(&id) else {
            return Ok(false);
        };
        subscriber.seen_links.clear();
        subscriber.last_notified_at = None;
        subscriber.notifications_enabled = true;
        self.commit(registry, true).await
    }

    pub async fn set_notifications_enabled(&self, id: SubscriberId, enabled: bool) -> Persisted<bool> {
        let mut registry = self.registry.lock().await;
        let Some(subscriber) = registry.subscribers.get_mut(&id) else {
            return Ok(false);
        };
        subscriber.notifications_enabled = enabled;
        self.commit(registry, true).await
    }

    pub async fn record_notified(&self, id: SubscriberId, at: DateTime<Utc>) -> Persisted<()> {
        let mut registry = self.registry.lock().await;
        if let Some(subscriber) = registry.subscribers.get_mut(&id) {
            subscriber.last_notified_at = Some(at);
        }
        self.commit(registry, ()).await
    }

    /// Drop subscribers not notified within `threshold`. Never-notified
    /// subscribers count as inactive. Returns how many were removed.
    pub async fn purge_inactive(&self, threshold: Duration) -> Persisted<usize> {
        let cutoff = Utc::now() - threshold;
        let mut registry = self.registry.lock().await;
        let before = registry.subscribers.len();
        registry
            .subscribers
            .retain(|_, s| s.last_notified_at.is_some_and(|at| at >= cutoff));
        let removed = before - registry.subscribers.len();
        if removed > 0 {
            info!(removed, "Purged inactive subscribers");
        }
        self.commit(registry, removed).await
    }
}
