//! On-disk form of the registry.
//!
//! The same normalization runs on load and on save, so a stale or hand-edited
//! file is repaired instead of trusted.

use crate::error::StoreError;
use crate::models::{canonical_link, Listing, Subscriber, SubscriberId};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, warn};

pub const SNAPSHOT_FILE: &str = "bot_state.json";

/// Everything the store owns
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Registry {
    #[serde(rename = "users")]
    pub subscribers: BTreeMap<SubscriberId, Subscriber>,
    #[serde(rename = "known_offers")]
    pub known_listings: BTreeMap<String, Listing>,
    pub last_updated: DateTime<Utc>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            subscribers: BTreeMap::new(),
            known_listings: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }
}

/// Lenient read shape.
///
/// Entries are kept as raw JSON so one bad record is dropped on its own
/// instead of failing the whole file.
#[derive(Debug, Default, Deserialize)]
struct RawSnapshot {
    #[serde(default)]
    users: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    known_offers: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    last_updated: Option<Value>,
}

impl From<RawSnapshot> for Registry {
    fn from(raw: RawSnapshot) -> Self {
        let subscribers = raw
            .users
            .unwrap_or_default()
            .into_iter()
            .filter(|(_, value)| !value.is_null())
            .filter_map(|(key, value)| {
                let Ok(id) = key.parse::<SubscriberId>() else {
                    warn!(key = %key, "Dropping subscriber with a non-numeric id");
                    return None;
                };
                decode_entry::<Subscriber>("subscriber", &key, value).map(|s| (id, s))
            })
            .collect();

        let known_listings = raw
            .known_offers
            .unwrap_or_default()
            .into_iter()
            .filter(|(_, value)| !value.is_null())
            .filter_map(|(key, value)| decode_entry::<Listing>("listing", &key, value).map(|l| (key, l)))
            .collect();

        let mut registry = Self {
            subscribers,
            known_listings,
            last_updated: raw
                .last_updated
                .and_then(|value| serde_json::from_value(value).ok())
                .unwrap_or_else(Utc::now),
        };
        registry.normalize();
        registry
    }
}

fn decode_entry<T: DeserializeOwned>(kind: &str, key: &str, value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(entry) => Some(entry),
        Err(err) => {
            warn!(kind, key, error = %err, "Dropping invalid snapshot entry");
            None
        }
    }
}

impl Registry {
    /// Restore the registry invariants in place.
    ///
    /// Listing keys are re-canonicalized and listings without a link dropped;
    /// seen links are canonicalized and dropped unless they name a known
    /// listing.
    pub fn normalize(&mut self) {
        let listings = std::mem::take(&mut self.known_listings);
        for (key, listing) in listings {
            let key = canonical_link(&key);
            if !key.is_empty() && !listing.link.is_empty() {
                self.known_listings.insert(key.to_string(), listing);
            }
        }

        for subscriber in self.subscribers.values_mut() {
            let seen = std::mem::take(&mut subscriber.seen_links);
            subscriber.seen_links = seen
                .iter()
                .map(|link| canonical_link(link))
                .filter(|link| self.known_listings.contains_key(*link))
                .map(str::to_string)
                .collect();
        }
    }

    /// Read a snapshot from `path`.
    ///
    /// Never fails: a missing, unreadable or malformed file gives an empty
    /// registry, and invalid entries inside a valid file are dropped one by one.
    pub async fn load(path: &Path) -> Self {
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No snapshot found, starting empty");
                return Self::default();
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Snapshot is unreadable, starting empty");
                return Self::default();
            }
        };

        match serde_json::from_slice::<RawSnapshot>(&data) {
            Ok(raw) => raw.into(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Snapshot is malformed, starting empty");
                Self::default()
            }
        }
    }

    /// Normalize, then write the full registry to `path`.
    ///
    /// The file is written next to its final location and renamed over it.
    pub async fn save(&mut self, path: &Path) -> Result<(), StoreError> {
        self.normalize();

        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| StoreError::CreateDir {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }

        let json = serde_json::to_string_pretty(&*self)?;
        let tmp = path.with_extension("json.tmp");
        let write_err = |source| StoreError::Write {
            path: path.to_path_buf(),
            source,
        };
        tokio::fs::write(&tmp, json).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(write_err)?;
        Ok(())
    }
}
