use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};

/// Identifier of a notification recipient (the chat id on the bot side)
pub type SubscriberId = i64;

/// Strip everything from the first `?` onward.
///
/// The result is the identity key of a listing. Applying it twice is the
/// same as applying it once.
pub fn canonical_link(link: &str) -> &str {
    match link.find('?') {
        Some(pos) => &link[..pos],
        None => link,
    }
}

/// One rental advertisement as scraped from a result page
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Listing {
    #[serde(deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub address: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub price: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub size: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub rooms: String,
    #[serde(rename = "available", deserialize_with = "null_as_empty")]
    pub available_from: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub link: String,
}

impl Listing {
    /// A listing is worth keeping only if it tells us something about the flat
    pub fn is_usable(&self) -> bool {
        !self.size.is_empty() || !self.rooms.is_empty() || !self.price.is_empty()
    }

    /// Canonical form of this listing's link
    pub fn canonical_link(&self) -> &str {
        canonical_link(&self.link)
    }
}

/// Display fields that may change between messages from the same subscriber
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriberProfile {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

/// One notification recipient and the listings already shown to it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subscriber {
    #[serde(rename = "chat_id")]
    pub id: SubscriberId,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub username: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub first_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub last_name: String,
    /// `None` means the subscriber has never been notified
    #[serde(rename = "last_notified", default)]
    pub last_notified_at: Option<DateTime<Utc>>,
    #[serde(
        rename = "seen_offers",
        default,
        serialize_with = "serialize_seen",
        deserialize_with = "deserialize_seen"
    )]
    pub seen_links: BTreeSet<String>,
    #[serde(rename = "notifications", default = "enabled_by_default")]
    pub notifications_enabled: bool,
}

impl Subscriber {
    /// Fresh subscriber: notifications on, nothing seen, never notified
    pub fn new(id: SubscriberId, profile: SubscriberProfile) -> Self {
        Self {
            id,
            username: profile.username,
            first_name: profile.first_name,
            last_name: profile.last_name,
            last_notified_at: None,
            seen_links: BTreeSet::new(),
            notifications_enabled: true,
        }
    }

    /// Overwrite only the display fields
    pub fn apply_profile(&mut self, profile: SubscriberProfile) {
        self.username = profile.username;
        self.first_name = profile.first_name;
        self.last_name = profile.last_name;
    }

    pub fn has_seen(&self, link: &str) -> bool {
        self.seen_links.contains(canonical_link(link))
    }
}

fn enabled_by_default() -> bool {
    true
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

// Seen links are stored as `{"<link>": true}` so older snapshots stay readable.
fn serialize_seen<S>(seen: &BTreeSet<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let as_map: BTreeMap<&str, bool> = seen.iter().map(|link| (link.as_str(), true)).collect();
    as_map.serialize(serializer)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SeenRepr {
    Map(BTreeMap<String, bool>),
    List(Vec<String>),
    Null(()),
}

fn deserialize_seen<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match SeenRepr::deserialize(deserializer)? {
        SeenRepr::Map(map) => map.into_keys().collect(),
        SeenRepr::List(list) => list.into_iter().collect(),
        SeenRepr::Null(()) => BTreeSet::new(),
    })
}
