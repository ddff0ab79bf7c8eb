//! Fetch, diff against the store, notify.
//!
//! Network I/O never runs under the store lock: the fetch completes first and
//! only the final registration takes it.

use crate::models::{Listing, Subscriber};
use crate::scrapers::{ListingSource, SearchRequest};
use crate::store::Store;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// At most this many listings go into one notification
pub const MAX_LISTINGS_PER_NOTIFICATION: usize = 10;

/// Delivers new listings to one subscriber
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subscriber: &Subscriber, listings: &[Listing], total_new: usize) -> Result<()>;
}

/// Writes notifications to the log instead of a chat
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, subscriber: &Subscriber, listings: &[Listing], total_new: usize) -> Result<()> {
        info!(subscriber = subscriber.id, total_new, "New rental listings");
        for listing in listings {
            info!(
                subscriber = subscriber.id,
                title = %listing.title,
                address = %listing.address,
                price = %listing.price,
                rooms = %listing.rooms,
                size = %listing.size,
                available = %listing.available_from,
                link = %listing.link,
                "listing"
            );
        }
        Ok(())
    }
}

pub struct Reconciler {
    source: Arc<dyn ListingSource>,
    store: Arc<Store>,
    request: SearchRequest,
}

impl Reconciler {
    pub fn new(source: Arc<dyn ListingSource>, store: Arc<Store>, request: SearchRequest) -> Self {
        Self {
            source,
            store,
            request,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Fetch every page and keep only usable listings
    pub async fn fetch_offers(&self) -> Result<Vec<Listing>> {
        let fetched = self
            .source
            .fetch_all(&self.request)
            .await
            .with_context(|| format!("error fetching listings from {}", self.source.source_name()))?;

        let total = fetched.len();
        let usable: Vec<Listing> = fetched.into_iter().filter(Listing::is_usable).collect();
        if usable.len() < total {
            warn!(skipped = total - usable.len(), "Skipping listings with insufficient data");
        }
        Ok(usable)
    }

    /// Register `offers` and return the new ones.
    ///
    /// A snapshot write failure is logged; the listings are registered in
    /// memory regardless, so they are still returned for notification.
    pub async fn reconcile_and_get_new(&self, offers: &[Listing]) -> Vec<Listing> {
        match self.store.register_and_diff(offers).await {
            Ok(new) => new,
            Err(err) => {
                error!(error = %err.source, "Registered listings are not durable");
                err.into_applied()
            }
        }
    }

    /// One fetch and diff
    pub async fn run(&self) -> Result<Vec<Listing>> {
        let offers = self.fetch_offers().await?;
        let new = self.reconcile_and_get_new(&offers).await;
        if new.is_empty() {
            info!(fetched = offers.len(), "No new rental listings found");
        } else {
            info!(fetched = offers.len(), new = new.len(), "Found new rental listings");
        }
        Ok(new)
    }
}

/// Send `new_listings` to every subscriber with notifications on.
///
/// Delivered listings are marked seen; a successful delivery stamps the
/// subscriber's last-notified time. Returns how many subscribers were reached.
pub async fn notify_subscribers(store: &Store, notifier: &dyn Notifier, new_listings: &[Listing]) -> usize {
    if new_listings.is_empty() {
        return 0;
    }

    let mut reached = 0;
    for subscriber in store.subscribers().await {
        if !subscriber.notifications_enabled {
            continue;
        }

        let batch: Vec<Listing> = new_listings
            .iter()
            .filter(|listing| !subscriber.has_seen(&listing.link))
            .take(MAX_LISTINGS_PER_NOTIFICATION)
            .cloned()
            .collect();
        if batch.is_empty() {
            continue;
        }

        if let Err(err) = notifier.notify(&subscriber, &batch, new_listings.len()).await {
            warn!(subscriber = subscriber.id, error = %err, "Error notifying subscriber");
            continue;
        }
        reached += 1;

        let links = batch.iter().map(|listing| listing.link.as_str());
        if let Err(err) = store.mark_all_seen(subscriber.id, links).await {
            warn!(subscriber = subscriber.id, error = %err, "Seen listings are not durable");
        }
        if let Err(err) = store.record_notified(subscriber.id, Utc::now()).await {
            warn!(subscriber = subscriber.id, error = %err, "Notification time is not durable");
        }
    }
    reached
}

/// Timing of the periodic loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub interval: Duration,
    pub startup_grace: Duration,
}

/// One reconciliation cycle: fetch, diff, notify
pub async fn run_cycle(reconciler: &Reconciler, notifier: &dyn Notifier) -> Result<()> {
    info!("Checking for new rental listings");
    let new = reconciler.run().await?;
    let reached = notify_subscribers(reconciler.store(), notifier, &new).await;
    if reached > 0 {
        info!(subscribers = reached, "Notified subscribers");
    }
    Ok(())
}

/// Start the periodic loop.
///
/// The first cycle starts immediately and is awaited for at most
/// `schedule.startup_grace`; after that this returns while the first cycle
/// keeps running in the background. Ticks never overlap a running cycle.
pub async fn start_periodic(
    reconciler: Arc<Reconciler>,
    notifier: Arc<dyn Notifier>,
    schedule: Schedule,
) -> JoinHandle<()> {
    let mut first = {
        let reconciler = Arc::clone(&reconciler);
        let notifier = Arc::clone(&notifier);
        tokio::spawn(async move {
            if let Err(err) = run_cycle(&reconciler, notifier.as_ref()).await {
                error!(error = %format!("{err:#}"), "Error during initial update");
            }
        })
    };

    let pending = match timeout(schedule.startup_grace, &mut first).await {
        Ok(_) => {
            info!("Initial update completed");
            None
        }
        Err(_) => {
            warn!(grace = ?schedule.startup_grace, "Initial update timed out, continuing");
            Some(first)
        }
    };

    tokio::spawn(periodic_loop(reconciler, notifier, schedule, pending))
}

async fn periodic_loop(
    reconciler: Arc<Reconciler>,
    notifier: Arc<dyn Notifier>,
    schedule: Schedule,
    mut pending: Option<JoinHandle<()>>,
) {
    let mut ticker = interval(schedule.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; the initial cycle already covered it
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if let Some(first) = pending.take() {
            debug!("Waiting for the initial update to finish");
            let _ = first.await;
        }
        if let Err(err) = run_cycle(&reconciler, notifier.as_ref()).await {
            error!(error = %format!("{err:#}"), "Error during periodic update");
        }
    }
}
