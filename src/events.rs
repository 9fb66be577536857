pub mod feed;
mod filter;
mod group;
mod normalize;
pub mod templating;

use super::Result;
use crate::metrics::{HarvestMetrics, SyncStatus};
use crate::HarvestConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed::{ArtifactFileSource, FeedError, HarvestDocument, HarvestFeedSource, HarvestMeta};
use prometheus::Registry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot::{self, Receiver, Sender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Duration;

pub use filter::{by_query, upcoming};
pub use group::{by_month, EventsByMonth, MonthKey};
pub use normalize::normalize;

/// Title used for events whose raw record did not yield one.
pub const UNTITLED_TITLE: &str = "Untitled event";

/// Non-navigable placeholder for events that came without a link.
pub const PLACEHOLDER_URL: &str = "#";

fn default_title() -> String {
    UNTITLED_TITLE.to_owned()
}

fn default_url() -> String {
    PLACEHOLDER_URL.to_owned()
}

/// Represents a single harvested event.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// The event title.
    #[serde(default = "default_title")]
    pub title: String,
    /// Link to the event page, or the placeholder when the record had none.
    #[serde(default = "default_url")]
    pub url: String,
    /// The start of the event. Records without a resolvable start never
    /// become events.
    pub start: DateTime<Utc>,
    /// The end of the event, if any.
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    /// Free-text location fields, any subset of which may be absent.
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub venue: Option<String>,
    /// Provenance label, e.g. the feed the record came from.
    #[serde(default)]
    pub source: Option<String>,
    /// Free text used for search matching only.
    #[serde(default)]
    pub description: Option<String>,
    /// All-day events display without a time of day.
    #[serde(default)]
    pub all_day: bool,
}

impl Event {
    /// Creates an event from a title and start, all other fields at their
    /// defaults.
    pub fn new<T: Into<String>>(title: T, start: DateTime<Utc>) -> Event {
        Event {
            title: title.into(),
            url: default_url(),
            start,
            end: None,
            city: None,
            state: None,
            country: None,
            venue: None,
            source: None,
            description: None,
            all_day: false,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.title.fmt(f)
    }
}

/// Represents sources of harvested events.
#[derive(Deserialize, Serialize, Debug, Clone, Copy)]
#[serde(rename_all = "kebab-case")]
pub enum EventSourceKind {
    /// Use static events from the application configuration.
    Static,
    /// Read the harvester's JSON artifact from a local file.
    Artifact,
    /// Fetch the harvester's JSON artifact over HTTP.
    Feed,
}

/// One fetch from an event source: the canonical events, the harvest
/// metadata block and the number of raw records the normalizer excluded.
#[derive(Debug, Clone, Default)]
pub struct Harvest {
    pub meta: HarvestMeta,
    pub events: Vec<Event>,
    pub dropped: usize,
}

impl Harvest {
    /// Normalizes a raw harvest document, retaining its metadata block and
    /// the number of records that were excluded.
    pub fn from_document(document: HarvestDocument) -> Harvest {
        let events = normalize(&document);
        let dropped = document.events.len().saturating_sub(events.len());

        Harvest {
            meta: document.meta,
            events,
            dropped,
        }
    }
}

/// Trait that needs to be implemented by a source of harvested events.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetches events from the source.
    async fn fetch_events(&self) -> Result<Harvest>;
}

/// An `EventSource` that returns events from a static list.
pub struct StaticEventSource {
    events: Vec<Event>,
}

impl StaticEventSource {
    /// Creates a new `StaticEventSource` from an iterator.
    pub fn new<I>(iter: I) -> StaticEventSource
    where
        I: IntoIterator,
        I::Item: Into<Event>,
    {
        StaticEventSource {
            events: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl EventSource for StaticEventSource {
    async fn fetch_events(&self) -> Result<Harvest> {
        Ok(Harvest {
            events: self.events.clone(),
            ..Harvest::default()
        })
    }
}

#[async_trait]
impl<T> EventSource for Box<T>
where
    T: EventSource + ?Sized,
{
    async fn fetch_events(&self) -> Result<Harvest> {
        (**self).fetch_events().await
    }
}

#[async_trait]
impl<T> EventSource for Arc<T>
where
    T: EventSource + ?Sized,
{
    async fn fetch_events(&self) -> Result<Harvest> {
        (**self).fetch_events().await
    }
}

/// Why a listing came out empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmptyKind {
    /// The working set itself is empty: nothing has been harvested yet.
    NoData,
    /// There are harvested events, but the filters removed all of them.
    NoMatches,
}

/// A render-ready view of the working set: upcoming events matching the
/// query, grouped by calendar month, along with the harvest notes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listing {
    pub groups: EventsByMonth,
    pub empty: Option<EmptyKind>,
    pub notes: Vec<String>,
}

/// The `Catalog` type wraps an event source with the retained working set
/// and the views derived from it.
#[derive(Clone)]
pub struct Catalog {
    event_source: Arc<dyn EventSource>,
    events: Arc<Mutex<Vec<Event>>>,
    meta: Arc<Mutex<HarvestMeta>>,
    metrics: Arc<HarvestMetrics>,
}

impl Catalog {
    /// Creates a new `Catalog` from an event source.
    pub fn new<T>(event_source: T) -> Result<Catalog>
    where
        T: EventSource + 'static,
    {
        Ok(Catalog {
            event_source: Arc::new(event_source),
            events: Default::default(),
            meta: Default::default(),
            metrics: Arc::new(HarvestMetrics::new()?),
        })
    }

    /// Creates a new `Catalog` from configuration.
    pub fn from_config(config: &HarvestConfig) -> Result<Catalog> {
        let event_source: Box<dyn EventSource> = match config.event_source {
            EventSourceKind::Static => Box::new(StaticEventSource::new(config.events.clone())),
            EventSourceKind::Artifact => {
                let path = config
                    .artifact_path
                    .clone()
                    .ok_or(FeedError::MissingArtifactPath)?;
                Box::new(ArtifactFileSource::new(path))
            }
            EventSourceKind::Feed => Box::new(HarvestFeedSource::new(config.feed_urls.clone())?),
        };

        Catalog::new(event_source)
    }

    /// Registers the harvest metrics in a prometheus registry.
    pub fn register_metrics(&self, registry: &Registry) -> Result<()> {
        self.metrics.register(registry)
    }

    /// Returns a copy of the current working set, sorted by start time.
    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }

    /// Derives the visible listing from the retained working set: events
    /// starting at or after `now` whose searchable text matches `query`,
    /// grouped by calendar month.
    pub async fn listing(&self, query: &str, now: DateTime<Utc>) -> Listing {
        let events = self.events.lock().await.clone();
        let meta = self.meta.lock().await.clone();

        let have_data = !events.is_empty();
        let groups = by_month(by_query(upcoming(events, now), query));

        let empty = if !groups.is_empty() {
            None
        } else if have_data {
            Some(EmptyKind::NoMatches)
        } else {
            Some(EmptyKind::NoData)
        };

        Listing {
            groups,
            empty,
            notes: meta.notes,
        }
    }

    /// Synchronize events from the source into the catalog once.
    pub async fn sync_once(&self) -> Result<()> {
        log::debug!("synchronizing harvested events");
        let started = Instant::now();

        let (result, status) = match self.event_source.fetch_events().await {
            Ok(harvest) => {
                self.metrics.events().set(harvest.events.len() as i64);
                self.metrics.records_dropped().set(harvest.dropped as i64);

                let mut events = harvest.events;

                // Ensure events are always sorted by start time.
                events.sort_by_key(|event| event.start);
                *self.events.lock().await = events;
                *self.meta.lock().await = harvest.meta;

                (Ok(()), SyncStatus::Success)
            }
            Err(err) => (Err(err), SyncStatus::Error),
        };

        self.metrics
            .latest_sync_timestamp_seconds(status)
            .set(Utc::now().timestamp());
        self.metrics
            .sync_duration_seconds(status)
            .observe(started.elapsed().as_secs_f64());
        self.metrics.syncs_total(status).inc();

        result
    }

    /// Starts to periodically sync the catalog every `period` until a
    /// message is received via `stop`.
    async fn start_sync(&self, period: Duration, mut stop: Receiver<()>) {
        log::info!("synchronizing harvested events every {:?}", period);
        let mut interval = tokio::time::interval(period);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = self.sync_once().await {
                        log::error!("failed to sync harvested events: {err}");
                    }
                }
                _ = &mut stop => {
                    log::info!("stopping harvest sync");
                    return;
                }
            }
        }
    }

    /// Starts a background task to sync harvested events. Returns a
    /// `SyncTaskHandle` to stop the sync.
    pub async fn spawn_sync_task(&self, period: Duration) -> SyncTaskHandle {
        let catalog = self.clone();
        let (stop_tx, stop_rx) = oneshot::channel();

        let join_handle = tokio::spawn(async move {
            catalog.start_sync(period, stop_rx).await;
        });

        SyncTaskHandle {
            join_handle,
            stop_tx,
        }
    }
}

/// A handle for stopping a harvest sync task.
pub struct SyncTaskHandle {
    join_handle: JoinHandle<()>,
    stop_tx: Sender<()>,
}

impl SyncTaskHandle {
    /// Stops the harvest sync task. Blocks until the background task is
    /// finished.
    pub async fn stop(self) -> io::Result<()> {
        if self.stop_tx.send(()).is_ok() {
            self.join_handle.await?;
        }

        Ok(())
    }
}
