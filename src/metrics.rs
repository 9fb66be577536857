use crate::Result;
use prometheus::{
    core::{AtomicI64, AtomicU64, GenericCounter, GenericGauge},
    histogram_opts, opts, Histogram, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Registry,
};

pub const NAMESPACE: &str = "noticeboard";

/// Container for harvest sync metrics.
pub(crate) struct HarvestMetrics {
    events: IntGauge,
    records_dropped: IntGauge,
    latest_sync_timestamp_seconds: IntGaugeVec,
    sync_duration_seconds: HistogramVec,
    syncs_total: IntCounterVec,
}

impl HarvestMetrics {
    /// Creates new HarvestMetrics.
    pub fn new() -> Result<HarvestMetrics> {
        let events = IntGauge::with_opts(
            opts!("harvest_events", "Number of events in the working set").namespace(NAMESPACE),
        )?;

        let records_dropped = IntGauge::with_opts(
            opts!(
                "harvest_records_dropped",
                "Raw records excluded during normalization in the latest sync"
            )
            .namespace(NAMESPACE),
        )?;

        let latest_sync_timestamp_seconds = IntGaugeVec::new(
            opts!(
                "harvest_latest_sync_timestamp_seconds",
                "UNIX timestamp seconds of the latest harvest sync"
            )
            .namespace(NAMESPACE),
            &["status"],
        )?;

        let sync_duration_seconds = HistogramVec::new(
            histogram_opts!(
                "harvest_sync_duration_seconds",
                "Harvest sync duration in seconds"
            )
            .namespace(NAMESPACE),
            &["status"],
        )?;

        let syncs_total = IntCounterVec::new(
            opts!(
                "harvest_syncs_total",
                "Total number of harvest syncs performed"
            )
            .namespace(NAMESPACE),
            &["status"],
        )?;

        Ok(HarvestMetrics {
            events,
            records_dropped,
            latest_sync_timestamp_seconds,
            sync_duration_seconds,
            syncs_total,
        })
    }

    /// Registers the metrics in a prometheus registry.
    pub fn register(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.events.clone()))?;
        registry.register(Box::new(self.records_dropped.clone()))?;
        registry.register(Box::new(self.latest_sync_timestamp_seconds.clone()))?;
        registry.register(Box::new(self.sync_duration_seconds.clone()))?;
        registry.register(Box::new(self.syncs_total.clone()))?;
        Ok(())
    }

    /// Provides access to the working set size gauge.
    pub fn events(&self) -> IntGauge {
        self.events.clone()
    }

    /// Provides access to the dropped records gauge.
    pub fn records_dropped(&self) -> IntGauge {
        self.records_dropped.clone()
    }

    /// Provides access to the latest harvest sync UNIX timestamp gauge.
    pub fn latest_sync_timestamp_seconds(&self, status: SyncStatus) -> GenericGauge<AtomicI64> {
        self.latest_sync_timestamp_seconds
            .with_label_values(&[status.as_str()])
    }

    /// Provides access to the harvest sync duration seconds histogram.
    pub fn sync_duration_seconds(&self, status: SyncStatus) -> Histogram {
        self.sync_duration_seconds
            .with_label_values(&[status.as_str()])
    }

    /// Provides access to the harvest syncs counter.
    pub fn syncs_total(&self, status: SyncStatus) -> GenericCounter<AtomicU64> {
        self.syncs_total.with_label_values(&[status.as_str()])
    }
}

/// Status of a harvest sync operation.
#[derive(Debug, Copy, Clone)]
pub(crate) enum SyncStatus {
    /// Harvest sync was successful.
    Success,
    /// An error occurred while syncing harvested events.
    Error,
}

impl SyncStatus {
    /// Returns the status as a &str.
    pub fn as_str(&self) -> &str {
        match self {
            SyncStatus::Success => "success",
            SyncStatus::Error => "error",
        }
    }
}
