//! Periodic level sampling of the pipeline's monitor source.
//!
//! Runs on its own task, independent of apply/stop. A missing source is
//! recorded as an empty sample, not an error, so the history keeps ticking
//! while no pipeline is live. When sampling the base sink, the sink is looked
//! up on every tick with the same reuse rules apply uses, so an adopted
//! fallback sink is followed across rebuilds.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fanoutconf::NamesConfig;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::catalog::Catalog;
use crate::types::SourceSnapshot;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_CAPACITY: usize = 512;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorSample {
    pub at: DateTime<Utc>,
    /// Source that was read; None when no base sink exists yet.
    pub source: Option<String>,
    pub snapshot: Option<SourceSnapshot>,
}

impl MonitorSample {
    /// Loudest channel in percent; 0 when muted or absent.
    pub fn level(&self) -> f64 {
        match &self.snapshot {
            Some(s) if !s.muted => s.peak_volume(),
            _ => 0.0,
        }
    }
}

/// Bounded, oldest-first sample history.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorHistory {
    pub samples: VecDeque<MonitorSample>,
    pub capacity: usize,
}

impl MonitorHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: MonitorSample) {
        while self.samples.len() >= self.capacity.max(1) {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn latest(&self) -> Option<&MonitorSample> {
        self.samples.back()
    }
}

#[derive(Debug, Clone)]
enum MonitorTarget {
    Source(String),
    BaseSink {
        conventional: String,
        fallbacks: Vec<String>,
    },
}

impl MonitorTarget {
    fn resolve(&self, catalog: &Catalog) -> Option<String> {
        match self {
            Self::Source(name) => Some(name.clone()),
            Self::BaseSink {
                conventional,
                fallbacks,
            } => catalog
                .existing_base_sink(conventional, fallbacks)
                .map(|sink| format!("{sink}.monitor")),
        }
    }
}

pub struct MonitorSampler {
    catalog: Catalog,
    target: MonitorTarget,
    interval: Duration,
    capacity: usize,
}

impl MonitorSampler {
    pub fn new(catalog: Catalog, source: impl Into<String>) -> Self {
        Self::with_target(catalog, MonitorTarget::Source(source.into()))
    }

    /// Sample the monitor of whichever sink the pipeline is built on: the
    /// configured base sink, or an adopted fallback.
    pub fn for_base(catalog: Catalog, names: &NamesConfig) -> Self {
        Self::with_target(
            catalog,
            MonitorTarget::BaseSink {
                conventional: names.base_sink.clone(),
                fallbacks: names.fallback_base_sinks.clone(),
            },
        )
    }

    fn with_target(catalog: Catalog, target: MonitorTarget) -> Self {
        Self {
            catalog,
            target,
            interval: DEFAULT_INTERVAL,
            capacity: DEFAULT_CAPACITY,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Start sampling. The task ends once every receiver has been dropped.
    pub fn spawn(self) -> (watch::Receiver<MonitorHistory>, JoinHandle<()>) {
        let (tx, rx) = watch::channel(MonitorHistory::with_capacity(self.capacity));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    break;
                }

                let catalog = self.catalog.clone();
                let target = self.target.clone();
                let (source, snapshot) = tokio::task::spawn_blocking(move || {
                    let source = target.resolve(&catalog);
                    let snapshot = source.as_deref().and_then(|s| catalog.source_snapshot(s));
                    (source, snapshot)
                })
                .await
                .unwrap_or_default();

                let sample = MonitorSample {
                    at: Utc::now(),
                    source,
                    snapshot,
                };
                tx.send_modify(|history| history.push(sample));
            }
            debug!(monitor = ?self.target, "monitor sampler stopped");
        });

        (rx, handle)
    }
}
