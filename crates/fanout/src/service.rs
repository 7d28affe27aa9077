//! Async front for the reconciler.
//!
//! Mutations queue on a fair mutex and run one at a time on the blocking pool,
//! so an event loop never waits on the sound server. Catalog reads skip the
//! queue and may overlap a running apply.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info};

use crate::catalog::Catalog;
use crate::error::PipelineError;
use crate::plan::BuildPlan;
use crate::reconciler::{ApplyReport, GenerationState, Reconciler};
use crate::router::GainReport;
use crate::teardown::StopReport;
use crate::types::{ModuleBlock, OutputDevice, RoutingTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineOp {
    Apply,
    Stop,
    Cancel,
    SetGains,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    Started { op: PipelineOp },
    Succeeded { op: PipelineOp, generation: Option<u64> },
    Failed { op: PipelineOp, error: String },
}

#[derive(Clone)]
pub struct PipelineService {
    reconciler: Arc<Mutex<Reconciler>>,
    catalog: Catalog,
    events: broadcast::Sender<PipelineEvent>,
}

impl PipelineService {
    pub fn new(reconciler: Reconciler) -> Self {
        let catalog = reconciler.catalog().clone();
        let (events, _) = broadcast::channel(64);
        Self {
            reconciler: Arc::new(Mutex::new(reconciler)),
            catalog,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: PipelineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Run `work` with exclusive access to the reconciler, off the async runtime.
    async fn exclusive<T, F>(&self, op: PipelineOp, work: F) -> Result<T, PipelineError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Reconciler) -> T + Send + 'static,
    {
        let mut guard = self.reconciler.clone().lock_owned().await;
        self.emit(PipelineEvent::Started { op });
        tokio::task::spawn_blocking(move || work(&mut *guard))
            .await
            .map_err(|e| {
                error!(?op, error = %e, "pipeline worker died");
                PipelineError::Worker(e.to_string())
            })
    }

    pub async fn apply(&self, plan: BuildPlan) -> Result<ApplyReport, PipelineError> {
        let op = PipelineOp::Apply;
        let result = self
            .exclusive(op, move |r| r.apply(&plan))
            .await
            .and_then(|inner| inner);

        match &result {
            Ok(report) => self.emit(PipelineEvent::Succeeded {
                op,
                generation: Some(report.generation),
            }),
            Err(e) => self.emit(PipelineEvent::Failed {
                op,
                error: e.to_string(),
            }),
        }
        result
    }

    /// Never fails; a dead worker yields an empty report and a failure event.
    pub async fn stop(&self) -> StopReport {
        self.stop_as(PipelineOp::Stop).await
    }

    /// Wait for any in-flight operation to finish, then stop.
    pub async fn cancel(&self) -> StopReport {
        info!("cancel requested");
        self.stop_as(PipelineOp::Cancel).await
    }

    async fn stop_as(&self, op: PipelineOp) -> StopReport {
        match self.exclusive(op, |r| r.stop()).await {
            Ok(report) => {
                self.emit(PipelineEvent::Succeeded {
                    op,
                    generation: None,
                });
                report
            }
            Err(e) => {
                self.emit(PipelineEvent::Failed {
                    op,
                    error: e.to_string(),
                });
                StopReport::default()
            }
        }
    }

    pub async fn set_gains(&self, targets: Vec<RoutingTarget>) -> Result<GainReport, PipelineError> {
        let op = PipelineOp::SetGains;
        let result = self.exclusive(op, move |r| r.set_gains(&targets)).await;
        match &result {
            Ok(_) => self.emit(PipelineEvent::Succeeded {
                op,
                generation: None,
            }),
            Err(e) => self.emit(PipelineEvent::Failed {
                op,
                error: e.to_string(),
            }),
        }
        result
    }

    /// Waits for any queued mutation.
    pub async fn state(&self) -> GenerationState {
        self.reconciler.lock().await.state()
    }

    pub async fn output_devices(&self) -> Vec<OutputDevice> {
        let catalog = self.catalog.clone();
        tokio::task::spawn_blocking(move || catalog.list_output_devices())
            .await
            .unwrap_or_default()
    }

    pub async fn active_modules(&self) -> Vec<ModuleBlock> {
        let catalog = self.catalog.clone();
        tokio::task::spawn_blocking(move || catalog.list_active_modules().iter().collect())
            .await
            .unwrap_or_default()
    }
}
