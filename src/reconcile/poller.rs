//! Timed refresh of service state.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::services::{ObservedState, ServiceKind, ServiceRegistry};

/// A service whose observed state differs from the previous poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateChange {
    pub service: ServiceKind,
    pub before: ObservedState,
    pub after: ObservedState,
}

/// Refreshes every discovered service on an interval.
pub struct Poller {
    registry: Arc<ServiceRegistry>,
    interval: Duration,
}

impl Poller {
    pub fn new(registry: Arc<ServiceRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Refresh all services once and return what changed.
    ///
    /// Probes are blocking subprocesses, so they run on the blocking pool.
    pub async fn poll_once(&self) -> Vec<StateChange> {
        let mut changes = Vec::new();

        for service in self.registry.list() {
            let registry = Arc::clone(&self.registry);
            let kind = service.kind;
            let refreshed = tokio::task::spawn_blocking(move || registry.refresh(kind)).await;

            match refreshed {
                Ok(Ok(now)) if now.state != service.state => {
                    changes.push(StateChange {
                        service: kind,
                        before: service.state,
                        after: now.state,
                    });
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(service = %kind, error = %e, "Refresh failed"),
                Err(e) => warn!(service = %kind, error = %e, "Refresh task failed"),
            }
        }

        changes
    }

    /// Poll until `shutdown` flips to `true` or the receiver side of
    /// `changes` is dropped.
    pub async fn run(&self, changes: mpsc::Sender<StateChange>, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "Poller started");

        let mut interval = tokio::time::interval(self.interval);
        // The first tick completes immediately; the caller already has a snapshot
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            for change in self.poll_once().await {
                debug!(service = %change.service, "State changed");
                if changes.send(change).await.is_err() {
                    info!("Change receiver dropped, stopping poller");
                    return;
                }
            }
        }

        info!("Poller stopped");
    }
}
