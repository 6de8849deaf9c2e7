//! Request collapsing: concurrent calls for the same key share one
//! execution.
//!
//! The first caller for a key spawns the execution on its own task and
//! registers a result slot; later callers for that key subscribe to the slot
//! while the execution is in flight. Every caller, the first included, waits
//! at most `wait` and then gives up with `Timeout` without cancelling the
//! execution.

use crate::telemetry::{CollapseRole, ServiceTelemetry};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use errors::ConfigError;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

type Slot<T> = watch::Receiver<Option<Result<T, ConfigError>>>;

pub struct RequestCollapser<K, T>
where
    K: Eq + Hash,
{
    in_flight: Arc<DashMap<K, Slot<T>>>,
    wait: Duration,
    telemetry: ServiceTelemetry,
}

impl<K, T> RequestCollapser<K, T>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new(wait: Duration) -> Self {
        Self {
            in_flight: Arc::new(DashMap::new()),
            wait,
            telemetry: ServiceTelemetry::default(),
        }
    }

    pub fn with_telemetry(mut self, telemetry: ServiceTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Number of executions currently in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Runs `execute` for `key`, or joins the execution already in flight for
    /// it. `execute` is only called by the caller that starts an execution.
    pub async fn run<F, Fut>(&self, key: K, execute: F) -> Result<T, ConfigError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ConfigError>> + Send + 'static,
    {
        let (mut slot, leader) = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), None),
            Entry::Vacant(entry) => {
                let (tx, rx) = watch::channel(None);
                entry.insert(rx.clone());
                (rx, Some(tx))
            }
        };

        match leader {
            Some(tx) => {
                self.telemetry.record_collapsed_request(CollapseRole::Leader);
                debug!(key = ?key, "Starting collapsed execution");
                let guard = InFlightGuard {
                    in_flight: Arc::clone(&self.in_flight),
                    key: key.clone(),
                };
                let execution = execute();
                tokio::spawn(async move {
                    let result = execution.await;
                    drop(guard);
                    let _ = tx.send(Some(result));
                });
            }
            None => {
                self.telemetry
                    .record_collapsed_request(CollapseRole::Follower);
                debug!(key = ?key, "Joining collapsed execution in flight");
            }
        }

        let outcome = tokio::time::timeout(self.wait, slot.wait_for(Option::is_some))
            .await
            .map(|changed| changed.map(|result| result.clone()));
        match outcome {
            Ok(Ok(Some(result))) => result,
            Ok(Ok(None)) => Err(ConfigError::internal("collapsed result slot was empty")),
            Ok(Err(_)) => {
                warn!(key = ?key, "Collapsed execution ended without a result");
                Err(ConfigError::internal(
                    "collapsed execution ended without a result",
                ))
            }
            Err(_) => {
                self.telemetry.record_collapse_timeout();
                debug!(key = ?key, wait_ms = self.wait.as_millis(), "Collapsed wait timed out");
                Err(ConfigError::Timeout {
                    timeout_ms: u64::try_from(self.wait.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }
}

/// Clears the in-flight entry when the execution finishes or its task is
/// torn down.
struct InFlightGuard<K, T>
where
    K: Eq + Hash,
{
    in_flight: Arc<DashMap<K, Slot<T>>>,
    key: K,
}

impl<K, T> Drop for InFlightGuard<K, T>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
    }
}
