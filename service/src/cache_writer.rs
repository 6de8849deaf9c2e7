//! Write-behind queue for the flattened JSON cache.
//!
//! Callers enqueue writes and return immediately. A single background task
//! applies them in order, so writes for one key are never reordered. Failed
//! writes are logged and counted, never returned.
//!
//! The per-key version guard only remembers keys touched within the version
//! horizon. Older entries are pruned as commands arrive.

use crate::telemetry::ServiceTelemetry;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use cs_core::{JsonCache, Ttl};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug)]
enum CacheCommand {
    Save {
        key: String,
        json: Bytes,
        version: DateTime<Utc>,
    },
    /// Drops the entry and refuses later saves of versions up to `version`.
    Remove {
        key: String,
        version: DateTime<Utc>,
    },
    /// Drops the entry but still accepts saves of the same version.
    Invalidate {
        key: String,
        version: DateTime<Utc>,
    },
    Flush(oneshot::Sender<()>),
}

/// Last version applied per key; versions are the `updatedAt` of the set a
/// JSON document was computed from.
#[derive(Debug, Clone, Copy)]
enum KeyState {
    Current(DateTime<Utc>),
    Deleted(DateTime<Utc>),
}

impl KeyState {
    fn accepts(self, version: DateTime<Utc>) -> bool {
        match self {
            KeyState::Current(current) => version >= current,
            KeyState::Deleted(deleted) => version > deleted,
        }
    }
}

/// Default for how long a key's last applied version is remembered.
pub const DEFAULT_VERSION_HORIZON: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy)]
struct VersionEntry {
    state: KeyState,
    recorded_at: Instant,
}

/// Handle to the background cache writer. Dropping every handle stops the
/// worker once the queue is drained.
#[derive(Clone)]
pub struct CacheWriter {
    tx: UnboundedSender<CacheCommand>,
}

impl CacheWriter {
    /// Spawns the writer task. Must be called from within a Tokio runtime.
    pub fn start(
        cache: Arc<dyn JsonCache>,
        ttl: Ttl,
        version_horizon: Duration,
        telemetry: ServiceTelemetry,
    ) -> (Self, tokio::task::JoinHandle<()>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let worker = CacheWorker::new(cache, ttl, version_horizon, telemetry);
        let handle = tokio::spawn(worker.run(rx));
        (Self { tx }, handle)
    }

    pub fn save(&self, key: &str, json: Bytes, version: DateTime<Utc>) {
        self.send(CacheCommand::Save {
            key: key.to_string(),
            json,
            version,
        });
    }

    pub fn remove(&self, key: &str, version: DateTime<Utc>) {
        self.send(CacheCommand::Remove {
            key: key.to_string(),
            version,
        });
    }

    pub fn invalidate(&self, key: &str, version: DateTime<Utc>) {
        self.send(CacheCommand::Invalidate {
            key: key.to_string(),
            version,
        });
    }

    /// Resolves once every write queued before this call has been applied.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(CacheCommand::Flush(done_tx));
        if done_rx.await.is_err() {
            warn!("Cache writer stopped before flush completed");
        }
    }

    fn send(&self, command: CacheCommand) {
        if let Err(e) = self.tx.send(command) {
            warn!(command = ?e.0, "Cache writer is not running, dropping cache command");
        }
    }
}

struct CacheWorker {
    cache: Arc<dyn JsonCache>,
    ttl: Ttl,
    telemetry: ServiceTelemetry,
    versions: HashMap<String, VersionEntry>,
    version_horizon: Duration,
    last_prune: Instant,
}

impl CacheWorker {
    fn new(
        cache: Arc<dyn JsonCache>,
        ttl: Ttl,
        version_horizon: Duration,
        telemetry: ServiceTelemetry,
    ) -> Self {
        Self {
            cache,
            ttl,
            telemetry,
            versions: HashMap::new(),
            version_horizon,
            last_prune: Instant::now(),
        }
    }

    async fn run(mut self, mut rx: UnboundedReceiver<CacheCommand>) {
        debug!("Cache writer started");

        while let Some(command) = rx.recv().await {
            self.apply(command).await;
        }

        info!("Cache writer shutting down");
    }

    async fn apply(&mut self, command: CacheCommand) {
        self.prune_versions();
        match command {
            CacheCommand::Save { key, json, version } => {
                self.save(key, json, version).await;
            }
            CacheCommand::Remove { key, version } => {
                self.remove(&key).await;
                self.record(key, KeyState::Deleted(version));
            }
            CacheCommand::Invalidate { key, version } => {
                self.remove(&key).await;
                self.record(key, KeyState::Current(version));
            }
            CacheCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    fn record(&mut self, key: String, state: KeyState) {
        self.versions.insert(
            key,
            VersionEntry {
                state,
                recorded_at: Instant::now(),
            },
        );
    }

    /// Forgets versions recorded more than one horizon ago. Runs at most once
    /// per horizon.
    fn prune_versions(&mut self) {
        if self.last_prune.elapsed() < self.version_horizon {
            return;
        }
        let horizon = self.version_horizon;
        let before = self.versions.len();
        self.versions
            .retain(|_, entry| entry.recorded_at.elapsed() < horizon);
        self.last_prune = Instant::now();
        debug!(
            pruned = before - self.versions.len(),
            remaining = self.versions.len(),
            "Pruned cache write versions"
        );
    }

    async fn save(&mut self, key: String, json: Bytes, version: DateTime<Utc>) {
        if let Some(entry) = self.versions.get(&key) {
            if !entry.state.accepts(version) {
                debug!(key = %key, %version, "Skipping cache write older than the cached entry");
                return;
            }
        }

        match self.cache.save_json(&json, &key, self.ttl).await {
            Ok(()) => {
                self.telemetry.record_cache_write(true);
                self.record(key, KeyState::Current(version));
            }
            Err(e) => {
                self.telemetry.record_cache_write(false);
                warn!(key = %key, error = %e, "Failed to write cached JSON");
            }
        }
    }

    async fn remove(&self, key: &str) {
        match self.cache.remove_json(key).await {
            Ok(()) => self.telemetry.record_cache_write(true),
            Err(e) => {
                self.telemetry.record_cache_write(false);
                warn!(key = %key, error = %e, "Failed to remove cached JSON");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use cs_core::MaxAge;
    use storage::InMemoryCache;

    fn writer(cache: &Arc<InMemoryCache>) -> CacheWriter {
        let (writer, _handle) = CacheWriter::start(
            Arc::clone(cache) as Arc<dyn JsonCache>,
            Ttl::Infinite,
            DEFAULT_VERSION_HORIZON,
            ServiceTelemetry::disabled(),
        );
        writer
    }

    #[tokio::test]
    async fn test_writes_are_applied_in_order() {
        let cache = Arc::new(InMemoryCache::new());
        let writer = writer(&cache);
        let now = Utc::now();

        writer.save("s", Bytes::from_static(b"{\"v\":1}"), now);
        writer.save("s", Bytes::from_static(b"{\"v\":2}"), now + Duration::seconds(1));
        writer.flush().await;

        assert_eq!(cache.get_json("s", MaxAge::Any).await.unwrap(), b"{\"v\":2}");
    }

    #[tokio::test]
    async fn test_older_version_does_not_overwrite_newer() {
        let cache = Arc::new(InMemoryCache::new());
        let writer = writer(&cache);
        let now = Utc::now();

        writer.save("s", Bytes::from_static(b"new"), now);
        writer.save("s", Bytes::from_static(b"old"), now - Duration::seconds(5));
        writer.flush().await;

        assert_eq!(cache.get_json("s", MaxAge::Any).await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_same_version_refresh_is_accepted() {
        let cache = Arc::new(InMemoryCache::new());
        let writer = writer(&cache);
        let now = Utc::now();

        writer.save("s", Bytes::from_static(b"first"), now);
        writer.save("s", Bytes::from_static(b"again"), now);
        writer.flush().await;

        assert_eq!(cache.get_json("s", MaxAge::Any).await.unwrap(), b"again");
    }

    #[tokio::test]
    async fn test_removed_key_rejects_stale_save() {
        let cache = Arc::new(InMemoryCache::new());
        let writer = writer(&cache);
        let now = Utc::now();

        writer.save("s", Bytes::from_static(b"v1"), now);
        writer.remove("s", now);
        writer.save("s", Bytes::from_static(b"late"), now);
        writer.flush().await;
        assert!(!cache.contains("s"));

        writer.save("s", Bytes::from_static(b"recreated"), now + Duration::seconds(1));
        writer.flush().await;
        assert_eq!(cache.get_json("s", MaxAge::Any).await.unwrap(), b"recreated");
    }

    #[tokio::test]
    async fn test_invalidated_key_accepts_same_version() {
        let cache = Arc::new(InMemoryCache::new());
        let writer = writer(&cache);
        let now = Utc::now();

        writer.save("s", Bytes::from_static(b"v1"), now);
        writer.invalidate("s", now);
        writer.flush().await;
        assert!(!cache.contains("s"));

        writer.save("s", Bytes::from_static(b"v1"), now);
        writer.flush().await;
        assert!(cache.contains("s"));
    }

    #[tokio::test]
    async fn test_versions_are_forgotten_after_the_horizon() {
        let cache = Arc::new(InMemoryCache::new());
        let mut worker = CacheWorker::new(
            Arc::clone(&cache) as Arc<dyn JsonCache>,
            Ttl::Infinite,
            std::time::Duration::from_secs(1),
            ServiceTelemetry::disabled(),
        );
        let now = Utc::now();

        for i in 0..1000 {
            let key = format!("set-{}", i);
            worker
                .apply(CacheCommand::Save {
                    key: key.clone(),
                    json: Bytes::from_static(b"{}"),
                    version: now,
                })
                .await;
            worker
                .apply(CacheCommand::Remove { key, version: now })
                .await;
        }
        assert_eq!(worker.versions.len(), 1000);

        tokio::time::sleep(std::time::Duration::from_millis(1200)).await;
        worker
            .apply(CacheCommand::Save {
                key: "fresh".to_string(),
                json: Bytes::from_static(b"{}"),
                version: now,
            })
            .await;

        assert_eq!(worker.versions.len(), 1);
        assert!(worker.versions.contains_key("fresh"));
        assert!(cache.contains("fresh"));
    }

    #[tokio::test]
    async fn test_versions_within_the_horizon_still_guard_writes() {
        let cache = Arc::new(InMemoryCache::new());
        let mut worker = CacheWorker::new(
            Arc::clone(&cache) as Arc<dyn JsonCache>,
            Ttl::Infinite,
            DEFAULT_VERSION_HORIZON,
            ServiceTelemetry::disabled(),
        );
        let now = Utc::now();

        worker
            .apply(CacheCommand::Remove {
                key: "s".to_string(),
                version: now,
            })
            .await;
        worker
            .apply(CacheCommand::Save {
                key: "s".to_string(),
                json: Bytes::from_static(b"late"),
                version: now,
            })
            .await;

        assert!(!cache.contains("s"));
        assert_eq!(worker.versions.len(), 1);
    }
}
