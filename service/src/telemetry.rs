use metrics::{counter, histogram};
use std::time::Duration;

/// Outcome of a cache-aside lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup {
    Hit,
    Miss,
    Stale,
    Error,
}

impl CacheLookup {
    fn as_label(self) -> &'static str {
        match self {
            CacheLookup::Hit => "hit",
            CacheLookup::Miss => "miss",
            CacheLookup::Stale => "stale",
            CacheLookup::Error => "error",
        }
    }
}

/// Whether a caller executed a collapsed read or joined one in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollapseRole {
    Leader,
    Follower,
}

impl CollapseRole {
    fn as_label(self) -> &'static str {
        match self {
            CollapseRole::Leader => "leader",
            CollapseRole::Follower => "follower",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ServiceTelemetry {
    enabled: bool,
}

impl Default for ServiceTelemetry {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ServiceTelemetry {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn record_cache_lookup(&self, result: CacheLookup) {
        if self.enabled {
            counter!("olive_cache_lookups_total", "result" => result.as_label()).increment(1);
        }
    }

    pub fn record_cache_write(&self, success: bool) {
        if self.enabled {
            let status = if success { "success" } else { "failure" };
            counter!("olive_cache_writes_total", "status" => status).increment(1);
        }
    }

    pub fn record_collapsed_request(&self, role: CollapseRole) {
        if self.enabled {
            counter!("olive_collapsed_requests_total", "role" => role.as_label()).increment(1);
        }
    }

    pub fn record_collapse_timeout(&self) {
        if self.enabled {
            counter!("olive_collapse_timeouts_total").increment(1);
        }
    }

    pub fn record_flatten_duration(&self, elapsed: Duration) {
        if self.enabled {
            histogram!("olive_flatten_duration_seconds").record(elapsed.as_secs_f64());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    fn counter_value(
        snapshot: &[(
            metrics_util::CompositeKey,
            Option<metrics::Unit>,
            Option<metrics::SharedString>,
            DebugValue,
        )],
        name: &str,
        label: Option<(&str, &str)>,
    ) -> u64 {
        snapshot
            .iter()
            .filter(|(key, _, _, _)| key.key().name() == name)
            .filter(|(key, _, _, _)| match label {
                Some((k, v)) => key.key().labels().any(|l| l.key() == k && l.value() == v),
                None => true,
            })
            .map(|(_, _, _, value)| match value {
                DebugValue::Counter(count) => *count,
                _ => 0,
            })
            .sum()
    }

    #[test]
    fn test_counters_are_labelled() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            let telemetry = ServiceTelemetry::default();
            telemetry.record_cache_lookup(CacheLookup::Hit);
            telemetry.record_cache_lookup(CacheLookup::Hit);
            telemetry.record_cache_lookup(CacheLookup::Stale);
            telemetry.record_cache_write(false);
            telemetry.record_collapsed_request(CollapseRole::Follower);
            telemetry.record_collapse_timeout();
        });

        let snapshot = snapshotter.snapshot().into_vec();
        assert_eq!(
            counter_value(&snapshot, "olive_cache_lookups_total", Some(("result", "hit"))),
            2
        );
        assert_eq!(
            counter_value(&snapshot, "olive_cache_lookups_total", Some(("result", "stale"))),
            1
        );
        assert_eq!(
            counter_value(&snapshot, "olive_cache_writes_total", Some(("status", "failure"))),
            1
        );
        assert_eq!(
            counter_value(
                &snapshot,
                "olive_collapsed_requests_total",
                Some(("role", "follower"))
            ),
            1
        );
        assert_eq!(counter_value(&snapshot, "olive_collapse_timeouts_total", None), 1);
    }

    #[test]
    fn test_disabled_telemetry_records_nothing() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            let telemetry = ServiceTelemetry::disabled();
            telemetry.record_cache_lookup(CacheLookup::Miss);
            telemetry.record_flatten_duration(Duration::from_millis(3));
        });

        assert!(snapshotter.snapshot().into_vec().is_empty());
    }
}
