use async_trait::async_trait;
use cs_core::{ConfigItem, ConfigStore, FlagProvider, JsonCache, MaxAge, SecretProvider};
use errors::{ConfigError, SecretError};
use config::CollapseConfig;
use service::{ConfigReader, ConfigService, ReadStrategy, ServiceTelemetry};
use std::sync::Arc;
use std::time::Duration;
use storage::{InMemoryCache, InMemoryFlags, InMemoryStore};
use testing::{CountingStore, FailingCache};

/// Secret provider that takes a while to answer, so collapsed reads overlap.
struct SlowSecrets {
    delay: Duration,
}

#[async_trait]
impl SecretProvider for SlowSecrets {
    async fn get_secret(&self, secret_id: &str) -> Result<String, SecretError> {
        tokio::time::sleep(self.delay).await;
        match secret_id {
            "token" => Ok("t0k3n".to_string()),
            other => Err(SecretError::NotFound(other.to_string())),
        }
    }

    async fn is_available(&self) -> bool {
        true
    }
}

struct Setup {
    reader: Arc<ConfigReader>,
    store: Arc<CountingStore>,
}

async fn setup(
    cache: Arc<dyn JsonCache>,
    flags: InMemoryFlags,
    get_set_delay: Duration,
    timeout_ms: u64,
) -> Setup {
    let inner = Arc::new(InMemoryStore::new());
    let store = Arc::new(
        CountingStore::new(Arc::clone(&inner) as Arc<dyn ConfigStore>)
            .with_get_set_delay(get_set_delay),
    );
    let service = Arc::new(
        ConfigService::builder(
            Arc::clone(&store) as Arc<dyn ConfigStore>,
            cache,
            Arc::new(SlowSecrets {
                delay: Duration::from_millis(20),
            }),
        )
        .telemetry(ServiceTelemetry::disabled())
        .build(),
    );

    service.create_set("app").await.unwrap();
    service
        .add_item(ConfigItem::plain("region", "eu"), "app")
        .await
        .unwrap();
    service
        .add_item(ConfigItem::secret("token", "token"), "app")
        .await
        .unwrap();
    service.flush_cache_writes().await;
    store.reset();

    let settings = CollapseConfig {
        timeout_ms,
        ..CollapseConfig::default()
    };
    let reader = ConfigReader::new(service, Arc::new(flags), &settings)
        .with_telemetry(ServiceTelemetry::disabled());

    Setup {
        reader: Arc::new(reader),
        store,
    }
}

async fn concurrent_reads(
    reader: &Arc<ConfigReader>,
    name: &str,
    max_age: MaxAge,
    count: usize,
) -> Vec<Result<bytes::Bytes, ConfigError>> {
    let handles: Vec<_> = (0..count)
        .map(|_| {
            let reader = Arc::clone(reader);
            let name = name.to_string();
            tokio::spawn(async move { reader.get_set_json(&name, max_age).await })
        })
        .collect();

    let mut results = Vec::with_capacity(count);
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}

#[tokio::test]
async fn test_flag_selects_strategy() {
    let off = setup(
        Arc::new(InMemoryCache::new()),
        InMemoryFlags::new(),
        Duration::ZERO,
        500,
    )
    .await;
    assert_eq!(off.reader.strategy().await, ReadStrategy::Direct);

    let on = setup(
        Arc::new(InMemoryCache::new()),
        InMemoryFlags::new().with_flag("single_flight_on", true),
        Duration::ZERO,
        500,
    )
    .await;
    assert_eq!(on.reader.strategy().await, ReadStrategy::Collapsed);
}

#[tokio::test]
async fn test_collapsed_reads_hit_store_at_most_once() {
    let s = setup(
        Arc::new(FailingCache::new()),
        InMemoryFlags::new().with_flag("single_flight_on", true),
        Duration::from_millis(50),
        2_000,
    )
    .await;

    let results = concurrent_reads(&s.reader, "app", MaxAge::Any, 16).await;

    assert!(s.store.get_set_calls() <= 1);
    let first = results[0].as_ref().unwrap().clone();
    assert!(results.iter().all(|r| r.as_ref() == Ok(&first)));
    let body: serde_json::Value = serde_json::from_slice(&first).unwrap();
    assert_eq!(body, serde_json::json!({"region": "eu", "token": "t0k3n"}));
}

#[tokio::test]
async fn test_direct_reads_are_not_collapsed() {
    let s = setup(
        Arc::new(FailingCache::new()),
        InMemoryFlags::new(),
        Duration::from_millis(50),
        2_000,
    )
    .await;

    let results = concurrent_reads(&s.reader, "app", MaxAge::Any, 4).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(s.store.get_set_calls(), 4);
}

#[tokio::test]
async fn test_collapsed_errors_are_shared() {
    let s = setup(
        Arc::new(FailingCache::new()),
        InMemoryFlags::new().with_flag("single_flight_on", true),
        Duration::from_millis(50),
        2_000,
    )
    .await;

    let results = concurrent_reads(&s.reader, "ghost", MaxAge::Any, 8).await;

    assert!(s.store.get_set_calls() <= 1);
    let expected = Err(ConfigError::ConfigNotExists {
        name: "ghost".to_string(),
    });
    assert!(results.iter().all(|r| *r == expected));
}

#[tokio::test]
async fn test_slow_collapsed_read_times_out_but_still_fills_cache() {
    let cache = Arc::new(InMemoryCache::new());
    let s = setup(
        Arc::clone(&cache) as Arc<dyn JsonCache>,
        InMemoryFlags::new().with_flag("single_flight_on", true),
        Duration::from_millis(200),
        50,
    )
    .await;
    cache.remove_json("app").await.unwrap();

    let results = concurrent_reads(&s.reader, "app", MaxAge::Any, 3).await;
    for result in &results {
        assert_eq!(result, &Err(ConfigError::Timeout { timeout_ms: 50 }));
    }

    tokio::time::sleep(Duration::from_millis(400)).await;
    s.reader.service().flush_cache_writes().await;
    assert_eq!(s.store.get_set_calls(), 1);
    assert!(cache.contains("app"));

    let served = s.reader.get_set_json("app", MaxAge::Any).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&served).unwrap();
    assert_eq!(body["region"], "eu");
    assert_eq!(s.store.get_set_calls(), 1);
}

#[tokio::test]
async fn test_collapsing_does_not_change_results() {
    let s = setup(
        Arc::new(InMemoryCache::new()),
        InMemoryFlags::new(),
        Duration::ZERO,
        2_000,
    )
    .await;

    let max_age = MaxAge::Within(Duration::from_secs(60));
    let direct = s
        .reader
        .get_set_json_with(ReadStrategy::Direct, "app", max_age)
        .await
        .unwrap();
    let collapsed = s
        .reader
        .get_set_json_with(ReadStrategy::Collapsed, "app", max_age)
        .await
        .unwrap();

    assert_eq!(direct, collapsed);
}

#[tokio::test]
async fn test_different_max_age_is_a_different_request() {
    let s = setup(
        Arc::new(FailingCache::new()),
        InMemoryFlags::new().with_flag("single_flight_on", true),
        Duration::from_millis(50),
        2_000,
    )
    .await;

    let (a, b) = tokio::join!(
        s.reader.get_set_json("app", MaxAge::Any),
        s.reader
            .get_set_json("app", MaxAge::Within(Duration::from_millis(100))),
    );

    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(s.store.get_set_calls(), 2);
}

#[tokio::test]
async fn test_flag_default_applies_when_flag_is_absent() {
    let inner: Arc<dyn ConfigStore> = Arc::new(InMemoryStore::new());
    let service = Arc::new(ConfigService::new(
        inner,
        Arc::new(InMemoryCache::new()),
        Arc::new(SlowSecrets {
            delay: Duration::ZERO,
        }),
    ));
    let settings = CollapseConfig {
        default_enabled: true,
        ..CollapseConfig::default()
    };

    let reader = ConfigReader::new(service, Arc::new(InMemoryFlags::new()), &settings);
    assert_eq!(reader.strategy().await, ReadStrategy::Collapsed);

    let flags = InMemoryFlags::new();
    flags.set_flag("single_flight_on", false, None).await.unwrap();
    let reader = ConfigReader::new(
        Arc::clone(reader.service()),
        Arc::new(flags),
        &settings,
    );
    assert_eq!(reader.strategy().await, ReadStrategy::Direct);
}
