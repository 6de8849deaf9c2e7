use std::sync::atomic::{AtomicU32, Ordering};
use testcontainers::ContainerAsync;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::redis::{REDIS_PORT, Redis};
use tokio::sync::OnceCell;

type FixtureError = Box<dyn std::error::Error>;

static NAME_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Set, key or flag name that is unique within the test process and across
/// concurrently running test binaries.
pub fn unique_id(prefix: &str) -> String {
    let n = NAME_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}-{}", prefix, std::process::id(), n)
}

/// A throwaway Redis server.
pub struct RedisFixture {
    _container: ContainerAsync<Redis>,
    host: String,
    port: u16,
}

impl RedisFixture {
    async fn start() -> Result<Self, FixtureError> {
        let container = Redis::default().start().await?;
        let host = container.get_host().await?.to_string();
        let port = container.get_host_port_ipv4(REDIS_PORT).await?;
        let fixture = Self {
            _container: container,
            host,
            port,
        };
        fixture.ping().await?;
        Ok(fixture)
    }

    async fn ping(&self) -> Result<(), FixtureError> {
        let client = redis::Client::open(self.url())?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Connection string for database 0.
    pub fn url(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}

static REDIS: OnceCell<Option<RedisFixture>> = OnceCell::const_new();

/// Redis server shared by every test of the process, started on first use.
/// `None` when Docker is not available; callers skip in that case.
pub async fn redis() -> Option<&'static RedisFixture> {
    REDIS
        .get_or_init(|| async {
            match RedisFixture::start().await {
                Ok(fixture) => {
                    tracing::info!(port = fixture.port, "Redis fixture started");
                    Some(fixture)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Redis fixture unavailable");
                    None
                }
            }
        })
        .await
        .as_ref()
}
