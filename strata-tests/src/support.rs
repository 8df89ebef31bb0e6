//! Reusable harness for gateway scenarios.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use strata_core::ManualClock;
use strata_engine::{
    Fetched, GatewayConfig, Link, ManualExecutor, Outcome, PolicyOptions, PolicyRegistry,
    TierGateway, WriteBackPolicy,
};
use strata_store::{GetOptions, MemoryStore};

/// Container every scenario runs in.
pub const CONTAINER: &str = "bucket";

/// A gateway over two seeded memory stores with deterministic time and
/// task execution.
pub struct Harness {
    /// The gateway under test.
    pub gateway: TierGateway<MemoryStore, MemoryStore>,
    /// Near tier handle, sharing state with the gateway's copy.
    pub near: MemoryStore,
    /// Far tier handle, sharing state with the gateway's copy.
    pub far: MemoryStore,
    /// The manual clock both stores and the engine stamp time from.
    pub clock: Arc<ManualClock>,
    /// The manual executor holding scheduled reconciliation.
    pub executor: Arc<ManualExecutor>,
}

impl Harness {
    /// Builds a harness with the given write-back delays and creates
    /// [`CONTAINER`] at both tiers.
    ///
    /// # Panics
    ///
    /// Panics if setup fails.
    pub async fn new(copy_delay: Option<Duration>, evict_delay: Option<Duration>) -> Self {
        let clock = Arc::new(ManualClock::at_epoch_secs(1_700_000_000));
        let near = MemoryStore::named("near-memory", 7, clock.clone());
        let far = MemoryStore::named("far-memory", 11, clock.clone());
        let executor = Arc::new(ManualExecutor::new());

        let policy = PolicyRegistry::with_defaults()
            .create(
                WriteBackPolicy::NAME,
                &PolicyOptions {
                    copy_delay,
                    evict_delay,
                },
            )
            .expect("built-in policy");

        let gateway = TierGateway::new(
            near.clone(),
            far.clone(),
            policy,
            executor.clone(),
            clock.clone(),
            GatewayConfig {
                // Short drain so timeout paths finish quickly under test.
                drain_timeout: Duration::from_millis(50),
                ..GatewayConfig::default()
            },
        );
        gateway
            .create_container(CONTAINER)
            .await
            .expect("create container");

        Self {
            gateway,
            near,
            far,
            clock,
            executor,
        }
    }

    /// Builds a second gateway over the same tiers with different delays.
    /// The stores, clock, and executor are shared, so state carries over.
    #[must_use]
    pub fn with_policy(
        &self,
        copy_delay: Option<Duration>,
        evict_delay: Option<Duration>,
    ) -> TierGateway<MemoryStore, MemoryStore> {
        TierGateway::new(
            self.near.clone(),
            self.far.clone(),
            Box::new(WriteBackPolicy::new(copy_delay, evict_delay)),
            self.executor.clone(),
            self.clock.clone(),
            GatewayConfig::default(),
        )
    }

    /// Puts an object with no user metadata, returning its etag.
    ///
    /// # Panics
    ///
    /// Panics if the put fails.
    pub async fn put(&self, name: &str, payload: &[u8]) -> String {
        self.put_with_meta(name, payload, BTreeMap::new()).await
    }

    /// Puts an object with user metadata, returning its etag.
    ///
    /// # Panics
    ///
    /// Panics if the put fails.
    pub async fn put_with_meta(
        &self,
        name: &str,
        payload: &[u8],
        user_metadata: BTreeMap<String, String>,
    ) -> String {
        self.gateway
            .put(CONTAINER, name, Bytes::copy_from_slice(payload), user_metadata)
            .await
            .expect("put")
    }

    /// Runs one reconciliation pass over `name`.
    ///
    /// # Panics
    ///
    /// Panics if the pass fails.
    pub async fn reconcile(&self, name: &str) -> Outcome {
        self.gateway
            .reconcile_object(CONTAINER, name)
            .await
            .expect("reconcile")
    }

    /// Fetches an object's bytes through the gateway, `None` when absent.
    ///
    /// # Panics
    ///
    /// Panics if the get fails.
    pub async fn get_bytes(&self, name: &str) -> Option<Bytes> {
        match self
            .gateway
            .get(CONTAINER, name, &GetOptions::default())
            .await
            .expect("get")
        {
            Fetched::Object(object) => Some(object.payload),
            Fetched::Absent => None,
            other => panic!("unconditional get returned {other:?}"),
        }
    }

    /// True if the near tier currently holds a link for `name`.
    #[must_use]
    pub fn near_is_link(&self, name: &str) -> bool {
        self.near
            .raw_meta(CONTAINER, name)
            .is_some_and(|m| Link::is_link(&m))
    }
}
