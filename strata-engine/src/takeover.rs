//! Bulk takeover and sanity-check.
//!
//! Takeover adopts a far tier whose namespace was populated independently
//! of the near tier: every destination name absent at near gets a link
//! materialized for it. Sanity-check audits the namespace against the
//! unified metadata view and arms a takeover for the future when they
//! disagree. Both crawl the destination with a bounded worker pool.

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use strata_store::ObjectStore;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::error::EngineResult;
use crate::gateway::TierGateway;
use crate::link::{create_link, Link};
use crate::list::Crawler;
use crate::marker::TAKEOVER_MARKER;

impl<N: ObjectStore, F: ObjectStore> TierGateway<N, F> {
    /// Adopts the far tier's namespace into the near tier.
    ///
    /// While the crawl runs, reads and listings fall back to the far tier
    /// for names not yet adopted, and deletes route directly to the far
    /// tier. On completion the `need_take_over` marker is cleared.
    ///
    /// Returns the number of objects adopted.
    ///
    /// # Errors
    ///
    /// Returns the first store failure; the in-progress flag is cleared
    /// either way and a rerun continues where this one left off.
    pub async fn take_over(&self, container: &str) -> EngineResult<u64> {
        self.inner.takeover_in_progress.store(true, Ordering::SeqCst);
        let result = self.take_over_crawl(container).await;
        self.inner.takeover_in_progress.store(false, Ordering::SeqCst);
        let adopted = result?;
        info!(container, adopted, "takeover complete");
        Ok(adopted)
    }

    async fn take_over_crawl(&self, container: &str) -> EngineResult<u64> {
        let semaphore = Arc::new(Semaphore::new(
            self.inner.config.crawl_concurrency as usize,
        ));
        let mut tasks: JoinSet<EngineResult<u64>> = JoinSet::new();
        let mut crawler = Crawler::new(&*self.inner.far, container, None, None);

        while let Some(meta) = crawler.next().await? {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("semaphore closed");
            let near = self.inner.near.clone();
            let far_id = self.inner.far.id().to_string();
            let container = container.to_string();
            tasks.spawn(async move {
                let _permit = permit;
                if near.exists(&container, &meta.name).await? {
                    return Ok(0);
                }
                debug!(%container, name = %meta.name, "taking over object");
                let link = Link::to_target(&far_id, &container, &meta);
                create_link(&*near, &container, &link).await?;
                Ok(1)
            });
        }

        let mut adopted = 0;
        while let Some(joined) = tasks.join_next().await {
            adopted += joined.expect("takeover task panicked")?;
        }

        self.inner.near.delete(container, TAKEOVER_MARKER).await?;
        Ok(adopted)
    }

    /// Audits the namespace: compares every destination entry, ignoring
    /// modification time, against the unified metadata view.
    ///
    /// Fails fast (not sane) while a `need_take_over` marker exists. When a
    /// mismatch is found, the marker is written so a future takeover run is
    /// triggered; a sane namespace changes nothing.
    ///
    /// # Errors
    ///
    /// Returns the first store failure encountered by the crawl.
    pub async fn sanity_check(&self, container: &str) -> EngineResult<bool> {
        if self
            .inner
            .near
            .exists(container, TAKEOVER_MARKER)
            .await?
        {
            return Ok(false);
        }

        let semaphore = Arc::new(Semaphore::new(
            self.inner.config.crawl_concurrency as usize,
        ));
        let mut tasks: JoinSet<EngineResult<bool>> = JoinSet::new();
        let mut crawler = Crawler::new(&*self.inner.far, container, None, None);

        while let Some(far_meta) = crawler.next().await? {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("semaphore closed");
            let gateway = self.clone();
            let container = container.to_string();
            tasks.spawn(async move {
                let _permit = permit;
                let unified = gateway.metadata(&container, &far_meta.name).await?;
                Ok(match unified {
                    Some(meta) => meta.equals_other_than_time(&far_meta),
                    None => false,
                })
            });
        }

        let mut sane = true;
        while let Some(joined) = tasks.join_next().await {
            if !joined.expect("sanity-check task panicked")? {
                sane = false;
            }
        }

        if !sane {
            info!(container, "namespace out of sync, arming takeover");
            self.inner
                .near
                .put(container, TAKEOVER_MARKER, Bytes::new(), BTreeMap::new())
                .await?;
        }
        Ok(sane)
    }
}
