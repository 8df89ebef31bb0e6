//! Namespace listing merge.
//!
//! Both tiers expose independently sorted listings; the merge is a lazy
//! two-pointer join bounded by a page cap. Near drives the join: markers
//! annotate the entry they follow, internal names and storage-engine
//! segment artifacts are skipped, and a far entry matching the current near
//! name either merges regions (equal sizes) or is treated as the pointer
//! target of a near link (differing sizes).

use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};

use strata_store::{ListOptions, ObjectMeta, ObjectStore};
use tracing::debug;

use crate::error::EngineResult;
use crate::gateway::{scrubbed_meta, TierGateway};
use crate::link::Link;
use crate::marker;
use crate::region::{translate_regions, RegionSet, TierMeta, TierPage};

// -----------------------------------------------------------------------------
// Crawler
// -----------------------------------------------------------------------------

/// Lazy cursor over a store's full (paginated) listing.
pub(crate) struct Crawler<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    container: &'a str,
    prefix: Option<String>,
    buf: VecDeque<ObjectMeta>,
    cursor: Option<String>,
    exhausted: bool,
}

impl<'a, S: ObjectStore + ?Sized> Crawler<'a, S> {
    pub(crate) fn new(
        store: &'a S,
        container: &'a str,
        prefix: Option<String>,
        start_after: Option<String>,
    ) -> Self {
        Self {
            store,
            container,
            prefix,
            buf: VecDeque::new(),
            cursor: start_after,
            exhausted: false,
        }
    }

    async fn fill(&mut self) -> EngineResult<()> {
        while self.buf.is_empty() && !self.exhausted {
            let page = self
                .store
                .list(
                    self.container,
                    &ListOptions {
                        prefix: self.prefix.clone(),
                        max_results: None,
                        start_after: self.cursor.clone(),
                    },
                )
                .await?;
            match page.next {
                Some(token) => self.cursor = Some(token),
                None => self.exhausted = true,
            }
            self.buf.extend(page.entries);
        }
        Ok(())
    }

    pub(crate) async fn peek(&mut self) -> EngineResult<Option<&ObjectMeta>> {
        if self.buf.is_empty() {
            self.fill().await?;
        }
        Ok(self.buf.front())
    }

    pub(crate) async fn next(&mut self) -> EngineResult<Option<ObjectMeta>> {
        if self.buf.is_empty() {
            self.fill().await?;
        }
        Ok(self.buf.pop_front())
    }
}

// -----------------------------------------------------------------------------
// Segment artifacts
// -----------------------------------------------------------------------------

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Matches storage-engine large-object segment names of the form
/// `.../slo/<10 digits>.<6 digits>/<n>/<n>/<8 digits>`, which back a
/// manifest object and must not surface as namespace entries.
pub(crate) fn is_segment_artifact(name: &str) -> bool {
    let segments: Vec<&str> = name.split('/').collect();
    let n = segments.len();
    if n < 6 || segments[n - 5] != "slo" {
        return false;
    }
    let Some((secs, micros)) = segments[n - 4].split_once('.') else {
        return false;
    };
    secs.len() == 10
        && is_digits(secs)
        && micros.len() == 6
        && is_digits(micros)
        && is_digits(segments[n - 3])
        && is_digits(segments[n - 2])
        && segments[n - 1].len() == 8
        && is_digits(segments[n - 1])
}

// -----------------------------------------------------------------------------
// Merge
// -----------------------------------------------------------------------------

impl<N: ObjectStore, F: ObjectStore> TierGateway<N, F> {
    /// Lists the unified namespace: one sorted, paginated view of both
    /// tiers, each name exactly once.
    ///
    /// While a takeover is in progress the far tier's listing is served
    /// directly, since near entries are still being adopted.
    ///
    /// # Errors
    ///
    /// Returns an error if either tier's listing fails.
    pub async fn list(&self, container: &str, options: &ListOptions) -> EngineResult<TierPage> {
        if self.takeover_in_progress() {
            let page = self.inner.far.list(container, options).await?;
            let entries = page
                .entries
                .into_iter()
                .map(|m| {
                    let regions = translate_regions(&m);
                    TierMeta::new(scrubbed_meta(m), regions)
                })
                .collect();
            return Ok(TierPage {
                entries,
                next: page.next,
            });
        }

        let max = options
            .max_results
            .unwrap_or(self.inner.config.list_page_max) as usize;
        let encoding = self.name_encoding();

        let mut near_crawl = Crawler::new(
            &*self.inner.near,
            container,
            options.prefix.clone(),
            options.start_after.clone(),
        );
        let mut far_crawl = Crawler::new(
            &*self.inner.far,
            container,
            options.prefix.clone(),
            options.start_after.clone(),
        );
        let mut contents: BTreeMap<String, TierMeta> = BTreeMap::new();

        while contents.len() < max {
            let Some(near_meta) = near_crawl.next().await? else {
                break;
            };
            let name = near_meta.name.clone();

            if marker::is_reserved(&name) || is_segment_artifact(&name) {
                continue;
            }
            if marker::is_marker(&name) {
                // Markers sort adjacent to their target, which has already
                // been emitted; annotate it and move on.
                if let Some(target) = marker::marker_target(&name) {
                    if let Some(entry) = contents.get_mut(&target) {
                        entry.has_pending_marker = true;
                    }
                }
                debug!(%name, "skipping marker");
                continue;
            }

            // Advance the far cursor past consumed and artifact names.
            let mut matched: Option<ObjectMeta> = None;
            loop {
                let step = match far_crawl.peek().await? {
                    None => break,
                    Some(far_meta) => {
                        if is_segment_artifact(&far_meta.name) {
                            None
                        } else {
                            Some(far_meta.name.as_str().cmp(name.as_str()))
                        }
                    }
                };
                match step {
                    None | Some(Ordering::Less) => {
                        far_crawl.next().await?;
                    }
                    Some(Ordering::Equal) => {
                        matched = far_crawl.next().await?;
                        break;
                    }
                    Some(Ordering::Greater) => break,
                }
            }

            let Some(far_meta) = matched else {
                contents.insert(
                    name,
                    TierMeta::new(scrubbed_meta(near_meta), RegionSet::NEAR_ONLY),
                );
                continue;
            };

            let next_is_marker = near_crawl
                .peek()
                .await?
                .is_some_and(|m| m.name == marker::marker_name(&name, encoding));
            let far_regions = translate_regions(&far_meta);

            let entry = if next_is_marker {
                let mut entry = if Link::is_link(&near_meta) {
                    let mut entry = TierMeta::new(scrubbed_meta(far_meta), far_regions);
                    entry.link_size = Some(near_meta.size);
                    entry
                } else {
                    TierMeta::new(scrubbed_meta(near_meta), RegionSet::NEAR_ONLY)
                };
                entry.has_pending_marker = true;
                entry
            } else if near_meta.size == far_meta.size {
                let near_modified = near_meta.last_modified;
                let mut entry = TierMeta::new(
                    scrubbed_meta(near_meta),
                    RegionSet::NEAR_ONLY.union(far_regions),
                );
                // Near is authoritative for recency.
                if near_modified < entry.meta.last_modified {
                    entry.meta.last_modified = near_modified;
                }
                entry
            } else {
                // Sizes differ: the far entry is the pointer target, not an
                // equal copy.
                let mut entry = TierMeta::new(scrubbed_meta(far_meta), far_regions);
                entry.link_size = Some(near_meta.size);
                entry
            };
            contents.insert(name, entry);
        }

        // Peek one entry past the page boundary solely to catch a trailing
        // marker for the last emitted entry.
        let mut more = false;
        if let Some(past) = near_crawl.next().await? {
            if marker::is_marker(&past.name) {
                if let Some(target) = marker::marker_target(&past.name) {
                    if let Some(entry) = contents.get_mut(&target) {
                        entry.has_pending_marker = true;
                    }
                }
                more = near_crawl.peek().await?.is_some();
            } else {
                more = true;
            }
        }

        let next = if more {
            contents.keys().next_back().cloned()
        } else {
            None
        };
        Ok(TierPage {
            entries: contents.into_values().collect(),
            next,
        })
    }
}
