//! Population: follow relations until no unloaded targets remain.
//!
//! Fetches run concurrently on a `JoinSet`, bounded by
//! `PopulateOptions::concurrency`. Results are applied in the order the
//! fetches were started, so the graph's asset and relation order does not
//! depend on completion order.

use std::collections::VecDeque;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tokio::task::JoinSet;

use super::{AssetGraph, CancelFlag, GraphState};
use crate::asset::{AssetId, LoadState};
use crate::config::PopulateSection;
use crate::error::{AssetError, Result};
use crate::relation::{RelationId, RelationType};

type Fetched = (AssetId, Result<Vec<u8>>);

/// Knobs for one population run.
#[derive(Debug, Clone)]
pub struct PopulateOptions {
    /// Relation types to follow. `None` follows all.
    pub follow: Option<Vec<RelationType>>,
    /// Max in-flight fetches.
    pub concurrency: usize,
    pub cancel: CancelFlag,
}

impl Default for PopulateOptions {
    fn default() -> Self {
        Self::from_config(&PopulateSection::default())
    }
}

impl PopulateOptions {
    pub fn from_config(section: &PopulateSection) -> Self {
        Self {
            follow: section.follow.clone(),
            concurrency: section.concurrency.max(1),
            cancel: CancelFlag::new(),
        }
    }

    pub fn follow(mut self, types: impl IntoIterator<Item = RelationType>) -> Self {
        self.follow = Some(types.into_iter().collect());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    #[inline]
    pub fn follows(&self, relation_type: RelationType) -> bool {
        self.follow
            .as_ref()
            .is_none_or(|types| types.contains(&relation_type))
    }
}

impl AssetGraph {
    /// Load every unloaded asset reachable through followed relations.
    ///
    /// Ends in `Populated`. Cancellation or a failure on a required asset
    /// leaves the graph `Incomplete` but queryable. Failures on optional
    /// assets are recorded in [`warnings`](Self::warnings) instead.
    pub async fn populate(&mut self, options: &PopulateOptions) -> Result<()> {
        self.state = GraphState::Populating;

        let mut queue: VecDeque<AssetId> = self.pending_targets(options).into();
        let mut queued: FxHashSet<AssetId> = queue.iter().copied().collect();
        let mut tasks: JoinSet<Fetched> = JoinSet::new();
        let mut in_flight: VecDeque<AssetId> = VecDeque::new();
        let mut ready: FxHashMap<AssetId, Result<Vec<u8>>> = FxHashMap::default();

        loop {
            if options.cancel.is_cancelled() {
                return self.abort_population(&mut tasks);
            }

            while in_flight.len() < options.concurrency.max(1)
                && let Some(id) = queue.pop_front()
            {
                let Some(url) = self.asset(id).map(|a| a.url.clone()) else {
                    continue;
                };
                let loader = Arc::clone(&self.loader);
                tasks.spawn(async move {
                    let result = loader.fetch(&url).await;
                    (id, result)
                });
                in_flight.push_back(id);
            }
            if in_flight.is_empty() {
                break;
            }

            let joined = tokio::select! {
                biased;
                () = options.cancel.cancelled() => None,
                joined = tasks.join_next() => Some(joined),
            };
            let Some(joined) = joined else {
                return self.abort_population(&mut tasks);
            };
            match joined {
                Some(Ok((id, result))) => {
                    ready.insert(id, result);
                }
                Some(Err(err)) => {
                    tasks.abort_all();
                    self.state = GraphState::Incomplete;
                    return Err(AssetError::Cancelled(format!("fetch task failed: {err}")));
                }
                None => break,
            }

            while let Some(&next) = in_flight.front()
                && let Some(result) = ready.remove(&next)
            {
                in_flight.pop_front();
                if let Err(err) = self.settle(next, result, options, &mut queue, &mut queued) {
                    tasks.abort_all();
                    self.state = GraphState::Incomplete;
                    log!("error"; "population stopped: {}", err);
                    return Err(err);
                }
            }
        }

        self.state = GraphState::Populated;
        log!(
            "populate";
            "{} assets, {} relations{}",
            self.asset_count(),
            self.relation_count(),
            match self.warnings.len() {
                0 => String::new(),
                n => format!(", {n} warnings"),
            }
        );
        Ok(())
    }

    /// Unloaded targets of followed relations whose source is loaded.
    fn pending_targets(&self, options: &PopulateOptions) -> Vec<AssetId> {
        let mut seen = FxHashSet::default();
        self.relations()
            .filter(|rel| options.follows(rel.relation_type))
            .filter(|rel| self.asset(rel.from).is_some_and(|a| a.is_loaded()))
            .filter(|rel| {
                self.asset(rel.to)
                    .is_some_and(|a| a.state == LoadState::Unloaded)
            })
            .map(|rel| rel.to)
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// Apply one fetch result and queue newly discovered targets.
    fn settle(
        &mut self,
        id: AssetId,
        fetched: Result<Vec<u8>>,
        options: &PopulateOptions,
        queue: &mut VecDeque<AssetId>,
        queued: &mut FxHashSet<AssetId>,
    ) -> Result<()> {
        let loaded = match fetched {
            Ok(bytes) => self.complete_load(id, bytes),
            Err(err) => Err(self.fetch_error(id, err)),
        };

        match loaded {
            Ok(created) => {
                self.enqueue_targets(&created, options, queue, queued);
                debug_do! {
                    if let Some(asset) = self.asset(id) {
                        debug!("load"; "{} ({} new relations)", asset.url.display_relative(&self.root), created.len());
                    }
                }
                Ok(())
            }
            Err(err) if err.is_recoverable() && self.asset(id).is_some_and(|a| a.optional) => {
                self.warn(format!("skipped optional asset: {err}"));
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn enqueue_targets(
        &self,
        created: &[RelationId],
        options: &PopulateOptions,
        queue: &mut VecDeque<AssetId>,
        queued: &mut FxHashSet<AssetId>,
    ) {
        for rel in created.iter().filter_map(|r| self.relation(*r)) {
            if !options.follows(rel.relation_type) {
                continue;
            }
            let unloaded = self
                .asset(rel.to)
                .is_some_and(|a| a.state == LoadState::Unloaded);
            if unloaded && queued.insert(rel.to) {
                queue.push_back(rel.to);
            }
        }
    }

    fn abort_population(&mut self, tasks: &mut JoinSet<Fetched>) -> Result<()> {
        tasks.abort_all();
        self.state = GraphState::Incomplete;
        log!("populate"; "cancelled with {} assets, {} relations", self.asset_count(), self.relation_count());
        Err(AssetError::Cancelled("populate".to_string()))
    }
}
