//! The asset graph.
//!
//! Assets and relations live in arenas indexed by stable ids; relations hold
//! ids, never references, so the asset ↔ relation cycle needs no shared
//! ownership.
//!
//! # Ordering
//!
//! `asset_order` and `relation_order` record discovery order. Every query
//! walks them, so results are stable for an unchanged graph regardless of
//! the order in which concurrent fetches completed.
//!
//! # Module Structure
//!
//! ```text
//! graph/
//! ├── mod.rs       # AssetGraph arena, lookup, asset/relation creation
//! ├── loader.rs    # Loader trait, FsLoader, MemoryLoader
//! ├── populate.rs  # Concurrent population to a fixed point
//! ├── rewrite.rs   # In-place edits: hrefs, retargeting, removal, serialize
//! └── state.rs     # GraphState, CancelFlag
//! ```

mod loader;
mod populate;
mod rewrite;
mod state;

#[cfg(test)]
pub(crate) mod fixtures;

pub use loader::{FsLoader, Loader, MemoryLoader};
pub use populate::PopulateOptions;
pub use state::{CancelFlag, GraphState};

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::asset::{Asset, AssetId, AssetType, LoadState, Probe, Providers};
use crate::config::{ConfigError, GraphConfig};
use crate::core::AssetUrl;
use crate::error::{AssetError, Result};
use crate::query::{AssetLookup, AssetQuery, RelationQuery};
use crate::relation::{Discovered, Locator, Relation, RelationId, RelationType};

/// Where a new relation goes in its source asset's relation list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Position {
    #[default]
    Last,
    After(RelationId),
    Before(RelationId),
}

/// Arena of assets and the relations between them.
#[derive(Clone)]
pub struct AssetGraph {
    root: AssetUrl,
    config: Arc<GraphConfig>,
    loader: Arc<dyn Loader>,
    providers: Providers,

    assets: Vec<Option<Asset>>,
    relations: Vec<Option<Relation>>,
    asset_order: Vec<AssetId>,
    relation_order: Vec<RelationId>,
    /// Non-inline assets by URL.
    by_url: FxHashMap<AssetUrl, AssetId>,
    roots: Vec<AssetId>,

    state: GraphState,
    warnings: Vec<String>,
    /// Shared by clones, so a snapshot sees the same cancellation.
    cancel: CancelFlag,
}

impl fmt::Debug for AssetGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetGraph")
            .field("root", &self.root.as_str())
            .field("state", &self.state)
            .field("assets", &self.asset_order.len())
            .field("relations", &self.relation_order.len())
            .field("providers", &self.providers)
            .finish_non_exhaustive()
    }
}

impl AssetGraph {
    /// Empty graph rooted at a directory URL, reading from disk.
    pub fn new(root: AssetUrl) -> Self {
        Self {
            root,
            config: Arc::new(GraphConfig::default()),
            loader: Arc::new(FsLoader),
            providers: Providers::standard(),
            assets: Vec::new(),
            relations: Vec::new(),
            asset_order: Vec::new(),
            relation_order: Vec::new(),
            by_url: FxHashMap::default(),
            roots: Vec::new(),
            state: GraphState::Empty,
            warnings: Vec::new(),
            cancel: CancelFlag::new(),
        }
    }

    /// Empty graph rooted at a filesystem directory.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let dir = std::path::absolute(dir).map_err(|e| AssetError::Io(dir.display().to_string(), e))?;
        AssetUrl::from_directory_path(&dir)
            .map(Self::new)
            .ok_or_else(|| AssetError::resolution(dir.display(), "", "not a usable root directory"))
    }

    /// Graph configured from `assetgraph.toml` settings.
    ///
    /// Without a configured root, the current directory is used.
    pub fn from_config(config: GraphConfig) -> std::result::Result<Self, ConfigError> {
        let dir = match config.root_dir() {
            Some(dir) => dir.to_path_buf(),
            None => std::env::current_dir().map_err(|e| ConfigError::Io(".".into(), e))?,
        };
        config.apply_logging();
        let graph = Self::from_dir(&dir).map_err(|e| ConfigError::Validation(e.to_string()))?;
        Ok(graph.with_config(config))
    }

    pub fn with_config(mut self, config: GraphConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn with_loader(mut self, loader: impl Loader + 'static) -> Self {
        self.loader = Arc::new(loader);
        self
    }

    /// Install the flag that long-running work on this graph watches.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// `Cancelled(what)` once the graph's flag is set.
    pub fn check_cancelled(&self, what: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(AssetError::Cancelled(what.to_string()));
        }
        Ok(())
    }

    pub fn with_providers(mut self, providers: Providers) -> Self {
        self.providers = providers;
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn root(&self) -> &AssetUrl {
        &self.root
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    pub fn state(&self) -> GraphState {
        self.state
    }

    /// Whether population reached its fixed point.
    pub fn is_complete(&self) -> bool {
        self.state == GraphState::Populated
    }

    /// Failures downgraded to warnings (optional assets).
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub(crate) fn warn(&mut self, message: String) {
        log!("warning"; "{}", message);
        self.warnings.push(message);
    }

    /// Assets loaded explicitly through `load_assets`.
    pub fn roots(&self) -> &[AssetId] {
        &self.roots
    }

    #[inline]
    pub fn asset(&self, id: AssetId) -> Option<&Asset> {
        self.assets.get(id.0 as usize).and_then(Option::as_ref)
    }

    #[inline]
    pub fn asset_mut(&mut self, id: AssetId) -> Option<&mut Asset> {
        self.assets.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    #[inline]
    pub fn relation(&self, id: RelationId) -> Option<&Relation> {
        self.relations.get(id.0 as usize).and_then(Option::as_ref)
    }

    #[inline]
    pub(crate) fn relation_mut(&mut self, id: RelationId) -> Option<&mut Relation> {
        self.relations.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    pub fn asset_count(&self) -> usize {
        self.asset_order.len()
    }

    pub fn relation_count(&self) -> usize {
        self.relation_order.len()
    }

    /// Assets in discovery order.
    pub fn assets(&self) -> impl Iterator<Item = &Asset> + '_ {
        self.asset_order.iter().filter_map(|id| self.asset(*id))
    }

    /// Relations in discovery order.
    pub fn relations(&self) -> impl Iterator<Item = &Relation> + '_ {
        self.relation_order.iter().filter_map(|id| self.relation(*id))
    }

    pub fn asset_by_url(&self, url: &AssetUrl) -> Option<AssetId> {
        self.by_url.get(url).copied()
    }

    /// Outgoing relations of an asset in source order.
    pub fn outgoing(&self, id: AssetId) -> Vec<&Relation> {
        self.asset(id)
            .map(|a| a.outgoing.iter().filter_map(|r| self.relation(*r)).collect())
            .unwrap_or_default()
    }

    pub fn incoming(&self, id: AssetId) -> Vec<&Relation> {
        self.asset(id)
            .map(|a| a.incoming.iter().filter_map(|r| self.relation(*r)).collect())
            .unwrap_or_default()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn find_assets(&self, query: &AssetQuery) -> Vec<&Asset> {
        self.assets().filter(|a| query.matches(a)).collect()
    }

    pub fn find_asset_ids(&self, query: &AssetQuery) -> Vec<AssetId> {
        self.assets().filter(|a| query.matches(a)).map(|a| a.id).collect()
    }

    pub fn find_relations(&self, query: &RelationQuery) -> Vec<&Relation> {
        self.relations().filter(|r| query.matches(r, self)).collect()
    }

    pub fn find_relation_ids(&self, query: &RelationQuery) -> Vec<RelationId> {
        self.relations()
            .filter(|r| query.matches(r, self))
            .map(|r| r.id)
            .collect()
    }

    // =========================================================================
    // Construction
    // =========================================================================

    /// Turn a user-supplied location into an asset URL.
    ///
    /// Accepts absolute URLs, absolute filesystem paths, and paths relative
    /// to the graph root.
    pub fn resolve_url(&self, location: &str) -> Option<AssetUrl> {
        let path = Path::new(location);
        if path.is_absolute() {
            return AssetUrl::from_file_path(path);
        }
        if location.contains("://") {
            return AssetUrl::parse(location);
        }
        self.root.join(location.trim_start_matches("./"))
    }

    fn insert_asset(&mut self, asset: Asset) -> AssetId {
        let id = asset.id;
        if !asset.is_inline {
            self.by_url.insert(asset.url.clone(), id);
        }
        self.assets.push(Some(asset));
        self.asset_order.push(id);
        id
    }

    #[inline]
    fn next_asset_id(&self) -> AssetId {
        AssetId(self.assets.len() as u32)
    }

    /// Existing asset for `url`, or a new unloaded one.
    ///
    /// A required reference clears the `optional` flag of an existing asset.
    fn ensure_asset(&mut self, url: AssetUrl, hint: Option<AssetType>, optional: bool) -> AssetId {
        if let Some(id) = self.asset_by_url(&url) {
            if !optional && let Some(asset) = self.asset_mut(id) {
                asset.optional = false;
            }
            return id;
        }
        let asset_type = url
            .extension()
            .and_then(|ext| AssetType::from_extension(&ext))
            .or(hint)
            .unwrap_or(AssetType::Unknown);
        let id = self.next_asset_id();
        let mut asset = Asset::unloaded(id, url, asset_type);
        asset.optional = optional;
        self.insert_asset(asset)
    }

    /// Add a loaded asset built from bytes, e.g. one derived by a transform.
    ///
    /// Its outgoing relations are discovered immediately. A URL already in
    /// the graph is deduplicated: a loaded asset is returned as is, an
    /// unloaded one is loaded with `bytes`.
    pub fn add_asset(&mut self, url: AssetUrl, asset_type: AssetType, bytes: Vec<u8>) -> Result<AssetId> {
        let id = match self.asset_by_url(&url) {
            Some(id) if self.asset(id).is_some_and(Asset::is_loaded) => return Ok(id),
            Some(id) => {
                if let Some(asset) = self.asset_mut(id) {
                    asset.asset_type = asset_type;
                }
                id
            }
            None => {
                let id = self.next_asset_id();
                self.insert_asset(Asset::unloaded(id, url, asset_type))
            }
        };
        self.complete_load(id, bytes)?;
        Ok(id)
    }

    /// Inline asset carried by `container`. Loaded, but its own relations
    /// are attached by the caller once the containing relation exists.
    fn add_inline_asset(&mut self, container: AssetId, asset_type: AssetType, text: String) -> Result<AssetId> {
        let url = self
            .asset(container)
            .map(|a| a.url.clone())
            .ok_or_else(|| AssetError::Missing(format!("asset {container}")))?;
        let id = self.next_asset_id();
        let mut asset = Asset::unloaded(id, url, asset_type);
        asset.is_inline = true;
        self.insert_asset(asset);
        self.load_bytes(id, text.into_bytes())?;
        Ok(id)
    }

    /// Link two assets already in the graph.
    pub fn add_relation(
        &mut self,
        from: AssetId,
        to: AssetId,
        relation_type: RelationType,
        href: Option<String>,
        locator: Locator,
        position: Position,
    ) -> Result<RelationId> {
        for id in [from, to] {
            if self.asset(id).is_none() {
                return Err(AssetError::Missing(format!("asset {id}")));
            }
        }

        let global = match position {
            Position::Last => self.relation_order.len(),
            Position::After(anchor) => self.order_index(anchor)? + 1,
            Position::Before(anchor) => self.order_index(anchor)?,
        };

        let id = RelationId(self.relations.len() as u32);
        self.relations.push(Some(Relation {
            id,
            from,
            to,
            relation_type,
            href,
            locator,
        }));
        self.relation_order.insert(global, id);

        if let Some(source) = self.asset_mut(from) {
            let local = match position {
                Position::After(anchor) => source.outgoing.iter().position(|r| *r == anchor).map(|i| i + 1),
                Position::Before(anchor) => source.outgoing.iter().position(|r| *r == anchor),
                Position::Last => None,
            };
            match local {
                Some(index) => source.outgoing.insert(index, id),
                None => source.outgoing.push(id),
            }
        }
        if let Some(target) = self.asset_mut(to) {
            target.incoming.push(id);
        }
        Ok(id)
    }

    fn order_index(&self, relation: RelationId) -> Result<usize> {
        self.relation_order
            .iter()
            .position(|r| *r == relation)
            .ok_or_else(|| AssetError::Missing(format!("relation {relation}")))
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Parse `bytes` into the asset with the first provider that accepts them.
    ///
    /// On failure the asset is marked `Failed` and stays in the graph.
    pub(crate) fn load_bytes(&mut self, id: AssetId, bytes: Vec<u8>) -> Result<()> {
        let asset = self
            .assets
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| AssetError::Missing(format!("asset {id}")))?;

        let probe = Probe {
            url: &asset.url,
            declared: asset.asset_type,
            bytes: &bytes,
        };
        let parsed = match self.providers.find(&probe) {
            Some(provider) => provider
                .parse(&probe)
                .map(|tree| (provider.asset_type(&probe), tree)),
            None => Err(AssetError::UnsupportedType {
                url: asset.url.to_string(),
                hint: (asset.asset_type != AssetType::Unknown)
                    .then(|| format!("no provider for {}", asset.asset_type)),
            }),
        };

        match parsed {
            Ok((asset_type, tree)) => {
                asset.asset_type = asset_type;
                asset.parsed = Some(tree);
                asset.raw = Some(bytes);
                asset.state = LoadState::Loaded;
                Ok(())
            }
            Err(err) => {
                asset.state = LoadState::Failed(err.to_string());
                Err(err)
            }
        }
    }

    /// Load bytes into an asset and attach its outgoing relations.
    pub(crate) fn complete_load(&mut self, id: AssetId, bytes: Vec<u8>) -> Result<Vec<RelationId>> {
        self.load_bytes(id, bytes)?;
        self.attach_outgoing(id)
    }

    /// References found by the asset's provider, in source order.
    pub(crate) fn discover(&self, id: AssetId) -> Vec<Discovered> {
        let Some(asset) = self.asset(id) else {
            return Vec::new();
        };
        let Some(tree) = asset.parse_tree() else {
            return Vec::new();
        };
        self.providers
            .for_type(asset.asset_type, &asset.url)
            .map(|p| p.discover(tree))
            .unwrap_or_default()
    }

    /// Create relations for everything the asset references.
    ///
    /// Returns every relation created, including those of new inline assets.
    pub(crate) fn attach_outgoing(&mut self, id: AssetId) -> Result<Vec<RelationId>> {
        let mut created = Vec::new();
        for item in self.discover(id) {
            self.attach_discovered(id, item, Position::Last, &mut created)?;
        }
        Ok(created)
    }

    /// Turn one discovered reference into a relation.
    ///
    /// Returns `None` for hrefs that do not point at a local resource.
    pub(crate) fn attach_discovered(
        &mut self,
        from: AssetId,
        item: Discovered,
        position: Position,
        created: &mut Vec<RelationId>,
    ) -> Result<Option<RelationId>> {
        let Discovered {
            relation_type,
            href,
            locator,
            inline,
        } = item;

        let (to, is_inline) = match (inline, href.as_deref()) {
            (Some((asset_type, text)), _) => (self.add_inline_asset(from, asset_type, text)?, true),
            (None, Some(href)) => {
                let base = self
                    .asset(from)
                    .map(|a| a.url.clone())
                    .ok_or_else(|| AssetError::Missing(format!("asset {from}")))?;
                let Some(url) = base.resolve(&self.root, href) else {
                    debug!("graph"; "skipping non-local {} href `{}`", relation_type, href);
                    return Ok(None);
                };
                let optional = self.config.populate.is_best_effort(relation_type);
                (self.ensure_asset(url, relation_type.target_hint(), optional), false)
            }
            (None, None) => return Ok(None),
        };

        let rel = self.add_relation(from, to, relation_type, href, locator, position)?;
        created.push(rel);
        if is_inline {
            created.extend(self.attach_outgoing(to)?);
        }
        Ok(Some(rel))
    }

    /// Fetch and load the given root locations.
    ///
    /// Locations already in the graph are not fetched again.
    pub async fn load_assets(&mut self, locations: &[&str]) -> Result<Vec<AssetId>> {
        self.state = GraphState::Loading;
        let mut ids = Vec::with_capacity(locations.len());

        for location in locations {
            let url = self.resolve_url(location).ok_or_else(|| {
                AssetError::resolution(&self.root, *location, "not a local path or absolute URL")
            })?;
            let id = self.ensure_asset(url.clone(), None, false);
            if !self.roots.contains(&id) {
                self.roots.push(id);
            }

            if self.asset(id).is_some_and(|a| a.state == LoadState::Unloaded) {
                let loader = Arc::clone(&self.loader);
                let bytes = match loader.fetch(&url).await {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        self.mark_failed(id, &err);
                        return Err(err);
                    }
                };
                self.complete_load(id, bytes)?;
                debug!("load"; "{}", url.display_relative(&self.root));
            }
            ids.push(id);
        }

        Ok(ids)
    }

    /// Target of a relation, loading it first if it is still unloaded.
    pub async fn resolve(&mut self, relation: RelationId) -> Result<AssetId> {
        let to = self
            .relation(relation)
            .map(|r| r.to)
            .ok_or_else(|| AssetError::Missing(format!("relation {relation}")))?;

        if self.asset(to).is_some_and(|a| a.state == LoadState::Unloaded) {
            let url = self
                .asset(to)
                .map(|a| a.url.clone())
                .ok_or_else(|| AssetError::Missing(format!("asset {to}")))?;
            let loader = Arc::clone(&self.loader);
            match loader.fetch(&url).await {
                Ok(bytes) => {
                    self.complete_load(to, bytes)?;
                }
                Err(err) => return Err(self.fetch_error(to, err)),
            }
        }
        Ok(to)
    }

    fn mark_failed(&mut self, id: AssetId, err: &AssetError) {
        if let Some(asset) = self.asset_mut(id) {
            asset.state = LoadState::Failed(err.to_string());
        }
    }

    /// Mark the asset failed and phrase the error from its first referrer.
    pub(crate) fn fetch_error(&mut self, id: AssetId, err: AssetError) -> AssetError {
        self.mark_failed(id, &err);

        let referrer = self.incoming(id).into_iter().find_map(|rel| {
            let href = rel.href.clone()?;
            let from = self.asset(rel.from)?;
            Some((from.url.clone(), href))
        });
        match referrer {
            Some((from, href)) => {
                let reason = match &err {
                    AssetError::Io(_, io) => io.to_string(),
                    other => other.to_string(),
                };
                AssetError::resolution(from, href, reason)
            }
            None => err,
        }
    }
}

impl AssetLookup for AssetGraph {
    fn lookup_asset(&self, id: AssetId) -> Option<&Asset> {
        self.asset(id)
    }
}
