//! In-place graph edits.
//!
//! Every edit goes through the source asset's parse tree, so cached raw
//! bytes are dropped and regenerated on the next [`AssetGraph::serialize`].

use rustc_hash::FxHashSet;

use super::{AssetGraph, Position};
use crate::asset::{Asset, AssetId};
use crate::core::AssetUrl;
use crate::error::{AssetError, Result, TransformError};
use crate::relation::{Locator, Relation, RelationId, read_inline, write_href, write_inline};

impl AssetGraph {
    /// Rewrite the href of a relation in its source asset.
    pub fn set_href(&mut self, relation: RelationId, href: &str) -> Result<()> {
        let rel = self
            .relation(relation)
            .cloned()
            .ok_or_else(|| AssetError::Missing(format!("relation {relation}")))?;
        if rel.is_inline() {
            return Err(TransformError::new("setHref", format!("{relation} is inline and has no href")).into());
        }

        let asset = self
            .asset_mut(rel.from)
            .ok_or_else(|| AssetError::Missing(format!("asset {}", rel.from)))?;
        let url = asset.url.clone();
        let written = asset
            .parse_tree_mut()
            .is_some_and(|tree| write_href(tree, &rel.locator, href));
        if !written {
            return Err(TransformError::new(
                "setHref",
                format!("reference for {relation} not found in {url}"),
            )
            .into());
        }

        if let Some(rel) = self.relation_mut(relation) {
            rel.href = Some(href.to_string());
        }
        Ok(())
    }

    /// Point a relation at another asset, rewriting its href relative to the
    /// source asset.
    pub fn retarget(&mut self, relation: RelationId, to: AssetId) -> Result<()> {
        let rel = self
            .relation(relation)
            .cloned()
            .ok_or_else(|| AssetError::Missing(format!("relation {relation}")))?;
        let target_url = self
            .asset(to)
            .map(|a| a.url.clone())
            .ok_or_else(|| AssetError::Missing(format!("asset {to}")))?;

        if !rel.is_inline() {
            let href = self.href_between(rel.from, &target_url)?;
            self.set_href(relation, &href)?;
        }

        if let Some(old) = self.asset_mut(rel.to) {
            old.incoming.retain(|r| *r != relation);
        }
        if let Some(new) = self.asset_mut(to) {
            new.incoming.push(relation);
        }
        if let Some(rel) = self.relation_mut(relation) {
            rel.to = to;
        }
        Ok(())
    }

    /// Href that leads from the asset `from` to `target`.
    pub fn href_between(&self, from: AssetId, target: &AssetUrl) -> Result<String> {
        self.asset(from)
            .map(|a| a.url.relative_href(target))
            .ok_or_else(|| AssetError::Missing(format!("asset {from}")))
    }

    /// Replace an asset's content and re-discover its relations.
    ///
    /// Relations whose reference is still present keep their id and target.
    /// Returns the relations created.
    pub fn replace_raw(&mut self, id: AssetId, bytes: Vec<u8>) -> Result<Vec<RelationId>> {
        self.load_bytes(id, bytes)?;
        self.refresh_relations(id)
    }

    /// Re-scan an asset after its parse tree changed.
    ///
    /// New references become relations placed in source order next to the
    /// surviving ones; references that disappeared are removed.
    pub fn refresh_relations(&mut self, id: AssetId) -> Result<Vec<RelationId>> {
        let existing: Vec<RelationId> = self
            .asset(id)
            .map(|a| a.outgoing.clone())
            .ok_or_else(|| AssetError::Missing(format!("asset {id}")))?;

        let mut kept = FxHashSet::default();
        let mut created = Vec::new();
        let mut previous: Option<RelationId> = None;

        for item in self.discover(id) {
            let matched = existing.iter().copied().find(|r| {
                !kept.contains(r)
                    && self.relation(*r).is_some_and(|rel| {
                        rel.relation_type == item.relation_type
                            && rel.locator == item.locator
                            && rel.href == item.href
                    })
            });

            match matched {
                Some(rel) => {
                    kept.insert(rel);
                    if let Some((_, text)) = &item.inline {
                        self.sync_inline_child(rel, text)?;
                    }
                    previous = Some(rel);
                }
                None => {
                    let position = match previous {
                        Some(prev) => Position::After(prev),
                        None => existing.first().map_or(Position::Last, |r| Position::Before(*r)),
                    };
                    if let Some(rel) = self.attach_discovered(id, item, position, &mut created)? {
                        previous = Some(rel);
                    }
                }
            }
        }

        for rel in existing {
            if !kept.contains(&rel) {
                self.remove_relation(rel);
            }
        }
        Ok(created)
    }

    /// Reload an inline child whose text changed inside the container.
    fn sync_inline_child(&mut self, relation: RelationId, text: &str) -> Result<()> {
        let Some(child) = self.relation(relation).map(|r| r.to) else {
            return Ok(());
        };
        let current = self.asset(child).and_then(Asset::text);
        if current.as_deref() != Some(text) {
            self.load_bytes(child, text.as_bytes().to_vec())?;
            self.refresh_relations(child)?;
        }
        Ok(())
    }

    /// Remove a relation. An inline target left without referrers goes too.
    pub fn remove_relation(&mut self, relation: RelationId) -> Option<Relation> {
        let rel = self.relations.get_mut(relation.0 as usize)?.take()?;
        self.relation_order.retain(|r| *r != relation);

        if let Some(from) = self.asset_mut(rel.from) {
            from.outgoing.retain(|r| *r != relation);
        }
        let orphaned_inline = match self.asset_mut(rel.to) {
            Some(to) => {
                to.incoming.retain(|r| *r != relation);
                to.is_inline && to.incoming.is_empty()
            }
            None => false,
        };
        if orphaned_inline {
            self.remove_asset(rel.to);
        }
        Some(rel)
    }

    /// Remove an asset and every relation touching it.
    pub fn remove_asset(&mut self, id: AssetId) -> Option<Asset> {
        let asset = self.assets.get_mut(id.0 as usize)?.take()?;

        self.asset_order.retain(|a| *a != id);
        self.roots.retain(|a| *a != id);
        if !asset.is_inline && self.by_url.get(&asset.url) == Some(&id) {
            self.by_url.remove(&asset.url);
        }
        for rel in asset.outgoing.iter().chain(asset.incoming.iter()) {
            self.remove_relation(*rel);
        }
        Some(asset)
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    /// Bytes of an asset, with edits of inline children written back first.
    pub fn serialize(&mut self, id: AssetId) -> Result<Vec<u8>> {
        self.sync_inline(id)?;

        let asset = self
            .asset(id)
            .ok_or_else(|| AssetError::Missing(format!("asset {id}")))?;
        if let Some(raw) = asset.cached_raw() {
            return Ok(raw.to_vec());
        }
        let tree = asset.parse_tree().ok_or_else(|| AssetError::UnsupportedType {
            url: asset.url.to_string(),
            hint: Some(format!("asset is {:?}", asset.state())),
        })?;
        let provider = self
            .providers
            .for_type(asset.asset_type, &asset.url)
            .ok_or_else(|| AssetError::unsupported(&asset.url))?;
        provider.serialize(tree)
    }

    /// Serialized text of an asset.
    pub fn text(&mut self, id: AssetId) -> Result<String> {
        let bytes = self.serialize(id)?;
        let url = self.asset(id).map(|a| a.url.to_string()).unwrap_or_default();
        String::from_utf8(bytes).map_err(|e| AssetError::unsupported(format!("{url} ({e})")))
    }

    /// Write the serialized form of each inline child into its container.
    fn sync_inline(&mut self, id: AssetId) -> Result<()> {
        let inline: Vec<(AssetId, Locator)> = self
            .outgoing(id)
            .into_iter()
            .filter(|rel| rel.is_inline())
            .filter(|rel| self.asset(rel.to).is_some_and(|a| a.is_inline))
            .map(|rel| (rel.to, rel.locator.clone()))
            .collect();

        for (child, locator) in inline {
            let text = self.text(child)?;
            let Some(container) = self.asset_mut(id) else {
                continue;
            };
            let current = container.parse_tree().and_then(|tree| read_inline(tree, &locator));
            if current.as_deref() != Some(text.as_str())
                && let Some(tree) = container.parse_tree_mut()
            {
                write_inline(tree, &locator, &text);
            }
        }
        Ok(())
    }

    /// Every relation endpoint must be an asset in the graph.
    ///
    /// Returns a description of each violation.
    pub fn check_closure(&self) -> std::result::Result<(), Vec<String>> {
        let mut problems = Vec::new();
        for rel in self.relations() {
            for (end, id) in [("source", rel.from), ("target", rel.to)] {
                if self.asset(id).is_none() {
                    problems.push(format!("{} {} {id} is missing", rel.id, end));
                }
            }
        }
        for asset in self.assets() {
            for rel in asset.outgoing.iter().chain(asset.incoming.iter()) {
                if self.relation(*rel).is_none() {
                    problems.push(format!("{} lists removed relation {rel}", asset.id));
                }
            }
        }
        if problems.is_empty() { Ok(()) } else { Err(problems) }
    }
}
