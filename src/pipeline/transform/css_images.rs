//! `postProcessCssImages`: derive processed copies of CSS background images.
//!
//! A rule opts in with the post-process directive:
//!
//! ```css
//! .header {
//!   background-image: url(gradient.png);
//!   -asset-image-postprocess: quantize(4);
//! }
//! ```
//!
//! Each raster image referenced from that rule is run through the listed
//! operations on the blocking pool. When the PNG result is strictly smaller
//! it becomes a new asset, referenced by a `background-image` declaration
//! inserted right after the original one. Original relations stay in place,
//! so the derived relation shares the original's rule and directly follows
//! it in relation order.
//!
//! Only the original relations are preserved: the `CssImage` count grows by
//! one per derived image. Rerunning over the same graph adds nothing, since
//! derived images are never processed again and a rule that already
//! references a result is left alone.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use tokio::task::JoinSet;

use super::scope;
use crate::asset::{AssetId, AssetType, ParseTree};
use crate::config::ConfigError;
use crate::core::AssetUrl;
use crate::css::{DeclarationId, RuleId, url_value};
use crate::error::{AssetError, Result, TransformError};
use crate::graph::{AssetGraph, Position};
use crate::image::postprocess::{ImageOp, parse_ops, process};
use crate::pipeline::registry::parse_args;
use crate::pipeline::{Stage, StageArgs};
use crate::query::{AssetQuery, QuerySpec};
use crate::relation::{Locator, RelationId, RelationType};
use crate::utils::hash::fingerprint;

const NAME: &str = "postProcessCssImages";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Args {
    query: Option<QuerySpec>,
}

/// One image to process.
struct Job {
    css: AssetId,
    relation: RelationId,
    rule: RuleId,
    declaration: DeclarationId,
    target_url: AssetUrl,
    original_len: usize,
    bytes: Vec<u8>,
    ops: Vec<ImageOp>,
}

#[derive(Debug, Clone, Default)]
pub struct PostProcessCssImages {
    query: AssetQuery,
}

impl PostProcessCssImages {
    pub const NAME: &'static str = NAME;

    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the stylesheets considered.
    pub fn query(mut self, query: AssetQuery) -> Self {
        self.query = query;
        self
    }

    pub fn from_args(args: &StageArgs) -> std::result::Result<Self, ConfigError> {
        let args: Args = parse_args(NAME, args)?;
        Ok(Self {
            query: scope(NAME, args.query.as_ref())?,
        })
    }

    /// Directive declarations of a stylesheet: `(rule, declaration, ops)`.
    fn directives(
        graph: &AssetGraph,
        css: AssetId,
        property: &str,
    ) -> Result<Vec<(RuleId, DeclarationId, Vec<ImageOp>)>> {
        let Some(asset) = graph.asset(css) else {
            return Ok(Vec::new());
        };
        let Some(sheet) = asset.parse_tree().and_then(ParseTree::as_css) else {
            return Ok(Vec::new());
        };

        sheet
            .declarations()
            .iter()
            .filter(|decl| decl.property.eq_ignore_ascii_case(property))
            .map(|decl| {
                parse_ops(&decl.value)
                    .map(|ops| (decl.rule, decl.id, ops))
                    .map_err(|e| {
                        AssetError::from(TransformError::new(NAME, format!("{}: {}: {e}", asset.url, decl.rule)))
                    })
            })
            .collect()
    }

    /// Resolve every raster image referenced from a directive rule.
    async fn collect_jobs(
        graph: &mut AssetGraph,
        css: AssetId,
        directives: &[(RuleId, DeclarationId, Vec<ImageOp>)],
    ) -> Result<Vec<Job>> {
        let mut jobs = Vec::new();
        for (rule, _, ops) in directives {
            let relations: Vec<(RelationId, Locator)> = graph
                .outgoing(css)
                .into_iter()
                .filter(|r| r.relation_type == RelationType::CssImage && r.css_rule() == Some(*rule))
                .map(|r| (r.id, r.locator.clone()))
                .collect();

            for (relation, locator) in relations {
                let Locator::CssUrl { declaration, .. } = locator else {
                    continue;
                };
                let target = graph
                    .resolve(relation)
                    .await
                    .map_err(|e| TransformError::wrap(NAME, e))?;
                let Some(image) = graph.asset(target) else {
                    continue;
                };
                if !image.asset_type.is_raster() {
                    debug!("images"; "skipping {} ({})", image.url, image.asset_type);
                    continue;
                }
                let Some(bytes) = image.raw_src() else {
                    continue;
                };
                if is_derived(&image.url, &bytes) {
                    debug!("images"; "skipping derived {}", image.url.file_name());
                    continue;
                }
                jobs.push(Job {
                    css,
                    relation,
                    rule: *rule,
                    declaration,
                    target_url: image.url.clone(),
                    original_len: bytes.len(),
                    bytes,
                    ops: ops.clone(),
                });
            }
        }
        Ok(jobs)
    }

    /// Process images on the blocking pool; results come back in job order.
    async fn run_jobs(jobs: &mut [Job]) -> Result<Vec<std::result::Result<Vec<u8>, String>>> {
        let mut tasks = JoinSet::new();
        for (index, job) in jobs.iter_mut().enumerate() {
            let bytes = std::mem::take(&mut job.bytes);
            let ops = job.ops.clone();
            tasks.spawn_blocking(move || (index, process(&bytes, &ops)));
        }

        let mut results: Vec<Option<std::result::Result<Vec<u8>, String>>> = vec![None; jobs.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, result) =
                joined.map_err(|e| TransformError::new(NAME, format!("image task failed: {e}")))?;
            results[index] = Some(result);
        }
        Ok(results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| Err("image task did not report".to_string())))
            .collect())
    }

    /// Add the derived image and reference it from the original rule.
    ///
    /// `last` tracks the most recent declaration inserted after each
    /// original, so several derived images keep source order. False when
    /// the rule already references the same result.
    fn link_derived(
        graph: &mut AssetGraph,
        job: &Job,
        output: Vec<u8>,
        last: &mut FxHashMap<DeclarationId, DeclarationId>,
    ) -> Result<bool> {
        let name = format!("{}.{}.png", job.target_url.file_stem(), fingerprint(&output));
        let url = job
            .target_url
            .with_file_name(&name)
            .ok_or_else(|| TransformError::new(NAME, format!("cannot name derived image of {}", job.target_url)))?;
        if let Some(existing) = graph.asset_by_url(&url)
            && graph
                .outgoing(job.css)
                .iter()
                .any(|r| r.to == existing && r.css_rule() == Some(job.rule))
        {
            debug!("images"; "{} already references {}", job.rule, name);
            return Ok(false);
        }

        let derived = graph.add_asset(url.clone(), AssetType::Png, output)?;
        let href = graph.href_between(job.css, &url)?;

        let after = last.get(&job.declaration).copied().unwrap_or(job.declaration);
        let sheet = graph
            .asset_mut(job.css)
            .and_then(|a| a.parse_tree_mut())
            .and_then(ParseTree::as_css_mut)
            .ok_or_else(|| AssetError::Missing(format!("stylesheet {}", job.css)))?;
        let inserted = sheet
            .insert_declaration_after(job.rule, after, "background-image", &url_value(&href))
            .map_err(|e| TransformError::new(NAME, format!("expected rule {} not found: {e}", job.rule)))?;
        last.insert(job.declaration, inserted);

        graph.add_relation(
            job.css,
            derived,
            RelationType::CssImage,
            Some(href),
            Locator::CssUrl {
                rule: job.rule,
                declaration: inserted,
                index: 0,
            },
            Position::After(job.relation),
        )?;
        debug!("images"; "{} -> {}", job.target_url.file_name(), name);
        Ok(true)
    }

    async fn process_stylesheet(&self, graph: &mut AssetGraph, css: AssetId) -> Result<usize> {
        let directive = graph.config().images.directive.clone();
        let keep_directive = graph.config().images.keep_directive;

        let directives = Self::directives(graph, css, &directive)?;
        if directives.is_empty() {
            return Ok(0);
        }

        let mut jobs = Self::collect_jobs(graph, css, &directives).await?;
        let results = Self::run_jobs(&mut jobs).await?;

        let mut derived = 0;
        let mut last = FxHashMap::default();
        for (job, result) in jobs.iter().zip(results) {
            let output = result.map_err(|e| TransformError::new(NAME, format!("{}: {e}", job.target_url)))?;
            if output.len() >= job.original_len {
                debug!(
                    "images"; "{} not smaller after processing ({} >= {} bytes)",
                    job.target_url.file_name(), output.len(), job.original_len
                );
                continue;
            }
            if Self::link_derived(graph, job, output, &mut last)? {
                derived += 1;
            }
        }

        if !keep_directive
            && let Some(sheet) = graph
                .asset_mut(css)
                .and_then(|a| a.parse_tree_mut())
                .and_then(ParseTree::as_css_mut)
        {
            for (rule, decl, _) in &directives {
                sheet
                    .remove_declaration(*rule, *decl)
                    .map_err(|e| TransformError::new(NAME, e))?;
            }
        }
        Ok(derived)
    }
}

#[async_trait]
impl Stage for PostProcessCssImages {
    fn name(&self) -> &str {
        NAME
    }

    async fn apply(&self, graph: &mut AssetGraph) -> Result<()> {
        let query = self.query.clone().and(AssetQuery::of_type(AssetType::Css));
        let stylesheets: Vec<AssetId> = graph
            .find_assets(&query)
            .into_iter()
            .filter(|a| a.is_loaded())
            .map(|a| a.id)
            .collect();

        let mut derived = 0;
        for css in stylesheets {
            graph.check_cancelled(NAME)?;
            derived += self.process_stylesheet(graph, css).await?;
        }
        if derived > 0 {
            log!("images"; "{} derived image(s)", derived);
        }
        Ok(())
    }
}

/// Output of an earlier run, named `{stem}.{fingerprint}.png` after its own
/// content.
fn is_derived(url: &AssetUrl, bytes: &[u8]) -> bool {
    url.file_stem()
        .rsplit_once('.')
        .is_some_and(|(_, hash)| hash == fingerprint(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_derived() {
        let bytes = b"png bytes";
        let derived = AssetUrl::parse(&format!("file:///site/a.{}.png", fingerprint(bytes))).unwrap();
        let original = AssetUrl::parse("file:///site/a.png").unwrap();
        assert!(is_derived(&derived, bytes));
        assert!(!is_derived(&original, bytes));
        assert!(!is_derived(&derived, b"other bytes"));
    }
}
