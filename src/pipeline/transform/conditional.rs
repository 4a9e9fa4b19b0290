//! `runJavaScriptConditionalBlocks`: materialize environment-gated script output.
//!
//! For each HTML asset in scope, every script that mentions the environment
//! name runs with that name bound to `true`. Markup the script produces is
//! written into the page's tree and the page's relations are re-discovered.
//! Scripts themselves stay in the page, tagged with the environments they
//! already ran for, so a second run over the same graph writes nothing.

use async_trait::async_trait;
use serde::Deserialize;

use super::scope;
use crate::asset::{AssetId, AssetType, ParseTree};
use crate::config::ConfigError;
use crate::error::{AssetError, Result, TransformError};
use crate::graph::AssetGraph;
use crate::html::NodeId;
use crate::js::{HtmlDomHost, run_script};
use crate::pipeline::registry::parse_args;
use crate::pipeline::{Stage, StageArgs};
use crate::query::{AssetQuery, QuerySpec};
use crate::relation::{RelationId, RelationType};

const NAME: &str = "runJavaScriptConditionalBlocks";

/// Space separated environments a script element already ran for.
const RAN_ATTR: &str = "data-conditional-ran";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Args {
    #[serde(default)]
    query: Option<QuerySpec>,
    environment: String,
}

#[derive(Debug, Clone)]
pub struct RunJavaScriptConditionalBlocks {
    query: AssetQuery,
    environment: String,
}

impl RunJavaScriptConditionalBlocks {
    pub const NAME: &'static str = NAME;

    pub fn new(query: AssetQuery, environment: impl Into<String>) -> Self {
        Self {
            query,
            environment: environment.into(),
        }
    }

    pub fn from_args(args: &StageArgs) -> std::result::Result<Self, ConfigError> {
        let args: Args = parse_args(NAME, args)?;
        if args.environment.trim().is_empty() {
            return Err(ConfigError::args(NAME, "`environment` is empty"));
        }
        Ok(Self::new(scope(NAME, args.query.as_ref())?, args.environment))
    }

    fn fail(&self, url: impl std::fmt::Display, message: impl std::fmt::Display) -> AssetError {
        TransformError::new(NAME, format!("{url}: {message}")).into()
    }

    fn already_ran(&self, graph: &AssetGraph, html: AssetId, node: NodeId) -> bool {
        graph
            .asset(html)
            .and_then(|a| a.parse_tree())
            .and_then(ParseTree::as_html)
            .and_then(|doc| doc.element(node))
            .and_then(|element| element.get_attr(RAN_ATTR))
            .is_some_and(|ran| ran.split_whitespace().any(|env| env == self.environment))
    }

    /// Run the page's matching scripts. Returns the number of scripts run.
    async fn run_page(&self, graph: &mut AssetGraph, html: AssetId) -> Result<usize> {
        let scripts: Vec<(RelationId, NodeId)> = graph
            .outgoing(html)
            .into_iter()
            .filter(|r| r.relation_type == RelationType::HtmlScript)
            .filter_map(|r| r.locator.html_node().map(|node| (r.id, node)))
            .collect();

        let mut ran = 0;
        for (relation, node) in scripts {
            if self.already_ran(graph, html, node) {
                debug!("conditional"; "script {} already ran for `{}`", node, self.environment);
                continue;
            }
            let target = graph
                .resolve(relation)
                .await
                .map_err(|e| TransformError::wrap(NAME, e))?;
            let Some(script) = graph
                .asset(target)
                .and_then(|a| a.parse_tree())
                .and_then(ParseTree::as_script)
                .filter(|s| s.mentions(&self.environment))
                .cloned()
            else {
                continue;
            };

            let url = graph.asset(html).map(|a| a.url.clone());
            let doc = graph
                .asset_mut(html)
                .and_then(|a| a.parse_tree_mut())
                .and_then(ParseTree::as_html_mut)
                .ok_or_else(|| AssetError::Missing(format!("document {html}")))?;

            let mut host = HtmlDomHost::new(doc, node);
            let display = url.as_ref().map(ToString::to_string).unwrap_or_default();
            run_script(&script.text, &self.environment, &mut host).map_err(|e| self.fail(&display, e))?;
            let inserted = host.finish().map_err(|e| self.fail(&display, e))?;
            if let Some(element) = doc.element_mut(node) {
                let ran_for = match element.get_attr(RAN_ATTR) {
                    Some(previous) => format!("{previous} {}", self.environment),
                    None => self.environment.clone(),
                };
                element.set_attr(RAN_ATTR, ran_for);
            }
            debug!("conditional"; "{}: script {} wrote {} element(s)", display, node, inserted);
            ran += 1;
        }

        if ran > 0 {
            graph.refresh_relations(html)?;
        }
        Ok(ran)
    }
}

#[async_trait]
impl Stage for RunJavaScriptConditionalBlocks {
    fn name(&self) -> &str {
        NAME
    }

    async fn apply(&self, graph: &mut AssetGraph) -> Result<()> {
        let query = self.query.clone().and(AssetQuery::of_type(AssetType::Html));
        let pages: Vec<AssetId> = graph
            .find_assets(&query)
            .into_iter()
            .filter(|a| a.is_loaded())
            .map(|a| a.id)
            .collect();

        let mut ran = 0;
        for page in pages {
            graph.check_cancelled(NAME)?;
            ran += self.run_page(graph, page).await?;
        }
        debug!("conditional"; "{} script(s) run for `{}`", ran, self.environment);
        Ok(())
    }
}
