use std::fs;

use async_trait::async_trait;

use super::transform::{
    LoadAssets, MinifyAssets, PopulateStage, PostProcessCssImages, RemoveUnreferencedAssets,
    RunJavaScriptConditionalBlocks,
};
use super::*;
use crate::asset::{AssetType, ParseTree};
use crate::core::AssetUrl;
use crate::error::TransformError;
use crate::graph::fixtures::{css_site, graph_for, html_site};
use crate::graph::{CancelFlag, GraphState, MemoryLoader};
use crate::image::fixtures::gradient_png;
use crate::query::{AssetQuery, RelationQuery};
use crate::relation::RelationType;

const PNG_MAGIC: [u8; 4] = [0x89, 0x50, 0x4E, 0x47];

fn site_url(path: &str) -> AssetUrl {
    AssetUrl::parse(&format!("file:///site/{path}")).unwrap()
}

fn memory_graph(files: &[(&str, Vec<u8>)]) -> AssetGraph {
    let loader = files
        .iter()
        .fold(MemoryLoader::new(), |loader, (path, bytes)| {
            loader.with(&site_url(path), bytes.clone())
        });
    AssetGraph::new(site_url("")).with_loader(loader)
}

fn count(graph: &AssetGraph, asset_type: AssetType) -> usize {
    graph.find_assets(&AssetQuery::of_type(asset_type)).len()
}

/// Removes every asset, then fails.
struct Wreck;

#[async_trait]
impl Stage for Wreck {
    fn name(&self) -> &str {
        "wreck"
    }

    async fn apply(&self, graph: &mut AssetGraph) -> Result<()> {
        let ids: Vec<_> = graph.assets().map(|a| a.id).collect();
        for id in ids {
            graph.remove_asset(id);
        }
        Err(TransformError::new("wreck", "expected rule not found").into())
    }
}

/// Sets the flag, then succeeds.
struct CancelNow(CancelFlag);

#[async_trait]
impl Stage for CancelNow {
    fn name(&self) -> &str {
        "cancelNow"
    }

    async fn apply(&self, _graph: &mut AssetGraph) -> Result<()> {
        self.0.cancel();
        Ok(())
    }
}

// =============================================================================
// postProcessCssImages
// =============================================================================

#[tokio::test]
async fn test_post_process_css_images() {
    let dir = css_site();
    let graph = Pipeline::new()
        .stage(LoadAssets::new(["style.css"]))
        .stage(PopulateStage::new())
        .run(graph_for(&dir))
        .await
        .unwrap();
    assert_eq!(count(&graph, AssetType::Png), 2);

    let mut graph = Pipeline::new()
        .stage(PostProcessCssImages::new())
        .run(graph)
        .await
        .unwrap();

    assert_eq!(count(&graph, AssetType::Png), 3);
    assert_eq!(count(&graph, AssetType::Css), 1);

    let images = graph.find_relations(&RelationQuery::of_type(RelationType::CssImage));
    assert_eq!(images.len(), 3);
    assert_eq!(images[0].css_rule(), images[1].css_rule());
    assert_ne!(images[1].css_rule(), images[2].css_rule());

    let original = graph.asset(images[0].to).unwrap().raw_src().unwrap();
    let derived = graph.asset(images[1].to).unwrap().raw_src().unwrap();
    assert_eq!(original[..4], PNG_MAGIC);
    assert_eq!(derived[..4], PNG_MAGIC);
    assert!(derived.len() < original.len());
    assert!(graph.asset(images[1].to).unwrap().url.file_name().starts_with("gradient."));
    assert!(graph.check_closure().is_ok());

    let css = graph.find_asset_ids(&AssetQuery::of_type(AssetType::Css))[0];
    let text = graph.text(css).unwrap();
    assert!(!text.contains("-asset-image-postprocess"));
    assert!(text.contains("noise.png"));
    let header = text.split(".footer").next().unwrap();
    assert_eq!(header.matches("background-image").count(), 2);
}

#[tokio::test]
async fn test_post_process_keeps_directive_when_configured() {
    let dir = css_site();
    let mut config = GraphConfig::default();
    config.images.keep_directive = true;
    let graph = graph_for(&dir).with_config(config);

    let mut graph = Pipeline::new()
        .stage(LoadAssets::new(["style.css"]))
        .stage(PopulateStage::new())
        .stage(PostProcessCssImages::new())
        .run(graph)
        .await
        .unwrap();

    let css = graph.find_asset_ids(&AssetQuery::of_type(AssetType::Css))[0];
    assert!(graph.text(css).unwrap().contains("-asset-image-postprocess"));
}

#[tokio::test]
async fn test_post_process_rerun_adds_nothing() {
    let dir = css_site();
    let mut config = GraphConfig::default();
    config.images.keep_directive = true;
    let graph = graph_for(&dir).with_config(config);

    let mut graph = Pipeline::new()
        .stage(LoadAssets::new(["style.css"]))
        .stage(PopulateStage::new())
        .stage(PostProcessCssImages::new())
        .stage(PostProcessCssImages::new())
        .run(graph)
        .await
        .unwrap();

    assert_eq!(count(&graph, AssetType::Png), 3);
    assert_eq!(graph.find_relations(&RelationQuery::of_type(RelationType::CssImage)).len(), 3);

    let css = graph.find_asset_ids(&AssetQuery::of_type(AssetType::Css))[0];
    let text = graph.text(css).unwrap();
    let header = text.split(".footer").next().unwrap();
    assert_eq!(header.matches("background-image").count(), 2);
}

#[tokio::test]
async fn test_post_process_nested_rule() {
    let mut graph = memory_graph(&[
        (
            "style.css",
            b".a { color: red; &:hover { background-image: url(a.png); -asset-image-postprocess: quantize(2); } }"
                .to_vec(),
        ),
        ("a.png", gradient_png(32, 32)),
    ]);
    graph.load_assets(&["style.css"]).await.unwrap();
    graph.populate(&Default::default()).await.unwrap();

    let mut graph = Pipeline::new()
        .stage(PostProcessCssImages::new())
        .run(graph)
        .await
        .unwrap();

    let images = graph.find_relations(&RelationQuery::of_type(RelationType::CssImage));
    assert_eq!(images.len(), 2);
    assert_eq!(images[0].css_rule(), images[1].css_rule());
    let css = graph.asset_by_url(&site_url("style.css")).unwrap();
    assert!(!graph.text(css).unwrap().contains("-asset-image-postprocess"));
}

#[tokio::test]
async fn test_post_process_rejects_unknown_operation() {
    let mut graph = memory_graph(&[
        (
            "style.css",
            b".a { background-image: url(a.png); -asset-image-postprocess: sharpen(2); }".to_vec(),
        ),
        ("a.png", gradient_png(8, 8)),
    ]);
    graph.load_assets(&["style.css"]).await.unwrap();

    let err = Pipeline::new()
        .stage(PostProcessCssImages::new())
        .run(graph)
        .await
        .unwrap_err();
    assert_eq!(err.stage, "postProcessCssImages");
    assert_eq!(err.source.kind(), "transform");
    assert!(err.source.to_string().contains("sharpen"));
}

// =============================================================================
// runJavaScriptConditionalBlocks
// =============================================================================

#[tokio::test]
async fn test_conditional_blocks_write_markup() {
    let dir = html_site();
    let graph = Pipeline::new()
        .stage(LoadAssets::new(["index.html"]))
        .stage(PopulateStage::new())
        .run(graph_for(&dir))
        .await
        .unwrap();
    assert_eq!(count(&graph, AssetType::JavaScript), 1);

    let stage = RunJavaScriptConditionalBlocks::new(AssetQuery::of_type(AssetType::Html), "theEnvironment");
    let mut graph = Pipeline::new().stage(stage).run(graph).await.unwrap();

    let html = graph.find_asset_ids(&AssetQuery::of_type(AssetType::Html))[0];
    let doc = graph
        .asset(html)
        .and_then(|a| a.parse_tree())
        .and_then(ParseTree::as_html)
        .unwrap();
    let divs = doc.get_elements_by_tag_name("div");
    assert_eq!(divs.len(), 1);
    assert_eq!(divs[0].text_content(), "Howdy");

    // The script stays and is still the page's only JavaScript.
    assert_eq!(count(&graph, AssetType::JavaScript), 1);
    let out = String::from_utf8(graph.serialize(html).unwrap()).unwrap();
    assert!(out.contains("<div>Howdy</div>"));
    assert!(out.contains("theEnvironment"));
}

#[tokio::test]
async fn test_conditional_blocks_rerun_writes_once() {
    let dir = html_site();
    let mut graph = Pipeline::new()
        .stage(LoadAssets::new(["index.html"]))
        .stage(PopulateStage::new())
        .stage(RunJavaScriptConditionalBlocks::new(AssetQuery::All, "theEnvironment"))
        .stage(RunJavaScriptConditionalBlocks::new(AssetQuery::All, "theEnvironment"))
        .run(graph_for(&dir))
        .await
        .unwrap();

    let html = graph.find_asset_ids(&AssetQuery::of_type(AssetType::Html))[0];
    let doc = graph
        .asset(html)
        .and_then(|a| a.parse_tree())
        .and_then(ParseTree::as_html)
        .unwrap();
    assert_eq!(doc.get_elements_by_tag_name("div").len(), 1);
    let out = String::from_utf8(graph.serialize(html).unwrap()).unwrap();
    assert!(out.contains("data-conditional-ran=\"theEnvironment\""));
}

#[tokio::test]
async fn test_conditional_blocks_other_environment() {
    let dir = html_site();
    let graph = Pipeline::new()
        .stage(LoadAssets::new(["index.html"]))
        .stage(PopulateStage::new())
        .stage(RunJavaScriptConditionalBlocks::new(AssetQuery::All, "production"))
        .run(graph_for(&dir))
        .await
        .unwrap();

    let html = graph.find_asset_ids(&AssetQuery::of_type(AssetType::Html))[0];
    let doc = graph
        .asset(html)
        .and_then(|a| a.parse_tree())
        .and_then(ParseTree::as_html)
        .unwrap();
    assert!(doc.get_elements_by_tag_name("div").is_empty());
}

// =============================================================================
// Pipeline
// =============================================================================

#[tokio::test]
async fn test_failing_stage_returns_previous_graph() {
    let dir = css_site();
    let err = Pipeline::new()
        .stage(LoadAssets::new(["style.css"]))
        .stage(PopulateStage::new())
        .stage(Wreck)
        .stage(PostProcessCssImages::new())
        .run(graph_for(&dir))
        .await
        .unwrap_err();

    assert_eq!(err.index, 2);
    assert_eq!(err.stage, "wreck");
    assert!(matches!(err.source, AssetError::Transform(_)));

    let graph = err.into_graph();
    assert_eq!(graph.asset_count(), 3);
    assert_eq!(graph.state(), GraphState::Populated);
    assert_eq!(count(&graph, AssetType::Png), 2);
}

#[tokio::test]
async fn test_cancel_between_stages() {
    let dir = css_site();
    let cancel = CancelFlag::new();
    let err = Pipeline::new()
        .stage(LoadAssets::new(["style.css"]))
        .stage(PopulateStage::new())
        .stage(CancelNow(cancel.clone()))
        .stage(PostProcessCssImages::new())
        .with_cancel(cancel)
        .run(graph_for(&dir))
        .await
        .unwrap_err();

    assert_eq!(err.index, 3);
    assert_eq!(err.stage, "postProcessCssImages");
    assert!(matches!(err.source, AssetError::Cancelled(_)));

    let graph = err.into_graph();
    assert_eq!(graph.state(), GraphState::Populated);
    assert_eq!(count(&graph, AssetType::Png), 2);
}

#[tokio::test]
async fn test_cancelled_graph_stops_stage() {
    let dir = css_site();
    let cancel = CancelFlag::new();
    let mut graph = Pipeline::new()
        .stage(LoadAssets::new(["style.css"]))
        .stage(PopulateStage::new())
        .run(graph_for(&dir).with_cancel(cancel.clone()))
        .await
        .unwrap();

    cancel.cancel();
    let err = PostProcessCssImages::new().apply(&mut graph).await.unwrap_err();
    assert_eq!(err.kind(), "cancelled");
    assert_eq!(count(&graph, AssetType::Png), 2);
}

#[tokio::test]
async fn test_population_failure_stops_pipeline() {
    let graph = memory_graph(&[("style.css", b".a { background: url(missing.png); }".to_vec())]);
    let err = Pipeline::new()
        .stage(LoadAssets::new(["style.css"]))
        .stage(PopulateStage::new())
        .stage(Wreck)
        .run(graph)
        .await
        .unwrap_err();

    assert_eq!(err.stage, "populate");
    assert_eq!(err.source.kind(), "resolution");
    assert_eq!(err.into_graph().state(), GraphState::Loading);
}

#[tokio::test]
async fn test_pipeline_from_config_file() {
    let dir = css_site();
    let config_path = dir.path().join(crate::config::CONFIG_FILE);
    fs::write(
        &config_path,
        r#"
[populate]
concurrency = 2

[[pipeline]]
transform = "loadAssets"
urls = ["style.css"]

[[pipeline]]
transform = "populate"
follow = ["CssImage"]

[[pipeline]]
transform = "postProcessCssImages"
query = { type = "Css" }
"#,
    )
    .unwrap();

    let config = GraphConfig::from_path(&config_path).unwrap();
    config.validate().unwrap();
    let pipeline = Pipeline::from_config(&config, &TransformRegistry::standard()).unwrap();
    assert_eq!(pipeline.names(), ["loadAssets", "populate", "postProcessCssImages"]);

    let graph = AssetGraph::from_config(config).unwrap();
    let graph = pipeline.run(graph).await.unwrap();
    assert_eq!(count(&graph, AssetType::Png), 3);
}

#[test]
fn test_pipeline_from_config_unknown_transform() {
    let config = GraphConfig::from_str("[[pipeline]]\ntransform = \"inlineEverything\"").unwrap();
    let err = Pipeline::from_config(&config, &TransformRegistry::standard())
        .err()
        .unwrap();
    assert!(matches!(err, ConfigError::UnknownTransform(name) if name == "inlineEverything"));
}

#[test]
fn test_pipeline_from_config_bad_query() {
    let config = GraphConfig::from_str(
        "[[pipeline]]\ntransform = \"minifyAssets\"\nquery = { url_pattern = \"(\" }",
    )
    .unwrap();
    let err = Pipeline::from_config(&config, &TransformRegistry::standard())
        .err()
        .unwrap();
    assert!(matches!(err, ConfigError::Args { .. }));
}

// =============================================================================
// minifyAssets / removeUnreferencedAssets
// =============================================================================

#[tokio::test]
async fn test_minify_keeps_relations() {
    let source = ".a {\n  color: red;\n  background-image: url(a.png);\n}\n";
    let graph = memory_graph(&[("style.css", source.as_bytes().to_vec()), ("a.png", gradient_png(4, 4))]);

    let mut graph = Pipeline::new()
        .stage(LoadAssets::new(["style.css"]))
        .stage(PopulateStage::new())
        .stage(MinifyAssets::default())
        .run(graph)
        .await
        .unwrap();

    let css = graph.asset_by_url(&site_url("style.css")).unwrap();
    let text = graph.text(css).unwrap();
    assert!(text.len() < source.len());
    assert!(!text.contains('\n'));

    let images = graph.find_relations(&RelationQuery::of_type(RelationType::CssImage));
    assert_eq!(images.len(), 1);
    assert_eq!(graph.asset(images[0].to).unwrap().url, site_url("a.png"));
    assert!(graph.check_closure().is_ok());
}

#[tokio::test]
async fn test_populate_font_face() {
    let graph = memory_graph(&[
        (
            "style.css",
            b"@font-face { font-family: Icons; src: url(icons.woff2) format(\"woff2\"); }".to_vec(),
        ),
        ("icons.woff2", b"wOF2\0\x01\0\0 font tables".to_vec()),
    ]);

    let mut graph = Pipeline::new()
        .stage(LoadAssets::new(["style.css"]))
        .stage(PopulateStage::new())
        .run(graph)
        .await
        .unwrap();

    assert_eq!(graph.state(), GraphState::Populated);
    let fonts = graph.find_relations(&RelationQuery::of_type(RelationType::CssFontFaceSrc));
    assert_eq!(fonts.len(), 1);
    let font = graph.asset(fonts[0].to).unwrap();
    assert_eq!(font.asset_type, AssetType::Font);
    assert!(font.is_loaded());

    let font = fonts[0].to;
    assert_eq!(graph.serialize(font).unwrap(), b"wOF2\0\x01\0\0 font tables");
}

#[tokio::test]
async fn test_remove_unreferenced_assets() {
    let mut graph = memory_graph(&[
        ("style.css", b".a { background: url(a.png); }".to_vec()),
        ("a.png", gradient_png(4, 4)),
    ]);
    graph.load_assets(&["style.css"]).await.unwrap();
    graph.populate(&Default::default()).await.unwrap();

    graph
        .add_asset(site_url("orphan.png"), AssetType::Png, gradient_png(2, 2))
        .unwrap();
    graph
        .add_asset(site_url("orphan.css"), AssetType::Css, b".b { background: url(b.png); }".to_vec())
        .unwrap();
    assert_eq!(graph.asset_count(), 5);

    let graph = Pipeline::new()
        .stage(RemoveUnreferencedAssets::default())
        .run(graph)
        .await
        .unwrap();

    let mut names: Vec<String> = graph.assets().map(|a| a.url.file_name()).collect();
    names.sort();
    assert_eq!(names, ["a.png", "style.css"]);
    assert!(graph.check_closure().is_ok());
}
