//! On-disk fixture sites shared by graph and pipeline tests.

use std::fs;

use tempfile::TempDir;

use super::AssetGraph;
use crate::image::fixtures::gradient_png;

/// A stylesheet with two background images; the first rule asks for
/// post-processing.
pub const STYLE_CSS: &str = "\
.header {
  background-image: url(gradient.png);
  -asset-image-postprocess: quantize(4);
}

.footer {
  background-image: url(noise.png);
}
";

/// A page with one inline conditional script.
pub const INDEX_HTML: &str = "\
<!DOCTYPE html>
<html>
<head>
<title>Conditional blocks</title>
</head>
<body>
<script>
if (theEnvironment) {
    document.write('<div>Howdy</div>');
}
</script>
</body>
</html>
";

/// `style.css`, `gradient.png` and `noise.png`.
pub fn css_site() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("style.css"), STYLE_CSS).unwrap();
    fs::write(dir.path().join("gradient.png"), gradient_png(48, 48)).unwrap();
    fs::write(dir.path().join("noise.png"), gradient_png(24, 24)).unwrap();
    dir
}

/// `index.html` with an inline conditional script.
pub fn html_site() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("index.html"), INDEX_HTML).unwrap();
    dir
}

pub fn graph_for(dir: &TempDir) -> AssetGraph {
    AssetGraph::from_dir(dir.path()).unwrap()
}
