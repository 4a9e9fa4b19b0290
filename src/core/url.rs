//! Asset URL type for identity and href resolution.
//!
//! - Identity: absolute URL with query and fragment stripped
//! - Local assets: `file://` URLs derived from the graph root
//! - Hrefs: resolved relative to the referencing asset (or the root for `/x`)

use std::fmt;
use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use url::Url;

use super::link::{LinkKind, split_suffix};

/// Absolute, normalized asset URL.
///
/// Invariants:
/// - No fragment, no query string
/// - Two hrefs pointing at the same file produce equal `AssetUrl`s
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetUrl(Url);

impl AssetUrl {
    /// Parse an absolute URL string.
    pub fn parse(s: &str) -> Option<Self> {
        Url::parse(s).ok().map(Self::normalized)
    }

    /// Create from an absolute filesystem path.
    pub fn from_file_path(path: &Path) -> Option<Self> {
        Url::from_file_path(path).ok().map(Self::normalized)
    }

    /// Create a directory URL (with trailing slash), used as the graph root.
    pub fn from_directory_path(path: &Path) -> Option<Self> {
        Url::from_directory_path(path).ok().map(Self::normalized)
    }

    fn normalized(mut url: Url) -> Self {
        url.set_fragment(None);
        url.set_query(None);
        Self(url)
    }

    /// Resolve an href found inside the asset at `self`.
    ///
    /// Root-relative hrefs resolve against `root`. Returns `None` for hrefs
    /// that do not point at a fetchable local resource.
    pub fn resolve(&self, root: &AssetUrl, href: &str) -> Option<Self> {
        let (path, _) = split_suffix(href.trim());
        match LinkKind::parse(path) {
            LinkKind::Relative(rel) if !rel.is_empty() => self.0.join(rel).ok().map(Self::normalized),
            LinkKind::RootRelative(abs) => root
                .0
                .join(abs.trim_start_matches('/'))
                .ok()
                .map(Self::normalized),
            _ => None,
        }
    }

    /// Join a plain path relative to this URL.
    pub fn join(&self, rel: &str) -> Option<Self> {
        self.0.join(rel).ok().map(Self::normalized)
    }

    /// Sibling URL with a different file name.
    pub fn with_file_name(&self, name: &str) -> Option<Self> {
        self.join(name)
    }

    /// Shortest href that leads from this asset to `target`.
    pub fn relative_href(&self, target: &AssetUrl) -> String {
        match self.0.make_relative(&target.0) {
            Some(rel) if !rel.is_empty() => rel,
            _ => target.file_name(),
        }
    }

    /// Filesystem path for `file://` URLs.
    pub fn to_file_path(&self) -> Option<PathBuf> {
        if self.0.scheme() != "file" {
            return None;
        }
        self.0.to_file_path().ok()
    }

    /// Whether this URL can be read by a local loader.
    #[inline]
    pub fn is_file(&self) -> bool {
        self.0.scheme() == "file"
    }

    /// Decoded last path segment.
    pub fn file_name(&self) -> String {
        let segment = self
            .0
            .path_segments()
            .and_then(|mut s| s.next_back())
            .unwrap_or_default();
        percent_decode_str(segment)
            .decode_utf8()
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| segment.to_string())
    }

    /// Lowercased file extension, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        let (stem, ext) = name.rsplit_once('.')?;
        (!stem.is_empty() && !ext.is_empty()).then(|| ext.to_ascii_lowercase())
    }

    /// File name without the extension.
    pub fn file_stem(&self) -> String {
        let name = self.file_name();
        match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => name,
        }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Path relative to `root`, for log output.
    pub fn display_relative(&self, root: &AssetUrl) -> String {
        self.as_str()
            .strip_prefix(root.as_str())
            .map(|s| {
                percent_decode_str(s)
                    .decode_utf8()
                    .map(|d| d.into_owned())
                    .unwrap_or_else(|_| s.to_string())
            })
            .unwrap_or_else(|| self.as_str().to_string())
    }
}

impl fmt::Display for AssetUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> AssetUrl {
        AssetUrl::parse("file:///site/").unwrap()
    }

    #[test]
    fn test_resolve_relative() {
        let css = AssetUrl::parse("file:///site/css/style.css").unwrap();
        let img = css.resolve(&root(), "../images/bg.png").unwrap();
        assert_eq!(img.as_str(), "file:///site/images/bg.png");

        let same_dir = css.resolve(&root(), "bg.png?v=3#x").unwrap();
        assert_eq!(same_dir.as_str(), "file:///site/css/bg.png");
    }

    #[test]
    fn test_resolve_root_relative() {
        let css = AssetUrl::parse("file:///site/css/style.css").unwrap();
        let img = css.resolve(&root(), "/images/bg.png").unwrap();
        assert_eq!(img.as_str(), "file:///site/images/bg.png");
    }

    #[test]
    fn test_resolve_skips_non_local() {
        let html = AssetUrl::parse("file:///site/index.html").unwrap();
        assert!(html.resolve(&root(), "https://example.com/x.js").is_none());
        assert!(html.resolve(&root(), "#top").is_none());
        assert!(html.resolve(&root(), "data:image/png;base64,AA").is_none());
        assert!(html.resolve(&root(), "").is_none());
    }

    #[test]
    fn test_identity_strips_query_and_fragment() {
        let a = AssetUrl::parse("file:///site/a.png?x=1").unwrap();
        let b = AssetUrl::parse("file:///site/a.png#y").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_relative_href() {
        let css = AssetUrl::parse("file:///site/css/style.css").unwrap();
        let img = AssetUrl::parse("file:///site/images/bg.png").unwrap();
        assert_eq!(css.relative_href(&img), "../images/bg.png");

        let sibling = AssetUrl::parse("file:///site/css/bg.png").unwrap();
        assert_eq!(css.relative_href(&sibling), "bg.png");
    }

    #[test]
    fn test_file_name_parts() {
        let url = AssetUrl::parse("file:///site/my%20logo.min.png").unwrap();
        assert_eq!(url.file_name(), "my logo.min.png");
        assert_eq!(url.file_stem(), "my logo.min");
        assert_eq!(url.extension().as_deref(), Some("png"));

        let dotfile = AssetUrl::parse("file:///site/.htaccess").unwrap();
        assert_eq!(dotfile.extension(), None);
    }

    #[test]
    fn test_display_relative() {
        let url = AssetUrl::parse("file:///site/css/style.css").unwrap();
        assert_eq!(url.display_relative(&root()), "css/style.css");
    }
}
