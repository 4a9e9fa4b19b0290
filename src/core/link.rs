//! Href classification utilities.

/// Syntactic classification of an href found inside an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind<'a> {
    /// Link with a URL scheme (https://, mailto:, etc.), never fetched.
    External(&'a str),
    /// Protocol-relative link (//cdn.example.com/x.js), never fetched.
    ProtocolRelative(&'a str),
    /// `data:` URI. Value is everything after `data:`.
    Data(&'a str),
    /// Pure fragment/anchor link (#section). Value is anchor without `#`.
    Fragment(&'a str),
    /// Root-relative path (/images/logo.png), resolved against the graph root.
    RootRelative(&'a str),
    /// Relative path (./image.png, ../other.css, image.png).
    Relative(&'a str),
}

impl<'a> LinkKind<'a> {
    /// Parse an href into its syntactic kind.
    #[inline]
    pub fn parse(href: &'a str) -> Self {
        let href = href.trim();
        if let Some(payload) = strip_prefix_ignore_case(href, "data:") {
            Self::Data(payload)
        } else if href.starts_with("//") {
            Self::ProtocolRelative(href)
        } else if has_scheme(href) {
            Self::External(href)
        } else if let Some(anchor) = href.strip_prefix('#') {
            Self::Fragment(anchor)
        } else if href.starts_with('/') {
            Self::RootRelative(href)
        } else {
            Self::Relative(href)
        }
    }

    /// Whether this href points at something the loader can fetch.
    #[inline]
    pub const fn is_local(&self) -> bool {
        matches!(self, Self::RootRelative(_) | Self::Relative(_))
    }
}

/// Check for a leading `scheme:` (RFC 3986 scheme characters).
fn has_scheme(link: &str) -> bool {
    link.find(':').is_some_and(|pos| {
        pos > 1
            && link[..pos]
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

/// Split an href into the path part and the query/fragment suffix.
///
/// `img.png?v=2#x` → (`img.png`, `?v=2#x`)
#[inline]
pub fn split_suffix(href: &str) -> (&str, &str) {
    match href.find(['?', '#']) {
        Some(pos) => href.split_at(pos),
        None => (href, ""),
    }
}
