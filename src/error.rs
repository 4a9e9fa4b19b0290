//! Error taxonomy for loading, parsing, resolving and transforming assets.

use std::fmt;

use thiserror::Error;

use crate::asset::AssetType;

/// Result alias used throughout the graph engine.
pub type Result<T, E = AssetError> = std::result::Result<T, E>;

/// Errors raised by the asset graph.
#[derive(Debug, Error)]
pub enum AssetError {
    /// No provider knows how to parse the asset.
    #[error("unsupported asset type for `{url}`{}", hint_suffix(.hint))]
    UnsupportedType { url: String, hint: Option<String> },

    /// A relation target cannot be located or fetched.
    #[error("cannot resolve `{href}` from `{from}`: {reason}")]
    Resolution {
        from: String,
        href: String,
        reason: String,
    },

    /// Malformed asset content.
    #[error("{asset_type} parse error in `{url}`: {message}")]
    Parse {
        url: String,
        asset_type: AssetType,
        message: String,
    },

    /// A transform failed or found the graph in an unexpected shape.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// An asset or relation id that is not (or no longer) in the graph.
    #[error("no {0} in graph")]
    Missing(String),

    /// Population or a transform was cancelled.
    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("IO error when reading `{0}`")]
    Io(String, #[source] std::io::Error),
}

fn hint_suffix(hint: &Option<String>) -> String {
    hint.as_ref().map(|h| format!(" ({h})")).unwrap_or_default()
}

impl AssetError {
    pub fn unsupported(url: impl fmt::Display) -> Self {
        Self::UnsupportedType {
            url: url.to_string(),
            hint: None,
        }
    }

    pub fn parse(url: impl fmt::Display, asset_type: AssetType, message: impl Into<String>) -> Self {
        Self::Parse {
            url: url.to_string(),
            asset_type,
            message: message.into(),
        }
    }

    pub fn resolution(
        from: impl fmt::Display,
        href: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Resolution {
            from: from.to_string(),
            href: href.into(),
            reason: reason.into(),
        }
    }

    /// Short category name, used in log prefixes and warnings.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedType { .. } => "unsupported",
            Self::Resolution { .. } => "resolution",
            Self::Parse { .. } => "parse",
            Self::Transform(_) => "transform",
            Self::Missing(_) => "missing",
            Self::Cancelled(_) => "cancelled",
            Self::Io(..) => "io",
        }
    }

    /// Whether this error may be downgraded to a warning for optional assets.
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedType { .. } | Self::Resolution { .. } | Self::Parse { .. } | Self::Io(..)
        )
    }
}

/// Transform-specific failure, optionally wrapping the error that caused it.
#[derive(Debug, Error)]
#[error("transform `{transform}` failed: {message}")]
pub struct TransformError {
    pub transform: String,
    pub message: String,
    #[source]
    pub source: Option<Box<AssetError>>,
}

impl TransformError {
    pub fn new(transform: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            transform: transform.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an underlying asset error raised while the transform was running.
    pub fn wrap(transform: impl Into<String>, source: AssetError) -> Self {
        Self {
            transform: transform.into(),
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }
}
