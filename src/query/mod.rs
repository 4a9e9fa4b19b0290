//! Typed predicates over assets and relations.
//!
//! Queries are closed enums evaluated against graph entities. Results keep
//! graph order, so the same query on an unchanged graph always returns the
//! same sequence.

use regex::Regex;
use serde::Deserialize;

use crate::asset::{Asset, AssetId, AssetType};
use crate::css::RuleId;
use crate::relation::{Relation, RelationType};

/// String matcher used on URLs and hrefs.
#[derive(Debug, Clone)]
pub enum Matcher {
    Exact(String),
    Prefix(String),
    Suffix(String),
    Contains(String),
    Regex(Regex),
}

impl Matcher {
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self::Regex)
    }

    pub fn is_match(&self, s: &str) -> bool {
        match self {
            Self::Exact(v) => s == v,
            Self::Prefix(v) => s.starts_with(v.as_str()),
            Self::Suffix(v) => s.ends_with(v.as_str()),
            Self::Contains(v) => s.contains(v.as_str()),
            Self::Regex(re) => re.is_match(s),
        }
    }
}

/// Resolves asset ids while evaluating relation queries.
pub trait AssetLookup {
    fn lookup_asset(&self, id: AssetId) -> Option<&Asset>;
}

/// Predicate over assets.
#[derive(Debug, Clone, Default)]
pub enum AssetQuery {
    #[default]
    All,
    Type(AssetType),
    /// Matches the absolute URL string.
    Url(Matcher),
    Inline(bool),
    Loaded(bool),
    Id(AssetId),
    And(Vec<AssetQuery>),
    Or(Vec<AssetQuery>),
    Not(Box<AssetQuery>),
}

impl AssetQuery {
    pub fn of_type(asset_type: AssetType) -> Self {
        Self::Type(asset_type)
    }

    pub fn url_ends_with(suffix: impl Into<String>) -> Self {
        Self::Url(Matcher::Suffix(suffix.into()))
    }

    pub fn and(self, other: Self) -> Self {
        match self {
            Self::All => other,
            Self::And(mut parts) => {
                parts.push(other);
                Self::And(parts)
            }
            first => Self::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Self) -> Self {
        match self {
            Self::Or(mut parts) => {
                parts.push(other);
                Self::Or(parts)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    pub fn matches(&self, asset: &Asset) -> bool {
        match self {
            Self::All => true,
            Self::Type(t) => asset.asset_type == *t,
            Self::Url(m) => m.is_match(asset.url.as_str()),
            Self::Inline(v) => asset.is_inline == *v,
            Self::Loaded(v) => asset.is_loaded() == *v,
            Self::Id(id) => asset.id == *id,
            Self::And(parts) => parts.iter().all(|q| q.matches(asset)),
            Self::Or(parts) => parts.iter().any(|q| q.matches(asset)),
            Self::Not(inner) => !inner.matches(asset),
        }
    }
}

/// Predicate over relations.
#[derive(Debug, Clone, Default)]
pub enum RelationQuery {
    #[default]
    All,
    Type(RelationType),
    From(AssetQuery),
    To(AssetQuery),
    Href(Matcher),
    Inline(bool),
    /// Relations located inside the given CSS rule.
    InRule(RuleId),
    And(Vec<RelationQuery>),
    Or(Vec<RelationQuery>),
    Not(Box<RelationQuery>),
}

impl RelationQuery {
    pub fn of_type(relation_type: RelationType) -> Self {
        Self::Type(relation_type)
    }

    pub fn and(self, other: Self) -> Self {
        match self {
            Self::All => other,
            Self::And(mut parts) => {
                parts.push(other);
                Self::And(parts)
            }
            first => Self::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Self) -> Self {
        match self {
            Self::Or(mut parts) => {
                parts.push(other);
                Self::Or(parts)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    pub fn matches(&self, rel: &Relation, assets: &dyn AssetLookup) -> bool {
        match self {
            Self::All => true,
            Self::Type(t) => rel.relation_type == *t,
            Self::From(q) => assets.lookup_asset(rel.from).is_some_and(|a| q.matches(a)),
            Self::To(q) => assets.lookup_asset(rel.to).is_some_and(|a| q.matches(a)),
            Self::Href(m) => rel.href.as_deref().is_some_and(|h| m.is_match(h)),
            Self::Inline(v) => rel.is_inline() == *v,
            Self::InRule(rule) => rel.css_rule() == Some(*rule),
            Self::And(parts) => parts.iter().all(|q| q.matches(rel, assets)),
            Self::Or(parts) => parts.iter().any(|q| q.matches(rel, assets)),
            Self::Not(inner) => !inner.matches(rel, assets),
        }
    }
}

/// Asset query as written in configuration files.
///
/// ```toml
/// query = { type = "Html", url = "index.html" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuerySpec {
    #[serde(rename = "type")]
    pub asset_type: Option<AssetType>,
    /// Suffix of the asset URL.
    pub url: Option<String>,
    /// Regular expression over the asset URL.
    pub url_pattern: Option<String>,
    pub inline: Option<bool>,
    pub loaded: Option<bool>,
}

impl QuerySpec {
    /// Build the query; an empty spec matches all assets.
    pub fn to_query(&self) -> Result<AssetQuery, regex::Error> {
        let mut query = AssetQuery::All;
        if let Some(t) = self.asset_type {
            query = query.and(AssetQuery::Type(t));
        }
        if let Some(url) = &self.url {
            query = query.and(AssetQuery::url_ends_with(url.as_str()));
        }
        if let Some(pattern) = &self.url_pattern {
            query = query.and(AssetQuery::Url(Matcher::regex(pattern)?));
        }
        if let Some(inline) = self.inline {
            query = query.and(AssetQuery::Inline(inline));
        }
        if let Some(loaded) = self.loaded {
            query = query.and(AssetQuery::Loaded(loaded));
        }
        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AssetUrl;
    use crate::css::DeclarationId;
    use crate::relation::{Locator, RelationId};

    fn asset(id: u32, url: &str, asset_type: AssetType) -> Asset {
        let mut a = Asset::unloaded(AssetId(id), AssetUrl::parse(url).unwrap(), asset_type);
        a.is_inline = url.contains("inline");
        a
    }

    struct Assets(Vec<Asset>);

    impl AssetLookup for Assets {
        fn lookup_asset(&self, id: AssetId) -> Option<&Asset> {
            self.0.iter().find(|a| a.id == id)
        }
    }

    #[test]
    fn test_asset_query_combinators() {
        let css = asset(0, "file:///site/style.css", AssetType::Css);
        let png = asset(1, "file:///site/img/a.png", AssetType::Png);

        let q = AssetQuery::of_type(AssetType::Png).and(AssetQuery::url_ends_with("a.png"));
        assert!(q.matches(&png));
        assert!(!q.matches(&css));

        let q = AssetQuery::of_type(AssetType::Css).or(AssetQuery::Url(Matcher::Contains("/img/".into())));
        assert!(q.matches(&png) && q.matches(&css));

        assert!(!AssetQuery::of_type(AssetType::Css).not().matches(&css));
        assert!(AssetQuery::All.matches(&css));
        assert!(AssetQuery::Loaded(false).matches(&css));
    }

    #[test]
    fn test_relation_query() {
        let assets = Assets(vec![
            asset(0, "file:///site/style.css", AssetType::Css),
            asset(1, "file:///site/a.png", AssetType::Png),
        ]);
        let rel = Relation {
            id: RelationId(0),
            from: AssetId(0),
            to: AssetId(1),
            relation_type: RelationType::CssImage,
            href: Some("a.png".into()),
            locator: Locator::CssUrl {
                rule: RuleId(2),
                declaration: DeclarationId(0),
                index: 0,
            },
        };

        let q = RelationQuery::of_type(RelationType::CssImage)
            .and(RelationQuery::From(AssetQuery::of_type(AssetType::Css)))
            .and(RelationQuery::InRule(RuleId(2)));
        assert!(q.matches(&rel, &assets));
        assert!(!RelationQuery::InRule(RuleId(3)).matches(&rel, &assets));
        assert!(RelationQuery::Href(Matcher::Exact("a.png".into())).matches(&rel, &assets));
        assert!(!RelationQuery::To(AssetQuery::of_type(AssetType::Css)).matches(&rel, &assets));
    }

    #[test]
    fn test_query_spec_from_toml() {
        let spec: QuerySpec = toml::from_str("type = \"Html\"\nurl = \"index.html\"").unwrap();
        let q = spec.to_query().unwrap();

        assert!(q.matches(&asset(0, "file:///site/index.html", AssetType::Html)));
        assert!(!q.matches(&asset(1, "file:///site/about.html", AssetType::Html)));
        assert!(matches!(QuerySpec::default().to_query().unwrap(), AssetQuery::All));

        let bad = QuerySpec {
            url_pattern: Some("(".into()),
            ..QuerySpec::default()
        };
        assert!(bad.to_query().is_err());
    }
}
