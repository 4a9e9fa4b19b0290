//! `url()` visitors over lightningcss values.

use std::convert::Infallible;

use lightningcss::dependencies::Location;
use lightningcss::stylesheet::PrinterOptions;
use lightningcss::traits::ToCss;
use lightningcss::values::url::Url;
use lightningcss::visit_types;
use lightningcss::visitor::{VisitTypes, Visitor};

/// Collects every `url()` in visiting order.
#[derive(Debug, Default)]
pub(super) struct CollectUrls(Vec<String>);

impl CollectUrls {
    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

impl<'i> Visitor<'i> for CollectUrls {
    type Error = Infallible;

    fn visit_types(&self) -> VisitTypes {
        visit_types!(URLS)
    }

    fn visit_url(&mut self, url: &mut Url<'i>) -> Result<(), Self::Error> {
        self.0.push(url.url.to_string());
        Ok(())
    }
}

/// Replaces the `target`-th `url()` with `href`.
#[derive(Debug)]
pub(super) struct ReplaceUrl {
    target: usize,
    seen: usize,
    href: String,
    done: bool,
}

impl ReplaceUrl {
    pub fn new(target: usize, href: &str) -> Self {
        Self {
            target,
            seen: 0,
            href: href.to_string(),
            done: false,
        }
    }

    pub fn replaced(&self) -> bool {
        self.done
    }
}

impl<'i> Visitor<'i> for ReplaceUrl {
    type Error = Infallible;

    fn visit_types(&self) -> VisitTypes {
        visit_types!(URLS)
    }

    fn visit_url(&mut self, url: &mut Url<'i>) -> Result<(), Self::Error> {
        if self.seen == self.target {
            url.url = self.href.clone().into();
            self.done = true;
        }
        self.seen += 1;
        Ok(())
    }
}

/// `url(...)` for `href`, quoted and escaped by lightningcss.
pub fn url_value(href: &str) -> String {
    let url = Url {
        url: href.into(),
        loc: Location { line: 1, column: 1 },
    };
    url.to_css_string(PrinterOptions::default())
        .unwrap_or_else(|_| format!("url({href:?})"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_value_quotes() {
        assert_eq!(url_value("a.png"), "url(\"a.png\")");
        assert!(url_value("a b\".png").starts_with("url(\"a b\\\""));
    }
}
