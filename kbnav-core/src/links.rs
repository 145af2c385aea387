// Hyperlink classification and anchor extraction

use scraper::{Html, Selector};
use std::fmt;

pub const DEFAULT_DOCUMENT_EXTENSION: &str = ".md";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnsupportedReason {
    /// Link to a directory; directory listings are not navigable.
    Directory,
    /// Pure in-page anchor (`#section`).
    Anchor,
    /// A scheme other than http(s), e.g. `ftp://`.
    OtherScheme,
    /// Nothing left after stripping the leading `/`.
    Empty,
}

impl fmt::Display for UnsupportedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnsupportedReason::Directory => "directory",
            UnsupportedReason::Anchor => "anchor",
            UnsupportedReason::OtherScheme => "scheme",
            UnsupportedReason::Empty => "empty",
        };
        f.write_str(s)
    }
}

/// Outcome of classifying a raw href. Resolution never performs I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedAction {
    External { url: String },
    Navigate { path: String },
    Unsupported { reason: UnsupportedReason },
}

/// Classifies hrefs found in rendered documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkResolver {
    extension: String,
}

impl Default for LinkResolver {
    fn default() -> Self {
        Self::new(DEFAULT_DOCUMENT_EXTENSION)
    }
}

impl LinkResolver {
    pub fn new(extension: impl Into<String>) -> Self {
        let mut extension = extension.into();
        if !extension.is_empty() && !extension.starts_with('.') {
            extension.insert(0, '.');
        }
        Self { extension }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// True when `path` names a navigable document.
    pub fn is_document(&self, path: &str) -> bool {
        path.ends_with(&self.extension)
    }

    /// Classify `href`; first matching rule wins.
    ///
    /// * `http://` / `https://` is external.
    /// * A leading `/`, or no scheme separator and not a bare `#anchor`, is an
    ///   internal reference. One leading `/` is stripped, a trailing `/`
    ///   means a directory, and the document extension is appended unless
    ///   already present.
    /// * Everything else is unsupported.
    pub fn resolve(&self, href: &str) -> ResolvedAction {
        if href.starts_with("http://") || href.starts_with("https://") {
            return ResolvedAction::External {
                url: href.to_string(),
            };
        }

        let internal = href.starts_with('/') || (!href.contains("://") && !href.starts_with('#'));
        if !internal {
            let reason = if href.starts_with('#') {
                UnsupportedReason::Anchor
            } else {
                UnsupportedReason::OtherScheme
            };
            return ResolvedAction::Unsupported { reason };
        }

        let path = href.strip_prefix('/').unwrap_or(href);
        if path.ends_with('/') {
            return ResolvedAction::Unsupported {
                reason: UnsupportedReason::Directory,
            };
        }
        if path.is_empty() {
            return ResolvedAction::Unsupported {
                reason: UnsupportedReason::Empty,
            };
        }

        let path = if self.is_document(path) {
            path.to_string()
        } else {
            format!("{}{}", path, self.extension)
        };
        ResolvedAction::Navigate { path }
    }
}

/// An anchor found in rendered HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRef {
    pub href: String,
    pub text: String,
}

/// Every `a[href]` in document order, with its visible text collapsed.
pub fn extract_links(html: &str) -> Vec<LinkRef> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let document = Html::parse_fragment(html);

    document
        .select(&selector)
        .filter_map(|element| {
            let href = element.value().attr("href")?;
            let text = element
                .text()
                .collect::<Vec<_>>()
                .join("")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            Some(LinkRef {
                href: href.to_string(),
                text,
            })
        })
        .collect()
}
