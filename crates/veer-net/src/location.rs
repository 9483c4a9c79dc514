//! Locations
//!
//! An absolute URL plus an optional anchor. Two locations point at the same
//! page when everything before the `#` matches.

use std::fmt;
use std::str::FromStr;
use url::Url;

/// URL error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    #[error("cannot parse {input:?}: {source}")]
    Parse {
        input: String,
        #[source]
        source: url::ParseError,
    },
}

/// An absolute navigation target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    url: Url,
}

impl Location {
    /// Parse an absolute URL
    pub fn parse(input: &str) -> Result<Self, LocationError> {
        Url::parse(input.trim())
            .map(Self::from_url)
            .map_err(|source| LocationError::Parse { input: input.to_string(), source })
    }

    pub fn from_url(url: Url) -> Self {
        Self { url }
    }

    /// Resolve `href` relative to this location
    pub fn join(&self, href: &str) -> Result<Self, LocationError> {
        self.url
            .join(href.trim())
            .map(Self::from_url)
            .map_err(|source| LocationError::Parse { input: href.to_string(), source })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn href(&self) -> &str {
        self.url.as_str()
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Fragment without the `#`, if non-empty
    pub fn anchor(&self) -> Option<&str> {
        self.url.fragment().filter(|f| !f.is_empty())
    }

    /// The URL minus its anchor; this is what goes over the wire
    pub fn request_url(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        url.to_string()
    }

    /// Cache key for snapshots of this page
    pub fn cache_key(&self) -> String {
        self.request_url()
    }

    pub fn without_anchor(&self) -> Self {
        let mut url = self.url.clone();
        url.set_fragment(None);
        Self { url }
    }

    pub fn with_anchor(&self, anchor: Option<&str>) -> Self {
        let mut url = self.url.clone();
        url.set_fragment(anchor);
        Self { url }
    }

    /// Replace the query string with urlencoded `pairs`
    pub fn with_query_pairs<'a>(&self, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut url = self.url.clone();
        url.set_query(None);
        {
            let mut query = url.query_pairs_mut();
            query.extend_pairs(pairs);
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        Self { url }
    }

    /// Same request URL, ignoring anchors
    pub fn is_same_page(&self, other: &Location) -> bool {
        self.request_url() == other.request_url()
    }

    /// Reaching `self` from `from` only moves between anchors of one page:
    /// same request URL, with an anchor on at least one side
    pub fn is_anchor_jump_from(&self, from: &Location) -> bool {
        self.is_same_page(from) && (self.anchor().is_some() || from.anchor().is_some())
    }

    pub fn is_same_origin(&self, other: &Location) -> bool {
        self.url.origin() == other.url.origin()
    }

    /// Same origin and the path lives under `root`'s path
    pub fn is_prefixed_by(&self, root: &Location) -> bool {
        if !self.is_same_origin(root) {
            return false;
        }
        let prefix = root.path();
        let prefix = if prefix.ends_with('/') { prefix.to_string() } else { format!("{prefix}/") };
        self.path() == prefix.trim_end_matches('/') || self.path().starts_with(&prefix)
    }

    /// Extension of the last path segment including the dot, or `""`
    pub fn extension(&self) -> &str {
        let last = self.path().rsplit('/').next().unwrap_or("");
        match last.rfind('.') {
            Some(dot) => &last[dot..],
            None => "",
        }
    }

    /// Paths without an extension or with an HTML-ish one
    pub fn is_html(&self) -> bool {
        matches!(self.extension(), "" | ".htm" | ".html" | ".xhtml" | ".php")
    }

    /// Whether a navigation to this location can be handled in-page
    pub fn is_visitable(&self, root: &Location) -> bool {
        self.is_prefixed_by(root) && self.is_html()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

impl FromStr for Location {
    type Err = LocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(s: &str) -> Location {
        Location::parse(s).unwrap()
    }

    #[test]
    fn test_anchor_and_request_url() {
        let l = loc("https://example.com/a?b=1#top");
        assert_eq!(l.anchor(), Some("top"));
        assert_eq!(l.request_url(), "https://example.com/a?b=1");
        assert_eq!(loc("https://example.com/a#").anchor(), None);
    }

    #[test]
    fn test_same_page() {
        assert!(loc("https://example.com/a#x").is_same_page(&loc("https://example.com/a#y")));
        assert!(!loc("https://example.com/a").is_same_page(&loc("https://example.com/b")));
        assert!(!loc("https://example.com/a?q=1").is_same_page(&loc("https://example.com/a")));
    }

    #[test]
    fn test_anchor_jump() {
        let top = loc("https://example.com/a");
        let section = loc("https://example.com/a#s");
        assert!(section.is_anchor_jump_from(&top));
        assert!(top.is_anchor_jump_from(&section));
        assert!(section.is_anchor_jump_from(&section));
        assert!(!top.is_anchor_jump_from(&top));
        assert!(!loc("https://example.com/b#s").is_anchor_jump_from(&section));
    }

    #[test]
    fn test_join() {
        let base = loc("https://example.com/posts/1");
        assert_eq!(base.join("2").unwrap().href(), "https://example.com/posts/2");
        assert_eq!(base.join("#c").unwrap().href(), "https://example.com/posts/1#c");
        assert_eq!(base.join("/x").unwrap().href(), "https://example.com/x");
    }

    #[test]
    fn test_prefix_and_extension() {
        let root = loc("https://example.com/app");
        assert!(loc("https://example.com/app/users").is_prefixed_by(&root));
        assert!(loc("https://example.com/app").is_prefixed_by(&root));
        assert!(!loc("https://example.com/application").is_prefixed_by(&root));
        assert!(!loc("https://other.com/app/users").is_prefixed_by(&root));

        assert!(loc("https://example.com/a/b").is_html());
        assert!(loc("https://example.com/a/b.html").is_html());
        assert!(!loc("https://example.com/a/b.pdf").is_html());
        assert!(loc("https://example.com/.well-known/x").is_html());
    }

    #[test]
    fn test_query_pairs() {
        let l = loc("https://example.com/search?old=1#a");
        let q = l.with_query_pairs([("q", "rust lang"), ("page", "2")]);
        assert_eq!(q.href(), "https://example.com/search?q=rust+lang&page=2#a");
        let empty = l.with_query_pairs(std::iter::empty());
        assert_eq!(empty.href(), "https://example.com/search#a");
    }
}
