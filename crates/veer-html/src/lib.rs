//! veer HTML
//!
//! HTML5 parsing built on html5ever, plus serialization back to markup.

mod parser;
mod serializer;

pub use parser::HtmlParser;
pub use serializer::{HtmlSerializer, inner_html, outer_html};
pub use veer_dom::{Document, DomTree, NodeId};

/// Parse a complete HTML document
pub fn parse_document(html: &str, url: &str) -> Document {
    HtmlParser::new().parse_with_url(html, url)
}

/// Parse an HTML fragment into a tree whose root is a fragment node
pub fn parse_fragment(html: &str) -> DomTree {
    HtmlParser::new().parse_fragment(html)
}
