//! Comprehensive tests for veer-html
//!
//! Parsing edge cases and parse/serialize agreement.

use veer_html::{outer_html, parse_document, parse_fragment, HtmlParser};

#[test]
fn test_parse_empty_document_has_skeleton() {
    let doc = HtmlParser::new().parse("");
    assert!(doc.tree().has_tag(doc.head(), "head"));
    assert!(doc.tree().has_tag(doc.body(), "body"));
}

#[test]
fn test_parse_keeps_url() {
    let doc = parse_document("<p>x</p>", "https://example.com/a");
    assert_eq!(doc.url(), "https://example.com/a");
}

#[test]
fn test_parse_malformed_html() {
    let html = "<div><p>Unclosed paragraph<span>Unclosed span</div>";
    let doc = HtmlParser::new().parse(html);
    let div = doc.tree().first_child(doc.body()).unwrap();
    assert_eq!(doc.tree().tag(div), Some("div"));
    assert!(doc.tree().text_content(div).contains("Unclosed span"));
}

#[test]
fn test_head_metadata() {
    let html = r#"
        <html>
            <head>
                <title>Page</title>
                <meta name="veer-visit-control" content="reload">
                <link rel="stylesheet" href="/app.css" data-veer-track="reload">
            </head>
            <body></body>
        </html>
    "#;
    let doc = parse_document(html, "https://example.com/");
    assert_eq!(doc.meta_content("veer-visit-control"), Some("reload"));
    let link = doc.tree().find_first(doc.head(), |e| e.tag == "link").unwrap();
    assert_eq!(
        outer_html(doc.tree(), link),
        "<link rel=\"stylesheet\" href=\"/app.css\" data-veer-track=\"reload\">"
    );
}

#[test]
fn test_fragment_with_multiple_roots() {
    let tree = parse_fragment("<li id=\"a\">1</li><li id=\"b\">2</li>text");
    let root = tree.root();
    assert_eq!(tree.child_ids(root).len(), 3);
    assert_eq!(tree.element_id(tree.first_child(root).unwrap()), Some("a"));
}

#[test]
fn test_fragment_of_head_elements() {
    let tree = parse_fragment("<title>T</title><meta name=\"x\" content=\"y\">");
    let root = tree.root();
    let kids = tree.child_ids(root);
    assert_eq!(tree.tag(kids[0]), Some("title"));
    assert_eq!(tree.tag(kids[1]), Some("meta"));
}

#[test]
fn test_roundtrip_serialization_is_stable() {
    let html = "<div id=\"x\" class=\"a b\"><span>hi &amp; bye</span><input value=\"1\"></div>";
    let tree = parse_fragment(html);
    let root = tree.root();
    let div = tree.first_child(root).unwrap();
    assert_eq!(outer_html(&tree, div), html);
}
