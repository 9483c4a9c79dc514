//! Edge case tests for veer-net
//!
//! Locations, request building, response classification and the stub
//! transport.

use veer_net::sse::EventStreamParser;
use veer_net::*;

fn loc(s: &str) -> Location {
    Location::parse(s).unwrap()
}

// ============================================================================
// LOCATION TESTS
// ============================================================================

#[test]
fn test_location_rejects_relative_input() {
    assert!(Location::parse("/relative").is_err());
    assert!(matches!(
        "not a url".parse::<Location>(),
        Err(LocationError::Parse { .. })
    ));
}

#[test]
fn test_location_with_anchor() {
    let l = loc("https://example.com/page");
    assert_eq!(l.with_anchor(Some("s")).href(), "https://example.com/page#s");
    assert_eq!(l.with_anchor(Some("s")).without_anchor(), l);
}

#[test]
fn test_location_visitable_under_root() {
    let root = loc("https://example.com/");
    assert!(loc("https://example.com/posts").is_visitable(&root));
    assert!(!loc("https://example.com/file.zip").is_visitable(&root));
    assert!(!loc("https://cdn.example.com/posts").is_visitable(&root));
}

#[test]
fn test_location_cache_key_ignores_anchor() {
    assert_eq!(
        loc("https://example.com/a#x").cache_key(),
        loc("https://example.com/a").cache_key()
    );
}

// ============================================================================
// REQUEST TESTS
// ============================================================================

#[test]
fn test_request_frame_and_id_headers() {
    let req = FetchRequest::get(loc("https://example.com/"))
        .with_frame("inbox")
        .with_request_id("r-1");
    assert_eq!(req.frame(), Some("inbox"));
    assert_eq!(req.request_id(), Some("r-1"));
    assert_eq!(req.header(FRAME_HEADER), Some("inbox"));
}

#[test]
fn test_request_empty_form_data_clears_query() {
    let req = FetchRequest::get(loc("https://example.com/s?q=old")).with_form_data(&[]);
    assert_eq!(req.location.href(), "https://example.com/s");
}

#[test]
fn test_request_delete_body() {
    let pairs = vec![("id".to_string(), "3".to_string())];
    let req = FetchRequest::new(Method::Delete, loc("https://example.com/x")).with_form_data(&pairs);
    assert_eq!(req.body, Some(b"id=3".to_vec()));
}

// ============================================================================
// RESPONSE TESTS
// ============================================================================

#[test]
fn test_response_content_type_case_insensitive() {
    let r = FetchResponse::new(200, loc("https://example.com/")).with_header("CONTENT-TYPE", "Text/HTML");
    assert!(r.is_html());
    assert_eq!(r.content_type().as_deref(), Some("text/html"));
}

#[test]
fn test_response_without_content_type() {
    let r = FetchResponse::new(200, loc("https://example.com/"));
    assert!(r.content_type().is_none());
    assert!(!r.is_html());
    assert!(!r.is_stream());
}

#[test]
fn test_response_lossy_text() {
    let r = FetchResponse::new(200, loc("https://example.com/")).with_body(vec![b'a', 0xff, b'b']);
    assert_eq!(r.text(), "a\u{fffd}b");
}

// ============================================================================
// STUB TRANSPORT TESTS
// ============================================================================

#[test]
fn test_stub_records_requests_in_order() {
    let stub = StubTransport::new();
    stub.page("https://example.com/a", "a").page("https://example.com/b", "b");
    smol::block_on(async {
        stub.fetch(FetchRequest::get(loc("https://example.com/a")), AbortSignal::new()).await.unwrap();
        stub.fetch(FetchRequest::get(loc("https://example.com/b")), AbortSignal::new()).await.unwrap();
    });
    let urls: Vec<String> = stub.requests().iter().map(|r| r.location.request_url()).collect();
    assert_eq!(urls, vec!["https://example.com/a", "https://example.com/b"]);
}

#[test]
fn test_stub_failure_route() {
    let stub = StubTransport::new();
    stub.fail("https://example.com/down");
    let result = smol::block_on(stub.fetch(FetchRequest::get(loc("https://example.com/down")), AbortSignal::new()));
    assert!(matches!(result, Err(NetError::Network(_))));
}

#[test]
fn test_stub_status_and_headers() {
    let stub = StubTransport::new();
    stub.respond(
        "https://example.com/missing",
        StubResponse::html("<p>gone</p>").status(404).header("X-Trace", "t"),
    );
    let r = smol::block_on(stub.fetch(FetchRequest::get(loc("https://example.com/missing")), AbortSignal::new())).unwrap();
    assert!(r.client_error());
    assert_eq!(r.header("x-trace"), Some("t"));
}

#[test]
fn test_stub_stream_response() {
    let stub = StubTransport::new();
    stub.respond("https://example.com/s", StubResponse::stream("<veer-stream></veer-stream>"));
    let r = smol::block_on(stub.fetch(FetchRequest::post(loc("https://example.com/s")), AbortSignal::new())).unwrap();
    assert!(r.is_stream());
}

// ============================================================================
// SSE TESTS
// ============================================================================

#[test]
fn test_sse_crlf_lines() {
    let mut parser = EventStreamParser::new();
    let events = parser.feed("data: a\r\n\r\n");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].data, "a");
}

#[test]
fn test_sse_empty_event_not_dispatched() {
    let mut parser = EventStreamParser::new();
    assert!(parser.feed("event: ping\n\n").is_empty());
}
