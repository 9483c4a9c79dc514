//! Fetch requests

use crate::{Location, ACCEPT_HTML, FRAME_HEADER, REQUEST_ID_HEADER};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    /// Lenient parse of a form `method` attribute; unknown values fall back
    /// to GET like browsers do
    pub fn from_attribute(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("post") => Method::Post,
            Some("put") => Method::Put,
            Some("patch") => Method::Patch,
            Some("delete") => Method::Delete,
            _ => Method::Get,
        }
    }

    /// GET requests do not mutate server state
    pub fn is_safe(&self) -> bool {
        matches!(self, Method::Get)
    }
}

/// Generates per-request correlation ids
#[derive(Debug)]
pub struct RequestIdGenerator {
    seed: u64,
    counter: AtomicU64,
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        Self { seed, counter: AtomicU64::new(1) }
    }

    pub fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{:x}-{n}", self.seed)
    }
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// A request issued by a visit, form submission, frame or prefetch
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub location: Location,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl FetchRequest {
    /// A request with the default navigation headers
    pub fn new(method: Method, location: Location) -> Self {
        Self {
            method,
            location,
            headers: vec![("Accept".to_string(), ACCEPT_HTML.to_string())],
            body: None,
        }
    }

    pub fn get(location: Location) -> Self {
        Self::new(Method::Get, location)
    }

    pub fn post(location: Location) -> Self {
        Self::new(Method::Post, location)
    }

    /// Set a header, replacing any existing value (names compare
    /// case-insensitively)
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach urlencoded form data. Safe requests carry it in the query
    /// string, everything else in the body.
    pub fn with_form_data(mut self, pairs: &[(String, String)]) -> Self {
        if self.method.is_safe() {
            self.location = self
                .location
                .with_query_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            return self;
        }
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        self.with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_body(encoded.into_bytes())
    }

    pub fn with_request_id(self, id: &str) -> Self {
        self.with_header(REQUEST_ID_HEADER, id)
    }

    pub fn request_id(&self) -> Option<&str> {
        self.header(REQUEST_ID_HEADER)
    }

    /// Scope the request to a frame
    pub fn with_frame(self, frame_id: &str) -> Self {
        self.with_header(FRAME_HEADER, frame_id)
    }

    pub fn frame(&self) -> Option<&str> {
        self.header(FRAME_HEADER)
    }

    /// Add a media type to the Accept header
    pub fn accept(mut self, mime: &str) -> Self {
        let current = self.header("Accept").unwrap_or("").to_string();
        if !current.split(',').any(|m| m.trim() == mime) {
            let value = if current.is_empty() { mime.to_string() } else { format!("{mime}, {current}") };
            self.set_header("Accept", &value);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::STREAM_MIME_TYPE;

    fn loc(s: &str) -> Location {
        Location::parse(s).unwrap()
    }

    #[test]
    fn test_request_builder() {
        let req = FetchRequest::get(loc("https://example.com"))
            .with_header("X-Custom", "1")
            .with_header("x-custom", "2");
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.header("X-CUSTOM"), Some("2"));
        assert_eq!(req.header("Accept"), Some(ACCEPT_HTML));
    }

    #[test]
    fn test_get_form_data_goes_to_query() {
        let pairs = vec![("q".to_string(), "a b".to_string())];
        let req = FetchRequest::get(loc("https://example.com/search?x=1")).with_form_data(&pairs);
        assert_eq!(req.location.href(), "https://example.com/search?q=a+b");
        assert!(req.body.is_none());
    }

    #[test]
    fn test_post_form_data_goes_to_body() {
        let pairs = vec![("name".to_string(), "Ann & Bo".to_string())];
        let req = FetchRequest::post(loc("https://example.com/people")).with_form_data(&pairs);
        assert_eq!(req.body.as_deref(), Some(&b"name=Ann+%26+Bo"[..]));
        assert_eq!(req.header("content-type"), Some("application/x-www-form-urlencoded"));
    }

    #[test]
    fn test_accept_prepends_once() {
        let req = FetchRequest::post(loc("https://example.com"))
            .accept(STREAM_MIME_TYPE)
            .accept(STREAM_MIME_TYPE);
        assert_eq!(req.header("Accept"), Some("text/vnd.veer-stream.html, text/html, application/xhtml+xml"));
    }

    #[test]
    fn test_method_from_attribute() {
        assert_eq!(Method::from_attribute(Some("POST")), Method::Post);
        assert_eq!(Method::from_attribute(Some("dialog")), Method::Get);
        assert_eq!(Method::from_attribute(None), Method::Get);
        assert!(Method::Get.is_safe());
        assert!(!Method::Delete.is_safe());
    }

    #[test]
    fn test_request_ids_are_unique() {
        let ids = RequestIdGenerator::new();
        assert_ne!(ids.next_id(), ids.next_id());
    }
}
