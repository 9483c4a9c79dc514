//! Fetch responses

use crate::{Location, STREAM_MIME_TYPE};

/// A completed response
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    /// True when the final location differs from the requested one
    pub redirected: bool,
    /// Final location after redirects
    pub location: Location,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn new(status: u16, location: Location) -> Self {
        Self { status, redirected: false, location, headers: Vec::new(), body: Vec::new() }
    }

    /// A 200 `text/html` response
    pub fn html(location: Location, body: &str) -> Self {
        Self::new(200, location)
            .with_header("Content-Type", "text/html; charset=utf-8")
            .with_body(body.as_bytes().to_vec())
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// 2xx
    pub fn succeeded(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn failed(&self) -> bool {
        !self.succeeded()
    }

    /// 4xx
    pub fn client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// 5xx
    pub fn server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Media type without parameters, lowercased
    pub fn content_type(&self) -> Option<String> {
        self.header("Content-Type")
            .map(|ct| ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
    }

    pub fn is_html(&self) -> bool {
        matches!(self.content_type().as_deref(), Some("text/html" | "application/xhtml+xml"))
    }

    pub fn is_stream(&self) -> bool {
        self.content_type().as_deref() == Some(STREAM_MIME_TYPE)
    }

    /// Body decoded as UTF-8, lossily
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// The body when the response carries HTML
    pub fn html_body(&self) -> Option<String> {
        self.is_html().then(|| self.text())
    }
}
