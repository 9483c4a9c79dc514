//! In-memory transport with canned responses

use crate::{AbortSignal, FetchFuture, FetchRequest, FetchResponse, Location, NetError, Transport};
use smol::channel::{Receiver, Sender};
use std::cell::RefCell;
use std::collections::HashMap;

/// A canned reply
#[derive(Debug, Clone)]
pub struct StubResponse {
    pub status: u16,
    pub content_type: String,
    pub body: String,
    pub headers: Vec<(String, String)>,
    /// Respond as if redirected here
    pub redirect_to: Option<String>,
}

impl StubResponse {
    pub fn html(body: &str) -> Self {
        Self::with_type(200, "text/html; charset=utf-8", body)
    }

    pub fn stream(body: &str) -> Self {
        Self::with_type(200, crate::STREAM_MIME_TYPE, body)
    }

    pub fn with_type(status: u16, content_type: &str, body: &str) -> Self {
        Self {
            status,
            content_type: content_type.to_string(),
            body: body.to_string(),
            headers: Vec::new(),
            redirect_to: None,
        }
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

enum Route {
    Respond(StubResponse),
    Fail(String),
}

/// Transport that serves responses from a table keyed by request URL.
/// Unknown URLs fail with a network error. Held URLs wait until released,
/// which lets tests interleave overlapping requests.
#[derive(Default)]
pub struct StubTransport {
    routes: RefCell<HashMap<String, Route>>,
    redirects: RefCell<HashMap<String, String>>,
    gates: RefCell<HashMap<String, (Sender<()>, Receiver<()>)>>,
    requests: RefCell<Vec<FetchRequest>>,
}

fn key(url: &str) -> String {
    Location::parse(url).map(|l| l.request_url()).unwrap_or_else(|_| url.to_string())
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, response: StubResponse) -> &Self {
        self.routes.borrow_mut().insert(key(url), Route::Respond(response));
        self
    }

    /// Shorthand for a 200 HTML response
    pub fn page(&self, url: &str, html: &str) -> &Self {
        self.respond(url, StubResponse::html(html))
    }

    /// Requests to `from` are answered by `to`'s route and marked redirected
    pub fn redirect(&self, from: &str, to: &str) -> &Self {
        self.redirects.borrow_mut().insert(key(from), key(to));
        self
    }

    /// Requests to `url` fail at the network level
    pub fn fail(&self, url: &str) -> &Self {
        self.routes
            .borrow_mut()
            .insert(key(url), Route::Fail(format!("connection refused: {url}")));
        self
    }

    /// Requests to `url` block until [`release`](Self::release)
    pub fn hold(&self, url: &str) -> &Self {
        self.gates.borrow_mut().insert(key(url), smol::channel::unbounded());
        self
    }

    /// Let one held request to `url` proceed
    pub fn release(&self, url: &str) {
        if let Some((tx, _)) = self.gates.borrow_mut().remove(&key(url)) {
            tx.close();
        }
    }

    /// Every request seen so far
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.borrow().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        let k = key(url);
        self.requests
            .borrow()
            .iter()
            .filter(|r| r.location.request_url() == k)
            .count()
    }

    fn lookup(&self, request: &FetchRequest) -> Result<FetchResponse, NetError> {
        let requested = request.location.request_url();
        let redirected_to = self.redirects.borrow().get(&requested).cloned();
        let target = redirected_to.clone().unwrap_or_else(|| requested.clone());

        let routes = self.routes.borrow();
        let stub = match routes.get(&target) {
            Some(Route::Respond(stub)) => stub,
            Some(Route::Fail(message)) => return Err(NetError::Network(message.clone())),
            None => return Err(NetError::Network(format!("no route for {target}"))),
        };

        let final_url = stub.redirect_to.clone().unwrap_or(target);
        let location = Location::parse(&final_url)?;
        let mut response = FetchResponse::new(stub.status, location)
            .with_header("Content-Type", &stub.content_type)
            .with_body(stub.body.as_bytes().to_vec());
        for (name, value) in &stub.headers {
            response = response.with_header(name, value);
        }
        response.redirected = response.location.request_url() != requested;
        Ok(response)
    }
}

impl Transport for StubTransport {
    fn fetch(&self, request: FetchRequest, signal: AbortSignal) -> FetchFuture<'_> {
        Box::pin(async move {
            self.requests.borrow_mut().push(request.clone());
            signal.check()?;
            let gate = self
                .gates
                .borrow()
                .get(&request.location.request_url())
                .map(|(_, rx)| rx.clone());
            if let Some(rx) = gate {
                // Closed on release
                let _ = rx.recv().await;
            }
            smol::future::yield_now().await;
            signal.check()?;
            self.lookup(&request)
        })
    }
}
