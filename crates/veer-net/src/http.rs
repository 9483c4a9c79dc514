//! HTTP transport over reqwest's blocking client, driven from smol's
//! blocking pool.

use crate::{AbortSignal, FetchFuture, FetchRequest, FetchResponse, Location, Method, NetError, Transport};
use std::time::Duration;

/// Default user agent
pub const DEFAULT_USER_AGENT: &str = concat!("veer/", env!("CARGO_PKG_VERSION"));

/// Real network transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, NetError> {
        Self::with_options(DEFAULT_USER_AGENT, Duration::from_secs(30))
    }

    pub fn with_options(user_agent: &str, timeout: Duration) -> Result<Self, NetError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| NetError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn perform(client: reqwest::blocking::Client, request: FetchRequest) -> Result<FetchResponse, NetError> {
    let requested = request.location.request_url();
    let mut builder = client.request(reqwest_method(request.method), requested.as_str());
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = request.body {
        builder = builder.body(body);
    }

    let response = builder.send().map_err(|e| NetError::Network(e.to_string()))?;
    let status = response.status().as_u16();
    let final_location = Location::from_url(response.url().clone());
    let headers = response
        .headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect();
    let body = response
        .bytes()
        .map_err(|e| NetError::Network(e.to_string()))?
        .to_vec();

    Ok(FetchResponse {
        status,
        redirected: final_location.request_url() != requested,
        location: final_location,
        headers,
        body,
    })
}

impl Transport for HttpTransport {
    fn fetch(&self, request: FetchRequest, signal: AbortSignal) -> FetchFuture<'_> {
        let client = self.client.clone();
        Box::pin(async move {
            signal.check()?;
            tracing::debug!(method = request.method.as_str(), url = %request.location, "fetching");
            let response = smol::unblock(move || perform(client, request)).await?;
            // The blocking call cannot be interrupted; drop its result instead
            signal.check()?;
            Ok(response)
        })
    }
}
