//! HTTP transport seam
//!
//! The handshake only needs "send this request, give me status, body,
//! headers and harvested cookies". [`Transport`] is that seam;
//! [`client::ReqwestTransport`] is the production implementation.

pub mod client;
pub mod cookies;
pub mod headers;

#[cfg(test)]
pub mod fake;

use std::future::Future;

pub use client::ReqwestTransport;
pub use cookies::{decode_jar, CookieSet};
pub use headers::parse_header_lines;

/// Errors raised by a transport before a response is available.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// A fully described outgoing request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub body: String,
    pub headers: Vec<(String, String)>,
    pub cookies: CookieSet,
}

impl HttpRequest {
    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: body.into(),
            headers: Vec::new(),
            cookies: CookieSet::default(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: String::new(),
            headers: Vec::new(),
            cookies: CookieSet::default(),
        }
    }

    /// Add a header, replacing any existing one with the same name
    /// (case-insensitive).
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(existing) => existing.1 = value,
            None => self.headers.push((name, value)),
        }
        self
    }

    pub fn content_type(self, content_type: &str) -> Self {
        self.header("Content-Type", content_type)
    }

    pub fn cookies(mut self, cookies: CookieSet) -> Self {
        self.cookies = cookies;
        self
    }

    #[cfg(test)]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// What came back from one request.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    pub headers: Vec<(String, String)>,
    /// Netscape cookie-jar lines for every cookie the response set.
    pub cookie_jar: Vec<String>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Decoded cookies harvested from this response.
    pub fn cookies(&self) -> CookieSet {
        decode_jar(&self.cookie_jar)
    }
}

/// Performs HTTP requests.
///
/// Implementations acquire whatever connection resources they need per call
/// and release them before returning.
pub trait Transport {
    fn perform(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

/// Request template carrying the authenticated session's headers and cookies.
#[derive(Debug, Clone, Default)]
pub struct PreparedRequest {
    pub headers: Vec<(String, String)>,
    pub cookies: CookieSet,
}

impl PreparedRequest {
    pub fn get(&self, url: impl Into<String>) -> HttpRequest {
        self.apply(HttpRequest::get(url))
    }

    pub fn post(&self, url: impl Into<String>, body: impl Into<String>) -> HttpRequest {
        self.apply(HttpRequest::post(url, body))
    }

    fn apply(&self, request: HttpRequest) -> HttpRequest {
        self.headers
            .iter()
            .fold(request, |req, (name, value)| req.header(name.as_str(), value.as_str()))
            .cookies(self.cookies.clone())
    }
}
