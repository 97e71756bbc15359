//! reqwest-backed transport
//!
//! Each call builds its own client and cookie jar, so no connection state or
//! cookies are shared between handshake stages. Redirects are not followed:
//! the sign-in page answers with a 302 that carries the session cookies.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::cookie::Jar;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Url;

use super::cookies::{Cookie, CookieSet};
use super::{HttpRequest, HttpResponse, Method, Transport, TransportError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Production [`Transport`] over reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }

    fn build_client(&self, jar: Arc<Jar>) -> Result<reqwest::Client, TransportError> {
        Ok(reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .cookie_provider(jar)
            .timeout(self.timeout)
            .build()?)
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for ReqwestTransport {
    async fn perform(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = Url::parse(&request.url).map_err(|e| TransportError::InvalidUrl {
            url: request.url.clone(),
            reason: e.to_string(),
        })?;
        let client = self.build_client(request_jar(&request.cookies, &url))?;

        tracing::debug!("{} {}", request.method.as_str(), url);

        let mut builder = match request.method {
            Method::Get => client.get(url),
            Method::Post => client.post(url).body(request.body),
        };

        for (name, value) in &request.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| TransportError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|e| TransportError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            builder = builder.header(header_name, header_value);
        }

        let resp = builder.send().await?;

        let status = resp.status().as_u16();
        let host = resp.url().host_str().unwrap_or_default().to_string();
        let now = SystemTime::now();

        let cookie_jar: Vec<String> = resp
            .cookies()
            .filter_map(|c| harvest(&host, &c, now))
            .map(|c| c.to_jar_line())
            .collect();

        let headers: Vec<(String, String)> = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = resp.text().await?;

        tracing::debug!(
            status,
            cookies = cookie_jar.len(),
            body_len = body.len(),
            "response received"
        );

        Ok(HttpResponse {
            status,
            body,
            headers,
            cookie_jar,
        })
    }
}

/// Load the request's cookies into a jar scoped to this one call.
fn request_jar(cookies: &CookieSet, request_url: &Url) -> Arc<Jar> {
    let jar = Arc::new(Jar::default());
    for cookie in cookies.iter() {
        match origin_url(cookie, request_url) {
            Some(origin) => jar.add_cookie_str(&set_cookie_string(cookie), &origin),
            None => tracing::warn!(
                name = %cookie.name,
                domain = %cookie.domain,
                "skipping cookie with unusable domain"
            ),
        }
    }
    jar
}

fn set_cookie_string(cookie: &Cookie) -> String {
    let mut parts = vec![format!("{}={}", cookie.name, cookie.value)];
    if cookie.domain.starts_with('.') {
        parts.push(format!("Domain={}", cookie.domain));
    }
    if cookie.path.starts_with('/') {
        parts.push(format!("Path={}", cookie.path));
    }
    if cookie.secure {
        parts.push("Secure".to_string());
    }
    parts.join("; ")
}

/// Origin the cookie is stored under. Cookies without a domain belong to the
/// request's own host.
fn origin_url(cookie: &Cookie, request_url: &Url) -> Option<Url> {
    let domain = cookie.domain.trim_start_matches('.');
    if domain.is_empty() {
        return Some(request_url.clone());
    }
    let scheme = if cookie.secure { "https" } else { "http" };
    let path = if cookie.path.starts_with('/') {
        cookie.path.as_str()
    } else {
        "/"
    };
    Url::parse(&format!("{}://{}{}", scheme, domain, path)).ok()
}

/// How long a harvested cookie lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifetime {
    Session,
    Until(u64),
    Expired,
}

/// `Max-Age` wins over `Expires`; anything at or before `now` is a deletion.
fn lifetime(expires: Option<SystemTime>, max_age: Option<Duration>, now: SystemTime) -> Lifetime {
    if let Some(age) = max_age {
        if age.is_zero() {
            return Lifetime::Expired;
        }
        return now
            .checked_add(age)
            .map(|at| Lifetime::Until(unix_secs(at)))
            .unwrap_or(Lifetime::Session);
    }
    match expires {
        None => Lifetime::Session,
        Some(at) if at <= now => Lifetime::Expired,
        Some(at) => Lifetime::Until(unix_secs(at)),
    }
}

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Turn a parsed `Set-Cookie` into a [`Cookie`].
///
/// `host` is the responding host, used when the cookie has no `Domain`.
/// Returns `None` for nameless cookies and cookies the server is deleting.
fn harvest(host: &str, cookie: &reqwest::cookie::Cookie<'_>, now: SystemTime) -> Option<Cookie> {
    if cookie.name().is_empty() {
        return None;
    }

    let expires = match lifetime(cookie.expires(), cookie.max_age(), now) {
        Lifetime::Expired => {
            tracing::debug!(name = %cookie.name(), "dropping expired cookie");
            return None;
        }
        Lifetime::Session => None,
        Lifetime::Until(at) => Some(at),
    };

    let domain = match cookie.domain().map(|d| d.trim_start_matches('.')) {
        Some(d) if !d.is_empty() => format!(".{}", d.to_ascii_lowercase()),
        _ => host.to_string(),
    };
    let path = cookie
        .path()
        .filter(|p| p.starts_with('/'))
        .unwrap_or("/")
        .to_string();

    Some(Cookie {
        name: cookie.name().to_string(),
        value: cookie.value().to_string(),
        domain,
        path,
        secure: cookie.secure(),
        http_only: cookie.http_only(),
        expires,
    })
}
