//! Netscape cookie-jar decoding
//!
//! The transport reports harvested cookies as Netscape cookie-file lines
//! (7 TAB-separated fields: domain, tailmatch, path, secure, expires, name,
//! value). This module writes those lines, turns them into [`Cookie`]
//! records and renders records as `Set-Cookie`-style strings.

use std::fmt;
use std::time::{Duration, UNIX_EPOCH};

/// Domain prefix curl-style jars use to mark HttpOnly cookies.
const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

/// A single decoded cookie.
///
/// The value is redacted in Debug output: these are session credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    /// Unix timestamp; `None` for session cookies.
    pub expires: Option<u64>,
}

impl fmt::Debug for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cookie")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .field("domain", &self.domain)
            .field("path", &self.path)
            .field("secure", &self.secure)
            .field("http_only", &self.http_only)
            .field("expires", &self.expires)
            .finish()
    }
}

impl Cookie {
    /// Render as `"<value>; domain=..; path=..; [secure; ][HttpOnly; ][Expires=..; ]"`.
    ///
    /// Clauses whose source field is empty, false or absent are omitted.
    pub fn to_set_cookie_string(&self) -> String {
        let mut out = format!("{}; ", self.value);
        if !self.domain.is_empty() {
            out.push_str(&format!("domain={}; ", self.domain));
        }
        if !self.path.is_empty() {
            out.push_str(&format!("path={}; ", self.path));
        }
        if self.secure {
            out.push_str("secure; ");
        }
        if self.http_only {
            out.push_str("HttpOnly; ");
        }
        if let Some(date) = self.expires.and_then(format_expires) {
            out.push_str(&format!("Expires={}; ", date));
        }
        out
    }

    /// Encode as a Netscape jar line. Leading-dot domains tail-match.
    pub fn to_jar_line(&self) -> String {
        let prefix = if self.http_only { HTTP_ONLY_PREFIX } else { "" };
        format!(
            "{}{}\t{}\t{}\t{}\t{}\t{}\t{}",
            prefix,
            self.domain,
            flag(self.domain.starts_with('.')),
            self.path,
            flag(self.secure),
            self.expires.unwrap_or(0),
            self.name,
            self.value
        )
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "TRUE"
    } else {
        "FALSE"
    }
}

/// RFC 1123 GMT date for a unix timestamp.
fn format_expires(timestamp: u64) -> Option<String> {
    let time = UNIX_EPOCH.checked_add(Duration::from_secs(timestamp))?;
    Some(httpdate::fmt_http_date(time))
}

/// Decode one jar line. Lines with fewer than 6 fields yield `None`.
pub fn decode_jar_line(line: &str) -> Option<Cookie> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 6 {
        return None;
    }

    let (domain, http_only) = match fields[0].strip_prefix(HTTP_ONLY_PREFIX) {
        Some(rest) => (rest.to_string(), true),
        None => (fields[0].to_string(), false),
    };

    // Unparseable expiry degrades to a session cookie.
    let expires = fields[4].trim().parse::<u64>().unwrap_or(0);

    Some(Cookie {
        name: fields[5].to_string(),
        value: fields.get(6).map(|v| v.to_string()).unwrap_or_default(),
        domain,
        path: fields[2].to_string(),
        secure: fields[3] == "TRUE",
        http_only,
        expires: (expires > 0).then_some(expires),
    })
}

/// Decode a whole jar. Malformed lines are skipped; later cookies replace
/// earlier ones with the same name.
pub fn decode_jar<I, S>(lines: I) -> CookieSet
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut set = CookieSet::default();
    for line in lines {
        match decode_jar_line(line.as_ref()) {
            Some(cookie) => {
                tracing::debug!(name = %cookie.name, domain = %cookie.domain, "decoded cookie");
                set.insert(cookie);
            }
            None => tracing::debug!("skipping malformed cookie jar line"),
        }
    }
    set
}

/// Cookies unique by name, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieSet {
    cookies: Vec<Cookie>,
}

impl CookieSet {
    /// Insert or replace by name.
    pub fn insert(&mut self, cookie: Cookie) {
        match self.cookies.iter_mut().find(|c| c.name == cookie.name) {
            Some(existing) => *existing = cookie,
            None => self.cookies.push(cookie),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Cookie> {
        self.cookies.iter().find(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.iter()
    }

    /// `(name, Set-Cookie-style string)` pairs.
    pub fn reformatted(&self) -> Vec<(String, String)> {
        self.cookies
            .iter()
            .map(|c| (c.name.clone(), c.to_set_cookie_string()))
            .collect()
    }
}
