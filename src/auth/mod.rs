//! Claims-based authentication for SharePoint Online
//!
//! Implements the legacy WS-Federation passive requestor flow: username and
//! password are exchanged for a security token at the Microsoft Online STS,
//! the token is redeemed for session cookies at the site's forms sign-in
//! page, and the cookies buy a request digest from `/_api/contextinfo`.

pub mod commands;
pub mod digest;
pub mod envelope;
pub mod session;
pub mod sts;

use std::fmt;

pub use digest::SecurityDigest;
pub use session::Authentication;

/// Well-known Microsoft Online STS endpoint.
pub const DEFAULT_STS_ENDPOINT: &str = "https://login.microsoftonline.com/extSTS.srf";

const SIGN_IN_PATH: &str = "/_forms/default.aspx?wa=wsignin1.0";
const CONTEXT_INFO_PATH: &str = "/_api/contextinfo";

/// Why a handshake stage failed.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("STS request template is malformed: {0}")]
    TemplateMalformed(String),

    #[error("request to {url} failed: {reason}")]
    NetworkError { url: String, reason: String },

    #[error("STS token is scoped to {actual}, expected {expected}")]
    RealmMismatch { expected: String, actual: String },

    #[error("no security token in STS response: {0}")]
    TokenNotFound(String),

    #[error("sign-in page returned no cookies (HTTP {status})")]
    NoCookiesReturned { status: u16 },

    #[error("no request digest in context info response: {0}")]
    NoDigestReturned(String),

    #[error("invalid request digest timeout: {0}")]
    DigestParseError(String),
}

/// Fieldless discriminant of [`AuthError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    TemplateMalformed,
    NetworkError,
    RealmMismatch,
    TokenNotFound,
    NoCookiesReturned,
    NoDigestReturned,
    DigestParseError,
}

impl AuthError {
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            AuthError::TemplateMalformed(_) => AuthErrorKind::TemplateMalformed,
            AuthError::NetworkError { .. } => AuthErrorKind::NetworkError,
            AuthError::RealmMismatch { .. } => AuthErrorKind::RealmMismatch,
            AuthError::TokenNotFound(_) => AuthErrorKind::TokenNotFound,
            AuthError::NoCookiesReturned { .. } => AuthErrorKind::NoCookiesReturned,
            AuthError::NoDigestReturned(_) => AuthErrorKind::NoDigestReturned,
            AuthError::DigestParseError(_) => AuthErrorKind::DigestParseError,
        }
    }
}

/// Username and password for one login attempt. Never persisted.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Site, STS, sign-in and context-info URLs for one tenant site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    site: String,
    sts: String,
    sign_in: String,
    context_info: String,
}

impl Endpoints {
    /// Derive all endpoints from the site URL.
    ///
    /// The site URL loses any trailing slash and gains `https://` when it has
    /// no scheme.
    pub fn new(site: &str) -> Self {
        let site = normalize_site(site);
        Self {
            sign_in: format!("{}{}", site, SIGN_IN_PATH),
            context_info: format!("{}{}", site, CONTEXT_INFO_PATH),
            sts: DEFAULT_STS_ENDPOINT.to_string(),
            site,
        }
    }

    pub fn with_sts_endpoint(mut self, sts: impl Into<String>) -> Self {
        self.sts = sts.into();
        self
    }

    pub fn with_context_info_url(mut self, url: impl Into<String>) -> Self {
        self.context_info = url.into();
        self
    }

    /// The site URL, also used as the token realm.
    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn sts(&self) -> &str {
        &self.sts
    }

    pub fn sign_in(&self) -> &str {
        &self.sign_in
    }

    pub fn context_info(&self) -> &str {
        &self.context_info
    }

    /// Absolute URL for a site-relative API path.
    pub fn site_url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.site, path)
        } else {
            format!("{}/{}", self.site, path)
        }
    }
}

fn normalize_site(site: &str) -> String {
    let site = site.trim().trim_end_matches('/');
    if site.starts_with("https://") || site.starts_with("http://") {
        site.to_string()
    } else {
        format!("https://{}", site)
    }
}
