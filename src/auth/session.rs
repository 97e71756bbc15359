//! Handshake orchestration
//!
//! `authenticate` drives the four stages in order:
//!
//! 1. build the WS-Trust envelope
//! 2. POST it to the STS and extract the binary security token
//! 3. POST the token to the site's sign-in page and harvest cookies
//! 4. POST to `/_api/contextinfo` with those cookies for a request digest
//!
//! Cookies and digest are committed together only after stage 4 succeeds,
//! so a failed attempt never disturbs the results of an earlier login.

use super::digest::parse_context_info;
use super::envelope::build_envelope;
use super::sts::extract_token;
use super::{AuthError, AuthErrorKind, Credentials, Endpoints, SecurityDigest};
use crate::http::{
    CookieSet, HttpRequest, HttpResponse, PreparedRequest, ReqwestTransport, Transport,
};

pub const REQUEST_DIGEST_HEADER: &str = "X-RequestDigest";
pub const ODATA_ACCEPT: &str = "application/xml;odata=verbose";

/// Where the last handshake got to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    TokenRequested,
    TokenReceived,
    SignInPending,
    SignedIn,
    DigestAcquired,
    Failed(AuthErrorKind),
}

/// Cookies and digest from one successful handshake.
#[derive(Debug, Clone)]
struct Session {
    cookies: CookieSet,
    digest: SecurityDigest,
}

/// Authentication session for one SharePoint site.
///
/// Not shareable between concurrent logins: `authenticate` takes `&mut self`.
/// Use one instance per session.
pub struct Authentication<T: Transport = ReqwestTransport> {
    endpoints: Endpoints,
    transport: T,
    state: HandshakeState,
    session: Option<Session>,
}

impl Authentication<ReqwestTransport> {
    /// Session over the default reqwest transport.
    pub fn new(endpoints: Endpoints) -> Self {
        Self::with_transport(endpoints, ReqwestTransport::new())
    }
}

impl<T: Transport> Authentication<T> {
    pub fn with_transport(endpoints: Endpoints, transport: T) -> Self {
        Self {
            endpoints,
            transport,
            state: HandshakeState::Idle,
            session: None,
        }
    }

    /// Build a session and authenticate it straight away.
    pub async fn login(
        endpoints: Endpoints,
        credentials: Credentials,
        transport: T,
    ) -> Result<Self, AuthError> {
        let mut auth = Self::with_transport(endpoints, transport);
        auth.authenticate(credentials).await?;
        Ok(auth)
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Run the full handshake.
    ///
    /// On failure the previously committed cookies and digest are kept.
    pub async fn authenticate(&mut self, credentials: Credentials) -> Result<(), AuthError> {
        match self.handshake(credentials).await {
            Ok(session) => {
                tracing::info!(
                    site = %self.endpoints.site(),
                    cookies = session.cookies.len(),
                    timeout_secs = session.digest.timeout_secs(),
                    "authenticated"
                );
                self.session = Some(session);
                self.state = HandshakeState::DigestAcquired;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("authentication failed in state {:?}: {}", self.state, e);
                self.state = HandshakeState::Failed(e.kind());
                Err(e)
            }
        }
    }

    async fn handshake(&mut self, credentials: Credentials) -> Result<Session, AuthError> {
        self.state = HandshakeState::Idle;

        let envelope = build_envelope(
            &credentials.username,
            credentials.password(),
            self.endpoints.site(),
            self.endpoints.sts(),
        )?;
        drop(credentials);
        self.transition(HandshakeState::TokenRequested);

        let sts_url = self.endpoints.sts().to_string();
        let sts_response = self
            .send(HttpRequest::post(&sts_url, envelope).content_type("application/xml"))
            .await?;
        if !sts_response.is_success() || sts_response.body.is_empty() {
            return Err(AuthError::NetworkError {
                url: sts_url,
                reason: format!(
                    "HTTP {} with {} byte body",
                    sts_response.status,
                    sts_response.body.len()
                ),
            });
        }
        self.transition(HandshakeState::TokenReceived);

        let token = extract_token(&sts_response.body, self.endpoints.site())?;
        self.transition(HandshakeState::SignInPending);

        let sign_in = self
            .send(HttpRequest::post(self.endpoints.sign_in(), token))
            .await?;
        let cookies = sign_in.cookies();
        if cookies.is_empty() {
            return Err(AuthError::NoCookiesReturned {
                status: sign_in.status,
            });
        }
        self.transition(HandshakeState::SignedIn);

        let context_info = self
            .send(
                HttpRequest::post(self.endpoints.context_info(), "")
                    .content_type("application/x-www-form-urlencoded")
                    .cookies(cookies.clone()),
            )
            .await?;
        let digest = parse_context_info(&context_info.body)?;

        Ok(Session { cookies, digest })
    }

    fn transition(&mut self, next: HandshakeState) {
        tracing::debug!("handshake {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AuthError> {
        let url = request.url.clone();
        self.transport
            .perform(request)
            .await
            .map_err(|e| AuthError::NetworkError {
                url,
                reason: e.to_string(),
            })
    }

    /// Whether the current digest is still inside its lifetime.
    pub fn token_is_valid(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.digest.is_valid())
    }

    pub fn request_digest(&self) -> Option<&SecurityDigest> {
        self.session.as_ref().map(|s| &s.digest)
    }

    pub fn security_cookies(&self) -> Option<&CookieSet> {
        self.session.as_ref().map(|s| &s.cookies)
    }

    /// Template for downstream REST calls, carrying the digest, the OData
    /// accept header and the session cookies.
    pub fn prepared_request(&self) -> PreparedRequest {
        let (digest, cookies) = match &self.session {
            Some(s) => (s.digest.value().to_string(), s.cookies.clone()),
            None => (String::new(), CookieSet::default()),
        };
        PreparedRequest {
            headers: vec![
                (REQUEST_DIGEST_HEADER.to_string(), digest),
                ("Accept".to_string(), ODATA_ACCEPT.to_string()),
            ],
            cookies,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::fake::{ok, FakeTransport};
    use crate::http::Method;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SITE: &str = "https://contoso.sharepoint.com";

    fn sts_body(realm: &str, token: &str) -> String {
        format!(
            "<S:Envelope><S:Body><wst:RequestSecurityTokenResponse>\
             <wsp:AppliesTo><wsa:EndpointReference><wsa:Address>{}</wsa:Address>\
             </wsa:EndpointReference></wsp:AppliesTo>\
             <wst:RequestedSecurityToken><wsse:BinarySecurityToken>{}</wsse:BinarySecurityToken>\
             </wst:RequestedSecurityToken></wst:RequestSecurityTokenResponse></S:Body></S:Envelope>",
            realm, token
        )
    }

    fn context_info_body(digest: &str) -> String {
        context_info_with_timeout(digest, "1800")
    }

    fn context_info_with_timeout(digest: &str, timeout: &str) -> String {
        format!(
            "<d:GetContextWebInformation><d:FormDigestTimeoutSeconds>{}</d:FormDigestTimeoutSeconds>\
             <d:FormDigestValue>{}</d:FormDigestValue></d:GetContextWebInformation>",
            timeout, digest
        )
    }

    fn assert_first_session_kept(auth: &Authentication<FakeTransport>) {
        assert!(auth.token_is_valid());
        assert_eq!(auth.request_digest().unwrap().value(), "0xFIRST");
        assert_eq!(
            auth.security_cookies().unwrap().get("FedAuth").unwrap().value,
            "first"
        );
    }

    fn happy_path(digest: &str, fed_auth: &str) -> Vec<Result<HttpResponse, String>> {
        let fed_auth_line = format!(
            "#HttpOnly_contoso.sharepoint.com\tFALSE\t/\tTRUE\t0\tFedAuth\t{}",
            fed_auth
        );
        vec![
            ok(200, &sts_body(SITE, "t%3Dabc%2B1&amp;p%3D"), &["Content-Type: application/soap+xml"], &[]),
            ok(
                302,
                "",
                &["Location: /"],
                &[
                    "#HttpOnly_.sharepoint.com\tTRUE\t/\tTRUE\t0\trtFa\trt",
                    fed_auth_line.as_str(),
                ],
            ),
            ok(200, &context_info_body(digest), &["Content-Type: application/xml"], &[]),
        ]
    }

    fn creds() -> Credentials {
        Credentials::new("user@contoso.com", "secret")
    }

    fn auth(responses: Vec<Result<HttpResponse, String>>) -> Authentication<FakeTransport> {
        Authentication::with_transport(
            Endpoints::new("contoso.sharepoint.com/"),
            FakeTransport::new(responses),
        )
    }

    #[tokio::test]
    async fn test_happy_path() {
        let mut auth = auth(happy_path("0xDIGEST", "fa"));
        assert!(!auth.token_is_valid());
        assert_eq!(auth.state(), HandshakeState::Idle);

        auth.authenticate(creds()).await.unwrap();

        assert!(auth.token_is_valid());
        assert_eq!(auth.state(), HandshakeState::DigestAcquired);
        assert_eq!(auth.request_digest().unwrap().value(), "0xDIGEST");
        assert_eq!(auth.security_cookies().unwrap().len(), 2);

        let requests = auth.transport().requests();
        assert_eq!(requests.len(), 3);

        let sts = &requests[0];
        assert_eq!(sts.method, Method::Post);
        assert_eq!(sts.url, crate::auth::DEFAULT_STS_ENDPOINT);
        assert_eq!(sts.header_value("Content-Type"), Some("application/xml"));
        assert!(sts.body.contains("<o:Username>user@contoso.com</o:Username>"));
        assert!(sts.body.contains("<a:Address>https://contoso.sharepoint.com</a:Address>"));

        let sign_in = &requests[1];
        assert_eq!(
            sign_in.url,
            "https://contoso.sharepoint.com/_forms/default.aspx?wa=wsignin1.0"
        );
        assert_eq!(sign_in.body, "t=abc+1&p=");
        assert_eq!(sign_in.header_value("Content-Type"), None);
        assert!(sign_in.cookies.is_empty());

        let ctx = &requests[2];
        assert_eq!(ctx.url, "https://contoso.sharepoint.com/_api/contextinfo");
        assert_eq!(ctx.body, "");
        assert_eq!(
            ctx.header_value("Content-Type"),
            Some("application/x-www-form-urlencoded")
        );
        let names: Vec<&str> = ctx.cookies.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["rtFa", "FedAuth"]);
    }

    #[tokio::test]
    async fn test_prepared_request_carries_session() {
        let mut auth = auth(happy_path("0xDIGEST", "fa"));
        auth.authenticate(creds()).await.unwrap();

        let req = auth
            .prepared_request()
            .get(auth.endpoints().site_url("/_api/web"));
        assert_eq!(req.url, "https://contoso.sharepoint.com/_api/web");
        assert_eq!(req.header_value(REQUEST_DIGEST_HEADER), Some("0xDIGEST"));
        assert_eq!(req.header_value("accept"), Some(ODATA_ACCEPT));
        assert_eq!(req.cookies.get("FedAuth").unwrap().value, "fa");
    }

    #[tokio::test]
    async fn test_realm_mismatch_stops_before_sign_in() {
        let mut auth = auth(vec![ok(
            200,
            &sts_body("https://other.sharepoint.com", "t=abc"),
            &[],
            &[],
        )]);

        let err = auth.authenticate(creds()).await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::RealmMismatch);
        assert_eq!(auth.state(), HandshakeState::Failed(AuthErrorKind::RealmMismatch));
        assert_eq!(auth.transport().requests().len(), 1);
        assert!(!auth.token_is_valid());
    }

    #[test]
    fn test_sts_transport_failure_is_network_error() {
        let mut auth = auth(vec![Err("connection refused".to_string())]);
        let err = tokio_test::block_on(auth.authenticate(creds())).unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::NetworkError);
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(auth.state(), HandshakeState::Failed(AuthErrorKind::NetworkError));
    }

    #[tokio::test]
    async fn test_sts_error_status_is_network_error() {
        let mut auth = auth(vec![ok(500, "<html/>", &[], &[])]);
        let err = auth.authenticate(creds()).await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::NetworkError);

        auth.transport().push(vec![ok(200, "", &[], &[])]);
        let err = auth.authenticate(creds()).await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::NetworkError);
    }

    #[tokio::test]
    async fn test_no_cookies_from_sign_in() {
        let mut auth = auth(vec![
            ok(200, &sts_body(SITE, "t=abc"), &[], &[]),
            ok(200, "<html>sign in failed</html>", &[], &["too\tshort"]),
        ]);
        let err = auth.authenticate(creds()).await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::NoCookiesReturned);
        assert_eq!(auth.transport().requests().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_session() {
        let mut auth = auth(happy_path("0xFIRST", "first"));
        auth.authenticate(creds()).await.unwrap();

        // Second attempt gets fresh cookies but no digest.
        let mut second = happy_path("0xSECOND", "second");
        second[2] = ok(403, "<m:error>Access denied</m:error>", &[], &[]);
        auth.transport().push(second);

        let err = auth.authenticate(creds()).await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::NoDigestReturned);
        assert_eq!(auth.state(), HandshakeState::Failed(AuthErrorKind::NoDigestReturned));

        assert!(auth.token_is_valid());
        assert_eq!(auth.request_digest().unwrap().value(), "0xFIRST");
        assert_eq!(
            auth.security_cookies().unwrap().get("FedAuth").unwrap().value,
            "first"
        );
    }

    #[tokio::test]
    async fn test_sign_in_failure_keeps_previous_session() {
        let mut auth = auth(happy_path("0xFIRST", "first"));
        auth.authenticate(creds()).await.unwrap();

        auth.transport().push(vec![
            ok(200, &sts_body(SITE, "t=abc"), &[], &[]),
            ok(200, "<html>sign in failed</html>", &[], &[]),
        ]);
        let err = auth.authenticate(creds()).await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::NoCookiesReturned);
        assert_eq!(
            auth.state(),
            HandshakeState::Failed(AuthErrorKind::NoCookiesReturned)
        );
        assert_eq!(auth.transport().requests().len(), 5);
        assert_first_session_kept(&auth);
    }

    #[tokio::test]
    async fn test_bad_digest_timeout_fails_with_parse_error() {
        let mut auth = auth(happy_path("0xFIRST", "first"));
        auth.authenticate(creds()).await.unwrap();

        for timeout in ["soon", "0"] {
            let mut attempt = happy_path("0xSECOND", "second");
            attempt[2] = ok(200, &context_info_with_timeout("0xSECOND", timeout), &[], &[]);
            auth.transport().push(attempt);

            let err = auth.authenticate(creds()).await.unwrap_err();
            assert_eq!(err.kind(), AuthErrorKind::DigestParseError);
            assert_eq!(
                auth.state(),
                HandshakeState::Failed(AuthErrorKind::DigestParseError)
            );
            assert_first_session_kept(&auth);
        }
    }

    #[tokio::test]
    async fn test_sign_in_that_only_deletes_cookies_fails() {
        let server = MockServer::start().await;
        let site = server.uri();
        Mock::given(method("POST"))
            .and(path("/extSTS.srf"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sts_body(&site, "t=abc")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_forms/default.aspx"))
            .respond_with(
                ResponseTemplate::new(302)
                    .append_header("Set-Cookie", "FedAuth=; Expires=Thu, 01 Jan 1970 00:00:00 GMT")
                    .append_header("Set-Cookie", "rtFa=; Expires=Thu, 01-Jan-1970 00:00:00 GMT"),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_api/contextinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_string(context_info_body("0xD")))
            .expect(0)
            .mount(&server)
            .await;

        let endpoints = Endpoints::new(&site).with_sts_endpoint(format!("{}/extSTS.srf", site));
        let mut auth = Authentication::new(endpoints);
        let err = auth.authenticate(creds()).await.unwrap_err();

        assert!(matches!(err, AuthError::NoCookiesReturned { status: 302 }));
        assert_eq!(
            auth.state(),
            HandshakeState::Failed(AuthErrorKind::NoCookiesReturned)
        );
        assert!(auth.security_cookies().is_none());
    }

    #[tokio::test]
    async fn test_second_login_replaces_session() {
        let mut auth = auth(happy_path("0xFIRST", "first"));
        auth.authenticate(creds()).await.unwrap();

        auth.transport().push(happy_path("0xSECOND", "second"));
        auth.authenticate(creds()).await.unwrap();

        assert_eq!(auth.request_digest().unwrap().value(), "0xSECOND");
        assert_eq!(
            auth.security_cookies().unwrap().get("FedAuth").unwrap().value,
            "second"
        );
    }

    #[tokio::test]
    async fn test_login_constructor() {
        let auth = Authentication::login(
            Endpoints::new(SITE),
            creds(),
            FakeTransport::new(happy_path("0xDIGEST", "fa")),
        )
        .await
        .unwrap();
        assert!(auth.token_is_valid());

        let err = Authentication::login(
            Endpoints::new(SITE),
            creds(),
            FakeTransport::new(vec![ok(200, "<S:Envelope/>", &[], &[])]),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.kind(), AuthErrorKind::TokenNotFound);
    }

    #[tokio::test]
    async fn test_custom_endpoints_are_used() {
        let endpoints = Endpoints::new(SITE)
            .with_sts_endpoint("https://adfs.contoso.com/extSTS.srf")
            .with_context_info_url("https://contoso.sharepoint.com/sites/team/_api/contextinfo");
        let mut auth =
            Authentication::with_transport(endpoints, FakeTransport::new(happy_path("0xD", "fa")));
        auth.authenticate(creds()).await.unwrap();

        let requests = auth.transport().requests();
        assert_eq!(requests[0].url, "https://adfs.contoso.com/extSTS.srf");
        assert!(requests[0]
            .body
            .contains("<a:To s:mustUnderstand=\"1\">https://adfs.contoso.com/extSTS.srf</a:To>"));
        assert_eq!(
            requests[2].url,
            "https://contoso.sharepoint.com/sites/team/_api/contextinfo"
        );
    }

    #[test]
    fn test_prepared_request_before_login_is_empty() {
        let auth = auth(Vec::new());
        let prepared = auth.prepared_request();
        assert!(prepared.cookies.is_empty());
        assert_eq!(prepared.headers[0].1, "");
    }
}
