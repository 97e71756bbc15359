//! Authenticated client for SharePoint REST APIs
//!
//! Wraps an [`Authentication`] session and attaches its prepared request
//! (digest, OData accept header, session cookies) to every call.

use anyhow::{bail, Context, Result};

use crate::auth::{Authentication, Credentials};
use crate::config::Config;
use crate::http::{HttpRequest, HttpResponse, ReqwestTransport, Transport};

/// Authenticated SharePoint REST client.
pub struct SharePointClient<T: Transport = ReqwestTransport> {
    auth: Authentication<T>,
}

impl SharePointClient<ReqwestTransport> {
    /// Load config and run the handshake for `credentials`.
    pub async fn connect(credentials: Credentials) -> Result<Self> {
        let config = Config::load()?;
        let endpoints = config.endpoints()?;
        tracing::info!("Authenticating against {}...", endpoints.site());

        let auth = Authentication::login(endpoints, credentials, ReqwestTransport::new())
            .await
            .context("SharePoint authentication failed")?;
        Ok(Self::from_authentication(auth))
    }
}

impl<T: Transport> SharePointClient<T> {
    pub fn from_authentication(auth: Authentication<T>) -> Self {
        Self { auth }
    }

    fn ensure_valid(&self) -> Result<()> {
        if !self.auth.token_is_valid() {
            bail!("Request digest expired. Run 'spo-auth login' again.");
        }
        Ok(())
    }

    /// GET a site-relative path, with optional extra headers.
    pub async fn get(&self, path: &str, extra_headers: &[(String, String)]) -> Result<HttpResponse> {
        self.ensure_valid()?;
        let url = self.auth.endpoints().site_url(path);
        tracing::debug!("SharePoint GET {}", url);

        let request = with_headers(self.auth.prepared_request().get(&url), extra_headers);
        self.send(request, &url).await
    }

    /// POST a body to a site-relative path, with optional extra headers.
    pub async fn post(
        &self,
        path: &str,
        body: &str,
        extra_headers: &[(String, String)],
    ) -> Result<HttpResponse> {
        self.ensure_valid()?;
        let url = self.auth.endpoints().site_url(path);
        tracing::debug!("SharePoint POST {}", url);

        let request = with_headers(self.auth.prepared_request().post(&url, body), extra_headers);
        self.send(request, &url).await
    }

    async fn send(&self, request: HttpRequest, url: &str) -> Result<HttpResponse> {
        let resp = self
            .auth
            .transport()
            .perform(request)
            .await
            .with_context(|| format!("SharePoint request to {} failed", url))?;
        check_response(resp, url)
    }
}

fn with_headers(request: HttpRequest, headers: &[(String, String)]) -> HttpRequest {
    headers
        .iter()
        .fold(request, |req, (name, value)| req.header(name.as_str(), value.as_str()))
}

/// Check HTTP response status code and return a clear error on failure.
fn check_response(resp: HttpResponse, url: &str) -> Result<HttpResponse> {
    if resp.status == 401 || resp.status == 403 {
        bail!(
            "{} for {}. Session may be invalid -- run 'spo-auth login'.",
            resp.status,
            url
        );
    }
    if !resp.is_success() {
        bail!("HTTP {} for {}: {}", resp.status, url, resp.body);
    }
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Endpoints;
    use crate::http::fake::{ok, FakeTransport};
    use crate::http::Method;

    async fn connected(extra: Vec<Result<HttpResponse, String>>) -> SharePointClient<FakeTransport> {
        let mut responses = vec![
            ok(
                200,
                "<S:Envelope><S:Body><wst:RequestSecurityTokenResponse><wst:RequestedSecurityToken>\
                 <wsse:BinarySecurityToken>t=abc</wsse:BinarySecurityToken></wst:RequestedSecurityToken>\
                 </wst:RequestSecurityTokenResponse></S:Body></S:Envelope>",
                &[],
                &[],
            ),
            ok(
                302,
                "",
                &[],
                &["contoso.sharepoint.com\tFALSE\t/\tTRUE\t0\tFedAuth\tfa"],
            ),
            ok(
                200,
                "<d:GetContextWebInformation><d:FormDigestTimeoutSeconds>1800</d:FormDigestTimeoutSeconds>\
                 <d:FormDigestValue>0xD</d:FormDigestValue></d:GetContextWebInformation>",
                &[],
                &[],
            ),
        ];
        responses.extend(extra);

        let auth = Authentication::login(
            Endpoints::new("contoso.sharepoint.com"),
            Credentials::new("u", "p"),
            FakeTransport::new(responses),
        )
        .await
        .unwrap();
        SharePointClient::from_authentication(auth)
    }

    #[tokio::test]
    async fn test_get_uses_prepared_request() {
        let client = connected(vec![ok(200, "<entry/>", &["Content-Type: application/atom+xml"], &[])]).await;

        let extra = vec![("X-Custom".to_string(), "1".to_string())];
        let resp = client.get("/_api/web", &extra).await.unwrap();
        assert_eq!(resp.body, "<entry/>");
        assert_eq!(resp.header("content-type"), Some("application/atom+xml"));

        let requests = client.auth.transport().requests();
        let last = requests.last().unwrap();
        assert_eq!(last.method, Method::Get);
        assert_eq!(last.url, "https://contoso.sharepoint.com/_api/web");
        assert_eq!(last.header_value("X-RequestDigest"), Some("0xD"));
        assert_eq!(last.header_value("X-Custom"), Some("1"));
        assert_eq!(last.cookies.len(), 1);
        assert_eq!(last.cookies.get("FedAuth").unwrap().value, "fa");
    }

    #[tokio::test]
    async fn test_post_sends_body() {
        let client = connected(vec![ok(201, "{}", &[], &[])]).await;
        client.post("_api/web/lists", "{}", &[]).await.unwrap();

        let requests = client.auth.transport().requests();
        let last = requests.last().unwrap();
        assert_eq!(last.method, Method::Post);
        assert_eq!(last.body, "{}");
    }

    #[tokio::test]
    async fn test_unauthorized_is_reported() {
        let client = connected(vec![ok(403, "", &[], &[])]).await;
        let err = client.get("/_api/web", &[]).await.unwrap_err();
        assert!(err.to_string().contains("spo-auth login"));
    }

    #[tokio::test]
    async fn test_server_error_includes_body() {
        let client = connected(vec![ok(500, "boom", &[], &[])]).await;
        let err = client.get("/_api/web", &[]).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
