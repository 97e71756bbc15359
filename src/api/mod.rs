//! SharePoint REST calls made with an authenticated session

pub mod client;

use anyhow::Result;

use crate::auth::Credentials;
use crate::http::{parse_header_lines, HttpResponse};
use client::SharePointClient;

/// Authenticate, GET a site-relative path and print the response.
///
/// `raw_headers` are `Name: value` lines; anything else is skipped.
pub async fn get(credentials: Credentials, path: &str, raw_headers: &[String]) -> Result<()> {
    let headers = parse_extra_headers(raw_headers);
    let client = SharePointClient::connect(credentials).await?;
    let resp = client.get(path, &headers).await?;
    print_response(&resp);
    Ok(())
}

/// Authenticate, POST `body` to a site-relative path and print the response.
pub async fn post(
    credentials: Credentials,
    path: &str,
    body: &str,
    raw_headers: &[String],
) -> Result<()> {
    let headers = parse_extra_headers(raw_headers);
    let client = SharePointClient::connect(credentials).await?;
    let resp = client.post(path, body, &headers).await?;
    print_response(&resp);
    Ok(())
}

fn print_response(resp: &HttpResponse) {
    println!("HTTP {}", resp.status);
    if let Some(content_type) = resp.header("content-type") {
        println!("Content-Type: {}", content_type);
    }
    println!();

    let is_json = resp
        .header("content-type")
        .is_some_and(|ct| ct.contains("json"));
    let pretty = is_json
        .then(|| serde_json::from_str::<serde_json::Value>(&resp.body).ok())
        .flatten()
        .and_then(|v| serde_json::to_string_pretty(&v).ok());
    println!("{}", pretty.as_deref().unwrap_or(&resp.body));
}

fn parse_extra_headers(raw_headers: &[String]) -> Vec<(String, String)> {
    let headers = parse_header_lines(raw_headers);
    if headers.len() < raw_headers.len() {
        tracing::warn!(
            "Ignoring {} malformed header(s) (expected 'Name: value')",
            raw_headers.len() - headers.len()
        );
    }
    headers
}
