//! CLI entry points for configuring and testing authentication

use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};

use super::session::HandshakeState;
use super::{AuthError, Authentication, Credentials};
use crate::config::Config;

/// Cookies SharePoint Online issues on a successful sign-in.
const SESSION_COOKIES: [&str; 2] = ["FedAuth", "rtFa"];

/// Save site and endpoint settings.
pub fn configure(
    site: Option<String>,
    sts: Option<String>,
    context_info: Option<String>,
    username: Option<String>,
) -> Result<()> {
    let mut config = Config::load()?;
    if site.is_some() {
        config.site_url = site;
    }
    if sts.is_some() {
        config.sts_endpoint = sts;
    }
    if context_info.is_some() {
        config.context_info_url = context_info;
    }
    if username.is_some() {
        config.username = username;
    }

    // Validates that a site is set before anything is written.
    let endpoints = config.endpoints()?;
    config.save()?;
    println!("Saved configuration for {}", endpoints.site());
    Ok(())
}

/// Resolve credentials from arguments, config and stdin.
pub fn credentials(username: Option<String>, password: Option<String>) -> Result<Credentials> {
    let config = Config::load()?;
    let username = match username.or(config.username) {
        Some(u) => u,
        None => prompt("Username: ")?,
    };
    if username.is_empty() {
        bail!("A username is required.");
    }

    let password = match password {
        Some(p) => p,
        None => prompt("Password: ")?,
    };

    Ok(Credentials::new(username, password))
}

fn prompt(label: &str) -> Result<String> {
    eprint!("{}", label);
    io::stderr().flush().ok();

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Run the handshake once and report the outcome.
pub async fn login(credentials: Credentials, show_cookies: bool) -> Result<()> {
    let endpoints = Config::load()?.endpoints()?;
    let mut auth = Authentication::new(endpoints);

    if let Err(e) = auth.authenticate(credentials).await {
        bail!("{}", failure_message(auth.state(), &e));
    }

    println!("Authenticated to {}", auth.endpoints().site());
    if let Some(digest) = auth.request_digest() {
        println!("Digest valid: {}", auth.token_is_valid());
        println!("  issued_at:  {}", format_timestamp(digest.issued_at_secs()));
        println!("  expires_at: {}", format_timestamp(digest.expires_at()));
    }

    if let Some(cookies) = auth.security_cookies() {
        println!("Cookies:      {}", cookies.len());
        for name in SESSION_COOKIES {
            let state = if cookies.get(name).is_some() { "present" } else { "missing" };
            println!("  {:<8} {}", name, state);
        }
        if show_cookies {
            for (name, set_cookie) in cookies.reformatted() {
                println!("  {}={}", name, set_cookie);
            }
        }
    }
    Ok(())
}

fn failure_message(state: HandshakeState, err: &AuthError) -> String {
    match state {
        HandshakeState::Failed(kind) => format!("Login failed with {:?}: {}", kind, err),
        other => format!("Login stopped in state {:?}: {}", other, err),
    }
}

fn format_timestamp(secs: u64) -> String {
    chrono::DateTime::from_timestamp(secs as i64, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}

/// Display configured and derived endpoints.
pub fn status() -> Result<()> {
    let config = Config::load()?;
    println!("Config file:  {}", Config::config_path()?.display());

    match config.endpoints() {
        Ok(endpoints) => {
            println!("Site:         {}", endpoints.site());
            println!("STS:          {}", endpoints.sts());
            println!("Sign-in:      {}", endpoints.sign_in());
            println!("Context info: {}", endpoints.context_info());
        }
        Err(_) => {
            println!("Site:         none");
            println!("\nRun 'spo-auth configure --site <URL>' to get started.");
        }
    }

    match config.username {
        Some(u) => println!("Username:     {}", u),
        None => println!("Username:     none"),
    }
    Ok(())
}
