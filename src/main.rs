//! spo-auth - SharePoint Online claims-based authentication
//!
//! Signs in to a SharePoint Online site with the WS-Federation passive flow
//! and makes authenticated REST calls with the resulting session.

mod api;
mod auth;
mod config;
mod http;
mod xml;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "spo-auth")]
#[command(about = "Claims-based authentication client for SharePoint Online", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(clap::Args)]
struct Login {
    /// Account to sign in as (defaults to the configured username)
    #[arg(short, long)]
    username: Option<String>,

    /// Password (read from stdin when not set)
    #[arg(long, env = "SPO_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Save site and endpoint settings
    Configure {
        /// SharePoint site URL, e.g. contoso.sharepoint.com
        #[arg(long)]
        site: Option<String>,

        /// Security Token Service endpoint override
        #[arg(long)]
        sts: Option<String>,

        /// Context info URL override
        #[arg(long)]
        context_info: Option<String>,

        /// Default username
        #[arg(long)]
        username: Option<String>,
    },

    /// Show configured endpoints
    Status,

    /// Authenticate and report the request digest
    Login {
        #[command(flatten)]
        login: Login,

        /// Print the harvested session cookies
        #[arg(long)]
        show_cookies: bool,
    },

    /// Authenticate, then GET a site-relative REST path
    Get {
        /// Path below the site, e.g. /_api/web
        path: String,

        /// Extra request header as 'Name: value' (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        #[command(flatten)]
        login: Login,
    },

    /// Authenticate, then POST to a site-relative REST path
    Post {
        /// Path below the site, e.g. /_api/web/lists
        path: String,

        /// Request body
        #[arg(short, long, default_value = "")]
        data: String,

        /// Extra request header as 'Name: value' (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        #[command(flatten)]
        login: Login,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Configure {
            site,
            sts,
            context_info,
            username,
        } => {
            auth::commands::configure(site, sts, context_info, username)?;
        }
        Commands::Status => {
            auth::commands::status()?;
        }
        Commands::Login {
            login,
            show_cookies,
        } => {
            tracing::info!("Starting authentication flow...");
            let credentials = auth::commands::credentials(login.username, login.password)?;
            auth::commands::login(credentials, show_cookies).await?;
        }
        Commands::Get {
            path,
            headers,
            login,
        } => {
            let credentials = auth::commands::credentials(login.username, login.password)?;
            api::get(credentials, &path, &headers).await?;
        }
        Commands::Post {
            path,
            data,
            headers,
            login,
        } => {
            let credentials = auth::commands::credentials(login.username, login.password)?;
            api::post(credentials, &path, &data, &headers).await?;
        }
    }

    Ok(())
}
