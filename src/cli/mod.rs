//! CLI command handling.
//!
//! Provides subcommands for:
//! - Serving the HTTP API (`serve`, the default)
//! - Writing a single Santa letter to stdout (`transcript`)

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::api::{AppState, HttpServer, HttpServerConfig, router};
use crate::config::{Config, GenerationMode};
use crate::error::ConfigError;
use crate::wish::WishDetails;

#[derive(Parser, Debug)]
#[command(name = "wishing-machine")]
#[command(about = "Backend for the Santa wishing machine")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Address to bind (overrides HOST)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Port to listen on (overrides PORT)
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Generation mode: live or mock (overrides WISH_MODE)
    #[arg(long, global = true)]
    pub mode: Option<GenerationMode>,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "LOG_JSON")]
    pub log_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the HTTP API (default if no subcommand given)
    Serve,

    /// Generate one letter and print it
    Transcript {
        /// Child's name
        #[arg(long)]
        name: String,

        /// Good things the child has done
        #[arg(long, default_value = "")]
        nice: String,

        /// Things the child could work on
        #[arg(long, default_value = "")]
        naughty: String,

        /// Gifts the child is wishing for
        #[arg(long)]
        gifts: String,
    },
}

impl Cli {
    /// Apply command-line overrides on top of environment configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
    }
}

/// Serve the API until Ctrl-C.
pub async fn run_serve(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| ConfigError::InvalidValue {
            key: "HOST".to_string(),
            message: format!("{}:{} is not a socket address: {}", config.server.host, config.server.port, e),
        })?;

    tracing::info!(
        mode = %config.mode,
        api_key = config.has_api_key(),
        "Starting wishing machine"
    );

    let state = Arc::new(AppState::from_config(&config)?);
    let app = router(state, &config.server.cors_origins);

    let mut server = HttpServer::new(HttpServerConfig { addr }, app);
    server.start().await?;

    tokio::signal::ctrl_c().await?;
    server.shutdown().await;
    Ok(())
}

/// Generate one letter with the configured backend and print it.
pub async fn run_transcript_command(config: Config, details: WishDetails) -> anyhow::Result<()> {
    let state = AppState::from_config(&config)?;
    let result = state.transcripts.generate(&details).await;
    println!("{}", result.transcript);
    Ok(())
}
