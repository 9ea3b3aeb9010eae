//! Cody service entry point
//!
//! ```text
//! cody serve   # line protocol + HTTP
//! cody tcp     # line protocol only
//! cody http    # HTTP only
//! ```

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info};

use cody::config::Settings;
use cody::server::{http, tcp, ServiceContext};
use cody::tracing::{init_tracing, shutdown_tracing};

#[derive(Parser)]
#[command(name = "cody", version, about = "Agent-serving backend with provider fallback and sandboxed execution")]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Serve the line protocol and HTTP concurrently (default)
    Serve,
    /// Serve the line-delimited JSON protocol only
    Tcp,
    /// Serve HTTP only
    Http,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    let settings = cli.settings;

    init_tracing("cody", settings.otlp_endpoint.as_deref(), settings.log_json)?;
    info!(
        router_scope = ?settings.router_scope,
        primary_configured = settings.primary_url.is_some(),
        fallback_configured = settings.fallback_url.is_some(),
        "Starting Cody"
    );

    let ctx = ServiceContext::from_settings(&settings);
    let result = run(cli.command.unwrap_or(Command::Serve), &settings, ctx).await;

    if let Err(e) = &result {
        error!(error = %e, "Server stopped");
    }
    shutdown_tracing();
    result.map_err(Into::into)
}

async fn run(command: Command, settings: &Settings, ctx: ServiceContext) -> std::io::Result<()> {
    match command {
        Command::Tcp => {
            let listener = TcpListener::bind(&settings.tcp_addr).await?;
            serve_until_ctrl_c(tcp::serve(listener, ctx)).await
        }
        Command::Http => {
            let listener = TcpListener::bind(&settings.http_addr).await?;
            serve_until_ctrl_c(http::serve(listener, ctx)).await
        }
        Command::Serve => {
            let tcp_listener = TcpListener::bind(&settings.tcp_addr).await?;
            let http_listener = TcpListener::bind(&settings.http_addr).await?;
            serve_until_ctrl_c(async {
                tokio::try_join!(
                    tcp::serve(tcp_listener, ctx.clone()),
                    http::serve(http_listener, ctx),
                )
                .map(|_| ())
            })
            .await
        }
    }
}

async fn serve_until_ctrl_c(
    server: impl std::future::Future<Output = std::io::Result<()>>,
) -> std::io::Result<()> {
    tokio::select! {
        result = server => result,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown signal received");
            Ok(())
        }
    }
}
