//! Cartographer: MCP server that maps CLI tools from their `--help` output.
//!
//! Three subcommands:
//! - `cartographer serve`: Streamable HTTP MCP server
//! - `cartographer stdio`: STDIO transport for STDIO-based MCP clients
//! - `cartographer crawl <command>`: crawl one tool and print its tree

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::Request;
use axum::response::IntoResponse;
use axum::Router;
use cartographer::{CartographerConfig, CartographerMcpServer, CommandCatalog, NoopNotifier};
use clap::{Parser, Subcommand};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use rmcp::ServiceExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt as TowerServiceExt;
use tracing_subscriber::EnvFilter;

const CONFIG_FILE: &str = "cartographer.toml";

#[derive(Parser)]
#[command(
    name = "cartographer",
    version,
    about = "Cartographer - map CLI tools from their --help output and serve them over MCP"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a Streamable HTTP MCP server
    Serve {
        /// Path to cartographer.toml [default: ./cartographer.toml or ~/.config/cartographer/cartographer.toml]
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// HTTP port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
        /// Bind address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
    /// Serve over STDIO
    Stdio {
        /// Path to cartographer.toml [default: ./cartographer.toml or ~/.config/cartographer/cartographer.toml]
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Crawl one command and print its tree as JSON
    Crawl {
        /// Root command name, e.g. `git`
        command: String,
        /// Path to cartographer.toml [default: ./cartographer.toml or ~/.config/cartographer/cartographer.toml]
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Print indented text instead of JSON
        #[arg(long)]
        text: bool,
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so the STDIO transport keeps stdout to itself
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cancel = CancellationToken::new();

    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutting down Cartographer...");
        cancel_for_signal.cancel();
    });

    match cli.command {
        Commands::Serve { config, port, host } => {
            let config = load_config(resolve_config(config)).await?;
            run_serve(config, host, port, cancel).await?;
        }
        Commands::Stdio { config } => {
            let config = load_config(resolve_config(config)).await?;
            run_stdio(config, cancel).await?;
        }
        Commands::Crawl {
            command,
            config,
            text,
            output,
        } => {
            let config = load_config(resolve_config(config)).await?;
            run_crawl(config, &command, text, output.as_deref()).await?;
        }
    }

    Ok(())
}

/// Build the server and crawl the configured preload commands in the background.
fn build_server(config: &CartographerConfig, cancel: &CancellationToken) -> CartographerMcpServer {
    let server = CartographerMcpServer::from_config(config, cancel.child_token());
    if !config.preload.is_empty() {
        let catalog = server.catalog().clone();
        let preload = config.preload.clone();
        tokio::spawn(async move {
            let added = catalog.preload(&preload).await;
            tracing::info!(added = %added, requested = %preload.len(), "preload finished");
        });
    }
    server
}

/// Serve over Streamable HTTP until cancelled.
async fn run_serve(
    config: CartographerConfig,
    host: String,
    port: u16,
    cancel: CancellationToken,
) -> Result<()> {
    let server = build_server(&config, &cancel);

    let session_manager = Arc::new(LocalSessionManager::default());
    let http_config = StreamableHttpServerConfig {
        cancellation_token: cancel.clone(),
        ..Default::default()
    };
    let server_for_factory = server.clone();
    let mcp_service = StreamableHttpService::new(
        move || Ok(server_for_factory.clone()),
        session_manager,
        http_config,
    );

    let app = Router::new().fallback(move |req: Request<axum::body::Body>| {
        let svc = mcp_service.clone();
        async move {
            match svc.oneshot(req).await {
                Ok(response) => response.into_response(),
                Err(never) => match never {},
            }
        }
    });

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!(host = %host, port = %port, "Cartographer HTTP server listening");
    tracing::info!("Connect your MCP client to http://{}:{}/mcp", host, port);

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .context("Cartographer HTTP server error")?;

    tracing::info!("Cartographer HTTP server stopped");
    Ok(())
}

/// Serve over stdin/stdout until the client disconnects or we are cancelled.
async fn run_stdio(config: CartographerConfig, cancel: CancellationToken) -> Result<()> {
    let server = build_server(&config, &cancel);

    let transport = (tokio::io::stdin(), tokio::io::stdout());
    let running = server
        .serve_with_ct(transport, cancel.clone())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize stdio transport: {:?}", e))?;

    tracing::info!("Cartographer stdio transport initialized, waiting for messages");

    tokio::select! {
        result = running.waiting() => {
            match result {
                Ok(reason) => {
                    tracing::info!(?reason, "Cartographer stdio transport completed");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Cartographer stdio transport error");
                    return Err(anyhow::anyhow!("Cartographer stdio transport error: {}", e));
                }
            }
        }
        _ = cancel.cancelled() => {
            tracing::info!("Cartographer stdio transport cancelled");
        }
    }

    Ok(())
}

/// Crawl `command` once and print or write the resulting tree.
async fn run_crawl(
    config: CartographerConfig,
    command: &str,
    text: bool,
    output: Option<&Path>,
) -> Result<()> {
    let catalog = CommandCatalog::from_config(&config, Arc::new(NoopNotifier));
    let summary = catalog
        .add(command)
        .await
        .with_context(|| format!("Failed to crawl '{}'", command))?;

    let rendered = if text {
        summary.tree.root.render()
    } else {
        serde_json::to_string_pretty(&summary.tree).context("Failed to serialize tree")?
    };

    match output {
        Some(path) => {
            tokio::fs::write(path, rendered)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(
                command = %summary.root,
                nodes = %summary.nodes,
                incomplete = %summary.incomplete_nodes,
                path = %path.display(),
                "tree written"
            );
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

/// Resolve the config file: explicit flag → ./cartographer.toml →
/// ~/.config/cartographer/cartographer.toml. `None` means built-in defaults.
fn resolve_config(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if explicit.is_some() {
        return explicit;
    }

    let local = Path::new(CONFIG_FILE);
    if local.exists() {
        return Some(local.to_path_buf());
    }

    dirs::config_dir()
        .map(|dir| dir.join("cartographer").join(CONFIG_FILE))
        .filter(|path| path.exists())
}

async fn load_config(path: Option<PathBuf>) -> Result<CartographerConfig> {
    match path {
        Some(path) => {
            let config = CartographerConfig::load(&path)
                .await
                .with_context(|| format!("Failed to load config file {}", path.display()))?;
            tracing::info!(path = %path.display(), preload = %config.preload.len(), "config loaded");
            Ok(config)
        }
        None => {
            tracing::info!("no cartographer.toml found, using defaults");
            Ok(CartographerConfig::default())
        }
    }
}
