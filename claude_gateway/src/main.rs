use claude_gateway::{
    AgentBinary, Credentials, ServerConfig, Settings, logging::init_logging, start_server,
};
use clap::Parser;
use std::path::PathBuf;

/// HTTP gateway that runs the Claude Code CLI and streams its output as SSE.
///
/// Settings come from the environment (and a `.env` file in the working
/// directory); the flags below override them.
#[derive(Parser, Debug)]
#[command(name = "claude_gateway")]
#[command(version, about)]
struct Args {
    /// Host to bind (overrides HOST).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides PORT).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the claude binary (overrides CLAUDE_PATH).
    #[arg(long)]
    claude_path: Option<PathBuf>,

    /// Default log level when RUST_LOG is unset (overrides LOG_LEVEL).
    #[arg(long)]
    log_level: Option<String>,

    /// Write daily rolling log files here instead of stderr (overrides LOG_DIR).
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // A missing .env is fine; real env vars take precedence over it.
    let dotenv = dotenvy::dotenv();

    let mut settings = Settings::from_env()?;
    if let Some(host) = args.host {
        settings.host = host;
    }
    if let Some(port) = args.port {
        settings.port = port;
    }
    if let Some(path) = args.claude_path {
        settings.claude_path = Some(path);
    }
    if let Some(level) = args.log_level {
        settings.log_level = level;
    }
    if let Some(dir) = args.log_dir {
        settings.log_dir = Some(dir);
    }

    init_logging(&settings.log_level, settings.log_dir.as_deref())?;

    tracing::info!("Starting Claude Code API Gateway...");
    match dotenv {
        Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!("Ignoring unreadable .env file: {}", e),
    }
    tracing::debug!(?settings, "Effective settings");

    let agent = AgentBinary::detect(settings.claude_path.as_deref()).await?;

    tracing::info!("Server configured: {}:{}", settings.host, settings.port);
    tracing::info!("Log level: {}", settings.log_level);

    start_server(ServerConfig {
        bind_addr: settings.bind_addr(),
        credentials: Credentials::new(&settings.auth_user, &settings.auth_password),
        agent,
        max_line_bytes: settings.buffer_limit,
    })
    .await
}
