use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use solid_auth::{PodService, SolidConfig};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "solid-mcp")]
#[command(about = "MCP server giving agents session-scoped access to Solid Pods")]
#[command(version)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the Solid tools over stdio (default if no subcommand provided)
    Serve,
    /// Run the login handshake once and report the result
    Login {
        /// OIDC issuer URL (defaults to SOLID_OIDC_ISSUER)
        #[arg(short, long)]
        issuer: Option<String>,

        /// Account email (defaults to SOLID_EMAIL)
        #[arg(short, long)]
        email: Option<String>,

        /// Account password (defaults to SOLID_PASSWORD)
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Print the tool definitions as JSON
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let _guard = solid_transport::logging::init_tracing(cli.verbose, cli.log_file.as_deref())?;

    let config = SolidConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => solid_transport::run_stdio_server(config).await,
        Commands::Login {
            issuer,
            email,
            password,
        } => run_login(config, issuer, email, password).await,
        Commands::Tools => {
            let tools = solid_transport::tool_definitions();
            println!("{}", serde_json::to_string_pretty(&tools)?);
            Ok(())
        }
    }
}

async fn run_login(
    config: SolidConfig,
    issuer: Option<String>,
    email: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let service = PodService::new(config).context("Failed to initialize Pod service")?;

    let outcome = service
        .login(issuer.as_deref(), email.as_deref(), password.as_deref())
        .await
        .context("Login failed")?;

    info!(session_id = %outcome.session_id, "Handshake completed");
    println!("✅ Login successful");
    println!("WebID:      {}", outcome.web_id);
    println!("Expires at: {}", outcome.expires_at.to_rfc3339());
    Ok(())
}
