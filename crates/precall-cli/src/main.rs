//! Precall gateway server binary.

use clap::{Parser, Subcommand};
use precall_agent::{AgentClient, AgentEndpoint, StaticAgentDirectory};
use precall_gateway::{GatewayDeps, GatewayServer, StaticTokenVerifier};
use precall_session::{FileConnectionStore, FileSessionStore, FileTranscriptStore};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "precall", about = "Precall — pre-consultation chat gateway")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "precall.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Deserialize)]
struct PrecallConfig {
    #[serde(default = "default_data_dir")]
    data_dir: PathBuf,
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    retention: RetentionConfig,
    #[serde(default)]
    auth: AuthSettings,
    agents: AgentsConfig,
}

#[derive(Deserialize)]
struct ServerConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Deserialize)]
struct RetentionConfig {
    #[serde(default = "default_message_ttl_days")]
    message_ttl_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            message_ttl_days: default_message_ttl_days(),
        }
    }
}

#[derive(Deserialize, Default)]
struct AuthSettings {
    /// Bearer tokens accepted on the operator connect path.
    #[serde(default)]
    operator_tokens: Vec<String>,
}

#[derive(Deserialize)]
struct AgentsConfig {
    /// Agent role used for operator planning turns.
    #[serde(default = "default_planning_role")]
    planning_role: String,
    /// Role → hosted agent endpoint.
    roles: HashMap<String, AgentEndpoint>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_message_ttl_days() -> i64 {
    90
}
fn default_planning_role() -> String {
    "planner".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let config_str = tokio::fs::read_to_string(&cli.config).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to read config file '{}': {}",
            cli.config.display(),
            e
        )
    })?;
    let config: PrecallConfig = toml::from_str(&config_str)?;

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or(config.server.host);
            let port = port.unwrap_or(config.server.port);

            let sessions = Arc::new(FileSessionStore::new(config.data_dir.join("sessions")).await?);
            let transcripts =
                Arc::new(FileTranscriptStore::new(config.data_dir.join("transcripts")).await?);
            let connections =
                Arc::new(FileConnectionStore::new(config.data_dir.join("connections")).await?);

            if !config.agents.roles.contains_key(&config.agents.planning_role) {
                anyhow::bail!(
                    "planning_role '{}' has no entry under [agents.roles]",
                    config.agents.planning_role
                );
            }
            let directory = Arc::new(StaticAgentDirectory::new(config.agents.roles));

            if !config.auth.operator_tokens.is_empty() {
                info!(
                    tokens = config.auth.operator_tokens.len(),
                    "Operator token auth enabled"
                );
            }
            let verifier = Arc::new(StaticTokenVerifier::new(config.auth.operator_tokens));

            let app = GatewayServer::build(GatewayDeps {
                sessions,
                transcripts,
                connections,
                agent: Arc::new(AgentClient::new()),
                directory,
                verifier,
                message_ttl: chrono::Duration::days(config.retention.message_ttl_days),
                planning_role: config.agents.planning_role,
            });

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!("Precall gateway listening on {}", addr);
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
