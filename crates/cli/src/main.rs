use std::{path::PathBuf, process::ExitCode};

use {
    anyhow::{Context, Result},
    clap::{Parser, Subcommand},
    inspector_a2a::{AgentConnector, HttpConnector},
    inspector_config::{InspectorConfig, discover_and_load},
    tracing::info,
    tracing_subscriber::EnvFilter,
};

/// Point a browser at any A2A agent, chat with it, and watch the raw wire
/// traffic alongside compliance findings.
#[derive(Parser, Debug)]
#[command(name = "a2a-inspector", version)]
struct Cli {
    /// Path to a config file (toml, yaml or json).
    #[arg(long, global = true, env = "A2A_INSPECTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the inspector gateway.
    Serve {
        /// Address to bind the HTTP server to.
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Fetch an agent card, print it and its compliance findings.
    Validate {
        /// Base URL of the agent.
        url: String,
    },
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = discover_and_load(cli.config.as_deref()).context("failed to load config")?;

    match cli.command {
        Command::Serve { bind, port } => {
            serve(config, bind, port).await?;
            Ok(ExitCode::SUCCESS)
        },
        Command::Validate { url } => validate(&config, &url).await,
    }
}

async fn serve(mut config: InspectorConfig, bind: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    inspector_gateway::start_gateway(config).await
}

async fn validate(config: &InspectorConfig, url: &str) -> Result<ExitCode> {
    info!(url, "fetching agent card");
    let connector = HttpConnector::from_config(&config.agent);
    let descriptor = connector
        .fetch_descriptor(url)
        .await
        .with_context(|| format!("could not fetch agent card from {url}"))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&descriptor.raw).context("failed to render agent card")?
    );

    if descriptor.is_compliant() {
        eprintln!("agent card is compliant");
        return Ok(ExitCode::SUCCESS);
    }
    eprintln!("{} finding(s):", descriptor.validation_errors.len());
    for finding in &descriptor.validation_errors {
        eprintln!("  - {finding}");
    }
    Ok(ExitCode::FAILURE)
}

#[cfg(test)]
mod tests {
    use {super::*, clap::CommandFactory};

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_flags_parse() {
        let cli = Cli::parse_from(["a2a-inspector", "serve", "--port", "8080", "--json-logs"]);
        assert!(cli.json_logs);
        match cli.command {
            Command::Serve { bind, port } => {
                assert_eq!(bind, None);
                assert_eq!(port, Some(8080));
            },
            Command::Validate { .. } => panic!("expected serve"),
        }
    }

    #[test]
    fn validate_takes_url() {
        let cli = Cli::parse_from(["a2a-inspector", "validate", "http://localhost:5555"]);
        assert!(matches!(cli.command, Command::Validate { url } if url == "http://localhost:5555"));
    }
}
