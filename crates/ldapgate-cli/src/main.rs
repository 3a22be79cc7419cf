//! ldapgate - HTTP Basic authentication against an LDAP directory
//!
//! Answers reverse-proxy auth sub-requests with 204, 401 or 500.

use clap::{Parser, Subcommand};
use ldapgate_core::{GateConfig, LoggingConfig};
use ldapgate_server::AuthServer;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit status for missing or malformed configuration
const EXIT_CONFIG: u8 = 2;

#[derive(Parser)]
#[command(name = "ldapgate")]
#[command(author = "ldapgate developers")]
#[command(version = ldapgate_core::VERSION)]
#[command(about = "HTTP Basic authentication backed by an LDAP directory", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path (TOML); the environment is used when absent
    #[arg(short, long, global = true, env = "LDAPGATE_CONFIG")]
    config: Option<String>,

    /// Bind address
    #[arg(long, global = true)]
    bind: Option<String>,

    /// Port number
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Admin listener port for /health and /metrics
    #[arg(long, global = true)]
    admin_port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the verification server
    Server,

    /// Validate the configuration and exit
    CheckConfig,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    if let Some(Commands::Version) = cli.command {
        println!("ldapgate {}", ldapgate_core::VERSION);
        return ExitCode::SUCCESS;
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ldapgate: {}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    if let Some(Commands::CheckConfig) = cli.command {
        println!("Configuration OK");
        println!("  directory: {} ({})", config.directory.url(), config.directory.base_dn);
        println!(
            "  listener:  {}:{}",
            config.server.bind_address, config.server.port
        );
        return ExitCode::SUCCESS;
    }

    init_logging(&config.logging);

    match run_server(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("ldapgate exited: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> ldapgate_core::Result<GateConfig> {
    let mut config = match &cli.config {
        Some(path) => GateConfig::from_file(path)?,
        None => GateConfig::from_env()?,
    };

    // Override with CLI args
    if let Some(bind) = &cli.bind {
        config.server.bind_address = bind.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(port) = cli.admin_port {
        config.server.admin_port = Some(port);
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.logging.format = format.clone();
    }

    config.validate()?;
    Ok(config)
}

fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry
            .with(fmt::layer().json().with_target(true))
            .init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

async fn run_server(config: GateConfig) -> anyhow::Result<()> {
    info!("Starting ldapgate {}", ldapgate_core::VERSION);

    let server = AuthServer::new(config);
    server.run().await?;

    Ok(())
}
