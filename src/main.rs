//! zap-network - network options, root CA and passive scanning
//!
//! Loads the network configuration, applies command line overrides and either
//! runs a one-shot command or serves the network API until interrupted.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::RwLock;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use zap_network::api::{ApiServer, NetworkApi};
use zap_network::config::{self, ConfigTree};
use zap_network::http::HttpMessage;
use zap_network::network::ExtensionNetwork;
use zap_network::scanner::PassiveScanner;
use zap_network::UserHint;

/// Network options, root CA and passive scanning
#[derive(Parser, Debug)]
#[command(name = "zap-network")]
#[command(author, version, about = "Network options, root CA and passive scanning", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "ZAP_NETWORK_CONFIG")]
    config: Option<PathBuf>,

    /// Address of the main proxy
    #[arg(long, env = "ZAP_NETWORK_HOST")]
    host: Option<String>,

    /// Port of the main proxy
    #[arg(short, long, env = "ZAP_NETWORK_PORT")]
    port: Option<u16>,

    /// Import the root CA certificate and private key from a PEM file
    #[arg(long, value_name = "PEM")]
    certload: Option<PathBuf>,

    /// Write the root CA certificate to a PEM file
    #[arg(long, value_name = "PATH")]
    certpubdump: Option<PathBuf>,

    /// Write the root CA certificate and private key to a PEM file
    #[arg(long, value_name = "PATH")]
    certfulldump: Option<PathBuf>,

    /// Run the passive scan rules over a saved message (JSON)
    #[arg(long, value_name = "MESSAGE")]
    scan: Option<PathBuf>,

    /// Serve the API on the local servers until interrupted
    #[arg(long, env = "ZAP_NETWORK_SERVE")]
    serve: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "ZAP_NETWORK_LOG_LEVEL")]
    log_level: String,

    /// Log file path (enables file logging)
    #[arg(long, env = "ZAP_NETWORK_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Enable JSON structured logging
    #[arg(long, env = "ZAP_NETWORK_LOG_JSON")]
    log_json: bool,

    /// Generate default configuration and exit
    #[arg(long)]
    generate_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.generate_config {
        return generate_default_config();
    }

    init_logging(&cli)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting zap-network");

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config::default_config_path()?,
    };
    let mut extension = ExtensionNetwork::from_path(&config_path)
        .map_err(|e| anyhow::anyhow!(e.user_hint()))
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    apply_overrides(&cli, &mut extension)?;

    if cli.validate_config {
        tracing::info!("Configuration is valid");
        return Ok(());
    }

    run_certificate_commands(&cli, &mut extension)?;
    extension.save().context("Failed to save configuration")?;

    if let Some(message) = &cli.scan {
        scan_message(message)?;
    }

    if cli.serve {
        serve(extension).await?;
    }

    Ok(())
}

/// Initialize the logging system
fn init_logging(cli: &Cli) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if let Some(log_path) = &cli.log_file {
        let dir = match log_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => config::data_dir()
                .map(|d| d.join("logs"))
                .unwrap_or_else(|_| PathBuf::from(".")),
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
        let filename = log_path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("zap-network.log");
        let file_appender = RollingFileAppender::new(Rotation::DAILY, dir, filename);

        if cli.log_json {
            subscriber
                .with(fmt::layer().json().with_writer(file_appender).with_ansi(false))
                .init();
        } else {
            subscriber
                .with(fmt::layer().with_writer(file_appender).with_ansi(false))
                .init();
        }
    } else if cli.log_json {
        subscriber.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        subscriber.with(fmt::layer().with_writer(std::io::stderr)).init();
    }

    Ok(())
}

/// Apply the main proxy overrides from the command line
fn apply_overrides(cli: &Cli, extension: &mut ExtensionNetwork) -> Result<()> {
    if cli.host.is_none() && cli.port.is_none() {
        return Ok(());
    }

    let mut main_proxy = extension.local_servers_options().main_proxy().clone();
    if let Some(host) = &cli.host {
        main_proxy.address = host.clone();
    }
    if let Some(port) = cli.port {
        if port == 0 {
            anyhow::bail!("Main proxy port cannot be 0");
        }
        main_proxy.port = port;
    }
    tracing::info!("Main proxy set to {}", main_proxy.authority());
    extension.local_servers_options_mut().set_main_proxy(main_proxy);
    Ok(())
}

/// Import and export the root CA, generating one if none is stored yet
fn run_certificate_commands(cli: &Cli, extension: &mut ExtensionNetwork) -> Result<()> {
    if let Some(pem) = &cli.certload {
        if let Some(reason) = extension.import_root_ca_cert(pem) {
            anyhow::bail!("Failed to import the root CA from {}: {}", pem.display(), reason);
        }
        println!("Root CA certificate loaded from {}", pem.display());
    }

    let dumping = cli.certpubdump.is_some() || cli.certfulldump.is_some();
    if dumping && extension.root_ca().is_none() && !extension.generate_root_ca_cert() {
        anyhow::bail!("No root CA certificate available and none could be generated");
    }

    if let Some(path) = &cli.certpubdump {
        extension
            .write_root_ca_cert_as_pem(path)
            .map_err(|e| anyhow::anyhow!(e.user_message()))
            .with_context(|| format!("Failed to write the root CA certificate to {}", path.display()))?;
        println!("Root CA certificate written to {}", path.display());
    }
    if let Some(path) = &cli.certfulldump {
        extension
            .write_root_ca_cert_and_private_key_as_pem(path)
            .map_err(|e| anyhow::anyhow!(e.user_message()))
            .with_context(|| format!("Failed to write the root CA to {}", path.display()))?;
        println!("Root CA certificate and private key written to {}", path.display());
    }

    Ok(())
}

/// Run every passive rule over a saved message and print the findings as JSON
fn scan_message(path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read message from {}", path.display()))?;
    let msg: HttpMessage = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse message from {}", path.display()))?;

    let findings = PassiveScanner::new().scan(&msg);
    tracing::info!(url = %msg.url(), count = findings.len(), "Passive scan completed");

    let json = serde_json::to_string_pretty(&findings).context("Failed to serialize findings")?;
    println!("{}", json);
    Ok(())
}

/// Serve the API until Ctrl+C, then save the configuration
async fn serve(extension: ExtensionNetwork) -> Result<()> {
    let extension = Arc::new(RwLock::new(extension));
    let mut server = ApiServer::new(NetworkApi::new(extension.clone()));

    let addresses = server.start_local_servers().await?;
    if addresses.is_empty() {
        anyhow::bail!("No local server is enabled for the API");
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    tracing::info!("Received Ctrl+C, shutting down");

    server.stop();
    extension.read().save().context("Failed to save configuration")?;
    Ok(())
}

/// Print a configuration with every option at its default
fn generate_default_config() -> Result<()> {
    let tree = ConfigTree::new();
    let extension = ExtensionNetwork::new(config::shared(tree));
    let toml = extension
        .config()
        .read()
        .to_toml_string()
        .context("Failed to serialize configuration")?;

    println!("{}", toml);
    Ok(())
}
