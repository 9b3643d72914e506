use anyhow::Context;
use casket_auth::authentication::password::hash_password;
use casket_server::config::AppConfig;
use casket_server::config::loader::{DEFAULT_CONFIG_PATH, load_config};
use casket_server::observability::{LogLevelHandle, init_tracing};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "casket-server")]
#[command(about = "Casket single sign-on ticket server")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "CASKET_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server (default)
    Serve,
    /// Print the Argon2 hash of a password for the `users` table
    HashPassword {
        /// Password to hash
        password: String,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    let cli = Cli::parse();

    if let Some(Commands::HashPassword { password }) = &cli.command {
        match hash_password(password) {
            Ok(hash) => println!("{hash}"),
            Err(e) => {
                eprintln!("Hashing failed: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    let cfg = match load_config(Some(&cli.config)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };
    let rust_log = std::env::var("RUST_LOG").ok();
    let log_level = match init_tracing(&cfg.logging, rust_log.as_deref()) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Logging setup failed: {e:#}");
            std::process::exit(2);
        }
    };
    tracing::info!(path = %cli.config, level = %cfg.logging.level, "Configuration loaded");

    if let Err(e) = serve(&cfg, &cli.config, log_level).await {
        eprintln!("Server error: {e:#}");
        std::process::exit(1);
    }
}

async fn serve(cfg: &AppConfig, config_path: &str, log_level: LogLevelHandle) -> anyhow::Result<()> {
    reload_logging_on_hangup(config_path.to_string(), log_level)?;
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };
    casket_server::run(cfg, shutdown)
        .await
        .context("casket server terminated abnormally")
}

/// Re-reads the configuration file on SIGHUP and applies its `logging` section.
#[cfg(unix)]
fn reload_logging_on_hangup(path: String, log_level: LogLevelHandle) -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup()).context("failed to listen for SIGHUP")?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            let cfg = match load_config(Some(&path)) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!(error = %e, "Configuration reload failed; log level unchanged");
                    continue;
                }
            };
            match log_level.apply(&cfg.logging) {
                Ok(true) => tracing::info!(level = %cfg.logging.level, "Log level reloaded"),
                Ok(false) => tracing::info!("RUST_LOG is set; ignoring logging.level"),
                Err(e) => tracing::warn!(error = %e, "Log level reload failed"),
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn reload_logging_on_hangup(_path: String, _log_level: LogLevelHandle) -> anyhow::Result<()> {
    Ok(())
}
