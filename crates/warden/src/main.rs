//! Certwarden - Main entry point
//!
//! Tracks TLS certificates, renews them before expiry and escalates
//! renewal problems to operators.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use futures::future::join_all;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use certwarden::{
    build_channels, CertError, CertificateManager, CertificateRegistry, EscalationManager,
    FileCertificateStore, RenewalPolicy, SelfSignedCa, WardenMetrics,
};
use certwarden_config::validate::validate_stored_certificates;
use certwarden_config::Config;

/// Certwarden - certificate lifecycle manager with failure escalation
#[derive(Parser, Debug)]
#[command(name = "certwarden")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long = "config", env = "CERTWARDEN_CONFIG")]
    config: Option<String>,

    /// Test configuration and exit
    #[arg(short = 't', long = "test")]
    test: bool,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose")]
    verbose: bool,

    /// Log output format
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate configuration file and exit
    Test {
        /// Configuration file to test
        #[arg(short = 'c', long = "config")]
        config: Option<String>,
    },
    /// Run one renewal scan, wait for it, and print certificate status
    Check {
        /// Configuration file path
        #[arg(short = 'c', long = "config")]
        config: Option<String>,
    },
    /// Run the renewal scheduler until interrupted (default)
    Run {
        /// Configuration file path
        #[arg(short = 'c', long = "config")]
        config: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    if cli.test {
        return test_config(cli.config.as_deref());
    }

    match cli.command {
        Some(Commands::Test { config }) => test_config(config.as_deref().or(cli.config.as_deref())),
        Some(Commands::Check { config }) => check_once(config.or(cli.config)),
        Some(Commands::Run { config }) => run(config.or(cli.config)),
        None => run(cli.config),
    }
}

fn init_logging(verbose: bool, format: LogFormat) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

fn load_config(config_path: Option<&str>) -> Result<Config> {
    let config = match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            Config::from_file(path).context("Failed to load configuration file")?
        }
        None => {
            info!("No configuration specified, using defaults");
            Config::default()
        }
    };

    config.validate().context("Configuration validation failed")?;
    Ok(config)
}

/// Test configuration file and exit
fn test_config(config_path: Option<&str>) -> Result<()> {
    let config = load_config(config_path)?;

    info!("Configuration test successful:");
    info!("  - {} certificate(s)", config.certificates.len());
    info!("  - {} notification channel(s)", config.notifications.channels.len());
    info!("  - storage at {}", config.storage.path.display());

    let result = validate_stored_certificates(&config, Utc::now());
    for warning in &result.warnings {
        warn!("{}", warning);
    }
    for error in &result.errors {
        error!("{}", error);
    }
    if !result.is_valid() {
        anyhow::bail!(
            "{} stored certificate problem(s) found",
            result.errors.len()
        );
    }

    println!(
        "certwarden: configuration file {} test is successful",
        config_path.unwrap_or("(defaults)")
    );
    Ok(())
}

/// Wired-up managers for one process
struct Warden {
    manager: Arc<CertificateManager>,
    escalation: Arc<EscalationManager>,
    metrics: Arc<WardenMetrics>,
}

async fn bootstrap(config: &Config) -> Result<Warden> {
    let metrics = Arc::new(WardenMetrics::new()?);
    let registry = Arc::new(CertificateRegistry::new());

    let channels = build_channels(&config.notifications, config.escalation.notify_timeout())
        .context("Failed to build notification channels")?;
    let escalation = Arc::new(
        EscalationManager::new(config.escalation.clone())
            .with_channels(channels)
            .with_registry(registry.clone())
            .with_metrics(metrics.clone())
            .with_retry_interval(config.manager.check_interval()),
    );

    let store = FileCertificateStore::new(&config.storage.path)
        .context("Failed to open certificate storage")?;
    let manager = Arc::new(
        CertificateManager::new(
            config.manager.clone(),
            registry,
            Arc::new(SelfSignedCa::new()),
            Arc::new(store),
        )
        .with_escalation_hook(escalation.clone())
        .with_metrics(metrics.clone()),
    );

    for entry in &config.certificates {
        let policy = RenewalPolicy::from(entry);
        match manager.load_from_store(&entry.domain, policy.clone()) {
            Ok(info) => {
                info!(
                    domain = %entry.domain,
                    expires_at = %info.expires_at,
                    days_remaining = info.days_remaining,
                    "Loaded certificate from storage"
                );
            }
            Err(CertError::NotFound(_)) | Err(CertError::InvalidCertificate { .. }) => {
                info!(domain = %entry.domain, "No usable stored certificate, issuing");
                if let Err(e) = manager.issue_certificate(&entry.domain, policy).await {
                    error!(domain = %entry.domain, error = %e, "Initial issuance failed");
                }
            }
            Err(e) => {
                error!(domain = %entry.domain, error = %e, "Failed to load certificate");
            }
        }
    }

    Ok(Warden {
        manager,
        escalation,
        metrics,
    })
}

/// Feed expiry warnings into escalation on every check interval
async fn watch_expiry(warden: Arc<Warden>, period: Duration, token: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => check_expiry(&warden).await,
        }
    }
}

async fn check_expiry(warden: &Warden) {
    for domain in warden.manager.domains() {
        let info = warden.manager.certificate_info(&domain);
        if let Err(e) = warden
            .escalation
            .check_expiration(&domain, info.as_ref())
            .await
        {
            debug!(domain = %domain, error = %e, "Skipped expiry check");
        }
    }
}

/// Run the scheduler until ctrl-c
fn run(config_path: Option<String>) -> Result<()> {
    let config = load_config(config_path.as_deref())?;
    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async {
        let warden = Arc::new(bootstrap(&config).await?);
        let token = CancellationToken::new();

        let scan = warden.manager.start_auto_renewal(token.clone());
        let expiry = tokio::spawn(watch_expiry(
            warden.clone(),
            config.manager.check_interval(),
            token.clone(),
        ));

        info!(
            certificates = warden.manager.domains().len(),
            auto_renewal = scan.is_some(),
            "Certwarden started"
        );

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
        info!("Received shutdown signal, initiating graceful shutdown");

        token.cancel();
        if let Some(scan) = scan {
            scan.await.context("Renewal scheduler panicked")?;
        }
        expiry.await.context("Expiry watcher panicked")?;

        let stats = warden.escalation.stats();
        info!(
            escalations = stats.total_escalations,
            resolutions = stats.resolutions,
            active = stats.active,
            "Certwarden stopped"
        );
        Ok::<(), anyhow::Error>(())
    })
}

/// One scan pass, then print a status table
fn check_once(config_path: Option<String>) -> Result<()> {
    let config = load_config(config_path.as_deref())?;
    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async {
        let warden = bootstrap(&config).await?;
        let token = CancellationToken::new();

        let tasks = warden.manager.scan_once(&token);
        for task in &tasks {
            info!(domain = %task.domain, "Waiting for renewal");
        }
        for result in join_all(tasks.into_iter().map(|task| task.handle)).await {
            if let Err(e) = result {
                error!(error = %e, "Renewal task panicked");
            }
        }
        check_expiry(&warden).await;

        println!(
            "{:<40} {:<10} {:>6} {:>9}",
            "DOMAIN", "STATUS", "DAYS", "ATTEMPTS"
        );
        for domain in warden.manager.domains() {
            if let Some(info) = warden.manager.certificate_info(&domain) {
                println!(
                    "{:<40} {:<10} {:>6} {:>9}",
                    info.domain, info.status.as_str(), info.days_remaining, info.renewal_attempts
                );
            }
        }

        let stats = warden.escalation.stats();
        println!(
            "\nescalations: {} active, {} total, {} resolved",
            stats.active, stats.total_escalations, stats.resolutions
        );
        debug!("{}", warden.metrics.gather_text()?);
        Ok::<(), anyhow::Error>(())
    })
}
