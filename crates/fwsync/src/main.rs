// # fwsync - Firewall allow-list sync
//
// Thin integration layer: parses the command line, sets up logging and the
// runtime, registers the compiled-in providers and hands every decision to
// `fwsync_core::FirewallSyncEngine`.
//
// ## Environment
//
// - `FWSYNC_CONFIG`: Path of the local record (default `~/.fwsync`)
// - `FWSYNC_IP_URL`: Public IP echo service (default `https://ipv4.icanhazip.com`)
// - `FWSYNC_LOG_LEVEL`: trace, debug, info, warn (default) or error
// - `GOOGLE_OAUTH_ACCESS_TOKEN`: Bearer token for the google provider
// - `LINODE_TOKEN`: Personal access token for the linode provider
//
// ## Example
//
// ```bash
// export LINODE_TOKEN=...
// fwsync init --provider linode
// fwsync update
// ```

mod cli;
mod paths;
mod prompt;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::env;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{Level, debug, error};
use tracing_subscriber::FmtSubscriber;

use cli::{Cli, Commands, InitArgs};
use fwsync_core::config::EngineConfig;
use fwsync_core::traits::ConfigStore;
use fwsync_core::{
    Error, FileConfigStore, FirewallConfig, FirewallSyncEngine, MemoryConfigStore,
    ProviderRegistry, UpdateOutcome,
};
use fwsync_ip_http::HttpIpSource;
use prompt::Prompter;

/// Exit codes for different termination scenarios
///
/// - 0: Success
/// - 1: Configuration error (missing/malformed/locked record, bad settings)
/// - 2: Runtime error (network, provider, sync)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FwsyncExitCode {
    Success = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<FwsyncExitCode> for ExitCode {
    fn from(code: FwsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

impl FwsyncExitCode {
    /// Classify a failed invocation
    fn for_error(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<Error>() {
            Some(e) if e.is_config_error() => Self::ConfigError,
            Some(_) => Self::RuntimeError,
            // Failures outside the library happen before any remote call
            None => Self::ConfigError,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = env::var("FWSYNC_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string());
    let log_level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => {
            eprintln!(
                "FWSYNC_LOG_LEVEL '{}' is not valid. Valid levels: trace, debug, info, warn, error",
                other
            );
            return FwsyncExitCode::ConfigError.into();
        }
    };

    // Logs go to stderr so command output on stdout stays clean
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return FwsyncExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return FwsyncExitCode::RuntimeError.into();
        }
    };

    let code = rt.block_on(async {
        match run(cli).await {
            Ok(code) => code,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                FwsyncExitCode::for_error(&e)
            }
        }
    });

    code.into()
}

/// Register every provider compiled into this binary
fn build_registry() -> ProviderRegistry {
    let registry = ProviderRegistry::new();

    #[cfg(feature = "gcp")]
    fwsync_provider_gcp::register(&registry);

    #[cfg(feature = "linode")]
    fwsync_provider_linode::register(&registry);

    debug!("Registered providers: {:?}", registry.list_providers());
    registry
}

fn build_engine(store: Box<dyn ConfigStore>, ip_url: &str) -> Result<FirewallSyncEngine> {
    let ip_source = HttpIpSource::new(ip_url)?;
    Ok(FirewallSyncEngine::new(
        store,
        Box::new(ip_source),
        build_registry(),
        EngineConfig::default(),
    ))
}

fn record_path(cli: &Cli) -> Result<PathBuf> {
    paths::record_path(cli.config.clone()).map_err(|e| anyhow!(e))
}

/// Open the existing record for a command that needs one
async fn open_engine(cli: &Cli) -> Result<FirewallSyncEngine> {
    let path = record_path(cli)?;
    let store = FileConfigStore::open(&path).await?;
    build_engine(Box::new(store), &cli.ip_url)
}

async fn run(cli: Cli) -> Result<FwsyncExitCode> {
    match &cli.command {
        Commands::Init(args) => return init(&cli, args).await,
        Commands::Update => {
            let engine = open_engine(&cli).await?;
            match engine.update().await {
                Ok(UpdateOutcome::Unchanged { .. }) => {
                    println!("IPs are up-to-date, skipping sync.");
                }
                Ok(UpdateOutcome::Synced { .. }) => {
                    println!("syncing firewall rule");
                }
                Err(e @ Error::Sync(_)) => {
                    println!("syncing firewall rule");
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Sync => {
            let engine = open_engine(&cli).await?;
            println!("syncing firewall rule");
            engine.sync().await?;
        }
        Commands::List => {
            let engine = open_engine(&cli).await?;
            let listing = engine.list().await?;
            println!("fwsync configurations");
            println!("----------------------");
            println!("local: ({})", listing.location);
            for ip in &listing.local {
                println!("{}", ip);
            }
            println!();
            println!("remote: ({})", listing.name);
            for ip in &listing.remote {
                println!("{}", ip);
            }
        }
        Commands::GetIp => {
            // No record needed to look up the address
            let engine = build_engine(Box::new(MemoryConfigStore::new()), &cli.ip_url)?;
            let ip = engine.current_ip().await?;
            println!("current public IP: {}", ip);
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(FwsyncExitCode::Success)
}

async fn init(cli: &Cli, args: &InitArgs) -> Result<FwsyncExitCode> {
    if args.provider == "google" && args.project.as_deref().is_none_or(str::is_empty) {
        return Err(Error::config("the provider: google requires the --project argument").into());
    }
    if args.provider != "google" && args.project.is_some() {
        tracing::warn!("--project is ignored by the {} provider", args.provider);
    }

    let path = record_path(cli)?;
    let stdin = io::stdin();
    let mut prompter = Prompter::new(stdin.lock(), io::stdout());

    if path.exists() && !prompter.confirm_overwrite()? {
        return Ok(FwsyncExitCode::Success);
    }

    let store = FileConfigStore::create(&path)
        .await
        .with_context(|| format!("failed to prepare {}", path.display()))?;
    let engine = build_engine(Box::new(store), &cli.ip_url)?;

    let mut seed = FirewallConfig::new()
        .with_provider(args.provider.clone())
        .with_ip_limit(args.ip_limit);
    if let Some(ref project) = args.project {
        seed = seed.with_project(project.clone());
    }

    let outcome = engine.initialize(seed, &mut prompter).await;
    match outcome {
        Ok(outcome) => {
            println!("IP determined to be: {}", outcome.ip);
            println!("syncing firewall rule");
            Ok(FwsyncExitCode::Success)
        }
        Err(e @ Error::Sync(_)) => {
            println!("syncing firewall rule");
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}
