//! devnet-sim - RPC test engine for L1/L2 rollup devnets
//!
//! Boots a private devnet (L1 node, L2 execution engine, rollup node,
//! batcher and optionally a proposer), then runs a catalog of RPC checks
//! against the L2 engine over HTTP and WebSocket under a bounded gate.
//!
//! ## Usage
//!
//! ```bash
//! # Write an example configuration and edit the client commands
//! devnet-sim config init
//!
//! # Bootstrap and run the whole suite
//! devnet-sim run
//!
//! # Only the genesis checks, four at a time, without the launch delay
//! devnet-sim run --filter Genesis -n 4 --launch-delay-ms 0
//!
//! # List available tests
//! devnet-sim list --detailed
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

mod cli;
mod config;
mod devnet;
mod executor;
mod models;
mod output;
mod report;
mod rpc;
mod suite;
mod utils;

use cli::Args;
use config::{AppConfig, ConfigFile, EnvConfig};
use devnet::{ArtifactProvisioner, Bootstrapper, ProcessController};
use executor::{DevnetSessions, Scheduler, SuiteRunner};
use output::{OutputFormat, ResultFormatter};
use report::CollectingReporter;
use utils::logger::{init_logger, LogLevel};

/// Timeout for a single JSON-RPC request made by a check
const RPC_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let env_config = EnvConfig::load();

    let verbose = args.verbose || env_config.verbose.unwrap_or(false);
    let level = match args.log_level.as_deref() {
        Some(level) => level.parse().map_err(anyhow::Error::msg)?,
        None => LogLevel::from_verbose(verbose),
    };
    init_logger(level);

    match args.command {
        cli::Command::Run(run_args) => {
            let success = run_suite(run_args, &env_config).await?;
            if !success {
                std::process::exit(1);
            }
        }
        cli::Command::List(list_args) => {
            list_tests(list_args);
        }
        cli::Command::Config(config_args) => {
            manage_config(config_args, &env_config)?;
        }
    }

    Ok(())
}

/// File, then environment, then command-line flags
fn load_config(args: &cli::RunArgs, env_config: &EnvConfig) -> Result<AppConfig> {
    let path = args
        .config
        .clone()
        .or_else(|| env_config.config_file.clone())
        .map(PathBuf::from)
        .or_else(ConfigFile::find);

    let mut app = match &path {
        Some(path) => {
            info!("Using configuration file {}", path.display());
            ConfigFile::load(path)?.app
        }
        None => {
            warn!("No configuration file found, using defaults");
            AppConfig::default()
        }
    };

    env_config.apply(&mut app);

    if let Some(concurrent) = args.concurrent {
        app.max_concurrent = concurrent;
    }
    if let Some(delay) = args.launch_delay_ms {
        app.launch_delay_ms = delay;
    }
    if let Some(timeout) = args.timeout {
        app.test_timeout_secs = timeout;
    }
    if let Some(dir) = &args.artifacts {
        app.artifacts_dir = PathBuf::from(dir);
    }
    if args.with_proposer {
        app.with_proposer = true;
    }

    anyhow::ensure!(app.max_concurrent > 0, "concurrency must be at least 1");
    Ok(app)
}

async fn run_suite(args: cli::RunArgs, env_config: &EnvConfig) -> Result<bool> {
    let app = load_config(&args, env_config)?;

    let missing = app.missing_clients();
    if !missing.is_empty() {
        let roles: Vec<_> = missing.iter().map(|r| r.to_string()).collect();
        anyhow::bail!(
            "No client command configured for: {}. Run `devnet-sim config init` for an example.",
            roles.join(", ")
        );
    }

    let format_name = args
        .format
        .clone()
        .unwrap_or_else(|| env_config.format_or("table"));
    let format = OutputFormat::from_str(&format_name)
        .ok_or_else(|| anyhow::anyhow!("Unknown output format: {format_name}"))?;

    std::fs::create_dir_all(&app.work_dir)
        .with_context(|| format!("Failed to create work dir {}", app.work_dir.display()))?;

    let controller = ProcessController::new(app.clients.clone(), app.work_dir.clone());
    let provisioner = ArtifactProvisioner::new(app.artifacts_dir.clone())
        .with_deploy_command(app.deploy_command.clone())
        .with_rpc_timeout(RPC_TIMEOUT);
    let bootstrapper = Bootstrapper::new(
        Arc::new(controller),
        Arc::new(provisioner),
        app.bootstrap_config(),
    );

    let reporter = Arc::new(CollectingReporter::new());
    let runner = SuiteRunner::new(
        bootstrapper,
        Scheduler::new(app.max_concurrent, app.launch_delay()),
        Arc::new(DevnetSessions::new(RPC_TIMEOUT)),
        reporter,
    )
    .with_client(app.client_label.clone())
    .with_test_timeout(app.test_timeout());

    let mut catalog = suite::rpc_catalog();
    if let Some(pattern) = &args.filter {
        catalog = catalog.filtered(pattern);
        info!("Filter '{}' selected {} tests", pattern, catalog.len());
    }

    info!(
        "Running {} tests ({} concurrent, {}ms launch delay)",
        catalog.len(),
        app.max_concurrent,
        app.launch_delay_ms
    );

    let report = runner.run(&catalog).await;

    let formatter = ResultFormatter::new(format);
    println!("{}", formatter.format_report(&report));

    if let Some(output) = &args.output {
        output::write_report_to_file(output, &report, format)?;
        info!("Report saved to {}", output);
    }

    Ok(report.is_success())
}

fn list_tests(args: cli::ListArgs) {
    let catalog = suite::rpc_catalog();

    println!("\n{} ({} tests)\n", catalog.name(), catalog.len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut current_prefix = "";

    for (index, spec) in catalog.iter().enumerate() {
        let prefix = spec.name.split('/').next().unwrap_or_default();
        if prefix != current_prefix {
            println!("\n{prefix} Tests:");
            println!("──────────────────────────────────────────────────────────────────────");
            current_prefix = prefix;
        }

        if args.detailed {
            println!("  {:2}. {:32} {}", index + 1, spec.name, spec.description);
        } else {
            println!("  {:2}. {}", index + 1, spec.name);
        }
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
}

fn manage_config(args: cli::ConfigArgs, env_config: &EnvConfig) -> Result<()> {
    match args.action {
        cli::ConfigAction::Init { output, force } => {
            let path = output
                .map(PathBuf::from)
                .unwrap_or_else(config::default_config_path);
            if path.exists() && !force {
                anyhow::bail!(
                    "Configuration file already exists: {}. Use --force to overwrite.",
                    path.display()
                );
            }

            ConfigFile::example().save(&path)?;
            println!("✓ Configuration file created: {}", path.display());
            println!("\nEdit the client commands to point at your node binaries.");
        }

        cli::ConfigAction::Show { file, format } => {
            let mut config = match file.or_else(|| env_config.config_file.clone()) {
                Some(path) => ConfigFile::load(path)?,
                None => ConfigFile::load_default()?,
            };
            env_config.apply(&mut config.app);

            let output = if format == "json" {
                serde_json::to_string_pretty(&config)?
            } else {
                serde_yaml::to_string(&config)?
            };
            println!("{output}");
        }

        cli::ConfigAction::Env => {
            if env_config.has_any() {
                env_config.print_summary();
            } else {
                config::print_env_help();
            }
        }
    }

    Ok(())
}
