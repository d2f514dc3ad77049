//! podfw - PodNet firewall builder
//!
//! Compiles a JSON firewall policy into one nftables `table inet` document
//! and deploys it into a network namespace on both PodNet nodes.
//!
//! # Usage
//!
//! ```bash
//! podfw check policy.json ns1100 fw            # Validate and assemble only
//! podfw check policy.json ns1100 fw --nft      # ...and run nft --check locally
//! podfw render policy.json ns1100 fw           # Print the document
//! podfw build policy.json ns1100 fw            # Deploy to enabled, then disabled node
//! podfw scrub ns1100 fw                        # Delete the table on both nodes
//! podfw read ns1100 fw --diff                  # Show both tables and their differences
//! podfw config --init                          # Write the default settings file
//! podfw audit -n 5                             # Show the five most recent audit events
//! ```
//!
//! Node addresses come from the topology file (`--topology`, or the
//! `topology_path` setting). Remote commands run over ssh as the configured
//! user.

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{Level, info};
use uuid::Uuid;

use podfw::audit;
use podfw::config::{self, AppConfig};
use podfw::core::assemble::{assemble, build_document};
use podfw::core::classify::classify;
use podfw::core::deploy::HaDeployer;
use podfw::core::policy::{PolicySpec, Target};
use podfw::core::topology::Topology;
use podfw::core::verify::verify_document;
use podfw::remote::SshExecutor;
use podfw::validators::validate_policy;
use podfw::{Error, Result};

shadow_rs::shadow!(build);

#[derive(Parser)]
#[command(name = "podfw")]
#[command(version = build::CLAP_LONG_VERSION)]
#[command(about = "Build nftables firewalls on PodNet node pairs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (default: ~/.local/share/podfw/config.json)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Node topology file, overrides the `topology_path` setting
    #[arg(short, long, global = true, value_name = "PATH")]
    topology: Option<PathBuf>,

    /// Debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

/// Where the firewall goes
#[derive(Args)]
struct TargetArgs {
    /// Network namespace on the nodes
    namespace: String,
    /// nftables table name
    table: String,
    /// Base chain priority (default: `default_priority` setting)
    #[arg(short, long, allow_negative_numbers = true)]
    priority: Option<i32>,
}

impl TargetArgs {
    fn resolve(self, config: &AppConfig) -> Target {
        Target::new(
            self.namespace,
            self.table,
            self.priority.unwrap_or(config.default_priority),
        )
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a policy and assemble its document without contacting the nodes
    Check {
        /// Policy file (JSON with rules, sets, nats)
        policy: PathBuf,
        #[command(flatten)]
        target: TargetArgs,
        /// Also run the document through the local `nft --check`
        #[arg(long)]
        nft: bool,
    },
    /// Print the assembled document
    Render {
        policy: PathBuf,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Deploy the policy to the enabled node, then the disabled node
    Build {
        policy: PathBuf,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Delete the table on both nodes
    Scrub {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Show the table as currently loaded on both nodes
    Read {
        #[command(flatten)]
        target: TargetArgs,
        /// Show a line diff from the enabled node to the disabled node
        #[arg(long)]
        diff: bool,
    },
    /// Show the effective settings
    Config {
        /// Write the effective settings (defaults filled in) to the settings file
        #[arg(long)]
        init: bool,
    },
    /// Show recent audit log entries, newest first
    Audit {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value_t = 20)]
        count: usize,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to create Tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(handle_cli(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            if let Error::Deploy(failure) = &e
                && failure.is_channel()
            {
                eprintln!(
                    "Could not reach {}; check ssh access before retrying",
                    failure.node.host
                );
            }
            ExitCode::from(e.exit_status())
        }
    }
}

async fn load_settings(path: Option<&Path>) -> AppConfig {
    match path {
        Some(path) => config::load_config_from(path).await,
        None => config::load_config().await,
    }
}

async fn load_topology(cli_path: Option<PathBuf>, config: &AppConfig) -> Result<Topology> {
    let path = cli_path.unwrap_or_else(|| config.topology_path.clone());
    let topology = Topology::load(&path).await?;
    info!(
        "Topology {}: enabled {}, disabled {}",
        topology.source, topology.enabled.host, topology.disabled.host
    );
    Ok(topology)
}

async fn handle_cli(cli: Cli) -> Result<ExitCode> {
    let config = load_settings(cli.config.as_deref()).await;
    let run_id = Uuid::new_v4();

    match cli.command {
        Commands::Check { policy, target, nft } => {
            let target = target.resolve(&config);
            let spec = PolicySpec::load(&policy).await?;
            let validated = match validate_policy(&spec) {
                Ok(validated) => validated,
                Err(report) => {
                    audit::log_check(run_id, spec.rules.len(), false, Some(report.to_string()))
                        .await;
                    return Err(report.into());
                }
            };
            let document = assemble(&validated, &target)?;

            let chains = classify(&validated.rules);
            println!(
                "✓ Policy valid: {} rules (input {}, forward {}, output {}), {} sets, {} NAT mappings",
                validated.rules.len(),
                chains.input.len(),
                chains.forward.len(),
                chains.output.len(),
                validated.sets.len(),
                validated.nats.len()
            );
            println!("  Document checksum: {}", document.checksum());

            if nft {
                let result = verify_document(&document).await?;
                audit::log_check(
                    run_id,
                    validated.rules.len(),
                    result.success,
                    (!result.success).then(|| result.errors.join("; ")),
                )
                .await;
                if !result.success {
                    return Err(Error::Assembly(format!(
                        "nft --check rejected the document:\n{}",
                        result.errors.join("\n")
                    )));
                }
                println!("✓ nft --check passed");
            } else {
                audit::log_check(run_id, validated.rules.len(), true, None).await;
            }
        }
        Commands::Render { policy, target } => {
            let target = target.resolve(&config);
            let spec = PolicySpec::load(&policy).await?;
            let document = build_document(&spec, &target)?;
            print!("{document}");
        }
        Commands::Build { policy, target } => {
            let target = target.resolve(&config);
            let spec = PolicySpec::load(&policy).await?;
            let document = build_document(&spec, &target)?;
            let topology = load_topology(cli.topology, &config).await?;

            info!(%run_id, checksum = document.checksum(), "Starting build");
            let executor = SshExecutor::from_config(&config);
            let deployer = HaDeployer::new(&executor, &topology, &config.temp_dir);

            match deployer.build(&document, &target).await {
                Ok(outcome) => {
                    audit::log_build(run_id, &target, document.checksum(), true, None).await;
                    println!("✓ {}", outcome.message);
                }
                Err(e) => {
                    audit::log_build(run_id, &target, document.checksum(), false, Some(e.to_string()))
                        .await;
                    return Err(e);
                }
            }
        }
        Commands::Scrub { target } => {
            let target = target.resolve(&config);
            let topology = load_topology(cli.topology, &config).await?;

            info!(%run_id, "Starting scrub");
            let executor = SshExecutor::from_config(&config);
            let deployer = HaDeployer::new(&executor, &topology, &config.temp_dir);

            match deployer.scrub(&target).await {
                Ok(outcome) => {
                    audit::log_scrub(run_id, &target, true, None).await;
                    println!("✓ {}", outcome.message);
                }
                Err(e) => {
                    audit::log_scrub(run_id, &target, false, Some(e.to_string())).await;
                    return Err(e);
                }
            }
        }
        Commands::Read { target, diff } => {
            let target = target.resolve(&config);
            let topology = load_topology(cli.topology, &config).await?;

            let executor = SshExecutor::from_config(&config);
            let deployer = HaDeployer::new(&executor, &topology, &config.temp_dir);
            let report = deployer.read(&target).await;
            let difference = report.diff(&topology);
            audit::log_read(run_id, &target, report.success, difference.is_some()).await;

            for node in topology.nodes() {
                println!("# {node}");
                match report.data.get(&node.host) {
                    Some(table) => print!("{table}"),
                    None => println!("(unavailable)"),
                }
                println!();
            }
            for message in &report.messages {
                eprintln!("{message}");
            }

            if diff {
                match difference {
                    Some(text) => {
                        println!("# diff {} -> {}", topology.enabled.host, topology.disabled.host);
                        print!("{text}");
                    }
                    None if report.success => println!("✓ Both nodes hold identical tables"),
                    None => {}
                }
            }

            if !report.success {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Config { init } => {
            if init {
                let path = match cli.config.as_deref() {
                    Some(path) => {
                        config::save_config_to(&config, path).await?;
                        path.to_path_buf()
                    }
                    None => {
                        podfw::utils::ensure_dirs()?;
                        config::save_config(&config).await?
                    }
                };
                println!("✓ Settings written to {}", path.display());
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Audit { count } => {
            let log = audit::AuditLog::new()?;
            match log.read_recent(count).await {
                Ok(events) => {
                    for event in &events {
                        println!("{}", event.summary());
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    println!("No audit log at {}", log.path().display());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
