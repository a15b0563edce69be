//! Agent Discovery CLI
//!
//! Runs discovery against the live Dialogflow CX API with a supplied
//! access token, to check what a user's token can list and invoke.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::time::Duration;
use tokio::time::interval;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use agent_discovery::{
    Credential, DiscoveryConfig, DiscoveryOrchestrator, DiscoveryReport, RegionRegistry, Resource,
};

/// Agent Discovery - which Dialogflow CX agents can this user invoke?
#[derive(Parser, Debug)]
#[command(name = "agent-discovery", version, about)]
struct Cli {
    /// OAuth access token used for list and invoke calls
    #[arg(long, env = "DISCOVERY_ACCESS_TOKEN", hide_env_values = true, global = true)]
    access_token: Option<String>,

    /// User id the results are cached under
    #[arg(long, default_value = "cli", env = "DISCOVERY_USER_ID", global = true)]
    user: String,

    /// Comma-separated region codes (overrides DISCOVERY_REGIONS)
    #[arg(long, value_delimiter = ',', global = true)]
    regions: Option<Vec<String>>,

    /// Max concurrent region list calls (0 = unbounded)
    #[arg(long, global = true)]
    list_concurrency: Option<usize>,

    /// Max concurrent access probes (0 = unbounded)
    #[arg(long, global = true)]
    probe_concurrency: Option<usize>,

    /// Print JSON instead of a table
    #[arg(long, default_value = "false", global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the configured regions and their endpoints
    Regions,

    /// Discover agents in a project
    Discover {
        /// Google Cloud project id
        #[arg(long, env = "GOOGLE_CLOUD_PROJECT")]
        project: String,

        /// Only print agents the user may invoke
        #[arg(long, default_value = "false")]
        only_accessible: bool,
    },

    /// Find an agent by its id
    Locate {
        #[arg(long, env = "GOOGLE_CLOUD_PROJECT")]
        project: String,

        /// Trailing agent id (the part after `/agents/`)
        agent_id: String,
    },

    /// Rediscover on an interval, serving from cache between refreshes
    Watch {
        #[arg(long, env = "GOOGLE_CLOUD_PROJECT")]
        project: String,

        /// Seconds between discoveries
        #[arg(long, default_value = "60")]
        interval: u64,

        /// Force a refresh every N rounds (0 = never)
        #[arg(long, default_value = "0")]
        refresh_every: u64,

        /// Stop after this many rounds (0 = run forever)
        #[arg(long, default_value = "0")]
        rounds: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;

    match cli.command {
        Command::Regions => {
            let regions = RegionRegistry::from_config(&config).list_regions();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&regions)?);
            } else {
                for region in regions {
                    println!("{:<20} {}", region.code, region.endpoint());
                }
            }
        }
        Command::Discover {
            project,
            only_accessible,
        } => {
            let credential = credential(cli.access_token)?;
            let orchestrator = DiscoveryOrchestrator::dialogflow(&config)?;

            let mut report = orchestrator
                .discover_detailed(&credential, &cli.user, &project)
                .await?;
            if only_accessible {
                report.resources.retain(|r| r.accessible);
            }

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Command::Locate { project, agent_id } => {
            let credential = credential(cli.access_token)?;
            let orchestrator = DiscoveryOrchestrator::dialogflow(&config)?;

            match orchestrator
                .locate(&credential, &cli.user, &project, &agent_id)
                .await?
            {
                Some(resource) if cli.json => println!("{}", serde_json::to_string_pretty(&resource)?),
                Some(resource) => print_resources(std::slice::from_ref(&resource)),
                None => anyhow::bail!("Agent {} not found in any region of {}", agent_id, project),
            }
        }
        Command::Watch {
            project,
            interval: every,
            refresh_every,
            rounds,
        } => {
            let credential = credential(cli.access_token)?;
            let orchestrator = DiscoveryOrchestrator::dialogflow(&config)?;
            if let Some(sweep) = config.sweep_interval() {
                orchestrator.start_sweeping(sweep);
            }

            watch(&orchestrator, &credential, &cli.user, &project, every, refresh_every, rounds).await?;
            orchestrator.shutdown();
        }
    }

    Ok(())
}

fn build_config(cli: &Cli) -> Result<DiscoveryConfig> {
    let mut config = DiscoveryConfig::from_env().context("Invalid discovery configuration")?;

    if let Some(regions) = &cli.regions {
        config.regions = regions.clone();
    }
    if let Some(limit) = cli.list_concurrency {
        config.list_concurrency = (limit > 0).then_some(limit);
    }
    if let Some(limit) = cli.probe_concurrency {
        config.probe_concurrency = (limit > 0).then_some(limit);
    }

    config.validate().context("Invalid discovery configuration")?;
    Ok(config)
}

fn credential(access_token: Option<String>) -> Result<Credential> {
    let token = access_token.context("--access-token or DISCOVERY_ACCESS_TOKEN is required")?;
    Ok(Credential::bearer(token))
}

async fn watch(
    orchestrator: &DiscoveryOrchestrator,
    credential: &Credential,
    user: &str,
    project: &str,
    every: u64,
    refresh_every: u64,
    rounds: u64,
) -> Result<()> {
    let mut ticker = interval(Duration::from_secs(every.max(1)));
    let mut round = 0u64;

    loop {
        ticker.tick().await;
        round += 1;

        let resources = if refresh_every > 0 && round % refresh_every == 0 {
            orchestrator.refresh(credential, user, project).await?
        } else {
            orchestrator.discover(credential, user, project).await?
        };

        let stats = orchestrator.resource_cache().stats()?;
        let access = orchestrator.access_cache().stats()?;
        info!(
            round,
            resources = resources.len(),
            accessible = resources.iter().filter(|r| r.accessible).count(),
            resource_cache_hits = stats.hits,
            resource_cache_misses = stats.misses,
            access_cache_entries = access.entries,
            "Watch round complete"
        );
        if resources.is_empty() {
            warn!(project = %project, "No agents visible; check token scopes and project id");
        }

        if rounds > 0 && round >= rounds {
            return Ok(());
        }
    }
}

fn print_report(report: &DiscoveryReport) {
    print_resources(&report.resources);
    println!();
    println!(
        "{} agents ({} invocable), {} regions queried, {} failed{}",
        report.resources.len(),
        report.resources.iter().filter(|r| r.accessible).count(),
        report.regions_queried,
        report.regions_failed.len(),
        if report.regions_failed.is_empty() {
            String::new()
        } else {
            format!(": {}", report.regions_failed.join(", "))
        }
    );
}

fn print_resources(resources: &[Resource]) {
    println!("{:<10} {:<18} {:<32} {}", "ACCESS", "REGION", "NAME", "ID");
    for resource in resources {
        println!(
            "{:<10} {:<18} {:<32} {}",
            if resource.accessible { "invoke" } else { "list-only" },
            resource.region_code,
            resource.display_name,
            resource.id
        );
    }
}
