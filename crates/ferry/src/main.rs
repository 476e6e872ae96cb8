//! Ferry: Clerk to WorkOS identity migration
//!
//! Subcommands:
//! - `users`, `organizations`: migrate one snapshot file, write its translation artifact
//! - `memberships`: migrate memberships using the user and organization artifacts
//! - `snapshot`: export users, organizations and memberships from Clerk
//! - `full-cycle`: snapshot, then all three jobs in dependency order

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use ferry_clerk::{ClerkClient, SnapshotPaths, export_snapshot};
use ferry_pipeline::{ExecutorConfig, executor::SAFETY_MARGIN};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cycle;
mod jobs;

/// Parse boolean from environment variable, accepting common truthy values.
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true.
/// Accepts "0", "false", "no", "off", "" (case-insensitive) as false.
fn parse_bool_env(s: &str) -> Result<bool, String> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(format!(
            "invalid boolean value '{}', expected 1/true/yes/on or 0/false/no/off",
            s
        )),
    }
}

#[derive(Parser)]
#[command(name = "ferry")]
#[command(about = "Migrate identity records from Clerk to WorkOS", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Destination platform settings.
#[derive(Args)]
struct WorkosArgs {
    /// WorkOS API key
    #[arg(long, env = "WORKOS_SECRET_KEY", hide_env_values = true)]
    workos_secret_key: Option<String>,

    /// WorkOS API base URL (point at a local mock to test)
    #[arg(long, env = "WORKOS_API_URL", default_value = ferry_workos::DEFAULT_API_URL)]
    workos_api_url: String,

    /// Write to an in-memory directory instead of WorkOS (not for standalone memberships)
    #[arg(
        long,
        env = "FERRY_DRY_RUN",
        value_parser = parse_bool_env,
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true"
    )]
    dry_run: bool,
}

/// Source platform settings.
#[derive(Args)]
struct ClerkArgs {
    /// Clerk secret key
    #[arg(long, env = "CLERK_SECRET_KEY", hide_env_values = true)]
    clerk_secret_key: Option<String>,

    /// Clerk backend API base URL
    #[arg(long, env = "CLERK_API_URL", default_value = ferry_clerk::DEFAULT_API_URL)]
    clerk_api_url: String,
}

/// Executor tuning.
#[derive(Args)]
struct ExecutorArgs {
    /// Maximum destination requests in flight
    #[arg(long, default_value = "10")]
    max_concurrency: usize,

    /// Seconds to back off when a rate limit carries no Retry-After
    #[arg(long, default_value = "10")]
    default_retry_after: u64,
}

impl ExecutorArgs {
    fn config(&self) -> ExecutorConfig {
        ExecutorConfig {
            max_concurrency: self.max_concurrency,
            default_retry_after: Duration::from_secs(self.default_retry_after),
            safety_margin: SAFETY_MARGIN,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate users from a snapshot file
    Users {
        /// Users snapshot (newline-delimited JSON)
        #[arg(long)]
        input: PathBuf,

        /// Where to write the user translation artifact
        #[arg(long)]
        output: PathBuf,

        #[command(flatten)]
        workos: WorkosArgs,

        #[command(flatten)]
        executor: ExecutorArgs,
    },

    /// Migrate organizations from a snapshot file
    Organizations {
        /// Organizations snapshot (newline-delimited JSON)
        #[arg(long)]
        input: PathBuf,

        /// Where to write the organization translation artifact
        #[arg(long)]
        output: PathBuf,

        #[command(flatten)]
        workos: WorkosArgs,

        #[command(flatten)]
        executor: ExecutorArgs,
    },

    /// Migrate organization memberships (run after users and organizations)
    Memberships {
        /// Memberships snapshot (newline-delimited JSON)
        #[arg(long)]
        input: PathBuf,

        /// Translation artifact written by the users job
        #[arg(long)]
        users: PathBuf,

        /// Translation artifact written by the organizations job
        #[arg(long)]
        organizations: PathBuf,

        /// Where to write the membership translation artifact
        #[arg(long)]
        output: PathBuf,

        #[command(flatten)]
        workos: WorkosArgs,

        #[command(flatten)]
        executor: ExecutorArgs,
    },

    /// Export a snapshot from Clerk
    Snapshot {
        #[command(flatten)]
        clerk: ClerkArgs,

        /// Users output file
        #[arg(long, default_value = "data/snapshot/users.ndjson")]
        users: PathBuf,

        /// Organizations output file
        #[arg(long, default_value = "data/snapshot/organizations.ndjson")]
        organizations: PathBuf,

        /// Also export memberships of every organization to this file
        #[arg(long)]
        memberships: Option<PathBuf>,
    },

    /// Export a snapshot and run every job in dependency order
    FullCycle {
        /// Directory for the snapshot and translation artifacts
        #[arg(long, default_value = "data")]
        dir: PathBuf,

        /// Reuse the snapshot already in --dir instead of exporting
        #[arg(long)]
        skip_snapshot: bool,

        #[command(flatten)]
        clerk: ClerkArgs,

        #[command(flatten)]
        workos: WorkosArgs,

        #[command(flatten)]
        executor: ExecutorArgs,
    },
}

fn clerk_client(args: &ClerkArgs) -> Result<ClerkClient> {
    let secret_key = args
        .clerk_secret_key
        .as_deref()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| miette::miette!("CLERK_SECRET_KEY is required to export a snapshot"))?;
    ClerkClient::new(&args.clerk_api_url, secret_key)
        .map_err(|e| miette::miette!("failed to create Clerk client: {}", e))
}

fn directory(args: &WorkosArgs) -> Result<std::sync::Arc<dyn ferry_workos::Directory>> {
    jobs::directory(
        &args.workos_api_url,
        args.workos_secret_key.as_deref(),
        args.dry_run,
    )
}

/// Memberships resolve destination ids through earlier jobs' artifacts. A
/// fresh in-memory directory holds none of them, so dry runs of memberships
/// only work inside `full-cycle`, where all three jobs share one directory.
fn membership_directory(args: &WorkosArgs) -> Result<std::sync::Arc<dyn ferry_workos::Directory>> {
    if args.dry_run {
        return Err(miette::miette!(
            "--dry-run is not supported by the standalone memberships command; use `ferry full-cycle --dry-run`"
        ));
    }
    directory(args)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "ferry=info,ferry_pipeline=info,ferry_clerk=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Users {
            input,
            output,
            workos,
            executor,
        } => {
            jobs::migrate_users(directory(&workos)?, executor.config(), &input, &output).await?;
            Ok(())
        }

        Commands::Organizations {
            input,
            output,
            workos,
            executor,
        } => {
            jobs::migrate_organizations(directory(&workos)?, executor.config(), &input, &output)
                .await?;
            Ok(())
        }

        Commands::Memberships {
            input,
            users,
            organizations,
            output,
            workos,
            executor,
        } => {
            jobs::migrate_memberships(
                membership_directory(&workos)?,
                executor.config(),
                &input,
                &users,
                &organizations,
                &output,
            )
            .await?;
            Ok(())
        }

        Commands::Snapshot {
            clerk,
            users,
            organizations,
            memberships,
        } => {
            let client = clerk_client(&clerk)?;
            let paths = SnapshotPaths {
                users,
                organizations,
                memberships,
            };
            let counts = export_snapshot(&client, &paths)
                .await
                .map_err(|e| miette::miette!("snapshot export failed: {}", e))?;
            tracing::info!(
                users = counts.users,
                organizations = counts.organizations,
                memberships = counts.memberships,
                "snapshot complete"
            );
            Ok(())
        }

        Commands::FullCycle {
            dir,
            skip_snapshot,
            clerk,
            workos,
            executor,
        } => {
            let source = if skip_snapshot {
                None
            } else {
                Some(clerk_client(&clerk)?)
            };
            let layout = cycle::CycleLayout::new(dir);
            let report = cycle::run(
                source.as_ref(),
                directory(&workos)?,
                executor.config(),
                &layout,
            )
            .await?;

            for job in [&report.users, &report.organizations, &report.memberships] {
                tracing::info!("{}", job.summary());
            }
            Ok(())
        }
    }
}
