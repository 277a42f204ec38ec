use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use reapctl::aws;
use reapctl::config::{self, Config};
use reapctl::cycle::run_check_cycle;
use reapctl::ec2::Ec2Inventory;
use reapctl::metrics::CloudWatchSource;
use reapctl::report;
use reapctl::scheduler::{self, Schedule};

#[derive(Parser)]
#[command(name = "reapctl")]
#[command(
    about = "Cost-control agent that terminates idle EC2 instances",
    long_about = "reapctl inspects the account's EC2 instances, reads their recent average CPU\nutilization from CloudWatch, and terminates instances that are below the\nconfigured threshold and not exempted by tag (Debug=yes by default).\n\nCommands:\n  - run: one check cycle now\n  - watch: check cycles at the configured times of day\n  - list: inventory overview\n  - init: write a default config file"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(long, global = true, default_value = "text")]
    output: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one check cycle now
    Run {
        /// Record termination decisions without terminating anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Run check cycles at the configured times of day
    Watch {
        /// Record termination decisions without terminating anything
        #[arg(long)]
        dry_run: bool,
    },
    /// List the account's instances
    List {
        /// Also fetch CPU utilization for running instances
        #[arg(long)]
        cpu: bool,
    },
    /// Initialize configuration
    Init {
        /// Output path for config file
        #[arg(short, long, default_value = ".reapctl.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging - the per-instance trace is the observability surface,
    // so INFO is on by default
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Load config
    let config = Config::load(cli.config.as_deref())?;

    // Execute command
    match cli.command {
        Commands::Init { output } => {
            config::init_config(&output)?;
        }
        Commands::Run { dry_run } => {
            let policy = config.check_policy()?;
            let sdk_config = aws::load_sdk_config(&config.aws).await;
            let inventory = Ec2Inventory::new(aws_sdk_ec2::Client::new(&sdk_config));
            let metrics = CloudWatchSource::new(aws_sdk_cloudwatch::Client::new(&sdk_config));

            let cycle_report = run_check_cycle(&inventory, &metrics, &policy, dry_run).await?;
            report::print_report(&cycle_report, &cli.output)?;
        }
        Commands::Watch { dry_run } => {
            let policy = config.check_policy()?;
            let schedule = Schedule::parse(&config.schedule.times)?;
            let sdk_config = aws::load_sdk_config(&config.aws).await;
            let inventory = Ec2Inventory::new(aws_sdk_ec2::Client::new(&sdk_config));
            let metrics = CloudWatchSource::new(aws_sdk_cloudwatch::Client::new(&sdk_config));

            scheduler::run_daemon(&inventory, &metrics, &policy, &schedule, dry_run).await?;
        }
        Commands::List { cpu } => {
            let policy = config.check_policy()?;
            let sdk_config = aws::load_sdk_config(&config.aws).await;
            let inventory = Ec2Inventory::new(aws_sdk_ec2::Client::new(&sdk_config));
            let metrics = CloudWatchSource::new(aws_sdk_cloudwatch::Client::new(&sdk_config));

            report::show_inventory(&inventory, &metrics, &policy, cpu, &cli.output).await?;
        }
    }

    Ok(())
}
