use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, ValueEnum};
use gcpcost::billing::CloudBillingClient;
use gcpcost::catalog::CatalogCache;
use gcpcost::config::Config;
use gcpcost::estimate::CostEstimator;
use gcpcost::exit_codes::exit_code_for_anyhow;
use gcpcost::machine_specs::MachineSpecTable;
use gcpcost::parser::InstanceParser;
use gcpcost::pricing::PriceResolver;
use gcpcost::report::{render, OutputMode};
use gcpcost::{batch, CostError};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gcpcost")]
#[command(
    about = "Estimate the monthly cost of GCP Compute Engine instance types",
    long_about = "gcpcost parses instance types such as n2-standard-4 into vCPU and RAM,\nlooks up on-demand unit prices in the Cloud Billing catalog, and prints\nthe hourly and monthly cost.\n\nThe SKU catalog and resolved prices are cached on disk for 24 hours."
)]
#[command(version)]
struct Cli {
    /// Instance type, e.g. n2-standard-4
    instance_type: Option<String>,

    /// File with one instance type per line ('#' starts a comment)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Region to price in (default from config, else europe-west2)
    #[arg(long)]
    region: Option<String>,

    /// Print only the monthly cost
    #[arg(short, long)]
    quiet: bool,

    /// With --quiet, prefix each cost with the instance type
    #[arg(long)]
    print_name: bool,

    /// Configuration file path
    #[arg(short, long, env = "GCPCOST_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        if self.quiet {
            OutputMode::Quiet {
                print_name: self.print_name,
            }
        } else {
            match self.output {
                OutputFormat::Text => OutputMode::Text,
                OutputFormat::Json => OutputMode::Json,
            }
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.instance_type.is_none() && cli.file.is_none() {
        Cli::command()
            .error(
                ErrorKind::MissingRequiredArgument,
                "You must provide either an instance_type or a --file argument.",
            )
            .exit();
    }

    // Quiet output must stay machine-readable
    let filter = if cli.quiet {
        EnvFilter::new("off")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if cli.output == OutputFormat::Json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code_for_anyhow(&e));
    }
}

async fn run(cli: Cli) -> Result<()> {
    let instances = batch::collect_instances(cli.instance_type.as_deref(), cli.file.as_deref())?;
    let batch_mode = cli.file.is_some();

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let specs = MachineSpecTable::load(config.machine_specs.as_deref())
        .context("Failed to load machine spec table")?;

    let client = CloudBillingClient::new(&config.gcp)?;
    let catalog = CatalogCache::new(Arc::new(client), &config.cache.dir, &config.gcp.service_id);
    let resolver = PriceResolver::new(catalog, &config.cache.dir);
    let estimator = CostEstimator::new(
        InstanceParser::new(Arc::new(specs)),
        resolver,
        &config.gcp.region,
    );

    let mode = cli.output_mode();
    let region = cli.region.as_deref();
    info!(
        "Estimating {} instance type(s) in {}",
        instances.len(),
        region.unwrap_or(estimator.default_region())
    );

    for instance in &instances {
        match estimator.calculate_cost(instance, region).await {
            Ok(Some(estimate)) => println!("{}", render(&estimate, mode)?),
            Ok(None) => {}
            Err(e) if batch_mode => error!("Failed to price {}: {}", instance, e),
            Err(e) => return Err(fatal(instance, e)),
        }
    }

    Ok(())
}

fn fatal(instance: &str, e: CostError) -> anyhow::Error {
    anyhow::Error::new(e).context(format!("Failed to price {}", instance))
}
