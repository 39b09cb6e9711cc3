//! Featuresync CLI
//!
//! Drives the reconciliation engine against a JSON graph snapshot:
//! - `plan`: print the operation tree an input would produce
//! - `apply`: execute it and write the updated snapshot
//! - `get`: resolve an attribute path and print the value as JSON

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use featuresync_engine::{EngineConfig, EntityKey, ExecutionReport, FeatureAttributes, MemoryGraph};
use featuresync_model::FeatureSchema;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod files;

#[derive(Parser)]
#[command(name = "featuresync")]
#[command(
    author,
    version,
    about = "Featuresync: reconcile nested attribute trees with an entity graph"
)]
struct Cli {
    /// Increase log output (-v debug, -vv trace). `FEATURESYNC_LOG` wins when set.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Engine configuration file (JSON).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Target {
    /// Feature schema (JSON).
    #[arg(long)]
    schema: PathBuf,
    /// Graph snapshot (JSON).
    #[arg(long)]
    graph: PathBuf,
    /// Key of the feature entity, `3` or `#3`.
    #[arg(long)]
    entity: EntityKey,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the operation tree for an input without writing anything.
    Plan {
        #[command(flatten)]
        target: Target,
        /// Attribute tree (JSON object of name to value).
        #[arg(long)]
        input: PathBuf,
    },

    /// Apply an input and write the updated graph snapshot.
    Apply {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        input: PathBuf,
        /// Output snapshot; defaults to overwriting `--graph`.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Resolve an attribute path (`owner.name`, `owner/name`) and print it.
    Get {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        path: String,
    },
}

struct Loaded {
    schema: FeatureSchema,
    graph: MemoryGraph,
    entity: EntityKey,
}

impl Target {
    fn load(&self) -> Result<Loaded> {
        let schema = files::load_schema(&self.schema)?;
        let graph = files::load_graph(&self.graph)?;
        debug!(
            schema = %schema.name,
            entities = graph.len(),
            entity = %self.entity,
            "loaded schema and graph"
        );
        Ok(Loaded {
            schema,
            graph,
            entity: self.entity,
        })
    }
}

fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_env("FEATURESYNC_LOG").unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = files::load_config(cli.config.as_deref())?;
    debug!(?config, "engine config");

    match cli.command {
        Commands::Plan { target, input } => cmd_plan(&config, &target, &input),
        Commands::Apply { target, input, out } => {
            let out = out.unwrap_or_else(|| target.graph.clone());
            cmd_apply(&config, &target, &input, &out)
        }
        Commands::Get { target, path } => cmd_get(&config, &target, &path),
    }
}

fn cmd_plan(config: &EngineConfig, target: &Target, input: &PathBuf) -> Result<()> {
    let loaded = target.load()?;
    let attributes = files::load_input(input)?;

    let plan = FeatureAttributes::new(&loaded.graph)
        .with_config(config.clone())
        .plan(&loaded.entity, &loaded.schema, attributes)
        .with_context(|| format!("failed to plan update of entity {}", loaded.entity))?;

    println!(
        "{} {} ({} operation(s))",
        "Plan for".green().bold(),
        loaded.entity.to_string().bold(),
        plan.node_count()
    );
    println!("{plan}");
    Ok(())
}

fn cmd_apply(config: &EngineConfig, target: &Target, input: &PathBuf, out: &PathBuf) -> Result<()> {
    let loaded = target.load()?;
    let attributes = files::load_input(input)?;

    let report = FeatureAttributes::new(&loaded.graph)
        .with_config(config.clone())
        .set_attributes(&loaded.entity, &loaded.schema, attributes)
        .with_context(|| format!("failed to update entity {}", loaded.entity))?;

    print_report(&report);
    files::write_graph(&loaded.graph, out)?;
    info!(path = %out.display(), entities = loaded.graph.len(), "wrote graph snapshot");
    eprintln!("{} {}", "wrote".green().bold(), out.display().to_string().bold());
    Ok(())
}

fn cmd_get(config: &EngineConfig, target: &Target, path: &str) -> Result<()> {
    let loaded = target.load()?;

    let value = FeatureAttributes::new(&loaded.graph)
        .with_config(config.clone())
        .get_attribute(&loaded.entity, &loaded.schema, path)
        .with_context(|| format!("failed to read `{path}` of entity {}", loaded.entity))?;

    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn print_report(report: &ExecutionReport) {
    println!(
        "{} {} operation(s), {} assignment(s), {} resolved entit{}",
        "Applied".green().bold(),
        report.applied,
        report.assignments,
        report.resolved,
        if report.resolved == 1 { "y" } else { "ies" }
    );
    for (kind, count) in &report.by_kind {
        println!("  {} {count}", format!("{:<20}", kind.as_str()).cyan());
    }
}
