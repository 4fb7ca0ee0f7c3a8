use std::fs;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use ipc_schema_core::{Annotation, parse_signature_list};
use ipc_schema_loader::{MergeRun, run_merge_file};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const VERBOSE_FILTER: &str = "warn,ipc_schema_core=debug,ipc_schema_loader=debug";

/// Output format for merged schemas.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliOutputFormat {
    /// Version-annotated interface definitions.
    Idl,
    /// Snapshot as JSON.
    Json,
    /// Snapshot as YAML.
    Yaml,
    /// Every command entry with its revisions and descriptive form.
    Dump,
}

#[derive(Debug, Parser)]
#[command(name = "ipc-schema", version)]
#[command(about = "Merge reverse-engineered IPC interface fragments into one versioned schema")]
struct Cli {
    /// Log engine decisions to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Merge the fragments listed in a run configuration.
    Merge(MergeArgs),
    /// Merge and render without writing output, then print a summary.
    Check(CheckArgs),
    /// Parse a signature list and print its normalized form.
    Parse(ParseArgs),
}

#[derive(Debug, Args)]
struct MergeArgs {
    /// Path to the run configuration YAML.
    config: PathBuf,
    /// Write output to this file instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Output format.
    #[arg(long, default_value = "idl")]
    format: CliOutputFormat,
}

#[derive(Debug, Args)]
struct CheckArgs {
    /// Path to the run configuration YAML.
    config: PathBuf,
}

#[derive(Debug, Args)]
struct ParseArgs {
    /// Comma-separated signature list, e.g. "Out<u32>, Buffer<0,6,0>".
    signature: String,
    /// Print the parsed trees as JSON.
    #[arg(long)]
    json: bool,
    /// Classify every element as a layout annotation.
    #[arg(long)]
    annotations: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Merge(args) => run_merge(args),
        Command::Check(args) => run_check(args),
        Command::Parse(args) => run_parse(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .init();
}

fn run_merge(args: MergeArgs) -> Result<(), String> {
    debug!(config = %args.config.display(), format = ?args.format, "Starting merge");
    let run = run_merge_file(&args.config).map_err(|err| err.to_string())?;
    let rendered = render(&run, args.format)?;

    match args.output {
        Some(path) => {
            fs::write(&path, rendered)
                .map_err(|err| format!("failed to write {}: {err}", path.display()))?;
            eprintln!("Wrote {}", path.display());
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

fn render(run: &MergeRun, format: CliOutputFormat) -> Result<String, String> {
    match format {
        CliOutputFormat::Idl => run.to_idl().map_err(|err| err.to_string()),
        CliOutputFormat::Dump => Ok(run.to_dump()),
        CliOutputFormat::Json => {
            let snapshot = run
                .snapshot(chrono::Utc::now().to_rfc3339())
                .map_err(|err| err.to_string())?;
            let mut json = serde_json::to_string_pretty(&snapshot)
                .map_err(|err| format!("failed to serialize snapshot: {err}"))?;
            json.push('\n');
            Ok(json)
        }
        CliOutputFormat::Yaml => {
            let snapshot = run
                .snapshot(chrono::Utc::now().to_rfc3339())
                .map_err(|err| err.to_string())?;
            serde_yaml::to_string(&snapshot)
                .map_err(|err| format!("failed to serialize snapshot: {err}"))
        }
    }
}

fn run_check(args: CheckArgs) -> Result<(), String> {
    let run = run_merge_file(&args.config).map_err(|err| err.to_string())?;
    // Rendering surfaces buffer and slot problems the merge itself accepts.
    run.to_idl().map_err(|err| err.to_string())?;

    let ctx = &run.context;
    let commands: usize = ctx.interfaces().map(|i| i.commands().count()).sum();
    let entries: usize = ctx
        .interfaces()
        .flat_map(|i| i.commands())
        .map(|group| group.entries().len())
        .sum();

    println!("Revisions: {}", ctx.revisions().len());
    println!("Fragments: {}", run.fragments);
    println!("Interfaces: {}", ctx.interfaces().count());
    println!("Commands: {commands}");
    println!("Entries: {entries}");
    println!("Types: {}", ctx.types().emitted_types().len());
    Ok(())
}

fn run_parse(args: ParseArgs) -> Result<(), String> {
    let nodes = parse_signature_list(&args.signature).map_err(|err| err.to_string())?;

    if args.json {
        let json = serde_json::to_string_pretty(&nodes)
            .map_err(|err| format!("failed to serialize tree: {err}"))?;
        println!("{json}");
        return Ok(());
    }

    for node in &nodes {
        if args.annotations {
            let annotation = Annotation::classify(node).map_err(|err| err.to_string())?;
            println!("{node}\t{annotation:?}");
        } else {
            println!("{node}");
        }
    }
    Ok(())
}
