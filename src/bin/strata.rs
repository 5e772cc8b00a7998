//! Strata CLI Binary
//!
//! Command-line interface for analyzing container image archives.

use anyhow::{bail, Context, Result};
use bytesize::ByteSize;
use clap::{Parser, Subcommand};
use comfy_table::{presets, Table};
use std::path::PathBuf;
use std::process;
use strata::ci::{CiConfig, Evaluator};
use strata::config::AppConfig;
use strata::export::ExportReport;
use strata::image::{read_archive, Image};
use strata::logging::{init_logging, resolve_log_file_path, LoggingConfig};
use strata::tree::Comparer;

/// Strata - container image layer analysis
#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Inspect container image layers and score wasted space")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    log_format: Option<String>,

    /// Log output (stderr, file, file+stderr)
    #[arg(long)]
    log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze an image archive and report efficiency
    Analyze {
        /// Path to a `docker save` style tar archive
        archive: PathBuf,

        /// Write the full report as JSON to the given path
        #[arg(long)]
        json: Option<PathBuf>,

        /// Evaluate CI rules and exit non-zero on failure
        #[arg(long)]
        ci: bool,

        /// CI rules file (YAML)
        #[arg(long)]
        ci_config: Option<PathBuf>,

        /// How many wasteful paths to list (0 = all)
        #[arg(long, default_value = "25")]
        top: usize,
    },
    /// Render the merged file tree at a layer selection
    Tree {
        /// Path to a `docker save` style tar archive
        archive: PathBuf,

        /// Layer index to select
        #[arg(long, default_value = "0")]
        layer: usize,

        /// Show changes accumulated since the base layer instead of
        /// changes introduced by the selected layer
        #[arg(long)]
        aggregated: bool,

        /// Include mode/ownership/size columns
        #[arg(long)]
        attributes: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = init(&cli) {
        eprintln!("Error initializing: {}", err);
        process::exit(1);
    }

    match run(&cli) {
        Ok(RunOutcome { output, failed }) => {
            println!("{}", output);
            if failed {
                process::exit(1);
            }
        }
        Err(err) => {
            eprintln!("Error: {:#}", err);
            process::exit(1);
        }
    }
}

struct RunOutcome {
    output: String,
    failed: bool,
}

fn init(cli: &Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;

    let mut logging: LoggingConfig = config.logging;
    if let Some(level) = &cli.log_level {
        logging.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        logging.format = format.clone();
    }
    if let Some(output) = &cli.log_output {
        logging.output = output.clone();
    }
    logging.file = Some(resolve_log_file_path(
        cli.log_file.clone(),
        logging.file.take(),
    )?);

    init_logging(Some(&logging)).context("unable to initialize logging")?;
    Ok(())
}

fn run(cli: &Cli) -> Result<RunOutcome> {
    match &cli.command {
        Commands::Analyze {
            archive,
            json,
            ci,
            ci_config,
            top,
        } => analyze(archive, json.as_deref(), *ci, ci_config.as_deref(), *top),
        Commands::Tree {
            archive,
            layer,
            aggregated,
            attributes,
        } => tree(archive, *layer, *aggregated, *attributes),
    }
}

fn analyze(
    archive: &std::path::Path,
    json: Option<&std::path::Path>,
    ci: bool,
    ci_config: Option<&std::path::Path>,
    top: usize,
) -> Result<RunOutcome> {
    let image = read_archive(archive)
        .with_context(|| format!("unable to read image archive {}", archive.display()))?;
    let analysis = image.analyze().context("unable to analyze image")?;

    let mut output = String::new();
    output.push_str(&format!("Image: {}\n", analysis.image_name));
    output.push_str(&format!("Layers: {}\n\n", analysis.layers.len()));
    for layer in &analysis.layers {
        output.push_str(&format!("  [{:>2}] {}\n", layer.index, layer.summary()));
    }

    output.push_str(&format!(
        "\nTotal image size: {}\n",
        ByteSize::b(analysis.size_bytes)
    ));
    output.push_str(&format!(
        "User size (non-base layers): {}\n",
        ByteSize::b(analysis.user_size_bytes)
    ));
    output.push_str(&format!(
        "Potentially wasted space: {}\n",
        ByteSize::b(analysis.wasted_bytes)
    ));
    output.push_str(&format!(
        "Image efficiency score: {:.2} %\n",
        analysis.efficiency * 100.0
    ));

    if !analysis.inefficiencies.is_empty() {
        let mut table = Table::new();
        table.load_preset(presets::UTF8_BORDERS_ONLY);
        table.set_header(vec!["Count", "Wasted Space", "File Path"]);

        // worst offenders first
        let shown = analysis
            .inefficiencies
            .iter()
            .rev()
            .take(if top == 0 { usize::MAX } else { top });
        for data in shown {
            table.add_row(vec![
                data.reference_count().to_string(),
                ByteSize::b(data.cumulative_size).to_string(),
                data.path.clone(),
            ]);
        }
        output.push_str(&format!("\n{table}\n"));
    }

    if let Some(json_path) = json {
        let report = ExportReport::new(&image, &analysis);
        std::fs::write(json_path, report.marshal()?)
            .with_context(|| format!("unable to write report to {}", json_path.display()))?;
        output.push_str(&format!("\nExported report to {}\n", json_path.display()));
    }

    let mut failed = false;
    if ci {
        let rules = match ci_config {
            Some(path) => CiConfig::load(path)?,
            None => CiConfig::default(),
        };
        let mut evaluator = Evaluator::new(&rules);
        let passed = evaluator.evaluate(&analysis);
        output.push_str("\nCI evaluation:\n");
        output.push_str(&evaluator.report());
        failed = !passed;
    }

    Ok(RunOutcome { output, failed })
}

fn tree(
    archive: &std::path::Path,
    layer: usize,
    aggregated: bool,
    attributes: bool,
) -> Result<RunOutcome> {
    let image: Image = read_archive(archive)
        .with_context(|| format!("unable to read image archive {}", archive.display()))?;
    if layer >= image.layer_count() {
        bail!(
            "layer index {} out of bounds ({} layers)",
            layer,
            image.layer_count()
        );
    }

    let comparer = Comparer::new(&image.trees);
    let key = if aggregated {
        comparer.aggregated_indexes().nth(layer)
    } else {
        comparer.natural_indexes().nth(layer)
    }
    .expect("layer index validated above");

    let merged = comparer.get_tree(key)?;
    Ok(RunOutcome {
        output: merged.render(attributes),
        failed: false,
    })
}
