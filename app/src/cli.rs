//! PlumeSim CLI Tool
//!
//! Command-line interface for inspecting scenarios, datasets, and
//! configuration.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use plumesim_datagen::{library, Sample, Scenario, ScenarioRegistry, StoredScenario};
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "plumesim-cli")]
#[command(author = "PlumeSim Team")]
#[command(version = "0.1.0")]
#[command(about = "PlumeSim Environmental Simulation Suite CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available scenario types
    Scenarios,

    /// Validate a scenario file against the registry
    Validate {
        /// JSON file containing a list of stored scenarios
        file: PathBuf,
    },

    /// Inspect a generated dataset
    Inspect {
        /// Dataset file (.jsonl)
        dataset: PathBuf,

        /// Show the first N samples in detail
        #[arg(short, long, default_value = "0")]
        limit: usize,
    },

    /// Generate sample configuration
    Config {
        /// Output path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// System information
    Info,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scenarios => list_scenarios()?,
        Commands::Validate { file } => validate_scenarios(&file)?,
        Commands::Inspect { dataset, limit } => inspect_dataset(&dataset, limit)?,
        Commands::Config { output } => generate_config(output)?,
        Commands::Info => show_info()?,
    }

    Ok(())
}

fn list_scenarios() -> Result<()> {
    let registry = ScenarioRegistry::builtin();

    println!("╭──────────────────────────────────────────────────────────────────────╮");
    println!("│                       Built-in Scenarios                             │");
    println!("├────────────────────┬──────────────────────────────┬─────────────────┤");
    println!("│ Type               │ Name                         │ Difficulty      │");
    println!("├────────────────────┼──────────────────────────────┼─────────────────┤");

    for stored in library::default_pool() {
        let scenario = registry.build(&stored)?;
        let meta = scenario.metadata();
        println!(
            "│ {:18} │ {:28} │ {:15} │",
            truncate(&stored.scenario_type, 18),
            truncate(&meta.name, 28),
            format!("{:?}", meta.difficulty)
        );
    }

    println!("╰────────────────────┴──────────────────────────────┴─────────────────╯");
    println!("\nRegistered types: {}", registry.names().join(", "));

    Ok(())
}

fn validate_scenarios(file: &PathBuf) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("reading scenario file {file:?}"))?;
    let stored: Vec<StoredScenario> =
        serde_json::from_str(&content).with_context(|| format!("parsing {file:?}"))?;

    let registry = ScenarioRegistry::builtin();
    let mut failures = 0;

    for (index, scenario) in stored.iter().enumerate() {
        match registry.build(scenario) {
            Ok(built) => {
                println!(
                    "[{index}] {} ... ok ({})",
                    scenario.scenario_type,
                    built.metadata().name
                );
            }
            Err(e) => {
                failures += 1;
                println!("[{index}] {} ... FAILED: {e}", scenario.scenario_type);
            }
        }
    }

    println!("\n{} scenarios, {} failed", stored.len(), failures);
    if failures > 0 {
        anyhow::bail!("{failures} scenario(s) failed validation");
    }
    Ok(())
}

fn inspect_dataset(path: &PathBuf, limit: usize) -> Result<()> {
    let file =
        std::fs::File::open(path).with_context(|| format!("opening dataset {path:?}"))?;
    let reader = std::io::BufReader::new(file);

    let mut samples: Vec<Sample> = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let sample: Sample = serde_json::from_str(&line)
            .with_context(|| format!("parsing sample on line {}", line_no + 1))?;
        samples.push(sample);
    }

    if samples.is_empty() {
        println!("Dataset is empty.");
        return Ok(());
    }

    let mut labels: BTreeMap<&str, usize> = BTreeMap::new();
    let mut scenarios: BTreeMap<&str, usize> = BTreeMap::new();
    for sample in &samples {
        *labels.entry(sample.label.event.label()).or_default() += 1;
        *scenarios.entry(sample.scenario_id.as_str()).or_default() += 1;
    }

    println!("Samples: {}", samples.len());
    println!("Scenario runs: {}", scenarios.len());
    println!(
        "Sensors per sample: {}",
        samples[0].readings.len()
    );
    println!(
        "Time span: {:.1}s - {:.1}s",
        samples
            .iter()
            .map(|s| s.timestamp)
            .fold(f64::INFINITY, f64::min),
        samples
            .iter()
            .map(|s| s.timestamp)
            .fold(f64::NEG_INFINITY, f64::max)
    );

    println!("\nLabel distribution:");
    for (label, count) in &labels {
        println!(
            "  {:>18}: {:>7} ({:.1}%)",
            label,
            count,
            *count as f64 / samples.len() as f64 * 100.0
        );
    }

    if limit > 0 {
        println!("\nFirst {} samples:", limit.min(samples.len()));
        for sample in samples.iter().take(limit) {
            println!(
                "  t={:>8.1}s {} [{} sev {:.2}] {} readings",
                sample.timestamp,
                sample.scenario_id,
                sample.label.event.label(),
                sample.label.severity,
                sample.readings.len()
            );
        }
    }

    Ok(())
}

fn generate_config(output: Option<PathBuf>) -> Result<()> {
    let example = r#"# PlumeSim Configuration File
#
# Copy this file to /etc/plumesim/config.toml or ~/.config/plumesim/config.toml

# Name stem for generated dataset files
dataset_name = "training_batch_001"

# Output directory for datasets and reports
output_directory = "/var/lib/plumesim/datasets"

# How many times the scenario pool is repeated per batch
pool_repeats = 4

# Samples collected per scenario run
samples_per_scenario = 300

# Simulated timestep in seconds
time_step_s = 1.0

# Base random seed for reproducible generation
seed = 42

# Concurrent scenario runs
parallel_runs = 4

# Atmospheric stability class (a = very unstable .. f = stable)
stability = "d"

# Simulated volume bounds, meters
field_min = [-50.0, -50.0, 0.0]
field_max = [50.0, 50.0, 10.0]

# Optional target label distribution; omit for unbalanced generation
[balance_targets]
normal = 0.4
fire_precursor = 0.2
electrical_fault = 0.2
chemical_spill = 0.2

# Sensor battery
[[sensors]]
id = "co-room"
kind = "chemical"
species = "co"
position = [8.0, 0.0, 1.5]
preset = "consumer"       # clean | high_quality | consumer | degraded
ground_truth = true

[[sensors]]
id = "temp-room"
kind = "temperature"
position = [5.0, 0.0, 1.8]
preset = "consumer"
ground_truth = true

[[sensors]]
id = "emf-panel"
kind = "emf"
position = [-1.0, 2.0, 1.8]
preset = "high_quality"
ground_truth = true
"#;

    if let Some(path) = output {
        std::fs::write(&path, example)?;
        println!("Configuration written to: {path:?}");
    } else {
        println!("{example}");
    }

    Ok(())
}

fn show_info() -> Result<()> {
    use sysinfo::System;

    let mut sys = System::new_all();
    sys.refresh_all();

    println!("╭──────────────────────────────────────────────────────────────╮");
    println!("│             PlumeSim System Information                      │");
    println!("╰──────────────────────────────────────────────────────────────╯\n");

    println!("System:");
    println!("  Hostname: {}", System::host_name().unwrap_or_default());
    println!(
        "  OS: {} {}",
        System::name().unwrap_or_default(),
        System::os_version().unwrap_or_default()
    );
    println!("  Kernel: {}", System::kernel_version().unwrap_or_default());

    println!("\nHardware:");
    println!(
        "  CPU: {}",
        sys.cpus().first().map(|c| c.brand()).unwrap_or("Unknown")
    );
    println!("  Cores: {}", sys.cpus().len());
    println!(
        "  Memory: {} MB total, {} MB used",
        sys.total_memory() / 1024 / 1024,
        sys.used_memory() / 1024 / 1024
    );

    println!("\nPlumeSim:");
    println!("  Version: 0.1.0");
    println!("  Physics Version: 0.1.0");
    println!("  Sensors Version: 0.1.0");
    println!("  Datagen Version: 0.1.0");

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max - 3])
    }
}
