//! PlumeSim Environmental Simulation Suite
//!
//! Main application entry point: runs a scenario batch through the dataset
//! generator and exports the labeled samples.

use anyhow::{Context, Result};
use plumesim_datagen::{
    library, Dataset, DatasetGenerator, EventClass, Progress, ScenarioRegistry, StoredScenario,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

mod config;

use config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    tracing::info!("╔══════════════════════════════════════════╗");
    tracing::info!("║   PlumeSim Environmental Simulation      ║");
    tracing::info!("║            Version 0.1.0                 ║");
    tracing::info!("╚══════════════════════════════════════════╝");

    // Load configuration
    let config = AppConfig::load()?;
    tracing::info!("Configuration loaded from {:?}", config.config_path);

    // Assemble the scenario pool
    let pool = load_scenario_pool(&config)?;
    tracing::info!("Scenario pool: {} runs", pool.len());

    // Build the sensor battery
    let array = config.build_array()?;
    tracing::info!(
        "Sensor array `{}` ready with {} sensors",
        array.name(),
        array.len()
    );

    // Build the generator
    let registry = ScenarioRegistry::builtin();
    let generation_config = config.generation_config()?;
    let (generator, mut progress_rx) =
        DatasetGenerator::new(generation_config, registry, array)?;
    let cancel = generator.cancel_flag();

    print_system_status(&config).await;

    // Progress reporter
    let progress_task = tokio::spawn(async move {
        while let Some(progress) = progress_rx.recv().await {
            log_progress(&progress);
        }
    });

    tracing::info!("Generating training data...");
    tracing::info!("Press Ctrl+C to cancel between scenario runs");

    // Balanced or plain generation, cancellable between runs
    let balance = config.balance_classes()?;
    let pool_for_task = pool.clone();
    let mut generation = tokio::spawn(async move {
        if balance.is_empty() {
            generator.generate_training_dataset(&pool_for_task).await
        } else {
            let target: BTreeMap<EventClass, f64> = balance.into_iter().collect();
            generator
                .generate_balanced_dataset(&pool_for_task, &target)
                .await
        }
    });

    let dataset = tokio::select! {
        result = &mut generation => result??,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received, finishing in-flight runs...");
            cancel.store(true, Ordering::Relaxed);
            generation.await??
        }
    };

    progress_task.abort();

    // Export
    let output_dir = PathBuf::from(&config.output_directory);
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("creating output directory {output_dir:?}"))?;

    let dataset_path = output_dir.join(format!("{}.jsonl", config.dataset_name));
    dataset.write_jsonl(&dataset_path)?;

    let report_path = output_dir.join(format!("{}.report.json", config.dataset_name));
    std::fs::write(
        &report_path,
        serde_json::to_string_pretty(&dataset.report)?,
    )?;

    print_summary(&dataset);
    tracing::info!("Dataset written to {:?}", dataset_path);
    tracing::info!("Report written to {:?}", report_path);
    tracing::info!("PlumeSim run complete");

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,plumesim=debug,plumesim_physics=info,plumesim_datagen=debug")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .init();
}

fn load_scenario_pool(config: &AppConfig) -> Result<Vec<StoredScenario>> {
    let base = match &config.scenarios_file {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading scenario file {path:?}"))?;
            serde_json::from_str::<Vec<StoredScenario>>(&content)
                .with_context(|| format!("parsing scenario file {path:?}"))?
        }
        None => {
            tracing::info!("No scenario file configured, using the built-in pool");
            library::default_pool()
        }
    };

    let mut pool = Vec::with_capacity(base.len() * config.pool_repeats.max(1));
    for _ in 0..config.pool_repeats.max(1) {
        pool.extend(base.iter().cloned());
    }
    Ok(pool)
}

fn log_progress(progress: &Progress) {
    tracing::info!(
        "[{}/{}] {} | samples: {} | dropped: {} | failed runs: {}",
        progress.completed_runs,
        progress.total_runs,
        progress.scenario_type,
        progress.samples_generated,
        progress.samples_dropped,
        progress.failed_runs
    );
}

fn print_summary(dataset: &Dataset) {
    let report = &dataset.report;
    let duration = report.finished_at - report.started_at;

    tracing::info!("╭─────────────── Generation Report ───────────────╮");
    tracing::info!("│ Runs completed: {:>28} │", report.completed_runs);
    tracing::info!("│ Runs failed: {:>31} │", report.failed_runs.len());
    tracing::info!("│ Samples generated: {:>25} │", report.samples_generated);
    tracing::info!("│ Samples dropped: {:>27} │", report.samples_dropped);
    tracing::info!("│ Cancelled: {:>33} │", report.cancelled);
    tracing::info!("│ Wall time: {:>31}s │", duration.num_seconds());
    tracing::info!("├──────────────── Label Distribution ─────────────┤");
    for (class, fraction) in dataset.label_distribution() {
        tracing::info!(
            "│ {:>20}: {:>24.1}% │",
            class.label(),
            fraction * 100.0
        );
    }
    tracing::info!("╰──────────────────────────────────────────────────╯");

    for failed in &report.failed_runs {
        tracing::warn!(
            "failed run: {} ({})",
            failed.scenario_type,
            failed.reason
        );
    }
}

async fn print_system_status(config: &AppConfig) {
    use sysinfo::System;

    let mut sys = System::new_all();
    sys.refresh_all();

    tracing::info!("╭─────────────── System Status ───────────────╮");
    tracing::info!("│ Hostname: {:>32} │", System::host_name().unwrap_or_default());
    tracing::info!("│ OS: {:>38} │", System::name().unwrap_or_default());
    tracing::info!(
        "│ CPU: {:>37} │",
        sys.cpus().first().map(|c| c.brand()).unwrap_or("Unknown")
    );
    tracing::info!(
        "│ Memory: {:>26} MB / {} MB │",
        sys.used_memory() / 1024 / 1024,
        sys.total_memory() / 1024 / 1024
    );
    tracing::info!("├──────────────── Configuration ────────────────┤");
    tracing::info!("│ Dataset: {:>33} │", config.dataset_name);
    tracing::info!("│ Samples per run: {:>25} │", config.samples_per_scenario);
    tracing::info!("│ Timestep: {:>30}s │", config.time_step_s);
    tracing::info!("│ Parallel runs: {:>27} │", config.parallel_runs);
    tracing::info!("│ Stability class: {:>25} │", config.stability);
    tracing::info!("╰──────────────────────────────────────────────╯");
}
