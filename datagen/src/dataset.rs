//! Training dataset generation.
//!
//! Drives scenario runs against independent field/array instances, collects
//! validated samples, and supports balanced-class, temporal-sequence, and
//! edge-case generation. Independent runs execute concurrently; each owns
//! its own field, sources, and sensors, so there is no shared mutable
//! state between them.

use crate::scenario::{Scenario, ScenarioDriver, ScenarioRegistry, StoredScenario};
use crate::{DatasetError, EventClass, GroundTruthLabel, Result, Sample};
use chrono::{DateTime, Utc};
use nalgebra::Point3;
use plumesim_physics::{
    BoundaryPolicy, DispersionConfig, DispersionEngine, FieldBounds, SpatialField, StabilityClass,
};
use plumesim_sensors::SensorArray;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Physics-informed bounds every generated sample must satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationBounds {
    /// Maximum plausible concentration, µg/m³.
    pub max_concentration: f64,
    /// Readings may dip slightly below zero from instrument zero-noise;
    /// ground truth is still strictly non-negative.
    pub reading_zero_allowance: f64,
    /// Plausible air temperature range, °C.
    pub temperature_range_c: (f64, f64),
    /// Maximum plausible flux density, µT.
    pub max_emf_ut: f64,
    /// Plausible sound level range, dB.
    pub acoustic_range_db: (f64, f64),
}

impl Default for ValidationBounds {
    fn default() -> Self {
        Self {
            max_concentration: 1.0e7,
            reading_zero_allowance: 10.0,
            temperature_range_c: (-40.0, 85.0),
            max_emf_ut: 1.0e4,
            acoustic_range_db: (0.0, 140.0),
        }
    }
}

impl ValidationBounds {
    /// Check one sample. Ground-truth values must obey the hard physical
    /// invariants exactly; imperfect readings get a small zero-noise
    /// allowance on non-negative quantities.
    pub fn check(&self, sample: &Sample) -> std::result::Result<(), String> {
        for (id, value) in &sample.label.true_values {
            if !value.is_finite() {
                return Err(format!("non-finite ground truth for {id}"));
            }
            // Concentrations and flux densities can never truly be
            // negative; a negative truth means corrupted physics.
            let non_negative_unit = sample
                .readings
                .get(id)
                .map(|r| matches!(r.unit.as_str(), "µg/m³" | "µT"))
                .unwrap_or(false);
            if non_negative_unit && *value < 0.0 {
                return Err(format!("negative ground truth {value} for {id}"));
            }
        }
        if !sample.label.severity.is_finite()
            || !(0.0..=1.0).contains(&sample.label.severity)
        {
            return Err(format!("severity {} out of range", sample.label.severity));
        }
        for (id, reading) in &sample.readings {
            if !reading.value.is_finite() {
                return Err(format!("non-finite reading from {id}"));
            }
            let ok = match reading.unit.as_str() {
                "µg/m³" => {
                    reading.value >= -self.reading_zero_allowance
                        && reading.value <= self.max_concentration
                }
                "°C" => {
                    reading.value >= self.temperature_range_c.0
                        && reading.value <= self.temperature_range_c.1
                }
                "µT" => {
                    reading.value >= -self.reading_zero_allowance
                        && reading.value <= self.max_emf_ut
                }
                "dB" => {
                    reading.value >= self.acoustic_range_db.0
                        && reading.value <= self.acoustic_range_db.1
                }
                _ => true,
            };
            if !ok {
                return Err(format!(
                    "reading {id} = {} {} out of physical bounds",
                    reading.value, reading.unit
                ));
            }
        }
        Ok(())
    }
}

/// Configuration for a generation batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Simulated timestep, seconds.
    pub time_step_s: f64,
    /// Cap on samples collected from one scenario run.
    pub samples_per_scenario: usize,
    /// Base seed; every run derives its own.
    pub seed: u64,
    /// Concurrent scenario runs.
    pub parallel_runs: usize,
    pub field_min: [f64; 3],
    pub field_max: [f64; 3],
    pub boundary_policy: BoundaryPolicy,
    pub stability: StabilityClass,
    /// Attach ground-truth labels to samples.
    pub include_labels: bool,
    /// Acceptable deviation from a requested class distribution.
    pub balance_tolerance: f64,
    pub validation: ValidationBounds,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            time_step_s: 1.0,
            samples_per_scenario: 300,
            seed: 42,
            parallel_runs: 4,
            field_min: [-50.0, -50.0, 0.0],
            field_max: [50.0, 50.0, 10.0],
            boundary_policy: BoundaryPolicy::Clamp,
            stability: StabilityClass::D,
            include_labels: true,
            balance_tolerance: 0.05,
            validation: ValidationBounds::default(),
        }
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.time_step_s.is_finite() || self.time_step_s <= 0.0 {
            return Err(DatasetError::InvalidConfig(format!(
                "time_step_s {} must be positive",
                self.time_step_s
            )));
        }
        if self.samples_per_scenario == 0 {
            return Err(DatasetError::InvalidConfig(
                "samples_per_scenario must be at least 1".into(),
            ));
        }
        if self.parallel_runs == 0 {
            return Err(DatasetError::InvalidConfig(
                "parallel_runs must be at least 1".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.balance_tolerance) {
            return Err(DatasetError::InvalidConfig(format!(
                "balance_tolerance {} must be within [0, 1)",
                self.balance_tolerance
            )));
        }
        // Field bounds are validated for real when the field is built.
        FieldBounds::new(
            Point3::from(self.field_min),
            Point3::from(self.field_max),
        )?;
        Ok(())
    }

    fn build_field(&self) -> Result<SpatialField> {
        let bounds = FieldBounds::new(
            Point3::from(self.field_min),
            Point3::from(self.field_max),
        )?;
        Ok(SpatialField::new(bounds, self.boundary_policy))
    }

    fn build_engine(&self) -> Result<DispersionEngine> {
        Ok(DispersionEngine::new(DispersionConfig {
            stability: self.stability,
            ..Default::default()
        })?)
    }
}

/// Incremental progress update, sent after every finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    pub completed_runs: usize,
    pub total_runs: usize,
    pub scenario_type: String,
    pub samples_generated: usize,
    pub samples_dropped: usize,
    pub failed_runs: usize,
}

/// One failed scenario run in the batch report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedRun {
    pub scenario_type: String,
    pub reason: String,
}

/// Batch-level accounting. No caught failure is silently swallowed; every
/// drop and abort is counted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReport {
    pub total_runs: usize,
    pub completed_runs: usize,
    pub failed_runs: Vec<FailedRun>,
    pub samples_generated: usize,
    pub samples_dropped: usize,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// A generated training dataset plus its generation report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub samples: Vec<Sample>,
    pub report: GenerationReport,
}

impl Dataset {
    /// Realized label distribution as fractions.
    pub fn label_distribution(&self) -> BTreeMap<EventClass, f64> {
        let mut counts: BTreeMap<EventClass, usize> = BTreeMap::new();
        for sample in &self.samples {
            *counts.entry(sample.label.event).or_default() += 1;
        }
        let total = self.samples.len().max(1) as f64;
        counts
            .into_iter()
            .map(|(class, count)| (class, count as f64 / total))
            .collect()
    }

    /// Export samples as JSON lines, one sample per line.
    pub fn write_jsonl(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .map_err(|e| DatasetError::Export(format!("create {path:?}: {e}")))?;
        let mut writer = std::io::BufWriter::new(file);
        for sample in &self.samples {
            let line = serde_json::to_string(sample).map_err(crate::serialization_error)?;
            writeln!(writer, "{line}")
                .map_err(|e| DatasetError::Export(format!("write {path:?}: {e}")))?;
        }
        writer
            .flush()
            .map_err(|e| DatasetError::Export(format!("flush {path:?}: {e}")))?;
        tracing::info!(samples = self.samples.len(), ?path, "dataset exported");
        Ok(())
    }
}

/// A contiguous window of samples from one scenario run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleWindow {
    pub scenario_id: String,
    pub samples: Vec<Sample>,
}

/// Temporal-sequence dataset: overlapping contiguous windows instead of
/// i.i.d. samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceDataset {
    pub windows: Vec<SampleWindow>,
    pub report: GenerationReport,
}

/// Parameter perturbation applied to base scenarios for edge-case
/// exploration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "strategy")]
pub enum PerturbationStrategy {
    /// Multiply a numeric parameter by a factor.
    ScaleParameter { parameter: String, factor: f64 },
    /// Overwrite a numeric parameter.
    SetParameter { parameter: String, value: f64 },
}

impl PerturbationStrategy {
    /// Apply to a stored scenario. Returns None when the target parameter
    /// is absent from this scenario type.
    pub fn apply(&self, stored: &StoredScenario) -> Option<StoredScenario> {
        let (name, update): (&str, Box<dyn Fn(f64) -> f64>) = match self {
            PerturbationStrategy::ScaleParameter { parameter, factor } => {
                let factor = *factor;
                (parameter.as_str(), Box::new(move |v| v * factor))
            }
            PerturbationStrategy::SetParameter { parameter, value } => {
                let value = *value;
                (parameter.as_str(), Box::new(move |_| value))
            }
        };
        let mut params = stored.params.clone();
        let object = params.as_object_mut()?;
        let current = object.get(name)?.as_f64()?;
        object.insert(
            name.to_string(),
            serde_json::Value::from(update(current)),
        );
        Some(StoredScenario::new(&stored.scenario_type, params))
    }
}

struct RunOutput {
    samples: Vec<Sample>,
    dropped: usize,
}

/// Drives scenario runs and assembles labeled datasets.
pub struct DatasetGenerator {
    config: GenerationConfig,
    registry: ScenarioRegistry,
    array_template: SensorArray,
    cancel: Arc<AtomicBool>,
    progress_tx: mpsc::Sender<Progress>,
}

impl DatasetGenerator {
    /// Create a generator and the receiving end of its progress channel.
    pub fn new(
        config: GenerationConfig,
        registry: ScenarioRegistry,
        array_template: SensorArray,
    ) -> Result<(Self, mpsc::Receiver<Progress>)> {
        config.validate()?;
        if array_template.is_empty() {
            return Err(DatasetError::InvalidConfig(
                "sensor array has no sensors".into(),
            ));
        }
        let (tx, rx) = mpsc::channel(64);
        Ok((
            Self {
                config,
                registry,
                array_template,
                cancel: Arc::new(AtomicBool::new(false)),
                progress_tx: tx,
            },
            rx,
        ))
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Cooperative cancellation flag, checked between scenario runs only
    /// so no partially-written sample ever lands in the output.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Execute one scenario run to completion on the calling thread.
    ///
    /// Pure with respect to the generator: everything the run touches is
    /// owned by this call, which is what makes runs embarrassingly
    /// parallel.
    fn run_scenario(
        config: &GenerationConfig,
        registry: &ScenarioRegistry,
        mut array: SensorArray,
        stored: &StoredScenario,
        run_seed: u64,
        run_tag: &str,
    ) -> Result<RunOutput> {
        let scenario = registry.build(stored)?;
        let scenario_id = format!("{}#{run_tag}", scenario.metadata().id);
        let field = config.build_field()?;
        let engine = config.build_engine()?;
        let mut driver = ScenarioDriver::new(scenario, field, engine, config.time_step_s)?;
        driver.setup_environment()?;
        array.reseed(run_seed);

        let mut samples = Vec::new();
        let mut dropped = 0_usize;
        loop {
            let advancing = driver.update()?;
            let time = driver.time();
            let (readings, truth) = array.generate_training_sample(
                driver.engine(),
                &driver.field_view(),
                time,
                config.include_labels,
            )?;
            let (event, severity) = driver.label();
            let sample = Sample {
                timestamp: time,
                scenario_id: scenario_id.clone(),
                readings,
                label: GroundTruthLabel {
                    event,
                    severity,
                    true_values: truth.unwrap_or_default(),
                },
            };
            match config.validation.check(&sample) {
                Ok(()) => samples.push(sample),
                Err(reason) => {
                    dropped += 1;
                    tracing::debug!(scenario = %scenario_id, %reason, "sample dropped");
                }
            }
            if !advancing || samples.len() >= config.samples_per_scenario {
                break;
            }
        }
        Ok(RunOutput { samples, dropped })
    }

    /// Generate a labeled dataset across a batch of scenario runs.
    ///
    /// A failed run is counted and logged, never propagated: the batch
    /// continues with the remaining scenarios.
    pub async fn generate_training_dataset(
        &self,
        scenarios: &[StoredScenario],
    ) -> Result<Dataset> {
        let started_at = Utc::now();
        let total = scenarios.len();
        let mut report = GenerationReport {
            total_runs: total,
            completed_runs: 0,
            failed_runs: Vec::new(),
            samples_generated: 0,
            samples_dropped: 0,
            cancelled: false,
            started_at,
            finished_at: started_at,
        };
        let mut samples = Vec::new();
        let mut join_set: JoinSet<(String, Result<RunOutput>)> = JoinSet::new();
        let mut next_run = 0_usize;

        loop {
            // Top up the in-flight set, respecting cancellation between
            // runs.
            while join_set.len() < self.config.parallel_runs && next_run < total {
                if self.cancel.load(Ordering::Relaxed) {
                    report.cancelled = true;
                    break;
                }
                let config = self.config.clone();
                let registry = self.registry.clone();
                let array = self.array_template.clone();
                let stored = scenarios[next_run].clone();
                let run_seed = self.config.seed.wrapping_add(next_run as u64);
                let run_tag = format!("run{next_run}");
                join_set.spawn_blocking(move || {
                    let outcome =
                        Self::run_scenario(&config, &registry, array, &stored, run_seed, &run_tag);
                    (stored.scenario_type, outcome)
                });
                next_run += 1;
            }

            let Some(joined) = join_set.join_next().await else {
                break;
            };
            let finished_type = match joined {
                Ok((scenario_type, Ok(output))) => {
                    report.completed_runs += 1;
                    report.samples_generated += output.samples.len();
                    report.samples_dropped += output.dropped;
                    samples.extend(output.samples);
                    tracing::info!(
                        scenario = %scenario_type,
                        completed = report.completed_runs,
                        total,
                        "scenario run finished"
                    );
                    scenario_type
                }
                Ok((scenario_type, Err(e))) => {
                    tracing::warn!(scenario = %scenario_type, error = %e, "scenario run failed");
                    report.failed_runs.push(FailedRun {
                        scenario_type: scenario_type.clone(),
                        reason: e.to_string(),
                    });
                    scenario_type
                }
                Err(join_error) => {
                    tracing::error!(error = %join_error, "scenario run panicked");
                    report.failed_runs.push(FailedRun {
                        scenario_type: "<unknown>".into(),
                        reason: join_error.to_string(),
                    });
                    "<unknown>".to_string()
                }
            };

            let progress = Progress {
                completed_runs: report.completed_runs + report.failed_runs.len(),
                total_runs: total,
                scenario_type: finished_type,
                samples_generated: report.samples_generated,
                samples_dropped: report.samples_dropped,
                failed_runs: report.failed_runs.len(),
            };
            let _ = self.progress_tx.send(progress).await;

            if self.cancel.load(Ordering::Relaxed) {
                report.cancelled = true;
                if join_set.is_empty() {
                    break;
                }
            }
        }

        report.finished_at = Utc::now();
        if report.cancelled {
            tracing::warn!(
                completed = report.completed_runs,
                total,
                "generation cancelled between runs"
            );
        }
        Ok(Dataset { samples, report })
    }

    /// Generate, then rebalance the label distribution toward a target by
    /// duplicating under-represented classes with reading jitter.
    pub async fn generate_balanced_dataset(
        &self,
        scenarios: &[StoredScenario],
        target: &BTreeMap<EventClass, f64>,
    ) -> Result<Dataset> {
        let fraction_sum: f64 = target.values().sum();
        if target.is_empty() || (fraction_sum - 1.0).abs() > 1e-6 {
            return Err(DatasetError::InvalidConfig(format!(
                "target class fractions sum to {fraction_sum}, expected 1.0"
            )));
        }
        if target.values().any(|f| *f < 0.0) {
            return Err(DatasetError::InvalidConfig(
                "target class fractions must be non-negative".into(),
            ));
        }

        let mut dataset = self.generate_training_dataset(scenarios).await?;
        if dataset.report.cancelled {
            return Err(DatasetError::Cancelled);
        }

        let mut by_class: BTreeMap<EventClass, Vec<Sample>> = BTreeMap::new();
        for sample in std::mem::take(&mut dataset.samples) {
            by_class.entry(sample.label.event).or_default().push(sample);
        }

        // Drop classes absent from the target; everything else duplicates
        // up toward the class with the largest count/fraction ratio.
        by_class.retain(|class, samples| {
            let keep = target.get(class).copied().unwrap_or(0.0) > 0.0;
            if !keep {
                tracing::debug!(class = class.label(), dropped = samples.len(),
                    "class absent from balance target");
            }
            keep
        });
        for (class, fraction) in target {
            if *fraction > 0.0 && !by_class.contains_key(class) {
                return Err(DatasetError::InvalidConfig(format!(
                    "no samples of class `{}` available for balancing",
                    class.label()
                )));
            }
        }

        let total_target = by_class
            .iter()
            .map(|(class, samples)| (samples.len() as f64 / target[class]).ceil())
            .fold(0.0_f64, f64::max);

        let mut rng = StdRng::seed_from_u64(self.config.seed ^ 0x42a1_5eed);
        let jitter = Normal::new(0.0, 0.01).expect("fixed jitter sigma");
        let mut balanced = Vec::new();
        for (class, class_samples) in &by_class {
            let desired = (target[class] * total_target).round() as usize;
            for index in 0..desired {
                let base = &class_samples[index % class_samples.len()];
                if index < class_samples.len() {
                    balanced.push(base.clone());
                } else {
                    // Duplicate with multiplicative jitter on the readings;
                    // ground truth stays untouched.
                    let mut duplicate = base.clone();
                    for reading in duplicate.readings.values_mut() {
                        reading.value *= 1.0 + jitter.sample(&mut rng);
                    }
                    balanced.push(duplicate);
                }
            }
        }

        dataset.samples = balanced;
        dataset.report.samples_generated = dataset.samples.len();
        let realized = dataset.label_distribution();
        for (class, fraction) in target {
            let got = realized.get(class).copied().unwrap_or(0.0);
            if (got - fraction).abs() > self.config.balance_tolerance {
                tracing::warn!(
                    class = class.label(),
                    target = fraction,
                    realized = got,
                    "balanced distribution outside tolerance"
                );
            }
        }
        Ok(dataset)
    }

    /// Generate contiguous temporal windows with configurable overlap.
    pub async fn generate_temporal_sequences(
        &self,
        scenarios: &[StoredScenario],
        window_len: usize,
        overlap: usize,
    ) -> Result<SequenceDataset> {
        if window_len == 0 {
            return Err(DatasetError::InvalidConfig(
                "window_len must be at least 1".into(),
            ));
        }
        if overlap >= window_len {
            return Err(DatasetError::InvalidConfig(format!(
                "overlap {overlap} must be below window_len {window_len}"
            )));
        }

        let dataset = self.generate_training_dataset(scenarios).await?;

        // Samples from one run are appended as a contiguous block, so
        // grouping by scenario id preserves temporal order.
        let mut by_run: Vec<(String, Vec<Sample>)> = Vec::new();
        for sample in dataset.samples {
            match by_run.last_mut() {
                Some((id, block)) if *id == sample.scenario_id => block.push(sample),
                _ => by_run.push((sample.scenario_id.clone(), vec![sample])),
            }
        }

        let stride = window_len - overlap;
        let mut windows = Vec::new();
        for (scenario_id, block) in by_run {
            let mut start = 0;
            while start + window_len <= block.len() {
                windows.push(SampleWindow {
                    scenario_id: scenario_id.clone(),
                    samples: block[start..start + window_len].to_vec(),
                });
                start += stride;
            }
        }
        Ok(SequenceDataset {
            windows,
            report: dataset.report,
        })
    }

    /// Explore tail conditions by perturbing base scenario parameters.
    /// Strategies that do not apply to a scenario type are skipped and
    /// counted in the log, never silently conflated with coverage.
    pub async fn generate_edge_cases(
        &self,
        scenarios: &[StoredScenario],
        strategies: &[PerturbationStrategy],
    ) -> Result<Dataset> {
        let mut perturbed = Vec::new();
        let mut skipped = 0_usize;
        for stored in scenarios {
            for strategy in strategies {
                match strategy.apply(stored) {
                    Some(edge) => perturbed.push(edge),
                    None => skipped += 1,
                }
            }
        }
        if skipped > 0 {
            tracing::info!(
                skipped,
                applied = perturbed.len(),
                "perturbation strategies without a matching parameter"
            );
        }
        if perturbed.is_empty() {
            return Err(DatasetError::InvalidConfig(
                "no perturbation strategy applied to any scenario".into(),
            ));
        }
        self.generate_training_dataset(&perturbed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{FirePrecursorParams, NormalOperationParams};
    use crate::scenario::ScenarioRegistry;
    use nalgebra::Point3;
    use plumesim_sensors::{ImperfectionPipeline, SensorKind, VirtualSensor};

    fn test_array() -> SensorArray {
        let mut array = SensorArray::new("bench");
        array
            .add_sensor(
                VirtualSensor::new(
                    "co-1",
                    SensorKind::chemical("co"),
                    Point3::new(10.0, 0.0, 1.0),
                )
                .unwrap()
                .with_pipeline(ImperfectionPipeline::consumer_grade())
                .unwrap(),
            )
            .unwrap();
        array
            .add_sensor(
                VirtualSensor::new("temp-1", SensorKind::Temperature, Point3::new(5.0, 1.0, 1.5))
                    .unwrap(),
            )
            .unwrap();
        array
    }

    fn generator(samples_per_scenario: usize) -> (DatasetGenerator, mpsc::Receiver<Progress>) {
        let config = GenerationConfig {
            samples_per_scenario,
            time_step_s: 5.0,
            parallel_runs: 2,
            ..Default::default()
        };
        DatasetGenerator::new(config, ScenarioRegistry::builtin(), test_array()).unwrap()
    }

    fn normal(duration_s: f64) -> StoredScenario {
        StoredScenario::new(
            "normal_operation",
            serde_json::to_value(NormalOperationParams {
                duration_s,
                ..Default::default()
            })
            .unwrap(),
        )
    }

    fn fire(duration_s: f64) -> StoredScenario {
        StoredScenario::new(
            "fire_precursor",
            serde_json::to_value(FirePrecursorParams {
                duration_s,
                ignition_time_s: 0.0,
                ..Default::default()
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn batch_generates_labeled_samples() {
        let (generator, _rx) = generator(20);
        let dataset = generator
            .generate_training_dataset(&[normal(200.0), fire(200.0)])
            .await
            .unwrap();

        assert_eq!(dataset.report.total_runs, 2);
        assert_eq!(dataset.report.completed_runs, 2);
        assert!(dataset.report.failed_runs.is_empty());
        assert!(!dataset.samples.is_empty());
        for sample in &dataset.samples {
            assert_eq!(sample.readings.len(), 2);
            assert_eq!(sample.label.true_values.len(), 2);
        }
    }

    #[tokio::test]
    async fn failed_runs_counted_not_propagated() {
        let (generator, _rx) = generator(10);
        let bad = StoredScenario::new("normal_operation", serde_json::json!({"oops": 1}));
        let dataset = generator
            .generate_training_dataset(&[bad, normal(100.0)])
            .await
            .unwrap();

        assert_eq!(dataset.report.completed_runs, 1);
        assert_eq!(dataset.report.failed_runs.len(), 1);
        assert!(dataset.report.failed_runs[0].reason.contains("oops"));
        assert!(!dataset.samples.is_empty());
    }

    #[tokio::test]
    async fn progress_reported_per_run() {
        let (generator, mut rx) = generator(5);
        let dataset = generator
            .generate_training_dataset(&[normal(50.0), normal(50.0), normal(50.0)])
            .await
            .unwrap();
        assert_eq!(dataset.report.completed_runs, 3);

        let mut updates = 0;
        while let Ok(progress) = rx.try_recv() {
            assert_eq!(progress.total_runs, 3);
            updates += 1;
        }
        assert_eq!(updates, 3);
    }

    #[tokio::test]
    async fn cancellation_stops_between_runs() {
        let (generator, _rx) = generator(10);
        generator.cancel_flag().store(true, Ordering::Relaxed);
        let dataset = generator
            .generate_training_dataset(&[normal(100.0), normal(100.0)])
            .await
            .unwrap();
        assert!(dataset.report.cancelled);
        assert_eq!(dataset.report.completed_runs, 0);
    }

    #[tokio::test]
    async fn balanced_dataset_hits_target_distribution() {
        // Pool is 90% normal scenarios, target is an even split.
        let (generator, _rx) = generator(10);
        let mut pool: Vec<StoredScenario> = (0..9).map(|_| normal(100.0)).collect();
        pool.push(fire(100.0));

        let mut target = BTreeMap::new();
        target.insert(EventClass::Normal, 0.5);
        target.insert(EventClass::FirePrecursor, 0.5);

        let dataset = generator
            .generate_balanced_dataset(&pool, &target)
            .await
            .unwrap();
        let realized = dataset.label_distribution();
        for (class, fraction) in &target {
            let got = realized.get(class).copied().unwrap_or(0.0);
            assert!(
                (got - fraction).abs() <= 0.05,
                "{}: wanted {fraction}, got {got}",
                class.label()
            );
        }
    }

    #[tokio::test]
    async fn balanced_dataset_rejects_bad_target() {
        let (generator, _rx) = generator(5);
        let mut target = BTreeMap::new();
        target.insert(EventClass::Normal, 0.4);
        let err = generator
            .generate_balanced_dataset(&[normal(50.0)], &target)
            .await;
        assert!(matches!(err, Err(DatasetError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn temporal_windows_are_contiguous_with_overlap() {
        let (generator, _rx) = generator(12);
        let sequences = generator
            .generate_temporal_sequences(&[normal(200.0)], 4, 2)
            .await
            .unwrap();
        assert!(!sequences.windows.is_empty());
        for window in &sequences.windows {
            assert_eq!(window.samples.len(), 4);
            for pair in window.samples.windows(2) {
                assert!(pair[1].timestamp > pair[0].timestamp);
            }
        }
        // Consecutive windows share exactly `overlap` samples.
        let first = &sequences.windows[0];
        let second = &sequences.windows[1];
        assert_eq!(
            first.samples[2].timestamp, second.samples[0].timestamp,
            "windows must overlap by two samples"
        );
    }

    #[tokio::test]
    async fn edge_cases_perturb_parameters() {
        let (generator, _rx) = generator(5);
        let strategies = vec![
            PerturbationStrategy::ScaleParameter {
                parameter: "wind_speed".into(),
                factor: 10.0,
            },
            PerturbationStrategy::SetParameter {
                parameter: "nonexistent".into(),
                value: 1.0,
            },
        ];
        let dataset = generator
            .generate_edge_cases(&[normal(50.0)], &strategies)
            .await
            .unwrap();
        // Only the applicable strategy produced a run.
        assert_eq!(dataset.report.total_runs, 1);
        assert_eq!(dataset.report.completed_runs, 1);
    }

    #[test]
    fn perturbation_skips_missing_parameters() {
        let stored = normal(100.0);
        let strategy = PerturbationStrategy::ScaleParameter {
            parameter: "ignition_time_s".into(),
            factor: 2.0,
        };
        assert!(strategy.apply(&stored).is_none());

        let strategy = PerturbationStrategy::ScaleParameter {
            parameter: "wind_speed".into(),
            factor: 2.0,
        };
        let perturbed = strategy.apply(&stored).unwrap();
        let original = stored.params["wind_speed"].as_f64().unwrap();
        let scaled = perturbed.params["wind_speed"].as_f64().unwrap();
        assert!((scaled - original * 2.0).abs() < 1e-12);
    }

    #[test]
    fn validation_rejects_out_of_bounds_readings() {
        let bounds = ValidationBounds::default();
        let mut readings = BTreeMap::new();
        readings.insert(
            "t".to_string(),
            plumesim_sensors::Reading {
                sensor_id: "t".into(),
                value: 500.0,
                unit: "°C".into(),
                timestamp: 0.0,
                quality: 1.0,
            },
        );
        let sample = Sample {
            timestamp: 0.0,
            scenario_id: "test".into(),
            readings,
            label: GroundTruthLabel {
                event: EventClass::Normal,
                severity: 0.0,
                true_values: BTreeMap::new(),
            },
        };
        assert!(bounds.check(&sample).is_err());
    }
}
