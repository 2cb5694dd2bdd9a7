// Application Configuration

use anyhow::{bail, Context, Result};
use nalgebra::Point3;
use plumesim_datagen::{EventClass, GenerationConfig};
use plumesim_physics::{BoundaryPolicy, StabilityClass};
use plumesim_sensors::{ImperfectionPipeline, SensorArray, SensorKind, VirtualSensor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// One sensor definition in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorEntry {
    pub id: String,

    /// Sensor kind: chemical, temperature, emf, acoustic.
    pub kind: String,

    /// Target species for chemical sensors.
    #[serde(default)]
    pub species: Option<String>,

    pub position: [f64; 3],

    /// Imperfection preset: clean, high_quality, consumer, degraded.
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Whether the sensor can report ground truth for labels.
    #[serde(default = "default_true")]
    pub ground_truth: bool,
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Name stem for generated dataset files
    #[serde(default = "default_dataset_name")]
    pub dataset_name: String,

    /// Output directory for datasets and reports
    #[serde(default = "default_output_dir")]
    pub output_directory: String,

    /// Optional JSON file with stored scenarios; the built-in pool is
    /// used when absent
    #[serde(default)]
    pub scenarios_file: Option<PathBuf>,

    /// How many times the scenario pool is repeated per batch
    #[serde(default = "default_pool_repeats")]
    pub pool_repeats: usize,

    /// Samples collected per scenario run
    #[serde(default = "default_samples_per_scenario")]
    pub samples_per_scenario: usize,

    /// Simulated timestep in seconds
    #[serde(default = "default_time_step")]
    pub time_step_s: f64,

    /// Base random seed for reproducible generation
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Concurrent scenario runs
    #[serde(default = "default_parallel_runs")]
    pub parallel_runs: usize,

    /// Atmospheric stability class: a-f
    #[serde(default = "default_stability")]
    pub stability: String,

    /// Field bounds, meters
    #[serde(default = "default_field_min")]
    pub field_min: [f64; 3],

    #[serde(default = "default_field_max")]
    pub field_max: [f64; 3],

    /// Target label distribution; empty means unbalanced generation
    #[serde(default)]
    pub balance_targets: HashMap<String, f64>,

    /// Sensor battery
    #[serde(default = "default_sensors")]
    pub sensors: Vec<SensorEntry>,

    /// Path to config file (for reference)
    #[serde(skip)]
    pub config_path: PathBuf,
}

fn default_dataset_name() -> String {
    format!("plumesim_{}", chrono::Utc::now().format("%Y%m%d_%H%M%S"))
}
fn default_output_dir() -> String {
    "/var/lib/plumesim/datasets".to_string()
}
fn default_pool_repeats() -> usize {
    4
}
fn default_samples_per_scenario() -> usize {
    300
}
fn default_time_step() -> f64 {
    1.0
}
fn default_seed() -> u64 {
    42
}
fn default_parallel_runs() -> usize {
    4
}
fn default_stability() -> String {
    "d".to_string()
}
fn default_field_min() -> [f64; 3] {
    [-50.0, -50.0, 0.0]
}
fn default_field_max() -> [f64; 3] {
    [50.0, 50.0, 10.0]
}
fn default_preset() -> String {
    "consumer".to_string()
}
fn default_true() -> bool {
    true
}

fn default_sensors() -> Vec<SensorEntry> {
    vec![
        SensorEntry {
            id: "co-room".into(),
            kind: "chemical".into(),
            species: Some("co".into()),
            position: [8.0, 0.0, 1.5],
            preset: "consumer".into(),
            ground_truth: true,
        },
        SensorEntry {
            id: "voc-room".into(),
            kind: "chemical".into(),
            species: Some("voc".into()),
            position: [8.0, 2.0, 1.5],
            preset: "consumer".into(),
            ground_truth: true,
        },
        SensorEntry {
            id: "nh3-room".into(),
            kind: "chemical".into(),
            species: Some("ammonia".into()),
            position: [6.0, -2.0, 1.0],
            preset: "high_quality".into(),
            ground_truth: true,
        },
        SensorEntry {
            id: "temp-room".into(),
            kind: "temperature".into(),
            species: None,
            position: [5.0, 0.0, 1.8],
            preset: "consumer".into(),
            ground_truth: true,
        },
        SensorEntry {
            id: "emf-panel".into(),
            kind: "emf".into(),
            species: None,
            position: [-1.0, 2.0, 1.8],
            preset: "high_quality".into(),
            ground_truth: true,
        },
    ]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dataset_name: default_dataset_name(),
            output_directory: default_output_dir(),
            scenarios_file: None,
            pool_repeats: default_pool_repeats(),
            samples_per_scenario: default_samples_per_scenario(),
            time_step_s: default_time_step(),
            seed: default_seed(),
            parallel_runs: default_parallel_runs(),
            stability: default_stability(),
            field_min: default_field_min(),
            field_max: default_field_max(),
            balance_targets: HashMap::new(),
            sensors: default_sensors(),
            config_path: PathBuf::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from standard paths
    pub fn load() -> Result<Self> {
        let config_paths = [
            PathBuf::from("/etc/plumesim/config.toml"),
            dirs::config_dir()
                .map(|p| p.join("plumesim/config.toml"))
                .unwrap_or_default(),
            PathBuf::from("./config.toml"),
        ];

        for path in &config_paths {
            if path.exists() {
                return Self::load_from(path);
            }
        }

        tracing::warn!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: AppConfig = toml::from_str(&content)?;
        config.config_path = path.clone();
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &PathBuf) -> Result<()> {
        let content = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn stability_class(&self) -> Result<StabilityClass> {
        match self.stability.to_lowercase().as_str() {
            "a" => Ok(StabilityClass::A),
            "b" => Ok(StabilityClass::B),
            "c" => Ok(StabilityClass::C),
            "d" => Ok(StabilityClass::D),
            "e" => Ok(StabilityClass::E),
            "f" => Ok(StabilityClass::F),
            other => bail!("unknown stability class `{other}` (expected a-f)"),
        }
    }

    /// Translate into the generator configuration.
    pub fn generation_config(&self) -> Result<GenerationConfig> {
        Ok(GenerationConfig {
            time_step_s: self.time_step_s,
            samples_per_scenario: self.samples_per_scenario,
            seed: self.seed,
            parallel_runs: self.parallel_runs,
            field_min: self.field_min,
            field_max: self.field_max,
            boundary_policy: BoundaryPolicy::Clamp,
            stability: self.stability_class()?,
            ..Default::default()
        })
    }

    /// Build the configured sensor array.
    pub fn build_array(&self) -> Result<SensorArray> {
        let mut array = SensorArray::new(&self.dataset_name);
        for entry in &self.sensors {
            let kind = match entry.kind.to_lowercase().as_str() {
                "chemical" => {
                    let species = entry.species.as_deref().with_context(|| {
                        format!("sensor `{}`: chemical sensors need a species", entry.id)
                    })?;
                    SensorKind::chemical(species)
                }
                "temperature" => SensorKind::Temperature,
                "emf" => SensorKind::Emf,
                "acoustic" => SensorKind::Acoustic,
                other => bail!("sensor `{}`: unknown kind `{other}`", entry.id),
            };
            let pipeline = ImperfectionPipeline::preset(&entry.preset)
                .with_context(|| format!("sensor `{}`", entry.id))?;
            let sensor = VirtualSensor::new(
                &entry.id,
                kind,
                Point3::new(entry.position[0], entry.position[1], entry.position[2]),
            )?
            .with_pipeline(pipeline)?
            .with_ground_truth_capability(entry.ground_truth);
            array.add_sensor(sensor)?;
        }
        Ok(array)
    }

    /// Parse the balance target map into event classes.
    pub fn balance_classes(&self) -> Result<Vec<(EventClass, f64)>> {
        self.balance_targets
            .iter()
            .map(|(name, fraction)| {
                let class = match name.as_str() {
                    "normal" => EventClass::Normal,
                    "fire_precursor" => EventClass::FirePrecursor,
                    "electrical_fault" => EventClass::ElectricalFault,
                    "chemical_spill" => EventClass::ChemicalSpill,
                    other => bail!("unknown balance class `{other}`"),
                };
                Ok((class, *fraction))
            })
            .collect()
    }
}

/// Helper for getting config directories
mod dirs {
    use std::path::PathBuf;

    pub fn config_dir() -> Option<PathBuf> {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}
