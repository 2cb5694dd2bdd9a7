//! PlumeSim Data Generation Library
//!
//! Drives scenarios over simulated time, samples sensor arrays, and
//! assembles labeled training datasets with statistical balancing, edge
//! case exploration, and active-learning feedback.

pub mod scenario;
pub mod library;
pub mod dataset;
pub mod active;

pub use scenario::{
    Difficulty, Scenario, ScenarioCategory, ScenarioDriver, ScenarioMetadata, ScenarioRegistry,
    ScenarioState, StoredScenario,
};
pub use dataset::{
    Dataset, DatasetGenerator, GenerationConfig, GenerationReport, PerturbationStrategy, Progress,
    ValidationBounds,
};
pub use active::{
    ActiveLearningCoordinator, BlendedStrategy, HighFidelityWeighted, ModelFeedback,
    ParameterDelta, PrioritizationStrategy, RealTimeWeighted, RegionFeedback, WeakSpot,
};

use plumesim_physics::PhysicsError;
use plumesim_sensors::{Reading, SensorError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ground-truth event classification for a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventClass {
    Normal,
    FirePrecursor,
    ElectricalFault,
    ChemicalSpill,
}

impl EventClass {
    pub fn label(&self) -> &'static str {
        match self {
            EventClass::Normal => "normal",
            EventClass::FirePrecursor => "fire_precursor",
            EventClass::ElectricalFault => "electrical_fault",
            EventClass::ChemicalSpill => "chemical_spill",
        }
    }
}

/// Ground-truth label attached to every sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthLabel {
    pub event: EventClass,
    /// Situation severity, 0.0 (nominal) to 1.0 (fully developed).
    pub severity: f64,
    /// True field values per ground-truth-capable sensor.
    pub true_values: BTreeMap<String, f64>,
}

/// One labeled training sample: imperfect readings paired with ground
/// truth at a single simulated timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Simulated time in seconds since scenario start.
    pub timestamp: f64,
    pub scenario_id: String,
    pub readings: BTreeMap<String, Reading>,
    pub label: GroundTruthLabel,
}

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("physics error: {0}")]
    Physics(#[from] PhysicsError),

    #[error("sensor error: {0}")]
    Sensor(#[from] SensorError),

    #[error("invalid generation configuration: {0}")]
    InvalidConfig(String),

    /// Scenario parameter round-trip failure; names the offending field.
    #[error("serialization failure in field `{field}`: {message}")]
    Serialization { field: String, message: String },

    #[error("unknown scenario type: {0}")]
    UnknownScenario(String),

    #[error("scenario `{scenario}` in state {state:?} cannot {operation}")]
    ScenarioState {
        scenario: String,
        state: ScenarioState,
        operation: &'static str,
    },

    #[error("generation cancelled")]
    Cancelled,

    #[error("dataset export error: {0}")]
    Export(String),
}

pub type Result<T> = std::result::Result<T, DatasetError>;

/// Map a serde_json error to a [`DatasetError::Serialization`] carrying
/// the offending field name. serde reports unknown and missing fields in
/// backticks; fall back to the raw message otherwise.
pub(crate) fn serialization_error(err: serde_json::Error) -> DatasetError {
    let message = err.to_string();
    let field = message
        .split('`')
        .nth(1)
        .unwrap_or("<unknown>")
        .to_string();
    DatasetError::Serialization { field, message }
}
