//! PlumeSim Virtual Sensor Library
//!
//! Samples the physics layer's dispersion fields through a configurable
//! measurement-imperfection pipeline, producing paired
//! (imperfect reading, ground truth) values for training data generation.

pub mod pipeline;
pub mod sensor;
pub mod array;

pub use pipeline::{
    Calibration, CrossSensitivity, Drift, EnvCompensation, ImperfectionPipeline, Noise,
    Quantization,
};
pub use sensor::{SamplingVolume, SensorKind, SensorMetadata, VirtualSensor};
pub use array::SensorArray;

use plumesim_physics::PhysicsError;
use serde::{Deserialize, Serialize};

/// One sensor reading at a simulated instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub sensor_id: String,
    pub value: f64,
    pub unit: String,
    /// Simulated time in seconds since scenario start.
    pub timestamp: f64,
    /// Heuristic signal quality, 0.0 - 1.0.
    pub quality: f32,
}

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("physics error: {0}")]
    Physics(#[from] PhysicsError),

    /// Ground truth requested from a sensor that cannot provide it.
    /// Fatal to the calling operation only.
    #[error("sensor `{0}` has no ground-truth capability")]
    GroundTruthUnsupported(String),

    #[error("sensor not found: {0}")]
    SensorNotFound(String),

    #[error("duplicate sensor id: {0}")]
    DuplicateSensor(String),

    #[error("invalid sensor configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, SensorError>;
