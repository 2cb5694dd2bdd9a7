//! PlumeSim Physics Layer
//!
//! Analytical environmental modeling for the PlumeSim virtual sensor suite:
//! bounded 3D fields, emission sources, and Gaussian plume dispersion.
//!
//! # Modules
//!
//! - [`field`] - Bounded simulation volume, ambient conditions, read-only field views
//! - [`sources`] - Emission sources with temporal strength patterns
//! - [`environment`] - Barriers, HVAC air exchange, temperature/humidity coupling
//! - [`dispersion`] - Gaussian plume superposition engine with calm-wind fallback
//!
//! # Example
//!
//! ```rust
//! use plumesim_physics::{
//!     DispersionConfig, DispersionEngine, EmissionPattern, FieldBounds,
//!     BoundaryPolicy, MaterialProperties, SourceKind, SourceModel, SpatialField,
//! };
//! use nalgebra::{Point3, Vector3};
//!
//! let bounds = FieldBounds::new(
//!     Point3::new(-50.0, -50.0, 0.0),
//!     Point3::new(50.0, 50.0, 10.0),
//! ).unwrap();
//!
//! let mut field = SpatialField::new(bounds, BoundaryPolicy::Clamp);
//! field.set_airflow(Vector3::new(1.0, 0.0, 0.0));
//!
//! let source = SourceModel::new(
//!     "leak-1",
//!     SourceKind::chemical("co"),
//!     Point3::new(0.0, 0.0, 1.5),
//!     EmissionPattern::Constant { rate: 100.0 },
//!     MaterialProperties::default(),
//! ).unwrap();
//! field.install_source(source).unwrap();
//!
//! let engine = DispersionEngine::new(DispersionConfig::default()).unwrap();
//! let c = engine
//!     .concentration_at(&field.view(), Point3::new(10.0, 0.0, 1.5), 0.0)
//!     .unwrap();
//! assert!(c > 0.0);
//! ```

pub mod field;
pub mod sources;
pub mod environment;
pub mod dispersion;

// Re-exports for convenience
pub use field::{AmbientConditions, BoundaryPolicy, FieldBounds, FieldView, SpatialField};
pub use sources::{EmissionPattern, MaterialProperties, SourceKind, SourceModel};
pub use environment::{Barrier, BarrierMaterial, Environment, HvacSystem};
pub use dispersion::{
    DispersionCoefficients, DispersionConfig, DispersionEngine, PowerLaw, StabilityClass,
};

/// Physics error types
#[derive(Debug, thiserror::Error)]
pub enum PhysicsError {
    /// Invalid or missing configuration parameter, detected at setup.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// A computed field value broke a physical invariant. Fatal to the
    /// current timestep; the owning run must be flagged, never continued.
    #[error("physics invariant violated in {context}: {reason}")]
    Violation { context: &'static str, reason: String },

    /// Query point rejected by the field's boundary policy.
    #[error("query point ({0:.2}, {1:.2}, {2:.2}) is outside the field bounds")]
    OutOfBounds(f64, f64, f64),

    /// Source lookup failed.
    #[error("source not found: {0}")]
    SourceNotFound(String),

    /// Source id collision at installation time.
    #[error("duplicate source id: {0}")]
    DuplicateSource(String),
}

impl PhysicsError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PhysicsError>;

/// Reject non-finite configuration values before they reach the simulation.
pub(crate) fn ensure_finite(name: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(PhysicsError::invalid(name, format!("{value} is not finite")))
    }
}
