//! Bounded simulation volume and ambient environmental state.
//!
//! A [`SpatialField`] is created once per scenario run, mutated each timestep
//! by the scenario driver (installing sources, moving air), and handed to
//! sensors only as a read-only [`FieldView`].

use crate::environment::Environment;
use crate::sources::SourceModel;
use crate::{ensure_finite, PhysicsError, Result};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Axis-aligned bounds of the simulated volume, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldBounds {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl FieldBounds {
    /// Create bounds, rejecting degenerate or non-finite extents.
    pub fn new(min: Point3<f64>, max: Point3<f64>) -> Result<Self> {
        for (axis, (lo, hi)) in [(min.x, max.x), (min.y, max.y), (min.z, max.z)]
            .into_iter()
            .enumerate()
        {
            ensure_finite("bounds.min", lo)?;
            ensure_finite("bounds.max", hi)?;
            if lo >= hi {
                return Err(PhysicsError::invalid(
                    "bounds",
                    format!("axis {axis}: min {lo} must be below max {hi}"),
                ));
            }
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, p: Point3<f64>) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Clamp a point onto the bounded volume.
    pub fn clamp(&self, p: Point3<f64>) -> Point3<f64> {
        Point3::new(
            p.x.clamp(self.min.x, self.max.x),
            p.y.clamp(self.min.y, self.max.y),
            p.z.clamp(self.min.z, self.max.z),
        )
    }

    /// Volume of the bounded region in cubic meters.
    pub fn volume(&self) -> f64 {
        (self.max.x - self.min.x) * (self.max.y - self.min.y) * (self.max.z - self.min.z)
    }
}

/// What happens to query points outside the bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// Clamp the query point onto the volume surface.
    Clamp,
    /// Reject the query with [`PhysicsError::OutOfBounds`].
    Reject,
}

/// Ambient environmental state shared by the whole volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbientConditions {
    /// Air temperature in degrees Celsius.
    pub temperature_c: f64,
    /// Relative humidity, 0-100 percent.
    pub relative_humidity: f64,
    /// Barometric pressure in hPa.
    pub pressure_hpa: f64,
    /// Prevailing airflow vector in m/s.
    pub airflow: Vector3<f64>,
}

impl Default for AmbientConditions {
    fn default() -> Self {
        Self {
            temperature_c: 20.0,
            relative_humidity: 50.0,
            pressure_hpa: 1013.25,
            airflow: Vector3::zeros(),
        }
    }
}

impl AmbientConditions {
    pub fn validate(&self) -> Result<()> {
        ensure_finite("ambient.temperature_c", self.temperature_c)?;
        ensure_finite("ambient.relative_humidity", self.relative_humidity)?;
        ensure_finite("ambient.pressure_hpa", self.pressure_hpa)?;
        for component in [self.airflow.x, self.airflow.y, self.airflow.z] {
            ensure_finite("ambient.airflow", component)?;
        }
        if self.temperature_c <= -273.15 {
            return Err(PhysicsError::invalid(
                "ambient.temperature_c",
                format!("{} is below absolute zero", self.temperature_c),
            ));
        }
        if !(0.0..=100.0).contains(&self.relative_humidity) {
            return Err(PhysicsError::invalid(
                "ambient.relative_humidity",
                format!("{} must be within 0-100%", self.relative_humidity),
            ));
        }
        if self.pressure_hpa <= 0.0 {
            return Err(PhysicsError::invalid(
                "ambient.pressure_hpa",
                format!("{} must be positive", self.pressure_hpa),
            ));
        }
        Ok(())
    }

    /// Wind speed magnitude in m/s.
    pub fn wind_speed(&self) -> f64 {
        self.airflow.norm()
    }
}

/// The bounded 3D simulation volume for one scenario run.
///
/// Owns the installed emission sources and the environmental geometry.
/// Sensors never touch this type directly; they receive a [`FieldView`].
pub struct SpatialField {
    bounds: FieldBounds,
    boundary_policy: BoundaryPolicy,
    ambient: AmbientConditions,
    baselines: HashMap<String, f64>,
    sources: Vec<SourceModel>,
    environment: Environment,
    grid_spacing: Option<f64>,
}

impl SpatialField {
    pub fn new(bounds: FieldBounds, boundary_policy: BoundaryPolicy) -> Self {
        Self {
            bounds,
            boundary_policy,
            ambient: AmbientConditions::default(),
            baselines: HashMap::new(),
            sources: Vec::new(),
            environment: Environment::default(),
            grid_spacing: None,
        }
    }

    /// Optional grid spacing for downstream concentration caching.
    pub fn with_grid_spacing(mut self, spacing_m: f64) -> Result<Self> {
        ensure_finite("grid_spacing", spacing_m)?;
        if spacing_m <= 0.0 {
            return Err(PhysicsError::invalid(
                "grid_spacing",
                format!("{spacing_m} must be positive"),
            ));
        }
        self.grid_spacing = Some(spacing_m);
        Ok(self)
    }

    pub fn bounds(&self) -> &FieldBounds {
        &self.bounds
    }

    pub fn boundary_policy(&self) -> BoundaryPolicy {
        self.boundary_policy
    }

    pub fn grid_spacing(&self) -> Option<f64> {
        self.grid_spacing
    }

    pub fn ambient(&self) -> &AmbientConditions {
        &self.ambient
    }

    pub fn set_ambient(&mut self, ambient: AmbientConditions) -> Result<()> {
        ambient.validate()?;
        self.ambient = ambient;
        Ok(())
    }

    pub fn set_airflow(&mut self, airflow: Vector3<f64>) {
        self.ambient.airflow = airflow;
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.environment
    }

    /// Ambient baseline concentration for a chemical species, µg/m³.
    pub fn baseline(&self, species: &str) -> f64 {
        self.baselines.get(species).copied().unwrap_or(0.0)
    }

    /// All configured species baselines.
    pub fn baselines(&self) -> impl Iterator<Item = (&str, f64)> {
        self.baselines.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn set_baseline(&mut self, species: &str, value: f64) -> Result<()> {
        ensure_finite("baseline", value)?;
        if value < 0.0 {
            return Err(PhysicsError::invalid(
                "baseline",
                format!("{value} must be non-negative"),
            ));
        }
        self.baselines.insert(species.to_string(), value);
        Ok(())
    }

    /// Install a source, rejecting id collisions.
    pub fn install_source(&mut self, source: SourceModel) -> Result<()> {
        if self.sources.iter().any(|s| s.id() == source.id()) {
            return Err(PhysicsError::DuplicateSource(source.id().to_string()));
        }
        if !self.bounds.contains(source.position()) {
            return Err(PhysicsError::invalid(
                "source.position",
                format!("source `{}` lies outside the field bounds", source.id()),
            ));
        }
        tracing::debug!(source = source.id(), "source installed");
        self.sources.push(source);
        Ok(())
    }

    pub fn remove_source(&mut self, id: &str) -> Option<SourceModel> {
        let idx = self.sources.iter().position(|s| s.id() == id)?;
        Some(self.sources.remove(idx))
    }

    /// Drop sources the scenario has marked expired. Returns how many left.
    pub fn remove_expired(&mut self, time: f64) -> usize {
        let before = self.sources.len();
        self.sources.retain(|s| !s.is_expired(time));
        let removed = before - self.sources.len();
        if removed > 0 {
            tracing::debug!(removed, time, "expired sources removed");
        }
        removed
    }

    pub fn sources(&self) -> &[SourceModel] {
        &self.sources
    }

    pub fn source_mut(&mut self, id: &str) -> Result<&mut SourceModel> {
        self.sources
            .iter_mut()
            .find(|s| s.id() == id)
            .ok_or_else(|| PhysicsError::SourceNotFound(id.to_string()))
    }

    /// Apply the boundary policy to a query point.
    pub fn resolve(&self, p: Point3<f64>) -> Result<Point3<f64>> {
        if self.bounds.contains(p) {
            return Ok(p);
        }
        match self.boundary_policy {
            BoundaryPolicy::Clamp => Ok(self.bounds.clamp(p)),
            BoundaryPolicy::Reject => Err(PhysicsError::OutOfBounds(p.x, p.y, p.z)),
        }
    }

    /// Read-only view for sensors and the dispersion engine.
    pub fn view(&self) -> FieldView<'_> {
        FieldView { field: self }
    }
}

/// Read-only, non-owning view of a [`SpatialField`].
#[derive(Clone, Copy)]
pub struct FieldView<'a> {
    field: &'a SpatialField,
}

impl<'a> FieldView<'a> {
    pub fn bounds(&self) -> &FieldBounds {
        self.field.bounds()
    }

    pub fn ambient(&self) -> &AmbientConditions {
        self.field.ambient()
    }

    pub fn environment(&self) -> &Environment {
        self.field.environment()
    }

    pub fn baseline(&self, species: &str) -> f64 {
        self.field.baseline(species)
    }

    pub fn baselines(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.field.baselines()
    }

    pub fn sources(&self) -> &[SourceModel] {
        self.field.sources()
    }

    pub fn resolve(&self, p: Point3<f64>) -> Result<Point3<f64>> {
        self.field.resolve(p)
    }
}
