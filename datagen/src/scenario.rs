//! Scenario state machine, driver, and registry.
//!
//! A scenario realizes one named situation over simulated time. The driver
//! walks it through CONFIGURED -> RUNNING -> COMPLETED (or ABORTED on a
//! validation failure), fully resolving source emission, field update, and
//! completion checks each timestep.

use crate::{serialization_error, DatasetError, EventClass, Result};
use plumesim_physics::{DispersionEngine, FieldView, SpatialField};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Scenario grouping used for dataset balancing and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioCategory {
    Nominal,
    Hazard,
    Fault,
}

/// Difficulty grading for curriculum-style training sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Baseline,
    Moderate,
    Challenging,
}

/// Descriptive metadata carried by every scenario instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioMetadata {
    pub id: String,
    pub name: String,
    pub category: ScenarioCategory,
    pub difficulty: Difficulty,
    pub expected_duration_s: f64,
}

/// Run state of a scenario under a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScenarioState {
    Configured,
    Running,
    Completed,
    Aborted,
}

/// One simulated situation: installs sources at setup, mutates them each
/// timestep, and reports ground-truth labels.
pub trait Scenario: Send {
    fn metadata(&self) -> &ScenarioMetadata;

    /// The strongly typed parameters, serialized for storage/provenance.
    fn params_json(&self) -> Result<serde_json::Value>;

    /// Install sources and initial field state.
    fn setup(&mut self, field: &mut SpatialField) -> Result<()>;

    /// Advance one timestep: mutate sources (e.g. ignite a triggered one)
    /// and ambient state.
    fn update(&mut self, field: &mut SpatialField, time: f64, dt: f64) -> Result<()>;

    /// Ground-truth situation label at the given time.
    fn label(&self, time: f64) -> (EventClass, f64);

    /// Completion predicate; must stay true once it becomes true.
    fn is_completed(&self, time: f64) -> bool;
}

/// Persisted scenario record: class identity plus a parameter blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredScenario {
    pub scenario_type: String,
    pub params: serde_json::Value,
}

impl StoredScenario {
    pub fn new(scenario_type: &str, params: serde_json::Value) -> Self {
        Self {
            scenario_type: scenario_type.to_string(),
            params,
        }
    }
}

/// Decode a typed parameter struct from a stored blob, surfacing the
/// offending field on failure instead of silently defaulting.
pub fn decode_params<T: DeserializeOwned>(value: &serde_json::Value) -> Result<T> {
    serde_json::from_value(value.clone()).map_err(serialization_error)
}

/// Encode typed parameters to the stored blob form.
pub fn encode_params<T: Serialize>(params: &T) -> Result<serde_json::Value> {
    serde_json::to_value(params).map_err(serialization_error)
}

type ScenarioBuilder = fn(&serde_json::Value) -> Result<Box<dyn Scenario>>;

/// Explicit startup-time registration table mapping a scenario-type
/// identifier to a constructor. No reflection, no dynamic class loading.
#[derive(Clone)]
pub struct ScenarioRegistry {
    builders: HashMap<String, ScenarioBuilder>,
}

impl ScenarioRegistry {
    pub fn empty() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// The built-in scenario library.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("normal_operation", crate::library::build_normal_operation);
        registry.register("fire_precursor", crate::library::build_fire_precursor);
        registry.register("electrical_fault", crate::library::build_electrical_fault);
        registry.register("chemical_spill", crate::library::build_chemical_spill);
        registry
    }

    pub fn register(&mut self, scenario_type: &str, builder: ScenarioBuilder) {
        self.builders.insert(scenario_type.to_string(), builder);
    }

    pub fn build(&self, stored: &StoredScenario) -> Result<Box<dyn Scenario>> {
        let builder = self
            .builders
            .get(&stored.scenario_type)
            .ok_or_else(|| DatasetError::UnknownScenario(stored.scenario_type.clone()))?;
        builder(&stored.params)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Orchestrates one scenario over one field instance.
pub struct ScenarioDriver {
    scenario: Box<dyn Scenario>,
    field: SpatialField,
    engine: DispersionEngine,
    state: ScenarioState,
    clock: f64,
    time_step: f64,
}

impl ScenarioDriver {
    pub fn new(
        scenario: Box<dyn Scenario>,
        field: SpatialField,
        engine: DispersionEngine,
        time_step: f64,
    ) -> Result<Self> {
        if !time_step.is_finite() || time_step <= 0.0 {
            return Err(DatasetError::InvalidConfig(format!(
                "time step {time_step} must be positive"
            )));
        }
        Ok(Self {
            scenario,
            field,
            engine,
            state: ScenarioState::Configured,
            clock: 0.0,
            time_step,
        })
    }

    pub fn state(&self) -> ScenarioState {
        self.state
    }

    pub fn time(&self) -> f64 {
        self.clock
    }

    pub fn metadata(&self) -> &ScenarioMetadata {
        self.scenario.metadata()
    }

    pub fn field_view(&self) -> FieldView<'_> {
        self.field.view()
    }

    pub fn engine(&self) -> &DispersionEngine {
        &self.engine
    }

    /// CONFIGURED -> RUNNING: install sources and initial field state.
    /// A setup failure aborts the run.
    pub fn setup_environment(&mut self) -> Result<()> {
        if self.state != ScenarioState::Configured {
            return Err(DatasetError::ScenarioState {
                scenario: self.scenario.metadata().id.clone(),
                state: self.state,
                operation: "setup",
            });
        }
        match self.scenario.setup(&mut self.field) {
            Ok(()) => {
                tracing::debug!(scenario = %self.scenario.metadata().id, "scenario running");
                self.state = ScenarioState::Running;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(scenario = %self.scenario.metadata().id, error = %e, "setup failed");
                self.state = ScenarioState::Aborted;
                Err(e)
            }
        }
    }

    /// Advance one timestep. Returns false once the scenario has
    /// completed; further calls are no-ops that leave field and source
    /// state unchanged.
    pub fn update(&mut self) -> Result<bool> {
        match self.state {
            ScenarioState::Completed => return Ok(false),
            ScenarioState::Running => {}
            other => {
                return Err(DatasetError::ScenarioState {
                    scenario: self.scenario.metadata().id.clone(),
                    state: other,
                    operation: "update",
                });
            }
        }

        let next = self.clock + self.time_step;
        if let Err(e) = self.scenario.update(&mut self.field, next, self.time_step) {
            tracing::warn!(scenario = %self.scenario.metadata().id, error = %e, "update failed");
            self.state = ScenarioState::Aborted;
            return Err(e);
        }
        self.clock = next;
        self.field.remove_expired(self.clock);

        if self.scenario.is_completed(self.clock) {
            tracing::debug!(
                scenario = %self.scenario.metadata().id,
                time = self.clock,
                "scenario completed"
            );
            self.state = ScenarioState::Completed;
            return Ok(false);
        }
        Ok(true)
    }

    /// Idempotent completion check.
    pub fn is_completed(&self) -> bool {
        self.state == ScenarioState::Completed
    }

    /// Ground-truth situation label at the current time.
    pub fn label(&self) -> (EventClass, f64) {
        self.scenario.label(self.clock)
    }
}
