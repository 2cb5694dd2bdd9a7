//! Built-in scenario library.
//!
//! Four situations spanning the label space: normal operation, a smoldering
//! fire precursor, an electrical fault, and a chemical spill. Each owns a
//! strongly typed, validated parameter struct that round-trips losslessly
//! through the stored JSON form.

use crate::scenario::{
    decode_params, encode_params, Difficulty, Scenario, ScenarioCategory, ScenarioMetadata,
    StoredScenario,
};
use crate::{DatasetError, EventClass, Result};
use nalgebra::{Point3, Vector3};
use plumesim_physics::{
    EmissionPattern, MaterialProperties, SourceKind, SourceModel, SpatialField,
};
use serde::{Deserialize, Serialize};

fn check_positive(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(DatasetError::InvalidConfig(format!(
            "{name} = {value} must be positive"
        )));
    }
    Ok(())
}

fn check_non_negative(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(DatasetError::InvalidConfig(format!(
            "{name} = {value} must be non-negative"
        )));
    }
    Ok(())
}

fn wind_along_x(speed: f64) -> Vector3<f64> {
    Vector3::new(speed, 0.0, 0.0)
}

fn point(p: [f64; 3]) -> Point3<f64> {
    Point3::new(p[0], p[1], p[2])
}

// ---------------------------------------------------------------------------
// Normal operation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NormalOperationParams {
    pub duration_s: f64,
    pub temperature_c: f64,
    pub wind_speed: f64,
    /// Weak always-on VOC background, µg/s.
    pub background_voc_rate: f64,
}

impl Default for NormalOperationParams {
    fn default() -> Self {
        Self {
            duration_s: 600.0,
            temperature_c: 21.0,
            wind_speed: 0.3,
            background_voc_rate: 2.0,
        }
    }
}

impl NormalOperationParams {
    fn validate(&self) -> Result<()> {
        check_positive("duration_s", self.duration_s)?;
        check_non_negative("wind_speed", self.wind_speed)?;
        check_non_negative("background_voc_rate", self.background_voc_rate)?;
        if !self.temperature_c.is_finite() {
            return Err(DatasetError::InvalidConfig(
                "temperature_c is not finite".into(),
            ));
        }
        Ok(())
    }
}

pub struct NormalOperationScenario {
    metadata: ScenarioMetadata,
    params: NormalOperationParams,
}

pub(crate) fn build_normal_operation(value: &serde_json::Value) -> Result<Box<dyn Scenario>> {
    let params: NormalOperationParams = decode_params(value)?;
    params.validate()?;
    Ok(Box::new(NormalOperationScenario {
        metadata: ScenarioMetadata {
            id: "normal_operation".into(),
            name: "Normal operation".into(),
            category: ScenarioCategory::Nominal,
            difficulty: Difficulty::Baseline,
            expected_duration_s: params.duration_s,
        },
        params,
    }))
}

impl Scenario for NormalOperationScenario {
    fn metadata(&self) -> &ScenarioMetadata {
        &self.metadata
    }

    fn params_json(&self) -> Result<serde_json::Value> {
        encode_params(&self.params)
    }

    fn setup(&mut self, field: &mut SpatialField) -> Result<()> {
        let mut ambient = field.ambient().clone();
        ambient.temperature_c = self.params.temperature_c;
        ambient.airflow = wind_along_x(self.params.wind_speed);
        field.set_ambient(ambient)?;
        field.set_baseline("voc", 5.0)?;

        if self.params.background_voc_rate > 0.0 {
            field.install_source(SourceModel::new(
                "background-voc",
                SourceKind::chemical("voc"),
                Point3::new(0.0, 0.0, 0.5),
                EmissionPattern::Diurnal {
                    base_rate: self.params.background_voc_rate,
                    amplitude: self.params.background_voc_rate * 0.5,
                    phase_rad: 0.0,
                },
                MaterialProperties::default(),
            )?)?;
        }
        Ok(())
    }

    fn update(&mut self, _field: &mut SpatialField, _time: f64, _dt: f64) -> Result<()> {
        Ok(())
    }

    fn label(&self, _time: f64) -> (EventClass, f64) {
        (EventClass::Normal, 0.0)
    }

    fn is_completed(&self, time: f64) -> bool {
        time >= self.params.duration_s
    }
}

// ---------------------------------------------------------------------------
// Fire precursor
// ---------------------------------------------------------------------------

/// Severity ramps from ignition to fully developed over this window.
const FIRE_RAMP_S: f64 = 300.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FirePrecursorParams {
    pub duration_s: f64,
    pub ignition_time_s: f64,
    /// CO release rate of the smoldering source, µg/s.
    pub co_rate: f64,
    /// Heat release of the hotspot, watts.
    pub heat_release_w: f64,
    pub wind_speed: f64,
    pub source_position: [f64; 3],
}

impl Default for FirePrecursorParams {
    fn default() -> Self {
        Self {
            duration_s: 900.0,
            ignition_time_s: 120.0,
            co_rate: 800.0,
            heat_release_w: 2000.0,
            wind_speed: 0.4,
            source_position: [2.0, 1.0, 0.5],
        }
    }
}

impl FirePrecursorParams {
    fn validate(&self) -> Result<()> {
        check_positive("duration_s", self.duration_s)?;
        check_non_negative("ignition_time_s", self.ignition_time_s)?;
        check_positive("co_rate", self.co_rate)?;
        check_positive("heat_release_w", self.heat_release_w)?;
        check_non_negative("wind_speed", self.wind_speed)?;
        if self.ignition_time_s >= self.duration_s {
            return Err(DatasetError::InvalidConfig(format!(
                "ignition_time_s {} must fall within duration_s {}",
                self.ignition_time_s, self.duration_s
            )));
        }
        Ok(())
    }
}

pub struct FirePrecursorScenario {
    metadata: ScenarioMetadata,
    params: FirePrecursorParams,
    ignited: bool,
}

pub(crate) fn build_fire_precursor(value: &serde_json::Value) -> Result<Box<dyn Scenario>> {
    let params: FirePrecursorParams = decode_params(value)?;
    params.validate()?;
    Ok(Box::new(FirePrecursorScenario {
        metadata: ScenarioMetadata {
            id: "fire_precursor".into(),
            name: "Smoldering fire precursor".into(),
            category: ScenarioCategory::Hazard,
            difficulty: Difficulty::Moderate,
            expected_duration_s: params.duration_s,
        },
        params,
        ignited: false,
    }))
}

impl Scenario for FirePrecursorScenario {
    fn metadata(&self) -> &ScenarioMetadata {
        &self.metadata
    }

    fn params_json(&self) -> Result<serde_json::Value> {
        encode_params(&self.params)
    }

    fn setup(&mut self, field: &mut SpatialField) -> Result<()> {
        let mut ambient = field.ambient().clone();
        ambient.airflow = wind_along_x(self.params.wind_speed);
        field.set_ambient(ambient)?;

        let position = point(self.params.source_position);
        field.install_source(SourceModel::new(
            "smolder-co",
            SourceKind::chemical("co"),
            position,
            EmissionPattern::EventTriggered {
                pattern: Box::new(EmissionPattern::Constant {
                    rate: self.params.co_rate,
                }),
            },
            MaterialProperties::default(),
        )?)?;
        field.install_source(SourceModel::new(
            "smolder-heat",
            SourceKind::Thermal,
            position,
            EmissionPattern::EventTriggered {
                pattern: Box::new(EmissionPattern::Constant {
                    rate: self.params.heat_release_w,
                }),
            },
            MaterialProperties::default(),
        )?)?;
        Ok(())
    }

    fn update(&mut self, field: &mut SpatialField, time: f64, _dt: f64) -> Result<()> {
        if !self.ignited && time >= self.params.ignition_time_s {
            field.source_mut("smolder-co")?.trigger(time)?;
            field.source_mut("smolder-heat")?.trigger(time)?;
            self.ignited = true;
            tracing::debug!(time, "fire precursor ignited");
        }
        Ok(())
    }

    fn label(&self, time: f64) -> (EventClass, f64) {
        if time < self.params.ignition_time_s {
            return (EventClass::Normal, 0.0);
        }
        let severity = ((time - self.params.ignition_time_s) / FIRE_RAMP_S).clamp(0.0, 1.0);
        (EventClass::FirePrecursor, severity)
    }

    fn is_completed(&self, time: f64) -> bool {
        time >= self.params.duration_s
    }
}

// ---------------------------------------------------------------------------
// Electrical fault
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElectricalFaultParams {
    pub duration_s: f64,
    pub fault_start_s: f64,
    /// EMF source strength, µT·m².
    pub emf_strength: f64,
    /// Arcing modulation period, seconds.
    pub arc_period_s: f64,
    pub arc_duty_cycle: f64,
    /// Localized ohmic heating, watts.
    pub hotspot_power_w: f64,
    pub wind_speed: f64,
    pub source_position: [f64; 3],
}

impl Default for ElectricalFaultParams {
    fn default() -> Self {
        Self {
            duration_s: 600.0,
            fault_start_s: 60.0,
            emf_strength: 400.0,
            arc_period_s: 2.0,
            arc_duty_cycle: 0.6,
            hotspot_power_w: 500.0,
            wind_speed: 0.2,
            source_position: [-3.0, 2.0, 1.8],
        }
    }
}

impl ElectricalFaultParams {
    fn validate(&self) -> Result<()> {
        check_positive("duration_s", self.duration_s)?;
        check_non_negative("fault_start_s", self.fault_start_s)?;
        check_positive("emf_strength", self.emf_strength)?;
        check_positive("arc_period_s", self.arc_period_s)?;
        check_positive("hotspot_power_w", self.hotspot_power_w)?;
        check_non_negative("wind_speed", self.wind_speed)?;
        if !(0.0..=1.0).contains(&self.arc_duty_cycle) {
            return Err(DatasetError::InvalidConfig(format!(
                "arc_duty_cycle {} must be within 0-1",
                self.arc_duty_cycle
            )));
        }
        if self.fault_start_s >= self.duration_s {
            return Err(DatasetError::InvalidConfig(format!(
                "fault_start_s {} must fall within duration_s {}",
                self.fault_start_s, self.duration_s
            )));
        }
        Ok(())
    }
}

pub struct ElectricalFaultScenario {
    metadata: ScenarioMetadata,
    params: ElectricalFaultParams,
    faulted: bool,
}

pub(crate) fn build_electrical_fault(value: &serde_json::Value) -> Result<Box<dyn Scenario>> {
    let params: ElectricalFaultParams = decode_params(value)?;
    params.validate()?;
    Ok(Box::new(ElectricalFaultScenario {
        metadata: ScenarioMetadata {
            id: "electrical_fault".into(),
            name: "Arcing electrical fault".into(),
            category: ScenarioCategory::Fault,
            difficulty: Difficulty::Moderate,
            expected_duration_s: params.duration_s,
        },
        params,
        faulted: false,
    }))
}

impl Scenario for ElectricalFaultScenario {
    fn metadata(&self) -> &ScenarioMetadata {
        &self.metadata
    }

    fn params_json(&self) -> Result<serde_json::Value> {
        encode_params(&self.params)
    }

    fn setup(&mut self, field: &mut SpatialField) -> Result<()> {
        let mut ambient = field.ambient().clone();
        ambient.airflow = wind_along_x(self.params.wind_speed);
        field.set_ambient(ambient)?;

        let position = point(self.params.source_position);
        field.install_source(SourceModel::new(
            "arc-emf",
            SourceKind::Emf,
            position,
            EmissionPattern::EventTriggered {
                pattern: Box::new(EmissionPattern::Pulsed {
                    rate: self.params.emf_strength,
                    period_s: self.params.arc_period_s,
                    duty_cycle: self.params.arc_duty_cycle,
                }),
            },
            MaterialProperties::default(),
        )?)?;
        field.install_source(SourceModel::new(
            "arc-hotspot",
            SourceKind::Thermal,
            position,
            EmissionPattern::EventTriggered {
                pattern: Box::new(EmissionPattern::Constant {
                    rate: self.params.hotspot_power_w,
                }),
            },
            MaterialProperties::default(),
        )?)?;
        Ok(())
    }

    fn update(&mut self, field: &mut SpatialField, time: f64, _dt: f64) -> Result<()> {
        if !self.faulted && time >= self.params.fault_start_s {
            field.source_mut("arc-emf")?.trigger(time)?;
            field.source_mut("arc-hotspot")?.trigger(time)?;
            self.faulted = true;
            tracing::debug!(time, "electrical fault engaged");
        }
        Ok(())
    }

    fn label(&self, time: f64) -> (EventClass, f64) {
        if time < self.params.fault_start_s {
            return (EventClass::Normal, 0.0);
        }
        // Arcing severity tracks the hotspot warm-up, capped within the
        // first two minutes of the fault.
        let severity = ((time - self.params.fault_start_s) / 120.0).clamp(0.1, 1.0);
        (EventClass::ElectricalFault, severity)
    }

    fn is_completed(&self, time: f64) -> bool {
        time >= self.params.duration_s
    }
}

// ---------------------------------------------------------------------------
// Chemical spill
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChemicalSpillParams {
    pub duration_s: f64,
    pub species: String,
    /// Initial evaporation rate, µg/s.
    pub release_rate: f64,
    /// First-order depletion constant of the spill, 1/s.
    pub decay_constant: f64,
    pub wind_speed: f64,
    pub source_position: [f64; 3],
}

impl Default for ChemicalSpillParams {
    fn default() -> Self {
        Self {
            duration_s: 1200.0,
            species: "ammonia".into(),
            release_rate: 5000.0,
            decay_constant: 1.0 / 600.0,
            wind_speed: 0.6,
            source_position: [0.0, -2.0, 0.1],
        }
    }
}

impl ChemicalSpillParams {
    fn validate(&self) -> Result<()> {
        check_positive("duration_s", self.duration_s)?;
        check_positive("release_rate", self.release_rate)?;
        check_non_negative("decay_constant", self.decay_constant)?;
        check_non_negative("wind_speed", self.wind_speed)?;
        if self.species.is_empty() {
            return Err(DatasetError::InvalidConfig(
                "species must not be empty".into(),
            ));
        }
        Ok(())
    }
}

pub struct ChemicalSpillScenario {
    metadata: ScenarioMetadata,
    params: ChemicalSpillParams,
}

pub(crate) fn build_chemical_spill(value: &serde_json::Value) -> Result<Box<dyn Scenario>> {
    let params: ChemicalSpillParams = decode_params(value)?;
    params.validate()?;
    Ok(Box::new(ChemicalSpillScenario {
        metadata: ScenarioMetadata {
            id: "chemical_spill".into(),
            name: "Evaporating chemical spill".into(),
            category: ScenarioCategory::Hazard,
            difficulty: Difficulty::Challenging,
            expected_duration_s: params.duration_s,
        },
        params,
    }))
}

impl Scenario for ChemicalSpillScenario {
    fn metadata(&self) -> &ScenarioMetadata {
        &self.metadata
    }

    fn params_json(&self) -> Result<serde_json::Value> {
        encode_params(&self.params)
    }

    fn setup(&mut self, field: &mut SpatialField) -> Result<()> {
        let mut ambient = field.ambient().clone();
        ambient.airflow = wind_along_x(self.params.wind_speed);
        field.set_ambient(ambient)?;

        field.install_source(SourceModel::new(
            "spill",
            SourceKind::Chemical {
                species: self.params.species.clone(),
            },
            point(self.params.source_position),
            EmissionPattern::Decaying {
                initial_rate: self.params.release_rate,
                decay_constant: self.params.decay_constant,
            },
            MaterialProperties::default(),
        )?)?;
        Ok(())
    }

    fn update(&mut self, _field: &mut SpatialField, _time: f64, _dt: f64) -> Result<()> {
        Ok(())
    }

    fn label(&self, time: f64) -> (EventClass, f64) {
        // Severity follows the remaining evaporation fraction.
        let severity = (-self.params.decay_constant * time.max(0.0)).exp();
        (EventClass::ChemicalSpill, severity.clamp(0.0, 1.0))
    }

    fn is_completed(&self, time: f64) -> bool {
        time >= self.params.duration_s
    }
}

/// A ready-made scenario pool covering every label class, used by the
/// runner when no scenario file is supplied.
pub fn default_pool() -> Vec<StoredScenario> {
    let pool: Vec<(&str, serde_json::Value)> = vec![
        (
            "normal_operation",
            serde_json::to_value(NormalOperationParams::default()).expect("default params"),
        ),
        (
            "fire_precursor",
            serde_json::to_value(FirePrecursorParams::default()).expect("default params"),
        ),
        (
            "electrical_fault",
            serde_json::to_value(ElectricalFaultParams::default()).expect("default params"),
        ),
        (
            "chemical_spill",
            serde_json::to_value(ChemicalSpillParams::default()).expect("default params"),
        ),
    ];
    pool.into_iter()
        .map(|(name, params)| StoredScenario::new(name, params))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::ScenarioRegistry;
    use plumesim_physics::{BoundaryPolicy, FieldBounds};

    fn field() -> SpatialField {
        let bounds = FieldBounds::new(
            Point3::new(-50.0, -50.0, 0.0),
            Point3::new(50.0, 50.0, 10.0),
        )
        .unwrap();
        SpatialField::new(bounds, BoundaryPolicy::Clamp)
    }

    #[test]
    fn all_params_round_trip_exactly() {
        let normal = NormalOperationParams::default();
        let fire = FirePrecursorParams::default();
        let fault = ElectricalFaultParams::default();
        let spill = ChemicalSpillParams::default();

        assert_eq!(
            decode_params::<NormalOperationParams>(&encode_params(&normal).unwrap()).unwrap(),
            normal
        );
        assert_eq!(
            decode_params::<FirePrecursorParams>(&encode_params(&fire).unwrap()).unwrap(),
            fire
        );
        assert_eq!(
            decode_params::<ElectricalFaultParams>(&encode_params(&fault).unwrap()).unwrap(),
            fault
        );
        assert_eq!(
            decode_params::<ChemicalSpillParams>(&encode_params(&spill).unwrap()).unwrap(),
            spill
        );
    }

    #[test]
    fn builders_reject_invalid_params() {
        let bad = serde_json::to_value(FirePrecursorParams {
            ignition_time_s: 2000.0,
            duration_s: 900.0,
            ..Default::default()
        })
        .unwrap();
        assert!(build_fire_precursor(&bad).is_err());

        let bad = serde_json::to_value(ChemicalSpillParams {
            release_rate: -5.0,
            ..Default::default()
        })
        .unwrap();
        assert!(build_chemical_spill(&bad).is_err());
    }

    #[test]
    fn fire_precursor_ignites_on_schedule() {
        let value = serde_json::to_value(FirePrecursorParams {
            ignition_time_s: 100.0,
            ..Default::default()
        })
        .unwrap();
        let mut scenario = build_fire_precursor(&value).unwrap();
        let mut field = field();
        scenario.setup(&mut field).unwrap();

        scenario.update(&mut field, 50.0, 1.0).unwrap();
        assert_eq!(field.sources()[0].emission_strength(50.0), 0.0);
        assert_eq!(scenario.label(50.0).0, EventClass::Normal);

        scenario.update(&mut field, 120.0, 1.0).unwrap();
        let co = field
            .sources()
            .iter()
            .find(|s| s.id() == "smolder-co")
            .unwrap();
        assert!(co.emission_strength(150.0) > 0.0);
        let (event, severity) = scenario.label(200.0);
        assert_eq!(event, EventClass::FirePrecursor);
        assert!(severity > 0.0 && severity <= 1.0);
    }

    #[test]
    fn spill_severity_decays_toward_zero() {
        let value = serde_json::to_value(ChemicalSpillParams::default()).unwrap();
        let scenario = build_chemical_spill(&value).unwrap();
        let early = scenario.label(10.0).1;
        let late = scenario.label(3000.0).1;
        assert!(early > late);
        assert!(late >= 0.0);
    }

    #[test]
    fn default_pool_builds_under_the_registry() {
        let registry = ScenarioRegistry::builtin();
        for stored in default_pool() {
            let scenario = registry.build(&stored).unwrap();
            assert!(!scenario.metadata().id.is_empty());
        }
    }

    #[test]
    fn normal_scenario_completes_and_stays_normal() {
        let value = serde_json::to_value(NormalOperationParams {
            duration_s: 60.0,
            ..Default::default()
        })
        .unwrap();
        let mut scenario = build_normal_operation(&value).unwrap();
        let mut field = field();
        scenario.setup(&mut field).unwrap();
        assert!(!scenario.is_completed(30.0));
        assert!(scenario.is_completed(60.0));
        assert_eq!(scenario.label(30.0), (EventClass::Normal, 0.0));
    }
}
