//! Virtual sensor: samples the dispersion field at a fixed position through
//! the imperfection pipeline.

use crate::pipeline::ImperfectionPipeline;
use crate::{Reading, Result, SensorError};
use nalgebra::{Point3, Vector3};
use plumesim_physics::{DispersionEngine, FieldView, SourceKind};
use serde::{Deserialize, Serialize};

/// What physical quantity the sensor measures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Concentration of one chemical species, µg/m³.
    Chemical { species: String },
    /// Air temperature, °C.
    Temperature,
    /// Magnetic flux density, µT.
    Emf,
    /// Sound pressure level, dB.
    Acoustic,
}

impl SensorKind {
    pub fn chemical(species: &str) -> Self {
        Self::Chemical {
            species: species.to_string(),
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            SensorKind::Chemical { .. } => "µg/m³",
            SensorKind::Temperature => "°C",
            SensorKind::Emf => "µT",
            SensorKind::Acoustic => "dB",
        }
    }

    fn as_source_kind(&self) -> SourceKind {
        match self {
            SensorKind::Chemical { species } => SourceKind::Chemical {
                species: species.clone(),
            },
            SensorKind::Temperature => SourceKind::Thermal,
            SensorKind::Emf => SourceKind::Emf,
            SensorKind::Acoustic => SourceKind::Acoustic,
        }
    }
}

/// Point sample or averaged region around the sensor position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingVolume {
    Point,
    /// Average over the sphere surface via six axis-aligned probes.
    SphereAverage { radius: f64 },
}

/// Imperfection state exposed for ML feature engineering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorMetadata {
    pub sensor_id: String,
    pub operating_hours: f64,
    pub drift_gain: f64,
    pub drift_offset: f64,
    pub noise_sigma: f64,
    pub calibration_offset: f64,
    pub calibration_gain: f64,
    pub last_recalibration: f64,
}

/// A virtual sensor at a fixed position in the field.
///
/// Holds a read-only relationship to the field: sampling never mutates
/// field state, only the sensor's own stochastic pipeline state.
#[derive(Debug, Clone)]
pub struct VirtualSensor {
    id: String,
    kind: SensorKind,
    position: Point3<f64>,
    sampling: SamplingVolume,
    enabled: bool,
    ground_truth_capability: bool,
    pipeline: ImperfectionPipeline,
    last_recalibration: f64,
}

impl VirtualSensor {
    pub fn new(id: &str, kind: SensorKind, position: Point3<f64>) -> Result<Self> {
        if id.is_empty() {
            return Err(SensorError::InvalidConfig(
                "sensor id must not be empty".into(),
            ));
        }
        for component in [position.x, position.y, position.z] {
            if !component.is_finite() {
                return Err(SensorError::InvalidConfig(format!(
                    "sensor `{id}` position component {component} is not finite"
                )));
            }
        }
        Ok(Self {
            id: id.to_string(),
            kind,
            position,
            sampling: SamplingVolume::Point,
            enabled: true,
            ground_truth_capability: true,
            pipeline: ImperfectionPipeline::identity(),
            last_recalibration: 0.0,
        })
    }

    pub fn with_pipeline(mut self, pipeline: ImperfectionPipeline) -> Result<Self> {
        pipeline.validate()?;
        self.pipeline = pipeline;
        Ok(self)
    }

    pub fn with_sampling(mut self, sampling: SamplingVolume) -> Result<Self> {
        if let SamplingVolume::SphereAverage { radius } = sampling {
            if !radius.is_finite() || radius <= 0.0 {
                return Err(SensorError::InvalidConfig(format!(
                    "sampling radius {radius} must be positive"
                )));
            }
        }
        self.sampling = sampling;
        Ok(self)
    }

    pub fn with_ground_truth_capability(mut self, capable: bool) -> Self {
        self.ground_truth_capability = capable;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &SensorKind {
        &self.kind
    }

    pub fn position(&self) -> Point3<f64> {
        self.position
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn has_ground_truth_capability(&self) -> bool {
        self.ground_truth_capability
    }

    pub fn pipeline(&self) -> &ImperfectionPipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut ImperfectionPipeline {
        &mut self.pipeline
    }

    /// Reseed the stochastic pipeline for an independent run.
    pub fn reseed(&mut self, seed: u64) {
        self.pipeline.reseed(seed);
    }

    /// The idealized field value at the sensor location, no imperfections.
    fn true_value(
        &self,
        engine: &DispersionEngine,
        field: &FieldView,
        time: f64,
    ) -> Result<f64> {
        let kind = self.kind.as_source_kind();
        match self.sampling {
            SamplingVolume::Point => {
                Ok(engine.field_value(field, &kind, self.position, time)?)
            }
            SamplingVolume::SphereAverage { radius } => {
                // Deterministic octahedral probe set: center plus six
                // axis-aligned surface points.
                let offsets = [
                    Vector3::zeros(),
                    Vector3::new(radius, 0.0, 0.0),
                    Vector3::new(-radius, 0.0, 0.0),
                    Vector3::new(0.0, radius, 0.0),
                    Vector3::new(0.0, -radius, 0.0),
                    Vector3::new(0.0, 0.0, radius),
                    Vector3::new(0.0, 0.0, -radius),
                ];
                let mut sum = 0.0;
                for offset in &offsets {
                    sum += engine.field_value(field, &kind, self.position + offset, time)?;
                }
                Ok(sum / offsets.len() as f64)
            }
        }
    }

    /// True concentrations of every other chemical species present at the
    /// sensor location, for the cross-sensitivity stage.
    fn interferents(
        &self,
        engine: &DispersionEngine,
        field: &FieldView,
        time: f64,
    ) -> Result<Vec<(String, f64)>> {
        let target = match &self.kind {
            SensorKind::Chemical { species } => species.as_str(),
            _ => return Ok(Vec::new()),
        };
        let mut out: Vec<(String, f64)> = Vec::new();
        for source in field.sources() {
            if let SourceKind::Chemical { species } = source.kind() {
                if species != target && !out.iter().any(|(s, _)| s == species) {
                    let value = engine.concentration_of(field, species, self.position, time)?;
                    out.push((species.clone(), value));
                }
            }
        }
        Ok(out)
    }

    /// Produce an imperfect reading through the full pipeline.
    pub fn sample(
        &mut self,
        engine: &DispersionEngine,
        field: &FieldView,
        time: f64,
    ) -> Result<Reading> {
        let truth = self.true_value(engine, field, time)?;
        let interferents = self.interferents(engine, field, time)?;
        let operating_hours = self.operating_hours(time);
        let value = self
            .pipeline
            .apply(truth, &interferents, field.ambient(), operating_hours);
        Ok(Reading {
            sensor_id: self.id.clone(),
            value,
            unit: self.kind.unit().to_string(),
            timestamp: time,
            quality: self.quality_estimate(),
        })
    }

    /// The idealized reading, bypassing the entire imperfection pipeline.
    ///
    /// Sensors without ground-truth capability refuse instead of returning
    /// a degraded approximation.
    pub fn ground_truth(
        &self,
        engine: &DispersionEngine,
        field: &FieldView,
        time: f64,
    ) -> Result<Reading> {
        if !self.ground_truth_capability {
            return Err(SensorError::GroundTruthUnsupported(self.id.clone()));
        }
        let truth = self.true_value(engine, field, time)?;
        Ok(Reading {
            sensor_id: self.id.clone(),
            value: truth,
            unit: self.kind.unit().to_string(),
            timestamp: time,
            quality: 1.0,
        })
    }

    /// Explicit recalibration: resets the drift reference point and the
    /// correlated-noise state. Never invoked automatically.
    pub fn recalibrate(&mut self, time: f64) {
        tracing::debug!(sensor = %self.id, time, "sensor recalibrated");
        self.last_recalibration = time;
        self.pipeline.reset_state();
    }

    /// Elapsed operating time since the last recalibration, hours.
    pub fn operating_hours(&self, time: f64) -> f64 {
        ((time - self.last_recalibration) / 3600.0).max(0.0)
    }

    /// Imperfection state for ML feature engineering.
    pub fn ml_metadata(&self, time: f64) -> SensorMetadata {
        let hours = self.operating_hours(time);
        let (drift_gain, drift_offset) = self.pipeline.drift_state(hours);
        SensorMetadata {
            sensor_id: self.id.clone(),
            operating_hours: hours,
            drift_gain,
            drift_offset,
            noise_sigma: self.pipeline.noise.sigma,
            calibration_offset: self.pipeline.calibration.offset,
            calibration_gain: self.pipeline.calibration.gain,
            last_recalibration: self.last_recalibration,
        }
    }

    fn quality_estimate(&self) -> f32 {
        let mut quality = 1.0_f32;
        if self.pipeline.noise.enabled {
            quality -= (self.pipeline.noise.sigma as f32 * 0.1).min(0.5);
        }
        if self.pipeline.drift.enabled {
            quality -= (self.pipeline.drift.offset_rate_per_hour as f32).min(0.3);
        }
        quality.max(0.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Calibration, Drift, Noise};
    use nalgebra::Vector3;
    use plumesim_physics::{
        AmbientConditions, BoundaryPolicy, DispersionConfig, EmissionPattern, FieldBounds,
        MaterialProperties, SourceModel, SpatialField,
    };

    fn rig() -> (SpatialField, DispersionEngine) {
        let bounds = FieldBounds::new(
            Point3::new(-100.0, -100.0, 0.0),
            Point3::new(100.0, 100.0, 20.0),
        )
        .unwrap();
        let mut field = SpatialField::new(bounds, BoundaryPolicy::Clamp);
        field
            .set_ambient(AmbientConditions {
                airflow: Vector3::new(1.0, 0.0, 0.0),
                ..Default::default()
            })
            .unwrap();
        field
            .install_source(
                SourceModel::new(
                    "co-source",
                    plumesim_physics::SourceKind::chemical("co"),
                    Point3::new(0.0, 0.0, 1.0),
                    EmissionPattern::Constant { rate: 100.0 },
                    MaterialProperties::default(),
                )
                .unwrap(),
            )
            .unwrap();
        let engine = DispersionEngine::new(DispersionConfig::default()).unwrap();
        (field, engine)
    }

    fn co_sensor() -> VirtualSensor {
        VirtualSensor::new(
            "co-1",
            SensorKind::chemical("co"),
            Point3::new(10.0, 0.0, 1.0),
        )
        .unwrap()
    }

    #[test]
    fn identity_pipeline_sample_equals_ground_truth() {
        let (field, engine) = rig();
        let mut sensor = co_sensor();
        for t in [0.0, 10.0, 3600.0] {
            let sample = sensor.sample(&engine, &field.view(), t).unwrap();
            let truth = sensor.ground_truth(&engine, &field.view(), t).unwrap();
            assert_eq!(sample.value, truth.value);
        }
    }

    #[test]
    fn ground_truth_invariant_to_imperfection_parameters() {
        let (field, engine) = rig();
        let clean = co_sensor();
        let reference = clean.ground_truth(&engine, &field.view(), 5.0).unwrap();

        let mut pipeline = ImperfectionPipeline::identity();
        pipeline.calibration = Calibration {
            enabled: true,
            offset: 10.0,
            gain: 1.5,
            nonlinearity: 0.01,
        };
        pipeline.drift = Drift {
            enabled: true,
            offset_rate_per_hour: 5.0,
            gain_rate_per_hour: 0.1,
        };
        pipeline.noise = Noise {
            enabled: true,
            sigma: 3.0,
            pink_amplitude: 1.0,
            pink_smoothing: 0.9,
        };
        let noisy = co_sensor().with_pipeline(pipeline).unwrap();
        let truth = noisy.ground_truth(&engine, &field.view(), 5.0).unwrap();
        assert_eq!(truth.value, reference.value);
    }

    #[test]
    fn ground_truth_refused_without_capability() {
        let (field, engine) = rig();
        let sensor = co_sensor().with_ground_truth_capability(false);
        let err = sensor.ground_truth(&engine, &field.view(), 0.0);
        assert!(matches!(err, Err(SensorError::GroundTruthUnsupported(_))));
    }

    #[test]
    fn recalibration_resets_drift() {
        let (field, engine) = rig();
        let mut pipeline = ImperfectionPipeline::identity();
        pipeline.drift = Drift {
            enabled: true,
            offset_rate_per_hour: 1.0,
            gain_rate_per_hour: 0.0,
        };
        let mut sensor = co_sensor().with_pipeline(pipeline).unwrap();

        let late = 10.0 * 3600.0;
        let drifted = sensor.sample(&engine, &field.view(), late).unwrap();
        let truth = sensor.ground_truth(&engine, &field.view(), late).unwrap();
        assert!((drifted.value - truth.value - 10.0).abs() < 1e-9);

        sensor.recalibrate(late);
        let fresh = sensor.sample(&engine, &field.view(), late).unwrap();
        assert_eq!(fresh.value, truth.value);
    }

    #[test]
    fn metadata_reports_drift_state() {
        let mut pipeline = ImperfectionPipeline::identity();
        pipeline.drift = Drift {
            enabled: true,
            offset_rate_per_hour: 0.5,
            gain_rate_per_hour: 0.0,
        };
        let sensor = co_sensor().with_pipeline(pipeline).unwrap();
        let meta = sensor.ml_metadata(2.0 * 3600.0);
        assert!((meta.operating_hours - 2.0).abs() < 1e-12);
        assert!((meta.drift_offset - 1.0).abs() < 1e-12);
    }

    #[test]
    fn sphere_average_differs_from_point_in_a_gradient() {
        let (field, engine) = rig();
        let mut point_sensor = co_sensor();
        let mut averaged = co_sensor().with_sampling(SamplingVolume::SphereAverage {
            radius: 2.0,
        })
        .unwrap();
        let p = point_sensor.sample(&engine, &field.view(), 0.0).unwrap();
        let a = averaged.sample(&engine, &field.view(), 0.0).unwrap();
        assert_ne!(p.value, a.value);
    }

    #[test]
    fn cross_sensitivity_sees_other_species() {
        let (mut field, engine) = rig();
        field
            .install_source(
                SourceModel::new(
                    "h2-source",
                    plumesim_physics::SourceKind::chemical("h2"),
                    Point3::new(0.0, 0.0, 1.0),
                    EmissionPattern::Constant { rate: 100.0 },
                    MaterialProperties::default(),
                )
                .unwrap(),
            )
            .unwrap();

        let mut pipeline = ImperfectionPipeline::identity();
        pipeline.cross_sensitivity = crate::pipeline::CrossSensitivity {
            enabled: true,
            couplings: vec![("h2".to_string(), 0.2)],
        };
        let mut sensor = co_sensor().with_pipeline(pipeline).unwrap();

        let sample = sensor.sample(&engine, &field.view(), 0.0).unwrap();
        let truth = sensor.ground_truth(&engine, &field.view(), 0.0).unwrap();
        // h2 source equals the co source, so the reading gains 20% of the
        // co truth on top.
        assert!((sample.value - truth.value * 1.2).abs() < 1e-9);
    }
}
