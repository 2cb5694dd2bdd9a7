//! Sensor array: a named collection of virtual sensors sampled together.

use crate::sensor::VirtualSensor;
use crate::{Reading, Result, SensorError};
use plumesim_physics::{DispersionEngine, FieldView};
use std::collections::BTreeMap;

/// Owns a set of virtual sensors and aggregates their readings into
/// coherent per-timestep snapshots.
///
/// Every reading in one snapshot shares a single simulated timestamp; the
/// array never advances time between sensors inside a snapshot.
#[derive(Debug, Clone)]
pub struct SensorArray {
    name: String,
    sensors: BTreeMap<String, VirtualSensor>,
}

impl SensorArray {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sensors: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_sensor(&mut self, sensor: VirtualSensor) -> Result<()> {
        if self.sensors.contains_key(sensor.id()) {
            return Err(SensorError::DuplicateSensor(sensor.id().to_string()));
        }
        tracing::debug!(array = %self.name, sensor = sensor.id(), "sensor added");
        self.sensors.insert(sensor.id().to_string(), sensor);
        Ok(())
    }

    pub fn remove_sensor(&mut self, id: &str) -> Option<VirtualSensor> {
        self.sensors.remove(id)
    }

    pub fn sensor(&self, id: &str) -> Option<&VirtualSensor> {
        self.sensors.get(id)
    }

    pub fn sensor_mut(&mut self, id: &str) -> Option<&mut VirtualSensor> {
        self.sensors.get_mut(id)
    }

    /// Disabled sensors stay in the array for later re-enabling; they are
    /// only excluded from snapshots.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> Result<()> {
        let sensor = self
            .sensors
            .get_mut(id)
            .ok_or_else(|| SensorError::SensorNotFound(id.to_string()))?;
        sensor.set_enabled(enabled);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn enabled_count(&self) -> usize {
        self.sensors.values().filter(|s| s.is_enabled()).count()
    }

    pub fn sensors(&self) -> impl Iterator<Item = &VirtualSensor> {
        self.sensors.values()
    }

    /// Reseed every sensor's stochastic pipeline for an independent run.
    pub fn reseed(&mut self, base_seed: u64) {
        for (index, sensor) in self.sensors.values_mut().enumerate() {
            sensor.reseed(base_seed.wrapping_add(index as u64));
        }
    }

    /// Recalibrate every sensor at the given simulated time.
    pub fn recalibrate_all(&mut self, time: f64) {
        for sensor in self.sensors.values_mut() {
            sensor.recalibrate(time);
        }
    }

    /// Imperfect readings from every enabled sensor at one timestamp.
    pub fn sample_environment(
        &mut self,
        engine: &DispersionEngine,
        field: &FieldView,
        time: f64,
    ) -> Result<BTreeMap<String, Reading>> {
        let mut readings = BTreeMap::new();
        for sensor in self.sensors.values_mut() {
            if !sensor.is_enabled() {
                continue;
            }
            let reading = sensor.sample(engine, field, time)?;
            readings.insert(sensor.id().to_string(), reading);
        }
        Ok(readings)
    }

    /// True field values for every enabled, ground-truth-capable sensor.
    pub fn ground_truth_snapshot(
        &self,
        engine: &DispersionEngine,
        field: &FieldView,
        time: f64,
    ) -> Result<BTreeMap<String, f64>> {
        let mut values = BTreeMap::new();
        for sensor in self.sensors.values() {
            if !sensor.is_enabled() {
                continue;
            }
            if !sensor.has_ground_truth_capability() {
                tracing::debug!(
                    sensor = sensor.id(),
                    "excluded from ground truth snapshot: no capability"
                );
                continue;
            }
            let reading = sensor.ground_truth(engine, field, time)?;
            values.insert(sensor.id().to_string(), reading.value);
        }
        Ok(values)
    }

    /// Paired (imperfect readings, ground truth) at one coherent timestamp.
    pub fn generate_training_sample(
        &mut self,
        engine: &DispersionEngine,
        field: &FieldView,
        time: f64,
        include_labels: bool,
    ) -> Result<(BTreeMap<String, Reading>, Option<BTreeMap<String, f64>>)> {
        // Ground truth first: it reads immutable state only, and the
        // imperfect pass must see the identical field time.
        let truth = if include_labels {
            Some(self.ground_truth_snapshot(engine, field, time)?)
        } else {
            None
        };
        let readings = self.sample_environment(engine, field, time)?;
        Ok((readings, truth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ImperfectionPipeline;
    use crate::sensor::SensorKind;
    use nalgebra::{Point3, Vector3};
    use plumesim_physics::{
        AmbientConditions, BoundaryPolicy, DispersionConfig, EmissionPattern, FieldBounds,
        MaterialProperties, SourceKind, SourceModel, SpatialField,
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
                    "src",
                    SourceKind::chemical("co"),
                    Point3::new(0.0, 0.0, 1.0),
                    EmissionPattern::Constant { rate: 50.0 },
                    MaterialProperties::default(),
                )
                .unwrap(),
            )
            .unwrap();
        (field, DispersionEngine::new(DispersionConfig::default()).unwrap())
    }

    fn array() -> SensorArray {
        let mut array = SensorArray::new("test-array");
        for (id, position) in [
            ("co-near", Point3::new(5.0, 0.0, 1.0)),
            ("co-far", Point3::new(30.0, 0.0, 1.0)),
        ] {
            array
                .add_sensor(
                    VirtualSensor::new(id, SensorKind::chemical("co"), position).unwrap(),
                )
                .unwrap();
        }
        array
            .add_sensor(
                VirtualSensor::new("temp-1", SensorKind::Temperature, Point3::new(5.0, 0.0, 1.0))
                    .unwrap(),
            )
            .unwrap();
        array
    }

    #[test]
    fn duplicate_sensor_rejected() {
        let mut array = array();
        let dup = VirtualSensor::new(
            "co-near",
            SensorKind::chemical("co"),
            Point3::new(0.0, 0.0, 0.0),
        )
        .unwrap();
        assert!(matches!(
            array.add_sensor(dup),
            Err(SensorError::DuplicateSensor(_))
        ));
    }

    #[test]
    fn disabled_sensors_excluded_but_retained() {
        let (field, engine) = rig();
        let mut array = array();
        array.set_enabled("co-far", false).unwrap();

        let readings = array
            .sample_environment(&engine, &field.view(), 0.0)
            .unwrap();
        assert!(!readings.contains_key("co-far"));
        assert_eq!(readings.len(), 2);
        assert_eq!(array.len(), 3);

        array.set_enabled("co-far", true).unwrap();
        let readings = array
            .sample_environment(&engine, &field.view(), 0.0)
            .unwrap();
        assert_eq!(readings.len(), 3);
    }

    #[test]
    fn readings_share_one_timestamp() {
        let (field, engine) = rig();
        let mut array = array();
        let (readings, truth) = array
            .generate_training_sample(&engine, &field.view(), 12.5, true)
            .unwrap();
        assert!(readings.values().all(|r| r.timestamp == 12.5));
        let truth = truth.unwrap();
        assert_eq!(truth.len(), readings.len());
    }

    #[test]
    fn truth_excludes_incapable_sensors() {
        let (field, engine) = rig();
        let mut array = array();
        array
            .add_sensor(
                VirtualSensor::new(
                    "co-blind",
                    SensorKind::chemical("co"),
                    Point3::new(10.0, 0.0, 1.0),
                )
                .unwrap()
                .with_ground_truth_capability(false),
            )
            .unwrap();

        let (readings, truth) = array
            .generate_training_sample(&engine, &field.view(), 0.0, true)
            .unwrap();
        let truth = truth.unwrap();
        assert!(readings.contains_key("co-blind"));
        assert!(!truth.contains_key("co-blind"));
    }

    #[test]
    fn clean_array_readings_match_truth() {
        let (field, engine) = rig();
        let mut array = array();
        for id in ["co-near", "co-far", "temp-1"] {
            let sensor = array.sensor_mut(id).unwrap();
            *sensor = sensor
                .clone()
                .with_pipeline(ImperfectionPipeline::identity())
                .unwrap();
        }
        let (readings, truth) = array
            .generate_training_sample(&engine, &field.view(), 0.0, true)
            .unwrap();
        let truth = truth.unwrap();
        for (id, reading) in &readings {
            assert_eq!(reading.value, truth[id]);
        }
    }

    #[test]
    fn missing_sensor_enable_errors() {
        let mut array = array();
        assert!(matches!(
            array.set_enabled("ghost", true),
            Err(SensorError::SensorNotFound(_))
        ));
    }
}
