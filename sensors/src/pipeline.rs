//! Measurement imperfection pipeline.
//!
//! Six ordered stages between the physical truth and the reported reading:
//! cross-sensitivity, calibration error, environmental compensation error,
//! drift, noise, and quantization. Every stage can be disabled individually
//! for ablation testing and for generating clean/noisy dataset pairs.

use crate::{Result, SensorError};
use plumesim_physics::AmbientConditions;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Stage 1: response to co-located interfering species.
///
/// One row of the sensitivity matrix: each entry couples an interfering
/// species' true concentration into this sensor's channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossSensitivity {
    pub enabled: bool,
    /// (interfering species, response per unit of interferent).
    pub couplings: Vec<(String, f64)>,
}

impl Default for CrossSensitivity {
    fn default() -> Self {
        Self {
            enabled: false,
            couplings: Vec::new(),
        }
    }
}

/// Stage 2: per-channel calibration error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub enabled: bool,
    pub offset: f64,
    pub gain: f64,
    /// Second-order term for non-linear sensor response.
    pub nonlinearity: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            enabled: false,
            offset: 0.0,
            gain: 1.0,
            nonlinearity: 0.0,
        }
    }
}

/// Stage 3: systematic bias from imperfect environmental compensation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvCompensation {
    pub enabled: bool,
    /// Bias per °C of deviation from the calibration reference.
    pub temperature_coefficient: f64,
    /// Bias per %RH of deviation from the calibration reference.
    pub humidity_coefficient: f64,
    pub reference_temperature_c: f64,
    pub reference_humidity: f64,
}

impl Default for EnvCompensation {
    fn default() -> Self {
        Self {
            enabled: false,
            temperature_coefficient: 0.0,
            humidity_coefficient: 0.0,
            reference_temperature_c: 20.0,
            reference_humidity: 50.0,
        }
    }
}

/// Stage 4: monotonic drift accumulating with operating time since the
/// last recalibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drift {
    pub enabled: bool,
    pub offset_rate_per_hour: f64,
    pub gain_rate_per_hour: f64,
}

impl Default for Drift {
    fn default() -> Self {
        Self {
            enabled: false,
            offset_rate_per_hour: 0.0,
            gain_rate_per_hour: 0.0,
        }
    }
}

/// Stage 5: additive Gaussian noise plus an optional low-frequency
/// component correlated across consecutive samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Noise {
    pub enabled: bool,
    /// White noise standard deviation.
    pub sigma: f64,
    /// Standard deviation of the 1/f innovation.
    pub pink_amplitude: f64,
    /// Exponential smoothing factor in [0, 1); higher means slower wander.
    pub pink_smoothing: f64,
}

impl Default for Noise {
    fn default() -> Self {
        Self {
            enabled: false,
            sigma: 0.0,
            pink_amplitude: 0.0,
            pink_smoothing: 0.95,
        }
    }
}

/// Stage 6: resolution floor of the digitized output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantization {
    pub enabled: bool,
    pub resolution: f64,
}

impl Default for Quantization {
    fn default() -> Self {
        Self {
            enabled: false,
            resolution: 0.01,
        }
    }
}

/// The full ordered pipeline with its stochastic state.
#[derive(Debug, Clone)]
pub struct ImperfectionPipeline {
    pub cross_sensitivity: CrossSensitivity,
    pub calibration: Calibration,
    pub env_compensation: EnvCompensation,
    pub drift: Drift,
    pub noise: Noise,
    pub quantization: Quantization,
    rng: StdRng,
    pink_state: f64,
}

impl Default for ImperfectionPipeline {
    fn default() -> Self {
        Self::identity()
    }
}

impl ImperfectionPipeline {
    /// Every stage disabled: sample() equals ground_truth() exactly.
    pub fn identity() -> Self {
        Self {
            cross_sensitivity: CrossSensitivity::default(),
            calibration: Calibration::default(),
            env_compensation: EnvCompensation::default(),
            drift: Drift::default(),
            noise: Noise::default(),
            quantization: Quantization::default(),
            rng: StdRng::seed_from_u64(0),
            pink_state: 0.0,
        }
    }

    /// Laboratory-grade instrument: tight noise, negligible drift.
    pub fn high_quality() -> Self {
        Self {
            calibration: Calibration {
                enabled: true,
                offset: 0.0,
                gain: 1.0,
                nonlinearity: 0.0,
            },
            drift: Drift {
                enabled: true,
                offset_rate_per_hour: 0.001,
                gain_rate_per_hour: 0.0,
            },
            noise: Noise {
                enabled: true,
                sigma: 0.1,
                pink_amplitude: 0.02,
                pink_smoothing: 0.95,
            },
            quantization: Quantization {
                enabled: true,
                resolution: 0.01,
            },
            ..Self::identity()
        }
    }

    /// Typical consumer-grade sensor.
    pub fn consumer_grade() -> Self {
        Self {
            calibration: Calibration {
                enabled: true,
                offset: 0.2,
                gain: 1.02,
                nonlinearity: 0.0005,
            },
            env_compensation: EnvCompensation {
                enabled: true,
                temperature_coefficient: 0.05,
                humidity_coefficient: 0.01,
                ..Default::default()
            },
            drift: Drift {
                enabled: true,
                offset_rate_per_hour: 0.01,
                gain_rate_per_hour: 0.0001,
            },
            noise: Noise {
                enabled: true,
                sigma: 0.5,
                pink_amplitude: 0.1,
                pink_smoothing: 0.95,
            },
            quantization: Quantization {
                enabled: true,
                resolution: 0.1,
            },
            ..Self::identity()
        }
    }

    /// Aged or degraded sensor.
    pub fn degraded() -> Self {
        Self {
            calibration: Calibration {
                enabled: true,
                offset: 1.0,
                gain: 1.1,
                nonlinearity: 0.002,
            },
            env_compensation: EnvCompensation {
                enabled: true,
                temperature_coefficient: 0.2,
                humidity_coefficient: 0.05,
                ..Default::default()
            },
            drift: Drift {
                enabled: true,
                offset_rate_per_hour: 0.1,
                gain_rate_per_hour: 0.001,
            },
            noise: Noise {
                enabled: true,
                sigma: 2.0,
                pink_amplitude: 0.5,
                pink_smoothing: 0.98,
            },
            quantization: Quantization {
                enabled: true,
                resolution: 0.5,
            },
            ..Self::identity()
        }
    }

    /// Look up a preset by name, as used in configuration files.
    pub fn preset(name: &str) -> Result<Self> {
        match name {
            "clean" | "identity" => Ok(Self::identity()),
            "high_quality" => Ok(Self::high_quality()),
            "consumer" | "consumer_grade" => Ok(Self::consumer_grade()),
            "degraded" => Ok(Self::degraded()),
            other => Err(SensorError::InvalidConfig(format!(
                "unknown imperfection preset `{other}`"
            ))),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Reseed the stochastic stages, e.g. for an independent scenario run.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
        self.pink_state = 0.0;
    }

    pub fn validate(&self) -> Result<()> {
        let check = |name: &str, v: f64| -> Result<f64> {
            if v.is_finite() {
                Ok(v)
            } else {
                Err(SensorError::InvalidConfig(format!("{name} is not finite")))
            }
        };
        for (species, coeff) in &self.cross_sensitivity.couplings {
            check(&format!("cross_sensitivity[{species}]"), *coeff)?;
        }
        check("calibration.offset", self.calibration.offset)?;
        if check("calibration.gain", self.calibration.gain)? == 0.0 {
            return Err(SensorError::InvalidConfig(
                "calibration.gain must be non-zero".into(),
            ));
        }
        check("calibration.nonlinearity", self.calibration.nonlinearity)?;
        check(
            "env_compensation.temperature_coefficient",
            self.env_compensation.temperature_coefficient,
        )?;
        check(
            "env_compensation.humidity_coefficient",
            self.env_compensation.humidity_coefficient,
        )?;
        if check("drift.offset_rate_per_hour", self.drift.offset_rate_per_hour)? < 0.0
            || check("drift.gain_rate_per_hour", self.drift.gain_rate_per_hour)? < 0.0
        {
            return Err(SensorError::InvalidConfig(
                "drift rates must be non-negative for monotonic accumulation".into(),
            ));
        }
        if check("noise.sigma", self.noise.sigma)? < 0.0
            || check("noise.pink_amplitude", self.noise.pink_amplitude)? < 0.0
        {
            return Err(SensorError::InvalidConfig(
                "noise amplitudes must be non-negative".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.noise.pink_smoothing) {
            return Err(SensorError::InvalidConfig(format!(
                "noise.pink_smoothing {} must be within [0, 1)",
                self.noise.pink_smoothing
            )));
        }
        if self.quantization.enabled && self.quantization.resolution <= 0.0 {
            return Err(SensorError::InvalidConfig(format!(
                "quantization.resolution {} must be positive",
                self.quantization.resolution
            )));
        }
        Ok(())
    }

    /// Run the full pipeline over a true value.
    ///
    /// `interferents` carries (species, true concentration) for every other
    /// species present at the sensor location; `operating_hours` is the
    /// sensor's elapsed operating time since its last recalibration.
    pub fn apply(
        &mut self,
        true_value: f64,
        interferents: &[(String, f64)],
        ambient: &AmbientConditions,
        operating_hours: f64,
    ) -> f64 {
        let mut value = true_value;

        // 1. Cross-sensitivity
        if self.cross_sensitivity.enabled {
            for (species, coeff) in &self.cross_sensitivity.couplings {
                if let Some((_, truth)) = interferents.iter().find(|(s, _)| s == species) {
                    value += coeff * truth;
                }
            }
        }

        // 2. Calibration error
        if self.calibration.enabled {
            let cal = &self.calibration;
            value = cal.gain * value + cal.offset + cal.nonlinearity * value * value;
        }

        // 3. Environmental compensation error
        if self.env_compensation.enabled {
            let env = &self.env_compensation;
            value += env.temperature_coefficient
                * (ambient.temperature_c - env.reference_temperature_c);
            value += env.humidity_coefficient
                * (ambient.relative_humidity - env.reference_humidity);
        }

        // 4. Drift
        if self.drift.enabled {
            let (gain_drift, offset_drift) = self.drift_state(operating_hours);
            value = (1.0 + gain_drift) * value + offset_drift;
        }

        // 5. Noise
        if self.noise.enabled {
            if self.noise.sigma > 0.0 {
                let white = Normal::new(0.0, self.noise.sigma).expect("validated sigma");
                value += white.sample(&mut self.rng);
            }
            if self.noise.pink_amplitude > 0.0 {
                let innovation = Normal::new(0.0, self.noise.pink_amplitude)
                    .expect("validated pink amplitude")
                    .sample(&mut self.rng);
                let alpha = self.noise.pink_smoothing;
                self.pink_state = alpha * self.pink_state + (1.0 - alpha) * innovation;
                value += self.pink_state;
            }
        }

        // 6. Quantization
        if self.quantization.enabled {
            let step = self.quantization.resolution;
            value = (value / step).round() * step;
        }

        value
    }

    /// Accumulated (gain, offset) drift at the given operating time.
    pub fn drift_state(&self, operating_hours: f64) -> (f64, f64) {
        let hours = operating_hours.max(0.0);
        (
            self.drift.gain_rate_per_hour * hours,
            self.drift.offset_rate_per_hour * hours,
        )
    }

    /// Reset stochastic state (called on recalibration).
    pub fn reset_state(&mut self) {
        self.pink_state = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ambient() -> AmbientConditions {
        AmbientConditions::default()
    }

    #[test]
    fn identity_pipeline_is_exact() {
        let mut pipeline = ImperfectionPipeline::identity();
        for truth in [0.0, 1.5, 100.0, 1e-6] {
            assert_eq!(pipeline.apply(truth, &[], &ambient(), 5.0), truth);
        }
    }

    #[test]
    fn calibration_applies_gain_and_offset() {
        let mut pipeline = ImperfectionPipeline::identity();
        pipeline.calibration = Calibration {
            enabled: true,
            offset: 1.0,
            gain: 2.0,
            nonlinearity: 0.0,
        };
        assert_eq!(pipeline.apply(3.0, &[], &ambient(), 0.0), 7.0);
    }

    #[test]
    fn cross_sensitivity_mixes_interferents() {
        let mut pipeline = ImperfectionPipeline::identity();
        pipeline.cross_sensitivity = CrossSensitivity {
            enabled: true,
            couplings: vec![("h2".to_string(), 0.1), ("ethanol".to_string(), 0.05)],
        };
        let interferents = vec![("h2".to_string(), 50.0), ("ethanol".to_string(), 20.0)];
        let value = pipeline.apply(10.0, &interferents, &ambient(), 0.0);
        assert!((value - (10.0 + 5.0 + 1.0)).abs() < 1e-12);
    }

    #[test]
    fn env_compensation_biases_off_reference() {
        let mut pipeline = ImperfectionPipeline::identity();
        pipeline.env_compensation = EnvCompensation {
            enabled: true,
            temperature_coefficient: 0.1,
            humidity_coefficient: 0.0,
            reference_temperature_c: 20.0,
            reference_humidity: 50.0,
        };
        let hot = AmbientConditions {
            temperature_c: 30.0,
            ..Default::default()
        };
        let value = pipeline.apply(5.0, &[], &hot, 0.0);
        assert!((value - 6.0).abs() < 1e-12);
        // At the reference point the stage is a no-op.
        assert_eq!(pipeline.apply(5.0, &[], &ambient(), 0.0), 5.0);
    }

    #[test]
    fn drift_grows_monotonically_with_operating_time() {
        let mut pipeline = ImperfectionPipeline::identity();
        pipeline.drift = Drift {
            enabled: true,
            offset_rate_per_hour: 0.5,
            gain_rate_per_hour: 0.0,
        };
        let mut last = 0.0;
        for hours in [0.0, 1.0, 10.0, 100.0] {
            let value = pipeline.apply(1.0, &[], &ambient(), hours);
            assert!(value >= last, "drift regressed at {hours} h");
            last = value;
        }
    }

    #[test]
    fn quantization_snaps_to_resolution() {
        let mut pipeline = ImperfectionPipeline::identity();
        pipeline.quantization = Quantization {
            enabled: true,
            resolution: 0.5,
        };
        assert_eq!(pipeline.apply(1.26, &[], &ambient(), 0.0), 1.5);
        assert_eq!(pipeline.apply(1.24, &[], &ambient(), 0.0), 1.0);
    }

    #[test]
    fn noise_is_reproducible_under_a_fixed_seed() {
        let mut a = ImperfectionPipeline::identity().with_seed(7);
        let mut b = ImperfectionPipeline::identity().with_seed(7);
        a.noise = Noise {
            enabled: true,
            sigma: 1.0,
            pink_amplitude: 0.2,
            pink_smoothing: 0.9,
        };
        b.noise = a.noise.clone();
        for _ in 0..16 {
            assert_eq!(
                a.apply(10.0, &[], &ambient(), 0.0),
                b.apply(10.0, &[], &ambient(), 0.0)
            );
        }
    }

    #[test]
    fn pink_noise_correlates_consecutive_samples() {
        let mut pipeline = ImperfectionPipeline::identity().with_seed(42);
        pipeline.noise = Noise {
            enabled: true,
            sigma: 0.0,
            pink_amplitude: 1.0,
            pink_smoothing: 0.99,
        };
        // With heavy smoothing, consecutive deviations move together.
        let samples: Vec<f64> = (0..200)
            .map(|_| pipeline.apply(0.0, &[], &ambient(), 0.0))
            .collect();
        let mut same_sign = 0;
        for pair in samples.windows(2) {
            if pair[0].signum() == pair[1].signum() {
                same_sign += 1;
            }
        }
        assert!(same_sign > 150, "only {same_sign}/199 pairs correlated");
    }

    #[test]
    fn negative_drift_rate_rejected() {
        let mut pipeline = ImperfectionPipeline::identity();
        pipeline.drift.offset_rate_per_hour = -0.1;
        assert!(pipeline.validate().is_err());
    }

    #[test]
    fn unknown_preset_rejected() {
        assert!(ImperfectionPipeline::preset("pristine").is_err());
        assert!(ImperfectionPipeline::preset("consumer").is_ok());
    }
}
