//! Emission sources with temporal strength patterns.
//!
//! A [`SourceModel`] is a pure function of elapsed time: evaluate
//! [`SourceModel::emission_strength`] every timestep, never mutate between
//! evaluations except to arm an event-triggered pattern.

use crate::{ensure_finite, PhysicsError, Result};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Physical quantity a source emits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Chemical release of a named species, µg/s.
    Chemical { species: String },
    /// Heat release, watts.
    Thermal,
    /// Electromagnetic emission, µT·m² equivalent source strength.
    Emf,
    /// Acoustic emission, dB sound power level.
    Acoustic,
}

impl SourceKind {
    pub fn chemical(species: &str) -> Self {
        Self::Chemical {
            species: species.to_string(),
        }
    }

    /// Unit of the field quantity this source contributes to.
    pub fn unit(&self) -> &'static str {
        match self {
            SourceKind::Chemical { .. } => "µg/m³",
            SourceKind::Thermal => "°C",
            SourceKind::Emf => "µT",
            SourceKind::Acoustic => "dB",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Chemical { .. } => "chemical",
            SourceKind::Thermal => "thermal",
            SourceKind::Emf => "emf",
            SourceKind::Acoustic => "acoustic",
        }
    }
}

/// Temporal emission pattern. Each variant is a pure function of elapsed
/// time since the source became active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum EmissionPattern {
    /// Fixed rate Q.
    Constant { rate: f64 },
    /// Q during on-intervals, 0 otherwise.
    Pulsed {
        rate: f64,
        period_s: f64,
        duty_cycle: f64,
    },
    /// Q0 * exp(-k * t).
    Decaying {
        initial_rate: f64,
        decay_constant: f64,
    },
    /// Q_base + Q_amplitude * sin(2π t / 86400 + phase).
    Diurnal {
        base_rate: f64,
        amplitude: f64,
        phase_rad: f64,
    },
    /// Zero until armed by the owning scenario, then the inner pattern
    /// evaluated from the trigger instant.
    EventTriggered { pattern: Box<EmissionPattern> },
}

const SECONDS_PER_DAY: f64 = 86_400.0;

impl EmissionPattern {
    pub fn validate(&self) -> Result<()> {
        match self {
            EmissionPattern::Constant { rate } => {
                ensure_finite("pattern.rate", *rate)?;
                if *rate < 0.0 {
                    return Err(PhysicsError::invalid(
                        "pattern.rate",
                        format!("{rate} must be non-negative"),
                    ));
                }
            }
            EmissionPattern::Pulsed {
                rate,
                period_s,
                duty_cycle,
            } => {
                ensure_finite("pattern.rate", *rate)?;
                ensure_finite("pattern.period_s", *period_s)?;
                ensure_finite("pattern.duty_cycle", *duty_cycle)?;
                if *rate < 0.0 {
                    return Err(PhysicsError::invalid(
                        "pattern.rate",
                        format!("{rate} must be non-negative"),
                    ));
                }
                if *period_s <= 0.0 {
                    return Err(PhysicsError::invalid(
                        "pattern.period_s",
                        format!("{period_s} must be positive"),
                    ));
                }
                if !(0.0..=1.0).contains(duty_cycle) {
                    return Err(PhysicsError::invalid(
                        "pattern.duty_cycle",
                        format!("{duty_cycle} must be within 0-1"),
                    ));
                }
            }
            EmissionPattern::Decaying {
                initial_rate,
                decay_constant,
            } => {
                ensure_finite("pattern.initial_rate", *initial_rate)?;
                ensure_finite("pattern.decay_constant", *decay_constant)?;
                if *initial_rate < 0.0 {
                    return Err(PhysicsError::invalid(
                        "pattern.initial_rate",
                        format!("{initial_rate} must be non-negative"),
                    ));
                }
                if *decay_constant < 0.0 {
                    return Err(PhysicsError::invalid(
                        "pattern.decay_constant",
                        format!("{decay_constant} must be non-negative"),
                    ));
                }
            }
            EmissionPattern::Diurnal {
                base_rate,
                amplitude,
                phase_rad,
            } => {
                // Amplitude may exceed the base rate; the evaluation clamp
                // keeps the result non-negative.
                ensure_finite("pattern.base_rate", *base_rate)?;
                ensure_finite("pattern.amplitude", *amplitude)?;
                ensure_finite("pattern.phase_rad", *phase_rad)?;
                if *base_rate < 0.0 {
                    return Err(PhysicsError::invalid(
                        "pattern.base_rate",
                        format!("{base_rate} must be non-negative"),
                    ));
                }
            }
            EmissionPattern::EventTriggered { pattern } => {
                if matches!(**pattern, EmissionPattern::EventTriggered { .. }) {
                    return Err(PhysicsError::invalid(
                        "pattern",
                        "event-triggered patterns cannot nest",
                    ));
                }
                pattern.validate()?;
            }
        }
        Ok(())
    }

    /// Raw pattern value at `elapsed` seconds. Callers clamp to >= 0.
    fn evaluate(&self, elapsed: f64) -> f64 {
        if elapsed < 0.0 {
            return 0.0;
        }
        match self {
            EmissionPattern::Constant { rate } => *rate,
            EmissionPattern::Pulsed {
                rate,
                period_s,
                duty_cycle,
            } => {
                let phase = (elapsed / period_s).fract();
                if phase < *duty_cycle {
                    *rate
                } else {
                    0.0
                }
            }
            EmissionPattern::Decaying {
                initial_rate,
                decay_constant,
            } => initial_rate * (-decay_constant * elapsed).exp(),
            EmissionPattern::Diurnal {
                base_rate,
                amplitude,
                phase_rad,
            } => {
                base_rate
                    + amplitude
                        * (2.0 * std::f64::consts::PI * elapsed / SECONDS_PER_DAY + phase_rad).sin()
            }
            // The owning SourceModel handles trigger bookkeeping; an
            // un-triggered evaluation through here emits nothing.
            EmissionPattern::EventTriggered { .. } => 0.0,
        }
    }
}

/// Physical properties of the emitted material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialProperties {
    /// Effective (eddy) diffusion coefficient, m²/s. Must be positive.
    pub diffusion_coefficient: f64,
    /// First-order chemical decay rate, 1/s.
    pub decay_rate: f64,
    /// Material density, kg/m³.
    pub density: f64,
    /// Specific heat capacity, J/(kg·K). Used for thermal sources.
    pub specific_heat: f64,
    /// Particulate matter is subject to hygroscopic growth and settling.
    pub particulate: bool,
}

impl Default for MaterialProperties {
    fn default() -> Self {
        // Indoor turbulent eddy diffusivity for a light gas in still air.
        Self {
            diffusion_coefficient: 0.05,
            decay_rate: 0.0,
            density: 1.2,
            specific_heat: 1005.0,
            particulate: false,
        }
    }
}

impl MaterialProperties {
    pub fn validate(&self) -> Result<()> {
        ensure_finite("material.diffusion_coefficient", self.diffusion_coefficient)?;
        ensure_finite("material.decay_rate", self.decay_rate)?;
        ensure_finite("material.density", self.density)?;
        ensure_finite("material.specific_heat", self.specific_heat)?;
        if self.diffusion_coefficient <= 0.0 {
            return Err(PhysicsError::invalid(
                "material.diffusion_coefficient",
                format!("{} must be positive", self.diffusion_coefficient),
            ));
        }
        if self.decay_rate < 0.0 {
            return Err(PhysicsError::invalid(
                "material.decay_rate",
                format!("{} must be non-negative", self.decay_rate),
            ));
        }
        if self.density <= 0.0 {
            return Err(PhysicsError::invalid(
                "material.density",
                format!("{} must be positive", self.density),
            ));
        }
        if self.specific_heat <= 0.0 {
            return Err(PhysicsError::invalid(
                "material.specific_heat",
                format!("{} must be positive", self.specific_heat),
            ));
        }
        Ok(())
    }
}

/// One emission source in the field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceModel {
    id: String,
    kind: SourceKind,
    position: Point3<f64>,
    pattern: EmissionPattern,
    material: MaterialProperties,
    start_time: f64,
    end_time: Option<f64>,
    expiry_threshold: f64,
    trigger_time: Option<f64>,
}

impl SourceModel {
    /// Create a source, validating every physical parameter up front.
    /// Invalid values are rejected here, never clamped during simulation.
    pub fn new(
        id: &str,
        kind: SourceKind,
        position: Point3<f64>,
        pattern: EmissionPattern,
        material: MaterialProperties,
    ) -> Result<Self> {
        if id.is_empty() {
            return Err(PhysicsError::invalid("source.id", "must not be empty"));
        }
        for component in [position.x, position.y, position.z] {
            ensure_finite("source.position", component)?;
        }
        pattern.validate()?;
        material.validate()?;
        Ok(Self {
            id: id.to_string(),
            kind,
            position,
            pattern,
            material,
            start_time: 0.0,
            end_time: None,
            expiry_threshold: 1e-9,
            trigger_time: None,
        })
    }

    /// Delay activation until `time` seconds into the scenario.
    pub fn with_start_time(mut self, time: f64) -> Self {
        self.start_time = time;
        self
    }

    /// Hard stop: the source is expired past this time.
    pub fn with_end_time(mut self, time: f64) -> Self {
        self.end_time = Some(time);
        self
    }

    /// Decaying sources below this strength are considered expired.
    pub fn with_expiry_threshold(mut self, threshold: f64) -> Self {
        self.expiry_threshold = threshold.max(0.0);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &SourceKind {
        &self.kind
    }

    pub fn position(&self) -> Point3<f64> {
        self.position
    }

    pub fn material(&self) -> &MaterialProperties {
        &self.material
    }

    pub fn pattern(&self) -> &EmissionPattern {
        &self.pattern
    }

    /// Arm an event-triggered source at `time`. Errors on other patterns.
    pub fn trigger(&mut self, time: f64) -> Result<()> {
        match self.pattern {
            EmissionPattern::EventTriggered { .. } => {
                if self.trigger_time.is_none() {
                    tracing::debug!(source = %self.id, time, "source triggered");
                    self.trigger_time = Some(time);
                }
                Ok(())
            }
            _ => Err(PhysicsError::invalid(
                "source.pattern",
                format!("source `{}` is not event-triggered", self.id),
            )),
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.trigger_time.is_some()
    }

    /// Emission strength at simulated `time`, always >= 0.
    ///
    /// The clamp applies after every pattern evaluation so malformed diurnal
    /// amplitude/phase combinations can never emit negative mass.
    pub fn emission_strength(&self, time: f64) -> f64 {
        if time < self.start_time {
            return 0.0;
        }
        if let Some(end) = self.end_time {
            if time > end {
                return 0.0;
            }
        }
        let raw = match &self.pattern {
            EmissionPattern::EventTriggered { pattern } => match self.trigger_time {
                Some(t0) => pattern.evaluate(time - t0),
                None => 0.0,
            },
            other => other.evaluate(time - self.start_time),
        };
        // f64::max treats NaN as absent, so a pathological evaluation
        // collapses to zero instead of propagating.
        raw.max(0.0)
    }

    /// A source is expired once past its end time, or once a decaying
    /// pattern has dropped below the expiry threshold.
    pub fn is_expired(&self, time: f64) -> bool {
        if let Some(end) = self.end_time {
            if time > end {
                return true;
            }
        }
        match &self.pattern {
            EmissionPattern::Decaying { .. } => {
                time > self.start_time && self.emission_strength(time) < self.expiry_threshold
            }
            EmissionPattern::EventTriggered { pattern } => {
                if let (Some(t0), EmissionPattern::Decaying { .. }) = (self.trigger_time, &**pattern)
                {
                    time > t0 && self.emission_strength(time) < self.expiry_threshold
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    pub fn is_active(&self, time: f64) -> bool {
        !self.is_expired(time) && self.emission_strength(time) > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_with(pattern: EmissionPattern) -> SourceModel {
        SourceModel::new(
            "test",
            SourceKind::chemical("voc"),
            Point3::new(0.0, 0.0, 1.0),
            pattern,
            MaterialProperties::default(),
        )
        .unwrap()
    }

    #[test]
    fn constant_pattern_is_flat() {
        let s = source_with(EmissionPattern::Constant { rate: 42.0 });
        assert_eq!(s.emission_strength(0.0), 42.0);
        assert_eq!(s.emission_strength(1e6), 42.0);
    }

    #[test]
    fn pulsed_pattern_respects_duty_cycle() {
        let s = source_with(EmissionPattern::Pulsed {
            rate: 10.0,
            period_s: 10.0,
            duty_cycle: 0.3,
        });
        assert_eq!(s.emission_strength(1.0), 10.0);
        assert_eq!(s.emission_strength(5.0), 0.0);
        assert_eq!(s.emission_strength(11.0), 10.0);
    }

    #[test]
    fn decaying_pattern_halves_on_schedule() {
        let k = (2.0f64).ln() / 10.0;
        let s = source_with(EmissionPattern::Decaying {
            initial_rate: 8.0,
            decay_constant: k,
        });
        let half = s.emission_strength(10.0);
        assert!((half - 4.0).abs() < 1e-9);
    }

    #[test]
    fn emission_never_negative_even_with_malformed_diurnal() {
        // Amplitude far exceeding the base rate would dip negative
        // without the clamp.
        let s = source_with(EmissionPattern::Diurnal {
            base_rate: 1.0,
            amplitude: 100.0,
            phase_rad: -1.3,
        });
        let mut t = 0.0;
        while t < SECONDS_PER_DAY {
            assert!(s.emission_strength(t) >= 0.0, "negative emission at t={t}");
            t += 600.0;
        }
    }

    #[test]
    fn event_triggered_silent_until_armed() {
        let mut s = source_with(EmissionPattern::EventTriggered {
            pattern: Box::new(EmissionPattern::Constant { rate: 5.0 }),
        });
        assert_eq!(s.emission_strength(100.0), 0.0);
        s.trigger(50.0).unwrap();
        assert_eq!(s.emission_strength(100.0), 5.0);
        assert_eq!(s.emission_strength(40.0), 0.0);
    }

    #[test]
    fn trigger_on_constant_source_is_an_error() {
        let mut s = source_with(EmissionPattern::Constant { rate: 1.0 });
        assert!(s.trigger(0.0).is_err());
    }

    #[test]
    fn nested_event_trigger_rejected() {
        let nested = EmissionPattern::EventTriggered {
            pattern: Box::new(EmissionPattern::EventTriggered {
                pattern: Box::new(EmissionPattern::Constant { rate: 1.0 }),
            }),
        };
        assert!(nested.validate().is_err());
    }

    #[test]
    fn zero_diffusion_coefficient_rejected_at_config_time() {
        let material = MaterialProperties {
            diffusion_coefficient: 0.0,
            ..Default::default()
        };
        let err = SourceModel::new(
            "bad",
            SourceKind::chemical("co"),
            Point3::new(0.0, 0.0, 0.0),
            EmissionPattern::Constant { rate: 1.0 },
            material,
        );
        assert!(matches!(
            err,
            Err(PhysicsError::InvalidParameter { name, .. })
                if name == "material.diffusion_coefficient"
        ));
    }

    #[test]
    fn negative_rate_rejected_at_config_time() {
        let err = EmissionPattern::Constant { rate: -1.0 }.validate();
        assert!(err.is_err());
    }

    #[test]
    fn decaying_source_expires_below_threshold() {
        let s = source_with(EmissionPattern::Decaying {
            initial_rate: 1.0,
            decay_constant: 1.0,
        })
        .with_expiry_threshold(1e-3);
        assert!(!s.is_expired(1.0));
        assert!(s.is_expired(20.0));
    }

    #[test]
    fn pattern_round_trips_through_json() {
        let pattern = EmissionPattern::Pulsed {
            rate: 3.5,
            period_s: 60.0,
            duty_cycle: 0.25,
        };
        let text = serde_json::to_string(&pattern).unwrap();
        let back: EmissionPattern = serde_json::from_str(&text).unwrap();
        assert_eq!(pattern, back);
    }
}
