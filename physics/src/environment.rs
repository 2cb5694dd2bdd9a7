//! Environmental modifiers: barriers, HVAC air exchange, and
//! temperature/humidity coupling applied on top of the raw plume field.

use crate::field::AmbientConditions;
use crate::{ensure_finite, PhysicsError, Result};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Barrier material with a transmission factor for dispersing quantities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarrierMaterial {
    /// Drywall partition; leaks through gaps and porosity.
    Drywall,
    /// Concrete or masonry; near-opaque to airborne transport.
    Concrete,
    /// Glass pane; airtight but thermally conductive.
    Glass,
    /// Custom transmission factor in [0, 1].
    Custom(f64),
}

impl BarrierMaterial {
    /// Fraction of flux transmitted through the barrier. Zero means fully
    /// opaque.
    pub fn transmission(&self) -> f64 {
        match self {
            BarrierMaterial::Drywall => 0.15,
            BarrierMaterial::Concrete => 0.01,
            BarrierMaterial::Glass => 0.0,
            BarrierMaterial::Custom(t) => *t,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let BarrierMaterial::Custom(t) = self {
            ensure_finite("barrier.transmission", *t)?;
            if !(0.0..=1.0).contains(t) {
                return Err(PhysicsError::invalid(
                    "barrier.transmission",
                    format!("{t} must be within 0-1"),
                ));
            }
        }
        Ok(())
    }
}

/// An axis-aligned slab obstructing transport between sources and query
/// points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Barrier {
    pub name: String,
    pub material: BarrierMaterial,
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Barrier {
    pub fn new(
        name: &str,
        material: BarrierMaterial,
        min: Point3<f64>,
        max: Point3<f64>,
    ) -> Result<Self> {
        material.validate()?;
        for (axis, (lo, hi)) in [(min.x, max.x), (min.y, max.y), (min.z, max.z)]
            .into_iter()
            .enumerate()
        {
            ensure_finite("barrier.extent", lo)?;
            ensure_finite("barrier.extent", hi)?;
            if lo > hi {
                return Err(PhysicsError::invalid(
                    "barrier.extent",
                    format!("axis {axis}: min {lo} exceeds max {hi}"),
                ));
            }
        }
        Ok(Self {
            name: name.to_string(),
            material,
            min,
            max,
        })
    }

    /// Slab test: does the segment from `a` to `b` pass through this
    /// barrier?
    pub fn intersects_segment(&self, a: Point3<f64>, b: Point3<f64>) -> bool {
        let dir = b - a;
        let mut t_min: f64 = 0.0;
        let mut t_max: f64 = 1.0;
        for axis in 0..3 {
            let (origin, d, lo, hi) = (a[axis], dir[axis], self.min[axis], self.max[axis]);
            if d.abs() < f64::EPSILON {
                if origin < lo || origin > hi {
                    return false;
                }
                continue;
            }
            let inv = 1.0 / d;
            let (mut t0, mut t1) = ((lo - origin) * inv, (hi - origin) * inv);
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return false;
            }
        }
        true
    }
}

/// HVAC air-exchange model: pollutant removal proportional to air changes
/// per hour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HvacSystem {
    /// Air changes per hour.
    pub air_changes_per_hour: f64,
}

impl HvacSystem {
    pub fn new(air_changes_per_hour: f64) -> Result<Self> {
        ensure_finite("hvac.air_changes_per_hour", air_changes_per_hour)?;
        if air_changes_per_hour < 0.0 {
            return Err(PhysicsError::invalid(
                "hvac.air_changes_per_hour",
                format!("{air_changes_per_hour} must be non-negative"),
            ));
        }
        Ok(Self {
            air_changes_per_hour,
        })
    }

    /// Removal rate in 1/s.
    pub fn exchange_rate(&self) -> f64 {
        self.air_changes_per_hour / 3600.0
    }
}

/// All environmental modifiers active in a field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub barriers: Vec<Barrier>,
    pub hvac: Option<HvacSystem>,
}

impl Environment {
    /// Combined transmission factor for every barrier crossed by the
    /// source-to-point segment. Deterministic and never negative.
    pub fn transmission_along(&self, from: Point3<f64>, to: Point3<f64>) -> f64 {
        let mut factor = 1.0;
        for barrier in &self.barriers {
            if barrier.intersects_segment(from, to) {
                factor *= barrier.material.transmission();
                if factor == 0.0 {
                    return 0.0;
                }
            }
        }
        factor
    }

    /// Air-exchange removal rate in 1/s, zero without HVAC.
    pub fn exchange_rate(&self) -> f64 {
        self.hvac.map(|h| h.exchange_rate()).unwrap_or(0.0)
    }
}

const REFERENCE_TEMPERATURE_K: f64 = 293.15;

/// Temperature coupling: gas-phase diffusivity scales roughly with T^1.75
/// (Fuller correlation). Humidity has a second-order effect on the carrier
/// gas and is folded into a small linear correction.
pub fn effective_diffusivity(base: f64, ambient: &AmbientConditions) -> f64 {
    let t_kelvin = ambient.temperature_c + 273.15;
    let temperature_scale = (t_kelvin / REFERENCE_TEMPERATURE_K).powf(1.75);
    let humidity_scale = 1.0 - 0.0005 * (ambient.relative_humidity - 50.0);
    (base * temperature_scale * humidity_scale).max(f64::MIN_POSITIVE)
}

/// Hygroscopic growth factor for particulates: droplet diameter grows as
/// humidity approaches saturation (kappa-Köhler shape, capped below 100%).
pub fn hygroscopic_growth_factor(relative_humidity: f64) -> f64 {
    let rh = relative_humidity.clamp(0.0, 99.0) / 100.0;
    (1.0 + 0.3 * rh / (1.0 - rh)).cbrt()
}

/// Gravitational settling attenuation for particulates over a transport
/// time. Grown droplets settle faster (Stokes regime, v ~ d²).
pub fn settling_attenuation(ambient: &AmbientConditions, travel_time_s: f64) -> f64 {
    const BASE_SETTLING_RATE: f64 = 1.0e-4; // 1/s for a ~1 µm dry particle
    let growth = hygroscopic_growth_factor(ambient.relative_humidity);
    let rate = BASE_SETTLING_RATE * growth * growth;
    (-rate * travel_time_s.max(0.0)).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wall() -> Barrier {
        Barrier::new(
            "partition",
            BarrierMaterial::Drywall,
            Point3::new(5.0, -10.0, 0.0),
            Point3::new(5.2, 10.0, 3.0),
        )
        .unwrap()
    }

    #[test]
    fn segment_through_wall_detected() {
        let wall = wall();
        assert!(wall.intersects_segment(Point3::new(0.0, 0.0, 1.0), Point3::new(10.0, 0.0, 1.0)));
        assert!(!wall.intersects_segment(Point3::new(0.0, 0.0, 1.0), Point3::new(4.0, 0.0, 1.0)));
    }

    #[test]
    fn opaque_barrier_zeroes_transmission() {
        let mut env = Environment::default();
        env.barriers.push(Barrier::new(
            "window",
            BarrierMaterial::Glass,
            Point3::new(5.0, -10.0, 0.0),
            Point3::new(5.2, 10.0, 3.0),
        )
        .unwrap());
        let t = env.transmission_along(Point3::new(0.0, 0.0, 1.0), Point3::new(10.0, 0.0, 1.0));
        assert_eq!(t, 0.0);
    }

    #[test]
    fn stacked_barriers_multiply() {
        let mut env = Environment::default();
        env.barriers.push(wall());
        env.barriers.push(Barrier::new(
            "second",
            BarrierMaterial::Drywall,
            Point3::new(7.0, -10.0, 0.0),
            Point3::new(7.2, 10.0, 3.0),
        )
        .unwrap());
        let t = env.transmission_along(Point3::new(0.0, 0.0, 1.0), Point3::new(10.0, 0.0, 1.0));
        assert!((t - 0.15 * 0.15).abs() < 1e-12);
    }

    #[test]
    fn custom_transmission_out_of_range_rejected() {
        assert!(BarrierMaterial::Custom(1.5).validate().is_err());
        assert!(BarrierMaterial::Custom(-0.1).validate().is_err());
    }

    #[test]
    fn warmer_air_diffuses_faster() {
        let cold = AmbientConditions {
            temperature_c: 0.0,
            ..Default::default()
        };
        let hot = AmbientConditions {
            temperature_c: 40.0,
            ..Default::default()
        };
        let base = 0.05;
        assert!(effective_diffusivity(base, &hot) > effective_diffusivity(base, &cold));
    }

    #[test]
    fn growth_factor_monotonic_in_humidity() {
        assert!(hygroscopic_growth_factor(90.0) > hygroscopic_growth_factor(30.0));
        assert!(hygroscopic_growth_factor(0.0) >= 1.0);
    }

    #[test]
    fn settling_attenuates_over_time() {
        let ambient = AmbientConditions::default();
        let short = settling_attenuation(&ambient, 10.0);
        let long = settling_attenuation(&ambient, 1000.0);
        assert!(long < short);
        assert!(short <= 1.0);
    }
}
