//! Gaussian plume dispersion engine.
//!
//! Superposes every active source onto the field. Per-point evaluation is a
//! pure function of (sources, time, point) and safe to parallelize across
//! query points within a timestep.
//!
//! Chemical transport uses the classic Gaussian plume with a ground
//! reflection image term; near-calm wind falls back to a radially symmetric
//! diffusion-decay kernel, blended continuously across a wind-speed band.

use crate::environment::{effective_diffusivity, settling_attenuation};
use crate::field::FieldView;
use crate::sources::{SourceKind, SourceModel};
use crate::{ensure_finite, PhysicsError, Result};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Pasquill-style atmospheric stability class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StabilityClass {
    /// Very unstable
    A,
    /// Unstable
    B,
    /// Slightly unstable
    C,
    /// Neutral
    D,
    /// Slightly stable
    E,
    /// Stable
    F,
}

/// Power-law dispersion coefficient: sigma(x) = coefficient * x^exponent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerLaw {
    pub coefficient: f64,
    pub exponent: f64,
}

impl PowerLaw {
    pub fn new(coefficient: f64, exponent: f64) -> Result<Self> {
        ensure_finite("power_law.coefficient", coefficient)?;
        ensure_finite("power_law.exponent", exponent)?;
        if coefficient <= 0.0 {
            return Err(PhysicsError::invalid(
                "power_law.coefficient",
                format!("{coefficient} must be positive"),
            ));
        }
        // Positive exponent keeps sigma monotonically increasing downwind.
        if exponent <= 0.0 {
            return Err(PhysicsError::invalid(
                "power_law.exponent",
                format!("{exponent} must be positive"),
            ));
        }
        Ok(Self {
            coefficient,
            exponent,
        })
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        self.coefficient * x.powf(self.exponent)
    }
}

/// Horizontal and vertical dispersion coefficient pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DispersionCoefficients {
    pub horizontal: PowerLaw,
    pub vertical: PowerLaw,
}

impl DispersionCoefficients {
    /// Power-law fits in the spirit of the Pasquill-Gifford curves,
    /// x in meters, sigma in meters.
    pub fn for_class(class: StabilityClass) -> Self {
        let (hy, hc, vy, vc) = match class {
            StabilityClass::A => (0.44, 0.894, 0.20, 1.10),
            StabilityClass::B => (0.32, 0.894, 0.12, 1.05),
            StabilityClass::C => (0.21, 0.894, 0.08, 1.00),
            StabilityClass::D => (0.14, 0.894, 0.06, 0.92),
            StabilityClass::E => (0.10, 0.894, 0.035, 0.85),
            StabilityClass::F => (0.07, 0.894, 0.016, 0.80),
        };
        Self {
            horizontal: PowerLaw {
                coefficient: hy,
                exponent: hc,
            },
            vertical: PowerLaw {
                coefficient: vy,
                exponent: vc,
            },
        }
    }

    pub fn custom(horizontal: PowerLaw, vertical: PowerLaw) -> Result<Self> {
        PowerLaw::new(horizontal.coefficient, horizontal.exponent)?;
        PowerLaw::new(vertical.coefficient, vertical.exponent)?;
        Ok(Self {
            horizontal,
            vertical,
        })
    }
}

/// Configuration for the dispersion engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispersionConfig {
    /// Atmospheric stability class selecting the default coefficient table.
    pub stability: StabilityClass,
    /// Optional override for the stability-class coefficient table.
    pub coefficients: Option<DispersionCoefficients>,
    /// Sources farther than this from a query point are skipped outright.
    pub cutoff_radius_m: f64,
    /// Half-angle of the downwind cone outside which plume sources are
    /// skipped before any exponential is evaluated.
    pub cone_half_angle_deg: f64,
    /// Below this wind speed the calm-air kernel applies alone.
    pub calm_wind_threshold: f64,
    /// Above this wind speed the plume model applies alone; the band in
    /// between blends the two continuously.
    pub plume_wind_threshold: f64,
}

impl Default for DispersionConfig {
    fn default() -> Self {
        Self {
            stability: StabilityClass::D,
            coefficients: None,
            cutoff_radius_m: 500.0,
            cone_half_angle_deg: 60.0,
            calm_wind_threshold: 0.1,
            plume_wind_threshold: 0.5,
        }
    }
}

impl DispersionConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_finite("dispersion.cutoff_radius_m", self.cutoff_radius_m)?;
        ensure_finite("dispersion.cone_half_angle_deg", self.cone_half_angle_deg)?;
        ensure_finite("dispersion.calm_wind_threshold", self.calm_wind_threshold)?;
        ensure_finite("dispersion.plume_wind_threshold", self.plume_wind_threshold)?;
        if self.cutoff_radius_m <= 0.0 {
            return Err(PhysicsError::invalid(
                "dispersion.cutoff_radius_m",
                format!("{} must be positive", self.cutoff_radius_m),
            ));
        }
        if !(0.0..=90.0).contains(&self.cone_half_angle_deg) || self.cone_half_angle_deg == 0.0 {
            return Err(PhysicsError::invalid(
                "dispersion.cone_half_angle_deg",
                format!("{} must be within (0, 90]", self.cone_half_angle_deg),
            ));
        }
        if self.calm_wind_threshold <= 0.0 || self.plume_wind_threshold <= self.calm_wind_threshold
        {
            return Err(PhysicsError::invalid(
                "dispersion.plume_wind_threshold",
                format!(
                    "thresholds ({}, {}) must satisfy 0 < calm < plume",
                    self.calm_wind_threshold, self.plume_wind_threshold
                ),
            ));
        }
        Ok(())
    }
}

// Carrier-air properties for thermal transport.
const AIR_DENSITY: f64 = 1.204; // kg/m³ at 20 °C
const AIR_SPECIFIC_HEAT: f64 = 1005.0; // J/(kg·K)

// Ambient background magnetic field indoors, µT.
const EMF_BACKGROUND_UT: f64 = 0.05;
// Quiet-room acoustic floor, dB.
const ACOUSTIC_FLOOR_DB: f64 = 30.0;

// Numerical guards.
const SIGMA_FLOOR: f64 = 1e-2;
const NEAR_FIELD_RADIUS: f64 = 0.25;

/// The dispersion engine: stateless per-point evaluation over a field view.
#[derive(Debug, Clone)]
pub struct DispersionEngine {
    config: DispersionConfig,
    coefficients: DispersionCoefficients,
    cone_tan: f64,
}

impl DispersionEngine {
    pub fn new(config: DispersionConfig) -> Result<Self> {
        config.validate()?;
        let coefficients = config
            .coefficients
            .unwrap_or_else(|| DispersionCoefficients::for_class(config.stability));
        let cone_tan = config.cone_half_angle_deg.to_radians().tan();
        Ok(Self {
            config,
            coefficients,
            cone_tan,
        })
    }

    pub fn config(&self) -> &DispersionConfig {
        &self.config
    }

    pub fn coefficients(&self) -> &DispersionCoefficients {
        &self.coefficients
    }

    /// Total airborne chemical concentration at a point, all species,
    /// ambient baselines included. µg/m³.
    pub fn concentration_at(&self, view: &FieldView, point: Point3<f64>, time: f64) -> Result<f64> {
        let point = view.resolve(point)?;
        let mut total: f64 = view.baselines().map(|(_, value)| value).sum();
        for source in view.sources() {
            if matches!(source.kind(), SourceKind::Chemical { .. }) {
                total += self.transport_contribution(source, view, point, time)?;
            }
        }
        validated("concentration_at", total)
    }

    /// Concentration of one chemical species at a point, µg/m³.
    pub fn concentration_of(
        &self,
        view: &FieldView,
        species: &str,
        point: Point3<f64>,
        time: f64,
    ) -> Result<f64> {
        let point = view.resolve(point)?;
        let mut total = view.baseline(species);
        for source in view.sources() {
            if matches!(source.kind(), SourceKind::Chemical { species: s } if s == species) {
                total += self.transport_contribution(source, view, point, time)?;
            }
        }
        validated("concentration_of", total)
    }

    /// Air temperature at a point: ambient plus thermal source plumes, °C.
    pub fn temperature_at(&self, view: &FieldView, point: Point3<f64>, time: f64) -> Result<f64> {
        let point = view.resolve(point)?;
        let mut rise = 0.0;
        for source in view.sources() {
            if matches!(source.kind(), SourceKind::Thermal) {
                // Plume kernel carries J/m³ for a source in watts; divide by
                // the carrier air heat capacity to get the temperature rise.
                let energy_density = self.transport_contribution(source, view, point, time)?;
                rise += energy_density / (AIR_DENSITY * AIR_SPECIFIC_HEAT);
            }
        }
        let value = view.ambient().temperature_c + rise;
        if !value.is_finite() {
            return Err(PhysicsError::Violation {
                context: "temperature_at",
                reason: format!("non-finite temperature {value}"),
            });
        }
        Ok(value)
    }

    /// Magnetic flux density at a point, µT. EMF propagates radially and is
    /// not advected by airflow; non-metallic barriers are transparent to it.
    pub fn emf_at(&self, view: &FieldView, point: Point3<f64>, time: f64) -> Result<f64> {
        let point = view.resolve(point)?;
        let mut total = EMF_BACKGROUND_UT;
        for source in view.sources() {
            if matches!(source.kind(), SourceKind::Emf) {
                let q = source.emission_strength(time);
                if q <= 0.0 {
                    continue;
                }
                let r = (point - source.position()).norm();
                if r > self.config.cutoff_radius_m {
                    continue;
                }
                total += q / (4.0 * PI * r.max(NEAR_FIELD_RADIUS).powi(2));
            }
        }
        validated("emf_at", total)
    }

    /// Sound pressure level at a point, dB. Intensities superpose; the
    /// logarithm applies only after summation.
    pub fn acoustic_at(&self, view: &FieldView, point: Point3<f64>, time: f64) -> Result<f64> {
        let point = view.resolve(point)?;
        let mut intensity = db_to_intensity(ACOUSTIC_FLOOR_DB);
        for source in view.sources() {
            if matches!(source.kind(), SourceKind::Acoustic) {
                let power_db = source.emission_strength(time);
                if power_db <= 0.0 {
                    continue;
                }
                let r = (point - source.position()).norm();
                if r > self.config.cutoff_radius_m {
                    continue;
                }
                let transmission = view
                    .environment()
                    .transmission_along(source.position(), point);
                intensity += db_to_intensity(power_db) * transmission
                    / (4.0 * PI * r.max(NEAR_FIELD_RADIUS).powi(2));
            }
        }
        let value = 10.0 * intensity.log10();
        if !value.is_finite() {
            return Err(PhysicsError::Violation {
                context: "acoustic_at",
                reason: format!("non-finite sound level {value}"),
            });
        }
        Ok(value)
    }

    /// Field value for an arbitrary source kind at a point.
    pub fn field_value(
        &self,
        view: &FieldView,
        kind: &SourceKind,
        point: Point3<f64>,
        time: f64,
    ) -> Result<f64> {
        match kind {
            SourceKind::Chemical { species } => self.concentration_of(view, species, point, time),
            SourceKind::Thermal => self.temperature_at(view, point, time),
            SourceKind::Emf => self.emf_at(view, point, time),
            SourceKind::Acoustic => self.acoustic_at(view, point, time),
        }
    }

    /// Single-source plume/calm contribution with environmental modifiers.
    ///
    /// The cheap geometric rejections (cutoff radius, upwind, cone) run
    /// before any exponential term is touched; with many simultaneous
    /// sources most of them exit here.
    fn transport_contribution(
        &self,
        source: &SourceModel,
        view: &FieldView,
        point: Point3<f64>,
        time: f64,
    ) -> Result<f64> {
        let q = source.emission_strength(time);
        if q <= 0.0 {
            return Ok(0.0);
        }

        let offset = point - source.position();
        let r = offset.norm();
        if r > self.config.cutoff_radius_m {
            return Ok(0.0);
        }

        let transmission = view
            .environment()
            .transmission_along(source.position(), point);
        if transmission == 0.0 {
            return Ok(0.0);
        }

        let ambient = view.ambient();
        let wind_h = Vector3::new(ambient.airflow.x, ambient.airflow.y, 0.0);
        let u = wind_h.norm();
        let w = self.blend_weight(u);

        let mut c = 0.0;
        if w > 0.0 {
            c += w * self.plume_term(q, source, view, offset, point.z, wind_h, u);
        }
        if w < 1.0 {
            c += (1.0 - w) * self.calm_term(q, source, view, r);
        }
        c *= transmission;

        if !c.is_finite() || c < 0.0 {
            return Err(PhysicsError::Violation {
                context: "transport_contribution",
                reason: format!("source `{}` produced {c}", source.id()),
            });
        }
        Ok(c)
    }

    /// Classic Gaussian plume with ground-reflection image source.
    fn plume_term(
        &self,
        q: f64,
        source: &SourceModel,
        view: &FieldView,
        offset: Vector3<f64>,
        z: f64,
        wind_h: Vector3<f64>,
        u: f64,
    ) -> f64 {
        if u <= 0.0 {
            return 0.0;
        }
        let axis = wind_h / u;
        let offset_h = Vector3::new(offset.x, offset.y, 0.0);
        let x = offset_h.dot(&axis);
        if x <= 0.0 {
            // Upwind of the source: skip before any exponential.
            return 0.0;
        }
        let y = (offset_h - axis * x).norm();
        if y > x * self.cone_tan {
            // Outside the plume cone: skip.
            return 0.0;
        }

        let sigma_y = self.coefficients.horizontal.evaluate(x).max(SIGMA_FLOOR);
        let sigma_z = self.coefficients.vertical.evaluate(x).max(SIGMA_FLOOR);
        let release_height = source.position().z;

        let crosswind = (-y * y / (2.0 * sigma_y * sigma_y)).exp();
        let dz_direct = z - release_height;
        let dz_image = z + release_height;
        let vertical = (-dz_direct * dz_direct / (2.0 * sigma_z * sigma_z)).exp()
            + (-dz_image * dz_image / (2.0 * sigma_z * sigma_z)).exp();

        let base = q / (2.0 * PI * u * sigma_y * sigma_z) * crosswind * vertical;

        // Post-plume modifiers: air exchange + chemical decay over the
        // travel time, settling for particulates.
        let travel_time = x / u;
        let removal_rate = source.material().decay_rate + view.environment().exchange_rate();
        let mut factor = (-removal_rate * travel_time).exp();
        if source.material().particulate {
            factor *= settling_attenuation(view.ambient(), travel_time);
        }
        base * factor
    }

    /// Radially symmetric steady-state diffusion-decay kernel for near-calm
    /// air.
    fn calm_term(&self, q: f64, source: &SourceModel, view: &FieldView, r: f64) -> f64 {
        let ambient = view.ambient();
        let d_eff = effective_diffusivity(source.material().diffusion_coefficient, ambient);
        let removal_rate = source.material().decay_rate + view.environment().exchange_rate();
        let r = r.max(NEAR_FIELD_RADIUS);

        let mut c = q / (4.0 * PI * d_eff * r);
        if removal_rate > 0.0 {
            let decay_length = (d_eff / removal_rate).sqrt();
            c *= (-r / decay_length).exp();
        }
        if source.material().particulate {
            // Diffusive transport timescale to radius r.
            let travel_time = r * r / (4.0 * d_eff);
            c *= settling_attenuation(ambient, travel_time);
        }
        c
    }

    /// Plume weight as a function of wind speed: 0 below the calm
    /// threshold, 1 above the plume threshold, linear in between. The
    /// linear band keeps the model transition continuous.
    fn blend_weight(&self, wind_speed: f64) -> f64 {
        let lo = self.config.calm_wind_threshold;
        let hi = self.config.plume_wind_threshold;
        ((wind_speed - lo) / (hi - lo)).clamp(0.0, 1.0)
    }
}

fn db_to_intensity(db: f64) -> f64 {
    10f64.powf(db / 10.0)
}

fn validated(context: &'static str, value: f64) -> Result<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(PhysicsError::Violation {
            context,
            reason: format!("computed value {value}"),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{AmbientConditions, BoundaryPolicy, FieldBounds, SpatialField};
    use crate::sources::{EmissionPattern, MaterialProperties};
    use approx::assert_relative_eq;

    fn open_field(wind: Vector3<f64>) -> SpatialField {
        let bounds = FieldBounds::new(
            Point3::new(-200.0, -200.0, 0.0),
            Point3::new(200.0, 200.0, 50.0),
        )
        .unwrap();
        let mut field = SpatialField::new(bounds, BoundaryPolicy::Clamp);
        field
            .set_ambient(AmbientConditions {
                airflow: wind,
                ..Default::default()
            })
            .unwrap();
        field
    }

    fn constant_source(id: &str, rate: f64, position: Point3<f64>) -> SourceModel {
        SourceModel::new(
            id,
            SourceKind::chemical("co"),
            position,
            EmissionPattern::Constant { rate },
            MaterialProperties::default(),
        )
        .unwrap()
    }

    fn engine() -> DispersionEngine {
        DispersionEngine::new(DispersionConfig::default()).unwrap()
    }

    #[test]
    fn matches_closed_form_plume_value() {
        // 100 µg/s at the origin, 1 m/s wind along +x, query at (10, 0, 0).
        let mut field = open_field(Vector3::new(1.0, 0.0, 0.0));
        field
            .install_source(constant_source("s", 100.0, Point3::new(0.0, 0.0, 0.0)))
            .unwrap();
        let engine = engine();

        let coeffs = DispersionCoefficients::for_class(StabilityClass::D);
        let sigma_y = coeffs.horizontal.evaluate(10.0);
        let sigma_z = coeffs.vertical.evaluate(10.0);
        // Ground-level source and receptor: direct and image terms coincide.
        let expected = 100.0 / (2.0 * PI * 1.0 * sigma_y * sigma_z) * 2.0;

        let got = engine
            .concentration_at(&field.view(), Point3::new(10.0, 0.0, 0.0), 0.0)
            .unwrap();
        assert_relative_eq!(got, expected, max_relative = 0.05);
    }

    #[test]
    fn superposition_of_independent_sources() {
        let wind = Vector3::new(1.0, 0.0, 0.0);
        let p = Point3::new(20.0, 2.0, 1.0);

        let mut both = open_field(wind);
        both.install_source(constant_source("a", 40.0, Point3::new(0.0, 0.0, 1.0)))
            .unwrap();
        both.install_source(constant_source("b", 70.0, Point3::new(-5.0, 1.0, 2.0)))
            .unwrap();

        let mut only_a = open_field(wind);
        only_a
            .install_source(constant_source("a", 40.0, Point3::new(0.0, 0.0, 1.0)))
            .unwrap();
        let mut only_b = open_field(wind);
        only_b
            .install_source(constant_source("b", 70.0, Point3::new(-5.0, 1.0, 2.0)))
            .unwrap();

        let engine = engine();
        let combined = engine.concentration_at(&both.view(), p, 10.0).unwrap();
        let sum = engine.concentration_at(&only_a.view(), p, 10.0).unwrap()
            + engine.concentration_at(&only_b.view(), p, 10.0).unwrap();
        assert_relative_eq!(combined, sum, max_relative = 1e-9);
    }

    #[test]
    fn two_half_strength_sources_double_one_full() {
        let wind = Vector3::new(1.5, 0.0, 0.0);
        let origin = Point3::new(0.0, 0.0, 1.0);

        let mut twin = open_field(wind);
        twin.install_source(constant_source("a", 50.0, origin))
            .unwrap();
        twin.install_source(constant_source("b", 50.0, origin))
            .unwrap();

        let mut single = open_field(wind);
        single
            .install_source(constant_source("s", 100.0, origin))
            .unwrap();

        let engine = engine();
        for p in [
            Point3::new(5.0, 0.0, 1.0),
            Point3::new(30.0, 3.0, 0.5),
            Point3::new(80.0, -10.0, 2.0),
        ] {
            let twin_c = engine.concentration_at(&twin.view(), p, 0.0).unwrap();
            let single_c = engine.concentration_at(&single.view(), p, 0.0).unwrap();
            assert_relative_eq!(twin_c, 2.0 * single_c, max_relative = 1e-9);
        }
    }

    #[test]
    fn concentration_decays_monotonically_downwind() {
        let mut field = open_field(Vector3::new(1.0, 0.0, 0.0));
        field
            .install_source(constant_source("s", 100.0, Point3::new(0.0, 0.0, 2.0)))
            .unwrap();
        let engine = engine();

        // Find the peak ground-level concentration, then require strict
        // decay beyond it.
        let samples: Vec<f64> = (1..150)
            .map(|i| {
                engine
                    .concentration_at(&field.view(), Point3::new(i as f64, 0.0, 0.0), 0.0)
                    .unwrap()
            })
            .collect();
        let peak = samples
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        for pair in samples[peak..].windows(2) {
            assert!(
                pair[1] < pair[0] || pair[1] == 0.0,
                "tail not monotone: {} -> {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn calm_wind_does_not_divide_by_zero() {
        let mut field = open_field(Vector3::zeros());
        field
            .install_source(constant_source("s", 100.0, Point3::new(0.0, 0.0, 1.0)))
            .unwrap();
        let engine = engine();
        let c = engine
            .concentration_at(&field.view(), Point3::new(3.0, 0.0, 1.0), 0.0)
            .unwrap();
        assert!(c.is_finite());
        assert!(c > 0.0);
    }

    #[test]
    fn model_transition_is_continuous_across_blend_band() {
        let engine = engine();
        let source = constant_source("s", 100.0, Point3::new(0.0, 0.0, 1.0));
        let p = Point3::new(10.0, 0.0, 1.0);

        // Sweep wind speed across both thresholds in fine steps; the
        // concentration curve must have no jumps.
        let mut previous: Option<f64> = None;
        let mut speed = 0.05;
        while speed < 0.7 {
            let mut field = open_field(Vector3::new(speed, 0.0, 0.0));
            field.install_source(source.clone()).unwrap();
            let c = engine.concentration_at(&field.view(), p, 0.0).unwrap();
            if let Some(prev) = previous {
                let scale = prev.abs().max(c.abs()).max(1e-12);
                assert!(
                    (c - prev).abs() / scale < 0.25,
                    "discontinuity near u={speed}: {prev} -> {c}"
                );
            }
            previous = Some(c);
            speed += 0.005;
        }
    }

    #[test]
    fn sources_beyond_cutoff_are_skipped() {
        let bounds = FieldBounds::new(
            Point3::new(-2000.0, -2000.0, 0.0),
            Point3::new(2000.0, 2000.0, 50.0),
        )
        .unwrap();
        let mut field = SpatialField::new(bounds, BoundaryPolicy::Clamp);
        field.set_airflow(Vector3::new(1.0, 0.0, 0.0));
        field
            .install_source(constant_source("far", 1e9, Point3::new(-1500.0, 0.0, 1.0)))
            .unwrap();
        let engine = engine();
        let c = engine
            .concentration_at(&field.view(), Point3::new(0.0, 0.0, 1.0), 0.0)
            .unwrap();
        assert_eq!(c, 0.0);
    }

    #[test]
    fn upwind_points_see_nothing_from_plume() {
        let mut field = open_field(Vector3::new(1.0, 0.0, 0.0));
        field
            .install_source(constant_source("s", 100.0, Point3::new(0.0, 0.0, 1.0)))
            .unwrap();
        let engine = engine();
        let c = engine
            .concentration_at(&field.view(), Point3::new(-10.0, 0.0, 1.0), 0.0)
            .unwrap();
        assert_eq!(c, 0.0);
    }

    #[test]
    fn species_are_tracked_separately() {
        let mut field = open_field(Vector3::new(1.0, 0.0, 0.0));
        field
            .install_source(constant_source("co", 100.0, Point3::new(0.0, 0.0, 1.0)))
            .unwrap();
        let mut voc = SourceModel::new(
            "voc",
            SourceKind::chemical("voc"),
            Point3::new(0.0, 0.0, 1.0),
            EmissionPattern::Constant { rate: 10.0 },
            MaterialProperties::default(),
        )
        .unwrap();
        voc = voc.with_start_time(0.0);
        field.install_source(voc).unwrap();

        let engine = engine();
        let p = Point3::new(15.0, 0.0, 1.0);
        let co = engine
            .concentration_of(&field.view(), "co", p, 0.0)
            .unwrap();
        let voc = engine
            .concentration_of(&field.view(), "voc", p, 0.0)
            .unwrap();
        let total = engine.concentration_at(&field.view(), p, 0.0).unwrap();
        assert_relative_eq!(co + voc, total, max_relative = 1e-9);
        assert_relative_eq!(co, 10.0 * voc, max_relative = 1e-9);
    }

    #[test]
    fn thermal_source_raises_temperature_downwind() {
        let mut field = open_field(Vector3::new(1.0, 0.0, 0.0));
        let heater = SourceModel::new(
            "heater",
            SourceKind::Thermal,
            Point3::new(0.0, 0.0, 1.0),
            EmissionPattern::Constant { rate: 5000.0 },
            MaterialProperties::default(),
        )
        .unwrap();
        field.install_source(heater).unwrap();
        let engine = engine();
        let t = engine
            .temperature_at(&field.view(), Point3::new(5.0, 0.0, 1.0), 0.0)
            .unwrap();
        assert!(t > 20.0);
    }

    #[test]
    fn invalid_config_rejected() {
        let config = DispersionConfig {
            calm_wind_threshold: 1.0,
            plume_wind_threshold: 0.5,
            ..Default::default()
        };
        assert!(DispersionEngine::new(config).is_err());
    }
}
