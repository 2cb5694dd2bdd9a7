//! Active learning feedback loop.
//!
//! Consumes external model uncertainty/error signals keyed by scenario and
//! parameter region, ranks the weakest regions under a pluggable
//! prioritization strategy, and steers the dataset generator toward them.

use crate::dataset::{Dataset, DatasetGenerator};
use crate::scenario::StoredScenario;
use crate::{DatasetError, Result};
use serde::{Deserialize, Serialize};

/// External model performance signal for one region of the scenario
/// parameter space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionFeedback {
    pub scenario_type: String,
    /// Scenario parameter spanning the region.
    pub parameter: String,
    /// Inclusive parameter range covered by this signal.
    pub range: (f64, f64),
    /// Mean predictive uncertainty observed on real-time sensor inputs.
    pub realtime_uncertainty: f64,
    /// Mean predictive uncertainty observed on high-fidelity reference
    /// sensor inputs.
    pub high_fidelity_uncertainty: f64,
    /// Classification error rate within the region.
    pub error_rate: f64,
}

impl RegionFeedback {
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("realtime_uncertainty", self.realtime_uncertainty),
            ("high_fidelity_uncertainty", self.high_fidelity_uncertainty),
            ("error_rate", self.error_rate),
            ("range.0", self.range.0),
            ("range.1", self.range.1),
        ] {
            if !value.is_finite() {
                return Err(DatasetError::InvalidConfig(format!(
                    "feedback {name} is not finite"
                )));
            }
        }
        if self.range.0 > self.range.1 {
            return Err(DatasetError::InvalidConfig(format!(
                "feedback range ({}, {}) is inverted",
                self.range.0, self.range.1
            )));
        }
        Ok(())
    }
}

/// Aggregate model feedback across regions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelFeedback {
    pub regions: Vec<RegionFeedback>,
}

/// A ranked weak region of the scenario/parameter space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeakSpot {
    pub scenario_type: String,
    pub parameter: String,
    pub range: (f64, f64),
    pub score: f64,
}

/// Suggested scenario parameter change derived from a weak region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDelta {
    pub scenario_type: String,
    pub parameter: String,
    pub suggested_value: f64,
    pub rationale: String,
}

/// Scores a region's weakness; higher means more in need of data.
pub trait PrioritizationStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn score(&self, region: &RegionFeedback) -> f64;
}

/// Weighs uncertainty seen on real-time sensor inputs: for deployments
/// where the model runs against cheap, noisy, low-latency channels.
pub struct RealTimeWeighted;

impl PrioritizationStrategy for RealTimeWeighted {
    fn name(&self) -> &'static str {
        "realtime_weighted"
    }
    fn score(&self, region: &RegionFeedback) -> f64 {
        region.realtime_uncertainty + region.error_rate
    }
}

/// Weighs uncertainty seen on high-fidelity reference inputs: for
/// laboratory-grade validation targets.
pub struct HighFidelityWeighted;

impl PrioritizationStrategy for HighFidelityWeighted {
    fn name(&self) -> &'static str {
        "high_fidelity_weighted"
    }
    fn score(&self, region: &RegionFeedback) -> f64 {
        region.high_fidelity_uncertainty + region.error_rate
    }
}

/// Heterogeneous blend of the two sensor classes.
pub struct BlendedStrategy {
    /// Weight on the real-time channel, 0.0 - 1.0.
    pub realtime_weight: f64,
}

impl PrioritizationStrategy for BlendedStrategy {
    fn name(&self) -> &'static str {
        "blended"
    }
    fn score(&self, region: &RegionFeedback) -> f64 {
        let w = self.realtime_weight.clamp(0.0, 1.0);
        w * region.realtime_uncertainty
            + (1.0 - w) * region.high_fidelity_uncertainty
            + region.error_rate
    }
}

/// Closes the loop between model performance and dataset generation.
pub struct ActiveLearningCoordinator {
    strategy: Box<dyn PrioritizationStrategy>,
    feedback: Option<ModelFeedback>,
    /// Regions scoring below this are not considered weak.
    min_score: f64,
}

impl ActiveLearningCoordinator {
    pub fn new(strategy: Box<dyn PrioritizationStrategy>) -> Self {
        Self {
            strategy,
            feedback: None,
            min_score: 0.1,
        }
    }

    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Store the latest external model feedback, replacing any previous
    /// signal.
    pub fn record_feedback(&mut self, feedback: ModelFeedback) -> Result<()> {
        for region in &feedback.regions {
            region.validate()?;
        }
        tracing::debug!(regions = feedback.regions.len(), "model feedback recorded");
        self.feedback = Some(feedback);
        Ok(())
    }

    /// Rank weak regions by the configured strategy, strongest need first.
    ///
    /// Without recorded feedback this returns an empty list; it never
    /// fabricates regions.
    pub fn identify_weak_spots(&self) -> Vec<WeakSpot> {
        let Some(feedback) = &self.feedback else {
            return Vec::new();
        };
        let mut spots: Vec<WeakSpot> = feedback
            .regions
            .iter()
            .map(|region| WeakSpot {
                scenario_type: region.scenario_type.clone(),
                parameter: region.parameter.clone(),
                range: region.range,
                score: self.strategy.score(region),
            })
            .filter(|spot| spot.score >= self.min_score)
            .collect();
        spots.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        spots
    }

    /// Re-invoke the dataset generator with scenario parameters biased
    /// toward the identified weak regions.
    ///
    /// `count` scenario runs are produced per region, with the weak
    /// parameter swept evenly across the region's range.
    pub async fn generate_targeted_samples(
        &self,
        generator: &DatasetGenerator,
        base_scenarios: &[StoredScenario],
        regions: &[WeakSpot],
        count: usize,
    ) -> Result<Dataset> {
        if count == 0 {
            return Err(DatasetError::InvalidConfig(
                "targeted sample count must be at least 1".into(),
            ));
        }
        let mut targeted = Vec::new();
        for region in regions {
            let Some(base) = base_scenarios
                .iter()
                .find(|s| s.scenario_type == region.scenario_type)
            else {
                tracing::warn!(
                    scenario = %region.scenario_type,
                    "weak region has no base scenario; skipped"
                );
                continue;
            };
            for step in 0..count {
                let fraction = if count == 1 {
                    0.5
                } else {
                    step as f64 / (count - 1) as f64
                };
                let value = region.range.0 + fraction * (region.range.1 - region.range.0);
                let mut params = base.params.clone();
                let Some(object) = params.as_object_mut() else {
                    return Err(DatasetError::InvalidConfig(format!(
                        "scenario `{}` parameters are not an object",
                        region.scenario_type
                    )));
                };
                if !object.contains_key(&region.parameter) {
                    tracing::warn!(
                        scenario = %region.scenario_type,
                        parameter = %region.parameter,
                        "weak region parameter unknown to scenario; skipped"
                    );
                    break;
                }
                object.insert(region.parameter.clone(), serde_json::Value::from(value));
                targeted.push(StoredScenario::new(&region.scenario_type, params));
            }
        }
        if targeted.is_empty() {
            return Err(DatasetError::InvalidConfig(
                "no weak region matched a base scenario".into(),
            ));
        }
        tracing::info!(runs = targeted.len(), "targeted generation starting");
        generator.generate_training_dataset(&targeted).await
    }

    /// Parameter deltas pointing scenario authors at the weak regions.
    pub fn suggest_scenario_modifications(&self, regions: &[WeakSpot]) -> Vec<ParameterDelta> {
        regions
            .iter()
            .map(|region| {
                let midpoint = 0.5 * (region.range.0 + region.range.1);
                ParameterDelta {
                    scenario_type: region.scenario_type.clone(),
                    parameter: region.parameter.clone(),
                    suggested_value: midpoint,
                    rationale: format!(
                        "model weakness score {:.3} ({}) over {} in [{}, {}]",
                        region.score,
                        self.strategy.name(),
                        region.parameter,
                        region.range.0,
                        region.range.1
                    ),
                }
            })
            .collect()
    }
}
