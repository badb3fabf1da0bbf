//! Experiment configuration and the seam to the external assignment engine.
//!
//! The storefront does not bucket visitors itself. It validates the static
//! experiment table at startup, hands it to whatever [`VariantAssigner`] is
//! wired in, and exposes the per-request result as an [`ExperimentContext`]
//! request extension.

use std::collections::{BTreeMap, HashMap};

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use validator::ValidationError;

/// One experiment, keyed by id in the `experiments` config table.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentConfig {
    /// Filled from the table key when omitted.
    #[serde(default)]
    pub id: String,
    pub variants: Vec<String>,
    #[serde(default)]
    pub weights: Option<Vec<f64>>,
    /// Variant forced for automated traffic. Config files may spell it
    /// `botVariant`, which the loader lowercases.
    #[serde(
        default,
        rename(serialize = "botVariant"),
        alias = "botvariant",
        alias = "botVariant"
    )]
    pub bot_variant: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ExperimentConfig {
    fn check(&self, key: &str) -> Result<(), String> {
        if !self.id.is_empty() && self.id != key {
            return Err(format!("experiment '{key}' declares id '{}'", self.id));
        }
        if self.variants.is_empty() {
            return Err(format!("experiment '{key}' has no variants"));
        }
        if self.variants.iter().any(|v| v.trim().is_empty()) {
            return Err(format!("experiment '{key}' has a blank variant name"));
        }
        if let Some(weights) = &self.weights {
            if weights.len() != self.variants.len() {
                return Err(format!(
                    "experiment '{key}' has {} weights for {} variants",
                    weights.len(),
                    self.variants.len()
                ));
            }
            if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
                return Err(format!("experiment '{key}' has a negative or non-finite weight"));
            }
            if weights.iter().sum::<f64>() <= 0.0 {
                return Err(format!("experiment '{key}' weights sum to zero"));
            }
        }
        if let Some(bot) = &self.bot_variant {
            if !self.variants.contains(bot) {
                return Err(format!(
                    "experiment '{key}' bot variant '{bot}' is not one of its variants"
                ));
            }
        }
        Ok(())
    }
}

/// Validator hook for the `experiments` config table.
pub fn validate_experiments(
    experiments: &HashMap<String, ExperimentConfig>,
) -> Result<(), ValidationError> {
    for (key, experiment) in experiments {
        if let Err(reason) = experiment.check(key) {
            let mut err = ValidationError::new("experiments");
            err.message = Some(reason.into());
            return Err(err);
        }
    }
    Ok(())
}

/// Validated, id-normalized experiment table handed to the assignment engine.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExperimentRegistry {
    experiments: BTreeMap<String, ExperimentConfig>,
}

impl ExperimentRegistry {
    pub fn new(table: &HashMap<String, ExperimentConfig>) -> Self {
        let experiments = table
            .iter()
            .map(|(key, experiment)| {
                let mut experiment = experiment.clone();
                if experiment.id.is_empty() {
                    experiment.id = key.clone();
                }
                (key.clone(), experiment)
            })
            .collect();
        Self { experiments }
    }

    pub fn get(&self, id: &str) -> Option<&ExperimentConfig> {
        self.experiments.get(id)
    }

    pub fn enabled(&self) -> impl Iterator<Item = &ExperimentConfig> {
        self.experiments.values().filter(|e| e.enabled)
    }

    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }
}

/// Per-request assignment result attached as a request extension.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ExperimentContext {
    pub assignments: BTreeMap<String, String>,
    pub anon_id: Option<String>,
}

/// External assignment engine.
pub trait VariantAssigner: Send + Sync {
    fn assign(&self, registry: &ExperimentRegistry, headers: &HeaderMap) -> ExperimentContext;
}
