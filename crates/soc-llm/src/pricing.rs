//! Per-model token pricing used to derive [`soc_core::TokenUsage::cost_usd`].
//!
//! Prices are compiled-in defaults, overridable at startup via `SOC_MODEL_PRICING_JSON`
//! (a JSON object of `{"model_name": {"input_per_1k": ..., "output_per_1k": ...}}`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// USD cost per 1,000 tokens for a single model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ModelRate {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

/// A lookup table of [`ModelRate`]s by model name, with a fallback rate for unknown models.
#[derive(Debug, Clone)]
pub struct ModelPricing {
    rates: HashMap<String, ModelRate>,
    fallback: ModelRate,
}

impl ModelPricing {
    fn defaults() -> HashMap<String, ModelRate> {
        let mut rates = HashMap::new();
        rates.insert(
            "gpt-4".to_string(),
            ModelRate { input_per_1k: 0.03, output_per_1k: 0.06 },
        );
        rates.insert(
            "gpt-4-turbo-preview".to_string(),
            ModelRate { input_per_1k: 0.01, output_per_1k: 0.03 },
        );
        rates.insert(
            "gpt-3.5-turbo".to_string(),
            ModelRate { input_per_1k: 0.0005, output_per_1k: 0.0015 },
        );
        rates.insert(
            "mock".to_string(),
            ModelRate { input_per_1k: 0.0, output_per_1k: 0.0 },
        );
        rates
    }

    /// Compiled-in defaults covering the providers this crate ships.
    pub fn with_defaults() -> Self {
        Self {
            rates: Self::defaults(),
            fallback: ModelRate { input_per_1k: 0.001, output_per_1k: 0.002 },
        }
    }

    /// Load from `SOC_MODEL_PRICING_JSON` if set, merging over the compiled-in defaults;
    /// falls back to [`Self::with_defaults`] on missing env var or malformed JSON.
    pub fn from_env() -> Self {
        let mut pricing = Self::with_defaults();
        if let Ok(raw) = std::env::var("SOC_MODEL_PRICING_JSON") {
            match serde_json::from_str::<HashMap<String, ModelRate>>(&raw) {
                Ok(overrides) => pricing.rates.extend(overrides),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring malformed SOC_MODEL_PRICING_JSON");
                }
            }
        }
        pricing
    }

    pub fn rate_for(&self, model: &str) -> ModelRate {
        self.rates.get(model).copied().unwrap_or(self.fallback)
    }

    pub fn cost_usd(&self, model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        let rate = self.rate_for(model);
        (input_tokens as f64 / 1000.0) * rate.input_per_1k
            + (output_tokens as f64 / 1000.0) * rate.output_per_1k
    }
}

impl Default for ModelPricing {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_uses_its_own_rate() {
        let pricing = ModelPricing::with_defaults();
        let cost = pricing.cost_usd("gpt-4", 1000, 1000);
        assert!((cost - 0.09).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_uses_fallback_rate() {
        let pricing = ModelPricing::with_defaults();
        let cost = pricing.cost_usd("some-future-model", 1000, 0);
        assert!((cost - 0.001).abs() < 1e-9);
    }

    #[test]
    fn env_override_replaces_default_rate() {
        std::env::set_var(
            "SOC_MODEL_PRICING_JSON",
            r#"{"gpt-4": {"input_per_1k": 1.0, "output_per_1k": 1.0}}"#,
        );
        let pricing = ModelPricing::from_env();
        assert_eq!(pricing.rate_for("gpt-4").input_per_1k, 1.0);
        std::env::remove_var("SOC_MODEL_PRICING_JSON");
    }
}
