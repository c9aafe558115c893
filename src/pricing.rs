//! Token pricing table and cost estimation

use std::collections::HashMap;

use crate::capabilities::normalize_model_id;
use crate::config::PricingConfig;
use crate::types::{Cost, Pricing};

/// Label shared by every model missing from the table
pub const OTHER_MODEL_LABEL: &str = "other";

/// Applied to models with no table entry
pub const DEFAULT_PRICING: Pricing = Pricing {
    input: 1.0,
    cached_input: Some(0.5),
    output: 5.0,
};

/// Well-known model pricing (USD per 1M tokens)
fn builtin_pricing() -> Vec<(&'static str, Pricing)> {
    vec![
        // OpenAI
        ("gpt-4o", Pricing { input: 2.5, cached_input: Some(1.25), output: 10.0 }),
        ("gpt-4o-mini", Pricing { input: 0.15, cached_input: Some(0.075), output: 0.6 }),
        ("o1", Pricing { input: 15.0, cached_input: Some(7.5), output: 60.0 }),
        ("o3-mini", Pricing { input: 1.1, cached_input: Some(0.55), output: 4.4 }),
        // Anthropic Claude
        ("claude-sonnet-4-5-20250513", Pricing { input: 3.0, cached_input: Some(0.3), output: 15.0 }),
        ("claude-haiku-4-5-20250513", Pricing { input: 0.25, cached_input: Some(0.025), output: 1.25 }),
        // Google Gemini
        ("gemini-2.5-pro", Pricing { input: 1.25, cached_input: None, output: 5.0 }),
        // SambaNova
        ("meta-llama-3.3-70b-instruct", Pricing { input: 0.6, cached_input: None, output: 1.2 }),
        ("meta-llama-3.1-8b-instruct", Pricing { input: 0.1, cached_input: None, output: 0.2 }),
        ("llama-4-maverick-17b-128e-instruct", Pricing { input: 0.63, cached_input: None, output: 1.8 }),
        ("deepseek-r1", Pricing { input: 5.0, cached_input: None, output: 7.0 }),
        ("deepseek-v3-0324", Pricing { input: 1.0, cached_input: None, output: 1.5 }),
    ]
}

#[derive(Debug, Clone)]
pub struct PricingTable {
    default: Pricing,
    models: HashMap<String, Pricing>,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            default: DEFAULT_PRICING,
            models: builtin_pricing()
                .into_iter()
                .map(|(id, pricing)| (id.to_string(), pricing))
                .collect(),
        }
    }
}

impl PricingTable {
    /// Built-in table with config overrides layered on top
    pub fn from_config(config: &PricingConfig) -> Self {
        let mut table = Self::default();
        if let Some(default) = config.default {
            table.default = default;
        }
        for (model, pricing) in &config.models {
            table.models.insert(normalize_model_id(model), *pricing);
        }
        table
    }

    pub fn pricing_for(&self, model: &str) -> Pricing {
        self.models
            .get(&normalize_model_id(model))
            .copied()
            .unwrap_or(self.default)
    }

    /// Metric label for a model: its normalized id when priced, else `"other"`
    pub fn metric_label(&self, model: &str) -> String {
        let id = normalize_model_id(model);
        if self.models.contains_key(&id) {
            id
        } else {
            OTHER_MODEL_LABEL.to_string()
        }
    }

    /// Estimate the cost of a call. `use_cached_input` selects the cached
    /// input rate when the model has one.
    pub fn calculate_cost(
        &self,
        model: &str,
        prompt_tokens: u32,
        completion_tokens: u32,
        use_cached_input: bool,
    ) -> Cost {
        let pricing = self.pricing_for(model);
        let input_rate = match (use_cached_input, pricing.cached_input) {
            (true, Some(cached)) => cached,
            _ => pricing.input,
        };

        let input = (prompt_tokens as f64 / 1_000_000.0) * input_rate;
        let output = (completion_tokens as f64 / 1_000_000.0) * pricing.output;

        Cost {
            input,
            output,
            total: input + output,
            pricing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_standard_rate() {
        let table = PricingTable::default();
        let cost = table.calculate_cost("gpt-4o", 1_000_000, 500_000, false);

        assert!(approx(cost.input, 2.5));
        assert!(approx(cost.output, 5.0));
        assert!(approx(cost.total, 7.5));
    }

    #[test]
    fn test_cached_rate() {
        let table = PricingTable::default();
        let cost = table.calculate_cost("gpt-4o", 1_000_000, 0, true);
        assert!(approx(cost.input, 1.25));
    }

    #[test]
    fn test_cached_flag_without_cached_rate_uses_standard() {
        let table = PricingTable::default();
        let cached = table.calculate_cost("Meta-Llama-3.3-70B-Instruct", 2_000_000, 0, true);
        let standard = table.calculate_cost("Meta-Llama-3.3-70B-Instruct", 2_000_000, 0, false);
        assert!(approx(cached.input, standard.input));
        assert!(approx(cached.input, 1.2));
    }

    #[test]
    fn test_unknown_model_uses_default() {
        let table = PricingTable::default();
        assert_eq!(table.pricing_for("mystery-model"), DEFAULT_PRICING);
        assert_eq!(
            table.pricing_for("sambanova/Meta-Llama-3.1-8B-Instruct").output,
            0.2
        );
    }

    #[test]
    fn test_config_overrides() {
        let mut config = PricingConfig::default();
        config.default = Some(Pricing { input: 0.0, cached_input: None, output: 0.0 });
        config.models.insert(
            "GPT-4o".to_string(),
            Pricing { input: 1.0, cached_input: None, output: 1.0 },
        );

        let table = PricingTable::from_config(&config);
        assert_eq!(table.pricing_for("gpt-4o").input, 1.0);
        assert_eq!(table.calculate_cost("unknown", 100, 100, false).total, 0.0);
    }

    #[test]
    fn test_metric_label_is_bounded() {
        let table = PricingTable::default();
        assert_eq!(table.metric_label("sambanova/Meta-Llama-3.3-70B-Instruct"), "meta-llama-3.3-70b-instruct");
        assert_eq!(table.metric_label("caller-invented-model-123"), OTHER_MODEL_LABEL);
        assert_eq!(table.metric_label(""), OTHER_MODEL_LABEL);
    }
}
