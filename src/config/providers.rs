//! Provider and model reference data

use serde::{Deserialize, Serialize};

/// A provider entry seeded into the reference tables at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    pub id: i64,
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

/// A model offered by a provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    pub id: i64,
    pub slug: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_context_window")]
    pub context_window: u32,
    #[serde(default)]
    pub input_cost_per_1k: f64,
    #[serde(default)]
    pub output_cost_per_1k: f64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

fn default_context_window() -> u32 {
    8192
}

fn model(id: i64, slug: &str, context_window: u32, input: f64, output: f64) -> ModelConfig {
    ModelConfig {
        id,
        slug: slug.to_string(),
        name: None,
        context_window,
        input_cost_per_1k: input,
        output_cost_per_1k: output,
        active: true,
    }
}

fn provider(id: i64, slug: &str, name: &str, base_url: &str, models: Vec<ModelConfig>) -> ProviderConfig {
    ProviderConfig {
        id,
        slug: slug.to_string(),
        name: name.to_string(),
        base_url: Some(base_url.to_string()),
        active: true,
        models,
    }
}

/// Built-in provider catalogue used when the config file defines none.
pub fn default_providers() -> Vec<ProviderConfig> {
    vec![
        provider(
            1,
            "openai",
            "OpenAI",
            "https://api.openai.com/v1",
            vec![
                model(1, "gpt-4o-mini", 128_000, 0.00015, 0.0006),
                model(2, "gpt-4o", 128_000, 0.0025, 0.01),
                model(3, "text-embedding-3-small", 8191, 0.00002, 0.0),
            ],
        ),
        provider(
            2,
            "anthropic",
            "Anthropic",
            "https://api.anthropic.com/v1",
            vec![model(10, "claude-3-5-haiku-latest", 200_000, 0.0008, 0.004)],
        ),
        provider(
            3,
            "google",
            "Google Gemini",
            "https://generativelanguage.googleapis.com/v1beta",
            vec![model(20, "gemini-1.5-flash", 1_000_000, 0.000075, 0.0003)],
        ),
        provider(4, "mistral", "Mistral AI", "https://api.mistral.ai/v1", vec![]),
        provider(5, "groq", "Groq", "https://api.groq.com/openai/v1", vec![]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_providers_have_unique_ids() {
        let providers = default_providers();
        let mut ids: Vec<i64> = providers.iter().map(|p| p.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), providers.len());
        assert_eq!(providers[0].slug, "openai");
    }

    #[test]
    fn test_provider_parse_with_models() {
        let toml = r#"
        id = 9
        slug = "local"
        name = "Local"

        [[models]]
        id = 90
        slug = "llama3"
        "#;
        let provider: ProviderConfig = toml::from_str(toml).unwrap();
        assert!(provider.active);
        assert_eq!(provider.models.len(), 1);
        assert_eq!(provider.models[0].context_window, 8192);
    }
}
