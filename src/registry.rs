//! Builds the live set of provider adapters from a config snapshot and
//! looks them up by name. Swapped atomically alongside the config on
//! reload so in-flight requests never see a half-updated provider set.

use crate::config::Config;
use crate::providers::{adapter::Adapter, anthropic::AnthropicAdapter, generic_openai::GenericOpenAiAdapter, gemini::GeminiAdapter, mock::MockAdapter};
use std::collections::HashMap;
use std::sync::Arc;

pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn Adapter>>,
}

impl AdapterRegistry {
    pub fn build(config: &Config, http: reqwest::Client) -> Self {
        let mut adapters: HashMap<String, Arc<dyn Adapter>> = HashMap::new();

        for cfg in &config.providers.openai {
            if cfg.enabled {
                adapters.insert(cfg.name.clone(), Arc::new(GenericOpenAiAdapter::new(cfg, http.clone())));
            }
        }
        for cfg in &config.providers.ollama {
            if cfg.enabled {
                adapters.insert(cfg.name.clone(), Arc::new(GenericOpenAiAdapter::new(cfg, http.clone())));
            }
        }
        for cfg in &config.providers.anthropic {
            if cfg.enabled {
                adapters.insert(cfg.name.clone(), Arc::new(AnthropicAdapter::new(cfg, http.clone())));
            }
        }
        for cfg in &config.providers.gemini {
            if cfg.enabled {
                adapters.insert(cfg.name.clone(), Arc::new(GeminiAdapter::new(cfg, http.clone())));
            }
        }
        for cfg in &config.providers.mock {
            if cfg.enabled {
                adapters.insert(cfg.name.clone(), Arc::new(MockAdapter::new(cfg.name.clone())));
            }
        }

        Self { adapters }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Adapter>> {
        self.adapters.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.adapters.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Snapshot of every registered adapter's (name, kind) pair, used by
    /// the health checker to probe every instance on an interval.
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Adapter>> {
        self.adapters.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, MockInstanceConfig};

    fn test_config() -> Config {
        let mut config = Config::default();
        config.providers.mock.push(MockInstanceConfig { name: "mock-primary".to_string(), enabled: true });
        config
    }

    #[test]
    fn test_build_registers_enabled_mock() {
        let registry = AdapterRegistry::build(&test_config(), reqwest::Client::new());
        assert!(registry.contains("mock-primary"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_name_returns_none() {
        let registry = AdapterRegistry::build(&test_config(), reqwest::Client::new());
        assert!(registry.get("does-not-exist").is_none());
    }
}
