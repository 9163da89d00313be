//! Resolves a model name to an ordered list of candidates to try. Purely a
//! function of the current config snapshot, the registered adapters, and
//! breaker state — no I/O, so it can be called cheaply on every request.

use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::config::{CandidateConfig, Config};
use crate::error::AppError;
use crate::registry::AdapterRegistry;

#[derive(Debug, Clone)]
pub struct Candidate {
    pub provider: String,
    pub upstream_model: String,
    pub weight: u32,
}

/// Resolve `model` to the ordered list of candidates the retry loop should
/// try, most-preferred first. Drops candidates whose adapter isn't
/// registered and candidates whose circuit is open and not yet due for a
/// half-open probe, then caps the list at `retry_budget + 1` attempts —
/// there is no point carrying more candidates than the budget can ever
/// reach.
pub fn resolve(
    config: &Config,
    registry: &AdapterRegistry,
    breakers: &CircuitBreakerRegistry,
    model: &str,
) -> Result<Vec<Candidate>, AppError> {
    let configured = candidates_for_model(config, model).ok_or_else(|| AppError::NoRoute(model.to_string()))?;

    let mut candidates: Vec<Candidate> = configured
        .iter()
        .filter(|c| registry.contains(&c.provider))
        .filter(|c| breakers.would_allow(&c.provider))
        .map(|c| Candidate { provider: c.provider.clone(), upstream_model: c.upstream_model.clone(), weight: c.weight })
        .collect();

    if candidates.is_empty() {
        let keys = candidate_keys_for_model(config, model);
        let retry_after_secs = breakers.earliest_remaining_timeout(&keys).as_secs();
        return Err(AppError::AllUpstreamsUnavailable { retry_after_secs });
    }

    candidates.sort_by(|a, b| b.weight.cmp(&a.weight));

    let cap = config.routing.retry_budget as usize + 1;
    candidates.truncate(cap);

    Ok(candidates)
}

/// Every circuit breaker key a candidate list for this model could touch,
/// regardless of current breaker state — used to compute the
/// `Retry-After` hint when every candidate turns out to be unavailable.
pub fn candidate_keys_for_model(config: &Config, model: &str) -> Vec<String> {
    candidates_for_model(config, model)
        .map(|cands| cands.iter().map(|c| c.provider.clone()).collect())
        .unwrap_or_default()
}

fn candidates_for_model(config: &Config, model: &str) -> Option<Vec<CandidateConfig>> {
    if let Some(explicit) = config.routing.candidates.get(model) {
        return Some(explicit.clone());
    }

    config
        .routing
        .rules
        .iter()
        .find(|(prefix, _)| model.starts_with(prefix.as_str()))
        .map(|(_, provider)| {
            vec![CandidateConfig { provider: provider.clone(), upstream_model: model.to_string(), weight: 100 }]
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::BreakerConfig;
    use crate::config::MockInstanceConfig;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.providers.mock.push(MockInstanceConfig { name: "mock-a".to_string(), enabled: true });
        config.providers.mock.push(MockInstanceConfig { name: "mock-b".to_string(), enabled: true });
        config.routing.candidates.insert(
            "test-model".to_string(),
            vec![
                CandidateConfig { provider: "mock-b".to_string(), upstream_model: "b-model".to_string(), weight: 50 },
                CandidateConfig { provider: "mock-a".to_string(), upstream_model: "a-model".to_string(), weight: 100 },
            ],
        );
        config
    }

    #[test]
    fn test_resolve_sorts_by_descending_weight() {
        let config = test_config();
        let registry = AdapterRegistry::build(&config, reqwest::Client::new());
        let breakers = CircuitBreakerRegistry::new(BreakerConfig::default());

        let candidates = resolve(&config, &registry, &breakers, "test-model").unwrap();
        assert_eq!(candidates[0].provider, "mock-a");
        assert_eq!(candidates[1].provider, "mock-b");
    }

    #[test]
    fn test_resolve_unknown_model_errors() {
        let config = test_config();
        let registry = AdapterRegistry::build(&config, reqwest::Client::new());
        let breakers = CircuitBreakerRegistry::new(BreakerConfig::default());

        assert!(resolve(&config, &registry, &breakers, "nonexistent").is_err());
    }

    #[test]
    fn test_resolve_drops_unregistered_provider() {
        let mut config = test_config();
        config.routing.candidates.get_mut("test-model").unwrap().push(CandidateConfig {
            provider: "ghost".to_string(),
            upstream_model: "ghost-model".to_string(),
            weight: 1000,
        });
        let registry = AdapterRegistry::build(&config, reqwest::Client::new());
        let breakers = CircuitBreakerRegistry::new(BreakerConfig::default());

        let candidates = resolve(&config, &registry, &breakers, "test-model").unwrap();
        assert!(candidates.iter().all(|c| c.provider != "ghost"));
    }

    #[test]
    fn test_resolve_caps_at_retry_budget_plus_one() {
        let mut config = test_config();
        config.routing.retry_budget = 0;
        let registry = AdapterRegistry::build(&config, reqwest::Client::new());
        let breakers = CircuitBreakerRegistry::new(BreakerConfig::default());

        let candidates = resolve(&config, &registry, &breakers, "test-model").unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn test_resolve_falls_back_to_prefix_rule() {
        let mut config = test_config();
        config.routing.rules.insert("mock-".to_string(), "mock-a".to_string());
        let registry = AdapterRegistry::build(&config, reqwest::Client::new());
        let breakers = CircuitBreakerRegistry::new(BreakerConfig::default());

        let candidates = resolve(&config, &registry, &breakers, "mock-7b").unwrap();
        assert_eq!(candidates[0].provider, "mock-a");
        assert_eq!(candidates[0].upstream_model, "mock-7b");
    }

    #[test]
    fn test_resolve_all_breakers_open_yields_all_upstreams_unavailable() {
        let config = test_config();
        let registry = AdapterRegistry::build(&config, reqwest::Client::new());
        let breakers = CircuitBreakerRegistry::new(BreakerConfig { failure_threshold: 1, ..BreakerConfig::default() });
        for _ in 0..5 {
            breakers.record_failure("mock-a");
            breakers.record_failure("mock-b");
        }

        let err = resolve(&config, &registry, &breakers, "test-model").unwrap_err();
        assert_eq!(err.kind(), "all_upstreams_unavailable");
    }

    #[test]
    fn test_resolve_unmapped_model_yields_no_route() {
        let config = test_config();
        let registry = AdapterRegistry::build(&config, reqwest::Client::new());
        let breakers = CircuitBreakerRegistry::new(BreakerConfig::default());

        let err = resolve(&config, &registry, &breakers, "nonexistent").unwrap_err();
        assert_eq!(err.kind(), "no_route");
    }
}
