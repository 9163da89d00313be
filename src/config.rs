//! Process configuration: file + environment, hot-reloadable via
//! `arc_swap::ArcSwap<Config>`.
//!
//! Layering follows the teacher's `config` crate setup
//! (`config::Config::builder().add_source(File).add_source(Environment)`),
//! renamed from the teacher's `LLM_GATEWAY__` prefix to this system's `RAD_`
//! prefix, plus the handful of bare (unprefixed) provider-credential
//! variables the spec names directly (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`,
//! `GEMINI_API_KEY`, `OLLAMA_ENABLED`, `OLLAMA_BASE_URL`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub api_keys: Vec<ApiKeyConfig>,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerFileConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub a2a: A2AConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: RemoteCacheConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            api_keys: Vec::new(),
            routing: RoutingConfig::default(),
            providers: ProvidersConfig::default(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerFileConfig::default(),
            rate_limit: RateLimitConfig::default(),
            a2a: A2AConfig::default(),
            tls: TlsConfig::default(),
            database: DatabaseConfig::default(),
            cache: RemoteCacheConfig::default(),
            policy: PolicyConfig::default(),
            observability: ObservabilityConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_listen_addr() -> String {
    ":8090".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiKeyConfig {
    pub name: String,
    pub secret: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub rate_limit_rpm: Option<u32>,
}

fn default_true() -> bool {
    true
}

/// Model -> ordered candidate list, as configured on disk. The routing
/// table actually consulted at request time lives in
/// `router::RoutingTable`, built from this plus the legacy prefix `rules`
/// shorthand for simple single-provider setups.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub candidates: HashMap<String, Vec<CandidateConfig>>,
    /// Prefix -> provider name shorthand: `"gpt-" -> "openai"` seeds a
    /// single-candidate list (weight 100) for any model matching the prefix
    /// that has no explicit entry in `candidates`.
    #[serde(default)]
    pub rules: HashMap<String, String>,
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CandidateConfig {
    pub provider: String,
    pub upstream_model: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    100
}

fn default_retry_budget() -> u32 {
    2
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: Vec<GenericProviderInstanceConfig>,
    #[serde(default)]
    pub anthropic: Vec<AnthropicInstanceConfig>,
    #[serde(default)]
    pub gemini: Vec<GenericProviderInstanceConfig>,
    #[serde(default)]
    pub ollama: Vec<GenericProviderInstanceConfig>,
    #[serde(default)]
    pub mock: Vec<MockInstanceConfig>,
}

/// Shared shape for OpenAI-compatible and Gemini upstream instances: both
/// are fronted by a plain bearer-token HTTP client, unlike Anthropic which
/// carries its own API-version header and prompt-cache knobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenericProviderInstanceConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub api_key: String,
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnthropicInstanceConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub api_key: String,
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_anthropic_version")]
    pub api_version: String,
    #[serde(default)]
    pub cache: CacheConfig,
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_anthropic_version() -> String {
    "2023-06-01".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MockInstanceConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_timeout() -> u64 {
    60
}

/// Anthropic prompt-caching knobs, consumed by
/// `converters::openai_to_anthropic::apply_auto_caching`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_auto_cache_system")]
    pub auto_cache_system: bool,
    #[serde(default = "default_min_system_tokens")]
    pub min_system_tokens: u64,
    #[serde(default = "default_auto_cache_tools")]
    pub auto_cache_tools: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            auto_cache_system: default_auto_cache_system(),
            min_system_tokens: default_min_system_tokens(),
            auto_cache_tools: default_auto_cache_tools(),
        }
    }
}

fn default_auto_cache_system() -> bool {
    true
}
fn default_min_system_tokens() -> u64 {
    1024
}
fn default_auto_cache_tools() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_budget")]
    pub budget: u32,
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            budget: default_retry_budget(),
            upstream_timeout_secs: default_upstream_timeout_secs(),
        }
    }
}

fn default_upstream_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CircuitBreakerFileConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    #[serde(default = "default_open_timeout_secs")]
    pub open_timeout_secs: u64,
    #[serde(default = "default_half_open_max_requests")]
    pub half_open_max_requests: usize,
}

impl Default for CircuitBreakerFileConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            open_timeout_secs: default_open_timeout_secs(),
            half_open_max_requests: default_half_open_max_requests(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}
fn default_success_threshold() -> u32 {
    3
}
fn default_open_timeout_secs() -> u64 {
    30
}
fn default_half_open_max_requests() -> usize {
    1
}

impl From<&CircuitBreakerFileConfig> for crate::circuit_breaker::BreakerConfig {
    fn from(cfg: &CircuitBreakerFileConfig) -> Self {
        Self {
            failure_threshold: cfg.failure_threshold,
            success_threshold: cfg.success_threshold,
            open_timeout: Duration::from_secs(cfg.open_timeout_secs),
            half_open_max_requests: cfg.half_open_max_requests,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rpm")]
    pub default_rpm: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { default_rpm: default_rpm() }
    }
}

fn default_rpm() -> u32 {
    100
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct A2AConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_agent_name")]
    pub agent_name: String,
}

impl Default for A2AConfig {
    fn default() -> Self {
        Self { enabled: true, agent_name: default_agent_name() }
    }
}

fn default_agent_name() -> String {
    "rad-gateway".to_string()
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub cert_path: Option<String>,
    #[serde(default)]
    pub key_path: Option<String>,
    /// When set, client certs must chain to this CA and pass the subject
    /// predicate below — mutual TLS for service-to-service deployments.
    #[serde(default)]
    pub client_ca_path: Option<String>,
    #[serde(default)]
    pub require_client_cert: bool,
    #[serde(default)]
    pub allowed_subjects: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_driver")]
    pub driver: String,
    #[serde(default = "default_db_dsn")]
    pub dsn: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { driver: default_db_driver(), dsn: default_db_dsn() }
    }
}

fn default_db_driver() -> String {
    "sqlite".to_string()
}
fn default_db_dsn() -> String {
    "gateway.db".to_string()
}

/// Connection info for an external key-value cache. Absent an address this
/// gateway falls back to the in-process `cache::InMemoryCache` — it never
/// speaks the Redis wire protocol itself, only reads this as a toggle.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RemoteCacheConfig {
    #[serde(default)]
    pub redis_addr: Option<String>,
    #[serde(default)]
    pub redis_password: Option<String>,
    #[serde(default)]
    pub redis_db: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub cedar_enabled: bool,
    #[serde(default)]
    pub cedar_policy_path: Option<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self { cedar_enabled: false, cedar_policy_path: None }
    }
}

/// Observability configuration (trace/usage ring buffers, body logging).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub body_logging: BodyLoggingConfig,
    #[serde(default = "default_usage_ring_capacity")]
    pub usage_ring_capacity: usize,
    #[serde(default = "default_trace_ring_capacity")]
    pub trace_ring_capacity: usize,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            body_logging: BodyLoggingConfig::default(),
            usage_ring_capacity: default_usage_ring_capacity(),
            trace_ring_capacity: default_trace_ring_capacity(),
        }
    }
}

fn default_usage_ring_capacity() -> usize {
    2000
}
fn default_trace_ring_capacity() -> usize {
    4000
}

/// Body logging configuration for request/response bodies.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BodyLoggingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
    #[serde(default = "default_simple_mode")]
    pub simple_mode: bool,
    #[serde(default)]
    pub redact_patterns: Vec<RedactPattern>,
}

impl Default for BodyLoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_body_size: default_max_body_size(),
            simple_mode: default_simple_mode(),
            redact_patterns: default_redact_patterns(),
        }
    }
}

fn default_max_body_size() -> usize {
    16 * 1024
}
fn default_simple_mode() -> bool {
    false
}

fn default_redact_patterns() -> Vec<RedactPattern> {
    vec![
        RedactPattern {
            pattern: r"sk-[a-zA-Z0-9]{48}".to_string(),
            replacement: "sk-***REDACTED***".to_string(),
        },
        RedactPattern {
            pattern: r"sk-ant-[a-zA-Z0-9-]{95}".to_string(),
            replacement: "sk-ant-***REDACTED***".to_string(),
        },
        RedactPattern {
            pattern: r"Bearer [a-zA-Z0-9._-]+".to_string(),
            replacement: "Bearer ***REDACTED***".to_string(),
        },
    ]
}

/// Pattern for redacting sensitive data in logs, consumed by
/// `logging::redact_sensitive_data`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedactPattern {
    pub pattern: String,
    pub replacement: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_metrics_endpoint")]
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true, endpoint: default_metrics_endpoint() }
    }
}

fn default_metrics_endpoint() -> String {
    "/metrics".to_string()
}

/// Load configuration from `config.toml` (if present) layered with
/// environment variables under the `RAD_` prefix, plus the bare
/// provider-credential variables the gateway shares with other tooling.
pub fn load_config() -> anyhow::Result<Config> {
    let mut builder = config::Config::builder()
        .add_source(config::File::with_name("config").required(false))
        .add_source(
            config::Environment::with_prefix("RAD")
                .separator("__")
                .try_parsing(true),
        );

    builder = apply_bare_env_overrides(builder)?;

    let cfg: Config = builder.build()?.try_deserialize()?;
    validate_config(&cfg)?;
    Ok(cfg)
}

fn apply_bare_env_overrides(
    mut builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> anyhow::Result<config::ConfigBuilder<config::builder::DefaultState>> {
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        builder = builder.set_override("providers.openai[0].api_key", key)?;
        builder = builder.set_override("providers.openai[0].name", "openai-default")?;
        builder = builder.set_override("providers.openai[0].base_url", "https://api.openai.com/v1")?;
    }
    if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
        builder = builder.set_override("providers.anthropic[0].api_key", key)?;
        builder = builder.set_override("providers.anthropic[0].name", "anthropic-default")?;
    }
    if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        builder = builder.set_override("providers.gemini[0].api_key", key)?;
        builder = builder.set_override("providers.gemini[0].name", "gemini-default")?;
        builder = builder.set_override(
            "providers.gemini[0].base_url",
            "https://generativelanguage.googleapis.com/v1beta",
        )?;
    }
    if std::env::var("OLLAMA_ENABLED").map(|v| v == "true" || v == "1").unwrap_or(false) {
        let base_url = std::env::var("OLLAMA_BASE_URL").unwrap_or_else(|_| "http://localhost:11434/v1".to_string());
        builder = builder.set_override("providers.ollama[0].name", "ollama-default")?;
        builder = builder.set_override("providers.ollama[0].base_url", base_url)?;
        builder = builder.set_override("providers.ollama[0].api_key", "ollama")?;
    }
    if let Ok(keys) = std::env::var("RAD_API_KEYS") {
        for (i, pair) in keys.split(',').enumerate() {
            if let Some((name, secret)) = pair.split_once(':') {
                builder = builder.set_override(format!("api_keys[{i}].name"), name.trim())?;
                builder = builder.set_override(format!("api_keys[{i}].secret"), secret.trim())?;
            }
        }
    }
    Ok(builder)
}

fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    let has_enabled_provider = cfg.providers.openai.iter().any(|p| p.enabled)
        || cfg.providers.anthropic.iter().any(|p| p.enabled)
        || cfg.providers.gemini.iter().any(|p| p.enabled)
        || cfg.providers.ollama.iter().any(|p| p.enabled)
        || cfg.providers.mock.iter().any(|p| p.enabled);

    if !has_enabled_provider {
        anyhow::bail!("config_invalid: at least one provider instance must be enabled");
    }

    if cfg.api_keys.is_empty() {
        anyhow::bail!("config_invalid: no API keys configured (set RAD_API_KEYS or [[api_keys]])");
    }

    let mut seen_keys = std::collections::HashSet::new();
    for key in &cfg.api_keys {
        if key.name.is_empty() {
            anyhow::bail!("config_invalid: API key name cannot be empty");
        }
        if !seen_keys.insert(&key.name) {
            anyhow::bail!("config_invalid: duplicate API key name '{}'", key.name);
        }
    }

    validate_unique_names(&cfg.providers.openai, "OpenAI")?;
    validate_unique_names(&cfg.providers.anthropic, "Anthropic")?;
    validate_unique_names(&cfg.providers.gemini, "Gemini")?;
    validate_unique_names(&cfg.providers.ollama, "Ollama")?;
    validate_unique_names(&cfg.providers.mock, "Mock")?;

    for (model, candidates) in &cfg.routing.candidates {
        if candidates.is_empty() {
            anyhow::bail!("config_invalid: routing entry for '{model}' has no candidates");
        }
    }

    Ok(())
}

trait InstanceName {
    fn get_name(&self) -> &str;
}

impl InstanceName for GenericProviderInstanceConfig {
    fn get_name(&self) -> &str {
        &self.name
    }
}
impl InstanceName for AnthropicInstanceConfig {
    fn get_name(&self) -> &str {
        &self.name
    }
}
impl InstanceName for MockInstanceConfig {
    fn get_name(&self) -> &str {
        &self.name
    }
}

fn validate_unique_names<T: InstanceName>(instances: &[T], provider_label: &str) -> anyhow::Result<()> {
    let mut names = std::collections::HashSet::new();
    for instance in instances {
        let name = instance.get_name();
        if name.is_empty() {
            anyhow::bail!("{provider_label} instance name cannot be empty");
        }
        if !names.insert(name) {
            anyhow::bail!("{provider_label} instance name '{name}' is duplicated");
        }
    }
    Ok(())
}
