//! Accumulates non-fatal observations made while translating one wire format
//! into another, surfaced to clients as an `x-conversion-warnings` response
//! header (JSON-encoded) rather than failing the request outright.

use serde::Serialize;

#[derive(Debug, Clone, Serialize, Default)]
pub struct ConversionWarnings {
    warnings: Vec<String>,
}

impl ConversionWarnings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_unsupported_param(&mut self, param: &str, target_provider: &str) {
        self.warnings.push(format!(
            "parameter '{param}' is not supported by {target_provider} and was ignored"
        ));
    }

    pub fn add_warning(&mut self, message: String) {
        self.warnings.push(message);
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.warnings
    }

    pub fn to_header_value(&self) -> Option<String> {
        if self.warnings.is_empty() {
            None
        } else {
            serde_json::to_string(&self.warnings).ok()
        }
    }
}
