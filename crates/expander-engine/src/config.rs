use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-3-pro-image-preview";
pub const DEFAULT_IMAGE_SIZE: &str = "2K";
const DEFAULT_REQUEST_TIMEOUT_S: f64 = 90.0;
const MIN_REQUEST_TIMEOUT_S: f64 = 15.0;
const MAX_REQUEST_TIMEOUT_S: f64 = 300.0;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub api_base: String,
    pub model: String,
    pub image_size: String,
    pub request_timeout_s: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            image_size: DEFAULT_IMAGE_SIZE.to_string(),
            request_timeout_s: DEFAULT_REQUEST_TIMEOUT_S,
        }
    }
}

impl EngineConfig {
    /// Defaults, then the optional JSON file, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };
        Ok(base.with_overrides(non_empty_env))
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed reading config {}", path.display()))?;
        let parsed: Self = serde_json::from_str(&raw)
            .with_context(|| format!("invalid config JSON in {}", path.display()))?;
        Ok(parsed.normalized())
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(api_base) = lookup("GEMINI_API_BASE") {
            self.api_base = api_base;
        }
        if let Some(model) = lookup("EXPANDER_MODEL") {
            self.model = model;
        }
        if let Some(image_size) = lookup("EXPANDER_IMAGE_SIZE") {
            self.image_size = image_size;
        }
        if let Some(timeout) = lookup("EXPANDER_REQUEST_TIMEOUT").and_then(|raw| raw.trim().parse().ok()) {
            self.request_timeout_s = timeout;
        }
        self.normalized()
    }

    pub fn normalized(mut self) -> Self {
        self.api_base = self.api_base.trim().trim_end_matches('/').to_string();
        if self.api_base.is_empty() {
            self.api_base = DEFAULT_API_BASE.to_string();
        }
        self.model = self.model.trim().to_string();
        if self.model.is_empty() {
            self.model = DEFAULT_MODEL.to_string();
        }
        self.image_size = normalize_image_size(&self.image_size);
        self.request_timeout_s = if self.request_timeout_s.is_finite() {
            self.request_timeout_s
                .clamp(MIN_REQUEST_TIMEOUT_S, MAX_REQUEST_TIMEOUT_S)
        } else {
            DEFAULT_REQUEST_TIMEOUT_S
        };
        self
    }
}

/// Output resolution tier; anything unrecognised falls back to 2K.
pub fn normalize_image_size(raw: &str) -> String {
    let normalized = raw.trim().to_ascii_uppercase();
    if matches!(normalized.as_str(), "1K" | "2K" | "4K") {
        return normalized;
    }
    DEFAULT_IMAGE_SIZE.to_string()
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
