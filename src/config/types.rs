// Copyright 2026 The Coachstream Project
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use crate::stream::{
    AugmentationRule, ParserOptions, DEFAULT_ENRICHMENT_RESULT_LIMIT, DEFAULT_ENRICHMENT_TIMEOUT_MS,
};

/// Default OpenAI-compatible endpoint base.
pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://api.openai.com";
/// Default generation model.
pub const DEFAULT_UPSTREAM_MODEL: &str = "gpt-4.1";
/// Default bound on one whole generation request, stream included.
pub const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 60_000;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Parsed and validated coachstream config.
#[derive(Debug, Clone)]
pub struct Config {
    /// Config format version. Always "v1".
    pub version: String,
    pub parser: ParserOptions,
    /// Ordered augmentation rules: embedded defaults first, then user rules.
    pub augmentation_rules: Vec<AugmentationRule>,
    pub enrichment: EnrichmentConfig,
    pub upstream: UpstreamConfig,
    /// SHA256 of the raw YAML: "sha256:{hex}".
    pub config_hash: String,
}

// ---------------------------------------------------------------------------
// Typed sections
// ---------------------------------------------------------------------------

/// Exercise search side-channel.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentConfig {
    pub enabled: bool,
    /// Required when `enabled`.
    pub base_url: Option<String>,
    /// Results kept per lookup. At least 1.
    pub result_limit: usize,
    pub timeout_ms: u64,
}

impl EnrichmentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: None,
            result_limit: DEFAULT_ENRICHMENT_RESULT_LIMIT,
            timeout_ms: DEFAULT_ENRICHMENT_TIMEOUT_MS,
        }
    }
}

/// The generation service.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamConfig {
    pub base_url: String,
    /// Sent as a bearer token when present.
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_ms: u64,
    /// Prepended to every conversation as a system message.
    pub system_prompt: Option<String>,
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_UPSTREAM_MODEL.to_string(),
            timeout_ms: DEFAULT_UPSTREAM_TIMEOUT_MS,
            system_prompt: None,
        }
    }
}
