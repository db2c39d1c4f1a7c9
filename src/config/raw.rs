// Copyright 2026 The Coachstream Project
// SPDX-License-Identifier: Apache-2.0

// Raw YAML deserialization types (internal)
//
// Everything is optional here; defaults, interpolation and validation are
// applied while building the typed `Config`.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RawConfig {
    pub coachstream: String,
    pub parser: Option<RawParserConfig>,
    pub augmentation: Option<RawAugmentationConfig>,
    pub enrichment: Option<RawEnrichmentConfig>,
    pub upstream: Option<RawUpstreamConfig>,
}

#[derive(Debug, Deserialize)]
pub struct RawParserConfig {
    pub locale: Option<String>,
    pub block_policy: Option<String>,
    pub eager_follow_ups: Option<bool>,
    pub fallback: Option<RawFallback>,
}

#[derive(Debug, Deserialize)]
pub struct RawFallback {
    pub text: Option<String>,
    pub mode: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawAugmentationConfig {
    /// If false, skip the embedded default rule table. Default: true.
    #[serde(default = "default_true")]
    pub use_default_rules: bool,
    #[serde(default)]
    pub rules: Vec<RawAugmentationRule>,
}

#[derive(Debug, Deserialize)]
pub struct RawAugmentationRule {
    pub category: String,
    #[serde(rename = "match")]
    pub clauses: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct RawEnrichmentConfig {
    #[serde(default)]
    pub enabled: bool,
    pub base_url: Option<String>,
    pub result_limit: Option<usize>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RawUpstreamConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub timeout_ms: Option<u64>,
    pub system_prompt: Option<String>,
}

fn default_true() -> bool {
    true
}
