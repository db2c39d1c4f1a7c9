// Copyright 2026 The Coachstream Project
// SPDX-License-Identifier: Apache-2.0

use sha2::{Digest, Sha256};

use crate::stream::{AugmentationRule, BlockPolicy, FollowUpOption, ParserOptions, Phrase};

use super::defaults::default_augmentation_rules;
use super::error::ConfigError;
use super::interpolation::resolve_variables;
use super::raw;
use super::source::ConfigSource;
use super::types::*;

/// Load and validate a coachstream config from the given source.
///
/// Steps:
/// 1. Read raw YAML from source
/// 2. Compute SHA256 config hash
/// 3. Parse YAML into raw deserialization types
/// 4. Validate version and section values
/// 5. Resolve variable interpolation in URL and key fields
/// 6. Build the ordered augmentation rule table (defaults, then user rules)
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    let raw_yaml = source.load()?;
    let config_hash = compute_hash(&raw_yaml);

    let raw: raw::RawConfig = serde_yaml::from_str(&raw_yaml)?;

    if raw.coachstream != "v1" {
        return Err(ConfigError::Validation(format!(
            "unsupported config version \"{}\", expected \"v1\"",
            raw.coachstream
        )));
    }

    let parser = build_parser_options(raw.parser)?;
    let augmentation_rules = build_augmentation_rules(raw.augmentation)?;
    let enrichment = build_enrichment_config(raw.enrichment)?;
    let upstream = build_upstream_config(raw.upstream)?;

    Ok(Config {
        version: raw.coachstream,
        parser,
        augmentation_rules,
        enrichment,
        upstream,
        config_hash,
    })
}

pub fn compute_hash(raw_yaml: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_yaml.as_bytes());
    let hash = hasher.finalize();
    format!("sha256:{:x}", hash)
}

fn build_parser_options(raw: Option<raw::RawParserConfig>) -> Result<ParserOptions, ConfigError> {
    let mut options = ParserOptions::default();
    let Some(raw) = raw else {
        return Ok(options);
    };

    if let Some(locale) = raw.locale {
        if locale.trim().is_empty() {
            return Err(ConfigError::Validation("parser.locale must not be empty".into()));
        }
        options.locale = locale;
    }
    if let Some(policy) = raw.block_policy {
        options.block_policy = parse_block_policy(&policy)?;
    }
    if let Some(eager) = raw.eager_follow_ups {
        options.eager_follow_ups = eager;
    }
    if let Some(fallback) = raw.fallback {
        options.fallback = build_fallback(fallback)?;
    }
    Ok(options)
}

fn parse_block_policy(s: &str) -> Result<BlockPolicy, ConfigError> {
    match s {
        "first" => Ok(BlockPolicy::First),
        "every" => Ok(BlockPolicy::Every),
        other => Err(ConfigError::Validation(format!(
            "invalid parser.block_policy \"{other}\": expected \"first\" or \"every\""
        ))),
    }
}

fn build_fallback(raw: raw::RawFallback) -> Result<FollowUpOption, ConfigError> {
    let default = FollowUpOption::answer_in_chat();
    let option = FollowUpOption {
        text: raw.text.unwrap_or(default.text),
        mode: raw.mode.unwrap_or(default.mode),
        title: raw.title.or(default.title),
        generate: None,
        category: None,
    };
    if option.text.trim().is_empty() {
        return Err(ConfigError::Validation(
            "parser.fallback.text must not be empty".into(),
        ));
    }
    Ok(option)
}

fn build_augmentation_rules(
    raw: Option<raw::RawAugmentationConfig>,
) -> Result<Vec<AugmentationRule>, ConfigError> {
    let (use_defaults, user_rules) = match raw {
        Some(raw) => (raw.use_default_rules, raw.rules),
        None => (true, Vec::new()),
    };

    let mut rules = if use_defaults {
        default_augmentation_rules()
    } else {
        Vec::new()
    };

    for (i, rule) in user_rules.into_iter().enumerate() {
        if rule.category.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "augmentation.rules[{i}]: category must not be empty"
            )));
        }
        if rule.clauses.is_empty() {
            return Err(ConfigError::Validation(format!(
                "augmentation.rules[{i}] ({}): match must list at least one clause",
                rule.category
            )));
        }
        for clause in &rule.clauses {
            if clause.is_empty() || clause.iter().any(|p| Phrase::parse(p).text().is_empty()) {
                return Err(ConfigError::Validation(format!(
                    "augmentation.rules[{i}] ({}): clauses must be non-empty phrase lists",
                    rule.category
                )));
            }
        }
        rules.push(AugmentationRule::new(rule.category, rule.clauses));
    }

    Ok(rules)
}

fn build_enrichment_config(
    raw: Option<raw::RawEnrichmentConfig>,
) -> Result<EnrichmentConfig, ConfigError> {
    let mut config = EnrichmentConfig::default();
    let Some(raw) = raw else {
        return Ok(config);
    };

    config.enabled = raw.enabled;
    if let Some(limit) = raw.result_limit {
        if limit == 0 {
            return Err(ConfigError::Validation(
                "enrichment.result_limit must be at least 1".into(),
            ));
        }
        config.result_limit = limit;
    }
    if let Some(timeout_ms) = raw.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    config.base_url = raw
        .base_url
        .map(|url| resolve_variables(&url))
        .transpose()?
        .filter(|url| !url.trim().is_empty());

    if config.enabled && config.base_url.is_none() {
        return Err(ConfigError::Validation(
            "enrichment.base_url is required when enrichment is enabled".into(),
        ));
    }
    Ok(config)
}

fn build_upstream_config(raw: Option<raw::RawUpstreamConfig>) -> Result<UpstreamConfig, ConfigError> {
    let mut config = UpstreamConfig::default();
    let Some(raw) = raw else {
        return Ok(config);
    };

    if let Some(url) = raw.base_url {
        let url = resolve_variables(&url)?;
        if url.trim().is_empty() {
            return Err(ConfigError::Validation("upstream.base_url must not be empty".into()));
        }
        config.base_url = url;
    }
    config.api_key = raw
        .api_key
        .map(|key| resolve_variables(&key))
        .transpose()?
        .filter(|key| !key.is_empty());
    if let Some(model) = raw.model {
        config.model = model;
    }
    if let Some(timeout_ms) = raw.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    config.system_prompt = raw.system_prompt.filter(|p| !p.trim().is_empty());
    Ok(config)
}
