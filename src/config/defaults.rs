// Copyright 2026 The Coachstream Project
// SPDX-License-Identifier: Apache-2.0

use crate::stream::AugmentationRule;

use super::raw::RawAugmentationRule;

/// The default augmentation rule table, embedded at compile time.
/// English and Norwegian phrases.
const DEFAULT_AUGMENTATION_RULES_YAML: &str =
    include_str!("../../schema/default_augmentation_rules.yaml");

#[derive(serde::Deserialize)]
struct DefaultRulesYaml {
    augmentation_rules: Vec<RawAugmentationRule>,
}

/// Parse the embedded default rules.
/// Panics on invalid YAML (this is our own table).
pub fn default_augmentation_rules() -> Vec<AugmentationRule> {
    let raw: DefaultRulesYaml = serde_yaml::from_str(DEFAULT_AUGMENTATION_RULES_YAML)
        .expect("default augmentation rules YAML is invalid");

    raw.augmentation_rules
        .into_iter()
        .map(|rule| AugmentationRule::new(rule.category, rule.clauses))
        .collect()
}
