// Copyright 2026 The Coachstream Project
// SPDX-License-Identifier: Apache-2.0

// Follow-up augmentation and deduplication
//
// An augmenter marks follow-ups that ask for a generated program. Rules are
// ordered; the first rule with a matching clause wins. A clause matches when
// every one of its phrases occurs in the option text, case-insensitively.
// Phrases match anywhere, so Norwegian compounds ("styrkeprogram") are caught;
// a phrase written with a leading `^` only matches at the start of a word.

use std::collections::HashSet;

use super::types::FollowUpOption;

/// Decides whether a follow-up expresses generation intent.
pub trait OptionAugmenter: Send + Sync {
    /// The program category requested by `text`, if any.
    fn detect_category(&self, text: &str) -> Option<&str>;

    /// Set `generate` and `category` when intent is detected. Options that
    /// already carry a `generate` flag are returned unchanged.
    fn augment(&self, mut option: FollowUpOption) -> FollowUpOption {
        if option.generate.is_some() {
            return option;
        }
        if let Some(category) = self.detect_category(&option.text) {
            option.generate = Some(true);
            option.category = Some(category.to_string());
        }
        option
    }
}

/// Prefix that anchors a phrase to the start of a word.
pub const WORD_START_MARKER: char = '^';

/// One lowercased phrase of a clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phrase {
    text: String,
    word_start: bool,
}

impl Phrase {
    /// Parse a configured phrase; a leading `^` anchors it to a word start.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.strip_prefix(WORD_START_MARKER) {
            Some(rest) => Self {
                text: rest.trim().to_lowercase(),
                word_start: true,
            },
            None => Self {
                text: trimmed.to_lowercase(),
                word_start: false,
            },
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_word_start(&self) -> bool {
        self.word_start
    }

    fn occurs_in(&self, lowered: &str) -> bool {
        if !self.word_start {
            return lowered.contains(&self.text);
        }
        lowered.match_indices(&self.text).any(|(at, _)| {
            lowered[..at]
                .chars()
                .next_back()
                .map_or(true, |c| !c.is_alphanumeric())
        })
    }
}

/// One category with its alternative phrase clauses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AugmentationRule {
    category: String,
    clauses: Vec<Vec<Phrase>>,
}

impl AugmentationRule {
    pub fn new(category: impl Into<String>, clauses: Vec<Vec<String>>) -> Self {
        Self {
            category: category.into(),
            clauses: clauses
                .iter()
                .map(|clause| clause.iter().map(|p| Phrase::parse(p)).collect())
                .collect(),
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn clauses(&self) -> &[Vec<Phrase>] {
        &self.clauses
    }

    fn matches(&self, lowered: &str) -> bool {
        self.clauses
            .iter()
            .any(|clause| clause.iter().all(|phrase| phrase.occurs_in(lowered)))
    }
}

/// Ordered phrase-rule augmenter.
#[derive(Debug, Clone, Default)]
pub struct RuleAugmenter {
    rules: Vec<AugmentationRule>,
}

impl RuleAugmenter {
    pub fn new(rules: Vec<AugmentationRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[AugmentationRule] {
        &self.rules
    }
}

impl OptionAugmenter for RuleAugmenter {
    fn detect_category(&self, text: &str) -> Option<&str> {
        let lowered = text.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&lowered))
            .map(AugmentationRule::category)
    }
}

/// Follow-up texts already delivered in the current stream, in first-seen
/// order.
#[derive(Debug, Clone, Default)]
pub struct SeenKeys {
    order: Vec<String>,
    set: HashSet<String>,
}

impl SeenKeys {
    /// Record `text`; `false` if it was already present.
    pub fn insert(&mut self, text: &str) -> bool {
        if self.set.contains(text) {
            return false;
        }
        self.set.insert(text.to_string());
        self.order.push(text.to_string());
        true
    }

    pub fn contains(&self, text: &str) -> bool {
        self.set.contains(text)
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}
