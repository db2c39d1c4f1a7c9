// Copyright 2026 The Coachstream Project
// SPDX-License-Identifier: Apache-2.0

// Config loader and validator
//
// Loads coachstream.yaml, validates structure, resolves variable
// interpolation, merges the embedded augmentation rules, and computes a
// deterministic config hash.

pub mod defaults;
mod error;
mod interpolation;
mod loader;
mod raw;
mod source;
mod types;

pub use error::ConfigError;
pub use interpolation::resolve_variables;
pub use loader::{compute_hash, load_config};
pub use source::{ConfigSource, FileSource, StringSource};
pub use types::{
    Config, EnrichmentConfig, UpstreamConfig, DEFAULT_UPSTREAM_BASE_URL, DEFAULT_UPSTREAM_MODEL,
    DEFAULT_UPSTREAM_TIMEOUT_MS,
};
