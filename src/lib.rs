// Copyright 2026 The Coachstream Project
// SPDX-License-Identifier: Apache-2.0

pub mod config;
pub mod protocol;
pub mod server;
pub mod stream;
pub mod upstream;
