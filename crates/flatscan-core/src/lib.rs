// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Flatscan — Core types, configuration and error definitions shared by the
// document pipeline and its collaborators.

pub mod config;
pub mod error;
pub mod guidance;
pub mod types;

pub use config::PipelineConfig;
pub use error::FlatscanError;
pub use types::*;
