// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Flatscan.

use thiserror::Error;

/// Top-level error type for all Flatscan operations.
///
/// Besides a failure to encode the result, only [`FlatscanError::Decode`] and
/// [`FlatscanError::EmptyFrame`] ever reach a pipeline caller; everything else
/// is absorbed by a stage fallback.
#[derive(Debug, Error)]
pub enum FlatscanError {
    // -- Input errors --
    #[error("failed to decode input image: {0}")]
    Decode(String),

    #[error("frame has zero area")]
    EmptyFrame,

    // -- Numerical errors --
    #[error("degenerate quadrilateral: {0}")]
    DegenerateQuadrilateral(String),

    #[error("homography is singular for the given corners")]
    SingularHomography,

    // -- Output --
    #[error("failed to encode output image: {0}")]
    Encode(String),

    // -- Configuration --
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // -- Reporting --
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
