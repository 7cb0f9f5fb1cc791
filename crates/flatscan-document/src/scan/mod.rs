// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanning stages — quality assessment, page outline detection, perspective
// rectification, shadow removal and final rendering.

pub mod boundary;
pub mod enhance;
pub(crate) mod filters;
pub mod illumination;
pub(crate) mod morphology;
pub mod quality;
pub mod rectify;

pub use boundary::BoundaryDetector;
pub use enhance::DocumentEnhancer;
pub use illumination::IlluminationNormalizer;
pub use quality::QualityGate;
pub use rectify::PerspectiveRectifier;
