// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// flatscan-document — Turns a phone photo of a paper page into a clean,
// flat, print-ready image.
//
// Provides the individual scanning stages (quality assessment, page outline
// detection, perspective rectification, shadow removal, enhancement) and the
// pipeline that chains them for one frame.

pub mod image;
pub mod pipeline;
pub mod scan;

// Re-export the primary structs so callers can use `flatscan_document::Pipeline` etc.
pub use crate::image::Frame;
pub use crate::pipeline::{Pipeline, PipelineOutput, RunOptions};
pub use crate::scan::{
    BoundaryDetector, DocumentEnhancer, IlluminationNormalizer, PerspectiveRectifier, QualityGate,
};
