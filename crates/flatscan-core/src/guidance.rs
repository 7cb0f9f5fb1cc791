// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plain-language guidance for the person holding the camera.
//
// Every failed quality check and every user-visible error is mapped to a
// short message and a concrete suggestion. Severity drives whether the
// collaborator layer should prompt for a re-capture.

use serde::{Deserialize, Serialize};

use crate::error::FlatscanError;
use crate::types::QualityIssue;

/// How the caller should react to a piece of guidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Output is still usable; mention it at most.
    Advisory,
    /// Output will likely be poor; offer a re-capture.
    RetakeRecommended,
    /// No output was produced.
    Fatal,
}

/// A human-readable message with an actionable suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanGuidance {
    /// Plain summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    /// Whether taking another photo is likely to help.
    pub retake: bool,
    pub severity: Severity,
}

/// Guidance for a single failed quality check.
pub fn humanize_issue(issue: QualityIssue) -> HumanGuidance {
    match issue {
        QualityIssue::Blurry => HumanGuidance {
            message: "The photo is blurry.".into(),
            suggestion: "Hold the camera steady or rest your elbows on the table, then take the photo again.".into(),
            retake: true,
            severity: Severity::RetakeRecommended,
        },
        QualityIssue::OutOfFocus => HumanGuidance {
            message: "The text is not in focus.".into(),
            suggestion: "Tap the page on screen to focus, and keep the camera at least a hand's width away.".into(),
            retake: true,
            severity: Severity::RetakeRecommended,
        },
        QualityIssue::TooDark => HumanGuidance {
            message: "The photo is too dark.".into(),
            suggestion: "Move to a brighter spot or turn on a light, and avoid standing between the lamp and the page.".into(),
            retake: true,
            severity: Severity::RetakeRecommended,
        },
        QualityIssue::TooBright => HumanGuidance {
            message: "The photo is too bright.".into(),
            suggestion: "Move the page out of direct sunlight and turn off the camera flash.".into(),
            retake: true,
            severity: Severity::RetakeRecommended,
        },
        QualityIssue::LowResolution => HumanGuidance {
            message: "The photo is too small to read reliably.".into(),
            suggestion: "Use the main camera at full resolution instead of a screenshot or thumbnail.".into(),
            retake: true,
            severity: Severity::RetakeRecommended,
        },
        QualityIssue::DocumentNotFound => HumanGuidance {
            message: "We couldn't find the edges of the page.".into(),
            suggestion: "Place the page on a darker surface so all four corners are visible in the photo.".into(),
            retake: false,
            severity: Severity::Advisory,
        },
    }
}

/// Convert a `FlatscanError` into guidance a non-technical user can act on.
pub fn humanize_error(err: &FlatscanError) -> HumanGuidance {
    match err {
        FlatscanError::Decode(_) => HumanGuidance {
            message: "We couldn't open that picture.".into(),
            suggestion: "Make sure the file is a photo (JPEG or PNG) and that it finished uploading, then try again.".into(),
            retake: true,
            severity: Severity::Fatal,
        },
        FlatscanError::EmptyFrame => HumanGuidance {
            message: "The picture is empty.".into(),
            suggestion: "Take the photo again; the camera returned no image.".into(),
            retake: true,
            severity: Severity::Fatal,
        },
        FlatscanError::DegenerateQuadrilateral(_) | FlatscanError::SingularHomography => {
            HumanGuidance {
                message: "We couldn't straighten the page.".into(),
                suggestion: "Take the photo from directly above the page so it isn't tilted steeply.".into(),
                retake: true,
                severity: Severity::Advisory,
            }
        }
        FlatscanError::Encode(_) | FlatscanError::Serialization(_) => {
            HumanGuidance {
                message: "Something went wrong while saving the result.".into(),
                suggestion: "Try again. If it keeps happening, free up some storage space.".into(),
                retake: false,
                severity: Severity::Fatal,
            }
        }
        FlatscanError::InvalidConfig(_) => HumanGuidance {
            message: "The scanner settings are not valid.".into(),
            suggestion: "Reset the scan settings to their defaults.".into(),
            retake: false,
            severity: Severity::Fatal,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_failure_is_fatal() {
        let g = humanize_error(&FlatscanError::Decode("truncated".into()));
        assert_eq!(g.severity, Severity::Fatal);
        assert!(g.retake);
    }

    #[test]
    fn missing_outline_is_only_advisory() {
        let g = humanize_issue(QualityIssue::DocumentNotFound);
        assert_eq!(g.severity, Severity::Advisory);
        assert!(!g.retake);
    }

    #[test]
    fn every_gating_issue_recommends_retake() {
        for issue in [
            QualityIssue::Blurry,
            QualityIssue::OutOfFocus,
            QualityIssue::TooDark,
            QualityIssue::TooBright,
            QualityIssue::LowResolution,
        ] {
            let g = humanize_issue(issue);
            assert!(g.retake, "{issue} should suggest a retake");
            assert!(!g.suggestion.is_empty());
        }
    }
}
