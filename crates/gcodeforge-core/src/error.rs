//! Error handling for the GCodeForge core
//!
//! Covers two layers:
//! - Document errors (structural link validation)
//! - Velocity errors (acceleration profile construction and solving)
//!
//! Contract violations on the document (stale handles, splicing a line into
//! a section it does not belong to) are programming errors and panic instead.

use thiserror::Error;

/// Document structure error type
///
/// Reported by [`crate::document::GcodeFile::validate_links`] when the
/// line chain and the section bookkeeping disagree.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentError {
    /// A line's owning section does not match the section it was found in
    #[error("Line {line} is owned by section {owner} but was reached from section {found}")]
    OwnerMismatch {
        /// Debug rendering of the line handle.
        line: String,
        /// Debug rendering of the recorded owner.
        owner: String,
        /// Debug rendering of the section being walked.
        found: String,
    },

    /// Walking a section from first to last never reached the last line
    #[error("Section {section} of type '{kind}' is not contiguous")]
    BrokenSection {
        /// Debug rendering of the section handle.
        section: String,
        /// Section type tag.
        kind: String,
    },

    /// A prev/next pair is not mutually consistent
    #[error("Broken link around line {line}: {reason}")]
    BrokenLink {
        /// Debug rendering of the line handle.
        line: String,
        /// What was inconsistent.
        reason: String,
    },

    /// The whole-file walk did not visit every stored line exactly once
    #[error("Line walk visited {visited} lines but {stored} are stored")]
    LineCountMismatch {
        /// Lines reached by walking the chain.
        visited: usize,
        /// Lines held by the arena.
        stored: usize,
    },
}

/// Velocity shaping error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VelocityError {
    /// Requested velocity change was zero or negative
    #[error("Velocity delta must be positive, got {delta}")]
    NonPositiveDelta {
        /// The delta that was requested.
        delta: f64,
    },

    /// Acceleration profile parameter is out of range
    #[error("Invalid acceleration profile parameter '{name}': {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

impl VelocityError {
    /// Create an invalid parameter error
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_velocity_error_display() {
        let err = VelocityError::NonPositiveDelta { delta: -2.5 };
        assert_eq!(err.to_string(), "Velocity delta must be positive, got -2.5");

        let err = VelocityError::invalid("dt", "must be > 0");
        assert_eq!(
            err.to_string(),
            "Invalid acceleration profile parameter 'dt': must be > 0"
        );
    }

    #[test]
    fn test_document_error_display() {
        let err = DocumentError::LineCountMismatch {
            visited: 3,
            stored: 4,
        };
        assert_eq!(
            err.to_string(),
            "Line walk visited 3 lines but 4 are stored"
        );
    }
}
