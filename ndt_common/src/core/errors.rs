//! # Pipeline Errors
//!
//! Every failure the consumption pipeline can produce is one of these tags.
//! Callers dispatch on the tag: two of them end the process, the rest are
//! contained where they happen.

use thiserror::Error;

/// A tagged pipeline failure carrying its cause.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// No usable subscription could be resolved from Data Management.
    #[error("resolution error: {0}")]
    Resolution(String),
    /// A schema could not be fetched or parsed.
    #[error("schema error: {0}")]
    Schema(String),
    /// A payload did not decode against its schema.
    #[error("decode error: {0}")]
    Decode(String),
    /// The message bus failed beyond recovery.
    #[error("fatal transport error: {0}")]
    TransportFatal(String),
    /// The message bus reported a recoverable problem.
    #[error("transport error: {0}")]
    TransportNonFatal(String),
    /// A single item of a fan-out failed.
    #[error("per-item error: {0}")]
    PerItem(String),
}

impl PipelineError {
    /// Resolution and fatal transport failures terminate the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Resolution(_) | Self::TransportFatal(_))
    }

    /// Process exit code for this error when it reaches `main`.
    pub fn exit_code(&self) -> i32 {
        if self.is_fatal() {
            1
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_resolution_and_fatal_transport_terminate() {
        assert_eq!(PipelineError::Resolution("no job found".into()).exit_code(), 1);
        assert_eq!(PipelineError::TransportFatal("closed".into()).exit_code(), 1);

        for err in [
            PipelineError::Schema("404".into()),
            PipelineError::Decode("short read".into()),
            PipelineError::TransportNonFatal("broker down".into()),
            PipelineError::PerItem("cell".into()),
        ] {
            assert!(!err.is_fatal(), "{err} should be contained");
            assert_eq!(err.exit_code(), 0);
        }
    }

    #[test]
    fn display_carries_the_cause() {
        let err = PipelineError::Resolution("No data job found!".into());
        assert_eq!(err.to_string(), "resolution error: No data job found!");
    }
}
