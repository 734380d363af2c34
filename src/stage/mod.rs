//! Fetch and generation stages: thin adapters that drive an external
//! collaborator through the retry executor and reduce whatever happened to a
//! [`StageOutcome`] the orchestrator can merge safely.

pub mod fetch;
pub mod generate;

pub use fetch::{ContentFetcher, FetchStage, ModelUrlAnalyzer, UNABLE_TO_DETERMINE};
pub use generate::{ContentGenerator, GenerationRequest, GenerationStage, ModelPitchGenerator};

use crate::error::ApiError;
use crate::retry::{Exhaustion, RetryOutcome};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Fetch,
    Generate,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Fetch => "fetch",
            StageKind::Generate => "generate",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a stage failed. Both leave the prior record content in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Every attempt failed transiently or returned an unusable result.
    Exhausted,
    /// A non-retryable error ended the stage on the spot.
    Fatal,
}

/// Result of running one stage for one entity.
#[derive(Debug)]
pub enum StageOutcome<T> {
    Produced(T),
    Failed { kind: FailureKind, reason: String },
}

impl<T> StageOutcome<T> {
    /// Fold a retry result into a stage outcome. `describe_rejected` explains a
    /// value the stage refused to accept.
    pub(crate) fn from_retry(
        result: Result<RetryOutcome<T>, ApiError>,
        describe_rejected: impl Fn(&T) -> String,
    ) -> Self {
        match result {
            Ok(RetryOutcome::Succeeded { value, .. }) => StageOutcome::Produced(value),
            Ok(RetryOutcome::Exhausted { last, attempts }) => {
                let last = match last {
                    Exhaustion::Rejected(value) => describe_rejected(&value),
                    Exhaustion::Failed(err) => err.to_string(),
                };
                StageOutcome::Failed {
                    kind: FailureKind::Exhausted,
                    reason: format!("gave up after {} attempts: {}", attempts, last),
                }
            }
            Err(err) => StageOutcome::Failed {
                kind: FailureKind::Fatal,
                reason: err.to_string(),
            },
        }
    }
}

/// A stage failure as recorded in the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageFailure {
    pub stage: StageKind,
    pub kind: FailureKind,
    pub reason: String,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            FailureKind::Exhausted => "exhausted",
            FailureKind::Fatal => "fatal",
        };
        write!(f, "{} {}: {}", self.stage, kind, self.reason)
    }
}
