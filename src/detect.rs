//! Change Detection
//!
//! Compares what the input source reports for an entity against its cached record
//! and decides which stages must re-run. Pure: no I/O, no clock.
//!
//! A URL change invalidates both the fetched content and everything generated from
//! it; a text change invalidates only the generated content. Missing fetched or
//! generated content (typically left behind by a failed run) is always retried.

use crate::types::{Observation, Record};
use serde::Serialize;

/// Which stages an entity needs on this run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeFlags {
    pub needs_fetch: bool,
    pub needs_generate: bool,
    pub is_modified: bool,
}

impl ChangeFlags {
    /// No stage needs to run and nothing about the entity changed.
    pub fn is_clean(&self) -> bool {
        !self.needs_fetch && !self.needs_generate && !self.is_modified
    }

    fn merge(&mut self, other: ChangeFlags) {
        self.needs_fetch |= other.needs_fetch;
        self.needs_generate |= other.needs_generate;
        self.is_modified |= other.is_modified;
    }
}

/// Why a rule fired. Several reasons can apply to one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    NewEntity,
    UrlChanged,
    FetchedContentMissing,
    TextChanged,
    GeneratedContentMissing,
    StructuredContentChanged,
}

impl ChangeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeReason::NewEntity => "new_entity",
            ChangeReason::UrlChanged => "url_changed",
            ChangeReason::FetchedContentMissing => "fetched_content_missing",
            ChangeReason::TextChanged => "text_changed",
            ChangeReason::GeneratedContentMissing => "generated_content_missing",
            ChangeReason::StructuredContentChanged => "structured_content_changed",
        }
    }
}

impl std::fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Combined flags and the reasons behind them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub flags: ChangeFlags,
    pub reasons: Vec<ChangeReason>,
}

impl ChangeSet {
    pub fn is_clean(&self) -> bool {
        self.flags.is_clean()
    }

    fn fire(&mut self, reason: ChangeReason, flags: ChangeFlags) {
        self.flags.merge(flags);
        self.reasons.push(reason);
    }
}

/// Evaluate every change rule for one entity. All applicable rules fire and their
/// flags are OR-combined.
///
/// `needs_fetch` is only ever raised when the observation carries a URL: a fetch
/// without a reference cannot be attempted, so it is skipped rather than failed.
pub fn detect_changes(observation: &Observation, cached: Option<&Record>) -> ChangeSet {
    let mut changes = ChangeSet::default();
    let can_fetch = observation.fetch_url().is_some();

    let Some(cached) = cached else {
        changes.fire(
            ChangeReason::NewEntity,
            ChangeFlags {
                needs_fetch: can_fetch,
                needs_generate: true,
                is_modified: true,
            },
        );
        return changes;
    };

    if observation.source_url != cached.source_url {
        changes.fire(
            ChangeReason::UrlChanged,
            ChangeFlags {
                needs_fetch: can_fetch,
                needs_generate: true,
                is_modified: true,
            },
        );
    }

    if can_fetch && !cached.has_fetched_content() {
        changes.fire(
            ChangeReason::FetchedContentMissing,
            ChangeFlags {
                needs_fetch: true,
                ..ChangeFlags::default()
            },
        );
    }

    if observation.source_text != cached.source_text {
        changes.fire(
            ChangeReason::TextChanged,
            ChangeFlags {
                needs_generate: true,
                is_modified: true,
                ..ChangeFlags::default()
            },
        );
    }

    if !cached.has_generated_content() {
        changes.fire(
            ChangeReason::GeneratedContentMissing,
            ChangeFlags {
                needs_generate: true,
                is_modified: true,
                ..ChangeFlags::default()
            },
        );
    }

    // serde_json::Value compares by content, so key order inside objects is irrelevant.
    if observation.structured_content != cached.structured_content {
        changes.fire(
            ChangeReason::StructuredContentChanged,
            ChangeFlags {
                needs_fetch: can_fetch,
                needs_generate: true,
                is_modified: true,
            },
        );
    }

    changes
}
