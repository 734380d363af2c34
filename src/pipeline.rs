//! Pipeline Orchestrator
//!
//! Walks the snapshot in input order. For each entity: detect changes, run the
//! stages that are needed, merge whatever succeeded into the record, and
//! checkpoint the whole store before moving on. A failed stage never clears
//! content that was already stored; a failed store write ends the run.

use crate::detect::{detect_changes, ChangeReason};
use crate::error::ApiError;
use crate::input::Snapshot;
use crate::render::ContentRenderer;
use crate::stage::{
    FailureKind, FetchStage, GenerationRequest, GenerationStage, StageFailure, StageKind,
    StageOutcome,
};
use crate::store::RecordStore;
use crate::types::{EntityKey, Observation, Record};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::{debug, error, info, warn};

/// What happened to one entity on this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityOutcome {
    New,
    Updated,
    Skipped,
    Failed,
}

impl EntityOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityOutcome::New => "new",
            EntityOutcome::Updated => "updated",
            EntityOutcome::Skipped => "skipped",
            EntityOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for EntityOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityReport {
    pub key: EntityKey,
    pub outcome: EntityOutcome,
    pub reasons: Vec<ChangeReason>,
    pub failures: Vec<StageFailure>,
    /// Whether the record was written and checkpointed.
    pub persisted: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub new: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Structured summary of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub entities: Vec<EntityReport>,
}

impl RunReport {
    pub fn counts(&self) -> RunCounts {
        let mut counts = RunCounts::default();
        for entity in &self.entities {
            match entity.outcome {
                EntityOutcome::New => counts.new += 1,
                EntityOutcome::Updated => counts.updated += 1,
                EntityOutcome::Skipped => counts.skipped += 1,
                EntityOutcome::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn entity(&self, key: &EntityKey) -> Option<&EntityReport> {
        self.entities.iter().find(|e| &e.key == key)
    }

    pub fn has_failures(&self) -> bool {
        self.entities.iter().any(|e| e.outcome == EntityOutcome::Failed)
    }
}

/// Result of the render pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RenderReport {
    pub rendered: Vec<EntityKey>,
    /// No generated content stored yet.
    pub skipped: Vec<EntityKey>,
    pub failed: Vec<(EntityKey, String)>,
}

/// Owns the record store for the duration of a run.
pub struct Pipeline {
    store: RecordStore,
    fetch: FetchStage,
    generate: GenerationStage,
}

impl Pipeline {
    pub fn new(store: RecordStore, fetch: FetchStage, generate: GenerationStage) -> Self {
        Self {
            store,
            fetch,
            generate,
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn into_store(self) -> RecordStore {
        self.store
    }

    /// Process every entity in `snapshot`, in order.
    ///
    /// Per-entity stage failures are recorded in the report; only store errors
    /// are returned as `Err`.
    pub async fn run(&mut self, snapshot: &Snapshot) -> Result<RunReport, ApiError> {
        let started_at = Utc::now();
        info!(entities = snapshot.len(), "Pipeline run started");

        let mut entities = Vec::with_capacity(snapshot.len());
        for observation in &snapshot.observations {
            let shared_context = snapshot
                .context_key
                .as_ref()
                .filter(|key| *key != &observation.key)
                .and_then(|key| self.store.get(key))
                .map(Record::context_text)
                .filter(|text| !text.is_empty());
            entities.push(self.process(observation, shared_context).await?);
        }

        let report = RunReport {
            started_at,
            finished_at: Utc::now(),
            entities,
        };
        let counts = report.counts();
        info!(
            new = counts.new,
            updated = counts.updated,
            skipped = counts.skipped,
            failed = counts.failed,
            "Pipeline run finished"
        );
        Ok(report)
    }

    async fn process(
        &mut self,
        observation: &Observation,
        shared_context: Option<String>,
    ) -> Result<EntityReport, ApiError> {
        let key = &observation.key;
        let prior = self.store.get(key).cloned();
        let changes = detect_changes(observation, prior.as_ref());

        if changes.is_clean() {
            debug!(key = %key, "Unchanged, skipping");
            return Ok(EntityReport {
                key: key.clone(),
                outcome: EntityOutcome::Skipped,
                reasons: Vec::new(),
                failures: Vec::new(),
                persisted: false,
            });
        }

        let reasons: Vec<&str> = changes.reasons.iter().map(ChangeReason::as_str).collect();
        debug!(
            key = %key,
            needs_fetch = changes.flags.needs_fetch,
            needs_generate = changes.flags.needs_generate,
            reasons = ?reasons,
            "Changes detected"
        );

        let now = Utc::now();
        let mut record = prior.clone().unwrap_or_else(|| Record::new(key.clone(), now));
        record.apply_observation(observation);
        let mut failures = Vec::new();
        let mut fetched_new = false;

        if changes.flags.needs_fetch {
            if let Some(url) = observation.fetch_url() {
                match self.fetch.run(key, url).await {
                    StageOutcome::Produced(content) => {
                        fetched_new = record.fetched_content.as_ref() != Some(&content);
                        record.fetched_content = Some(content);
                    }
                    StageOutcome::Failed { kind, reason } => {
                        failures.push(stage_failure(key, StageKind::Fetch, kind, reason));
                    }
                }
            }
        }

        if changes.flags.needs_generate || fetched_new {
            let request = GenerationRequest {
                key: key.clone(),
                source_text: record.source_text.clone(),
                fetched_content: record.fetched_content.clone(),
                shared_context,
            };
            match self.generate.run(&request).await {
                StageOutcome::Produced(content) => record.generated_content = Some(content),
                StageOutcome::Failed { kind, reason } => {
                    failures.push(stage_failure(key, StageKind::Generate, kind, reason));
                }
            }
        }

        // Inputs are committed only once every stage they invalidated succeeded.
        if !failures.is_empty() {
            if let Some(prior) = &prior {
                record.restore_inputs(prior);
            }
        }

        let persisted = match &prior {
            Some(prior) => !prior.same_content(&record),
            None => true,
        };
        if persisted {
            record.last_updated = match &prior {
                Some(prior) => now.max(prior.last_updated),
                None => now,
            };
            self.store.put(record);
            self.store.save()?;
            debug!(key = %key, "Checkpoint written");
        }

        let outcome = if !failures.is_empty() {
            EntityOutcome::Failed
        } else if prior.is_none() {
            EntityOutcome::New
        } else if persisted {
            EntityOutcome::Updated
        } else {
            EntityOutcome::Skipped
        };
        match outcome {
            EntityOutcome::New | EntityOutcome::Updated => {
                info!(key = %key, outcome = %outcome, "Entity synced")
            }
            EntityOutcome::Failed => {
                warn!(key = %key, failures = failures.len(), persisted, "Entity sync incomplete")
            }
            EntityOutcome::Skipped => debug!(key = %key, "Nothing new after stages"),
        }

        Ok(EntityReport {
            key: key.clone(),
            outcome,
            reasons: changes.reasons,
            failures,
            persisted,
        })
    }
}

fn stage_failure(key: &EntityKey, stage: StageKind, kind: FailureKind, reason: String) -> StageFailure {
    match kind {
        FailureKind::Fatal => error!(key = %key, stage = %stage, reason = %reason, "Stage failed"),
        FailureKind::Exhausted => {
            warn!(key = %key, stage = %stage, reason = %reason, "Stage gave up after retries")
        }
    }
    StageFailure {
        stage,
        kind,
        reason,
    }
}

/// Hand stored generated content to `renderer`, one entity at a time.
///
/// Reads only the store, so it can be re-run without any fetch or generation.
/// With `keys` empty every stored record is rendered.
pub fn render_pass(
    store: &RecordStore,
    keys: &[EntityKey],
    renderer: &dyn ContentRenderer,
) -> RenderReport {
    let selected: Vec<&EntityKey> = if keys.is_empty() {
        store.iter().map(|(key, _)| key).collect()
    } else {
        keys.iter().collect()
    };

    let mut report = RenderReport::default();
    for key in selected {
        let content = store
            .get(key)
            .filter(|record| record.has_generated_content())
            .and_then(|record| record.generated_content.as_deref());
        let Some(content) = content else {
            debug!(key = %key, "No generated content to render");
            report.skipped.push(key.clone());
            continue;
        };
        match renderer.render(key, content) {
            Ok(()) => {
                debug!(key = %key, "Rendered");
                report.rendered.push(key.clone());
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Render failed");
                report.failed.push((key.clone(), e.to_string()));
            }
        }
    }
    info!(
        rendered = report.rendered.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "Render pass finished"
    );
    report
}
