//! Batch orchestration over pairs x oracles.
//!
//! Oracles are swept one at a time; within a sweep pairs run in discovery
//! order. Each session's outputs land under `<result_root>/<oracle>/`:
//!
//! - `success/` or `failed/`: final revision (under the candidate's original
//!   file name) plus `<stem>.json` report
//! - `revisions/<pair>/`: every materialized revision
//! - `sessions/<pair>/`: session artifact and digest
//!
//! The cost table is rewritten after every sweep.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use oracle_gateway::Oracle;
use serde::{Deserialize, Serialize};
use sfc_model::ContainmentVerifier;
use tracing::warn;

use crate::artifact::write_session_artifact;
use crate::classify::{classify_as, Bucket, Classification};
use crate::config::{RepairPolicy, RunConfig};
use crate::error::{RepairError, Result};
use crate::ledger::CostLedger;
use crate::obs::{emit_artifact_write_failed, emit_batch_flushed};
use crate::prompt::PromptBuilder;
use crate::repair_loop::{RepairLoop, RepairSession, SessionOutcome};
use crate::report::ContainmentReport;

/// A reference model and the candidate to repair against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPair {
    /// Row key in the cost table; the reference model's file stem.
    pub id: String,
    pub reference: PathBuf,
    pub candidate: PathBuf,
}

impl ModelPair {
    pub fn new(reference: impl Into<PathBuf>, candidate: impl Into<PathBuf>) -> Self {
        let reference = reference.into();
        let id = reference
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "reference".to_string());
        Self {
            id,
            reference,
            candidate: candidate.into(),
        }
    }
}

/// What the runner was pointed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchInput {
    Pair { reference: PathBuf, candidate: PathBuf },
    Directories { reference_dir: PathBuf, candidate_dir: PathBuf },
}

impl BatchInput {
    /// Directories when `reference` is a directory, a single pair otherwise.
    pub fn from_paths(reference: &Path, candidate: &Path) -> Self {
        if reference.is_dir() {
            BatchInput::Directories {
                reference_dir: reference.to_path_buf(),
                candidate_dir: candidate.to_path_buf(),
            }
        } else {
            BatchInput::Pair {
                reference: reference.to_path_buf(),
                candidate: candidate.to_path_buf(),
            }
        }
    }
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(RepairError::io_at(dir))? {
        let entry = entry.map_err(RepairError::io_at(dir))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Resolve `input` into pairs. Directory entries are paired by position
/// after sorting by file name; surplus entries on either side are skipped.
pub fn discover_pairs(input: &BatchInput) -> Result<Vec<ModelPair>> {
    let raw = match input {
        BatchInput::Pair {
            reference,
            candidate,
        } => vec![ModelPair::new(reference, candidate)],
        BatchInput::Directories {
            reference_dir,
            candidate_dir,
        } => {
            let references = list_files(reference_dir)?;
            let candidates = list_files(candidate_dir)?;
            if references.len() != candidates.len() {
                warn!(
                    references = references.len(),
                    candidates = candidates.len(),
                    "reference and candidate directories differ in size; extra files are skipped"
                );
            }
            references
                .into_iter()
                .zip(candidates)
                .map(|(r, c)| ModelPair::new(r, c))
                .collect()
        }
    };

    let mut seen = HashSet::new();
    Ok(raw
        .into_iter()
        .enumerate()
        .map(|(i, mut pair)| {
            if !seen.insert(pair.id.clone()) {
                pair.id = format!("{}_{}", pair.id, i);
                seen.insert(pair.id.clone());
            }
            pair
        })
        .collect())
}

/// One finished session as the batch saw it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub pair: String,
    pub oracle: String,
    pub outcome: SessionOutcome,
    pub iterations: u32,
    pub tokens_used: u64,
    pub classification: Option<Classification>,
    pub artifact: Option<PathBuf>,
}

/// Every session in dispatch order plus the cost ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub sessions: Vec<SessionSummary>,
    pub ledger: CostLedger,
    pub cost_export: Option<PathBuf>,
}

impl BatchReport {
    pub fn contained_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|s| s.outcome.is_success())
            .count()
    }
}

pub struct BatchRunner<'a> {
    config: &'a RunConfig,
    verifier: &'a dyn ContainmentVerifier,
    prompts: PromptBuilder,
    policy: RepairPolicy,
}

impl<'a> BatchRunner<'a> {
    pub fn new(config: &'a RunConfig, verifier: &'a dyn ContainmentVerifier) -> Result<Self> {
        let prompts = PromptBuilder::from_optional_file(config.prompt_template.as_deref())?;
        Ok(Self {
            config,
            verifier,
            prompts,
            policy: config.policy()?,
        })
    }

    pub fn with_prompts(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    pub async fn run(&self, pairs: &[ModelPair], oracles: &[Box<dyn Oracle>]) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        let export = self.config.cost_export_path();

        for oracle in oracles {
            let oracle_dir = self.config.oracle_dir(oracle.name());
            for pair in pairs {
                let summary = self.run_pair(pair, oracle.as_ref(), &oracle_dir).await;
                report
                    .ledger
                    .record(&summary.pair, &summary.oracle, summary.tokens_used);
                report.sessions.push(summary);
            }

            // A failed export leaves the sessions intact; the next sweep retries.
            match report.ledger.write_csv(&export) {
                Ok(()) => {
                    emit_batch_flushed(oracle.name(), report.ledger.pairs().len(), &export);
                    report.cost_export = Some(export.clone());
                }
                Err(e) => {
                    emit_artifact_write_failed("cost_export", &export, &e);
                    report.cost_export = None;
                }
            }
        }
        Ok(report)
    }

    async fn run_pair(&self, pair: &ModelPair, oracle: &dyn Oracle, oracle_dir: &Path) -> SessionSummary {
        let session = RepairLoop::new(
            self.verifier,
            oracle,
            &self.prompts,
            self.policy,
            oracle_dir.join("revisions").join(&pair.id),
        )
        .with_debug_dir(self.config.debug_dir_for(oracle.name()))
        .run(pair)
        .await;

        let classification = self.classify_session(&session, oracle_dir);

        let sessions_dir = oracle_dir.join("sessions");
        let artifact = match write_session_artifact(&session, &sessions_dir) {
            Ok(path) => Some(path),
            Err(e) => {
                emit_artifact_write_failed("session", &sessions_dir, &e);
                None
            }
        };

        SessionSummary {
            pair: pair.id.clone(),
            oracle: oracle.name().to_string(),
            iterations: session.iterations(),
            tokens_used: session.tokens_used(),
            outcome: session.outcome,
            classification,
            artifact,
        }
    }

    fn classify_session(&self, session: &RepairSession, oracle_dir: &Path) -> Option<Classification> {
        let input = session.final_candidate.as_ref()?;
        let file_name = session
            .candidate
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())?;
        let report = ContainmentReport::from_session(session);
        match classify_as(
            Bucket::from_outcome(&session.outcome),
            &report,
            input,
            &file_name,
            oracle_dir,
        ) {
            Ok(c) => Some(c),
            Err(e) => {
                warn!(pair = %session.pair_id, error = %e, "failed to classify session output");
                None
            }
        }
    }
}
