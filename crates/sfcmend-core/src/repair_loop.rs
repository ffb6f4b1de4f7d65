//! Per-pair repair state machine.
//!
//! Each iteration is `verify -> prompt -> invoke -> extract -> validate ->
//! materialize`, then back to verify. The loop stops on containment, on the
//! first terminal failure, or when it would start verification pass
//! `max_attempts + 1`. Every failure inside an iteration is folded into the
//! session outcome; [`RepairLoop::run`] never returns an error.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use oracle_gateway::{Oracle, OracleError};
use serde::{Deserialize, Serialize};
use sfc_model::{load_model, ContainmentVerdict, ContainmentVerifier, ProcessModel};
use tracing::{debug, Instrument};

use crate::batch::ModelPair;
use crate::config::RepairPolicy;
use crate::error::{RepairError, Result};
use crate::extract::extract;
use crate::materialize::{assemble_candidate, materialize, revision_path};
use crate::obs::{
    emit_artifact_write_failed, emit_attempt, emit_session_finished, emit_session_started,
    session_span,
};
use crate::prompt::PromptBuilder;

/// Debug artifact holding the latest prompt, overwritten each iteration.
pub const DEBUG_PROMPT_FILE: &str = "last_prompt.txt";
/// Debug artifact holding the latest raw reply, overwritten each iteration.
pub const DEBUG_REPLY_FILE: &str = "last_reply.txt";

/// Why a session stopped without reaching containment or the budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// Verdict was negative but carried no unmatched path.
    NoCounterexample,
    Verification { message: String },
    Oracle { message: String },
    Extraction { message: String },
    InvalidCandidate { message: String },
    Materialize { message: String },
    /// Inputs could not be loaded or the working directory created.
    Setup { message: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NoCounterexample => {
                write!(f, "verifier reported no containment but no counterexample")
            }
            FailureReason::Verification { message } => write!(f, "verification failed: {message}"),
            FailureReason::Oracle { message } => write!(f, "oracle failed: {message}"),
            FailureReason::Extraction { message } => write!(f, "extraction failed: {message}"),
            FailureReason::InvalidCandidate { message } => write!(f, "invalid candidate: {message}"),
            FailureReason::Materialize { message } => write!(f, "materialize failed: {message}"),
            FailureReason::Setup { message } => write!(f, "session setup failed: {message}"),
        }
    }
}

/// Terminal state of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionOutcome {
    Contained,
    BudgetExhausted { attempts: u32 },
    Failed { reason: FailureReason },
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SessionOutcome::Contained)
    }

    /// Short status used in logs and summaries.
    pub fn status(&self) -> &'static str {
        match self {
            SessionOutcome::Contained => "contained",
            SessionOutcome::BudgetExhausted { .. } => "budget_exhausted",
            SessionOutcome::Failed { .. } => "failed",
        }
    }

    fn failed(reason: FailureReason) -> Self {
        SessionOutcome::Failed { reason }
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionOutcome::Contained => write!(f, "contained"),
            SessionOutcome::BudgetExhausted { attempts } => {
                write!(f, "budget exhausted after {attempts} attempt(s)")
            }
            SessionOutcome::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Result of one pipeline stage within an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Skipped,
    Succeeded,
    Failed { message: String },
}

/// Record of one iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairAttempt {
    pub iteration: u32,
    /// Revision verified in this iteration.
    pub verified: PathBuf,
    pub contained: bool,
    pub unmatched_paths: usize,
    pub prompt: Option<String>,
    pub reply: Option<String>,
    pub extraction: StageStatus,
    pub materialization: StageStatus,
    /// Revision written by this iteration, if any.
    pub revision: Option<PathBuf>,
    pub tokens_used: u64,
}

impl RepairAttempt {
    fn new(iteration: u32, verified: PathBuf) -> Self {
        Self {
            iteration,
            verified,
            contained: false,
            unmatched_paths: 0,
            prompt: None,
            reply: None,
            extraction: StageStatus::Skipped,
            materialization: StageStatus::Skipped,
            revision: None,
            tokens_used: 0,
        }
    }
}

/// One pair run against one oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairSession {
    pub session_id: String,
    pub pair_id: String,
    pub oracle: String,
    pub reference: PathBuf,
    pub candidate: PathBuf,
    pub max_attempts: u32,
    pub attempts: Vec<RepairAttempt>,
    pub outcome: SessionOutcome,
    /// Latest session-owned revision; `None` when setup failed.
    pub final_candidate: Option<PathBuf>,
    /// Verdict of the last verification pass.
    pub last_verdict: Option<ContainmentVerdict>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RepairSession {
    fn open(pair: &ModelPair, oracle: &str, max_attempts: u32) -> Self {
        let now = Utc::now();
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            pair_id: pair.id.clone(),
            oracle: oracle.to_string(),
            reference: pair.reference.clone(),
            candidate: pair.candidate.clone(),
            max_attempts,
            attempts: Vec::new(),
            outcome: SessionOutcome::failed(FailureReason::Setup {
                message: "session did not start".to_string(),
            }),
            final_candidate: None,
            last_verdict: None,
            started_at: now,
            finished_at: now,
        }
    }

    /// Verification passes performed.
    pub fn iterations(&self) -> u32 {
        self.attempts.len() as u32
    }

    /// Cumulative oracle cost, failed attempts included.
    pub fn tokens_used(&self) -> u64 {
        self.attempts.iter().map(|a| a.tokens_used).sum()
    }

    pub fn oracle_invocations(&self) -> usize {
        self.attempts.iter().filter(|a| a.prompt.is_some()).count()
    }
}

enum Next {
    Revised { model: ProcessModel, path: PathBuf },
    Done(SessionOutcome),
}

/// Drives one session. Borrowed collaborators keep sessions independent:
/// nothing here is process-wide.
pub struct RepairLoop<'a> {
    verifier: &'a dyn ContainmentVerifier,
    oracle: &'a dyn Oracle,
    prompts: &'a PromptBuilder,
    policy: RepairPolicy,
    revisions_dir: PathBuf,
    debug_dir: Option<PathBuf>,
}

impl<'a> RepairLoop<'a> {
    pub fn new(
        verifier: &'a dyn ContainmentVerifier,
        oracle: &'a dyn Oracle,
        prompts: &'a PromptBuilder,
        policy: RepairPolicy,
        revisions_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            verifier,
            oracle,
            prompts,
            policy,
            revisions_dir: revisions_dir.into(),
            debug_dir: None,
        }
    }

    pub fn with_debug_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.debug_dir = Some(dir.into());
        self
    }

    pub async fn run(&self, pair: &ModelPair) -> RepairSession {
        let span = session_span(&pair.id, self.oracle.name());
        self.run_session(pair).instrument(span).await
    }

    async fn run_session(&self, pair: &ModelPair) -> RepairSession {
        let clock = Instant::now();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut session = RepairSession::open(pair, self.oracle.name(), max_attempts);
        emit_session_started(&pair.id, self.oracle.name(), max_attempts);

        let outcome = match self.prepare(pair) {
            Ok((reference, candidate, rev0)) => {
                session.final_candidate = Some(rev0);
                self.iterate(&reference, candidate, pair, max_attempts, &mut session)
                    .await
            }
            Err(e) => SessionOutcome::failed(FailureReason::Setup {
                message: e.to_string(),
            }),
        };
        session.outcome = outcome;
        session.finished_at = Utc::now();

        emit_session_finished(
            &pair.id,
            self.oracle.name(),
            session.outcome.status(),
            session.iterations(),
            session.tokens_used(),
            clock.elapsed().as_millis() as u64,
        );
        session
    }

    /// Load the reference and take a private copy of the candidate as
    /// revision 0, so the caller's file is never touched.
    fn prepare(&self, pair: &ModelPair) -> Result<(ProcessModel, ProcessModel, PathBuf)> {
        let reference = load_model(&pair.reference)?;
        std::fs::create_dir_all(&self.revisions_dir)
            .map_err(RepairError::io_at(&self.revisions_dir))?;
        let rev0 = revision_path(&self.revisions_dir, &pair.candidate, 0);
        std::fs::copy(&pair.candidate, &rev0).map_err(RepairError::io_at(&pair.candidate))?;
        let candidate = load_model(&rev0)?;
        Ok((reference, candidate, rev0))
    }

    async fn iterate(
        &self,
        reference: &ProcessModel,
        mut candidate: ProcessModel,
        pair: &ModelPair,
        max_attempts: u32,
        session: &mut RepairSession,
    ) -> SessionOutcome {
        for iteration in 1..=max_attempts {
            let verified = session.final_candidate.clone().unwrap_or_default();
            let mut record = RepairAttempt::new(iteration, verified);
            let next = self
                .attempt(iteration, reference, &candidate, pair, &mut record, session)
                .await;
            emit_attempt(
                &pair.id,
                iteration,
                record.contained,
                record.unmatched_paths,
                record.tokens_used,
            );
            session.attempts.push(record);

            match next {
                Next::Revised { model, path } => {
                    candidate = model;
                    session.final_candidate = Some(path);
                }
                Next::Done(outcome) => return outcome,
            }
        }
        SessionOutcome::BudgetExhausted {
            attempts: max_attempts,
        }
    }

    async fn attempt(
        &self,
        iteration: u32,
        reference: &ProcessModel,
        candidate: &ProcessModel,
        pair: &ModelPair,
        record: &mut RepairAttempt,
        session: &mut RepairSession,
    ) -> Next {
        let verdict = match self.verifier.verify(reference, candidate) {
            Ok(v) => v,
            Err(e) => {
                return Next::Done(SessionOutcome::failed(FailureReason::Verification {
                    message: e.to_string(),
                }))
            }
        };
        record.contained = verdict.contained;
        record.unmatched_paths = verdict.unmatched_paths.len();
        let prompt = if verdict.contained {
            None
        } else {
            self.prompts
                .build(reference, candidate, &verdict.unmatched_paths)
        };
        session.last_verdict = Some(verdict);

        if record.contained {
            return Next::Done(SessionOutcome::Contained);
        }
        let Some(prompt) = prompt else {
            return Next::Done(SessionOutcome::failed(FailureReason::NoCounterexample));
        };

        self.write_debug(DEBUG_PROMPT_FILE, &prompt);
        record.prompt = Some(prompt.clone());
        let reply = match self.oracle.invoke(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                record.tokens_used = e.tokens_used();
                if let OracleError::ErrorReply { message, .. } = &e {
                    self.write_debug(DEBUG_REPLY_FILE, message);
                    record.reply = Some(message.clone());
                }
                return Next::Done(SessionOutcome::failed(FailureReason::Oracle {
                    message: e.to_string(),
                }));
            }
        };
        record.tokens_used = reply.tokens_used;
        self.write_debug(DEBUG_REPLY_FILE, &reply.text);

        let extracted = extract(&reply.text);
        record.reply = Some(reply.text);
        let extracted = match extracted {
            Ok(model) => model,
            Err(e) => {
                record.extraction = StageStatus::Failed {
                    message: e.to_string(),
                };
                return Next::Done(SessionOutcome::failed(FailureReason::Extraction {
                    message: e.to_string(),
                }));
            }
        };
        record.extraction = StageStatus::Succeeded;

        let revised = assemble_candidate(&extracted, candidate);
        if let Err(e) = revised.validate() {
            record.materialization = StageStatus::Failed {
                message: e.to_string(),
            };
            return Next::Done(SessionOutcome::failed(FailureReason::InvalidCandidate {
                message: e.to_string(),
            }));
        }

        let dest = revision_path(&self.revisions_dir, &pair.candidate, iteration);
        match materialize(&revised, &dest) {
            Ok(model) => {
                debug!(iteration, revision = %dest.display(), "candidate revision written");
                record.materialization = StageStatus::Succeeded;
                record.revision = Some(dest.clone());
                Next::Revised { model, path: dest }
            }
            Err(e) => {
                record.materialization = StageStatus::Failed {
                    message: e.to_string(),
                };
                Next::Done(SessionOutcome::failed(FailureReason::Materialize {
                    message: e.to_string(),
                }))
            }
        }
    }

    fn write_debug(&self, file: &str, text: &str) {
        let Some(dir) = &self.debug_dir else {
            return;
        };
        let path = dir.join(file);
        if let Err(e) = write_text(&path, text) {
            emit_artifact_write_failed("debug", &path, &e);
        }
    }
}

fn write_text(path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text)
}
