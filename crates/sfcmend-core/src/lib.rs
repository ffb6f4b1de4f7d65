//! sfcmend-core: oracle-driven repair of process models
//!
//! A candidate model is repaired until every behavior of a reference model
//! is reproduced by it. Each session loops verify, prompt, invoke, extract,
//! validate and materialize under a bounded attempt budget; the batch layer
//! runs sessions over pairs x oracles, files results under `success/` or
//! `failed/` and keeps a per-pair, per-oracle token ledger.
//!
//! ## Layer 2 - Repair
//!
//! Focus: the repair state machine and everything around a batch run.

pub mod artifact;
pub mod batch;
pub mod check;
pub mod classify;
pub mod config;
pub mod error;
pub mod extract;
pub mod ledger;
pub mod materialize;
pub mod obs;
pub mod prompt;
pub mod repair_loop;
pub mod report;
pub mod telemetry;

pub use artifact::{read_session_artifact, write_session_artifact};
pub use batch::{discover_pairs, BatchInput, BatchReport, BatchRunner, ModelPair, SessionSummary};
pub use check::{check_pair, CheckResult};
pub use classify::{classify, classify_as, destination_name, Bucket, Classification};
pub use config::{RepairPolicy, RunConfig};
pub use error::{RepairError, Result};
pub use extract::{extract, render_extracted, ExtractedModel, ExtractionError, ExtractionSource};
pub use ledger::CostLedger;
pub use materialize::{assemble_candidate, materialize, revision_path};
pub use prompt::PromptBuilder;
pub use repair_loop::{
    FailureReason, RepairAttempt, RepairLoop, RepairSession, SessionOutcome, StageStatus,
};
pub use report::{write_report_json, ContainmentReport};
pub use telemetry::init_tracing;
