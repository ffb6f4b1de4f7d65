//! Verification report written next to every classified candidate.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sfc_model::{ContainmentVerdict, UnmatchedPath};

use crate::error::{RepairError, Result};
use crate::repair_loop::{RepairSession, SessionOutcome};

pub const REPORT_SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainmentReport {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub reference: PathBuf,
    pub candidate: PathBuf,
    /// Absent in check mode.
    pub oracle: Option<String>,
    pub contained: bool,
    pub unmatched_paths: Vec<UnmatchedPath>,
    /// Absent in check mode.
    pub outcome: Option<SessionOutcome>,
    pub iterations: u32,
    pub tokens_used: u64,
}

impl ContainmentReport {
    /// Report for a single verification with no repair session.
    pub fn from_verdict(reference: &Path, candidate: &Path, verdict: &ContainmentVerdict) -> Self {
        Self {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            reference: reference.to_path_buf(),
            candidate: candidate.to_path_buf(),
            oracle: None,
            contained: verdict.contained,
            unmatched_paths: verdict.unmatched_paths.clone(),
            outcome: None,
            iterations: 1,
            tokens_used: 0,
        }
    }

    pub fn from_session(session: &RepairSession) -> Self {
        let (contained, unmatched_paths) = match &session.last_verdict {
            Some(v) => (v.contained, v.unmatched_paths.clone()),
            None => (false, Vec::new()),
        };
        Self {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            reference: session.reference.clone(),
            candidate: session.candidate.clone(),
            oracle: Some(session.oracle.clone()),
            contained,
            unmatched_paths,
            outcome: Some(session.outcome.clone()),
            iterations: session.iterations(),
            tokens_used: session.tokens_used(),
        }
    }
}

/// Write `report` as pretty JSON.
pub fn write_report_json(path: &Path, report: &ContainmentReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json).map_err(RepairError::io_at(path))
}
