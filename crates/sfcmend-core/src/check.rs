//! One-shot containment check without any oracle.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sfc_model::{load_model, ContainmentVerdict, ContainmentVerifier};
use tracing::info;

use crate::classify::{classify, Bucket, Classification};
use crate::error::Result;
use crate::obs::SessionSpan;
use crate::report::ContainmentReport;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub verdict: ContainmentVerdict,
    pub classification: Classification,
}

/// Verify `candidate` against `reference` once, then move `candidate` into
/// `<dest_root>/{success|failed}/` with its report.
///
/// Unlike a repair session, this takes ownership of the caller's file.
pub fn check_pair(
    verifier: &dyn ContainmentVerifier,
    reference: &Path,
    candidate: &Path,
    dest_root: &Path,
) -> Result<CheckResult> {
    let pair_id = reference
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let _span = SessionSpan::enter(&pair_id, "none");

    let reference_model = load_model(reference)?;
    let candidate_model = load_model(candidate)?;
    let verdict = verifier.verify(&reference_model, &candidate_model)?;
    info!(
        event = "check.verified",
        contained = verdict.contained,
        unmatched_paths = verdict.unmatched_paths.len(),
    );

    let report = ContainmentReport::from_verdict(reference, candidate, &verdict);
    let classification = classify(
        Bucket::from_contained(verdict.contained),
        &report,
        candidate,
        dest_root,
    )?;
    Ok(CheckResult {
        verdict,
        classification,
    })
}
