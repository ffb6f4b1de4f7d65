//! Turning an extracted model into a durable candidate revision.

use std::path::{Path, PathBuf};

use sfc_model::{load_model, save_model, ModelError, ProcessModel};

use crate::extract::ExtractedModel;

/// Combine the extracted structure with the variables and initial step of
/// `previous`. Only steps and transitions come from the oracle.
pub fn assemble_candidate(extracted: &ExtractedModel, previous: &ProcessModel) -> ProcessModel {
    ProcessModel::new(
        extracted.steps.clone(),
        extracted.transitions.clone(),
        previous.variables.clone(),
        previous.initial_step.clone(),
    )
}

/// Write `candidate` to `dest` and load it back.
///
/// Reloading goes through the same validation as any other model file, so
/// a revision that cannot be used on the next pass fails here.
pub fn materialize(candidate: &ProcessModel, dest: &Path) -> Result<ProcessModel, ModelError> {
    save_model(candidate, dest)?;
    load_model(dest)
}

/// `<dir>/<stem>_rev<k>.<ext>`; `ext` defaults to `sfc`.
pub fn revision_path(dir: &Path, original: &Path, revision: u32) -> PathBuf {
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "candidate".to_string());
    let ext = original
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sfc".to_string());
    dir.join(format!("{stem}_rev{revision}.{ext}"))
}
