//! Outcome classification: move a file under `success/` or `failed/` and
//! write its report alongside.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RepairError, Result};
use crate::report::{write_report_json, ContainmentReport};
use crate::repair_loop::SessionOutcome;

/// Destination subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Success,
    Failed,
}

impl Bucket {
    pub fn from_outcome(outcome: &SessionOutcome) -> Self {
        Self::from_contained(outcome.is_success())
    }

    pub fn from_contained(contained: bool) -> Self {
        if contained {
            Bucket::Success
        } else {
            Bucket::Failed
        }
    }

    pub fn dir_name(self) -> &'static str {
        match self {
            Bucket::Success => "success",
            Bucket::Failed => "failed",
        }
    }
}

/// Where a classified file and its report ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub bucket: Bucket,
    pub moved_path: PathBuf,
    pub report_path: PathBuf,
}

/// `dir/<file_name>`, or `dir/<stem>_<n>.<ext>` with the lowest `n >= 1`
/// that is free.
pub fn destination_name(dir: &Path, file_name: &str) -> PathBuf {
    let first = dir.join(file_name);
    if !first.exists() {
        return first;
    }
    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (file_name, None),
    };
    (1u32..)
        .map(|n| match ext {
            Some(ext) => dir.join(format!("{stem}_{n}.{ext}")),
            None => dir.join(format!("{stem}_{n}")),
        })
        .find(|p| !p.exists())
        .unwrap_or(first)
}

/// Rename, falling back to copy-then-remove across filesystems.
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to).map_err(RepairError::io_at(from))?;
    if let Err(e) = std::fs::remove_file(from) {
        // Keep exactly one copy.
        let _ = std::fs::remove_file(to);
        return Err(RepairError::IoAt {
            path: from.to_path_buf(),
            source: e,
        });
    }
    Ok(())
}

/// Move `input` into `<dest_root>/<bucket>/` and write `report` there as
/// `<stem>.json`. The file ends up in exactly one place.
pub fn classify(
    bucket: Bucket,
    report: &ContainmentReport,
    input: &Path,
    dest_root: &Path,
) -> Result<Classification> {
    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| RepairError::Config(format!("{} has no file name", input.display())))?;
    classify_as(bucket, report, input, &file_name, dest_root)
}

/// [`classify`], filing `input` under `file_name` instead of its own name.
pub fn classify_as(
    bucket: Bucket,
    report: &ContainmentReport,
    input: &Path,
    file_name: &str,
    dest_root: &Path,
) -> Result<Classification> {
    let dir = dest_root.join(bucket.dir_name());
    std::fs::create_dir_all(&dir).map_err(RepairError::io_at(&dir))?;

    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());

    let moved_path = destination_name(&dir, file_name);
    move_file(input, &moved_path)?;

    let report_path = destination_name(&dir, &format!("{stem}.json"));
    write_report_json(&report_path, report)?;

    debug!(
        bucket = bucket.dir_name(),
        moved = %moved_path.display(),
        report = %report_path.display(),
        "classified"
    );
    Ok(Classification {
        bucket,
        moved_path,
        report_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfc_model::ContainmentVerdict;

    fn report() -> ContainmentReport {
        ContainmentReport::from_verdict(
            Path::new("ref.sfc"),
            Path::new("cand.sfc"),
            &ContainmentVerdict::contained(),
        )
    }

    #[test]
    fn lowest_free_suffix() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(destination_name(dir.path(), "m.sfc"), dir.path().join("m.sfc"));

        std::fs::write(dir.path().join("m.sfc"), "").unwrap();
        std::fs::write(dir.path().join("m_2.sfc"), "").unwrap();
        assert_eq!(destination_name(dir.path(), "m.sfc"), dir.path().join("m_1.sfc"));

        std::fs::write(dir.path().join("m_1.sfc"), "").unwrap();
        assert_eq!(destination_name(dir.path(), "m.sfc"), dir.path().join("m_3.sfc"));
    }

    #[test]
    fn suffix_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("model"), "").unwrap();
        assert_eq!(destination_name(dir.path(), "model"), dir.path().join("model_1"));
    }

    #[test]
    fn classify_moves_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tank.sfc");
        std::fs::write(&input, "steps = []\n").unwrap();
        let dest = dir.path().join("out");

        let c = classify(Bucket::Success, &report(), &input, &dest).unwrap();
        assert!(!input.exists());
        assert_eq!(c.moved_path, dest.join("success").join("tank.sfc"));
        assert_eq!(c.report_path, dest.join("success").join("tank.json"));
        assert!(c.moved_path.exists());
        assert!(c.report_path.exists());
        assert!(!dest.join("failed").join("tank.sfc").exists());
    }

    #[test]
    fn collision_keeps_both() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out");
        for _ in 0..2 {
            let input = dir.path().join("tank.sfc");
            std::fs::write(&input, "x").unwrap();
            classify(Bucket::Failed, &report(), &input, &dest).unwrap();
            assert!(!input.exists());
        }
        let failed = dest.join("failed");
        assert!(failed.join("tank.sfc").exists());
        assert!(failed.join("tank_1.sfc").exists());
        assert!(failed.join("tank.json").exists());
        assert!(failed.join("tank_1.json").exists());
    }

    #[test]
    fn classify_as_renames() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tank_rev3.sfc");
        std::fs::write(&input, "x").unwrap();
        let c = classify_as(Bucket::Failed, &report(), &input, "tank.sfc", dir.path()).unwrap();
        assert_eq!(c.moved_path, dir.path().join("failed").join("tank.sfc"));
        assert_eq!(c.report_path, dir.path().join("failed").join("tank.json"));
        assert!(!input.exists());
    }

    #[test]
    fn missing_input_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = classify(Bucket::Failed, &report(), &dir.path().join("nope.sfc"), dir.path());
        assert!(err.is_err());
    }

    #[test]
    fn bucket_from_outcome() {
        assert_eq!(Bucket::from_outcome(&SessionOutcome::Contained), Bucket::Success);
        assert_eq!(
            Bucket::from_outcome(&SessionOutcome::BudgetExhausted { attempts: 3 }),
            Bucket::Failed
        );
    }
}
