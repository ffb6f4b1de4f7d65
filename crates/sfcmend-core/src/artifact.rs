//! Auditable session artifacts.
//!
//! `<dir>/<pair>/session.json` holds the full [`RepairSession`];
//! `session.digest` holds the SHA-256 of those bytes so tampering or partial
//! writes are detected on read.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{RepairError, Result};
use crate::repair_loop::RepairSession;

pub const SESSION_FILE: &str = "session.json";
pub const SESSION_DIGEST_FILE: &str = "session.digest";

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Persist `session` under `<dir>/<session.pair_id>/`.
pub fn write_session_artifact(session: &RepairSession, dir: &Path) -> Result<PathBuf> {
    let session_dir = dir.join(&session.pair_id);
    std::fs::create_dir_all(&session_dir).map_err(RepairError::io_at(&session_dir))?;

    let artifact_path = session_dir.join(SESSION_FILE);
    let digest_path = session_dir.join(SESSION_DIGEST_FILE);
    let json = serde_json::to_vec_pretty(session)?;
    let digest = sha256_hex(&json);

    std::fs::write(&artifact_path, &json).map_err(RepairError::io_at(&artifact_path))?;
    std::fs::write(&digest_path, digest.as_bytes()).map_err(RepairError::io_at(&digest_path))?;

    Ok(artifact_path)
}

/// Read `<dir>/<pair_id>/session.json` and check it against its digest.
pub fn read_session_artifact(pair_id: &str, dir: &Path) -> Result<RepairSession> {
    let session_dir = dir.join(pair_id);
    let artifact_path = session_dir.join(SESSION_FILE);
    let digest_path = session_dir.join(SESSION_DIGEST_FILE);

    let json = std::fs::read(&artifact_path).map_err(RepairError::io_at(&artifact_path))?;
    let digest = std::fs::read_to_string(&digest_path).map_err(RepairError::io_at(&digest_path))?;
    let actual = sha256_hex(&json);
    if digest.trim() != actual {
        return Err(RepairError::DigestMismatch {
            expected: digest.trim().to_string(),
            actual,
        });
    }

    Ok(serde_json::from_slice(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
