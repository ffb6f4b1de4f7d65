//! Batch runs over pairs x oracles: classification, cost export and check
//! mode.

mod common;

use common::*;
use oracle_gateway::{Oracle, ScriptedOracle};
use sfc_model::PathVerifier;
use sfcmend_core::{
    check_pair, discover_pairs, read_session_artifact, BatchInput, BatchRunner, Bucket,
    FailureReason, RunConfig, SessionOutcome,
};

fn config(root: &std::path::Path) -> RunConfig {
    RunConfig {
        max_attempts: 3,
        result_root: root.join("output"),
        ..RunConfig::default()
    }
}

#[tokio::test]
async fn two_pairs_two_oracles() {
    let dir = tempfile::tempdir().unwrap();
    let refs = dir.path().join("refs");
    let cands = dir.path().join("cands");
    write_file(&refs, "a.sfc", REFERENCE);
    write_file(&refs, "b.sfc", REFERENCE);
    write_file(&cands, "a.sfc", CANDIDATE);
    write_file(&cands, "b.sfc", REFERENCE);

    let cfg = config(dir.path());
    let verifier = PathVerifier::default();
    let pairs = discover_pairs(&BatchInput::from_paths(&refs, &cands)).unwrap();
    assert_eq!(pairs.len(), 2);

    // "good" fixes pair a; pair b is already contained and costs nothing.
    // "bad" answers pair a with prose.
    let oracles: Vec<Box<dyn Oracle>> = vec![
        Box::new(ScriptedOracle::new("good").with_reply(FIXING_REPLY, 100)),
        Box::new(ScriptedOracle::new("bad").with_reply("no idea", 40)),
    ];

    let report = BatchRunner::new(&cfg, &verifier)
        .unwrap()
        .run(&pairs, &oracles)
        .await
        .unwrap();

    let summary: Vec<(&str, &str, &str, u32, u64)> = report
        .sessions
        .iter()
        .map(|s| {
            (
                s.pair.as_str(),
                s.oracle.as_str(),
                s.outcome.status(),
                s.iterations,
                s.tokens_used,
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            ("a", "good", "contained", 2, 100),
            ("b", "good", "contained", 1, 0),
            ("a", "bad", "failed", 1, 40),
            ("b", "bad", "contained", 1, 0),
        ]
    );
    assert_eq!(report.contained_count(), 3);

    let out = cfg.result_root.clone();
    assert!(out.join("good/success/a.sfc").exists());
    assert!(out.join("good/success/a.json").exists());
    assert!(out.join("bad/failed/a.sfc").exists());
    assert!(out.join("bad/failed/a.json").exists());
    assert!(!out.join("bad/success/a.sfc").exists());

    // Inputs survive both sweeps.
    assert_eq!(std::fs::read_to_string(cands.join("a.sfc")).unwrap(), CANDIDATE);

    let csv = std::fs::read_to_string(out.join("token_usage.csv")).unwrap();
    assert_eq!(csv, "pair,good,bad\na,100,40\nb,0,0\n");
    assert_eq!(report.ledger.total_for_oracle("good"), 100);

    let session = read_session_artifact("a", &out.join("bad/sessions")).unwrap();
    assert!(matches!(
        session.outcome,
        SessionOutcome::Failed {
            reason: FailureReason::Extraction { .. }
        }
    ));

    let report_json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("good/success/a.json")).unwrap())
            .unwrap();
    assert_eq!(report_json["contained"], true);
    assert_eq!(report_json["iterations"], 2);
    assert_eq!(report_json["tokens_used"], 100);
    assert_eq!(report_json["oracle"], "good");
}

#[tokio::test]
async fn setup_failure_does_not_abort_batch() {
    let dir = tempfile::tempdir().unwrap();
    let refs = dir.path().join("refs");
    let cands = dir.path().join("cands");
    write_file(&refs, "a.sfc", "steps = [");
    write_file(&refs, "b.sfc", REFERENCE);
    write_file(&cands, "a.sfc", CANDIDATE);
    write_file(&cands, "b.sfc", REFERENCE);

    let cfg = config(dir.path());
    let verifier = PathVerifier::default();
    let pairs = discover_pairs(&BatchInput::from_paths(&refs, &cands)).unwrap();
    let oracles: Vec<Box<dyn Oracle>> = vec![Box::new(ScriptedOracle::new("solo"))];

    let report = BatchRunner::new(&cfg, &verifier)
        .unwrap()
        .run(&pairs, &oracles)
        .await
        .unwrap();

    assert_eq!(report.sessions.len(), 2);
    assert!(matches!(
        report.sessions[0].outcome,
        SessionOutcome::Failed {
            reason: FailureReason::Setup { .. }
        }
    ));
    assert!(report.sessions[0].classification.is_none());
    assert_eq!(report.sessions[1].outcome, SessionOutcome::Contained);
    assert_eq!(
        report.sessions[1].classification.as_ref().map(|c| c.bucket),
        Some(Bucket::Success)
    );
}

#[tokio::test]
async fn custom_cost_export_path() {
    let dir = tempfile::tempdir().unwrap();
    let reference = write_file(dir.path(), "ref.sfc", REFERENCE);
    let candidate = write_file(dir.path(), "cand.sfc", REFERENCE);
    let mut cfg = config(dir.path());
    cfg.cost_export = Some(dir.path().join("reports/costs.csv"));

    let verifier = PathVerifier::default();
    let pairs = discover_pairs(&BatchInput::from_paths(&reference, &candidate)).unwrap();
    let oracles: Vec<Box<dyn Oracle>> = vec![Box::new(ScriptedOracle::new("o1"))];
    let report = BatchRunner::new(&cfg, &verifier)
        .unwrap()
        .run(&pairs, &oracles)
        .await
        .unwrap();

    assert_eq!(report.cost_export, cfg.cost_export);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("reports/costs.csv")).unwrap(),
        "pair,o1\nref,0\n"
    );
}

#[tokio::test]
async fn failed_cost_export_keeps_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let refs = dir.path().join("refs");
    let cands = dir.path().join("cands");
    write_file(&refs, "a.sfc", REFERENCE);
    write_file(&cands, "a.sfc", CANDIDATE);
    let blocker = write_file(dir.path(), "blocker", "");
    let mut cfg = config(dir.path());
    cfg.cost_export = Some(blocker.join("costs.csv"));

    let verifier = PathVerifier::default();
    let pairs = discover_pairs(&BatchInput::from_paths(&refs, &cands)).unwrap();
    let oracles: Vec<Box<dyn Oracle>> = vec![
        Box::new(ScriptedOracle::new("first").with_reply(FIXING_REPLY, 10)),
        Box::new(ScriptedOracle::new("second").with_reply(FIXING_REPLY, 20)),
    ];
    let report = BatchRunner::new(&cfg, &verifier)
        .unwrap()
        .run(&pairs, &oracles)
        .await
        .unwrap();

    // Both sweeps ran even though neither export could be written.
    assert_eq!(report.sessions.len(), 2);
    assert!(report.sessions.iter().all(|s| s.outcome.is_success()));
    assert_eq!(report.cost_export, None);
    assert_eq!(report.ledger.get("a", "second"), Some(20));
    assert!(cfg.result_root.join("second/success/a.sfc").exists());
}

#[test]
fn check_mode_moves_candidate() {
    let dir = tempfile::tempdir().unwrap();
    let reference = write_file(dir.path(), "ref.sfc", REFERENCE);
    let good = write_file(dir.path(), "good.sfc", REFERENCE);
    let bad = write_file(dir.path(), "bad.sfc", CANDIDATE);
    let dest = dir.path().join("checked");
    let verifier = PathVerifier::default();

    let ok = check_pair(&verifier, &reference, &good, &dest).unwrap();
    assert!(ok.verdict.contained);
    assert_eq!(ok.classification.moved_path, dest.join("success/good.sfc"));
    assert!(!good.exists());

    let failed = check_pair(&verifier, &reference, &bad, &dest).unwrap();
    assert!(!failed.verdict.contained);
    assert_eq!(failed.classification.moved_path, dest.join("failed/bad.sfc"));
    assert!(dest.join("failed/bad.json").exists());
    assert!(!bad.exists());

    // The reference is never moved.
    assert!(reference.exists());
}

#[test]
fn check_mode_reports_load_errors() {
    let dir = tempfile::tempdir().unwrap();
    let reference = write_file(dir.path(), "ref.sfc", REFERENCE);
    let broken = write_file(dir.path(), "broken.sfc", "steps = [{'name': 'S1'}]\ntransitions = [{'src': 'S1', 'tgt': 'Nowhere'}]\n");
    let err = check_pair(&PathVerifier::default(), &reference, &broken, dir.path()).unwrap_err();
    assert!(err.to_string().contains("Nowhere"));
    assert!(broken.exists());
}
