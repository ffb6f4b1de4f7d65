//! Containment verification.
//!
//! [`ContainmentVerifier`] is the seam the repair loop depends on. The
//! bundled [`PathVerifier`] compares the transition paths reachable from
//! each model's initial step. A reference path is reproduced when the
//! candidate has the same path or one that extends it; any other reference
//! path is reported as an [`UnmatchedPath`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{ProcessModel, Transition};
use crate::Result;

/// One labelled event along a behavior trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEvent {
    pub label: String,
}

impl PathEvent {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

/// A reference behavior the candidate cannot reproduce.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnmatchedPath {
    pub events: Vec<PathEvent>,
}

impl UnmatchedPath {
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            events: labels.into_iter().map(PathEvent::new).collect(),
        }
    }
}

/// Result of one verification call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainmentVerdict {
    pub contained: bool,
    pub unmatched_paths: Vec<UnmatchedPath>,
}

impl ContainmentVerdict {
    pub fn contained() -> Self {
        Self {
            contained: true,
            unmatched_paths: Vec::new(),
        }
    }

    pub fn not_contained(unmatched_paths: Vec<UnmatchedPath>) -> Self {
        Self {
            contained: false,
            unmatched_paths,
        }
    }
}

/// Decides whether a candidate model is contained in a reference model.
pub trait ContainmentVerifier: Send + Sync {
    fn verify(
        &self,
        reference: &ProcessModel,
        candidate: &ProcessModel,
    ) -> Result<ContainmentVerdict>;
}

/// Path-enumerating verifier.
///
/// Paths start at the initial step and end at a step with no outgoing
/// transition, or at the transition that would revisit a step already on the
/// path (a cutpoint). Enumeration stops after `max_paths` paths per model.
#[derive(Debug, Clone)]
pub struct PathVerifier {
    max_paths: usize,
}

impl Default for PathVerifier {
    fn default() -> Self {
        Self { max_paths: 256 }
    }
}

impl PathVerifier {
    pub fn new(max_paths: usize) -> Self {
        Self {
            max_paths: max_paths.max(1),
        }
    }

    /// All maximal simple paths of `model`, as transition sequences.
    pub fn paths<'m>(&self, model: &'m ProcessModel) -> Vec<Vec<&'m Transition>> {
        let mut out = Vec::new();
        let mut on_path = vec![model.initial_step.as_str()];
        let mut path = Vec::new();
        self.walk(model, &model.initial_step, &mut on_path, &mut path, &mut out);
        out
    }

    fn walk<'m>(
        &self,
        model: &'m ProcessModel,
        step: &str,
        on_path: &mut Vec<&'m str>,
        path: &mut Vec<&'m Transition>,
        out: &mut Vec<Vec<&'m Transition>>,
    ) {
        let outgoing: Vec<&Transition> = model.transitions.iter().filter(|t| t.src == step).collect();
        if outgoing.is_empty() {
            out.push(path.clone());
            return;
        }
        for t in outgoing {
            if out.len() >= self.max_paths {
                return;
            }
            path.push(t);
            if on_path.contains(&t.tgt.as_str()) {
                out.push(path.clone());
            } else {
                on_path.push(t.tgt.as_str());
                self.walk(model, &t.tgt, on_path, path, out);
                on_path.pop();
            }
            path.pop();
        }
    }
}

type PathKey = Vec<(String, String, String)>;

fn path_key(path: &[&Transition]) -> PathKey {
    path.iter()
        .map(|t| (t.src.clone(), t.tgt.clone(), t.normalized_cond()))
        .collect()
}

/// Every prefix of every candidate path, the full paths included. A reference
/// path that appears here is reproduced by the candidate.
fn reproducible(paths: &[Vec<&Transition>]) -> HashSet<PathKey> {
    let mut out = HashSet::new();
    for path in paths {
        let key = path_key(path);
        for len in 0..=key.len() {
            out.insert(key[..len].to_vec());
        }
    }
    out
}

/// `From \t To \t Transition \t Condition \t Data Transformation`
fn event_label(t: &Transition) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}",
        t.src,
        t.tgt,
        t.label(),
        t.normalized_cond(),
        t.transformation()
    )
}

impl ContainmentVerifier for PathVerifier {
    fn verify(
        &self,
        reference: &ProcessModel,
        candidate: &ProcessModel,
    ) -> Result<ContainmentVerdict> {
        let candidate_paths = self.paths(candidate);
        let reproduced = reproducible(&candidate_paths);

        let reference_paths = self.paths(reference);
        let unmatched: Vec<UnmatchedPath> = reference_paths
            .iter()
            .filter(|p| !p.is_empty() && !reproduced.contains(&path_key(p)))
            .map(|p| UnmatchedPath::from_labels(p.iter().map(|t| event_label(t))))
            .collect();

        debug!(
            reference_paths = reference_paths.len(),
            candidate_paths = candidate_paths.len(),
            unmatched = unmatched.len(),
            "path containment computed"
        );

        if unmatched.is_empty() {
            Ok(ContainmentVerdict::contained())
        } else {
            Ok(ContainmentVerdict::not_contained(unmatched))
        }
    }
}
