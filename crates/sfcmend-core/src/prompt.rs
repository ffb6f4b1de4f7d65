//! Repair prompt construction.

use std::path::Path;

use sfc_model::{render_assignment, steps_to_value, transitions_to_value, ProcessModel, UnmatchedPath};

use crate::error::{RepairError, Result};

/// Built-in template used when no template file is configured.
pub const DEFAULT_TEMPLATE: &str = include_str!("../templates/repair_prompt.txt");

/// First line of the counterexample table.
pub const TABLE_HEADER: &str = "From\tTo\tTransitions\tCondition\tData Transformation";

const PATHS_SLOT: &str = "non_equiv_paths_str";
const CANDIDATE_SLOT: &str = "sfc2_code";
const REFERENCE_SLOT: &str = "sfc1_code";

/// Fills the repair template from a verdict's unmatched paths and the two
/// models.
///
/// Placeholders are `{non_equiv_paths_str}`, `{sfc2_code}` and
/// `{sfc1_code}`. `{{` and `}}` in the template render as literal braces;
/// any other `{...}` is left as written.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    template: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}

impl PromptBuilder {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let template = std::fs::read_to_string(path).map_err(RepairError::io_at(path))?;
        Ok(Self::new(template))
    }

    /// Use `path` when given, else the built-in template.
    pub fn from_optional_file(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// `None` when there is nothing to repair.
    pub fn build(
        &self,
        reference: &ProcessModel,
        candidate: &ProcessModel,
        unmatched: &[UnmatchedPath],
    ) -> Option<String> {
        if unmatched.iter().all(|p| p.events.is_empty()) {
            return None;
        }
        let table = counterexample_table(unmatched);
        let candidate_code = model_code(candidate, "2");
        let reference_code = model_code(reference, "1");
        Some(fill_template(
            &self.template,
            &[
                (PATHS_SLOT, table.as_str()),
                (CANDIDATE_SLOT, candidate_code.as_str()),
                (REFERENCE_SLOT, reference_code.as_str()),
            ],
        ))
    }
}

/// Tab-separated table of unmatched path events, one blank line between
/// paths.
pub fn counterexample_table(unmatched: &[UnmatchedPath]) -> String {
    let mut out = String::from(TABLE_HEADER);
    out.push('\n');
    let paths: Vec<String> = unmatched
        .iter()
        .filter(|p| !p.events.is_empty())
        .map(|p| {
            p.events
                .iter()
                .map(|e| e.label.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect();
    out.push_str(&paths.join("\n\n"));
    out
}

fn model_code(model: &ProcessModel, suffix: &str) -> String {
    let mut out = render_assignment(&format!("steps{suffix}"), &steps_to_value(&model.steps));
    out.push_str(&render_assignment(
        &format!("transitions{suffix}"),
        &transitions_to_value(&model.transitions),
    ));
    out.trim_end().to_string()
}

fn fill_template(template: &str, slots: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(idx) = rest.find(['{', '}']) {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];
        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('{') {
            if let Some(end) = tail.find('}') {
                let key = &tail[1..end];
                if let Some((_, value)) = slots.iter().find(|(k, _)| *k == key) {
                    out.push_str(value);
                    rest = &tail[end + 1..];
                    continue;
                }
            }
        }
        out.push_str(&tail[..1]);
        rest = &tail[1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfc_model::{Step, Transition};

    fn two_step(transitions: Vec<Transition>) -> ProcessModel {
        ProcessModel::new(
            vec![Step::new("S1"), Step::new("S2")],
            transitions,
            serde_json::json!([]),
            "S1",
        )
    }

    fn unmatched() -> Vec<UnmatchedPath> {
        vec![UnmatchedPath::from_labels(["S1\tS2\tS1->S2\ttrue\t"])]
    }

    #[test]
    fn builds_prompt_with_all_slots() {
        let reference = two_step(vec![Transition::new("S1", "S2", "true")]);
        let candidate = two_step(vec![]);
        let prompt = PromptBuilder::default()
            .build(&reference, &candidate, &unmatched())
            .unwrap();

        assert!(prompt.contains(TABLE_HEADER));
        assert!(prompt.contains("S1\tS2\tS1->S2\ttrue"));
        assert!(prompt.contains("steps2 = ["));
        assert!(prompt.contains("transitions2 = []"));
        assert!(prompt.contains("transitions1 = ["));
        assert!(!prompt.contains("{sfc1_code}"));
    }

    #[test]
    fn no_counterexample_means_no_prompt() {
        let m = two_step(vec![]);
        assert!(PromptBuilder::default().build(&m, &m, &[]).is_none());
        let empty = vec![UnmatchedPath { events: vec![] }];
        assert!(PromptBuilder::default().build(&m, &m, &empty).is_none());
    }

    #[test]
    fn table_separates_paths_with_blank_line() {
        let paths = vec![
            UnmatchedPath::from_labels(["A\tB\tt1\tx\t", "B\tC\tt2\ty\t"]),
            UnmatchedPath::from_labels(["A\tD\tt3\tz\t"]),
        ];
        let table = counterexample_table(&paths);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], TABLE_HEADER);
        assert_eq!(lines[1], "A\tB\tt1\tx\t");
        assert_eq!(lines[2], "B\tC\tt2\ty\t");
        assert_eq!(lines[3], "");
        assert_eq!(lines[4], "A\tD\tt3\tz\t");
    }

    #[test]
    fn escaped_braces_and_unknown_slots() {
        let filled = fill_template(
            "{{literal}} {sfc1_code} {other} }}",
            &[("sfc1_code", "steps1 = [{'name': {'x': 1}}]")],
        );
        assert_eq!(filled, "{literal} steps1 = [{'name': {'x': 1}}] {other} }");
    }

    #[test]
    fn template_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        std::fs::write(&path, "fix:\n{non_equiv_paths_str}").unwrap();
        let builder = PromptBuilder::from_optional_file(Some(&path)).unwrap();
        let m = two_step(vec![]);
        let prompt = builder.build(&m, &m, &unmatched()).unwrap();
        assert!(prompt.starts_with("fix:\nFrom\tTo"));

        assert!(PromptBuilder::from_file(&dir.path().join("missing.txt")).is_err());
    }
}
