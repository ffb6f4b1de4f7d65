//! Mining a structured model out of free-form oracle replies.
//!
//! Three tiers, first hit wins:
//! 1. the first non-empty fenced code block (language tag optional)
//! 2. every line from the first `steps2 = ...` / `steps = ...` onward
//! 3. the whole reply
//!
//! The selected text goes through the restricted literal grammar of
//! `sfc-model`. Nothing in a reply is ever evaluated.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sfc_model::{
    parse_assignments, render_assignment, steps_from_value, steps_to_value,
    transitions_from_value, transitions_to_value, ModelError, Step, Transition,
};

const STEP_NAMES: [&str; 2] = ["steps2", "steps"];
const TRANSITION_NAMES: [&str; 2] = ["transitions2", "transitions"];

/// Steps and transitions recovered from a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedModel {
    pub steps: Vec<Step>,
    pub transitions: Vec<Transition>,
}

/// Which heuristic produced the literal text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    FencedBlock,
    AssignmentScan,
    WholeReply,
}

impl fmt::Display for ExtractionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExtractionSource::FencedBlock => "fenced block",
            ExtractionSource::AssignmentScan => "assignment scan",
            ExtractionSource::WholeReply => "whole reply",
        };
        write!(f, "{s}")
    }
}

/// No structured literal could be recovered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("extraction from {source_tier} failed: {diagnostic}")]
pub struct ExtractionError {
    pub source_tier: ExtractionSource,
    pub diagnostic: String,
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        // The tag only counts when the fence line ends right after it.
        Regex::new(r"```(?:[A-Za-z0-9_+.-]*[ \t]*\r?\n)?([\s\S]*?)```").expect("valid fence pattern")
    })
}

fn steps_line_regex() -> &'static Regex {
    static LINE: OnceLock<Regex> = OnceLock::new();
    LINE.get_or_init(|| {
        Regex::new(r"^\s*steps2?\s*=").expect("valid assignment pattern")
    })
}

fn leading_assignment_regex() -> &'static Regex {
    static LEAD: OnceLock<Regex> = OnceLock::new();
    LEAD.get_or_init(|| {
        Regex::new(r"^\s*(?:#[^\n]*\n\s*)*[A-Za-z_][A-Za-z0-9_]*\s*=[^=]")
            .expect("valid assignment pattern")
    })
}

/// Pick the literal text out of `reply` and report which tier found it.
pub fn locate_literal(reply: &str) -> (String, ExtractionSource) {
    if let Some(block) = fence_regex()
        .captures_iter(reply)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .find(|s| !s.is_empty())
    {
        return (block.to_string(), ExtractionSource::FencedBlock);
    }

    let lines: Vec<&str> = reply.lines().collect();
    if let Some(start) = lines.iter().position(|l| steps_line_regex().is_match(l)) {
        return (lines[start..].join("\n"), ExtractionSource::AssignmentScan);
    }

    (reply.trim().to_string(), ExtractionSource::WholeReply)
}

/// Parse literal text into steps and transitions.
///
/// A bare literal with no assignment is taken as the steps table. Missing
/// transitions default to an empty list.
pub fn parse_extracted(text: &str) -> Result<ExtractedModel, ModelError> {
    let owned;
    let text = if leading_assignment_regex().is_match(text) {
        text
    } else {
        owned = format!("steps2 = {text}");
        &owned
    };

    let mut steps = None;
    let mut transitions = None;
    for stmt in parse_assignments(text)? {
        if STEP_NAMES.contains(&stmt.name.as_str()) {
            steps.get_or_insert(stmt.value);
        } else if TRANSITION_NAMES.contains(&stmt.name.as_str()) {
            transitions.get_or_insert(stmt.value);
        }
    }

    let steps = steps.ok_or_else(|| ModelError::MissingAssignment("steps2".to_string()))?;
    Ok(ExtractedModel {
        steps: steps_from_value(steps)?,
        transitions: transitions_from_value(transitions.unwrap_or(Value::Array(vec![])))?,
    })
}

/// Recover an [`ExtractedModel`] from an oracle reply.
pub fn extract(reply: &str) -> Result<ExtractedModel, ExtractionError> {
    let (text, source_tier) = locate_literal(reply);
    if text.is_empty() {
        return Err(ExtractionError {
            source_tier,
            diagnostic: "reply contains no text".to_string(),
        });
    }
    parse_extracted(&text).map_err(|e| ExtractionError {
        source_tier,
        diagnostic: e.to_string(),
    })
}

/// Serialise back into the fenced form [`extract`] prefers.
pub fn render_extracted(model: &ExtractedModel) -> String {
    let mut out = String::from("```python\n");
    out.push_str(&render_assignment("steps2", &steps_to_value(&model.steps)));
    out.push_str(&render_assignment(
        "transitions2",
        &transitions_to_value(&model.transitions),
    ));
    out.push_str("```\n");
    out
}
