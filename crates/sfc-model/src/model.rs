//! Process model types and their textual form.
//!
//! A model file is a short sequence of literal assignments:
//!
//! ```text
//! steps = [
//!     {'name': 'S1', 'actions': ['x := 0']},
//!     {'name': 'S2'},
//! ]
//! transitions = [
//!     {'src': 'S1', 'tgt': 'S2', 'cond': 'x == 0'},
//! ]
//! variables = ['x']
//! initial_step = 'S1'
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::ModelError;
use crate::literal::{parse_assignments, render_assignment};
use crate::Result;

/// A step of the chart. Keys other than `name` are kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}

impl Step {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }
}

/// A guarded transition between two steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    #[serde(alias = "source", alias = "from")]
    pub src: String,
    #[serde(alias = "target", alias = "to")]
    pub tgt: String,
    #[serde(
        default,
        alias = "condition",
        alias = "guard",
        deserialize_with = "scalar_as_string"
    )]
    pub cond: String,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}

impl Transition {
    pub fn new(src: impl Into<String>, tgt: impl Into<String>, cond: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            tgt: tgt.into(),
            cond: cond.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Display name: the `name` attribute if present, else `src->tgt`.
    pub fn label(&self) -> String {
        match self.attributes.get("name") {
            Some(Value::String(name)) if !name.is_empty() => name.clone(),
            _ => format!("{}->{}", self.src, self.tgt),
        }
    }

    /// Data transformation attached to the transition, rendered as text.
    pub fn transformation(&self) -> String {
        ["transform", "transformation", "data_transformation", "action"]
            .iter()
            .find_map(|key| self.attributes.get(*key))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => crate::literal::render_literal(other),
            })
            .unwrap_or_default()
    }

    /// Condition with whitespace runs collapsed, used for path comparison.
    pub fn normalized_cond(&self) -> String {
        self.cond.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

fn scalar_as_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        Value::Bool(b) => Ok(if b { "True" } else { "False" }.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "condition must be a scalar, got {other}"
        ))),
    }
}

/// A sequential function chart: steps, transitions, variables and the
/// designated initial step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessModel {
    pub steps: Vec<Step>,
    pub transitions: Vec<Transition>,
    pub variables: Value,
    pub initial_step: String,
}

impl ProcessModel {
    pub fn new(
        steps: Vec<Step>,
        transitions: Vec<Transition>,
        variables: Value,
        initial_step: impl Into<String>,
    ) -> Self {
        Self {
            steps,
            transitions,
            variables,
            initial_step: initial_step.into(),
        }
    }

    /// Parse the textual form. Unknown assignments are ignored.
    ///
    /// When `initial_step` is absent the first step is used.
    pub fn from_source(src: &str) -> Result<Self> {
        let mut steps = None;
        let mut transitions = None;
        let mut variables = None;
        let mut initial_step = None;

        for stmt in parse_assignments(src)? {
            match stmt.name.as_str() {
                "steps" => steps = Some(stmt.value),
                "transitions" => transitions = Some(stmt.value),
                "variables" => variables = Some(stmt.value),
                "initial_step" => initial_step = Some(stmt.value),
                other => debug!(name = %other, "ignoring unknown assignment in model source"),
            }
        }

        let steps = steps.ok_or_else(|| ModelError::MissingAssignment("steps".to_string()))?;
        let steps = steps_from_value(steps)?;
        let transitions = transitions_from_value(transitions.unwrap_or(Value::Array(vec![])))?;
        let variables = variables.unwrap_or(Value::Array(vec![]));

        let initial_step = match initial_step {
            Some(Value::String(s)) => s,
            Some(other) => {
                return Err(ModelError::shape(
                    "initial_step",
                    format!("expected a string, got {other}"),
                ))
            }
            None => steps.first().map(|s| s.name.clone()).unwrap_or_default(),
        };

        Ok(Self {
            steps,
            transitions,
            variables,
            initial_step,
        })
    }

    /// Render the textual form accepted by [`ProcessModel::from_source`].
    pub fn to_source(&self) -> String {
        let mut out = String::new();
        out.push_str(&render_assignment("steps", &steps_to_value(&self.steps)));
        out.push_str(&render_assignment(
            "transitions",
            &transitions_to_value(&self.transitions),
        ));
        out.push_str(&render_assignment("variables", &self.variables));
        out.push_str(&render_assignment(
            "initial_step",
            &Value::String(self.initial_step.clone()),
        ));
        out
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Transitions leaving `step`, in declaration order.
    pub fn outgoing<'a>(&'a self, step: &'a str) -> impl Iterator<Item = &'a Transition> + 'a {
        self.transitions.iter().filter(move |t| t.src == step)
    }

    /// Structural checks: non-empty, uniquely named steps; transitions and
    /// the initial step reference declared steps.
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(ModelError::InvalidModel("model has no steps".to_string()));
        }

        let mut names = HashSet::new();
        for step in &self.steps {
            if step.name.trim().is_empty() {
                return Err(ModelError::InvalidModel("step with empty name".to_string()));
            }
            if !names.insert(step.name.as_str()) {
                return Err(ModelError::InvalidModel(format!(
                    "duplicate step `{}`",
                    step.name
                )));
            }
        }

        for (i, t) in self.transitions.iter().enumerate() {
            for endpoint in [&t.src, &t.tgt] {
                if !names.contains(endpoint.as_str()) {
                    return Err(ModelError::InvalidModel(format!(
                        "transition #{i} ({}) references undeclared step `{endpoint}`",
                        t.label()
                    )));
                }
            }
        }

        if !names.contains(self.initial_step.as_str()) {
            return Err(ModelError::InvalidModel(format!(
                "initial step `{}` is not declared",
                self.initial_step
            )));
        }

        Ok(())
    }
}

pub fn steps_from_value(value: Value) -> Result<Vec<Step>> {
    serde_json::from_value(value).map_err(|e| ModelError::shape("steps", e))
}

pub fn transitions_from_value(value: Value) -> Result<Vec<Transition>> {
    serde_json::from_value(value).map_err(|e| ModelError::shape("transitions", e))
}

pub fn steps_to_value(steps: &[Step]) -> Value {
    Value::Array(
        steps
            .iter()
            .map(|s| serde_json::to_value(s).unwrap_or(Value::Null))
            .collect(),
    )
}

pub fn transitions_to_value(transitions: &[Transition]) -> Value {
    Value::Array(
        transitions
            .iter()
            .map(|t| serde_json::to_value(t).unwrap_or(Value::Null))
            .collect(),
    )
}

/// Read and validate a model file.
pub fn load_model(path: &Path) -> Result<ProcessModel> {
    let src = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let model = ProcessModel::from_source(&src)?;
    model.validate()?;
    Ok(model)
}

/// Write a model file, creating parent directories as needed.
pub fn save_model(model: &ProcessModel, path: &Path) -> Result<()> {
    let io_err = |source| ModelError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, model.to_source()).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = "steps = [\n    {'name': 'S1', 'actions': ['x := 0']},\n    {'name': 'S2'},\n]\ntransitions = [\n    {'src': 'S1', 'tgt': 'S2', 'cond': 'x == 0'},\n]\nvariables = ['x']\ninitial_step = 'S1'\n";

    #[test]
    fn parses_sample_source() {
        let model = ProcessModel::from_source(SAMPLE).unwrap();
        assert_eq!(model.steps.len(), 2);
        assert_eq!(model.steps[0].attributes["actions"], json!(["x := 0"]));
        assert_eq!(model.transitions[0].cond, "x == 0");
        assert_eq!(model.variables, json!(["x"]));
        assert_eq!(model.initial_step, "S1");
        model.validate().unwrap();
    }

    #[test]
    fn source_round_trip_is_stable() {
        let model = ProcessModel::from_source(SAMPLE).unwrap();
        let again = ProcessModel::from_source(&model.to_source()).unwrap();
        assert_eq!(model, again);
        assert_eq!(model.to_source(), again.to_source());
    }

    #[test]
    fn accepts_key_aliases_and_scalar_conditions() {
        let src = "steps = [{'name': 'A'}, {'name': 'B'}]\ntransitions = [{'source': 'A', 'target': 'B', 'guard': True}]\n";
        let model = ProcessModel::from_source(src).unwrap();
        assert_eq!(model.transitions[0].src, "A");
        assert_eq!(model.transitions[0].tgt, "B");
        assert_eq!(model.transitions[0].cond, "True");
        assert_eq!(model.initial_step, "A");
        assert_eq!(model.variables, json!([]));
    }

    #[test]
    fn missing_steps_is_reported() {
        let err = ProcessModel::from_source("transitions = []").unwrap_err();
        assert!(matches!(err, ModelError::MissingAssignment(ref n) if n == "steps"));
    }

    #[test]
    fn wrong_shape_is_reported() {
        let err = ProcessModel::from_source("steps = [{'label': 'S1'}]").unwrap_err();
        assert!(matches!(err, ModelError::Shape { ref field, .. } if field == "steps"));
    }

    #[test]
    fn validate_rejects_dangling_transition() {
        let model = ProcessModel::new(
            vec![Step::new("S1")],
            vec![Transition::new("S1", "S9", "")],
            json!([]),
            "S1",
        );
        let err = model.validate().unwrap_err();
        assert!(err.to_string().contains("undeclared step `S9`"));
    }

    #[test]
    fn validate_rejects_duplicates_and_bad_initial() {
        let dup = ProcessModel::new(
            vec![Step::new("S1"), Step::new("S1")],
            vec![],
            json!([]),
            "S1",
        );
        assert!(dup.validate().unwrap_err().to_string().contains("duplicate"));

        let bad_init = ProcessModel::new(vec![Step::new("S1")], vec![], json!([]), "S0");
        assert!(bad_init
            .validate()
            .unwrap_err()
            .to_string()
            .contains("initial step"));

        let empty = ProcessModel::new(vec![], vec![], json!([]), "");
        assert!(empty.validate().is_err());
    }

    #[test]
    fn transition_label_and_transformation() {
        let mut t = Transition::new("S1", "S2", "x  >\n 0");
        assert_eq!(t.label(), "S1->S2");
        assert_eq!(t.normalized_cond(), "x > 0");
        t.attributes.insert("name".to_string(), json!("T1"));
        t.attributes.insert("transform".to_string(), json!("y := x"));
        assert_eq!(t.label(), "T1");
        assert_eq!(t.transformation(), "y := x");
    }

    #[test]
    fn save_and_load_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("model.txt");
        let model = ProcessModel::from_source(SAMPLE).unwrap();
        save_model(&model, &path).unwrap();
        assert_eq!(load_model(&path).unwrap(), model);
    }

    #[test]
    fn load_rejects_invalid_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        std::fs::write(&path, "steps = [{'name': 'S1'}]\ntransitions = [{'src': 'S1', 'tgt': 'S2'}]\n")
            .unwrap();
        assert!(matches!(load_model(&path), Err(ModelError::InvalidModel(_))));
    }
}
