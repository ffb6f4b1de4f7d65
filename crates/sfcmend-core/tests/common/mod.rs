//! Shared fixtures for sfcmend-core integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use sfc_model::{
    ContainmentVerdict, ContainmentVerifier, ModelError, ProcessModel, UnmatchedPath,
};

/// Reference chart with steps `[S1, S2]` and transition `S1 -> S2`.
pub const REFERENCE: &str = "\
steps = [{'name': 'S1'}, {'name': 'S2'}]
transitions = [{'src': 'S1', 'tgt': 'S2', 'cond': 'start'}]
variables = [{'name': 'start', 'type': 'bool'}]
initial_step = 'S1'
";

/// The reference with its only transition missing.
pub const CANDIDATE: &str = "\
steps = [{'name': 'S1'}, {'name': 'S2'}]
transitions = []
variables = [{'name': 'start', 'type': 'bool'}]
initial_step = 'S1'
";

/// Oracle reply that restores the missing transition.
pub const FIXING_REPLY: &str = "The transition S1 -> S2 was missing.

```python
steps2 = [{'name': 'S1'}, {'name': 'S2'}]
transitions2 = [{'src': 'S1', 'tgt': 'S2', 'cond': 'start'}]
```
";

/// A reply that parses but leaves the candidate unchanged.
pub const NOOP_REPLY: &str = "```python
steps2 = [{'name': 'S1'}, {'name': 'S2'}]
transitions2 = []
```";

pub fn write_file(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, text).unwrap();
    path
}

pub fn not_contained() -> ContainmentVerdict {
    ContainmentVerdict::not_contained(vec![UnmatchedPath::from_labels([
        "S1\tS2\tS1->S2\tstart\t",
    ])])
}

/// Verifier that replays queued verdicts and counts calls. Once the queue
/// is empty it keeps answering with the last verdict.
pub struct ScriptedVerifier {
    verdicts: Mutex<VecDeque<Result<ContainmentVerdict, String>>>,
    last: Mutex<Option<ContainmentVerdict>>,
    calls: Mutex<usize>,
}

impl ScriptedVerifier {
    pub fn new() -> Self {
        Self {
            verdicts: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            calls: Mutex::new(0),
        }
    }

    pub fn then(self, verdict: ContainmentVerdict) -> Self {
        self.verdicts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Ok(verdict));
        self
    }

    pub fn then_error(self, message: &str) -> Self {
        self.verdicts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(message.to_string()));
        self
    }

    pub fn always(verdict: ContainmentVerdict) -> Self {
        Self::new().then(verdict)
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ContainmentVerifier for ScriptedVerifier {
    fn verify(
        &self,
        _reference: &ProcessModel,
        _candidate: &ProcessModel,
    ) -> sfc_model::Result<ContainmentVerdict> {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        let next = self
            .verdicts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        match next {
            Some(Ok(v)) => {
                *last = Some(v.clone());
                Ok(v)
            }
            Some(Err(message)) => Err(ModelError::InvalidModel(message)),
            None => Ok(last.clone().unwrap_or_else(ContainmentVerdict::contained)),
        }
    }
}
