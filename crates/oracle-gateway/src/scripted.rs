//! In-memory oracle for tests and dry runs
//!
//! `ScriptedOracle` replays a queue of canned replies or failures in order
//! and records every prompt it receives. Replies pass through the same
//! error-marker screening as the network adapters.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::OracleError;
use crate::{screen_reply, Oracle, OracleReply, Result};

#[derive(Debug)]
enum Scripted {
    Reply { text: String, tokens_used: u64 },
    Fail(OracleError),
}

/// Deterministic oracle backed by a `VecDeque` of scripted outcomes.
#[derive(Debug)]
pub struct ScriptedOracle {
    name: String,
    script: Mutex<VecDeque<Scripted>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_reply(self, text: impl Into<String>, tokens_used: u64) -> Self {
        self.push(Scripted::Reply {
            text: text.into(),
            tokens_used,
        });
        self
    }

    pub fn with_failure(self, err: OracleError) -> Self {
        self.push(Scripted::Fail(err));
        self
    }

    fn push(&self, item: Scripted) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(item);
    }

    /// Prompts received so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn invocations(&self) -> usize {
        self.prompts.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, prompt: &str) -> Result<OracleReply> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.to_string());

        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(Scripted::Reply { text, tokens_used }) => screen_reply(text, tokens_used),
            Some(Scripted::Fail(err)) => Err(err),
            None => Err(OracleError::Unreachable {
                attempts: 0,
                message: format!("script for '{}' exhausted", self.name),
            }),
        }
    }
}
