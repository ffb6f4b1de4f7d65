//! Token cost per (pair, oracle).
//!
//! Rows keep first-seen pair order and columns keep first-seen oracle order,
//! so the export mirrors dispatch order. Only the batch runner appends, and
//! only once a session's total is known.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RepairError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostLedger {
    pairs: Vec<String>,
    oracles: Vec<String>,
    cells: HashMap<String, HashMap<String, u64>>,
}

impl CostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `tokens` to the (pair, oracle) cell.
    pub fn record(&mut self, pair: &str, oracle: &str, tokens: u64) {
        if !self.pairs.iter().any(|p| p == pair) {
            self.pairs.push(pair.to_string());
        }
        if !self.oracles.iter().any(|o| o == oracle) {
            self.oracles.push(oracle.to_string());
        }
        *self
            .cells
            .entry(pair.to_string())
            .or_default()
            .entry(oracle.to_string())
            .or_insert(0) += tokens;
    }

    pub fn get(&self, pair: &str, oracle: &str) -> Option<u64> {
        self.cells.get(pair)?.get(oracle).copied()
    }

    pub fn pairs(&self) -> &[String] {
        &self.pairs
    }

    pub fn oracles(&self) -> &[String] {
        &self.oracles
    }

    pub fn total_for_oracle(&self, oracle: &str) -> u64 {
        self.cells.values().filter_map(|row| row.get(oracle)).sum()
    }

    pub fn total(&self) -> u64 {
        self.cells.values().flat_map(|row| row.values()).sum()
    }

    /// `pair,<oracle...>` header, one row per pair, empty cells where a pair
    /// was not run against an oracle.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        let header: Vec<String> = std::iter::once("pair".to_string())
            .chain(self.oracles.iter().map(|o| csv_field(o)))
            .collect();
        out.push_str(&header.join(","));
        out.push('\n');

        for pair in &self.pairs {
            let mut row = vec![csv_field(pair)];
            for oracle in &self.oracles {
                row.push(
                    self.get(pair, oracle)
                        .map(|t| t.to_string())
                        .unwrap_or_default(),
                );
            }
            out.push_str(&row.join(","));
            out.push('\n');
        }
        out
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(RepairError::io_at(parent))?;
        }
        std::fs::write(path, self.to_csv()).map_err(RepairError::io_at(path))
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
