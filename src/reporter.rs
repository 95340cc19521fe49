//! Single-test result documents.
//!
//! The document follows the GTest JSON summary layout so downstream result
//! tooling can read it like any other test launcher output.

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Pass,
    Fail,
}

impl Outcome {
    pub fn from_exit_code(code: i32) -> Self {
        if code == 0 { Outcome::Pass } else { Outcome::Fail }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pass => write!(f, "PASS"),
            Outcome::Fail => write!(f, "FAIL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultDocument {
    pub suite_name: String,
    pub outcome: Outcome,
}

#[derive(Debug, Serialize, Deserialize)]
struct TestRecord {
    status: Outcome,
    elapsed_time_ms: u64,
    output_snippet: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SummaryJson {
    all_tests: Vec<String>,
    disabled_tests: Vec<String>,
    global_tags: Vec<String>,
    per_iteration_data: Vec<BTreeMap<String, Vec<TestRecord>>>,
}

impl ResultDocument {
    pub fn report(suite_name: impl Into<String>, exit_code: i32) -> Self {
        Self {
            suite_name: suite_name.into(),
            outcome: Outcome::from_exit_code(exit_code),
        }
    }

    fn to_summary(&self) -> SummaryJson {
        let record = TestRecord {
            status: self.outcome,
            elapsed_time_ms: 0,
            output_snippet: String::new(),
        };
        SummaryJson {
            all_tests: vec![self.suite_name.clone()],
            disabled_tests: Vec::new(),
            global_tags: Vec::new(),
            per_iteration_data: vec![BTreeMap::from([(self.suite_name.clone(), vec![record])])],
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.to_summary()).context("Failed to serialize test results")
    }

    /// Writes the document to `path`, replacing whatever was there. Nothing
    /// is written when no path was requested.
    pub fn write(&self, path: Option<&Path>) -> Result<()> {
        let Some(path) = path else {
            return Ok(());
        };
        fs::write(path, self.to_json()?)
            .with_context(|| format!("Failed to write test results to {}", path.display()))?;
        info!("Wrote {} result for {} to {}", self.outcome, self.suite_name, path.display());
        Ok(())
    }
}
