//! Query-executor collaborator contract.
//!
//! The engine never talks to a triple store directly; it hands a SPARQL
//! string to an implementation of [`QueryExecutor`] and gets back either
//! result bindings (SELECT) or a boolean (ASK).

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured execution failure from the endpoint.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("query execution failed (status {status}): {message}")]
pub struct ExecutionError {
    pub status: u16,
    pub message: String,
}

impl ExecutionError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// One result row: variable name → bound value text.
pub type BindingRow = BTreeMap<String, String>;

/// Result of executing one SPARQL string, mirroring the SPARQL JSON
/// results shape (`{"results": {"bindings": [...]}}` or
/// `{"boolean": ...}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SparqlOutcome {
    Bindings { results: BindingResults },
    Boolean { boolean: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingResults {
    pub bindings: Vec<BindingRow>,
}

impl SparqlOutcome {
    pub fn from_rows(rows: Vec<BindingRow>) -> Self {
        SparqlOutcome::Bindings {
            results: BindingResults { bindings: rows },
        }
    }

    pub fn boolean(value: bool) -> Self {
        SparqlOutcome::Boolean { boolean: value }
    }

    pub fn rows(&self) -> Option<&[BindingRow]> {
        match self {
            SparqlOutcome::Bindings { results } => Some(&results.bindings),
            SparqlOutcome::Boolean { .. } => None,
        }
    }

    /// Whether this outcome carries an answer worth returning.
    pub fn has_data(&self) -> bool {
        match self {
            SparqlOutcome::Bindings { results } => !results.bindings.is_empty(),
            SparqlOutcome::Boolean { .. } => true,
        }
    }
}

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sparql: &str) -> Result<SparqlOutcome, ExecutionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_json_matches_the_sparql_results_shape() {
        let outcome = SparqlOutcome::from_rows(vec![BindingRow::from([(
            "height".to_string(),
            "42".to_string(),
        )])]);
        let json = serde_json::to_value(&outcome).expect("encode");
        assert_eq!(
            json,
            serde_json::json!({ "results": { "bindings": [ { "height": "42" } ] } })
        );

        let ask = SparqlOutcome::boolean(true);
        let json = serde_json::to_value(&ask).expect("encode");
        assert_eq!(json, serde_json::json!({ "boolean": true }));
    }

    #[test]
    fn untagged_decoding_picks_the_right_variant() {
        let outcome: SparqlOutcome =
            serde_json::from_value(serde_json::json!({ "boolean": false })).expect("decode");
        assert_eq!(outcome, SparqlOutcome::boolean(false));
        assert!(outcome.has_data());

        let outcome: SparqlOutcome =
            serde_json::from_value(serde_json::json!({ "results": { "bindings": [] } }))
                .expect("decode");
        assert!(!outcome.has_data());
    }
}
