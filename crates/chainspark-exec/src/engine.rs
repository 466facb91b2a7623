//! Sequential query-chain execution.
//!
//! A chain is an ordered list of SPARQL strings; later steps may embed
//! `INJECT(expr)` sites whose expressions reference variables bound by
//! earlier steps. Steps run strictly in order, and `previous_results` is
//! the only carried state — owned by one `run_chain` call, never shared.
//!
//! Failure policy (deliberate, see the error taxonomy below):
//!
//! - An expression that cannot be evaluated — unknown variable, syntax,
//!   arithmetic — resolves to `1` and the chain proceeds. The computed
//!   value usually feeds a `LIMIT`/`OFFSET`, where `0` would silently
//!   return nothing; `1` keeps the chain observable.
//! - Numeric injection results round to nearest and clamp to ≥ 1, same
//!   rationale.
//! - A step with no bindings logs a warning and the chain continues;
//!   later steps may not depend on it.
//! - An execution failure mid-chain is absorbed into the outcome
//!   (`has_data = false` plus the message). Only the single-query path
//!   propagates executor errors.

use std::collections::HashMap;

use tracing::{debug, error, warn};

use crate::executor::{ExecutionError, QueryExecutor, SparqlOutcome};
use crate::expr::{evaluate, Value};
use crate::inject::find_inject_sites;

/// Variable bindings accumulated across chain steps.
pub type PreviousResults = HashMap<String, Value>;

/// Final outcome of a chain run.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutcome {
    pub has_data: bool,
    /// The last step's raw result, when the chain ran to the end.
    pub result: Option<SparqlOutcome>,
    pub error: Option<String>,
    pub steps_run: usize,
}

pub struct SequentialEngine<'a, E: QueryExecutor + ?Sized> {
    executor: &'a E,
}

impl<'a, E: QueryExecutor + ?Sized> SequentialEngine<'a, E> {
    pub fn new(executor: &'a E) -> Self {
        Self { executor }
    }

    /// Execute a single, non-chained query.
    ///
    /// This is the one path that propagates executor errors: a lone
    /// failed query has no safe substitute result.
    pub async fn run_single(&self, sparql: &str) -> Result<SparqlOutcome, ExecutionError> {
        self.executor.execute(sparql).await
    }

    /// Execute an ordered chain of query steps.
    pub async fn run_chain(&self, steps: &[String]) -> ChainOutcome {
        let mut previous = PreviousResults::new();
        let mut last: Option<SparqlOutcome> = None;

        for (index, step) in steps.iter().enumerate() {
            let prepared = resolve_injections(step, &previous);
            match self.executor.execute(&prepared).await {
                Ok(outcome) => {
                    if outcome.rows().is_some_and(|rows| rows.is_empty()) {
                        warn!(step = index, "chain step returned no bindings");
                    }
                    absorb_first_row(&mut previous, &outcome);
                    last = Some(outcome);
                }
                Err(e) => {
                    error!(step = index, error = %e, "chain step failed");
                    return ChainOutcome {
                        has_data: false,
                        result: None,
                        error: Some(e.to_string()),
                        steps_run: index,
                    };
                }
            }
        }

        ChainOutcome {
            has_data: last.as_ref().is_some_and(|o| o.has_data()),
            result: last,
            error: None,
            steps_run: steps.len(),
        }
    }
}

/// Replace every `INJECT(...)` site in a step with its computed literal.
///
/// Replacement is per-site (first occurrence only per matched span): each
/// site's byte range is substituted exactly once, so a repeated expression
/// string can never be double-substituted.
pub fn resolve_injections(step: &str, previous: &PreviousResults) -> String {
    let sites = find_inject_sites(step);
    if sites.is_empty() {
        return step.to_string();
    }

    let mut out = String::with_capacity(step.len());
    let mut cursor = 0usize;
    for site in sites {
        let literal = resolve_expression(&site.expression, previous);
        debug!(
            expression = site.expression.as_str(),
            literal = literal.as_str(),
            "resolved injection"
        );
        out.push_str(&step[cursor..site.start]);
        out.push_str(&literal);
        cursor = site.end;
    }
    out.push_str(&step[cursor..]);
    out
}

/// Evaluate one injection expression, applying the safe-default policy.
fn resolve_expression(expression: &str, previous: &PreviousResults) -> String {
    match evaluate(expression, previous) {
        Ok(value) => coerce_to_literal(value),
        Err(e) => {
            error!(expression, error = %e, "injection evaluation failed, using default 1");
            "1".to_string()
        }
    }
}

/// Numeric results become integers, floored at 1. A `LIMIT 0` would
/// silently drop every row, which is worse than a slightly wrong bound.
fn coerce_to_literal(value: Value) -> String {
    match value {
        Value::Int(i) => i.max(1).to_string(),
        Value::Float(f) => (f.round() as i64).max(1).to_string(),
        Value::Str(s) => s,
    }
}

/// Fold the first result row into `previous_results`, overwriting earlier
/// bindings of the same names. ASK results bind the single key `boolean`
/// (as `1`/`0`, so later arithmetic can use it).
fn absorb_first_row(previous: &mut PreviousResults, outcome: &SparqlOutcome) {
    match outcome {
        SparqlOutcome::Bindings { results } => {
            let Some(row) = results.bindings.first() else {
                return;
            };
            for (name, text) in row {
                previous.insert(name.clone(), Value::parse_scalar(text));
            }
        }
        SparqlOutcome::Boolean { boolean } => {
            previous.insert("boolean".to_string(), Value::Int(i64::from(*boolean)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::BindingRow;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted executor: pops canned responses in order and records the
    /// exact SPARQL text it was asked to run.
    struct Scripted {
        responses: Mutex<Vec<Result<SparqlOutcome, ExecutionError>>>,
        executed: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<SparqlOutcome, ExecutionError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                executed: Mutex::new(Vec::new()),
            }
        }

        fn executed(&self) -> Vec<String> {
            self.executed.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl QueryExecutor for Scripted {
        async fn execute(&self, sparql: &str) -> Result<SparqlOutcome, ExecutionError> {
            self.executed.lock().expect("lock").push(sparql.to_string());
            let mut responses = self.responses.lock().expect("lock");
            if responses.is_empty() {
                return Ok(SparqlOutcome::from_rows(vec![]));
            }
            responses.remove(0)
        }
    }

    fn row(pairs: &[(&str, &str)]) -> BindingRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn chain_threads_bindings_into_later_steps() {
        let executor = Scripted::new(vec![
            Ok(SparqlOutcome::from_rows(vec![row(&[("total", "7")])])),
            Ok(SparqlOutcome::from_rows(vec![row(&[("b", "blk_5")])])),
        ]);
        let engine = SequentialEngine::new(&executor);

        let steps = vec![
            "SELECT (COUNT(?b) AS ?total) WHERE { ?b a blk:Block }".to_string(),
            "SELECT ?b WHERE { ?b a blk:Block } LIMIT INJECT(evaluate(total - 2))".to_string(),
        ];
        let outcome = engine.run_chain(&steps).await;

        assert!(outcome.has_data);
        assert_eq!(outcome.steps_run, 2);
        let executed = executor.executed();
        assert!(executed[1].ends_with("LIMIT 5"), "got: {}", executed[1]);
    }

    #[tokio::test]
    async fn reversed_chain_falls_back_to_the_default() {
        // Step order is load-bearing: with the dependent step first, its
        // variable is unbound and the default of 1 applies.
        let executor = Scripted::new(vec![
            Ok(SparqlOutcome::from_rows(vec![row(&[("b", "blk_5")])])),
            Ok(SparqlOutcome::from_rows(vec![row(&[("total", "7")])])),
        ]);
        let engine = SequentialEngine::new(&executor);

        let steps = vec![
            "SELECT ?b WHERE { ?b a blk:Block } LIMIT INJECT(evaluate(total - 2))".to_string(),
            "SELECT (COUNT(?b) AS ?total) WHERE { ?b a blk:Block }".to_string(),
        ];
        engine.run_chain(&steps).await;

        let executed = executor.executed();
        assert!(executed[0].ends_with("LIMIT 1"), "got: {}", executed[0]);
    }

    #[tokio::test]
    async fn results_below_one_are_clamped() {
        let previous = PreviousResults::from([("x".to_string(), Value::Int(3))]);
        let prepared = resolve_injections("LIMIT INJECT(evaluate(x - 10))", &previous);
        assert_eq!(prepared, "LIMIT 1");
    }

    #[tokio::test]
    async fn float_results_round_to_nearest() {
        let previous = PreviousResults::from([("x".to_string(), Value::Int(7))]);
        let prepared = resolve_injections("LIMIT INJECT(x / 2)", &previous);
        assert_eq!(prepared, "LIMIT 4");
    }

    #[tokio::test]
    async fn string_results_pass_through() {
        let previous = PreviousResults::from([(
            "pool".to_string(),
            Value::Str("pool1abc".to_string()),
        )]);
        let prepared = resolve_injections("FILTER(?id = INJECT(pool))", &previous);
        assert_eq!(prepared, "FILTER(?id = pool1abc)");
    }

    #[tokio::test]
    async fn empty_step_does_not_abort_the_chain() {
        let executor = Scripted::new(vec![
            Ok(SparqlOutcome::from_rows(vec![])),
            Ok(SparqlOutcome::from_rows(vec![row(&[("n", "1")])])),
        ]);
        let engine = SequentialEngine::new(&executor);

        let outcome = engine
            .run_chain(&["SELECT ?a".to_string(), "SELECT ?n".to_string()])
            .await;
        assert!(outcome.has_data);
        assert_eq!(outcome.steps_run, 2);
    }

    #[tokio::test]
    async fn mid_chain_failure_is_absorbed() {
        let executor = Scripted::new(vec![
            Ok(SparqlOutcome::from_rows(vec![row(&[("total", "7")])])),
            Err(ExecutionError::new(500, "endpoint fell over")),
        ]);
        let engine = SequentialEngine::new(&executor);

        let outcome = engine
            .run_chain(&["SELECT ?total".to_string(), "SELECT ?b".to_string()])
            .await;
        assert!(!outcome.has_data);
        assert_eq!(outcome.steps_run, 1);
        assert!(outcome.error.as_deref().is_some_and(|e| e.contains("endpoint fell over")));
    }

    #[tokio::test]
    async fn single_query_failures_propagate() {
        let executor = Scripted::new(vec![Err(ExecutionError::new(400, "parse error"))]);
        let engine = SequentialEngine::new(&executor);

        let err = engine.run_single("SELECT ?x").await.expect_err("should fail");
        assert_eq!(err.status, 400);
    }

    #[tokio::test]
    async fn ask_results_bind_the_boolean_key() {
        let executor = Scripted::new(vec![
            Ok(SparqlOutcome::boolean(true)),
            Ok(SparqlOutcome::from_rows(vec![row(&[("n", "1")])])),
        ]);
        let engine = SequentialEngine::new(&executor);

        let steps = vec![
            "ASK { ?b a blk:Block }".to_string(),
            "SELECT ?n WHERE { } LIMIT INJECT(boolean + 1)".to_string(),
        ];
        engine.run_chain(&steps).await;

        let executed = executor.executed();
        assert!(executed[1].ends_with("LIMIT 2"), "got: {}", executed[1]);
    }

    #[tokio::test]
    async fn later_rows_overwrite_earlier_bindings() {
        let executor = Scripted::new(vec![
            Ok(SparqlOutcome::from_rows(vec![row(&[("n", "2")])])),
            Ok(SparqlOutcome::from_rows(vec![row(&[("n", "9")])])),
            Ok(SparqlOutcome::from_rows(vec![row(&[("b", "x")])])),
        ]);
        let engine = SequentialEngine::new(&executor);

        let steps = vec![
            "SELECT ?n -- first".to_string(),
            "SELECT ?n -- second".to_string(),
            "SELECT ?b LIMIT INJECT(n)".to_string(),
        ];
        engine.run_chain(&steps).await;

        let executed = executor.executed();
        assert!(executed[2].ends_with("LIMIT 9"), "got: {}", executed[2]);
    }
}
