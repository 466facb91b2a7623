//! Chainspark sequential query execution.
//!
//! Some cached answers are *chains*: an ordered list of SPARQL queries in
//! which a later step's `LIMIT`/`OFFSET`/filter values are computed from an
//! earlier step's result bindings. A step marks such a value with an
//! `INJECT(expr)` site:
//!
//! ```text
//!   step 1: SELECT (COUNT(?b) AS ?total) WHERE { ?b a blk:Block }
//!   step 2: SELECT ?b WHERE { ?b a blk:Block } LIMIT INJECT(total - 2)
//! ```
//!
//! The engine runs steps strictly in order, carrying each step's first
//! result row forward, and evaluates injected expressions in a closed
//! arithmetic grammar ([`expr`]) — never a general-purpose eval, since the
//! expression text ultimately traces back to LLM output.
//!
//! Failure policy: inside a chain, everything degrades to a usable value
//! (`1` for an unevaluable expression, a warning for an empty step, an
//! absorbed error outcome for a failed step). Only [`SequentialEngine::run_single`]
//! lets executor errors propagate.

pub mod engine;
pub mod executor;
pub mod expr;
pub mod inject;

pub use engine::{resolve_injections, ChainOutcome, PreviousResults, SequentialEngine};
pub use executor::{BindingResults, BindingRow, ExecutionError, QueryExecutor, SparqlOutcome};
pub use expr::{evaluate, EvalError, Value, ALLOWED_FUNCTIONS};
pub use inject::{find_inject_sites, InjectSite};
