//! Query result normalization.
//!
//! Turns the text of a query into an ordered list of rendered result atoms,
//! whichever shape the engine produced: a realized collection is rendered as
//! is, a deferred stream is waited on until closed and then drained.

use std::sync::Arc;
use std::time::Duration;

use crate::atom::AtomSpace;
use crate::atom::pattern;
use crate::atom::sexpr::parse_expression;
use crate::error::HubResult;

pub use crate::atom::pattern::ResultValue;

/// Parse `text` into `store`, execute it, and render the results.
///
/// A well-formed expression that is not a query is removed again and yields
/// no results. `wait` bounds the time spent waiting on a deferred stream.
pub fn execute(
    store: &Arc<AtomSpace>,
    text: &str,
    wait: Option<Duration>,
) -> HubResult<Vec<String>> {
    let expr = parse_expression(text, store)?;

    if !pattern::is_executable(store, expr.root) {
        store.discard(&expr);
        tracing::warn!(
            expression = text.trim(),
            "not a pattern matching query; only send pattern matching queries to execute"
        );
        return Ok(Vec::new());
    }

    let handles = match pattern::execute(store, expr.root)? {
        ResultValue::Realized(handles) => handles,
        ResultValue::Deferred(queue) => queue.wait_and_take_all(wait)?,
    };

    let table = store.read();
    Ok(handles.into_iter().filter_map(|h| table.render(h)).collect())
}
