//! Integration tests driving the resolver through in-memory ports.


mod elements;
mod functions;
mod substitutions;

use blueprint_resolve::errors::{ReasonCode, ResolveError};

/// The reason code of a hard run error, if the error is one.
pub fn run_reason(err: &ResolveError) -> Option<ReasonCode> {
    match err {
        ResolveError::Run(run) => Some(run.reason),
        _ => None,
    }
}
