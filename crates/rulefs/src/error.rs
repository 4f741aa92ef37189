//! Structural errors raised when building rules.
//!
//! Runtime filesystem errors travel as `std::io::Error` so overlays compose
//! with the rest of the stack; only rule construction gets its own type, so
//! a malformed rule fails loudly before it is ever mounted.

use thiserror::Error;

/// Errors detected while constructing a [`Rule`](crate::Rule).
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule does not contain a target")]
    EmptyTarget,
    #[error("rule does not contain any sources")]
    NoSources,
    #[error("rule target may not be a glob: {0}")]
    GlobTarget(String),
}
