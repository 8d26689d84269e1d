//! Cache error types.

use thiserror::Error;

/// Errors raised by cache registration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// Registering the link would make `id` its own ancestor.
    #[error("Parent link {id} -> {parent} would create a cycle")]
    ParentCycle { id: String, parent: String },
}
