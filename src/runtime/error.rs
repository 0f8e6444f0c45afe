//! Runtime error types.

use thiserror::Error;

use super::store::ConstraintId;

/// Errors surfaced by the runtime stores and by generated solver code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// A public entry was called with an arity that was never declared.
    #[error("undefined constraint: {symbol}/{arity}")]
    UndefinedConstraint { symbol: String, arity: usize },

    /// A body built-in asserted failure; aborts the surrounding query.
    #[error("false: {}", messages.join(", "))]
    False { messages: Vec<String> },

    /// Attempt to bind a variable that already holds a different value.
    #[error("variable {index} is already bound")]
    BoundVariable { index: usize },

    /// A value was required from a variable that holds none.
    #[error("variable {index} is not bound")]
    UnboundVariable { index: usize },

    /// A variable index that was never allocated by this store.
    #[error("unknown variable index {index}")]
    UnknownVariable { index: usize },

    /// A constraint ID that was never allocated by this store.
    #[error("unknown constraint id {0}")]
    UnknownConstraint(ConstraintId),

    /// `insert` was called twice with the same ID.
    #[error("constraint id {0} already in use")]
    DuplicateConstraint(ConstraintId),

    /// A malformed reference inside generated or interpreted solver code.
    #[error("internal solver error: {0}")]
    Internal(String),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
