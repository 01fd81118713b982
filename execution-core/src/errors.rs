//! Error kinds shared across the execution core.
//!
//! Construction failures (bad identifiers, malformed decimals) and runtime
//! failures (unknown order ids, duplicate entities, illegal state
//! transitions) both flow through [`ExecutionError`]. Handlers that can
//! recover (an event referring to an order the database has never seen)
//! match on [`ExecutionError::UnknownEntity`] explicitly and log instead of
//! propagating; everything else is expected to bubble up to the caller.

use crate::ids::OrderId;
use crate::order::OrderStatus;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("unknown {kind}: {id}")]
    UnknownEntity { kind: &'static str, id: String },

    #[error("duplicate {kind}: {id}")]
    DuplicateEntity { kind: &'static str, id: String },

    #[error("order {order_id} cannot transition from {from:?} via {event}")]
    StateTransitionNotAllowed {
        order_id: OrderId,
        from: OrderStatus,
        event: String,
    },

    #[error("incompatible currencies: {lhs} vs {rhs}")]
    IncompatibleCurrency { lhs: String, rhs: String },

    #[error("not connected")]
    NotConnected,
}

impl ExecutionError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        ExecutionError::InvalidArgument(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        ExecutionError::InvariantViolation(msg.into())
    }

    pub fn unknown(kind: &'static str, id: impl Into<String>) -> Self {
        ExecutionError::UnknownEntity { kind, id: id.into() }
    }

    pub fn duplicate(kind: &'static str, id: impl Into<String>) -> Self {
        ExecutionError::DuplicateEntity { kind, id: id.into() }
    }
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;
