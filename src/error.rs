//! Error types for query construction and execution

use thiserror::Error;

use crate::value::ValueKind;

/// A problem with how a query was put together.
///
/// Recorded inside the query descriptor when the builder is misused and
/// surfaced when the query is rendered or executed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("field `{entity}.{field}` is {found}, not {expected}")]
    TypeMismatch {
        entity: &'static str,
        field: String,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("entity `{entity}` has no field `{field}`")]
    UnknownField { entity: &'static str, field: String },

    #[error("invalid join: {0}")]
    InvalidJoin(String),

    #[error("unsupported construct: {0}")]
    Unsupported(String),

    #[error("query projection is empty")]
    EmptyProjection,

    #[error("query has no source entity")]
    MissingSource,
}

/// Errors returned by terminal query operations.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("expected at most one row, query returned {rows}")]
    NonUniqueResult { rows: usize },

    #[error("unexpected NULL for a non-nullable {expected} value")]
    UnexpectedNull { expected: ValueKind },

    #[error("cannot decode {found} as {expected}")]
    Decode { expected: ValueKind, found: String },

    #[error("expression is not part of the projection: {0}")]
    NotInProjection(String),

    #[error(transparent)]
    Execution(#[from] sqlx::Error),
}
