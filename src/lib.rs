//! Typed query construction for SQLite
//!
//! Entities are described once with `#[derive(Entity)]`, which also
//! generates a `Q<Name>` path struct. Queries are composed from those paths,
//! rendered to parameterized SQL, and executed on a caller-supplied
//! connection:
//!
//! ```ignore
//! use querykit::prelude::*;
//!
//! let m = QMember::new("m");
//! let members = select_from(m)
//!     .filter(m.username.eq("m1").and(m.age.between(10, 30)))
//!     .order_by(m.age.desc())
//!     .fetch(&mut conn)
//!     .await?;
//! ```

extern crate self as querykit;

pub mod config;
pub mod error;
pub mod expr;
pub mod logging;
pub mod query;
pub mod sample;
pub mod schema;
pub mod store;
pub mod value;

pub use querykit_macros::Entity;

pub use error::{BuildError, QueryError};
pub use expr::{Expr, Expression, Predicate};
pub use query::{
    Join, Maybe, Projection, Query, QueryResults, RenderedQuery, SelectContext, Tuple,
    decode_entity, select, select_from, select_tuple,
};
pub use schema::{
    Association, AssociationDescriptor, AssociationKind, Column, Entity, EntityDescriptor,
    EntityPath, FieldDescriptor, Related, decode_nullable,
};
pub use store::{Session, Store};
pub use value::{RowReader, SqlType, SqlValue, ValueKind};

/// Everything needed to write queries.
pub mod prelude {
    pub use crate::error::{BuildError, QueryError};
    pub use crate::expr::{
        BooleanExpression, Expr, Expression, ExpressionExt, OrderSpecifier, Predicate,
        PredicateBuilder, StringExpression, all_of, any_of, case, constant, count_all,
    };
    pub use crate::query::{Query, QueryResults, Tuple, select, select_from, select_tuple};
    pub use crate::Entity;
    pub use crate::schema::{EntityPath, Related};
}
