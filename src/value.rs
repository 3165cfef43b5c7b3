//! Runtime values and the Rust types that map onto them
//!
//! SQLite only knows a handful of storage classes. [`SqlType`] ties each
//! supported Rust type to one of them so expressions can be typed at compile
//! time and decoded from rows at runtime.

use std::fmt;

use serde::Serialize;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, ValueRef};

use crate::error::QueryError;

/// Storage class of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Integer,
    Real,
    Text,
    /// Stored as INTEGER 0/1
    Boolean,
}

impl ValueKind {
    /// Column type used in `CREATE TABLE`.
    pub const fn sql_type(self) -> &'static str {
        match self {
            ValueKind::Integer | ValueKind::Boolean => "INTEGER",
            ValueKind::Real => "REAL",
            ValueKind::Text => "TEXT",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Integer => "integer",
            ValueKind::Real => "real",
            ValueKind::Text => "text",
            ValueKind::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

/// Represents a SQL value that can be bound to a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl SqlValue {
    /// Bind this value to a sqlx query builder at the next parameter index
    pub fn bind_to_query<'q>(
        &'q self,
        query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
        match self {
            SqlValue::String(s) => query.bind(s.as_str()),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Bool(b) => query.bind(if *b { 1i32 } else { 0i32 }),
            SqlValue::Null => query.bind(None::<String>),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::String(s) => write!(f, "{s}"),
            SqlValue::Int(i) => write!(f, "{i}"),
            SqlValue::Float(v) => write!(f, "{v}"),
            SqlValue::Bool(b) => write!(f, "{b}"),
            SqlValue::Null => f.write_str("null"),
        }
    }
}

fn decode_error(expected: ValueKind, found: &SqlValue) -> QueryError {
    match found {
        SqlValue::Null => QueryError::UnexpectedNull { expected },
        other => QueryError::Decode {
            expected,
            found: format!("{other:?}"),
        },
    }
}

/// A Rust type that can be stored in, compared against and decoded from a
/// column.
pub trait SqlType: Sized + Send + Sync + 'static {
    const KIND: ValueKind;

    /// The type with any `Option` wrapper removed.
    type Base: SqlType;

    /// `B` with this type's nullability: `B` itself for plain types,
    /// `Option<B>` for optional ones.
    type Rebase<B: SqlType>: SqlType;

    const NULLABLE: bool = false;

    fn from_sql(value: SqlValue) -> Result<Self, QueryError>;

    fn to_sql(&self) -> SqlValue;
}

impl SqlType for i64 {
    type Base = i64;
    type Rebase<B: SqlType> = B;
    const KIND: ValueKind = ValueKind::Integer;

    fn from_sql(value: SqlValue) -> Result<Self, QueryError> {
        match value {
            SqlValue::Int(i) => Ok(i),
            SqlValue::Bool(b) => Ok(i64::from(b)),
            other => Err(decode_error(Self::KIND, &other)),
        }
    }

    fn to_sql(&self) -> SqlValue {
        SqlValue::Int(*self)
    }
}

impl SqlType for i32 {
    type Base = i32;
    type Rebase<B: SqlType> = B;
    const KIND: ValueKind = ValueKind::Integer;

    fn from_sql(value: SqlValue) -> Result<Self, QueryError> {
        match value {
            SqlValue::Int(i) => i32::try_from(i).map_err(|_| QueryError::Decode {
                expected: Self::KIND,
                found: format!("{i} (out of range for i32)"),
            }),
            other => Err(decode_error(Self::KIND, &other)),
        }
    }

    fn to_sql(&self) -> SqlValue {
        SqlValue::Int(i64::from(*self))
    }
}

impl SqlType for f64 {
    type Base = f64;
    type Rebase<B: SqlType> = B;
    const KIND: ValueKind = ValueKind::Real;

    fn from_sql(value: SqlValue) -> Result<Self, QueryError> {
        match value {
            SqlValue::Float(f) => Ok(f),
            SqlValue::Int(i) => Ok(i as f64),
            other => Err(decode_error(Self::KIND, &other)),
        }
    }

    fn to_sql(&self) -> SqlValue {
        SqlValue::Float(*self)
    }
}

impl SqlType for bool {
    type Base = bool;
    type Rebase<B: SqlType> = B;
    const KIND: ValueKind = ValueKind::Boolean;

    fn from_sql(value: SqlValue) -> Result<Self, QueryError> {
        match value {
            SqlValue::Bool(b) => Ok(b),
            SqlValue::Int(i) => Ok(i != 0),
            other => Err(decode_error(Self::KIND, &other)),
        }
    }

    fn to_sql(&self) -> SqlValue {
        SqlValue::Bool(*self)
    }
}

impl SqlType for String {
    type Base = String;
    type Rebase<B: SqlType> = B;
    const KIND: ValueKind = ValueKind::Text;

    fn from_sql(value: SqlValue) -> Result<Self, QueryError> {
        match value {
            SqlValue::String(s) => Ok(s),
            other => Err(decode_error(Self::KIND, &other)),
        }
    }

    fn to_sql(&self) -> SqlValue {
        SqlValue::String(self.clone())
    }
}

impl<T: SqlType> SqlType for Option<T> {
    type Base = T::Base;
    type Rebase<B: SqlType> = Option<B::Base>;
    const KIND: ValueKind = T::KIND;
    const NULLABLE: bool = true;

    fn from_sql(value: SqlValue) -> Result<Self, QueryError> {
        match value {
            SqlValue::Null => Ok(None),
            other => T::from_sql(other).map(Some),
        }
    }

    fn to_sql(&self) -> SqlValue {
        match self {
            Some(value) => value.to_sql(),
            None => SqlValue::Null,
        }
    }
}

/// Types that support arithmetic and the `SUM`/`AVG` aggregates.
pub trait Numeric: SqlType {
    /// Result type of `SUM` over this type.
    type Sum: SqlType;
}

impl Numeric for i32 {
    type Sum = i64;
}

impl Numeric for i64 {
    type Sum = i64;
}

impl Numeric for f64 {
    type Sum = f64;
}

impl<T: Numeric> Numeric for Option<T> {
    type Sum = Option<T::Sum>;
}

/// Result type of arithmetic between two numeric base types: integers widen
/// to `i64` when mixed and anything involving `f64` is `f64`.
pub trait Promote<U> {
    type Output: SqlType;
}

macro_rules! promote {
    ($($lhs:ty, $rhs:ty => $out:ty);+ $(;)?) => {
        $(impl Promote<$rhs> for $lhs {
            type Output = $out;
        })+
    };
}

promote! {
    i32, i32 => i32;
    i32, i64 => i64;
    i32, f64 => f64;
    i64, i32 => i64;
    i64, i64 => i64;
    i64, f64 => f64;
    f64, i32 => f64;
    f64, i64 => f64;
    f64, f64 => f64;
}

/// Arithmetic between `Self` and `U`. The result is nullable when either
/// side is.
pub trait NumericWith<U: SqlType>: Numeric {
    type Output: SqlType;
}

impl<T, U> NumericWith<U> for T
where
    T: Numeric,
    U: SqlType,
    T::Base: Promote<U::Base>,
{
    type Output = T::Rebase<U::Rebase<<T::Base as Promote<U::Base>>::Output>>;
}

/// Marks base value types that may be compared with `T`.
///
/// Numbers compare with numbers; text and booleans only with themselves.
/// Nullability is stripped through [`SqlType::Base`] before the check.
pub trait Comparable<T> {}

macro_rules! comparable {
    ($($lhs:ty => [$($rhs:ty),+]);+ $(;)?) => {
        $($(impl Comparable<$rhs> for $lhs {})+)+
    };
}

comparable! {
    i32 => [i32, i64, f64];
    i64 => [i32, i64, f64];
    f64 => [i32, i64, f64];
    String => [String];
    bool => [bool];
}

/// `T` and `U` may appear on either side of a comparison.
pub trait ComparableWith<U: SqlType>: SqlType {}

impl<T, U> ComparableWith<U> for T
where
    T: SqlType,
    U: SqlType,
    T::Base: Comparable<U::Base>,
{
}

/// Values that can be written as a literal.
pub trait IntoLiteral {
    type Value: SqlType;

    fn into_literal(self) -> SqlValue;
}

impl IntoLiteral for &str {
    type Value = String;

    fn into_literal(self) -> SqlValue {
        SqlValue::String(self.to_owned())
    }
}

macro_rules! owned_literal {
    ($($ty:ty),+) => {
        $(impl IntoLiteral for $ty {
            type Value = $ty;

            fn into_literal(self) -> SqlValue {
                self.to_sql()
            }
        })+
    };
}

owned_literal!(String, i32, i64, f64, bool);

/// Reads the columns of one result row in order.
pub struct RowReader<'r> {
    row: &'r SqliteRow,
    position: usize,
}

impl<'r> RowReader<'r> {
    pub fn new(row: &'r SqliteRow) -> Self {
        Self { row, position: 0 }
    }

    /// Index of the next column to be read.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Decode the next column as `T`.
    pub fn read<T: SqlType>(&mut self) -> Result<T, QueryError> {
        let value = self.read_value(T::KIND)?;
        T::from_sql(value)
    }

    /// Decode the next column according to its expected storage class.
    pub fn read_value(&mut self, kind: ValueKind) -> Result<SqlValue, QueryError> {
        let index = self.position;
        self.position += 1;

        // SQLite is dynamically typed, so decode by the kind the expression
        // promises and let SQLite coerce the stored value.
        let value = match kind {
            ValueKind::Integer | ValueKind::Boolean => self
                .row
                .try_get_unchecked::<Option<i64>, _>(index)?
                .map(SqlValue::Int),
            ValueKind::Real => self
                .row
                .try_get_unchecked::<Option<f64>, _>(index)?
                .map(SqlValue::Float),
            ValueKind::Text => self
                .row
                .try_get_unchecked::<Option<String>, _>(index)?
                .map(SqlValue::String),
        };

        Ok(value.unwrap_or(SqlValue::Null))
    }

    /// Whether the column `offset` places ahead of the cursor is NULL.
    pub fn is_null_at(&self, offset: usize) -> Result<bool, QueryError> {
        let raw = self.row.try_get_raw(self.position + offset)?;
        Ok(raw.is_null())
    }

    pub fn skip(&mut self, columns: usize) {
        self.position += columns;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn same_type<A: 'static, B: 'static>() -> bool {
        std::any::TypeId::of::<A>() == std::any::TypeId::of::<B>()
    }

    #[test]
    fn test_arithmetic_promotion() {
        assert!(same_type::<<i32 as NumericWith<i32>>::Output, i32>());
        assert!(same_type::<<i32 as NumericWith<i64>>::Output, i64>());
        assert!(same_type::<<i32 as NumericWith<f64>>::Output, f64>());
        assert!(same_type::<<f64 as NumericWith<i64>>::Output, f64>());
    }

    #[test]
    fn test_arithmetic_keeps_nullability() {
        assert!(same_type::<<Option<i32> as NumericWith<f64>>::Output, Option<f64>>());
        assert!(same_type::<<i64 as NumericWith<Option<i32>>>::Output, Option<i64>>());
        assert!(same_type::<<Option<i64> as NumericWith<Option<f64>>>::Output, Option<f64>>());
    }

    #[test]
    fn test_rebase() {
        assert!(same_type::<<String as SqlType>::Rebase<i64>, i64>());
        assert!(same_type::<<Option<String> as SqlType>::Rebase<i64>, Option<i64>>());
        assert!(same_type::<<Option<i32> as SqlType>::Rebase<Option<String>>, Option<String>>());
    }

    #[test]
    fn test_integer_conversions() {
        assert_eq!(i64::from_sql(SqlValue::Int(42)).unwrap(), 42);
        assert_eq!(i32::from_sql(SqlValue::Int(15)).unwrap(), 15);
        assert_matches!(
            i32::from_sql(SqlValue::Int(i64::MAX)),
            Err(QueryError::Decode { .. })
        );
    }

    #[test]
    fn test_real_accepts_integers() {
        assert_eq!(f64::from_sql(SqlValue::Int(18)).unwrap(), 18.0);
        assert_eq!(f64::from_sql(SqlValue::Float(37.5)).unwrap(), 37.5);
    }

    #[test]
    fn test_boolean_from_integer() {
        assert!(bool::from_sql(SqlValue::Int(1)).unwrap());
        assert!(!bool::from_sql(SqlValue::Int(0)).unwrap());
        assert_eq!(true.to_sql(), SqlValue::Bool(true));
    }

    #[test]
    fn test_null_handling() {
        assert_matches!(
            String::from_sql(SqlValue::Null),
            Err(QueryError::UnexpectedNull {
                expected: ValueKind::Text
            })
        );
        assert_eq!(Option::<String>::from_sql(SqlValue::Null).unwrap(), None);
        assert_eq!(
            Option::<String>::from_sql(SqlValue::String("m1".into())).unwrap(),
            Some("m1".to_string())
        );
        assert_eq!(None::<i32>.to_sql(), SqlValue::Null);
    }

    #[test]
    fn test_kind_mismatch() {
        assert_matches!(
            String::from_sql(SqlValue::Int(3)),
            Err(QueryError::Decode {
                expected: ValueKind::Text,
                ..
            })
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!("A".into_literal(), SqlValue::String("A".into()));
        assert_eq!(15.into_literal(), SqlValue::Int(15));
        assert_eq!(Option::<i32>::KIND, ValueKind::Integer);
    }
}
