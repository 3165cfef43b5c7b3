//! Typed expression tree
//!
//! Every expression is an immutable [`Node`] tagged with the Rust type it
//! evaluates to. Combinators consume their inputs and return new
//! expressions; nothing is ever mutated in place.
//!
//! ```ignore
//! let m = QMember::new("m");
//! let predicate = m.username.eq("member1").and(m.age.between(10, 30));
//! ```

mod case;
mod order;
mod predicate;

pub use case::{CaseBuilder, CaseNext, CaseThen, CaseWhen, case};
pub use order::{NullHandling, OrderDirection, OrderSpecifier};
pub use predicate::{PredicateBuilder, all_of, any_of};

use std::fmt;
use std::marker::PhantomData;

use crate::query::{AnyExpr, Select};
use crate::schema::Column;
use crate::value::{ComparableWith, IntoLiteral, Numeric, NumericWith, SqlType, SqlValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn to_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    pub fn to_sql(self) -> &'static str {
        match self {
            LogicalOp::And => "AND",
            LogicalOp::Or => "OR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl ArithmeticOp {
    pub fn to_sql(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Subtract => "-",
            ArithmeticOp::Multiply => "*",
            ArithmeticOp::Divide => "/",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Max,
    Min,
}

impl AggregateFunc {
    pub fn to_sql(self) -> &'static str {
        match self {
            AggregateFunc::Count => "COUNT",
            AggregateFunc::Sum => "SUM",
            AggregateFunc::Avg => "AVG",
            AggregateFunc::Max => "MAX",
            AggregateFunc::Min => "MIN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarFunc {
    Lower,
    Upper,
    Length,
}

impl ScalarFunc {
    pub fn to_sql(self) -> &'static str {
        match self {
            ScalarFunc::Lower => "LOWER",
            ScalarFunc::Upper => "UPPER",
            ScalarFunc::Length => "LENGTH",
        }
    }
}

/// Right-hand side of `IN`.
#[derive(Debug, Clone, PartialEq)]
pub enum InSet {
    List(Vec<Node>),
    Subquery(Box<Select>),
}

/// Untyped expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Column {
        alias: &'static str,
        name: &'static str,
    },
    Literal(SqlValue),
    Compare {
        op: CompareOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Between {
        operand: Box<Node>,
        low: Box<Node>,
        high: Box<Node>,
    },
    In {
        operand: Box<Node>,
        set: InSet,
        negated: bool,
    },
    IsNull {
        operand: Box<Node>,
        negated: bool,
    },
    Like {
        operand: Box<Node>,
        pattern: Box<Node>,
        /// Pattern uses `\` to escape wildcards
        escaped: bool,
    },
    Logical {
        op: LogicalOp,
        operands: Vec<Node>,
    },
    Not(Box<Node>),
    Arithmetic {
        op: ArithmeticOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    /// `arg` of `None` is `COUNT(*)`
    Aggregate {
        func: AggregateFunc,
        arg: Option<Box<Node>>,
        distinct: bool,
    },
    Case {
        operand: Option<Box<Node>>,
        branches: Vec<(Node, Node)>,
        otherwise: Option<Box<Node>>,
    },
    Concat(Vec<Node>),
    /// `CAST(operand AS TEXT)`
    Text(Box<Node>),
    Function {
        func: ScalarFunc,
        args: Vec<Node>,
    },
    Subquery(Box<Select>),
}

impl Node {
    pub(crate) fn compare(op: CompareOp, left: Node, right: Node) -> Node {
        Node::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Combine two predicates, flattening nested runs of the same operator.
    pub(crate) fn logical(op: LogicalOp, left: Node, right: Node) -> Node {
        let mut operands = Vec::new();
        for node in [left, right] {
            match node {
                Node::Logical {
                    op: inner,
                    operands: nested,
                } if inner == op => operands.extend(nested),
                other => operands.push(other),
            }
        }
        Node::Logical { op, operands }
    }

    pub(crate) fn aggregate(func: AggregateFunc, arg: Node) -> Node {
        Node::Aggregate {
            func,
            arg: Some(Box::new(arg)),
            distinct: false,
        }
    }

    pub(crate) fn aggregate_count(arg: Node, distinct: bool) -> Node {
        Node::Aggregate {
            func: AggregateFunc::Count,
            arg: Some(Box::new(arg)),
            distinct,
        }
    }

    pub(crate) fn arithmetic(op: ArithmeticOp, left: Node, right: Node) -> Node {
        Node::Arithmetic {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Whether the node contains an aggregate outside any subquery.
    pub fn is_aggregate(&self) -> bool {
        match self {
            Node::Aggregate { .. } => true,
            Node::Column { .. } | Node::Literal(_) | Node::Subquery(_) => false,
            Node::Compare { left, right, .. } | Node::Arithmetic { left, right, .. } => {
                left.is_aggregate() || right.is_aggregate()
            }
            Node::Between { operand, low, high } => {
                operand.is_aggregate() || low.is_aggregate() || high.is_aggregate()
            }
            Node::In { operand, .. } | Node::IsNull { operand, .. } | Node::Like { operand, .. } => {
                operand.is_aggregate()
            }
            Node::Not(inner) | Node::Text(inner) => inner.is_aggregate(),
            Node::Logical { operands, .. } | Node::Concat(operands) => {
                operands.iter().any(Node::is_aggregate)
            }
            Node::Function { args, .. } => args.iter().any(Node::is_aggregate),
            Node::Case {
                operand,
                branches,
                otherwise,
            } => {
                operand.as_ref().is_some_and(|n| n.is_aggregate())
                    || branches
                        .iter()
                        .any(|(when, then)| when.is_aggregate() || then.is_aggregate())
                    || otherwise.as_ref().is_some_and(|n| n.is_aggregate())
            }
        }
    }
}

/// An expression evaluating to `T`.
pub struct Expr<T> {
    node: Node,
    _marker: PhantomData<fn() -> T>,
}

/// A boolean expression usable in `filter`, `having` and `on`.
pub type Predicate = Expr<bool>;

impl<T> Expr<T> {
    pub(crate) fn from_node(node: Node) -> Self {
        Self {
            node,
            _marker: PhantomData,
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }
}

impl<T> Clone for Expr<T> {
    fn clone(&self) -> Self {
        Self::from_node(self.node.clone())
    }
}

impl<T> fmt::Debug for Expr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.node.fmt(f)
    }
}

/// Anything that renders to a typed SQL expression.
pub trait Expression {
    type Value: SqlType;

    fn to_node(&self) -> Node;

    fn into_node(self) -> Node
    where
        Self: Sized,
    {
        self.to_node()
    }
}

impl<T: SqlType> Expression for Column<T> {
    type Value = T;

    fn to_node(&self) -> Node {
        Node::Column {
            alias: self.alias(),
            name: self.name(),
        }
    }
}

impl<T: SqlType> Expression for Expr<T> {
    type Value = T;

    fn to_node(&self) -> Node {
        self.node.clone()
    }

    fn into_node(self) -> Node {
        self.node
    }
}

/// A value that may stand on the right of a comparison with a `T`.
pub trait Operand<T> {
    /// What the operand itself evaluates to.
    type Value: SqlType;

    fn into_operand(self) -> Node;
}

macro_rules! literal_operand {
    ($($ty:ty),+) => {
        $(impl<T: ComparableWith<$ty>> Operand<T> for $ty {
            type Value = $ty;

            fn into_operand(self) -> Node {
                Node::Literal(self.to_sql())
            }
        })+
    };
}

literal_operand!(i32, i64, f64, bool, String);

impl<T: ComparableWith<String>> Operand<T> for &str {
    type Value = String;

    fn into_operand(self) -> Node {
        Node::Literal(SqlValue::String(self.to_owned()))
    }
}

impl<T, U> Operand<T> for Column<U>
where
    T: ComparableWith<U>,
    U: SqlType,
{
    type Value = U;

    fn into_operand(self) -> Node {
        self.into_node()
    }
}

impl<T, U> Operand<T> for Expr<U>
where
    T: ComparableWith<U>,
    U: SqlType,
{
    type Value = U;

    fn into_operand(self) -> Node {
        self.node
    }
}

/// Right-hand side of `is_in`/`not_in`.
pub trait InOperand<T> {
    fn into_in_set(self) -> InSet;
}

impl<T, L: Operand<T>> InOperand<T> for Vec<L> {
    fn into_in_set(self) -> InSet {
        InSet::List(self.into_iter().map(Operand::into_operand).collect())
    }
}

impl<T, L: Operand<T>, const N: usize> InOperand<T> for [L; N] {
    fn into_in_set(self) -> InSet {
        InSet::List(self.into_iter().map(Operand::into_operand).collect())
    }
}

/// A value or expression usable as a case branch result.
pub trait IntoExpr {
    type Value: SqlType;

    fn into_expr(self) -> Expr<Self::Value>;
}

macro_rules! literal_into_expr {
    ($($ty:ty),+) => {
        $(impl IntoExpr for $ty {
            type Value = <$ty as IntoLiteral>::Value;

            fn into_expr(self) -> Expr<Self::Value> {
                constant(self)
            }
        })+
    };
}

literal_into_expr!(String, i32, i64, f64, bool);

impl IntoExpr for &str {
    type Value = String;

    fn into_expr(self) -> Expr<String> {
        constant(self)
    }
}

impl<T: SqlType> IntoExpr for Column<T> {
    type Value = T;

    fn into_expr(self) -> Expr<T> {
        Expr::from_node(self.into_node())
    }
}

impl<T: SqlType> IntoExpr for Expr<T> {
    type Value = T;

    fn into_expr(self) -> Expr<T> {
        self
    }
}

/// A literal projected or compared as an expression.
pub fn constant<L: IntoLiteral>(value: L) -> Expr<L::Value> {
    Expr::from_node(Node::Literal(value.into_literal()))
}

/// `COUNT(*)` over the rows of the query.
pub fn count_all() -> Expr<i64> {
    Expr::from_node(Node::Aggregate {
        func: AggregateFunc::Count,
        arg: None,
        distinct: false,
    })
}

/// Operators available on every expression.
///
/// Operands are checked against the value type at compile time:
///
/// ```
/// use querykit::prelude::*;
/// use querykit::sample::QMember;
///
/// let m = QMember::new("m");
/// let adults = m.age.goe(18).and(m.username.is_not_null());
/// let total = m.age.sum().add(0.5);
/// ```
///
/// Text does not compare with numbers:
///
/// ```compile_fail
/// use querykit::prelude::*;
/// use querykit::sample::QMember;
///
/// let m = QMember::new("m");
/// let wrong = m.age.eq("x");
/// ```
///
/// Only numeric values aggregate with `sum`:
///
/// ```compile_fail
/// use querykit::prelude::*;
/// use querykit::sample::QMember;
///
/// let m = QMember::new("m");
/// let wrong = m.username.sum();
/// ```
///
/// String operators need a text operand:
///
/// ```compile_fail
/// use querykit::prelude::*;
/// use querykit::sample::QMember;
///
/// let m = QMember::new("m");
/// let wrong = m.age.like("1%");
/// ```
pub trait ExpressionExt: Expression + Sized {
    fn eq<O: Operand<Self::Value>>(self, other: O) -> Predicate {
        compare(CompareOp::Eq, self, other)
    }

    fn ne<O: Operand<Self::Value>>(self, other: O) -> Predicate {
        compare(CompareOp::Ne, self, other)
    }

    fn lt<O: Operand<Self::Value>>(self, other: O) -> Predicate {
        compare(CompareOp::Lt, self, other)
    }

    /// Less than or equal
    fn loe<O: Operand<Self::Value>>(self, other: O) -> Predicate {
        compare(CompareOp::Le, self, other)
    }

    fn gt<O: Operand<Self::Value>>(self, other: O) -> Predicate {
        compare(CompareOp::Gt, self, other)
    }

    /// Greater than or equal
    fn goe<O: Operand<Self::Value>>(self, other: O) -> Predicate {
        compare(CompareOp::Ge, self, other)
    }

    /// Inclusive on both ends.
    fn between<L, H>(self, low: L, high: H) -> Predicate
    where
        L: Operand<Self::Value>,
        H: Operand<Self::Value>,
    {
        Expr::from_node(Node::Between {
            operand: Box::new(self.into_node()),
            low: Box::new(low.into_operand()),
            high: Box::new(high.into_operand()),
        })
    }

    fn is_in<I: InOperand<Self::Value>>(self, set: I) -> Predicate {
        Expr::from_node(Node::In {
            operand: Box::new(self.into_node()),
            set: set.into_in_set(),
            negated: false,
        })
    }

    fn not_in<I: InOperand<Self::Value>>(self, set: I) -> Predicate {
        Expr::from_node(Node::In {
            operand: Box::new(self.into_node()),
            set: set.into_in_set(),
            negated: true,
        })
    }

    fn is_null(self) -> Predicate {
        Expr::from_node(Node::IsNull {
            operand: Box::new(self.into_node()),
            negated: false,
        })
    }

    fn is_not_null(self) -> Predicate {
        Expr::from_node(Node::IsNull {
            operand: Box::new(self.into_node()),
            negated: true,
        })
    }

    fn asc(self) -> OrderSpecifier {
        OrderSpecifier::new(self.into_node(), OrderDirection::Asc)
    }

    fn desc(self) -> OrderSpecifier {
        OrderSpecifier::new(self.into_node(), OrderDirection::Desc)
    }

    fn count(self) -> Expr<i64> {
        Expr::from_node(Node::aggregate_count(self.into_node(), false))
    }

    fn count_distinct(self) -> Expr<i64> {
        Expr::from_node(Node::aggregate_count(self.into_node(), true))
    }

    fn sum(self) -> Expr<<Self::Value as Numeric>::Sum>
    where
        Self::Value: Numeric,
    {
        Expr::from_node(Node::aggregate(AggregateFunc::Sum, self.into_node()))
    }

    fn avg(self) -> Expr<<Self::Value as SqlType>::Rebase<f64>>
    where
        Self::Value: Numeric,
    {
        Expr::from_node(Node::aggregate(AggregateFunc::Avg, self.into_node()))
    }

    fn max(self) -> Expr<Self::Value> {
        Expr::from_node(Node::aggregate(AggregateFunc::Max, self.into_node()))
    }

    fn min(self) -> Expr<Self::Value> {
        Expr::from_node(Node::aggregate(AggregateFunc::Min, self.into_node()))
    }

    fn add<O>(self, other: O) -> Expr<<Self::Value as NumericWith<O::Value>>::Output>
    where
        O: Operand<Self::Value>,
        Self::Value: NumericWith<O::Value>,
    {
        arithmetic(ArithmeticOp::Add, self, other)
    }

    fn subtract<O>(self, other: O) -> Expr<<Self::Value as NumericWith<O::Value>>::Output>
    where
        O: Operand<Self::Value>,
        Self::Value: NumericWith<O::Value>,
    {
        arithmetic(ArithmeticOp::Subtract, self, other)
    }

    fn multiply<O>(self, other: O) -> Expr<<Self::Value as NumericWith<O::Value>>::Output>
    where
        O: Operand<Self::Value>,
        Self::Value: NumericWith<O::Value>,
    {
        arithmetic(ArithmeticOp::Multiply, self, other)
    }

    /// Integer operands divide as integers, as in SQLite.
    fn divide<O>(self, other: O) -> Expr<<Self::Value as NumericWith<O::Value>>::Output>
    where
        O: Operand<Self::Value>,
        Self::Value: NumericWith<O::Value>,
    {
        arithmetic(ArithmeticOp::Divide, self, other)
    }

    /// Start a simple case expression over this value.
    fn when<O: Operand<Self::Value>>(self, value: O) -> CaseWhen<Self::Value> {
        CaseWhen::simple(self.into_node(), value.into_operand())
    }

    /// The value rendered as text; NULL stays NULL.
    fn string_value(self) -> Expr<<Self::Value as SqlType>::Rebase<String>> {
        Expr::from_node(Node::Text(Box::new(self.into_node())))
    }

    /// Treat the expression as possibly NULL, e.g. an aggregate over no rows.
    fn nullable(self) -> Expr<Option<<Self::Value as SqlType>::Base>> {
        Expr::from_node(self.into_node())
    }

    /// Erase the type for use in a dynamic tuple projection.
    fn into_any(self) -> AnyExpr {
        AnyExpr::new(self.into_node(), <Self::Value as SqlType>::KIND)
    }
}

impl<E: Expression> ExpressionExt for E {}

fn compare<E: Expression, O: Operand<E::Value>>(op: CompareOp, left: E, right: O) -> Predicate {
    Expr::from_node(Node::compare(op, left.into_node(), right.into_operand()))
}

fn arithmetic<E: Expression, O: Operand<E::Value>, R>(
    op: ArithmeticOp,
    left: E,
    right: O,
) -> Expr<R> {
    Expr::from_node(Node::arithmetic(op, left.into_node(), right.into_operand()))
}

/// Boolean combinators, available on predicates only.
pub trait BooleanExpression: Expression + Sized {
    fn and<O: Expression<Value = bool>>(self, other: O) -> Predicate {
        Expr::from_node(Node::logical(
            LogicalOp::And,
            self.into_node(),
            other.into_node(),
        ))
    }

    fn or<O: Expression<Value = bool>>(self, other: O) -> Predicate {
        Expr::from_node(Node::logical(
            LogicalOp::Or,
            self.into_node(),
            other.into_node(),
        ))
    }

    fn not(self) -> Predicate {
        Expr::from_node(Node::Not(Box::new(self.into_node())))
    }
}

impl<E: Expression<Value = bool>> BooleanExpression for E {}

/// String operations, available on text expressions only.
pub trait StringExpression: Expression + Sized {
    /// NULL when either side is NULL, as `||` is in SQLite.
    fn concat<O: Operand<Self::Value>>(
        self,
        other: O,
    ) -> Expr<<Self::Value as SqlType>::Rebase<<O::Value as SqlType>::Rebase<String>>> {
        let mut parts = match self.into_node() {
            Node::Concat(parts) => parts,
            node => vec![node],
        };
        parts.push(other.into_operand());
        Expr::from_node(Node::Concat(parts))
    }

    /// Raw `LIKE` with caller-supplied `%` and `_` wildcards.
    fn like(self, pattern: impl Into<String>) -> Predicate {
        like(self, pattern.into(), false)
    }

    fn contains(self, needle: &str) -> Predicate {
        like(self, format!("%{}%", escape_like(needle)), true)
    }

    fn starts_with(self, prefix: &str) -> Predicate {
        like(self, format!("{}%", escape_like(prefix)), true)
    }

    fn ends_with(self, suffix: &str) -> Predicate {
        like(self, format!("%{}", escape_like(suffix)), true)
    }

    fn lower(self) -> Expr<Self::Value> {
        function(ScalarFunc::Lower, self)
    }

    fn upper(self) -> Expr<Self::Value> {
        function(ScalarFunc::Upper, self)
    }

    fn length(self) -> Expr<<Self::Value as SqlType>::Rebase<i64>> {
        function(ScalarFunc::Length, self)
    }
}

impl<E> StringExpression for E
where
    E: Expression,
    E::Value: SqlType<Base = String>,
{
}

fn like<E: Expression>(operand: E, pattern: String, escaped: bool) -> Predicate {
    Expr::from_node(Node::Like {
        operand: Box::new(operand.into_node()),
        pattern: Box::new(Node::Literal(SqlValue::String(pattern))),
        escaped,
    })
}

fn function<E: Expression, T>(func: ScalarFunc, operand: E) -> Expr<T> {
    Expr::from_node(Node::Function {
        func,
        args: vec![operand.into_node()],
    })
}

/// Escape LIKE wildcards so the text matches literally.
pub fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::QMember;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_comparison_nodes() {
        let m = QMember::new("m");
        let predicate = m.age.goe(30);
        assert_eq!(
            predicate.node(),
            &Node::Compare {
                op: CompareOp::Ge,
                left: Box::new(Node::Column {
                    alias: "m",
                    name: "age"
                }),
                right: Box::new(Node::Literal(SqlValue::Int(30))),
            }
        );
    }

    #[test]
    fn test_expressions_compare_structurally() {
        let m = QMember::new("m");
        assert_eq!(
            m.username.eq("member1").node(),
            m.username.eq("member1").node()
        );
        assert_ne!(m.username.eq("member1").node(), m.username.eq("member2").node());
    }

    #[test]
    fn test_and_flattens() {
        let m = QMember::new("m");
        let predicate = m.age.gt(10).and(m.age.lt(40)).and(m.username.is_not_null());
        match predicate.node() {
            Node::Logical { op, operands } => {
                assert_eq!(*op, LogicalOp::And);
                assert_eq!(operands.len(), 3);
            }
            other => panic!("expected logical node, got {other:?}"),
        }
    }

    #[test]
    fn test_or_inside_and_is_kept() {
        let m = QMember::new("m");
        let predicate = m.age.eq(10).or(m.age.eq(20)).and(m.username.is_null());
        match predicate.node() {
            Node::Logical { op, operands } => {
                assert_eq!(*op, LogicalOp::And);
                assert_eq!(operands.len(), 2);
                assert!(matches!(
                    operands[0],
                    Node::Logical {
                        op: LogicalOp::Or,
                        ..
                    }
                ));
            }
            other => panic!("expected logical node, got {other:?}"),
        }
    }

    #[test]
    fn test_concat_flattens() {
        let m = QMember::new("m");
        let expr = m.username.concat("_").concat(m.age.string_value());
        match expr.node() {
            Node::Concat(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected concat node, got {other:?}"),
        }
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("member"), "member");
    }

    #[test]
    fn test_contains_is_escaped() {
        let m = QMember::new("m");
        match m.username.contains("a%").node() {
            Node::Like {
                pattern, escaped, ..
            } => {
                assert!(*escaped);
                assert_eq!(
                    **pattern,
                    Node::Literal(SqlValue::String("%a\\%%".to_string()))
                );
            }
            other => panic!("expected like node, got {other:?}"),
        }
    }

    #[test]
    fn test_aggregate_detection() {
        let m = QMember::new("m");
        assert!(m.age.avg().node().is_aggregate());
        assert!(m.age.max().add(1).node().is_aggregate());
        assert!(!m.age.add(1).node().is_aggregate());
    }
}
