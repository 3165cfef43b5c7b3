//! CASE expressions
//!
//! Simple form: `m.age.when(10).then("ten").when(20).then("twenty").otherwise("other")`.
//! Searched form: `case().when(m.age.between(0, 20)).then("0-20").otherwise("other")`.

use std::marker::PhantomData;

use super::{Expr, Expression, IntoExpr, Node, Operand, Predicate};
use crate::value::SqlType;

/// Start a searched case expression.
pub fn case() -> CaseBuilder {
    CaseBuilder
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CaseBuilder;

impl CaseBuilder {
    pub fn when(self, condition: Predicate) -> CaseWhen<bool> {
        CaseWhen {
            operand: None,
            branches: Vec::new(),
            pending: condition.into_node(),
            _marker: PhantomData,
        }
    }
}

/// A case chain waiting for the result of its first branch.
pub struct CaseWhen<T> {
    operand: Option<Node>,
    branches: Vec<(Node, Node)>,
    pending: Node,
    _marker: PhantomData<fn() -> T>,
}

impl<T: SqlType> CaseWhen<T> {
    pub(crate) fn simple(operand: Node, value: Node) -> Self {
        Self {
            operand: Some(operand),
            branches: Vec::new(),
            pending: value,
            _marker: PhantomData,
        }
    }

    /// The result type of the whole case expression is fixed by the first
    /// branch.
    pub fn then<V: IntoExpr>(self, result: V) -> CaseNext<T, V::Value> {
        let mut branches = self.branches;
        branches.push((self.pending, result.into_expr().into_node()));
        CaseNext {
            operand: self.operand,
            branches,
            _marker: PhantomData,
        }
    }
}

/// A case chain with at least one complete branch.
pub struct CaseNext<T, R> {
    operand: Option<Node>,
    branches: Vec<(Node, Node)>,
    _marker: PhantomData<fn() -> (T, R)>,
}

impl<T: SqlType, R: SqlType> CaseNext<T, R> {
    pub fn when<O: Operand<T>>(self, value: O) -> CaseThen<T, R> {
        CaseThen {
            next: self,
            pending: value.into_operand(),
        }
    }

    pub fn otherwise<V: IntoExpr<Value = R>>(self, result: V) -> Expr<R> {
        Expr::from_node(Node::Case {
            operand: self.operand.map(Box::new),
            branches: self.branches,
            otherwise: Some(Box::new(result.into_expr().into_node())),
        })
    }

    /// Close the chain without a default; unmatched rows yield NULL.
    pub fn end(self) -> Expr<Option<R::Base>> {
        Expr::from_node(Node::Case {
            operand: self.operand.map(Box::new),
            branches: self.branches,
            otherwise: None,
        })
    }
}

/// A further branch waiting for its result.
pub struct CaseThen<T, R> {
    next: CaseNext<T, R>,
    pending: Node,
}

impl<T: SqlType, R: SqlType> CaseThen<T, R> {
    pub fn then<V: IntoExpr<Value = R>>(self, result: V) -> CaseNext<T, R> {
        let mut next = self.next;
        next.branches
            .push((self.pending, result.into_expr().into_node()));
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ExpressionExt;
    use crate::sample::QMember;

    #[test]
    fn test_simple_case_branches() {
        let m = QMember::new("m");
        let expr = m
            .age
            .when(10)
            .then("ten")
            .when(20)
            .then("twenty")
            .otherwise("other");

        match expr.node() {
            Node::Case {
                operand,
                branches,
                otherwise,
            } => {
                assert!(operand.is_some());
                assert_eq!(branches.len(), 2);
                assert!(otherwise.is_some());
            }
            other => panic!("expected case node, got {other:?}"),
        }
    }

    #[test]
    fn test_searched_case_without_default() {
        let m = QMember::new("m");
        let expr = case().when(m.age.between(0, 20)).then("0-20").end();

        match expr.node() {
            Node::Case {
                operand, otherwise, ..
            } => {
                assert!(operand.is_none());
                assert!(otherwise.is_none());
            }
            other => panic!("expected case node, got {other:?}"),
        }
    }
}
