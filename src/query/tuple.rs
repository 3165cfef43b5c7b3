//! Dynamic tuple projections
//!
//! For callers that assemble projections at runtime. Each row decodes to a
//! [`Tuple`] whose components are looked up by the expression that produced
//! them.

use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::error::QueryError;
use crate::expr::{Expression, Node};
use crate::value::{RowReader, SqlType, SqlValue, ValueKind};

use super::projection::{Projection, SelectContext};
use super::{Join, Query, select};

/// A type-erased expression.
#[derive(Debug, Clone, PartialEq)]
pub struct AnyExpr {
    node: Node,
    kind: ValueKind,
}

impl AnyExpr {
    pub(crate) fn new(node: Node, kind: ValueKind) -> Self {
        Self { node, kind }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }
}

#[derive(Debug, Clone)]
pub struct TupleProjection {
    nodes: Arc<[Node]>,
    kinds: Vec<ValueKind>,
}

/// Start a query projecting a dynamic tuple.
pub fn select_tuple<I: IntoIterator<Item = AnyExpr>>(items: I) -> Query<TupleProjection> {
    let (nodes, kinds): (Vec<Node>, Vec<ValueKind>) =
        items.into_iter().map(|item| (item.node, item.kind)).unzip();
    select(TupleProjection {
        nodes: nodes.into(),
        kinds,
    })
}

impl Projection for TupleProjection {
    type Output = Tuple;

    fn select_items(&self, context: &mut SelectContext<'_>) {
        for node in self.nodes.iter() {
            context.push(node.clone());
        }
    }

    fn decode(&self, reader: &mut RowReader<'_>, _joins: &[Join]) -> Result<Tuple, QueryError> {
        let values = self
            .kinds
            .iter()
            .map(|kind| reader.read_value(*kind))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Tuple {
            nodes: Arc::clone(&self.nodes),
            values,
        })
    }
}

/// One row of a dynamic tuple projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    nodes: Arc<[Node]>,
    values: Vec<SqlValue>,
}

impl Tuple {
    /// The value produced by `expr`, which must be part of the projection.
    pub fn get<E: Expression>(&self, expr: &E) -> Result<E::Value, QueryError> {
        let node = expr.to_node();
        let index = self
            .nodes
            .iter()
            .position(|n| *n == node)
            .ok_or_else(|| QueryError::NotInProjection(format!("{node:?}")))?;
        E::Value::from_sql(self.values[index].clone())
    }

    pub fn get_at<T: SqlType>(&self, index: usize) -> Result<T, QueryError> {
        let value = self
            .values
            .get(index)
            .ok_or_else(|| QueryError::NotInProjection(format!("index {index}")))?;
        T::from_sql(value.clone())
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Serialize for Tuple {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.values.serialize(serializer)
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (index, value) in self.values.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ExpressionExt;
    use crate::sample::QMember;
    use assert_matches::assert_matches;

    fn tuple() -> Tuple {
        let m = QMember::new("m");
        Tuple {
            nodes: vec![m.username.to_node(), m.age.to_node()].into(),
            values: vec![SqlValue::String("member1".into()), SqlValue::Int(10)],
        }
    }

    #[test]
    fn test_get_by_expression() {
        let m = QMember::new("m");
        let row = tuple();
        assert_eq!(row.get(&m.username).unwrap(), Some("member1".to_string()));
        assert_eq!(row.get(&m.age).unwrap(), 10);
        assert_eq!(row.get_at::<i64>(1).unwrap(), 10);
        assert_eq!(row.to_string(), "[member1, 10]");
    }

    #[test]
    fn test_get_missing_expression() {
        let m = QMember::new("m");
        let row = tuple();
        assert_matches!(row.get(&m.team_id), Err(QueryError::NotInProjection(_)));
        assert_matches!(row.get_at::<i32>(5), Err(QueryError::NotInProjection(_)));
    }

    #[test]
    fn test_into_any_keeps_kind() {
        let m = QMember::new("m");
        let any = m.age.avg().into_any();
        assert_eq!(any.kind(), ValueKind::Real);
    }

    #[test]
    fn test_serialize_as_array() {
        let json = serde_json::to_string(&tuple()).unwrap();
        assert_eq!(json, r#"["member1",10]"#);
    }
}
