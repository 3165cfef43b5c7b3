//! SQL rendering
//!
//! Turns a [`Select`] into SQLite SQL with numbered parameters (`?1`, `?2`,
//! ...). Literals are always bound, never inlined.

use serde::Serialize;

use crate::error::BuildError;
use crate::expr::{InSet, Node};
use crate::value::SqlValue;

use super::{JoinKind, Select, check_row_count};

/// SQL text plus the values bound to its parameters, in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Render a select with its projection items aliased `c0..cN`.
pub fn render(select: &Select) -> Result<RenderedQuery, BuildError> {
    let mut writer = SqlWriter::default();
    writer.write_select(select, true)?;
    Ok(writer.finish())
}

/// Render `SELECT COUNT(*)` over the unordered, unpaged select.
pub fn render_count(select: &Select) -> Result<RenderedQuery, BuildError> {
    let mut inner = select.clone();
    inner.order_by.clear();
    inner.offset = None;
    inner.limit = None;

    let mut writer = SqlWriter::default();
    writer.push("SELECT COUNT(*) FROM (");
    writer.write_select(&inner, true)?;
    writer.push(") AS \"counted\"");
    Ok(writer.finish())
}

#[derive(Default)]
struct SqlWriter {
    sql: String,
    params: Vec<SqlValue>,
}

impl SqlWriter {
    fn finish(self) -> RenderedQuery {
        RenderedQuery {
            sql: self.sql,
            params: self.params,
        }
    }

    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn push_ident(&mut self, name: &str) {
        self.sql.push('"');
        self.sql.push_str(&name.replace('"', "\"\""));
        self.sql.push('"');
    }

    fn push_param(&mut self, value: SqlValue) {
        self.params.push(value);
        self.sql.push_str(&format!("?{}", self.params.len()));
    }

    fn write_select(&mut self, select: &Select, alias_items: bool) -> Result<(), BuildError> {
        if let Some(defect) = &select.defect {
            return Err(defect.clone());
        }
        if select.items.is_empty() {
            return Err(BuildError::EmptyProjection);
        }
        if select.sources.is_empty() {
            return Err(BuildError::MissingSource);
        }

        self.push("SELECT ");
        if select.distinct {
            self.push("DISTINCT ");
        }
        for (index, item) in select.items.iter().enumerate() {
            if index > 0 {
                self.push(", ");
            }
            self.write_node(item)?;
            if alias_items {
                self.push(&format!(" AS \"c{index}\""));
            }
        }

        self.push(" FROM ");
        for (index, source) in select.sources.iter().enumerate() {
            if index > 0 {
                self.push(", ");
            }
            self.push_ident(source.table());
            self.push(" AS ");
            self.push_ident(source.alias);
        }

        for join in &select.joins {
            self.push(" ");
            self.push(join.kind.to_sql());
            self.push(" ");
            self.push_ident(join.target.table());
            self.push(" AS ");
            self.push_ident(join.target.alias);

            let mut conditions = Vec::with_capacity(join.on.len() + 1);
            if let Some(association) = &join.association {
                conditions.push(association.condition(join.target.alias));
            }
            conditions.extend(join.on.iter().cloned());

            if conditions.is_empty() {
                if join.kind != JoinKind::Cross {
                    return Err(BuildError::InvalidJoin(format!(
                        "join to `{}` has neither an association nor an ON predicate",
                        join.target.alias
                    )));
                }
                continue;
            }

            self.push(" ON ");
            self.write_list(&conditions, " AND ")?;
        }

        if !select.filter.is_empty() {
            self.push(" WHERE ");
            self.write_list(&select.filter, " AND ")?;
        }

        if !select.group_by.is_empty() {
            self.push(" GROUP BY ");
            self.write_list(&select.group_by, ", ")?;
        }

        if !select.having.is_empty() {
            self.push(" HAVING ");
            self.write_list(&select.having, " AND ")?;
        }

        if !select.order_by.is_empty() {
            self.push(" ORDER BY ");
            for (index, order) in select.order_by.iter().enumerate() {
                if index > 0 {
                    self.push(", ");
                }
                self.write_node(&order.node)?;
                self.push(" ");
                self.push(order.direction.to_sql());
                if let Some(nulls) = order.nulls.to_sql() {
                    self.push(" ");
                    self.push(nulls);
                }
            }
        }

        for (clause, n) in [("limit", select.limit), ("offset", select.offset)] {
            if let Some(n) = n {
                check_row_count(clause, n)?;
            }
        }
        match (select.limit, select.offset) {
            (Some(limit), Some(offset)) => self.push(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => self.push(&format!(" LIMIT {limit}")),
            // SQLite only accepts OFFSET after a LIMIT
            (None, Some(offset)) => self.push(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }

        Ok(())
    }

    fn write_list(&mut self, nodes: &[Node], separator: &str) -> Result<(), BuildError> {
        for (index, node) in nodes.iter().enumerate() {
            if index > 0 {
                self.push(separator);
            }
            self.write_node(node)?;
        }
        Ok(())
    }

    /// Write a node that sits inside another operator, parenthesizing
    /// predicates so precedence never depends on SQLite's rules.
    fn write_operand(&mut self, node: &Node) -> Result<(), BuildError> {
        match node {
            Node::Compare { .. }
            | Node::Between { .. }
            | Node::In { .. }
            | Node::IsNull { .. }
            | Node::Like { .. }
            | Node::Not(_) => {
                self.push("(");
                self.write_node(node)?;
                self.push(")");
                Ok(())
            }
            _ => self.write_node(node),
        }
    }

    fn write_node(&mut self, node: &Node) -> Result<(), BuildError> {
        match node {
            Node::Column { alias, name } => {
                self.push_ident(alias);
                self.push(".");
                self.push_ident(name);
            }
            Node::Literal(value) => self.push_param(value.clone()),
            Node::Compare { op, left, right } => {
                self.write_operand(left)?;
                self.push(&format!(" {} ", op.to_sql()));
                self.write_operand(right)?;
            }
            Node::Between { operand, low, high } => {
                self.write_operand(operand)?;
                self.push(" BETWEEN ");
                self.write_operand(low)?;
                self.push(" AND ");
                self.write_operand(high)?;
            }
            Node::In {
                operand,
                set,
                negated,
            } => {
                self.write_operand(operand)?;
                self.push(if *negated { " NOT IN (" } else { " IN (" });
                match set {
                    InSet::List(values) => self.write_list(values, ", ")?,
                    InSet::Subquery(select) => self.write_select(select, false)?,
                }
                self.push(")");
            }
            Node::IsNull { operand, negated } => {
                self.write_operand(operand)?;
                self.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Node::Like {
                operand,
                pattern,
                escaped,
            } => {
                self.write_operand(operand)?;
                self.push(" LIKE ");
                self.write_operand(pattern)?;
                if *escaped {
                    self.push(" ESCAPE '\\'");
                }
            }
            Node::Logical { op, operands } => {
                self.push("(");
                self.write_list(operands, &format!(" {} ", op.to_sql()))?;
                self.push(")");
            }
            Node::Not(inner) => {
                self.push("NOT (");
                self.write_node(inner)?;
                self.push(")");
            }
            Node::Arithmetic { op, left, right } => {
                self.push("(");
                self.write_operand(left)?;
                self.push(&format!(" {} ", op.to_sql()));
                self.write_operand(right)?;
                self.push(")");
            }
            Node::Aggregate {
                func,
                arg,
                distinct,
            } => {
                self.push(func.to_sql());
                self.push("(");
                if *distinct {
                    self.push("DISTINCT ");
                }
                match arg {
                    Some(arg) => self.write_node(arg)?,
                    None => self.push("*"),
                }
                self.push(")");
            }
            Node::Case {
                operand,
                branches,
                otherwise,
            } => {
                self.push("CASE");
                if let Some(operand) = operand {
                    self.push(" ");
                    self.write_operand(operand)?;
                }
                for (when, then) in branches {
                    self.push(" WHEN ");
                    self.write_node(when)?;
                    self.push(" THEN ");
                    self.write_operand(then)?;
                }
                if let Some(otherwise) = otherwise {
                    self.push(" ELSE ");
                    self.write_operand(otherwise)?;
                }
                self.push(" END");
            }
            Node::Concat(parts) => {
                self.push("(");
                for (index, part) in parts.iter().enumerate() {
                    if index > 0 {
                        self.push(" || ");
                    }
                    self.write_operand(part)?;
                }
                self.push(")");
            }
            Node::Text(inner) => {
                self.push("CAST(");
                self.write_node(inner)?;
                self.push(" AS TEXT)");
            }
            Node::Function { func, args } => {
                self.push(func.to_sql());
                self.push("(");
                self.write_list(args, ", ")?;
                self.push(")");
            }
            Node::Subquery(select) => {
                self.push("(");
                self.write_select(select, false)?;
                self.push(")");
            }
        }
        Ok(())
    }
}
