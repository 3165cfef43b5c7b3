//! Query builder
//!
//! A [`Query`] pairs a typed projection with the [`Select`] descriptor that
//! the renderer turns into SQL. Builder methods consume and return the
//! query. Misuse is recorded as a defect and reported when the query is
//! rendered or executed, so chains never need `?` mid-way.

mod exec;
mod projection;
mod render;
mod tuple;

pub use exec::QueryResults;
pub use projection::{Maybe, Projection, SelectContext, decode_entity};
pub use render::RenderedQuery;
pub use tuple::{AnyExpr, Tuple, TupleProjection, select_tuple};

use std::fmt;

use crate::error::BuildError;
use crate::expr::{Expression, InOperand, InSet, Node, Operand, OrderSpecifier, Predicate};
use crate::schema::{Association, AssociationKind, Entity, EntityDescriptor, EntityPath};
use crate::value::ComparableWith;

/// An aliased table in `FROM` or a join.
#[derive(Clone, Copy)]
pub struct Source {
    pub alias: &'static str,
    pub descriptor: &'static EntityDescriptor,
}

impl Source {
    pub fn of<P: EntityPath>(path: &P) -> Self {
        Self {
            alias: path.alias(),
            descriptor: path.descriptor(),
        }
    }

    pub fn table(&self) -> &'static str {
        self.descriptor.table
    }
}

impl PartialEq for Source {
    fn eq(&self, other: &Self) -> bool {
        self.alias == other.alias && std::ptr::eq(self.descriptor, other.descriptor)
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.descriptor.table, self.alias)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Cross,
}

impl JoinKind {
    pub fn to_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Cross => "CROSS JOIN",
        }
    }
}

/// The association a join follows, resolved to plain column names.
#[derive(Debug, Clone, PartialEq)]
pub struct AssociationRef {
    pub owner_alias: &'static str,
    pub name: &'static str,
    pub kind: AssociationKind,
    pub join_column: &'static str,
    pub owner_key: &'static str,
    pub target_key: &'static str,
}

impl AssociationRef {
    /// The equality that links owner and target rows.
    pub fn condition(&self, target_alias: &'static str) -> Node {
        let (target_column, owner_column) = match self.kind {
            AssociationKind::ManyToOne => (self.target_key, self.join_column),
            AssociationKind::OneToMany => (self.join_column, self.owner_key),
        };
        Node::compare(
            crate::expr::CompareOp::Eq,
            Node::Column {
                alias: target_alias,
                name: target_column,
            },
            Node::Column {
                alias: self.owner_alias,
                name: owner_column,
            },
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub target: Source,
    pub association: Option<AssociationRef>,
    /// Extra ON terms, ANDed with the association condition
    pub on: Vec<Node>,
    /// Materialize the target into the owner's `Related` field
    pub fetch: bool,
}

impl Join {
    /// Whether this is a fetch join owned by the entity at `alias`.
    pub fn fetched_by(&self, alias: &str) -> bool {
        self.fetch
            && self
                .association
                .as_ref()
                .is_some_and(|a| a.owner_alias == alias)
    }
}

/// Everything the renderer needs to produce SQL.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Select {
    pub items: Vec<Node>,
    pub distinct: bool,
    /// More than one source is a theta join
    pub sources: Vec<Source>,
    pub joins: Vec<Join>,
    pub filter: Vec<Node>,
    pub group_by: Vec<Node>,
    pub having: Vec<Node>,
    pub order_by: Vec<OrderSpecifier>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    /// First misuse of the builder, if any
    pub defect: Option<BuildError>,
}

impl Select {
    fn alias_in_scope(&self, alias: &str) -> bool {
        self.sources.iter().any(|s| s.alias == alias)
            || self.joins.iter().any(|j| j.target.alias == alias)
    }

    fn record(&mut self, error: BuildError) {
        if self.defect.is_none() {
            self.defect = Some(error);
        }
    }
}

/// SQLite reads LIMIT and OFFSET as signed 64-bit integers.
pub(crate) fn check_row_count(clause: &str, n: u64) -> Result<(), BuildError> {
    if i64::try_from(n).is_err() {
        return Err(BuildError::Unsupported(format!(
            "{clause} {n} exceeds the largest row count SQLite accepts"
        )));
    }
    Ok(())
}

/// A typed query whose rows decode to `P::Output`.
#[derive(Debug, Clone)]
pub struct Query<P> {
    projection: P,
    select: Select,
}

/// Start a query with the given projection.
pub fn select<P: Projection>(projection: P) -> Query<P> {
    Query {
        projection,
        select: Select::default(),
    }
}

/// Select an entity from its own table.
pub fn select_from<P: Projection + EntityPath>(path: P) -> Query<P> {
    select(path).from(path)
}

impl<P: Projection> Query<P> {
    pub fn projection(&self) -> &P {
        &self.projection
    }

    /// Add a source. Repeated calls produce a theta join.
    pub fn from<S: EntityPath>(mut self, path: S) -> Self {
        self.add_source(Source::of(&path));
        self
    }

    fn add_source(&mut self, source: Source) {
        if self.select.alias_in_scope(source.alias) {
            self.select.record(BuildError::InvalidJoin(format!(
                "alias `{}` is already in use",
                source.alias
            )));
            return;
        }
        self.select.sources.push(source);
    }

    fn push_join(
        mut self,
        kind: JoinKind,
        target: Source,
        association: Option<AssociationRef>,
    ) -> Self {
        if self.select.alias_in_scope(target.alias) {
            self.select.record(BuildError::InvalidJoin(format!(
                "alias `{}` is already in use",
                target.alias
            )));
            return self;
        }
        self.select.joins.push(Join {
            kind,
            target,
            association,
            on: Vec::new(),
            fetch: false,
        });
        self
    }

    fn association_join<S, T, Q>(
        mut self,
        kind: JoinKind,
        association: Association<S, T>,
        target: Q,
    ) -> Self
    where
        S: Entity,
        T: Entity,
        Q: EntityPath<Entity = T>,
    {
        let owner_alias = association.owner_alias();
        if !self.select.alias_in_scope(owner_alias) {
            self.select.record(BuildError::InvalidJoin(format!(
                "association `{}` starts from alias `{owner_alias}`, which is not in scope",
                association.name()
            )));
            return self;
        }

        let descriptor = match association.descriptor() {
            Ok(descriptor) => descriptor,
            Err(e) => {
                self.select.record(e);
                return self;
            }
        };

        let reference = AssociationRef {
            owner_alias,
            name: descriptor.name,
            kind: descriptor.kind,
            join_column: descriptor.join_column,
            owner_key: S::descriptor().primary_key,
            target_key: T::descriptor().primary_key,
        };
        self.push_join(kind, Source::of(&target), Some(reference))
    }

    /// Inner join following an association.
    pub fn join<S, T, Q>(self, association: Association<S, T>, target: Q) -> Self
    where
        S: Entity,
        T: Entity,
        Q: EntityPath<Entity = T>,
    {
        self.association_join(JoinKind::Inner, association, target)
    }

    pub fn left_join<S, T, Q>(self, association: Association<S, T>, target: Q) -> Self
    where
        S: Entity,
        T: Entity,
        Q: EntityPath<Entity = T>,
    {
        self.association_join(JoinKind::Left, association, target)
    }

    pub fn right_join<S, T, Q>(self, association: Association<S, T>, target: Q) -> Self
    where
        S: Entity,
        T: Entity,
        Q: EntityPath<Entity = T>,
    {
        self.association_join(JoinKind::Right, association, target)
    }

    /// Inner join to an unrelated entity; requires [`Query::on`].
    pub fn join_entity<Q: EntityPath>(self, target: Q) -> Self {
        self.push_join(JoinKind::Inner, Source::of(&target), None)
    }

    /// Left join to an unrelated entity; requires [`Query::on`].
    pub fn left_join_entity<Q: EntityPath>(self, target: Q) -> Self {
        self.push_join(JoinKind::Left, Source::of(&target), None)
    }

    /// Right join to an unrelated entity; requires [`Query::on`].
    pub fn right_join_entity<Q: EntityPath>(self, target: Q) -> Self {
        self.push_join(JoinKind::Right, Source::of(&target), None)
    }

    pub fn cross_join<Q: EntityPath>(self, target: Q) -> Self {
        self.push_join(JoinKind::Cross, Source::of(&target), None)
    }

    /// Add a condition to the most recent join's ON clause.
    pub fn on(mut self, predicate: Predicate) -> Self {
        let error = match self.select.joins.last_mut() {
            Some(join) if join.kind != JoinKind::Cross => {
                join.on.push(predicate.into_node());
                None
            }
            Some(_) => Some("a cross join cannot have an ON clause"),
            None => Some("on() called before any join"),
        };
        if let Some(error) = error {
            self.select
                .record(BuildError::InvalidJoin(error.to_string()));
        }
        self
    }

    /// Load the most recent join's target into its owner's `Related` field.
    pub fn fetch_join(mut self) -> Self {
        let error = match self.select.joins.last_mut() {
            Some(join) => match &join.association {
                Some(association) if association.kind == AssociationKind::ManyToOne => {
                    join.fetch = true;
                    None
                }
                Some(association) => Some(BuildError::Unsupported(format!(
                    "fetch join over one-to-many association `{}`",
                    association.name
                ))),
                None => Some(BuildError::InvalidJoin(format!(
                    "fetch join to `{}` does not follow an association",
                    join.target.alias
                ))),
            },
            None => Some(BuildError::InvalidJoin(
                "fetch_join() called before any join".to_string(),
            )),
        };
        if let Some(error) = error {
            self.select.record(error);
        }
        self
    }

    /// Add a WHERE condition. `None` is ignored.
    pub fn filter(mut self, predicate: impl Into<Option<Predicate>>) -> Self {
        if let Some(predicate) = predicate.into() {
            self.select.filter.push(predicate.into_node());
        }
        self
    }

    /// Add every present predicate as a WHERE condition.
    pub fn filter_all<I>(mut self, predicates: I) -> Self
    where
        I: IntoIterator<Item = Option<Predicate>>,
    {
        self.select
            .filter
            .extend(predicates.into_iter().flatten().map(Expression::into_node));
        self
    }

    pub fn group_by<E: Expression>(mut self, key: E) -> Self {
        self.select.group_by.push(key.into_node());
        self
    }

    /// Add a HAVING condition. `None` is ignored.
    pub fn having(mut self, predicate: impl Into<Option<Predicate>>) -> Self {
        if let Some(predicate) = predicate.into() {
            self.select.having.push(predicate.into_node());
        }
        self
    }

    pub fn order_by(mut self, order: OrderSpecifier) -> Self {
        self.select.order_by.push(order);
        self
    }

    pub fn order_by_all<I: IntoIterator<Item = OrderSpecifier>>(mut self, orders: I) -> Self {
        self.select.order_by.extend(orders);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        match check_row_count("offset", offset) {
            Ok(()) => self.select.offset = Some(offset),
            Err(error) => self.select.record(error),
        }
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        match check_row_count("limit", limit) {
            Ok(()) => self.select.limit = Some(limit),
            Err(error) => self.select.record(error),
        }
        self
    }

    pub fn distinct(mut self) -> Self {
        self.select.distinct = true;
        self
    }

    /// The complete descriptor, with projection items filled in.
    pub fn to_select(&self) -> Select {
        let mut select = self.select.clone();

        let mut context = SelectContext::new(&self.select.joins);
        self.projection.select_items(&mut context);
        let (items, fetched) = context.finish();
        select.items = items;

        for (index, join) in select.joins.iter().enumerate() {
            if join.fetch && !fetched.contains(&index) {
                let owner = join
                    .association
                    .as_ref()
                    .map(|a| a.owner_alias)
                    .unwrap_or_default();
                select.defect.get_or_insert(BuildError::Unsupported(format!(
                    "fetch join to `{}` but its owner `{owner}` is not projected as an entity",
                    join.target.alias
                )));
            }
        }

        select
    }

    /// Render SQL and parameters without executing.
    pub fn render(&self) -> Result<RenderedQuery, BuildError> {
        render::render(&self.to_select())
    }
}

impl<P> Expression for Query<P>
where
    P: Projection + Expression,
{
    type Value = P::Value;

    fn to_node(&self) -> Node {
        Node::Subquery(Box::new(self.to_select()))
    }
}

impl<T, P> Operand<T> for Query<P>
where
    P: Projection + Expression,
    T: ComparableWith<P::Value>,
{
    type Value = <P as Expression>::Value;

    fn into_operand(self) -> Node {
        self.into_node()
    }
}

impl<T, P> InOperand<T> for Query<P>
where
    P: Projection + Expression,
    T: ComparableWith<P::Value>,
{
    fn into_in_set(self) -> InSet {
        InSet::Subquery(Box::new(self.to_select()))
    }
}
