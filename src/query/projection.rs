//! Projections: what a query selects and how each row decodes
//!
//! Columns, expressions and scalar subqueries decode to their value type.
//! Entity paths decode to the entity, with fetch-joined associations
//! loaded. Tuples of projections decode to tuples of outputs.

use crate::error::QueryError;
use crate::expr::{Expr, Expression, Node};
use crate::schema::{Column, Entity, EntityDescriptor, EntityPath};
use crate::value::{RowReader, SqlType};

use super::{Join, Query};

/// Collects select items while a projection describes itself.
pub struct SelectContext<'a> {
    joins: &'a [Join],
    items: Vec<Node>,
    fetched: Vec<usize>,
}

impl<'a> SelectContext<'a> {
    pub(crate) fn new(joins: &'a [Join]) -> Self {
        Self {
            joins,
            items: Vec::new(),
            fetched: Vec::new(),
        }
    }

    pub fn push(&mut self, node: Node) {
        self.items.push(node);
    }

    /// Select every column of an entity, followed by the columns of each
    /// association it fetch-joins.
    pub fn push_entity(&mut self, alias: &'static str, descriptor: &'static EntityDescriptor) {
        push_columns(&mut self.items, alias, descriptor);

        for (index, join) in self.joins.iter().enumerate() {
            if join.fetched_by(alias) {
                push_columns(&mut self.items, join.target.alias, join.target.descriptor);
                self.fetched.push(index);
            }
        }
    }

    pub(crate) fn finish(self) -> (Vec<Node>, Vec<usize>) {
        (self.items, self.fetched)
    }
}

fn push_columns(items: &mut Vec<Node>, alias: &'static str, descriptor: &EntityDescriptor) {
    items.extend(
        descriptor
            .fields
            .iter()
            .map(|field| Node::Column { alias, name: field.name }),
    );
}

/// The shape of a query's result rows.
pub trait Projection {
    type Output;

    fn select_items(&self, context: &mut SelectContext<'_>);

    fn decode(&self, reader: &mut RowReader<'_>, joins: &[Join])
    -> Result<Self::Output, QueryError>;
}

impl<T: SqlType> Projection for Column<T> {
    type Output = T;

    fn select_items(&self, context: &mut SelectContext<'_>) {
        context.push(self.to_node());
    }

    fn decode(&self, reader: &mut RowReader<'_>, _joins: &[Join]) -> Result<T, QueryError> {
        reader.read::<T>()
    }
}

impl<T: SqlType> Projection for Expr<T> {
    type Output = T;

    fn select_items(&self, context: &mut SelectContext<'_>) {
        context.push(self.to_node());
    }

    fn decode(&self, reader: &mut RowReader<'_>, _joins: &[Join]) -> Result<T, QueryError> {
        reader.read::<T>()
    }
}

/// A scalar subquery in select position.
impl<P> Projection for Query<P>
where
    P: Projection + Expression,
{
    type Output = P::Value;

    fn select_items(&self, context: &mut SelectContext<'_>) {
        context.push(self.to_node());
    }

    fn decode(&self, reader: &mut RowReader<'_>, _joins: &[Join]) -> Result<P::Value, QueryError> {
        reader.read::<P::Value>()
    }
}

macro_rules! tuple_projection {
    ($($name:ident : $index:tt),+) => {
        impl<$($name: Projection),+> Projection for ($($name,)+) {
            type Output = ($($name::Output,)+);

            fn select_items(&self, context: &mut SelectContext<'_>) {
                $(self.$index.select_items(context);)+
            }

            fn decode(
                &self,
                reader: &mut RowReader<'_>,
                joins: &[Join],
            ) -> Result<Self::Output, QueryError> {
                Ok(($(self.$index.decode(reader, joins)?,)+))
            }
        }
    };
}

tuple_projection!(A: 0, B: 1);
tuple_projection!(A: 0, B: 1, C: 2);
tuple_projection!(A: 0, B: 1, C: 2, D: 3);
tuple_projection!(A: 0, B: 1, C: 2, D: 3, E: 4);
tuple_projection!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);

/// Decode an entity projected at `alias`, then every association it
/// fetch-joins, in join order.
pub fn decode_entity<E: Entity>(
    alias: &str,
    reader: &mut RowReader<'_>,
    joins: &[Join],
) -> Result<E, QueryError> {
    let mut entity = E::decode(reader)?;
    for join in joins.iter().filter(|j| j.fetched_by(alias)) {
        if let Some(association) = &join.association {
            entity.load_association(association.name, reader)?;
        }
    }
    Ok(entity)
}

/// An entity on the nullable side of an outer join.
///
/// Created with [`EntityPath::maybe`]; decodes to `None` when the joined row
/// is absent.
#[derive(Debug, Clone, Copy)]
pub struct Maybe<P> {
    path: P,
}

impl<P: EntityPath> Maybe<P> {
    pub(crate) fn new(path: P) -> Self {
        Self { path }
    }

    /// Columns this entity occupies, fetch joins included.
    fn width(&self, joins: &[Join]) -> usize {
        let own = self.path.descriptor().fields.len();
        let fetched: usize = joins
            .iter()
            .filter(|j| j.fetched_by(self.path.alias()))
            .map(|j| j.target.descriptor.fields.len())
            .sum();
        own + fetched
    }
}

impl<P: EntityPath> Projection for Maybe<P> {
    type Output = Option<P::Entity>;

    fn select_items(&self, context: &mut SelectContext<'_>) {
        context.push_entity(self.path.alias(), self.path.descriptor());
    }

    fn decode(
        &self,
        reader: &mut RowReader<'_>,
        joins: &[Join],
    ) -> Result<Option<P::Entity>, QueryError> {
        let descriptor = self.path.descriptor();
        if reader.is_null_at(descriptor.primary_key_index())? {
            reader.skip(self.width(joins));
            return Ok(None);
        }
        decode_entity::<P::Entity>(self.path.alias(), reader, joins).map(Some)
    }
}
