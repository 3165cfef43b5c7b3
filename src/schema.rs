//! Entity descriptors and typed paths
//!
//! Descriptors are generated by `#[derive(Entity)]` and describe how an entity
//! maps onto a table. Paths (`Q<Name>` structs, also generated) carry a table
//! alias and expose one [`Column`] per field and one [`Association`] per
//! relation, which is what query expressions are built from.

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;

use crate::error::{BuildError, QueryError};
use crate::expr::{Expr, Node};
use crate::query::Maybe;
use crate::value::{RowReader, SqlType, SqlValue, ValueKind};

/// Field definition for schema generation and row decoding.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    /// Column name in the database
    pub name: &'static str,
    pub kind: ValueKind,
    /// Whether the column can be NULL
    pub nullable: bool,
    /// Whether this is the primary key
    pub primary_key: bool,
}

impl FieldDescriptor {
    /// Generate the column definition SQL
    pub fn to_sql(&self) -> String {
        let mut sql = format!("\"{}\" {}", self.name, self.kind.sql_type());

        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
        }

        if !self.nullable && !self.primary_key {
            sql.push_str(" NOT NULL");
        }

        sql
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    /// The owner holds the join column pointing at the target's key.
    ManyToOne,
    /// The target holds the join column pointing at the owner's key.
    OneToMany,
}

/// A relation from one entity to another.
#[derive(Clone, Copy)]
pub struct AssociationDescriptor {
    pub name: &'static str,
    pub kind: AssociationKind,
    /// Foreign key column, on the owner for many-to-one and on the target
    /// for one-to-many
    pub join_column: &'static str,
    pub target: fn() -> &'static EntityDescriptor,
}

impl AssociationDescriptor {
    /// The many-to-one side owns the foreign key.
    pub fn is_owning(&self) -> bool {
        self.kind == AssociationKind::ManyToOne
    }

    pub fn target(&self) -> &'static EntityDescriptor {
        (self.target)()
    }
}

impl fmt::Debug for AssociationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssociationDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("join_column", &self.join_column)
            .field("target", &self.target().name)
            .finish()
    }
}

/// Static description of an entity and its table.
#[derive(Debug)]
pub struct EntityDescriptor {
    /// Rust type name
    pub name: &'static str,
    pub table: &'static str,
    pub primary_key: &'static str,
    /// Fields in declaration order, which is also the decode order
    pub fields: &'static [FieldDescriptor],
    pub associations: &'static [AssociationDescriptor],
}

impl EntityDescriptor {
    pub fn field(&self, name: &str) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn association(&self, name: &str) -> Option<&'static AssociationDescriptor> {
        self.associations.iter().find(|a| a.name == name)
    }

    pub fn primary_key_index(&self) -> usize {
        self.fields
            .iter()
            .position(|f| f.primary_key)
            .unwrap_or_default()
    }

    /// Column names in declaration order
    pub fn column_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }

    /// Generate CREATE TABLE IF NOT EXISTS SQL
    pub fn create_table_sql(&self) -> String {
        let mut defs: Vec<String> = self.fields.iter().map(|f| f.to_sql()).collect();

        for association in self.associations.iter().filter(|a| a.is_owning()) {
            let target = association.target();
            defs.push(format!(
                "FOREIGN KEY (\"{}\") REFERENCES \"{}\" (\"{}\")",
                association.join_column, target.table, target.primary_key
            ));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (\n  {}\n)",
            self.table,
            defs.join(",\n  ")
        )
    }

    /// INSERT for every non-key column; the key is assigned by SQLite.
    pub fn insert_sql(&self) -> String {
        let columns: Vec<&FieldDescriptor> =
            self.fields.iter().filter(|f| !f.primary_key).collect();
        let names: Vec<String> = columns.iter().map(|f| format!("\"{}\"", f.name)).collect();
        let params: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();

        format!(
            "INSERT INTO \"{}\" ({}) VALUES ({})",
            self.table,
            names.join(", "),
            params.join(", ")
        )
    }
}

/// A Rust type mapped onto a table.
///
/// Implemented by `#[derive(Entity)]`.
pub trait Entity: Sized + Send + 'static {
    fn descriptor() -> &'static EntityDescriptor;

    /// Decode the entity's own columns, leaving every association
    /// [`Related::NotLoaded`].
    fn decode(reader: &mut RowReader<'_>) -> Result<Self, QueryError>;

    /// Decode a fetch-joined association from the columns at the cursor.
    fn load_association(
        &mut self,
        name: &str,
        reader: &mut RowReader<'_>,
    ) -> Result<(), QueryError>;

    /// Values for every non-key column, in declaration order.
    fn column_values(&self) -> Vec<SqlValue>;

    fn set_primary_key(&mut self, id: i64);
}

/// An aliased reference to an entity inside a query.
pub trait EntityPath: Copy {
    type Entity: Entity;

    fn alias(&self) -> &'static str;

    fn descriptor(&self) -> &'static EntityDescriptor {
        <Self::Entity as Entity>::descriptor()
    }

    /// `COUNT` over this entity's primary key.
    fn count(&self) -> Expr<i64> {
        let descriptor = self.descriptor();
        let key = Node::Column {
            alias: self.alias(),
            name: descriptor.primary_key,
        };
        Expr::from_node(Node::aggregate_count(key, false))
    }

    /// Look a column up by name, checking its type at runtime.
    fn field<T: SqlType>(&self, name: &str) -> Result<Column<T>, BuildError> {
        let descriptor = self.descriptor();
        let field = descriptor
            .field(name)
            .ok_or_else(|| BuildError::UnknownField {
                entity: descriptor.name,
                field: name.to_string(),
            })?;

        if field.kind != T::KIND {
            return Err(BuildError::TypeMismatch {
                entity: descriptor.name,
                field: name.to_string(),
                expected: T::KIND,
                found: field.kind,
            });
        }

        Ok(Column::new(self.alias(), field.name))
    }

    /// Project this entity as optional, for the nullable side of outer joins.
    fn maybe(self) -> Maybe<Self> {
        Maybe::new(self)
    }
}

/// A typed column of an aliased entity.
pub struct Column<T> {
    alias: &'static str,
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Column<T> {
    pub const fn new(alias: &'static str, name: &'static str) -> Self {
        Self {
            alias,
            name,
            _marker: PhantomData,
        }
    }

    pub fn alias(&self) -> &'static str {
        self.alias
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for Column<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Column<T> {}

impl<T> fmt::Debug for Column<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.alias, self.name)
    }
}

/// A typed relation from the entity at `owner_alias` to `T`.
pub struct Association<S, T> {
    owner_alias: &'static str,
    name: &'static str,
    _marker: PhantomData<fn() -> (S, T)>,
}

impl<S, T> Association<S, T> {
    pub const fn new(owner_alias: &'static str, name: &'static str) -> Self {
        Self {
            owner_alias,
            name,
            _marker: PhantomData,
        }
    }

    pub fn owner_alias(&self) -> &'static str {
        self.owner_alias
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<S: Entity, T: Entity> Association<S, T> {
    pub fn descriptor(&self) -> Result<&'static AssociationDescriptor, BuildError> {
        S::descriptor().association(self.name).ok_or_else(|| {
            BuildError::InvalidJoin(format!(
                "{} has no association `{}`",
                S::descriptor().name,
                self.name
            ))
        })
    }
}

impl<S, T> Clone for Association<S, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S, T> Copy for Association<S, T> {}

impl<S, T> fmt::Debug for Association<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner_alias, self.name)
    }
}

/// State of an association on a materialized entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Related<T> {
    /// The association was not part of the query.
    NotLoaded,
    Loaded(T),
}

impl<T> Default for Related<T> {
    fn default() -> Self {
        Related::NotLoaded
    }
}

impl<T> Related<T> {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Related::Loaded(_))
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Related::Loaded(value) => Some(value),
            Related::NotLoaded => None,
        }
    }

    pub fn into_loaded(self) -> Option<T> {
        match self {
            Related::Loaded(value) => Some(value),
            Related::NotLoaded => None,
        }
    }
}

/// Decode an entity whose columns may all be NULL because it sits on the
/// outer side of a join.
pub fn decode_nullable<E: Entity>(reader: &mut RowReader<'_>) -> Result<Option<E>, QueryError> {
    let descriptor = E::descriptor();
    if reader.is_null_at(descriptor.primary_key_index())? {
        reader.skip(descriptor.fields.len());
        return Ok(None);
    }
    E::decode(reader).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{Member, QMember, QTeam, Team};
    use assert_matches::assert_matches;

    #[test]
    fn test_member_descriptor() {
        let descriptor = Member::descriptor();
        assert_eq!(descriptor.table, "member");
        assert_eq!(descriptor.primary_key, "id");
        assert_eq!(
            descriptor.column_names(),
            vec!["id", "username", "age", "team_id"]
        );

        let username = descriptor.field("username").unwrap();
        assert_eq!(username.kind, ValueKind::Text);
        assert!(username.nullable);

        let team = descriptor.association("team").unwrap();
        assert!(team.is_owning());
        assert_eq!(team.target().name, "Team");
    }

    #[test]
    fn test_one_to_many_is_not_owning() {
        let members = Team::descriptor().association("members").unwrap();
        assert_eq!(members.kind, AssociationKind::OneToMany);
        assert!(!members.is_owning());
        assert_eq!(members.join_column, "team_id");
    }

    #[test]
    fn test_create_table_sql() {
        let sql = Member::descriptor().create_table_sql();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"member\""));
        assert!(sql.contains("\"id\" INTEGER PRIMARY KEY"));
        assert!(sql.contains("\"age\" INTEGER NOT NULL"));
        assert!(sql.contains("\"username\" TEXT,"));
        assert!(sql.contains("FOREIGN KEY (\"team_id\") REFERENCES \"team\" (\"id\")"));
    }

    #[test]
    fn test_insert_sql() {
        assert_eq!(
            Member::descriptor().insert_sql(),
            "INSERT INTO \"member\" (\"username\", \"age\", \"team_id\") VALUES (?1, ?2, ?3)"
        );
    }

    #[test]
    fn test_dynamic_field_lookup() {
        let m = QMember::new("m");
        let age = m.field::<i32>("age").unwrap();
        assert_eq!(age.alias(), "m");
        assert_eq!(age.name(), "age");

        assert_matches!(
            m.field::<String>("age"),
            Err(BuildError::TypeMismatch {
                expected: ValueKind::Text,
                found: ValueKind::Integer,
                ..
            })
        );
        assert_matches!(
            QTeam::new("t").field::<String>("nickname"),
            Err(BuildError::UnknownField { entity: "Team", .. })
        );
    }

    #[test]
    fn test_related_state() {
        let related: Related<Option<Team>> = Related::default();
        assert!(!related.is_loaded());
        assert_eq!(related.get(), None);

        let loaded = Related::Loaded(None::<Team>);
        assert!(loaded.is_loaded());
        assert_eq!(loaded.into_loaded(), Some(None));
    }
}
