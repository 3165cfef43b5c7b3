//! Connection pool, schema sync and fixture inserts
//!
//! Queries only need a `&mut SqliteConnection`; this module is one way to
//! get one. It also keeps tables in step with entity descriptors:
//! - Creates missing tables
//! - Adds missing columns
//! - Does NOT handle column renames or type changes

use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::QueryError;
use crate::schema::{Entity, EntityDescriptor, FieldDescriptor};

/// A pooled connection; derefs to `SqliteConnection`.
pub type Session = PoolConnection<Sqlite>;

#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open a pool for the configured database, creating the file if needed.
    pub async fn connect(config: &Config) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .with_context(|| format!("Invalid DATABASE_URL: {}", config.database_url))?
            .create_if_missing(true)
            .foreign_keys(true);

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.pool_size())
            .acquire_timeout(config.connect_timeout);

        if config.is_memory() {
            // Dropping the last connection drops the database.
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .context("Failed to open database")?;

        info!(
            service = "database",
            max_connections = config.pool_size(),
            "Database connected"
        );
        Ok(Self { pool })
    }

    /// A private in-memory database.
    pub async fn in_memory() -> Result<Self> {
        Self::connect(&Config::default()).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn session(&self) -> Result<Session> {
        self.pool
            .acquire()
            .await
            .context("Failed to acquire a connection")
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Result of a schema sync operation
#[derive(Debug, Default)]
pub struct SchemaSyncResult {
    pub tables_created: Vec<String>,
    pub columns_added: Vec<(String, String)>, // (table, column)
    pub errors: Vec<String>,
}

impl SchemaSyncResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn merge(&mut self, other: SchemaSyncResult) {
        self.tables_created.extend(other.tables_created);
        self.columns_added.extend(other.columns_added);
        self.errors.extend(other.errors);
    }
}

/// Check if a table exists in the database
async fn table_exists(conn: &mut SqliteConnection, table_name: &str) -> Result<bool, sqlx::Error> {
    let result: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name = ?")
            .bind(table_name)
            .fetch_optional(&mut *conn)
            .await?;

    Ok(result.is_some())
}

/// Get existing columns for a table
async fn get_table_columns(
    conn: &mut SqliteConnection,
    table_name: &str,
) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(i32, String, String, i32, Option<String>, i32)> =
        sqlx::query_as(&format!("PRAGMA table_info(\"{}\")", table_name))
            .fetch_all(&mut *conn)
            .await?;

    Ok(rows.into_iter().map(|(_, name, _, _, _, _)| name).collect())
}

/// Sync a single entity's table to the database
pub async fn sync_entity(
    conn: &mut SqliteConnection,
    descriptor: &EntityDescriptor,
) -> Result<SchemaSyncResult, sqlx::Error> {
    let mut result = SchemaSyncResult::default();
    let table_name = descriptor.table;

    if !table_exists(conn, table_name).await? {
        let create_sql = descriptor.create_table_sql();
        debug!("Creating table {}: {}", table_name, create_sql);

        match sqlx::query(&create_sql).execute(&mut *conn).await {
            Ok(_) => {
                info!("Created table: {}", table_name);
                result.tables_created.push(table_name.to_string());
            }
            Err(e) => {
                let msg = format!("Failed to create table {}: {}", table_name, e);
                warn!("{}", msg);
                result.errors.push(msg);
            }
        }
    } else {
        let existing_columns = get_table_columns(conn, table_name).await?;

        for field in descriptor.fields {
            if existing_columns.iter().any(|c| c == field.name) {
                continue;
            }

            let alter_sql = generate_add_column_sql(table_name, field);
            debug!("Adding column to {}: {}", table_name, alter_sql);

            match sqlx::query(&alter_sql).execute(&mut *conn).await {
                Ok(_) => {
                    info!("Added column {}.{}", table_name, field.name);
                    result
                        .columns_added
                        .push((table_name.to_string(), field.name.to_string()));
                }
                Err(e) => {
                    let msg = format!("Failed to add column {}.{}: {}", table_name, field.name, e);
                    warn!("{}", msg);
                    result.errors.push(msg);
                }
            }
        }
    }

    Ok(result)
}

/// Generate ALTER TABLE ADD COLUMN SQL
fn generate_add_column_sql(table_name: &str, field: &FieldDescriptor) -> String {
    let mut sql = format!(
        "ALTER TABLE \"{}\" ADD COLUMN \"{}\" {}",
        table_name,
        field.name,
        field.kind.sql_type()
    );

    // SQLite cannot add a NOT NULL column without a default
    if !field.nullable {
        let default_val = match field.kind.sql_type() {
            "TEXT" => "''",
            "REAL" => "0.0",
            _ => "0",
        };
        sql.push_str(&format!(" NOT NULL DEFAULT {}", default_val));
    }

    sql
}

/// Sync every descriptor's table, in order. Targets of many-to-one
/// associations should come before their owners.
pub async fn sync_schema(
    conn: &mut SqliteConnection,
    descriptors: &[&EntityDescriptor],
) -> SchemaSyncResult {
    let mut total_result = SchemaSyncResult::default();

    for descriptor in descriptors {
        match sync_entity(conn, descriptor).await {
            Ok(result) => total_result.merge(result),
            Err(e) => total_result
                .errors
                .push(format!("Error syncing {}: {}", descriptor.name, e)),
        }
    }

    if !total_result.errors.is_empty() {
        warn!(errors = total_result.errors.len(), "Schema sync finished with errors");
    }

    total_result
}

/// Insert an entity and store its generated key back on it.
pub async fn persist<E: Entity>(conn: &mut SqliteConnection, entity: &mut E) -> Result<i64, QueryError> {
    let descriptor = E::descriptor();
    let sql = descriptor.insert_sql();
    let values = entity.column_values();

    debug!(table = descriptor.table, "Inserting row");

    let mut query = sqlx::query(&sql);
    for value in &values {
        query = value.bind_to_query(query);
    }
    let id = query.execute(&mut *conn).await?.last_insert_rowid();

    entity.set_primary_key(id);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;

    #[test]
    fn test_add_column_sql() {
        let nullable = FieldDescriptor {
            name: "nickname",
            kind: ValueKind::Text,
            nullable: true,
            primary_key: false,
        };
        assert_eq!(
            generate_add_column_sql("member", &nullable),
            "ALTER TABLE \"member\" ADD COLUMN \"nickname\" TEXT"
        );

        let required = FieldDescriptor {
            name: "score",
            kind: ValueKind::Real,
            nullable: false,
            primary_key: false,
        };
        assert_eq!(
            generate_add_column_sql("member", &required),
            "ALTER TABLE \"member\" ADD COLUMN \"score\" REAL NOT NULL DEFAULT 0.0"
        );
    }
}
