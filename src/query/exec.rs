//! Terminal operations
//!
//! Each terminal renders the query, runs it on the caller's connection and
//! maps every row through the projection. The connection is only borrowed;
//! nothing here opens, commits or closes it.

use serde::Serialize;
use sqlx::SqliteConnection;
use sqlx::sqlite::SqliteRow;

use crate::error::QueryError;
use crate::value::RowReader;

use super::render::{self, RenderedQuery};
use super::{Projection, Query, Select};

/// One page of results plus the total across all pages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResults<T> {
    pub results: Vec<T>,
    pub total: u64,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl<T> QueryResults<T> {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Whether rows exist beyond this page.
    pub fn has_next(&self) -> bool {
        let seen = self.offset.unwrap_or(0) + self.results.len() as u64;
        seen < self.total
    }
}

async fn run(
    conn: &mut SqliteConnection,
    rendered: &RenderedQuery,
) -> Result<Vec<SqliteRow>, QueryError> {
    tracing::debug!(sql = %rendered.sql, params = rendered.params.len(), "Executing query");

    let mut query = sqlx::query(&rendered.sql);
    for value in &rendered.params {
        query = value.bind_to_query(query);
    }

    Ok(query.fetch_all(&mut *conn).await?)
}

impl<P: Projection> Query<P> {
    fn decode_rows(&self, select: &Select, rows: &[SqliteRow]) -> Result<Vec<P::Output>, QueryError> {
        rows.iter()
            .map(|row| {
                let mut reader = RowReader::new(row);
                self.projection.decode(&mut reader, &select.joins)
            })
            .collect()
    }

    async fn fetch_select(
        &self,
        select: &Select,
        conn: &mut SqliteConnection,
    ) -> Result<Vec<P::Output>, QueryError> {
        let rendered = render::render(select)?;
        let rows = run(conn, &rendered).await?;
        self.decode_rows(select, &rows)
    }

    /// Execute the query and return every row.
    pub async fn fetch(self, conn: &mut SqliteConnection) -> Result<Vec<P::Output>, QueryError> {
        let select = self.to_select();
        self.fetch_select(&select, conn).await
    }

    /// Execute the query expecting at most one row.
    pub async fn fetch_one(
        self,
        conn: &mut SqliteConnection,
    ) -> Result<Option<P::Output>, QueryError> {
        let mut rows = self.fetch(conn).await?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            n => Err(QueryError::NonUniqueResult { rows: n }),
        }
    }

    /// Execute with `LIMIT 1` and return the first row, if any.
    pub async fn fetch_first(
        self,
        conn: &mut SqliteConnection,
    ) -> Result<Option<P::Output>, QueryError> {
        let mut select = self.to_select();
        select.limit = Some(1);
        let rows = self.fetch_select(&select, conn).await?;
        Ok(rows.into_iter().next())
    }

    /// Execute the page and a separate total-count query.
    pub async fn fetch_results(
        self,
        conn: &mut SqliteConnection,
    ) -> Result<QueryResults<P::Output>, QueryError> {
        let select = self.to_select();
        let total = count(&select, conn).await?;

        let results = if total == 0 {
            Vec::new()
        } else {
            self.fetch_select(&select, conn).await?
        };

        Ok(QueryResults {
            results,
            total,
            offset: select.offset,
            limit: select.limit,
        })
    }

    /// Count the rows the query would return without paging.
    pub async fn fetch_count(self, conn: &mut SqliteConnection) -> Result<u64, QueryError> {
        count(&self.to_select(), conn).await
    }
}

async fn count(select: &Select, conn: &mut SqliteConnection) -> Result<u64, QueryError> {
    let rendered = render::render_count(select)?;
    let rows = run(conn, &rendered).await?;

    let total = match rows.first() {
        Some(row) => RowReader::new(row).read::<i64>()?,
        None => 0,
    };
    Ok(u64::try_from(total).unwrap_or_default())
}
