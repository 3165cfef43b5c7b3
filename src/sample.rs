//! Sample schema: teams and their members
//!
//! Used by the demo binary and the test suites.

use serde::Serialize;
use sqlx::SqliteConnection;

use crate::error::QueryError;
use crate::schema::{Entity, Related};
use crate::store::{SchemaSyncResult, persist, sync_schema};

#[derive(Debug, Clone, PartialEq, Serialize, crate::Entity)]
#[entity(table = "team")]
pub struct Team {
    #[entity(primary_key)]
    pub id: i64,
    pub name: String,
    #[entity(one_to_many(join_column = "team_id"))]
    pub members: Related<Vec<Member>>,
}

impl Team {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            members: Related::NotLoaded,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, crate::Entity)]
#[entity(table = "member")]
pub struct Member {
    #[entity(primary_key)]
    pub id: i64,
    pub username: Option<String>,
    pub age: i32,
    pub team_id: Option<i64>,
    #[entity(many_to_one(join_column = "team_id"))]
    pub team: Related<Option<Team>>,
}

impl Member {
    pub fn new(username: Option<&str>, age: i32, team: Option<&Team>) -> Self {
        Self {
            id: 0,
            username: username.map(str::to_string),
            age,
            team_id: team.map(|t| t.id),
            team: Related::NotLoaded,
        }
    }
}

/// Create the `team` and `member` tables.
pub async fn create_schema(conn: &mut SqliteConnection) -> SchemaSyncResult {
    sync_schema(conn, &[Team::descriptor(), Member::descriptor()]).await
}

/// Insert teamA (m1 15, m2 21) and teamB (m3 52, m4 62).
pub async fn seed(conn: &mut SqliteConnection) -> Result<(Team, Team), QueryError> {
    let mut team_a = Team::new("teamA");
    let mut team_b = Team::new("teamB");
    persist(conn, &mut team_a).await?;
    persist(conn, &mut team_b).await?;

    let mut members = [
        Member::new(Some("m1"), 15, Some(&team_a)),
        Member::new(Some("m2"), 21, Some(&team_a)),
        Member::new(Some("m3"), 52, Some(&team_b)),
        Member::new(Some("m4"), 62, Some(&team_b)),
    ];
    for member in &mut members {
        persist(conn, member).await?;
    }

    tracing::debug!(teams = 2, members = members.len(), "Seeded sample data");
    Ok((team_a, team_b))
}
