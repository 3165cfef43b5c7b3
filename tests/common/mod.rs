//! Shared setup for the integration tests
//!
//! Every fixture gets its own in-memory database holding the sample schema:
//! teamA (m1 15, m2 21) and teamB (m3 52, m4 62).

#![allow(dead_code)]

use querykit::sample::{self, Member, Team};
use querykit::store::persist;
use querykit::{Session, Store};

pub struct Fixture {
    pub store: Store,
    pub session: Session,
    pub team_a: Team,
    pub team_b: Team,
}

impl Fixture {
    /// Insert an extra member, optionally on a team.
    pub async fn add_member(&mut self, username: Option<&str>, age: i32, team: Option<&Team>) {
        let mut member = Member::new(username, age, team);
        persist(&mut self.session, &mut member)
            .await
            .expect("insert member");
    }

    pub async fn add_team(&mut self, name: &str) -> Team {
        let mut team = Team::new(name);
        persist(&mut self.session, &mut team)
            .await
            .expect("insert team");
        team
    }
}

pub async fn setup() -> Fixture {
    let store = Store::in_memory().await.expect("open in-memory store");
    let mut session = store.session().await.expect("acquire session");

    let sync = sample::create_schema(&mut session).await;
    assert!(sync.is_ok(), "schema sync failed: {:?}", sync.errors);

    let (team_a, team_b) = sample::seed(&mut session).await.expect("seed sample data");

    Fixture {
        store,
        session,
        team_a,
        team_b,
    }
}
