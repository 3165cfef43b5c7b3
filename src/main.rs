//! querykit demo
//!
//! Seeds the sample schema and runs a tour of the query builder, printing
//! every result set as JSON.

mod cli;

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::SqliteConnection;

use querykit::config::Config;
use querykit::prelude::*;
use querykit::sample::{self, QMember, QTeam};
use querykit::{Projection, Store, logging};

use crate::cli::CliOptions;

#[tokio::main]
async fn main() -> Result<()> {
    let options = CliOptions::from_args();
    if options.help {
        println!("{}", CliOptions::usage());
        return Ok(());
    }

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    logging::init(&config)?;

    tracing::info!("Starting querykit demo");

    let store = Store::connect(&config).await?;
    let mut session = store.session().await?;

    let sync = sample::create_schema(&mut session).await;
    if !sync.is_ok() {
        anyhow::bail!("Schema sync failed: {}", sync.errors.join("; "));
    }
    sample::seed(&mut session)
        .await
        .context("Failed to seed sample data")?;

    let demo = Demo {
        conn: &mut session,
        show_sql: options.show_sql,
    };
    demo.run().await?;

    drop(session);
    store.close().await;
    Ok(())
}

struct Demo<'c> {
    conn: &'c mut SqliteConnection,
    show_sql: bool,
}

impl Demo<'_> {
    async fn show<P>(&mut self, title: &str, query: Query<P>) -> Result<()>
    where
        P: Projection,
        P::Output: Serialize,
    {
        if self.show_sql {
            let rendered = query.render()?;
            println!("-- {title}\n{}", rendered.sql);
        }
        let rows = query.fetch(self.conn).await?;
        println!("{title}: {}", serde_json::to_string(&rows)?);
        Ok(())
    }

    async fn run(mut self) -> Result<()> {
        let m = QMember::new("m");
        let t = QTeam::new("t");
        let sub = QMember::new("sub");

        self.show(
            "search",
            select_from(m).filter(m.username.eq("m1").and(m.age.between(10, 30))),
        )
        .await?;

        self.show(
            "sort",
            select(m.username)
                .from(m)
                .order_by(m.age.desc())
                .order_by(m.username.asc().nulls_last()),
        )
        .await?;

        let page = select(m.username)
            .from(m)
            .order_by(m.username.desc())
            .offset(1)
            .limit(2)
            .fetch_results(self.conn)
            .await?;
        println!("paging: {}", serde_json::to_string(&page)?);

        self.show(
            "aggregation",
            select((m.count(), m.age.sum(), m.age.avg(), m.age.max(), m.age.min())).from(m),
        )
        .await?;

        self.show(
            "grouping",
            select((t.name, m.age.avg()))
                .from(m)
                .join(m.team, t)
                .group_by(t.name)
                .order_by(t.name.asc()),
        )
        .await?;

        self.show(
            "join",
            select(m.username)
                .from(m)
                .join(m.team, t)
                .filter(t.name.eq("teamA")),
        )
        .await?;

        self.show(
            "left join on",
            select((m.username, t.maybe()))
                .from(m)
                .left_join(m.team, t)
                .on(t.name.eq("teamA"))
                .order_by(m.username.asc()),
        )
        .await?;

        self.show(
            "fetch join",
            select_from(m)
                .join(m.team, t)
                .fetch_join()
                .filter(m.username.eq("m1")),
        )
        .await?;

        self.show(
            "oldest",
            select(m.username)
                .from(m)
                .filter(m.age.eq(select(sub.age.max()).from(sub))),
        )
        .await?;

        self.show(
            "age bands",
            select((
                m.username,
                case()
                    .when(m.age.between(0, 20))
                    .then("0-20")
                    .when(m.age.between(21, 30))
                    .then("21-30")
                    .otherwise("other"),
            ))
            .from(m)
            .order_by(m.username.asc()),
        )
        .await?;

        self.show(
            "concat",
            select(m.username.concat("_").concat(m.age.string_value()))
                .from(m)
                .filter(m.username.eq("m1")),
        )
        .await?;

        Ok(())
    }
}
