//! Integration tests for aggregates, grouping and HAVING

mod common;

use pretty_assertions::assert_eq;
use querykit::prelude::*;
use querykit::sample::{QMember, QTeam};

#[tokio::test]
async fn test_aggregate_functions() {
    let mut fx = common::setup().await;
    let m = QMember::new("m");

    let row = select((m.count(), m.age.sum(), m.age.avg(), m.age.max(), m.age.min()))
        .from(m)
        .fetch_one(&mut fx.session)
        .await
        .unwrap()
        .expect("aggregates always return a row");

    assert_eq!(row, (4, 150, 37.5, 62, 15));
}

#[tokio::test]
async fn test_count_all_and_distinct() {
    let mut fx = common::setup().await;
    let m = QMember::new("m");

    let (all, teams) = select((count_all(), m.team_id.count_distinct()))
        .from(m)
        .fetch_one(&mut fx.session)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(all, 4);
    assert_eq!(teams, 2);
}

#[tokio::test]
async fn test_aggregate_over_no_rows() {
    let mut fx = common::setup().await;
    let m = QMember::new("m");

    let (count, max) = select((m.count(), m.age.max().nullable()))
        .from(m)
        .filter(m.age.gt(1000))
        .fetch_one(&mut fx.session)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(count, 0);
    assert_eq!(max, None);
}

#[tokio::test]
async fn test_non_nullable_aggregate_over_no_rows() {
    let mut fx = common::setup().await;
    let m = QMember::new("m");

    let result = select(m.age.max())
        .from(m)
        .filter(m.age.gt(1000))
        .fetch_one(&mut fx.session)
        .await;

    assert!(matches!(result, Err(QueryError::UnexpectedNull { .. })));
}

#[tokio::test]
async fn test_group_by_team() {
    let mut fx = common::setup().await;
    let m = QMember::new("m");
    let t = QTeam::new("t");

    let rows = select((t.name, m.age.avg()))
        .from(m)
        .join(m.team, t)
        .group_by(t.name)
        .order_by(t.name.asc())
        .fetch(&mut fx.session)
        .await
        .unwrap();

    assert_eq!(
        rows,
        vec![("teamA".to_string(), 18.0), ("teamB".to_string(), 57.0)]
    );
}

#[tokio::test]
async fn test_having_filters_groups() {
    let mut fx = common::setup().await;
    let m = QMember::new("m");
    let t = QTeam::new("t");

    let rows = select((t.name, m.count()))
        .from(m)
        .join(m.team, t)
        .group_by(t.name)
        .having(m.age.avg().gt(30))
        .fetch(&mut fx.session)
        .await
        .unwrap();

    assert_eq!(rows, vec![("teamB".to_string(), 2)]);
}

#[tokio::test]
async fn test_arithmetic_in_projection() {
    let mut fx = common::setup().await;
    let m = QMember::new("m");

    let rows = select((m.age.add(1), m.age.multiply(2), m.age.divide(2)))
        .from(m)
        .filter(m.username.eq("m1"))
        .fetch(&mut fx.session)
        .await
        .unwrap();

    // Integer division, as in SQLite
    assert_eq!(rows, vec![(16, 30, 7)]);
}

#[tokio::test]
async fn test_mixed_arithmetic_promotes() {
    let mut fx = common::setup().await;
    let m = QMember::new("m");

    let rows = select((m.age.add(0.5), m.age.divide(2.0), m.age.multiply(10_i64)))
        .from(m)
        .filter(m.username.eq("m1"))
        .fetch(&mut fx.session)
        .await
        .unwrap();

    assert_eq!(rows, vec![(15.5, 7.5, 150_i64)]);
}

#[tokio::test]
async fn test_arithmetic_on_nullable_column() {
    let mut fx = common::setup().await;
    let m = QMember::new("m");
    fx.add_member(Some("loner"), 33, None).await;

    let rows = select((m.username, m.team_id.add(100), m.age.add(m.team_id)))
        .from(m)
        .filter(m.username.is_in(["m1", "loner"]))
        .order_by(m.age.asc())
        .fetch(&mut fx.session)
        .await
        .unwrap();

    let team_a = fx.team_a.id;
    assert_eq!(
        rows,
        vec![
            (Some("m1".to_string()), Some(team_a + 100), Some(15 + team_a)),
            (Some("loner".to_string()), None, None),
        ]
    );
}

#[tokio::test]
async fn test_avg_over_nullable_column() {
    let mut fx = common::setup().await;
    let m = QMember::new("m");
    fx.add_member(Some("loner"), 33, None).await;

    // The teamless member is skipped by AVG.
    let avg = select(m.team_id.avg())
        .from(m)
        .fetch_one(&mut fx.session)
        .await
        .unwrap();
    assert_eq!(avg, Some(Some(1.5)));

    let none = select(m.team_id.avg())
        .from(m)
        .filter(m.username.eq("loner"))
        .fetch_one(&mut fx.session)
        .await
        .unwrap();
    assert_eq!(none, Some(None));
}

#[tokio::test]
async fn test_order_by_aggregate() {
    let mut fx = common::setup().await;
    let m = QMember::new("m");
    let t = QTeam::new("t");

    let names = select(t.name)
        .from(m)
        .join(m.team, t)
        .group_by(t.name)
        .order_by(m.age.sum().desc())
        .fetch(&mut fx.session)
        .await
        .unwrap();

    assert_eq!(names, vec!["teamB".to_string(), "teamA".to_string()]);
}
