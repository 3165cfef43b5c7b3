//! Integration tests for projected expressions
//!
//! CASE, constants, string concatenation and dynamic tuples.

mod common;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use querykit::prelude::*;
use querykit::sample::{QMember, QTeam};

#[tokio::test]
async fn test_simple_case() {
    let mut fx = common::setup().await;
    let m = QMember::new("m");

    let labels = select(
        m.age
            .when(15)
            .then("fifteen")
            .when(21)
            .then("twenty-one")
            .otherwise("other"),
    )
    .from(m)
    .order_by(m.age.asc())
    .fetch(&mut fx.session)
    .await
    .unwrap();

    assert_eq!(labels, vec!["fifteen", "twenty-one", "other", "other"]);
}

#[tokio::test]
async fn test_searched_case() {
    let mut fx = common::setup().await;
    let m = QMember::new("m");

    let rows = select((
        m.username,
        case()
            .when(m.age.between(0, 20))
            .then("0-20")
            .when(m.age.between(21, 30))
            .then("21-30")
            .otherwise("other"),
    ))
    .from(m)
    .order_by(m.username.asc())
    .fetch(&mut fx.session)
    .await
    .unwrap();

    let bands: Vec<_> = rows.into_iter().map(|(_, band)| band).collect();
    assert_eq!(bands, vec!["0-20", "21-30", "other", "other"]);
}

#[tokio::test]
async fn test_case_without_default_yields_null() {
    let mut fx = common::setup().await;
    let m = QMember::new("m");

    let rows = select(case().when(m.age.lt(20)).then(1).end())
        .from(m)
        .order_by(m.age.asc())
        .fetch(&mut fx.session)
        .await
        .unwrap();

    assert_eq!(rows, vec![Some(1), None, None, None]);
}

#[tokio::test]
async fn test_case_in_order_by() {
    let mut fx = common::setup().await;
    let m = QMember::new("m");

    // Members in their twenties first, then by age
    let rank = case().when(m.age.between(21, 30)).then(0).otherwise(1);
    let ages = select(m.age)
        .from(m)
        .order_by(rank.asc())
        .order_by(m.age.asc())
        .fetch(&mut fx.session)
        .await
        .unwrap();

    assert_eq!(ages, vec![21, 15, 52, 62]);
}

#[tokio::test]
async fn test_constant_projection() {
    let mut fx = common::setup().await;
    let m = QMember::new("m");

    let rows = select((m.username, constant("A")))
        .from(m)
        .order_by(m.username.asc())
        .limit(1)
        .fetch(&mut fx.session)
        .await
        .unwrap();

    assert_eq!(rows, vec![(Some("m1".to_string()), "A".to_string())]);
}

#[tokio::test]
async fn test_concat() {
    let mut fx = common::setup().await;
    let m = QMember::new("m");

    let value = select(m.username.concat("_").concat(m.age.string_value()))
        .from(m)
        .filter(m.username.eq("m1"))
        .fetch_one(&mut fx.session)
        .await
        .unwrap();

    assert_eq!(value, Some(Some("m1_15".to_string())));
}

#[tokio::test]
async fn test_string_functions() {
    let mut fx = common::setup().await;
    let m = QMember::new("m");
    fx.add_member(Some("Alice"), 28, None).await;

    let row = select((m.username.lower(), m.username.length()))
        .from(m)
        .filter(m.username.eq("Alice"))
        .fetch_one(&mut fx.session)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(row, (Some("alice".to_string()), Some(5)));
}

#[tokio::test]
async fn test_null_operands_stay_null() {
    let mut fx = common::setup().await;
    let m = QMember::new("m");
    fx.add_member(None, 40, None).await;

    let row = select((
        m.username.length(),
        m.team_id.string_value(),
        m.username.upper(),
        m.username.concat("_").concat(m.age.string_value()),
    ))
    .from(m)
    .filter(m.age.eq(40))
    .fetch_one(&mut fx.session)
    .await
    .unwrap()
    .unwrap();

    assert_eq!(row, (None, None, None, None));
}

#[tokio::test]
async fn test_concat_with_nullable_right_side() {
    let mut fx = common::setup().await;
    let m = QMember::new("m");
    let t = QTeam::new("t");
    fx.add_member(None, 40, None).await;

    let labels = select(t.name.concat(":").concat(m.username))
        .from(m)
        .from(t)
        .filter(m.age.eq(40).or(m.username.eq("m1")))
        .order_by(t.name.asc())
        .order_by(m.age.asc())
        .fetch(&mut fx.session)
        .await
        .unwrap();

    assert_eq!(
        labels,
        vec![
            Some("teamA:m1".to_string()),
            None,
            Some("teamB:m1".to_string()),
            None,
        ]
    );
}

// ============================================================================
// Dynamic tuples
// ============================================================================

#[tokio::test]
async fn test_tuple_projection() {
    let mut fx = common::setup().await;
    let m = QMember::new("m");

    let rows = select_tuple([m.username.into_any(), m.age.into_any()])
        .from(m)
        .order_by(m.age.asc())
        .fetch(&mut fx.session)
        .await
        .unwrap();

    assert_eq!(rows.len(), 4);
    let first = &rows[0];
    assert_eq!(first.get(&m.username).unwrap(), Some("m1".to_string()));
    assert_eq!(first.get(&m.age).unwrap(), 15);
    assert_eq!(first.to_string(), "[m1, 15]");
    assert_eq!(serde_json::to_string(first).unwrap(), r#"["m1",15]"#);
}

#[tokio::test]
async fn test_tuple_with_aggregates() {
    let mut fx = common::setup().await;
    let m = QMember::new("m");
    let avg = m.age.avg();

    let row = select_tuple([m.team_id.into_any(), avg.clone().into_any()])
        .from(m)
        .group_by(m.team_id)
        .order_by(m.team_id.asc())
        .fetch_first(&mut fx.session)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(row.get(&m.team_id).unwrap(), Some(fx.team_a.id));
    assert_eq!(row.get(&avg).unwrap(), 18.0);
    assert_matches!(
        row.get(&m.username),
        Err(QueryError::NotInProjection(_))
    );
}

#[tokio::test]
async fn test_empty_tuple_projection_rejected() {
    let mut fx = common::setup().await;
    let m = QMember::new("m");

    let result = select_tuple(std::iter::empty())
        .from(m)
        .fetch(&mut fx.session)
        .await;

    assert_matches!(result, Err(QueryError::Build(BuildError::EmptyProjection)));
}
