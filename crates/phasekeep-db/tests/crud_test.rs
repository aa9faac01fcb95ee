//! Integration tests for template, project and phase queries.

use sqlx::PgPool;
use uuid::Uuid;

use phasekeep_db::models::{PositionKind, TemplateRow};
use phasekeep_db::queries::phases::{self, NewProjectPhase};
use phasekeep_db::queries::{projects, templates};
use phasekeep_test_utils::{create_test_db, drop_test_db};

async fn seed_template(pool: &PgPool, name: &str) -> TemplateRow {
    let mut tx = pool.begin().await.unwrap();
    let template = templates::insert_template(&mut *tx, name).await.unwrap();
    templates::insert_template_phase(
        &mut *tx,
        template.id,
        Uuid::new_v4(),
        "Kickoff",
        Some(PositionKind::First),
        None,
    )
    .await
    .unwrap();
    templates::insert_template_phase(
        &mut *tx,
        template.id,
        Uuid::new_v4(),
        "Close",
        Some(PositionKind::Last),
        None,
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();
    template
}

fn custom(name: &str, value: i32) -> NewProjectPhase<'_> {
    NewProjectPhase {
        id: Uuid::new_v4(),
        name,
        is_linked: false,
        source_project_id: None,
        position_kind: Some(PositionKind::Nth),
        position_value: Some(value),
    }
}

#[tokio::test]
async fn template_round_trip() {
    let (pool, db_name) = create_test_db().await;

    let template = seed_template(&pool, "Delivery").await;
    let fetched = templates::get_template(&pool, template.id).await.unwrap().unwrap();
    assert_eq!(fetched.name, "Delivery");

    let by_name = templates::find_template_by_name(&pool, "delivery").await.unwrap();
    assert_eq!(by_name.map(|t| t.id), Some(template.id));

    let phases = templates::list_template_phases(&pool, template.id).await.unwrap();
    let names: Vec<_> = phases.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Kickoff", "Close"]);
    assert_eq!(phases[0].position_kind, Some(PositionKind::First));
    assert_eq!(phases[1].position_value, None);

    assert_eq!(templates::list_templates(&pool).await.unwrap().len(), 1);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn template_phase_names_are_unique_ignoring_case() {
    let (pool, db_name) = create_test_db().await;
    let template = seed_template(&pool, "Delivery").await;

    let mut conn = pool.acquire().await.unwrap();
    let result = templates::insert_template_phase(
        &mut *conn,
        template.id,
        Uuid::new_v4(),
        "KICKOFF",
        Some(PositionKind::Nth),
        Some(2),
    )
    .await;
    assert!(result.is_err());

    drop(conn);
    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn template_phase_position_update_and_delete() {
    let (pool, db_name) = create_test_db().await;
    let template = seed_template(&pool, "Delivery").await;
    let close = templates::list_template_phases(&pool, template.id).await.unwrap()[1].clone();

    let mut conn = pool.acquire().await.unwrap();
    let affected = templates::update_template_phase_position(
        &mut *conn,
        template.id,
        close.id,
        Some(PositionKind::LastMinusN),
        Some(1),
    )
    .await
    .unwrap();
    assert_eq!(affected, 1);

    // Wrong owner matches nothing.
    let affected = templates::update_template_phase_position(
        &mut *conn,
        Uuid::new_v4(),
        close.id,
        Some(PositionKind::Last),
        None,
    )
    .await
    .unwrap();
    assert_eq!(affected, 0);

    let affected = templates::delete_template_phase(&mut *conn, template.id, close.id).await.unwrap();
    assert_eq!(affected, 1);
    let affected = templates::delete_template_phase(&mut *conn, template.id, close.id).await.unwrap();
    assert_eq!(affected, 0);

    drop(conn);
    assert_eq!(templates::list_template_phases(&pool, template.id).await.unwrap().len(), 1);
    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn project_requires_existing_template() {
    let (pool, db_name) = create_test_db().await;

    let result = projects::insert_project(&pool, "Apollo", Uuid::new_v4()).await;
    assert!(result.is_err());

    let template = seed_template(&pool, "Delivery").await;
    let project = projects::insert_project(&pool, "Apollo", template.id).await.unwrap();
    assert_eq!(project.template_id, template.id);

    let found = projects::find_project_by_name(&pool, "APOLLO").await.unwrap();
    assert_eq!(found.map(|p| p.id), Some(project.id));
    assert_eq!(projects::list_projects(&pool).await.unwrap().len(), 1);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn project_phase_crud() {
    let (pool, db_name) = create_test_db().await;
    let template = seed_template(&pool, "Delivery").await;
    let project = projects::insert_project(&pool, "Apollo", template.id).await.unwrap();

    let mut conn = pool.acquire().await.unwrap();
    let review = custom("Review", 2);
    let row = phases::insert_project_phase(&mut *conn, project.id, &review).await.unwrap();
    assert_eq!(row.position_kind, Some(PositionKind::Nth));
    assert_eq!(row.position_value, Some(2));
    assert!(!row.is_linked);

    let affected =
        phases::update_project_phase_position(&mut *conn, project.id, review.id, Some(PositionKind::Nth), Some(3))
            .await
            .unwrap();
    assert_eq!(affected, 1);
    drop(conn);

    let fetched = phases::get_project_phase(&pool, project.id, review.id).await.unwrap().unwrap();
    assert_eq!(fetched.position_value, Some(3));
    assert_eq!(projects::count_project_phases(&pool, project.id).await.unwrap(), 1);

    let mut conn = pool.acquire().await.unwrap();
    let affected = phases::delete_project_phase(&mut *conn, project.id, review.id).await.unwrap();
    assert_eq!(affected, 1);
    drop(conn);
    assert!(phases::list_project_phases(&pool, project.id).await.unwrap().is_empty());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn linked_phase_reuses_source_id() {
    let (pool, db_name) = create_test_db().await;
    let template = seed_template(&pool, "Delivery").await;
    let source = projects::insert_project(&pool, "Source", template.id).await.unwrap();
    let target = projects::insert_project(&pool, "Target", template.id).await.unwrap();

    let mut conn = pool.acquire().await.unwrap();
    let audit = custom("Audit", 2);
    phases::insert_project_phase(&mut *conn, source.id, &audit).await.unwrap();

    let linked = NewProjectPhase {
        is_linked: true,
        source_project_id: Some(source.id),
        ..audit.clone()
    };
    let row = phases::insert_project_phase(&mut *conn, target.id, &linked).await.unwrap();
    assert_eq!(row.id, audit.id);
    assert_eq!(row.source_project_id, Some(source.id));

    // The same id twice in one project is rejected.
    assert!(phases::insert_project_phase(&mut *conn, target.id, &custom("Other", 3)).await.is_ok());
    let duplicate = NewProjectPhase {
        name: "Audit again",
        ..linked
    };
    assert!(phases::insert_project_phase(&mut *conn, target.id, &duplicate).await.is_err());

    drop(conn);
    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn project_phases_insert_in_one_transaction() {
    let (pool, db_name) = create_test_db().await;
    let template = seed_template(&pool, "Delivery").await;
    let project = projects::insert_project(&pool, "Apollo", template.id).await.unwrap();

    let mut tx = pool.begin().await.unwrap();
    for (i, name) in ["Design", "Build", "Test"].into_iter().enumerate() {
        phases::insert_project_phase(&mut *tx, project.id, &custom(name, i as i32 + 2))
            .await
            .unwrap();
    }
    tx.rollback().await.unwrap();
    assert_eq!(projects::count_project_phases(&pool, project.id).await.unwrap(), 0);

    let mut tx = pool.begin().await.unwrap();
    for name in ["Design", "Build"] {
        phases::insert_project_phase(&mut *tx, project.id, &custom(name, 2))
            .await
            .unwrap();
    }
    tx.commit().await.unwrap();

    let rows = phases::list_project_phases(&pool, project.id).await.unwrap();
    let mut names: Vec<_> = rows.iter().map(|r| r.name.as_str()).collect();
    names.sort();
    assert_eq!(names, ["Build", "Design"]);

    pool.close().await;
    drop_test_db(&db_name).await;
}
