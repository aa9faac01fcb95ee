//! Integration tests for the template import and export flow behind
//! `phasekeep template import` and `phasekeep template export`.

use std::io::Write;

use phasekeep_core::export::{export_project, export_template};
use phasekeep_core::service;
use phasekeep_core::store::PgTemplateProvider;
use phasekeep_core::template::{TemplateProvider, parse_template_toml};
use phasekeep_core::PositionRule;
use phasekeep_test_utils::{create_test_db, drop_test_db};

const DELIVERY: &str = r#"
[template]
name = "Standard delivery"

[[phases]]
name = "Kickoff"
position = "first"

[[phases]]
name = "Planning"
position = "nth:2"

[[phases]]
name = "Sign-off"
position = "last-minus:1"

[[phases]]
name = "Close"
position = "last"
"#;

#[tokio::test]
async fn imported_template_exports_unchanged() {
    let (pool, db_name) = create_test_db().await;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(DELIVERY.as_bytes()).unwrap();
    let content = std::fs::read_to_string(file.path()).unwrap();
    let template = parse_template_toml(&content).unwrap();

    let row = service::create_template(&pool, &template).await.unwrap();
    let stored = PgTemplateProvider::new(pool.clone(), row.id)
        .get_template()
        .await
        .unwrap();
    assert_eq!(stored.phases, template.phases);

    let exported = export_template(&stored).unwrap();
    let reparsed = parse_template_toml(&exported).unwrap();
    assert_eq!(reparsed.id, Some(row.id));
    assert_eq!(reparsed.phases, template.phases);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn project_export_follows_the_template() {
    let (pool, db_name) = create_test_db().await;

    let template = parse_template_toml(DELIVERY).unwrap();
    let row = service::create_template(&pool, &template).await.unwrap();
    let project = service::create_project(&pool, "Apollo", row.id).await.unwrap();

    let mut session = service::open_project_session(&pool, project.id).await.unwrap();
    let changes = session.insert("Review").await.unwrap();
    assert_eq!(changes[0].after, Some(PositionRule::Nth(3)));

    let text = export_project(session.snapshot().unwrap(), &project.name).unwrap();
    let value: toml::Value = toml::from_str(&text).unwrap();
    let names: Vec<_> = value["phases"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(names, ["Kickoff", "Planning", "Review", "Sign-off", "Close"]);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn duplicate_template_names_are_rejected_by_the_store() {
    let (pool, db_name) = create_test_db().await;

    let template = parse_template_toml(DELIVERY).unwrap();
    service::create_template(&pool, &template).await.unwrap();
    let again = parse_template_toml(&DELIVERY.replace("Kickoff", "Start")).unwrap();
    assert!(service::create_template(&pool, &again).await.is_err());

    pool.close().await;
    drop_test_db(&db_name).await;
}
