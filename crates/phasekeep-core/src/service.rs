//! Service layer: multi-row operations that span several tables, and
//! construction of sessions backed by PostgreSQL.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use phasekeep_db::models::{ProjectRow, TemplateRow};
use phasekeep_db::queries::{projects as project_queries, templates as template_queries};

use crate::position::rule_parts;
use crate::session::ProjectSession;
use crate::store::{PgProjectStore, PgTemplateProvider, PgTemplateStore};
use crate::template::Template;

/// Store a parsed template and all of its phases.
///
/// Inserts the template row and every phase row inside a single database
/// transaction. If any step fails, the entire operation is rolled back.
pub async fn create_template(pool: &PgPool, template: &Template) -> Result<TemplateRow> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let row = template_queries::insert_template(&mut *tx, &template.name).await?;
    for phase in &template.phases {
        let (position_kind, position_value) = rule_parts(Some(phase.position));
        template_queries::insert_template_phase(
            &mut *tx,
            row.id,
            phase.id,
            &phase.name,
            position_kind,
            position_value,
        )
        .await?;
    }

    tx.commit().await.context("failed to commit template")?;
    info!(template_id = %row.id, name = %row.name, phases = template.phases.len(), "created template");
    Ok(row)
}

/// Create a project bound to an existing template.
pub async fn create_project(pool: &PgPool, name: &str, template_id: Uuid) -> Result<ProjectRow> {
    template_queries::get_template(pool, template_id)
        .await?
        .with_context(|| format!("template {template_id} not found"))?;
    let row = project_queries::insert_project(pool, name.trim(), template_id).await?;
    info!(project_id = %row.id, name = %row.name, %template_id, "created project");
    Ok(row)
}

/// Open and refresh a project-edit session for `project_id`.
pub async fn open_project_session(pool: &PgPool, project_id: Uuid) -> Result<ProjectSession> {
    let project = project_queries::get_project(pool, project_id)
        .await?
        .with_context(|| format!("project {project_id} not found"))?;

    let mut session = ProjectSession::for_project(
        project.id,
        Arc::new(PgTemplateProvider::new(pool.clone(), project.template_id)),
        Arc::new(PgProjectStore::new(pool.clone())),
    );
    session
        .refresh()
        .await
        .with_context(|| format!("failed to load project {:?}", project.name))?;
    Ok(session)
}

/// Open and refresh a template-edit session for `template_id`.
pub async fn open_template_session(pool: &PgPool, template_id: Uuid) -> Result<ProjectSession> {
    let template = template_queries::get_template(pool, template_id)
        .await?
        .with_context(|| format!("template {template_id} not found"))?;

    let mut session =
        ProjectSession::for_template(template.id, Arc::new(PgTemplateStore::new(pool.clone())));
    session
        .refresh()
        .await
        .with_context(|| format!("failed to load template {:?}", template.name))?;
    Ok(session)
}
