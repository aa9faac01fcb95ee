//! Database query functions for the `projects` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::ProjectRow;

/// Insert a new project bound to a template.
pub async fn insert_project(pool: &PgPool, name: &str, template_id: Uuid) -> Result<ProjectRow> {
    let project = sqlx::query_as::<_, ProjectRow>(
        "INSERT INTO projects (name, template_id) VALUES ($1, $2) RETURNING *",
    )
    .bind(name)
    .bind(template_id)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert project {name:?}"))?;

    Ok(project)
}

/// Fetch a project by its ID.
pub async fn get_project(pool: &PgPool, id: Uuid) -> Result<Option<ProjectRow>> {
    let project = sqlx::query_as::<_, ProjectRow>("SELECT * FROM projects WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch project")?;

    Ok(project)
}

/// Fetch a project by name (case-insensitive).
pub async fn find_project_by_name(pool: &PgPool, name: &str) -> Result<Option<ProjectRow>> {
    let project = sqlx::query_as::<_, ProjectRow>(
        "SELECT * FROM projects WHERE lower(name) = lower($1)",
    )
    .bind(name)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to look up project {name:?}"))?;

    Ok(project)
}

/// List all projects, newest first.
pub async fn list_projects(pool: &PgPool) -> Result<Vec<ProjectRow>> {
    let projects = sqlx::query_as::<_, ProjectRow>("SELECT * FROM projects ORDER BY created_at DESC")
        .fetch_all(pool)
        .await
        .context("failed to list projects")?;

    Ok(projects)
}

/// Count the phases a project owns (custom and linked).
pub async fn count_project_phases(pool: &PgPool, project_id: Uuid) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM project_phases WHERE project_id = $1")
        .bind(project_id)
        .fetch_one(pool)
        .await
        .context("failed to count project phases")?;

    Ok(count)
}
