//! Database query functions for the `project_phases` table.
//!
//! Write helpers take a `&mut PgConnection` so callers can run several of
//! them inside one transaction (`&mut *tx`).

use anyhow::{Context, Result};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::models::{PositionKind, ProjectPhaseRow};

/// Parameters for inserting a project phase.
#[derive(Debug, Clone)]
pub struct NewProjectPhase<'a> {
    pub id: Uuid,
    pub name: &'a str,
    pub is_linked: bool,
    pub source_project_id: Option<Uuid>,
    pub position_kind: Option<PositionKind>,
    pub position_value: Option<i32>,
}

/// List every phase a project owns, in insertion order.
pub async fn list_project_phases(pool: &PgPool, project_id: Uuid) -> Result<Vec<ProjectPhaseRow>> {
    let phases = sqlx::query_as::<_, ProjectPhaseRow>(
        "SELECT * FROM project_phases WHERE project_id = $1 ORDER BY created_at, id",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
    .context("failed to list project phases")?;

    Ok(phases)
}

/// Fetch one project phase.
pub async fn get_project_phase(pool: &PgPool, project_id: Uuid, id: Uuid) -> Result<Option<ProjectPhaseRow>> {
    let phase = sqlx::query_as::<_, ProjectPhaseRow>(
        "SELECT * FROM project_phases WHERE project_id = $1 AND id = $2",
    )
    .bind(project_id)
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch project phase")?;

    Ok(phase)
}

/// Insert a project phase.
///
/// A phase whose name clashes (case-insensitively) with an existing phase
/// of the same project is rejected by the unique index.
pub async fn insert_project_phase(
    conn: &mut PgConnection,
    project_id: Uuid,
    new: &NewProjectPhase<'_>,
) -> Result<ProjectPhaseRow> {
    let phase = sqlx::query_as::<_, ProjectPhaseRow>(
        "INSERT INTO project_phases \
         (id, project_id, name, is_linked, source_project_id, position_kind, position_value) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING *",
    )
    .bind(new.id)
    .bind(project_id)
    .bind(new.name)
    .bind(new.is_linked)
    .bind(new.source_project_id)
    .bind(new.position_kind)
    .bind(new.position_value)
    .fetch_one(conn)
    .await
    .with_context(|| format!("failed to insert project phase {:?}", new.name))?;

    Ok(phase)
}

/// Overwrite the position of a project phase. Returns the number of rows
/// affected (0 when the phase does not belong to the project).
pub async fn update_project_phase_position(
    conn: &mut PgConnection,
    project_id: Uuid,
    id: Uuid,
    position_kind: Option<PositionKind>,
    position_value: Option<i32>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE project_phases \
         SET position_kind = $1, position_value = $2, updated_at = now() \
         WHERE project_id = $3 AND id = $4",
    )
    .bind(position_kind)
    .bind(position_value)
    .bind(project_id)
    .bind(id)
    .execute(conn)
    .await
    .context("failed to update project phase position")?;

    Ok(result.rows_affected())
}

/// Delete a project phase. Returns the number of rows affected.
pub async fn delete_project_phase(conn: &mut PgConnection, project_id: Uuid, id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM project_phases WHERE project_id = $1 AND id = $2")
        .bind(project_id)
        .bind(id)
        .execute(conn)
        .await
        .context("failed to delete project phase")?;

    Ok(result.rows_affected())
}
