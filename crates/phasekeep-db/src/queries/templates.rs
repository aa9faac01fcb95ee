//! Database query functions for the `templates` and `template_phases`
//! tables.

use anyhow::{Context, Result};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::models::{PositionKind, TemplatePhaseRow, TemplateRow};

/// Insert a new template row.
pub async fn insert_template(conn: &mut PgConnection, name: &str) -> Result<TemplateRow> {
    let template = sqlx::query_as::<_, TemplateRow>(
        "INSERT INTO templates (name) VALUES ($1) RETURNING *",
    )
    .bind(name)
    .fetch_one(conn)
    .await
    .with_context(|| format!("failed to insert template {name:?}"))?;

    Ok(template)
}

/// Fetch a template by its ID.
pub async fn get_template(pool: &PgPool, id: Uuid) -> Result<Option<TemplateRow>> {
    let template = sqlx::query_as::<_, TemplateRow>("SELECT * FROM templates WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch template")?;

    Ok(template)
}

/// Fetch a template by name (case-insensitive).
pub async fn find_template_by_name(pool: &PgPool, name: &str) -> Result<Option<TemplateRow>> {
    let template = sqlx::query_as::<_, TemplateRow>(
        "SELECT * FROM templates WHERE lower(name) = lower($1)",
    )
    .bind(name)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to look up template {name:?}"))?;

    Ok(template)
}

/// List all templates, ordered by name.
pub async fn list_templates(pool: &PgPool) -> Result<Vec<TemplateRow>> {
    let templates = sqlx::query_as::<_, TemplateRow>("SELECT * FROM templates ORDER BY name")
        .fetch_all(pool)
        .await
        .context("failed to list templates")?;

    Ok(templates)
}

/// List the phases of a template in insertion order.
///
/// The order is not meaningful for display; callers reconcile the rows.
pub async fn list_template_phases(pool: &PgPool, template_id: Uuid) -> Result<Vec<TemplatePhaseRow>> {
    let phases = sqlx::query_as::<_, TemplatePhaseRow>(
        "SELECT * FROM template_phases WHERE template_id = $1 ORDER BY created_at, id",
    )
    .bind(template_id)
    .fetch_all(pool)
    .await
    .context("failed to list template phases")?;

    Ok(phases)
}

/// Insert a template phase with an explicit ID.
pub async fn insert_template_phase(
    conn: &mut PgConnection,
    template_id: Uuid,
    id: Uuid,
    name: &str,
    position_kind: Option<PositionKind>,
    position_value: Option<i32>,
) -> Result<TemplatePhaseRow> {
    let phase = sqlx::query_as::<_, TemplatePhaseRow>(
        "INSERT INTO template_phases (id, template_id, name, position_kind, position_value) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING *",
    )
    .bind(id)
    .bind(template_id)
    .bind(name)
    .bind(position_kind)
    .bind(position_value)
    .fetch_one(conn)
    .await
    .with_context(|| format!("failed to insert template phase {name:?}"))?;

    Ok(phase)
}

/// Overwrite the position of a template phase. Returns the number of rows
/// affected (0 when the phase does not belong to the template).
pub async fn update_template_phase_position(
    conn: &mut PgConnection,
    template_id: Uuid,
    id: Uuid,
    position_kind: Option<PositionKind>,
    position_value: Option<i32>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE template_phases \
         SET position_kind = $1, position_value = $2, updated_at = now() \
         WHERE template_id = $3 AND id = $4",
    )
    .bind(position_kind)
    .bind(position_value)
    .bind(template_id)
    .bind(id)
    .execute(conn)
    .await
    .context("failed to update template phase position")?;

    Ok(result.rows_affected())
}

/// Delete a template phase. Returns the number of rows affected.
pub async fn delete_template_phase(conn: &mut PgConnection, template_id: Uuid, id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM template_phases WHERE template_id = $1 AND id = $2")
        .bind(template_id)
        .bind(id)
        .execute(conn)
        .await
        .context("failed to delete template phase")?;

    Ok(result.rows_affected())
}
