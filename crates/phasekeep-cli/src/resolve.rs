//! Resolution of command-line references to templates, projects and
//! phases.
//!
//! Every reference is either a UUID or a case-insensitive name. A string
//! that parses as a UUID is always treated as one.

use anyhow::{Context, Result, bail};
use sqlx::PgPool;
use uuid::Uuid;

use phasekeep_core::Reconciliation;
use phasekeep_db::models::{ProjectRow, TemplateRow};
use phasekeep_db::queries::{projects as project_queries, templates as template_queries};

pub async fn resolve_template(pool: &PgPool, input: &str) -> Result<TemplateRow> {
    let found = match Uuid::parse_str(input) {
        Ok(id) => template_queries::get_template(pool, id).await?,
        Err(_) => template_queries::find_template_by_name(pool, input).await?,
    };
    found.with_context(|| format!("no template matches {input:?}"))
}

pub async fn resolve_project(pool: &PgPool, input: &str) -> Result<ProjectRow> {
    let found = match Uuid::parse_str(input) {
        Ok(id) => project_queries::get_project(pool, id).await?,
        Err(_) => project_queries::find_project_by_name(pool, input).await?,
    };
    found.with_context(|| format!("no project matches {input:?}"))
}

/// Find a phase in a reconciled set by UUID or name.
pub fn resolve_phase(phases: &Reconciliation, input: &str) -> Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(input) {
        if phases.get(id).is_some() {
            return Ok(id);
        }
        bail!("no phase with id {id}");
    }
    phases
        .find_by_name(input)
        .map(|p| p.id)
        .with_context(|| format!("no phase named {input:?}"))
}
