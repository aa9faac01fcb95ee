//! TOML export of reconciled projects and of templates.

use anyhow::{Context, Result};
use serde::Serialize;
use uuid::Uuid;

use crate::reconcile::Reconciliation;
use crate::template::Template;

#[derive(Debug, Serialize)]
struct ProjectExport<'a> {
    project: ProjectMeta<'a>,
    phases: Vec<PhaseExport<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    anomalies: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ProjectMeta<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct PhaseExport<'a> {
    id: Uuid,
    name: &'a str,
    resolved_index: u32,
    position: String,
    standard: bool,
    linked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_project: Option<Uuid>,
}

/// Render a reconciled project as TOML, phases in resolved order.
pub fn export_project(reconciliation: &Reconciliation, project_name: &str) -> Result<String> {
    let export = ProjectExport {
        project: ProjectMeta { name: project_name },
        phases: reconciliation
            .phases
            .iter()
            .enumerate()
            .map(|(i, p)| PhaseExport {
                id: p.id,
                name: &p.name,
                resolved_index: p.resolved_index.unwrap_or(i as u32 + 1),
                position: p.position_rule.map(|r| r.to_string()).unwrap_or_default(),
                standard: p.is_standard,
                linked: p.is_linked,
                source_project: p.source_project,
            })
            .collect(),
        anomalies: reconciliation.anomalies.iter().map(ToString::to_string).collect(),
    };
    toml::to_string_pretty(&export).context("failed to serialize project export")
}

/// Render a template in its import format.
pub fn export_template(template: &Template) -> Result<String> {
    toml::to_string_pretty(&template.to_toml()).context("failed to serialize template")
}
