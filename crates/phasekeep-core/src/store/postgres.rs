//! PostgreSQL implementations of [`PersistenceAdapter`] and
//! [`TemplateProvider`].
//!
//! Commits run in a single transaction. Any update or delete that matches
//! no row aborts the whole commit and the transaction rolls back on drop.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use phasekeep_db::models::{ProjectPhaseRow, TemplatePhaseRow};
use phasekeep_db::queries::phases::{self as phase_queries, NewProjectPhase};
use phasekeep_db::queries::templates as template_queries;

use super::PersistenceAdapter;
use crate::mutation::RuleSet;
use crate::phase::PhaseRecord;
use crate::position::{PositionRule, rule_parts};
use crate::reconcile::Reconciler;
use crate::template::{Template, TemplateProvider};

/// Decode stored rule columns. A malformed pair loads as "no rule" so the
/// reconciler reports and repairs it.
fn stored_rule(
    phase_id: Uuid,
    kind: Option<phasekeep_db::models::PositionKind>,
    value: Option<i32>,
) -> Option<PositionRule> {
    match PositionRule::from_parts(kind, value) {
        Ok(rule) => rule,
        Err(e) => {
            warn!(%phase_id, error = %e, "ignoring malformed stored position");
            None
        }
    }
}

fn project_record(row: ProjectPhaseRow) -> PhaseRecord {
    PhaseRecord {
        id: row.id,
        position_rule: stored_rule(row.id, row.position_kind, row.position_value),
        name: row.name,
        is_standard: false,
        is_linked: row.is_linked,
        source_project: row.source_project_id,
        resolved_index: None,
        provisional_rule: false,
    }
}

fn template_record(row: TemplatePhaseRow) -> PhaseRecord {
    let rule = stored_rule(row.id, row.position_kind, row.position_value);
    PhaseRecord::standard(row.id, row.name, rule)
}

/// Project phase rows. Standard phases are never written: they come from
/// the template on every load.
#[derive(Debug, Clone)]
pub struct PgProjectStore {
    pool: PgPool,
}

impl PgProjectStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PersistenceAdapter for PgProjectStore {
    async fn load_phases(&self, project_id: Uuid) -> Result<Vec<PhaseRecord>> {
        let rows = phase_queries::list_project_phases(&self.pool, project_id).await?;
        Ok(rows.into_iter().map(project_record).collect())
    }

    async fn commit_phases(&self, project_id: Uuid, rule_set: &RuleSet) -> Result<()> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        let (mut inserted, mut updated, mut deleted) = (0usize, 0usize, 0usize);

        for phase in rule_set.phases.iter().filter(|p| !p.holds_standard_slot()) {
            let (position_kind, position_value) = rule_parts(phase.position_rule);
            if rule_set.is_added(phase) {
                let new = NewProjectPhase {
                    id: phase.id,
                    name: &phase.name,
                    is_linked: phase.is_linked,
                    source_project_id: phase.source_project,
                    position_kind,
                    position_value,
                };
                phase_queries::insert_project_phase(&mut *tx, project_id, &new).await?;
                inserted += 1;
                continue;
            }
            let affected = phase_queries::update_project_phase_position(
                &mut *tx,
                project_id,
                phase.id,
                position_kind,
                position_value,
            )
            .await?;
            if affected == 0 {
                bail!(
                    "phase {:?} ({}) no longer exists in project {project_id}",
                    phase.name,
                    phase.id
                );
            }
            updated += 1;
        }

        for phase in rule_set.removed.iter().filter(|p| !p.holds_standard_slot()) {
            let affected = phase_queries::delete_project_phase(&mut *tx, project_id, phase.id).await?;
            if affected == 0 {
                bail!(
                    "phase {:?} ({}) no longer exists in project {project_id}",
                    phase.name,
                    phase.id
                );
            }
            deleted += 1;
        }

        tx.commit().await.context("failed to commit project phases")?;
        info!(%project_id, inserted, updated, deleted, "committed project phases");
        Ok(())
    }
}

/// Template phase rows, for template-edit sessions. Every phase is owned.
#[derive(Debug, Clone)]
pub struct PgTemplateStore {
    pool: PgPool,
}

impl PgTemplateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PersistenceAdapter for PgTemplateStore {
    async fn load_phases(&self, template_id: Uuid) -> Result<Vec<PhaseRecord>> {
        let rows = template_queries::list_template_phases(&self.pool, template_id).await?;
        Ok(rows.into_iter().map(template_record).collect())
    }

    async fn commit_phases(&self, template_id: Uuid, rule_set: &RuleSet) -> Result<()> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;

        for phase in &rule_set.phases {
            let (position_kind, position_value) = rule_parts(phase.position_rule);
            if rule_set.is_added(phase) {
                template_queries::insert_template_phase(
                    &mut *tx,
                    template_id,
                    phase.id,
                    &phase.name,
                    position_kind,
                    position_value,
                )
                .await?;
                continue;
            }
            let affected = template_queries::update_template_phase_position(
                &mut *tx,
                template_id,
                phase.id,
                position_kind,
                position_value,
            )
            .await?;
            if affected == 0 {
                bail!(
                    "phase {:?} ({}) no longer exists in template {template_id}",
                    phase.name,
                    phase.id
                );
            }
        }

        for phase in &rule_set.removed {
            let affected = template_queries::delete_template_phase(&mut *tx, template_id, phase.id).await?;
            if affected == 0 {
                bail!(
                    "phase {:?} ({}) no longer exists in template {template_id}",
                    phase.name,
                    phase.id
                );
            }
        }

        tx.commit().await.context("failed to commit template phases")?;
        info!(
            %template_id,
            phases = rule_set.phases.len(),
            removed = rule_set.removed.len(),
            "committed template phases"
        );
        Ok(())
    }
}

/// Reads a stored template on every call.
#[derive(Debug, Clone)]
pub struct PgTemplateProvider {
    pool: PgPool,
    template_id: Uuid,
}

impl PgTemplateProvider {
    pub fn new(pool: PgPool, template_id: Uuid) -> Self {
        Self { pool, template_id }
    }
}

#[async_trait]
impl TemplateProvider for PgTemplateProvider {
    async fn get_template(&self) -> Result<Template> {
        let row = template_queries::get_template(&self.pool, self.template_id)
            .await?
            .with_context(|| format!("template {} not found", self.template_id))?;
        let rows = template_queries::list_template_phases(&self.pool, self.template_id).await?;

        // Stored template rows may be out of order or missing rules; the
        // canonical skeleton is their template-edit reconciliation.
        let records = rows.into_iter().map(template_record).collect();
        let reconciled = Reconciler::template_edit().reconcile(records);
        Ok(Template::from_records(Some(row.id), row.name, &reconciled.phases))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use phasekeep_db::models::PositionKind;

    #[test]
    fn project_rows_load_as_custom_records() {
        let source = Uuid::new_v4();
        let row = ProjectPhaseRow {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            name: "Audit".into(),
            is_linked: true,
            source_project_id: Some(source),
            position_kind: Some(PositionKind::Nth),
            position_value: Some(4),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let record = project_record(row);
        assert!(!record.is_standard);
        assert!(record.is_linked);
        assert_eq!(record.source_project, Some(source));
        assert_eq!(record.position_rule, Some(PositionRule::Nth(4)));
    }

    #[test]
    fn malformed_rows_load_without_a_rule() {
        let row = TemplatePhaseRow {
            id: Uuid::new_v4(),
            template_id: Uuid::new_v4(),
            name: "Kickoff".into(),
            position_kind: Some(PositionKind::First),
            position_value: Some(3),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let record = template_record(row);
        assert!(record.is_standard);
        assert_eq!(record.position_rule, None);
    }
}
