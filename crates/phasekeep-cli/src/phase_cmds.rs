//! CLI handlers for `phasekeep phase` subcommands.
//!
//! Each command opens a project-edit session, applies at most one
//! mutation and prints the rule changes it committed. Rejections surface
//! as errors naming the violated constraint; nothing is written.

use anyhow::{Result, bail};
use sqlx::PgPool;

use phasekeep_core::{ProjectSession, service};

use crate::PhaseCommands;
use crate::render;
use crate::resolve::{resolve_phase, resolve_project};
use crate::template_cmds::loaded;

pub async fn run_phase_command(command: PhaseCommands, pool: &PgPool) -> Result<()> {
    match command {
        PhaseCommands::List { project, json } => {
            let session = open(pool, &project).await?;
            if json {
                render::print_phases_json(loaded(&session)?)
            } else {
                render::print_phases(loaded(&session)?);
                Ok(())
            }
        }
        PhaseCommands::Add { project, name } => {
            let mut session = open(pool, &project).await?;
            let changes = session.insert(&name).await?;
            render::print_changes(&changes);
            Ok(())
        }
        PhaseCommands::Move {
            project,
            phase,
            index,
        } => {
            let mut session = open(pool, &project).await?;
            let phase_id = resolve_phase(loaded(&session)?, &phase)?;
            let changes = session.move_phase(phase_id, index).await?;
            render::print_changes(&changes);
            Ok(())
        }
        PhaseCommands::Delete { project, phase } => {
            let mut session = open(pool, &project).await?;
            let phase_id = resolve_phase(loaded(&session)?, &phase)?;
            let changes = session.delete(phase_id).await?;
            render::print_changes(&changes);
            Ok(())
        }
        PhaseCommands::Incorporate {
            project,
            source,
            phase,
        } => cmd_incorporate(pool, &project, &source, &phase).await,
        PhaseCommands::Repair { project } => {
            let mut session = open(pool, &project).await?;
            let changes = session.repair().await?;
            render::print_changes(&changes);
            if let Some(after) = session.snapshot() {
                render::print_anomalies(after);
            }
            Ok(())
        }
    }
}

async fn open(pool: &PgPool, project: &str) -> Result<ProjectSession> {
    let row = resolve_project(pool, project).await?;
    service::open_project_session(pool, row.id).await
}

/// Link `phase` of the `source` project into `project`.
async fn cmd_incorporate(pool: &PgPool, project: &str, source: &str, phase: &str) -> Result<()> {
    let target_row = resolve_project(pool, project).await?;
    let source_row = resolve_project(pool, source).await?;
    if source_row.id == target_row.id {
        bail!("cannot link a phase of {:?} into itself", target_row.name);
    }

    let source_session = service::open_project_session(pool, source_row.id).await?;
    let source_phases = loaded(&source_session)?;
    let phase_id = resolve_phase(source_phases, phase)?;
    let Some(linked) = source_phases.get(phase_id) else {
        bail!("no phase {phase_id} in project {:?}", source_row.name);
    };
    if linked.is_linked {
        bail!(
            "phase {:?} is itself linked into {:?}; link it from its own project",
            linked.name,
            source_row.name
        );
    }

    let mut session = service::open_project_session(pool, target_row.id).await?;
    let changes = session
        .incorporate(source_row.id, linked.id, &linked.name)
        .await?;
    render::print_changes(&changes);
    Ok(())
}
