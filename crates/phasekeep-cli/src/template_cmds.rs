//! CLI handlers for `phasekeep template` subcommands.
//!
//! Template edits run a template-edit session: every phase may move and the
//! `First`/`Last` anchors are reassigned to whichever phases end up at the
//! ends.

use std::io::Write;

use anyhow::{Context, Result, bail};
use sqlx::PgPool;

use phasekeep_core::export::export_template;
use phasekeep_core::service;
use phasekeep_core::store::PgTemplateProvider;
use phasekeep_core::template::{TemplateProvider, parse_template_toml};
use phasekeep_core::{ProjectSession, Reconciliation};
use phasekeep_db::queries::templates as template_queries;

use crate::TemplateCommands;
use crate::render;
use crate::resolve::{resolve_phase, resolve_template};

pub async fn run_template_command(command: TemplateCommands, pool: &PgPool) -> Result<()> {
    match command {
        TemplateCommands::Import { file } => cmd_import(pool, &file).await,
        TemplateCommands::List => cmd_list(pool).await,
        TemplateCommands::Show { template, json } => {
            let session = open(pool, &template).await?;
            if json {
                render::print_phases_json(loaded(&session)?)
            } else {
                render::print_phases(loaded(&session)?);
                Ok(())
            }
        }
        TemplateCommands::Add { template, name } => {
            let mut session = open(pool, &template).await?;
            let changes = session.insert(&name).await?;
            render::print_changes(&changes);
            Ok(())
        }
        TemplateCommands::Move {
            template,
            phase,
            index,
        } => {
            let mut session = open(pool, &template).await?;
            let phase_id = resolve_phase(loaded(&session)?, &phase)?;
            let changes = session.move_phase(phase_id, index).await?;
            render::print_changes(&changes);
            Ok(())
        }
        TemplateCommands::Delete { template, phase } => {
            let mut session = open(pool, &template).await?;
            let phase_id = resolve_phase(loaded(&session)?, &phase)?;
            let changes = session.delete(phase_id).await?;
            render::print_changes(&changes);
            Ok(())
        }
        TemplateCommands::Repair { template } => {
            let mut session = open(pool, &template).await?;
            let changes = session.repair().await?;
            render::print_changes(&changes);
            Ok(())
        }
        TemplateCommands::Export { template, output } => {
            cmd_export(pool, &template, output.as_deref()).await
        }
    }
}

async fn open(pool: &PgPool, template: &str) -> Result<ProjectSession> {
    let row = resolve_template(pool, template).await?;
    service::open_template_session(pool, row.id).await
}

pub(crate) fn loaded(session: &ProjectSession) -> Result<&Reconciliation> {
    session
        .snapshot()
        .with_context(|| format!("phases of {} are not loaded", session.owner_id()))
}

/// Read a template file, validate it and store it.
async fn cmd_import(pool: &PgPool, file_path: &str) -> Result<()> {
    let content = std::fs::read_to_string(file_path)
        .with_context(|| format!("failed to read template file: {file_path}"))?;
    let template = parse_template_toml(&content)
        .with_context(|| format!("failed to parse template file: {file_path}"))?;

    if let Some(existing) = template_queries::find_template_by_name(pool, &template.name).await? {
        bail!(
            "a template named {:?} already exists ({})",
            existing.name,
            existing.id
        );
    }

    let row = service::create_template(pool, &template).await?;
    println!("Template created: {} ({})", row.name, row.id);
    for phase in &template.phases {
        println!("  {:<30} {}", phase.name, phase.position);
    }
    Ok(())
}

async fn cmd_list(pool: &PgPool) -> Result<()> {
    let templates = template_queries::list_templates(pool).await?;
    if templates.is_empty() {
        println!("No templates found. Import one with `phasekeep template import <file>`.");
        return Ok(());
    }

    println!("{:<38} {:<30} {:>6}", "ID", "NAME", "PHASES");
    println!("{}", "-".repeat(76));
    for template in &templates {
        let phases = template_queries::list_template_phases(pool, template.id).await?;
        println!("{:<38} {:<30} {:>6}", template.id, template.name, phases.len());
    }
    Ok(())
}

async fn cmd_export(pool: &PgPool, template: &str, output: Option<&str>) -> Result<()> {
    let row = resolve_template(pool, template).await?;
    let template = PgTemplateProvider::new(pool.clone(), row.id)
        .get_template()
        .await?;
    let text = export_template(&template)?;

    match output {
        Some(path) => {
            std::fs::write(path, &text).with_context(|| format!("cannot write output file: {path}"))?;
            println!("Exported template {:?} to {path}", template.name);
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
        }
    }
    Ok(())
}
