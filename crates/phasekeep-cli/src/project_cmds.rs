//! CLI handlers for `phasekeep project` subcommands.

use anyhow::{Result, bail};
use sqlx::PgPool;

use phasekeep_core::service;
use phasekeep_db::queries::{projects as project_queries, templates as template_queries};

use crate::ProjectCommands;
use crate::resolve::resolve_template;

pub async fn run_project_command(
    command: ProjectCommands,
    pool: &PgPool,
    default_template: Option<&str>,
) -> Result<()> {
    match command {
        ProjectCommands::Create { name, template } => {
            let Some(template) = template.as_deref().or(default_template) else {
                bail!(
                    "no template given; pass --template or set engine.default_template in the config file"
                );
            };
            cmd_create(pool, &name, template).await
        }
        ProjectCommands::List => cmd_list(pool).await,
    }
}

async fn cmd_create(pool: &PgPool, name: &str, template: &str) -> Result<()> {
    if name.trim().is_empty() {
        bail!("project name must not be empty");
    }
    let template = resolve_template(pool, template).await?;
    let project = service::create_project(pool, name, template.id).await?;
    println!(
        "Project created: {} ({}) from template {:?}",
        project.name, project.id, template.name
    );
    Ok(())
}

async fn cmd_list(pool: &PgPool) -> Result<()> {
    let projects = project_queries::list_projects(pool).await?;
    if projects.is_empty() {
        println!("No projects found.");
        return Ok(());
    }

    println!("{:<38} {:<30} {:<24} {:>6}", "ID", "NAME", "TEMPLATE", "OWN");
    println!("{}", "-".repeat(101));
    for project in &projects {
        let template = template_queries::get_template(pool, project.template_id)
            .await?
            .map_or_else(|| "?".to_owned(), |t| t.name);
        let own = project_queries::count_project_phases(pool, project.id).await?;
        println!(
            "{:<38} {:<30} {:<24} {:>6}",
            project.id, project.name, template, own
        );
    }
    Ok(())
}
