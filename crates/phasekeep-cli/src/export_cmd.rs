//! `phasekeep export` command: write a project's reconciled phase order as
//! TOML.

use std::io::Write;

use anyhow::{Context, Result};
use sqlx::PgPool;

use phasekeep_core::export::export_project;
use phasekeep_core::service;

use crate::resolve::resolve_project;
use crate::template_cmds::loaded;

pub async fn run_export(pool: &PgPool, project: &str, output: Option<&str>) -> Result<()> {
    let row = resolve_project(pool, project).await?;
    let session = service::open_project_session(pool, row.id).await?;
    let text = export_project(loaded(&session)?, &row.name)?;

    match output {
        Some(path) => {
            std::fs::write(path, &text).with_context(|| format!("cannot create output file: {path}"))?;
            println!("Exported project {:?} to {path}", row.name);
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
        }
    }
    Ok(())
}
