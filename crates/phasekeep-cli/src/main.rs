mod config;
mod export_cmd;
mod phase_cmds;
mod project_cmds;
mod render;
mod resolve;
mod template_cmds;

#[cfg(test)]
mod test_util;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use phasekeep_db::config::DbConfig;
use phasekeep_db::pool;

use config::PhasekeepConfig;

#[derive(Parser)]
#[command(
    name = "phasekeep",
    version,
    about = "Phase ordering and position reconciliation for templated project plans"
)]
struct Cli {
    /// Database URL (overrides PHASEKEEP_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a phasekeep config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = DbConfig::DEFAULT_URL)]
        db_url: String,
        /// Template used by `project create` when --template is omitted
        #[arg(long)]
        default_template: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create the database if needed and run migrations
    DbInit,
    /// Template management
    Template {
        #[command(subcommand)]
        command: TemplateCommands,
    },
    /// Project management
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    /// Edit the phases of one project
    Phase {
        #[command(subcommand)]
        command: PhaseCommands,
    },
    /// Export a project's phase order as TOML
    Export {
        /// Project name or ID
        project: String,
        /// Output file path (defaults to stdout)
        #[arg(long)]
        output: Option<String>,
    },
    /// Print shell completions
    Completions {
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum TemplateCommands {
    /// Create a template from a TOML file
    Import {
        /// Path to the template TOML file
        file: String,
    },
    /// List all templates
    List,
    /// Show a template's phases in order
    Show {
        /// Template name or ID
        template: String,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Add a standard phase just before the last one
    Add {
        template: String,
        /// Name of the new phase
        name: String,
    },
    /// Move a phase to a 1-based position
    Move {
        template: String,
        /// Phase name or ID
        phase: String,
        index: u32,
    },
    /// Delete a phase; the anchors pass to the new ends
    Delete {
        template: String,
        /// Phase name or ID
        phase: String,
    },
    /// Rewrite stored positions to match the reconciled order
    Repair {
        template: String,
    },
    /// Export a template in its import format
    Export {
        template: String,
        /// Output file path (defaults to stdout)
        #[arg(long)]
        output: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ProjectCommands {
    /// Create a project from a template
    Create {
        name: String,
        /// Template name or ID (defaults to engine.default_template)
        #[arg(long)]
        template: Option<String>,
    },
    /// List all projects
    List,
}

#[derive(Subcommand)]
pub enum PhaseCommands {
    /// Show the reconciled phase order and any anomalies
    List {
        /// Project name or ID
        project: String,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Add a custom phase at the next free slot
    Add {
        project: String,
        /// Name of the new phase
        name: String,
    },
    /// Move a custom phase to a 1-based position
    Move {
        project: String,
        /// Phase name or ID
        phase: String,
        index: u32,
    },
    /// Delete a custom or linked phase
    Delete {
        project: String,
        /// Phase name or ID
        phase: String,
    },
    /// Link a phase of another project into this one
    Incorporate {
        project: String,
        /// Project that owns the phase
        source: String,
        /// Phase name or ID in the source project
        phase: String,
    },
    /// Rewrite stored positions so the next load has no anomalies
    Repair {
        project: String,
    },
}

/// Execute `phasekeep init`: write the config file.
fn cmd_init(db_url: &str, default_template: Option<String>, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_owned(),
        },
        engine: config::EngineSection { default_template },
    };
    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    if let Some(template) = &cfg.engine.default_template {
        println!("  engine.default_template = {template:?}");
    }
    println!();
    println!("Next: run `phasekeep db-init` to create and migrate the database.");

    Ok(())
}

/// Execute `phasekeep db-init`: create the database and run migrations.
async fn cmd_db_init(resolved: &PhasekeepConfig) -> anyhow::Result<()> {
    println!("Initializing phasekeep database...");

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;
    println!("phasekeep db-init complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let resolved = PhasekeepConfig::resolve(cli.database_url.as_deref());
    tracing::debug!(
        database = resolved.db_config.database_name().unwrap_or("?"),
        default_template = resolved.default_template.as_deref().unwrap_or(""),
        "resolved configuration"
    );

    match cli.command {
        Commands::Init {
            db_url,
            default_template,
            force,
        } => {
            cmd_init(&db_url, default_template, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(&resolved).await?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "phasekeep", &mut std::io::stdout());
        }
        Commands::Template { command } => {
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = template_cmds::run_template_command(command, &db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Project { command } => {
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = project_cmds::run_project_command(
                command,
                &db_pool,
                resolved.default_template.as_deref(),
            )
            .await;
            db_pool.close().await;
            result?;
        }
        Commands::Phase { command } => {
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = phase_cmds::run_phase_command(command, &db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Export { project, output } => {
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = export_cmd::run_export(&db_pool, &project, output.as_deref()).await;
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}
