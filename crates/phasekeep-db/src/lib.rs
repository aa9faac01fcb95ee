//! PostgreSQL persistence for phasekeep: schema migrations, row models and
//! query functions for templates, projects and project phases.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
