//! The `TemplateProvider` trait: where a project's canonical skeleton comes
//! from.
//!
//! The trait is object-safe so a session can hold `Arc<dyn TemplateProvider>`.
//! The PostgreSQL implementation lives in [`crate::store`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use super::Template;
use super::parser::parse_template_toml;

/// Supplies the canonical ordering of standard phases.
#[async_trait]
pub trait TemplateProvider: Send + Sync {
    async fn get_template(&self) -> Result<Template>;
}

// Compile-time assertion: TemplateProvider must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn TemplateProvider) {}
};

/// A template held in memory.
#[derive(Debug, Clone)]
pub struct StaticTemplate(pub Template);

#[async_trait]
impl TemplateProvider for StaticTemplate {
    async fn get_template(&self) -> Result<Template> {
        Ok(self.0.clone())
    }
}

/// A template read once from a TOML file.
///
/// The file is parsed on [`FileTemplateProvider::load`] so phase ids stay
/// stable for the provider's lifetime.
#[derive(Debug, Clone)]
pub struct FileTemplateProvider {
    path: PathBuf,
    template: Template,
}

impl FileTemplateProvider {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read template file {}", path.display()))?;
        let template = parse_template_toml(&content)
            .with_context(|| format!("invalid template file {}", path.display()))?;
        debug!(path = %path.display(), phases = template.phases.len(), "loaded template file");
        Ok(Self { path, template })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TemplateProvider for FileTemplateProvider {
    async fn get_template(&self) -> Result<Template> {
        Ok(self.template.clone())
    }
}
