//! TOML format types for template definition files.
//!
//! These types map directly to the template file on-disk format and are
//! deserialized via `serde` + the `toml` crate. Positions stay as text here;
//! [`super::parser`] validates them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Top-level structure of a template file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateToml {
    pub template: TemplateMeta,
    #[serde(default)]
    pub phases: Vec<TemplatePhaseToml>,
}

/// Template metadata in `[template]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateMeta {
    /// Absent in authored files, present once the template has been stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub name: String,
}

/// A single `[[phases]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplatePhaseToml {
    /// Kept on export so a re-import preserves phase identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub name: String,
    /// `first`, `last`, `nth:<k>` or `last-minus:<k>`.
    pub position: String,
}
