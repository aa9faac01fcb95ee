//! Templates: the canonical skeleton of standard phases shared by projects.

pub mod parser;
pub mod provider;
pub mod toml_format;

use serde::Serialize;
use uuid::Uuid;

use crate::phase::{PhaseRecord, normalize_name};
use crate::position::PositionRule;

pub use parser::{TemplateParseError, parse_template_toml};
pub use provider::{FileTemplateProvider, StaticTemplate, TemplateProvider};
pub use toml_format::{TemplateMeta, TemplatePhaseToml, TemplateToml};

/// A named, ordered set of standard phases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Template {
    /// `None` until the template has been stored.
    pub id: Option<Uuid>,
    pub name: String,
    pub phases: Vec<TemplatePhase>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplatePhase {
    pub id: Uuid,
    pub name: String,
    pub position: PositionRule,
}

impl Template {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            phases: Vec::new(),
        }
    }

    /// Append a phase with a fresh id.
    pub fn with_phase(mut self, name: impl Into<String>, position: PositionRule) -> Self {
        self.phases.push(TemplatePhase {
            id: Uuid::new_v4(),
            name: name.into(),
            position,
        });
        self
    }

    /// Look up a phase by name, ignoring case.
    pub fn phase(&self, name: &str) -> Option<&TemplatePhase> {
        let wanted = normalize_name(name);
        self.phases
            .iter()
            .find(|p| normalize_name(&p.name) == wanted)
    }

    /// Canonical rule for the standard phase called `name`.
    pub fn rule_for(&self, name: &str) -> Option<PositionRule> {
        self.phase(name).map(|p| p.position)
    }

    /// The template's phases as standard records, in template order.
    pub fn standard_records(&self) -> Vec<PhaseRecord> {
        self.phases
            .iter()
            .map(|p| PhaseRecord::standard(p.id, p.name.clone(), Some(p.position)))
            .collect()
    }

    /// Rebuild a template from reconciled standard records.
    ///
    /// Records without a rule are skipped; a reconciled set never has any.
    pub fn from_records(id: Option<Uuid>, name: impl Into<String>, records: &[PhaseRecord]) -> Self {
        Self {
            id,
            name: name.into(),
            phases: records
                .iter()
                .filter_map(|r| {
                    r.position_rule.map(|position| TemplatePhase {
                        id: r.id,
                        name: r.name.clone(),
                        position,
                    })
                })
                .collect(),
        }
    }

    pub fn to_toml(&self) -> TemplateToml {
        TemplateToml {
            template: TemplateMeta {
                id: self.id,
                name: self.name.clone(),
            },
            phases: self
                .phases
                .iter()
                .map(|p| TemplatePhaseToml {
                    id: Some(p.id),
                    name: p.name.clone(),
                    position: p.position.to_string(),
                })
                .collect(),
        }
    }
}
