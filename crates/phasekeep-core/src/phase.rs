//! Phase records: the unit the engine orders.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::position::PositionRule;

/// A top-level phase of a project plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub id: Uuid,
    /// Unique within a project, compared case-insensitively.
    pub name: String,
    /// Defined by the project's template.
    pub is_standard: bool,
    /// Read-only reference to a phase of another project.
    pub is_linked: bool,
    /// Project a linked phase was incorporated from.
    pub source_project: Option<Uuid>,
    pub position_rule: Option<PositionRule>,
    /// 1-based position assigned by the last reconciliation. Never persisted.
    #[serde(skip)]
    pub resolved_index: Option<u32>,
    /// `position_rule` was filled in by the reconciler; the store holds none.
    #[serde(skip)]
    pub provisional_rule: bool,
}

/// Identity used for deduplication.
///
/// Linked phases are identified by their id together with the project they
/// came from; every other phase by its id alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhaseKey {
    pub id: Uuid,
    pub source_project: Option<Uuid>,
}

impl PhaseRecord {
    /// A new custom phase with a fresh id.
    pub fn custom(name: impl Into<String>, position_rule: Option<PositionRule>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            is_standard: false,
            is_linked: false,
            source_project: None,
            position_rule,
            resolved_index: None,
            provisional_rule: false,
        }
    }

    pub fn standard(id: Uuid, name: impl Into<String>, position_rule: Option<PositionRule>) -> Self {
        Self {
            id,
            name: name.into(),
            is_standard: true,
            is_linked: false,
            source_project: None,
            position_rule,
            resolved_index: None,
            provisional_rule: false,
        }
    }

    /// A reference to phase `id` of `source_project`.
    pub fn linked(
        id: Uuid,
        name: impl Into<String>,
        source_project: Uuid,
        position_rule: Option<PositionRule>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            is_standard: false,
            is_linked: true,
            source_project: Some(source_project),
            position_rule,
            resolved_index: None,
            provisional_rule: false,
        }
    }

    pub fn with_rule(mut self, rule: PositionRule) -> Self {
        self.position_rule = Some(rule);
        self.provisional_rule = false;
        self
    }

    pub fn key(&self) -> PhaseKey {
        PhaseKey {
            id: self.id,
            source_project: if self.is_linked {
                self.source_project
            } else {
                None
            },
        }
    }

    /// Whether the phase occupies a slot reserved by the template.
    ///
    /// A linked phase never does, even when it was standard in its source
    /// project.
    pub fn holds_standard_slot(&self) -> bool {
        self.is_standard && !self.is_linked
    }

    pub fn name_matches(&self, other: &str) -> bool {
        normalize_name(&self.name) == normalize_name(other)
    }
}

/// Canonical form used for case-insensitive name comparison.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}
