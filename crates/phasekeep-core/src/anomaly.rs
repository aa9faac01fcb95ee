//! Reconciliation anomalies and planner rejections.
//!
//! An [`Anomaly`] is reported and never blocks: the reconciler still returns
//! a usable order. A [`PlanError`] blocks the requested mutation and no rule
//! is changed.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::position::PositionRule;

/// Structural problem found while reconciling a phase set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    /// A second record with an identity key already seen. Dropped.
    DuplicateId { id: Uuid, name: String },
    /// A standard phase whose stored rule disagrees with the template.
    StalePosition {
        id: Uuid,
        name: String,
        stored: Option<PositionRule>,
        canonical: PositionRule,
    },
    /// A phase with no rule; it was given a provisional one.
    MissingRule {
        id: Uuid,
        name: String,
        provisional: PositionRule,
    },
    /// An `Nth` rule outside `1..=total`; clamped for ordering.
    OutOfRange {
        id: Uuid,
        name: String,
        rule: PositionRule,
        total: u32,
    },
    /// A negative `LastMinusN` offset; the phase kept its incoming position.
    InvalidOffset {
        id: Uuid,
        name: String,
        rule: PositionRule,
    },
    /// Several phases of the same class claim the same slot.
    DuplicatePosition {
        slot: u32,
        rule: PositionRule,
        names: Vec<String>,
    },
    /// A standard phase the template no longer defines.
    NotInTemplate { id: Uuid, name: String },
    /// Distinct phases whose names match case-insensitively.
    NameCollision { name: String, ids: Vec<Uuid> },
}

impl Anomaly {
    /// Id of the phase the anomaly is about, when it concerns one phase.
    pub fn phase_id(&self) -> Option<Uuid> {
        match self {
            Self::DuplicateId { id, .. }
            | Self::StalePosition { id, .. }
            | Self::MissingRule { id, .. }
            | Self::OutOfRange { id, .. }
            | Self::InvalidOffset { id, .. }
            | Self::NotInTemplate { id, .. } => Some(*id),
            Self::DuplicatePosition { .. } | Self::NameCollision { .. } => None,
        }
    }

    /// Short machine-friendly label, e.g. `duplicate_position`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateId { .. } => "duplicate_id",
            Self::StalePosition { .. } => "stale_position",
            Self::MissingRule { .. } => "missing_rule",
            Self::OutOfRange { .. } => "out_of_range",
            Self::InvalidOffset { .. } => "invalid_offset",
            Self::DuplicatePosition { .. } => "duplicate_position",
            Self::NotInTemplate { .. } => "not_in_template",
            Self::NameCollision { .. } => "name_collision",
        }
    }
}

fn rule_text(rule: Option<PositionRule>) -> String {
    rule.map_or_else(|| "none".to_owned(), |r| r.to_string())
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateId { id, name } => {
                write!(f, "duplicate phase {name:?} ({id}) ignored")
            }
            Self::StalePosition {
                name,
                stored,
                canonical,
                ..
            } => write!(
                f,
                "standard phase {name:?} stored at {} but the template places it at {canonical}",
                rule_text(*stored)
            ),
            Self::MissingRule {
                name, provisional, ..
            } => write!(
                f,
                "phase {name:?} has no position; assigned {provisional}"
            ),
            Self::OutOfRange {
                name, rule, total, ..
            } => write!(
                f,
                "phase {name:?} position {rule} is outside 1..={total}"
            ),
            Self::InvalidOffset { name, rule, .. } => write!(
                f,
                "phase {name:?} position {rule} has a negative offset; kept in place"
            ),
            Self::DuplicatePosition { slot, rule, names } => write!(
                f,
                "phases {} all claim slot {slot} ({rule})",
                names
                    .iter()
                    .map(|n| format!("{n:?}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Self::NotInTemplate { name, .. } => {
                write!(f, "standard phase {name:?} is not defined by the template")
            }
            Self::NameCollision { name, ids } => write!(
                f,
                "{} phases are named {name:?} (names must be unique ignoring case)",
                ids.len()
            ),
        }
    }
}

/// Why a planned mutation was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("position {index} is out of range (1..={total})")]
    OutOfRange { index: i64, total: u32 },

    #[error("cannot {action} standard phase {name:?} outside template-edit mode")]
    LockedPhase { name: String, action: String },

    #[error("a phase named {existing:?} already exists (requested {name:?})")]
    NameCollision { name: String, existing: String },

    #[error("no phase with id {0}")]
    UnknownPhase(Uuid),

    #[error("phase {name:?} ({id}) is already part of the plan")]
    DuplicateId { id: Uuid, name: String },

    #[error("phase name must not be empty")]
    EmptyName,
}
