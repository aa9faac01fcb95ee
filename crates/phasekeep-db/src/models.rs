use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Discriminant of a persisted position rule.
///
/// Stored in the `position_kind` column next to the nullable
/// `position_value`; `nth` and `last_minus_n` carry a value, the anchors do
/// not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PositionKind {
    First,
    Last,
    Nth,
    LastMinusN,
}

impl fmt::Display for PositionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::First => "first",
            Self::Last => "last",
            Self::Nth => "nth",
            Self::LastMinusN => "last_minus_n",
        };
        f.write_str(s)
    }
}

impl FromStr for PositionKind {
    type Err = PositionKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" => Ok(Self::First),
            "last" => Ok(Self::Last),
            "nth" => Ok(Self::Nth),
            "last_minus_n" => Ok(Self::LastMinusN),
            other => Err(PositionKindParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`PositionKind`] string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid position kind: {0:?}")]
pub struct PositionKindParseError(pub String);

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A template: the shared skeleton of standard phases.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TemplateRow {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A standard phase defined by a template.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TemplatePhaseRow {
    pub id: Uuid,
    pub template_id: Uuid,
    pub name: String,
    pub position_kind: Option<PositionKind>,
    pub position_value: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A project: a plan whose phase order is reconciled against a template.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProjectRow {
    pub id: Uuid,
    pub name: String,
    pub template_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A project-owned phase: either custom or linked from another project.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProjectPhaseRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub is_linked: bool,
    pub source_project_id: Option<Uuid>,
    pub position_kind: Option<PositionKind>,
    pub position_value: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_kind_display_roundtrip() {
        let variants = [
            PositionKind::First,
            PositionKind::Last,
            PositionKind::Nth,
            PositionKind::LastMinusN,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: PositionKind = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn position_kind_invalid() {
        let err = "middle".parse::<PositionKind>().unwrap_err();
        assert_eq!(err.to_string(), "invalid position kind: \"middle\"");
    }
}
