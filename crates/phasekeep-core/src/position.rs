//! Position rules: declarative placement directives for phases.
//!
//! A [`PositionRule`] says where a phase wants to sit (`first`, `last`,
//! `nth:<k>`, `last-minus:<k>`). [`PositionRule::resolve`] turns it into a
//! concrete 1-based slot for a plan of a given size. Resolved slots may
//! collide; the reconciler breaks ties with [`Band`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use phasekeep_db::models::PositionKind;

/// Where a phase wants to sit in its plan.
///
/// `Nth` and `LastMinusN` hold the raw stored value, so an invalid value
/// (`nth:0`, `last-minus:-1`) survives loading and is reported when the rule
/// is resolved instead of being silently dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PositionRule {
    First,
    Last,
    /// 1-based slot counted from the start.
    Nth(i32),
    /// Offset counted back from the last slot (`LastMinusN(0)` is the last
    /// slot itself).
    LastMinusN(i32),
}

/// Tie-break band for phases that resolve to the same slot.
///
/// Declaration order is the ordering: `First < Nth < LastMinusN < Last`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Band {
    First,
    Nth,
    LastMinusN,
    Last,
}

/// Errors produced when resolving or decoding a [`PositionRule`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error(
        "position {index} is out of range{}",
        .total.map(|t| format!(" (1..={t})")).unwrap_or_default()
    )]
    OutOfRange { index: i64, total: Option<u32> },

    #[error("offset {0} from the end must not be negative")]
    InvalidOffset(i64),

    #[error("malformed position rule: {0}")]
    Malformed(String),
}

impl PositionRule {
    /// Resolve the rule to a 1-based slot in a plan of `total` phases.
    ///
    /// `LastMinusN` clamps into `2..=total` because slot 1 belongs to
    /// `First`; a single-phase plan resolves it to 1.
    pub fn resolve(self, total: u32) -> Result<u32, RuleError> {
        if total == 0 {
            return Err(RuleError::OutOfRange {
                index: 1,
                total: Some(0),
            });
        }
        match self {
            Self::First => Ok(1),
            Self::Last => Ok(total),
            Self::Nth(k) => {
                if k < 1 || k as u32 > total {
                    return Err(RuleError::OutOfRange {
                        index: i64::from(k),
                        total: Some(total),
                    });
                }
                Ok(k as u32)
            }
            Self::LastMinusN(k) => {
                if k < 0 {
                    return Err(RuleError::InvalidOffset(i64::from(k)));
                }
                let raw = i64::from(total) - i64::from(k);
                let clamped = raw.max(2).min(i64::from(total)).max(1);
                Ok(clamped as u32)
            }
        }
    }

    /// Check that the rule could resolve in a large enough plan.
    pub fn validate(self) -> Result<(), RuleError> {
        match self {
            Self::Nth(k) if k < 1 => Err(RuleError::OutOfRange {
                index: i64::from(k),
                total: None,
            }),
            Self::LastMinusN(k) if k < 0 => Err(RuleError::InvalidOffset(i64::from(k))),
            _ => Ok(()),
        }
    }

    pub fn band(self) -> Band {
        match self {
            Self::First => Band::First,
            Self::Nth(_) => Band::Nth,
            Self::LastMinusN(_) => Band::LastMinusN,
            Self::Last => Band::Last,
        }
    }

    /// `First` or `Last`.
    pub fn is_anchor(self) -> bool {
        matches!(self, Self::First | Self::Last)
    }

    /// Rebuild a rule from its persisted columns.
    ///
    /// A NULL kind means the row has no rule. Anchors must not carry a
    /// value; `nth` and `last_minus_n` must.
    pub fn from_parts(
        kind: Option<PositionKind>,
        value: Option<i32>,
    ) -> Result<Option<Self>, RuleError> {
        let rule = match (kind, value) {
            (None, None) => return Ok(None),
            (None, Some(v)) => {
                return Err(RuleError::Malformed(format!(
                    "position value {v} without a kind"
                )));
            }
            (Some(PositionKind::First), None) => Self::First,
            (Some(PositionKind::Last), None) => Self::Last,
            (Some(PositionKind::Nth), Some(v)) => Self::Nth(v),
            (Some(PositionKind::LastMinusN), Some(v)) => Self::LastMinusN(v),
            (Some(kind @ (PositionKind::First | PositionKind::Last)), Some(v)) => {
                return Err(RuleError::Malformed(format!(
                    "{kind} does not take a value (got {v})"
                )));
            }
            (Some(kind), None) => {
                return Err(RuleError::Malformed(format!("{kind} requires a value")));
            }
        };
        Ok(Some(rule))
    }

    /// Split a rule into its persisted columns.
    pub fn into_parts(self) -> (PositionKind, Option<i32>) {
        match self {
            Self::First => (PositionKind::First, None),
            Self::Last => (PositionKind::Last, None),
            Self::Nth(k) => (PositionKind::Nth, Some(k)),
            Self::LastMinusN(k) => (PositionKind::LastMinusN, Some(k)),
        }
    }
}

/// Persisted columns for an optional rule.
pub fn rule_parts(rule: Option<PositionRule>) -> (Option<PositionKind>, Option<i32>) {
    match rule {
        Some(rule) => {
            let (kind, value) = rule.into_parts();
            (Some(kind), value)
        }
        None => (None, None),
    }
}

/// Resolve `rule` in a plan of `total` phases. See [`PositionRule::resolve`].
pub fn resolve(rule: PositionRule, total: u32) -> Result<u32, RuleError> {
    rule.resolve(total)
}

impl fmt::Display for PositionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => f.write_str("first"),
            Self::Last => f.write_str("last"),
            Self::Nth(k) => write!(f, "nth:{k}"),
            Self::LastMinusN(k) => write!(f, "last-minus:{k}"),
        }
    }
}

impl FromStr for PositionRule {
    type Err = RuleError;

    /// Accepts `first`, `last`, `nth:<k>`, `last-minus:<k>` and a bare
    /// integer as shorthand for `nth:<k>`. Case and surrounding whitespace
    /// are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim().to_ascii_lowercase();
        let parse_value = |raw: &str| {
            raw.trim()
                .parse::<i32>()
                .map_err(|_| RuleError::Malformed(format!("invalid number in {s:?}")))
        };

        match text.as_str() {
            "first" => return Ok(Self::First),
            "last" => return Ok(Self::Last),
            _ => {}
        }
        if let Some(raw) = text.strip_prefix("nth:") {
            return Ok(Self::Nth(parse_value(raw)?));
        }
        if let Some(raw) = text.strip_prefix("last-minus:") {
            return Ok(Self::LastMinusN(parse_value(raw)?));
        }
        if let Ok(k) = text.parse::<i32>() {
            return Ok(Self::Nth(k));
        }
        Err(RuleError::Malformed(format!(
            "{s:?} (expected first, last, nth:<k> or last-minus:<k>)"
        )))
    }
}

impl TryFrom<String> for PositionRule {
    type Error = RuleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PositionRule> for String {
    fn from(rule: PositionRule) -> Self {
        rule.to_string()
    }
}
