//! Template TOML parser with validation.
//!
//! Parses a template file into a [`Template`] and validates:
//! - At least one phase is defined.
//! - Phase names are non-empty and unique (ignoring case).
//! - Positions parse as `first`, `last`, `nth:<k>` or `last-minus:<k>` with
//!   a usable value.
//! - At most one phase is `first` and at most one is `last`.

use std::collections::HashSet;

use thiserror::Error;
use uuid::Uuid;

use super::toml_format::TemplateToml;
use super::{Template, TemplatePhase};
use crate::phase::normalize_name;
use crate::position::PositionRule;

/// Errors that can occur during template parsing and validation.
#[derive(Debug, Error)]
pub enum TemplateParseError {
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("template must contain at least one phase")]
    NoPhases,

    #[error("template name must not be empty")]
    EmptyTemplateName,

    #[error("phase #{0} has an empty name")]
    EmptyName(usize),

    #[error("duplicate phase name: {0:?}")]
    DuplicatePhaseName(String),

    #[error("invalid position {value:?} on phase {phase:?}: {reason}")]
    InvalidPosition {
        phase: String,
        value: String,
        reason: String,
    },

    #[error("phases {first:?} and {second:?} both claim {anchor}")]
    DuplicateAnchor {
        anchor: PositionRule,
        first: String,
        second: String,
    },
}

/// Parse and validate a template file.
pub fn parse_template_toml(content: &str) -> Result<Template, TemplateParseError> {
    let file: TemplateToml = toml::from_str(content)?;
    template_from_toml(&file)
}

/// Validate an already-deserialized template file and convert it.
///
/// Phases without an id get a fresh one.
pub fn template_from_toml(file: &TemplateToml) -> Result<Template, TemplateParseError> {
    if file.template.name.trim().is_empty() {
        return Err(TemplateParseError::EmptyTemplateName);
    }
    if file.phases.is_empty() {
        return Err(TemplateParseError::NoPhases);
    }

    let mut seen = HashSet::new();
    let mut first_holder: Option<&str> = None;
    let mut last_holder: Option<&str> = None;
    let mut phases = Vec::with_capacity(file.phases.len());

    for (i, entry) in file.phases.iter().enumerate() {
        let name = entry.name.trim();
        if name.is_empty() {
            return Err(TemplateParseError::EmptyName(i + 1));
        }
        if !seen.insert(normalize_name(name)) {
            return Err(TemplateParseError::DuplicatePhaseName(name.to_owned()));
        }

        let invalid = |reason: String| TemplateParseError::InvalidPosition {
            phase: name.to_owned(),
            value: entry.position.clone(),
            reason,
        };
        let position: PositionRule = entry.position.parse().map_err(|e| invalid(format!("{e}")))?;
        position.validate().map_err(|e| invalid(format!("{e}")))?;

        let holder = match position {
            PositionRule::First => Some(&mut first_holder),
            PositionRule::Last => Some(&mut last_holder),
            _ => None,
        };
        if let Some(holder) = holder {
            if let Some(existing) = holder {
                return Err(TemplateParseError::DuplicateAnchor {
                    anchor: position,
                    first: (*existing).to_owned(),
                    second: name.to_owned(),
                });
            }
            *holder = Some(name);
        }

        phases.push(TemplatePhase {
            id: entry.id.unwrap_or_else(Uuid::new_v4),
            name: name.to_owned(),
            position,
        });
    }

    Ok(Template {
        id: file.template.id,
        name: file.template.name.trim().to_owned(),
        phases,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELIVERY: &str = r#"
[template]
name = "Standard delivery"

[[phases]]
name = "Kickoff"
position = "first"

[[phases]]
name = "Planning"
position = "nth:2"

[[phases]]
name = "Review"
position = "last-minus:1"

[[phases]]
name = "Close"
position = "last"
"#;

    #[test]
    fn parse_valid_template() {
        let template = parse_template_toml(DELIVERY).expect("should parse");
        assert_eq!(template.name, "Standard delivery");
        assert_eq!(template.phases.len(), 4);
        assert_eq!(template.phases[2].position, PositionRule::LastMinusN(1));
        assert!(template.id.is_none());
    }

    #[test]
    fn keeps_ids_from_file() {
        let id = Uuid::new_v4();
        let content = format!(
            "[template]\nname = \"T\"\n\n[[phases]]\nid = \"{id}\"\nname = \"Kickoff\"\nposition = \"first\"\n"
        );
        let template = parse_template_toml(&content).expect("should parse");
        assert_eq!(template.phases[0].id, id);
    }

    #[test]
    fn rejects_template_without_phases() {
        let err = parse_template_toml("[template]\nname = \"Empty\"\n").unwrap_err();
        assert!(matches!(err, TemplateParseError::NoPhases));
    }

    #[test]
    fn rejects_blank_template_name() {
        let content = "[template]\nname = \"  \"\n\n[[phases]]\nname = \"A\"\nposition = \"first\"\n";
        let err = parse_template_toml(content).unwrap_err();
        assert!(matches!(err, TemplateParseError::EmptyTemplateName));
    }

    #[test]
    fn rejects_duplicate_names_ignoring_case() {
        let content = r#"
[template]
name = "T"

[[phases]]
name = "Kickoff"
position = "first"

[[phases]]
name = "KICKOFF"
position = "nth:2"
"#;
        let err = parse_template_toml(content).unwrap_err();
        assert!(matches!(err, TemplateParseError::DuplicatePhaseName(ref n) if n == "KICKOFF"));
    }

    #[test]
    fn rejects_empty_phase_name() {
        let content = "[template]\nname = \"T\"\n\n[[phases]]\nname = \"\"\nposition = \"first\"\n";
        let err = parse_template_toml(content).unwrap_err();
        assert!(matches!(err, TemplateParseError::EmptyName(1)));
    }

    #[test]
    fn rejects_unparseable_position() {
        let content = "[template]\nname = \"T\"\n\n[[phases]]\nname = \"A\"\nposition = \"middle\"\n";
        let err = parse_template_toml(content).unwrap_err();
        assert!(matches!(err, TemplateParseError::InvalidPosition { ref phase, .. } if phase == "A"));
    }

    #[test]
    fn rejects_impossible_position_values() {
        for position in ["nth:0", "last-minus:-1"] {
            let content = format!(
                "[template]\nname = \"T\"\n\n[[phases]]\nname = \"A\"\nposition = \"{position}\"\n"
            );
            let err = parse_template_toml(&content).unwrap_err();
            assert!(
                matches!(err, TemplateParseError::InvalidPosition { .. }),
                "{position} should be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn rejects_second_last_anchor() {
        let content = r#"
[template]
name = "T"

[[phases]]
name = "Close"
position = "last"

[[phases]]
name = "Archive"
position = "last"
"#;
        let err = parse_template_toml(content).unwrap_err();
        match err {
            TemplateParseError::DuplicateAnchor {
                anchor,
                first,
                second,
            } => {
                assert_eq!(anchor, PositionRule::Last);
                assert_eq!(first, "Close");
                assert_eq!(second, "Archive");
            }
            other => panic!("expected DuplicateAnchor, got {other:?}"),
        }
    }

    #[test]
    fn rejects_invalid_toml() {
        let err = parse_template_toml("[template\nname=").unwrap_err();
        assert!(matches!(err, TemplateParseError::TomlError(_)));
    }
}
