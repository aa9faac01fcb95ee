//! Terminal output shared by the phase and template commands.

use serde::Serialize;
use uuid::Uuid;

use phasekeep_core::{PhaseRecord, Reconciliation, RuleChange};

/// Marker column: `S` standard, `L` linked, blank for custom phases.
fn marker(phase: &PhaseRecord) -> &'static str {
    if phase.is_standard {
        "S"
    } else if phase.is_linked {
        "L"
    } else {
        " "
    }
}

fn rule_text(phase: &PhaseRecord) -> String {
    phase
        .position_rule
        .map_or_else(|| "-".to_owned(), |r| r.to_string())
}

/// Print the reconciled order as a table, then any anomalies.
pub fn print_phases(reconciliation: &Reconciliation) {
    if reconciliation.is_empty() {
        println!("No phases.");
        return;
    }

    println!("{:>3}  {:<1}  {:<30} {:<16} {}", "#", "", "NAME", "POSITION", "ID");
    println!("{}", "-".repeat(92));
    for (i, phase) in reconciliation.phases.iter().enumerate() {
        let name = if phase.name.chars().count() > 28 {
            format!("{}...", phase.name.chars().take(25).collect::<String>())
        } else {
            phase.name.clone()
        };
        println!(
            "{:>3}  {:<1}  {:<30} {:<16} {}",
            phase.resolved_index.unwrap_or(i as u32 + 1),
            marker(phase),
            name,
            rule_text(phase),
            phase.id,
        );
    }
    print_anomalies(reconciliation);
}

pub fn print_anomalies(reconciliation: &Reconciliation) {
    if !reconciliation.has_anomalies() {
        return;
    }
    println!();
    println!("Warnings ({}):", reconciliation.anomalies.len());
    for anomaly in &reconciliation.anomalies {
        println!("  ! {anomaly}");
    }
    println!("Run `repair` to rewrite the stored positions.");
}

pub fn print_changes(changes: &[RuleChange]) {
    if changes.is_empty() {
        println!("No changes.");
        return;
    }
    for change in changes {
        println!("  {change}");
    }
}

/// JSON view of one reconciled phase.
#[derive(Debug, Serialize)]
pub struct PhaseJson<'a> {
    pub index: Option<u32>,
    pub id: Uuid,
    pub name: &'a str,
    pub position: Option<String>,
    pub standard: bool,
    pub linked: bool,
    pub source_project: Option<Uuid>,
}

impl<'a> From<&'a PhaseRecord> for PhaseJson<'a> {
    fn from(phase: &'a PhaseRecord) -> Self {
        Self {
            index: phase.resolved_index,
            id: phase.id,
            name: &phase.name,
            position: phase.position_rule.map(|r| r.to_string()),
            standard: phase.is_standard,
            linked: phase.is_linked,
            source_project: phase.source_project,
        }
    }
}

pub fn print_phases_json(reconciliation: &Reconciliation) -> anyhow::Result<()> {
    let phases: Vec<PhaseJson<'_>> = reconciliation.phases.iter().map(PhaseJson::from).collect();
    println!("{}", serde_json::to_string_pretty(&phases)?);
    Ok(())
}
