//! The mutation planner: pure functions computing new rule assignments for
//! insert, incorporate, move, delete and repair.
//!
//! Planners take the current reconciled phases and return a [`RuleSet`]
//! describing the complete proposed plan, or a [`PlanError`] when the
//! request would violate a constraint. They never touch the input.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::anomaly::PlanError;
use crate::phase::{PhaseKey, PhaseRecord};
use crate::position::{Band, PositionRule};
use crate::reconcile::{Reconciliation, rank, sort_slot};

/// Which phases the engine may reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EditMode {
    /// Editing one project: standard phases are locked to their template
    /// slots.
    ProjectEdit,
    /// Editing a template itself: every phase is movable and anchors are
    /// reassigned positionally.
    TemplateEdit,
}

impl fmt::Display for EditMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProjectEdit => f.write_str("project-edit"),
            Self::TemplateEdit => f.write_str("template-edit"),
        }
    }
}

/// A complete proposed plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    /// Every phase in proposed order, with `resolved_index` set.
    pub phases: Vec<PhaseRecord>,
    /// Phases that do not exist in the store yet.
    pub added: Vec<PhaseKey>,
    /// Phases to delete from the store.
    pub removed: Vec<PhaseRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Moved,
    Removed,
}

/// One row of a [`RuleSet`] diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleChange {
    pub id: Uuid,
    pub name: String,
    pub kind: ChangeKind,
    pub before: Option<PositionRule>,
    pub after: Option<PositionRule>,
}

impl fmt::Display for RuleChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = |rule: Option<PositionRule>| rule.map_or_else(|| "-".to_owned(), |r| r.to_string());
        match self.kind {
            ChangeKind::Added => write!(f, "+ {} at {}", self.name, text(self.after)),
            ChangeKind::Removed => write!(f, "- {} (was {})", self.name, text(self.before)),
            ChangeKind::Moved => write!(
                f,
                "~ {}: {} -> {}",
                self.name,
                text(self.before),
                text(self.after)
            ),
        }
    }
}

impl RuleSet {
    pub fn is_added(&self, phase: &PhaseRecord) -> bool {
        self.added.contains(&phase.key())
    }

    pub fn get(&self, id: Uuid) -> Option<&PhaseRecord> {
        self.phases.iter().find(|p| p.id == id)
    }

    /// Diff against the phases the set was planned from. A provisional rule
    /// counts as no rule, so writing it shows up as a move.
    pub fn changes(&self, before: &[PhaseRecord]) -> Vec<RuleChange> {
        let prior: HashMap<PhaseKey, Option<PositionRule>> = before
            .iter()
            .map(|p| (p.key(), p.position_rule.filter(|_| !p.provisional_rule)))
            .collect();

        let mut changes = Vec::new();
        for phase in &self.phases {
            let kind = match prior.get(&phase.key()) {
                None => ChangeKind::Added,
                Some(rule) if *rule != phase.position_rule => ChangeKind::Moved,
                Some(_) => continue,
            };
            changes.push(RuleChange {
                id: phase.id,
                name: phase.name.clone(),
                kind,
                before: prior.get(&phase.key()).copied().flatten(),
                after: phase.position_rule,
            });
        }
        changes.extend(self.removed.iter().map(|phase| RuleChange {
            id: phase.id,
            name: phase.name.clone(),
            kind: ChangeKind::Removed,
            before: phase.position_rule,
            after: None,
        }));
        changes
    }
}

/// Phases sorted by their last resolved index; unresolved ones keep their
/// relative order at the end.
pub fn display_order(phases: &[PhaseRecord]) -> Vec<PhaseRecord> {
    let mut order = phases.to_vec();
    order.sort_by_key(|p| p.resolved_index.unwrap_or(u32::MAX));
    order
}

/// Plan adding `new_phase`.
///
/// In template-edit mode the phase goes just before the `Last` holder. In
/// project-edit mode it takes the lowest free slot from 3 on, never an
/// anchor. Existing rules are left untouched, except that a template phase
/// holding `LastMinusN(1)` is pinned where it is.
pub fn plan_insert(
    phases: &[PhaseRecord],
    mut new_phase: PhaseRecord,
    mode: EditMode,
) -> Result<RuleSet, PlanError> {
    check_new_phase(phases, &new_phase)?;

    let mut existing = phases.to_vec();
    let rule = match mode {
        EditMode::TemplateEdit => {
            if phases.iter().any(|p| p.position_rule == Some(PositionRule::Last)) {
                pin_before_last(&mut existing);
                PositionRule::LastMinusN(1)
            } else {
                PositionRule::Nth(phases.len() as i32 + 1)
            }
        }
        EditMode::ProjectEdit => free_slot(phases, 3),
    };
    debug!(phase = %new_phase.name, %rule, %mode, "planned insert");
    new_phase.position_rule = Some(rule);
    Ok(with_new_phase(&existing, new_phase, mode))
}

/// Hand the slot before `Last` over to a new phase: whoever holds
/// `LastMinusN(1)` keeps its current position as an `Nth`.
fn pin_before_last(phases: &mut [PhaseRecord]) {
    let total = phases.len() as u32;
    for phase in phases
        .iter_mut()
        .filter(|p| p.position_rule == Some(PositionRule::LastMinusN(1)))
    {
        let index = phase.resolved_index.unwrap_or(total.saturating_sub(1)).max(1);
        phase.position_rule = Some(PositionRule::Nth(index as i32));
        phase.provisional_rule = false;
    }
}

/// Plan incorporating a linked phase from another project at the next free
/// slot after any `First` holder.
pub fn plan_incorporate(phases: &[PhaseRecord], mut linked: PhaseRecord) -> Result<RuleSet, PlanError> {
    linked.is_linked = true;
    check_new_phase(phases, &linked)?;

    let rule = free_slot(phases, 1);
    debug!(phase = %linked.name, %rule, "planned incorporate");
    linked.position_rule = Some(rule);
    Ok(with_new_phase(phases, linked, EditMode::ProjectEdit))
}

/// Plan moving `moved_id` to the 1-based `desired_index`.
pub fn plan_move(
    phases: &[PhaseRecord],
    moved_id: Uuid,
    desired_index: u32,
    mode: EditMode,
) -> Result<RuleSet, PlanError> {
    let mut order = display_order(phases);
    let from = order
        .iter()
        .position(|p| p.id == moved_id)
        .ok_or(PlanError::UnknownPhase(moved_id))?;

    let moved = &order[from];
    if moved.holds_standard_slot() && mode != EditMode::TemplateEdit {
        return Err(locked(moved, "reorder"));
    }
    let total = order.len() as u32;
    if desired_index < 1 || desired_index > total {
        return Err(PlanError::OutOfRange {
            index: i64::from(desired_index),
            total,
        });
    }
    let occupant = &order[desired_index as usize - 1];
    if mode == EditMode::ProjectEdit && occupant.id != moved_id && occupant.holds_standard_slot() {
        return Err(locked(occupant, "displace"));
    }

    let before: HashMap<Uuid, u32> = order
        .iter()
        .enumerate()
        .map(|(i, p)| (p.id, i as u32 + 1))
        .collect();
    let phase = order.remove(from);
    order.insert(desired_index as usize - 1, phase);
    let proposed = settle(order, mode);

    if mode == EditMode::ProjectEdit {
        if let Some(shifted) = proposed
            .iter()
            .filter(|p| p.holds_standard_slot())
            .find(|p| before.get(&p.id).copied() != p.resolved_index)
        {
            return Err(locked(shifted, "displace"));
        }
    }
    let landed = proposed.iter().find(|p| p.id == moved_id).and_then(|p| p.resolved_index);
    if landed != Some(desired_index) {
        let blocker = proposed
            .iter()
            .find(|p| p.resolved_index == Some(desired_index))
            .unwrap_or(&proposed[0]);
        return Err(locked(blocker, "displace"));
    }

    debug!(%moved_id, from = from + 1, to = desired_index, %mode, "planned move");
    Ok(RuleSet {
        phases: proposed,
        added: Vec::new(),
        removed: Vec::new(),
    })
}

/// Plan removing `removed_id` and closing the gap it leaves.
pub fn plan_delete(phases: &[PhaseRecord], removed_id: Uuid, mode: EditMode) -> Result<RuleSet, PlanError> {
    let mut order = display_order(phases);
    let at = order
        .iter()
        .position(|p| p.id == removed_id)
        .ok_or(PlanError::UnknownPhase(removed_id))?;
    if order[at].holds_standard_slot() && mode != EditMode::TemplateEdit {
        return Err(locked(&order[at], "delete"));
    }

    let removed = order.remove(at);
    debug!(phase = %removed.name, at = at + 1, %mode, "planned delete");
    Ok(RuleSet {
        phases: settle(order, mode),
        added: Vec::new(),
        removed: vec![removed],
    })
}

/// Plan rewriting every owned rule to match the reconciled order, and
/// removing records dropped as duplicates.
pub fn plan_repair(reconciliation: &Reconciliation, mode: EditMode) -> RuleSet {
    let order = reconciliation.phases.clone();
    RuleSet {
        phases: settle(order, mode),
        added: Vec::new(),
        removed: reconciliation.dropped.clone(),
    }
}

fn locked(phase: &PhaseRecord, action: &str) -> PlanError {
    PlanError::LockedPhase {
        name: phase.name.clone(),
        action: action.to_owned(),
    }
}

fn check_new_phase(phases: &[PhaseRecord], new_phase: &PhaseRecord) -> Result<(), PlanError> {
    if new_phase.name.trim().is_empty() {
        return Err(PlanError::EmptyName);
    }
    if phases.iter().any(|p| p.key() == new_phase.key()) {
        return Err(PlanError::DuplicateId {
            id: new_phase.id,
            name: new_phase.name.clone(),
        });
    }
    if let Some(existing) = phases.iter().find(|p| p.name_matches(&new_phase.name)) {
        return Err(PlanError::NameCollision {
            name: new_phase.name.clone(),
            existing: existing.name.clone(),
        });
    }
    Ok(())
}

/// Lowest slot at or after `start`, before the final slot of the grown
/// plan, that no existing rule resolves to. Falls back to just before the
/// end.
fn free_slot(phases: &[PhaseRecord], start: u32) -> PositionRule {
    let total = phases.len() as u32 + 1;
    let occupied: HashSet<u32> = phases
        .iter()
        .filter_map(|p| p.position_rule.and_then(|r| r.resolve(total).ok()))
        .collect();
    (start..total)
        .find(|slot| !occupied.contains(slot))
        .map_or(PositionRule::LastMinusN(1), |slot| PositionRule::Nth(slot as i32))
}

fn with_new_phase(phases: &[PhaseRecord], new_phase: PhaseRecord, mode: EditMode) -> RuleSet {
    let added = vec![new_phase.key()];
    let mut order = display_order(phases);
    order.push(new_phase);
    RuleSet {
        phases: rank(order, None, mode).phases,
        added,
        removed: Vec::new(),
    }
}

/// Renumber `order` and rank the result until it stops changing. A custom
/// phase sorted past a standard anchor lands inside it after one pass; the
/// next pass makes its rule agree with where it landed.
fn settle(order: Vec<PhaseRecord>, mode: EditMode) -> Vec<PhaseRecord> {
    let mut phases = rank(renumber(order, mode), None, mode).phases;
    for _ in 0..phases.len() {
        let next = rank(renumber(phases.clone(), mode), None, mode).phases;
        if next == phases {
            break;
        }
        phases = next;
    }
    phases
}

/// Rewrite rules so `order` is the resolved order.
///
/// Template edits number positionally: the ends become the anchors and
/// everything between is `Nth(position)`. Project edits keep standard rules
/// and give each other phase `Nth(position)`, clamped so it still sorts
/// between the standard phases around it.
pub(crate) fn renumber(order: Vec<PhaseRecord>, mode: EditMode) -> Vec<PhaseRecord> {
    let n = order.len() as u32;
    match mode {
        EditMode::TemplateEdit => order
            .into_iter()
            .enumerate()
            .map(|(i, phase)| {
                let pos = i as u32 + 1;
                let rule = if pos == 1 {
                    PositionRule::First
                } else if pos == n {
                    PositionRule::Last
                } else {
                    PositionRule::Nth(pos as i32)
                };
                phase.with_rule(rule)
            })
            .collect(),
        EditMode::ProjectEdit => {
            let standard: Vec<Option<(u32, Band)>> = order
                .iter()
                .map(|p| {
                    p.holds_standard_slot()
                        .then_some(p.position_rule)
                        .flatten()
                        .and_then(|r| sort_slot(r, n).map(|slot| (slot, r.band())))
                })
                .collect();

            // Lowest slot a custom phase may take after each position.
            let mut lower = vec![1u32; order.len()];
            let mut bound = 1;
            for (i, key) in standard.iter().enumerate() {
                if let Some((slot, band)) = *key {
                    bound = if band <= Band::Nth { slot } else { slot + 1 };
                }
                lower[i] = bound;
            }
            // Highest slot it may take before each position.
            let mut upper = vec![n; order.len()];
            let mut bound = n;
            for (i, key) in standard.iter().enumerate().rev() {
                if let Some((slot, band)) = *key {
                    bound = if band > Band::Nth { slot } else { slot.saturating_sub(1) };
                }
                upper[i] = bound;
            }

            order
                .into_iter()
                .enumerate()
                .map(|(i, phase)| {
                    if phase.holds_standard_slot() {
                        return phase;
                    }
                    let pos = i as u32 + 1;
                    let (lo, hi) = (lower[i], upper[i]);
                    let slot = if lo <= hi { pos.clamp(lo, hi) } else { pos };
                    phase.with_rule(PositionRule::Nth(slot as i32))
                })
                .collect()
        }
    }
}
