//! In-memory [`PersistenceAdapter`] mirroring the PostgreSQL stores'
//! commit semantics.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use uuid::Uuid;

use super::PersistenceAdapter;
use crate::mutation::RuleSet;
use crate::phase::PhaseRecord;

/// Phase rows kept in a map keyed by owner.
///
/// Like [`super::PgProjectStore`], it never stores standard phases unless
/// created with [`MemoryStore::for_templates`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<Uuid, Vec<PhaseRecord>>>,
    keep_standard: bool,
    fail_next_commit: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that owns standard phases, for template edits.
    pub fn for_templates() -> Self {
        Self {
            keep_standard: true,
            ..Self::default()
        }
    }

    /// Seed rows for `owner_id`, replacing any already there.
    pub fn seed(&self, owner_id: Uuid, phases: Vec<PhaseRecord>) {
        if let Ok(mut rows) = self.rows.lock() {
            rows.insert(owner_id, phases);
        }
    }

    /// Make the next commit fail without changing anything.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Current rows for `owner_id`.
    pub fn rows(&self, owner_id: Uuid) -> Vec<PhaseRecord> {
        self.rows
            .lock()
            .map(|rows| rows.get(&owner_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    fn owns(&self, phase: &PhaseRecord) -> bool {
        self.keep_standard || !phase.holds_standard_slot()
    }
}

#[async_trait]
impl PersistenceAdapter for MemoryStore {
    async fn load_phases(&self, owner_id: Uuid) -> Result<Vec<PhaseRecord>> {
        Ok(self.rows(owner_id))
    }

    async fn commit_phases(&self, owner_id: Uuid, rule_set: &RuleSet) -> Result<()> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            bail!("simulated commit failure for {owner_id}");
        }

        let mut rows = self
            .rows
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        // Work on a copy so a failed commit leaves the rows untouched.
        let mut staged = rows.get(&owner_id).cloned().unwrap_or_default();

        for phase in rule_set.phases.iter().filter(|p| self.owns(p)) {
            let mut stored = phase.clone();
            stored.resolved_index = None;
            stored.provisional_rule = false;
            if rule_set.is_added(phase) {
                staged.push(stored);
                continue;
            }
            match staged.iter_mut().find(|r| r.key() == phase.key()) {
                Some(row) => {
                    row.position_rule = phase.position_rule;
                    row.provisional_rule = false;
                }
                None => bail!("phase {:?} ({}) does not exist in {owner_id}", phase.name, phase.id),
            }
        }
        for phase in rule_set.removed.iter().filter(|p| self.owns(p)) {
            // Duplicates share a key; drop the latest copy only.
            match staged.iter().rposition(|r| r.key() == phase.key()) {
                Some(at) => {
                    staged.remove(at);
                }
                None => bail!("phase {:?} ({}) does not exist in {owner_id}", phase.name, phase.id),
            }
        }

        rows.insert(owner_id, staged);
        Ok(())
    }
}
