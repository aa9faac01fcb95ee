//! Per-project session: one state machine gating every operation on a
//! project's (or template's) phases.
//!
//! ```text
//! idle        -> reconciling
//! reconciling -> idle
//! reconciling -> error
//! idle        -> mutating(kind)
//! mutating    -> committing
//! mutating    -> idle        (rejected plan)
//! committing  -> reconciling
//! committing  -> error
//! error       -> reconciling (reload from the store)
//! ```
//!
//! A session is the single writer for its owner: every operation takes
//! `&mut self`, and anything issued outside `Idle` is refused.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::anomaly::PlanError;
use crate::mutation::{
    EditMode, RuleChange, RuleSet, plan_delete, plan_incorporate, plan_insert, plan_move,
    plan_repair,
};
use crate::phase::PhaseRecord;
use crate::reconcile::{Reconciler, Reconciliation};
use crate::store::PersistenceAdapter;
use crate::template::TemplateProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Insert,
    Move,
    Delete,
    Incorporate,
    Repair,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => f.write_str("insert"),
            Self::Move => f.write_str("move"),
            Self::Delete => f.write_str("delete"),
            Self::Incorporate => f.write_str("incorporate"),
            Self::Repair => f.write_str("repair"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Reconciling,
    Mutating(MutationKind),
    Committing,
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Reconciling => f.write_str("reconciling"),
            Self::Mutating(kind) => write!(f, "mutating({kind})"),
            Self::Committing => f.write_str("committing"),
            Self::Error => f.write_str("error"),
        }
    }
}

impl SessionState {
    /// Check whether `from -> to` is an edge of the session graph.
    pub fn is_valid_transition(from: SessionState, to: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (from, to),
            (Idle, Reconciling)
                | (Reconciling, Idle)
                | (Reconciling, Error)
                | (Idle, Mutating(_))
                | (Mutating(_), Committing)
                | (Mutating(_), Idle)
                | (Committing, Reconciling)
                | (Committing, Error)
                | (Error, Reconciling)
        )
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{owner_id} is busy ({state}); cannot start {requested}")]
    Busy {
        owner_id: Uuid,
        state: SessionState,
        requested: SessionState,
    },

    #[error("phases of {0} have not been loaded; refresh first")]
    NotLoaded(Uuid),

    #[error("{operation} is not available in {mode} mode")]
    WrongMode {
        operation: MutationKind,
        mode: EditMode,
    },

    #[error(transparent)]
    Rejected(#[from] PlanError),

    #[error("failed to commit changes to {owner_id}; reloaded the stored phases")]
    CommitFailed {
        owner_id: Uuid,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// The engine's view of one project (or, in template-edit mode, one
/// template).
pub struct ProjectSession {
    owner_id: Uuid,
    mode: EditMode,
    templates: Option<Arc<dyn TemplateProvider>>,
    store: Arc<dyn PersistenceAdapter>,
    state: SessionState,
    snapshot: Option<Reconciliation>,
}

impl fmt::Debug for ProjectSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectSession")
            .field("owner_id", &self.owner_id)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("phases", &self.snapshot.as_ref().map(Reconciliation::len))
            .finish()
    }
}

impl ProjectSession {
    /// A project-edit session: standard phases come from `templates`, the
    /// project's own rows from `store`.
    pub fn for_project(
        project_id: Uuid,
        templates: Arc<dyn TemplateProvider>,
        store: Arc<dyn PersistenceAdapter>,
    ) -> Self {
        Self {
            owner_id: project_id,
            mode: EditMode::ProjectEdit,
            templates: Some(templates),
            store,
            state: SessionState::Idle,
            snapshot: None,
        }
    }

    /// A template-edit session over the rows of one template.
    pub fn for_template(template_id: Uuid, store: Arc<dyn PersistenceAdapter>) -> Self {
        Self {
            owner_id: template_id,
            mode: EditMode::TemplateEdit,
            templates: None,
            store,
            state: SessionState::Idle,
            snapshot: None,
        }
    }

    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The last reconciliation, if the session has been refreshed.
    pub fn snapshot(&self) -> Option<&Reconciliation> {
        self.snapshot.as_ref()
    }

    /// Reload from the store and reconcile. Also the way out of `Error`.
    pub async fn refresh(&mut self) -> Result<&Reconciliation, SessionError> {
        if !matches!(self.state, SessionState::Idle | SessionState::Error) {
            return Err(SessionError::Busy {
                owner_id: self.owner_id,
                state: self.state,
                requested: SessionState::Reconciling,
            });
        }
        self.transition(SessionState::Reconciling)?;
        match self.load().await {
            Ok(reconciliation) => {
                self.transition(SessionState::Idle)?;
                Ok(&*self.snapshot.insert(reconciliation))
            }
            Err(e) => {
                self.transition(SessionState::Error)?;
                Err(SessionError::Store(e))
            }
        }
    }

    /// Add a phase named `name`: a custom phase in project-edit mode, a new
    /// standard phase in template-edit mode.
    pub async fn insert(&mut self, name: &str) -> Result<Vec<RuleChange>, SessionError> {
        let current = self.begin(MutationKind::Insert)?;
        let name = name.trim();
        let new_phase = match self.mode {
            EditMode::ProjectEdit => PhaseRecord::custom(name, None),
            EditMode::TemplateEdit => PhaseRecord::standard(Uuid::new_v4(), name, None),
        };
        let planned = plan_insert(&current.phases, new_phase, self.mode);
        self.apply(&current, planned).await
    }

    /// Link phase `phase_id` (named `name`) of `source_project` into this
    /// project.
    pub async fn incorporate(
        &mut self,
        source_project: Uuid,
        phase_id: Uuid,
        name: &str,
    ) -> Result<Vec<RuleChange>, SessionError> {
        if self.mode != EditMode::ProjectEdit {
            return Err(SessionError::WrongMode {
                operation: MutationKind::Incorporate,
                mode: self.mode,
            });
        }
        let current = self.begin(MutationKind::Incorporate)?;
        let linked = PhaseRecord::linked(phase_id, name.trim(), source_project, None);
        let planned = plan_incorporate(&current.phases, linked);
        self.apply(&current, planned).await
    }

    pub async fn move_phase(
        &mut self,
        phase_id: Uuid,
        desired_index: u32,
    ) -> Result<Vec<RuleChange>, SessionError> {
        let current = self.begin(MutationKind::Move)?;
        let planned = plan_move(&current.phases, phase_id, desired_index, self.mode);
        self.apply(&current, planned).await
    }

    pub async fn delete(&mut self, phase_id: Uuid) -> Result<Vec<RuleChange>, SessionError> {
        let current = self.begin(MutationKind::Delete)?;
        let planned = plan_delete(&current.phases, phase_id, self.mode);
        self.apply(&current, planned).await
    }

    /// Rewrite stored rules so the next reconciliation is anomaly-free.
    pub async fn repair(&mut self) -> Result<Vec<RuleChange>, SessionError> {
        let current = self.begin(MutationKind::Repair)?;
        let planned = Ok(plan_repair(&current, self.mode));
        self.apply(&current, planned).await
    }

    fn transition(&mut self, to: SessionState) -> Result<(), SessionError> {
        if !SessionState::is_valid_transition(self.state, to) {
            return Err(SessionError::Busy {
                owner_id: self.owner_id,
                state: self.state,
                requested: to,
            });
        }
        info!(owner_id = %self.owner_id, from = %self.state, to = %to, "session transition");
        self.state = to;
        Ok(())
    }

    /// Enter `Mutating(kind)` and hand back the snapshot to plan against.
    fn begin(&mut self, kind: MutationKind) -> Result<Reconciliation, SessionError> {
        let to = SessionState::Mutating(kind);
        if !SessionState::is_valid_transition(self.state, to) {
            return Err(SessionError::Busy {
                owner_id: self.owner_id,
                state: self.state,
                requested: to,
            });
        }
        let current = self
            .snapshot
            .clone()
            .ok_or(SessionError::NotLoaded(self.owner_id))?;
        self.transition(to)?;
        Ok(current)
    }

    async fn apply(
        &mut self,
        current: &Reconciliation,
        planned: Result<RuleSet, PlanError>,
    ) -> Result<Vec<RuleChange>, SessionError> {
        let rule_set = match planned {
            Ok(rule_set) => rule_set,
            Err(e) => {
                warn!(owner_id = %self.owner_id, error = %e, "mutation rejected");
                self.transition(SessionState::Idle)?;
                return Err(SessionError::Rejected(e));
            }
        };
        let changes = rule_set.changes(&current.phases);

        self.transition(SessionState::Committing)?;
        if let Err(e) = self.store.commit_phases(self.owner_id, &rule_set).await {
            warn!(owner_id = %self.owner_id, error = %e, "commit failed; reloading stored phases");
            self.transition(SessionState::Error)?;
            self.recover().await;
            return Err(SessionError::CommitFailed {
                owner_id: self.owner_id,
                source: e,
            });
        }

        self.transition(SessionState::Reconciling)?;
        match self.load().await {
            Ok(reconciliation) => {
                self.snapshot = Some(reconciliation);
                self.transition(SessionState::Idle)?;
                info!(owner_id = %self.owner_id, changes = changes.len(), "committed mutation");
                Ok(changes)
            }
            Err(e) => {
                self.transition(SessionState::Error)?;
                Err(SessionError::Store(e))
            }
        }
    }

    /// `Error -> Reconciling -> Idle` against the store's current rows. A
    /// failed reload leaves the session in `Error` with the old snapshot.
    async fn recover(&mut self) {
        if self.transition(SessionState::Reconciling).is_err() {
            return;
        }
        match self.load().await {
            Ok(reconciliation) => {
                self.snapshot = Some(reconciliation);
                let _ = self.transition(SessionState::Idle);
                info!(owner_id = %self.owner_id, "recovered from failed commit");
            }
            Err(e) => {
                warn!(owner_id = %self.owner_id, error = %e, "reload after failed commit failed");
                let _ = self.transition(SessionState::Error);
            }
        }
    }

    async fn load(&self) -> anyhow::Result<Reconciliation> {
        let stored = self.store.load_phases(self.owner_id).await?;
        match &self.templates {
            Some(provider) => {
                let template = provider.get_template().await?;
                let mut phases = template.standard_records();
                phases.extend(stored);
                Ok(Reconciler::new(&template).reconcile(phases))
            }
            None => Ok(Reconciler::template_edit().reconcile(stored)),
        }
    }
}
