//! phasekeep engine: position rules, reconciliation, mutation planning and
//! the per-project session that commits plans through a persistence
//! adapter.

pub mod anomaly;
pub mod export;
pub mod mutation;
pub mod phase;
pub mod position;
pub mod reconcile;
pub mod service;
pub mod session;
pub mod store;
pub mod template;

pub use anomaly::{Anomaly, PlanError};
pub use mutation::{
    ChangeKind, EditMode, RuleChange, RuleSet, display_order, plan_delete, plan_incorporate,
    plan_insert, plan_move, plan_repair,
};
pub use phase::{PhaseKey, PhaseRecord};
pub use position::{Band, PositionRule, RuleError};
pub use reconcile::{Reconciler, Reconciliation, reconcile};
pub use session::{MutationKind, ProjectSession, SessionError, SessionState};
pub use store::PersistenceAdapter;
pub use template::{Template, TemplatePhase, TemplateProvider};
