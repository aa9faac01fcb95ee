//! The `PersistenceAdapter` trait and its implementations.
//!
//! An adapter loads the phase rows a session owns and commits a
//! [`RuleSet`] atomically: either every row changes or none does.

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::mutation::RuleSet;
use crate::phase::PhaseRecord;

pub use memory::MemoryStore;
pub use postgres::{PgProjectStore, PgTemplateProvider, PgTemplateStore};

/// Durable store for phase rows.
///
/// `owner_id` is a project id for project stores and a template id for
/// template stores.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    /// Load every stored phase, in insertion order.
    async fn load_phases(&self, owner_id: Uuid) -> Result<Vec<PhaseRecord>>;

    /// Apply `rule_set` in one transaction.
    async fn commit_phases(&self, owner_id: Uuid, rule_set: &RuleSet) -> Result<()>;
}

// Compile-time assertion: PersistenceAdapter must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn PersistenceAdapter) {}
};
