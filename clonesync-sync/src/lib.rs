//! # clonesync-sync
//!
//! Lineage matching and field synchronization between a template and its
//! clones.
//!
//! Call [`sync`] for the pure in-memory step, [`reconcile`] to fetch,
//! synchronize, and persist one template, or [`pipeline::run`] to process a
//! whole namespace or store.

pub mod diff;
pub mod drift;
pub mod error;
pub mod lister;
pub mod matcher;
pub mod patch;
pub mod pipeline;
pub mod reconcile;
pub mod synchronizer;

pub use diff::{diff_template, DiffTemplateResult, InstanceDiff};
pub use drift::DriftSignal;
pub use error::SyncError;
pub use lister::CandidateLister;
pub use matcher::LineageMatcher;
pub use patch::{PatchHelper, PatchResult};
pub use reconcile::{reconcile, reconcile_template, sync, ReconcileReport};
pub use synchronizer::FieldSynchronizer;
