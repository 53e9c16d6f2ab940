//! clonesync core library: domain types, the object store seam, errors.
//!
//! - [`types`]: templates, instances, lineage
//! - [`store`]: [`ObjectStore`] and the in-memory [`MemoryStore`]
//! - [`file_store`]: YAML-file backed [`FileStore`]
//! - [`error`]: [`StoreError`]

pub mod error;
pub mod file_store;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use file_store::{FileStore, ObjectClass};
pub use store::{MemoryStore, ObjectStore, StoreCalls};
pub use types::{
    GroupKind, Instance, InstanceSpec, Lineage, Namespace, ObjectKey, ObjectMeta, ObjectName,
    Template, TemplateSpec,
};
