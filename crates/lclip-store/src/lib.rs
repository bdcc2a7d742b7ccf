//! Artifact store: typed, job-scoped persistence for pipeline outputs.
//!
//! Every cross-stage handoff flows through this crate. Collections are
//! written atomically (clear-then-insert in one transaction), which makes
//! stage retries idempotent. Ordered reads come back pre-sorted; callers
//! never sort.
//!
//! Two implementations share the [`ArtifactStore`] trait:
//! - [`RedisArtifactStore`]: production backend
//! - [`MemoryArtifactStore`]: in-process store for tests and development

pub mod error;
pub mod memory;
pub mod redis_store;
pub mod scope;
mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryArtifactStore;
pub use redis_store::RedisArtifactStore;
pub use scope::JobArtifacts;
pub use store::{ArtifactStore, ClipArtifacts, ProgressUpdate, StatusUpdate};
