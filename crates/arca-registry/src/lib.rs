//! Model registry interface for the Arca backup engine.
//!
//! The engine never hard-codes entity shapes. Everything it knows about a
//! model (its fields, its instances, how to create and link them) comes
//! through the [`ModelRegistry`] trait defined here. Concrete backends
//! adapt a real database; this crate ships one backend:
//!
//! - [`InMemoryRegistry`]: `RwLock`-guarded tables for tests, embedding and
//!   the CLI's JSON fixture stores
//!
//! # Contract
//!
//! 1. Field descriptors are declared, never inferred from values.
//! 2. `iterate` is read-only; `since` filters only models that track
//!    modification and is ignored for the rest.
//! 3. Relation writes name their targets by primary key; a backend may reject
//!    targets that do not exist.
//! 4. All backend failures are propagated as [`RegistryError`].

pub mod error;
pub mod instance;
pub mod memory;
pub mod snapshot;
pub mod traits;

pub use error::{RegistryError, RegistryResult};
pub use instance::{Attachment, Instance, InstanceWrite};
pub use memory::InMemoryRegistry;
pub use traits::ModelRegistry;
