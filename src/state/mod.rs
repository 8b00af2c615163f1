//! State management module
//!
//! Ephemeral per-member cases and persisted per-module policies

pub mod policy_store;
pub mod registry;

// Re-export commonly used state components
pub use policy_store::PolicyStore;
pub use registry::{CaseGuard, CaseRegistry};
