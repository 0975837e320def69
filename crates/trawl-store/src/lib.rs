//! Records and storage contracts for Trawl.
//!
//! This crate provides:
//! - The job, provider binding, notification adapter and user records
//! - The `JobStore` / `UserStore` contracts the orchestrator consumes
//! - An in-memory store and a JSON-file store implementing both contracts

mod error;
mod file;
mod memory;
mod store;
mod types;

pub use error::StoreError;
pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use store::{JobStore, UserStore};
pub use types::{Job, NotificationAdapter, ProviderBinding, User};
