//! Error types for the scheduler.

use thiserror::Error;

/// Errors that can occur in scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] trawl_store::StoreError),

    /// Invalid scheduler configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors a provider can report while configuring itself for a binding.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A setting the provider needs is absent.
    #[error("missing setting: {0}")]
    MissingSetting(String),

    /// A setting is present but unusable.
    #[error("invalid setting {key}: {reason}")]
    InvalidSetting { key: String, reason: String },

    /// The provider panicked while configuring.
    #[error("provider panicked: {0}")]
    Panicked(String),
}
