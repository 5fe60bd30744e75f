//! Error types for the case engine

use thiserror::Error;

/// Errors that can occur during case operations
#[derive(Debug, Error)]
pub enum CaseError {
    /// The case is not in a state that permits the transition
    #[error("invalid case transition")]
    InvalidTransition,

    /// No such case in the guild
    #[error("case #{case_id} not found in guild {guild_id}")]
    NotFound { guild_id: u64, case_id: u64 },

    /// The backing store rejected or never saw the operation
    #[error("case persistence failure: {0}")]
    Persistence(String),

    /// The platform-side action could not be applied or reversed
    #[error("moderation action failed: {0}")]
    Action(String),
}

/// Result type for case operations
pub type CaseResult<T> = Result<T, CaseError>;
