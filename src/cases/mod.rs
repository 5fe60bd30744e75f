//! Moderation case engine
//!
//! Durable records of disciplinary actions and their lifecycle: opening
//! with per-guild sequential ids, scheduled expiry with exactly-once
//! reversal, administrative closing, and filtered queries.

mod action;
mod error;
mod record;
mod service;
mod store;

pub use action::{ActionHandler, ActionRegistry, NoopAction};
pub use error::{CaseError, CaseResult};
pub use record::{ActionKind, ModerationCase};
pub use service::{CaseCheckRequest, CaseService};
pub use store::{CaseFilter, CaseStore, MemoryCaseStore};
