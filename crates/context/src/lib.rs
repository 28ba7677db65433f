//! Append-only conversational context log, pruned oldest-first to stay
//! within a byte budget.

pub mod error;
pub mod store;

pub use {
    error::{Error, Result},
    store::{ContextRecord, ContextStore, retained_start},
};
