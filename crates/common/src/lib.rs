//! Shared types, error definitions, and utilities used across all sandbar crates.

pub mod error;
pub mod time;
pub mod types;

pub use {
    error::{Error, FromMessage, Result, SandbarError},
    types::{ExecResult, JobKind, UnsupportedKind},
};
