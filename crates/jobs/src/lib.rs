//! Job registry: identity, state transitions, and out-of-band execution of
//! scheduled snippets on a bounded worker pool.

pub mod error;
pub mod registry;
pub mod store;
pub mod store_file;
pub mod store_memory;
pub mod types;

pub use {
    error::{Error, Result},
    registry::{JobRegistry, JobRegistryBuilder},
    store::JobStore,
    store_file::FileJobStore,
    store_memory::InMemoryJobStore,
    types::{JobEvent, JobRecord, JobState, JobStatus, Transition},
};
