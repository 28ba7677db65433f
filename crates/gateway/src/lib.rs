//! HTTP gateway: schedule jobs, query their status, read the context log.
//!
//! Routes:
//! - `POST /schedule` `{kind, code}` → `{job_id}`
//! - `GET /status/{job_id}` → `{state, stdout, stderr}`
//! - `GET /jobs?limit=` → job records, newest first
//! - `GET /context?tail=` → context records, oldest first
//! - `GET /health`

pub mod routes;
pub mod server;
pub mod state;

pub use {
    server::{build_gateway_app, start_gateway},
    state::GatewayState,
};
