//! Sandbox lifecycle: allocation, scoped use, and guaranteed teardown of
//! isolated execution environments.
//!
//! [`SandboxManager`] decides *when* a sandbox exists. A [`SandboxProvider`]
//! decides *how* it is isolated (host passthrough, docker container).

pub mod docker;
pub mod error;
pub mod exec;
pub mod handle;
pub mod host;
pub mod manager;
pub mod provider;

pub use {
    docker::DockerProvider,
    error::{Error, Result},
    exec::ExecOpts,
    handle::{SandboxHandle, SandboxState},
    host::HostProvider,
    manager::{ActiveSandbox, SandboxManager},
    provider::{SandboxProvider, create_provider},
};
