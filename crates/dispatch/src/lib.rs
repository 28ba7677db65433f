//! Maps a job kind to an execution strategy and runs snippets inside a
//! sandbox, normalizing what comes back into an [`ExecResult`].
//!
//! [`ExecResult`]: sandbar_common::ExecResult

pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod gui;
pub mod python;
pub mod shell;
pub mod typescript;

pub use {
    dispatcher::Dispatcher,
    error::{Error, Result},
    executor::KindExecutor,
    gui::{GuiExecutor, xdot_script},
    python::PythonExecutor,
    shell::ShellExecutor,
    typescript::{NO_RUNTIME_MESSAGE, TypescriptExecutor},
};
