use std::{
    fmt,
    path::{Path, PathBuf},
};

use serde::Serialize;

/// Lifecycle state of a sandbox handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxState {
    Spawning,
    Ready,
    Terminated,
}

impl fmt::Display for SandboxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawning => write!(f, "spawning"),
            Self::Ready => write!(f, "ready"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// One isolated execution environment. Exactly one per job, never reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SandboxHandle {
    pub id: String,
    pub workdir: PathBuf,
    /// Control channel placeholder for VM-style backends.
    pub control_socket: PathBuf,
    pub state: SandboxState,
}

pub const ROOTFS_FILE: &str = "rootfs.ext4";
pub const CONTROL_SOCKET_FILE: &str = "control.sock";

impl SandboxHandle {
    pub(crate) fn allocate(root: &Path) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let workdir = root.join(&id);
        Self {
            control_socket: workdir.join(CONTROL_SOCKET_FILE),
            id,
            workdir,
            state: SandboxState::Spawning,
        }
    }

    pub fn rootfs(&self) -> PathBuf {
        self.workdir.join(ROOTFS_FILE)
    }

    pub fn is_terminated(&self) -> bool {
        self.state == SandboxState::Terminated
    }
}
