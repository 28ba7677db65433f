use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use {
    fd_lock::RwLock,
    sandbar_common::time::now_secs,
    sandbar_config::ContextConfig,
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

use crate::error::Result;

pub const DEFAULT_FILE: &str = "history.jsonl";

/// One line of the context log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRecord {
    pub role: String,
    pub content: String,
    /// Seconds since the epoch, never lower than the previous record's.
    pub ts: u64,
}

/// Bounded JSONL log with file locking.
///
/// Writers hold an exclusive lock on a sidecar `<file>.lock` for the whole
/// append + prune step; readers hold a shared one. The lock lives beside the
/// log because pruning replaces the log file itself.
#[derive(Debug, Clone)]
pub struct ContextStore {
    path: PathBuf,
    budget_bytes: u64,
}

impl ContextStore {
    pub fn new(path: impl Into<PathBuf>, budget_bytes: u64) -> Self {
        Self {
            path: path.into(),
            budget_bytes,
        }
    }

    pub fn from_config(config: &ContextConfig) -> Self {
        let path = config
            .path
            .clone()
            .unwrap_or_else(|| sandbar_config::data_dir().join(DEFAULT_FILE));
        Self::new(path, config.budget_bytes())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn budget_bytes(&self) -> u64 {
        self.budget_bytes
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Append a record, then prune the oldest records if the log exceeds its
    /// budget.
    pub async fn append(&self, role: &str, content: &str) -> Result<ContextRecord> {
        let path = self.path.clone();
        let lock_path = self.lock_path();
        let budget = self.budget_bytes;
        let role = role.to_string();
        let content = content.to_string();

        tokio::task::spawn_blocking(move || {
            append_locked(&path, &lock_path, budget, role, content)
        })
        .await?
    }

    /// All records, oldest first.
    pub async fn dump(&self) -> Result<Vec<ContextRecord>> {
        let path = self.path.clone();
        let lock_path = self.lock_path();

        tokio::task::spawn_blocking(move || read_locked(&path, &lock_path)).await?
    }

    /// The newest `n` records, oldest first.
    pub async fn tail(&self, n: usize) -> Result<Vec<ContextRecord>> {
        let mut records = self.dump().await?;
        let start = records.len().saturating_sub(n);
        Ok(records.split_off(start))
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.dump().await?.len())
    }

    /// Remove every record.
    pub async fn clear(&self) -> Result<()> {
        let path = self.path.clone();
        let lock_path = self.lock_path();

        tokio::task::spawn_blocking(move || -> Result<()> {
            if !path.exists() {
                return Ok(());
            }
            let mut lock = RwLock::new(open_lock_file(&lock_path)?);
            let _guard = lock.write()?;
            match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
        .await?
    }
}

/// Index of the first line to keep so that the kept suffix fits in `budget`.
///
/// Lines are counted with their trailing newline. The line whose inclusion
/// first pushes the running total over the budget is dropped with everything
/// older, so a single line larger than the budget leaves nothing.
pub fn retained_start(lines: &[&str], budget: u64) -> usize {
    let mut total: u64 = 0;
    for (idx, line) in lines.iter().enumerate().rev() {
        total += line.len() as u64 + 1;
        if total > budget {
            return idx + 1;
        }
    }
    0
}

fn open_lock_file(lock_path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(lock_path)
}

fn read_if_exists(path: &Path) -> io::Result<String> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(raw),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e),
    }
}

fn append_locked(
    path: &Path,
    lock_path: &Path,
    budget: u64,
    role: String,
    content: String,
) -> Result<ContextRecord> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let mut lock = RwLock::new(open_lock_file(lock_path)?);
    let _guard = lock.write()?;

    let existing = read_if_exists(path)?;
    let last_ts = existing
        .lines()
        .rev()
        .find_map(|line| serde_json::from_str::<ContextRecord>(line.trim()).ok())
        .map(|record| record.ts)
        .unwrap_or(0);

    let record = ContextRecord {
        role,
        content,
        ts: now_secs().max(last_ts),
    };
    let mut line = serde_json::to_string(&record)?;
    line.push('\n');
    // Never glue a record onto a torn last line.
    if !existing.is_empty() && !existing.ends_with('\n') {
        line.insert(0, '\n');
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;

    let size = (existing.len() + line.len()) as u64;
    if size > budget {
        let mut full = existing;
        full.push_str(&line);
        prune(path, &full, budget)?;
    }
    Ok(record)
}

fn prune(path: &Path, content: &str, budget: u64) -> Result<()> {
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = retained_start(&lines, budget);

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    for line in &lines[start..] {
        writeln!(tmp, "{line}")?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    debug!(
        dropped = start,
        kept = lines.len() - start,
        budget,
        "context log pruned"
    );
    Ok(())
}

fn read_locked(path: &Path, lock_path: &Path) -> Result<Vec<ContextRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut lock = RwLock::new(open_lock_file(lock_path)?);
    let _guard = lock.read()?;

    let raw = read_if_exists(path)?;
    let mut records = Vec::new();
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str(trimmed) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!("skipping malformed context line: {e}");
            },
        }
    }
    Ok(records)
}
