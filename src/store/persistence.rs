//! Atomic, fsync'd file persistence: write-to-temp, fsync, rename.

use std::io::Write;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;

/// I/O and (de)serialization failures from the State Store's disk layer.
///
/// Per the design, these are recovered (retried with backoff) by the store
/// itself; callers only see a `PersistenceError` if a write could not be
/// completed after its retry budget.
#[derive(Debug, Error, Diagnostic)]
pub enum PersistenceError {
    #[error("failed to write `{path}`: {source}")]
    #[diagnostic(code(taskgraph::store::write_failed))]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read `{path}`: {source}")]
    #[diagnostic(code(taskgraph::store::read_failed))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed state file `{path}`: {source}")]
    #[diagnostic(
        code(taskgraph::store::malformed),
        help("The file is treated as missing rather than crashing the process.")
    )]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

/// The `.state/` directory layout for a project.
#[derive(Clone, Debug)]
pub struct StatePaths {
    root: PathBuf,
}

impl StatePaths {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            root: project_root.into().join(".state"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_file(&self, session_id: &str) -> PathBuf {
        self.root.join(format!("session-{session_id}.json"))
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.root.join("checkpoints")
    }

    pub fn checkpoint_file(&self, checkpoint_id: &str) -> PathBuf {
        self.checkpoints_dir().join(format!("{checkpoint_id}.json"))
    }

    pub fn export_file(&self, iso_timestamp: &str) -> PathBuf {
        self.root.join(format!("export-{iso_timestamp}.json"))
    }
}

/// Write `bytes` to `path` atomically: a temp file in the same directory is
/// written, fsync'd, then renamed over the destination. Never leaves a
/// partially-written file at `path`.
fn write_atomic_sync(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Serialize `value` to pretty JSON and write it atomically.
pub async fn write_json_atomic<T: serde::Serialize + Send + 'static>(
    path: PathBuf,
    value: &T,
) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| PersistenceError::Malformed {
        path: path.clone(),
        source,
    })?;
    let write_path = path.clone();
    tokio::task::spawn_blocking(move || write_atomic_sync(&write_path, &bytes))
        .await
        .expect("blocking write task panicked")
        .map_err(|source| PersistenceError::Write { path, source })
}

/// Read and deserialize a JSON file. A missing file returns `Ok(None)`; a
/// malformed file is logged and also treated as missing (never a panic).
pub async fn read_json_optional<T>(path: PathBuf) -> Result<Option<T>>
where
    T: serde::de::DeserializeOwned + Send + 'static,
{
    let read_path = path.clone();
    let bytes = tokio::task::spawn_blocking(move || match std::fs::read(&read_path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(PersistenceError::Read {
            path: read_path,
            source,
        }),
    })
    .await
    .expect("blocking read task panicked")?;

    let Some(bytes) = bytes else {
        return Ok(None);
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok(Some(value)),
        Err(source) => {
            tracing::warn!(path = %path.display(), error = %source, "malformed state file treated as missing");
            Ok(None)
        }
    }
}

/// List checkpoint ids present under `dir` (file stem of every `*.json` file).
pub async fn list_checkpoint_ids(dir: PathBuf) -> Result<Vec<String>> {
    tokio::task::spawn_blocking(move || {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(PersistenceError::Read { path: dir, source }),
        };
        let mut ids = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        Ok(ids)
    })
    .await
    .expect("blocking readdir task panicked")
}

/// Delete a file if it exists; missing files are not an error.
pub async fn remove_file_if_exists(path: PathBuf) -> Result<()> {
    tokio::task::spawn_blocking(move || match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(PersistenceError::Write { path, source }),
    })
    .await
    .expect("blocking remove task panicked")
}
