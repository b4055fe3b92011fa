// File: ksbot-core/src/storage/mod.rs
//
// Flat-file persistence shared by every entry point (scheduler, CLI, manual runs).
// Nothing here locks; cross-run exclusion is the run lock's job.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::info;

use crate::Error;
use crate::guard::RunLock;

pub mod result_store;
pub mod code_ledger;
pub mod players;

pub use result_store::ResultStore;
pub use code_ledger::{CodeLedger, pending_for};
pub use players::CsvPlayerSource;

pub const RESULTS_FILE: &str = "results.csv";
pub const CODES_FILE: &str = "ks_codes.txt";
pub const PLAYERS_FILE: &str = "players.csv";
pub const LOCK_FILE: &str = "redeem.lock";
pub const CONFIG_FILE: &str = "config.json";
pub const LOG_FILE: &str = "ks_bot.log";

/// Locations of every durable artifact, all under one data directory.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    pub base_dir: PathBuf,
    pub results: PathBuf,
    pub codes: PathBuf,
    pub players: PathBuf,
    pub lock: PathBuf,
    pub config: PathBuf,
    pub log: PathBuf,
}

impl StoragePaths {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            results: base_dir.join(RESULTS_FILE),
            codes: base_dir.join(CODES_FILE),
            players: base_dir.join(PLAYERS_FILE),
            lock: base_dir.join(LOCK_FILE),
            config: base_dir.join(CONFIG_FILE),
            log: base_dir.join(LOG_FILE),
            base_dir,
        }
    }

    pub fn run_lock(&self) -> RunLock {
        RunLock::new(&self.lock)
    }
}

/// Deletes the tracked codes and all redemption results so every active code
/// is attempted again on the next run. Refused while a run holds the lock.
pub async fn clear_history(paths: &StoragePaths) -> Result<(), Error> {
    if paths.run_lock().is_held() {
        return Err(Error::Config(
            "a redemption run is in progress; refusing to clear history".into(),
        ));
    }
    for path in [&paths.codes, &paths.results] {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(write_error(path, e)),
        }
    }
    info!("History cleared (codes and results).");
    Ok(())
}

/// Rejects identifiers that cannot be stored as a bare field of a line/CSV row.
pub(crate) fn validate_field(kind: &str, value: &str) -> Result<(), Error> {
    if value.trim().is_empty() {
        return Err(Error::InvalidIdentifier(format!("empty {kind}")));
    }
    if value.contains([',', '"', '\n', '\r']) {
        return Err(Error::InvalidIdentifier(format!(
            "{kind} '{}' contains a separator or line break",
            value.escape_debug()
        )));
    }
    Ok(())
}

pub(crate) fn write_error(path: &Path, source: std::io::Error) -> Error {
    Error::StorageWrite {
        path: path.display().to_string(),
        source,
    }
}

/// Reads a whole text file; a missing file is `None`, anything else that stops
/// the read is `StorageUnreadable`.
pub(crate) async fn read_optional(path: &Path) -> Result<Option<String>, Error> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::StorageUnreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Appends one line and fsyncs before returning.
///
/// `header` is written first when the file is new or empty. If a previous
/// writer died mid-line (no trailing newline) the torn tail is closed off
/// so the new line starts cleanly.
pub(crate) async fn append_line(path: &Path, header: Option<&str>, line: &str) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| write_error(path, e))?;
        }
    }

    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| write_error(path, e))?;

    let len = file.metadata().await.map_err(|e| write_error(path, e))?.len();
    let mut buf = String::new();
    if len == 0 {
        if let Some(h) = header {
            buf.push_str(h);
            buf.push('\n');
        }
    } else {
        file.seek(SeekFrom::End(-1)).await.map_err(|e| write_error(path, e))?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last).await.map_err(|e| write_error(path, e))?;
        if last[0] != b'\n' {
            buf.push('\n');
        }
    }
    buf.push_str(line);
    buf.push('\n');

    file.write_all(buf.as_bytes()).await.map_err(|e| write_error(path, e))?;
    file.flush().await.map_err(|e| write_error(path, e))?;
    file.sync_all().await.map_err(|e| write_error(path, e))?;
    Ok(())
}

/// Replaces `path` with `contents` via temp file + fsync + rename, so a crash
/// leaves either the old file or the new one, never a truncated one.
pub(crate) async fn atomic_write(path: &Path, contents: String) -> Result<(), Error> {
    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<(), Error> {
        use std::io::Write;

        let parent = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(|e| write_error(&target, e))?;

        let mut temp = tempfile::NamedTempFile::new_in(&parent).map_err(|e| write_error(&target, e))?;
        temp.write_all(contents.as_bytes()).map_err(|e| write_error(&target, e))?;
        temp.as_file().sync_all().map_err(|e| write_error(&target, e))?;
        temp.persist(&target).map_err(|e| write_error(&target, e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| Error::StorageWrite {
        path: path.display().to_string(),
        source: std::io::Error::other(e.to_string()),
    })?
}
