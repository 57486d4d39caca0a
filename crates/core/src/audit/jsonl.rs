use super::{verify_chain, AuditEntry, AuditRef, AuditSink, SealedEntry, GENESIS_HASH};
use crate::{AuditError, AuditResult};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use vpr_uuid::CorrelationId;

/// File operations the sink relies on.
trait LogFile: Write + Send {
    fn len(&self) -> std::io::Result<u64>;
    fn truncate(&mut self, len: u64) -> std::io::Result<()>;
    fn sync(&mut self) -> std::io::Result<()>;
    fn read_only(&self) -> std::io::Result<bool>;
}

impl LogFile for File {
    fn len(&self) -> std::io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> std::io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> std::io::Result<()> {
        self.sync_data()
    }

    fn read_only(&self) -> std::io::Result<bool> {
        Ok(self.metadata()?.permissions().readonly())
    }
}

fn write_synced(file: &mut dyn LogFile, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line)?;
    file.flush()?;
    file.sync()
}

struct Log {
    file: Box<dyn LogFile>,
    entries: Vec<SealedEntry>,
    index: HashMap<AuditRef, usize>,
    /// Set when a failed append could not be rolled back. The file tail is then unknown and
    /// the sink refuses further writes until the log is reopened and verified.
    poisoned: Option<String>,
}

impl Log {
    /// Writes one line. On any failure the file is cut back to its previous length.
    fn write_line(&mut self, line: &[u8]) -> AuditResult<()> {
        let committed = self.file.len()?;
        let Err(error) = write_synced(self.file.as_mut(), line) else {
            return Ok(());
        };

        match self.file.truncate(committed).and_then(|()| self.file.sync()) {
            Ok(()) => {
                tracing::error!(%error, committed, "audit append failed; partial line removed");
            }
            Err(rollback) => {
                tracing::error!(%error, %rollback, "audit append failed and could not be undone");
                self.poisoned = Some(format!(
                    "append failed ({error}) and the partial line could not be removed ({rollback})"
                ));
            }
        }
        Err(error.into())
    }
}

/// Audit sink backed by a JSON-lines file.
///
/// One sealed entry per line. The file is only ever opened for appending; each append is
/// flushed and synced before it is acknowledged. Opening an existing log replays it and
/// verifies the hash chain, refusing to continue a log that has been tampered with.
pub struct JsonlAuditSink {
    path: PathBuf,
    log: Mutex<Log>,
}

impl std::fmt::Debug for JsonlAuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlAuditSink")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl JsonlAuditSink {
    /// Opens (or creates) the log at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Corrupt`] if a line cannot be parsed, [`AuditError::ChainBroken`]
    /// if the stored chain does not verify, or an I/O error.
    pub fn open(path: impl Into<PathBuf>) -> AuditResult<Self> {
        Self::open_with(path.into(), |file| -> Box<dyn LogFile> { Box::new(file) })
    }

    fn open_with(
        path: PathBuf,
        wrap: impl FnOnce(File) -> Box<dyn LogFile>,
    ) -> AuditResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let entries = read_entries(&path)?;
        verify_chain(&entries)?;

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.entry.entry_id.clone(), i))
            .collect();
        tracing::debug!(path = %path.display(), entries = entries.len(), "opened audit log");

        Ok(Self {
            path,
            log: Mutex::new(Log {
                file: wrap(file),
                entries,
                index,
                poisoned: None,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Log> {
        self.log.lock().unwrap_or_else(|p| p.into_inner())
    }
}

fn read_entries(path: &Path) -> AuditResult<Vec<SealedEntry>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut entries = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let sealed: SealedEntry =
            serde_json::from_str(&line).map_err(|e| AuditError::Corrupt {
                line: number + 1,
                reason: e.to_string(),
            })?;
        entries.push(sealed);
    }
    Ok(entries)
}

impl AuditSink for JsonlAuditSink {
    fn append(&self, entry: AuditEntry) -> AuditResult<AuditRef> {
        let mut log = self.lock();
        if let Some(reason) = &log.poisoned {
            return Err(AuditError::Unavailable(reason.clone()));
        }
        if log.index.contains_key(&entry.entry_id) {
            return Err(AuditError::DuplicateEntry(entry.entry_id));
        }
        let previous = log
            .entries
            .last()
            .map(|e| e.integrity.entry_hash.as_str())
            .unwrap_or(GENESIS_HASH);
        let sealed = SealedEntry::seal(entry, previous)?;

        let mut line = serde_json::to_vec(&sealed)?;
        line.push(b'\n');
        log.write_line(&line)?;

        let id = sealed.entry.entry_id.clone();
        let position = log.entries.len();
        log.entries.push(sealed);
        log.index.insert(id.clone(), position);
        Ok(id)
    }

    fn probe(&self) -> AuditResult<()> {
        let log = self.lock();
        if let Some(reason) = &log.poisoned {
            return Err(AuditError::Unavailable(reason.clone()));
        }
        if log.file.read_only()? {
            return Err(AuditError::Unavailable(format!(
                "audit log {} is read-only",
                self.path.display()
            )));
        }
        Ok(())
    }

    fn entry(&self, id: &AuditRef) -> AuditResult<Option<SealedEntry>> {
        let log = self.lock();
        Ok(log.index.get(id).map(|&i| log.entries[i].clone()))
    }

    fn by_correlation(&self, correlation_id: &CorrelationId) -> AuditResult<Vec<SealedEntry>> {
        Ok(self
            .lock()
            .entries
            .iter()
            .filter(|e| e.entry.correlation_id.as_ref() == Some(correlation_id))
            .cloned()
            .collect())
    }

    fn entries(&self) -> AuditResult<Vec<SealedEntry>> {
        Ok(self.lock().entries.clone())
    }

    fn last_id(&self) -> Option<AuditRef> {
        self.lock().entries.last().map(|e| e.entry.entry_id.clone())
    }
}
