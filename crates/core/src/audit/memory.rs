use super::{AuditEntry, AuditRef, AuditSink, SealedEntry, GENESIS_HASH};
use crate::{AuditError, AuditResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use vpr_uuid::CorrelationId;

#[derive(Debug, Default)]
struct Log {
    entries: Vec<SealedEntry>,
    index: HashMap<AuditRef, usize>,
}

/// Audit sink held in process memory.
///
/// Used by tests and by the REST runner when no audit log path is configured. Writability can
/// be switched off to exercise the audit-unavailable paths.
#[derive(Debug)]
pub struct InMemoryAuditSink {
    log: Mutex<Log>,
    writable: AtomicBool,
}

impl Default for InMemoryAuditSink {
    fn default() -> Self {
        Self {
            log: Mutex::new(Log::default()),
            writable: AtomicBool::new(true),
        }
    }
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_writable(&self, writable: bool) {
        self.writable.store(writable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Log> {
        self.log.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl AuditSink for InMemoryAuditSink {
    fn append(&self, entry: AuditEntry) -> AuditResult<AuditRef> {
        self.probe()?;
        let mut log = self.lock();
        if log.index.contains_key(&entry.entry_id) {
            return Err(AuditError::DuplicateEntry(entry.entry_id));
        }
        let previous = log
            .entries
            .last()
            .map(|e| e.integrity.entry_hash.as_str())
            .unwrap_or(GENESIS_HASH);
        let sealed = SealedEntry::seal(entry, previous)?;
        let id = sealed.entry.entry_id.clone();
        let position = log.entries.len();
        log.entries.push(sealed);
        log.index.insert(id.clone(), position);
        Ok(id)
    }

    fn probe(&self) -> AuditResult<()> {
        if self.writable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AuditError::Unavailable("in-memory sink is not accepting writes".into()))
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{verify_chain, EntryDraft, EntryType, TimestampSource};
    use chrono::{TimeZone, Utc};
    use vpr_uuid::{CanonicalUuid, TimestampId};

    fn entry(correlation: Option<CorrelationId>) -> AuditEntry {
        let at = Utc.with_ymd_and_hms(2026, 5, 1, 10, 0, 0).unwrap();
        let mut draft = EntryDraft::system(EntryType::TransitionDecision, "evaluate");
        draft.correlation_id = correlation;
        draft.stamp(
            TimestampId::new(at, CanonicalUuid::new()),
            at,
            TimestampSource::Trusted,
        )
    }

    #[test]
    fn duplicate_entry_id_is_rejected() {
        let sink = InMemoryAuditSink::new();
        let first = entry(None);
        let id = sink.append(first.clone()).unwrap();

        let mut replay = entry(None);
        replay.entry_id = id.clone();
        replay.action = "rewritten".into();
        let err = sink.append(replay).unwrap_err();
        assert!(matches!(err, AuditError::DuplicateEntry(dup) if dup == id));

        assert_eq!(sink.len(), 1);
        assert_eq!(sink.entry(&id).unwrap().unwrap().entry, first);
    }

    #[test]
    fn entries_are_retrievable_by_correlation() {
        let sink = InMemoryAuditSink::new();
        let correlation = CorrelationId::generate();
        sink.append(entry(Some(correlation))).unwrap();
        sink.append(entry(None)).unwrap();
        sink.append(entry(Some(correlation))).unwrap();

        assert_eq!(sink.by_correlation(&correlation).unwrap().len(), 2);
        verify_chain(&sink.entries().unwrap()).unwrap();
    }

    #[test]
    fn unwritable_sink_refuses_appends() {
        let sink = InMemoryAuditSink::new();
        sink.set_writable(false);
        assert!(sink.probe().is_err());
        assert!(matches!(
            sink.append(entry(None)),
            Err(AuditError::Unavailable(_))
        ));
        assert!(sink.is_empty());
    }
}
