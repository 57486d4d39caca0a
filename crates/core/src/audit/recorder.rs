use super::{AuditRef, AuditSink, EntryDraft, TimestampSource};
use crate::clock::Clock;
use crate::AuditResult;
use chrono::Utc;
use std::sync::Arc;
use vpr_uuid::TimestampIdGenerator;

/// Stamps drafts with a monotonic entry id and a timestamp, then appends them to the sink.
pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    ids: TimestampIdGenerator,
}

impl AuditRecorder {
    /// Entry ids continue after the last entry already held by `sink`.
    pub fn new(sink: Arc<dyn AuditSink>, clock: Arc<dyn Clock>) -> Self {
        let ids = match sink.last_id() {
            Some(last) => TimestampIdGenerator::resume_after(&last),
            None => TimestampIdGenerator::new(),
        };
        Self { sink, clock, ids }
    }

    pub fn sink(&self) -> &Arc<dyn AuditSink> {
        &self.sink
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Appends `draft`.
    ///
    /// When the trusted clock has no reading the host clock is used and the entry is marked
    /// [`TimestampSource::Fallback`], so the evidence is still written and its weakness visible.
    pub fn record(&self, draft: EntryDraft) -> AuditResult<AuditRef> {
        let (recorded_at, source) = match self.clock.now() {
            Some(now) => (now, TimestampSource::Trusted),
            None => (Utc::now(), TimestampSource::Fallback),
        };
        let entry_type = draft.entry_type;
        let entry = draft.stamp(self.ids.next(recorded_at), recorded_at, source);
        let id = self.sink.append(entry)?;
        tracing::debug!(entry_id = %id, ?entry_type, "audit entry appended");
        Ok(id)
    }
}

impl std::fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditRecorder").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{EntryType, InMemoryAuditSink};
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    #[test]
    fn ids_increase_within_one_millisecond() {
        let sink = Arc::new(InMemoryAuditSink::new());
        let at = Utc.with_ymd_and_hms(2026, 5, 1, 10, 0, 0).unwrap();
        let recorder = AuditRecorder::new(sink.clone(), Arc::new(ManualClock::at(at)));

        let a = recorder
            .record(EntryDraft::system(EntryType::SubsystemBlocked, "a"))
            .unwrap();
        let b = recorder
            .record(EntryDraft::system(EntryType::SubsystemBlocked, "b"))
            .unwrap();
        assert!(a < b);
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn missing_clock_marks_fallback_timestamp() {
        let sink = Arc::new(InMemoryAuditSink::new());
        let recorder = AuditRecorder::new(sink.clone(), Arc::new(ManualClock::unavailable()));
        let id = recorder
            .record(EntryDraft::system(EntryType::SubsystemBlocked, "a"))
            .unwrap();
        let stored = sink.entry(&id).unwrap().unwrap();
        assert_eq!(stored.entry.timestamp_source, TimestampSource::Fallback);
    }

    #[test]
    fn recorder_resumes_after_existing_entries() {
        let sink = Arc::new(InMemoryAuditSink::new());
        let at = Utc.with_ymd_and_hms(2026, 5, 1, 10, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::at(at));
        let first = AuditRecorder::new(sink.clone(), clock.clone())
            .record(EntryDraft::system(EntryType::SubsystemBlocked, "a"))
            .unwrap();
        let second = AuditRecorder::new(sink.clone(), clock)
            .record(EntryDraft::system(EntryType::SubsystemBlocked, "b"))
            .unwrap();
        assert!(first < second);
    }
}
