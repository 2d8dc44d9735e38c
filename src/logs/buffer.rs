//! LogBuffer: a bounded per-job ring of recent log records for reconnection
//! (spec.md §2, §4.8).

use dashmap::DashMap;
use std::collections::VecDeque;

use crate::ids::JobId;
use crate::store::models::LogRecord;

const DEFAULT_CAPACITY: usize = 1_000;

pub struct LogBuffer {
    rings: DashMap<JobId, VecDeque<LogRecord>>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rings: DashMap::new(),
            capacity,
        }
    }

    pub fn push(&self, record: LogRecord) {
        let mut ring = self.rings.entry(record.job_ref).or_default();
        if ring.len() >= self.capacity {
            ring.pop_front();
        }
        ring.push_back(record);
    }

    /// Returns buffered records with `id > after_id`, oldest first, plus
    /// whether the buffer still covers `after_id` (i.e. didn't evict past
    /// it — if it did, the caller must fall back to the Store, spec.md
    /// §4.8 step 2).
    pub fn after(&self, job_ref: JobId, after_id: i64) -> (Vec<LogRecord>, bool) {
        match self.rings.get(&job_ref) {
            Some(ring) => {
                let oldest_id = ring.front().map(|r| r.id);
                let covers = match oldest_id {
                    Some(oldest) => oldest <= after_id + 1,
                    None => true,
                };
                let records = ring.iter().filter(|r| r.id > after_id).cloned().collect();
                (records, covers)
            }
            None => (Vec::new(), after_id == 0),
        }
    }

    pub fn clear(&self, job_ref: JobId) {
        self.rings.remove(&job_ref);
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::LogLevel;
    use serde_json::json;

    fn rec(job: JobId, id: i64) -> LogRecord {
        LogRecord {
            id,
            job_ref: job,
            website_ref: None,
            step_name: None,
            level: LogLevel::Info,
            message: format!("msg {id}"),
            context: json!({}),
            trace_id: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let buf = LogBuffer::with_capacity(3);
        let job = JobId::new();
        for i in 1..=5 {
            buf.push(rec(job, i));
        }
        let (records, _) = buf.after(job, 0);
        assert_eq!(records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3, 4, 5]);
    }

    #[test]
    fn reports_when_buffer_no_longer_covers_resume_point() {
        let buf = LogBuffer::with_capacity(3);
        let job = JobId::new();
        for i in 1..=5 {
            buf.push(rec(job, i));
        }
        let (_, covers) = buf.after(job, 1);
        assert!(!covers, "oldest id is 3, resume point 1 fell out of the ring");
    }
}
