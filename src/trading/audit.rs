//! Capped, append-only log of decision records.

use std::collections::VecDeque;

use crate::models::DecisionRecord;

#[derive(Debug, Clone)]
pub struct AuditLog {
    records: VecDeque<DecisionRecord>,
    capacity: usize,
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a record, evicting the oldest once full.
    pub fn append(&mut self, record: DecisionRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Up to `limit` records, most recent first.
    pub fn recent(&self, limit: usize) -> Vec<DecisionRecord> {
        self.records.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DecisionAction;

    fn record(reason: &str) -> DecisionRecord {
        DecisionRecord::engine_wide("mirror", DecisionAction::Skipped, reason)
    }

    #[test]
    fn test_capped_and_reversed() {
        let mut log = AuditLog::new(3);
        for i in 0..5 {
            log.append(record(&i.to_string()));
        }

        assert_eq!(log.len(), 3);
        let recent = log.recent(10);
        let reasons: Vec<&str> = recent.iter().map(|r| r.reason.as_str()).collect();
        assert_eq!(reasons, vec!["4", "3", "2"]);
        assert_eq!(log.recent(1)[0].reason, "4");
    }
}
