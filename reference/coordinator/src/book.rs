//! Operation book: every sweep operation the coordinator owns, by id.

use dashmap::DashMap;
use tracing::info;

use omnisweep_common::{OperationId, OperationStatus, Result, SweepError, SweepOperation, Timestamp};

/// Concurrent map of operations keyed by [`OperationId`].
///
/// Readers get clones. Writers prepare a modified clone and [`commit`] it,
/// so a call that fails half-way leaves the stored record untouched.
///
/// [`commit`]: OperationBook::commit
#[derive(Default)]
pub struct OperationBook {
    operations: DashMap<OperationId, SweepOperation>,
}

impl OperationBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new operation.
    pub fn insert(&self, operation: SweepOperation) {
        info!(
            operation_id = %operation.id,
            total = operation.total_domains,
            deadline = %operation.deadline,
            "Operation recorded"
        );
        self.operations.insert(operation.id, operation);
    }

    /// Replace the stored record with `operation`.
    pub fn commit(&self, operation: SweepOperation) {
        self.operations.insert(operation.id, operation);
    }

    /// Get a copy of an operation.
    pub fn get(&self, id: &OperationId) -> Result<SweepOperation> {
        self.operations
            .get(id)
            .map(|op| op.clone())
            .ok_or(SweepError::OperationNotFound(*id))
    }

    pub fn contains(&self, id: &OperationId) -> bool {
        self.operations.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Operations still counting completions.
    pub fn open(&self) -> Vec<SweepOperation> {
        self.operations
            .iter()
            .filter(|op| op.is_open())
            .map(|op| op.clone())
            .collect()
    }

    /// Open operations whose deadline is behind `now`, oldest first.
    pub fn expired(&self, now: Timestamp) -> Vec<SweepOperation> {
        let mut expired: Vec<SweepOperation> = self
            .operations
            .iter()
            .filter(|op| op.is_open() && op.is_past_deadline(now))
            .map(|op| op.clone())
            .collect();
        expired.sort_by_key(|op| op.deadline);
        expired
    }

    pub fn count_by_status(&self, status: OperationStatus) -> usize {
        self.operations.iter().filter(|op| op.status == status).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnisweep_common::{now, Address, DomainId};
    use std::collections::BTreeSet;

    fn operation(deadline_offset_secs: i64) -> SweepOperation {
        let t = now();
        SweepOperation::new(
            OperationId::new(),
            BTreeSet::from([DomainId::new(2)]),
            Address::from_label("receiver"),
            DomainId::LOCAL,
            false,
            t,
            t + chrono::Duration::seconds(deadline_offset_secs),
        )
    }

    #[test]
    fn test_get_returns_copy() {
        let book = OperationBook::new();
        let op = operation(60);
        let id = op.id;
        book.insert(op);

        let mut copy = book.get(&id).unwrap();
        copy.completed_domains = 1;
        assert_eq!(book.get(&id).unwrap().completed_domains, 0);

        book.commit(copy);
        assert_eq!(book.get(&id).unwrap().completed_domains, 1);
    }

    #[test]
    fn test_missing_operation() {
        let book = OperationBook::new();
        let id = OperationId::new();
        assert!(matches!(book.get(&id), Err(SweepError::OperationNotFound(x)) if x == id));
    }

    #[test]
    fn test_expired_skips_closed_operations() {
        let book = OperationBook::new();
        let stale = operation(-10);
        let fresh = operation(600);
        let mut closed = operation(-10);
        closed.transition_to(OperationStatus::Aborted, now()).unwrap();

        let stale_id = stale.id;
        book.insert(stale);
        book.insert(fresh);
        book.insert(closed);

        let expired: Vec<OperationId> = book.expired(now()).into_iter().map(|op| op.id).collect();
        assert_eq!(expired, vec![stale_id]);
        assert_eq!(book.open().len(), 2);
        assert_eq!(book.count_by_status(OperationStatus::Aborted), 1);
    }
}
