//! Sweep operation types and the completion-counting state machine.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    Address, AssetId, DomainId, OperationId, Result, SweepError, Timestamp, Value, VenueId,
};

/// One opaque per-asset conversion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchInstruction {
    /// Venue that performs the conversion.
    pub venue: VenueId,
    /// Asset to convert.
    pub asset: AssetId,
    /// Amount of `asset` to convert.
    pub amount: Decimal,
    /// Venue-specific call data, passed through untouched.
    #[serde(default)]
    pub venue_calldata: Vec<u8>,
}

impl DispatchInstruction {
    pub fn new(venue: impl Into<VenueId>, asset: impl Into<AssetId>, amount: Decimal) -> Self {
        Self {
            venue: venue.into(),
            asset: asset.into(),
            amount,
            venue_calldata: Vec::new(),
        }
    }

    /// Attach venue call data.
    pub fn with_calldata(mut self, calldata: Vec<u8>) -> Self {
        self.venue_calldata = calldata;
        self
    }

    /// Reject zero or negative amounts.
    pub fn validate(&self) -> Result<()> {
        if self.amount <= Decimal::ZERO {
            return Err(SweepError::invalid_field(
                format!("amount for {} at {} must be positive", self.asset, self.venue),
                "amount",
            ));
        }
        if self.venue.as_str().is_empty() {
            return Err(SweepError::invalid_field("venue cannot be empty", "venue"));
        }
        Ok(())
    }
}

/// How the origin counts completion notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountingMode {
    /// Every accepted notice increments the counter; a redelivered notice
    /// double-counts and may trigger finalize before every domain reported.
    Legacy,
    /// Per-(operation, domain) seen set plus a single-shot finalize flag.
    #[default]
    Idempotent,
}

/// Lifecycle state of a sweep operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    /// Dispatches sent, counting completions.
    AwaitingCompletions,
    /// Every domain reported; value forwarded.
    Finalized,
    /// Operator abandoned the operation; no value moved.
    Aborted,
    /// Deadline passed; operator forwarded whatever value arrived.
    PartiallySettled,
}

impl OperationStatus {
    /// Check if this is a final state.
    pub fn is_final(&self) -> bool {
        !matches!(self, OperationStatus::AwaitingCompletions)
    }

    /// Get valid next states from current state.
    pub fn valid_transitions(&self) -> &[OperationStatus] {
        match self {
            OperationStatus::AwaitingCompletions => &[
                OperationStatus::Finalized,
                OperationStatus::Aborted,
                OperationStatus::PartiallySettled,
            ],
            OperationStatus::Finalized
            | OperationStatus::Aborted
            | OperationStatus::PartiallySettled => &[],
        }
    }

    /// Check if transition to given state is valid.
    pub fn can_transition_to(&self, next: OperationStatus) -> bool {
        self.valid_transitions().contains(&next)
    }
}

/// Result of recording one completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// The counter advanced.
    Counted {
        completed: u32,
        total: u32,
        /// `completed == total` was reached by this increment.
        ready: bool,
    },
    /// The domain had already reported; nothing changed.
    Duplicate,
}

/// A single in-flight consolidation job, owned by the origin coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepOperation {
    pub id: OperationId,
    /// Number of domains expected to report; set once at start.
    pub total_domains: u32,
    /// Running count, `0 <= completed_domains <= total_domains`.
    pub completed_domains: u32,
    pub final_receiver: Address,
    pub final_receiver_domain: DomainId,
    /// Route the final balance through the anonymization hook.
    pub privacy: bool,
    pub status: OperationStatus,
    /// Domains listed in the start request.
    pub expected: BTreeSet<DomainId>,
    /// Domains whose completion has been counted.
    pub reported: BTreeSet<DomainId>,
    /// Value accounted to this operation so far.
    pub accumulated: Value,
    /// Portion of `accumulated` produced by synchronous local conversion.
    pub local_value: Value,
    /// Transport fees paid for dispatches.
    pub fees_paid: Value,
    /// Set once finalize side effects have run.
    pub finalized: bool,
    pub created_at: Timestamp,
    pub deadline: Timestamp,
    pub closed_at: Option<Timestamp>,
}

impl SweepOperation {
    /// Create a new operation awaiting completions from `expected`.
    pub fn new(
        id: OperationId,
        expected: BTreeSet<DomainId>,
        final_receiver: Address,
        final_receiver_domain: DomainId,
        privacy: bool,
        created_at: Timestamp,
        deadline: Timestamp,
    ) -> Self {
        Self {
            id,
            total_domains: expected.len() as u32,
            completed_domains: 0,
            final_receiver,
            final_receiver_domain,
            privacy,
            status: OperationStatus::AwaitingCompletions,
            expected,
            reported: BTreeSet::new(),
            accumulated: Value::ZERO,
            local_value: Value::ZERO,
            fees_paid: Value::ZERO,
            finalized: false,
            created_at,
            deadline,
            closed_at: None,
        }
    }

    /// Whether completions are still being counted.
    pub fn is_open(&self) -> bool {
        !self.status.is_final()
    }

    /// Whether the counter has reached the total.
    pub fn is_ready(&self) -> bool {
        self.completed_domains == self.total_domains
    }

    /// Whether `now` is past the deadline.
    pub fn is_past_deadline(&self, now: Timestamp) -> bool {
        now > self.deadline
    }

    /// Listed domains that have not reported yet.
    pub fn pending_domains(&self) -> Vec<DomainId> {
        self.expected.difference(&self.reported).copied().collect()
    }

    /// Record one completion from `domain` carrying `value`.
    ///
    /// The seen check and the increment happen under the same `&mut self`
    /// borrow, so the caller's lock makes them atomic.
    pub fn record_completion(
        &mut self,
        domain: DomainId,
        value: Value,
        mode: CountingMode,
    ) -> Result<CompletionOutcome> {
        if mode == CountingMode::Idempotent {
            if self.reported.contains(&domain) {
                return Ok(CompletionOutcome::Duplicate);
            }
            if !self.expected.contains(&domain) {
                return Err(SweepError::invalid_field(
                    format!("domain {} is not part of operation {}", domain, self.id),
                    "source_domain",
                ));
            }
        }

        if !self.is_open() || self.completed_domains >= self.total_domains {
            return Err(SweepError::OperationClosed {
                operation_id: self.id,
                status: self.status,
            });
        }

        let accumulated = self.accumulated.checked_add(value).ok_or_else(|| {
            SweepError::invalid_field(
                format!("completion from domain {} overflows accumulated value", domain),
                "amount",
            )
        })?;

        self.completed_domains += 1;
        self.reported.insert(domain);
        self.accumulated = accumulated;

        Ok(CompletionOutcome::Counted {
            completed: self.completed_domains,
            total: self.total_domains,
            ready: self.is_ready(),
        })
    }

    /// Transition to a new status.
    pub fn transition_to(&mut self, next: OperationStatus, now: Timestamp) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(SweepError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.closed_at = Some(now);
        Ok(())
    }

    /// Claim the single finalize slot. Fails if finalize already ran.
    pub fn claim_finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Err(SweepError::OperationClosed {
                operation_id: self.id,
                status: self.status,
            });
        }
        self.finalized = true;
        Ok(())
    }
}
