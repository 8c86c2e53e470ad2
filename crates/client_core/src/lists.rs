//! Connection-list reconciliation.
//!
//! Tracks which bucket every rendered connection currently lives in and
//! computes the minimal set of view patches for each lifecycle step, keeping
//! the transition rules free of any rendering concerns. The reducer only runs
//! after the server confirmed an action; it never guesses record contents.

use std::collections::HashMap;

use shared::{
    domain::{Bucket, ConnectionId},
    protocol::{ConnectionBuckets, ConnectionRecord},
};
use thiserror::Error;

/// Lifecycle slot of a tracked connection, one per bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    IncomingPending,
    OutgoingPending,
    Current,
}

impl Slot {
    pub fn bucket(self) -> Bucket {
        match self {
            Slot::IncomingPending => Bucket::Incoming,
            Slot::OutgoingPending => Bucket::Outgoing,
            Slot::Current => Bucket::Current,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionAction {
    Accept,
    Decline,
    Cancel,
    Remove,
}

impl ConnectionAction {
    /// The slot an item must occupy for the action to be legal.
    pub fn source_slot(self) -> Slot {
        match self {
            ConnectionAction::Accept | ConnectionAction::Decline => Slot::IncomingPending,
            ConnectionAction::Cancel => Slot::OutgoingPending,
            ConnectionAction::Remove => Slot::Current,
        }
    }
}

/// Server-confirmed result of a state-changing call, discriminated so the
/// removal-only path can never read fields from an absent payload.
#[derive(Debug, Clone)]
pub enum ActionOutcome {
    Updated(ConnectionRecord),
    NoContent,
}

/// One minimal view mutation. Placeholder patches are only emitted on
/// empty/non-empty transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum ListPatch {
    Remove { bucket: Bucket, id: ConnectionId },
    Insert { bucket: Bucket, record: ConnectionRecord },
    SetPlaceholder { bucket: Bucket, visible: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("connection {0} is not tracked in any list")]
    Unknown(i64),
    #[error("{action:?} needs connection {id} in the {expected:?} list, found it in {found:?}")]
    WrongList {
        id: i64,
        action: ConnectionAction,
        expected: Bucket,
        found: Bucket,
    },
    #[error("connection {0} is already tracked")]
    Duplicate(i64),
}

/// The typed list-state map keyed by connection id.
#[derive(Debug, Clone, Default)]
pub struct ListsState {
    slots: HashMap<ConnectionId, Slot>,
}

impl ListsState {
    /// Builds the state from a server load. The server keeps each id in
    /// exactly one bucket; if that invariant is violated the first occurrence
    /// wins and the repeats are reported for logging.
    pub fn from_buckets(buckets: &ConnectionBuckets) -> (Self, Vec<ConnectionId>) {
        let mut state = Self::default();
        let mut duplicates = Vec::new();
        for (slot, records) in [
            (Slot::IncomingPending, &buckets.incoming),
            (Slot::OutgoingPending, &buckets.outgoing),
            (Slot::Current, &buckets.current),
        ] {
            for record in records {
                if state.slots.contains_key(&record.id) {
                    duplicates.push(record.id);
                } else {
                    state.slots.insert(record.id, slot);
                }
            }
        }
        (state, duplicates)
    }

    pub fn slot_of(&self, id: ConnectionId) -> Option<Slot> {
        self.slots.get(&id).copied()
    }

    pub fn len(&self, bucket: Bucket) -> usize {
        self.slots
            .values()
            .filter(|slot| slot.bucket() == bucket)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Applies a server-confirmed action. Every action removes the item from
    /// its source list; only an accept that returned the updated record also
    /// re-inserts it into the current list, built from that server record.
    /// A bodyless success performs the removal half alone.
    pub fn apply_action(
        &mut self,
        id: ConnectionId,
        action: ConnectionAction,
        outcome: &ActionOutcome,
    ) -> Result<Vec<ListPatch>, TransitionError> {
        let found = self
            .slots
            .get(&id)
            .copied()
            .ok_or(TransitionError::Unknown(id.0))?;
        let expected = action.source_slot();
        if found != expected {
            return Err(TransitionError::WrongList {
                id: id.0,
                action,
                expected: expected.bucket(),
                found: found.bucket(),
            });
        }

        let source = expected.bucket();
        self.slots.remove(&id);
        let mut patches = vec![ListPatch::Remove { bucket: source, id }];
        if self.len(source) == 0 {
            patches.push(ListPatch::SetPlaceholder {
                bucket: source,
                visible: true,
            });
        }

        if let (ConnectionAction::Accept, ActionOutcome::Updated(record)) = (action, outcome) {
            patches.extend(self.insert(Slot::Current, record)?);
        }

        Ok(patches)
    }

    /// Tracks a freshly created outgoing request from the server's returned
    /// record.
    pub fn apply_send(
        &mut self,
        record: &ConnectionRecord,
    ) -> Result<Vec<ListPatch>, TransitionError> {
        self.insert(Slot::OutgoingPending, record)
    }

    fn insert(
        &mut self,
        slot: Slot,
        record: &ConnectionRecord,
    ) -> Result<Vec<ListPatch>, TransitionError> {
        if self.slots.contains_key(&record.id) {
            return Err(TransitionError::Duplicate(record.id.0));
        }
        let bucket = slot.bucket();
        let was_empty = self.len(bucket) == 0;
        self.slots.insert(record.id, slot);
        let mut patches = vec![ListPatch::Insert {
            bucket,
            record: record.clone(),
        }];
        if was_empty {
            patches.push(ListPatch::SetPlaceholder {
                bucket,
                visible: false,
            });
        }
        Ok(patches)
    }
}
