//! Negotiation persistence and change feed
//!
//! [`NegotiationStore`] is the contract a durable backend has to honour:
//! creation refuses a second pending negotiation for the same consumer and
//! truck, every transition is one compare-and-swap on `status`, and the change
//! feed delivers each participant's records in commit order.

pub mod memory;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::negotiation::types::{Negotiation, NegotiationPatch, NegotiationStatus, StoredNegotiation};
use crate::types::{ConsumerID, NegotiationID, TruckID};

pub use memory::InMemoryStore;

/// A record change delivered to subscribers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChangeEvent {
    /// A consumer opened a negotiation
    Insert { record: StoredNegotiation },
    /// A transition was committed
    Update { record: StoredNegotiation },
}

impl ChangeEvent {
    pub fn record(&self) -> &StoredNegotiation {
        match self {
            ChangeEvent::Insert { record } | ChangeEvent::Update { record } => record,
        }
    }

    pub fn into_record(self) -> StoredNegotiation {
        match self {
            ChangeEvent::Insert { record } | ChangeEvent::Update { record } => record,
        }
    }
}

/// Cancellable change feed; dropping it ends the subscription
pub type ChangeStream = BoxStream<'static, ChangeEvent>;

#[async_trait]
pub trait NegotiationStore: Send + Sync {
    /// Store a new pending negotiation, assigning its id and timestamps.
    ///
    /// Fails with `DuplicatePending` if the consumer already has a pending
    /// negotiation for the same truck.
    async fn persist_create(&self, record: &Negotiation) -> Result<StoredNegotiation>;

    /// Apply `patch` only if the stored status still equals `expected`.
    ///
    /// Fails with `Conflict` when another writer got there first, and with
    /// `InvalidTransition` when the patch is not a legal move from `expected`.
    async fn persist_transition(
        &self,
        id: &NegotiationID,
        expected: NegotiationStatus,
        patch: NegotiationPatch,
    ) -> Result<StoredNegotiation>;

    async fn get(&self, id: &NegotiationID) -> Result<StoredNegotiation>;

    /// The consumer's `pending` request for this truck, if any.
    ///
    /// Only `pending` counts: once the owner has countered, the consumer may
    /// send a fresh request for the same truck. `persist_create` applies the
    /// same rule atomically.
    async fn find_pending(
        &self,
        consumer_id: &ConsumerID,
        truck_id: &TruckID,
    ) -> Result<Option<StoredNegotiation>>;

    /// Negotiations where the participant is consumer or truck owner, newest first
    async fn list_for_participant(&self, participant_id: &str) -> Result<Vec<StoredNegotiation>>;

    /// Changes to negotiations where the participant is consumer or truck owner.
    ///
    /// The stream ends if the subscriber falls too far behind to receive every
    /// change; callers then subscribe again and re-list to catch up.
    async fn subscribe(&self, participant_id: &str) -> Result<ChangeStream>;
}
