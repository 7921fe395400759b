//! In-process negotiation store

use async_trait::async_trait;
use chrono::Utc;
use futures::stream;
use std::collections::HashMap;
use tokio::sync::{broadcast, Mutex};

use crate::config::SyncConfig;
use crate::error::{Lift8Error, Result};
use crate::negotiation::machine::validate_patch;
use crate::negotiation::types::{Negotiation, NegotiationPatch, NegotiationStatus, StoredNegotiation};
use crate::types::{ConsumerID, NegotiationID, TruckID};

use super::{ChangeEvent, ChangeStream, NegotiationStore};

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Negotiation store held in memory.
///
/// Writes happen under one lock and events are published before it is
/// released, so subscribers see each record's changes in commit order.
pub struct InMemoryStore {
    records: Mutex<HashMap<NegotiationID, StoredNegotiation>>,
    events: broadcast::Sender<ChangeEvent>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_config(config: &SyncConfig) -> Self {
        Self::with_capacity(config.subscription_buffer)
    }

    fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            records: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Number of stored negotiations
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    fn publish(&self, event: ChangeEvent) {
        // No receivers is fine: nobody is watching.
        let _ = self.events.send(event);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NegotiationStore for InMemoryStore {
    async fn persist_create(&self, record: &Negotiation) -> Result<StoredNegotiation> {
        if record.status() != NegotiationStatus::Pending || record.counter_offer().is_some() {
            return Err(Lift8Error::InvalidInput(format!(
                "new negotiations must be pending without a counter-offer, got {}",
                record.status()
            )));
        }

        let mut records = self.records.lock().await;

        if let Some(existing) = records.values().find(|s| {
            s.status() == NegotiationStatus::Pending
                && s.negotiation.consumer_id() == record.consumer_id()
                && s.negotiation.truck_id() == record.truck_id()
        }) {
            return Err(Lift8Error::DuplicatePending {
                consumer_id: record.consumer_id().to_string(),
                truck_id: record.truck_id().to_string(),
                existing_id: existing.id.to_string(),
            });
        }

        let now = Utc::now();
        let stored = StoredNegotiation {
            id: NegotiationID::generate(),
            negotiation: record.clone(),
            created_at: now,
            updated_at: now,
        };
        records.insert(stored.id.clone(), stored.clone());

        tracing::debug!("Stored negotiation {}", stored.id);
        self.publish(ChangeEvent::Insert {
            record: stored.clone(),
        });

        Ok(stored)
    }

    async fn persist_transition(
        &self,
        id: &NegotiationID,
        expected: NegotiationStatus,
        patch: NegotiationPatch,
    ) -> Result<StoredNegotiation> {
        let mut records = self.records.lock().await;

        let stored = records
            .get_mut(id)
            .ok_or_else(|| Lift8Error::NotFound(id.to_string()))?;

        if stored.status() != expected {
            return Err(Lift8Error::Conflict {
                id: id.to_string(),
                expected,
                actual: stored.status(),
            });
        }

        validate_patch(&stored.negotiation, &patch)?;
        stored.negotiation.apply_patch(patch);
        stored.updated_at = Utc::now().max(stored.updated_at);
        let updated = stored.clone();

        tracing::debug!("Negotiation {}: {} -> {}", id, expected, patch.status);
        self.publish(ChangeEvent::Update {
            record: updated.clone(),
        });

        Ok(updated)
    }

    async fn get(&self, id: &NegotiationID) -> Result<StoredNegotiation> {
        self.records
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Lift8Error::NotFound(id.to_string()))
    }

    async fn find_pending(
        &self,
        consumer_id: &ConsumerID,
        truck_id: &TruckID,
    ) -> Result<Option<StoredNegotiation>> {
        Ok(self
            .records
            .lock()
            .await
            .values()
            .find(|s| {
                s.status() == NegotiationStatus::Pending
                    && s.negotiation.consumer_id() == consumer_id
                    && s.negotiation.truck_id() == truck_id
            })
            .cloned())
    }

    async fn list_for_participant(&self, participant_id: &str) -> Result<Vec<StoredNegotiation>> {
        let mut found: Vec<StoredNegotiation> = self
            .records
            .lock()
            .await
            .values()
            .filter(|s| s.negotiation.involves(participant_id))
            .cloned()
            .collect();

        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn subscribe(&self, participant_id: &str) -> Result<ChangeStream> {
        let rx = self.events.subscribe();
        let participant_id = participant_id.to_string();

        let feed = stream::unfold((rx, participant_id), |(mut rx, participant_id)| async move {
            loop {
                match rx.recv().await {
                    Ok(event) if event.record().negotiation.involves(&participant_id) => {
                        return Some((event, (rx, participant_id)));
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            "Change feed for {} lagged, skipped {} events; closing it",
                            participant_id,
                            skipped
                        );
                        return None;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Ok(Box::pin(feed))
    }
}
