//! Negotiation engine drives negotiations through a store

use std::future::Future;
use std::sync::Arc;

use crate::config::SyncConfig;
use crate::error::{Lift8Error, Result};
use crate::fare::{NegotiationBounds, TripQuote};
use crate::sync::{ChangeStream, NegotiationStore};
use crate::types::{ConsumerID, NegotiationID, Party, Truck, TruckID, TruckOwnerID};

use super::machine::{apply, create_negotiation};
use super::types::{NegotiationAction, StoredNegotiation};

/// Runs negotiation operations on behalf of an explicitly named participant.
///
/// Every store call is bounded by `request_timeout`. Transient store failures
/// are retried with exponential backoff; a lost compare-and-swap is re-read
/// and re-applied once, unless the re-read shows the change already landed.
pub struct NegotiationEngine<S> {
    store: Arc<S>,
    config: SyncConfig,
}

impl<S: NegotiationStore> NegotiationEngine<S> {
    pub fn new(store: Arc<S>, config: SyncConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Consumer opens a negotiation with an offer inside `bounds`
    pub async fn open(
        &self,
        consumer_id: &ConsumerID,
        truck_owner_id: &TruckOwnerID,
        truck_id: &TruckID,
        offer: f64,
        bounds: &NegotiationBounds,
    ) -> Result<StoredNegotiation> {
        let record = create_negotiation(
            consumer_id.clone(),
            truck_owner_id.clone(),
            truck_id.clone(),
            offer,
            bounds,
        )?;

        let existing = self
            .call("find_pending", || self.store.find_pending(consumer_id, truck_id))
            .await?;
        if let Some(existing) = existing {
            return Err(Lift8Error::DuplicatePending {
                consumer_id: consumer_id.to_string(),
                truck_id: truck_id.to_string(),
                existing_id: existing.id.to_string(),
            });
        }

        let stored = self
            .call("persist_create", || self.store.persist_create(&record))
            .await?;

        tracing::info!(
            "Negotiation {} opened by {} for truck {} at {:.2}",
            stored.id,
            consumer_id,
            truck_id,
            offer
        );
        Ok(stored)
    }

    /// Open a negotiation on a catalog truck for a quoted trip
    pub async fn open_for_truck(
        &self,
        consumer_id: &ConsumerID,
        truck: &Truck,
        quote: &TripQuote,
        offer: f64,
    ) -> Result<StoredNegotiation> {
        let owner_id = truck.require_owner()?;
        let bounds = quote.bounds()?;
        self.open(consumer_id, owner_id, &truck.id, offer, &bounds).await
    }

    /// Truck owner answers a pending offer
    pub async fn counter(
        &self,
        truck_owner_id: &TruckOwnerID,
        id: &NegotiationID,
        price: f64,
    ) -> Result<StoredNegotiation> {
        self.transition(
            truck_owner_id.as_str(),
            id,
            |_| Ok(NegotiationAction::Counter { price }),
        )
        .await
    }

    /// Consumer accepts the owner's counter-offer
    pub async fn accept(&self, consumer_id: &ConsumerID, id: &NegotiationID) -> Result<StoredNegotiation> {
        self.transition(consumer_id.as_str(), id, |_| Ok(NegotiationAction::Accept))
            .await
    }

    /// Either participant rejects; their side is looked up from the record
    pub async fn reject(&self, participant_id: &str, id: &NegotiationID) -> Result<StoredNegotiation> {
        self.transition(participant_id, id, |record| {
            let by = record
                .negotiation
                .party_of(participant_id)
                .ok_or_else(|| not_participant(participant_id, id, "reject"))?;
            Ok(NegotiationAction::Reject { by })
        })
        .await
    }

    /// Fetch one negotiation visible to the participant
    pub async fn get(&self, participant_id: &str, id: &NegotiationID) -> Result<StoredNegotiation> {
        let record = self.call("get", || self.store.get(id)).await?;
        if !record.negotiation.involves(participant_id) {
            return Err(not_participant(participant_id, id, "view"));
        }
        Ok(record)
    }

    /// Booking requests for an owner, or a consumer's negotiation history
    pub async fn negotiations_for(&self, participant_id: &str) -> Result<Vec<StoredNegotiation>> {
        self.call("list_for_participant", || {
            self.store.list_for_participant(participant_id)
        })
        .await
    }

    /// Live changes to the participant's negotiations
    pub async fn watch(&self, participant_id: &str) -> Result<ChangeStream> {
        self.call("subscribe", || self.store.subscribe(participant_id))
            .await
    }

    async fn transition<F>(
        &self,
        actor: &str,
        id: &NegotiationID,
        choose: F,
    ) -> Result<StoredNegotiation>
    where
        F: Fn(&StoredNegotiation) -> Result<NegotiationAction>,
    {
        let current = self.call("get", || self.store.get(id)).await?;
        let action = choose(&current)?;
        authorize(actor, &current, &action)?;

        match self.commit(&current, &action).await {
            Err(Lift8Error::Conflict { expected, actual, .. }) => {
                tracing::warn!(
                    "Negotiation {} moved from {} to {} before {} could {}; re-reading",
                    id,
                    expected,
                    actual,
                    actor,
                    action.name()
                );
                let fresh = self.call("get", || self.store.get(id)).await?;

                // A retried write whose first attempt committed lands here too.
                let intended = apply(&current.negotiation, &action)?.patch();
                if fresh.negotiation.patch() == intended {
                    tracing::info!(
                        "Negotiation {} already {}; {} was committed earlier",
                        id,
                        fresh.status(),
                        action.name()
                    );
                    return Ok(fresh);
                }
                self.commit(&fresh, &action).await
            }
            other => other,
        }
    }

    async fn commit(
        &self,
        current: &StoredNegotiation,
        action: &NegotiationAction,
    ) -> Result<StoredNegotiation> {
        let next = apply(&current.negotiation, action)?;
        let expected = current.status();
        let patch = next.patch();

        let stored = self
            .call("persist_transition", || {
                self.store.persist_transition(&current.id, expected, patch)
            })
            .await?;

        tracing::info!(
            "Negotiation {}: {} -> {} ({})",
            stored.id,
            expected,
            stored.status(),
            action.name()
        );
        Ok(stored)
    }

    /// Run one store request under the timeout, retrying transient failures
    async fn call<T, F, Fut>(&self, op: &'static str, mut request: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let timeout = self.config.request_timeout();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let result = match tokio::time::timeout(timeout, request()).await {
                Ok(result) => result,
                Err(_) => Err(Lift8Error::Store(format!(
                    "{} timed out after {}ms",
                    op,
                    timeout.as_millis()
                ))),
            };

            match result {
                Err(e) if e.is_retryable() => {
                    if attempts > self.config.max_store_retries {
                        tracing::error!("{} failed after {} attempts: {}", op, attempts, e);
                        return Err(Lift8Error::RetriesExhausted {
                            attempts,
                            source: Box::new(e),
                        });
                    }

                    let delay = self.config.backoff_delay(attempts - 1);
                    tracing::warn!(
                        "{} failed (attempt {}): {}; retrying in {}ms",
                        op,
                        attempts,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

fn authorize(actor: &str, record: &StoredNegotiation, action: &NegotiationAction) -> Result<()> {
    let required = action.acting_party();
    let allowed = match required {
        Party::Consumer => record.negotiation.consumer_id().as_str() == actor,
        Party::Owner => record.negotiation.truck_owner_id().as_str() == actor,
    };

    if allowed {
        Ok(())
    } else {
        Err(not_participant(actor, &record.id, action.name()))
    }
}

fn not_participant(participant_id: &str, id: &NegotiationID, action: &'static str) -> Lift8Error {
    Lift8Error::NotParticipant {
        participant_id: participant_id.to_string(),
        negotiation_id: id.to_string(),
        action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fare::{bounds, RateCard};
    use crate::negotiation::types::{Negotiation, NegotiationPatch, NegotiationStatus};
    use crate::sync::InMemoryStore;
    use crate::types::TruckCategory;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn fast_config() -> SyncConfig {
        SyncConfig {
            request_timeout_ms: 50,
            max_store_retries: 2,
            retry_base_delay_ms: 1,
            retry_max_delay_ms: 4,
            subscription_buffer: 16,
        }
    }

    fn engine() -> NegotiationEngine<InMemoryStore> {
        NegotiationEngine::new(Arc::new(InMemoryStore::new()), fast_config())
    }

    fn ids() -> (ConsumerID, TruckOwnerID, TruckID) {
        (
            ConsumerID::new("consumer_1"),
            TruckOwnerID::new("owner_1"),
            TruckID::new("truck_7"),
        )
    }

    /// Wraps a store and fails the first `failures` calls to `get`.
    /// The first `slow_writes` transitions commit, then stall before replying.
    struct FlakyStore {
        inner: InMemoryStore,
        failures: u32,
        get_calls: AtomicU32,
        stall: Option<Duration>,
        slow_writes: u32,
        transition_calls: AtomicU32,
    }

    impl FlakyStore {
        fn new(failures: u32) -> Self {
            Self {
                inner: InMemoryStore::new(),
                failures,
                get_calls: AtomicU32::new(0),
                stall: None,
                slow_writes: 0,
                transition_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl NegotiationStore for FlakyStore {
        async fn persist_create(&self, record: &Negotiation) -> Result<StoredNegotiation> {
            self.inner.persist_create(record).await
        }

        async fn persist_transition(
            &self,
            id: &NegotiationID,
            expected: NegotiationStatus,
            patch: NegotiationPatch,
        ) -> Result<StoredNegotiation> {
            let call = self.transition_calls.fetch_add(1, Ordering::SeqCst);
            let result = self.inner.persist_transition(id, expected, patch).await;
            if call < self.slow_writes {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            result
        }

        async fn get(&self, id: &NegotiationID) -> Result<StoredNegotiation> {
            let call = self.get_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(stall) = self.stall {
                tokio::time::sleep(stall).await;
            }
            if call < self.failures {
                return Err(Lift8Error::Store("connection reset".to_string()));
            }
            self.inner.get(id).await
        }

        async fn find_pending(
            &self,
            consumer_id: &ConsumerID,
            truck_id: &TruckID,
        ) -> Result<Option<StoredNegotiation>> {
            self.inner.find_pending(consumer_id, truck_id).await
        }

        async fn list_for_participant(&self, participant_id: &str) -> Result<Vec<StoredNegotiation>> {
            self.inner.list_for_participant(participant_id).await
        }

        async fn subscribe(&self, participant_id: &str) -> Result<ChangeStream> {
            self.inner.subscribe(participant_id).await
        }
    }

    #[tokio::test]
    async fn test_full_negotiation_flow() {
        let engine = engine();
        let (consumer, owner, truck) = ids();
        let range = bounds(1000.0).unwrap();

        let opened = engine.open(&consumer, &owner, &truck, 800.0, &range).await.unwrap();
        assert_eq!(opened.status(), NegotiationStatus::Pending);

        let countered = engine.counter(&owner, &opened.id, 900.0).await.unwrap();
        assert_eq!(countered.status(), NegotiationStatus::Countered);
        assert_eq!(countered.negotiation.counter_offer(), Some(900.0));

        let confirmed = engine.accept(&consumer, &opened.id).await.unwrap();
        assert_eq!(confirmed.status(), NegotiationStatus::Confirmed);
        assert_eq!(confirmed.negotiation.agreed_price(), Some(900.0));

        let err = engine.reject(consumer.as_str(), &opened.id).await.unwrap_err();
        assert!(matches!(err, Lift8Error::InvalidTransition { .. }));
        assert_eq!(
            engine.store().get(&opened.id).await.unwrap().status(),
            NegotiationStatus::Confirmed
        );
    }

    #[tokio::test]
    async fn test_out_of_range_offer_never_stored() {
        let engine = engine();
        let (consumer, owner, truck) = ids();

        let err = engine
            .open(&consumer, &owner, &truck, 350.0, &bounds(500.0).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Lift8Error::OutOfRange { .. }));
        assert!(engine.store().is_empty().await);
    }

    #[tokio::test]
    async fn test_second_pending_rejected() {
        let engine = engine();
        let (consumer, owner, truck) = ids();
        let range = bounds(1000.0).unwrap();

        assert_ok!(engine.open(&consumer, &owner, &truck, 900.0, &range).await);
        let err = assert_err!(engine.open(&consumer, &owner, &truck, 950.0, &range).await);
        assert!(matches!(err, Lift8Error::DuplicatePending { .. }));
        assert_eq!(engine.store().len().await, 1);
    }

    #[tokio::test]
    async fn test_only_owner_may_counter() {
        let engine = engine();
        let (consumer, owner, truck) = ids();
        let opened = engine
            .open(&consumer, &owner, &truck, 900.0, &bounds(1000.0).unwrap())
            .await
            .unwrap();

        let err = engine
            .counter(&TruckOwnerID::new("owner_2"), &opened.id, 950.0)
            .await
            .unwrap_err();
        assert!(matches!(err, Lift8Error::NotParticipant { action: "counter", .. }));

        let err = engine
            .counter(&TruckOwnerID::new(consumer.as_str()), &opened.id, 950.0)
            .await
            .unwrap_err();
        assert!(matches!(err, Lift8Error::NotParticipant { .. }));
    }

    #[tokio::test]
    async fn test_only_consumer_may_accept() {
        let engine = engine();
        let (consumer, owner, truck) = ids();
        let opened = engine
            .open(&consumer, &owner, &truck, 900.0, &bounds(1000.0).unwrap())
            .await
            .unwrap();
        engine.counter(&owner, &opened.id, 950.0).await.unwrap();

        let err = engine
            .accept(&ConsumerID::new(owner.as_str()), &opened.id)
            .await
            .unwrap_err();
        assert!(matches!(err, Lift8Error::NotParticipant { .. }));
    }

    #[tokio::test]
    async fn test_either_side_may_reject() {
        let engine = engine();
        let (consumer, owner, truck) = ids();
        let range = bounds(1000.0).unwrap();

        let first = engine.open(&consumer, &owner, &truck, 900.0, &range).await.unwrap();
        let rejected = engine.reject(owner.as_str(), &first.id).await.unwrap();
        assert_eq!(rejected.status(), NegotiationStatus::Rejected);

        let second = engine.open(&consumer, &owner, &truck, 900.0, &range).await.unwrap();
        let rejected = engine.reject(consumer.as_str(), &second.id).await.unwrap();
        assert_eq!(rejected.status(), NegotiationStatus::Rejected);

        let third = engine.open(&consumer, &owner, &truck, 900.0, &range).await.unwrap();
        let err = engine.reject("stranger", &third.id).await.unwrap_err();
        assert!(matches!(err, Lift8Error::NotParticipant { .. }));
    }

    #[tokio::test]
    async fn test_get_hides_other_participants_records() {
        let engine = engine();
        let (consumer, owner, truck) = ids();
        let opened = engine
            .open(&consumer, &owner, &truck, 900.0, &bounds(1000.0).unwrap())
            .await
            .unwrap();

        assert!(engine.get(owner.as_str(), &opened.id).await.is_ok());
        assert!(engine.get("stranger", &opened.id).await.is_err());
    }

    #[tokio::test]
    async fn test_open_for_truck() {
        let engine = engine();
        let truck = Truck {
            id: TruckID::new("6"),
            name: "Tata 407".to_string(),
            category: TruckCategory::Closed,
            capacity_kg: 2500.0,
            rate_card: RateCard::new(500.0, 20.0, 0.2).unwrap(),
            owner_id: Some(TruckOwnerID::new("owner_9")),
        };
        let quote = truck.quote(25.0, 1000.0).unwrap();
        assert_eq!(quote.estimated_cost(), 1200.0);

        let opened = engine
            .open_for_truck(&ConsumerID::new("consumer_1"), &truck, &quote, 1000.0)
            .await
            .unwrap();
        assert_eq!(opened.negotiation.truck_owner_id().as_str(), "owner_9");

        let unowned = Truck {
            owner_id: None,
            ..truck
        };
        let err = engine
            .open_for_truck(&ConsumerID::new("consumer_2"), &unowned, &quote, 1000.0)
            .await
            .unwrap_err();
        assert!(matches!(err, Lift8Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_transient_store_errors_are_retried() {
        let store = Arc::new(FlakyStore::new(2));
        let engine = NegotiationEngine::new(store.clone(), fast_config());
        let (consumer, owner, truck) = ids();

        let opened = engine
            .open(&consumer, &owner, &truck, 900.0, &bounds(1000.0).unwrap())
            .await
            .unwrap();
        let countered = engine.counter(&owner, &opened.id, 950.0).await.unwrap();

        assert_eq!(countered.status(), NegotiationStatus::Countered);
        assert_eq!(store.get_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let store = Arc::new(FlakyStore::new(u32::MAX));
        let engine = NegotiationEngine::new(store.clone(), fast_config());

        let err = engine
            .counter(&TruckOwnerID::new("owner_1"), &NegotiationID::new("neg_x"), 950.0)
            .await
            .unwrap_err();

        match err {
            Lift8Error::RetriesExhausted { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*source, Lift8Error::Store(_)));
            }
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
        assert_eq!(store.get_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_slow_store_times_out() {
        let mut flaky = FlakyStore::new(0);
        flaky.stall = Some(Duration::from_secs(5));
        let store = Arc::new(flaky);
        let engine = NegotiationEngine::new(
            store.clone(),
            SyncConfig {
                max_store_retries: 0,
                ..fast_config()
            },
        );

        let err = engine
            .accept(&ConsumerID::new("consumer_1"), &NegotiationID::new("neg_x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Lift8Error::RetriesExhausted { attempts: 1, .. }));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let store = Arc::new(FlakyStore::new(0));
        let engine = NegotiationEngine::new(store.clone(), fast_config());

        let err = engine
            .accept(&ConsumerID::new("consumer_1"), &NegotiationID::new("neg_x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Lift8Error::NotFound(_)));
        assert_eq!(store.get_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lost_race_rereads_and_reports_new_state() {
        let engine = engine();
        let (consumer, owner, truck) = ids();
        let opened = engine
            .open(&consumer, &owner, &truck, 900.0, &bounds(1000.0).unwrap())
            .await
            .unwrap();

        // The consumer withdraws between the owner's read and write.
        let stale = engine.store().get(&opened.id).await.unwrap();
        engine.reject(consumer.as_str(), &opened.id).await.unwrap();

        let err = engine
            .commit(&stale, &NegotiationAction::Counter { price: 950.0 })
            .await
            .unwrap_err();
        assert!(matches!(err, Lift8Error::Conflict { .. }));

        // Through the public path the re-read sees the rejection.
        let err = engine.counter(&owner, &opened.id, 950.0).await.unwrap_err();
        assert!(matches!(
            err,
            Lift8Error::InvalidTransition {
                status: NegotiationStatus::Rejected,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_committed_write_with_lost_reply_succeeds() {
        let mut flaky = FlakyStore::new(0);
        flaky.slow_writes = 1;
        let store = Arc::new(flaky);
        let engine = NegotiationEngine::new(store.clone(), fast_config());
        let (consumer, owner, truck) = ids();
        let opened = engine
            .open(&consumer, &owner, &truck, 900.0, &bounds(1000.0).unwrap())
            .await
            .unwrap();

        let countered = assert_ok!(engine.counter(&owner, &opened.id, 950.0).await);
        assert_eq!(countered.status(), NegotiationStatus::Countered);
        assert_eq!(countered.negotiation.counter_offer(), Some(950.0));
        assert_eq!(store.transition_calls.load(Ordering::SeqCst), 2);

        let stored = store.inner.get(&opened.id).await.unwrap();
        assert_eq!(stored, countered);
    }

    #[tokio::test]
    async fn test_negotiations_for_owner_inbox() {
        let engine = engine();
        let owner = TruckOwnerID::new("owner_1");
        let range = bounds(1000.0).unwrap();

        for consumer in ["c1", "c2", "c3"] {
            engine
                .open(&ConsumerID::new(consumer), &owner, &TruckID::new("t1"), 900.0, &range)
                .await
                .unwrap();
        }

        assert_eq!(engine.negotiations_for("owner_1").await.unwrap().len(), 3);
        assert_eq!(engine.negotiations_for("c2").await.unwrap().len(), 1);
    }
}
