//! Walkthrough: quote a trip, open a negotiation, counter, confirm
//!
//! 0. Truck owner claims a Tata 407 from the catalog
//! 1. Consumer quotes a trip on it
//! 2. Consumer offers the lowest admissible price
//! 3. Truck owner counters
//! 4. Consumer accepts; both sides see every change on their feeds
//!
//! Run with: cargo run --example negotiation_walkthrough

use futures::StreamExt;
use lift8::fare::format_rupees;
use lift8::logging::init_logging;
use lift8::{
    ConsumerID, InMemoryStore, NegotiationEngine, RateCard, SyncConfig, Truck, TruckCategory,
    TruckID, TruckOwnerID,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging("info,lift8=debug");

    let config = SyncConfig::from_env()?;
    let engine = NegotiationEngine::new(Arc::new(InMemoryStore::with_config(&config)), config);

    let consumer = ConsumerID::new("consumer_asha");
    let owner = TruckOwnerID::new("owner_ravi");

    let truck = Truck {
        id: TruckID::new("6"),
        name: "Tata 407".to_string(),
        category: TruckCategory::Closed,
        capacity_kg: 2500.0,
        rate_card: RateCard::new(500.0, 22.0, 0.3)?,
        owner_id: None,
    };

    // Scenario 0: the owner claims the catalog truck
    let truck = truck.claim(owner.clone())?;
    println!("🚚 {} claimed by {}", truck.name, owner);

    let mut owner_feed = engine.watch(owner.as_str()).await?;

    // Scenario 1: quote
    let quote = truck.quote(18.5, 1800.0)?;
    let range = quote.bounds()?;
    println!("\n📦 {} for {} kg over {} km", truck.name, quote.weight_kg(), quote.distance_km());
    println!("   Estimate: {}", format_rupees(quote.estimated_cost()));
    println!(
        "   Offer range: {} - {}\n",
        format_rupees(range.min()),
        format_rupees(range.max())
    );

    // Scenario 2: an offer below the range is refused with the range in the message
    if let Err(e) = engine.open_for_truck(&consumer, &truck, &quote, range.min() - 50.0).await {
        println!("❌ {}\n", e);
    }

    // Scenario 3: lowest admissible offer, countered, accepted
    let opened = engine.open_for_truck(&consumer, &truck, &quote, range.min()).await?;
    println!("📝 Offer sent: {} ({})", format_rupees(opened.negotiation.requested_price()), opened.id);

    if let Some(event) = owner_feed.next().await {
        println!("🔔 Owner sees new request at {}", event.record().status());
    }

    let counter_price = (range.min() + range.max()) / 2.0;
    engine.counter(&owner, &opened.id, counter_price).await?;
    println!("💬 Owner counters with {}", format_rupees(counter_price));

    let confirmed = engine.accept(&consumer, &opened.id).await?;
    if let Some(price) = confirmed.negotiation.agreed_price() {
        println!("✅ Booking confirmed at {}", format_rupees(price));
    }

    // Scenario 4: the confirmed booking cannot be rejected afterwards
    if let Err(e) = engine.reject(consumer.as_str(), &opened.id).await {
        println!("❌ {}\n", e);
    }

    Ok(())
}
