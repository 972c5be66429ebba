//! Shared test fixtures and utilities for integration tests.
//!
//! # Test Isolation Strategy
//!
//! Every test builds its own [`MemoryStore`], so injected failures, latency and
//! call counters never leak between tests. Resolutions carry no state of their
//! own, which lets tests run in parallel.
//!
//! # Available Fixtures
//!
//! - `config`: defaults with millisecond backoff and no request pacing
//! - `agency_store`: organizations from the end-to-end scenario
//! - `contact_store`: five contacts, each affiliated with one organization

use entity_resolve::config::RetryConfig;
use entity_resolve::types::Candidate;
use entity_resolve::{Contact, EntityKind, MemoryStore, RawRecord, ResolverConfig};
use rstest::fixture;

/// Resolver defaults tuned for tests: retries stay, waiting goes.
pub fn fast_config() -> ResolverConfig {
    entity_resolve::tracing::init();
    ResolverConfig {
        request_timeout_ms: 100,
        retry: RetryConfig {
            max_attempts: 3,
            base_backoff_ms: 1,
            max_backoff_ms: 2,
        },
        rate_limit: None,
        ..ResolverConfig::default()
    }
}

#[fixture]
pub fn config() -> ResolverConfig {
    fast_config()
}

#[allow(dead_code)] // Used across different integration test crates
pub fn organization(id: &str, name: &str, address: &str) -> RawRecord {
    RawRecord::new(id)
        .with("name", name)
        .with("address", address)
        .with("category", "agency")
}

#[allow(dead_code)]
pub fn contact(id: &str, first: &str, last: &str) -> RawRecord {
    RawRecord::new(id)
        .with("firstname", first)
        .with("lastname", last)
}

/// Typed contact candidates, for driving the composite resolver directly.
#[allow(dead_code)]
pub fn contact_candidates(records: &[RawRecord]) -> Vec<Candidate<Contact>> {
    records
        .iter()
        .cloned()
        .map(|raw| Candidate::from_raw(raw).expect("contact record should deserialize"))
        .collect()
}

/// The "Stanford Legal, Hamilton" scenario plus a distractor in another suburb.
#[fixture]
pub fn agency_store() -> MemoryStore {
    MemoryStore::new()
        .with_record(
            EntityKind::Organization,
            organization("o1", "Stanford Legal Pty Ltd", "12 Smith St, Hamilton QLD"),
        )
        .with_record(
            EntityKind::Organization,
            organization("o2", "ACME Realty", "1 Other St, Brisbane"),
        )
        .with_record(
            EntityKind::Organization,
            organization("o3", "Legal Eagles", "9 River Rd, Ascot QLD"),
        )
}

/// Contacts c1..c5, each a Smith affiliated with organization o1..o5.
#[fixture]
pub fn contact_store() -> MemoryStore {
    let names = ["Jane", "John", "Mary", "Peter", "Ruth"];
    let mut store = MemoryStore::new();
    for (i, first) in names.iter().enumerate() {
        let contact_id = format!("c{}", i + 1);
        let org_id = format!("o{}", i + 1);
        store = store
            .with_record(EntityKind::Contact, contact(&contact_id, first, "Smith"))
            .with_record(
                EntityKind::Organization,
                organization(&org_id, &format!("Agency {}", i + 1), "1 Main St, Hamilton"),
            )
            .with_affiliation(EntityKind::Contact, &contact_id, EntityKind::Organization, &org_id);
    }
    store
}
