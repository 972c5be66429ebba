//! In-memory record store that evaluates filter groups the way the remote API does.
//!
//! Used by tests and for dry runs. Failures and latency can be injected per call
//! site so retry, timeout and partial-failure behaviour is testable without a network.

use super::RecordStore;
use crate::error::RemoteError;
use crate::search::{FilterGroup, Operator, Predicate, QueryPlan};
use crate::types::{EntityKind, RawRecord};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

type AffiliationKey = (EntityKind, String, EntityKind);

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: HashMap<EntityKind, Vec<RawRecord>>,
    affiliations: HashMap<AffiliationKey, Vec<String>>,
    /// Errors returned by successive search calls before searches succeed again.
    search_failures: Mutex<VecDeque<RemoteError>>,
    /// Errors returned by successive affiliation lookups for one id.
    affiliation_failures: Mutex<HashMap<String, VecDeque<RemoteError>>>,
    /// Ids whose affiliation lookup always fails.
    broken_affiliations: HashMap<String, RemoteError>,
    /// Ids that fail any fetch batch containing them.
    broken_fetches: HashMap<String, RemoteError>,
    latency: Duration,
    affiliation_latency: HashMap<String, Duration>,
    search_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    affiliation_calls: AtomicUsize,
    last_plan: Mutex<Option<QueryPlan>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_record(mut self, kind: EntityKind, record: RawRecord) -> Self {
        self.records.entry(kind).or_default().push(record);
        self
    }

    /// Affiliate entity `from_id` (of kind `from`) with `to_id` (of kind `to`).
    #[must_use]
    pub fn with_affiliation(
        mut self,
        from: EntityKind,
        from_id: &str,
        to: EntityKind,
        to_id: &str,
    ) -> Self {
        self.affiliations
            .entry((from, from_id.to_string(), to))
            .or_default()
            .push(to_id.to_string());
        self
    }

    /// Fail the next `errors.len()` searches with these errors, in order.
    #[must_use]
    pub fn with_search_failures(self, errors: impl IntoIterator<Item = RemoteError>) -> Self {
        lock(&self.search_failures).extend(errors);
        self
    }

    /// Fail the next affiliation lookups for `id` with these errors, in order.
    #[must_use]
    pub fn with_affiliation_failures(
        self,
        id: &str,
        errors: impl IntoIterator<Item = RemoteError>,
    ) -> Self {
        lock(&self.affiliation_failures)
            .entry(id.to_string())
            .or_default()
            .extend(errors);
        self
    }

    /// Make every affiliation lookup for `id` fail.
    #[must_use]
    pub fn with_broken_affiliation(mut self, id: &str, error: RemoteError) -> Self {
        self.broken_affiliations.insert(id.to_string(), error);
        self
    }

    /// Make every fetch batch containing `id` fail.
    #[must_use]
    pub fn with_broken_fetch(mut self, id: &str, error: RemoteError) -> Self {
        self.broken_fetches.insert(id.to_string(), error);
        self
    }

    /// Delay every call by `latency`.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Delay affiliation lookups for `id` by `latency` (on top of the global latency).
    #[must_use]
    pub fn with_affiliation_latency(mut self, id: &str, latency: Duration) -> Self {
        self.affiliation_latency.insert(id.to_string(), latency);
        self
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::Relaxed)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::Relaxed)
    }

    pub fn affiliation_calls(&self) -> usize {
        self.affiliation_calls.load(Ordering::Relaxed)
    }

    /// The plan received by the most recent search.
    pub fn last_plan(&self) -> Option<QueryPlan> {
        lock(&self.last_plan).clone()
    }

    fn run_search(&self, plan: &QueryPlan) -> Result<Vec<RawRecord>, RemoteError> {
        *lock(&self.last_plan) = Some(plan.clone());
        if let Some(error) = lock(&self.search_failures).pop_front() {
            return Err(error);
        }

        let properties: Vec<&str> = plan.properties.iter().map(String::as_str).collect();
        let records = self.records.get(&plan.kind).map_or(&[][..], Vec::as_slice);
        Ok(records
            .iter()
            .filter(|record| plan.filter_groups.iter().any(|group| group_matches(group, record)))
            .take(plan.limit)
            .map(|record| select(record, &properties))
            .collect())
    }

    fn run_fetch(
        &self,
        kind: EntityKind,
        ids: &[String],
        properties: &[&str],
    ) -> Result<Vec<RawRecord>, RemoteError> {
        if let Some(error) = ids.iter().find_map(|id| self.broken_fetches.get(id)) {
            return Err(error.clone());
        }
        let records = self.records.get(&kind).map_or(&[][..], Vec::as_slice);
        Ok(ids
            .iter()
            .filter_map(|id| records.iter().find(|record| &record.id == id))
            .map(|record| select(record, properties))
            .collect())
    }

    fn run_affiliations(
        &self,
        from: EntityKind,
        id: &str,
        to: EntityKind,
    ) -> Result<Vec<String>, RemoteError> {
        if let Some(error) = self.broken_affiliations.get(id) {
            return Err(error.clone());
        }
        if let Some(error) = lock(&self.affiliation_failures)
            .get_mut(id)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }
        Ok(self
            .affiliations
            .get(&(from, id.to_string(), to))
            .cloned()
            .unwrap_or_default())
    }

    async fn delay(&self, extra: Duration) {
        let total = self.latency + extra;
        if !total.is_zero() {
            tokio::time::sleep(total).await;
        }
    }
}

impl RecordStore for MemoryStore {
    async fn search(&self, plan: &QueryPlan) -> Result<Vec<RawRecord>, RemoteError> {
        self.search_calls.fetch_add(1, Ordering::Relaxed);
        self.delay(Duration::ZERO).await;
        self.run_search(plan)
    }

    async fn fetch_by_ids(
        &self,
        kind: EntityKind,
        ids: &[String],
        properties: &[&str],
    ) -> Result<Vec<RawRecord>, RemoteError> {
        self.fetch_calls.fetch_add(1, Ordering::Relaxed);
        self.delay(Duration::ZERO).await;
        self.run_fetch(kind, ids, properties)
    }

    async fn fetch_affiliations(
        &self,
        from: EntityKind,
        id: &str,
        to: EntityKind,
    ) -> Result<Vec<String>, RemoteError> {
        self.affiliation_calls.fetch_add(1, Ordering::Relaxed);
        let extra = self
            .affiliation_latency
            .get(id)
            .copied()
            .unwrap_or_default();
        self.delay(extra).await;
        self.run_affiliations(from, id, to)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn group_matches(group: &FilterGroup, record: &RawRecord) -> bool {
    !group.filters.is_empty()
        && group
            .filters
            .iter()
            .all(|predicate| predicate_matches(predicate, record))
}

fn predicate_matches(predicate: &Predicate, record: &RawRecord) -> bool {
    let Some(value) = record.property(&predicate.field) else {
        return false;
    };
    let wanted = predicate.value.trim().to_lowercase();
    match predicate.operator {
        Operator::Equals => value.trim().to_lowercase() == wanted,
        Operator::ContainsToken => value
            .to_lowercase()
            .split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
            .any(|token| token == wanted),
    }
}

fn select(record: &RawRecord, properties: &[&str]) -> RawRecord {
    RawRecord {
        id: record.id.clone(),
        properties: record
            .properties
            .iter()
            .filter(|(key, _)| properties.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    }
}
