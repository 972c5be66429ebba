//! Composite candidates: a contact plus its affiliated organization.
//!
//! The primary search cannot return or filter on affiliate fields, so each contact
//! is fanned out to the store: one call for its affiliation ids, one batched fetch
//! for those organizations. Lookups run concurrently under a fixed in-flight bound
//! and every one of them produces its own result; a failed lookup leaves that
//! contact unaffiliated and never cancels its siblings.

use crate::config::ResolverConfig;
use crate::error::RemoteError;
use crate::remote::{CallFailure, RemoteCaller};
use crate::store::RecordStore;
use crate::types::{Candidate, CompositeCandidate, Contact, EntityKind, EntityRecord, Organization};
use futures::{StreamExt, stream};
use std::future::Future;

/// Run `task` over every item with at most `concurrency` in flight.
///
/// Results come back in input order, one per item, whether it succeeded or not.
pub async fn gather<I, T, E, F, Fut>(items: I, concurrency: usize, task: F) -> Vec<Result<T, E>>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    stream::iter(items)
        .map(task)
        .buffered(concurrency.max(1))
        .collect()
        .await
}

/// Resolves affiliated organizations for contact candidates.
#[derive(Debug)]
pub struct CompositeResolver<'a, S> {
    store: &'a S,
    caller: &'a RemoteCaller,
    max_affiliations: usize,
    concurrency: usize,
}

impl<'a, S: RecordStore> CompositeResolver<'a, S> {
    pub fn new(store: &'a S, caller: &'a RemoteCaller, config: &ResolverConfig) -> Self {
        Self {
            store,
            caller,
            max_affiliations: config.max_affiliations.max(1),
            concurrency: config.fanout_concurrency.max(1),
        }
    }

    /// Attach affiliates to one contact. Never fails: errors degrade to no affiliate.
    pub async fn resolve_composite(&self, contact: Candidate<Contact>) -> CompositeCandidate {
        match self.fetch_affiliates(&contact.id).await {
            Ok(affiliates) => CompositeCandidate {
                contact,
                affiliates,
            },
            Err(failure) => degrade(contact, &failure),
        }
    }

    /// Attach affiliates to every contact, preserving order. Always returns one
    /// composite per input contact.
    pub async fn resolve_all(&self, contacts: Vec<Candidate<Contact>>) -> Vec<CompositeCandidate> {
        let total = contacts.len();
        let outcomes = gather(contacts, self.concurrency, move |contact| async move {
            let id = contact.id.clone();
            match self.fetch_affiliates(&id).await {
                Ok(affiliates) => Ok(CompositeCandidate {
                    contact,
                    affiliates,
                }),
                Err(failure) => Err((contact, failure)),
            }
        })
        .await;

        let mut failed = 0;
        let composites: Vec<CompositeCandidate> = outcomes
            .into_iter()
            .map(|outcome| {
                outcome.unwrap_or_else(|(contact, failure)| {
                    failed += 1;
                    degrade(contact, &failure)
                })
            })
            .collect();

        tracing::debug!(
            "Resolved affiliates for {} contacts ({} degraded)",
            total,
            failed
        );
        composites
    }

    async fn fetch_affiliates(
        &self,
        contact_id: &str,
    ) -> Result<Vec<Candidate<Organization>>, CallFailure> {
        let store = self.store;
        let ids = match self
            .caller
            .call("affiliation lookup", move || {
                store.fetch_affiliations(EntityKind::Contact, contact_id, EntityKind::Organization)
            })
            .await
        {
            Ok(ids) => ids,
            Err(CallFailure {
                error: RemoteError::NotFound,
                ..
            }) => Vec::new(),
            Err(failure) => return Err(failure),
        };

        if ids.len() > self.max_affiliations {
            tracing::debug!(
                "Contact {} has {} affiliations; using the first {}",
                contact_id,
                ids.len(),
                self.max_affiliations
            );
        }
        let ids: Vec<String> = ids.into_iter().take(self.max_affiliations).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids = &ids;
        let records = match self
            .caller
            .call("affiliate fetch", move || {
                store.fetch_by_ids(EntityKind::Organization, ids, Organization::PROPERTIES)
            })
            .await
        {
            Ok(records) => records,
            Err(CallFailure {
                error: RemoteError::NotFound,
                ..
            }) => Vec::new(),
            Err(failure) => return Err(failure),
        };

        Ok(records
            .into_iter()
            .filter_map(|raw| {
                let id = raw.id.clone();
                Candidate::from_raw(raw)
                    .inspect_err(|e| tracing::warn!("Skipping malformed organization {}: {}", id, e))
                    .ok()
            })
            .collect())
    }
}

fn degrade(contact: Candidate<Contact>, failure: &CallFailure) -> CompositeCandidate {
    tracing::warn!(
        "Affiliate lookup for contact {} failed, continuing without it: {}",
        contact.id,
        failure
    );
    CompositeCandidate::unaffiliated(contact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_gather_preserves_order_and_failures() {
        let results = gather(1..=5, 2, |n| async move {
            if n == 3 { Err(n) } else { Ok(n * 10) }
        })
        .await;

        check!(results == vec![Ok(10), Ok(20), Err(3), Ok(40), Ok(50)]);
    }

    #[tokio::test]
    async fn test_gather_bounds_in_flight() {
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let (in_flight, peak) = (&in_flight, &peak);

        let results: Vec<Result<(), ()>> = gather(0..12, 3, move |_| async move {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        })
        .await;

        check!(results.len() == 12);
        check!(peak.load(Ordering::SeqCst) <= 3);
        check!(peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_gather_of_nothing() {
        let results: Vec<Result<(), ()>> = gather(Vec::<u8>::new(), 4, |_| async { Ok(()) }).await;
        check!(results.is_empty());
    }
}
