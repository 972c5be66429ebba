//! The remote record store, as consumed by the resolver.
//!
//! The store is an external collaborator. It offers token-filter search, batched
//! fetch-by-id and affiliation lookup; nothing else is assumed. Implementations
//! wrap an HTTP client in production and [`MemoryStore`] in tests.

mod memory;

pub use memory::MemoryStore;

use crate::error::RemoteError;
use crate::search::QueryPlan;
use crate::types::{EntityKind, RawRecord};
use std::future::Future;

pub trait RecordStore: Send + Sync {
    /// Run a token-filter search: groups are ORed, predicates within a group ANDed.
    ///
    /// Stores may return fewer than `plan.limit` records; they never return more.
    fn search(
        &self,
        plan: &QueryPlan,
    ) -> impl Future<Output = Result<Vec<RawRecord>, RemoteError>> + Send;

    /// Fetch records by id. Unknown ids are omitted rather than failing the batch.
    fn fetch_by_ids(
        &self,
        kind: EntityKind,
        ids: &[String],
        properties: &[&str],
    ) -> impl Future<Output = Result<Vec<RawRecord>, RemoteError>> + Send;

    /// Ids of the `to` entities affiliated with entity `id` of kind `from`.
    fn fetch_affiliations(
        &self,
        from: EntityKind,
        id: &str,
        to: EntityKind,
    ) -> impl Future<Output = Result<Vec<String>, RemoteError>> + Send;
}

impl<S: RecordStore> RecordStore for &S {
    fn search(
        &self,
        plan: &QueryPlan,
    ) -> impl Future<Output = Result<Vec<RawRecord>, RemoteError>> + Send {
        (**self).search(plan)
    }

    fn fetch_by_ids(
        &self,
        kind: EntityKind,
        ids: &[String],
        properties: &[&str],
    ) -> impl Future<Output = Result<Vec<RawRecord>, RemoteError>> + Send {
        (**self).fetch_by_ids(kind, ids, properties)
    }

    fn fetch_affiliations(
        &self,
        from: EntityKind,
        id: &str,
        to: EntityKind,
    ) -> impl Future<Output = Result<Vec<String>, RemoteError>> + Send {
        (**self).fetch_affiliations(from, id, to)
    }
}

impl<S: RecordStore> RecordStore for std::sync::Arc<S> {
    fn search(
        &self,
        plan: &QueryPlan,
    ) -> impl Future<Output = Result<Vec<RawRecord>, RemoteError>> + Send {
        (**self).search(plan)
    }

    fn fetch_by_ids(
        &self,
        kind: EntityKind,
        ids: &[String],
        properties: &[&str],
    ) -> impl Future<Output = Result<Vec<RawRecord>, RemoteError>> + Send {
        (**self).fetch_by_ids(kind, ids, properties)
    }

    fn fetch_affiliations(
        &self,
        from: EntityKind,
        id: &str,
        to: EntityKind,
    ) -> impl Future<Output = Result<Vec<String>, RemoteError>> + Send {
        (**self).fetch_affiliations(from, id, to)
    }
}
