//! End-to-end resolution: normalize, plan, search, fan out, rank.
//!
//! One call to [`EntityResolver::find_organizations`] or
//! [`EntityResolver::find_contacts`] is one resolution. It owns its own
//! [`RemoteCaller`], so pacing and retry state never leak between queries, and it
//! either returns the complete ranked list or an error; never a partial list.

use crate::composite::CompositeResolver;
use crate::config::ResolverConfig;
use crate::error::{RemoteError, ResolveError};
use crate::remote::{CallFailure, RemoteCaller};
use crate::search::{
    ContactQuery, Normalizer, OrganizationQuery, PlanLimits, QueryPlan, ScoredCandidate,
    best_affiliate_score, plan_query, rank,
};
use crate::store::RecordStore;
use crate::types::{Candidate, CompositeCandidate, Contact, EntityKind, EntityRecord, Organization};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Ranked organizations for one query.
pub type OrganizationMatches = Vec<ScoredCandidate<Candidate<Organization>>>;

/// Ranked contacts (with their affiliates) for one query.
pub type ContactMatches = Vec<ScoredCandidate<CompositeCandidate>>;

/// Fuzzy entity resolver over a store that only supports exact-token filters.
#[derive(Debug)]
pub struct EntityResolver<S> {
    store: S,
    config: ResolverConfig,
    organization_normalizer: Normalizer,
    contact_normalizer: Normalizer,
}

impl<S: RecordStore> EntityResolver<S> {
    /// Build a resolver. The configuration is validated here so that queries never
    /// fail on a bad weight or threshold.
    pub fn new(store: S, config: ResolverConfig) -> Result<Self, ResolveError> {
        config.validate()?;
        let organization_normalizer =
            Normalizer::for_kind(&config.stop_words, EntityKind::Organization);
        let contact_normalizer = Normalizer::for_kind(&config.stop_words, EntityKind::Contact);
        Ok(Self {
            store,
            config,
            organization_normalizer,
            contact_normalizer,
        })
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Find organizations matching a business name and optional suburb.
    pub async fn find_organizations(
        &self,
        query: &OrganizationQuery,
    ) -> Result<OrganizationMatches, ResolveError> {
        let started = Instant::now();
        let tokens = self.organization_normalizer.extract_tokens(&query.name);
        let plan = plan_query::<Organization>(&tokens, query.category.as_deref(), self.limits());
        tracing::debug!("Organization query '{}' tokens: {}", query.name, tokens);

        let caller = RemoteCaller::new(&self.config);
        let candidates = self.primary_search::<Organization>(&caller, &plan).await?;
        let fetched = candidates.len();

        let ranked = rank(
            candidates,
            query,
            &self.config.weights.organization,
            self.config.threshold,
        );
        tracing::info!(
            "Resolved organization '{}': {} of {} candidates in {:?}",
            query.name,
            ranked.len(),
            fetched,
            started.elapsed()
        );
        Ok(ranked)
    }

    /// Find contacts matching a person name, scored with their affiliated organization.
    pub async fn find_contacts(&self, query: &ContactQuery) -> Result<ContactMatches, ResolveError> {
        let started = Instant::now();
        let tokens = self.contact_normalizer.extract_tokens(&query.name);
        let plan = plan_query::<Contact>(&tokens, query.category.as_deref(), self.limits());
        tracing::debug!("Contact query '{}' tokens: {}", query.name, tokens);

        let caller = RemoteCaller::new(&self.config);
        let contacts = self.primary_search::<Contact>(&caller, &plan).await?;
        let fetched = contacts.len();

        let mut composites = if query.needs_affiliates() {
            CompositeResolver::new(&self.store, &caller, &self.config)
                .resolve_all(contacts)
                .await
        } else {
            contacts
                .into_iter()
                .map(CompositeCandidate::unaffiliated)
                .collect()
        };

        if let Some(filter) = query
            .affiliate_filter
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
        {
            let min = self.config.affiliate_filter_threshold;
            let before = composites.len();
            composites.retain(|composite| best_affiliate_score(composite, filter) > min);
            tracing::debug!(
                "Affiliate filter '{}' kept {} of {} candidates",
                filter,
                composites.len(),
                before
            );
        }

        let ranked = rank(
            composites,
            query,
            &self.config.weights.contact,
            self.config.threshold,
        );
        tracing::info!(
            "Resolved contact '{}': {} of {} candidates in {:?}",
            query.name,
            ranked.len(),
            fetched,
            started.elapsed()
        );
        Ok(ranked)
    }

    /// [`find_organizations`](Self::find_organizations), abandoned when `cancel` fires.
    pub async fn find_organizations_cancellable(
        &self,
        query: &OrganizationQuery,
        cancel: &CancellationToken,
    ) -> Result<OrganizationMatches, ResolveError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => cancelled(&query.name),
            result = self.find_organizations(query) => result,
        }
    }

    /// [`find_contacts`](Self::find_contacts), abandoned when `cancel` fires.
    pub async fn find_contacts_cancellable(
        &self,
        query: &ContactQuery,
        cancel: &CancellationToken,
    ) -> Result<ContactMatches, ResolveError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => cancelled(&query.name),
            result = self.find_contacts(query) => result,
        }
    }

    const fn limits(&self) -> PlanLimits {
        PlanLimits {
            limit: self.config.search_limit,
            max_groups: self.config.max_filter_groups,
        }
    }

    async fn primary_search<R: EntityRecord>(
        &self,
        caller: &RemoteCaller,
        plan: &QueryPlan,
    ) -> Result<Vec<Candidate<R>>, ResolveError> {
        if plan.is_empty() {
            tracing::debug!("No searchable tokens for {}; skipping search", R::KIND);
            return Ok(Vec::new());
        }
        tracing::debug!(
            "Searching {} with {} filter group(s), limit {}",
            R::KIND,
            plan.filter_groups.len(),
            plan.limit
        );

        let store = &self.store;
        let records = match caller
            .call("primary search", move || store.search(plan))
            .await
        {
            Ok(records) => records,
            Err(CallFailure {
                error: RemoteError::NotFound,
                ..
            }) => {
                tracing::debug!("Primary {} search found nothing", R::KIND);
                Vec::new()
            }
            Err(CallFailure { attempts, error }) => {
                return Err(ResolveError::PrimarySearch {
                    attempts,
                    source: error,
                });
            }
        };

        Ok(records
            .into_iter()
            .filter_map(|raw| {
                let id = raw.id.clone();
                Candidate::from_raw(raw)
                    .inspect_err(|e| tracing::warn!("Skipping malformed {} {}: {}", R::KIND, id, e))
                    .ok()
            })
            .collect())
    }
}

fn cancelled<T>(name: &str) -> Result<T, ResolveError> {
    tracing::info!("Resolution of '{}' cancelled", name);
    Err(ResolveError::Cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::store::MemoryStore;
    use crate::types::RawRecord;
    use assert2::{check, let_assert};

    fn config() -> ResolverConfig {
        ResolverConfig {
            rate_limit: None,
            ..ResolverConfig::default()
        }
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let config = ResolverConfig {
            threshold: 1.5,
            ..config()
        };
        let_assert!(Err(error) = EntityResolver::new(MemoryStore::new(), config));
        check!(matches!(error, ResolveError::Config(ConfigError::Threshold(_))));
    }

    #[tokio::test]
    async fn test_stop_words_only_query_skips_the_store() {
        let resolver = EntityResolver::new(MemoryStore::new(), config()).unwrap();
        let_assert!(Ok(matches) = resolver.find_organizations(&OrganizationQuery::new("The Real Estate Group")).await);
        check!(matches.is_empty());
        check!(resolver.store().search_calls() == 0);
    }

    #[tokio::test]
    async fn test_exact_name_ranks_first() {
        let store = MemoryStore::new()
            .with_record(
                EntityKind::Organization,
                RawRecord::new("1").with("name", "Harbour Legal"),
            )
            .with_record(EntityKind::Organization, RawRecord::new("2").with("name", "Harbour Foods"));
        let resolver = EntityResolver::new(store, config()).unwrap();

        let_assert!(Ok(matches) = resolver.find_organizations(&OrganizationQuery::new("Harbour Legal")).await);
        check!(matches[0].candidate.id == "1");
        check!(matches[0].score == 1.0);
    }

    #[tokio::test]
    async fn test_contacts_without_affiliate_terms_skip_fan_out() {
        let store = MemoryStore::new().with_record(
            EntityKind::Contact,
            RawRecord::new("c1")
                .with("firstname", "Jane")
                .with("lastname", "Smith"),
        );
        let resolver = EntityResolver::new(store, config()).unwrap();

        let_assert!(Ok(matches) = resolver.find_contacts(&ContactQuery::new("Jane Smith")).await);
        check!(matches.len() == 1);
        check!(resolver.store().affiliation_calls() == 0);
    }
}
