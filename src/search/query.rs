//! Query planning for a filter API that ANDs within a group and ORs across groups.
//!
//! The remote store cannot do free-text or fuzzy search, so each token becomes its
//! own group ("field CONTAINS_TOKEN token") and any single token hit surfaces a
//! candidate. Precision is recovered later by client-side scoring, which is why the
//! plan asks for a deliberately oversized page.

use super::tokenize::Tokens;
use crate::types::{EntityKind, EntityRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Equals,
    ContainsToken,
}

/// One `field OPERATOR value` condition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Predicate {
    pub field: String,
    pub operator: Operator,
    pub value: String,
}

impl Predicate {
    pub fn equals(field: &str, value: &str) -> Self {
        Self {
            field: field.to_string(),
            operator: Operator::Equals,
            value: value.to_string(),
        }
    }

    pub fn contains_token(field: &str, token: &str) -> Self {
        Self {
            field: field.to_string(),
            operator: Operator::ContainsToken,
            value: token.to_string(),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.operator {
            Operator::Equals => "=",
            Operator::ContainsToken => "~",
        };
        write!(f, "{} {} {:?}", self.field, op, self.value)
    }
}

/// A conjunction of predicates. A list of groups is matched disjunctively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterGroup {
    pub filters: Vec<Predicate>,
}

impl FilterGroup {
    pub const fn new(filters: Vec<Predicate>) -> Self {
        Self { filters }
    }
}

/// Category restriction for role-scoped search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope<'a> {
    pub field: &'a str,
    pub value: &'a str,
}

/// A complete request for the remote token-filter search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub kind: EntityKind,
    pub filter_groups: Vec<FilterGroup>,
    pub limit: usize,
    pub properties: Vec<String>,
}

impl QueryPlan {
    /// A plan with no groups would match nothing (or everything); it is never sent.
    pub fn is_empty(&self) -> bool {
        self.filter_groups.is_empty()
    }
}

/// Limits applied while planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanLimits {
    /// Page size to request from the store.
    pub limit: usize,
    /// Maximum groups the store accepts in a single search.
    pub max_groups: usize,
}

/// Translate tokens into filter groups for one or more search fields.
///
/// One group per (token, field) pair; with a scope, every group also carries the
/// category predicate, since factoring it into its own group would OR it in.
/// With no tokens but a scope, a single category-only group is emitted. Tokens
/// beyond what `max_groups` can hold are dropped, first-seen order kept.
pub fn plan_groups(
    tokens: &Tokens,
    search_fields: &[&str],
    scope: Option<&Scope<'_>>,
    max_groups: usize,
) -> Vec<FilterGroup> {
    if tokens.is_empty() {
        return scope
            .map(|scope| vec![FilterGroup::new(vec![Predicate::equals(scope.field, scope.value)])])
            .unwrap_or_default();
    }

    let fields_per_token = search_fields.len().max(1);
    let token_budget = (max_groups / fields_per_token).max(1);
    if tokens.len() > token_budget {
        tracing::debug!(
            "Query has {} tokens but only {} fit in {} filter groups; dropping {}",
            tokens.len(),
            token_budget,
            max_groups,
            tokens.len() - token_budget
        );
    }

    tokens
        .iter()
        .take(token_budget)
        .flat_map(|token| {
            search_fields.iter().map(move |field| {
                let mut filters = vec![Predicate::contains_token(field, token)];
                if let Some(scope) = scope {
                    filters.push(Predicate::equals(scope.field, scope.value));
                }
                FilterGroup::new(filters)
            })
        })
        .collect()
}

/// Build the full search plan for entity kind `R`.
pub fn plan_query<R: EntityRecord>(
    tokens: &Tokens,
    category: Option<&str>,
    limits: PlanLimits,
) -> QueryPlan {
    let scope = category
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| Scope {
            field: R::CATEGORY_FIELD,
            value,
        });
    let filter_groups = plan_groups(tokens, R::SEARCH_FIELDS, scope.as_ref(), limits.max_groups);

    QueryPlan {
        kind: R::KIND,
        filter_groups,
        limit: limits.limit,
        properties: R::PROPERTIES.iter().map(|p| (*p).to_string()).collect(),
    }
}
