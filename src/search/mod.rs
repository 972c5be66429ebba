//! Fuzzy search core for a store that only supports exact-token filters.
//!
//! This module provides tokenization, string similarity, query planning and
//! composite ranking. Everything here is pure and synchronous; remote calls live
//! in [`crate::resolver`] and [`crate::composite`].

pub mod query;
pub mod rank;
pub mod scoring;
pub mod tokenize;

pub use query::{FilterGroup, Operator, PlanLimits, Predicate, QueryPlan, plan_groups, plan_query};
pub use rank::{
    ContactQuery, FieldScores, OrganizationQuery, Rankable, ScoreField, ScoreTerm, ScoredCandidate,
    best_affiliate_score, rank,
};
pub use scoring::{levenshtein_distance, normalized_similarity, phone_digits, score_match};
pub use tokenize::{Normalizer, StopWords, Tokens};
