//! Composite scoring and ranking of candidates, entirely in memory.
//!
//! Every candidate gets one sub-score per active field (see [`ScoreField`]). The
//! composite is the weight-normalised sum of those sub-scores plus any exact-match
//! bonus, clamped to [0, 1]. Which fields are active depends on the query alone, so
//! the normaliser is the same for every candidate of one query and never reorders.

use super::scoring::{phone_digits, score_match};
use crate::config::{ContactWeights, OrganizationWeights};
use crate::types::{Candidate, CandidateId, CompositeCandidate, Organization};
use serde::Serialize;
use std::cmp::Ordering;

/// Fields that contribute a weighted sub-score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreField {
    Name,
    Affiliate,
    Location,
}

/// One weighted sub-score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreTerm {
    pub field: ScoreField,
    pub weight: f64,
    pub score: f64,
}

/// The per-field scores a composite was computed from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldScores {
    pub terms: Vec<ScoreTerm>,
    /// Exact-match bonus added after normalisation (0 when none applied).
    pub bonus: f64,
}

impl FieldScores {
    pub fn push(&mut self, field: ScoreField, weight: f64, score: f64) {
        self.terms.push(ScoreTerm {
            field,
            weight,
            score,
        });
    }

    pub fn get(&self, field: ScoreField) -> Option<f64> {
        self.terms
            .iter()
            .find(|term| term.field == field)
            .map(|term| term.score)
    }

    /// `Σ(weight × score) / Σ(weight) + bonus`, clamped to [0, 1].
    pub fn composite(&self) -> f64 {
        let total_weight: f64 = self.terms.iter().map(|term| term.weight).sum();
        let weighted = if total_weight > 0.0 {
            self.terms
                .iter()
                .map(|term| term.weight * term.score)
                .sum::<f64>()
                / total_weight
        } else {
            0.0
        };
        (weighted + self.bonus).clamp(0.0, 1.0)
    }
}

/// A candidate with its final score and the breakdown that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate<T> {
    pub candidate: T,
    pub score: f64,
    pub breakdown: FieldScores,
}

/// Something the ranker can score against a query.
pub trait Rankable: CandidateId {
    type Query;
    type Weights;

    fn field_scores(&self, query: &Self::Query, weights: &Self::Weights) -> FieldScores;
}

/// "Business name + optional suburb" search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrganizationQuery {
    pub name: String,
    pub suburb: Option<String>,
    /// Restrict the search to organizations of this category.
    pub category: Option<String>,
}

impl OrganizationQuery {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_suburb(mut self, suburb: impl Into<String>) -> Self {
        self.suburb = Some(suburb.into());
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    fn suburb(&self) -> Option<&str> {
        present(self.suburb.as_deref())
    }

    /// Name and suburb as one string; both fields are scored against it.
    pub fn combined(&self) -> String {
        match self.suburb() {
            Some(suburb) => format!("{} {}", self.name.trim(), suburb),
            None => self.name.trim().to_string(),
        }
    }
}

/// "Person name + optional agency, phone, suburb" search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactQuery {
    pub name: String,
    /// Agency name, scored against the contact's affiliated organization.
    pub agency: Option<String>,
    pub phone: Option<String>,
    pub suburb: Option<String>,
    /// Restrict the search to contacts of this category.
    pub category: Option<String>,
    /// Exclude candidates whose affiliate does not match this name.
    pub affiliate_filter: Option<String>,
}

impl ContactQuery {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_agency(mut self, agency: impl Into<String>) -> Self {
        self.agency = Some(agency.into());
        self
    }

    #[must_use]
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    #[must_use]
    pub fn with_suburb(mut self, suburb: impl Into<String>) -> Self {
        self.suburb = Some(suburb.into());
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn with_affiliate_filter(mut self, name: impl Into<String>) -> Self {
        self.affiliate_filter = Some(name.into());
        self
    }

    /// Whether ranking needs the affiliated organization at all.
    pub fn needs_affiliates(&self) -> bool {
        present(self.agency.as_deref()).is_some()
            || present(self.suburb.as_deref()).is_some()
            || present(self.affiliate_filter.as_deref()).is_some()
    }
}

impl Rankable for Candidate<Organization> {
    type Query = OrganizationQuery;
    type Weights = OrganizationWeights;

    fn field_scores(&self, query: &OrganizationQuery, weights: &OrganizationWeights) -> FieldScores {
        let combined = query.combined();
        let mut scores = FieldScores::default();

        let name = self.record.name.as_deref().unwrap_or_default();
        scores.push(ScoreField::Name, weights.name, score_match(&combined, name));

        if query.suburb().is_some() {
            let location = self.record.location_text();
            scores.push(ScoreField::Location, weights.location, score_match(&combined, &location));
        }

        scores
    }
}

impl Rankable for CompositeCandidate {
    type Query = ContactQuery;
    type Weights = ContactWeights;

    fn field_scores(&self, query: &ContactQuery, weights: &ContactWeights) -> FieldScores {
        let contact = &self.contact.record;
        let mut scores = FieldScores::default();

        scores.push(ScoreField::Name, weights.name, score_match(&query.name, &contact.full_name()));

        if let Some(agency) = present(query.agency.as_deref()) {
            scores.push(ScoreField::Affiliate, weights.affiliate, best_affiliate_score(self, agency));
        }

        if let Some(suburb) = present(query.suburb.as_deref()) {
            let own = contact
                .suburb
                .as_deref()
                .map_or(0.0, |value| score_match(suburb, value));
            let via_affiliate = self
                .affiliates
                .iter()
                .flat_map(|org| [org.record.suburb.clone(), org.record.address.clone()])
                .flatten()
                .map(|value| score_match(suburb, &value))
                .fold(0.0, f64::max);
            scores.push(ScoreField::Location, weights.location, own.max(via_affiliate));
        }

        if let Some(phone) = present(query.phone.as_deref()) {
            let wanted = phone_digits(phone);
            if !wanted.is_empty() && contact.phones().any(|p| phone_digits(p) == wanted) {
                scores.bonus = weights.phone_bonus;
            }
        }

        scores
    }
}

/// Best name score of `name` against any of the candidate's affiliates; 0 with none.
pub fn best_affiliate_score(candidate: &CompositeCandidate, name: &str) -> f64 {
    candidate
        .affiliates
        .iter()
        .filter_map(|org| org.record.name.as_deref())
        .map(|org_name| score_match(name, org_name))
        .fold(0.0, f64::max)
}

/// Score, threshold and sort candidates.
///
/// Candidates scoring at or below `threshold` are dropped; the rest are sorted by
/// descending score with ties broken by ascending candidate id. The threshold is
/// compared against the weight-normalised composite from [`FieldScores::composite`],
/// not the raw sum of sub-scores, so a name + location query needs an average above it.
pub fn rank<T: Rankable>(
    candidates: Vec<T>,
    query: &T::Query,
    weights: &T::Weights,
    threshold: f64,
) -> Vec<ScoredCandidate<T>> {
    let total = candidates.len();
    let mut scored: Vec<ScoredCandidate<T>> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let breakdown = candidate.field_scores(query, weights);
            let score = breakdown.composite();
            tracing::trace!("Candidate {} scored {:.3}", candidate.candidate_id(), score);
            (score > threshold).then_some(ScoredCandidate {
                candidate,
                score,
                breakdown,
            })
        })
        .collect();

    scored.sort_by(compare_scored);

    tracing::debug!(
        "Ranked {} of {} candidates above threshold {}",
        scored.len(),
        total,
        threshold
    );

    scored
}

fn compare_scored<T: CandidateId>(a: &ScoredCandidate<T>, b: &ScoredCandidate<T>) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.candidate.candidate_id().cmp(b.candidate.candidate_id()))
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Contact;
    use assert2::check;
    use rstest::rstest;

    fn organization(id: &str, name: &str, address: &str) -> Candidate<Organization> {
        Candidate {
            id: id.to_string(),
            record: Organization {
                name: Some(name.to_string()),
                address: Some(address.to_string()),
                ..Organization::default()
            },
        }
    }

    fn contact(id: &str, first: &str, last: &str, phone: Option<&str>) -> CompositeCandidate {
        CompositeCandidate::unaffiliated(Candidate {
            id: id.to_string(),
            record: Contact {
                first_name: Some(first.to_string()),
                last_name: Some(last.to_string()),
                phone: phone.map(str::to_string),
                ..Contact::default()
            },
        })
    }

    fn with_affiliate(mut composite: CompositeCandidate, name: &str, suburb: &str) -> CompositeCandidate {
        composite.affiliates.push(Candidate {
            id: format!("org-{}", composite.contact.id),
            record: Organization {
                name: Some(name.to_string()),
                suburb: Some(suburb.to_string()),
                ..Organization::default()
            },
        });
        composite
    }

    #[test]
    fn test_name_and_location_ordering() {
        let query = OrganizationQuery::new("Stanford Legal").with_suburb("Hamilton");
        let candidates = vec![
            organization("2", "ACME Realty", "1 Other St, Brisbane"),
            organization("1", "Stanford Legal Pty Ltd", "12 Smith St, Hamilton QLD"),
        ];

        let ranked = rank(candidates, &query, &OrganizationWeights::default(), 0.3);

        check!(ranked.len() == 1);
        check!(ranked[0].candidate.id == "1");
        check!(ranked[0].score > 0.3);
        check!(ranked[0].breakdown.get(ScoreField::Location).is_some());
    }

    #[test]
    fn test_composite_is_weighted_mean_of_terms() {
        let query = OrganizationQuery::new("Stanford Legal").with_suburb("Hamilton");
        let candidate = organization("1", "Stanford Legal Pty Ltd", "12 Smith St, Hamilton QLD");

        let breakdown = candidate.field_scores(&query, &OrganizationWeights::default());
        let name = breakdown.get(ScoreField::Name).unwrap_or_default();
        let location = breakdown.get(ScoreField::Location).unwrap_or_default();

        check!(breakdown.terms.len() == 2);
        check!((breakdown.composite() - (name + location) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_location_term_inactive_without_suburb() {
        let query = OrganizationQuery::new("Stanford Legal");
        let breakdown = organization("1", "Stanford Legal", "x").field_scores(&query, &OrganizationWeights::default());
        check!(breakdown.terms.len() == 1);
        check!(breakdown.composite() == 1.0);
    }

    #[test]
    fn test_phone_bonus_beats_pure_name_match() {
        let query = ContactQuery::new("Jane Citizen").with_phone("0400 111 222");
        let candidates = vec![
            contact("a", "Jane", "Smith", None),
            contact("b", "J", "Citizen", Some("(0400) 111-222")),
        ];

        let ranked = rank(candidates, &query, &ContactWeights::default(), 0.3);

        check!(ranked.len() == 2);
        check!(ranked[0].candidate.contact.id == "b");
        check!(ranked[0].breakdown.bonus == 0.5);
        check!(ranked[1].breakdown.bonus == 0.0);
    }

    #[test]
    fn test_threshold_applies_to_normalised_composite() {
        let mut scores = FieldScores::default();
        scores.push(ScoreField::Name, 1.0, 0.4);
        scores.push(ScoreField::Location, 1.0, 0.0);

        // the raw sum would be 0.4; the composite averages over active weights
        check!(scores.composite() == 0.2);
        check!(scores.composite() <= 0.3);
    }

    #[test]
    fn test_missing_affiliate_contributes_zero() {
        let query = ContactQuery::new("Jane Citizen").with_agency("Stanford Legal");
        let unaffiliated = contact("a", "Jane", "Citizen", None);
        let affiliated = with_affiliate(contact("b", "Jane", "Citizen", None), "Stanford Legal", "Hamilton");

        let weights = ContactWeights::default();
        let without = unaffiliated.field_scores(&query, &weights);
        let with = affiliated.field_scores(&query, &weights);

        check!(without.get(ScoreField::Affiliate) == Some(0.0));
        check!(with.get(ScoreField::Affiliate) == Some(1.0));
        check!(without.composite() == 0.5);
        check!(with.composite() == 1.0);
    }

    #[test]
    fn test_contact_location_uses_affiliate_suburb() {
        let query = ContactQuery::new("Jane Citizen").with_suburb("Hamilton");
        let composite = with_affiliate(contact("a", "Jane", "Citizen", None), "Stanford Legal", "Hamilton");

        let breakdown = composite.field_scores(&query, &ContactWeights::default());
        check!(breakdown.get(ScoreField::Location) == Some(1.0));
    }

    #[rstest]
    #[case(0.0)]
    #[case(0.3)]
    #[case(0.6)]
    fn test_threshold_law(#[case] threshold: f64) {
        let query = OrganizationQuery::new("Stanford Legal");
        let candidates = vec![
            organization("1", "Stanford Legal", ""),
            organization("2", "Stanford Legal Group Pty Ltd Conveyancing", ""),
            organization("3", "Stanford", ""),
            organization("4", "Brisbane Plumbing", ""),
        ];
        let weights = OrganizationWeights::default();
        let expected: Vec<String> = candidates
            .iter()
            .filter(|c| c.field_scores(&query, &weights).composite() > threshold)
            .map(|c| c.id.clone())
            .collect();

        let ranked = rank(candidates, &query, &weights, threshold);

        check!(ranked.iter().all(|s| s.score > threshold));
        let mut kept: Vec<String> = ranked.iter().map(|s| s.candidate.id.clone()).collect();
        kept.sort();
        check!(kept == expected);
    }

    #[test]
    fn test_ties_break_by_id() {
        let query = OrganizationQuery::new("Acme");
        let candidates = vec![
            organization("c", "Acme", ""),
            organization("a", "Acme", ""),
            organization("b", "Acme", ""),
        ];

        let ranked = rank(candidates, &query, &OrganizationWeights::default(), 0.3);
        let ids: Vec<&str> = ranked.iter().map(|s| s.candidate.id.as_str()).collect();
        check!(ids == vec!["a", "b", "c"]);
    }

    #[test]
    fn test_ranking_is_repeatable() {
        let query = ContactQuery::new("Jane Citizen").with_suburb("Hamilton");
        let build = || {
            vec![
                contact("1", "Jane", "Citizen", None),
                with_affiliate(contact("2", "Jane", "Citizens", None), "X", "Hamilton"),
                contact("3", "Janet", "Citizen", None),
            ]
        };
        let weights = ContactWeights::default();

        let first = rank(build(), &query, &weights, 0.3);
        let second = rank(build(), &query, &weights, 0.3);
        check!(first == second);
    }

    #[test]
    fn test_scores_sorted_descending() {
        let query = OrganizationQuery::new("Stanford Legal");
        let candidates = vec![
            organization("1", "Stanford", ""),
            organization("2", "Stanford Legal", ""),
            organization("3", "Stanford Legal Services", ""),
        ];
        let ranked = rank(candidates, &query, &OrganizationWeights::default(), 0.0);
        check!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
        check!(ranked[0].candidate.id == "2");
    }
}
