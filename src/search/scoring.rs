//! String similarity scoring between a query and one candidate field.
//!
//! The score is layered, strongest signal first:
//! - 1.0: exact match after normalization (short-circuits everything else)
//! - 0.9: the candidate contains the whole query
//! - up to 0.85: fraction of query words found verbatim among candidate words
//! - up to 0.6: best word-pair edit similarity, only when no word matched verbatim
//!
//! A length penalty of 0.01 per character of length difference (capped at 0.2) is
//! then subtracted, and the result is clamped to [0, 1].

use super::tokenize::normalize;

const SUBSTRING_SCORE: f64 = 0.9;
const WORD_OVERLAP_WEIGHT: f64 = 0.85;
const FUZZY_WEIGHT: f64 = 0.6;
const LENGTH_PENALTY_PER_CHAR: f64 = 0.01;
const MAX_LENGTH_PENALTY: f64 = 0.2;

/// Score how well `candidate` matches `query`, in [0, 1].
pub fn score_match(query: &str, candidate: &str) -> f64 {
    let query = normalize(query);
    let candidate = normalize(candidate);

    if query == candidate {
        return 1.0;
    }
    if query.is_empty() || candidate.is_empty() {
        return 0.0;
    }

    let mut score: f64 = 0.0;

    if candidate.contains(query.as_str()) {
        score = SUBSTRING_SCORE;
    }

    let query_words = words(&query);
    let candidate_words = words(&candidate);

    let overlap = word_overlap(&query_words, &candidate_words);
    score = score.max(overlap);

    if overlap == 0.0 {
        score = score.max(best_word_similarity(&query_words, &candidate_words) * FUZZY_WEIGHT);
    }

    score -= length_penalty(&query, &candidate);
    score.clamp(0.0, 1.0)
}

/// Fraction of query words present verbatim among the candidate words, weighted by 0.85.
pub fn word_overlap(query_words: &[&str], candidate_words: &[&str]) -> f64 {
    if query_words.is_empty() {
        return 0.0;
    }
    let matched = query_words
        .iter()
        .filter(|word| candidate_words.contains(word))
        .count();
    (matched as f64 / query_words.len() as f64) * WORD_OVERLAP_WEIGHT
}

/// Best normalized edit similarity over every query-word/candidate-word pair.
fn best_word_similarity(query_words: &[&str], candidate_words: &[&str]) -> f64 {
    query_words
        .iter()
        .flat_map(|q| {
            candidate_words
                .iter()
                .map(move |c| normalized_similarity(q, c))
        })
        .fold(0.0, f64::max)
}

fn length_penalty(query: &str, candidate: &str) -> f64 {
    let diff = query.chars().count().abs_diff(candidate.chars().count());
    (diff as f64 * LENGTH_PENALTY_PER_CHAR).min(MAX_LENGTH_PENALTY)
}

/// Split normalized text into words, shedding punctuation glued to word edges
/// ("St," → "st") so address fields compare word-for-word.
fn words(text: &str) -> Vec<&str> {
    text.split_whitespace()
        .map(|word| word.trim_matches(|c: char| c.is_ascii_punctuation()))
        .filter(|word| !word.is_empty())
        .collect()
}

/// `1 - distance / max(len)`, over chars. Two empty strings are identical.
pub fn normalized_similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein_distance(a, b) as f64 / longest as f64
}

/// Classic edit distance (insert, delete, substitute all cost 1).
///
/// Fills a `(len(b) + 1) x (len(a) + 1)` matrix row by row over chars.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let mut matrix = vec![vec![0usize; a.len() + 1]; b.len() + 1];
    for (j, cell) in matrix[0].iter_mut().enumerate() {
        *cell = j;
    }
    for (i, row) in matrix.iter_mut().enumerate() {
        row[0] = i;
    }

    for i in 1..=b.len() {
        for j in 1..=a.len() {
            let substitution = usize::from(b[i - 1] != a[j - 1]);
            matrix[i][j] = (matrix[i - 1][j - 1] + substitution)
                .min(matrix[i][j - 1] + 1)
                .min(matrix[i - 1][j] + 1);
        }
    }

    matrix[b.len()][a.len()]
}

/// Digits of a phone number, for exact comparison regardless of formatting.
pub fn phone_digits(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;
    use rstest::rstest;

    const EPSILON: f64 = 1e-9;

    #[rstest]
    #[case("kitten", "sitting", 3)]
    #[case("", "", 0)]
    #[case("abc", "", 3)]
    #[case("", "abc", 3)]
    #[case("flaw", "lawn", 2)]
    #[case("legal", "realty", 4)]
    #[case("café", "cafe", 1)]
    fn test_levenshtein_distance(#[case] a: &str, #[case] b: &str, #[case] expected: usize) {
        check!(levenshtein_distance(a, b) == expected);
        check!(levenshtein_distance(b, a) == expected);
    }

    #[rstest]
    #[case("hamilton", "hamiltom")]
    #[case("stanford", "standford")]
    #[case("brisbane", "hamilton")]
    #[case("ab", "ba")]
    fn test_levenshtein_agrees_with_rapidfuzz(#[case] a: &str, #[case] b: &str) {
        let expected = rapidfuzz::distance::levenshtein::distance(a.chars(), b.chars());
        check!(levenshtein_distance(a, b) == expected);
    }

    #[rstest]
    #[case("Stanford Legal", "Stanford Legal")]
    #[case("  stanford legal", "STANFORD LEGAL  ")]
    #[case("", "")]
    fn test_exact_match_scores_one(#[case] query: &str, #[case] candidate: &str) {
        check!(score_match(query, candidate) == 1.0);
    }

    #[test]
    fn test_substring_bonus() {
        check!(score_match("Stanford", "Stanford Legal Group") >= 0.9);
    }

    #[test]
    fn test_substring_subject_to_length_penalty() {
        // floor 0.9 minus 0.2 capped penalty
        let score = score_match("Stanford", "Stanford Legal Group Pty Ltd Conveyancing");
        check!((score - 0.7).abs() < EPSILON);
    }

    #[test]
    fn test_word_overlap_with_reordering() {
        // 2 of 2 words matched, no substring; same length so no penalty
        let score = score_match("legal stanford", "stanford legal");
        check!((score - 0.85).abs() < EPSILON);
    }

    #[test]
    fn test_partial_word_overlap() {
        // 2 of 3 words: 0.5667, length 23 vs 22: penalty 0.01
        let score = score_match("Stanford Legal Hamilton", "Stanford Legal Pty Ltd");
        check!((score - (2.0 / 3.0 * 0.85 - 0.01)).abs() < EPSILON);
    }

    #[test]
    fn test_fuzzy_fallback_for_typos() {
        // "stamford" vs "stanford": distance 1 of 8 -> 0.875 * 0.6, equal length
        let score = score_match("stamford", "stanford");
        check!((score - 0.875 * 0.6).abs() < EPSILON);
    }

    #[test]
    fn test_fuzzy_fallback_skipped_when_any_word_matches() {
        // "legal" matches verbatim (1/2 * 0.85); the near-miss "stamford" is not fuzzed
        let score = score_match("stamford legal", "stanford legal");
        check!((score - 0.425).abs() < EPSILON);
    }

    #[test]
    fn test_unrelated_strings_score_low() {
        check!(score_match("Stanford Legal Hamilton", "ACME Realty") < 0.3);
    }

    #[test]
    fn test_empty_side_scores_zero() {
        check!(score_match("", "Stanford") == 0.0);
        check!(score_match("Stanford", "   ") == 0.0);
    }

    #[test]
    fn test_monotonic_word_overlap() {
        let query = ["alpha", "beta", "gamma", "delta"];
        let mut previous = 0.0;
        for matched in 0..=query.len() {
            let candidate: Vec<&str> = query[..matched]
                .iter()
                .copied()
                .chain(["zzz", "yyy"])
                .collect();
            let overlap = word_overlap(&query, &candidate);
            check!(overlap >= previous);
            previous = overlap;
        }
        check!((previous - 0.85).abs() < EPSILON);
    }

    #[rstest]
    #[case("stanford legal", "a")]
    #[case("x", "Stanford Legal Pty Ltd, 12 Smith St, Hamilton QLD 4007")]
    #[case("Hamilton", "12 Smith St, Hamilton QLD")]
    fn test_scores_stay_in_unit_interval(#[case] query: &str, #[case] candidate: &str) {
        let score = score_match(query, candidate);
        check!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_punctuation_does_not_block_word_match() {
        let with_comma = score_match("hamilton", "smith st, hamilton, qld");
        check!(with_comma >= 0.9 - 0.2);
        check!(word_overlap(&["st"], &words("12 smith st, hamilton")) == 0.85);
    }

    #[rstest]
    #[case("(07) 3123 4567", "0731234567")]
    #[case("+61 400-000-000", "61400000000")]
    #[case("n/a", "")]
    fn test_phone_digits(#[case] input: &str, #[case] expected: &str) {
        check!(phone_digits(input) == expected);
    }
}
