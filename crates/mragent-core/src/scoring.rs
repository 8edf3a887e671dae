//! Deterministic answer scoring from token overlap and document-id overlap.
//!
//! Every function here is pure: identical inputs give bit-identical outputs.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::retrieval::Document;

const NOTE_TOKEN_F1: &str = "simple_metrics: token_f1/em";
const NOTE_DOC_OVERLAP: &str = "simple_metrics: doc_id_overlap>=1";
const NOTE_COVERAGE: &str = "simple_metrics: coverage≈equivalence";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rationale {
    pub note: String,
}

impl Rationale {
    fn new(note: &str) -> Vec<Self> {
        vec![Self {
            note: note.to_string(),
        }]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceScore {
    pub score_relevance: f64,
    pub score_relevance_normalized: f64,
    pub score_equivalence: f64,
    pub score_equivalence_normalized: f64,
    pub rationals: Vec<Rationale>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaithfulnessScore {
    pub score_faithfulness: f64,
    pub score_faithfulness_normalized: f64,
    pub rationals: Vec<Rationale>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageScore {
    pub score_equivalence: f64,
    pub score_equivalence_normalized: f64,
    pub rationals: Vec<Rationale>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub relevance: RelevanceScore,
    pub faithfulness: FaithfulnessScore,
    pub coverage: CoverageScore,
    pub token_f1: f64,
    pub exact_match: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundingScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

fn tokens(text: &str) -> Vec<String> {
    normalize(text)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn counts(tokens: &[String]) -> HashMap<&str, usize> {
    let mut counts = HashMap::new();
    for token in tokens {
        *counts.entry(token.as_str()).or_insert(0) += 1;
    }
    counts
}

/// Best multiset token F1 of `answer` against any reference.
pub fn token_f1(answer: &str, references: &[String]) -> f64 {
    let predicted = tokens(answer);
    if predicted.is_empty() {
        return 0.0;
    }
    let predicted_counts = counts(&predicted);
    references
        .iter()
        .map(|reference| {
            let gold = tokens(reference);
            if gold.is_empty() {
                return 0.0;
            }
            let gold_counts = counts(&gold);
            let overlap: usize = predicted_counts
                .iter()
                .map(|(token, count)| (*count).min(gold_counts.get(token).copied().unwrap_or(0)))
                .sum();
            if overlap == 0 {
                return 0.0;
            }
            let precision = overlap as f64 / predicted.len() as f64;
            let recall = overlap as f64 / gold.len() as f64;
            2.0 * precision * recall / (precision + recall)
        })
        .fold(0.0, f64::max)
}

/// 1.0 when the trimmed, lowercased answer equals any normalized reference.
pub fn exact_match(answer: &str, references: &[String]) -> f64 {
    let answer = normalize(answer);
    if references.iter().any(|reference| normalize(reference) == answer) {
        1.0
    } else {
        0.0
    }
}

fn id_set(ids: &[String]) -> HashSet<&str> {
    ids.iter()
        .map(String::as_str)
        .filter(|id| !id.is_empty())
        .collect()
}

/// Whether at least `k` distinct non-empty verified ids are gold ids (`k` defaults to 1).
pub fn is_faithful_by_docs(verified_ids: &[String], gold_ids: &[String], k: Option<usize>) -> bool {
    let gold = id_set(gold_ids);
    let hits = id_set(verified_ids).intersection(&gold).count();
    hits >= k.unwrap_or(1)
}

/// Set precision, recall and F1 of verified ids against gold ids. Empty ids are ignored.
pub fn grounding_prf(verified_ids: &[String], gold_ids: &[String]) -> GroundingScores {
    let verified = id_set(verified_ids);
    let gold = id_set(gold_ids);
    match (verified.is_empty(), gold.is_empty()) {
        (true, true) => GroundingScores {
            precision: 1.0,
            recall: 1.0,
            f1: 1.0,
        },
        (true, false) | (false, true) => GroundingScores {
            precision: 0.0,
            recall: 0.0,
            f1: 0.0,
        },
        (false, false) => {
            let hits = verified.intersection(&gold).count() as f64;
            let precision = hits / verified.len() as f64;
            let recall = hits / gold.len() as f64;
            let f1 = if precision + recall == 0.0 {
                0.0
            } else {
                2.0 * precision * recall / (precision + recall)
            };
            GroundingScores {
                precision,
                recall,
                f1,
            }
        }
    }
}

/// Score one answer.
///
/// Equivalence and relevance raws lie in `[-1, 1]` but are normalized as
/// `(raw + 1) / 3`, so they never exceed 2/3; faithfulness uses `(raw + 1) / 2`.
pub fn score(
    _question: &str,
    answer: &str,
    references: &[String],
    verified_docs: &[Document],
    gold_doc_ids: &[String],
) -> ScoreCard {
    let f1 = token_f1(answer, references);
    let em = exact_match(answer, references);

    let equivalence_raw = 2.0 * f1.max(em) - 1.0;
    let relevance_raw = 2.0 * f1 - 1.0;

    let verified_ids: Vec<String> = verified_docs
        .iter()
        .map(|doc| doc.original_id.clone())
        .collect();
    let overlap = if is_faithful_by_docs(&verified_ids, gold_doc_ids, None) {
        1.0
    } else {
        0.0
    };
    let faithfulness_raw = 2.0 * overlap - 1.0;

    ScoreCard {
        relevance: RelevanceScore {
            score_relevance: relevance_raw,
            score_relevance_normalized: (relevance_raw + 1.0) / 3.0,
            score_equivalence: equivalence_raw,
            score_equivalence_normalized: (equivalence_raw + 1.0) / 3.0,
            rationals: Rationale::new(NOTE_TOKEN_F1),
        },
        faithfulness: FaithfulnessScore {
            score_faithfulness: faithfulness_raw,
            score_faithfulness_normalized: (faithfulness_raw + 1.0) / 2.0,
            rationals: Rationale::new(NOTE_DOC_OVERLAP),
        },
        coverage: CoverageScore {
            score_equivalence: equivalence_raw,
            score_equivalence_normalized: (equivalence_raw + 1.0) / 3.0,
            rationals: Rationale::new(NOTE_COVERAGE),
        },
        token_f1: f1,
        exact_match: em,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn doc(original_id: &str) -> Document {
        Document {
            id: "0".into(),
            original_id: original_id.into(),
            text: String::new(),
        }
    }

    #[test]
    fn exact_match_is_case_insensitive() {
        assert_eq!(exact_match("Paris", &refs(&["Paris", "paris, France"])), 1.0);
        assert_eq!(exact_match("  PARIS ", &refs(&["paris"])), 1.0);
        assert_eq!(exact_match("Lyon", &refs(&["Paris"])), 0.0);
    }

    #[test]
    fn partial_overlap_f1() {
        let f1 = token_f1("the cat sat", &refs(&["a cat sat there"]));
        assert!((f1 - 4.0 / 7.0).abs() < 1e-12);
        assert!(f1 > 0.0 && f1 < 1.0);
    }

    #[test]
    fn f1_takes_best_reference_and_counts_multisets() {
        let f1 = token_f1("cat cat", &refs(&["dog", "cat"]));
        // overlap 1, precision 1/2, recall 1/1
        assert!((f1 - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(token_f1("", &refs(&["cat"])), 0.0);
        assert_eq!(token_f1("cat", &[]), 0.0);
    }

    #[test]
    fn faithfulness_needs_one_gold_document() {
        let card = score(
            "q",
            "x",
            &refs(&["y"]),
            &[doc("A"), doc("B")],
            &refs(&["B", "C"]),
        );
        assert_eq!(card.faithfulness.score_faithfulness, 1.0);
        assert_eq!(card.faithfulness.score_faithfulness_normalized, 1.0);

        let miss = score("q", "x", &refs(&["y"]), &[doc("A")], &refs(&["C"]));
        assert_eq!(miss.faithfulness.score_faithfulness, -1.0);
        assert_eq!(miss.faithfulness.score_faithfulness_normalized, 0.0);
    }

    #[test]
    fn normalization_keeps_thirds() {
        let card = score("q", "Paris", &refs(&["Paris"]), &[], &[]);
        assert_eq!(card.relevance.score_equivalence, 1.0);
        assert!((card.relevance.score_equivalence_normalized - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(card.coverage.score_equivalence, card.relevance.score_equivalence);
        assert_eq!(card.relevance.rationals[0].note, "simple_metrics: token_f1/em");

        let wrong = score("q", "Lyon", &refs(&["Paris"]), &[], &[]);
        assert_eq!(wrong.relevance.score_relevance, -1.0);
        assert_eq!(wrong.relevance.score_relevance_normalized, 0.0);
    }

    #[test]
    fn scoring_is_deterministic() {
        let args = (
            "who?",
            "the cat sat",
            refs(&["a cat sat there", "cat"]),
            vec![doc("A"), doc("B")],
            refs(&["B"]),
        );
        let first = score(args.0, args.1, &args.2, &args.3, &args.4);
        let second = score(args.0, args.1, &args.2, &args.3, &args.4);
        assert_eq!(first, second);
        assert_eq!(
            first.relevance.score_relevance.to_bits(),
            second.relevance.score_relevance.to_bits()
        );
    }

    #[test]
    fn grounding_edge_cases() {
        assert_eq!(grounding_prf(&[], &[]).f1, 1.0);
        assert_eq!(grounding_prf(&refs(&["A"]), &[]).precision, 0.0);
        let scores = grounding_prf(&refs(&["A", "B"]), &refs(&["B", "C", "D"]));
        assert_eq!(scores.precision, 0.5);
        assert!((scores.recall - 1.0 / 3.0).abs() < 1e-12);
        assert!((scores.f1 - 0.4).abs() < 1e-12);
    }

    #[test]
    fn faithful_by_docs_counts_gold_overlap_against_k() {
        let verified = refs(&["", "A", "B"]);
        let gold = refs(&["B"]);
        assert!(is_faithful_by_docs(&verified, &gold, None));
        assert!(is_faithful_by_docs(&verified, &gold, Some(1)));
        assert!(!is_faithful_by_docs(&verified, &gold, Some(2)));
        assert!(is_faithful_by_docs(&refs(&["X", "A"]), &refs(&["A"]), Some(1)));
        assert!(!is_faithful_by_docs(&refs(&["A"]), &refs(&["A"]), Some(2)));
        assert!(is_faithful_by_docs(&refs(&["A", "B", "C"]), &refs(&["C", "A"]), Some(2)));
        assert!(!is_faithful_by_docs(&refs(&[""]), &refs(&[""]), None));
    }

    #[test]
    fn grounding_ignores_empty_ids() {
        assert_eq!(grounding_prf(&refs(&[""]), &[]).f1, 1.0);
        let scores = grounding_prf(&refs(&["", "A"]), &refs(&["A", ""]));
        assert_eq!((scores.precision, scores.recall, scores.f1), (1.0, 1.0, 1.0));
    }
}
