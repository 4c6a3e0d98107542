use std::collections::{BTreeMap, BTreeSet};

use super::config::NamingConfig;
use super::tokens::is_generic;

/// A unigram or contiguous bigram seen in one or more tab titles.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateStats {
    pub tokens: Vec<String>,
    /// Indices of the tabs whose title contains the candidate.
    pub tabs: BTreeSet<usize>,
    /// Earliest token position across those titles.
    pub first_position: usize,
}

impl CandidateStats {
    pub fn text(&self) -> String {
        self.tokens.join(" ")
    }

    pub fn word_count(&self) -> usize {
        self.tokens.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub text: String,
    pub word_count: usize,
    pub score: f64,
}

/// Collects unigram and bigram statistics from already-tokenized titles.
pub fn collect_candidates(titles: &[Vec<String>]) -> BTreeMap<String, CandidateStats> {
    let mut candidates: BTreeMap<String, CandidateStats> = BTreeMap::new();

    for (tab_index, tokens) in titles.iter().enumerate() {
        for (position, token) in tokens.iter().enumerate() {
            record(&mut candidates, vec![token.clone()], tab_index, position);
            if let Some(next) = tokens.get(position + 1) {
                if next != token {
                    record(
                        &mut candidates,
                        vec![token.clone(), next.clone()],
                        tab_index,
                        position,
                    );
                }
            }
        }
    }

    candidates
}

fn record(
    candidates: &mut BTreeMap<String, CandidateStats>,
    tokens: Vec<String>,
    tab_index: usize,
    position: usize,
) {
    let key = tokens.join(" ");
    let entry = candidates.entry(key).or_insert_with(|| CandidateStats {
        tokens,
        tabs: BTreeSet::new(),
        first_position: position,
    });
    entry.tabs.insert(tab_index);
    entry.first_position = entry.first_position.min(position);
}

/// Score before the bigram preference is considered.
///
/// A unigram is penalized when it is generic; a bigram only when every one
/// of its words is, so "new york" survives while "new tab" does not.
pub fn base_score(
    candidate: &CandidateStats,
    tab_count: usize,
    host: Option<&str>,
    config: &NamingConfig,
) -> f64 {
    if tab_count == 0 {
        return 0.0;
    }

    let coverage = candidate.tabs.len() as f64 / tab_count as f64;
    let position = config.weight_position / (1.0 + candidate.first_position as f64);

    let mut score = config.weight_coverage * coverage + position;

    if let Some(host) = host {
        if candidate.tokens.iter().any(|token| token == host) {
            score += config.host_bonus;
        }
    }

    if candidate.tokens.iter().all(|token| is_generic(token)) {
        score -= config.generic_penalty;
    }

    score
}

/// Scores every candidate, applying the bigram bonus only to bigrams that
/// clearly beat the best unigram.
pub fn score_candidates(
    candidates: &BTreeMap<String, CandidateStats>,
    tab_count: usize,
    host: Option<&str>,
    config: &NamingConfig,
) -> Vec<ScoredCandidate> {
    let base: Vec<(&CandidateStats, f64)> = candidates
        .values()
        .filter(|candidate| candidate.text().chars().count() <= config.max_label_chars)
        .map(|candidate| (candidate, base_score(candidate, tab_count, host, config)))
        .collect();

    let best_unigram = base
        .iter()
        .filter(|(candidate, _)| candidate.word_count() == 1)
        .map(|(_, score)| *score)
        .fold(f64::NEG_INFINITY, f64::max);

    base.into_iter()
        .map(|(candidate, score)| {
            let boosted = if candidate.word_count() == 2
                && score > best_unigram + config.bigram_margin
            {
                score + config.bigram_bonus
            } else {
                score
            };
            ScoredCandidate {
                text: candidate.text(),
                word_count: candidate.word_count(),
                score: boosted,
            }
        })
        .collect()
}

/// Highest score wins; near-ties prefer fewer words, then lexical order.
pub fn pick_best(scored: &[ScoredCandidate], config: &NamingConfig) -> Option<ScoredCandidate> {
    let mut best: Option<&ScoredCandidate> = None;
    for candidate in scored {
        best = match best {
            None => Some(candidate),
            Some(current) => {
                let diff = candidate.score - current.score;
                if diff > config.tie_epsilon {
                    Some(candidate)
                } else if diff.abs() <= config.tie_epsilon
                    && (candidate.word_count, candidate.text.as_str())
                        < (current.word_count, current.text.as_str())
                {
                    Some(candidate)
                } else {
                    Some(current)
                }
            }
        };
    }
    best.cloned()
}
