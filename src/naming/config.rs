/// Tunable weights for group name scoring.
#[derive(Debug, Clone)]
pub struct NamingConfig {
    /// Weight for the share of tabs whose title contains the candidate.
    pub weight_coverage: f64,

    /// Bonus for appearing early in a title, divided by `1 + position`.
    pub weight_position: f64,

    /// Added to a bigram only when it beats the best unigram by `bigram_margin`.
    pub bigram_bonus: f64,
    pub bigram_margin: f64,

    /// Added when the candidate overlaps the dominant host token.
    pub host_bonus: f64,

    /// Subtracted for generic words such as "home" or "login".
    pub generic_penalty: f64,

    /// Candidates scoring below this fall back to the deterministic label.
    pub min_confidence: f64,

    pub min_token_chars: usize,
    pub max_label_chars: usize,

    /// Scores closer than this are treated as tied.
    pub tie_epsilon: f64,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            weight_coverage: 1.0,
            weight_position: 0.3,
            bigram_bonus: 0.15,
            bigram_margin: 0.05,
            host_bonus: 0.2,
            generic_penalty: 0.6,
            min_confidence: 0.6,
            min_token_chars: 2,
            max_label_chars: 24,
            tie_epsilon: 1e-9,
        }
    }
}
