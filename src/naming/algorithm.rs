use super::config::NamingConfig;
use super::scoring::{collect_candidates, pick_best, score_candidates};
use super::tokens::{dominant_host, title_case, tokenize};

/// Label used when nothing better can be derived.
pub const FALLBACK_LABEL: &str = "Tabs";

/// Title and URL of one tab in the group being named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingInput {
    pub title: String,
    pub url: String,
}

impl NamingInput {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NameCandidate {
    pub text: String,
    pub word_count: usize,
    /// True when no scored candidate cleared the confidence floor.
    pub fallback: bool,
}

/// Suggests a short (one or two word) name for a group of tabs.
///
/// Returns `None` only for an empty group. The result is a pure function of
/// the input titles and URLs.
pub fn generate_name(tabs: &[NamingInput], config: &NamingConfig) -> Option<NameCandidate> {
    if tabs.is_empty() {
        return None;
    }

    let host = dominant_host(tabs.iter().map(|tab| tab.url.as_str()), config.min_token_chars);
    let titles: Vec<Vec<String>> = tabs
        .iter()
        .map(|tab| tokenize(&tab.title, config.min_token_chars))
        .collect();

    let candidates = collect_candidates(&titles);
    let scored = score_candidates(&candidates, tabs.len(), host.as_deref(), config);

    if let Some(best) = pick_best(&scored, config) {
        if best.score >= config.min_confidence {
            return Some(NameCandidate {
                text: title_case(&best.text),
                word_count: best.word_count,
                fallback: false,
            });
        }
    }

    Some(fallback_candidate(host.as_deref(), config))
}

fn fallback_candidate(host: Option<&str>, config: &NamingConfig) -> NameCandidate {
    let text = host
        .filter(|host| host.chars().count() <= config.max_label_chars)
        .map(title_case)
        .unwrap_or_else(|| FALLBACK_LABEL.to_string());
    NameCandidate {
        text,
        word_count: 1,
        fallback: true,
    }
}
