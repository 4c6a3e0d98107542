//! Title normalization and URL host extraction.

use std::collections::BTreeMap;

const STOPWORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "as", "at", "be", "by", "com", "for", "from", "how",
    "html", "http", "https", "in", "into", "is", "it", "its", "of", "on", "or", "our", "that",
    "the", "this", "to", "vs", "was", "what", "when", "where", "which", "who", "why", "will",
    "with", "www", "you", "your",
];

/// Words that say nothing about what a group of tabs is for.
const GENERIC_TOKENS: &[&str] = &[
    "dashboard", "home", "index", "login", "new", "page", "sign", "signin", "tab", "untitled",
    "welcome",
];

/// Second-level labels that sit under a country TLD (`bbc.co.uk`).
const SECOND_LEVEL_LABELS: &[&str] = &["ac", "co", "com", "edu", "gov", "net", "org"];

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

pub fn is_generic(token: &str) -> bool {
    GENERIC_TOKENS.contains(&token)
}

/// Lowercases, splits on anything that is not alphanumeric, and drops
/// stopwords, pure numbers and too-short tokens. Apostrophes are removed
/// rather than split on so "don't" stays one token.
pub fn tokenize(text: &str, min_chars: usize) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| *c != '\'' && *c != '\u{2019}')
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|token| token.chars().count() >= min_chars)
        .filter(|token| !token.chars().all(|c| c.is_ascii_digit()))
        .filter(|token| !is_stopword(token))
        .map(str::to_string)
        .collect()
}

/// Registrable label of a web URL's host: `docs.github.com` -> `github`.
///
/// Non-web schemes and IP addresses yield `None`.
pub fn host_token(url: &str) -> Option<String> {
    let (scheme, rest) = url.split_once("://")?;
    let scheme = scheme.to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return None;
    }

    let authority = rest
        .split(|c| matches!(c, '/' | '?' | '#'))
        .next()
        .unwrap_or_default();
    let host = authority.rsplit('@').next().unwrap_or_default();
    let host = host.split(':').next().unwrap_or_default().to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    if host.is_empty() || host.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }

    let labels: Vec<&str> = host.split('.').filter(|label| !label.is_empty()).collect();
    let label = match labels.len() {
        0 => return None,
        1 => labels[0],
        len => {
            let candidate = labels[len - 2];
            if len >= 3 && SECOND_LEVEL_LABELS.contains(&candidate) {
                labels[len - 3]
            } else {
                candidate
            }
        }
    };

    Some(label.to_string())
}

/// Host token shared by at least half of the URLs. Ties go to the
/// lexically smaller token so the result is stable.
pub fn dominant_host<'a>(urls: impl Iterator<Item = &'a str>, min_chars: usize) -> Option<String> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut total = 0usize;

    for url in urls {
        total += 1;
        if let Some(token) = host_token(url) {
            *counts.entry(token).or_insert(0) += 1;
        }
    }

    let (token, count) = counts
        .into_iter()
        .filter(|(token, _)| token.chars().count() >= min_chars)
        .fold(None::<(String, usize)>, |best, (token, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((token, count)),
        })?;

    if count * 2 >= total {
        Some(token)
    } else {
        None
    }
}

pub fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_strips_separators_stopwords_and_numbers() {
        assert_eq!(
            tokenize("The Rust Book — Chapter 10: Generics | rust-lang.org", 2),
            vec!["rust", "book", "chapter", "generics", "rust", "lang", "org"]
        );
    }

    #[test]
    fn tokenize_keeps_contractions_together() {
        assert_eq!(tokenize("Don't Panic", 2), vec!["dont", "panic"]);
    }

    #[test]
    fn host_token_picks_registrable_label() {
        assert_eq!(host_token("https://docs.github.com/en"), Some("github".into()));
        assert_eq!(host_token("https://www.bbc.co.uk/news"), Some("bbc".into()));
        assert_eq!(host_token("http://localhost:3000/"), Some("localhost".into()));
        assert_eq!(host_token("https://user@example.org/x"), Some("example".into()));
        assert_eq!(host_token("http://127.0.0.1:8080"), None);
        assert_eq!(host_token("chrome://newtab/"), None);
        assert_eq!(host_token("not a url"), None);
    }

    #[test]
    fn dominant_host_needs_half_the_tabs() {
        let urls = ["https://github.com/a", "https://github.com/b", "https://x.org"];
        assert_eq!(dominant_host(urls.iter().copied(), 2), Some("github".into()));

        let spread = ["https://a.com", "https://b.com", "https://c.com"];
        assert_eq!(dominant_host(spread.iter().copied(), 2), None);
    }

    #[test]
    fn dominant_host_breaks_ties_lexically() {
        let urls = ["https://zeta.com", "https://alpha.com"];
        assert_eq!(dominant_host(urls.iter().copied(), 2), Some("alpha".into()));
    }

    #[test]
    fn title_case_capitalizes_each_word() {
        assert_eq!(title_case("new york"), "New York");
    }
}
