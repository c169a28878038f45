//! Topic filter and binding key matching
//!
//! Pub/sub filters use `/` separated levels where `+` matches exactly one
//! level and a trailing `#` matches all remaining levels (including none).
//!
//! Exchange binding keys use `.` separated words where `*` matches exactly
//! one word and `#` matches zero or more words anywhere in the key.

use super::{TransportError, TransportResult};

/// Check that a pub/sub filter is well formed
pub fn validate_filter(filter: &str) -> TransportResult<()> {
    let invalid = |reason: &str| TransportError::InvalidPattern {
        pattern: filter.to_string(),
        reason: reason.to_string(),
    };

    if filter.is_empty() {
        return Err(invalid("filter is empty"));
    }

    let levels: Vec<&str> = filter.split('/').collect();
    for (i, level) in levels.iter().enumerate() {
        if level.contains('#') && (*level != "#" || i != levels.len() - 1) {
            return Err(invalid("'#' must be the whole last level"));
        }
        if level.contains('+') && *level != "+" {
            return Err(invalid("'+' must be a whole level"));
        }
    }
    Ok(())
}

/// Whether `topic` matches the pub/sub `filter`
pub fn filter_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {},
            (Some(f), Some(t)) if f == t => {},
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Whether `routing_key` matches the exchange `binding`
pub fn binding_matches(binding: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = binding.split('.').collect();
    let words: Vec<&str> = routing_key.split('.').collect();
    match_words(&pattern, &words)
}

fn match_words(pattern: &[&str], words: &[&str]) -> bool {
    match pattern.split_first() {
        None => words.is_empty(),
        Some((&"#", rest)) => (0..=words.len()).any(|skip| match_words(rest, &words[skip..])),
        Some((&"*", rest)) => !words.is_empty() && match_words(rest, &words[1..]),
        Some((word, rest)) => words.first() == Some(word) && match_words(rest, &words[1..]),
    }
}

/// Longest literal prefix of a pub/sub filter, usable as a Redis glob
///
/// `drones/#` becomes `drones/*`; `drones/+/dados` becomes `drones/*` and
/// the exact match is done client-side with [`filter_matches`].
pub fn filter_to_glob(filter: &str) -> String {
    let mut literal = Vec::new();
    for level in filter.split('/') {
        if level == "#" || level == "+" {
            return glob_with_prefix(&literal, '/');
        }
        literal.push(level);
    }
    escape_glob(filter)
}

/// Longest literal prefix of a binding key, usable as a Redis glob
pub fn binding_to_glob(binding: &str) -> String {
    let mut literal = Vec::new();
    for word in binding.split('.') {
        if word == "#" || word == "*" {
            return glob_with_prefix(&literal, '.');
        }
        literal.push(word);
    }
    escape_glob(binding)
}

fn glob_with_prefix(literal: &[&str], separator: char) -> String {
    if literal.is_empty() {
        "*".to_string()
    } else {
        format!("{}{}*", escape_glob(&literal.join(&separator.to_string())), separator)
    }
}

/// Escape Redis glob metacharacters
pub fn escape_glob(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
