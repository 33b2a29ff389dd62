//! Cosmetic topic labels derived from a finished turn.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9]+").expect("valid regex"));

/// Pick the longest word shared by both texts (case-insensitive).
///
/// Ties go to the word that appears first in `user_text`. Runs of
/// characters outside `[a-zA-Z0-9]` become a single underscore.
pub fn extract_topic(user_text: &str, assistant_text: &str) -> Option<String> {
    let user_text = user_text.to_lowercase();
    let assistant_text = assistant_text.to_lowercase();
    let assistant_words: HashSet<&str> = assistant_text.split_whitespace().collect();

    let mut best: Option<&str> = None;
    for word in user_text.split_whitespace() {
        if !assistant_words.contains(word) {
            continue;
        }
        let longer = match best {
            Some(current) => word.chars().count() > current.chars().count(),
            None => true,
        };
        if longer {
            best = Some(word);
        }
    }

    best.map(|word| NON_ALNUM.replace_all(word, "_").into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_longest_common_word() {
        assert_eq!(extract_topic("hello world", "world peace"), Some("world".to_string()));
        assert_eq!(
            extract_topic("tell me about rust ownership", "Ownership in Rust means"),
            Some("ownership".to_string())
        );
    }

    #[test]
    fn none_without_common_words() {
        assert_eq!(extract_topic("abc", "xyz"), None);
        assert_eq!(extract_topic("", "anything"), None);
    }

    #[test]
    fn case_is_ignored() {
        assert_eq!(extract_topic("PYTHON", "python"), Some("python".to_string()));
    }

    #[test]
    fn punctuation_runs_become_one_underscore() {
        assert_eq!(
            extract_topic("what is c++/cli?", "c++/cli? is a dialect"),
            Some("c_cli_".to_string())
        );
    }

    #[test]
    fn ties_go_to_first_user_word() {
        assert_eq!(extract_topic("cats dogs", "dogs cats"), Some("cats".to_string()));
    }
}
