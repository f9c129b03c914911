//! Cyclomatic complexity estimate for context snippets.
//!
//! Counts branch tokens over the snippet text: one plus the number of
//! decision points. Language-neutral on purpose, since snippets may come
//! from any file the retrieval engine indexed.

use std::sync::OnceLock;

use regex::Regex;

use pipeline_contracts::Complexity;

fn branch_tokens() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(if|elif|for|while|case|when|match|catch|except)\b|&&|\|\|")
            .expect("valid literal pattern")
    })
}

/// Estimated cyclomatic complexity of a snippet; `None` when there is
/// nothing to analyse.
pub fn cyclomatic(snippet: &str) -> Option<u32> {
    if snippet.trim().is_empty() {
        return None;
    }
    Some(1 + branch_tokens().find_iter(snippet).count() as u32)
}

/// Maps the estimate onto the task label. Analyser misses land on
/// `Moderate`, the safe middle.
pub fn label(snippet: &str) -> Complexity {
    match cyclomatic(snippet) {
        Some(c) if c <= 5 => Complexity::Trivial,
        Some(c) if c <= 10 => Complexity::Moderate,
        Some(_) => Complexity::Complex,
        None => Complexity::Moderate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_code_is_trivial() {
        assert_eq!(label("def hello(): return 'world'"), Complexity::Trivial);
    }

    #[test]
    fn nested_branches_stay_at_most_moderate() {
        let snippet = "def process(data):\n    if data:\n        for item in data:\n            if item > 0:\n                print(item)\n    return data";
        let got = label(snippet);
        assert!(matches!(got, Complexity::Trivial | Complexity::Moderate));
    }

    #[test]
    fn branch_heavy_code_is_complex() {
        let snippet = "if a and b:\n    pass\nelif c || d:\n    pass\nwhile x:\n    if y && z:\n        pass\n    for i in r:\n        if q:\n            pass\n        elif w:\n            pass\n        except e:\n            pass\ncase 1: match m: when n:";
        assert_eq!(label(snippet), Complexity::Complex);
    }

    #[test]
    fn empty_snippet_defaults_to_moderate() {
        assert_eq!(label(""), Complexity::Moderate);
        assert_eq!(label("   \n "), Complexity::Moderate);
    }
}
