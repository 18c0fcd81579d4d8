//! Prompt normalization, hashing, and the response quality proxy.

use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};

/// Weight of lexical diversity in the quality proxy.
const DIVERSITY_WEIGHT: f64 = 0.6;

/// Weight of the length score in the quality proxy.
const LENGTH_WEIGHT: f64 = 0.4;

/// Character count at which the length score saturates.
const LENGTH_SATURATION: f64 = 1000.0;

fn word_regex() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"\w+").expect("static regex is valid"))
}

/// Trim the input and collapse every whitespace run to a single space.
pub fn normalize(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase hex SHA-256 digest of the UTF-8 bytes of `s`.
pub fn sha256_hex(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Unique word count divided by total word count, over case-folded `\w+` tokens.
///
/// Returns 0.0 when the text contains no word tokens.
pub fn type_token_ratio(s: &str) -> f64 {
    let lowered = s.to_lowercase();
    let tokens: Vec<&str> = word_regex()
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .collect();

    if tokens.is_empty() {
        return 0.0;
    }

    let mut unique = tokens.clone();
    unique.sort_unstable();
    unique.dedup();

    unique.len() as f64 / tokens.len() as f64
}

/// Heuristic quality score in `[0, 1]` blending lexical diversity and length.
pub fn quality_proxy(text: &str) -> f64 {
    let diversity = type_token_ratio(text);
    let length_score = (text.chars().count() as f64 / LENGTH_SATURATION).min(1.0);
    round_to(DIVERSITY_WEIGHT * diversity + LENGTH_WEIGHT * length_score, 4)
}

/// Round `value` to `places` decimal places, ties to even.
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round_ties_even() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize("  hello \t\n  world  "), "hello world");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize(" \n\t "), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "",
            "plain",
            "  leading",
            "trailing  ",
            "a\u{00a0}b  c\r\nd",
            "Explain   the concept\tof transformers.\n\n",
        ];
        for s in samples {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", s);
        }
    }

    #[test]
    fn test_sha256_hex_known_value() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(sha256_hex("hi").len(), 64);
    }

    #[test]
    fn test_type_token_ratio() {
        assert_eq!(type_token_ratio(""), 0.0);
        assert_eq!(type_token_ratio("!!! ..."), 0.0);
        assert_eq!(type_token_ratio("a b c d"), 1.0);
        assert_eq!(type_token_ratio("The the THE cat"), 0.5);
    }

    #[test]
    fn test_quality_proxy_empty_is_zero() {
        assert_eq!(quality_proxy(""), 0.0);
    }

    #[test]
    fn test_quality_proxy_short_response() {
        // "Response: hi" -> 2 unique of 2 tokens, 12 chars
        let expected = round_to(0.6 * 1.0 + 0.4 * 0.012, 4);
        assert_eq!(quality_proxy("Response: hi"), expected);
        assert_eq!(quality_proxy("Response: hi"), 0.6048);
    }

    #[test]
    fn test_quality_proxy_bounded() {
        let long = "word ".repeat(2000);
        let q = quality_proxy(&long);
        assert!((0.0..=1.0).contains(&q));
        // Length score saturates, diversity is tiny
        assert!(q > 0.4 && q < 0.41);

        let rich: String = (0..400).map(|i| format!("w{} ", i)).collect();
        assert!(quality_proxy(&rich) <= 1.0);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(0.123456789, 6), 0.123457);
        assert_eq!(round_to(0.00004, 4), 0.0);
    }

    #[test]
    fn test_round_to_ties_even() {
        assert_eq!(round_to(0.0000005, 6), 0.0);
        assert_eq!(round_to(2.5, 0), 2.0);
        assert_eq!(round_to(3.5, 0), 4.0);
    }
}
