//! Text normalization for comparison and identity-key derivation
//!
//! Normalized text is what duplicate detection and key hashing see, so the
//! rules must stay deterministic: lowercase, Unicode NFKD with combining
//! marks stripped, whitespace runs collapsed to single spaces (leading and
//! trailing whitespace falls out of the collapse), and optionally runs of
//! three or more identical characters collapsed to one ("aaasem" becomes
//! "asem"). Doubled characters are left alone so spellings like "aaron"
//! survive.

use sha2::{Digest, Sha256};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalize a text value for comparison and key derivation.
pub fn normalize_text(value: &str, collapse_repeats: bool) -> String {
    let folded: String = value
        .to_lowercase()
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect();

    let collapsed = folded.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapse_repeats {
        collapse_char_runs(&collapsed)
    } else {
        collapsed
    }
}

/// Collapse runs of three or more identical characters down to one.
fn collapse_char_runs(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(ch) = chars.next() {
        let mut run = 1usize;
        while chars.peek() == Some(&ch) {
            chars.next();
            run += 1;
        }
        if run >= 3 {
            out.push(ch);
        } else {
            for _ in 0..run {
                out.push(ch);
            }
        }
    }

    out
}

/// SHA-256 hex digest of a string.
pub fn content_hash(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_lowercases_and_strips_accents() {
        assert_eq!(normalize_text("  Michaël  ", false), "michael");
    }

    #[test]
    fn collapses_interior_whitespace() {
        assert_eq!(normalize_text("hello \t  world\n", false), "hello world");
    }

    #[test]
    fn already_normalized_text_is_unchanged() {
        assert_eq!(normalize_text("plain text", false), "plain text");
    }

    #[test]
    fn repeat_collapse_is_opt_in() {
        assert_eq!(normalize_text("aaasem", false), "aaasem");
        assert_eq!(normalize_text("aaasem", true), "asem");
    }

    #[test]
    fn repeat_collapse_leaves_doubled_characters_alone() {
        assert_eq!(normalize_text("aabbcc", true), "aabbcc");
        assert_eq!(normalize_text("aaron lloyd", true), "aaron lloyd");
        assert_eq!(normalize_text("heyyyy", true), "hey");
    }

    #[test]
    fn empty_and_whitespace_only_become_empty() {
        assert_eq!(normalize_text("", false), "");
        assert_eq!(normalize_text("   \t ", false), "");
    }

    #[test]
    fn content_hash_is_stable_and_distinct() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("abc").len(), 64);
    }
}
