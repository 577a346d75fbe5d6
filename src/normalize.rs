use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static WORD_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[a-z]").expect("valid regex"));

/// Join key used across datasets: trimmed, lowercased, NFC, whitespace runs
/// collapsed to a single `_`.
///
/// `normalize_name(normalize_name(s)) == normalize_name(s)` for every input.
pub fn normalize_name(s: &str) -> String {
    let lowered = s.trim().to_lowercase().nfc().collect::<String>();
    WHITESPACE_RUN.replace_all(lowered.trim(), "_").into_owned()
}

/// Display label from a snake-ish key: `"time_saved"` -> `"Time Saved"`.
pub fn humanize(s: &str) -> String {
    let spaced = s.trim().replace('_', " ");
    WORD_START
        .replace_all(&spaced, |c: &regex::Captures| c[0].to_uppercase())
        .into_owned()
}
