//! Value normalization for record-store comparison. Both sides of every diff
//! go through the same normalization so formatting noise never shows up as
//! a proposed change.

use crate::config::FieldKind;
use crate::dates;
use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref NON_DIGIT_RE: Regex = Regex::new(r"[^0-9]").unwrap();
}

/// Normalize one value according to its field kind.
pub fn normalize_value(value: &str, kind: FieldKind) -> String {
    match kind {
        FieldKind::Text => normalize_text(value),
        // Unparseable dates fall back to text normalization so a garbled
        // value still diffs deterministically.
        FieldKind::Date => dates::canonicalize(value).unwrap_or_else(|| normalize_text(value)),
        FieldKind::Phone | FieldKind::Identifier => digits_only(value),
    }
}

/// Case-folded, NFKD-normalized, punctuation stripped, whitespace collapsed.
pub fn normalize_text(value: &str) -> String {
    value
        .nfkd()
        .collect::<String>()
        .to_lowercase()
        .replace(|c: char| !c.is_alphanumeric() && c != ' ', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Keep digits only; identifiers and phone numbers compare on digits alone.
pub fn digits_only(value: &str) -> String {
    NON_DIGIT_RE.replace_all(value, "").to_string()
}
