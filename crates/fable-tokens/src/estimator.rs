//! Token estimation.
//!
//! Pure functions estimating token counts from text and JSON values, using a
//! chars/4 approximation over the serialized form. No external tokenizer.
//!
//! Two properties the budget cascade depends on:
//!
//! - **Determinism** — the same value always estimates the same count.
//! - **Monotonicity** — a larger serialized payload never estimates lower
//!   than a smaller one, so staged trimming provably converges or exhausts.

use serde::Serialize;
use serde_json::Value;

/// Approximate characters per token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Shorthand for chars → tokens conversion.
#[must_use]
pub fn chars_to_tokens(chars: usize) -> u64 {
    chars.div_ceil(CHARS_PER_TOKEN) as u64
}

/// Estimate tokens for a plain string.
#[must_use]
pub fn estimate_text_tokens(text: &str) -> u64 {
    chars_to_tokens(text.len())
}

/// Estimate tokens for an arbitrary JSON value.
///
/// Measures the compact serialized form, so structural overhead (keys,
/// brackets, quoting) is counted the way the wire payload will carry it.
#[must_use]
pub fn estimate_value_tokens(value: &Value) -> u64 {
    chars_to_tokens(value.to_string().len())
}

/// Estimate tokens for any serializable document.
///
/// Values that fail to serialize estimate as 0 — they will also fail to
/// reach the wire, so counting them would only inflate the budget.
#[must_use]
pub fn estimate_json_tokens<T: Serialize>(doc: &T) -> u64 {
    serde_json::to_string(doc).map_or(0, |s| chars_to_tokens(s.len()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn empty_text_is_zero() {
        assert_eq!(estimate_text_tokens(""), 0);
    }

    #[test]
    fn rounds_up() {
        assert_eq!(estimate_text_tokens("a"), 1);
        assert_eq!(estimate_text_tokens("abcd"), 1);
        assert_eq!(estimate_text_tokens("abcde"), 2);
    }

    #[test]
    fn value_estimate_counts_structure() {
        // `{"k":"vv"}` is 10 chars → 3 tokens.
        assert_eq!(estimate_value_tokens(&json!({"k": "vv"})), 3);
    }

    #[test]
    fn typed_and_value_estimates_agree() {
        let value = json!({"name": "Vhelm", "cast": ["a", "b"]});
        assert_eq!(estimate_value_tokens(&value), estimate_json_tokens(&value));
    }

    proptest! {
        #[test]
        fn text_monotone_under_append(base in ".*", suffix in ".*") {
            let longer = format!("{base}{suffix}");
            prop_assert!(estimate_text_tokens(&longer) >= estimate_text_tokens(&base));
        }

        #[test]
        fn array_monotone_under_extension(xs in proptest::collection::vec(0i64..1000, 0..20), extra in 0i64..1000) {
            let shorter = json!(xs);
            let mut extended = xs.clone();
            extended.push(extra);
            let longer = json!(extended);
            prop_assert!(estimate_value_tokens(&longer) >= estimate_value_tokens(&shorter));
        }

        #[test]
        fn estimate_is_deterministic(s in ".*") {
            prop_assert_eq!(estimate_text_tokens(&s), estimate_text_tokens(&s));
        }
    }
}
