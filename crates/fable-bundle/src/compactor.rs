//! Slice compactor: lore text → token-bounded summary plus key points.
//!
//! Deterministic and purely textual. The compactor never increases the
//! estimated token count of the text it was given; the budget cascade relies
//! on that.

use fable_tokens::estimator::{CHARS_PER_TOKEN, estimate_text_tokens};

use crate::types::SliceView;

/// Most key points extracted from one slice.
const MAX_KEY_POINTS: usize = 5;

/// Compact one named lore slice to at most `max_tokens` of summary text.
///
/// Key points are the slice's own bullet lines (`-` or `*` prefixed), kept in
/// source order and excluded from the summary body so they are not counted
/// twice. The remaining prose becomes the summary, truncated at a character
/// boundary with a trailing ellipsis when it exceeds the ceiling.
#[must_use]
pub fn compact_slice(name: &str, text: &str, max_tokens: u64) -> SliceView {
    let mut key_points = Vec::new();
    let mut prose = String::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(point) = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "))
        {
            if key_points.len() < MAX_KEY_POINTS {
                key_points.push(point.trim().to_owned());
                continue;
            }
        }
        if !prose.is_empty() {
            prose.push(' ');
        }
        prose.push_str(trimmed);
    }

    SliceView {
        name: name.to_owned(),
        summary: truncate_to_tokens(prose.trim(), max_tokens),
        key_points,
    }
}

/// Truncate text so its token estimate fits `max_tokens`, ellipsis included.
#[must_use]
pub fn truncate_to_tokens(text: &str, max_tokens: u64) -> String {
    if estimate_text_tokens(text) <= max_tokens {
        return text.to_owned();
    }
    let budget_bytes = (max_tokens as usize).saturating_mul(CHARS_PER_TOKEN);
    // The ellipsis is 3 bytes in UTF-8; reserve them.
    let keep = budget_bytes.saturating_sub(3);
    let cut = text
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= keep)
        .last()
        .unwrap_or(0);
    format!("{}…", &text[..cut])
}
