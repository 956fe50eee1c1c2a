// src/relevance.rs
//! Keyword relevance scoring and context snippets over ingested text.
//! Pure functions; the search endpoint consumes them against the canonical
//! news fields.

pub const DEFAULT_SNIPPET_LEN: usize = 150;

const TITLE_WEIGHT: f32 = 2.0;
const BODY_WEIGHT: f32 = 1.0;

/// Context kept on each side of the first keyword hit before the window is
/// widened to the nearest word boundary.
const SNIPPET_CONTEXT: usize = 50;

/// Case-insensitive keyword relevance: title hits weigh twice as much as
/// body hits.
pub fn score(keyword: &str, title: &str, body: &str) -> f32 {
    if keyword.is_empty() {
        return 0.0;
    }
    let needle = keyword.to_lowercase();
    let title_hits = title.to_lowercase().matches(needle.as_str()).count();
    let body_hits = body.to_lowercase().matches(needle.as_str()).count();
    TITLE_WEIGHT * title_hits as f32 + BODY_WEIGHT * body_hits as f32
}

/// A context window around the first keyword hit in `body`.
///
/// Without a hit the first `max_len` characters are returned, with an
/// ellipsis only when something was cut off. With a hit, the window is
/// widened outward to whitespace on both sides so no word is split, and
/// ellipses are affixed only on edges that stop short of the string bounds.
/// Char-indexed throughout; never slices inside a multi-byte character.
pub fn snippet(keyword: &str, body: &str, max_len: usize) -> String {
    let chars: Vec<char> = body.chars().collect();

    let Some((pos, kw_len)) = find_keyword(&chars, keyword) else {
        if chars.len() <= max_len {
            return body.to_string();
        }
        let head: String = chars[..max_len].iter().collect();
        return format!("{head}...");
    };

    let mut start = pos.saturating_sub(SNIPPET_CONTEXT);
    let mut end = (pos + kw_len + SNIPPET_CONTEXT).min(chars.len());

    while start > 0 && !chars[start].is_whitespace() {
        start -= 1;
    }
    while end < chars.len() && !chars[end].is_whitespace() {
        end += 1;
    }

    let mut out: String = chars[start..end].iter().collect();
    if start > 0 {
        out = format!("...{out}");
    }
    if end < chars.len() {
        out = format!("{out}...");
    }
    out
}

/// First case-insensitive occurrence of `keyword`, as a char offset plus
/// the keyword's char length.
fn find_keyword(chars: &[char], keyword: &str) -> Option<(usize, usize)> {
    let needle: Vec<char> = keyword.chars().map(fold_char).collect();
    if needle.is_empty() || needle.len() > chars.len() {
        return None;
    }
    for i in 0..=chars.len() - needle.len() {
        if chars[i..i + needle.len()]
            .iter()
            .map(|c| fold_char(*c))
            .eq(needle.iter().copied())
        {
            return Some((i, needle.len()));
        }
    }
    None
}

// Single-char case fold; identity for CJK.
fn fold_char(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}
