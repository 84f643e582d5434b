//! Caller-contract helpers.
//!
//! Upstream callers usually hold a chat response rather than bare source.
//! These helpers pull the component out of its markdown fence and run the
//! superficial "does this look like a component" check. The render entry
//! points never depend on them and re-validate everything themselves.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref FENCE_RE: Regex = Regex::new(
        r"(?ms)^[ \t]*```[ \t]*(tsx|jsx|typescript|javascript|ts|js)\b[^\n]*\n(.*?)^[ \t]*```"
    )
    .unwrap();

    static ref COMPONENT_MARKER_RE: Regex = Regex::new(
        r#"(?m)^\s*(?:['"]use client['"]|import\b|export\b)|\bfunction\s+[A-Z]"#
    )
    .unwrap();
}

/// First `tsx`/`jsx`/`ts`/`js` fenced block, or the whole text when there is none.
pub fn extract_component_source(markdown: &str) -> &str {
    match FENCE_RE.captures(markdown).and_then(|c| c.get(2)) {
        Some(body) => body.as_str(),
        None => markdown,
    }
}

pub fn looks_like_component(text: &str) -> bool {
    COMPONENT_MARKER_RE.is_match(text)
}
