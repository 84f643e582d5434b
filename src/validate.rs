//! Source Validator
//!
//! Static gate run before anything else touches preview source. It rejects
//! unsafe call/API shapes and sources without an exported definition. The
//! gate blocks careless code, it is not a security boundary.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// INVARIANT CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const INV_DYNAMIC_EVAL: &str = "PV-ERR-UNSAFE-001";
pub const INV_FUNCTION_CONSTRUCTOR: &str = "PV-ERR-UNSAFE-002";
pub const INV_DOCUMENT_MUTATION: &str = "PV-ERR-UNSAFE-003";
pub const INV_NAVIGATION: &str = "PV-ERR-UNSAFE-004";
pub const INV_MODULE_LOADING: &str = "PV-ERR-UNSAFE-005";
pub const INV_MISSING_ENTRY: &str = "PV-ERR-ENTRY-001";
pub const INV_INVALID_OPTIONS: &str = "PV-ERR-OPTIONS-001";

// ═══════════════════════════════════════════════════════════════════════════════
// GUARANTEES
// ═══════════════════════════════════════════════════════════════════════════════

fn get_guarantee(code: &str) -> &'static str {
    match code {
        INV_DYNAMIC_EVAL => "Preview source never evaluates strings as code.",
        INV_FUNCTION_CONSTRUCTOR => "Preview source never constructs functions from strings.",
        INV_DOCUMENT_MUTATION => {
            "Preview source renders through the mount point and never rewrites the page document."
        }
        INV_NAVIGATION => "Preview source never navigates the page it is embedded in.",
        INV_MODULE_LOADING => {
            "Preview source is a single self-contained definition and loads no modules at runtime."
        }
        INV_MISSING_ENTRY => "Every preview source exports the definition that is rendered.",
        INV_INVALID_OPTIONS => "Preview options describe a mountable, bounded sandbox.",
        _ => "Unknown invariant.",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Deterministic, pre-execution rejection of a preview source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("[{code}] {message}")]
pub struct ValidationError {
    pub code: String,
    /// Name of the violated rule, e.g. `eval()`.
    pub rule: String,
    pub message: String,
    pub guarantee: String,
    pub line: u32,
    pub column: u32,
    pub context: Option<String>,
    pub hints: Vec<String>,
}

impl ValidationError {
    pub fn new(code: &str, rule: &str, message: &str, line: u32, column: u32) -> Self {
        Self::with_details(code, rule, message, line, column, None, vec![])
    }

    pub fn with_details(
        code: &str,
        rule: &str,
        message: &str,
        line: u32,
        column: u32,
        context: Option<String>,
        hints: Vec<String>,
    ) -> Self {
        ValidationError {
            code: code.to_string(),
            rule: rule.to_string(),
            message: message.to_string(),
            guarantee: get_guarantee(code).to_string(),
            line,
            column,
            context,
            hints,
        }
    }
}

/// Error returned by the render entry points.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PreviewError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("[PV-ERR-OPTIONS-001] invalid preview options: {0}")]
    InvalidOptions(String),
}

impl PreviewError {
    pub fn code(&self) -> &str {
        match self {
            PreviewError::Validation(e) => &e.code,
            PreviewError::InvalidOptions(_) => INV_INVALID_OPTIONS,
        }
    }
}

/// Data-model shape of a validation outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<&Result<(), ValidationError>> for ValidationResult {
    fn from(result: &Result<(), ValidationError>) -> Self {
        match result {
            Ok(()) => ValidationResult {
                ok: true,
                reason: None,
            },
            Err(e) => ValidationResult {
                ok: false,
                reason: Some(e.message.clone()),
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DENYLIST
// ═══════════════════════════════════════════════════════════════════════════════

pub struct UnsafePattern {
    pub code: &'static str,
    pub rule: &'static str,
    pub regex: Regex,
}

fn deny(code: &'static str, rule: &'static str, pattern: &str) -> UnsafePattern {
    UnsafePattern {
        code,
        rule,
        regex: Regex::new(pattern).unwrap(),
    }
}

lazy_static! {
    /// Checked in order; the first match names the rejection.
    pub static ref UNSAFE_PATTERNS: Vec<UnsafePattern> = vec![
        deny(INV_DYNAMIC_EVAL, "eval()", r"\beval\s*\("),
        deny(
            INV_DYNAMIC_EVAL,
            "string timer callback",
            r#"\bset(?:Timeout|Interval)\s*\(\s*['"`]"#,
        ),
        deny(INV_FUNCTION_CONSTRUCTOR, "new Function()", r"\bnew\s+Function\s*\("),
        deny(INV_FUNCTION_CONSTRUCTOR, "Function()", r"\bFunction\s*\("),
        deny(
            INV_DOCUMENT_MUTATION,
            "document.write()",
            r"\bdocument\s*\.\s*(?:write|writeln|open|close)\s*\(",
        ),
        deny(
            INV_DOCUMENT_MUTATION,
            "document markup assignment",
            r"\bdocument\s*\.\s*(?:body|head|documentElement)\s*\.\s*(?:inner|outer)HTML\s*=[^=]",
        ),
        deny(
            INV_NAVIGATION,
            "location assignment",
            r"\b(?:window|document|top|parent|self)\s*\.\s*location\b(?:\s*\.\s*href)?\s*=[^=]",
        ),
        deny(INV_NAVIGATION, "location.href assignment", r"\blocation\s*\.\s*href\s*=[^=]"),
        deny(
            INV_NAVIGATION,
            "location.assign()",
            r"\blocation\s*\.\s*(?:assign|replace|reload)\s*\(",
        ),
        deny(INV_NAVIGATION, "window.open()", r"\bwindow\s*\.\s*open\s*\("),
        deny(
            INV_NAVIGATION,
            "history navigation",
            r"\bhistory\s*\.\s*(?:pushState|replaceState|back|forward|go)\s*\(",
        ),
        deny(INV_MODULE_LOADING, "import()", r"\bimport\s*\("),
        deny(INV_MODULE_LOADING, "require()", r"\brequire\s*\("),
        deny(INV_MODULE_LOADING, "importScripts()", r"\bimportScripts\s*\("),
    ];

    /// A definition exported in place, or a local export list such as
    /// `export { Foo as default };`. Re-exports (`export { a } from "b"`) do
    /// not define anything and are not markers.
    static ref EXPORT_MARKER_RE: Regex = Regex::new(
        r"(?m)^[ \t]*export(?:\s+(?:default\b|(?:async\s+)?function\b|const\b|let\b|var\b|class\b)|\s*\{\s*[A-Za-z_$][^}]*\}[ \t]*(?:;|$))"
    )
    .unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// 1-based line and column of a byte offset.
pub fn line_col(text: &str, offset: usize) -> (u32, u32) {
    let prefix = &text[..offset.min(text.len())];
    let line = prefix.matches('\n').count() as u32 + 1;
    let column = match prefix.rfind('\n') {
        Some(nl) => prefix[nl + 1..].chars().count() as u32 + 1,
        None => prefix.chars().count() as u32 + 1,
    };
    (line, column)
}

fn context_line(text: &str, offset: usize) -> String {
    let start = text[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let end = text[offset..]
        .find('\n')
        .map(|i| offset + i)
        .unwrap_or(text.len());
    text[start..end].trim().to_string()
}

fn check_unsafe_patterns(source: &str) -> Result<(), ValidationError> {
    for pattern in UNSAFE_PATTERNS.iter() {
        if let Some(m) = pattern.regex.find(source) {
            let (line, column) = line_col(source, m.start());
            return Err(ValidationError::with_details(
                pattern.code,
                pattern.rule,
                &format!(
                    "Unsafe construct `{}` is not allowed in preview source (line {}).",
                    pattern.rule, line
                ),
                line,
                column,
                Some(context_line(source, m.start())),
                vec!["Remove the call; previews render through the mount point only.".to_string()],
            ));
        }
    }
    Ok(())
}

fn check_entry_marker(source: &str) -> Result<(), ValidationError> {
    if EXPORT_MARKER_RE.is_match(source) {
        return Ok(());
    }
    Err(ValidationError::with_details(
        INV_MISSING_ENTRY,
        "exported definition",
        "No exported definition found; preview source must export the component to render.",
        1,
        1,
        None,
        vec!["Declare the component as `export default function Name() { ... }`.".to_string()],
    ))
}

/// Runs the unsafe-pattern denylist, then the entry-marker check. Fails fast.
pub fn check_source(source: &str) -> Result<(), ValidationError> {
    let result = check_unsafe_patterns(source).and_then(|_| check_entry_marker(source));
    if let Err(e) = &result {
        tracing::warn!(target: "preview", code = %e.code, rule = %e.rule, line = e.line, "preview source rejected");
    }
    result
}

pub fn validate_source(source: &str) -> ValidationResult {
    ValidationResult::from(&check_source(source))
}
