//! Module Rewriter
//!
//! Turns validated preview source into a classic script the sandbox can run:
//! module syntax is stripped, local re-declarations of capability names are
//! neutralised, and a guarded registration block exposes the module's
//! top-level bindings to the preview registry.
//!
//! **Line preservation**: every removal keeps its newlines, so compiler errors
//! inside the sandbox point at the submitted source lines.
//!
//! **Idempotence**: `rewrite(rewrite(x).code).code == rewrite(x).code`. The
//! registration block records the candidate it was built for, and a second
//! run replaces the block instead of stacking another one.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::capability;
use crate::locator::{self, LocatorPlan, SourceHints};
use crate::outline::{self, apply_edits, blank, Edit, ModuleOutline, Strategy, TextSpan};

const REGISTRATION_MARKER: &str = "/* @preview-registration";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformedModule {
    pub code: String,
    pub candidate_name: Option<String>,
    pub neutralized_names: BTreeSet<String>,
    /// Top-level names the registration block hands to the registry.
    pub exposed_names: Vec<String>,
    /// Capitalised names the code reads that nothing will define.
    pub unresolved: Vec<String>,
    pub hints: SourceHints,
}

impl TransformedModule {
    pub fn locator_plan(&self, conventional: &[String]) -> LocatorPlan {
        LocatorPlan::build(conventional, self.candidate_name.as_deref(), &self.hints)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PATTERNS
// ═══════════════════════════════════════════════════════════════════════════════

lazy_static! {
    static ref PRAGMA_RE: Regex =
        Regex::new(r#"^\s*['"]use (?:client|server)['"][ \t]*;?[ \t]*"#).unwrap();

    static ref REGISTRATION_RE: Regex = Regex::new(
        r"(?m)^/\* @preview-registration(?: entry=([A-Za-z_$][\w$]*))? \*/"
    )
    .unwrap();

    /// Targeted import forms, applied in order.
    static ref IMPORT_PATTERNS: Vec<Regex> = vec![
        // default, named, namespace and type-only, including multi-line braces
        Regex::new(r#"(?m)^[ \t]*import\s+(?:type\s+)?[\w$*{},\s]*?\bfrom\s*['"][^'"\n]*['"][ \t]*;?"#).unwrap(),
        // side-effect only
        Regex::new(r#"(?m)^[ \t]*import\s*['"][^'"\n]*['"][ \t]*;?"#).unwrap(),
        // TypeScript namespace alias
        Regex::new(r"(?m)^[ \t]*import\s+[\w$]+\s*=\s*[\w$.]+[ \t]*;?").unwrap(),
    ];

    /// Anything still shaped like an import statement.
    static ref IMPORT_LINE_RE: Regex = Regex::new(r#"^\s*import\s*[\w$*{'"]"#).unwrap();

    static ref EXPORT_LIST_RE: Regex = Regex::new(
        r#"(?m)^[ \t]*export\s+(?:type\s+)?\{[^}]*\}(?:\s*from\s*['"][^'"\n]*['"])?[ \t]*;?"#
    )
    .unwrap();
    static ref EXPORT_ALL_RE: Regex = Regex::new(
        r#"(?m)^[ \t]*export\s*\*(?:\s*as\s+[\w$]+)?\s*from\s*['"][^'"\n]*['"][ \t]*;?"#
    )
    .unwrap();
    static ref EXPORT_ASSIGN_RE: Regex =
        Regex::new(r"(?m)^[ \t]*export\s*=[^;\n]*;?").unwrap();
    static ref EXPORT_DECL_RE: Regex = Regex::new(
        r"(?m)^([ \t]*)export[ \t]+(?:default[ \t]+)?((?:async[ \t]+)?(?:function|class|const|let|var|type|interface|enum|abstract|declare)\b)"
    )
    .unwrap();
    static ref EXPORT_DEFAULT_IDENT_RE: Regex =
        Regex::new(r"(?m)^([ \t]*)export[ \t]+default[ \t]+([A-Za-z_$][\w$]*[ \t]*;?[ \t]*)$").unwrap();
    static ref EXPORT_DEFAULT_EXPR_RE: Regex =
        Regex::new(r"(?m)^([ \t]*)export[ \t]+default[ \t]+").unwrap();

    /// Residual module syntax caught by the final sweep.
    static ref MODULE_LINE_RE: Regex =
        Regex::new(r#"^\s*(?:import|export)(?:\s|[{*'"]|$)"#).unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASSES
// ═══════════════════════════════════════════════════════════════════════════════

/// Splits off a registration block left by an earlier run. Returns the body
/// and, when a block was present, the candidate it recorded.
fn strip_registration(text: &str) -> (&str, Option<Option<String>>) {
    match REGISTRATION_RE.captures(text) {
        Some(caps) => {
            let start = caps.get(0).map_or(text.len(), |m| m.start());
            let entry = caps.get(1).map(|m| m.as_str().to_string());
            (&text[..start], Some(entry))
        }
        None => (text, None),
    }
}

fn strip_pragma(text: &str) -> String {
    match PRAGMA_RE.find(text) {
        Some(m) => {
            let mut out = blank(m.as_str());
            out.push_str(&text[m.end()..]);
            out
        }
        None => text.to_string(),
    }
}

fn blank_matches(text: &str, re: &Regex) -> String {
    re.replace_all(text, |caps: &Captures| blank(&caps[0])).into_owned()
}

fn blank_lines_matching(text: &str, re: &Regex) -> String {
    text.split('\n')
        .map(|line| if re.is_match(line) { "" } else { line })
        .collect::<Vec<_>>()
        .join("\n")
}

fn strip_imports(text: &str) -> String {
    let outline = ModuleOutline::of(text);
    let edits: Vec<Edit> = outline
        .imports
        .iter()
        .map(|span| Edit {
            span: *span,
            replacement: blank(&text[span.start..span.end]),
        })
        .collect();
    let mut out = apply_edits(text, &edits);
    for re in IMPORT_PATTERNS.iter() {
        out = blank_matches(&out, re);
    }
    blank_lines_matching(&out, &IMPORT_LINE_RE)
}

fn strip_exports(text: &str, outline: &ModuleOutline) -> String {
    let mut out = match outline.strategy {
        Strategy::Syntax => apply_edits(text, &outline.export_edits),
        Strategy::Lexical => text.to_string(),
    };
    out = blank_matches(&out, &EXPORT_LIST_RE);
    out = blank_matches(&out, &EXPORT_ALL_RE);
    out = blank_matches(&out, &EXPORT_ASSIGN_RE);
    out = EXPORT_DECL_RE.replace_all(&out, "${1}${2}").into_owned();
    out = EXPORT_DEFAULT_IDENT_RE.replace_all(&out, "${1}${2}").into_owned();
    EXPORT_DEFAULT_EXPR_RE
        .replace_all(&out, format!("${{1}}const {} = ", outline::SYNTHETIC_DEFAULT).as_str())
        .into_owned()
}

fn neutralization_comment(name: &str, original: &str) -> String {
    format!(
        "/* preview: removed local declaration shadowing {}{} */",
        name,
        blank(original)
    )
}

/// Replaces top-level declarations of capability names with a comment of the
/// same line count. The candidate itself is never neutralised.
fn neutralize(text: &str, candidate: Option<&str>) -> (String, BTreeSet<String>) {
    let outline = ModuleOutline::of(text);
    let mut names = BTreeSet::new();
    let mut edits = Vec::new();
    let mut claimed: Vec<TextSpan> = Vec::new();

    for binding in &outline.bindings {
        if Some(binding.name.as_str()) == candidate || !capability::is_capability(&binding.name) {
            continue;
        }
        if !binding.sole {
            tracing::warn!(
                target: "preview",
                name = %binding.name,
                "capability name declared alongside other names; left in place"
            );
            continue;
        }
        let span = binding.statement;
        if claimed.iter().any(|c| c.start < span.end && span.start < c.end) {
            continue;
        }
        claimed.push(span);
        names.insert(binding.name.clone());
        edits.push(Edit {
            span,
            replacement: neutralization_comment(&binding.name, &text[span.start..span.end]),
        });
    }

    if !names.is_empty() {
        tracing::debug!(target: "preview", names = ?names, "neutralized shadowing declarations");
    }
    (apply_edits(text, &edits), names)
}

fn registration_block(names: &[String], candidate: Option<&str>) -> String {
    let mut block = String::from(REGISTRATION_MARKER);
    if let Some(name) = candidate {
        block.push_str(" entry=");
        block.push_str(name);
    }
    block.push_str(" */\n;(function (registry) {\n  if (!registry) return;\n");
    for name in names {
        block.push_str(&format!(
            "  try {{ if (typeof {0} !== \"undefined\") registry.expose(\"{0}\", {0}); }} catch (_) {{}}\n",
            name
        ));
    }
    if let Some(name) = candidate {
        block.push_str(&format!(
            "  try {{ if (typeof {0} !== \"undefined\") registry.nominate(\"{0}\"); }} catch (_) {{}}\n",
            name
        ));
    }
    block.push_str(
        "})(typeof window !== \"undefined\" ? window.__PREVIEW_REGISTRY__ : undefined);\n",
    );
    block
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// Rewrites validated preview source. Never fails: anything the passes do not
/// recognise is left for the sandbox compiler to report.
pub fn rewrite(source: &str) -> TransformedModule {
    let (body, recorded) = strip_registration(source);

    let text = strip_pragma(body);
    let hints = outline::lexical_hints(&text);
    let text = strip_imports(&text);

    let outline = ModuleOutline::of(&text);
    let candidate_name = match recorded {
        Some(entry) => entry,
        None => locator::locate(&outline.declarations).map(|d| d.name.clone()),
    };
    tracing::debug!(
        target: "preview",
        strategy = ?outline.strategy,
        candidate = ?candidate_name,
        "entry point located"
    );

    let text = strip_exports(&text, &outline);
    let (text, neutralized_names) = neutralize(&text, candidate_name.as_deref());
    let text = blank_lines_matching(&text, &MODULE_LINE_RE);

    let final_outline = ModuleOutline::of(&text);
    let exposed_names = final_outline.binding_names();
    let unresolved: Vec<String> = final_outline
        .references
        .iter()
        .filter(|name| !final_outline.local_names.contains(*name) && !capability::is_provided(name))
        .cloned()
        .collect();
    if !unresolved.is_empty() {
        tracing::warn!(target: "preview", names = ?unresolved, "references nothing in the sandbox defines");
    }

    let mut code = text.trim_end().to_string();
    code.push_str("\n\n");
    code.push_str(&registration_block(&exposed_names, candidate_name.as_deref()));

    TransformedModule {
        code,
        candidate_name,
        neutralized_names,
        exposed_names,
        unresolved,
        hints,
    }
}
