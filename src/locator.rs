//! Entry-point Locator
//!
//! Chooses which definition in a preview module is the component to render.
//! The ahead-of-time choice works over classified declarations; the runtime
//! plan is the ordered list of lookups the sandbox performs against the
//! executed module's scope.

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// DECLARATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// How a candidate entry point was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeclarationKind {
    /// `export default function Name` (or a named default class, or a
    /// default export of an identifier bound to a function).
    DefaultFunction,
    /// Default export of any other value, bound to a name.
    DefaultConst,
    /// Top-level `function Name`.
    TopLevelFunction,
    /// Top-level `const Name = () => ...` and wrapped forms like `memo(...)`.
    TopLevelConst,
}

impl DeclarationKind {
    /// Dispatch order, highest priority first.
    pub const PRIORITY: [DeclarationKind; 4] = [
        DeclarationKind::DefaultFunction,
        DeclarationKind::DefaultConst,
        DeclarationKind::TopLevelFunction,
        DeclarationKind::TopLevelConst,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Declaration {
    pub kind: DeclarationKind,
    pub name: String,
    /// Byte offset of the declaring statement; orders declarations of one kind.
    pub offset: usize,
}

impl Declaration {
    pub fn new(kind: DeclarationKind, name: &str, offset: usize) -> Self {
        Declaration {
            kind,
            name: name.to_string(),
            offset,
        }
    }
}

/// Picks the entry point: the first kind in [`DeclarationKind::PRIORITY`] with
/// any declaration wins, and within a kind the earliest in source order.
///
/// Several top-level functions resolve to the first one written. No attempt is
/// made to guess which of them was meant as the entry.
pub fn locate(declarations: &[Declaration]) -> Option<&Declaration> {
    DeclarationKind::PRIORITY.iter().find_map(|kind| {
        declarations
            .iter()
            .filter(|d| d.kind == *kind)
            .min_by_key(|d| d.offset)
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// RUNTIME PLAN
// ═══════════════════════════════════════════════════════════════════════════════

/// Names recovered lexically from the source as submitted, before any rewrite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceHints {
    pub default_function: Option<String>,
    pub default_const: Option<String>,
}

/// One lookup the sandbox performs after the module has executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "camelCase")]
pub enum LocateStrategy {
    ConventionalNames { names: Vec<String> },
    Candidate { name: String },
    DefaultFunction { name: String },
    DefaultConst { name: String },
    /// First `function <Ident>` occurrence in the executed module text.
    FunctionScan,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocatorPlan {
    pub strategies: Vec<LocateStrategy>,
}

impl LocatorPlan {
    pub fn build(conventional: &[String], candidate: Option<&str>, hints: &SourceHints) -> Self {
        let mut strategies = Vec::with_capacity(5);
        if !conventional.is_empty() {
            strategies.push(LocateStrategy::ConventionalNames {
                names: conventional.to_vec(),
            });
        }
        if let Some(name) = candidate {
            strategies.push(LocateStrategy::Candidate {
                name: name.to_string(),
            });
        }
        if let Some(name) = &hints.default_function {
            strategies.push(LocateStrategy::DefaultFunction { name: name.clone() });
        }
        if let Some(name) = &hints.default_const {
            strategies.push(LocateStrategy::DefaultConst { name: name.clone() });
        }
        strategies.push(LocateStrategy::FunctionScan);
        LocatorPlan { strategies }
    }
}
