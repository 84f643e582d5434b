//! # Preview Native
//!
//! Turns one untrusted, LLM-generated React/TSX component into a
//! self-contained host document that renders it inside an isolated browsing
//! context.
//!
//! ## Pipeline
//!
//! ```text
//! SourceText ─▶ validate ─▶ rewrite ─▶ assemble ─▶ HostDocument
//!                  │                                    │
//!                  └─ Err(PreviewError), no output      └─ supervisor runs in the sandbox
//! ```
//!
//! ## Guarantees
//!
//! 1. **Fail before output**: a source that trips the unsafe-pattern denylist
//!    or lacks an export marker produces an error and no document.
//! 2. **No module syntax**: the embedded code contains no `import`/`export`
//!    statements; the sandbox runs it as a classic script.
//! 3. **Deterministic**: the same source and options always produce the same
//!    document, byte for byte.
//! 4. **Guarded registration**: the names exposed to the preview registry are
//!    checked with `typeof` first, so a misdetected candidate cannot throw at
//!    load time.
//! 5. **Capabilities never clobber**: catalog primitives register only where
//!    the module left the name free, and local re-declarations of a catalog
//!    name are neutralised before that.

#[cfg(feature = "napi")]
use napi_derive::napi;

mod capability;
mod document;
mod extract;
mod locator;
mod options;
mod outline;
mod rewrite;
mod supervisor;
mod validate;

#[cfg(test)]
mod runtime_tests;

pub use capability::{
    capability_names, catalog, is_capability, Behavior, CapabilityCatalog, CapabilityEntry,
    CapabilityKind,
};
pub use document::{assemble_document, compute_digest, inspect_document, style_config, DocumentReport};
pub use extract::{extract_component_source, looks_like_component};
pub use locator::{DeclarationKind, LocateStrategy, LocatorPlan, SourceHints};
pub use options::{PreviewOptions, CONVENTIONAL_NAMES, MAX_VERIFY_ATTEMPTS};
pub use outline::SYNTHETIC_DEFAULT;
pub use rewrite::{rewrite, TransformedModule};
pub use supervisor::{MountAttempt, MountEvent, MountPhase, Transition, VerifySchedule};
pub use validate::*;

/// Renders `source` with the default options.
pub fn render_preview(source: &str) -> Result<String, PreviewError> {
    render_preview_with(source, &PreviewOptions::default())
}

pub fn render_preview_with(source: &str, options: &PreviewOptions) -> Result<String, PreviewError> {
    options.check()?;
    check_source(source)?;

    let module = rewrite(source);
    let html = assemble_document(&module, options);

    tracing::info!(
        target: "preview",
        digest = %compute_digest(&module.code),
        bytes = html.len(),
        candidate = ?module.candidate_name,
        "preview document assembled"
    );
    Ok(html)
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
fn to_napi_error(err: PreviewError) -> napi::Error {
    let reason = match &err {
        PreviewError::Validation(e) => serde_json::to_string(e).unwrap_or_else(|_| err.to_string()),
        PreviewError::InvalidOptions(_) => err.to_string(),
    };
    napi::Error::from_reason(reason)
}

/// `options` is a JSON object of [`PreviewOptions`]; omit it for defaults.
#[cfg(feature = "napi")]
#[napi]
pub fn render_preview_native(source: String, options: Option<String>) -> napi::Result<String> {
    let options = match options {
        Some(json) => PreviewOptions::from_json(&json).map_err(to_napi_error)?,
        None => PreviewOptions::default(),
    };
    render_preview_with(&source, &options).map_err(to_napi_error)
}

#[cfg(feature = "napi")]
#[napi]
pub fn validate_source_native(source: String) -> napi::Result<serde_json::Value> {
    serde_json::to_value(validate_source(&source)).map_err(|e| napi::Error::from_reason(e.to_string()))
}

#[cfg(feature = "napi")]
#[napi]
pub fn rewrite_source_native(source: String) -> napi::Result<serde_json::Value> {
    serde_json::to_value(rewrite(&source)).map_err(|e| napi::Error::from_reason(e.to_string()))
}

#[cfg(feature = "napi")]
#[napi]
pub fn inspect_document_native(html: String) -> napi::Result<serde_json::Value> {
    let report = inspect_document(&html).map_err(|e| napi::Error::from_reason(e.to_string()))?;
    serde_json::to_value(report).map_err(|e| napi::Error::from_reason(e.to_string()))
}

#[cfg(feature = "napi")]
#[napi]
pub fn capability_names_native() -> Vec<String> {
    capability_names()
}
