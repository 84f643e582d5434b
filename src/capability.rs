//! Capability Registry
//!
//! The fixed catalog of UI components and icons the sandbox provides under
//! well-known names, plus the runtime bindings (React hooks, `cn`) that preview
//! code may use without importing them. The catalog is data; the sandbox's
//! registration routine installs every entry define-if-absent.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

const CATALOG_JSON: &str = include_str!("runtime/catalog.json");

/// Registration routine executed in the sandbox before the preview module.
pub const REGISTRATION_SCRIPT: &str = include_str!("runtime/capabilities.js");

// ═══════════════════════════════════════════════════════════════════════════════
// CATALOG
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CapabilityKind {
    Component,
    Icon,
}

/// Interaction model of a component factory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Behavior {
    #[default]
    Element,
    Passthrough,
    Placeholder,
    Toggle,
    Progress,
    TabsRoot,
    TabsTrigger,
    TabsContent,
    DisclosureRoot,
    DisclosureTrigger,
    DisclosureContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconShape {
    pub tag: String,
    #[serde(flatten)]
    pub attrs: BTreeMap<String, String>,
}

/// Render template a factory is built from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default)]
    pub behavior: Behavior,
    #[serde(default)]
    pub class_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_class_name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variants: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub defaults: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shapes: Vec<IconShape>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityEntry {
    pub name: String,
    pub kind: CapabilityKind,
    #[serde(flatten)]
    pub template: RenderTemplate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityCatalog {
    pub version: String,
    pub runtime_bindings: Vec<String>,
    pub entries: Vec<CapabilityEntry>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl CapabilityCatalog {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut catalog: CapabilityCatalog = serde_json::from_str(json)?;
        // First definition of a name wins.
        let mut seen = HashSet::new();
        catalog.entries.retain(|e| seen.insert(e.name.clone()));
        catalog.index = catalog
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.clone(), i))
            .collect();
        Ok(catalog)
    }

    pub fn get(&self, name: &str) -> Option<&CapabilityEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

lazy_static! {
    static ref CATALOG: CapabilityCatalog =
        CapabilityCatalog::from_json(CATALOG_JSON).expect("bundled capability catalog");

    /// Names the host page itself provides; never reported as unresolved.
    static ref HOST_GLOBALS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        for name in [
            "React", "ReactDOM", "Babel", "Array", "Boolean", "Date", "Error", "Intl",
            "JSON", "Map", "Math", "Number", "Object", "Promise", "Proxy", "Reflect",
            "RegExp", "Set", "String", "Symbol", "TypeError", "URL", "URLSearchParams",
            "WeakMap", "WeakSet", "Infinity", "NaN", "Image", "Audio", "Event",
            "CustomEvent", "FormData", "Blob", "File", "HTMLElement", "HTMLInputElement",
            "HTMLDivElement", "HTMLButtonElement", "HTMLFormElement", "Node",
            "IntersectionObserver", "ResizeObserver", "MutationObserver", "AbortController",
            "Headers", "Request", "Response", "TextEncoder", "TextDecoder", "BigInt", "Lock",
        ] {
            s.insert(name);
        }
        s
    };
}

pub fn catalog() -> &'static CapabilityCatalog {
    &CATALOG
}

pub fn is_capability(name: &str) -> bool {
    CATALOG.contains(name)
}

/// True when the sandbox scope will hold `name` without the module defining it.
pub fn is_provided(name: &str) -> bool {
    CATALOG.contains(name)
        || CATALOG.runtime_bindings.iter().any(|b| b == name)
        || HOST_GLOBALS.contains(name)
}

/// Catalog names, components and icons alike.
pub fn capability_names() -> Vec<String> {
    CATALOG.names().map(str::to_string).collect()
}
