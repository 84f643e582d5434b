//! # Sandbox Host Document
//!
//! Pure assembly of the markup string a display surface loads into an
//! isolated browsing context. Sections are concatenated in a fixed order:
//!
//! 1. Style engine configuration, then the style engine itself
//! 2. UI runtime scripts (React, ReactDOM, JIT compiler)
//! 3. Capability catalog and its registration routine
//! 4. The transformed module, as an inert JSON data block
//! 5. Supervisor boot configuration and bootstrap
//!
//! ## Key Invariants
//!
//! 1. **One mount point**: the document contains exactly one element with the
//!    configured mount id.
//! 2. **Inert payloads**: source-derived text only ever appears inside JSON
//!    data blocks with `<` escaped, so it cannot close its script element.
//! 3. **Self-contained**: the only external requests are the runtime URLs in
//!    [`PreviewOptions`].

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::capability;
use crate::options::{PreviewOptions, MAX_VERIFY_ATTEMPTS};
use crate::rewrite::TransformedModule;
use crate::supervisor::{BootConfig, VerifySchedule, DIAGNOSTIC_PANEL_ID, SUPERVISOR_SCRIPT};

pub const CAPABILITY_DATA_ID: &str = "preview-capabilities";
pub const MODULE_DATA_ID: &str = "preview-module";
pub const BOOT_DATA_ID: &str = "preview-boot";

/// Ids the document or the bootstrap claims; the mount point may use none of them.
pub const RESERVED_IDS: [&str; 4] = [CAPABILITY_DATA_ID, MODULE_DATA_ID, BOOT_DATA_ID, DIAGNOSTIC_PANEL_ID];

const BASE_CSS: &str = include_str!("runtime/base.css");

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn compute_digest(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\"', "&quot;")
        .replace('\'', "&#39;")
}

/// JSON safe to place between `<script>` tags.
fn script_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "null".to_string())
        .replace('<', "\\u003c")
}

fn merge_json(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                merge_json(base.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

fn hsl_var(name: &str) -> String {
    format!("hsl(var(--{}))", name)
}

/// Style engine configuration: design tokens bound to the CSS variables in
/// the base stylesheet, with `theme` merged into `theme.extend`.
pub fn style_config(theme: Option<&Value>) -> Value {
    let paired = |name: &str| {
        json!({
            "DEFAULT": hsl_var(name),
            "foreground": hsl_var(&format!("{}-foreground", name)),
        })
    };
    let mut config = json!({
        "darkMode": "class",
        "theme": {
            "extend": {
                "colors": {
                    "border": hsl_var("border"),
                    "input": hsl_var("input"),
                    "ring": hsl_var("ring"),
                    "background": hsl_var("background"),
                    "foreground": hsl_var("foreground"),
                    "primary": paired("primary"),
                    "secondary": paired("secondary"),
                    "destructive": paired("destructive"),
                    "muted": paired("muted"),
                    "accent": paired("accent"),
                    "popover": paired("popover"),
                    "card": paired("card"),
                },
                "borderRadius": {
                    "lg": "var(--radius)",
                    "md": "calc(var(--radius) - 2px)",
                    "sm": "calc(var(--radius) - 4px)",
                },
            }
        }
    });
    if let Some(theme) = theme {
        merge_json(&mut config["theme"]["extend"], theme);
    }
    config
}

// ═══════════════════════════════════════════════════════════════════════════════
// ASSEMBLY
// ═══════════════════════════════════════════════════════════════════════════════

pub fn assemble_document(module: &TransformedModule, options: &PreviewOptions) -> String {
    let digest = compute_digest(&module.code);
    let plan = module.locator_plan(&options.conventional_names);
    let schedule = VerifySchedule::new(&options.verify_delays_ms, MAX_VERIFY_ATTEMPTS);
    let boot = BootConfig::new(
        &options.mount_id,
        options.settle_delay_ms,
        &schedule,
        &plan,
        &module.unresolved,
        &digest,
    );

    let mut html = String::with_capacity(module.code.len() + 64 * 1024);
    html.push_str("<!DOCTYPE html>\n");
    html.push_str(&format!(
        "<html lang=\"en\" data-preview-digest=\"{}\" data-preview-phase=\"idle\">\n",
        digest
    ));
    html.push_str("<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!("<title>{}</title>\n", escape_html(&options.title)));

    // 1. style engine: configuration must exist before the engine runs
    html.push_str(&format!(
        "<script>window.tailwind = {{ config: {} }};</script>\n",
        script_json(&style_config(options.theme.as_ref()))
    ));
    html.push_str(&format!("<script src=\"{}\"></script>\n", escape_html(&options.tailwind_url)));
    html.push_str(&format!("<style>\n{}</style>\n", BASE_CSS));

    // 2. UI runtime
    for url in [&options.react_url, &options.react_dom_url] {
        html.push_str(&format!(
            "<script src=\"{}\" crossorigin=\"anonymous\"></script>\n",
            escape_html(url)
        ));
    }
    html.push_str(&format!("<script src=\"{}\"></script>\n", escape_html(&options.babel_url)));
    html.push_str("</head>\n<body>\n");
    html.push_str(&format!("<div id=\"{}\"></div>\n", escape_html(&options.mount_id)));

    // 3. capability surface
    html.push_str(&format!(
        "<script type=\"application/json\" id=\"{}\">{}</script>\n",
        CAPABILITY_DATA_ID,
        script_json(capability::catalog())
    ));
    html.push_str(&format!("<script>\n{}</script>\n", capability::REGISTRATION_SCRIPT));

    // 4. transformed module
    html.push_str(&format!(
        "<script type=\"application/json\" id=\"{}\">{}</script>\n",
        MODULE_DATA_ID,
        script_json(&module.code)
    ));

    // 5. supervisor
    html.push_str(&format!(
        "<script type=\"application/json\" id=\"{}\">{}</script>\n",
        BOOT_DATA_ID,
        script_json(&boot)
    ));
    html.push_str(&format!("<script>\n{}</script>\n", SUPERVISOR_SCRIPT));
    html.push_str("</body>\n</html>\n");
    html
}

// ═══════════════════════════════════════════════════════════════════════════════
// INSPECTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Structural summary of an assembled document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentReport {
    pub mount_id: Option<String>,
    pub mount_points: usize,
    /// One label per `<script>` in document order: its `src`, its `id`, or `inline`.
    pub scripts: Vec<String>,
    pub digest: Option<String>,
    pub module_code: Option<String>,
}

#[derive(Default)]
struct Walk {
    ids: Vec<String>,
    scripts: Vec<String>,
    data_blocks: Vec<(String, String)>,
    digest: Option<String>,
}

fn attr(attrs: &[html5ever::Attribute], name: &str) -> Option<String> {
    attrs
        .iter()
        .find(|a| &*a.name.local == name)
        .map(|a| a.value.to_string())
}

fn text_of(handle: &Handle) -> String {
    let mut out = String::new();
    for child in handle.children.borrow().iter() {
        if let NodeData::Text { contents } = &child.data {
            out.push_str(&contents.borrow());
        }
    }
    out
}

fn walk(handle: &Handle, acc: &mut Walk) {
    if let NodeData::Element { name, attrs, .. } = &handle.data {
        let attrs = attrs.borrow();
        let tag = name.local.to_string();
        if let Some(id) = attr(&attrs, "id") {
            acc.ids.push(id);
        }
        if tag == "html" {
            acc.digest = attr(&attrs, "data-preview-digest");
        }
        if tag == "script" {
            let label = attr(&attrs, "src")
                .or_else(|| attr(&attrs, "id"))
                .unwrap_or_else(|| "inline".to_string());
            if let Some(id) = attr(&attrs, "id") {
                acc.data_blocks.push((id, text_of(handle)));
            }
            acc.scripts.push(label);
        }
    }
    for child in handle.children.borrow().iter() {
        walk(child, acc);
    }
}

pub fn inspect_document(html: &str) -> std::io::Result<DocumentReport> {
    let dom = parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut html.as_bytes())?;

    let mut acc = Walk::default();
    walk(&dom.document, &mut acc);

    let block = |id: &str| {
        acc.data_blocks
            .iter()
            .find(|(block_id, _)| block_id == id)
            .map(|(_, text)| text.clone())
    };
    let mount_id = block(BOOT_DATA_ID)
        .and_then(|text| serde_json::from_str::<Value>(&text).ok())
        .and_then(|boot| boot["mountId"].as_str().map(str::to_string));
    let module_code = block(MODULE_DATA_ID).and_then(|text| serde_json::from_str::<String>(&text).ok());
    let mount_points = match &mount_id {
        Some(id) => acc.ids.iter().filter(|i| *i == id).count(),
        None => 0,
    };

    Ok(DocumentReport {
        mount_id,
        mount_points,
        scripts: acc.scripts,
        digest: acc.digest,
        module_code,
    })
}
