//! Preview options.
//!
//! Everything the host document needs that is not derived from the source:
//! runtime asset URLs, the mount point id, supervisor timings, and the names
//! the locator tries first. Every field has a default, so `{}` is a complete
//! configuration.

use serde::{Deserialize, Serialize};

use crate::document::RESERVED_IDS;
use crate::validate::PreviewError;

pub const DEFAULT_MOUNT_ID: &str = "root";
pub const DEFAULT_SETTLE_DELAY_MS: u32 = 150;
pub const DEFAULT_VERIFY_DELAYS_MS: [u32; 5] = [50, 150, 300, 600, 1200];
pub const MAX_VERIFY_ATTEMPTS: usize = 12;
pub const CONVENTIONAL_NAMES: [&str; 5] =
    ["GeneratedComponent", "Component", "App", "Preview", "Page"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreviewOptions {
    pub react_url: String,
    pub react_dom_url: String,
    pub babel_url: String,
    pub tailwind_url: String,
    pub mount_id: String,
    pub title: String,
    /// Merged into the style engine's `theme.extend`.
    pub theme: Option<serde_json::Value>,
    pub settle_delay_ms: u32,
    pub verify_delays_ms: Vec<u32>,
    pub conventional_names: Vec<String>,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        PreviewOptions {
            react_url: "https://unpkg.com/react@18/umd/react.production.min.js".to_string(),
            react_dom_url: "https://unpkg.com/react-dom@18/umd/react-dom.production.min.js"
                .to_string(),
            babel_url: "https://unpkg.com/@babel/standalone/babel.min.js".to_string(),
            tailwind_url: "https://cdn.tailwindcss.com".to_string(),
            mount_id: DEFAULT_MOUNT_ID.to_string(),
            title: "Component Preview".to_string(),
            theme: None,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            verify_delays_ms: DEFAULT_VERIFY_DELAYS_MS.to_vec(),
            conventional_names: CONVENTIONAL_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn is_identifier(s: &str, allow_dash: bool) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || (allow_dash && c == '-'))
}

impl PreviewOptions {
    pub fn from_json(json: &str) -> Result<Self, PreviewError> {
        let options: PreviewOptions = serde_json::from_str(json)
            .map_err(|e| PreviewError::InvalidOptions(e.to_string()))?;
        options.check()?;
        Ok(options)
    }

    pub fn check(&self) -> Result<(), PreviewError> {
        let invalid = |msg: String| Err(PreviewError::InvalidOptions(msg));

        if !is_identifier(&self.mount_id, true) {
            return invalid(format!("mountId `{}` is not a valid element id", self.mount_id));
        }
        if RESERVED_IDS.contains(&self.mount_id.as_str()) {
            return invalid(format!("mountId `{}` is reserved by the host document", self.mount_id));
        }
        for (field, url) in [
            ("reactUrl", &self.react_url),
            ("reactDomUrl", &self.react_dom_url),
            ("babelUrl", &self.babel_url),
            ("tailwindUrl", &self.tailwind_url),
        ] {
            if url.trim().is_empty() {
                return invalid(format!("{} must not be empty", field));
            }
        }
        if self.verify_delays_ms.is_empty() {
            return invalid("verifyDelaysMs must list at least one delay".to_string());
        }
        if self.verify_delays_ms.len() > MAX_VERIFY_ATTEMPTS {
            return invalid(format!(
                "verifyDelaysMs allows at most {} attempts, got {}",
                MAX_VERIFY_ATTEMPTS,
                self.verify_delays_ms.len()
            ));
        }
        if self.verify_delays_ms.windows(2).any(|w| w[1] <= w[0]) {
            return invalid("verifyDelaysMs must be strictly increasing".to_string());
        }
        if let Some(name) = self.conventional_names.iter().find(|n| !is_identifier(n, false)) {
            return invalid(format!("conventional name `{}` is not an identifier", name));
        }
        Ok(())
    }
}
