//! Layered bundler configuration.
//!
//! Effective configuration is `defaults < project overrides < call overrides`, folded by
//! [`BundlerConfig::merge`]. Every key replaces the lower layer wholesale except
//! `define`, whose entries merge one by one.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Trailing marker carried by every emitted artifact.
pub const ATTRIBUTION: &str = "// Generated by handler-compiler";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Cjs,
    Esm,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Footer {
    #[serde(default)]
    pub js: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundlerConfig {
    pub format: OutputFormat,
    pub target: String,
    pub bundle: bool,
    pub allow_overwrite: bool,
    pub tree_shaking: bool,
    pub minify: bool,
    pub footer: Footer,
    pub define: BTreeMap<String, String>,
    pub external: Vec<String>,
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Cjs,
            target: "es2022".to_string(),
            bundle: true,
            allow_overwrite: true,
            tree_shaking: true,
            minify: true,
            footer: Footer {
                js: Some(ATTRIBUTION.to_string()),
            },
            define: BTreeMap::new(),
            external: Vec::new(),
        }
    }
}

/// One override layer. Unset keys fall through to the layer below.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundlerOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_overwrite: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree_shaking: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minify: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<Footer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub define: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<Vec<String>>,
}

impl BundlerConfig {
    /// Fold override layers, lowest first, over `defaults`.
    pub fn merge(defaults: &BundlerConfig, layers: &[Option<&BundlerOverrides>]) -> BundlerConfig {
        layers
            .iter()
            .flatten()
            .fold(defaults.clone(), |config, layer| config.apply(layer))
    }

    fn apply(mut self, layer: &BundlerOverrides) -> Self {
        if let Some(format) = layer.format {
            self.format = format;
        }
        if let Some(target) = &layer.target {
            self.target = target.clone();
        }
        if let Some(bundle) = layer.bundle {
            self.bundle = bundle;
        }
        if let Some(allow_overwrite) = layer.allow_overwrite {
            self.allow_overwrite = allow_overwrite;
        }
        if let Some(tree_shaking) = layer.tree_shaking {
            self.tree_shaking = tree_shaking;
        }
        if let Some(minify) = layer.minify {
            self.minify = minify;
        }
        if let Some(footer) = &layer.footer {
            self.footer = footer.clone();
        }
        if let Some(define) = &layer.define {
            self.define
                .extend(define.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        if let Some(external) = &layer.external {
            self.external = external.clone();
        }
        self
    }

    /// Footer text with the attribution marker guaranteed as its last line.
    pub fn footer_text(&self) -> String {
        match self.footer.js.as_deref().map(str::trim_end) {
            Some(js) if js.ends_with(ATTRIBUTION) => js.to_string(),
            Some(js) if !js.is_empty() => format!("{js}\n{ATTRIBUTION}"),
            _ => ATTRIBUTION.to_string(),
        }
    }
}
