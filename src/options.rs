//! Build options supplied by the driver once per invocation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::BundlerOverrides;

/// Deployment platform a module is packaged for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BundlerType {
    Vercel,
    #[serde(rename = "ExpressJS", alias = "Express")]
    ExpressJS,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub bundler: BundlerType,
    #[serde(default)]
    pub developer: Option<DeveloperOptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeveloperOptions {
    #[serde(default)]
    pub bundler: Option<DeveloperBundlerOptions>,
}

/// Passthrough overrides for the underlying build tool, keyed by tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeveloperBundlerOptions {
    #[serde(default)]
    pub oxc: Option<BundlerOverrides>,
}

impl BuildOptions {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, bundler: BundlerType) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            bundler,
            developer: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_bundler_overrides(mut self, overrides: BundlerOverrides) -> Self {
        self.developer = Some(DeveloperOptions {
            bundler: Some(DeveloperBundlerOptions {
                oxc: Some(overrides),
            }),
        });
        self
    }

    /// Project-wide bundler overrides (`developer.bundler.oxc`), if any.
    pub fn bundler_overrides(&self) -> Option<&BundlerOverrides> {
        self.developer
            .as_ref()
            .and_then(|d| d.bundler.as_ref())
            .and_then(|b| b.oxc.as_ref())
    }
}
