//! Environment variables frozen into emitted bundles.

use std::collections::BTreeMap;

use crate::options::BuildOptions;

/// Ordered so the serialized snapshot is deterministic.
pub type EnvironmentVariables = BTreeMap<String, String>;

/// Supplies the variables for a build. Loading `.env` files is left to implementors.
pub trait EnvironmentProvider: Send + Sync {
    fn variables(&self, options: &BuildOptions) -> EnvironmentVariables;
}

/// A fixed set of variables, regardless of options.
#[derive(Debug, Clone, Default)]
pub struct StaticEnvironment {
    variables: EnvironmentVariables,
}

impl StaticEnvironment {
    pub fn new(variables: EnvironmentVariables) -> Self {
        Self { variables }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StaticEnvironment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl EnvironmentProvider for StaticEnvironment {
    fn variables(&self, _options: &BuildOptions) -> EnvironmentVariables {
        self.variables.clone()
    }
}

/// Variables of the running process, optionally restricted to a name prefix.
#[derive(Debug, Clone, Default)]
pub struct ProcessEnvironment {
    pub prefix: Option<String>,
}

impl EnvironmentProvider for ProcessEnvironment {
    fn variables(&self, _options: &BuildOptions) -> EnvironmentVariables {
        std::env::vars()
            .filter(|(name, _)| match &self.prefix {
                Some(prefix) => name.starts_with(prefix.as_str()),
                None => true,
            })
            .collect()
    }
}

/// JSON object literal for a variable set, used as the `process.env` substitution.
pub fn snapshot(variables: &EnvironmentVariables) -> String {
    serde_json::to_string(variables).unwrap_or_else(|_| "{}".to_string())
}
