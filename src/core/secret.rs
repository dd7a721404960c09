//! Secret stores for `from_secret` references

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Replacement text for secret values in captured output
pub const MASK: &str = "********";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("secret not found: {0}")]
    NotFound(String),
}

/// Source of secret values
pub trait SecretStore: Send + Sync {
    /// Look up a secret by name
    fn get(&self, name: &str) -> Option<String>;

    /// Look up a secret, failing when it is missing
    fn resolve(&self, name: &str) -> Result<String, SecretError> {
        self.get(name)
            .ok_or_else(|| SecretError::NotFound(name.to_string()))
    }
}

/// In-memory secrets
#[derive(Debug, Clone, Default)]
pub struct StaticSecrets {
    values: HashMap<String, String>,
}

impl StaticSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl SecretStore for StaticSecrets {
    fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

/// Secrets read from the process environment as `<prefix><NAME>`
#[derive(Debug, Clone)]
pub struct EnvSecrets {
    prefix: String,
}

impl EnvSecrets {
    pub const DEFAULT_PREFIX: &'static str = "DROVER_SECRET_";

    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn variable(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name.to_ascii_uppercase())
    }
}

impl Default for EnvSecrets {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PREFIX)
    }
}

impl SecretStore for EnvSecrets {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(self.variable(name)).ok()
    }
}

/// Secrets loaded from a YAML or JSON key/value file
#[derive(Debug, Clone, Default)]
pub struct FileSecrets {
    inner: StaticSecrets,
}

impl FileSecrets {
    /// Load a flat mapping of secret names to values
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read secrets file {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Invalid secrets file {}", path.display()))
    }

    /// Parse a flat mapping; JSON parses as YAML too
    pub fn from_yaml(content: &str) -> Result<Self> {
        let raw: HashMap<String, serde_yaml::Value> = serde_yaml::from_str(content)?;
        let mut inner = StaticSecrets::new();

        for (name, value) in raw {
            let value = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                _ => anyhow::bail!("Secret '{}' must be a scalar value", name),
            };
            inner.insert(name, value);
        }

        Ok(Self { inner })
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl SecretStore for FileSecrets {
    fn get(&self, name: &str) -> Option<String> {
        self.inner.get(name)
    }
}

/// Stores consulted in order; the first hit wins
#[derive(Default)]
pub struct ChainedSecrets {
    stores: Vec<Box<dyn SecretStore>>,
}

impl ChainedSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store<S: SecretStore + 'static>(mut self, store: S) -> Self {
        self.stores.push(Box::new(store));
        self
    }
}

impl SecretStore for ChainedSecrets {
    fn get(&self, name: &str) -> Option<String> {
        self.stores.iter().find_map(|store| store.get(name))
    }
}

/// Replace every secret value in `text` with [`MASK`]
pub fn mask(text: &str, secrets: &[String]) -> String {
    let mut masked = text.to_string();
    // Longest first so a secret containing another is masked whole
    let mut ordered: Vec<&String> = secrets.iter().filter(|s| !s.is_empty()).collect();
    ordered.sort_by_key(|s| std::cmp::Reverse(s.len()));

    for secret in ordered {
        masked = masked.replace(secret.as_str(), MASK);
    }
    masked
}
