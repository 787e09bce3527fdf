use serde::{Deserialize, Serialize};
use thiserror::Error;


#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid compiler options: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

/// Options passed in for compilation, used throughout the translator.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerOptions {
    /// When a predicate cannot be expressed in the pipeline, report the
    /// query as needing local evaluation instead of failing.
    pub allow_client_side_fallback: bool,
    /// Whether the target engine accepts `limit` inside `$filter`.
    pub filter_limit_supported: bool,
    /// Reject comparisons between two fields whose wire representations
    /// differ instead of comparing them as stored.
    pub strict_representations: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        CompilerOptions {
            allow_client_side_fallback: false,
            filter_limit_supported: true,
            strict_representations: false,
        }
    }
}

impl CompilerOptions {
    pub fn with_client_side_fallback(mut self, allow: bool) -> Self {
        self.allow_client_side_fallback = allow;
        self
    }

    pub fn with_filter_limit(mut self, supported: bool) -> Self {
        self.filter_limit_supported = supported;
        self
    }

    pub fn with_strict_representations(mut self, strict: bool) -> Self {
        self.strict_representations = strict;
        self
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, Error> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}
