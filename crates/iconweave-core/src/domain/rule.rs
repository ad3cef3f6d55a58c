//! Output rules: the committed, externally visible unit.

use serde::{Deserialize, Serialize};

/// `{ key, selector, declaration }`
///
/// The same shape is used while a rule waits for the batch flush.
/// `placeholder` marks a rule that stands in for an icon that could not be
/// loaded; it never reaches the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRule {
    pub key: String,
    pub selector: String,
    pub declaration: String,
    #[serde(skip)]
    pub placeholder: bool,
}

impl OutputRule {
    pub fn new(
        key: impl Into<String>,
        selector: impl Into<String>,
        declaration: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            selector: selector.into(),
            declaration: declaration.into(),
            placeholder: false,
        }
    }

    pub fn as_placeholder(mut self) -> Self {
        self.placeholder = true;
        self
    }
}

/// Persisted form: `{ rules: [...], timestamp }` (epoch ms).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRuleSet {
    pub rules: Vec<OutputRule>,
    pub timestamp: i64,
}
