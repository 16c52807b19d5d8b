//! Mock bindings and their generation-time classification.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::classify::{
    is_capitalized, is_class_literal, is_dotted_path, is_non_callable_literal, leading_segment,
};
use crate::globals::SELF_QUALIFIER;

fn default_enabled() -> bool {
    true
}

/// A user-supplied substitute for one reference key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockBinding {
    pub key: String,
    /// Expression text. `None` binds `undefined`.
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl MockBinding {
    pub fn new(key: impl Into<String>, expression: Option<&str>) -> Self {
        Self {
            key: key.into(),
            expression: expression.map(str::to_string),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Where a mock is installed in the harness context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockPlacement {
    /// `this.`-qualified: a path on the bound self record.
    SelfMember { path: String },
    /// Dotted or bare: a path on the scope record, whose root is then bound
    /// as a lexical constant.
    Scope { path: String, root: String },
}

/// How a mock value behaves at run time, decided from its syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockValue {
    Absent,
    Literal(String),
    Callable(String),
    Constructor(String),
}

impl MockValue {
    pub fn expression(&self) -> Option<&str> {
        match self {
            MockValue::Absent => None,
            MockValue::Literal(e) | MockValue::Callable(e) | MockValue::Constructor(e) => Some(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMock {
    pub key: String,
    pub placement: MockPlacement,
    pub value: MockValue,
}

impl ResolvedMock {
    /// The installation path relative to its record.
    pub fn path(&self) -> &str {
        match &self.placement {
            MockPlacement::SelfMember { path } | MockPlacement::Scope { path, .. } => path,
        }
    }
}

/// Places a key. Returns `None` for keys that are not dotted identifier paths.
pub fn place(key: &str) -> Option<MockPlacement> {
    let key = key.trim();
    if !is_dotted_path(key) {
        return None;
    }
    let self_prefix = format!("{}.", SELF_QUALIFIER);
    match key.strip_prefix(&self_prefix) {
        Some(path) => Some(MockPlacement::SelfMember {
            path: path.to_string(),
        }),
        None if key == SELF_QUALIFIER => None,
        None => Some(MockPlacement::Scope {
            path: key.to_string(),
            root: leading_segment(key).to_string(),
        }),
    }
}

/// Classifies a mock expression for `key`.
pub fn classify_value(key: &str, expression: Option<&str>) -> MockValue {
    let Some(expression) = expression
        .map(|e| e.trim().trim_end_matches(';').trim_end())
        .filter(|e| !e.is_empty())
    else {
        return MockValue::Absent;
    };
    let expression = expression.to_string();
    if is_non_callable_literal(&expression) {
        return MockValue::Literal(expression);
    }
    let dotted_with_type_root = key.contains('.')
        && !key.starts_with(&format!("{}.", SELF_QUALIFIER))
        && is_capitalized(leading_segment(key));
    if is_class_literal(&expression) || dotted_with_type_root {
        MockValue::Constructor(expression)
    } else {
        MockValue::Callable(expression)
    }
}

/// Resolves enabled bindings in order. Invalid keys are skipped; a later
/// binding for the same key replaces an earlier one.
pub fn resolve_mocks(bindings: &[MockBinding]) -> Vec<ResolvedMock> {
    let mut resolved: Vec<ResolvedMock> = Vec::new();
    for binding in bindings.iter().filter(|b| b.enabled) {
        let Some(placement) = place(&binding.key) else {
            warn!(key = %binding.key, "skipping mock with an invalid key");
            continue;
        };
        let mock = ResolvedMock {
            key: binding.key.trim().to_string(),
            placement,
            value: classify_value(&binding.key, binding.expression.as_deref()),
        };
        match resolved.iter_mut().find(|m| m.key == mock.key) {
            Some(existing) => *existing = mock,
            None => resolved.push(mock),
        }
    }
    resolved
}
