//! Reference analysis: which external names does a fragment depend on?

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::classify::leading_segment;
use crate::detect_text::{
    detect_constants, detect_free_variables, detect_self_references, TextCallDetector,
};
use crate::detect_tree::TreeCallDetector;
use crate::fragment::{LocalScopeSet, SourceFragment};
use crate::globals::{is_builtin, is_keyword, SELF_QUALIFIER};
use crate::scope::collect_bindings;

/// A call-detection backend. Returns `None` when it cannot handle the
/// fragment, so the next backend is tried.
pub trait CallDetector {
    fn name(&self) -> &'static str;
    fn detect_calls(&self, code: &str, locals: &LocalScopeSet) -> Option<BTreeSet<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReferenceKind {
    Call,
    SelfQualified,
    Constant,
    FreeVariable,
}

/// Distinct reference keys in lexical order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceSet(BTreeMap<String, ReferenceKind>);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalReference {
    pub key: String,
    pub kind: ReferenceKind,
}

impl ReferenceSet {
    pub fn keys(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn kind(&self, key: &str) -> Option<ReferenceKind> {
        self.0.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ExternalReference> + '_ {
        self.0.iter().map(|(key, kind)| ExternalReference {
            key: key.clone(),
            kind: *kind,
        })
    }

    /// Inserts unless the key is already present; the first kind wins.
    fn insert(&mut self, key: String, kind: ReferenceKind) {
        self.0.entry(key).or_insert(kind);
    }
}

/// Default backend order: syntax tree first, text as the fallback.
pub fn default_detectors() -> Vec<Box<dyn CallDetector>> {
    vec![Box::new(TreeCallDetector), Box::new(TextCallDetector)]
}

/// Analyzes a fragment with the default backends.
pub fn analyze(fragment: &SourceFragment, known_locals: &LocalScopeSet) -> ReferenceSet {
    analyze_with(fragment, known_locals, &default_detectors())
}

/// Analyzes a fragment, taking call keys from the first backend that can
/// handle it.
pub fn analyze_with(
    fragment: &SourceFragment,
    known_locals: &LocalScopeSet,
    detectors: &[Box<dyn CallDetector>],
) -> ReferenceSet {
    let code = fragment.text();
    let mut locals = known_locals.union(&LocalScopeSet::infer(code));
    if let Some(tree_bindings) = collect_bindings(code) {
        locals = locals.union(&tree_bindings);
    }

    let calls = detectors
        .iter()
        .find_map(|detector| {
            let found = detector.detect_calls(code, &locals)?;
            debug!(backend = detector.name(), count = found.len(), "call keys detected");
            Some(found)
        })
        .unwrap_or_default();
    let (self_calls, self_accesses) = detect_self_references(code);
    let constants = detect_constants(code, &locals);
    let free_variables = detect_free_variables(code, &locals);

    let call_heads: BTreeSet<&str> = calls
        .iter()
        .chain(self_calls.iter())
        .map(|key| leading_segment(key))
        .collect();

    let mut set = ReferenceSet::default();
    let self_prefix = format!("{}.", SELF_QUALIFIER);
    for key in calls.iter().chain(self_calls.iter()) {
        let kind = if key.starts_with(&self_prefix) {
            ReferenceKind::SelfQualified
        } else {
            ReferenceKind::Call
        };
        set.insert(key.clone(), kind);
    }
    for key in self_accesses {
        set.insert(key, ReferenceKind::SelfQualified);
    }
    for key in constants {
        if !call_heads.contains(key.as_str()) {
            set.insert(key, ReferenceKind::Constant);
        }
    }
    for key in free_variables {
        if !call_heads.contains(key.as_str()) {
            set.insert(key, ReferenceKind::FreeVariable);
        }
    }

    set.0.retain(|key, _| {
        if key.starts_with(&self_prefix) {
            return true;
        }
        let head = leading_segment(key);
        !is_builtin(head) && !is_keyword(head) && !locals.contains(head)
    });

    debug!(
        origin = ?fragment.origin(),
        locals = locals.len(),
        references = set.len(),
        "fragment analyzed"
    );
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(code: &str) -> Vec<String> {
        analyze(&SourceFragment::selection(code), &LocalScopeSet::new()).keys()
    }

    #[test]
    fn test_async_function_dependency() {
        assert_eq!(
            keys("async function getUser(id) { return await api.get(id); }"),
            vec!["api.get"]
        );
    }

    #[test]
    fn test_self_qualified_call() {
        let set = analyze(
            &SourceFragment::selection("this.logger.error(\"x\")"),
            &LocalScopeSet::new(),
        );
        assert_eq!(set.keys(), vec!["this.logger.error"]);
        assert_eq!(set.kind("this.logger.error"), Some(ReferenceKind::SelfQualified));
    }

    #[test]
    fn test_builtins_are_dropped() {
        assert_eq!(
            keys("console.log(JSON.stringify(data)); Math.max(1, 2); return Promise.resolve(data);"),
            vec!["data"]
        );
    }

    #[test]
    fn test_free_variable_shadowed_by_call_head() {
        let set = analyze(
            &SourceFragment::selection("const v = store.get(key);\nreturn store;"),
            &LocalScopeSet::new(),
        );
        assert_eq!(set.keys(), vec!["key", "store.get"]);
    }

    #[test]
    fn test_known_locals_are_excluded() {
        let locals: LocalScopeSet = ["api"].into_iter().collect();
        let set = analyze(
            &SourceFragment::selection("return api.get(id) + offset;"),
            &locals,
        );
        assert_eq!(set.keys(), vec!["offset"]);
    }

    #[test]
    fn test_text_backend_used_when_parse_fails() {
        let set = analyze(
            &SourceFragment::selection("const x = api.fetchAll(;\nnotify.send(x"),
            &LocalScopeSet::new(),
        );
        assert!(set.contains("api.fetchAll"));
        assert!(set.contains("notify.send"));
    }

    #[test]
    fn test_kinds_are_reported() {
        let set = analyze(
            &SourceFragment::selection("return api.get(BASE_URL, options);"),
            &LocalScopeSet::new(),
        );
        assert_eq!(set.kind("api.get"), Some(ReferenceKind::Call));
        assert_eq!(set.kind("BASE_URL"), Some(ReferenceKind::Constant));
        assert_eq!(set.kind("options"), Some(ReferenceKind::FreeVariable));
    }
}
