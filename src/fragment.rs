//! Source fragments, function identity and local-scope extraction.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::globals::is_keyword;
use crate::scan::{
    find_balanced, find_top_level_assignment, is_identifier, mask_non_code, next_significant,
    split_top_level, word_before,
};

/// Where a fragment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum FragmentOrigin {
    /// An explicit editor selection.
    #[default]
    Selection,
    /// The function lexically enclosing the cursor.
    EnclosingFunction,
    /// Whole-document fallback.
    Document,
}

/// Raw fragment text plus its origin. Immutable once captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFragment {
    text: String,
    #[serde(default)]
    origin: FragmentOrigin,
}

impl SourceFragment {
    pub fn new(text: impl Into<String>, origin: FragmentOrigin) -> Self {
        Self {
            text: text.into(),
            origin,
        }
    }

    pub fn selection(text: impl Into<String>) -> Self {
        Self::new(text, FragmentOrigin::Selection)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn origin(&self) -> FragmentOrigin {
        self.origin
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FUNCTION IDENTITY
// ═══════════════════════════════════════════════════════════════════════════════

lazy_static! {
    static ref FUNCTION_DECL_RE: Regex =
        Regex::new(r"^(?:export\s+(?:default\s+)?)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)?\s*(?:<[^(]*>)?\s*\(").unwrap();
    static ref BOUND_FUNCTION_RE: Regex = Regex::new(
        r"^(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*(?::[^=]*)?=\s*(?:async\s+)?(?:function\b[^(]*\(|\(|([A-Za-z_$][\w$]*)\s*=>)"
    )
    .unwrap();
    static ref LINE_FUNCTION_RE: Regex = Regex::new(
        r"(?m)^[ \t]*(?:export\s+(?:default\s+)?)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)\s*(?:<[^(]*>)?\s*\("
    )
    .unwrap();
    static ref METHOD_HEAD_RE: Regex = Regex::new(
        r"^(?:(?:public|private|protected|static|override|readonly|async|get|set)\s+)*\*?\s*([A-Za-z_$][\w$]*)\s*(?:<[^(]*>)?\s*\("
    )
    .unwrap();
}

/// Optional name and ordered parameter names of a function fragment.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionIdentity {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parameters: Vec<String>,
}

impl FunctionIdentity {
    pub fn named(name: impl Into<String>, parameters: Vec<String>) -> Self {
        Self {
            name: Some(name.into()),
            parameters,
        }
    }

    /// Extracts the identity of a fragment that is a function declaration,
    /// a `const f = (...) =>` binding, or a lone method. Anything else yields
    /// the empty identity.
    pub fn extract(code: &str) -> Self {
        let trimmed = code.trim_start();
        let offset = code.len() - trimmed.len();
        let masked = mask_non_code(code);
        let masked_trimmed = &masked[offset..];

        if let Some(cap) = FUNCTION_DECL_RE.captures(masked_trimmed) {
            let open = offset + cap.get(0).map_or(0, |m| m.end()) - 1;
            return Self {
                name: cap.get(1).map(|m| m.as_str().to_string()),
                parameters: parameter_names_at(&masked, open),
            };
        }

        if let Some(cap) = BOUND_FUNCTION_RE.captures(masked_trimmed) {
            let name = cap.get(1).map(|m| m.as_str().to_string());
            if let Some(single) = cap.get(2) {
                return Self {
                    name,
                    parameters: vec![single.as_str().to_string()],
                };
            }
            let open = offset + cap.get(0).map_or(0, |m| m.end()) - 1;
            // `const x = (a + b)` is not a function
            let is_function = find_balanced(&masked, open).is_some_and(|close| {
                masked_trimmed.contains("function")
                    || masked[close + 1..].trim_start().starts_with("=>")
                    || matches!(next_significant(&masked, close + 1), Some((_, b':')))
            });
            if is_function {
                return Self {
                    name,
                    parameters: parameter_names_at(&masked, open),
                };
            }
            return Self::default();
        }

        if let Some(cap) = METHOD_HEAD_RE.captures(masked_trimmed) {
            let name = cap.get(1).map_or("", |m| m.as_str());
            let open = offset + cap.get(0).map_or(0, |m| m.end()) - 1;
            if !is_keyword(name) {
                if let Some(close) = find_balanced(&masked, open) {
                    if body_follows(&masked, close + 1) {
                        return Self {
                            name: Some(name.to_string()),
                            parameters: parameter_names(&masked[open + 1..close]),
                        };
                    }
                }
            }
        }

        Self::default()
    }

    /// The first named function declared at the top level of `code`, on
    /// any line. Used when arguments are supplied for a fragment that does
    /// not start with its function.
    pub fn declared_in(code: &str) -> Option<Self> {
        let masked = mask_non_code(code);
        let bytes = masked.as_bytes();
        LINE_FUNCTION_RE.captures_iter(&masked).find_map(|cap| {
            let whole = cap.get(0)?;
            let depth: i32 = bytes[..whole.start()]
                .iter()
                .map(|b| match b {
                    b'{' | b'(' | b'[' => 1,
                    b'}' | b')' | b']' => -1,
                    _ => 0,
                })
                .sum();
            if depth != 0 {
                return None;
            }
            Some(Self {
                name: Some(cap.get(1)?.as_str().to_string()),
                parameters: parameter_names_at(&masked, whole.end() - 1),
            })
        })
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.parameters.is_empty()
    }
}

/// True if a `{` body follows at `from`, allowing a return annotation first.
pub(crate) fn body_follows(masked: &str, from: usize) -> bool {
    match next_significant(masked, from) {
        Some((_, b'{')) => true,
        Some((colon, b':')) => {
            let rest = &masked[colon + 1..];
            let brace = rest.find('{');
            let stop = rest.find(|c: char| c == ';' || c == '\n' || c == '=');
            match (brace, stop) {
                (Some(b), Some(s)) => b < s,
                (Some(_), None) => true,
                _ => false,
            }
        }
        _ => false,
    }
}

fn parameter_names_at(masked: &str, open: usize) -> Vec<String> {
    match find_balanced(masked, open) {
        Some(close) => parameter_names(&masked[open + 1..close]),
        None => Vec::new(),
    }
}

/// Ordered display names of a parameter list. Destructured parameters are
/// reported by their pattern text. Expects masked text.
pub fn parameter_names(list: &str) -> Vec<String> {
    split_top_level(list, b',', true)
        .into_iter()
        .filter_map(|range| {
            let part = list[range].trim();
            let part = match find_top_level_assignment(part) {
                Some(eq) => part[..eq].trim_end(),
                None => part,
            };
            let part = part.strip_prefix("...").unwrap_or(part).trim_start();
            if part.is_empty() {
                return None;
            }
            if part.starts_with('{') || part.starts_with('[') {
                let close = find_balanced(part, 0)?;
                return Some(part[..=close].to_string());
            }
            let end = part
                .find(|c: char| c == '?' || c == ':' || c.is_whitespace())
                .unwrap_or(part.len());
            let name = &part[..end];
            (is_identifier(name) && name != "this").then(|| name.to_string())
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOCAL SCOPE
// ═══════════════════════════════════════════════════════════════════════════════

lazy_static! {
    static ref DECLARATOR_RE: Regex = Regex::new(r"\b(?:const|let|var)\s+").unwrap();
    static ref NAMED_DECL_RE: Regex =
        Regex::new(r"\b(?:function\s*\*?|class)\s+([A-Za-z_$][\w$]*)").unwrap();
    static ref FUNCTION_PARAMS_RE: Regex =
        Regex::new(r"\bfunction\b\s*\*?\s*(?:[A-Za-z_$][\w$]*)?\s*(?:<[^(]*>)?\s*\(").unwrap();
    static ref CATCH_RE: Regex = Regex::new(r"\bcatch\s*\(").unwrap();
    static ref ARROW_SINGLE_RE: Regex = Regex::new(r"([A-Za-z_$][\w$]*)\s*=>").unwrap();
    static ref REQUIRE_INIT_RE: Regex = Regex::new(r"^[^=;\n]*=\s*require\s*\(").unwrap();
}

/// Names bound within a fragment. Used only as an exclusion filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalScopeSet(BTreeSet<String>);

impl LocalScopeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// A new set holding both sets' names.
    pub fn union(&self, other: &LocalScopeSet) -> LocalScopeSet {
        LocalScopeSet(self.0.union(&other.0).cloned().collect())
    }

    /// Infers bindings from text: declarators (including destructuring),
    /// function and class declarations, and function, arrow, method and catch
    /// parameter lists.
    ///
    /// Import and `require` bindings are left out: those statements are
    /// stripped before the harness runs, so the names they bind stay mockable.
    pub fn infer(code: &str) -> Self {
        let masked = mask_non_code(code);
        let mut names = BTreeSet::new();

        for m in DECLARATOR_RE.find_iter(&masked) {
            let start = m.end();
            if REQUIRE_INIT_RE.is_match(&masked[start..]) {
                continue;
            }
            match masked.as_bytes().get(start) {
                Some(b'{') | Some(b'[') => {
                    if let Some(close) = find_balanced(&masked, start) {
                        collect_pattern(&masked[start..=close], &mut names);
                    }
                }
                _ => {
                    // `let a = 1, b = 2`
                    let end = masked[start..]
                        .find(|c: char| c == ';' || c == '\n')
                        .map_or(masked.len(), |p| start + p);
                    for range in split_top_level(&masked[start..end], b',', true) {
                        let part = masked[start..end][range].trim();
                        let ident_end = part
                            .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
                            .unwrap_or(part.len());
                        let name = &part[..ident_end];
                        if is_identifier(name) {
                            names.insert(name.to_string());
                        }
                        if part.starts_with('{') || part.starts_with('[') {
                            collect_pattern(part, &mut names);
                        }
                    }
                }
            }
        }

        for cap in NAMED_DECL_RE.captures_iter(&masked) {
            if let Some(name) = cap.get(1) {
                names.insert(name.as_str().to_string());
            }
        }

        for m in FUNCTION_PARAMS_RE.find_iter(&masked) {
            collect_parameter_list(&masked, m.end() - 1, &mut names);
        }

        for m in CATCH_RE.find_iter(&masked) {
            collect_parameter_list(&masked, m.end() - 1, &mut names);
        }

        for cap in ARROW_SINGLE_RE.captures_iter(&masked) {
            if let Some(name) = cap.get(1) {
                if !is_keyword(name.as_str()) {
                    names.insert(name.as_str().to_string());
                }
            }
        }

        // Parenthesized lists that are arrow or method parameters
        let bytes = masked.as_bytes();
        for (open, _) in masked.match_indices('(') {
            let Some(close) = find_balanced(&masked, open) else {
                continue;
            };
            let is_arrow = arrow_follows(&masked, close + 1);
            let head = word_before(&masked, open);
            let is_method = !head.is_empty()
                && !is_keyword(head)
                && !crate::scan::preceded_by_member_dot(&masked, open - head.len())
                && at_member_start(bytes, open - head.len())
                && body_follows(&masked, close + 1);
            if is_arrow || is_method {
                collect_pattern_list(&masked[open + 1..close], &mut names);
            }
        }

        names.retain(|n| !is_keyword(n) && n != "this");
        Self(names)
    }
}

impl FromIterator<String> for LocalScopeSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<&'a str> for LocalScopeSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self(iter.into_iter().map(str::to_string).collect())
    }
}

fn arrow_follows(masked: &str, from: usize) -> bool {
    let rest = masked[from..].trim_start();
    if rest.starts_with("=>") {
        return true;
    }
    // `(a): T => ...`
    rest.starts_with(':')
        && rest
            .find("=>")
            .is_some_and(|arrow| {
                !rest[..arrow].contains(|c: char| c == ';' || c == '{' || c == '\n')
            })
}

/// True if the identifier at `start` begins a statement or class member:
/// start of text, or after `{`, `}`, `;`, a newline, or a modifier word.
fn at_member_start(bytes: &[u8], start: usize) -> bool {
    let mut i = start;
    while i > 0 {
        i -= 1;
        match bytes[i] {
            b' ' | b'\t' | b'*' => continue,
            b'\n' | b'{' | b'}' | b';' => return true,
            c if c.is_ascii_alphabetic() => {
                let mut word_start = i;
                while word_start > 0 && bytes[word_start - 1].is_ascii_alphabetic() {
                    word_start -= 1;
                }
                let word = std::str::from_utf8(&bytes[word_start..=i]).unwrap_or("");
                return matches!(
                    word,
                    "async" | "static" | "get" | "set" | "public" | "private" | "protected"
                        | "override"
                ) && at_member_start(bytes, word_start);
            }
            _ => return false,
        }
    }
    true
}

fn collect_parameter_list(masked: &str, open: usize, names: &mut BTreeSet<String>) {
    if let Some(close) = find_balanced(masked, open) {
        collect_pattern_list(&masked[open + 1..close], names);
    }
}

/// Collects names from a comma-separated parameter list, dropping type
/// annotations and defaults.
fn collect_pattern_list(list: &str, names: &mut BTreeSet<String>) {
    for range in split_top_level(list, b',', true) {
        let part = list[range].trim();
        let part = match find_top_level_assignment(part) {
            Some(eq) => part[..eq].trim_end(),
            None => part,
        };
        let part = part.strip_prefix("...").unwrap_or(part).trim_start();
        if part.starts_with('{') || part.starts_with('[') {
            if let Some(close) = find_balanced(part, 0) {
                collect_pattern(&part[..=close], names);
            }
            continue;
        }
        let end = part
            .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
            .unwrap_or(part.len());
        let name = &part[..end];
        if is_identifier(name) {
            names.insert(name.to_string());
        }
    }
}

/// Collects bound names from an object or array destructuring pattern.
fn collect_pattern(pattern: &str, names: &mut BTreeSet<String>) {
    let pattern = pattern.trim();
    let is_object = pattern.starts_with('{');
    let inner = &pattern[1..pattern.len().saturating_sub(1).max(1)];
    for range in split_top_level(inner, b',', false) {
        let element = inner[range].trim();
        let element = match find_top_level_assignment(element) {
            Some(eq) => element[..eq].trim_end(),
            None => element,
        };
        if element.is_empty() {
            continue;
        }
        if let Some(rest) = element.strip_prefix("...") {
            collect_binding(rest.trim(), names);
            continue;
        }
        if is_object {
            let colon = split_top_level(element, b':', false);
            if colon.len() > 1 {
                let value = element[colon[1].start..].trim();
                collect_binding(value, names);
                continue;
            }
        }
        collect_binding(element, names);
    }
}

fn collect_binding(target: &str, names: &mut BTreeSet<String>) {
    if target.starts_with('{') || target.starts_with('[') {
        if let Some(close) = find_balanced(target, 0) {
            collect_pattern(&target[..=close], names);
        }
    } else if is_identifier(target) {
        names.insert(target.to_string());
    }
}
