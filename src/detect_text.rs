//! Text-based detection over masked source.
//!
//! The call backend here is the fallback when the fragment does not parse.
//! The self-qualified, constant and free-variable detectors always run.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;

use crate::classify::leading_segment;
use crate::fragment::{body_follows, LocalScopeSet};
use crate::globals::{
    is_builtin, is_keyword, is_reserved_name, BUILTIN_CONSTRUCTORS, BUILTIN_UPPER_CONSTANTS,
    KNOWN_MOCKABLE_GLOBALS, SELF_QUALIFIER,
};
use crate::references::CallDetector;
use crate::scan::{
    find_balanced, is_ident_char, mask_non_code, next_significant, preceded_by_member_dot,
    prev_significant, word_before,
};

lazy_static! {
    static ref IDENT_RE: Regex = Regex::new(r"[A-Za-z_$][\w$]*").unwrap();
    static ref CALL_RE: Regex =
        Regex::new(r"[A-Za-z_$][\w$]*(?:\s*\??\.\s*[A-Za-z_$][\w$]*)*\s*\(").unwrap();
    static ref SELF_PATH_RE: Regex =
        Regex::new(r"\bthis(?:\s*\??\.\s*[A-Za-z_$][\w$]*)+").unwrap();
    static ref MEMBER_TAIL_RE: Regex =
        Regex::new(r"^(?:\s*\??\.\s*[A-Za-z_$][\w$]*)*\s*\(").unwrap();
    static ref WHITESPACE_RE: Regex = Regex::new(r"\s+").unwrap();
}

/// Words after which a capitalized identifier is a declaration or a type.
const TYPE_CONTEXT_WORDS: [&str; 8] = [
    "new",
    "function",
    "class",
    "as",
    "implements",
    "interface",
    "type",
    "enum",
];

/// Normalizes `a ?. b` to `a.b`.
fn dotted_key(text: &str) -> String {
    WHITESPACE_RE.replace_all(text, "").replace("?.", ".")
}

/// Identifier tokens of masked text that start on an identifier boundary.
fn identifier_tokens(masked: &str) -> impl Iterator<Item = regex::Match<'_>> {
    let bytes = masked.as_bytes();
    IDENT_RE
        .find_iter(masked)
        .filter(move |m| m.start() == 0 || !is_ident_char(bytes[m.start() - 1]))
        .filter(|m| !m.as_str().as_bytes()[0].is_ascii_digit())
}

// ═══════════════════════════════════════════════════════════════════════════════
// CALLS
// ═══════════════════════════════════════════════════════════════════════════════

/// Pattern-based call detection that needs no syntax tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextCallDetector;

impl CallDetector for TextCallDetector {
    fn name(&self) -> &'static str {
        "text"
    }

    fn detect_calls(&self, code: &str, locals: &LocalScopeSet) -> Option<BTreeSet<String>> {
        let masked = mask_non_code(code);
        let locals = locals.union(&LocalScopeSet::infer(code));
        let bytes = masked.as_bytes();
        let mut calls = BTreeSet::new();

        for m in CALL_RE.find_iter(&masked) {
            let start = m.start();
            if start > 0 && is_ident_char(bytes[start - 1]) {
                continue;
            }
            if preceded_by_member_dot(&masked, start) {
                continue;
            }
            if matches!(word_before(&masked, start), "new" | "function" | "class") {
                continue;
            }
            let key = dotted_key(m.as_str().trim_end_matches('('));
            let head = leading_segment(&key);
            if is_keyword(head) || locals.contains(head) {
                continue;
            }
            let is_dotted = key.contains('.');
            let open = m.end() - 1;
            if !is_dotted {
                // `name(...) {` is a method definition, not a call
                if find_balanced(&masked, open)
                    .is_some_and(|close| body_follows(&masked, close + 1))
                {
                    continue;
                }
            }
            let include = is_dotted
                || KNOWN_MOCKABLE_GLOBALS.contains(head)
                || !head.starts_with(|c: char| c.is_ascii_lowercase())
                || head.chars().any(|c| c.is_ascii_uppercase());
            if include {
                calls.insert(key);
            }
        }

        Some(calls)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SELF-QUALIFIED
// ═══════════════════════════════════════════════════════════════════════════════

/// `this.path` references. Returns (call-style keys, access keys); access
/// keys that prefix or equal a call-style key are suppressed.
pub fn detect_self_references(code: &str) -> (BTreeSet<String>, BTreeSet<String>) {
    let masked = mask_non_code(code);
    let bytes = masked.as_bytes();
    let mut calls = BTreeSet::new();
    let mut accesses = BTreeSet::new();

    for m in SELF_PATH_RE.find_iter(&masked) {
        let after_dollar = m.start() > 0 && bytes[m.start() - 1] == b'$';
        if after_dollar || preceded_by_member_dot(&masked, m.start()) {
            continue;
        }
        let key = dotted_key(m.as_str());
        if matches!(next_significant(&masked, m.end()), Some((_, b'('))) {
            calls.insert(key);
        } else {
            accesses.insert(key);
        }
    }

    accesses.retain(|access| {
        !calls
            .iter()
            .any(|call| call == access || call.starts_with(&format!("{}.", access)))
    });
    (calls, accesses)
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

fn is_upper_snake(name: &str) -> bool {
    name.len() >= 3
        && name.starts_with(|c: char| c.is_ascii_uppercase())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn is_capitalized_mixed(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_uppercase())
        && name.chars().any(|c| c.is_ascii_lowercase())
}

/// Upper-snake constants and capitalized identifiers used as values.
pub fn detect_constants(code: &str, locals: &LocalScopeSet) -> BTreeSet<String> {
    let masked = mask_non_code(code);
    let mut constants = BTreeSet::new();

    for m in identifier_tokens(&masked) {
        let name = m.as_str();
        if locals.contains(name) || preceded_by_member_dot(&masked, m.start()) {
            continue;
        }
        if is_upper_snake(name) {
            if !BUILTIN_UPPER_CONSTANTS.contains(name) {
                constants.insert(name.to_string());
            }
            continue;
        }
        if !is_capitalized_mixed(name) || BUILTIN_CONSTRUCTORS.contains(name) || is_builtin(name) {
            continue;
        }
        if TYPE_CONTEXT_WORDS.contains(&word_before(&masked, m.start())) {
            continue;
        }
        if matches!(next_significant(&masked, m.end()), Some((_, b'('))) {
            continue;
        }
        if matches!(prev_significant(&masked, m.start()), Some((_, b':' | b'<'))) {
            continue;
        }
        constants.insert(name.to_string());
    }
    constants
}

// ═══════════════════════════════════════════════════════════════════════════════
// FREE VARIABLES
// ═══════════════════════════════════════════════════════════════════════════════

/// Lowercase identifiers read but never bound or called.
pub fn detect_free_variables(code: &str, locals: &LocalScopeSet) -> BTreeSet<String> {
    let masked = mask_non_code(code);
    let mut free = BTreeSet::new();

    for m in identifier_tokens(&masked) {
        let name = m.as_str();
        if name.len() < 3
            || !name.starts_with(|c: char| c.is_ascii_lowercase())
            || name == SELF_QUALIFIER
            || locals.contains(name)
            || is_reserved_name(name)
            || preceded_by_member_dot(&masked, m.start())
        {
            continue;
        }
        // call target, directly or at the head of a member chain
        if MEMBER_TAIL_RE.is_match(&masked[m.end()..]) {
            continue;
        }
        // object-literal key
        if matches!(next_significant(&masked, m.end()), Some((_, b':')))
            && matches!(prev_significant(&masked, m.start()), Some((_, b'{' | b',')))
        {
            continue;
        }
        free.insert(name.to_string());
    }
    free
}
