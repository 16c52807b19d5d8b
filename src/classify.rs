//! Syntactic classification of expression text.
//!
//! Mock expressions and argument expressions are never evaluated at
//! generation time; these predicates look only at their shape.

use lazy_static::lazy_static;
use regex::Regex;

use crate::scan::{find_balanced, is_identifier, mask_non_code, next_significant};

lazy_static! {
    static ref NUMERIC_RE: Regex = Regex::new(
        r"^[-+]?(?:0[xX][0-9a-fA-F_]+|0[bB][01_]+|0[oO][0-7_]+|(?:\d[\d_]*(?:\.[\d_]*)?|\.\d[\d_]*)(?:[eE][-+]?\d+)?)n?$"
    )
    .unwrap();
    static ref FUNCTION_HEAD_RE: Regex =
        Regex::new(r"^(?:async\s+)?function\b\s*\*?\s*([A-Za-z_$][\w$]*)?\s*\(").unwrap();
    static ref ARROW_IDENT_RE: Regex =
        Regex::new(r"^(?:async\s+)?[A-Za-z_$][\w$]*\s*=>").unwrap();
    static ref ASYNC_PREFIX_RE: Regex = Regex::new(r"^async\s*").unwrap();
    static ref CLASS_RE: Regex = Regex::new(r"^class\b").unwrap();
    static ref NEW_RE: Regex = Regex::new(r"^new\s+[A-Za-z_$(]").unwrap();
    static ref REGEX_LITERAL_RE: Regex = Regex::new(r"^/(?:[^/\\\n]|\\.)+/[a-z]*$").unwrap();
    static ref REFERENCE_CHAIN_RE: Regex = Regex::new(
        r"^[A-Za-z_$][\w$]*(?:\s*\??\.\s*[A-Za-z_$][\w$]*|\[[^\[\]]*\]|\([^()]*\))*$"
    )
    .unwrap();
}

/// What kind of function literal a piece of code is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionLiteral {
    /// `function name(...) {}` — a declaration when it stands alone.
    Named(String),
    /// `function (...) {}`
    Anonymous,
    /// `(...) => ...` or `x => ...`
    Arrow,
}

/// Classifies `code` as a function literal, if it starts as one.
pub fn function_literal(code: &str) -> Option<FunctionLiteral> {
    let trimmed = code.trim();
    if let Some(cap) = FUNCTION_HEAD_RE.captures(trimmed) {
        return Some(match cap.get(1) {
            Some(name) => FunctionLiteral::Named(name.as_str().to_string()),
            None => FunctionLiteral::Anonymous,
        });
    }
    if ARROW_IDENT_RE.is_match(trimmed) {
        return Some(FunctionLiteral::Arrow);
    }
    let rest = match ASYNC_PREFIX_RE.find(trimmed) {
        Some(m) if trimmed[m.end()..].starts_with('(') => &trimmed[m.end()..],
        _ => trimmed,
    };
    if rest.starts_with('(') {
        let masked = mask_non_code(rest);
        let close = find_balanced(&masked, 0)?;
        let after = &masked[close + 1..];
        if after.trim_start().starts_with("=>") {
            return Some(FunctionLiteral::Arrow);
        }
        // `(a): T => ...` with a return annotation still present
        if let Some((colon, b':')) = next_significant(&masked, close + 1) {
            let tail = &masked[colon..];
            if tail.contains("=>") && !tail.contains(';') {
                return Some(FunctionLiteral::Arrow);
            }
        }
    }
    None
}

pub fn is_class_literal(code: &str) -> bool {
    CLASS_RE.is_match(code.trim())
}

fn is_quoted_string(code: &str) -> bool {
    let bytes = code.as_bytes();
    let quote = match bytes.first() {
        Some(&q @ (b'"' | b'\'' | b'`')) => q,
        _ => return false,
    };
    if bytes.len() < 2 || bytes[bytes.len() - 1] != quote {
        return false;
    }
    let mut i = 1;
    while i < bytes.len() - 1 {
        match bytes[i] {
            b'\\' => i += 2,
            c if c == quote => return false,
            _ => i += 1,
        }
    }
    i == bytes.len() - 1
}

fn is_wrapped_in(code: &str, open: u8) -> bool {
    if code.as_bytes().first() != Some(&open) {
        return false;
    }
    let masked = mask_non_code(code);
    find_balanced(&masked, 0) == Some(code.len() - 1)
}

/// Literal values that can never be called: numbers, strings, templates,
/// arrays, objects, regexes, keyword literals and `new` expressions.
pub fn is_non_callable_literal(expression: &str) -> bool {
    let trimmed = expression.trim().trim_end_matches(';').trim_end();
    if trimmed.is_empty() {
        return false;
    }
    matches!(
        trimmed,
        "true" | "false" | "null" | "undefined" | "NaN" | "Infinity" | "-Infinity"
    ) || NUMERIC_RE.is_match(trimmed)
        || is_quoted_string(trimmed)
        || is_wrapped_in(trimmed, b'[')
        || is_wrapped_in(trimmed, b'{')
        || REGEX_LITERAL_RE.is_match(trimmed)
        || NEW_RE.is_match(trimmed)
}

/// An identifier, member access chain, or call chain such as `a.b[0].c(1)`.
pub fn is_reference_chain(expression: &str) -> bool {
    REFERENCE_CHAIN_RE.is_match(expression.trim())
}

/// True if `expression` already reads as a JavaScript expression and can be
/// emitted verbatim rather than quoted as a string.
pub fn is_expression_like(expression: &str) -> bool {
    let trimmed = expression.trim();
    is_non_callable_literal(trimmed)
        || function_literal(trimmed).is_some()
        || is_class_literal(trimmed)
        || is_reference_chain(trimmed)
        || is_wrapped_in(trimmed, b'(')
}

/// True if the root of a dotted key looks like a type or namespace name.
pub fn is_capitalized(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

/// Leading segment of a dotted key.
pub fn leading_segment(key: &str) -> &str {
    key.split('.').next().unwrap_or(key)
}

/// True if every segment of a dotted key is an identifier.
pub fn is_dotted_path(key: &str) -> bool {
    !key.is_empty() && key.split('.').all(is_identifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_literal_kinds() {
        assert_eq!(
            function_literal("function add(a, b) { return a + b; }"),
            Some(FunctionLiteral::Named("add".to_string()))
        );
        assert_eq!(
            function_literal("async function (x) {}"),
            Some(FunctionLiteral::Anonymous)
        );
        assert_eq!(function_literal("(a, b) => a + b"), Some(FunctionLiteral::Arrow));
        assert_eq!(
            function_literal("async (id) => ({ id })"),
            Some(FunctionLiteral::Arrow)
        );
        assert_eq!(function_literal("x => x * 2"), Some(FunctionLiteral::Arrow));
        assert_eq!(function_literal("(a + b) * 2"), None);
        assert_eq!(function_literal("return a;"), None);
    }

    #[test]
    fn test_non_callable_literals() {
        for literal in [
            "42", "-1.5e3", "0xff", "10n", "'x'", "\"a b\"", "`t`", "[1, 2]",
            "{ a: 1 }", "null", "undefined", "true", "/ab+c/gi", "new Map()",
        ] {
            assert!(is_non_callable_literal(literal), "{literal}");
        }
        for other in ["() => 1", "makeStub()", "api", "{ a: 1 } + 1", "'a' + 'b'"] {
            assert!(!is_non_callable_literal(other), "{other}");
        }
    }

    #[test]
    fn test_expression_like_arguments() {
        let expressions = [
            "1",
            "'x'",
            "[1]",
            "{a: 1}",
            "user",
            "user.id",
            "makeUser(1)",
            "x => x",
            "new Date()",
        ];
        for arg in expressions {
            assert!(is_expression_like(arg), "{arg}");
        }
        for arg in ["hello world", "a-b c", "50%"] {
            assert!(!is_expression_like(arg), "{arg}");
        }
    }

    #[test]
    fn test_dotted_paths() {
        assert!(is_dotted_path("api.get"));
        assert!(is_dotted_path("CONFIG"));
        assert!(!is_dotted_path("api..get"));
        assert_eq!(leading_segment("this.logger.error"), "this");
    }
}
