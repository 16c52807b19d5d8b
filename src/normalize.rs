//! Fragment normalization: module syntax out, types erased, lone methods
//! turned into standalone functions.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::erase::{erase_types, remove_type_imports, tidy_whitespace};
use crate::fragment::body_follows;
use crate::globals::is_keyword;
use crate::params::strip_parameter_list;
use crate::scan::{apply_edits, find_balanced, mask_non_code, next_significant};

/// Runtime-ready code plus the module specifiers whose imports were removed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedFragment {
    pub code: String,
    pub stripped_modules: Vec<String>,
}

lazy_static! {
    static ref IMPORT_RE: Regex = Regex::new(r"(?m)^[ \t]*import\b").unwrap();
    static ref REQUIRE_LINE_RE: Regex = Regex::new(
        r"(?m)^[ \t]*(?:const|let|var)\s+[^=;\n]+=\s*require\s*\(\s*(['\x22])"
    )
    .unwrap();
    static ref EXPORT_LIST_RE: Regex = Regex::new(r"(?m)^[ \t]*export\s*(?:\{|\*)").unwrap();
    static ref EXPORT_DECL_RE: Regex = Regex::new(
        r"(?m)^([ \t]*)export\s+(?:default\s+)?((?:async\s+)?function\b|class\b|const\b|let\b|var\b|abstract\b|interface\b|type\b|enum\b|declare\b)"
    )
    .unwrap();
    static ref EXPORT_DEFAULT_RE: Regex = Regex::new(r"(?m)^([ \t]*)export\s+default\s+").unwrap();
    static ref METHOD_RE: Regex = Regex::new(
        r"^((?:(?:static|public|private|protected|override)\s+)*)(async\s+)?(?:(?:get|set)\s+)?(\*?)\s*([A-Za-z_$][\w$]*)\s*(?:<[^(]*>)?\s*\("
    )
    .unwrap();
}

/// Normalizes a raw fragment into plain runtime JavaScript.
pub fn normalize(code: &str) -> NormalizedFragment {
    let code = remove_type_imports(code);
    let (code, stripped_modules) = strip_modules(&code);
    let code = remove_exports(&code);
    let code = erase_types(&code);
    let code = rewrite_method_shorthand(&code);
    debug!(
        bytes = code.len(),
        stripped = stripped_modules.len(),
        "fragment normalized"
    );
    NormalizedFragment {
        code,
        stripped_modules,
    }
}

fn push_unique(modules: &mut Vec<String>, specifier: &str) {
    if !modules.iter().any(|m| m == specifier) {
        modules.push(specifier.to_string());
    }
}

/// Index just past trailing blanks, an optional `;`, and the newline when
/// nothing else follows on the line.
fn statement_tail(code: &str, mut end: usize) -> usize {
    let bytes = code.as_bytes();
    while end < bytes.len() && (bytes[end] == b' ' || bytes[end] == b'\t') {
        end += 1;
    }
    if bytes.get(end) == Some(&b';') {
        end += 1;
    }
    let mut k = end;
    while k < bytes.len() && (bytes[k] == b' ' || bytes[k] == b'\t') {
        k += 1;
    }
    if bytes.get(k) == Some(&b'\n') {
        k + 1
    } else {
        k
    }
}

/// Removes ES imports and `require` bindings, collecting their specifiers
/// in first-seen order.
fn strip_modules(code: &str) -> (String, Vec<String>) {
    let masked = mask_non_code(code);
    let bytes = masked.as_bytes();
    let mut modules = Vec::new();
    let mut edits = Vec::new();

    for m in IMPORT_RE.find_iter(&masked) {
        // dynamic `import(...)` and `import.meta` stay
        if matches!(next_significant(&masked, m.end()), Some((_, b'(' | b'.'))) {
            continue;
        }
        let rest = &masked[m.end()..];
        let Some(quote_rel) = rest.find(|c: char| c == '\'' || c == '"') else {
            continue;
        };
        if rest[..quote_rel].contains(';') {
            continue;
        }
        let open = m.end() + quote_rel;
        let Some(close_rel) = masked[open + 1..].find(bytes[open] as char) else {
            continue;
        };
        let close = open + 1 + close_rel;
        push_unique(&mut modules, &code[open + 1..close]);
        edits.push((m.start(), statement_tail(code, close + 1), String::new()));
    }

    for cap in REQUIRE_LINE_RE.captures_iter(&masked) {
        let (Some(whole), Some(quote)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let open = quote.start();
        let Some(close_rel) = masked[open + 1..].find(quote.as_str()) else {
            continue;
        };
        let close = open + 1 + close_rel;
        let Some(paren_rel) = masked[close..].find(')') else {
            continue;
        };
        push_unique(&mut modules, &code[open + 1..close]);
        edits.push((whole.start(), statement_tail(code, close + paren_rel + 1), String::new()));
    }

    (apply_edits(code, edits), modules)
}

/// Drops export lists and re-exports, and the `export`/`export default`
/// token in front of declarations and expressions.
fn remove_exports(code: &str) -> String {
    let masked = mask_non_code(code);
    let mut edits = Vec::new();

    for m in EXPORT_LIST_RE.find_iter(&masked) {
        let mut end = m.end();
        if masked.as_bytes()[end - 1] == b'{' {
            match find_balanced(&masked, end - 1) {
                Some(close) => end = close + 1,
                None => continue,
            }
        }
        let rest = &masked[end..];
        let line_end = rest.find(|c: char| c == ';' || c == '\n').unwrap_or(rest.len());
        edits.push((m.start(), statement_tail(code, end + line_end), String::new()));
    }

    for cap in EXPORT_DECL_RE.captures_iter(&masked) {
        let (Some(indent), Some(decl)) = (cap.get(1), cap.get(2)) else {
            continue;
        };
        edits.push((indent.end(), decl.start(), String::new()));
    }

    for cap in EXPORT_DEFAULT_RE.captures_iter(&masked) {
        let (Some(whole), Some(indent)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        edits.push((indent.end(), whole.end(), String::new()));
    }

    apply_edits(code, edits)
}

/// Rewrites a fragment that is exactly one method definition into a
/// standalone function declaration with a stripped parameter list.
fn rewrite_method_shorthand(code: &str) -> String {
    let masked = mask_non_code(code);
    let Some(cap) = METHOD_RE.captures(&masked) else {
        return code.to_string();
    };
    let (Some(head), Some(name)) = (cap.get(0), cap.get(4)) else {
        return code.to_string();
    };
    if is_keyword(name.as_str()) && name.as_str() != "constructor" {
        return code.to_string();
    }
    let open = head.end() - 1;
    let Some(close) = find_balanced(&masked, open) else {
        return code.to_string();
    };
    if !body_follows(&masked, close + 1) {
        return code.to_string();
    }
    let Some((brace, _)) = next_significant(&masked, close + 1).filter(|(_, b)| *b == b'{') else {
        return code.to_string();
    };
    // the method body must be the whole remaining fragment
    if find_balanced(&masked, brace) != Some(masked.trim_end().len() - 1) {
        return code.to_string();
    }

    let is_async = cap.get(2).is_some();
    let generator = cap.get(3).map_or("", |m| m.as_str());
    let declaration = format!(
        "{}function{} {}({})",
        if is_async { "async " } else { "" },
        generator,
        name.as_str(),
        strip_parameter_list(&code[open + 1..close])
    );
    tidy_whitespace(&apply_edits(code, vec![(0, close + 1, declaration)]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_import_before_code() {
        let out = normalize("import { x } from \"./m\"; return x + 1;");
        assert_eq!(out.code, "return x + 1;");
        assert_eq!(out.stripped_modules, vec!["./m"]);
    }

    #[test]
    fn test_import_forms_and_dedup() {
        let out = normalize(
            "import a from 'lib';\nimport * as ns from \"ns\";\nimport 'side-effect';\nimport {\n  b,\n  c,\n} from 'lib';\nconst fs = require('fs');\nconst { join } = require(\"path\");\nrun(a, ns, b, c, fs, join);",
        );
        assert_eq!(out.code, "run(a, ns, b, c, fs, join);");
        assert_eq!(out.stripped_modules, vec!["lib", "ns", "side-effect", "fs", "path"]);
    }

    #[test]
    fn test_type_imports_are_not_recorded() {
        let out = normalize("import type { User } from './types';\nimport { type Id, load } from './store';\nreturn load();");
        assert_eq!(out.code, "return load();");
        assert_eq!(out.stripped_modules, vec!["./store"]);
    }

    #[test]
    fn test_dynamic_import_kept() {
        let out = normalize("const mod = await import('./lazy');\nconsole.log(import.meta.url);");
        assert_eq!(out.code, "const mod = await import('./lazy');\nconsole.log(import.meta.url);");
        assert!(out.stripped_modules.is_empty());
    }

    #[test]
    fn test_exports_removed() {
        let out = normalize(
            "export const a = 1;\nexport default function main() { return a; }\nexport { a as b };\nexport * from './all';\nexport async function go() {}",
        );
        assert_eq!(out.code, "const a = 1;\nfunction main() { return a; }\nasync function go() {}");
    }

    #[test]
    fn test_method_shorthand_rewritten() {
        let out = normalize("async save(user: User, opts?: Options): Promise<void> {\n  await this.db.put(user, opts);\n}");
        assert_eq!(out.code, "async function save(user, opts) {\n  await this.db.put(user, opts);\n}");
    }

    #[test]
    fn test_static_getter_rewritten() {
        let out = normalize("static get total(): number {\n  return this.items.length;\n}");
        assert_eq!(out.code, "function total() {\n  return this.items.length;\n}");
    }

    #[test]
    fn test_calls_are_not_methods() {
        let code = "process(items);\nreturn done;";
        assert_eq!(normalize(code).code, code);
        let block = "if (ready) {\n  go();\n}";
        assert_eq!(normalize(block).code, block);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let raw = "import { api } from './api';\nexport async function load(id: string): Promise<User> {\n  const res = await api.get<User>(id) as User;\n  return res!;\n}";
        let once = normalize(raw);
        let twice = normalize(&once.code);
        assert_eq!(once.code, twice.code);
        assert!(twice.stripped_modules.is_empty());
        assert_eq!(
            once.code,
            "async function load(id) {\n  const res = await api.get(id);\n  return res;\n}"
        );
    }
}
