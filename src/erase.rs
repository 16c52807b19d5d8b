//! Best-effort TypeScript type erasure.
//!
//! Each stage is a textual rewrite over masked source, so string, template,
//! comment and regex contents are never touched. Stages are idempotent and
//! total: code they do not recognise passes through unchanged.

use lazy_static::lazy_static;
use regex::Regex;

use crate::globals::is_keyword;
use crate::params::strip_parameter_list;
use crate::scan::{
    apply_edits, code_map, find_balanced, find_opening, find_top_level_assignment,
    is_ident_char, is_ident_start, mask_non_code, next_significant, preceded_by_member_dot,
    prev_significant, split_top_level, word_before, DepthTracker,
};

type Edit = (usize, usize, String);

lazy_static! {
    static ref TYPE_IMPORT_RE: Regex = Regex::new(r"(?m)^[ \t]*import\s+type\b").unwrap();
    static ref IMPORT_CLAUSE_RE: Regex = Regex::new(r"(?m)^[ \t]*import\s*\{").unwrap();
    static ref TYPE_DECL_RE: Regex = Regex::new(
        r"(?m)^[ \t]*(?:export\s+)?(?:declare\s+)?(interface|type)\s+[A-Za-z_$][\w$]*"
    )
    .unwrap();
    static ref FUNCTION_KEYWORD_RE: Regex =
        Regex::new(r"\bfunction\b\s*\*?\s*(?:[A-Za-z_$][\w$]*)?\s*").unwrap();
    static ref DECLARATOR_RE: Regex = Regex::new(r"\b(?:const|let|var)\s+").unwrap();
    static ref CATCH_PARAM_RE: Regex =
        Regex::new(r"\bcatch\s*\(\s*[A-Za-z_$][\w$]*\s*:").unwrap();
    static ref CAST_RE: Regex = Regex::new(r"\s+(?:as|satisfies)\s+").unwrap();
    static ref GENERIC_HEAD_RE: Regex = Regex::new(r"[A-Za-z_$][\w$]*<").unwrap();
    static ref MODIFIER_RE: Regex =
        Regex::new(r"\b(?:public|private|protected|readonly|abstract|override)\s+").unwrap();
    static ref CLASS_HEAD_RE: Regex = Regex::new(r"\bclass\b[^{;()=]*\{").unwrap();
    static ref DECLARE_RE: Regex = Regex::new(r"(?m)^[ \t]*(?:export\s+)?declare\s+").unwrap();
    static ref ENUM_RE: Regex = Regex::new(
        r"(?m)^[ \t]*(?:export\s+)?(?:declare\s+)?(?:const\s+)?enum\s+[A-Za-z_$][\w$]*\s*\{"
    )
    .unwrap();
    static ref IMPLEMENTS_RE: Regex = Regex::new(r"\s+implements\s+").unwrap();
}

/// Words that may precede a class field name.
const FIELD_MODIFIERS: [&str; 9] = [
    "public",
    "private",
    "protected",
    "readonly",
    "static",
    "abstract",
    "override",
    "declare",
    "accessor",
];

/// Words that prefix a type operand without completing it.
const TYPE_PREFIX_WORDS: [&str; 7] = [
    "typeof", "keyof", "readonly", "unique", "infer", "new", "asserts",
];

/// Runs stages 2 through 6. Import handling (stage 1 and module stripping)
/// happens in the normalizer first.
pub fn erase_types(code: &str) -> String {
    let code = remove_type_declarations(code);
    let code = remove_return_types(&code);
    let code = strip_function_parameters(&code);
    let code = remove_inline_types(&code);
    tidy_whitespace(&code)
}

// ═══════════════════════════════════════════════════════════════════════════════
// SHARED SCANNING
// ═══════════════════════════════════════════════════════════════════════════════

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

fn skip_identifier(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && is_ident_char(bytes[i]) {
        i += 1;
    }
    i
}

/// Scans one type starting at `start` and returns the index just past it,
/// or `None` if no complete type is there.
fn scan_type(masked: &str, start: usize) -> Option<usize> {
    let bytes = masked.as_bytes();
    let mut i = start;
    let mut expect_operand = true;
    let mut end = None;

    loop {
        let j = skip_whitespace(bytes, i);
        if j >= bytes.len() {
            break;
        }
        let c = bytes[j];
        if expect_operand {
            match c {
                b'|' | b'&' => {
                    i = j + 1;
                    continue;
                }
                b'(' => {
                    let close = find_balanced(masked, j)?;
                    let after = skip_whitespace(bytes, close + 1);
                    if masked[after..].starts_with("=>") {
                        // function type: the return type follows
                        i = after + 2;
                        continue;
                    }
                    i = close + 1;
                }
                b'{' | b'[' => i = find_balanced(masked, j)? + 1,
                b'\'' | b'"' | b'`' => {
                    let close = masked[j + 1..].find(c as char)?;
                    i = j + 1 + close + 1;
                }
                b'-' | b'0'..=b'9' => {
                    let mut k = j + 1;
                    while k < bytes.len()
                        && (bytes[k].is_ascii_alphanumeric() || bytes[k] == b'.')
                    {
                        k += 1;
                    }
                    i = k;
                }
                c if is_ident_start(c) => {
                    let word_end = skip_identifier(bytes, j);
                    let word = &masked[j..word_end];
                    if TYPE_PREFIX_WORDS.contains(&word) {
                        let next = skip_whitespace(bytes, word_end);
                        if next > word_end
                            && next < bytes.len()
                            && (is_ident_start(bytes[next]) || b"([{".contains(&bytes[next]))
                        {
                            i = next;
                            continue;
                        }
                    }
                    let mut k = word_end;
                    while k + 1 < bytes.len() && bytes[k] == b'.' && is_ident_start(bytes[k + 1]) {
                        k = skip_identifier(bytes, k + 1);
                    }
                    if bytes.get(k) == Some(&b'<') {
                        k = find_balanced(masked, k)? + 1;
                    }
                    i = k;
                }
                _ => return None,
            }
            expect_operand = false;
            end = Some(i);
        } else {
            match c {
                b'[' if bytes.get(j + 1) == Some(&b']') => i = j + 2,
                b'[' => i = find_balanced(masked, j)? + 1,
                b'|' if bytes.get(j + 1) != Some(&b'|') => {
                    i = j + 1;
                    expect_operand = true;
                    continue;
                }
                b'&' if bytes.get(j + 1) != Some(&b'&') => {
                    i = j + 1;
                    expect_operand = true;
                    continue;
                }
                b'i' if masked[j..].starts_with("is") && !bytes.get(j + 2).is_some_and(|&b| is_ident_char(b)) => {
                    i = j + 2;
                    expect_operand = true;
                    continue;
                }
                _ => break,
            }
            end = Some(i);
        }
    }

    if expect_operand {
        None
    } else {
        end
    }
}

/// End of the statement starting at `from`: past a depth-zero `;`, or at a
/// depth-zero newline that does not continue the statement, or at a closer
/// that leaves the enclosing group.
fn statement_end(masked: &str, from: usize) -> usize {
    let bytes = masked.as_bytes();
    let mut tracker = DepthTracker::with_angles();
    for i in from..bytes.len() {
        let c = bytes[i];
        if tracker.at_top() {
            match c {
                b';' => return i + 1,
                b'\n' => {
                    let prev = prev_significant(masked, i).map(|(_, b)| b);
                    let next = next_significant(masked, i).map(|(_, b)| b);
                    let continues = matches!(
                        prev,
                        Some(b'=' | b'|' | b'&' | b',' | b':' | b'<' | b'(' | b'{' | b'[')
                    )
                        || matches!(next, Some(b'|' | b'&' | b'.' | b'?' | b'{'));
                    if !continues {
                        return i;
                    }
                }
                b')' | b']' | b'}' => return i,
                _ => {}
            }
        }
        tracker.step(bytes, i);
        if tracker.depth < 0 {
            return i;
        }
    }
    bytes.len()
}

/// Extends `end` over trailing blanks and one newline when nothing else
/// follows on the line.
fn through_line_end(code: &str, end: usize) -> usize {
    let rest = &code[end..];
    let line = rest.find('\n').map_or(rest, |p| &rest[..p]);
    if line.trim().is_empty() {
        (end + line.len() + 1).min(code.len())
    } else {
        end
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STAGE 1: TYPE-ONLY IMPORTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Removes `import type` statements and `type X` specifiers inside import
/// clauses. A clause left with no specifiers removes its statement.
pub fn remove_type_imports(code: &str) -> String {
    let masked = mask_non_code(code);
    let mut edits: Vec<Edit> = Vec::new();

    for m in TYPE_IMPORT_RE.find_iter(&masked) {
        let end = statement_end(&masked, m.end());
        edits.push((m.start(), through_line_end(code, end), String::new()));
    }

    for m in IMPORT_CLAUSE_RE.find_iter(&masked) {
        let open = m.end() - 1;
        let Some(close) = find_balanced(&masked, open) else {
            continue;
        };
        let inner = &masked[open + 1..close];
        let parts = split_top_level(inner, b',', false);
        let mut kept = Vec::new();
        let mut dropped = false;
        for range in parts {
            let spec = inner[range.clone()].trim();
            if spec.is_empty() {
                continue;
            }
            if spec.starts_with("type ") {
                dropped = true;
            } else {
                kept.push(code[open + 1 + range.start..open + 1 + range.end].trim().to_string());
            }
        }
        if !dropped {
            continue;
        }
        if kept.is_empty() {
            let end = statement_end(&masked, close + 1);
            edits.push((m.start(), through_line_end(code, end), String::new()));
        } else {
            edits.push((open + 1, close, format!(" {} ", kept.join(", "))));
        }
    }

    apply_edits(code, edits)
}

// ═══════════════════════════════════════════════════════════════════════════════
// STAGE 2: INTERFACES AND TYPE ALIASES
// ═══════════════════════════════════════════════════════════════════════════════

fn remove_type_declarations(code: &str) -> String {
    let masked = mask_non_code(code);
    let bytes = masked.as_bytes();
    let mut edits: Vec<Edit> = Vec::new();

    for cap in TYPE_DECL_RE.captures_iter(&masked) {
        let (Some(whole), Some(kind)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let mut after = skip_whitespace(bytes, whole.end());
        if bytes.get(after) == Some(&b'<') {
            match find_balanced(&masked, after) {
                Some(close) => after = skip_whitespace(bytes, close + 1),
                None => continue,
            }
        }
        let end = if kind.as_str() == "interface" {
            let Some(open) = masked[after..].find('{').map(|p| after + p) else {
                continue;
            };
            let Some(close) = find_balanced(&masked, open) else {
                continue;
            };
            let mut end = close + 1;
            if bytes.get(end) == Some(&b';') {
                end += 1;
            }
            end
        } else {
            if bytes.get(after) != Some(&b'=') || bytes.get(after + 1) == Some(&b'=') {
                continue;
            }
            statement_end(&masked, after + 1)
        };
        edits.push((whole.start(), through_line_end(code, end), String::new()));
    }

    apply_edits(code, edits)
}

// ═══════════════════════════════════════════════════════════════════════════════
// STAGE 3: RETURN TYPES
// ═══════════════════════════════════════════════════════════════════════════════

fn remove_return_types(code: &str) -> String {
    let masked = mask_non_code(code);
    let bytes = masked.as_bytes();
    let mut edits: Vec<Edit> = Vec::new();

    for (close, _) in masked.match_indices(')') {
        let Some((colon, b':')) = next_significant(&masked, close + 1) else {
            continue;
        };
        let Some(open) = find_opening(&masked, close) else {
            continue;
        };
        if !heads_parameter_list(&masked, open) {
            continue;
        }
        let Some(type_end) = scan_type(&masked, colon + 1) else {
            continue;
        };
        let follows_body = match next_significant(&masked, type_end) {
            Some((_, b'{')) => true,
            Some((k, b'=')) => bytes.get(k + 1) == Some(&b'>'),
            _ => false,
        };
        if follows_body {
            edits.push((colon, type_end, String::new()));
        }
    }

    apply_edits(code, edits)
}

/// True if the `(` at `open` starts a function, method or arrow parameter
/// list rather than a condition or a grouping.
fn heads_parameter_list(masked: &str, open: usize) -> bool {
    let word = word_before(masked, open);
    if !word.is_empty() {
        return !is_keyword(word) || word == "function" || word == "async";
    }
    match prev_significant(masked, open) {
        None => true,
        Some((_, b)) => b"=(,:{;>*|&".contains(&b),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STAGE 4: FUNCTION PARAMETER LISTS
// ═══════════════════════════════════════════════════════════════════════════════

fn strip_function_parameters(code: &str) -> String {
    let masked = mask_non_code(code);
    let bytes = masked.as_bytes();
    let mut edits: Vec<Edit> = Vec::new();

    for m in FUNCTION_KEYWORD_RE.find_iter(&masked) {
        let mut open = m.end();
        if bytes.get(open) == Some(&b'<') {
            let Some(close) = find_balanced(&masked, open) else {
                continue;
            };
            edits.push((open, close + 1, String::new()));
            open = skip_whitespace(bytes, close + 1);
        }
        if bytes.get(open) != Some(&b'(') {
            continue;
        }
        let Some(close) = find_balanced(&masked, open) else {
            continue;
        };
        let list = &code[open + 1..close];
        let stripped = strip_parameter_list(list);
        if stripped != list {
            edits.push((open + 1, close, stripped));
        }
    }

    apply_edits(code, edits)
}

// ═══════════════════════════════════════════════════════════════════════════════
// STAGE 5: INLINE TYPE SYNTAX
// ═══════════════════════════════════════════════════════════════════════════════

fn remove_inline_types(code: &str) -> String {
    let code = remove_declare_statements(code);
    let code = remove_enums(&code);
    let code = remove_implements_clauses(&code);
    let code = remove_declarator_annotations(&code);
    let code = remove_field_annotations(&code);
    let code = remove_catch_annotations(&code);
    let code = remove_casts(&code);
    let code = remove_type_arguments(&code);
    let code = remove_non_null_assertions(&code);
    remove_modifiers(&code)
}

fn remove_declare_statements(code: &str) -> String {
    let masked = mask_non_code(code);
    let edits = DECLARE_RE
        .find_iter(&masked)
        .map(|m| {
            let end = statement_end(&masked, m.end());
            (m.start(), through_line_end(code, end), String::new())
        })
        .collect();
    apply_edits(code, edits)
}

fn remove_enums(code: &str) -> String {
    let masked = mask_non_code(code);
    let edits = ENUM_RE
        .find_iter(&masked)
        .filter_map(|m| {
            let close = find_balanced(&masked, m.end() - 1)?;
            Some((m.start(), through_line_end(code, close + 1), String::new()))
        })
        .collect();
    apply_edits(code, edits)
}

fn remove_implements_clauses(code: &str) -> String {
    let masked = mask_non_code(code);
    let edits = IMPLEMENTS_RE
        .find_iter(&masked)
        .filter_map(|m| {
            let rest = &masked[m.end()..];
            let brace = rest.find('{')?;
            if rest[..brace].contains(|c: char| c == ';' || c == '(' || c == '=') {
                return None;
            }
            Some((m.start(), m.end() + brace, " ".to_string()))
        })
        .collect();
    apply_edits(code, edits)
}

fn remove_declarator_annotations(code: &str) -> String {
    let masked = mask_non_code(code);
    let bytes = masked.as_bytes();
    let mut edits: Vec<Edit> = Vec::new();

    for m in DECLARATOR_RE.find_iter(&masked) {
        let start = m.end();
        let mut end = statement_end(&masked, start);
        if end > start && bytes[end - 1] == b';' {
            end -= 1;
        }
        for range in split_top_level(&masked[start..end], b',', true) {
            let part_end = start + range.end;
            let binding_start = skip_whitespace(bytes, start + range.start);
            if binding_start >= part_end {
                continue;
            }
            let binding_end = match bytes[binding_start] {
                b'{' | b'[' => match find_balanced(&masked, binding_start) {
                    Some(close) if close < part_end => close + 1,
                    _ => continue,
                },
                b if is_ident_start(b) => skip_identifier(bytes, binding_start),
                _ => continue,
            };
            let mut colon = skip_whitespace(bytes, binding_end);
            // definite assignment `let x!: T`
            if bytes.get(colon) == Some(&b'!') {
                colon = skip_whitespace(bytes, colon + 1);
            }
            if colon >= part_end || bytes[colon] != b':' {
                continue;
            }
            match find_top_level_assignment(&masked[colon..part_end]) {
                Some(eq) => edits.push((binding_end, colon + eq, " ".to_string())),
                None => {
                    let type_end = colon + masked[colon..part_end].trim_end().len();
                    edits.push((binding_end, type_end, String::new()));
                }
            }
        }
    }

    apply_edits(code, edits)
}

/// `name[?!]: Type (= init)?;` at class-body depth becomes `name (= init)?;`.
fn remove_field_annotations(code: &str) -> String {
    let masked = mask_non_code(code);
    let bytes = masked.as_bytes();
    let mut edits: Vec<Edit> = Vec::new();

    for m in CLASS_HEAD_RE.find_iter(&masked) {
        let open = m.end() - 1;
        let Some(close) = find_balanced(&masked, open) else {
            continue;
        };
        let mut i = open + 1;
        while i < close {
            i = skip_whitespace(bytes, i);
            if i >= close {
                break;
            }
            let next = match field_at(&masked, i) {
                Some((name_end, after_name)) => {
                    let end = statement_end(&masked, after_name).min(close);
                    if bytes[after_name] == b':' {
                        let mut type_end = end;
                        if type_end > after_name && bytes[type_end - 1] == b';' {
                            type_end -= 1;
                        }
                        match find_top_level_assignment(&masked[after_name..type_end]) {
                            Some(eq) => edits.push((name_end, after_name + eq, " ".to_string())),
                            None => {
                                let trimmed = masked[after_name..type_end].trim_end().len();
                                edits.push((name_end, after_name + trimmed, String::new()));
                            }
                        }
                    }
                    end
                }
                None => member_end(bytes, i, close),
            };
            i = next.max(i + 1);
        }
    }

    apply_edits(code, edits)
}

/// If a field declaration starts at `start`, returns the end of its name and
/// the position of the `:`, `=`, `;` or line break that follows it (past any
/// `?`/`!` marker).
fn field_at(masked: &str, start: usize) -> Option<(usize, usize)> {
    let bytes = masked.as_bytes();
    let mut i = start;
    loop {
        let word_end = skip_identifier(bytes, i);
        let word = &masked[i..word_end];
        let after = skip_whitespace(bytes, word_end);
        let followed_by_name = bytes
            .get(after)
            .is_some_and(|&b| is_ident_start(b) || b == b'#');
        if FIELD_MODIFIERS.contains(&word) && followed_by_name {
            i = after;
        } else {
            break;
        }
    }
    if bytes.get(i) == Some(&b'#') {
        i += 1;
    }
    if !bytes.get(i).is_some_and(|&b| is_ident_start(b)) {
        return None;
    }
    let name_end = skip_identifier(bytes, i);
    let mut k = name_end;
    while k < bytes.len() && (bytes[k] == b' ' || bytes[k] == b'\t') {
        k += 1;
    }
    if matches!(bytes.get(k), Some(b'?') | Some(b'!')) {
        k += 1;
        while k < bytes.len() && (bytes[k] == b' ' || bytes[k] == b'\t') {
            k += 1;
        }
    }
    match bytes.get(k) {
        Some(b':') | Some(b';') | Some(b'\n') | Some(b'\r') | Some(b'}') => Some((name_end, k)),
        Some(b'=') if bytes.get(k + 1) != Some(&b'>') => Some((name_end, k)),
        _ => None,
    }
}

/// End of a non-field class member: past its depth-zero `;` or past the
/// brace that closes its body.
fn member_end(bytes: &[u8], from: usize, close: usize) -> usize {
    let mut depth = 0i32;
    for i in from..close {
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' => depth -= 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return i + 1;
                }
            }
            b';' if depth == 0 => return i + 1,
            _ => {}
        }
    }
    close
}

fn remove_catch_annotations(code: &str) -> String {
    let masked = mask_non_code(code);
    let edits = CATCH_PARAM_RE
        .find_iter(&masked)
        .filter_map(|m| {
            let colon = m.end() - 1;
            let open = masked[m.start()..].find('(')? + m.start();
            let close = find_balanced(&masked, open)?;
            let name_end = masked[..colon].trim_end().len();
            Some((name_end, close, String::new()))
        })
        .collect();
    apply_edits(code, edits)
}

fn remove_casts(code: &str) -> String {
    let masked = mask_non_code(code);
    let mut edits: Vec<Edit> = Vec::new();

    for m in CAST_RE.find_iter(&masked) {
        let Some((_, prev)) = prev_significant(&masked, m.start()) else {
            continue;
        };
        let operand_before = is_ident_char(prev) || b")]}!'\"`".contains(&prev);
        if !operand_before || in_module_clause(&masked, m.start()) {
            continue;
        }
        if let Some(type_end) = scan_type(&masked, m.end()) {
            edits.push((m.start(), type_end, String::new()));
        }
    }

    apply_edits(code, edits)
}

/// True if `idx` sits inside an `import`/`export` specifier clause.
fn in_module_clause(masked: &str, idx: usize) -> bool {
    let line_start = masked[..idx].rfind('\n').map_or(0, |p| p + 1);
    let line = masked[line_start..idx].trim_start();
    line.starts_with("import") || line.starts_with("export {") || line.starts_with("export *")
}

fn remove_type_arguments(code: &str) -> String {
    let masked = mask_non_code(code);
    let bytes = masked.as_bytes();
    let mut edits: Vec<Edit> = Vec::new();

    for m in GENERIC_HEAD_RE.find_iter(&masked) {
        if m.start() > 0 && is_ident_char(bytes[m.start() - 1]) {
            continue;
        }
        let open = m.end() - 1;
        let Some(close) = find_balanced(&masked, open) else {
            continue;
        };
        let content = &masked[open + 1..close];
        if !is_type_like(content) {
            continue;
        }
        let head_word = word_before(&masked, m.start());
        let next_word = masked[close + 1..]
            .trim_start()
            .split(|c: char| !c.is_alphanumeric())
            .next()
            .unwrap_or("");
        let applies = match next_significant(&masked, close + 1) {
            Some((_, b'(')) => true,
            Some((_, b'{')) => matches!(head_word, "class" | "extends"),
            _ => matches!(next_word, "extends" | "implements"),
        };
        if applies {
            edits.push((open, close + 1, String::new()));
        }
    }

    apply_edits(code, edits)
}

fn is_type_like(content: &str) -> bool {
    !content.trim().is_empty()
        && !content.contains("&&")
        && !content.contains("||")
        && !content.contains("==")
        && content.bytes().all(|b| {
            is_ident_char(b) || b.is_ascii_whitespace() || b",.|&[]{}():;?'\"<>=`".contains(&b)
        })
}

fn remove_non_null_assertions(code: &str) -> String {
    let masked = mask_non_code(code);
    let bytes = masked.as_bytes();
    let edits = masked
        .match_indices('!')
        .filter(|&(i, _)| {
            i > 0
                && (is_ident_char(bytes[i - 1]) || bytes[i - 1] == b')' || bytes[i - 1] == b']')
                && bytes.get(i + 1) != Some(&b'=')
                && !is_keyword(word_before(&masked, i))
        })
        .map(|(i, _)| (i, i + 1, String::new()))
        .collect();
    apply_edits(code, edits)
}

fn remove_modifiers(code: &str) -> String {
    let masked = mask_non_code(code);
    let bytes = masked.as_bytes();
    let edits = MODIFIER_RE
        .find_iter(&masked)
        .filter(|m| {
            !preceded_by_member_dot(&masked, m.start())
                && bytes
                    .get(m.end())
                    .is_some_and(|&b| is_ident_start(b) || b == b'[' || b == b'#')
        })
        .map(|m| (m.start(), m.end(), String::new()))
        .collect();
    apply_edits(code, edits)
}

// ═══════════════════════════════════════════════════════════════════════════════
// STAGE 6: WHITESPACE
// ═══════════════════════════════════════════════════════════════════════════════

/// Strips trailing whitespace, collapses blank-line runs and trims. Template
/// literal text is left alone.
pub fn tidy_whitespace(code: &str) -> String {
    let map = code_map(code);
    let mut out = String::with_capacity(code.len());
    let mut offset = 0;
    let mut blank_run = 0;

    for line in code.split_inclusive('\n') {
        let has_newline = line.ends_with('\n');
        let body = line.strip_suffix('\n').unwrap_or(line);
        let kept = body.trim_end();
        let trailing_is_code = (offset + kept.len()..offset + body.len()).all(|i| map[i]);
        let body = if trailing_is_code { kept } else { body };
        let newline_is_code = has_newline && map[offset + line.len() - 1];

        if body.is_empty() && newline_is_code {
            blank_run += 1;
            if blank_run > 1 {
                offset += line.len();
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(body);
        if has_newline {
            out.push('\n');
        }
        offset += line.len();
    }

    out.trim().to_string()
}
