//! Lexical helpers shared by the analyzer, the eraser and the generator.
//!
//! Everything that scans source text works on a *masked* copy produced by
//! [`mask_non_code`]: string, template, comment and regex contents are blanked
//! out, so delimiter counting and pattern matching never trip over them. The
//! masked copy has the same byte length as the input, so offsets found in it
//! can be applied directly to the original text.

use std::ops::Range;

pub fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$' || b >= 0x80
}

pub fn is_ident_char(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}

/// Returns true if `name` is a plain identifier.
pub fn is_identifier(name: &str) -> bool {
    let bytes = name.as_bytes();
    match bytes.first() {
        Some(&first) if is_ident_start(first) => bytes[1..].iter().all(|&b| is_ident_char(b)),
        _ => false,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MASKING
// ═══════════════════════════════════════════════════════════════════════════════

enum TemplateStop {
    /// Index just past the closing backtick.
    Closed(usize),
    /// Index just past the `${` that opened an interpolation.
    Interpolation(usize),
}

/// Words after which a `/` starts a regex literal rather than a division.
const REGEX_PRECEDING_WORDS: [&str; 14] = [
    "return",
    "typeof",
    "case",
    "do",
    "else",
    "in",
    "of",
    "new",
    "delete",
    "void",
    "throw",
    "instanceof",
    "yield",
    "await",
];

/// Blanks string, template text, comment and regex contents. Quotes, backticks,
/// regex slashes, `${ }` interpolations and newlines are kept.
pub fn mask_non_code(code: &str) -> String {
    String::from_utf8(mask_bytes(code, b' ')).unwrap_or_else(|_| code.to_string())
}

/// Per-byte flag: true where the byte is code rather than string, template,
/// comment or regex content.
pub fn code_map(code: &str) -> Vec<bool> {
    mask_bytes(code, 0).into_iter().map(|b| b != 0).collect()
}

fn mask_bytes(code: &str, fill: u8) -> Vec<u8> {
    let bytes = code.as_bytes();
    let len = bytes.len();
    let mut out = bytes.to_vec();
    let mut i = 0;
    let mut brace_depth = 0usize;
    let mut template_stack: Vec<usize> = Vec::new();
    let mut last_code: Option<usize> = None;

    while i < len {
        let c = bytes[i];
        let next = bytes.get(i + 1).copied();
        match c {
            b'/' if next == Some(b'/') => {
                let end = bytes[i..]
                    .iter()
                    .position(|&b| b == b'\n')
                    .map_or(len, |p| i + p);
                blank(&mut out, fill, i, end);
                i = end;
                continue;
            }
            b'/' if next == Some(b'*') => {
                let end = find_subslice(bytes, i + 2, b"*/").map_or(len, |p| p + 2);
                blank(&mut out, fill, i, end);
                i = end;
                continue;
            }
            b'\'' | b'"' => {
                let end = skip_quoted(bytes, i);
                blank(&mut out, fill, i + 1, end);
                last_code = Some(i);
                i = if end < len && bytes[end] == c { end + 1 } else { end };
                continue;
            }
            b'`' => {
                i = enter_template(
                    bytes,
                    &mut out,
                    fill,
                    i + 1,
                    &mut template_stack,
                    &mut brace_depth,
                );
                last_code = Some(i.saturating_sub(1));
                continue;
            }
            b'/' if regex_allowed(bytes, last_code) => {
                if let Some((close, end)) = regex_end(bytes, i) {
                    blank(&mut out, fill, i + 1, close);
                    blank(&mut out, fill, close + 1, end);
                    last_code = Some(close);
                    i = end;
                    continue;
                }
            }
            b'{' => brace_depth += 1,
            b'}' => {
                brace_depth = brace_depth.saturating_sub(1);
                if template_stack.last() == Some(&brace_depth) {
                    template_stack.pop();
                    i = enter_template(
                        bytes,
                        &mut out,
                        fill,
                        i + 1,
                        &mut template_stack,
                        &mut brace_depth,
                    );
                    last_code = Some(i.saturating_sub(1));
                    continue;
                }
            }
            _ => {}
        }
        if !c.is_ascii_whitespace() {
            last_code = Some(i);
        }
        i += 1;
    }

    out
}

fn enter_template(
    bytes: &[u8],
    out: &mut [u8],
    fill: u8,
    start: usize,
    template_stack: &mut Vec<usize>,
    brace_depth: &mut usize,
) -> usize {
    match mask_template_text(bytes, out, fill, start) {
        TemplateStop::Closed(next) => next,
        TemplateStop::Interpolation(next) => {
            template_stack.push(*brace_depth);
            *brace_depth += 1;
            next
        }
    }
}

fn mask_template_text(bytes: &[u8], out: &mut [u8], fill: u8, start: usize) -> TemplateStop {
    let mut j = start;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => {
                blank(out, fill, j, (j + 2).min(bytes.len()));
                j += 2;
            }
            b'`' => return TemplateStop::Closed(j + 1),
            b'$' if bytes.get(j + 1) == Some(&b'{') => return TemplateStop::Interpolation(j + 2),
            b'\n' if fill != 0 => j += 1,
            _ => {
                out[j] = fill;
                j += 1;
            }
        }
    }
    TemplateStop::Closed(bytes.len())
}

fn skip_quoted(bytes: &[u8], open: usize) -> usize {
    let quote = bytes[open];
    let mut j = open + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 2,
            b'\n' => return j,
            c if c == quote => return j,
            _ => j += 1,
        }
    }
    bytes.len()
}

fn regex_allowed(bytes: &[u8], last_code: Option<usize>) -> bool {
    let Some(k) = last_code else {
        return true;
    };
    let prev = bytes[k];
    if b"(,=:[!&|?{};+-*%<>~^}".contains(&prev) {
        return true;
    }
    if is_ident_char(prev) {
        let mut start = k;
        while start > 0 && is_ident_char(bytes[start - 1]) {
            start -= 1;
        }
        let word = std::str::from_utf8(&bytes[start..=k]).unwrap_or("");
        return REGEX_PRECEDING_WORDS.contains(&word);
    }
    false
}

/// Returns (closing slash index, index past the flags).
fn regex_end(bytes: &[u8], open: usize) -> Option<(usize, usize)> {
    let mut j = open + 1;
    let mut in_class = false;
    while j < bytes.len() {
        match bytes[j] {
            b'\n' => return None,
            b'\\' => {
                j += 2;
                continue;
            }
            b'[' => in_class = true,
            b']' => in_class = false,
            b'/' if !in_class => {
                let close = j;
                j += 1;
                while j < bytes.len() && bytes[j].is_ascii_alphabetic() {
                    j += 1;
                }
                return Some((close, j));
            }
            _ => {}
        }
        j += 1;
    }
    None
}

/// Fills `start..end`, extended over any UTF-8 continuation bytes so the
/// result stays valid text. Newlines are kept unless building a code map.
fn blank(out: &mut [u8], fill: u8, start: usize, end: usize) {
    let mut end = end.min(out.len());
    while end < out.len() && (out[end] & 0xC0) == 0x80 {
        end += 1;
    }
    for b in out.iter_mut().take(end).skip(start) {
        if *b != b'\n' || fill == 0 {
            *b = fill;
        }
    }
}

fn find_subslice(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from >= bytes.len() {
        return None;
    }
    bytes[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| from + p)
}

// ═══════════════════════════════════════════════════════════════════════════════
// BALANCED DELIMITERS
// ═══════════════════════════════════════════════════════════════════════════════

fn closer_for(opener: u8) -> Option<u8> {
    match opener {
        b'(' => Some(b')'),
        b'[' => Some(b']'),
        b'{' => Some(b'}'),
        b'<' => Some(b'>'),
        _ => None,
    }
}

/// Finds the index of the delimiter closing the one at `open`. Expects masked text.
pub fn find_balanced(masked: &str, open: usize) -> Option<usize> {
    let bytes = masked.as_bytes();
    let opener = *bytes.get(open)?;
    let closer = closer_for(opener)?;
    let mut depth = 0usize;
    for i in open..bytes.len() {
        let c = bytes[i];
        if c == opener {
            depth += 1;
        } else if c == closer {
            // `=>` inside a generic argument list is not a closer
            if closer == b'>' && i > 0 && bytes[i - 1] == b'=' {
                continue;
            }
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Tracks `()[]{}` nesting (and optionally `<>`) while walking masked text.
///
/// Once a depth-zero assignment `=` is seen, the rest of the segment is an
/// expression, so `<` only opens a type-argument list when it touches an
/// identifier (`new Map<K, V>()`), never as a spaced comparison (`a < b`).
#[derive(Debug, Default)]
pub(crate) struct DepthTracker {
    pub(crate) depth: i32,
    angle: i32,
    track_angles: bool,
    in_expression: bool,
}

impl DepthTracker {
    pub(crate) fn with_angles() -> Self {
        Self {
            track_angles: true,
            ..Default::default()
        }
    }

    pub(crate) fn step(&mut self, bytes: &[u8], i: usize) {
        match bytes[i] {
            b'(' | b'[' | b'{' => self.depth += 1,
            b')' | b']' | b'}' => self.depth -= 1,
            b'<' if self.track_angles && self.opens_angle(bytes, i) => self.angle += 1,
            b'>' if self.track_angles && self.angle > 0 && (i == 0 || bytes[i - 1] != b'=') => {
                self.angle -= 1
            }
            b'=' if self.track_angles && self.at_top() && is_assignment(bytes, i) => {
                self.in_expression = true
            }
            _ => {}
        }
    }

    fn opens_angle(&self, bytes: &[u8], i: usize) -> bool {
        !self.in_expression || (i > 0 && is_ident_char(bytes[i - 1]))
    }

    /// Starts a new segment after a top-level separator.
    pub(crate) fn next_segment(&mut self) {
        self.in_expression = false;
    }

    pub(crate) fn at_top(&self) -> bool {
        self.depth == 0 && self.angle == 0
    }
}

/// True if the `=` at `i` is an assignment, not part of `=>`, `==`, `!=`,
/// `<=` or `>=`.
fn is_assignment(bytes: &[u8], i: usize) -> bool {
    let next = bytes.get(i + 1).copied();
    let prev = if i > 0 { Some(bytes[i - 1]) } else { None };
    !(matches!(next, Some(b'=') | Some(b'>'))
        || matches!(prev, Some(b'=') | Some(b'!') | Some(b'<') | Some(b'>')))
}

/// Splits masked text at depth-zero occurrences of `sep`, returning byte ranges.
pub fn split_top_level(masked: &str, sep: u8, track_angles: bool) -> Vec<Range<usize>> {
    let bytes = masked.as_bytes();
    let mut tracker = if track_angles {
        DepthTracker::with_angles()
    } else {
        DepthTracker::default()
    };
    let mut parts = Vec::new();
    let mut start = 0;
    for i in 0..bytes.len() {
        if bytes[i] == sep && tracker.at_top() {
            parts.push(start..i);
            start = i + 1;
            tracker.next_segment();
            continue;
        }
        tracker.step(bytes, i);
    }
    parts.push(start..bytes.len());
    parts
}

/// Finds the first depth-zero `=` that is an assignment, not part of `=>`,
/// `==`, `!=`, `<=` or `>=`.
pub fn find_top_level_assignment(masked: &str) -> Option<usize> {
    let bytes = masked.as_bytes();
    let mut tracker = DepthTracker::with_angles();
    for i in 0..bytes.len() {
        if bytes[i] == b'=' && tracker.at_top() && is_assignment(bytes, i) {
            return Some(i);
        }
        tracker.step(bytes, i);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════════
// NEIGHBOURHOOD
// ═══════════════════════════════════════════════════════════════════════════════

/// Finds the opener matching the closer at `close`. Expects masked text.
pub fn find_opening(masked: &str, close: usize) -> Option<usize> {
    let bytes = masked.as_bytes();
    let closer = *bytes.get(close)?;
    let opener = match closer {
        b')' => b'(',
        b']' => b'[',
        b'}' => b'{',
        _ => return None,
    };
    let mut depth = 0usize;
    for i in (0..=close).rev() {
        if bytes[i] == closer {
            depth += 1;
        } else if bytes[i] == opener {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Last non-whitespace byte strictly before `idx`.
pub fn prev_significant(masked: &str, idx: usize) -> Option<(usize, u8)> {
    let bytes = masked.as_bytes();
    let mut i = idx.min(bytes.len());
    while i > 0 {
        i -= 1;
        if !bytes[i].is_ascii_whitespace() {
            return Some((i, bytes[i]));
        }
    }
    None
}

/// First non-whitespace byte at or after `idx`.
pub fn next_significant(masked: &str, idx: usize) -> Option<(usize, u8)> {
    let bytes = masked.as_bytes();
    (idx..bytes.len())
        .find(|&i| !bytes[i].is_ascii_whitespace())
        .map(|i| (i, bytes[i]))
}

/// The identifier ending just before `idx`, skipping whitespace.
pub fn word_before(masked: &str, idx: usize) -> &str {
    let bytes = masked.as_bytes();
    let Some((end, b)) = prev_significant(masked, idx) else {
        return "";
    };
    if !is_ident_char(b) {
        return "";
    }
    let mut start = end;
    while start > 0 && is_ident_char(bytes[start - 1]) {
        start -= 1;
    }
    &masked[start..=end]
}

/// Returns true if the byte before `idx` (skipping whitespace) is a member
/// access dot, including `?.`.
pub fn preceded_by_member_dot(masked: &str, idx: usize) -> bool {
    matches!(prev_significant(masked, idx), Some((_, b'.')))
}

// ═══════════════════════════════════════════════════════════════════════════════
// EDITS
// ═══════════════════════════════════════════════════════════════════════════════

/// Applies `(start, end, replacement)` edits. Overlapping edits after the
/// first are dropped.
pub fn apply_edits(code: &str, mut edits: Vec<(usize, usize, String)>) -> String {
    if edits.is_empty() {
        return code.to_string();
    }
    edits.sort_by_key(|(start, end, _)| (*start, *end));
    let mut out = String::with_capacity(code.len());
    let mut cursor = 0;
    for (start, end, replacement) in edits {
        if start < cursor || end > code.len() {
            continue;
        }
        out.push_str(&code[cursor..start]);
        out.push_str(&replacement);
        cursor = end;
    }
    out.push_str(&code[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_preserves_length_and_blanks_strings() {
        let code = r#"call("a(b", 'x') // c(d"#;
        let masked = mask_non_code(code);
        assert_eq!(masked.len(), code.len());
        assert_eq!(masked.trim_end(), r#"call("   ", ' ')"#);
    }

    #[test]
    fn test_mask_keeps_template_interpolations() {
        let code = "`id ${api.get(id)} done`";
        let masked = mask_non_code(code);
        assert_eq!(masked, "`   ${api.get(id)}     `");
    }

    #[test]
    fn test_mask_nested_template() {
        let code = "`a ${`b ${c}`} d`";
        let masked = mask_non_code(code);
        assert_eq!(masked, "`  ${`  ${c}`}  `");
    }

    #[test]
    fn test_mask_regex_literal_but_not_division() {
        let code = "const r = /a(b/gi; const d = x / y;";
        let masked = mask_non_code(code);
        assert_eq!(masked, "const r = /   /  ; const d = x / y;");
    }

    #[test]
    fn test_mask_block_comment_keeps_newlines() {
        let code = "a /* x\ny */ b";
        let masked = mask_non_code(code);
        assert_eq!(masked, "a     \n     b");
    }

    #[test]
    fn test_code_map_marks_string_contents() {
        let map = code_map("a('b') // c");
        assert_eq!(map[..6], [true, true, true, false, true, true]);
        assert!(!map[8]);
    }

    #[test]
    fn test_mask_escaped_multibyte_stays_valid() {
        let code = "`\\é` + x";
        let masked = mask_non_code(code);
        assert_eq!(masked.len(), code.len());
        assert!(masked.ends_with(" + x"));
    }

    #[test]
    fn test_find_balanced_nested() {
        let code = "f(a, (b), [c])";
        assert_eq!(find_balanced(code, 1), Some(13));
        assert_eq!(find_balanced("<(x: T) => void>", 0), Some(15));
    }

    #[test]
    fn test_find_opening() {
        assert_eq!(find_opening("f(a, (b))", 8), Some(1));
        assert_eq!(find_opening("x)", 1), None);
    }

    #[test]
    fn test_split_top_level() {
        let code = "a, {b, c}, d = f(1, 2)";
        let parts: Vec<&str> = split_top_level(code, b',', true)
            .into_iter()
            .map(|r| code[r].trim())
            .collect();
        assert_eq!(parts, vec!["a", "{b, c}", "d = f(1, 2)"]);
    }

    #[test]
    fn test_split_respects_generic_commas() {
        let code = "m: Map<string, number>, n";
        let parts = split_top_level(code, b',', true);
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn test_split_comparison_in_default() {
        let code = "a: number = b < c ? 1 : 2, d: string";
        let parts: Vec<&str> = split_top_level(code, b',', true)
            .into_iter()
            .map(|r| code[r].trim())
            .collect();
        assert_eq!(parts, vec!["a: number = b < c ? 1 : 2", "d: string"]);

        let code = "m = new Map<string, number>(), n";
        assert_eq!(split_top_level(code, b',', true).len(), 2);
    }

    #[test]
    fn test_top_level_assignment_skips_operators() {
        assert_eq!(find_top_level_assignment("cb: (x) => void = noop"), Some(16));
        assert_eq!(find_top_level_assignment("a == b"), None);
        assert_eq!(find_top_level_assignment("a != b"), None);
        assert_eq!(find_top_level_assignment("x = y"), Some(2));
    }

    #[test]
    fn test_word_before_and_member_dot() {
        let code = "new  Foo";
        assert_eq!(word_before(code, 5), "new");
        assert!(preceded_by_member_dot("a. b", 3));
        assert!(!preceded_by_member_dot("a b", 2));
    }

    #[test]
    fn test_apply_edits_in_order() {
        let out = apply_edits(
            "abcdef",
            vec![(4, 5, "E".to_string()), (0, 1, String::new())],
        );
        assert_eq!(out, "bcdEf");
    }
}
