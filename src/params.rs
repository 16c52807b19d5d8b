//! Type stripping for parameter lists.

use crate::scan::{
    find_balanced, find_top_level_assignment, is_ident_char, mask_non_code, split_top_level,
};

/// Constructor parameter-property modifiers.
const PARAMETER_MODIFIERS: [&str; 5] = ["public", "private", "protected", "readonly", "override"];

/// Strips TypeScript annotations from the text between a parameter list's
/// parentheses. Names, rest markers, destructuring patterns and defaults are
/// kept; optional markers, type annotations and `this:` parameters are
/// dropped.
pub fn strip_parameter_list(list: &str) -> String {
    let masked = mask_non_code(list);
    let mut params = Vec::new();

    for range in split_top_level(&masked, b',', true) {
        let raw = &list[range.clone()];
        let masked_part = &masked[range];
        let lead = raw.len() - raw.trim_start().len();
        let raw = raw.trim();
        let masked_part = &masked_part[lead..lead + raw.len()];
        if raw.is_empty() {
            continue;
        }
        if let Some(param) = strip_parameter(raw, masked_part) {
            params.push(param);
        }
    }

    params.join(", ")
}

fn strip_parameter(raw: &str, masked: &str) -> Option<String> {
    let (head_end, default) = match find_top_level_assignment(masked) {
        Some(eq) => (eq, Some(raw[eq + 1..].trim())),
        None => (raw.len(), None),
    };
    let mut start = 0;
    loop {
        let rest = &masked[start..head_end];
        let word = PARAMETER_MODIFIERS.iter().find(|m| {
            rest.starts_with(**m)
                && rest[m.len()..].starts_with(|c: char| c.is_whitespace())
        });
        match word {
            Some(word) => {
                let after = &rest[word.len()..];
                start += word.len() + (after.len() - after.trim_start().len());
            }
            None => break,
        }
    }

    let head = &masked[start..head_end];
    let (rest_marker, body_offset) = match head.strip_prefix("...") {
        Some(after) => ("...", start + 3 + (after.len() - after.trim_start().len())),
        None => ("", start),
    };

    let binding = if matches!(masked.as_bytes().get(body_offset), Some(b'{') | Some(b'[')) {
        let close = find_balanced(masked, body_offset)?;
        raw[body_offset..=close].to_string()
    } else {
        let bytes = masked.as_bytes();
        let mut end = body_offset;
        while end < head_end && is_ident_char(bytes[end]) {
            end += 1;
        }
        let name = &raw[body_offset..end];
        if name.is_empty() {
            return Some(raw.to_string());
        }
        if name == "this" {
            return None;
        }
        name.to_string()
    };

    Some(match default {
        Some(value) => format!("{}{} = {}", rest_marker, binding, value),
        None => format!("{}{}", rest_marker, binding),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_annotations_and_optional_markers() {
        assert_eq!(
            strip_parameter_list("a: number, b?: string, ...rest: any[]"),
            "a, b, ...rest"
        );
    }

    #[test]
    fn test_keeps_defaults_with_function_types() {
        assert_eq!(
            strip_parameter_list("cb: (x: number) => void = noop, n = a >= b ? 1 : 2"),
            "cb = noop, n = a >= b ? 1 : 2"
        );
    }

    #[test]
    fn test_destructuring_preserved() {
        assert_eq!(
            strip_parameter_list("{ x, y = 1 }: Point = { x: 0 }, [first, ...others]: number[]"),
            "{ x, y = 1 } = { x: 0 }, [first, ...others]"
        );
    }

    #[test]
    fn test_this_parameter_removed() {
        assert_eq!(strip_parameter_list("this: Window, event: Event"), "event");
    }

    #[test]
    fn test_constructor_modifiers_and_generics() {
        assert_eq!(
            strip_parameter_list("private readonly repo: Repo<User, Id>, opts: Map<string, string> = new Map()"),
            "repo, opts = new Map()"
        );
    }

    #[test]
    fn test_defaults_with_string_commas() {
        assert_eq!(
            strip_parameter_list("sep: string = \", \", \n  limit = 10,"),
            "sep = \", \", limit = 10"
        );
    }

    #[test]
    fn test_plain_javascript_is_unchanged() {
        assert_eq!(strip_parameter_list("a, b = 2, ...c"), "a, b = 2, ...c");
        assert_eq!(strip_parameter_list(""), "");
    }
}
