//! Shared name tables.
//!
//! Every detector, whichever backend produced its candidates, filters through
//! these sets so the tree and text strategies agree on what counts as a
//! keyword, a built-in, or a mockable global.

use lazy_static::lazy_static;
use std::collections::HashSet;

/// The self-qualifier used by class and method bodies.
pub const SELF_QUALIFIER: &str = "this";

lazy_static! {
    /// Control-flow, declaration and reserved words. None of these can head a
    /// call-style key, even when followed by `(`.
    pub static ref JS_KEYWORDS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        for word in [
            "if", "else", "for", "while", "do", "switch", "case", "default", "break",
            "continue", "return", "throw", "try", "catch", "finally", "function",
            "class", "extends", "super", "this", "new", "delete", "typeof",
            "instanceof", "void", "in", "of", "const", "let", "var", "async", "await",
            "yield", "import", "export", "with", "debugger", "static", "null", "true",
            "false", "undefined", "enum", "implements", "interface", "package",
            "private", "protected", "public",
        ] {
            s.insert(word);
        }
        s
    };

    /// TypeScript type words and contextual keywords that show up in raw
    /// fragments but never name a runtime dependency.
    pub static ref TS_TYPE_WORDS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        for word in [
            "string", "number", "boolean", "bigint", "symbol", "object", "any",
            "unknown", "never", "keyof", "readonly", "infer", "is", "asserts",
            "type", "as", "from", "declare", "namespace", "module", "abstract",
            "override", "satisfies", "get", "set", "constructor",
        ] {
            s.insert(word);
        }
        s
    };

    /// Ubiquitous runtime globals. Keys headed by one of these are never reported.
    pub static ref DEFAULT_BUILTINS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        for name in [
            // Namespaces
            "console", "Math", "JSON", "Reflect", "Intl", "Atomics", "WebAssembly",
            // Constructors
            "Object", "Array", "String", "Number", "Boolean", "Symbol", "BigInt",
            "Function", "Date", "RegExp", "Promise", "Proxy", "Map", "Set", "WeakMap",
            "WeakSet", "WeakRef", "Error", "TypeError", "RangeError", "SyntaxError",
            "ReferenceError", "EvalError", "URIError", "AggregateError", "ArrayBuffer",
            "SharedArrayBuffer", "DataView", "Int8Array", "Uint8Array",
            "Uint8ClampedArray", "Int16Array", "Uint16Array", "Int32Array",
            "Uint32Array", "Float32Array", "Float64Array", "BigInt64Array",
            "BigUint64Array", "URL", "URLSearchParams", "TextEncoder", "TextDecoder",
            "AbortController", "AbortSignal", "Buffer", "Event", "EventTarget",
            // Functions
            "parseInt", "parseFloat", "isNaN", "isFinite", "encodeURI", "decodeURI",
            "encodeURIComponent", "decodeURIComponent", "structuredClone",
            "queueMicrotask", "require",
            // Timers
            "setTimeout", "clearTimeout", "setInterval", "clearInterval",
            "setImmediate", "clearImmediate",
            // Environment
            "globalThis", "window", "document", "process", "module", "exports",
            "arguments", "undefined", "NaN", "Infinity", "__dirname", "__filename",
        ] {
            s.insert(name);
        }
        s
    };

    /// Globals that look built-in but are routinely stubbed, so they are always
    /// reported when called.
    pub static ref KNOWN_MOCKABLE_GLOBALS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        s.insert("fetch");
        s
    };

    /// Built-in names written in upper case, excluded from constant detection.
    pub static ref BUILTIN_UPPER_CONSTANTS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        for name in ["JSON", "URL", "CSS", "NaN", "BYTES_PER_ELEMENT", "MAX_VALUE", "MIN_VALUE"] {
            s.insert(name);
        }
        s
    };

    /// Built-in constructors excluded from capitalized-identifier detection.
    pub static ref BUILTIN_CONSTRUCTORS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        for name in [
            "Object", "Array", "String", "Number", "Boolean", "Symbol", "BigInt",
            "Function", "Date", "RegExp", "Promise", "Proxy", "Reflect", "Map", "Set",
            "WeakMap", "WeakSet", "WeakRef", "Error", "TypeError", "RangeError",
            "SyntaxError", "ReferenceError", "EvalError", "URIError", "AggregateError",
            "Math", "Intl", "ArrayBuffer", "DataView", "Uint8Array", "Int32Array",
            "Float64Array", "Buffer", "Infinity", "NaN", "Record", "Partial",
            "Readonly", "Required", "Pick", "Omit", "Exclude", "Extract",
            "ReturnType", "Parameters", "Awaited", "NonNullable",
        ] {
            s.insert(name);
        }
        s
    };
}

/// Returns true if `name` is a reserved or control-flow word.
pub fn is_keyword(name: &str) -> bool {
    JS_KEYWORDS.contains(name)
}

/// Returns true if keys headed by `name` should never be reported.
pub fn is_builtin(name: &str) -> bool {
    DEFAULT_BUILTINS.contains(name) && !KNOWN_MOCKABLE_GLOBALS.contains(name)
}

/// Returns true if `name` can never be a runtime dependency: keywords,
/// built-ins and TypeScript type words.
pub fn is_reserved_name(name: &str) -> bool {
    is_keyword(name) || is_builtin(name) || TS_TYPE_WORDS.contains(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_is_mockable_not_builtin() {
        assert!(KNOWN_MOCKABLE_GLOBALS.contains("fetch"));
        assert!(!is_builtin("fetch"));
    }

    #[test]
    fn test_reserved_names() {
        assert!(is_reserved_name("return"));
        assert!(is_reserved_name("console"));
        assert!(is_reserved_name("string"));
        assert!(!is_reserved_name("api"));
    }
}
