//! Property tests for analysis, normalization and parameter stripping.

use proptest::prelude::*;

use crate::classify::leading_segment;
use crate::fragment::{LocalScopeSet, SourceFragment};
use crate::normalize::normalize;
use crate::params::strip_parameter_list;
use crate::references::analyze;

const HEADS: [&str; 6] = ["api", "store", "client", "cache", "queue", "user"];
const METHODS: [&str; 4] = ["get", "put", "send", "load"];

fn statement() -> impl Strategy<Value = String> {
    (
        prop::sample::select(HEADS.to_vec()),
        prop::sample::select(METHODS.to_vec()),
        prop::sample::select(HEADS.to_vec()),
        0..3usize,
    )
        .prop_map(|(head, method, arg, form)| match form {
            0 => format!("{}.{}({});", head, method, arg),
            1 => format!("const out = await {}.{}({}.id);", head, method, arg),
            _ => format!("if ({}) {{ {}.{}(); }}", arg, head, method),
        })
}

/// Lines the normalizer fully handles, in any order.
const TS_LINES: [&str; 7] = [
    "import { a } from './a';",
    "const b: number = 1;",
    "export function f(x: string): void { g(x); }",
    "type T = string;",
    "let c = h<T>(b) as T;",
    "return b!;",
    "const { d }: Pair = pair;",
];

/// `(typed parameter, expected stripped parameter)`
fn parameter() -> impl Strategy<Value = (String, String)> {
    let names = prop::sample::select(vec!["id", "name", "opts", "cb", "items"]);
    (names, 0..7usize).prop_map(|(name, form)| match form {
        0 => (name.to_string(), name.to_string()),
        1 => (format!("{}?: string", name), name.to_string()),
        2 => (format!("{}: Map<string, number> = new Map()", name), format!("{} = new Map()", name)),
        3 => (format!("...{}: number[]", name), format!("...{}", name)),
        4 => (format!("{}: (x: number) => void = noop", name), format!("{} = noop", name)),
        5 => (
            format!("{}: number = lo < hi ? 1 : 2", name),
            format!("{} = lo < hi ? 1 : 2", name),
        ),
        _ => ("{ a, b = 2 }: Point".to_string(), "{ a, b = 2 }".to_string()),
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_no_key_is_headed_by_a_local(
        statements in prop::collection::vec(statement(), 1..6),
        local_mask in prop::collection::vec(any::<bool>(), HEADS.len()),
    ) {
        let locals: LocalScopeSet = HEADS
            .iter()
            .zip(&local_mask)
            .filter(|(_, keep)| **keep)
            .map(|(name, _)| *name)
            .collect();
        let code = statements.join("\n");
        let set = analyze(&SourceFragment::selection(code), &locals);
        for key in set.keys() {
            prop_assert!(!locals.contains(leading_segment(&key)), "{} in {:?}", key, locals);
        }
    }

    #[test]
    fn prop_normalize_is_idempotent(
        lines in prop::collection::vec(prop::sample::select(TS_LINES.to_vec()), 1..6),
    ) {
        let once = normalize(&lines.join("\n"));
        let twice = normalize(&once.code);
        prop_assert_eq!(&twice.code, &once.code);
        prop_assert!(twice.stripped_modules.is_empty());
    }

    #[test]
    fn prop_parameter_lists_keep_names_and_defaults(
        params in prop::collection::vec(parameter(), 0..5),
    ) {
        let typed: Vec<&str> = params.iter().map(|(t, _)| t.as_str()).collect();
        let expected: Vec<&str> = params.iter().map(|(_, e)| e.as_str()).collect();
        prop_assert_eq!(strip_parameter_list(&typed.join(", ")), expected.join(", "));
    }
}
