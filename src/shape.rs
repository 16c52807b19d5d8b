//! Execution-shape selection.
//!
//! Three facts about the fragment decide how the harness invokes it: the
//! syntactic form of the callee, whether it needs a bound `this`, and whether
//! it awaits outside any async body. The mapping is a flat table so every
//! combination is visible and testable.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::ops::Range;

use crate::classify::{function_literal, FunctionLiteral};
use crate::fragment::FunctionIdentity;
use crate::mock::{MockPlacement, ResolvedMock};
use crate::scan::{
    find_balanced, is_ident_char, is_ident_start, mask_non_code, next_significant,
    preceded_by_member_dot, DepthTracker,
};

lazy_static! {
    static ref THIS_RE: Regex = Regex::new(r"\bthis\b").unwrap();
    static ref AWAIT_RE: Regex = Regex::new(r"\bawait\b").unwrap();
    static ref ASYNC_RE: Regex = Regex::new(r"\basync\b").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CalleeForm {
    /// Statements with no callable of their own.
    Block,
    /// A named function, invoked by name after its source runs.
    Declaration,
    /// An anonymous `function` expression.
    FunctionLiteral,
    /// An arrow function.
    ArrowLiteral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionShape {
    Block,
    BlockBound,
    NamedCall,
    NamedCallBound,
    NamedAsync,
    NamedAsyncBound,
    LiteralCall,
    LiteralCallBound,
    ArrowBound,
}

impl ExecutionShape {
    /// True if the fragment source is emitted at the top level of the
    /// script rather than inside the invocation.
    pub fn source_at_top_level(self) -> bool {
        matches!(self, ExecutionShape::NamedCall | ExecutionShape::NamedCallBound)
    }
}

use CalleeForm as F;
use ExecutionShape as S;

/// `(form, uses_self_binding, uses_async_context) -> shape`
const SHAPE_TABLE: [(CalleeForm, bool, bool, ExecutionShape); 16] = [
    (F::Block, false, false, S::Block),
    (F::Block, false, true, S::Block),
    (F::Block, true, false, S::BlockBound),
    (F::Block, true, true, S::BlockBound),
    (F::Declaration, false, false, S::NamedCall),
    (F::Declaration, true, false, S::NamedCallBound),
    (F::Declaration, false, true, S::NamedAsync),
    (F::Declaration, true, true, S::NamedAsyncBound),
    (F::FunctionLiteral, false, false, S::LiteralCall),
    (F::FunctionLiteral, false, true, S::LiteralCall),
    (F::FunctionLiteral, true, false, S::LiteralCallBound),
    (F::FunctionLiteral, true, true, S::LiteralCallBound),
    (F::ArrowLiteral, false, false, S::LiteralCall),
    (F::ArrowLiteral, false, true, S::LiteralCall),
    (F::ArrowLiteral, true, false, S::ArrowBound),
    (F::ArrowLiteral, true, true, S::ArrowBound),
];

pub fn select_shape(
    form: CalleeForm,
    uses_self_binding: bool,
    uses_async_context: bool,
) -> ExecutionShape {
    SHAPE_TABLE
        .iter()
        .find(|(f, s, a, _)| *f == form && *s == uses_self_binding && *a == uses_async_context)
        .map_or(S::Block, |entry| entry.3)
}

/// Flags derived once per generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HarnessFlags {
    pub uses_self_binding: bool,
    pub uses_async_context: bool,
    pub is_bare_block: bool,
}

/// The callee form plus the name to invoke for declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Callee {
    pub form: CalleeForm,
    pub name: Option<String>,
}

pub fn derive_flags(
    code: &str,
    mocks: &[ResolvedMock],
    identity: &FunctionIdentity,
    args: &[String],
) -> HarnessFlags {
    HarnessFlags {
        uses_self_binding: references_self(code)
            || mocks
                .iter()
                .any(|m| matches!(m.placement, MockPlacement::SelfMember { .. })),
        uses_async_context: awaits_outside_async(code),
        is_bare_block: identity.name.is_none()
            && args.is_empty()
            && function_literal(code).is_none(),
    }
}

pub fn callee_for(code: &str, identity: &FunctionIdentity, flags: &HarnessFlags) -> Callee {
    let literal = function_literal(code);
    match literal {
        Some(FunctionLiteral::Anonymous) => {
            return Callee {
                form: F::FunctionLiteral,
                name: None,
            }
        }
        Some(FunctionLiteral::Arrow) => {
            return Callee {
                form: F::ArrowLiteral,
                name: None,
            }
        }
        _ => {}
    }
    let name = identity
        .name
        .clone()
        .or(match literal {
            Some(FunctionLiteral::Named(name)) => Some(name),
            _ => None,
        })
        .or_else(|| {
            // arguments need something to call
            (!flags.is_bare_block)
                .then(|| FunctionIdentity::declared_in(code).and_then(|found| found.name))
                .flatten()
        });
    match name {
        Some(name) if !flags.is_bare_block => Callee {
            form: F::Declaration,
            name: Some(name),
        },
        _ => Callee {
            form: F::Block,
            name: None,
        },
    }
}

/// True if masked code uses `this` outside a member access.
fn references_self(code: &str) -> bool {
    let masked = mask_non_code(code);
    let bytes = masked.as_bytes();
    THIS_RE.find_iter(&masked).any(|m| {
        let dollar_before = m.start() > 0 && bytes[m.start() - 1] == b'$';
        let dollar_after = bytes.get(m.end()) == Some(&b'$');
        !preceded_by_member_dot(&masked, m.start()) && !dollar_before && !dollar_after
    })
}

/// True if any `await` sits outside every async function, arrow or method body.
pub fn awaits_outside_async(code: &str) -> bool {
    let masked = mask_non_code(code);
    let bodies = async_bodies(&masked);
    AWAIT_RE.find_iter(&masked).any(|m| {
        !preceded_by_member_dot(&masked, m.start())
            && !bodies.iter().any(|body| body.contains(&m.start()))
    })
}

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

/// Byte ranges of async function, arrow and method bodies.
fn async_bodies(masked: &str) -> Vec<Range<usize>> {
    let bytes = masked.as_bytes();
    let mut bodies = Vec::new();

    for m in ASYNC_RE.find_iter(masked) {
        if preceded_by_member_dot(masked, m.start()) {
            continue;
        }
        let mut i = skip_whitespace(bytes, m.end());
        if masked[i..].starts_with("function") {
            i = match masked[i..].find('(') {
                Some(p) => i + p,
                None => continue,
            };
        } else if masked[i..].starts_with('*') {
            i = skip_whitespace(bytes, i + 1);
        }
        // parameters: `(...)`, a single identifier, or a method name then `(...)`
        let after_params = if bytes.get(i) == Some(&b'(') {
            match find_balanced(masked, i) {
                Some(close) => close + 1,
                None => continue,
            }
        } else if bytes.get(i).is_some_and(|&b| is_ident_start(b)) {
            let mut k = i;
            while k < bytes.len() && is_ident_char(bytes[k]) {
                k += 1;
            }
            match next_significant(masked, k) {
                Some((p, b'(')) => match find_balanced(masked, p) {
                    Some(close) => close + 1,
                    None => continue,
                },
                Some((_, b'=')) => k,
                _ => continue,
            }
        } else {
            continue;
        };

        let mut body_start = skip_whitespace(bytes, after_params);
        if masked[body_start..].starts_with("=>") {
            body_start = skip_whitespace(bytes, body_start + 2);
            if bytes.get(body_start) != Some(&b'{') {
                bodies.push(body_start..expression_end(masked, body_start));
                continue;
            }
        }
        if bytes.get(body_start) == Some(&b'{') {
            if let Some(close) = find_balanced(masked, body_start) {
                bodies.push(body_start..close + 1);
            }
        }
    }
    bodies
}

/// End of an arrow's expression body: a depth-zero `,` or `;`, or a closer
/// that leaves the enclosing group.
fn expression_end(masked: &str, from: usize) -> usize {
    let bytes = masked.as_bytes();
    let mut tracker = DepthTracker::default();
    for i in from..bytes.len() {
        if tracker.at_top() && matches!(bytes[i], b',' | b';') {
            return i;
        }
        tracker.step(bytes, i);
        if tracker.depth < 0 {
            return i;
        }
    }
    bytes.len()
}
