//! Tree-based call detection.

use oxc_ast::ast::{CallExpression, Expression};
use oxc_ast_visit::Visit;
use std::collections::BTreeSet;

use crate::classify::leading_segment;
use crate::fragment::LocalScopeSet;
use crate::globals::SELF_QUALIFIER;
use crate::references::CallDetector;
use crate::scope::{with_syntax_tree, LocalBindings};

/// Walks every call expression of the parsed fragment and reports qualified
/// callees whose head is not bound inside the fragment.
#[derive(Debug, Default, Clone, Copy)]
pub struct TreeCallDetector;

impl CallDetector for TreeCallDetector {
    fn name(&self) -> &'static str {
        "tree"
    }

    fn detect_calls(&self, code: &str, locals: &LocalScopeSet) -> Option<BTreeSet<String>> {
        with_syntax_tree(code, |program, _, _| {
            let bindings = LocalBindings::of(program);

            let mut calls = CallCollector::default();
            calls.visit_program(program);

            calls
                .callees
                .into_iter()
                .filter(|key| {
                    let head = leading_segment(key);
                    head == SELF_QUALIFIER || (!bindings.contains(head) && !locals.contains(head))
                })
                .collect()
        })
    }
}

#[derive(Default)]
struct CallCollector {
    callees: BTreeSet<String>,
}

impl<'a> Visit<'a> for CallCollector {
    fn visit_call_expression(&mut self, expr: &CallExpression<'a>) {
        if let Some(path) = qualified_path(&expr.callee) {
            // a lone `this()` is not a dependency
            if path != SELF_QUALIFIER {
                self.callees.insert(path);
            }
        }
        oxc_ast_visit::walk::walk_call_expression(self, expr);
    }
}

/// Dotted text of an identifier / static member chain, `None` for computed
/// or call-result callees.
fn qualified_path(expr: &Expression) -> Option<String> {
    match expr {
        Expression::Identifier(ident) => Some(ident.name.to_string()),
        Expression::ThisExpression(_) => Some(SELF_QUALIFIER.to_string()),
        Expression::StaticMemberExpression(member) => {
            let object = qualified_path(&member.object)?;
            Some(format!("{}.{}", object, member.property.name))
        }
        Expression::ParenthesizedExpression(paren) => qualified_path(&paren.expression),
        Expression::TSNonNullExpression(non_null) => qualified_path(&non_null.expression),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(code: &str) -> Vec<String> {
        TreeCallDetector
            .detect_calls(code, &LocalScopeSet::new())
            .map(|set| set.into_iter().collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_member_chains_and_self_calls() {
        let calls = detect("const user = await api.users.get(id);\nthis.logger.info(user);\nreturn format(user);");
        assert_eq!(calls, vec!["api.users.get", "format", "this.logger.info"]);
    }

    #[test]
    fn test_locally_bound_heads_are_skipped() {
        let calls = detect("function helper(x) { return x; }\nconst svc = makeService();\nsvc.run(helper(1));");
        assert_eq!(calls, vec!["makeService"]);
    }

    #[test]
    fn test_known_locals_are_skipped() {
        let locals: LocalScopeSet = ["db"].into_iter().collect();
        let calls = TreeCallDetector
            .detect_calls("db.query(sql); audit.log(sql);", &locals)
            .unwrap_or_default();
        assert_eq!(calls.into_iter().collect::<Vec<_>>(), vec!["audit.log"]);
    }

    #[test]
    fn test_optional_chain_and_computed_callees() {
        let calls = detect("client?.send(msg); handlers[name](msg); factory()(msg);");
        assert_eq!(calls, vec!["client.send", "factory"]);
    }

    #[test]
    fn test_unparseable_fragment_yields_none() {
        assert!(TreeCallDetector
            .detect_calls("if (a { b(", &LocalScopeSet::new())
            .is_none());
    }
}
