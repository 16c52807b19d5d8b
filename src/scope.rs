//! Syntax-tree access for fragments.
//!
//! Fragments are rarely complete programs: a selection may be a bare block
//! ending in `return`, or a lone class method. [`with_syntax_tree`] retries the
//! parse inside progressively more permissive wrappers until one succeeds.

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    BindingIdentifier, Class, Expression, Function, ImportDeclaration, Program, TSEnumDeclaration,
    TSModuleDeclaration, TSModuleDeclarationName, VariableDeclarator,
};
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_span::SourceType;
use oxc_syntax::scope::ScopeFlags;
use std::collections::HashSet;
use tracing::trace;

use crate::fragment::LocalScopeSet;

/// How a fragment was wrapped to make it parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseWrapping {
    /// Parsed as a module, unchanged.
    AsIs,
    /// Parsed as the body of an async function.
    FunctionBody,
    /// Parsed as the body of a class.
    ClassBody,
}

const FUNCTION_WRAPPER: &str = "__fragment__";
const CLASS_WRAPPER: &str = "__Fragment__";

impl ParseWrapping {
    const ALL: [ParseWrapping; 3] = [
        ParseWrapping::AsIs,
        ParseWrapping::FunctionBody,
        ParseWrapping::ClassBody,
    ];

    fn wrap(self, code: &str) -> String {
        match self {
            ParseWrapping::AsIs => code.to_string(),
            ParseWrapping::FunctionBody => {
                format!("async function {}() {{\n{}\n}}", FUNCTION_WRAPPER, code)
            }
            ParseWrapping::ClassBody => format!("class {} {{\n{}\n}}", CLASS_WRAPPER, code),
        }
    }
}

fn source_type() -> SourceType {
    SourceType::default()
        .with_typescript(true)
        .with_module(true)
}

/// Parses `code` under the first wrapping that produces no errors and hands
/// the program and its source text to `f`. Returns `None` if no wrapping
/// parses.
pub fn with_syntax_tree<R>(
    code: &str,
    f: impl FnOnce(&Program<'_>, &str, ParseWrapping) -> R,
) -> Option<R> {
    for wrapping in ParseWrapping::ALL {
        let source = wrapping.wrap(code);
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, &source, source_type()).parse();
        if ret.errors.is_empty() {
            trace!(?wrapping, "fragment parsed");
            return Some(f(&ret.program, &source, wrapping));
        }
    }
    trace!("fragment did not parse under any wrapping");
    None
}

/// Every name bound anywhere in the fragment's syntax tree, or `None` if the
/// fragment does not parse.
pub fn collect_bindings(code: &str) -> Option<LocalScopeSet> {
    with_syntax_tree(code, |program, _, _| {
        let mut names = LocalBindings::of(program);
        names.remove(FUNCTION_WRAPPER);
        names.remove(CLASS_WRAPPER);
        names.into_iter().collect()
    })
}

/// Records every name a program binds. Import specifiers and `require`
/// results are left out so those names stay external.
#[derive(Default)]
pub struct LocalBindings {
    pub names: HashSet<String>,
}

impl LocalBindings {
    pub fn of(program: &Program<'_>) -> HashSet<String> {
        let mut bindings = LocalBindings::default();
        bindings.visit_program(program);
        bindings.names
    }

    fn bind(&mut self, name: &str) {
        self.names.insert(name.to_string());
    }
}

fn is_require_call(init: Option<&Expression<'_>>) -> bool {
    match init {
        Some(Expression::CallExpression(call)) => {
            matches!(&call.callee, Expression::Identifier(callee) if callee.name == "require")
        }
        _ => false,
    }
}

impl<'a> Visit<'a> for LocalBindings {
    fn visit_binding_identifier(&mut self, binding: &BindingIdentifier<'a>) {
        self.bind(&binding.name);
    }

    fn visit_function(&mut self, func: &Function<'a>, flags: ScopeFlags) {
        if let Some(name) = func.id.as_ref() {
            self.bind(&name.name);
        }
        walk::walk_function(self, func, flags);
    }

    fn visit_class(&mut self, class: &Class<'a>) {
        if let Some(name) = class.id.as_ref() {
            self.bind(&name.name);
        }
        walk::walk_class(self, class);
    }

    fn visit_import_declaration(&mut self, _decl: &ImportDeclaration<'a>) {}

    fn visit_variable_declarator(&mut self, declarator: &VariableDeclarator<'a>) {
        if !is_require_call(declarator.init.as_ref()) {
            walk::walk_variable_declarator(self, declarator);
        }
    }

    fn visit_ts_enum_declaration(&mut self, decl: &TSEnumDeclaration<'a>) {
        self.bind(&decl.id.name);
        walk::walk_ts_enum_declaration(self, decl);
    }

    fn visit_ts_module_declaration(&mut self, decl: &TSModuleDeclaration<'a>) {
        if let TSModuleDeclarationName::Identifier(name) = &decl.id {
            self.bind(&name.name);
        }
        walk::walk_ts_module_declaration(self, decl);
    }
}
