//! Harness generator
//!
//! Turns a normalized fragment, its mock bindings, the identity of the
//! function under test and the argument expressions into one self-contained
//! script. Mock state lives in a `__ctx` record captured by closures; scope
//! roots are bound as lexical constants and nothing is assigned onto
//! `globalThis`.

use serde::Serialize;
use tracing::debug;

use crate::classify::is_expression_like;
use crate::fragment::FunctionIdentity;
use crate::globals::is_keyword;
use crate::mock::{resolve_mocks, MockBinding, MockPlacement, MockValue, ResolvedMock};
use crate::normalize::NormalizedFragment;
use crate::options::HarnessOptions;
use crate::shape::{callee_for, derive_flags, select_shape, CalleeForm, ExecutionShape};

// ═══════════════════════════════════════════════════════════════════════════════
// OUTPUT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedScript {
    pub text: String,
    pub uses_self_binding: bool,
    pub uses_async_context: bool,
    pub is_bare_block: bool,
    pub shape: ExecutionShape,
    pub debug: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// RUNTIME HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Pristine runtime references, read from `globalThis` before any mock root
/// shadows them. Helpers and the execution block only go through `__rt`.
const RUNTIME: &str = r#"const __rt = (() => {
  const g = globalThis;
  return {
    global: g,
    now: g.Date.now.bind(g.Date),
    clock: g.performance.now.bind(g.performance),
    process: g.process,
    stringify: g.JSON.stringify,
    log: g.console.log.bind(g.console),
    warn: g.console.warn.bind(g.console),
    error: g.console.error.bind(g.console),
    construct: g.Reflect.construct,
    setPrototypeOf: g.Object.setPrototypeOf,
    create: g.Object.create,
    owns: (target, key) => g.Object.prototype.hasOwnProperty.call(target, key),
    tag: (value) => g.Object.prototype.toString.call(value),
    round: g.Math.round,
    resolve: g.Promise.resolve.bind(g.Promise),
    String: g.String,
    Error: g.Error,
    TypeError: g.TypeError,
  };
})();
"#;

const HELPERS: &str = r#"function __seed(record, root) {
  if (__rt.owns(record, root) || !(root in __rt.global)) {
    return;
  }
  const real = __rt.global[root];
  if (typeof real === 'function') {
    const shadow = function (...args) {
      return new.target ? __rt.construct(real, args, new.target) : real.apply(this, args);
    };
    shadow.prototype = real.prototype;
    __rt.setPrototypeOf(shadow, real);
    record[root] = shadow;
  } else if (real !== null && typeof real === 'object') {
    record[root] = __rt.create(real);
  }
}

function __install(root, path, value) {
  const parts = path.split('.');
  let target = root;
  for (const part of parts.slice(0, -1)) {
    const next = target[part];
    const usable = next !== null && (typeof next === 'object' || typeof next === 'function');
    if (!usable) {
      target[part] = {};
    } else if (!__rt.owns(target, part)) {
      // never write through to a real global
      target[part] = __rt.create(next);
    }
    target = target[part];
  }
  target[parts[parts.length - 1]] = value;
  return value;
}

function __record(ctx, calls, name, args) {
  const entry = { arguments: args, timestamp: __rt.now() };
  calls.push(entry);
  ctx.calls.push({ name, entry });
  return entry;
}

function __settle(entry, value) {
  const thenable = value !== null && (typeof value === 'object' || typeof value === 'function');
  if (thenable && typeof value.then === 'function') {
    return value.then(
      (resolved) => {
        entry.result = resolved;
        return resolved;
      },
      (error) => {
        entry.error = error;
        throw error;
      },
    );
  }
  entry.result = value;
  return value;
}

function __spyFn(ctx, name, impl) {
  const calls = [];
  ctx.mocks.push({ name, calls });
  return function (...args) {
    const entry = __record(ctx, calls, name, args);
    try {
      if (typeof impl !== 'function') {
        throw new __rt.TypeError(`Mock for ${name} is not a function`);
      }
      return __settle(entry, impl.apply(this, args));
    } catch (error) {
      entry.error = error;
      throw error;
    }
  };
}

function __spyCtor(ctx, name, impl) {
  const calls = [];
  ctx.mocks.push({ name, calls });
  function spy(...args) {
    const entry = __record(ctx, calls, name, args);
    try {
      if (typeof impl !== 'function') {
        throw new __rt.TypeError(`Mock for ${name} is not a constructor`);
      }
      if (new.target && impl.prototype) {
        return __settle(entry, __rt.construct(impl, args, new.target));
      }
      return __settle(entry, impl.apply(this, args));
    } catch (error) {
      entry.error = error;
      throw error;
    }
  }
  if (typeof impl === 'function') {
    if (impl.prototype) {
      spy.prototype = impl.prototype;
    }
    __rt.setPrototypeOf(spy, impl);
  }
  return spy;
}

function __format(value) {
  if (value === undefined) {
    return 'undefined';
  }
  if (typeof value === 'function') {
    return `[Function ${value.name || 'anonymous'}]`;
  }
  try {
    const text = __rt.stringify(value);
    return text === undefined ? __rt.String(value) : text;
  } catch (error) {
    return `[Unserializable ${__rt.tag(value)}]`;
  }
}

function __describeError(error) {
  return error instanceof __rt.Error ? `${error.name}: ${error.message}` : __format(error);
}

function __report(ctx) {
  if (ctx.mocks.length === 0) {
    return;
  }
  __rt.log('── Mock calls ──');
  ctx.calls.forEach(({ name, entry }, index) => {
    const args = entry.arguments.map(__format).join(', ');
    let outcome;
    if ('error' in entry) {
      outcome = `threw ${__describeError(entry.error)}`;
    } else if ('result' in entry) {
      outcome = `→ ${__format(entry.result)}`;
    } else {
      outcome = '(pending)';
    }
    __rt.log(`#${index + 1} ${name}(${args}) ${outcome}`);
  });
  for (const mock of ctx.mocks) {
    if (mock.calls.length === 0) {
      __rt.log(`${mock.name}: not called`);
    }
  }
}
"#;

// ═══════════════════════════════════════════════════════════════════════════════
// GENERATION
// ═══════════════════════════════════════════════════════════════════════════════

pub fn generate(
    normalized: &NormalizedFragment,
    mocks: &[MockBinding],
    identity: &FunctionIdentity,
    args: &[String],
) -> GeneratedScript {
    generate_with_options(normalized, mocks, identity, args, &HarnessOptions::default())
}

pub fn generate_with_options(
    normalized: &NormalizedFragment,
    mocks: &[MockBinding],
    identity: &FunctionIdentity,
    args: &[String],
    options: &HarnessOptions,
) -> GeneratedScript {
    let code = normalized.code.trim_end();
    let resolved = resolve_mocks(mocks);
    let mut flags = derive_flags(code, &resolved, identity, args);
    let callee = callee_for(code, identity, &flags);
    // a block runs as-is; any arguments had nothing to bind to
    flags.is_bare_block = callee.form == CalleeForm::Block;
    let shape = select_shape(callee.form, flags.uses_self_binding, flags.uses_async_context);
    let arguments = render_arguments(args);
    let name = callee.name.as_deref().unwrap_or_default();

    let mut text = String::new();
    text.push_str("// fragment-harness: generated script\n");
    text.push_str(&format!(
        "// shape: {:?}, self binding: {}, async context: {}\n\n",
        shape, flags.uses_self_binding, flags.uses_async_context
    ));
    text.push_str(RUNTIME);
    text.push_str("const __ctx = { self: {}, scope: {}, mocks: [], calls: [] };\n");

    let value_bindings = render_value_bindings(&resolved);
    if !value_bindings.is_empty() {
        text.push('\n');
        text.push_str(&value_bindings);
    }
    text.push('\n');
    text.push_str(HELPERS);

    let installs = render_installs(&resolved);
    if !installs.is_empty() {
        text.push('\n');
        text.push_str(&installs);
    }

    if !normalized.stripped_modules.is_empty() {
        let message = format!(
            "Stripped imports (mock what the fragment needs from them): {}",
            normalized.stripped_modules.join(", ")
        );
        text.push_str(&format!("\n__rt.warn({});\n", json_string(&message)));
    }

    if shape.source_at_top_level() {
        text.push('\n');
        text.push_str(code);
        text.push('\n');
    }

    text.push('\n');
    text.push_str(&render_execution(
        &invocation(shape, code, name, &arguments),
        options.debug,
    ));

    debug!(
        shape = ?shape,
        mocks = resolved.len(),
        args = args.len(),
        bytes = text.len(),
        "harness generated"
    );

    GeneratedScript {
        text,
        uses_self_binding: flags.uses_self_binding,
        uses_async_context: flags.uses_async_context,
        is_bare_block: flags.is_bare_block,
        shape,
        debug: options.debug,
    }
}

fn json_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Renders one argument expression: verbatim when it reads as an
/// expression, JSON-quoted otherwise, `undefined` when empty.
pub fn render_argument(arg: &str) -> String {
    let arg = arg.trim();
    if arg.is_empty() {
        "undefined".to_string()
    } else if is_expression_like(arg) {
        arg.to_string()
    } else {
        json_string(arg)
    }
}

fn render_arguments(args: &[String]) -> String {
    args.iter()
        .map(|a| render_argument(a))
        .collect::<Vec<_>>()
        .join(", ")
}

fn value_binding_name(index: usize) -> String {
    format!("__mock_{}", index)
}

fn render_value_bindings(mocks: &[ResolvedMock]) -> String {
    let mut out = String::new();
    for (i, mock) in mocks.iter().enumerate() {
        if let Some(expression) = mock.value.expression() {
            out.push_str(&format!(
                "const {} = ({}\n);\n",
                value_binding_name(i),
                expression
            ));
        }
    }
    out
}

fn render_installs(mocks: &[ResolvedMock]) -> String {
    let mut out = String::new();
    let mut roots: Vec<&str> = Vec::new();

    for mock in mocks {
        if let MockPlacement::Scope { root, .. } = &mock.placement {
            if !roots.contains(&root.as_str()) {
                roots.push(root);
                out.push_str(&format!("__seed(__ctx.scope, {});\n", json_string(root)));
            }
        }
    }

    for (i, mock) in mocks.iter().enumerate() {
        let binding = value_binding_name(i);
        let key = json_string(&mock.key);
        let value = match &mock.value {
            MockValue::Absent => "undefined".to_string(),
            MockValue::Literal(_) => binding,
            MockValue::Callable(_) => format!("__spyFn(__ctx, {}, {})", key, binding),
            MockValue::Constructor(_) => format!("__spyCtor(__ctx, {}, {})", key, binding),
        };
        let record = match &mock.placement {
            MockPlacement::SelfMember { .. } => "__ctx.self",
            MockPlacement::Scope { .. } => "__ctx.scope",
        };
        out.push_str(&format!(
            "__install({}, {}, {});\n",
            record,
            json_string(mock.path()),
            value
        ));
    }

    for root in roots {
        if is_keyword(root) || root == "globalThis" {
            continue;
        }
        out.push_str(&format!("const {root} = __ctx.scope.{root};\n"));
    }
    out
}

/// Code of a literal callee, without a trailing `;`.
fn literal_body(code: &str) -> &str {
    code.trim().trim_end_matches(';').trim_end()
}

fn with_leading_args(args: &str) -> String {
    if args.is_empty() {
        String::new()
    } else {
        format!(", {}", args)
    }
}

/// The awaited expression that runs the fragment for `shape`.
fn invocation(shape: ExecutionShape, code: &str, name: &str, args: &str) -> String {
    match shape {
        ExecutionShape::Block => format!("await (async () => {{\n{}\n}})()", code),
        ExecutionShape::BlockBound => {
            format!("await (async function () {{\n{}\n}}).call(__ctx.self)", code)
        }
        ExecutionShape::NamedCall => format!("await {}({})", name, args),
        ExecutionShape::NamedCallBound => {
            format!("await {}.call(__ctx.self{})", name, with_leading_args(args))
        }
        ExecutionShape::NamedAsync => format!(
            "await (async () => {{\n{}\nreturn await {}({});\n}})()",
            code, name, args
        ),
        ExecutionShape::NamedAsyncBound => format!(
            "await (async function () {{\n{}\nreturn await {}.call(this{});\n}}).call(__ctx.self)",
            code,
            name,
            with_leading_args(args)
        ),
        ExecutionShape::LiteralCall => format!("await ({}\n)({})", literal_body(code), args),
        ExecutionShape::LiteralCallBound => format!(
            "await ({}\n).call(__ctx.self{})",
            literal_body(code),
            with_leading_args(args)
        ),
        ExecutionShape::ArrowBound => format!(
            "await (function () {{\nreturn ({}\n);\n}}).call(__ctx.self)({})",
            literal_body(code),
            args
        ),
    }
}

fn render_execution(invocation: &str, debug: bool) -> String {
    let pause = if debug { "    debugger;\n" } else { "" };
    format!(
        r#"__rt.resolve().then(async () => {{
  const __start = __rt.clock();
  try {{
{pause}    const __result = {invocation};
    __rt.log(`✓ Completed in ${{__rt.round(__rt.clock() - __start)}}ms`);
    __rt.log(`Result: ${{__format(__result)}}`);
  }} catch (error) {{
    __rt.error(`✗ Failed after ${{__rt.round(__rt.clock() - __start)}}ms`);
    __rt.error(error && error.stack ? error.stack : __rt.String(error));
    __rt.process.exitCode = 1;
  }} finally {{
    __report(__ctx);
  }}
}});
"#
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
