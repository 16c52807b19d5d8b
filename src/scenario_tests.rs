//! End-to-end runs of generated scripts. Each test returns early when no
//! `node` binary is on the path.

use std::process::{Command, Output};

use crate::artifact::{ArtifactStore, RetentionPolicy};
use crate::codegen::generate;
use crate::fragment::{FunctionIdentity, LocalScopeSet, SourceFragment};
use crate::mock::MockBinding;
use crate::normalize::normalize;
use crate::references::analyze;

fn node_available() -> bool {
    Command::new("node")
        .arg("--version")
        .output()
        .is_ok_and(|out| out.status.success())
}

fn run(code: &str, mocks: &[MockBinding], identity: FunctionIdentity, args: &[&str]) -> Output {
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    let script = generate(&normalize(code), mocks, &identity, &args);
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path(), RetentionPolicy::default());
    let artifact = store.write(&script).unwrap();
    let plan = artifact.launch_plan("node", None);
    Command::new(&plan.program).args(&plan.args).output().unwrap()
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).to_string()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).to_string()
}

#[test]
fn test_named_function_result() {
    if !node_available() {
        return;
    }
    let out = run(
        "function add(a, b) { return a + b; }",
        &[],
        FunctionIdentity::named("add", vec!["a".into(), "b".into()]),
        &["2", "3"],
    );
    assert!(out.status.success(), "{}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("✓ Completed in "));
    assert!(text.contains("Result: 5\n"));
}

#[test]
fn test_mocked_async_dependency() {
    if !node_available() {
        return;
    }
    let code = "async function getUser(id) { return await api.get(id); }";
    let keys = analyze(&SourceFragment::selection(code), &LocalScopeSet::new()).keys();
    assert_eq!(keys, vec!["api.get"]);

    let out = run(
        code,
        &[MockBinding::new("api.get", Some("async (id) => ({id, name: \"x\"})"))],
        FunctionIdentity::default(),
        &["1"],
    );
    assert!(out.status.success(), "{}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("Result: {\"id\":1,\"name\":\"x\"}\n"));
    assert!(text.contains("── Mock calls ──"));
    assert!(text.contains("#1 api.get(1) → {\"id\":1,\"name\":\"x\"}"));
}

#[test]
fn test_unmocked_self_reference_fails() {
    if !node_available() {
        return;
    }
    let out = run("this.logger.error(\"x\");", &[], FunctionIdentity::default(), &[]);
    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.contains("✗ Failed after "));
    assert!(err.contains("TypeError"));
}

#[test]
fn test_self_mock_is_recorded() {
    if !node_available() {
        return;
    }
    let out = run(
        "this.logger.error(\"x\");\nreturn 7;",
        &[MockBinding::new("this.logger.error", Some("(msg) => msg.length"))],
        FunctionIdentity::default(),
        &[],
    );
    assert!(out.status.success(), "{}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("Result: 7\n"));
    assert!(text.contains("#1 this.logger.error(\"x\") → 1"));
}

#[test]
fn test_stripped_import_warning() {
    if !node_available() {
        return;
    }
    let out = run(
        "import { x } from \"./m\"; return x + 1;",
        &[],
        FunctionIdentity::default(),
        &[],
    );
    let err = stderr(&out);
    assert!(err.contains("Stripped imports (mock what the fragment needs from them): ./m"));
    // `x` went with the import
    assert_eq!(out.status.code(), Some(1));
    assert!(err.contains("ReferenceError"));
}

#[test]
fn test_constructor_spy_keeps_prototype() {
    if !node_available() {
        return;
    }
    let out = run(
        "const c = new Client('k');\nreturn c.send(2);",
        &[MockBinding::new(
            "Client",
            Some("class { constructor(k) { this.k = k; } send(n) { return this.k + n; } }"),
        )],
        FunctionIdentity::default(),
        &[],
    );
    assert!(out.status.success(), "{}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("Result: \"k2\"\n"));
    assert!(text.contains("#1 Client(\"k\") → {\"k\":\"k\"}"));
}

#[test]
fn test_calls_recorded_in_order() {
    if !node_available() {
        return;
    }
    let out = run(
        "log.write(1);\nlog.write(2);\nreturn CONFIG.retries;",
        &[
            MockBinding::new("log.write", Some("(n) => n * 10")),
            MockBinding::new("CONFIG", Some("{ retries: 3 }")),
            MockBinding::new("unused.call", Some("() => 0")),
        ],
        FunctionIdentity::default(),
        &[],
    );
    assert!(out.status.success(), "{}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("Result: 3\n"));
    let first = text.find("#1 log.write(1) → 10").unwrap();
    let second = text.find("#2 log.write(2) → 20").unwrap();
    assert!(first < second);
    assert!(text.contains("unused.call: not called"));
}

#[test]
fn test_deep_path_install() {
    if !node_available() {
        return;
    }
    let out = run(
        "return await db.pool.acquire(2);",
        &[MockBinding::new("db.pool.acquire", Some("async (n) => n + 40"))],
        FunctionIdentity::default(),
        &[],
    );
    assert!(out.status.success(), "{}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("Result: 42\n"));
    assert!(text.contains("#1 db.pool.acquire(2) → 42"));
}

#[test]
fn test_named_call_bound() {
    if !node_available() {
        return;
    }
    let out = run(
        "function total() { return this.base + 1; }",
        &[MockBinding::new("this.base", Some("41"))],
        FunctionIdentity::named("total", vec![]),
        &[],
    );
    assert!(out.status.success(), "{}", stderr(&out));
    assert!(stdout(&out).contains("Result: 42\n"));
}

#[test]
fn test_named_async() {
    if !node_available() {
        return;
    }
    let out = run(
        "async function double(n) { return n * 2; }\nawait double(0);",
        &[],
        FunctionIdentity::named("double", vec!["n".into()]),
        &["4"],
    );
    assert!(out.status.success(), "{}", stderr(&out));
    assert!(stdout(&out).contains("Result: 8\n"));
}

#[test]
fn test_named_async_bound_from_later_declaration() {
    if !node_available() {
        return;
    }
    let out = run(
        "const k = await this.base.get();\nfunction run(n) {\n  return k + n;\n}",
        &[MockBinding::new("this.base.get", Some("async () => 20"))],
        FunctionIdentity::default(),
        &["1"],
    );
    assert!(out.status.success(), "{}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("Result: 21\n"));
    assert!(text.contains("#1 this.base.get() → 20"));
}

#[test]
fn test_literal_call() {
    if !node_available() {
        return;
    }
    let out = run("(a, b) => a * b", &[], FunctionIdentity::default(), &["6", "7"]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert!(stdout(&out).contains("Result: 42\n"));
}

#[test]
fn test_literal_call_bound() {
    if !node_available() {
        return;
    }
    let out = run(
        "function (n) { return this.factor * n; }",
        &[MockBinding::new("this.factor", Some("3"))],
        FunctionIdentity::default(),
        &["5"],
    );
    assert!(out.status.success(), "{}", stderr(&out));
    assert!(stdout(&out).contains("Result: 15\n"));
}

#[test]
fn test_arrow_bound() {
    if !node_available() {
        return;
    }
    let out = run(
        "(n) => this.factor * n",
        &[MockBinding::new("this.factor", Some("3"))],
        FunctionIdentity::default(),
        &["5"],
    );
    assert!(out.status.success(), "{}", stderr(&out));
    assert!(stdout(&out).contains("Result: 15\n"));
}

#[test]
fn test_failure_with_process_mock_exits_non_zero() {
    if !node_available() {
        return;
    }
    let out = run(
        "if (process.env.MODE === 'prod') {\n  throw new Error('boom');\n}\nreturn 0;",
        &[MockBinding::new("process.env.MODE", Some("'prod'"))],
        FunctionIdentity::default(),
        &[],
    );
    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.contains("✗ Failed after "));
    assert!(err.contains("Error: boom"));
}

#[test]
fn test_clock_mock_records_only_fragment_calls() {
    if !node_available() {
        return;
    }
    let out = run(
        "return performance.now();",
        &[MockBinding::new("performance.now", Some("() => 42"))],
        FunctionIdentity::default(),
        &[],
    );
    assert!(out.status.success(), "{}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("Result: 42\n"));
    assert!(text.contains("#1 performance.now() → 42"));
    assert!(!text.contains("#2 "));
}

#[test]
fn test_date_now_mock_keeps_date_constructor() {
    if !node_available() {
        return;
    }
    let out = run(
        "return [Date.now(), new Date(0).getTime(), Date.UTC(1970, 0, 1)];",
        &[MockBinding::new("Date.now", Some("() => 5"))],
        FunctionIdentity::default(),
        &[],
    );
    assert!(out.status.success(), "{}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("Result: [5,0,0]\n"));
    assert!(text.contains("#1 Date.now() → 5"));
    assert!(!text.contains("#2 "));
}
