//! End-to-end preparation of one run: normalize, resolve identity,
//! generate, write the artifact and plan its launch.

use serde::{Deserialize, Serialize};
use tracing::{debug, info_span};

use crate::artifact::{Artifact, ArtifactStore, LaunchPlan};
use crate::codegen::{generate_with_options, GeneratedScript};
use crate::error::HarnessResult;
use crate::fragment::{FunctionIdentity, LocalScopeSet, SourceFragment};
use crate::mock::{place, MockBinding};
use crate::normalize::normalize;
use crate::options::HarnessOptions;
use crate::references::analyze;
use crate::shape::ExecutionShape;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub fragment: SourceFragment,
    /// Supplied identity; extracted from the fragment when absent.
    #[serde(default)]
    pub identity: Option<FunctionIdentity>,
    /// Names the editor knows are bound around the fragment.
    #[serde(default)]
    pub known_locals: LocalScopeSet,
    #[serde(default)]
    pub mocks: Vec<MockBinding>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub options: HarnessOptions,
}

impl RunRequest {
    pub fn new(fragment: SourceFragment) -> Self {
        Self {
            fragment,
            identity: None,
            known_locals: LocalScopeSet::new(),
            mocks: Vec::new(),
            args: Vec::new(),
            options: HarnessOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedRun {
    pub artifact: Artifact,
    pub launch: LaunchPlan,
    pub identity: FunctionIdentity,
    pub shape: ExecutionShape,
    /// External reference keys found in the fragment.
    pub references: Vec<String>,
    pub stripped_modules: Vec<String>,
    pub warnings: Vec<String>,
}

/// Identity to invoke: the supplied one when it names a function,
/// otherwise whatever the normalized code declares. With arguments to pass,
/// a top-level declaration further down the fragment also counts.
pub fn resolve_identity(
    supplied: Option<&FunctionIdentity>,
    normalized_code: &str,
    has_args: bool,
) -> FunctionIdentity {
    match supplied {
        Some(identity) if !identity.is_empty() => identity.clone(),
        _ => {
            let extracted = FunctionIdentity::extract(normalized_code);
            if extracted.name.is_none() && has_args {
                FunctionIdentity::declared_in(normalized_code).unwrap_or(extracted)
            } else {
                extracted
            }
        }
    }
}

fn collect_warnings(
    request: &RunRequest,
    references: &[String],
    stripped: &[String],
    script: &GeneratedScript,
) -> Vec<String> {
    let mut warnings = Vec::new();
    if !stripped.is_empty() {
        warnings.push(format!("imports removed: {}", stripped.join(", ")));
    }
    if script.is_bare_block && !request.args.is_empty() {
        warnings.push(format!(
            "{} argument(s) ignored: the fragment declares no function to call",
            request.args.len()
        ));
    }
    for mock in request.mocks.iter().filter(|m| m.enabled) {
        let key = mock.key.trim();
        if place(key).is_none() {
            warnings.push(format!("mock `{}` skipped: not a dotted identifier path", key));
        } else if !references.iter().any(|r| r == key) {
            warnings.push(format!("mock `{}` does not match a reference in the fragment", key));
        }
    }
    warnings
}

pub fn prepare_run(request: &RunRequest) -> HarnessResult<PreparedRun> {
    let span = info_span!("prepare_run", origin = ?request.fragment.origin());
    let _guard = span.enter();

    let references = analyze(&request.fragment, &request.known_locals).keys();
    let normalized = normalize(request.fragment.text());
    let identity = resolve_identity(
        request.identity.as_ref(),
        &normalized.code,
        !request.args.is_empty(),
    );
    let script = generate_with_options(
        &normalized,
        &request.mocks,
        &identity,
        &request.args,
        &request.options,
    );

    let store = ArtifactStore::from_options(&request.options);
    let artifact = store.write(&script)?;
    let debug_port = request.options.debug.then_some(request.options.debug_port);
    let launch = artifact.launch_plan(&request.options.runtime, debug_port);
    let warnings = collect_warnings(request, &references, &normalized.stripped_modules, &script);

    debug!(
        path = %artifact.path.display(),
        shape = ?script.shape,
        warnings = warnings.len(),
        "run prepared"
    );

    Ok(PreparedRun {
        artifact,
        launch,
        identity,
        shape: script.shape,
        references,
        stripped_modules: normalized.stripped_modules,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_in(dir: &std::path::Path, code: &str) -> RunRequest {
        let mut request = RunRequest::new(SourceFragment::selection(code));
        request.options.artifact_dir = Some(dir.to_path_buf());
        request
    }

    #[test]
    fn test_identity_resolution() {
        let supplied = FunctionIdentity::named("run", vec![]);
        assert_eq!(resolve_identity(Some(&supplied), "function other() {}", false), supplied);
        assert_eq!(
            resolve_identity(Some(&FunctionIdentity::default()), "function other(a) {}", false),
            FunctionIdentity::named("other", vec!["a".to_string()])
        );
        assert_eq!(resolve_identity(None, "return 1;", true), FunctionIdentity::default());

        let later = "const base = 20;\nfunction run(n) { return base + n; }";
        assert_eq!(resolve_identity(None, later, false), FunctionIdentity::default());
        assert_eq!(
            resolve_identity(None, later, true),
            FunctionIdentity::named("run", vec!["n".to_string()])
        );
    }

    #[test]
    fn test_prepare_run_writes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut request = request_in(
            dir.path(),
            "async function getUser(id) { return await api.get(id); }",
        );
        request.mocks.push(MockBinding::new("api.get", Some("async (id) => ({ id })")));
        request.mocks.push(MockBinding::new("db.load", Some("() => 1")));
        request.args.push("1".to_string());

        let prepared = prepare_run(&request).unwrap();
        assert!(prepared.artifact.path.starts_with(dir.path()));
        assert!(prepared.artifact.path.exists());
        assert_eq!(prepared.shape, ExecutionShape::NamedCall);
        assert_eq!(prepared.identity.name.as_deref(), Some("getUser"));
        assert_eq!(prepared.references, vec!["api.get"]);
        assert_eq!(prepared.launch.program, "node");
        assert_eq!(prepared.launch.args.len(), 1);
        assert_eq!(
            prepared.warnings,
            vec!["mock `db.load` does not match a reference in the fragment"]
        );
    }

    #[test]
    fn test_debug_launch_and_stripped_warning() {
        let dir = tempfile::tempdir().unwrap();
        let mut request = request_in(dir.path(), "import { x } from \"./m\"; return x + 1;");
        request.options.debug = true;

        let prepared = prepare_run(&request).unwrap();
        assert_eq!(prepared.launch.args[0], "--inspect-brk=9229");
        assert_eq!(prepared.stripped_modules, vec!["./m"]);
        assert_eq!(prepared.warnings, vec!["imports removed: ./m"]);
    }

    #[test]
    fn test_request_from_json() {
        let request: RunRequest = serde_json::from_str(
            r#"{"fragment":{"text":"return 1;"},"mocks":[{"key":"fetch"}],"options":{"debug":true}}"#,
        )
        .unwrap();
        assert_eq!(request.fragment.text(), "return 1;");
        assert!(request.mocks[0].enabled);
        assert!(request.options.debug);
        assert!(request.identity.is_none());
    }

    #[test]
    fn test_arguments_without_callee_warn() {
        let dir = tempfile::tempdir().unwrap();
        let mut request = request_in(dir.path(), "const total = items.length;\nreturn total;");
        request.args.push("1".to_string());

        let prepared = prepare_run(&request).unwrap();
        assert_eq!(prepared.shape, ExecutionShape::Block);
        assert_eq!(
            prepared.warnings,
            vec!["1 argument(s) ignored: the fragment declares no function to call"]
        );
    }

    #[test]
    fn test_known_locals_filter_references() {
        let dir = tempfile::tempdir().unwrap();
        let mut request = request_in(dir.path(), "return client.send(limit);");
        request.known_locals = ["client"].into_iter().collect();

        let prepared = prepare_run(&request).unwrap();
        assert_eq!(prepared.references, vec!["limit"]);

        let from_json: RunRequest = serde_json::from_str(
            r#"{"fragment":{"text":"return 1;"},"knownLocals":["client"]}"#,
        )
        .unwrap();
        assert!(from_json.known_locals.contains("client"));
    }
}
