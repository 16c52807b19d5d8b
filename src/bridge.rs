//! Host surface: JSON in, JSON out.
//!
//! The `*_json` functions carry the behaviour and are always compiled; the
//! `#[napi]` wrappers only translate errors for the Node host.

#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};
use crate::fragment::{LocalScopeSet, SourceFragment};
use crate::normalize::normalize;
use crate::pipeline::{prepare_run, RunRequest};
use crate::references::{analyze, ExternalReference};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzePayload {
    pub fragment: SourceFragment,
    #[serde(default)]
    pub known_locals: LocalScopeSet,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeOutput {
    pub keys: Vec<String>,
    pub references: Vec<ExternalReference>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizePayload {
    pub code: String,
}

fn to_json<T: Serialize>(value: &T) -> HarnessResult<String> {
    serde_json::to_string(value).map_err(HarnessError::from)
}

pub fn analyze_references_json(payload: &str) -> HarnessResult<String> {
    let payload: AnalyzePayload = serde_json::from_str(payload)?;
    let set = analyze(&payload.fragment, &payload.known_locals);
    to_json(&AnalyzeOutput {
        keys: set.keys(),
        references: set.iter().collect(),
    })
}

pub fn normalize_fragment_json(payload: &str) -> HarnessResult<String> {
    let payload: NormalizePayload = serde_json::from_str(payload)?;
    to_json(&normalize(&payload.code))
}

pub fn prepare_run_json(payload: &str) -> HarnessResult<String> {
    let request: RunRequest = serde_json::from_str(payload)?;
    to_json(&prepare_run(&request)?)
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
fn to_napi(err: HarnessError) -> napi::Error {
    napi::Error::from_reason(err.to_string())
}

#[cfg(feature = "napi")]
#[napi]
pub fn analyze_references_native(payload_json: String) -> napi::Result<String> {
    analyze_references_json(&payload_json).map_err(to_napi)
}

#[cfg(feature = "napi")]
#[napi]
pub fn normalize_fragment_native(payload_json: String) -> napi::Result<String> {
    normalize_fragment_json(&payload_json).map_err(to_napi)
}

#[cfg(feature = "napi")]
#[napi]
pub fn prepare_run_native(request_json: String) -> napi::Result<String> {
    prepare_run_json(&request_json).map_err(to_napi)
}

#[cfg(feature = "napi")]
#[napi]
pub fn init_logging_native() -> bool {
    crate::logging::init_tracing()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_analyze_payload() {
        let out = analyze_references_json(
            r#"{"fragment":{"text":"async function getUser(id) { return await api.get(id); }"}}"#,
        )
        .unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["keys"], serde_json::json!(["api.get"]));
        assert_eq!(value["references"][0]["key"], "api.get");
    }

    #[test]
    fn test_known_locals_respected() {
        let out = analyze_references_json(
            r#"{"fragment":{"text":"client.send(1);"},"knownLocals":["client"]}"#,
        )
        .unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["keys"], serde_json::json!([]));
    }

    #[test]
    fn test_normalize_payload() {
        let out = normalize_fragment_json(r#"{"code":"import { x } from \"./m\"; return x + 1;"}"#).unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["code"], "return x + 1;");
        assert_eq!(value["strippedModules"], serde_json::json!(["./m"]));
    }

    #[test]
    fn test_bad_payload_has_code() {
        let err = prepare_run_json("{").unwrap_err();
        assert_eq!(err.code(), "H-ERR-PAYLOAD-001");
        let err = normalize_fragment_json(r#"{"text":1}"#).unwrap_err();
        assert_eq!(err.code(), "H-ERR-PAYLOAD-001");
    }
}
