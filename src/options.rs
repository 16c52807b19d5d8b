//! Harness configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::artifact::{RetentionPolicy, DEBUG_PORT};

/// Directory name under the system temp dir used when no artifact
/// directory is configured.
pub const DEFAULT_ARTIFACT_SUBDIR: &str = "fragment-harness";

fn default_debug_port() -> u16 {
    DEBUG_PORT
}

fn default_runtime() -> String {
    "node".to_string()
}

fn default_max_artifacts() -> usize {
    50
}

fn default_max_artifact_age_secs() -> u64 {
    24 * 60 * 60
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarnessOptions {
    /// Pause on `debugger;` and launch with an inspector attached.
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_debug_port")]
    pub debug_port: u16,
    /// Program used to run generated scripts.
    #[serde(default = "default_runtime")]
    pub runtime: String,
    #[serde(default)]
    pub artifact_dir: Option<PathBuf>,
    #[serde(default = "default_max_artifacts")]
    pub max_artifacts: usize,
    #[serde(default = "default_max_artifact_age_secs")]
    pub max_artifact_age_secs: u64,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            debug: false,
            debug_port: default_debug_port(),
            runtime: default_runtime(),
            artifact_dir: None,
            max_artifacts: default_max_artifacts(),
            max_artifact_age_secs: default_max_artifact_age_secs(),
        }
    }
}

impl HarnessOptions {
    pub fn debug() -> Self {
        Self {
            debug: true,
            ..Default::default()
        }
    }

    pub fn resolved_artifact_dir(&self) -> PathBuf {
        self.artifact_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_ARTIFACT_SUBDIR))
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_artifacts: self.max_artifacts,
            max_age: Duration::from_secs(self.max_artifact_age_secs),
        }
    }
}
