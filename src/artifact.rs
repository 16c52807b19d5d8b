//! Artifact store: writes generated scripts under collision-free names and
//! keeps the directory bounded.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::codegen::GeneratedScript;
use crate::error::{HarnessError, HarnessResult};
use crate::options::HarnessOptions;

/// Inspector port used when debug mode does not name one.
pub const DEBUG_PORT: u16 = 9229;

const ARTIFACT_PREFIX: &str = "harness-";
const ARTIFACT_EXTENSION: &str = ".js";

static ARTIFACT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Upper bound on artifacts in the directory, counting the one being written.
    pub max_artifacts: usize,
    pub max_age: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_artifacts: 50,
            max_age: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Program and arguments that run an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchPlan {
    pub program: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub path: PathBuf,
    pub digest: String,
}

impl Artifact {
    /// `debug_port` is `Some` in debug mode and pauses on the first line
    /// with an inspector attached.
    pub fn launch_plan(&self, runtime: &str, debug_port: Option<u16>) -> LaunchPlan {
        let mut args = Vec::new();
        if let Some(port) = debug_port {
            args.push(format!("--inspect-brk={}", port));
        }
        args.push(self.path.to_string_lossy().to_string());
        LaunchPlan {
            program: runtime.to_string(),
            args,
        }
    }
}

pub fn compute_digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// `harness-<millis>-<sequence>-<digest prefix>.js`
fn artifact_name(digest: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let sequence = ARTIFACT_SEQUENCE.fetch_add(1, Ordering::SeqCst);
    format!(
        "{}{}-{}-{}{}",
        ARTIFACT_PREFIX,
        millis,
        sequence,
        &digest[..8],
        ARTIFACT_EXTENSION
    )
}

fn is_artifact(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(ARTIFACT_PREFIX) && n.ends_with(ARTIFACT_EXTENSION))
}

pub struct ArtifactStore {
    dir: PathBuf,
    retention: RetentionPolicy,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, retention: RetentionPolicy) -> Self {
        Self {
            dir: dir.into(),
            retention,
        }
    }

    pub fn from_options(options: &HarnessOptions) -> Self {
        Self::new(options.resolved_artifact_dir(), options.retention())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Artifacts in the store with their modification times, newest first.
    pub fn list(&self) -> Vec<(PathBuf, SystemTime)> {
        let mut found = Vec::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let Ok(entry) = entry else { continue };
            let path = entry.path();
            if !entry.file_type().is_file() || !is_artifact(path) {
                continue;
            }
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(UNIX_EPOCH);
            found.push((path.to_path_buf(), modified));
        }
        found.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
        found
    }

    /// Removes expired artifacts, then all but the newest
    /// `max_artifacts - 1`. Returns how many files were removed.
    pub fn evict(&self) -> usize {
        let now = SystemTime::now();
        let keep = self.retention.max_artifacts.saturating_sub(1);
        let mut kept = 0;
        let mut removed = 0;

        for (path, modified) in self.list() {
            let expired = now
                .duration_since(modified)
                .is_ok_and(|age| age > self.retention.max_age);
            if !expired && kept < keep {
                kept += 1;
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "failed to evict artifact"),
            }
        }
        if removed > 0 {
            debug!(removed, dir = %self.dir.display(), "evicted artifacts");
        }
        removed
    }

    pub fn write(&self, script: &GeneratedScript) -> HarnessResult<Artifact> {
        fs::create_dir_all(&self.dir).map_err(|source| HarnessError::ArtifactDir {
            path: self.dir.clone(),
            source,
        })?;
        self.evict();

        let digest = compute_digest(&script.text);
        let path = self.dir.join(artifact_name(&digest));
        fs::write(&path, &script.text).map_err(|source| HarnessError::ArtifactWrite {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "artifact written");
        Ok(Artifact { path, digest })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::ExecutionShape;

    fn script(text: &str) -> GeneratedScript {
        GeneratedScript {
            text: text.to_string(),
            uses_self_binding: false,
            uses_async_context: false,
            is_bare_block: true,
            shape: ExecutionShape::Block,
            debug: false,
        }
    }

    #[test]
    fn test_write_names_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), RetentionPolicy::default());
        let a = store.write(&script("console.log(1);")).unwrap();
        let b = store.write(&script("console.log(1);")).unwrap();
        assert_ne!(a.path, b.path);
        assert_eq!(a.digest, b.digest);
        assert_eq!(fs::read_to_string(&a.path).unwrap(), "console.log(1);");

        let name = a.path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("harness-"));
        assert!(name.ends_with(&format!("-{}.js", &a.digest[..8])));
    }

    #[test]
    fn test_count_retention() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(
            dir.path(),
            RetentionPolicy {
                max_artifacts: 3,
                max_age: Duration::from_secs(3600),
            },
        );
        for i in 0..6 {
            store.write(&script(&format!("run({});", i))).unwrap();
        }
        assert_eq!(store.list().len(), 3);
    }

    #[test]
    fn test_age_retention_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("harness-1-0-deadbeef.js");
        fs::write(&old, "old").unwrap();
        let two_days = Duration::from_secs(2 * 24 * 60 * 60);
        fs::File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(SystemTime::now() - two_days)
            .unwrap();
        let foreign = dir.path().join("notes.txt");
        fs::write(&foreign, "keep").unwrap();

        let store = ArtifactStore::new(dir.path(), RetentionPolicy::default());
        store.write(&script("fresh();")).unwrap();
        assert!(!old.exists());
        assert!(foreign.exists());
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn test_write_fails_when_dir_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        let store = ArtifactStore::new(blocker.join("nested"), RetentionPolicy::default());
        let err = store.write(&script("x")).unwrap_err();
        assert_eq!(err.code(), "H-ERR-ARTIFACT-001");
    }

    #[test]
    fn test_launch_plan() {
        let artifact = Artifact {
            path: PathBuf::from("/tmp/harness-1-0-abcdef12.js"),
            digest: "abcdef12".to_string(),
        };
        assert_eq!(
            artifact.launch_plan("node", None),
            LaunchPlan {
                program: "node".to_string(),
                args: vec!["/tmp/harness-1-0-abcdef12.js".to_string()],
            }
        );
        assert_eq!(
            artifact.launch_plan("node", Some(DEBUG_PORT)).args[0],
            "--inspect-brk=9229"
        );
    }
}
