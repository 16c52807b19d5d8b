//! # fragment-harness
//!
//! Runs an arbitrary JavaScript/TypeScript fragment in isolation with its
//! external dependencies replaced by mocks.
//!
//! ## Pipeline
//!
//! 1. **Analyze**: [`analyze`] reports the dotted keys the fragment depends on
//!    but does not define (`api.get`, `this.logger.error`, `CONFIG`, ...).
//!    Calls come from the syntax tree when the fragment parses and from a
//!    masked-text scan when it does not.
//! 2. **Normalize**: [`normalize`] removes module syntax, erases TypeScript
//!    types and turns a lone method into a standalone function.
//! 3. **Generate**: [`generate`] emits one self-contained script that installs
//!    the mocks on an explicit `__ctx` record, invokes the fragment in the
//!    right execution shape, and reports the result and every mock call.
//! 4. **Prepare**: [`prepare_run`] writes the script to the artifact store and
//!    returns the launch plan.
//!
//! ## Runtime invariants
//!
//! - Mock roots are bound as lexical constants, never assigned onto
//!   `globalThis`, so concurrent runs cannot see each other's mocks.
//! - Every failure at run time funnels through one catch handler that sets
//!   `process.exitCode = 1`.

#[cfg(feature = "napi")]
use napi_derive::napi;

pub mod artifact;
pub mod bridge;
pub mod classify;
pub mod codegen;
mod detect_text;
mod detect_tree;
pub mod erase;
pub mod error;
pub mod fragment;
mod globals;
pub mod logging;
pub mod mock;
pub mod normalize;
pub mod options;
pub mod params;
pub mod pipeline;
pub mod references;
mod scan;
mod scope;
pub mod shape;

#[cfg(test)]
mod property_tests;
#[cfg(test)]
mod scenario_tests;

pub use artifact::{Artifact, ArtifactStore, LaunchPlan, RetentionPolicy, DEBUG_PORT};
pub use codegen::{generate, generate_with_options, GeneratedScript};
pub use error::{HarnessError, HarnessResult};
pub use fragment::{FragmentOrigin, FunctionIdentity, LocalScopeSet, SourceFragment};
pub use logging::init_tracing;
pub use mock::{MockBinding, MockPlacement, MockValue, ResolvedMock};
pub use normalize::{normalize, NormalizedFragment};
pub use options::HarnessOptions;
pub use pipeline::{prepare_run, PreparedRun, RunRequest};
pub use references::{
    analyze, analyze_with, CallDetector, ExternalReference, ReferenceKind, ReferenceSet,
};
pub use shape::{CalleeForm, ExecutionShape};

#[cfg(feature = "napi")]
pub use bridge::{
    analyze_references_native, init_logging_native, normalize_fragment_native, prepare_run_native,
};

#[cfg(feature = "napi")]
#[napi]
pub fn harness_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
