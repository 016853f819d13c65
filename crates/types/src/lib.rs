//! Shared type definitions for the gust CLI.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Workflow dispatch inputs, keyed by input name.
///
/// A `BTreeMap` keeps serialization order stable, which keeps dispatch
/// payloads reproducible in logs and tests.
pub type InputMap = BTreeMap<String, String>;

/// Everything needed to dispatch one workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSpec {
    /// Repository identifier as `owner/name`.
    pub repo: String,
    /// Git ref (branch name or commit hash) the workflow runs against.
    pub ref_name: String,
    /// Workflow reference as given on the command line; may be a bare name
    /// or an explicit `.yml`/`.yaml` file name.
    pub workflow: String,
    /// Dispatch inputs forwarded to the workflow.
    pub inputs: InputMap,
}

/// Behavior toggles collected from the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// Commit local changes before dispatching.
    pub commit: bool,
    /// Push after committing.
    pub push: bool,
    /// Print the run URL once correlated.
    pub print: bool,
    /// Open the run URL in a browser.
    pub open: bool,
    /// Attach an interactive watch session to the run.
    pub watch: bool,
}
