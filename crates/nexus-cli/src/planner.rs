//! Planner that replays a plan produced ahead of time.

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use nexus_rpc::{Plan, Planner, PlannerError};
use tracing::debug;

const PLANNER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::planner");

/// Where the plan text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PlanSource {
    Stdin,
    File(PathBuf),
}

impl From<PathBuf> for PlanSource {
    fn from(path: PathBuf) -> Self {
        if path.as_os_str() == "-" {
            Self::Stdin
        } else {
            Self::File(path)
        }
    }
}

/// Reads the planner's JSON output from a file or standard input.
///
/// The scene context is ignored apart from being logged; the plan was
/// already decided by whoever wrote the file.
#[derive(Debug)]
pub(crate) struct FilePlanner {
    source: PlanSource,
}

impl FilePlanner {
    pub(crate) const fn new(source: PlanSource) -> Self {
        Self { source }
    }

    fn read(&self) -> io::Result<String> {
        match &self.source {
            PlanSource::File(path) => fs::read_to_string(path),
            PlanSource::Stdin => {
                let mut text = String::new();
                io::stdin().read_to_string(&mut text)?;
                Ok(text)
            }
        }
    }
}

impl Planner for FilePlanner {
    fn produce_plan(&self, scene_context: &str, utterance: &str) -> Result<Plan, PlannerError> {
        debug!(target: PLANNER_TARGET, scene_context, utterance, source = ?self.source, "loading plan");
        let text = self.read().map_err(|error| {
            PlannerError::Unavailable(format!("cannot read plan {:?}: {error}", self.source))
        })?;
        Plan::from_json(&text)
    }
}
