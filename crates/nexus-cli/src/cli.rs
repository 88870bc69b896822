//! CLI argument definitions for the Nexus controller.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

/// Command-line interface for the Nexus controller.
#[derive(Parser, Debug)]
#[command(name = "nexus", disable_help_subcommand = true)]
pub(crate) struct Cli {
    /// Controls how results are rendered.
    #[arg(long, value_enum, default_value_t = OutputFormat::Auto)]
    pub(crate) output: OutputFormat,
    /// The command to run against the host daemon.
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Commands understood by the controller.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum CliCommand {
    /// Lists the objects in the host scene.
    Objects,
    /// Prints the details of one object.
    Detail {
        /// Object name, for example `Cube.001`.
        name: String,
    },
    /// Prints the scene description a planner would receive.
    Context {
        /// The user's request; a mentioned object gets its details attached.
        utterance: String,
    },
    /// Runs a plan file step by step.
    Run {
        /// JSON plan file, or `-` to read standard input.
        plan: PathBuf,
        /// Utterance the plan answers, used for the planner's scene context.
        #[arg(long, default_value = "")]
        utterance: String,
    },
}
