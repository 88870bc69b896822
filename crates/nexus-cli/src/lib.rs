//! Command-line controller for a Nexus host daemon.
//!
//! The runtime owns argument parsing, configuration bootstrapping and the
//! connection to the daemon. Each invocation opens one channel, runs one
//! command over it and closes it again. The interface is exercised both from
//! the binary entry point and from tests where configuration loading and the
//! output streams are substituted.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use nexus_config::Config;
use nexus_rpc::NexusClient;

mod cli;
mod config;
mod errors;
pub mod output;
mod planner;

use cli::{Cli, CliCommand};
use config::{command_arguments, split_config_arguments};
pub(crate) use config::{ConfigLoader, OrthoConfigLoader};
pub(crate) use errors::{AppError, is_daemon_not_running};
pub use output::{OutputFormat, ResolvedOutputFormat};
use planner::{FilePlanner, PlanSource};

/// Bundles the IO streams provided to the CLI runtime.
pub(crate) struct IoStreams<'a, W: Write, E: Write> {
    pub(crate) stdout: &'a mut W,
    pub(crate) stderr: &'a mut E,
    stdout_is_terminal: bool,
}

impl<'a, W: Write, E: Write> IoStreams<'a, W, E> {
    pub(crate) const fn new(stdout: &'a mut W, stderr: &'a mut E, stdout_is_terminal: bool) -> Self {
        Self {
            stdout,
            stderr,
            stdout_is_terminal,
        }
    }
}

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E, stdout_is_terminal: bool) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let mut io = IoStreams::new(stdout, stderr, stdout_is_terminal);
    run_with_loader(args, &mut io, &OrthoConfigLoader)
}

pub(crate) fn run_with_loader<I, W, E, L>(
    args: I,
    io: &mut IoStreams<'_, W, E>,
    loader: &L,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let args: Vec<OsString> = args.into_iter().collect();
    let split = split_config_arguments(&args);

    let cli = match Cli::try_parse_from(command_arguments(&args, &split)) {
        Ok(cli) => cli,
        Err(error) if !error.use_stderr() => {
            // --help and --version are successful requests.
            return match write!(io.stdout, "{error}") {
                Ok(()) => ExitCode::SUCCESS,
                Err(_) => ExitCode::FAILURE,
            };
        }
        Err(error) => return report_failure(io, &AppError::CliUsage(error), None),
    };

    let config = match loader.load(&split.config_arguments) {
        Ok(config) => config,
        Err(error) => return report_failure(io, &error, None),
    };

    match execute(cli, &config, io) {
        Ok(exit_code) => exit_code,
        Err(error) => report_failure(io, &error, Some(&config)),
    }
}

fn report_failure<W: Write, E: Write>(
    io: &mut IoStreams<'_, W, E>,
    error: &AppError,
    config: Option<&Config>,
) -> ExitCode {
    let mut message = format!("nexus: {error}\n");
    if is_daemon_not_running(error)
        && let Some(config) = config
    {
        message.push_str(&format!(
            "hint: is nexusd running and listening on {}?\n",
            config.endpoint()
        ));
    }
    if io.stderr.write_all(message.as_bytes()).is_err() {
        // Nothing left to report to.
    }
    ExitCode::FAILURE
}

fn execute<W: Write, E: Write>(
    cli: Cli,
    config: &Config,
    io: &mut IoStreams<'_, W, E>,
) -> Result<ExitCode, AppError> {
    nexus_config::initialise(config).map_err(AppError::Telemetry)?;
    let format = cli.output.resolve(io.stdout_is_terminal);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(AppError::Runtime)?;

    runtime.block_on(async {
        let client = NexusClient::connect(
            &config.endpoint().url(),
            config.request_timeout(),
            config.step_delay(),
        )
        .await?;
        let result = run_command(&client, cli.command, format, io.stdout).await;
        client.close().await;
        result
    })
}

async fn run_command<W: Write>(
    client: &NexusClient,
    command: CliCommand,
    format: ResolvedOutputFormat,
    stdout: &mut W,
) -> Result<ExitCode, AppError> {
    match command {
        CliCommand::Objects => {
            let names = client.list_entities().await?;
            output::objects(stdout, format, &names)?;
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Detail { name } => {
            let Some(detail) = client.entity_detail(&name).await? else {
                return Err(AppError::UnknownObject(name));
            };
            output::detail(stdout, format, &detail)?;
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Context { utterance } => {
            let context = client.scene_context(&utterance).await?;
            output::context(stdout, format, &context)?;
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Run { plan, utterance } => {
            let planner = FilePlanner::new(PlanSource::from(plan));
            let report = client.execute(&planner, &utterance).await?;
            output::report(stdout, format, &report)?;
            Ok(if report.all_completed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
