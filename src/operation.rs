//! What vrpd can do for you.
//!
//! This module contains all the commands you can give to the
//! executable: produce a one-shot list of VRPs, keep a local copy of
//! the repository up to date, or run the RTR server.

use std::path::PathBuf;
use std::str::FromStr;
use clap::{App, Arg, ArgMatches, SubCommand};
use log::{error, info};
use crate::config::Config;
use crate::engine::Engine;
use crate::error::{ExitError, Failed};
use crate::log as logging;
use crate::output::OutputFormat;
use crate::payload::{SharedHistory, ValidationReport};
use crate::rtr::{rtr_listener, NotifySender};
use crate::slurm::LocalExceptions;


//------------ Operation -----------------------------------------------------

/// The command to run.
pub enum Operation {
    /// Produce a list of validated ROA payloads and exit.
    Vrps {
        /// The destination to output the list to. `None` means stdout.
        output: Option<PathBuf>,

        /// The desired output format.
        format: OutputFormat,

        /// Don't update the local copy of the repository first.
        noupdate: bool,
    },

    /// Update the local copy of the repository and exit.
    Update,

    /// Run as the RTR server.
    Server,
}

impl Operation {
    /// Adds the command configuration to a clap app.
    pub fn config_args<'a: 'b, 'b>(app: App<'a, 'b>) -> App<'a, 'b> {
        app
        .subcommand(SubCommand::with_name("vrps")
            .about("Produces a list of validated ROA payloads")
            .arg(Arg::with_name("output")
                .short("o")
                .long("output")
                .value_name("FILE")
                .help("output file, '-' or not present for stdout")
                .takes_value(true)
            )
            .arg(Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .possible_values(OutputFormat::VALUES)
                .default_value("csv")
                .help("sets the output format")
                .takes_value(true)
            )
            .arg(Arg::with_name("noupdate")
                .short("n")
                .long("noupdate")
                .help("don't update the local repository copy")
            )
        )
        .subcommand(SubCommand::with_name("update")
            .about("Updates the local copy of the RPKI repository")
        )
        .subcommand(SubCommand::with_name("server")
            .about("Starts the RTR server")
        )
    }

    /// Creates the operation from the command line arguments.
    pub fn from_arg_matches(
        matches: &ArgMatches
    ) -> Result<Self, Failed> {
        Ok(match matches.subcommand() {
            ("vrps", Some(matches)) => {
                Operation::Vrps {
                    output: match matches.value_of("output") {
                        None | Some("-") => None,
                        Some(path) => Some(path.into()),
                    },
                    format: OutputFormat::from_str(
                        matches.value_of("format").unwrap_or("csv")
                    ).map_err(|_| {
                        error!("Invalid output format.");
                        Failed
                    })?,
                    noupdate: matches.is_present("noupdate"),
                }
            }
            ("update", _) => Operation::Update,
            ("server", _) => Operation::Server,
            _ => {
                error!(
                    "Expected a command. See 'vrpd --help' for a list."
                );
                return Err(Failed)
            }
        })
    }

    /// Runs the command.
    pub fn run(self, config: Config) -> Result<(), ExitError> {
        match self {
            Operation::Vrps { output, format, noupdate } => {
                Self::vrps(config, output, format, noupdate)
            }
            Operation::Update => Self::update(config),
            Operation::Server => Self::server(config),
        }
    }

    /// Produces a list of validated ROA payloads.
    fn vrps(
        config: Config,
        output: Option<PathBuf>,
        format: OutputFormat,
        noupdate: bool,
    ) -> Result<(), ExitError> {
        logging::switch(&config)?;
        config.prepare_dirs()?;
        let engine = Engine::new(&config, !noupdate)?;
        let history = SharedHistory::from_config(&config);
        run_cycle(&engine, &history, &config)?;
        let snapshot = history.read().current().unwrap_or_default();
        match output {
            Some(ref path) => format.output_to_file(&snapshot, path)?,
            None => format.output_to_stdout(&snapshot)?,
        }
        Ok(())
    }

    /// Updates the local copy of the repository.
    fn update(config: Config) -> Result<(), ExitError> {
        logging::switch(&config)?;
        config.prepare_dirs()?;
        let engine = Engine::new(&config, true)?;
        let history = SharedHistory::from_config(&config);
        run_cycle(&engine, &history, &config)?;
        Ok(())
    }

    /// Runs the RTR server.
    ///
    /// The server itself lives on a tokio runtime while validation runs
    /// happen on their own worker threads, one cycle at a time.
    fn server(config: Config) -> Result<(), ExitError> {
        logging::switch(&config)?;
        config.prepare_dirs()?;
        let engine = Engine::new(&config, true)?;
        let history = SharedHistory::from_config(&config);
        let notify = NotifySender::new();

        // Bind the listeners before anything long-running happens so
        // a busy port is an immediate, visible failure.
        let rtr = rtr_listener(history.clone(), &notify, &config)?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|err| {
                error!("Failed to create runtime: {}", err);
                ExitError::Generic
            })?;

        runtime.block_on(async move {
            tokio::spawn(rtr);
            loop {
                let updated = tokio::task::block_in_place(|| {
                    run_cycle(&engine, &history, &config)
                });
                let wait = match updated {
                    Ok(true) => {
                        notify.notify();
                        config.refresh
                    }
                    Ok(false) => config.refresh,
                    Err(_) => {
                        // The cycle was abandoned; the previous data
                        // set stays in place and we try again a little
                        // sooner.
                        info!(
                            "Validation run failed. Retrying in {}s.",
                            config.retry.as_secs()
                        );
                        config.retry
                    }
                };
                tokio::time::sleep(wait).await;
            }
        })
    }
}


//------------ Helpers -------------------------------------------------------

/// Performs one validation cycle and folds the result into the history.
///
/// Returns whether the history moved to a new serial. A failed cycle
/// leaves the history untouched and returns an error.
fn run_cycle(
    engine: &Engine,
    history: &SharedHistory,
    config: &Config,
) -> Result<bool, Failed> {
    let exceptions = load_exceptions(config)?;
    let report = ValidationReport::new();
    let run = engine.start(&report);
    run.process()?;
    let mut metrics = run.done();
    let updated = history.update(report, &exceptions, &mut metrics);
    metrics.log();
    Ok(updated)
}

/// Loads the local exceptions named in the configuration.
///
/// They are reloaded for every cycle so edits take effect on the next
/// run without a restart.
fn load_exceptions(
    config: &Config
) -> Result<LocalExceptions, Failed> {
    match config.exceptions {
        Some(ref path) => {
            LocalExceptions::from_file(path).map_err(|err| {
                error!(
                    "Failed to load exceptions file {}: {}",
                    path.display(), err
                );
                Failed
            })
        }
        None => Ok(LocalExceptions::empty())
    }
}
