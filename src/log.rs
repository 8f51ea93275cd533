//! Logging.
//!
//! Logging is set up in two steps. [`init`] installs a rerouting logger
//! with a plain stderr target early on so that configuration errors are
//! visible. Once the configuration is known, [`switch`] replaces the
//! target with whatever the configuration asks for.

use std::io;
use log::LevelFilter;
use crate::config::Config;
use crate::error::{ExitError, Failed};


/// Initializes logging to stderr at warning level.
///
/// Needs to be called before the configuration is parsed so early
/// errors end up somewhere visible.
pub fn init() -> Result<(), ExitError> {
    if log_reroute::init().is_err() {
        eprintln!("Failed to initialize logger.");
        return Err(ExitError::Generic)
    }
    switch_target(LevelFilter::Warn, None).map_err(|_| {
        ExitError::Generic
    })
}

/// Switches logging to the configured level and target.
pub fn switch(config: &Config) -> Result<(), Failed> {
    switch_target(config.log_level, config.log_file.as_deref())
}

fn switch_target(
    level: LevelFilter,
    file: Option<&std::path::Path>,
) -> Result<(), Failed> {
    let dispatch = fern::Dispatch::new()
        .level(level)
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}] {}", record.level(), message
            ))
        });
    let dispatch = match file {
        Some(path) => {
            let file = fern::log_file(path).map_err(|err| {
                eprintln!(
                    "Failed to open log file {}: {}", path.display(), err
                );
                Failed
            })?;
            dispatch.chain(file)
        }
        None => dispatch.chain(io::stderr())
    };
    let (_, logger) = dispatch.into_log();
    log_reroute::reroute_boxed(logger);
    log::set_max_level(level);
    Ok(())
}
