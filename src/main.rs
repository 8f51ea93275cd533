use std::process::exit;
use clap::{crate_authors, crate_version, App, ArgMatches};
use vrpd::{Config, ExitError, Operation};

fn run(matches: &ArgMatches) -> Result<(), ExitError> {
    vrpd::log::init()?;
    let cur_dir = Config::current_dir()?;
    let config = Config::from_arg_matches(matches, &cur_dir)?;
    let operation = Operation::from_arg_matches(matches)?;
    operation.run(config)
}

fn main() {
    let matches = Operation::config_args(Config::config_args(
        App::new("vrpd")
            .version(crate_version!())
            .author(crate_authors!())
            .about("validates RPKI data and serves it to routers")
    )).get_matches();

    match run(&matches) {
        Ok(()) => exit(0),
        Err(err) => exit(err.exit_code()),
    }
}
