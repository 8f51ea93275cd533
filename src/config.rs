//! Configuration.
//!
//! The configuration is assembled from command line arguments merged
//! over an optional TOML configuration file and frozen into a [`Config`]
//! value that the rest of the crate only ever reads.

use std::{env, fmt, fs};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use clap::{App, Arg, ArgMatches};
use log::{error, LevelFilter};
use crate::error::Failed;


//------------ Config --------------------------------------------------------

/// vrpd configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Path to the directory that contains the local repository copy.
    pub cache_dir: PathBuf,

    /// Path to the directory that contains the trust anchor locators.
    pub tal_dir: PathBuf,

    /// Path to the optional local exceptions file.
    pub exceptions: Option<PathBuf>,

    /// Should we do strict decoding?
    pub strict: bool,

    /// How to deal with stale manifests and CRLs.
    pub stale: FilterPolicy,

    /// How to deal with objects of unknown type.
    pub unknown_objects: FilterPolicy,

    /// Should Ghostbusters records be parsed rather than ignored?
    pub process_gbrs: bool,

    /// Whether to rsync from hosts with dubious names.
    pub allow_dubious_hosts: bool,

    /// Whether to never run rsync and use the local copy as is.
    pub disable_rsync: bool,

    /// The command to run for rsync.
    pub rsync_command: String,

    /// Arguments passed to rsync, overriding the computed default.
    pub rsync_args: Option<Vec<String>>,

    /// Timeout for rsync invocations.
    pub rsync_timeout: Duration,

    /// Number of validation worker threads.
    ///
    /// Each thread walks one trust anchor at a time, so this also
    /// bounds how many repositories are fetched concurrently.
    pub validation_threads: usize,

    /// Wall-clock budget for one validation run.
    pub validation_timeout: Option<Duration>,

    /// The refresh interval between validation runs.
    ///
    /// Also handed to RTR clients in End of Data PDUs.
    pub refresh: Duration,

    /// The retry interval handed to RTR clients.
    pub retry: Duration,

    /// The expire interval handed to RTR clients.
    pub expire: Duration,

    /// How many snapshots to keep in the history.
    pub history_size: usize,

    /// Addresses to listen on for RTR connections.
    pub rtr_listen: Vec<SocketAddr>,

    /// How long an RTR connection may sit idle before we drop it.
    pub rtr_client_timeout: Duration,

    /// The log level filter for setting up logging.
    pub log_level: LevelFilter,

    /// An optional file to write log output to.
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Adds the basic configuration arguments to a clap app.
    pub fn config_args<'a: 'b, 'b>(app: App<'a, 'b>) -> App<'a, 'b> {
        app
        .arg(Arg::with_name("config")
            .short("c")
            .long("config")
            .value_name("PATH")
            .help("read base configuration from this file")
            .takes_value(true)
        )
        .arg(Arg::with_name("base-dir")
            .short("b")
            .long("base-dir")
            .value_name("DIR")
            .help("sets the base directory for cache and TALs")
            .takes_value(true)
        )
        .arg(Arg::with_name("repository-dir")
            .short("r")
            .long("repository-dir")
            .value_name("DIR")
            .help("sets the repository cache directory")
            .takes_value(true)
        )
        .arg(Arg::with_name("tal-dir")
            .short("t")
            .long("tal-dir")
            .value_name("DIR")
            .help("sets the TAL directory")
            .takes_value(true)
        )
        .arg(Arg::with_name("exceptions")
            .short("x")
            .long("exceptions")
            .value_name("FILE")
            .help("file with local exceptions (RFC 8416 aka SLURM)")
            .takes_value(true)
        )
        .arg(Arg::with_name("strict")
            .long("strict")
            .help("parse RPKI data in strict mode")
        )
        .arg(Arg::with_name("stale")
            .long("stale")
            .value_name("POLICY")
            .possible_values(&["accept", "warn", "reject"])
            .help("the policy for handling stale objects")
            .takes_value(true)
        )
        .arg(Arg::with_name("unknown-objects")
            .long("unknown-objects")
            .value_name("POLICY")
            .possible_values(&["accept", "warn", "reject"])
            .help("the policy for handling unknown object types")
            .takes_value(true)
        )
        .arg(Arg::with_name("process-gbrs")
            .long("process-gbrs")
            .help("validate Ghostbusters records instead of ignoring them")
        )
        .arg(Arg::with_name("allow-dubious-hosts")
            .long("allow-dubious-hosts")
            .help("allow rsync URIs with dubious host names")
        )
        .arg(Arg::with_name("disable-rsync")
            .long("disable-rsync")
            .help("don't rsync, use the local copy as is")
        )
        .arg(Arg::with_name("rsync-command")
            .long("rsync-command")
            .value_name("COMMAND")
            .help("the command to run for rsync")
            .takes_value(true)
        )
        .arg(Arg::with_name("rsync-timeout")
            .long("rsync-timeout")
            .value_name("SECONDS")
            .help("timeout for rsync runs")
            .takes_value(true)
        )
        .arg(Arg::with_name("validation-threads")
            .long("validation-threads")
            .value_name("COUNT")
            .help("number of threads for validation")
            .takes_value(true)
        )
        .arg(Arg::with_name("validation-timeout")
            .long("validation-timeout")
            .value_name("SECONDS")
            .help("abandon a validation run after this long")
            .takes_value(true)
        )
        .arg(Arg::with_name("refresh")
            .long("refresh")
            .value_name("SECONDS")
            .help("refresh interval in seconds")
            .takes_value(true)
        )
        .arg(Arg::with_name("retry")
            .long("retry")
            .value_name("SECONDS")
            .help("RTR retry interval in seconds")
            .takes_value(true)
        )
        .arg(Arg::with_name("expire")
            .long("expire")
            .value_name("SECONDS")
            .help("RTR expire interval in seconds")
            .takes_value(true)
        )
        .arg(Arg::with_name("history")
            .long("history")
            .value_name("COUNT")
            .help("number of history versions to keep")
            .takes_value(true)
        )
        .arg(Arg::with_name("rtr-listen")
            .short("l")
            .long("rtr")
            .value_name("ADDR:PORT")
            .help("listen address for RTR")
            .takes_value(true)
            .multiple(true)
            .number_of_values(1)
        )
        .arg(Arg::with_name("rtr-client-timeout")
            .long("rtr-client-timeout")
            .value_name("SECONDS")
            .help("drop idle RTR connections after this long")
            .takes_value(true)
        )
        .arg(Arg::with_name("verbose")
            .short("v")
            .long("verbose")
            .multiple(true)
            .help("print more (and more) information")
        )
        .arg(Arg::with_name("quiet")
            .short("q")
            .long("quiet")
            .multiple(true)
            .help("print less information")
        )
        .arg(Arg::with_name("logfile")
            .long("logfile")
            .value_name("PATH")
            .help("log to this file instead of stderr")
            .takes_value(true)
        )
    }

    /// Creates the configuration from the command line arguments.
    pub fn from_arg_matches(
        matches: &ArgMatches,
        cur_dir: &Path,
    ) -> Result<Self, Failed> {
        let mut file = match matches.value_of("config") {
            Some(path) => ConfigFile::read(&cur_dir.join(path))?,
            None => ConfigFile::default(),
        };
        // Directory arguments are merged into the file content up front
        // so the defaults resolve even on systems without a home
        // directory.
        for key in &["base-dir", "repository-dir", "tal-dir"] {
            if let Some(dir) = matches.value_of(key) {
                file.content.insert(
                    (*key).into(),
                    toml::Value::String(
                        cur_dir.join(dir).display().to_string()
                    )
                );
            }
        }
        let mut res = Self::from_config_file(file, cur_dir)?;
        res.apply_arg_matches(matches, cur_dir)?;
        Ok(res)
    }

    /// Creates the basic configuration from a config file.
    fn from_config_file(
        mut file: ConfigFile,
        cur_dir: &Path,
    ) -> Result<Self, Failed> {
        let base_dir = match file.take_path("base-dir", cur_dir)? {
            Some(dir) => Some(dir),
            None => dirs::home_dir().map(|dir| dir.join(".rpki-cache"))
        };
        let dir_or = |
            specific: Option<PathBuf>, sub: &str
        | -> Result<PathBuf, Failed> {
            match specific {
                Some(dir) => Ok(dir),
                None => match base_dir.as_ref() {
                    Some(base) => Ok(base.join(sub)),
                    None => {
                        error!(
                            "Cannot determine default directories. \
                             Please use the -b option."
                        );
                        Err(Failed)
                    }
                }
            }
        };
        let cache_dir = dir_or(
            file.take_path("repository-dir", cur_dir)?, "repository"
        )?;
        let tal_dir = dir_or(
            file.take_path("tal-dir", cur_dir)?, "tals"
        )?;
        let res = Config {
            cache_dir,
            tal_dir,
            exceptions: file.take_path("exceptions", cur_dir)?,
            strict: file.take_bool("strict")?.unwrap_or(false),
            stale: file.take_from_str("stale")?
                .unwrap_or(FilterPolicy::Warn),
            unknown_objects: file.take_from_str("unknown-objects")?
                .unwrap_or(FilterPolicy::Warn),
            process_gbrs: file.take_bool("process-gbrs")?
                .unwrap_or(false),
            allow_dubious_hosts: file.take_bool("allow-dubious-hosts")?
                .unwrap_or(false),
            disable_rsync: file.take_bool("disable-rsync")?
                .unwrap_or(false),
            rsync_command: file.take_string("rsync-command")?
                .unwrap_or_else(|| "rsync".into()),
            rsync_args: file.take_string_array("rsync-args")?,
            rsync_timeout: Duration::from_secs(
                file.take_u64("rsync-timeout")?.unwrap_or(300)
            ),
            validation_threads: file.take_usize("validation-threads")?
                .unwrap_or_else(num_cpus::get),
            validation_timeout: file.take_u64("validation-timeout")?
                .map(Duration::from_secs)
                .or(Some(DEFAULT_VALIDATION_TIMEOUT)),
            refresh: Duration::from_secs(
                file.take_u64("refresh")?.unwrap_or(3600)
            ),
            retry: Duration::from_secs(
                file.take_u64("retry")?.unwrap_or(600)
            ),
            expire: Duration::from_secs(
                file.take_u64("expire")?.unwrap_or(7200)
            ),
            history_size: file.take_usize("history")?.unwrap_or(10),
            rtr_listen: file.take_socket_addrs("rtr-listen")?
                .unwrap_or_default(),
            rtr_client_timeout: Duration::from_secs(
                file.take_u64("rtr-client-timeout")?.unwrap_or(7200)
            ),
            log_level: file.take_from_str("log-level")?
                .unwrap_or(LevelFilter::Warn),
            log_file: file.take_path("logfile", cur_dir)?,
        };
        file.check_exhausted()?;
        Ok(res)
    }

    /// Applies the command line arguments over the configuration.
    fn apply_arg_matches(
        &mut self,
        matches: &ArgMatches,
        cur_dir: &Path,
    ) -> Result<(), Failed> {
        if let Some(dir) = matches.value_of("base-dir") {
            let base = cur_dir.join(dir);
            self.cache_dir = base.join("repository");
            self.tal_dir = base.join("tals");
        }
        if let Some(dir) = matches.value_of("repository-dir") {
            self.cache_dir = cur_dir.join(dir);
        }
        if let Some(dir) = matches.value_of("tal-dir") {
            self.tal_dir = cur_dir.join(dir);
        }
        if let Some(path) = matches.value_of("exceptions") {
            self.exceptions = Some(cur_dir.join(path));
        }
        if matches.is_present("strict") {
            self.strict = true
        }
        if let Some(policy) = matches.value_of("stale") {
            self.stale = from_str_value(policy, "stale")?;
        }
        if let Some(policy) = matches.value_of("unknown-objects") {
            self.unknown_objects = from_str_value(
                policy, "unknown-objects"
            )?;
        }
        if matches.is_present("process-gbrs") {
            self.process_gbrs = true
        }
        if matches.is_present("allow-dubious-hosts") {
            self.allow_dubious_hosts = true
        }
        if matches.is_present("disable-rsync") {
            self.disable_rsync = true
        }
        if let Some(command) = matches.value_of("rsync-command") {
            self.rsync_command = command.into()
        }
        if let Some(value) = matches.value_of("rsync-timeout") {
            self.rsync_timeout = Duration::from_secs(
                from_str_value(value, "rsync-timeout")?
            );
        }
        if let Some(value) = matches.value_of("validation-threads") {
            self.validation_threads = from_str_value(
                value, "validation-threads"
            )?;
        }
        if let Some(value) = matches.value_of("validation-timeout") {
            let value: u64 = from_str_value(value, "validation-timeout")?;
            self.validation_timeout = if value == 0 {
                None
            }
            else {
                Some(Duration::from_secs(value))
            };
        }
        if let Some(value) = matches.value_of("refresh") {
            self.refresh = Duration::from_secs(
                from_str_value(value, "refresh")?
            );
        }
        if let Some(value) = matches.value_of("retry") {
            self.retry = Duration::from_secs(
                from_str_value(value, "retry")?
            );
        }
        if let Some(value) = matches.value_of("expire") {
            self.expire = Duration::from_secs(
                from_str_value(value, "expire")?
            );
        }
        if let Some(value) = matches.value_of("history") {
            self.history_size = from_str_value(value, "history")?;
        }
        if let Some(values) = matches.values_of("rtr-listen") {
            let mut listen = Vec::new();
            for value in values {
                match value.to_socket_addrs() {
                    Ok(some) => listen.extend(some),
                    Err(_) => {
                        error!("Invalid socket address {}", value);
                        return Err(Failed)
                    }
                }
            }
            self.rtr_listen = listen;
        }
        if let Some(value) = matches.value_of("rtr-client-timeout") {
            self.rtr_client_timeout = Duration::from_secs(
                from_str_value(value, "rtr-client-timeout")?
            );
        }
        match (
            matches.occurrences_of("verbose"),
            matches.occurrences_of("quiet"),
        ) {
            (0, 0) => { }
            (1, 0) => self.log_level = LevelFilter::Info,
            (_, 0) => self.log_level = LevelFilter::Debug,
            (0, 1) => self.log_level = LevelFilter::Error,
            (0, _) => self.log_level = LevelFilter::Off,
            _ => {
                error!("Both --verbose and --quiet given.");
                return Err(Failed)
            }
        }
        if let Some(path) = matches.value_of("logfile") {
            self.log_file = Some(cur_dir.join(path));
        }
        Ok(())
    }

    /// Creates the cache and TAL directories if necessary.
    pub fn prepare_dirs(&self) -> Result<(), Failed> {
        if let Err(err) = fs::create_dir_all(&self.cache_dir) {
            error!(
                "Cannot create repository directory {}: {}.",
                self.cache_dir.display(), err
            );
            return Err(Failed)
        }
        Ok(())
    }

    /// Returns the current directory, logging a failure.
    pub fn current_dir() -> Result<PathBuf, Failed> {
        env::current_dir().map_err(|err| {
            error!("Cannot get current directory: {}.", err);
            Failed
        })
    }
}

/// The default wall-clock budget for a validation run.
const DEFAULT_VALIDATION_TIMEOUT: Duration
    = Duration::from_secs(2 * 3600);

/// Parses a string into any FromStr type, logging failures.
fn from_str_value<T: FromStr>(
    value: &str, key: &str
) -> Result<T, Failed> {
    T::from_str(value).map_err(|_| {
        error!("Invalid value '{}' for {}.", value, key);
        Failed
    })
}


//------------ FilterPolicy --------------------------------------------------

/// What to do with certain flawed but workable objects.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FilterPolicy {
    /// Take the object and carry on quietly.
    Accept,

    /// Take the object but log a warning.
    Warn,

    /// Refuse the object.
    Reject,
}

impl FromStr for FilterPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept" => Ok(FilterPolicy::Accept),
            "warn" => Ok(FilterPolicy::Warn),
            "reject" => Ok(FilterPolicy::Reject),
            _ => Err(())
        }
    }
}

impl fmt::Display for FilterPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            FilterPolicy::Accept => "accept",
            FilterPolicy::Warn => "warn",
            FilterPolicy::Reject => "reject",
        })
    }
}


//------------ ConfigFile ----------------------------------------------------

/// The content of an optional TOML configuration file.
///
/// Values are taken out of the table one by one; anything left at the
/// end is a configuration error, so typos don't silently do nothing.
#[derive(Default)]
struct ConfigFile {
    content: toml::value::Table,
    path: PathBuf,
}

impl ConfigFile {
    fn read(path: &Path) -> Result<Self, Failed> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                error!(
                    "Failed to read config file {}: {}",
                    path.display(), err
                );
                return Err(Failed)
            }
        };
        let content = match toml::from_str::<toml::Value>(&content) {
            Ok(toml::Value::Table(table)) => table,
            Ok(_) => {
                error!(
                    "Config file {} is not a TOML table.", path.display()
                );
                return Err(Failed)
            }
            Err(err) => {
                error!(
                    "Failed to parse config file {}: {}",
                    path.display(), err
                );
                return Err(Failed)
            }
        };
        Ok(ConfigFile {
            content,
            path: path.into(),
        })
    }

    fn take_value(&mut self, key: &str) -> Option<toml::Value> {
        self.content.remove(key)
    }

    fn bad_value(&self, key: &str, expected: &str) -> Failed {
        error!(
            "{}: '{}' expects {}.", self.path.display(), key, expected
        );
        Failed
    }

    fn take_bool(&mut self, key: &str) -> Result<Option<bool>, Failed> {
        match self.take_value(key) {
            Some(toml::Value::Boolean(res)) => Ok(Some(res)),
            Some(_) => Err(self.bad_value(key, "a boolean")),
            None => Ok(None)
        }
    }

    fn take_u64(&mut self, key: &str) -> Result<Option<u64>, Failed> {
        match self.take_value(key) {
            Some(toml::Value::Integer(res)) if res >= 0 => {
                Ok(Some(res as u64))
            }
            Some(_) => Err(self.bad_value(key, "a non-negative integer")),
            None => Ok(None)
        }
    }

    fn take_usize(&mut self, key: &str) -> Result<Option<usize>, Failed> {
        self.take_u64(key).map(|res| res.map(|res| res as usize))
    }

    fn take_string(
        &mut self, key: &str
    ) -> Result<Option<String>, Failed> {
        match self.take_value(key) {
            Some(toml::Value::String(res)) => Ok(Some(res)),
            Some(_) => Err(self.bad_value(key, "a string")),
            None => Ok(None)
        }
    }

    fn take_from_str<T: FromStr>(
        &mut self, key: &str
    ) -> Result<Option<T>, Failed> {
        match self.take_string(key)? {
            Some(value) => match T::from_str(&value) {
                Ok(some) => Ok(Some(some)),
                Err(_) => Err(self.bad_value(key, "a valid value")),
            }
            None => Ok(None)
        }
    }

    fn take_path(
        &mut self, key: &str, base: &Path
    ) -> Result<Option<PathBuf>, Failed> {
        self.take_string(key).map(|res| {
            res.map(|path| base.join(path))
        })
    }

    fn take_string_array(
        &mut self, key: &str
    ) -> Result<Option<Vec<String>>, Failed> {
        match self.take_value(key) {
            Some(toml::Value::Array(array)) => {
                let mut res = Vec::new();
                for value in array {
                    match value {
                        toml::Value::String(value) => res.push(value),
                        _ => {
                            return Err(self.bad_value(
                                key, "an array of strings"
                            ))
                        }
                    }
                }
                Ok(Some(res))
            }
            Some(_) => Err(self.bad_value(key, "an array of strings")),
            None => Ok(None)
        }
    }

    fn take_socket_addrs(
        &mut self, key: &str
    ) -> Result<Option<Vec<SocketAddr>>, Failed> {
        let strings = match self.take_string_array(key)? {
            Some(strings) => strings,
            None => return Ok(None)
        };
        let mut res = Vec::new();
        for value in strings {
            match value.to_socket_addrs() {
                Ok(some) => res.extend(some),
                Err(_) => {
                    return Err(self.bad_value(
                        key, "valid socket addresses"
                    ))
                }
            }
        }
        Ok(Some(res))
    }

    fn check_exhausted(&self) -> Result<(), Failed> {
        if let Some(key) = self.content.keys().next() {
            error!(
                "{}: unknown configuration key '{}'.",
                self.path.display(), key
            );
            return Err(Failed)
        }
        Ok(())
    }
}


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    fn parse_config(args: &[&str]) -> Config {
        let matches = Config::config_args(
            App::new("test")
        ).get_matches_from(
            std::iter::once("test").chain(args.iter().cloned())
        );
        Config::from_arg_matches(
            &matches, Path::new("/test")
        ).unwrap()
    }

    #[test]
    fn defaults() {
        let config = parse_config(&["-b", "base"]);
        assert_eq!(config.cache_dir, Path::new("/test/base/repository"));
        assert_eq!(config.tal_dir, Path::new("/test/base/tals"));
        assert_eq!(config.refresh, Duration::from_secs(3600));
        assert_eq!(config.retry, Duration::from_secs(600));
        assert_eq!(config.expire, Duration::from_secs(7200));
        assert_eq!(config.history_size, 10);
        assert_eq!(config.stale, FilterPolicy::Warn);
        assert!(config.rtr_listen.is_empty());
        assert_eq!(config.log_level, LevelFilter::Warn);
    }

    #[test]
    fn arguments_override() {
        let config = parse_config(&[
            "-b", "base",
            "--refresh", "600",
            "--history", "2",
            "--stale", "reject",
            "--rtr", "127.0.0.1:3323",
            "-v",
        ]);
        assert_eq!(config.refresh, Duration::from_secs(600));
        assert_eq!(config.history_size, 2);
        assert_eq!(config.stale, FilterPolicy::Reject);
        assert_eq!(
            config.rtr_listen,
            ["127.0.0.1:3323".parse::<SocketAddr>().unwrap()]
        );
        assert_eq!(config.log_level, LevelFilter::Info);
    }
}
