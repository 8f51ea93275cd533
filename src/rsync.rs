//! The local repository mirror synchronized with rsync.
//
//  Data is kept in the directory given via the cache_dir config option
//  using the rsync URI without the scheme as the path. Data is published
//  in rsync modules identified by the first two components of this path,
//  which corresponds with the way the rsync daemon works.
//
//  During a validation run, we keep track of the modules we have already
//  updated. When access to a module that has not yet been updated is
//  requested, we spawn rsync and block until it returns. If during that
//  time another thread requests access to the same module, that thread
//  is blocked, too.

use std::{fs, io, process};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;
use bytes::Bytes;
use log::{debug, error, info, warn};
use crate::config::Config;
use crate::error::Failed;
use crate::metrics::{Metrics, RsyncModuleMetrics};
use crate::uri;


//------------ Cache ---------------------------------------------------------

/// A local copy of repositories synchronized via rsync.
#[derive(Debug)]
pub struct Cache {
    /// The base directory of the cache.
    cache_dir: PathBuf,

    /// The command for running rsync.
    ///
    /// If this is `None`, actual rsyncing has been disabled and data
    /// present will be used as is.
    command: Option<Command>,

    /// Whether to filter dubious authorities in rsync URIs.
    filter_dubious: bool,
}

impl Cache {
    /// Creates the cache dir and returns its path.
    fn create_cache_dir(config: &Config) -> Result<PathBuf, Failed> {
        let cache_dir = config.cache_dir.join("rsync");
        if let Err(err) = fs::create_dir_all(&cache_dir) {
            error!(
                "Failed to create rsync cache directory {}: {}.",
                cache_dir.display(), err
            );
            return Err(Failed);
        }
        Ok(cache_dir)
    }

    /// Creates a new rsync cache.
    ///
    /// The cache will not actually run rsync but use whatever files are
    /// present already in the cache directory if `update` is `false`.
    pub fn new(config: &Config, update: bool) -> Result<Self, Failed> {
        Ok(Cache {
            cache_dir: Self::create_cache_dir(config)?,
            command: if update && !config.disable_rsync {
                Some(Command::new(config)?)
            }
            else {
                None
            },
            filter_dubious: !config.allow_dubious_hosts,
        })
    }

    /// Starts a validation run on the cache.
    pub fn start(&self) -> Run {
        Run::new(self)
    }
}


//------------ Run -----------------------------------------------------------

/// Using the rsync cache during a validation run.
#[derive(Debug)]
pub struct Run<'a> {
    /// A reference to the underlying cache.
    cache: &'a Cache,

    /// The set of modules that have been updated already.
    updated: RwLock<HashSet<String>>,

    /// The modules that are currently being updated.
    ///
    /// The value in the map is a mutex that is used to synchronize
    /// competing attempts to update the module. Only the thread that
    /// holds the mutex is allowed to actually run rsync.
    running: Mutex<HashMap<String, Arc<Mutex<()>>>>,

    /// The metrics for the updated modules.
    metrics: Mutex<Vec<RsyncModuleMetrics>>,
}

impl<'a> Run<'a> {
    fn new(cache: &'a Cache) -> Self {
        Run {
            cache,
            updated: Default::default(),
            running: Default::default(),
            metrics: Default::default(),
        }
    }

    /// Ensures the module for the given URI has been synchronized once
    /// this run.
    ///
    /// If the module has not yet been updated, may block until an update
    /// finished. The update may not have been successful and files in
    /// the module may be outdated or missing completely.
    pub fn load_module(&self, uri: &uri::Rsync) {
        let command = match self.cache.command.as_ref() {
            Some(command) => command,
            None => return,
        };
        let module = module_key(uri);

        if self.updated.read().unwrap().contains(&module) {
            return
        }

        // Get a clone of the (arc-ed) mutex. Make a new one if there
        // isn't one yet.
        let mutex = {
            self.running.lock().unwrap()
                .entry(module.clone()).or_default()
                .clone()
        };

        // Acquire the mutex. Once we have it, see if the module is
        // up-to-date, which happens if someone else had the mutex first.
        let _lock = mutex.lock().unwrap();
        if self.updated.read().unwrap().contains(&module) {
            return
        }

        if self.cache.filter_dubious && uri.has_dubious_authority() {
            warn!("{}: dubious host name. Skipping update.", uri);
        }
        else {
            let metrics = command.update(
                uri, &self.module_path(uri)
            );
            self.metrics.lock().unwrap().push(metrics);
        }

        self.running.lock().unwrap().remove(&module);

        // Insert into updated no matter what: we only try once per run.
        self.updated.write().unwrap().insert(module);
    }

    /// Loads the file for the given URI.
    ///
    /// Does _not_ attempt to update the corresponding module first; call
    /// [`load_module`][Run::load_module] for that. If the file is
    /// missing, returns `None`.
    pub fn load_file(&self, uri: &uri::Rsync) -> Option<Bytes> {
        let path = self.file_path(uri);
        match fs::read(&path) {
            Ok(data) => Some(data.into()),
            Err(err) => {
                if err.kind() == io::ErrorKind::NotFound {
                    info!("{}: not found in local repository", uri);
                }
                else {
                    error!(
                        "Failed to read file '{}': {}",
                        path.display(), err
                    );
                }
                None
            }
        }
    }

    /// Returns the local path for a module.
    fn module_path(&self, uri: &uri::Rsync) -> PathBuf {
        let mut res = self.cache.cache_dir.clone();
        res.push(uri.authority());
        res.push(uri.module_name());
        res
    }

    /// Returns the local path for a file URI.
    fn file_path(&self, uri: &uri::Rsync) -> PathBuf {
        let mut res = self.module_path(uri);
        for component in uri.path().split('/') {
            res.push(component)
        }
        res
    }

    /// Finishes the validation run, folding in the collected metrics.
    pub fn done(self, metrics: &mut Metrics) {
        metrics.set_rsync(self.metrics.into_inner().unwrap())
    }
}

/// Returns the key a module is tracked under.
fn module_key(uri: &uri::Rsync) -> String {
    format!("{}/{}", uri.authority(), uri.module_name())
}


//------------ Command -------------------------------------------------------

/// The command to run rsync.
#[derive(Debug)]
struct Command {
    /// The actual command.
    command: String,

    /// The list of additional arguments.
    ///
    /// We will always add a few more when actually running.
    args: Vec<String>,
}

impl Command {
    /// Creates a new rsync command from the config.
    ///
    /// Runs the command once to check that it is present and to see
    /// which options it supports.
    pub fn new(config: &Config) -> Result<Self, Failed> {
        let command = config.rsync_command.clone();
        let output = match process::Command::new(&command)
            .arg("-h").output()
        {
            Ok(output) => output,
            Err(err) => {
                error!("Failed to run rsync: {}", err);
                return Err(Failed)
            }
        };
        if !output.status.success() {
            error!(
                "Running rsync failed with output: \n{}",
                String::from_utf8_lossy(&output.stderr)
            );
            return Err(Failed);
        }
        let args = match config.rsync_args {
            Some(ref args) => args.clone(),
            None => {
                let has_contimeout = output.stdout.windows(12).any(|window| {
                    window == b"--contimeout"
                });
                let timeout = format!(
                    "--timeout={}", config.rsync_timeout.as_secs()
                );
                if has_contimeout {
                    vec!["--contimeout=10".into(), timeout]
                }
                else {
                    vec![timeout]
                }
            }
        };
        Ok(Command {
            command,
            args,
        })
    }

    /// Updates a module by running rsync.
    pub fn update(
        &self,
        source: &uri::Rsync,
        destination: &Path,
    ) -> RsyncModuleMetrics {
        let start = SystemTime::now();
        let status = {
            match self.command(source, destination) {
                Ok(mut command) => match command.output() {
                    Ok(output) => Ok(Self::log_output(source, output)),
                    Err(err) => Err(err)
                }
                Err(err) => Err(err)
            }
        };
        RsyncModuleMetrics {
            module: source.module(),
            status,
            duration: SystemTime::now().duration_since(start),
        }
    }

    /// Assembles the rsync invocation.
    fn command(
        &self,
        source: &uri::Rsync,
        destination: &Path,
    ) -> Result<process::Command, io::Error> {
        info!("rsyncing from {}.", source.module());
        fs::create_dir_all(destination)?;
        let destination = match Self::format_destination(destination) {
            Ok(some) => some,
            Err(_) => {
                error!(
                    "rsync: illegal destination path {}.",
                    destination.display()
                );
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    "illegal destination path"
                ));
            }
        };
        let mut cmd = process::Command::new(&self.command);
        for item in &self.args {
            cmd.arg(item);
        }
        cmd.arg("-rltz")
            .arg("--delete")
            .arg(format!("{}/", source.module()))
            .arg(destination);
        debug!("{}: running command {:?}", source.module(), cmd);
        Ok(cmd)
    }

    /// Formats the destination path for inclusion in the command.
    fn format_destination(path: &Path) -> Result<String, Failed> {
        // Make sure the path ends in a slash or strange things happen.
        let mut destination = format!("{}", path.display());
        if !destination.ends_with('/') {
            destination.push('/')
        }
        Ok(destination)
    }

    /// Logs the output of the rsync command.
    fn log_output(
        source: &uri::Rsync,
        output: process::Output,
    ) -> process::ExitStatus {
        let module = source.module();
        if !output.status.success() {
            warn!("{}: failed with status {}", module, output.status);
        }
        else {
            info!("{}: successfully completed.", module);
        }
        if !output.stderr.is_empty() {
            String::from_utf8_lossy(&output.stderr).lines().for_each(|l| {
                warn!("{}: {}", module, l);
            })
        }
        if !output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stdout).lines().for_each(|l| {
                info!("{}: {}", module, l)
            })
        }
        output.status
    }
}


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    fn test_cache(dir: &Path) -> Cache {
        Cache {
            cache_dir: dir.into(),
            command: None,
            filter_dubious: true,
        }
    }

    #[test]
    fn file_paths() {
        let dir = tempfile::tempdir().unwrap();
        let cache = test_cache(dir.path());
        let run = cache.start();
        let uri = uri::Rsync::from_str(
            "rsync://example.com/repo/ca/cert.cer"
        ).unwrap();
        assert_eq!(
            run.file_path(&uri),
            dir.path().join("example.com/repo/ca/cert.cer")
        );
    }

    #[test]
    fn load_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("example.com/repo/obj.roa");
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(&target, b"content").unwrap();

        let cache = test_cache(dir.path());
        let run = cache.start();
        let uri = uri::Rsync::from_str(
            "rsync://example.com/repo/obj.roa"
        ).unwrap();
        assert_eq!(
            run.load_file(&uri).unwrap().as_ref(),
            b"content"
        );
        let missing = uri::Rsync::from_str(
            "rsync://example.com/repo/missing.roa"
        ).unwrap();
        assert!(run.load_file(&missing).is_none());
    }
}
