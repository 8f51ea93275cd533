//! Metrics for a validation run.

use std::sync::Arc;
use std::time::{Duration, SystemTimeError};
use chrono::{DateTime, Utc};
use log::info;
use crate::tal::TalInfo;
use crate::uri;


//------------ Metrics -------------------------------------------------------

#[derive(Debug)]
pub struct Metrics {
    /// Time when these metrics have been collected.
    time: DateTime<Utc>,

    /// Per-TAL metrics.
    tals: Vec<TalMetrics>,

    /// Rsync metrics.
    rsync: Vec<RsyncModuleMetrics>,

    /// Number of objects rejected because something about them was
    /// wrong.
    pub rejected_objects: u32,

    /// Number of stale manifests or CRLs encountered.
    pub stale_objects: u32,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            time: Utc::now(),
            tals: Vec::new(),
            rsync: Vec::new(),
            rejected_objects: 0,
            stale_objects: 0,
        }
    }

    pub fn push_tal(&mut self, tal: TalMetrics) {
        self.tals.push(tal)
    }

    pub fn set_rsync(&mut self, rsync: Vec<RsyncModuleMetrics>) {
        self.rsync = rsync
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    pub fn timestamp(&self) -> i64 {
        self.time.timestamp()
    }

    pub fn tals(&self) -> &[TalMetrics] {
        &self.tals
    }

    pub fn rsync(&self) -> &[RsyncModuleMetrics] {
        &self.rsync
    }

    pub fn rsync_complete(&self) -> bool {
        for metrics in &self.rsync {
            match metrics.status {
                Ok(status) if !status.success() => return false,
                Err(_) => return false,
                _ => { }
            }
        }
        true
    }

    pub fn log(&self) {
        info!("Summary:");
        for tal in &self.tals {
            info!(
                "{}: {} valid ROAs, {} VRPs, {} router keys.",
                tal.tal.name(), tal.roas, tal.vrps, tal.router_keys
            )
        }
        if self.rejected_objects > 0 {
            info!("{} objects rejected.", self.rejected_objects);
        }
        if self.stale_objects > 0 {
            info!("{} stale objects encountered.", self.stale_objects);
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}


//------------ TalMetrics ----------------------------------------------------

#[derive(Clone, Debug)]
pub struct TalMetrics {
    /// The TAL.
    pub tal: Arc<TalInfo>,

    /// Number of valid ROAs.
    pub roas: u32,

    /// Number of VRPs.
    pub vrps: u32,

    /// Number of router keys.
    pub router_keys: u32,
}

impl TalMetrics {
    pub fn new(tal: Arc<TalInfo>) -> Self {
        TalMetrics {
            tal,
            roas: 0,
            vrps: 0,
            router_keys: 0,
        }
    }
}


//------------ RsyncModuleMetrics --------------------------------------------

/// The outcome of syncing a single rsync module.
#[derive(Debug)]
pub struct RsyncModuleMetrics {
    pub module: uri::Rsync,
    pub status: Result<std::process::ExitStatus, std::io::Error>,
    pub duration: Result<Duration, SystemTimeError>,
}
