//! The payload data set derived from validation runs.
//!
//! This module contains the types for the data delivered to routers: the
//! route origins and router keys collected during a validation run,
//! complete snapshots of this data, deltas between consecutive versions,
//! and the history of snapshots and deltas the RTR server answers
//! queries from.

use std::{cmp, ops};
use std::collections::{hash_map, HashMap, HashSet, VecDeque};
use std::net::IpAddr;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};
use bytes::Bytes;
use crossbeam_queue::SegQueue;
use log::warn;
use crate::cert::ResourceCert;
use crate::config::Config;
use crate::crypto::KeyIdentifier;
use crate::engine::{ProcessCa, ProcessRun};
use crate::error::Failed;
use crate::metrics::{Metrics, TalMetrics};
use crate::resources::{AddressPrefix, AsId};
use crate::roa::RouteOriginAttestation;
use crate::rtr::serial::Serial;
use crate::rtr::{Action, Payload, PayloadSource, State, Timing};
use crate::slurm::LocalExceptions;
use crate::tal::{Tal, TalInfo};
use crate::uri;


//============ Part One. During Validation ===================================
//
// The following types collect the valid published data during a
// validation run.


//------------ ValidationReport ----------------------------------------------

/// The result of a validation run.
#[derive(Debug, Default)]
pub struct ValidationReport {
    /// The data from all the valid publication points.
    ///
    /// When a publication point has been successfully validated, it
    /// pushes its data to this queue.
    pub_points: SegQueue<PubPoint>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Default::default()
    }
}

impl<'a> ProcessRun for &'a ValidationReport {
    type ProcessCa = PubPointProcessor<'a>;

    fn process_ta(
        &self, tal: &Tal, _cert: &ResourceCert
    ) -> Result<Option<Self::ProcessCa>, Failed> {
        Ok(Some(PubPointProcessor {
            report: *self,
            pub_point: PubPoint::new(tal.info().clone()),
        }))
    }
}


//------------ PubPointProcessor ---------------------------------------------

/// Collects all the data for a single publication point.
#[derive(Clone, Debug)]
pub struct PubPointProcessor<'a> {
    /// The validation report the payload is contributed to.
    report: &'a ValidationReport,

    /// The data being collected.
    pub_point: PubPoint,
}

impl<'a> ProcessCa for PubPointProcessor<'a> {
    fn want(&self, _uri: &uri::Rsync) -> Result<bool, Failed> {
        // We want everything processed for statistics.
        Ok(true)
    }

    fn process_ca(
        &mut self, _uri: &uri::Rsync, _cert: &ResourceCert
    ) -> Result<Option<Self>, Failed> {
        Ok(Some(PubPointProcessor {
            report: self.report,
            pub_point: PubPoint::new(self.pub_point.tal.clone()),
        }))
    }

    fn process_roa(
        &mut self, _uri: &uri::Rsync, route: RouteOriginAttestation
    ) -> Result<(), Failed> {
        self.pub_point.add_roa(route);
        Ok(())
    }

    fn process_router_cert(
        &mut self, _uri: &uri::Rsync, cert: &ResourceCert
    ) -> Result<(), Failed> {
        self.pub_point.add_router_cert(cert);
        Ok(())
    }

    fn commit(self) {
        if !self.pub_point.is_empty() {
            self.report.pub_points.push(self.pub_point);
        }
    }

    fn cancel(self, cert: &ResourceCert) {
        warn!(
            "CA for {} rejected, discarding its products.",
            cert.ca_repository().map(|uri| uri.to_string())
                .unwrap_or_else(|| String::from("<unknown>"))
        );
    }
}


//------------ PubPoint ------------------------------------------------------

/// The raw data published by a single publication point.
#[derive(Clone, Debug)]
struct PubPoint {
    /// The list of valid route origins.
    origins: Vec<RouteOrigin>,

    /// The list of valid router keys.
    router_keys: Vec<RouterKey>,

    /// The number of valid ROAs seen.
    roa_count: u32,

    /// The trust anchor this point descends from.
    tal: Arc<TalInfo>,
}

impl PubPoint {
    fn new(tal: Arc<TalInfo>) -> Self {
        PubPoint {
            origins: Vec::new(),
            router_keys: Vec::new(),
            roa_count: 0,
            tal,
        }
    }

    fn is_empty(&self) -> bool {
        self.origins.is_empty() && self.router_keys.is_empty()
    }

    /// Adds the content of a ROA to the origins.
    fn add_roa(&mut self, roa: RouteOriginAttestation) {
        self.roa_count += 1;
        self.origins.extend(roa.iter().map(|prefix| {
            RouteOrigin::new(
                roa.as_id(), prefix.prefix(), prefix.max_length()
            )
        }));
    }

    /// Adds the keys of a validated router certificate.
    fn add_router_cert(&mut self, cert: &ResourceCert) {
        let ski = cert.subject_key_identifier();
        let spki = cert.subject_public_key_info().bits().clone();
        for block in cert.resources().asn().iter() {
            for id in block.start()..block.end() {
                self.router_keys.push(RouterKey::new(
                    AsId::from(id as u32), ski, spki.clone()
                ));
            }
        }
    }
}


//============ Part Two. After Validation ====================================


//------------ SharedHistory -------------------------------------------------

/// A shareable history of the validated payload.
///
/// Many RTR sessions read it concurrently; the validation driver is the
/// only writer and goes through [`update`][SharedHistory::update].
#[derive(Clone, Debug)]
pub struct SharedHistory(Arc<RwLock<PayloadHistory>>);

impl SharedHistory {
    pub fn from_config(config: &Config) -> Self {
        SharedHistory(Arc::new(RwLock::new(
            PayloadHistory::from_config(config)
        )))
    }

    /// Provides read access to the underlying history.
    pub fn read(&self) -> impl ops::Deref<Target = PayloadHistory> + '_ {
        self.0.read().expect("payload history lock poisoned")
    }

    fn write(&self) -> impl ops::DerefMut<Target = PayloadHistory> + '_ {
        self.0.write().expect("payload history lock poisoned")
    }

    /// Updates the history from a validation run's results.
    ///
    /// Produces a new snapshot from the report and the local exceptions.
    /// If the new snapshot differs from the current one, or if there is
    /// no current one yet, installs it under a new serial and records
    /// the delta. Otherwise the current serial stays in place.
    ///
    /// Returns whether a new version was installed.
    pub fn update(
        &self,
        report: ValidationReport,
        exceptions: &LocalExceptions,
        metrics: &mut Metrics,
    ) -> bool {
        let builder = SnapshotBuilder::from_report(
            report, exceptions, metrics
        );

        let (current, serial) = {
            let read = self.read();
            (read.current(), read.serial())
        };

        let delta = match current.as_ref() {
            Some(current) => {
                match PayloadDelta::construct(
                    &current.to_builder(), &builder, serial.add(1)
                ) {
                    Some(delta) => delta,
                    // Nothing changed: the current serial remains.
                    None => return false,
                }
            }
            // The very first snapshot gets serial one and a delta from
            // the empty set so routers on serial zero can catch up
            // incrementally.
            None => PayloadDelta::construct(
                &SnapshotBuilder::default(), &builder, serial.add(1)
            ).unwrap_or_else(|| PayloadDelta::empty(serial.add(1)))
        };

        self.write().push(builder.into_snapshot(), delta);
        true
    }
}


//--- PayloadSource

impl PayloadSource for SharedHistory {
    type FullIter = SnapshotVrpIter;
    type DiffIter = DeltaVrpIter;

    fn ready(&self) -> bool {
        self.read().is_active()
    }

    fn notify(&self) -> State {
        let read = self.read();
        State::new(read.rtr_session(), read.serial())
    }

    fn full(&self) -> (State, Self::FullIter) {
        let read = self.read();
        (
            State::new(read.rtr_session(), read.serial()),
            SnapshotVrpIter::new(
                read.current().unwrap_or_default()
            )
        )
    }

    fn diff(&self, state: State) -> Option<(State, Self::DiffIter)> {
        let read = self.read();
        if read.rtr_session() != state.session() {
            return None
        }
        read.delta_since(state.serial()).map(|delta| {
            (
                State::new(read.rtr_session(), read.serial()),
                DeltaVrpIter::new(delta)
            )
        })
    }

    fn timing(&self) -> Timing {
        self.read().timing
    }
}


//------------ PayloadHistory ------------------------------------------------

/// The history of the validated payload.
#[derive(Clone, Debug)]
pub struct PayloadHistory {
    /// The retained snapshots.
    ///
    /// The newest snapshot is at the front. There are at most `keep`
    /// snapshots; anything older is unreachable and forces clients onto
    /// the cache reset path.
    snapshots: VecDeque<Arc<PayloadSnapshot>>,

    /// The retained deltas.
    ///
    /// The newest delta is at the front. A delta's serial is the serial
    /// of the snapshot it leads to, so there is one delta fewer than
    /// there are snapshots.
    deltas: VecDeque<Arc<PayloadDelta>>,

    /// The serial number of the current snapshot.
    serial: Serial,

    /// The RTR session ID.
    session: u16,

    /// The number of snapshots to keep.
    keep: usize,

    /// The RTR timing parameters handed to clients.
    timing: Timing,
}

impl PayloadHistory {
    /// Creates a new history from the configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.history_size,
            Timing {
                refresh: config.refresh.as_secs() as u32,
                retry: config.retry.as_secs() as u32,
                expire: config.expire.as_secs() as u32,
            },
        )
    }

    /// Creates a new history keeping `keep` snapshots.
    pub fn new(keep: usize, timing: Timing) -> Self {
        PayloadHistory {
            snapshots: VecDeque::with_capacity(keep),
            deltas: VecDeque::with_capacity(keep.saturating_sub(1)),
            serial: Serial(0),
            session: {
                SystemTime::now()
                    .duration_since(SystemTime::UNIX_EPOCH)
                    .unwrap_or_else(|_| Duration::from_secs(0))
                    .as_secs() as u16
            },
            keep: cmp::max(keep, 1),
            timing,
        }
    }

    /// Installs a new snapshot and the delta leading to it.
    fn push(&mut self, snapshot: PayloadSnapshot, delta: PayloadDelta) {
        self.serial = delta.serial();
        self.snapshots.push_front(Arc::new(snapshot));
        while self.snapshots.len() > self.keep {
            let _ = self.snapshots.pop_back();
        }
        self.deltas.push_front(Arc::new(delta));
        while self.deltas.len() + 1 > self.keep {
            let _ = self.deltas.pop_back();
        }
    }

    /// Returns whether the history is active.
    ///
    /// It becomes active once the first validation run has finished.
    pub fn is_active(&self) -> bool {
        !self.snapshots.is_empty()
    }

    /// Returns a shareable reference to the current snapshot.
    pub fn current(&self) -> Option<Arc<PayloadSnapshot>> {
        self.snapshots.front().cloned()
    }

    /// Returns the snapshot with the given serial if it is retained.
    pub fn snapshot(
        &self, serial: Serial
    ) -> Option<Arc<PayloadSnapshot>> {
        let mut serial_iter = self.serial;
        for snapshot in &self.snapshots {
            if serial_iter == serial {
                return Some(snapshot.clone())
            }
            serial_iter = Serial(serial_iter.0.wrapping_sub(1));
        }
        None
    }

    /// Returns a delta from the given serial to the current data set.
    ///
    /// The serial is what the requestor has last seen. Returns `None` if
    /// the serial has fallen out of the history or lies in the future,
    /// in which case the client needs a cache reset.
    pub fn delta_since(
        &self, serial: Serial
    ) -> Option<Arc<PayloadDelta>> {
        if serial == self.serial {
            // They already have the current version: empty delta.
            return Some(Arc::new(PayloadDelta::empty(serial)))
        }
        if self.serial.partial_cmp(&serial) != Some(cmp::Ordering::Greater)
        {
            // A future serial. We refuse to play.
            return None
        }

        // Iterate from the oldest delta towards the newest. The first
        // delta to apply has to have the serial directly following the
        // requested one, otherwise the history has already dropped part
        // of the path.
        let mut next_serial = serial.add(1);
        let mut merger = None;
        for delta in self.deltas.iter().rev() {
            if delta.serial().partial_cmp(&next_serial)
                == Some(cmp::Ordering::Less)
            {
                continue
            }
            if delta.serial() != next_serial {
                return None
            }
            match merger {
                None => merger = Some(DeltaMerger::new(delta)),
                Some(ref mut merger) => merger.merge(delta),
            }
            next_serial = next_serial.add(1);
        }
        merger.map(DeltaMerger::into_delta)
    }

    /// Returns the serial number of the current data set.
    pub fn serial(&self) -> Serial {
        self.serial
    }

    /// Returns the RTR session ID.
    pub fn rtr_session(&self) -> u16 {
        self.session
    }

    /// Returns the timing parameters for RTR end-of-data PDUs.
    pub fn timing(&self) -> Timing {
        self.timing
    }
}


//------------ PayloadSnapshot -----------------------------------------------

/// The complete set of validated payload data.
#[derive(Clone, Debug, Default)]
pub struct PayloadSnapshot {
    /// An ordered sequence of unique route origins.
    origins: Vec<(RouteOrigin, PayloadInfo)>,

    /// An ordered sequence of unique router keys.
    router_keys: Vec<(RouterKey, PayloadInfo)>,
}

impl PayloadSnapshot {
    pub fn origins(&self) -> &[(RouteOrigin, PayloadInfo)] {
        &self.origins
    }

    pub fn router_keys(&self) -> &[(RouterKey, PayloadInfo)] {
        &self.router_keys
    }

    /// Returns a snapshot builder with this snapshot's content.
    fn to_builder(&self) -> SnapshotBuilder {
        SnapshotBuilder {
            origins: self.origins.iter().cloned().collect(),
            router_keys: self.router_keys.iter().cloned().collect(),
        }
    }
}


//------------ SnapshotBuilder -----------------------------------------------

/// The representation of a snapshot while it is being put together.
#[derive(Clone, Debug, Default)]
struct SnapshotBuilder {
    origins: HashMap<RouteOrigin, PayloadInfo>,
    router_keys: HashMap<RouterKey, PayloadInfo>,
}

impl SnapshotBuilder {
    /// Creates a builder from a validation report.
    ///
    /// Takes all the data from `report`, removes duplicates while
    /// retaining the provenance of each payload element, applies the
    /// local exception filters, and finally adds the local assertions.
    fn from_report(
        report: ValidationReport,
        exceptions: &LocalExceptions,
        metrics: &mut Metrics,
    ) -> Self {
        let mut res = Self::default();
        let mut tal_metrics_map: HashMap<String, TalMetrics> =
            HashMap::new();

        while let Some(pub_point) = report.pub_points.pop() {
            let tal_metrics = tal_metrics_map
                .entry(pub_point.tal.name().into())
                .or_insert_with(|| {
                    TalMetrics::new(pub_point.tal.clone())
                });
            tal_metrics.roas += pub_point.roa_count;

            for origin in pub_point.origins {
                if !exceptions.keep_origin(&origin) {
                    continue
                }
                tal_metrics.vrps += 1;
                match res.origins.entry(origin) {
                    hash_map::Entry::Vacant(entry) => {
                        entry.insert(
                            PayloadInfo::from_tal(pub_point.tal.clone())
                        );
                    }
                    hash_map::Entry::Occupied(mut entry) => {
                        entry.get_mut().add_tal(pub_point.tal.clone());
                    }
                }
            }

            for key in pub_point.router_keys {
                if !exceptions.keep_router_key(&key) {
                    continue
                }
                tal_metrics.router_keys += 1;
                match res.router_keys.entry(key) {
                    hash_map::Entry::Vacant(entry) => {
                        entry.insert(
                            PayloadInfo::from_tal(pub_point.tal.clone())
                        );
                    }
                    hash_map::Entry::Occupied(mut entry) => {
                        entry.get_mut().add_tal(pub_point.tal.clone());
                    }
                }
            }
        }

        for tal_metrics in tal_metrics_map.into_values() {
            metrics.push_tal(tal_metrics)
        }

        // The local assertions join the set after filtering.
        for origin in exceptions.origin_assertions() {
            res.origins.entry(origin)
                .or_insert_with(PayloadInfo::local)
                .mark_local();
        }
        for key in exceptions.router_key_assertions() {
            res.router_keys.entry(key)
                .or_insert_with(PayloadInfo::local)
                .mark_local();
        }

        res
    }

    /// Converts the builder into a snapshot.
    fn into_snapshot(self) -> PayloadSnapshot {
        let mut origins: Vec<_> = self.origins.into_iter().collect();
        origins.sort_by(|left, right| left.0.cmp(&right.0));
        let mut router_keys: Vec<_> =
            self.router_keys.into_iter().collect();
        router_keys.sort_by(|left, right| left.0.cmp(&right.0));
        PayloadSnapshot { origins, router_keys }
    }
}


//------------ SnapshotVrpIter -----------------------------------------------

/// An iterator over the payload of a shared snapshot.
#[derive(Clone, Debug)]
pub struct SnapshotVrpIter {
    snapshot: Arc<PayloadSnapshot>,
    pos: usize,
}

impl SnapshotVrpIter {
    fn new(snapshot: Arc<PayloadSnapshot>) -> Self {
        SnapshotVrpIter { snapshot, pos: 0 }
    }
}

impl Iterator for SnapshotVrpIter {
    type Item = Payload;

    fn next(&mut self) -> Option<Self::Item> {
        let res = if let Some(item)
            = self.snapshot.origins.get(self.pos)
        {
            Payload::Origin(item.0)
        }
        else {
            let pos = self.pos - self.snapshot.origins.len();
            Payload::RouterKey(
                self.snapshot.router_keys.get(pos)?.0.clone()
            )
        };
        self.pos += 1;
        Some(res)
    }
}


//------------ PayloadDelta --------------------------------------------------

/// The changes between two payload snapshots.
#[derive(Clone, Debug)]
pub struct PayloadDelta {
    /// The target serial number of this delta.
    ///
    /// This is the serial of the snapshot this delta results in when
    /// applied.
    serial: Serial,

    /// Route origins added by this delta, ordered.
    announced_origins: Vec<RouteOrigin>,

    /// Route origins removed by this delta, ordered.
    withdrawn_origins: Vec<RouteOrigin>,

    /// Router keys added by this delta, ordered.
    announced_keys: Vec<RouterKey>,

    /// Router keys removed by this delta, ordered.
    withdrawn_keys: Vec<RouterKey>,
}

impl PayloadDelta {
    /// Creates an empty delta with the given target serial.
    pub fn empty(serial: Serial) -> Self {
        PayloadDelta {
            serial,
            announced_origins: Vec::new(),
            withdrawn_origins: Vec::new(),
            announced_keys: Vec::new(),
            withdrawn_keys: Vec::new(),
        }
    }

    /// Constructs a new delta between two snapshot builders.
    ///
    /// Returns `None` if the two are identical.
    fn construct(
        current: &SnapshotBuilder,
        next: &SnapshotBuilder,
        serial: Serial,
    ) -> Option<Self> {
        let announced_origins =
            key_difference(&next.origins, &current.origins);
        let withdrawn_origins =
            key_difference(&current.origins, &next.origins);
        let announced_keys =
            key_difference(&next.router_keys, &current.router_keys);
        let withdrawn_keys =
            key_difference(&current.router_keys, &next.router_keys);
        if announced_origins.is_empty()
            && withdrawn_origins.is_empty()
            && announced_keys.is_empty()
            && withdrawn_keys.is_empty()
        {
            None
        }
        else {
            Some(PayloadDelta {
                serial,
                announced_origins,
                withdrawn_origins,
                announced_keys,
                withdrawn_keys,
            })
        }
    }

    pub fn serial(&self) -> Serial {
        self.serial
    }

    pub fn is_empty(&self) -> bool {
        self.announced_origins.is_empty()
            && self.withdrawn_origins.is_empty()
            && self.announced_keys.is_empty()
            && self.withdrawn_keys.is_empty()
    }

    pub fn announced_origins(&self) -> &[RouteOrigin] {
        &self.announced_origins
    }

    pub fn withdrawn_origins(&self) -> &[RouteOrigin] {
        &self.withdrawn_origins
    }

    pub fn announced_keys(&self) -> &[RouterKey] {
        &self.announced_keys
    }

    pub fn withdrawn_keys(&self) -> &[RouterKey] {
        &self.withdrawn_keys
    }
}

/// Returns the keys in `this` that are not in `other`, in order.
fn key_difference<K: Clone + Ord + std::hash::Hash + Eq, V>(
    this: &HashMap<K, V>, other: &HashMap<K, V>
) -> Vec<K> {
    let mut res: Vec<_> = this.keys().filter(|key| {
        !other.contains_key(*key)
    }).cloned().collect();
    res.sort();
    res
}


//------------ DeltaVrpIter --------------------------------------------------

/// An iterator over the changes in a shared delta.
#[derive(Clone, Debug)]
pub struct DeltaVrpIter {
    delta: Arc<PayloadDelta>,
    pos: usize,
}

impl DeltaVrpIter {
    fn new(delta: Arc<PayloadDelta>) -> Self {
        DeltaVrpIter { delta, pos: 0 }
    }
}

impl Iterator for DeltaVrpIter {
    type Item = (Action, Payload);

    fn next(&mut self) -> Option<Self::Item> {
        let mut pos = self.pos;
        self.pos += 1;
        if let Some(item) = self.delta.announced_origins.get(pos) {
            return Some((Action::Announce, Payload::Origin(*item)))
        }
        pos -= self.delta.announced_origins.len();
        if let Some(item) = self.delta.announced_keys.get(pos) {
            return Some((
                Action::Announce, Payload::RouterKey(item.clone())
            ))
        }
        pos -= self.delta.announced_keys.len();
        if let Some(item) = self.delta.withdrawn_origins.get(pos) {
            return Some((Action::Withdraw, Payload::Origin(*item)))
        }
        pos -= self.delta.withdrawn_origins.len();
        if let Some(item) = self.delta.withdrawn_keys.get(pos) {
            return Some((
                Action::Withdraw, Payload::RouterKey(item.clone())
            ))
        }
        None
    }
}


//------------ DeltaMerger ---------------------------------------------------

/// Merges a sequence of deltas into one combined delta.
///
/// Payload announced by a later delta cancels an earlier withdrawal of
/// the same payload and vice versa.
#[derive(Clone, Debug)]
struct DeltaMerger {
    serial: Serial,
    announced_origins: HashSet<RouteOrigin>,
    withdrawn_origins: HashSet<RouteOrigin>,
    announced_keys: HashSet<RouterKey>,
    withdrawn_keys: HashSet<RouterKey>,
}

impl DeltaMerger {
    fn new(delta: &PayloadDelta) -> Self {
        DeltaMerger {
            serial: delta.serial,
            announced_origins:
                delta.announced_origins.iter().cloned().collect(),
            withdrawn_origins:
                delta.withdrawn_origins.iter().cloned().collect(),
            announced_keys:
                delta.announced_keys.iter().cloned().collect(),
            withdrawn_keys:
                delta.withdrawn_keys.iter().cloned().collect(),
        }
    }

    fn merge(&mut self, delta: &PayloadDelta) {
        self.serial = delta.serial;
        for origin in &delta.announced_origins {
            if !self.withdrawn_origins.remove(origin) {
                self.announced_origins.insert(*origin);
            }
        }
        for origin in &delta.withdrawn_origins {
            if !self.announced_origins.remove(origin) {
                self.withdrawn_origins.insert(*origin);
            }
        }
        for key in &delta.announced_keys {
            if !self.withdrawn_keys.remove(key) {
                self.announced_keys.insert(key.clone());
            }
        }
        for key in &delta.withdrawn_keys {
            if !self.announced_keys.remove(key) {
                self.withdrawn_keys.insert(key.clone());
            }
        }
    }

    fn into_delta(self) -> Arc<PayloadDelta> {
        let mut res = PayloadDelta::empty(self.serial);
        res.announced_origins = self.announced_origins
            .into_iter().collect();
        res.announced_origins.sort();
        res.withdrawn_origins = self.withdrawn_origins
            .into_iter().collect();
        res.withdrawn_origins.sort();
        res.announced_keys = self.announced_keys.into_iter().collect();
        res.announced_keys.sort();
        res.withdrawn_keys = self.withdrawn_keys.into_iter().collect();
        res.withdrawn_keys.sort();
        Arc::new(res)
    }
}


//------------ RouteOrigin ---------------------------------------------------

/// A validated route origin authorization.
///
/// This is what RFC 6811 calls a "Validated ROA Payload": an IP address
/// prefix, a maximum length, and the origin AS number. Provenance is not
/// part of the value; it travels next to it as [`PayloadInfo`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RouteOrigin {
    /// The origin AS number.
    as_id: AsId,

    /// The IP address prefix.
    prefix: AddressPrefix,

    /// The maximum authorized prefix length of a route.
    max_length: u8,
}

impl RouteOrigin {
    pub fn new(
        as_id: AsId, prefix: AddressPrefix, max_length: u8
    ) -> Self {
        RouteOrigin { as_id, prefix, max_length }
    }

    pub fn as_id(self) -> AsId {
        self.as_id
    }

    pub fn prefix(self) -> AddressPrefix {
        self.prefix
    }

    pub fn address(self) -> IpAddr {
        self.prefix.address()
    }

    pub fn address_length(self) -> u8 {
        self.prefix.address_length()
    }

    pub fn max_length(self) -> u8 {
        self.max_length
    }
}


//------------ RouterKey -----------------------------------------------------

/// A validated BGPsec router key.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RouterKey {
    /// The AS number the router may sign for.
    as_id: AsId,

    /// The subject key identifier of the router certificate.
    key_identifier: KeyIdentifier,

    /// The raw subject public key info of the router key.
    key_info: Bytes,
}

impl RouterKey {
    pub fn new(
        as_id: AsId, key_identifier: KeyIdentifier, key_info: Bytes
    ) -> Self {
        RouterKey { as_id, key_identifier, key_info }
    }

    pub fn as_id(&self) -> AsId {
        self.as_id
    }

    pub fn key_identifier(&self) -> KeyIdentifier {
        self.key_identifier
    }

    pub fn key_info(&self) -> &Bytes {
        &self.key_info
    }
}


//------------ PayloadInfo ---------------------------------------------------

/// The provenance of a payload element.
///
/// The same VRP can be issued under several trust anchors or asserted
/// locally. Only one copy is ever served; this records where it came
/// from.
#[derive(Clone, Debug, Default)]
pub struct PayloadInfo {
    /// The trust anchors that contributed the element.
    tals: Vec<Arc<TalInfo>>,

    /// Whether the element was locally asserted via SLURM.
    local: bool,
}

impl PayloadInfo {
    fn from_tal(tal: Arc<TalInfo>) -> Self {
        PayloadInfo { tals: vec![tal], local: false }
    }

    fn local() -> Self {
        PayloadInfo { tals: Vec::new(), local: true }
    }

    fn add_tal(&mut self, tal: Arc<TalInfo>) {
        if !self.tals.iter().any(|item| item.name() == tal.name()) {
            self.tals.push(tal)
        }
    }

    fn mark_local(&mut self) {
        self.local = true
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    pub fn tals(&self) -> &[Arc<TalInfo>] {
        &self.tals
    }

    /// Returns the name of the first source for output purposes.
    pub fn source_name(&self) -> &str {
        match self.tals.first() {
            Some(tal) => tal.name(),
            None => "local",
        }
    }
}


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    fn origin(asn: u32, prefix: &str, max_len: u8) -> RouteOrigin {
        RouteOrigin::new(
            asn.into(),
            AddressPrefix::from_str(prefix).unwrap(),
            max_len,
        )
    }

    fn builder(origins: &[RouteOrigin]) -> SnapshotBuilder {
        SnapshotBuilder {
            origins: origins.iter().map(|&origin| {
                (origin, PayloadInfo::local())
            }).collect(),
            router_keys: HashMap::new(),
        }
    }

    fn apply(
        snapshot: &[RouteOrigin], delta: &PayloadDelta
    ) -> Vec<RouteOrigin> {
        let mut res: Vec<_> = snapshot.iter().filter(|item| {
            !delta.withdrawn_origins.contains(item)
        }).cloned().collect();
        res.extend_from_slice(&delta.announced_origins);
        res.sort();
        res
    }

    fn test_history(keep: usize) -> PayloadHistory {
        PayloadHistory::new(
            keep,
            Timing { refresh: 3600, retry: 600, expire: 7200 },
        )
    }

    #[test]
    fn delta_construction_and_application() {
        let v1 = origin(64501, "10.0.0.0/24", 24);
        let v2 = origin(64502, "10.0.1.0/24", 24);
        let v3 = origin(64503, "2001:db8::/32", 48);

        let old = builder(&[v1, v2]);
        let new = builder(&[v2, v3]);
        let delta = PayloadDelta::construct(
            &old, &new, Serial(2)
        ).unwrap();

        assert_eq!(delta.serial(), Serial(2));
        assert_eq!(delta.announced_origins(), &[v3]);
        assert_eq!(delta.withdrawn_origins(), &[v1]);

        // Announcements and withdrawals are disjoint.
        assert!(delta.announced_origins.iter().all(|item| {
            !delta.withdrawn_origins.contains(item)
        }));

        // Applying withdrawals then announcements yields the new set.
        let mut expected = vec![v2, v3];
        expected.sort();
        assert_eq!(apply(&[v1, v2], &delta), expected);

        // Identical sets make no delta.
        assert!(
            PayloadDelta::construct(&old, &old, Serial(2)).is_none()
        );
    }

    #[test]
    fn history_serials_and_cache_reset() {
        let v1 = origin(64501, "10.0.0.0/24", 24);
        let v2 = origin(64502, "10.0.1.0/24", 24);
        let v3 = origin(64503, "10.0.2.0/24", 24);

        let mut history = test_history(2);
        assert!(!history.is_active());
        assert_eq!(history.serial(), Serial(0));

        // Serial 1.
        let b1 = builder(&[v1]);
        let d1 = PayloadDelta::construct(
            &SnapshotBuilder::default(), &b1, Serial(1)
        ).unwrap();
        history.push(b1.clone().into_snapshot(), d1);
        assert!(history.is_active());
        assert_eq!(history.serial(), Serial(1));

        // Serial 2.
        let b2 = builder(&[v1, v2]);
        let d2 = PayloadDelta::construct(&b1, &b2, Serial(2)).unwrap();
        history.push(b2.clone().into_snapshot(), d2);

        // Serial 3.
        let b3 = builder(&[v1, v2, v3]);
        let d3 = PayloadDelta::construct(&b2, &b3, Serial(3)).unwrap();
        history.push(b3.into_snapshot(), d3);

        assert_eq!(history.serial(), Serial(3));

        // With two retained snapshots, serial 2 can still catch up ...
        let delta = history.delta_since(Serial(2)).unwrap();
        assert_eq!(delta.serial(), Serial(3));
        assert_eq!(delta.announced_origins(), &[v3]);

        // ... the current serial gets an empty delta ...
        assert!(history.delta_since(Serial(3)).unwrap().is_empty());

        // ... but serial 1 has fallen out of the window and serial 4
        // lies in the future: both force a cache reset.
        assert!(history.delta_since(Serial(1)).is_none());
        assert!(history.delta_since(Serial(4)).is_none());

        // Snapshot retention follows the same window.
        assert!(history.snapshot(Serial(3)).is_some());
        assert!(history.snapshot(Serial(2)).is_some());
        assert!(history.snapshot(Serial(1)).is_none());
    }

    #[test]
    fn merged_deltas() {
        let v1 = origin(64501, "10.0.0.0/24", 24);
        let v2 = origin(64502, "10.0.1.0/24", 24);

        let mut history = test_history(4);

        let b0 = SnapshotBuilder::default();
        let b1 = builder(&[v1]);
        let b2 = builder(&[v1, v2]);
        let b3 = builder(&[v2]);

        history.push(
            b1.clone().into_snapshot(),
            PayloadDelta::construct(&b0, &b1, Serial(1)).unwrap(),
        );
        history.push(
            b2.clone().into_snapshot(),
            PayloadDelta::construct(&b1, &b2, Serial(2)).unwrap(),
        );
        history.push(
            b3.clone().into_snapshot(),
            PayloadDelta::construct(&b2, &b3, Serial(3)).unwrap(),
        );

        // From serial 1 to 3: v1 announced at 1 is withdrawn at 3, so
        // the merged delta only announces v2 and withdraws v1.
        let delta = history.delta_since(Serial(1)).unwrap();
        assert_eq!(delta.serial(), Serial(3));
        assert_eq!(delta.announced_origins(), &[v2]);
        assert_eq!(delta.withdrawn_origins(), &[v1]);

        // From serial 0 to 3: v1 announced at 1 and withdrawn at 3
        // cancels out entirely.
        let delta = history.delta_since(Serial(0)).unwrap();
        assert_eq!(delta.serial(), Serial(3));
        assert_eq!(delta.announced_origins(), &[v2]);
        assert!(delta.withdrawn_origins().is_empty());
    }

    #[test]
    fn update_allocates_serials_only_on_change() {
        let history = SharedHistory(Arc::new(RwLock::new(
            test_history(4)
        )));
        let exceptions = crate::slurm::LocalExceptions::empty();

        // The first run becomes serial 1 even with nothing validated:
        // the state changed from "no data" to "data".
        let mut metrics = Metrics::new();
        assert!(history.update(
            ValidationReport::new(), &exceptions, &mut metrics
        ));
        assert_eq!(history.read().serial(), Serial(1));
        assert!(history.read().is_active());

        // Running again on unchanged (still empty) data is a no-op:
        // no new serial, no new delta.
        let mut metrics = Metrics::new();
        assert!(!history.update(
            ValidationReport::new(), &exceptions, &mut metrics
        ));
        assert_eq!(history.read().serial(), Serial(1));

        // A reset query at this point gets an empty, valid data set.
        assert_eq!(history.full().1.count(), 0);
    }

    #[test]
    fn snapshot_iter_covers_origins_and_keys() {
        let v1 = origin(64501, "10.0.0.0/24", 24);
        let key = RouterKey::new(
            64501.into(),
            KeyIdentifier::from_slice(&[1; 20]).unwrap(),
            Bytes::from_static(b"fake key"),
        );
        let snapshot = Arc::new(PayloadSnapshot {
            origins: vec![(v1, PayloadInfo::local())],
            router_keys: vec![(key.clone(), PayloadInfo::local())],
        });
        let items: Vec<_> = SnapshotVrpIter::new(snapshot).collect();
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], Payload::Origin(item) if item == v1));
        assert!(matches!(
            items[1], Payload::RouterKey(ref item) if *item == key
        ));
    }
}
