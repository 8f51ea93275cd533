//! The validation engine.
//!
//! Validation starts from the configured trust anchors and walks the
//! repository tree depth-first, one walk per trust anchor. The walker
//! keeps an explicit stack of frames, each holding a validated CA
//! certificate with its resolved resources. The manifest of the CA at
//! the top of the stack defines which objects are examined and in which
//! order. Certificate loops are caught by refusing any CA whose subject
//! key is already on the stack.
//!
//! Failures are scoped: an invalid object takes down only the subtree
//! rooted at it and its siblings continue, while a failed trust anchor
//! or manifest takes down that trust anchor's walk only. A cycle that
//! exceeds its wall-clock deadline is abandoned entirely so the
//! previously published data stays in place.
//!
//! What to do with the validated data is up to a processor implementing
//! [`ProcessRun`] and [`ProcessCa`].

use std::{fs, io};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};
use bytes::Bytes;
use crossbeam_queue::SegQueue;
use crossbeam_utils::thread;
use log::{debug, error, warn};
use crate::cert::{Cert, KeyUsage, ResourceCert};
use crate::config::{Config, FilterPolicy};
use crate::crl::Crl;
use crate::error::Failed;
use crate::manifest::{Manifest, ManifestContent};
use crate::metrics::Metrics;
use crate::roa::Roa;
use crate::rsync;
use crate::sigobj::SignedObject;
use crate::tal::Tal;
use crate::uri;
use crate::x509::ValidationError;


//------------ Engine --------------------------------------------------------

/// The trust anchors and rules for validation runs.
#[derive(Debug)]
pub struct Engine {
    /// The directory to load TALs from.
    tal_dir: PathBuf,

    /// The list of our TALs.
    tals: Vec<Tal>,

    /// The local repository copy.
    cache: rsync::Cache,

    /// Should we be strict when decoding data?
    strict: bool,

    /// How do we deal with stale objects?
    stale: FilterPolicy,

    /// How do we deal with objects of unknown type?
    unknown_objects: FilterPolicy,

    /// Should Ghostbusters records be parsed rather than ignored?
    process_gbrs: bool,

    /// Number of validation threads.
    validation_threads: usize,

    /// The wall-clock budget for a single validation run.
    validation_timeout: Option<Duration>,
}

impl Engine {
    /// Creates a new engine from the configuration.
    ///
    /// If `update` is `false`, the local repository copy is used as is
    /// without running rsync.
    pub fn new(config: &Config, update: bool) -> Result<Self, Failed> {
        let mut res = Engine {
            tal_dir: config.tal_dir.clone(),
            tals: Vec::new(),
            cache: rsync::Cache::new(config, update)?,
            strict: config.strict,
            stale: config.stale,
            unknown_objects: config.unknown_objects,
            process_gbrs: config.process_gbrs,
            validation_threads: config.validation_threads,
            validation_timeout: config.validation_timeout,
        };
        res.reload_tals()?;
        Ok(res)
    }

    /// Reloads the TAL files from the TAL directory.
    ///
    /// A directory that cannot be read or a file that will not parse is
    /// a fatal error: starting up with a missing trust anchor silently
    /// serving less than the operator expects is worse than not
    /// starting.
    pub fn reload_tals(&mut self) -> Result<(), Failed> {
        let mut res = Vec::new();
        let dir = match fs::read_dir(&self.tal_dir) {
            Ok(dir) => dir,
            Err(err) => {
                if err.kind() == io::ErrorKind::NotFound {
                    error!(
                        "Missing TAL directory {}.",
                        self.tal_dir.display()
                    );
                }
                else {
                    error!("Failed to open TAL directory: {}.", err);
                }
                return Err(Failed)
            }
        };
        for entry in dir {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    error!(
                        "Failed to iterate over TAL directory: {}", err
                    );
                    return Err(Failed)
                }
            };
            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue
            }
            let path = entry.path();
            if path.extension().map(|ext| ext != "tal").unwrap_or(true) {
                continue
            }
            let name = path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            let mut file = match fs::File::open(&path) {
                Ok(file) => file,
                Err(err) => {
                    error!(
                        "Failed to open TAL {}: {}. Aborting.",
                        path.display(), err
                    );
                    return Err(Failed)
                }
            };
            match Tal::read(name, &mut file) {
                Ok(tal) => res.push(tal),
                Err(err) => {
                    error!(
                        "Failed to read TAL {}: {}. Aborting.",
                        path.display(), err
                    );
                    return Err(Failed)
                }
            }
        }
        if res.is_empty() {
            error!(
                "No TALs found in {}. Starting anyway.",
                self.tal_dir.display()
            );
        }
        self.tals = res;
        Ok(())
    }

    /// Starts a validation run with the given processor.
    pub fn start<P: ProcessRun>(&self, processor: P) -> Run<P> {
        Run::new(self, self.cache.start(), processor)
    }
}


//------------ Run -----------------------------------------------------------

/// A single validation run.
pub struct Run<'a, P> {
    engine: &'a Engine,
    cache: rsync::Run<'a>,
    processor: P,

    /// The point in time at which the run gives up.
    deadline: Option<Instant>,

    /// The number of objects rejected during the run.
    rejected: AtomicU32,

    /// The number of stale manifests and CRLs encountered.
    stale: AtomicU32,
}

impl<'a, P> Run<'a, P> {
    fn new(
        engine: &'a Engine,
        cache: rsync::Run<'a>,
        processor: P,
    ) -> Self {
        Run {
            engine,
            cache,
            processor,
            deadline: engine.validation_timeout.map(|timeout| {
                Instant::now() + timeout
            }),
            rejected: AtomicU32::new(0),
            stale: AtomicU32::new(0),
        }
    }

    /// Finishes the run and returns its metrics.
    pub fn done(self) -> Metrics {
        let mut metrics = Metrics::new();
        self.cache.done(&mut metrics);
        metrics.rejected_objects = self.rejected.load(Ordering::Relaxed);
        metrics.stale_objects = self.stale.load(Ordering::Relaxed);
        metrics
    }

    fn reject(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Checks whether the run is out of time.
    fn check_deadline(&self) -> Result<(), Failed> {
        if let Some(deadline) = self.deadline {
            if Instant::now() > deadline {
                error!(
                    "Validation run exceeded its deadline. \
                     Discarding partial result."
                );
                return Err(Failed)
            }
        }
        Ok(())
    }
}

impl<'a, P: ProcessRun> Run<'a, P> {
    /// Performs the validation run.
    pub fn process(&self) -> Result<(), Failed> {
        // If we don't have any TALs, we ain't got nothing to do.
        if self.engine.tals.is_empty() {
            return Ok(())
        }

        // Initialize the task queue with all the TALs. Workers pick TALs
        // off the queue; any single TAL is walked sequentially since its
        // manifests impose an order.
        let tasks = SegQueue::new();
        for tal in &self.engine.tals {
            tasks.push(tal);
        }

        let had_err = AtomicBool::new(false);
        let res = thread::scope(|scope| {
            for _ in 0..self.engine.validation_threads {
                scope.spawn(|_| {
                    while let Some(task) = tasks.pop() {
                        if self.process_tal(task).is_err() {
                            had_err.store(true, Ordering::Relaxed);
                            break;
                        }
                        else if had_err.load(Ordering::Relaxed) {
                            break;
                        }
                    }
                });
            }
        });

        if res.is_err() {
            // One of the workers has panicked. Well gosh darn.
            error!(
                "Validation failed after a worker thread has panicked. \
                 This is most assuredly a bug."
            );
            return Err(Failed);
        }
        if had_err.load(Ordering::Relaxed) {
            return Err(Failed)
        }

        Ok(())
    }

    /// Processes a single trust anchor.
    ///
    /// Failure of a TAL's trust anchor aborts this TAL only, so most
    /// problems merely produce log entries. An `Err(_)` return means the
    /// whole run is to be abandoned.
    fn process_tal(&self, tal: &Tal) -> Result<(), Failed> {
        for uri in tal.uris() {
            let cert = match self.load_ta(uri) {
                Some(cert) => cert,
                None => continue,
            };
            if cert.subject_public_key_info() != tal.key_info() {
                warn!("Trust anchor {}: key doesn't match TAL.", uri);
                continue;
            }
            let cert = match cert.validate_ta(self.engine.strict) {
                Ok(cert) => cert,
                Err(_) => {
                    warn!("Trust anchor {}: doesn't validate.", uri);
                    continue;
                }
            };
            debug!("Found valid trust anchor {}. Processing.", uri);

            match self.processor.process_ta(tal, &cert)? {
                Some(processor) => {
                    let mut stack = Vec::new();
                    self.process_ca(&mut stack, CaFrame::new(cert), processor)?;
                    assert!(
                        stack.is_empty(),
                        "certificate stack not empty at end of TAL walk"
                    );
                    return Ok(())
                }
                None => {
                    debug!("Skipping trust anchor {}.", uri);
                    return Ok(())
                }
            }
        }
        warn!("No valid trust anchor for TAL {}.", tal.name());
        Ok(())
    }

    /// Loads and decodes a trust anchor certificate.
    fn load_ta(&self, uri: &uri::Rsync) -> Option<Cert> {
        self.cache.load_module(uri);
        let bytes = self.cache.load_file(uri)?;
        match Cert::decode(bytes) {
            Ok(cert) => Some(cert),
            Err(_) => {
                warn!("Trust anchor {}: failed to decode.", uri);
                None
            }
        }
    }

    /// Processes the CA at the top of the stack-to-be.
    ///
    /// Pushes the frame, walks the CA's publication point, recursing
    /// into child CAs, and pops the frame again. The processor is told
    /// whether its publication point turned out valid via `commit` or
    /// `cancel`.
    fn process_ca(
        &self,
        stack: &mut Vec<CaFrame>,
        frame: CaFrame,
        mut processor: P::ProcessCa,
    ) -> Result<(), Failed> {
        self.check_deadline()?;

        stack.push(frame);
        let point = PubPoint::locate(self, stack);
        let res = match point {
            Ok(point) => point.process(self, stack, &mut processor),
            Err(_) => Ok(false),
        };
        let frame = stack.pop().expect("walker stack underflow");

        match res {
            Ok(true) => {
                processor.commit();
                Ok(())
            }
            Ok(false) => {
                self.reject();
                processor.cancel(&frame.cert);
                Ok(())
            }
            Err(err) => Err(err)
        }
    }
}


//------------ CaFrame -------------------------------------------------------

/// A single frame of the walker's stack.
///
/// Combines the validated certificate with its resolved resources --
/// which [`ResourceCert`] already does -- so one stack suffices.
#[derive(Clone, Debug)]
struct CaFrame {
    cert: ResourceCert,
}

impl CaFrame {
    fn new(cert: ResourceCert) -> Self {
        CaFrame { cert }
    }
}


//------------ PubPoint ------------------------------------------------------

/// The validated entry into a CA's publication point.
struct PubPoint {
    /// The location of the CA's published objects.
    ca_repository: uri::Rsync,

    /// The URI the manifest was found at.
    manifest_uri: uri::Rsync,

    /// The manifest's content.
    manifest: ManifestContent,

    /// The URI of the CRL listed on the manifest.
    crl_uri: uri::Rsync,

    /// The file name of the CRL relative to the CA repository.
    crl_name: Bytes,

    /// The CRL itself.
    crl: Crl,
}

impl PubPoint {
    /// Fetches and validates the manifest and CRL of the top CA.
    ///
    /// Anything going wrong here condemns the publication point as a
    /// whole.
    fn locate<P: ProcessRun>(
        run: &Run<P>, stack: &[CaFrame],
    ) -> Result<Self, ValidationError> {
        let cert = &stack.last().expect("walker stack empty").cert;
        let ca_repository = match cert.ca_repository() {
            Some(uri) => uri.clone(),
            None => return Err(ValidationError::Invalid)
        };
        let manifest_uri = match cert.rpki_manifest() {
            Some(uri) => uri.clone(),
            None => return Err(ValidationError::Invalid)
        };

        run.cache.load_module(&ca_repository);
        if manifest_uri.module() != ca_repository.module() {
            run.cache.load_module(&manifest_uri);
        }

        let bytes = match run.cache.load_file(&manifest_uri) {
            Some(bytes) => bytes,
            None => {
                warn!("{}: no manifest found.", manifest_uri);
                return Err(ValidationError::Invalid)
            }
        };
        let manifest = match Manifest::decode(bytes) {
            Ok(manifest) => manifest,
            Err(_) => {
                warn!("{}: failed to decode.", manifest_uri);
                return Err(ValidationError::Invalid)
            }
        };
        let (ee, manifest) = match manifest.validate(
            cert, run.engine.strict
        ) {
            Ok(some) => some,
            Err(_) => {
                warn!("{}: failed to validate.", manifest_uri);
                return Err(ValidationError::Invalid)
            }
        };
        if manifest.is_stale() {
            run.stale.fetch_add(1, Ordering::Relaxed);
            match run.engine.stale {
                FilterPolicy::Reject => {
                    warn!("{}: stale manifest.", manifest_uri);
                    return Err(ValidationError::Invalid)
                }
                FilterPolicy::Warn => {
                    warn!("{}: stale manifest.", manifest_uri);
                }
                FilterPolicy::Accept => { }
            }
        }

        let (crl_uri, crl_name, crl) = Self::validate_crl(
            run, cert, &ee, &manifest, &ca_repository, &manifest_uri
        )?;

        Ok(PubPoint {
            ca_repository,
            manifest_uri,
            manifest,
            crl_uri,
            crl_name,
            crl,
        })
    }

    /// Checks the manifest's CRL.
    ///
    /// Checks that there is exactly one CRL on the manifest, that it is
    /// the one mentioned in the manifest's EE certificate, that its hash
    /// matches the manifest entry, that it is a valid CRL for the CA,
    /// and that it does not revoke the manifest's EE certificate.
    fn validate_crl<P: ProcessRun>(
        run: &Run<P>,
        issuer: &ResourceCert,
        ee: &ResourceCert,
        manifest: &ManifestContent,
        ca_repository: &uri::Rsync,
        manifest_uri: &uri::Rsync,
    ) -> Result<(uri::Rsync, Bytes, Crl), ValidationError> {
        let crl_uri = match ee.crl_uri() {
            // RFC 6481: MUST end in .crl.
            Some(uri) if uri.ends_with(".crl") => uri.clone(),
            _ => {
                warn!("{}: invalid CRL URI.", manifest_uri);
                return Err(ValidationError::Invalid)
            }
        };
        let crl_name = match crl_uri.relative_to(ca_repository) {
            Some(name) if !name.contains('/') => {
                Bytes::copy_from_slice(name.as_bytes())
            }
            _ => {
                warn!(
                    "{}: CRL URI outside repository directory.",
                    manifest_uri
                );
                return Err(ValidationError::Invalid)
            }
        };

        // Find the entry for crl_name on the manifest and reject any
        // other CRLs listed.
        let mut entry = None;
        for item in manifest.iter() {
            if *item.file() == crl_name {
                entry = Some(item);
            }
            else if item.file().ends_with(b".crl") {
                warn!(
                    "{}: manifest lists unexpected CRLs.", manifest_uri
                );
                return Err(ValidationError::Invalid)
            }
        }
        let entry = match entry {
            Some(entry) => entry,
            None => {
                warn!("{}: CRL not listed on manifest.", manifest_uri);
                return Err(ValidationError::Invalid)
            }
        };

        let bytes = match run.cache.load_file(&crl_uri) {
            Some(bytes) => bytes,
            None => {
                warn!("{}: failed to load.", crl_uri);
                return Err(ValidationError::Invalid)
            }
        };
        if entry.verify(bytes.as_ref()).is_err() {
            warn!("{}: file has wrong manifest hash.", crl_uri);
            return Err(ValidationError::Invalid)
        }
        let crl = match Crl::decode(bytes) {
            Ok(crl) => crl,
            Err(_) => {
                warn!("{}: failed to decode.", crl_uri);
                return Err(ValidationError::Invalid)
            }
        };
        if crl.validate(issuer.subject_public_key_info()).is_err() {
            warn!("{}: failed to validate.", crl_uri);
            return Err(ValidationError::Invalid)
        }
        if crl.is_stale() {
            run.stale.fetch_add(1, Ordering::Relaxed);
            match run.engine.stale {
                FilterPolicy::Reject => {
                    warn!("{}: stale CRL.", crl_uri);
                    return Err(ValidationError::Invalid)
                }
                FilterPolicy::Warn => {
                    warn!("{}: stale CRL.", crl_uri);
                }
                FilterPolicy::Accept => { }
            }
        }

        // Finally: has the manifest's own certificate been revoked?
        if crl.contains(ee.serial_number()) {
            warn!(
                "{}: manifest certificate has been revoked.",
                manifest_uri
            );
            return Err(ValidationError::Invalid)
        }

        Ok((crl_uri, crl_name, crl))
    }

    /// Iterates over the manifest in listed order.
    ///
    /// Returns whether the publication point as a whole survived. An
    /// individual bad object only takes down itself and whatever would
    /// have hung off it; its siblings continue.
    fn process<P: ProcessRun>(
        &self,
        run: &Run<P>,
        stack: &mut Vec<CaFrame>,
        processor: &mut P::ProcessCa,
    ) -> Result<bool, Failed> {
        for item in self.manifest.iter() {
            if *item.file() == self.crl_name {
                // The CRL has been processed already.
                continue
            }
            let uri = match self.ca_repository.join(item.file()) {
                Ok(uri) => uri,
                Err(_) => {
                    warn!(
                        "{}: illegal file name {} in manifest.",
                        self.manifest_uri,
                        String::from_utf8_lossy(item.file())
                    );
                    return Ok(false)
                }
            };

            let bytes = match run.cache.load_file(&uri) {
                Some(bytes) => bytes,
                None => {
                    warn!("{}: listed on manifest but missing.", uri);
                    run.reject();
                    continue
                }
            };
            if item.verify(bytes.as_ref()).is_err() {
                warn!("{}: file has wrong manifest hash.", uri);
                run.reject();
                continue
            }

            if !processor.want(&uri)? {
                continue
            }

            if uri.ends_with(".cer") {
                self.process_cer(run, stack, processor, uri, bytes)?;
            }
            else if uri.ends_with(".roa") {
                self.process_roa(run, stack, processor, uri, bytes);
            }
            else if uri.ends_with(".crl") {
                // Additional CRLs have already condemned the point in
                // validate_crl, so this can't happen. Be safe anyway.
                warn!("{}: stray CRL on manifest.", uri);
            }
            else if uri.ends_with(".gbr") {
                self.process_gbr(run, stack, processor, uri, bytes);
            }
            else if uri.ends_with(".bgpsec") {
                self.process_router_cert(
                    run, stack, processor, uri, bytes
                );
            }
            else {
                match run.engine.unknown_objects {
                    FilterPolicy::Accept => { }
                    FilterPolicy::Warn => {
                        warn!("{}: unknown object type.", uri);
                    }
                    FilterPolicy::Reject => {
                        warn!("{}: unknown object type.", uri);
                        run.reject();
                    }
                }
            }
        }
        Ok(true)
    }

    /// Processes a certificate object.
    ///
    /// CA certificates grow the tree; EE certificates here can only be
    /// BGPsec router certificates.
    fn process_cer<P: ProcessRun>(
        &self,
        run: &Run<P>,
        stack: &mut Vec<CaFrame>,
        processor: &mut P::ProcessCa,
        uri: uri::Rsync,
        bytes: Bytes,
    ) -> Result<(), Failed> {
        let cert = match Cert::decode(bytes) {
            Ok(cert) => cert,
            Err(_) => {
                warn!("{}: failed to decode.", uri);
                run.reject();
                return Ok(())
            }
        };

        if cert.key_usage() == KeyUsage::Ca {
            self.process_ca_cer(run, stack, processor, uri, cert)
        }
        else {
            self.process_ee_cer(run, stack, processor, uri, cert);
            Ok(())
        }
    }

    /// Processes a child CA certificate.
    fn process_ca_cer<P: ProcessRun>(
        &self,
        run: &Run<P>,
        stack: &mut Vec<CaFrame>,
        processor: &mut P::ProcessCa,
        uri: uri::Rsync,
        cert: Cert,
    ) -> Result<(), Failed> {
        // Within a run a certificate appears on the stack at most once.
        let ski = cert.subject_key_identifier();
        if stack.iter().any(|frame| {
            frame.cert.subject_key_identifier() == ski
        }) {
            warn!("{}: certificate loop detected.", uri);
            run.reject();
            return Ok(())
        }

        let issuer = &stack.last().expect("walker stack empty").cert;
        let cert = match cert.validate_ca(issuer, run.engine.strict) {
            Ok(cert) => cert,
            Err(ValidationError::ResourceViolation) => {
                warn!(
                    "{}: certificate claims resources not held by \
                     its issuer.",
                    uri
                );
                run.reject();
                return Ok(())
            }
            Err(_) => {
                warn!("{}: CA certificate failed to validate.", uri);
                run.reject();
                return Ok(())
            }
        };
        if self.check_crl(&uri, &cert).is_err() {
            run.reject();
            return Ok(())
        }

        let child_processor = match processor.process_ca(&uri, &cert)? {
            Some(processor) => processor,
            None => return Ok(())
        };
        run.process_ca(stack, CaFrame::new(cert), child_processor)
    }

    /// Processes an EE certificate found by itself in the repository.
    fn process_ee_cer<P: ProcessRun>(
        &self,
        run: &Run<P>,
        stack: &mut Vec<CaFrame>,
        processor: &mut P::ProcessCa,
        uri: uri::Rsync,
        cert: Cert,
    ) {
        let issuer = &stack.last().expect("walker stack empty").cert;
        let cert = match cert.validate_router(issuer, run.engine.strict) {
            Ok(cert) => cert,
            Err(_) => {
                warn!("{}: router certificate failed to validate.", uri);
                run.reject();
                return
            }
        };
        if self.check_crl(&uri, &cert).is_err() {
            run.reject();
            return
        }
        if processor.process_router_cert(&uri, &cert).is_err() {
            warn!("{}: processing failed.", uri);
        }
    }

    /// Processes a BGPsec router certificate listed explicitly.
    fn process_router_cert<P: ProcessRun>(
        &self,
        run: &Run<P>,
        stack: &mut Vec<CaFrame>,
        processor: &mut P::ProcessCa,
        uri: uri::Rsync,
        bytes: Bytes,
    ) {
        let cert = match Cert::decode(bytes) {
            Ok(cert) => cert,
            Err(_) => {
                warn!("{}: failed to decode.", uri);
                run.reject();
                return
            }
        };
        self.process_ee_cer(run, stack, processor, uri, cert)
    }

    /// Processes a ROA object.
    fn process_roa<P: ProcessRun>(
        &self,
        run: &Run<P>,
        stack: &mut Vec<CaFrame>,
        processor: &mut P::ProcessCa,
        uri: uri::Rsync,
        bytes: Bytes,
    ) {
        let roa = match Roa::decode(bytes) {
            Ok(roa) => roa,
            Err(_) => {
                warn!("{}: decoding failed.", uri);
                run.reject();
                return
            }
        };
        let issuer = &stack.last().expect("walker stack empty").cert;
        match roa.process(issuer, run.engine.strict) {
            Ok((ee, route)) => {
                if self.check_crl(&uri, &ee).is_err() {
                    run.reject();
                    return
                }
                if processor.process_roa(&uri, route).is_err() {
                    warn!("{}: processing failed.", uri);
                }
            }
            Err(_) => {
                warn!("{}: validation failed.", uri);
                run.reject();
            }
        }
    }

    /// Processes a Ghostbusters record.
    ///
    /// By default these are ignored after the manifest hash check. With
    /// GBR processing enabled, the envelope is validated like any other
    /// signed object and failures reject the record; an invalid GBR is
    /// never accepted quietly.
    fn process_gbr<P: ProcessRun>(
        &self,
        run: &Run<P>,
        stack: &mut Vec<CaFrame>,
        processor: &mut P::ProcessCa,
        uri: uri::Rsync,
        bytes: Bytes,
    ) {
        if !run.engine.process_gbrs {
            return
        }
        let obj = match SignedObject::decode(bytes) {
            Ok(obj) => obj,
            Err(_) => {
                warn!("{}: decoding failed.", uri);
                run.reject();
                return
            }
        };
        let issuer = &stack.last().expect("walker stack empty").cert;
        match obj.validate(issuer, run.engine.strict) {
            Ok(ee) => {
                if self.check_crl(&uri, &ee).is_err() {
                    run.reject();
                    return
                }
                let content = obj.content().to_bytes();
                if processor.process_gbr(&uri, content).is_err() {
                    warn!("{}: processing failed.", uri);
                }
            }
            Err(_) => {
                warn!("{}: validation failed.", uri);
                run.reject();
            }
        }
    }

    /// Checks a certificate against the publication point's CRL.
    ///
    /// The certificate must name the CRL we have and must not be listed
    /// on it.
    fn check_crl(
        &self, uri: &uri::Rsync, cert: &ResourceCert
    ) -> Result<(), ValidationError> {
        let crl_uri = match cert.crl_uri() {
            Some(some) => some,
            None => {
                warn!("{}: certificate has no CRL URI.", uri);
                return Err(ValidationError::Invalid)
            }
        };
        if *crl_uri != self.crl_uri {
            warn!("{}: certificate's CRL differs from manifest's.", uri);
            return Err(ValidationError::Invalid)
        }
        if self.crl.contains(cert.serial_number()) {
            warn!("{}: certificate has been revoked.", uri);
            return Err(ValidationError::Invalid)
        }
        Ok(())
    }
}


//------------ ProcessRun ----------------------------------------------------

/// A type that wants to process the results of a validation run.
pub trait ProcessRun: Send + Sync {
    type ProcessCa: ProcessCa;

    /// Processes the given trust anchor.
    ///
    /// If the method wants the content of this trust anchor to be
    /// validated and processed, it returns a processor for it as some
    /// success value. If it rather wishes to skip this trust anchor, it
    /// returns `Ok(None)`. If it wishes to abort processing, it returns
    /// an error.
    fn process_ta(
        &self, tal: &Tal, cert: &ResourceCert
    ) -> Result<Option<Self::ProcessCa>, Failed>;
}


//------------ ProcessCa -----------------------------------------------------

/// A type that processes the content of a single CA.
pub trait ProcessCa: Sized + Send + Sync {
    /// Determines whether an object with the given URI should be
    /// processed.
    ///
    /// The object will only be processed if the method returns
    /// `Ok(true)`. If it returns an error, the entire run is aborted.
    fn want(&self, uri: &uri::Rsync) -> Result<bool, Failed>;

    /// Processes the certificate of a validated child CA.
    ///
    /// If the child's objects are to be validated, returns a new
    /// processor for them. `Ok(None)` skips the child quietly. An error
    /// aborts the entire run.
    fn process_ca(
        &mut self, uri: &uri::Rsync, cert: &ResourceCert
    ) -> Result<Option<Self>, Failed>;

    /// Processes the content of a validated ROA.
    fn process_roa(
        &mut self, uri: &uri::Rsync, route: crate::roa::RouteOriginAttestation
    ) -> Result<(), Failed> {
        let _ = (uri, route);
        Ok(())
    }

    /// Processes a validated BGPsec router certificate.
    fn process_router_cert(
        &mut self, uri: &uri::Rsync, cert: &ResourceCert
    ) -> Result<(), Failed> {
        let _ = (uri, cert);
        Ok(())
    }

    /// Processes the content of a validated Ghostbusters record.
    fn process_gbr(
        &mut self, uri: &uri::Rsync, content: Bytes
    ) -> Result<(), Failed> {
        let _ = (uri, content);
        Ok(())
    }

    /// Completes processing of the CA.
    ///
    /// Called when all objects of the CA have been processed or actively
    /// ignored and no error has happened.
    fn commit(self);

    /// Completes processing of an invalid CA.
    ///
    /// Called when the publication point of the CA had to be rejected
    /// as a whole. The default implementation does nothing at all.
    fn cancel(self, _cert: &ResourceCert) {
    }
}
