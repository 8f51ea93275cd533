//! An RPKI relying party.
//!
//! The _Resource Public Key Infrastructure_ (RPKI) is an application of
//! PKI to Internet routing security. It allows the holders of IP address
//! prefixes to publish cryptographically signed statements about which
//! autonomous systems may originate routes for those prefixes.
//!
//! This crate implements everything necessary to keep a local copy of
//! the published data, validate it, and distill it into _Validated ROA
//! Payloads_ and BGPsec router keys, which are then handed to routers
//! via the RPKI-to-Router protocol or written out as a file.
//!
//! The crate is structured bottom-up: [`resources`] and [`crypto`]
//! provide the arithmetic and cryptographic foundations, the object
//! parsers live in [`cert`], [`crl`], [`sigobj`], [`manifest`], and
//! [`roa`], the [`engine`] walks the repository tree, [`payload`] keeps
//! the results with their history, and [`rtr`] serves them.

pub mod cert;
pub mod config;
pub mod crl;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod log;
pub mod manifest;
pub mod metrics;
pub mod operation;
pub mod output;
pub mod payload;
pub mod resources;
pub mod roa;
pub mod rsync;
pub mod rtr;
pub mod sigobj;
pub mod slurm;
pub mod tal;
pub mod uri;
pub mod x509;

pub use self::config::Config;
pub use self::error::ExitError;
pub use self::operation::Operation;
