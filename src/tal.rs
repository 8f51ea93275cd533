//! Trust Anchor Locators.
//!
//! A TAL (RFC 8630) names the location of a trust anchor certificate and
//! pins its subject public key: one or more URIs, one per line, then an
//! empty line, then the base64 encoded SubjectPublicKeyInfo.

use std::{fmt, io};
use std::io::Read;
use std::sync::Arc;
use crate::crypto::PublicKey;
use crate::uri;


//------------ Tal -----------------------------------------------------------

/// A trust anchor locator.
#[derive(Clone, Debug)]
pub struct Tal {
    /// The rsync URIs the trust anchor certificate can be fetched from.
    uris: Vec<uri::Rsync>,

    /// The trust anchor's subject public key.
    key_info: PublicKey,

    /// Information about the TAL shared with everything derived from it.
    info: Arc<TalInfo>,
}

impl Tal {
    /// Reads a TAL from a reader, naming it `name`.
    pub fn read<R: Read>(
        name: String, reader: &mut R
    ) -> Result<Self, ReadError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;

        let mut data = data.as_slice();
        let mut uris = Vec::new();
        while let Some(line) = take_line(&mut data)? {
            // Modern TALs may list additional non-rsync URIs. We only
            // fetch via rsync and skip everything else.
            if line.starts_with(b"rsync://") {
                uris.push(uri::Rsync::from_slice(line)?)
            }
            else if !line.starts_with(b"https://") {
                return Err(ReadError::BadUriScheme)
            }
        }
        if uris.is_empty() {
            return Err(ReadError::NoRsyncUri)
        }
        // The key is wrapped to multiple lines, so strip all white
        // space before decoding.
        let data: Vec<u8> = data.iter().copied().filter(|ch| {
            !ch.is_ascii_whitespace()
        }).collect();
        let key_info = base64::decode(&data)?;
        let key_info = PublicKey::decode(key_info.as_slice())?;
        Ok(Tal {
            uris,
            key_info,
            info: Arc::new(TalInfo::new(name)),
        })
    }

    pub fn uris(&self) -> impl Iterator<Item = &uri::Rsync> {
        self.uris.iter()
    }

    pub fn key_info(&self) -> &PublicKey {
        &self.key_info
    }

    pub fn info(&self) -> &Arc<TalInfo> {
        &self.info
    }

    pub fn name(&self) -> &str {
        self.info.name()
    }
}


//------------ TalInfo -------------------------------------------------------

/// Information shared by everything derived from one trust anchor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TalInfo {
    name: String,
}

impl TalInfo {
    pub fn new(name: String) -> Self {
        TalInfo { name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}


//------------ Helpers -------------------------------------------------------

/// Takes the next line off the front of `data`.
///
/// Returns `None` when the empty line separating the URIs from the key is
/// reached.
fn take_line<'a>(
    data: &mut &'a [u8]
) -> Result<Option<&'a [u8]>, ReadError> {
    let mut split = data.splitn(2, |&ch| ch == b'\n');
    let mut line = split.next().ok_or(ReadError::UnexpectedEof)?;
    *data = split.next().ok_or(ReadError::UnexpectedEof)?;
    if line.ends_with(b"\r") {
        line = line.split_last().map(|(_, rest)| rest).unwrap_or(line);
    }
    if line.is_empty() {
        Ok(None)
    }
    else {
        Ok(Some(line))
    }
}


//------------ ReadError -----------------------------------------------------

#[derive(Debug)]
pub enum ReadError {
    Io(io::Error),
    UnexpectedEof,
    BadUriScheme,
    NoRsyncUri,
    BadUri(uri::Error),
    BadKeyInfoEncoding(base64::DecodeError),
    BadKeyInfo,
}

impl From<io::Error> for ReadError {
    fn from(err: io::Error) -> ReadError {
        ReadError::Io(err)
    }
}

impl From<uri::Error> for ReadError {
    fn from(err: uri::Error) -> ReadError {
        ReadError::BadUri(err)
    }
}

impl From<base64::DecodeError> for ReadError {
    fn from(err: base64::DecodeError) -> ReadError {
        ReadError::BadKeyInfoEncoding(err)
    }
}

impl From<bcder::decode::Error> for ReadError {
    fn from(_: bcder::decode::Error) -> ReadError {
        ReadError::BadKeyInfo
    }
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ReadError::Io(ref err) => err.fmt(f),
            ReadError::UnexpectedEof => {
                f.write_str("unexpected end of file")
            }
            ReadError::BadUriScheme => {
                f.write_str("unsupported URI scheme")
            }
            ReadError::NoRsyncUri => {
                f.write_str("no rsync URI in TAL")
            }
            ReadError::BadUri(ref err) => {
                write!(f, "bad trust anchor URI: {}", err)
            }
            ReadError::BadKeyInfoEncoding(ref err) => {
                write!(f, "bad key info: {}", err)
            }
            ReadError::BadKeyInfo => f.write_str("bad key info"),
        }
    }
}

impl std::error::Error for ReadError { }


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    // A syntactically valid TAL: two URIs, one of them https, then a
    // base64 block. The key is a P-256 SubjectPublicKeyInfo.
    const TAL: &[u8] =
        b"https://example.com/ta/ta.cer\n\
          rsync://example.com/ta/ta.cer\n\
          \n\
          MFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAE2nFB0WAuFvlQpAlPSOWXYBkl/QQg\n\
          W/2Hgr0vWvcR3YlYyfzArbPaGbJwikTwrY1V6tGyBieszFGfWGVURJqlTw==\n";

    #[test]
    fn read_tal() {
        let tal = Tal::read(
            "example".into(), &mut &TAL[..]
        ).unwrap();
        assert_eq!(tal.name(), "example");
        let uris: Vec<_> = tal.uris().map(|uri| uri.to_string()).collect();
        assert_eq!(uris, ["rsync://example.com/ta/ta.cer"]);
    }

    #[test]
    fn rejects_tal_without_rsync_uri() {
        let tal: &[u8] = b"https://example.com/ta/ta.cer\n\nAAAA\n";
        match Tal::read("x".into(), &mut &tal[..]) {
            Err(ReadError::NoRsyncUri) => { }
            res => panic!("unexpected result: {:?}", res),
        }
    }
}
