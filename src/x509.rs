//! Bits and pieces of X.509 shared by certificates and CRLs.

use std::{fmt, ops, str};
use std::str::FromStr;
use bcder::decode;
use bcder::Tag;
use bytes::Bytes;
use chrono::{DateTime, LocalResult, TimeZone, Utc};
use crate::crypto::{
    take_bit_string, PublicKey, SignatureAlgorithm, VerificationError
};


//------------ SignedData ----------------------------------------------------

/// The outer shell of a signed X.509 structure.
///
/// Both certificates and CRLs are a sequence of the actual signed data,
/// the signature algorithm, and the signature. This type captures the raw
/// signed data so the signature can be checked and hands the data back
/// out for the caller to parse.
#[derive(Clone, Debug)]
pub struct SignedData {
    /// The DER encoding of the signed part, complete with tag and length.
    data: Bytes,

    /// The signature algorithm given outside the signed part.
    ///
    /// RFC 5280 requires this to match the algorithm inside.
    signature_algorithm: SignatureAlgorithm,

    /// The content octets of the signature bit string.
    signature: Bytes,
}

impl SignedData {
    pub fn take_content_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, S::Err> {
        Ok(SignedData {
            data: cons.capture_one()?.into_bytes(),
            signature_algorithm: SignatureAlgorithm::take_from(cons)?,
            signature: take_bit_string(cons)?,
        })
    }

    /// Returns the raw signed data for further parsing.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        self.signature_algorithm
    }

    /// Verifies the signature over the signed data with the given key.
    pub fn verify_signature(
        &self, key: &PublicKey
    ) -> Result<(), ValidationError> {
        key.verify(self.data.as_ref(), self.signature.as_ref())
            .map_err(Into::into)
    }
}


//------------ Name ----------------------------------------------------------

/// An X.509 distinguished name.
///
/// We never look inside. Names are compared by their DER encoding, which
/// RFC 6487's restricted name forms make equivalent to semantic
/// comparison.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Name(Bytes);

impl Name {
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, S::Err> {
        cons.capture(|cons| {
            cons.take_sequence(|cons| cons.skip_all())
        }).map(|captured| Name(captured.into_bytes()))
    }
}


//------------ SerialNumber --------------------------------------------------

/// A certificate's serial number.
///
/// RFC 5280 demands implementations to support serial numbers of up to
/// twenty octets, so we keep the content octets around and compare those.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SerialNumber(Bytes);

impl SerialNumber {
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, S::Err> {
        cons.take_primitive_if(Tag::INTEGER, |prim| {
            let bytes = prim.take_all()?;
            match bytes.first() {
                Some(first) if first & 0x80 == 0 => { }
                _ => return Err(decode::Error::Malformed.into())
            }
            if bytes.len() > 21 {
                return Err(decode::Error::Malformed.into())
            }
            Ok(SerialNumber(bytes))
        })
    }
}


//------------ Time ----------------------------------------------------------

/// A point in time taken from an X.509 structure.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct Time(DateTime<Utc>);

impl Time {
    pub fn new(time: DateTime<Utc>) -> Self {
        Time(time)
    }

    pub fn now() -> Self {
        Time(Utc::now())
    }

    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, S::Err> {
        cons.take_primitive(|tag, prim| {
            let bytes = prim.take_all()?;
            let res = if tag == Tag::UTC_TIME {
                Self::parse_utc(bytes.as_ref())
            }
            else if tag == Tag::GENERALIZED_TIME {
                Self::parse_generalized(bytes.as_ref())
            }
            else {
                None
            };
            match res {
                Some(time) => Ok(time),
                None => Err(decode::Error::Malformed.into())
            }
        })
    }

    pub fn take_opt_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Option<Self>, S::Err> {
        let utc = cons.take_opt_primitive_if(Tag::UTC_TIME, |prim| {
            let bytes = prim.take_all()?;
            Self::parse_utc(bytes.as_ref()).ok_or_else(|| {
                decode::Error::Malformed.into()
            })
        })?;
        if let Some(time) = utc {
            return Ok(Some(time))
        }
        cons.take_opt_primitive_if(Tag::GENERALIZED_TIME, |prim| {
            let bytes = prim.take_all()?;
            Self::parse_generalized(bytes.as_ref()).ok_or_else(|| {
                decode::Error::Malformed.into()
            })
        })
    }

    /// Parses the RFC 5280 UTCTime format `YYMMDDHHMMSSZ`.
    fn parse_utc(slice: &[u8]) -> Option<Self> {
        if slice.len() != 13 || slice[12] != b'Z' {
            return None
        }
        let year = read_int(&slice[0..2])? as i32;
        let year = if year >= 50 { year + 1900 } else { year + 2000 };
        Self::from_parts(
            year,
            read_int(&slice[2..4])?,
            read_int(&slice[4..6])?,
            read_int(&slice[6..8])?,
            read_int(&slice[8..10])?,
            read_int(&slice[10..12])?,
        )
    }

    /// Parses the RFC 5280 GeneralizedTime format `YYYYMMDDHHMMSSZ`.
    fn parse_generalized(slice: &[u8]) -> Option<Self> {
        if slice.len() != 15 || slice[14] != b'Z' {
            return None
        }
        Self::from_parts(
            read_int(&slice[0..4])? as i32,
            read_int(&slice[4..6])?,
            read_int(&slice[6..8])?,
            read_int(&slice[8..10])?,
            read_int(&slice[10..12])?,
            read_int(&slice[12..14])?,
        )
    }

    fn from_parts(
        year: i32, month: u32, day: u32,
        hour: u32, minute: u32, second: u32,
    ) -> Option<Self> {
        match Utc.ymd_opt(year, month, day) {
            LocalResult::Single(date) => {
                date.and_hms_opt(hour, minute, second).map(Time)
            }
            _ => None
        }
    }

    /// Returns the Unix timestamp of the time.
    pub fn timestamp(self) -> i64 {
        self.0.timestamp()
    }
}

impl ops::Deref for Time {
    type Target = DateTime<Utc>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<DateTime<Utc>> for Time {
    fn from(time: DateTime<Utc>) -> Self {
        Time(time)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.format("%Y-%m-%d %H:%M:%S UTC").fmt(f)
    }
}

fn read_int(slice: &[u8]) -> Option<u32> {
    let s = str::from_utf8(slice).ok()?;
    u32::from_str(s).ok()
}


//------------ Validity ------------------------------------------------------

/// The validity window of a certificate.
#[derive(Clone, Copy, Debug)]
pub struct Validity {
    not_before: Time,
    not_after: Time,
}

impl Validity {
    pub fn new(not_before: Time, not_after: Time) -> Self {
        Validity { not_before, not_after }
    }

    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, S::Err> {
        cons.take_sequence(|cons| {
            Ok(Validity::new(
                Time::take_from(cons)?,
                Time::take_from(cons)?,
            ))
        })
    }

    pub fn not_before(&self) -> Time {
        self.not_before
    }

    pub fn not_after(&self) -> Time {
        self.not_after
    }

    /// Returns whether the window covers the given time.
    pub fn validate_at(&self, now: Time) -> Result<(), ValidationError> {
        if now < self.not_before || now > self.not_after {
            Err(ValidationError::Invalid)
        }
        else {
            Ok(())
        }
    }
}


//------------ ValidationError -----------------------------------------------

/// An object failed to validate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationError {
    /// The object's content, digest, or signature is wrong.
    Invalid,

    /// The object claims resources its issuer does not hold, or a trust
    /// anchor tried to inherit resources.
    ResourceViolation,
}

impl From<VerificationError> for ValidationError {
    fn from(_: VerificationError) -> Self {
        ValidationError::Invalid
    }
}

impl From<decode::Error> for ValidationError {
    fn from(_: decode::Error) -> Self {
        ValidationError::Invalid
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            ValidationError::Invalid => "validation failed",
            ValidationError::ResourceViolation => {
                "resources exceed issuer's resources"
            }
        })
    }
}

impl std::error::Error for ValidationError { }


//------------ Helpers -------------------------------------------------------

/// Stores a value in an option that must not have been set before.
///
/// X.509 extensions may appear at most once; parsers use this to enforce
/// that.
pub fn update_once<F, T, E>(
    opt: &mut Option<T>, op: F
) -> Result<(), E>
where
    F: FnOnce() -> Result<T, E>,
    E: From<decode::Error>,
{
    if opt.is_some() {
        Err(decode::Error::Malformed.into())
    }
    else {
        *opt = Some(op()?);
        Ok(())
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_times() {
        assert_eq!(
            Time::parse_utc(b"180305121110Z").unwrap(),
            Time::from_parts(2018, 3, 5, 12, 11, 10).unwrap()
        );
        assert_eq!(
            Time::parse_utc(b"550305121110Z").unwrap(),
            Time::from_parts(1955, 3, 5, 12, 11, 10).unwrap()
        );
        assert_eq!(
            Time::parse_generalized(b"20260305121110Z").unwrap(),
            Time::from_parts(2026, 3, 5, 12, 11, 10).unwrap()
        );
        assert!(Time::parse_utc(b"180305121110").is_none());
        assert!(Time::parse_generalized(b"20261305121110Z").is_none());
    }

    #[test]
    fn validity_window() {
        let validity = Validity::new(
            Time::from_parts(2020, 1, 1, 0, 0, 0).unwrap(),
            Time::from_parts(2030, 1, 1, 0, 0, 0).unwrap(),
        );
        assert!(validity.validate_at(
            Time::from_parts(2025, 6, 1, 0, 0, 0).unwrap()
        ).is_ok());
        assert!(validity.validate_at(
            Time::from_parts(2019, 6, 1, 0, 0, 0).unwrap()
        ).is_err());
        assert!(validity.validate_at(
            Time::from_parts(2031, 6, 1, 0, 0, 0).unwrap()
        ).is_err());
    }
}
