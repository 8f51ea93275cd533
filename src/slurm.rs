//! Local exceptions per RFC 8416 aka SLURM.
//!
//! A SLURM file lets an operator remove payload elements from the
//! validated data set (filters) and add their own (assertions). Filters
//! match under flag-masking: only the fields present in a filter record
//! are compared, a comment never is.

use std::{fmt, io};
use std::convert::{TryFrom, TryInto};
use std::fs::File;
use std::path::Path;
use std::str::FromStr;
use bytes::Bytes;
use serde::Deserialize;
use crate::crypto::KeyIdentifier;
use crate::payload::{RouteOrigin, RouterKey};
use crate::resources::{AddressPrefix, AsId};


//------------ LocalExceptions -----------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct LocalExceptions {
    prefix_filters: Vec<PrefixFilter>,
    bgpsec_filters: Vec<BgpsecFilter>,
    origin_assertions: Vec<RouteOrigin>,
    key_assertions: Vec<RouterKey>,
}

impl LocalExceptions {
    pub fn empty() -> Self {
        Default::default()
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let file = File::open(path)?;
        let json: SlurmFile = serde_json::from_reader(file)?;
        Self::from_json(json)
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self, LoadError> {
        let json: SlurmFile = serde_json::from_slice(slice)?;
        Self::from_json(json)
    }

    fn from_json(json: SlurmFile) -> Result<Self, LoadError> {
        if json.slurm_version != 1 {
            return Err(ParseError::BadVersion(json.slurm_version).into())
        }
        let mut res = Self::empty();
        for filter in json.filters.prefix {
            res.prefix_filters.push(filter.try_into()?);
        }
        for filter in json.filters.bgpsec {
            res.bgpsec_filters.push(filter.try_into()?);
        }
        for assertion in json.assertions.prefix {
            res.origin_assertions.push(assertion.try_into()?);
        }
        for assertion in json.assertions.bgpsec {
            res.key_assertions.push(assertion.try_into()?);
        }
        Ok(res)
    }

    /// Returns whether an origin survives the filters.
    pub fn keep_origin(&self, origin: &RouteOrigin) -> bool {
        !self.prefix_filters.iter().any(|filter| {
            filter.filter_origin(origin)
        })
    }

    /// Returns whether a router key survives the filters.
    pub fn keep_router_key(&self, key: &RouterKey) -> bool {
        !self.bgpsec_filters.iter().any(|filter| {
            filter.filter_key(key)
        })
    }

    pub fn origin_assertions(
        &self
    ) -> impl Iterator<Item = RouteOrigin> + '_ {
        self.origin_assertions.iter().cloned()
    }

    pub fn router_key_assertions(
        &self
    ) -> impl Iterator<Item = RouterKey> + '_ {
        self.key_assertions.iter().cloned()
    }
}


//------------ PrefixFilter --------------------------------------------------

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PrefixFilter {
    prefix: Option<AddressPrefix>,
    asn: Option<AsId>,
}

impl PrefixFilter {
    /// Returns whether the filter matches the given origin.
    ///
    /// Only the fields present in the filter record participate in the
    /// match. A record with neither field matches everything.
    fn filter_origin(&self, origin: &RouteOrigin) -> bool {
        match (self.prefix, self.asn) {
            (Some(prefix), Some(asn)) => {
                prefix.covers(origin.prefix()) && asn == origin.as_id()
            }
            (Some(prefix), None) => prefix.covers(origin.prefix()),
            (None, Some(asn)) => asn == origin.as_id(),
            (None, None) => true,
        }
    }
}

impl TryFrom<RawPrefixFilter> for PrefixFilter {
    type Error = ParseError;

    fn try_from(raw: RawPrefixFilter) -> Result<Self, Self::Error> {
        let prefix = match raw.prefix {
            Some(ref prefix) => Some(
                AddressPrefix::from_str(prefix)
                    .map_err(|_| ParseError::BadPrefix)?
            ),
            None => None
        };
        Ok(PrefixFilter {
            prefix,
            asn: raw.asn.map(Into::into),
        })
    }
}


//------------ BgpsecFilter --------------------------------------------------

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BgpsecFilter {
    asn: Option<AsId>,
    ski: Option<KeyIdentifier>,
}

impl BgpsecFilter {
    fn filter_key(&self, key: &RouterKey) -> bool {
        match (self.asn, self.ski) {
            (Some(asn), Some(ski)) => {
                asn == key.as_id() && ski == key.key_identifier()
            }
            (Some(asn), None) => asn == key.as_id(),
            (None, Some(ski)) => ski == key.key_identifier(),
            (None, None) => true,
        }
    }
}

impl TryFrom<RawBgpsecFilter> for BgpsecFilter {
    type Error = ParseError;

    fn try_from(raw: RawBgpsecFilter) -> Result<Self, Self::Error> {
        let ski = match raw.ski {
            Some(ref ski) => Some(decode_ski(ski)?),
            None => None
        };
        Ok(BgpsecFilter {
            asn: raw.asn.map(Into::into),
            ski,
        })
    }
}


//--- Assertion conversions

impl TryFrom<RawPrefixAssertion> for RouteOrigin {
    type Error = ParseError;

    fn try_from(raw: RawPrefixAssertion) -> Result<Self, Self::Error> {
        let prefix = AddressPrefix::from_str(&raw.prefix)
            .map_err(|_| ParseError::BadPrefix)?;
        let max_length = match raw.max_prefix_length {
            Some(len) => {
                let width = if prefix.is_v4() { 32 } else { 128 };
                if len < prefix.address_length() || len > width {
                    return Err(ParseError::BadMaxLength)
                }
                len
            }
            None => prefix.address_length()
        };
        Ok(RouteOrigin::new(raw.asn.into(), prefix, max_length))
    }
}

impl TryFrom<RawBgpsecAssertion> for RouterKey {
    type Error = ParseError;

    fn try_from(raw: RawBgpsecAssertion) -> Result<Self, Self::Error> {
        let ski = decode_ski(&raw.ski)?;
        let key_info = base64::decode_config(
            &raw.router_public_key, base64::URL_SAFE_NO_PAD
        ).map_err(|_| ParseError::BadRouterKey)?;
        Ok(RouterKey::new(raw.asn.into(), ski, Bytes::from(key_info)))
    }
}

/// Decodes a base64url encoded subject key identifier.
fn decode_ski(s: &str) -> Result<KeyIdentifier, ParseError> {
    let bytes = base64::decode_config(s, base64::URL_SAFE_NO_PAD)
        .map_err(|_| ParseError::BadSki)?;
    KeyIdentifier::from_slice(&bytes).ok_or(ParseError::BadSki)
}


//------------ Raw JSON structure --------------------------------------------

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SlurmFile {
    #[serde(rename = "slurmVersion")]
    slurm_version: u8,

    #[serde(rename = "validationOutputFilters")]
    filters: RawFilters,

    #[serde(rename = "locallyAddedAssertions")]
    assertions: RawAssertions,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFilters {
    #[serde(rename = "prefixFilters", default)]
    prefix: Vec<RawPrefixFilter>,

    #[serde(rename = "bgpsecFilters", default)]
    bgpsec: Vec<RawBgpsecFilter>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAssertions {
    #[serde(rename = "prefixAssertions", default)]
    prefix: Vec<RawPrefixAssertion>,

    #[serde(rename = "bgpsecAssertions", default)]
    bgpsec: Vec<RawBgpsecAssertion>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
#[allow(dead_code)]
struct RawPrefixFilter {
    prefix: Option<String>,
    asn: Option<u32>,
    comment: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
#[allow(dead_code)]
struct RawBgpsecFilter {
    asn: Option<u32>,
    #[serde(rename = "SKI")]
    ski: Option<String>,
    comment: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
#[allow(dead_code)]
struct RawPrefixAssertion {
    prefix: String,
    asn: u32,
    #[serde(rename = "maxPrefixLength")]
    max_prefix_length: Option<u8>,
    comment: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
#[allow(dead_code)]
struct RawBgpsecAssertion {
    asn: u32,
    #[serde(rename = "SKI")]
    ski: String,
    #[serde(rename = "routerPublicKey")]
    router_public_key: String,
    comment: Option<String>,
}


//------------ ParseError ----------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParseError {
    BadVersion(u8),
    BadPrefix,
    BadMaxLength,
    BadSki,
    BadRouterKey,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ParseError::BadVersion(version) => {
                write!(f, "unsupported SLURM version {}", version)
            }
            ParseError::BadPrefix => f.write_str("invalid prefix"),
            ParseError::BadMaxLength => {
                f.write_str("invalid maxPrefixLength")
            }
            ParseError::BadSki => f.write_str("invalid SKI"),
            ParseError::BadRouterKey => {
                f.write_str("invalid routerPublicKey")
            }
        }
    }
}

impl std::error::Error for ParseError { }


//------------ LoadError -----------------------------------------------------

#[derive(Debug)]
pub enum LoadError {
    Io(io::Error),
    Json(serde_json::Error),
    Parse(ParseError),
}

impl From<io::Error> for LoadError {
    fn from(err: io::Error) -> LoadError {
        LoadError::Io(err)
    }
}

impl From<serde_json::Error> for LoadError {
    fn from(err: serde_json::Error) -> LoadError {
        LoadError::Json(err)
    }
}

impl From<ParseError> for LoadError {
    fn from(err: ParseError) -> LoadError {
        LoadError::Parse(err)
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            LoadError::Io(ref err) => err.fmt(f),
            LoadError::Json(ref err) => err.fmt(f),
            LoadError::Parse(ref err) => err.fmt(f),
        }
    }
}

impl std::error::Error for LoadError { }


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    const EMPTY: &str = r#"{
        "slurmVersion": 1,
        "validationOutputFilters": {
            "prefixFilters": [],
            "bgpsecFilters": []
        },
        "locallyAddedAssertions": {
            "prefixAssertions": [],
            "bgpsecAssertions": []
        }
    }"#;

    const FULL: &str = r#"{
        "slurmVersion": 1,
        "validationOutputFilters": {
            "prefixFilters": [
                {
                    "prefix": "192.0.2.0/24",
                    "comment": "All VRPs encompassed by prefix"
                },
                {
                    "asn": 64496,
                    "comment": "All VRPs matching ASN"
                },
                {
                    "prefix": "198.51.100.0/24",
                    "asn": 64497,
                    "comment": "All VRPs encompassed by prefix, matching ASN"
                }
            ],
            "bgpsecFilters": [
                {
                    "asn": 64496,
                    "comment": "All keys for ASN"
                }
            ]
        },
        "locallyAddedAssertions": {
            "prefixAssertions": [
                {
                    "asn": 64496,
                    "prefix": "198.51.100.0/24",
                    "comment": "My other important route"
                },
                {
                    "asn": 64496,
                    "prefix": "2001:db8::/32",
                    "maxPrefixLength": 48,
                    "comment": "My other important de-aggregated routes"
                }
            ],
            "bgpsecAssertions": []
        }
    }"#;

    fn origin(asn: u32, prefix: &str, max_len: u8) -> RouteOrigin {
        RouteOrigin::new(
            asn.into(),
            AddressPrefix::from_str(prefix).unwrap(),
            max_len,
        )
    }

    #[test]
    fn parses_empty_file() {
        let exceptions = LocalExceptions::from_slice(
            EMPTY.as_bytes()
        ).unwrap();
        assert!(exceptions.prefix_filters.is_empty());
        assert!(exceptions.origin_assertions.is_empty());
    }

    #[test]
    fn parses_full_file() {
        let exceptions = LocalExceptions::from_slice(
            FULL.as_bytes()
        ).unwrap();
        assert_eq!(exceptions.prefix_filters.len(), 3);
        assert_eq!(exceptions.bgpsec_filters.len(), 1);
        let assertions: Vec<_> =
            exceptions.origin_assertions().collect();
        assert_eq!(
            assertions,
            [
                origin(64496, "198.51.100.0/24", 24),
                origin(64496, "2001:db8::/32", 48),
            ]
        );
    }

    #[test]
    fn rejects_wrong_version() {
        let json = EMPTY.replace(
            "\"slurmVersion\": 1", "\"slurmVersion\": 2"
        );
        assert!(matches!(
            LocalExceptions::from_slice(json.as_bytes()),
            Err(LoadError::Parse(ParseError::BadVersion(2)))
        ));
    }

    #[test]
    fn filter_masking() {
        let exceptions = LocalExceptions::from_slice(
            FULL.as_bytes()
        ).unwrap();

        // Prefix-only filter: any ASN under 192.0.2.0/24 goes.
        assert!(!exceptions.keep_origin(
            &origin(65000, "192.0.2.0/25", 25)
        ));
        // ASN-only filter.
        assert!(!exceptions.keep_origin(
            &origin(64496, "203.0.113.0/24", 24)
        ));
        // Combined filter requires both to match.
        assert!(!exceptions.keep_origin(
            &origin(64497, "198.51.100.0/24", 24)
        ));
        assert!(exceptions.keep_origin(
            &origin(64498, "198.51.100.0/24", 24)
        ));
        // Nothing matching at all is kept.
        assert!(exceptions.keep_origin(
            &origin(64499, "203.0.113.0/24", 24)
        ));
    }

    #[test]
    fn bgpsec_filter_masking() {
        let exceptions = LocalExceptions::from_slice(
            FULL.as_bytes()
        ).unwrap();
        let filtered = RouterKey::new(
            64496.into(),
            KeyIdentifier::from_slice(&[7; 20]).unwrap(),
            Bytes::from_static(b"key"),
        );
        let kept = RouterKey::new(
            64499.into(),
            KeyIdentifier::from_slice(&[7; 20]).unwrap(),
            Bytes::from_static(b"key"),
        );
        assert!(!exceptions.keep_router_key(&filtered));
        assert!(exceptions.keep_router_key(&kept));
    }

    #[test]
    fn bgpsec_assertion_decoding() {
        let json = r#"{
            "slurmVersion": 1,
            "validationOutputFilters": {
                "prefixFilters": [],
                "bgpsecFilters": []
            },
            "locallyAddedAssertions": {
                "prefixAssertions": [],
                "bgpsecAssertions": [
                    {
                        "asn": 64496,
                        "comment": "My known key for my important ASN",
                        "SKI": "ERERERERERERERERERERERERERE",
                        "routerPublicKey": "YWJj"
                    }
                ]
            }
        }"#;
        let exceptions = LocalExceptions::from_slice(
            json.as_bytes()
        ).unwrap();
        let keys: Vec<_> = exceptions.router_key_assertions().collect();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].as_id(), AsId::from(64496));
        assert_eq!(
            keys[0].key_identifier(),
            KeyIdentifier::from_slice(&[0x11; 20]).unwrap()
        );
        assert_eq!(keys[0].key_info().as_ref(), b"abc");
    }
}
