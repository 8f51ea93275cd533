//! Route Origin Authorizations.
//!
//! A ROA is a signed object (RFC 6482) binding an AS number to a set of
//! IP prefixes, each with an optional maximum length. Validation checks
//! the envelope, that every prefix is covered by the EE certificate's IP
//! resources, and that the maximum length is within bounds.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use bcder::decode;
use bcder::Tag;
use crate::cert::ResourceCert;
use crate::resources::{AddressPrefix, AsId};
use crate::sigobj::{self, SignedObject};
use crate::x509::ValidationError;


//------------ Roa -----------------------------------------------------------

/// A decoded route origin authorization.
#[derive(Clone, Debug)]
pub struct Roa {
    signed: SignedObject,
    content: RouteOriginAttestation,
}

impl Roa {
    pub fn decode<S: decode::Source>(source: S) -> Result<Self, S::Err> {
        let signed = SignedObject::decode(source)?;
        if *signed.content_type() != sigobj::oid::ROUTE_ORIGIN_AUTHZ {
            return Err(decode::Error::Malformed.into())
        }
        let content = signed.decode_content(
            RouteOriginAttestation::take_from
        )?;
        Ok(Roa { signed, content })
    }

    /// Validates the ROA against the issuing CA certificate.
    ///
    /// On success returns the validated EE certificate and the content.
    pub fn process(
        self, issuer: &ResourceCert, strict: bool
    ) -> Result<(ResourceCert, RouteOriginAttestation), ValidationError> {
        let ee = self.signed.validate(issuer, strict)?;
        self.content.validate(&ee)?;
        Ok((ee, self.content))
    }

    pub fn content(&self) -> &RouteOriginAttestation {
        &self.content
    }
}


//------------ RouteOriginAttestation ----------------------------------------

/// The payload of a ROA.
#[derive(Clone, Debug)]
pub struct RouteOriginAttestation {
    as_id: AsId,
    prefixes: Vec<FriendlyRoaPrefix>,
}

impl RouteOriginAttestation {
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, S::Err> {
        cons.take_sequence(|cons| {
            // version [0] INTEGER DEFAULT 0. Must be 0 if present.
            cons.take_opt_primitive_if(Tag::CTX_0, |prim| {
                let bytes = prim.take_all()?;
                if bytes.as_ref() != [0u8] {
                    return Err(decode::Error::Malformed.into())
                }
                Ok(())
            })?;
            let as_id = AsId::take_from(cons)?;
            let mut prefixes = Vec::new();
            cons.take_sequence(|cons| {
                let mut any = false;
                while let Some(()) = cons.take_opt_sequence(|cons| {
                    any = true;
                    RoaFamily::take_content_from(cons, &mut prefixes)
                })? { }
                if !any {
                    return Err(decode::Error::Malformed.into())
                }
                Ok(())
            })?;
            Ok(RouteOriginAttestation { as_id, prefixes })
        })
    }

    pub fn as_id(&self) -> AsId {
        self.as_id
    }

    /// Returns an iterator over the expanded per-prefix payloads.
    pub fn iter(
        &self
    ) -> impl Iterator<Item = FriendlyRoaPrefix> + '_ {
        self.prefixes.iter().cloned()
    }

    /// Validates the content against the validated EE certificate.
    fn validate(
        &self, ee: &ResourceCert
    ) -> Result<(), ValidationError> {
        // Every prefix must be covered by the EE certificate's IP
        // resources.
        for item in &self.prefixes {
            let (min, max) = item.prefix.range();
            let covered = if item.prefix.is_v4() {
                ee.resources().v4().contains_range(min, max)
            }
            else {
                ee.resources().v6().contains_range(min, max)
            };
            if !covered {
                return Err(ValidationError::ResourceViolation)
            }
        }
        // If the EE certificate carries AS resources, the ROA's single
        // AS number must be among them.
        if !ee.resources().asn().is_empty()
            && !ee.resources().asn().contains_id(self.as_id)
        {
            return Err(ValidationError::ResourceViolation)
        }
        Ok(())
    }
}


//------------ RoaFamily -----------------------------------------------------

/// Parsing of a single ROAIPAddressFamily value.
struct RoaFamily;

impl RoaFamily {
    fn take_content_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
        prefixes: &mut Vec<FriendlyRoaPrefix>,
    ) -> Result<(), S::Err> {
        let family = take_roa_family(cons)?;
        cons.take_sequence(|cons| {
            let mut any = false;
            while let Some(prefix) = Self::take_opt_address(cons, family)? {
                any = true;
                prefixes.push(prefix);
            }
            if !any {
                return Err(decode::Error::Malformed.into())
            }
            Ok(())
        })
    }

    /// Parses a single ROAIPAddress value.
    ///
    /// ```text
    /// ROAIPAddress ::= SEQUENCE {
    ///    address       IPAddress,
    ///    maxLength     INTEGER OPTIONAL }
    /// ```
    fn take_opt_address<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
        family: Family,
    ) -> Result<Option<FriendlyRoaPrefix>, S::Err> {
        cons.take_opt_sequence(|cons| {
            let prefix = take_prefix(cons, family)?;
            let max_length = cons.take_opt_primitive_if(
                Tag::INTEGER, |prim| {
                    let bytes = prim.take_all()?;
                    match parse_small_uint(bytes.as_ref()) {
                        Some(value) => Ok(value),
                        None => Err(decode::Error::Malformed.into())
                    }
                }
            )?;
            let max_length = match max_length {
                Some(value) => {
                    // prefix_len <= maxLength <= family width.
                    if value < prefix.address_length()
                        || value > family.bit_len()
                    {
                        return Err(decode::Error::Malformed.into())
                    }
                    value
                }
                None => prefix.address_length()
            };
            Ok(FriendlyRoaPrefix { prefix, max_length })
        })
    }
}


//------------ FriendlyRoaPrefix ---------------------------------------------

/// A single prefix authorized by a ROA in its expanded form.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct FriendlyRoaPrefix {
    prefix: AddressPrefix,
    max_length: u8,
}

impl FriendlyRoaPrefix {
    pub fn prefix(&self) -> AddressPrefix {
        self.prefix
    }

    pub fn address(&self) -> IpAddr {
        self.prefix.address()
    }

    pub fn address_length(&self) -> u8 {
        self.prefix.address_length()
    }

    pub fn max_length(&self) -> u8 {
        self.max_length
    }
}


//------------ Family --------------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Family {
    V4,
    V6,
}

impl Family {
    fn bit_len(self) -> u8 {
        match self {
            Family::V4 => 32,
            Family::V6 => 128,
        }
    }
}


//------------ Helpers -------------------------------------------------------

/// Takes the addressFamily octet string of a ROAIPAddressFamily.
fn take_roa_family<S: decode::Source>(
    cons: &mut decode::Constructed<S>
) -> Result<Family, S::Err> {
    cons.take_primitive_if(Tag::OCTET_STRING, |prim| {
        let bytes = prim.take_all()?;
        match bytes.as_ref() {
            [0, 1] => Ok(Family::V4),
            [0, 2] => Ok(Family::V6),
            _ => Err(decode::Error::Malformed.into())
        }
    })
}

/// Takes an IPAddress bit string and turns it into a prefix.
fn take_prefix<S: decode::Source>(
    cons: &mut decode::Constructed<S>,
    family: Family,
) -> Result<AddressPrefix, S::Err> {
    cons.take_primitive_if(Tag::BIT_STRING, |prim| {
        let bytes = prim.take_all()?;
        let (unused, octets) = match bytes.split_first() {
            Some((unused, octets)) => (*unused, octets),
            None => return Err(decode::Error::Malformed.into())
        };
        if unused > 7 || (octets.is_empty() && unused != 0) {
            return Err(decode::Error::Malformed.into())
        }
        let len = match (octets.len() * 8).checked_sub(unused as usize) {
            Some(len) => len,
            None => return Err(decode::Error::Malformed.into())
        };
        if len > family.bit_len() as usize {
            return Err(decode::Error::Malformed.into())
        }
        let addr = match family {
            Family::V4 => {
                let mut buf = [0u8; 4];
                buf[..octets.len()].copy_from_slice(octets);
                IpAddr::V4(Ipv4Addr::from(buf))
            }
            Family::V6 => {
                let mut buf = [0u8; 16];
                buf[..octets.len()].copy_from_slice(octets);
                IpAddr::V6(Ipv6Addr::from(buf))
            }
        };
        AddressPrefix::new(addr, len as u8).map_err(|_| {
            decode::Error::Malformed.into()
        })
    })
}

/// Parses a small non-negative INTEGER into a `u8`.
fn parse_small_uint(slice: &[u8]) -> Option<u8> {
    match slice {
        [value] if value & 0x80 == 0 => Some(*value),
        _ => None
    }
}


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use bcder::Mode;

    // The DER encoding of a ROA eContent binding AS64501 to
    // 10.0.0.0/24 with maxLength 24 and 2001:db8::/32 without an
    // explicit maxLength.
    const CONTENT: &[u8] = &[
        0x30, 0x2b,                                   // SEQUENCE
        0x02, 0x03, 0x00, 0xfb, 0xf5,                 // asID 64501
        0x30, 0x24,                                   // ipAddrBlocks
        0x30, 0x11,                                   //  family v4
        0x04, 0x02, 0x00, 0x01,
        0x30, 0x0b,
        0x30, 0x09,
        0x03, 0x04, 0x00, 0x0a, 0x00, 0x00,           //   10.0.0.0/24
        0x02, 0x01, 0x18,                             //   maxLength 24
        0x30, 0x0f,                                   //  family v6
        0x04, 0x02, 0x00, 0x02,
        0x30, 0x09,
        0x30, 0x07,
        0x03, 0x05, 0x00, 0x20, 0x01, 0x0d, 0xb8,     //   2001:db8::/32
    ];

    #[test]
    fn parse_content() {
        let roa = Mode::Der.decode(
            CONTENT, RouteOriginAttestation::take_from
        ).unwrap();
        assert_eq!(roa.as_id(), AsId::from(64501));
        let prefixes: Vec<_> = roa.iter().collect();
        assert_eq!(prefixes.len(), 2);
        assert_eq!(prefixes[0].prefix().to_string(), "10.0.0.0/24");
        assert_eq!(prefixes[0].max_length(), 24);
        assert_eq!(prefixes[1].prefix().to_string(), "2001:db8::/32");
        assert_eq!(prefixes[1].max_length(), 32);
    }

    #[test]
    fn reject_bad_max_length() {
        // Same as above but with maxLength 23, smaller than the prefix
        // length.
        let mut data = CONTENT.to_vec();
        assert_eq!(data[27], 0x18);
        data[27] = 0x17;
        assert!(Mode::Der.decode(
            data.as_slice(), RouteOriginAttestation::take_from
        ).is_err());
    }
}
