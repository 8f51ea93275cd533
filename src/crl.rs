//! Certificate revocation lists.
//!
//! Each CA issues exactly one CRL for the certificates it signs. The
//! profile from RFC 6487 restricts CRLs quite a bit: version 2, no entry
//! extensions, and only the authority key identifier and CRL number list
//! extensions.

use bcder::decode;
use bcder::{Mode, Oid, Tag};
use crate::crypto::{KeyIdentifier, PublicKey, SignatureAlgorithm};
use crate::x509::{
    update_once, Name, SerialNumber, SignedData, Time, ValidationError
};


//------------ Crl -----------------------------------------------------------

/// A certificate revocation list.
#[derive(Clone, Debug)]
pub struct Crl {
    signed_data: SignedData,

    issuer: Name,
    this_update: Time,
    next_update: Option<Time>,
    revoked: Vec<SerialNumber>,
    authority_key_id: KeyIdentifier,
}

impl Crl {
    pub fn decode<S: decode::Source>(source: S) -> Result<Self, S::Err> {
        Mode::Der.decode(source, Self::take_from)
    }

    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, S::Err> {
        cons.take_sequence(Self::take_content_from)
    }

    pub fn take_content_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, S::Err> {
        let signed_data = SignedData::take_content_from(cons)?;
        let data = signed_data.data().clone();

        Mode::Der.decode(data, |cons| {
            cons.take_sequence(|cons| {
                cons.skip_u8_if(1)?; // v2 => 1
                SignatureAlgorithm::take_from(cons)?;
                let issuer = Name::take_from(cons)?;
                let this_update = Time::take_from(cons)?;
                let next_update = Time::take_opt_from(cons)?;
                let revoked = Self::take_revoked(cons)?;
                let authority_key_id = cons.take_constructed_if(
                    Tag::CTX_0, Extensions::take_from
                )?;
                Ok(Crl {
                    signed_data,
                    issuer,
                    this_update,
                    next_update,
                    revoked,
                    authority_key_id,
                })
            })
        }).map_err(Into::into)
    }

    /// Parses the revokedCertificates list.
    ///
    /// The whole list is optional and missing means nothing is revoked.
    /// Entry extensions are forbidden by RFC 6487.
    fn take_revoked<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Vec<SerialNumber>, S::Err> {
        let res = cons.take_opt_sequence(|cons| {
            let mut res = Vec::new();
            while let Some(serial) = cons.take_opt_sequence(|cons| {
                let serial = SerialNumber::take_from(cons)?;
                Time::take_from(cons)?; // revocationDate
                Ok(serial)
            })? {
                res.push(serial)
            }
            Ok(res)
        })?;
        Ok(res.unwrap_or_default())
    }

    pub fn authority_key_identifier(&self) -> KeyIdentifier {
        self.authority_key_id
    }

    pub fn issuer(&self) -> &Name {
        &self.issuer
    }

    pub fn this_update(&self) -> Time {
        self.this_update
    }

    /// Validates the CRL against the issuing CA's public key.
    pub fn validate(
        &self, key: &PublicKey
    ) -> Result<(), ValidationError> {
        if self.authority_key_id != key.key_identifier() {
            return Err(ValidationError::Invalid)
        }
        self.signed_data.verify_signature(key)
    }

    /// Returns whether the CRL's update window has passed.
    ///
    /// A missing nextUpdate field counts as stale since we cannot know
    /// whether the list is still current.
    pub fn is_stale(&self) -> bool {
        match self.next_update {
            Some(time) => time < Time::now(),
            None => true,
        }
    }

    /// Returns whether the given serial number is revoked.
    pub fn contains(&self, serial: &SerialNumber) -> bool {
        self.revoked.iter().any(|item| item == serial)
    }
}


//------------ Extensions ----------------------------------------------------

/// The extensions of a CRL.
///
/// Only the authority key identifier and the CRL number are allowed, and
/// both must be present. We keep the key identifier and check the number
/// for well-formedness only.
struct Extensions;

impl Extensions {
    fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<KeyIdentifier, S::Err> {
        cons.take_sequence(|cons| {
            let mut authority_key_id = None;
            let mut crl_number = None;
            while let Some(()) = cons.take_opt_sequence(|cons| {
                let id = Oid::take_from(cons)?;
                let _critical = cons.take_opt_bool()?.unwrap_or(false);
                let value = bcder::OctetString::take_from(cons)?;
                Mode::Der.decode(value.to_bytes(), |cons| {
                    if id == oid::CE_AUTHORITY_KEY_IDENTIFIER {
                        Self::take_authority_key_identifier(
                            cons, &mut authority_key_id
                        )
                    }
                    else if id == oid::CE_CRL_NUMBER {
                        update_once(&mut crl_number, || {
                            SerialNumber::take_from(cons)
                        })
                    }
                    else {
                        // RFC 6487 says that no other extensions are
                        // allowed, not even non-critical ones.
                        Err(decode::Error::Malformed)
                    }
                })?;
                Ok(())
            })? { }
            if crl_number.is_none() {
                return Err(decode::Error::Malformed.into())
            }
            authority_key_id.ok_or_else(|| {
                decode::Error::Malformed.into()
            })
        })
    }

    fn take_authority_key_identifier<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
        authority_key_id: &mut Option<KeyIdentifier>,
    ) -> Result<(), S::Err> {
        update_once(authority_key_id, || {
            cons.take_sequence(|cons| {
                cons.take_primitive_if(Tag::CTX_0, |prim| {
                    let bytes = prim.take_all()?;
                    KeyIdentifier::from_slice(bytes.as_ref()).ok_or_else(
                        || decode::Error::Malformed.into()
                    )
                })
            })
        })
    }
}


//------------ OIDs ----------------------------------------------------------

mod oid {
    use bcder::{ConstOid, Oid};

    pub const CE_CRL_NUMBER: ConstOid = Oid(&[85, 29, 20]);
    pub const CE_AUTHORITY_KEY_IDENTIFIER: ConstOid = Oid(&[85, 29, 35]);
}
