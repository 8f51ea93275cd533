//! Signed objects.
//!
//! Signed objects are a strict profile of a CMS signed-data object. They
//! are specified in RFC 6488 while CMS itself lives in RFC 5652. Most of
//! the profile's requirements are enforced while parsing already; the
//! rest, together with digest and signature verification and validation
//! of the embedded EE certificate, happens in [`SignedObject::validate`].

use bcder::decode;
use bcder::{Mode, OctetString, Oid, Tag};
use bytes::Bytes;
use crate::cert::{Cert, ResourceCert};
use crate::crypto::{DigestAlgorithm, KeyIdentifier, SignatureAlgorithm};
use crate::x509::{update_once, Time, ValidationError};


//------------ SignedObject --------------------------------------------------

/// A signed object.
#[derive(Clone, Debug)]
pub struct SignedObject {
    content_type: Oid<Bytes>,
    content: OctetString,
    cert: Cert,
    signer_info: SignerInfo,
}

impl SignedObject {
    /// Decodes a signed object from a source.
    ///
    /// Signed objects are BER encoded in the wild, so we decode them in
    /// BER mode.
    pub fn decode<S: decode::Source>(source: S) -> Result<Self, S::Err> {
        Mode::Ber.decode(source, Self::take_from)
    }

    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, S::Err> {
        cons.take_sequence(|cons| {
            oid::SIGNED_DATA.skip_if(cons)?; // contentType
            cons.take_constructed_if(Tag::CTX_0, Self::take_signed_data)
        })
    }

    /// Parses a SignedData value.
    ///
    /// ```text
    /// SignedData ::= SEQUENCE {
    ///     version CMSVersion,
    ///     digestAlgorithms DigestAlgorithmIdentifiers,
    ///     encapContentInfo EncapsulatedContentInfo,
    ///     certificates [0] IMPLICIT CertificateSet OPTIONAL,
    ///     crls [1] IMPLICIT RevocationInfoChoices OPTIONAL,
    ///     signerInfos SignerInfos }
    /// ```
    ///
    /// `version` must be 3, `certificates` present and `crls` not.
    fn take_signed_data<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, S::Err> {
        cons.take_sequence(|cons| {
            cons.skip_u8_if(3)?; // version -- must be 3
            DigestAlgorithm::take_set_from(cons)?; // digestAlgorithms
            let (content_type, content)
                = Self::take_encap_content_info(cons)?;
            let cert = Self::take_certificates(cons)?;
            let signer_info = SignerInfo::take_set_from(cons)?;
            Ok(SignedObject {
                content_type, content, cert, signer_info
            })
        })
    }

    /// Parses an EncapsulatedContentInfo value.
    ///
    /// ```text
    /// EncapsulatedContentInfo ::= SEQUENCE {
    ///       eContentType ContentType,
    ///       eContent [0] EXPLICIT OCTET STRING OPTIONAL }
    /// ```
    ///
    /// The eContent must be present.
    fn take_encap_content_info<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<(Oid<Bytes>, OctetString), S::Err> {
        cons.take_sequence(|cons| {
            Ok((
                Oid::take_from(cons)?,
                cons.take_constructed_if(
                    Tag::CTX_0,
                    OctetString::take_from
                )?
            ))
        })
    }

    /// Parses the certificates field of a SignedData value.
    ///
    /// The field is `[0] IMPLICIT CertificateSet`. RFC 6488 limits the
    /// set to exactly one certificate which must be the Certificate
    /// choice, encoded as a plain sequence.
    fn take_certificates<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Cert, S::Err> {
        cons.take_constructed_if(Tag::CTX_0, |cons| {
            cons.take_constructed(|tag, cons| {
                match tag {
                    Tag::SEQUENCE => Cert::take_content_from(cons),
                    _ => Err(decode::Error::Unimplemented.into())
                }
            })
        })
    }

    /// Returns a reference to the object's content type.
    pub fn content_type(&self) -> &Oid<Bytes> {
        &self.content_type
    }

    /// Returns a reference to the object's raw content.
    pub fn content(&self) -> &OctetString {
        &self.content
    }

    /// Decodes the object's content with the given operation.
    ///
    /// RFC 6488 requires the eContent to be DER encoded.
    pub fn decode_content<F, T>(&self, op: F) -> Result<T, decode::Error>
    where F: FnOnce(
        &mut decode::Constructed<Bytes>
    ) -> Result<T, decode::Error> {
        Mode::Der.decode(self.content.to_bytes(), op)
    }

    /// Returns a reference to the embedded certificate.
    pub fn cert(&self) -> &Cert {
        &self.cert
    }

    /// Validates the signed object.
    ///
    /// The requirements for an object to be valid are given in section 3
    /// of RFC 6488. Upon success, the method returns the validated EE
    /// certificate.
    pub fn validate(
        &self, issuer: &ResourceCert, strict: bool
    ) -> Result<ResourceCert, ValidationError> {
        self.verify_compliance()?;
        self.verify_signature()?;
        self.cert.clone().validate_ee(issuer, strict)
    }

    /// Validates that the object complies with the profile.
    ///
    /// This is item 1 of RFC 6488's section 3; the sub-items not listed
    /// here have been enforced during parsing already.
    fn verify_compliance(&self) -> Result<(), ValidationError> {
        // c. The EE certificate's SubjectKeyIdentifier matches the sid
        //    field of the SignerInfo.
        if self.signer_info.sid != self.cert.subject_key_identifier() {
            return Err(ValidationError::Invalid)
        }
        // h. The eContentType equals the content-type signed attribute.
        if self.content_type
            != self.signer_info.signed_attrs.content_type
        {
            return Err(ValidationError::Invalid)
        }
        Ok(())
    }

    /// Verifies the signature of the object.
    ///
    /// This is item 2 of RFC 6488's section 3: the message-digest
    /// attribute must match the content and the signature must verify
    /// with the EE certificate's key over the DER encoding of the signed
    /// attributes.
    fn verify_signature(&self) -> Result<(), ValidationError> {
        let digest = DigestAlgorithm::Sha256.digest(
            self.content.to_bytes().as_ref()
        );
        if digest.as_ref()
            != self.signer_info.signed_attrs.message_digest.as_ref()
        {
            return Err(ValidationError::Invalid)
        }
        let msg = self.signer_info.signed_attrs.encode_verify();
        self.cert.subject_public_key_info().verify(
            &msg, self.signer_info.signature.as_ref()
        ).map_err(Into::into)
    }
}


//------------ SignerInfo ----------------------------------------------------

/// The single SignerInfo of a signed object.
#[derive(Clone, Debug)]
pub struct SignerInfo {
    sid: KeyIdentifier,
    digest_algorithm: DigestAlgorithm,
    signed_attrs: SignedAttributes,
    signature_algorithm: SignatureAlgorithm,
    signature: Bytes,
}

impl SignerInfo {
    /// Parses the SignerInfos set which must hold exactly one value.
    pub fn take_set_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, S::Err> {
        cons.take_constructed_if(Tag::SET, Self::take_from)
    }

    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, S::Err> {
        cons.take_sequence(|cons| {
            cons.skip_u8_if(3)?; // version -- must be 3
            Ok(SignerInfo {
                sid: cons.take_primitive_if(Tag::CTX_0, |prim| {
                    let bytes = prim.take_all()?;
                    KeyIdentifier::from_slice(bytes.as_ref()).ok_or_else(
                        || decode::Error::Malformed.into()
                    )
                })?,
                digest_algorithm: DigestAlgorithm::take_from(cons)?,
                signed_attrs: SignedAttributes::take_from(cons)?,
                signature_algorithm:
                    SignatureAlgorithm::cms_take_from(cons)?,
                signature: cons.take_primitive_if(
                    Tag::OCTET_STRING, |prim| prim.take_all()
                )?,
            })
        })
    }

    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest_algorithm
    }

    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        self.signature_algorithm
    }
}


//------------ SignedAttributes ----------------------------------------------

/// The signed attributes of a signed object.
///
/// RFC 6488 limits them to content-type and message-digest, which must be
/// present, and signing-time and binary-signing-time.
#[derive(Clone, Debug)]
pub struct SignedAttributes {
    /// The raw content of the attribute sequence.
    ///
    /// This is kept because the signature is calculated over the
    /// attributes with the implicit [0] tag replaced by an explicit SET
    /// OF.
    raw: Bytes,

    message_digest: Bytes,
    content_type: Oid<Bytes>,
    signing_time: Option<Time>,
    binary_signing_time: Option<u64>,
}

impl SignedAttributes {
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, S::Err> {
        let raw = cons.take_constructed_if(Tag::CTX_0, |cons| {
            cons.capture_all()
        })?.into_bytes();
        Mode::Ber.decode(raw.clone(), |cons| {
            let mut message_digest = None;
            let mut content_type = None;
            let mut signing_time = None;
            let mut binary_signing_time = None;
            while let Some(()) = cons.take_opt_sequence(|cons| {
                let oid = Oid::take_from(cons)?;
                if oid == oid::CONTENT_TYPE {
                    update_once(&mut content_type, || {
                        cons.take_constructed_if(Tag::SET, |cons| {
                            Oid::take_from(cons)
                        })
                    })
                }
                else if oid == oid::MESSAGE_DIGEST {
                    update_once(&mut message_digest, || {
                        cons.take_constructed_if(Tag::SET, |cons| {
                            cons.take_primitive_if(
                                Tag::OCTET_STRING, |prim| prim.take_all()
                            )
                        })
                    })
                }
                else if oid == oid::SIGNING_TIME {
                    update_once(&mut signing_time, || {
                        cons.take_constructed_if(Tag::SET, Time::take_from)
                    })
                }
                else if oid == oid::AA_BINARY_SIGNING_TIME {
                    update_once(&mut binary_signing_time, || {
                        cons.take_constructed_if(Tag::SET, |cons| {
                            cons.take_u64()
                        })
                    })
                }
                else {
                    Err(decode::Error::Malformed)
                }
            })? { }
            let message_digest = match message_digest {
                Some(some) => some,
                None => return Err(decode::Error::Malformed)
            };
            let content_type = match content_type {
                Some(some) => some,
                None => return Err(decode::Error::Malformed)
            };
            Ok(SignedAttributes {
                raw,
                message_digest,
                content_type,
                signing_time,
                binary_signing_time,
            })
        }).map_err(Into::into)
    }

    pub fn signing_time(&self) -> Option<Time> {
        self.signing_time
    }

    pub fn binary_signing_time(&self) -> Option<u64> {
        self.binary_signing_time
    }

    /// Encodes the attributes for signature verification.
    ///
    /// For the signature the attributes are prefixed with an explicit
    /// SET OF tag instead of the implicit [0] they are transmitted with.
    pub fn encode_verify(&self) -> Vec<u8> {
        let len = self.raw.len();
        let mut res = Vec::with_capacity(len + 4);
        res.push(0x31); // SET
        if len < 128 {
            res.push(len as u8)
        }
        else if len < 0x1_0000 {
            res.push(0x82);
            res.push((len >> 8) as u8);
            res.push(len as u8);
        }
        else {
            res.push(0x83);
            res.push((len >> 16) as u8);
            res.push((len >> 8) as u8);
            res.push(len as u8);
        }
        res.extend_from_slice(self.raw.as_ref());
        res
    }
}


//------------ OIDs ----------------------------------------------------------

pub mod oid {
    use bcder::{ConstOid, Oid};

    pub const SIGNED_DATA: ConstOid
        = Oid(&[42, 134, 72, 134, 247, 13, 1, 7, 2]);

    pub const CONTENT_TYPE: ConstOid
        = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 3]);
    pub const MESSAGE_DIGEST: ConstOid
        = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 4]);
    pub const SIGNING_TIME: ConstOid
        = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 5]);
    pub const AA_BINARY_SIGNING_TIME: ConstOid
        = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 16, 2, 46]);

    pub const ROUTE_ORIGIN_AUTHZ: ConstOid
        = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 16, 1, 24]);
    pub const RPKI_MANIFEST: ConstOid
        = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 16, 1, 26]);
    pub const GHOSTBUSTERS: ConstOid
        = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 16, 1, 35]);
}


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encode_verify_lengths() {
        let attrs = SignedAttributes {
            raw: Bytes::from(vec![0u8; 40]),
            message_digest: Bytes::new(),
            content_type: Oid(Bytes::from_static(&[1, 2, 3])),
            signing_time: None,
            binary_signing_time: None,
        };
        let encoded = attrs.encode_verify();
        assert_eq!(&encoded[..2], &[0x31, 40]);
        assert_eq!(encoded.len(), 42);

        let attrs = SignedAttributes {
            raw: Bytes::from(vec![0u8; 300]),
            ..attrs
        };
        let encoded = attrs.encode_verify();
        assert_eq!(&encoded[..4], &[0x31, 0x82, 0x01, 0x2c]);
        assert_eq!(encoded.len(), 304);
    }
}
