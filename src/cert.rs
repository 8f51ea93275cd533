//! RPKI certificates.
//!
//! RPKI uses X.509 certificates with the profile defined in RFC 6487:
//! resource certificates carry RFC 3779 IP and AS resource extensions,
//! and router certificates (RFC 8209) bind an AS number to a BGPsec
//! router key. This module parses the profile and implements the chain
//! validation steps the validation walker performs.
//!
//! Validation never defers to an external chain verifier. Every step is
//! checked here, and the RPKI resource extensions are handled first-class
//! while any other unknown critical extension causes rejection.

use bcder::decode;
use bcder::{Mode, Oid, Tag};
use crate::crypto::{
    KeyIdentifier, PublicKey, PublicKeyFormat, SignatureAlgorithm
};
use crate::resources::{AsResources, IpResources, ResourceSet};
use crate::uri;
use crate::x509::{
    update_once, Name, SerialNumber, SignedData, Time, ValidationError,
    Validity
};


//------------ Cert ----------------------------------------------------------

/// A parsed but not yet validated RPKI certificate.
#[derive(Clone, Debug)]
pub struct Cert {
    signed_data: SignedData,

    serial_number: SerialNumber,
    issuer: Name,
    validity: Validity,
    subject: Name,
    subject_public_key_info: PublicKey,
    extensions: Extensions,
}

impl Cert {
    /// Decodes a certificate from a source.
    pub fn decode<S: decode::Source>(source: S) -> Result<Self, S::Err> {
        Mode::Der.decode(source, Self::take_from)
    }

    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, S::Err> {
        cons.take_sequence(Self::take_content_from)
    }

    /// Parses the content of a Certificate sequence.
    pub fn take_content_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, S::Err> {
        let signed_data = SignedData::take_content_from(cons)?;
        let data = signed_data.data().clone();

        Mode::Der.decode(data, |cons| {
            cons.take_sequence(|cons| {
                // version [0] EXPLICIT Version DEFAULT v1.
                //  -- we need extensions so apparently, we want v3 which,
                //     confusingly, is 2.
                cons.take_constructed_if(Tag::CTX_0, |cons| {
                    cons.skip_u8_if(2)
                })?;

                let serial_number = SerialNumber::take_from(cons)?;
                // The inner signature algorithm. RFC 5280 wants it to
                // equal the outer one.
                SignatureAlgorithm::take_from(cons)?;
                Ok(Cert {
                    signed_data,
                    serial_number,
                    issuer: Name::take_from(cons)?,
                    validity: Validity::take_from(cons)?,
                    subject: Name::take_from(cons)?,
                    subject_public_key_info: PublicKey::take_from(cons)?,
                    extensions: cons.take_constructed_if(
                        Tag::CTX_3,
                        Extensions::take_from
                    )?,
                })
            })
        }).map_err(Into::into)
    }

    pub fn serial_number(&self) -> &SerialNumber {
        &self.serial_number
    }

    pub fn subject_public_key_info(&self) -> &PublicKey {
        &self.subject_public_key_info
    }

    pub fn subject_key_identifier(&self) -> KeyIdentifier {
        self.extensions.subject_key_id
    }

    pub fn validity(&self) -> Validity {
        self.validity
    }

    /// Returns whether this is a CA or EE certificate.
    pub fn key_usage(&self) -> KeyUsage {
        self.extensions.key_usage
    }

    pub fn crl_uri(&self) -> Option<&uri::Rsync> {
        self.extensions.crl_uri.as_ref()
    }

    pub fn ca_issuer(&self) -> Option<&uri::Rsync> {
        self.extensions.ca_issuer.as_ref()
    }

    pub fn ca_repository(&self) -> Option<&uri::Rsync> {
        self.extensions.ca_repository.as_ref()
    }

    pub fn rpki_manifest(&self) -> Option<&uri::Rsync> {
        self.extensions.rpki_manifest.as_ref()
    }
}

/// # Validation
///
impl Cert {
    /// Validates the certificate as a trust anchor.
    ///
    /// A trust anchor is self-signed and must carry literal, non-empty
    /// resources. The caller has already checked that the subject key
    /// matches the TAL.
    pub fn validate_ta(
        self, strict: bool
    ) -> Result<ResourceCert, ValidationError> {
        self.validate_basics(strict)?;
        self.validate_ca_basics(strict)?;

        // A trust anchor is self-issued: if an authority key identifier
        // is present, it must match the subject key.
        if let Some(aki) = self.extensions.authority_key_id {
            if aki != self.extensions.subject_key_id {
                return Err(ValidationError::Invalid)
            }
        }
        if self.issuer != self.subject {
            return Err(ValidationError::Invalid)
        }

        // Resources must be literal and non-empty.
        let resources = ResourceSet::from_ta(
            self.extensions.ip_resources.as_ref(),
            self.extensions.as_resources.as_ref(),
        )?;

        // Self-signed: the signature verifies against its own key.
        self.signed_data.verify_signature(
            &self.subject_public_key_info
        )?;

        Ok(ResourceCert { cert: self, resources })
    }

    /// Validates the certificate as an issued CA certificate.
    pub fn validate_ca(
        self, issuer: &ResourceCert, strict: bool
    ) -> Result<ResourceCert, ValidationError> {
        self.validate_basics(strict)?;
        self.validate_ca_basics(strict)?;
        self.validate_issued(issuer, strict)?;

        let resources = issuer.resources.validate_child(
            self.extensions.ip_resources.as_ref(),
            self.extensions.as_resources.as_ref(),
        )?;
        if resources.is_empty() {
            return Err(ValidationError::ResourceViolation)
        }

        self.signed_data.verify_signature(
            issuer.subject_public_key_info()
        )?;

        Ok(ResourceCert { cert: self, resources })
    }

    /// Validates the certificate as the EE certificate of a signed
    /// object.
    pub fn validate_ee(
        self, issuer: &ResourceCert, strict: bool
    ) -> Result<ResourceCert, ValidationError> {
        self.validate_basics(strict)?;
        self.validate_issued(issuer, strict)?;

        if self.extensions.basic_ca.is_some() {
            return Err(ValidationError::Invalid)
        }
        if self.extensions.key_usage != KeyUsage::Ee {
            return Err(ValidationError::Invalid)
        }
        if self.extensions.signed_object.is_none() {
            return Err(ValidationError::Invalid)
        }

        let resources = issuer.resources.validate_child(
            self.extensions.ip_resources.as_ref(),
            self.extensions.as_resources.as_ref(),
        )?;

        self.signed_data.verify_signature(
            issuer.subject_public_key_info()
        )?;

        Ok(ResourceCert { cert: self, resources })
    }

    /// Validates the certificate as a BGPsec router certificate.
    ///
    /// Per RFC 8209, a router certificate is an EE certificate with the
    /// BGPsec router extended key usage, an ECDSA P-256 key, AS resources
    /// and no IP resources.
    pub fn validate_router(
        self, issuer: &ResourceCert, strict: bool
    ) -> Result<ResourceCert, ValidationError> {
        self.validate_basics(strict)?;
        self.validate_issued(issuer, strict)?;

        if self.extensions.basic_ca.is_some()
            || self.extensions.key_usage != KeyUsage::Ee
        {
            return Err(ValidationError::Invalid)
        }
        if !self.extensions.has_router_eku {
            return Err(ValidationError::Invalid)
        }
        if self.subject_public_key_info.algorithm()
            != PublicKeyFormat::EcdsaP256
        {
            return Err(ValidationError::Invalid)
        }
        if self.extensions.ip_resources.is_some() {
            return Err(ValidationError::ResourceViolation)
        }
        if self.extensions.as_resources.is_none() {
            return Err(ValidationError::ResourceViolation)
        }

        let resources = issuer.resources.validate_child(
            None,
            self.extensions.as_resources.as_ref(),
        )?;
        if resources.asn().is_empty() {
            return Err(ValidationError::ResourceViolation)
        }

        self.signed_data.verify_signature(
            issuer.subject_public_key_info()
        )?;

        Ok(ResourceCert { cert: self, resources })
    }

    /// Checks the parts every certificate must get right.
    fn validate_basics(
        &self, _strict: bool
    ) -> Result<(), ValidationError> {
        self.validity.validate_at(Time::now())?;

        // The subject key identifier must be the hash of the key.
        if self.extensions.subject_key_id
            != self.subject_public_key_info.key_identifier()
        {
            return Err(ValidationError::Invalid)
        }
        Ok(())
    }

    /// Checks the requirements for a CA certificate.
    fn validate_ca_basics(
        &self, _strict: bool
    ) -> Result<(), ValidationError> {
        // 4.8.1. of RFC 6487: The cA boolean must be present and set.
        if self.extensions.basic_ca != Some(true) {
            return Err(ValidationError::Invalid)
        }
        if self.extensions.key_usage != KeyUsage::Ca {
            return Err(ValidationError::Invalid)
        }
        // A CA certificate must tell us where its products live and
        // where its manifest is.
        if self.extensions.ca_repository.is_none()
            || self.extensions.rpki_manifest.is_none()
        {
            return Err(ValidationError::Invalid)
        }
        Ok(())
    }

    /// Checks the requirements of a certificate issued by `issuer`.
    fn validate_issued(
        &self, issuer: &ResourceCert, _strict: bool
    ) -> Result<(), ValidationError> {
        // The authority key identifier must be present and match the
        // issuer's subject key.
        match self.extensions.authority_key_id {
            Some(aki) if aki == issuer.subject_key_identifier() => { }
            _ => return Err(ValidationError::Invalid)
        }
        if self.issuer != issuer.cert.subject {
            return Err(ValidationError::Invalid)
        }
        // Issued certificates must say where their CRL lives.
        if self.extensions.crl_uri.is_none() {
            return Err(ValidationError::Invalid)
        }
        Ok(())
    }
}


//------------ KeyUsage ------------------------------------------------------

/// Whether a certificate is a CA or an end entity certificate.
///
/// In CA certificates, keyCertSign and cRLSign must be set; in EE
/// certificates, digitalSignature must be set. The key usage extension
/// therefore boils down to this choice.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyUsage {
    Ca,
    Ee,
}


//------------ ResourceCert --------------------------------------------------

/// A validated certificate with its resolved resources.
///
/// The resources are always literal: any inherit choice was resolved
/// against the issuer when the value was created.
#[derive(Clone, Debug)]
pub struct ResourceCert {
    cert: Cert,
    resources: ResourceSet,
}

impl ResourceCert {
    pub fn resources(&self) -> &ResourceSet {
        &self.resources
    }

    pub fn subject_public_key_info(&self) -> &PublicKey {
        self.cert.subject_public_key_info()
    }

    pub fn subject_key_identifier(&self) -> KeyIdentifier {
        self.cert.subject_key_identifier()
    }

    pub fn serial_number(&self) -> &SerialNumber {
        self.cert.serial_number()
    }

    pub fn validity(&self) -> Validity {
        self.cert.validity()
    }

    pub fn crl_uri(&self) -> Option<&uri::Rsync> {
        self.cert.crl_uri()
    }

    pub fn ca_repository(&self) -> Option<&uri::Rsync> {
        self.cert.ca_repository()
    }

    pub fn rpki_manifest(&self) -> Option<&uri::Rsync> {
        self.cert.rpki_manifest()
    }
}


//------------ Extensions ----------------------------------------------------

#[derive(Clone, Debug)]
struct Extensions {
    /// Basic Constraints.
    ///
    /// Present in CA certificates with the cA boolean set, absent in EE
    /// certificates. See 4.8.1 of RFC 6487.
    basic_ca: Option<bool>,

    /// Subject Key Identifier.
    subject_key_id: KeyIdentifier,

    /// Authority Key Identifier.
    authority_key_id: Option<KeyIdentifier>,

    /// Key Usage, reduced to the CA/EE choice.
    key_usage: KeyUsage,

    /// Whether an Extended Key Usage extension with the BGPsec router
    /// purpose is present.
    has_router_eku: bool,

    /// The rsync URI from the CRL Distribution Points extension.
    crl_uri: Option<uri::Rsync>,

    /// The rsync URI of the issuing CA's certificate from the AIA
    /// extension.
    ca_issuer: Option<uri::Rsync>,

    /// The id-ad-caRepository URI from the SIA extension.
    ca_repository: Option<uri::Rsync>,

    /// The id-ad-rpkiManifest URI from the SIA extension.
    rpki_manifest: Option<uri::Rsync>,

    /// The id-ad-signedObject URI from the SIA extension.
    signed_object: Option<uri::Rsync>,

    /// IP Resources.
    ip_resources: Option<IpResources>,

    /// AS Resources.
    as_resources: Option<AsResources>,
}

impl Extensions {
    fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, S::Err> {
        cons.take_sequence(|cons| {
            let mut basic_ca = None;
            let mut subject_key_id = None;
            let mut authority_key_id = None;
            let mut key_usage = None;
            let mut eku = None;
            let mut crl_uri = None;
            let mut ca_issuer = None;
            let mut sia = None;
            let mut certificate_policies = None;
            let mut ip_resources = None;
            let mut as_resources = None;
            while let Some(()) = cons.take_opt_sequence(|cons| {
                let id = Oid::take_from(cons)?;
                let critical = cons.take_opt_bool()?.unwrap_or(false);
                let value = bcder::OctetString::take_from(cons)?;
                Mode::Der.decode(value.to_bytes(), |cons| {
                    if id == oid::CE_BASIC_CONSTRAINTS {
                        Self::take_basic_ca(cons, &mut basic_ca)
                    }
                    else if id == oid::CE_SUBJECT_KEY_IDENTIFIER {
                        Self::take_subject_key_identifier(
                            cons, &mut subject_key_id
                        )
                    }
                    else if id == oid::CE_AUTHORITY_KEY_IDENTIFIER {
                        Self::take_authority_key_identifier(
                            cons, &mut authority_key_id
                        )
                    }
                    else if id == oid::CE_KEY_USAGE {
                        Self::take_key_usage(cons, &mut key_usage)
                    }
                    else if id == oid::CE_EXTENDED_KEY_USAGE {
                        Self::take_extended_key_usage(cons, &mut eku)
                    }
                    else if id == oid::CE_CRL_DISTRIBUTION_POINTS {
                        Self::take_crl_distribution_points(
                            cons, &mut crl_uri
                        )
                    }
                    else if id == oid::PE_AUTHORITY_INFO_ACCESS {
                        Self::take_authority_info_access(
                            cons, &mut ca_issuer
                        )
                    }
                    else if id == oid::PE_SUBJECT_INFO_ACCESS {
                        Self::take_subject_info_access(cons, &mut sia)
                    }
                    else if id == oid::CE_CERTIFICATE_POLICIES {
                        Self::take_certificate_policies(
                            cons, &mut certificate_policies
                        )
                    }
                    else if id == oid::PE_IP_ADDR_BLOCK {
                        update_once(&mut ip_resources, || {
                            IpResources::take_from(cons)
                        })
                    }
                    else if id == oid::PE_AUTONOMOUS_SYS_IDS {
                        update_once(&mut as_resources, || {
                            AsResources::take_from(cons)
                        })
                    }
                    else if critical {
                        // RFC 6487 names the full set of extensions an
                        // RPKI certificate may carry. Anything else that
                        // is critical sinks the certificate.
                        Err(decode::Error::Malformed)
                    }
                    else {
                        // RFC 5280 says we can ignore non-critical
                        // extensions we don't know of.
                        cons.skip_all()
                    }
                })?;
                Ok(())
            })? { }
            if ip_resources.is_none() && as_resources.is_none() {
                return Err(decode::Error::Malformed.into())
            }
            if certificate_policies.is_none() {
                return Err(decode::Error::Malformed.into())
            }
            let sia = sia.unwrap_or_default();
            Ok(Extensions {
                basic_ca,
                subject_key_id: subject_key_id.ok_or(
                    decode::Error::Malformed
                )?,
                authority_key_id,
                key_usage: key_usage.ok_or(decode::Error::Malformed)?,
                has_router_eku: eku.unwrap_or(false),
                crl_uri,
                ca_issuer,
                ca_repository: sia.ca_repository,
                rpki_manifest: sia.rpki_manifest,
                signed_object: sia.signed_object,
                ip_resources,
                as_resources,
            })
        })
    }

    /// Parses the Basic Constraints extension.
    ///
    /// ```text
    ///   BasicConstraints ::= SEQUENCE {
    ///        cA                      BOOLEAN DEFAULT FALSE,
    ///        pathLenConstraint       INTEGER (0..MAX) OPTIONAL }
    /// ```
    ///
    /// The pathLenConstraint field must not be present.
    fn take_basic_ca<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
        basic_ca: &mut Option<bool>,
    ) -> Result<(), S::Err> {
        update_once(basic_ca, || {
            match cons.take_sequence(|cons| cons.take_opt_bool())? {
                Some(res) => Ok(res),
                None => Ok(false)
            }
        })
    }

    /// Parses the Subject Key Identifier extension.
    ///
    /// The extension must be present and contain the 160 bit SHA-1 hash
    /// of the value of the DER-encoded bit string of the subject public
    /// key.
    fn take_subject_key_identifier<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
        subject_key_id: &mut Option<KeyIdentifier>,
    ) -> Result<(), S::Err> {
        update_once(subject_key_id, || {
            take_key_identifier(cons)
        })
    }

    /// Parses the Authority Key Identifier extension.
    ///
    /// ```text
    /// AuthorityKeyIdentifier ::= SEQUENCE {
    ///   keyIdentifier             [0] KeyIdentifier           OPTIONAL,
    ///   authorityCertIssuer       [1] GeneralNames            OPTIONAL,
    ///   authorityCertSerialNumber [2] CertificateSerialNumber OPTIONAL }
    /// ```
    ///
    /// Only keyIdentifier may be present.
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

    /// Parses the Key Usage extension.
    ///
    /// In CA certificates, keyCertSign (5) and cRLSign (6) must be set;
    /// in EE certificates, digitalSignature (0) must be set.
    fn take_key_usage<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
        key_usage: &mut Option<KeyUsage>,
    ) -> Result<(), S::Err> {
        update_once(key_usage, || {
            let bits = bcder::BitString::take_from(cons)?;
            if bits.bit(5) && bits.bit(6) {
                Ok(KeyUsage::Ca)
            }
            else if bits.bit(0) {
                Ok(KeyUsage::Ee)
            }
            else {
                Err(decode::Error::Malformed.into())
            }
        })
    }

    /// Parses the Extended Key Usage extension.
    ///
    /// Only present in router certificates, where it must contain the
    /// id-kp-bgpsec-router purpose.
    fn take_extended_key_usage<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
        eku: &mut Option<bool>,
    ) -> Result<(), S::Err> {
        update_once(eku, || {
            cons.take_sequence(|cons| {
                let mut router = false;
                let mut any = false;
                while let Some(oid) = cons.take_opt_primitive_if(
                    Tag::OID, |prim| prim.take_all()
                )? {
                    any = true;
                    if Oid(oid.as_ref()) == oid::KP_BGPSEC_ROUTER {
                        router = true;
                    }
                }
                if !any {
                    return Err(decode::Error::Malformed.into())
                }
                Ok(router)
            })
        })
    }

    /// Parses the CRL Distribution Points extension.
    ///
    /// It must contain exactly one distribution point whose name is the
    /// fullName choice with at least one URI; we pick the first rsync
    /// one.
    fn take_crl_distribution_points<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
        crl_uri: &mut Option<uri::Rsync>,
    ) -> Result<(), S::Err> {
        update_once(crl_uri, || {
            cons.take_sequence(|cons| {
                cons.take_sequence(|cons| {
                    cons.take_constructed_if(Tag::CTX_0, |cons| {
                        cons.take_constructed_if(Tag::CTX_0, |cons| {
                            let mut res = None;
                            let mut any = false;
                            while let Some(uri)
                                = take_opt_uri_general_name(cons)?
                            {
                                any = true;
                                if res.is_none() {
                                    res = uri;
                                }
                            }
                            if !any {
                                return Err(
                                    decode::Error::Malformed.into()
                                )
                            }
                            res.ok_or_else(|| {
                                decode::Error::Malformed.into()
                            })
                        })
                    })
                })
            })
        })
    }

    /// Parses the Authority Information Access extension.
    ///
    /// Must contain exactly one entry with accessMethod id-ad-caIssuers.
    fn take_authority_info_access<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
        ca_issuer: &mut Option<uri::Rsync>,
    ) -> Result<(), S::Err> {
        update_once(ca_issuer, || {
            cons.take_sequence(|cons| {
                cons.take_sequence(|cons| {
                    oid::AD_CA_ISSUERS.skip_if(cons)?;
                    match take_opt_uri_general_name(cons)? {
                        Some(Some(uri)) => Ok(uri),
                        _ => Err(decode::Error::Malformed.into())
                    }
                })
            })
        })
    }

    /// Parses the Subject Information Access extension.
    ///
    /// For CA certificates there must be id-ad-caRepository and
    /// id-ad-rpkiManifest entries, for EE certificates an
    /// id-ad-signedObject entry. Which kind we have here isn't known
    /// yet, so both mixes are collected and checked during validation.
    fn take_subject_info_access<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
        sia: &mut Option<Sia>,
    ) -> Result<(), S::Err> {
        update_once(sia, || {
            cons.take_sequence(|cons| {
                let mut res = Sia::default();
                let mut any = false;
                while let Some(()) = cons.take_opt_sequence(|cons| {
                    any = true;
                    let oid = Oid::take_from(cons)?;
                    let uri = take_opt_uri_general_name(cons)?;
                    let uri = match uri {
                        Some(uri) => uri,
                        None => {
                            // Some other general name form. Skip it.
                            cons.skip_all()?;
                            return Ok(())
                        }
                    };
                    if oid == oid::AD_CA_REPOSITORY {
                        if res.signed_object.is_some() {
                            return Err(decode::Error::Malformed.into())
                        }
                        if res.ca_repository.is_none() {
                            res.ca_repository = uri;
                        }
                    }
                    else if oid == oid::AD_RPKI_MANIFEST {
                        if res.signed_object.is_some() {
                            return Err(decode::Error::Malformed.into())
                        }
                        if res.rpki_manifest.is_none() {
                            res.rpki_manifest = uri;
                        }
                    }
                    else if oid == oid::AD_SIGNED_OBJECT {
                        if res.ca_repository.is_some()
                            || res.rpki_manifest.is_some()
                        {
                            return Err(decode::Error::Malformed.into())
                        }
                        if res.signed_object.is_none() {
                            res.signed_object = uri;
                        }
                    }
                    Ok(())
                })? { }
                if !any {
                    return Err(decode::Error::Malformed.into())
                }
                Ok(res)
            })
        })
    }

    /// Parses the Certificate Policies extension.
    ///
    /// Must be present; the content is not further evaluated.
    fn take_certificate_policies<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
        certificate_policies: &mut Option<()>,
    ) -> Result<(), S::Err> {
        update_once(certificate_policies, || {
            cons.take_sequence(|cons| cons.skip_all())
        })
    }
}


//------------ Sia -----------------------------------------------------------

/// The collected URIs of a Subject Information Access extension.
#[derive(Clone, Debug, Default)]
struct Sia {
    ca_repository: Option<uri::Rsync>,
    rpki_manifest: Option<uri::Rsync>,
    signed_object: Option<uri::Rsync>,
}


//------------ Helpers -------------------------------------------------------

/// Takes a key identifier wrapped in an OCTET STRING.
fn take_key_identifier<S: decode::Source>(
    cons: &mut decode::Constructed<S>
) -> Result<KeyIdentifier, S::Err> {
    cons.take_primitive_if(Tag::OCTET_STRING, |prim| {
        let bytes = prim.take_all()?;
        KeyIdentifier::from_slice(bytes.as_ref()).ok_or_else(|| {
            decode::Error::Malformed.into()
        })
    })
}

/// Takes an optional uniformResourceIdentifier general name.
///
/// Returns `Ok(None)` if the next value is not a [6] IA5String at all,
/// `Ok(Some(None))` if it is one but doesn't hold an rsync URI we would
/// accept, and `Ok(Some(Some(uri)))` otherwise.
#[allow(clippy::option_option)]
fn take_opt_uri_general_name<S: decode::Source>(
    cons: &mut decode::Constructed<S>
) -> Result<Option<Option<uri::Rsync>>, S::Err> {
    cons.take_opt_primitive_if(Tag::CTX_6, |prim| {
        let bytes = prim.take_all()?;
        if !bytes.is_ascii() {
            return Err(decode::Error::Malformed.into())
        }
        Ok(uri::Rsync::from_slice(bytes.as_ref()).ok())
    })
}


//------------ OIDs ----------------------------------------------------------

mod oid {
    use bcder::{ConstOid, Oid};

    pub const AD_CA_ISSUERS: ConstOid = Oid(&[43, 6, 1, 5, 5, 7, 48, 2]);
    pub const AD_CA_REPOSITORY: ConstOid
        = Oid(&[43, 6, 1, 5, 5, 7, 48, 5]);
    pub const AD_RPKI_MANIFEST: ConstOid
        = Oid(&[43, 6, 1, 5, 5, 7, 48, 10]);
    pub const AD_SIGNED_OBJECT: ConstOid
        = Oid(&[43, 6, 1, 5, 5, 7, 48, 11]);
    pub const CE_SUBJECT_KEY_IDENTIFIER: ConstOid = Oid(&[85, 29, 14]);
    pub const CE_KEY_USAGE: ConstOid = Oid(&[85, 29, 15]);
    pub const CE_BASIC_CONSTRAINTS: ConstOid = Oid(&[85, 29, 19]);
    pub const CE_CRL_DISTRIBUTION_POINTS: ConstOid = Oid(&[85, 29, 31]);
    pub const CE_CERTIFICATE_POLICIES: ConstOid = Oid(&[85, 29, 32]);
    pub const CE_AUTHORITY_KEY_IDENTIFIER: ConstOid = Oid(&[85, 29, 35]);
    pub const CE_EXTENDED_KEY_USAGE: ConstOid = Oid(&[85, 29, 37]);
    pub const PE_AUTHORITY_INFO_ACCESS: ConstOid
        = Oid(&[43, 6, 1, 5, 5, 7, 1, 1]);
    pub const PE_IP_ADDR_BLOCK: ConstOid = Oid(&[43, 6, 1, 5, 5, 7, 1, 7]);
    pub const PE_AUTONOMOUS_SYS_IDS: ConstOid
        = Oid(&[43, 6, 1, 5, 5, 7, 1, 8]);
    pub const PE_SUBJECT_INFO_ACCESS: ConstOid
        = Oid(&[43, 6, 1, 5, 5, 7, 1, 11]);
    pub const KP_BGPSEC_ROUTER: ConstOid
        = Oid(&[43, 6, 1, 5, 5, 7, 3, 30]);
}
