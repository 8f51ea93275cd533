//! Cryptographic primitives.
//!
//! This module wraps everything the validation code needs from actual
//! cryptography: message digests, public keys with their identifiers, and
//! signature verification. The heavy lifting is done by ring; this module
//! limits the accepted algorithms to those the RPKI profiles allow and
//! keys the lookup by object identifier.

use std::{fmt, io};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use bcder::decode;
use bcder::{Mode, Oid, Tag};
use bytes::Bytes;
use ring::digest;
use ring::signature::UnparsedPublicKey;


//------------ DigestAlgorithm -----------------------------------------------

/// A message digest algorithm.
///
/// SHA-256 is the only algorithm any current RPKI profile allows. Every
/// other object identifier fails decoding, which rejects the object using
/// it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DigestAlgorithm {
    Sha256,
}

impl DigestAlgorithm {
    /// Takes a digest algorithm identifier from a constructed value.
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, S::Err> {
        cons.take_sequence(Self::take_content_from)
    }

    pub fn take_opt_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Option<Self>, S::Err> {
        cons.take_opt_sequence(Self::take_content_from)
    }

    fn take_content_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, S::Err> {
        oid::SHA256.skip_if(cons)?;
        skip_opt_null(cons)?;
        Ok(DigestAlgorithm::Sha256)
    }

    /// Parses a SET OF DigestAlgorithmIdentifiers.
    ///
    /// This is used in the digestAlgorithms field of the SignedData
    /// container. Section 2.1.2 of RFC 6488 requires there to be exactly
    /// one element chosen from the allowed values.
    pub fn take_set_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, S::Err> {
        cons.take_constructed_if(Tag::SET, |cons| {
            let res = Self::take_from(cons)?;
            if Self::take_opt_from(cons)?.is_some() {
                return Err(decode::Error::Malformed.into())
            }
            Ok(res)
        })
    }

    /// Returns the digest of the given data.
    pub fn digest(self, data: &[u8]) -> digest::Digest {
        digest::digest(&digest::SHA256, data)
    }

    /// Returns a context for incremental digest calculation.
    pub fn start(self) -> digest::Context {
        digest::Context::new(&digest::SHA256)
    }

    /// Returns the digest of a file's content.
    ///
    /// The file is read in fixed-size blocks so memory use stays bounded
    /// no matter how large the object is.
    pub fn digest_file(
        self, path: &Path
    ) -> Result<digest::Digest, io::Error> {
        let mut file = File::open(path)?;
        let mut context = self.start();
        let mut buf = [0u8; 0x10000];
        loop {
            let read = file.read(&mut buf)?;
            if read == 0 {
                break
            }
            context.update(&buf[..read]);
        }
        Ok(context.finish())
    }

    /// The length of a digest produced by this algorithm.
    pub fn digest_len(self) -> usize {
        32
    }
}


//------------ SignatureAlgorithm --------------------------------------------

/// A signature algorithm identifier.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignatureAlgorithm {
    /// RSA PKCS#1 v1.5 with SHA-256, the RPKI default.
    Sha256WithRsaEncryption,

    /// ECDSA on P-256 with SHA-256, used by BGPsec router certificates.
    EcdsaWithSha256,
}

impl SignatureAlgorithm {
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, S::Err> {
        cons.take_sequence(Self::take_content_from)
    }

    /// Parses the algorithm as used in certificates and CRLs.
    pub fn take_content_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, S::Err> {
        let alg = Oid::take_from(cons)?;
        if alg == oid::SHA256_WITH_RSA_ENCRYPTION {
            skip_opt_null(cons)?;
            Ok(SignatureAlgorithm::Sha256WithRsaEncryption)
        }
        else if alg == oid::ECDSA_WITH_SHA256 {
            Ok(SignatureAlgorithm::EcdsaWithSha256)
        }
        else {
            Err(decode::Error::Malformed.into())
        }
    }

    /// Parses the algorithm as used in the CMS SignerInfo.
    ///
    /// RFC 6488 allows both rsaEncryption and sha256WithRSAEncryption
    /// here.
    pub fn cms_take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, S::Err> {
        cons.take_sequence(|cons| {
            let alg = Oid::take_from(cons)?;
            if alg != oid::RSA_ENCRYPTION
                && alg != oid::SHA256_WITH_RSA_ENCRYPTION
            {
                return Err(decode::Error::Malformed.into())
            }
            skip_opt_null(cons)?;
            Ok(SignatureAlgorithm::Sha256WithRsaEncryption)
        })
    }
}


//------------ PublicKeyFormat -----------------------------------------------

/// The format of a subject public key.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PublicKeyFormat {
    /// An RSA public key.
    RsaEncryption,

    /// An ECDSA P-256 public key.
    EcdsaP256,
}

impl PublicKeyFormat {
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, S::Err> {
        cons.take_sequence(|cons| {
            let alg = Oid::take_from(cons)?;
            if alg == oid::RSA_ENCRYPTION {
                skip_opt_null(cons)?;
                Ok(PublicKeyFormat::RsaEncryption)
            }
            else if alg == oid::EC_PUBLIC_KEY {
                oid::PRIME256_V1.skip_if(cons)?;
                Ok(PublicKeyFormat::EcdsaP256)
            }
            else {
                Err(decode::Error::Malformed.into())
            }
        })
    }
}


//------------ PublicKey -----------------------------------------------------

/// A subject public key.
///
/// Keeps the algorithm and the raw content octets of the subjectPublicKey
/// bit string, which is exactly what ring wants for verification.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublicKey {
    algorithm: PublicKeyFormat,
    bits: Bytes,
}

impl PublicKey {
    /// Decodes a SubjectPublicKeyInfo from a source.
    pub fn decode<S: decode::Source>(source: S) -> Result<Self, S::Err> {
        Mode::Der.decode(source, Self::take_from)
    }

    /// Takes a SubjectPublicKeyInfo from a constructed value.
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, S::Err> {
        cons.take_sequence(|cons| {
            Ok(PublicKey {
                algorithm: PublicKeyFormat::take_from(cons)?,
                bits: take_bit_string(cons)?,
            })
        })
    }

    pub fn algorithm(&self) -> PublicKeyFormat {
        self.algorithm
    }

    /// The content octets of the subjectPublicKey bit string.
    pub fn bits(&self) -> &Bytes {
        &self.bits
    }

    /// Returns the key identifier of the key.
    ///
    /// RFC 6487 defines this as the SHA-1 hash of the bit string content,
    /// which also is the 20 octet SKI the RTR router key PDU carries.
    pub fn key_identifier(&self) -> KeyIdentifier {
        KeyIdentifier::from_public_key(self)
    }

    /// Verifies a signature over a message with this key.
    pub fn verify(
        &self, message: &[u8], signature: &[u8]
    ) -> Result<(), VerificationError> {
        let alg: &dyn ring::signature::VerificationAlgorithm
            = match self.algorithm
        {
            PublicKeyFormat::RsaEncryption => {
                &ring::signature::RSA_PKCS1_2048_8192_SHA256
            }
            PublicKeyFormat::EcdsaP256 => {
                &ring::signature::ECDSA_P256_SHA256_ASN1
            }
        };
        UnparsedPublicKey::new(alg, self.bits.as_ref())
            .verify(message, signature)
            .map_err(|_| VerificationError)
    }
}


//------------ KeyIdentifier -------------------------------------------------

/// The 20 octet key identifier of a public key.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct KeyIdentifier([u8; 20]);

impl KeyIdentifier {
    /// Calculates the identifier from a public key.
    pub fn from_public_key(key: &PublicKey) -> Self {
        let hash = digest::digest(
            &digest::SHA1_FOR_LEGACY_USE_ONLY, key.bits().as_ref()
        );
        let mut res = [0u8; 20];
        res.copy_from_slice(hash.as_ref());
        KeyIdentifier(res)
    }

    /// Creates an identifier from a slice of exactly 20 octets.
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() != 20 {
            return None
        }
        let mut res = [0u8; 20];
        res.copy_from_slice(slice);
        Some(KeyIdentifier(res))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for KeyIdentifier {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for KeyIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}


//------------ VerificationError ---------------------------------------------

/// A signature did not verify.
#[derive(Clone, Copy, Debug)]
pub struct VerificationError;

impl fmt::Display for VerificationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("signature verification failed")
    }
}

impl std::error::Error for VerificationError { }


//------------ Parsing helpers -----------------------------------------------

/// Takes a primitive BIT STRING with no unused bits and returns its
/// content octets.
pub fn take_bit_string<S: decode::Source>(
    cons: &mut decode::Constructed<S>
) -> Result<Bytes, S::Err> {
    cons.take_primitive_if(Tag::BIT_STRING, |prim| {
        let bytes = prim.take_all()?;
        match bytes.first() {
            Some(0) => Ok(bytes.slice(1..)),
            _ => Err(decode::Error::Malformed.into())
        }
    })
}

/// Skips an optional NULL value.
pub fn skip_opt_null<S: decode::Source>(
    cons: &mut decode::Constructed<S>
) -> Result<(), S::Err> {
    cons.take_opt_primitive_if(Tag::NULL, |prim| {
        prim.skip_all()
    })?;
    Ok(())
}


//------------ OIDs ----------------------------------------------------------

pub mod oid {
    use bcder::{ConstOid, Oid};

    pub const SHA256: ConstOid = Oid(&[96, 134, 72, 1, 101, 3, 4, 2, 1]);
    pub const RSA_ENCRYPTION: ConstOid
        = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 1]);
    pub const SHA256_WITH_RSA_ENCRYPTION: ConstOid
        = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 11]);
    pub const EC_PUBLIC_KEY: ConstOid = Oid(&[42, 134, 72, 206, 61, 2, 1]);
    pub const PRIME256_V1: ConstOid
        = Oid(&[42, 134, 72, 206, 61, 3, 1, 7]);
    pub const ECDSA_WITH_SHA256: ConstOid
        = Oid(&[42, 134, 72, 206, 61, 4, 3, 2]);
}


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn sha256_vector() {
        // FIPS 180-2 test vector for "abc".
        let digest = DigestAlgorithm::Sha256.digest(b"abc");
        assert_eq!(
            digest.as_ref(),
            &[
                0xba, 0x78, 0x16, 0xbf, 0x8f, 0x01, 0xcf, 0xea,
                0x41, 0x41, 0x40, 0xde, 0x5d, 0xae, 0x22, 0x23,
                0xb0, 0x03, 0x61, 0xa3, 0x96, 0x17, 0x7a, 0x9c,
                0xb4, 0x10, 0xff, 0x61, 0xf2, 0x00, 0x15, 0xad,
            ][..]
        );
    }

    #[test]
    fn file_digest_matches_memory_digest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let data = vec![0x5Au8; 200_000];
        file.write_all(&data).unwrap();
        file.flush().unwrap();
        let streamed = DigestAlgorithm::Sha256.digest_file(
            file.path()
        ).unwrap();
        let direct = DigestAlgorithm::Sha256.digest(&data);
        assert_eq!(streamed.as_ref(), direct.as_ref());
    }

    #[test]
    fn unsupported_digest_oid_rejected() {
        // AlgorithmIdentifier with SHA-1 instead of SHA-256.
        let data: &[u8] = &[
            0x30, 0x07, 0x06, 0x05, 0x2b, 0x0e, 0x03, 0x02, 0x1a
        ];
        assert!(
            Mode::Der.decode(data, DigestAlgorithm::take_from).is_err()
        );

        // The proper SHA-256 identifier decodes.
        let data: &[u8] = &[
            0x30, 0x0b,
            0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02,
            0x01
        ];
        assert_eq!(
            Mode::Der.decode(data, DigestAlgorithm::take_from).unwrap(),
            DigestAlgorithm::Sha256
        );
    }

    #[test]
    fn key_identifier_display() {
        let ki = KeyIdentifier::from_slice(&[0xAB; 20]).unwrap();
        assert_eq!(ki.to_string(), "AB".repeat(20));
        assert!(KeyIdentifier::from_slice(&[0; 19]).is_none());
    }
}
