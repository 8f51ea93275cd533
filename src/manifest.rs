//! RPKI manifests.
//!
//! A manifest lists all the files a CA currently publishes together with
//! their SHA-256 hashes. It is a signed object per RFC 6486. Iteration
//! order over the entries is the order they appear in on the manifest.

use bcder::decode;
use bcder::{Oid, Tag};
use bytes::Bytes;
use crate::cert::ResourceCert;
use crate::crypto::{take_bit_string, DigestAlgorithm};
use crate::sigobj::{self, SignedObject};
use crate::x509::{Time, ValidationError};


//------------ Manifest ------------------------------------------------------

/// A decoded manifest.
#[derive(Clone, Debug)]
pub struct Manifest {
    signed: SignedObject,
    content: ManifestContent,
}

impl Manifest {
    /// Decodes a manifest from a source.
    pub fn decode<S: decode::Source>(source: S) -> Result<Self, S::Err> {
        let signed = SignedObject::decode(source)?;
        if *signed.content_type() != sigobj::oid::RPKI_MANIFEST {
            return Err(decode::Error::Malformed.into())
        }
        let content = signed.decode_content(ManifestContent::take_from)?;
        Ok(Manifest { signed, content })
    }

    /// Validates the manifest against the issuing CA certificate.
    ///
    /// Returns the EE certificate embedded in the manifest and the
    /// manifest content.
    pub fn validate(
        self, issuer: &ResourceCert, strict: bool
    ) -> Result<(ResourceCert, ManifestContent), ValidationError> {
        let ee = self.signed.validate(issuer, strict)?;
        Ok((ee, self.content))
    }

    pub fn content(&self) -> &ManifestContent {
        &self.content
    }
}


//------------ ManifestContent -----------------------------------------------

/// The payload of a manifest.
#[derive(Clone, Debug)]
pub struct ManifestContent {
    /// The number of this manifest.
    ///
    /// Numbers increase with every newly issued manifest; we keep the
    /// raw integer content octets around since twenty octets are
    /// allowed.
    manifest_number: Bytes,

    this_update: Time,
    next_update: Time,

    /// The files the CA vouches for, in listed order.
    entries: Vec<FileAndHash>,
}

impl ManifestContent {
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
            let manifest_number = take_manifest_number(cons)?;
            let this_update = Time::take_from(cons)?;
            let next_update = Time::take_from(cons)?;
            if this_update > next_update {
                return Err(decode::Error::Malformed.into())
            }
            // fileHashAlg -- SHA-256 is the only allowed value.
            let alg = Oid::take_from(cons)?;
            if alg != crate::crypto::oid::SHA256 {
                return Err(decode::Error::Malformed.into())
            }
            let mut entries = Vec::new();
            cons.take_sequence(|cons| {
                while let Some(entry) = FileAndHash::take_opt_from(cons)? {
                    entries.push(entry)
                }
                Ok(())
            })?;
            Ok(ManifestContent {
                manifest_number, this_update, next_update, entries
            })
        })
    }

    pub fn manifest_number(&self) -> &Bytes {
        &self.manifest_number
    }

    pub fn this_update(&self) -> Time {
        self.this_update
    }

    pub fn next_update(&self) -> Time {
        self.next_update
    }

    /// Returns whether the manifest is stale.
    ///
    /// It is when its next update time has passed.
    pub fn is_stale(&self) -> bool {
        self.next_update < Time::now()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileAndHash> {
        self.entries.iter()
    }
}


//------------ FileAndHash ---------------------------------------------------

/// A single manifest entry: a file name and its expected hash.
#[derive(Clone, Debug)]
pub struct FileAndHash {
    file: Bytes,
    hash: Bytes,
}

impl FileAndHash {
    fn take_opt_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Option<Self>, S::Err> {
        cons.take_opt_sequence(|cons| {
            let file = cons.take_primitive_if(
                Tag::IA5_STRING, |prim| prim.take_all()
            )?;
            if !is_valid_filename(file.as_ref()) {
                return Err(decode::Error::Malformed.into())
            }
            let hash = take_bit_string(cons)?;
            if hash.len() != DigestAlgorithm::Sha256.digest_len() {
                return Err(decode::Error::Malformed.into())
            }
            Ok(FileAndHash { file, hash })
        })
    }

    pub fn file(&self) -> &Bytes {
        &self.file
    }

    pub fn hash(&self) -> &Bytes {
        &self.hash
    }

    /// Verifies that the given data matches the entry's hash.
    pub fn verify(&self, data: &[u8]) -> Result<(), ValidationError> {
        if DigestAlgorithm::Sha256.digest(data).as_ref()
            == self.hash.as_ref()
        {
            Ok(())
        }
        else {
            Err(ValidationError::Invalid)
        }
    }
}


//------------ Helpers -------------------------------------------------------

/// Takes the manifest number: a positive INTEGER of up to twenty octets.
fn take_manifest_number<S: decode::Source>(
    cons: &mut decode::Constructed<S>
) -> Result<Bytes, S::Err> {
    cons.take_primitive_if(Tag::INTEGER, |prim| {
        let bytes = prim.take_all()?;
        match bytes.first() {
            Some(first) if first & 0x80 == 0 => { }
            _ => return Err(decode::Error::Malformed.into())
        }
        if bytes.len() > 21 {
            return Err(decode::Error::Malformed.into())
        }
        Ok(bytes)
    })
}

/// Returns whether a manifest entry's file name is acceptable.
///
/// Names are simple file names: no path separators, no directory
/// climbing, only printable ASCII.
fn is_valid_filename(name: &[u8]) -> bool {
    if name.is_empty() || name == b"." || name == b".." {
        return false
    }
    name.iter().all(|&ch| {
        matches!(
            ch,
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.'
        )
    })
}


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn filename_hygiene() {
        assert!(is_valid_filename(b"abc.roa"));
        assert!(is_valid_filename(b"ABC-12_3.cer"));
        assert!(!is_valid_filename(b""));
        assert!(!is_valid_filename(b"."));
        assert!(!is_valid_filename(b".."));
        assert!(!is_valid_filename(b"a/b.roa"));
        assert!(!is_valid_filename(b"a\\b.roa"));
        assert!(!is_valid_filename(b"a b.roa"));
        assert!(!is_valid_filename(b"caf\xc3\xa9.roa"));
    }

    #[test]
    fn entry_hash_verify() {
        let data = b"some object content";
        let entry = FileAndHash {
            file: Bytes::from_static(b"x.roa"),
            hash: Bytes::copy_from_slice(
                DigestAlgorithm::Sha256.digest(data).as_ref()
            ),
        };
        assert!(entry.verify(data).is_ok());
        assert!(entry.verify(b"other content").is_err());
    }
}
