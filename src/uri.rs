//! URIs for rsync-published RPKI data.
//!
//! All objects this crate deals with are published in an rsync repository
//! and are referred to by URIs of the form `rsync://authority/module/path`.
//! The type herein wraps such a URI, keeps its authority in canonical
//! lower-case form, and provides the path arithmetic the validation walker
//! and the local repository cache need.

use std::{fmt, hash, str};
use std::str::FromStr;


//------------ Rsync ---------------------------------------------------------

/// An rsync URI.
///
/// The authority portion of a URI is case-insensitive and is stored in
/// lower case so that comparing two URIs compares their canonical forms.
/// The first path component is the rsync module; the rsync daemon treats
/// it specially and so do we: synchronization happens per module.
#[derive(Clone, Debug, Eq, Ord, PartialOrd)]
pub struct Rsync {
    /// The canonical authority, i.e., host and optional port.
    authority: String,

    /// The module name.
    module: String,

    /// The path below the module. May be empty.
    path: String,
}

impl Rsync {
    /// Creates a URI from its parts without further checking.
    fn new(authority: String, module: String, path: String) -> Self {
        Rsync { authority, module, path }
    }

    /// Parses a URI from a byte slice.
    pub fn from_slice(slice: &[u8]) -> Result<Self, Error> {
        let s = str::from_utf8(slice).map_err(|_| Error::NotAscii)?;
        Self::from_str(s)
    }

    /// Returns the canonical authority.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Returns the module name.
    pub fn module_name(&self) -> &str {
        &self.module
    }

    /// Returns the path underneath the module.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the URI of the module this URI lives in.
    pub fn module(&self) -> Rsync {
        Rsync::new(self.authority.clone(), self.module.clone(), String::new())
    }

    /// Returns whether the path ends in the given suffix.
    pub fn ends_with(&self, suffix: &str) -> bool {
        self.path.ends_with(suffix)
    }

    /// Returns a new URI with the given file name appended to the path.
    ///
    /// Fails if the name is not a clean path component, i.e., if it is
    /// empty, contains a slash, or tries to climb up the tree.
    pub fn join(&self, name: &[u8]) -> Result<Self, Error> {
        if !is_clean_component(name) {
            return Err(Error::DubiousPath)
        }
        let name = str::from_utf8(name).map_err(|_| Error::NotAscii)?;
        let mut path = String::with_capacity(
            self.path.len() + name.len() + 1
        );
        path.push_str(&self.path);
        if !path.is_empty() && !path.ends_with('/') {
            path.push('/');
        }
        path.push_str(name);
        Ok(Rsync::new(self.authority.clone(), self.module.clone(), path))
    }

    /// Returns the path of `self` relative to `base`.
    ///
    /// Returns `None` if `self` does not live below `base`.
    pub fn relative_to<'a>(&'a self, base: &Rsync) -> Option<&'a str> {
        if self.authority != base.authority || self.module != base.module {
            return None
        }
        if base.path.is_empty() {
            return Some(&self.path)
        }
        let rest = self.path.strip_prefix(&base.path)?;
        rest.strip_prefix('/').or(
            if rest.is_empty() { Some(rest) } else { None }
        )
    }

    /// Returns whether the authority looks like it can't be a real
    /// publication server.
    ///
    /// Refusing to rsync from such hosts keeps a malicious CA from
    /// pointing us at ourselves or at private infrastructure.
    pub fn has_dubious_authority(&self) -> bool {
        let host = match self.authority.rfind(':') {
            Some(idx) => &self.authority[..idx],
            None => &self.authority
        };
        host == "localhost" || host.parse::<std::net::IpAddr>().is_ok()
    }
}


//--- FromStr

impl FromStr for Rsync {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.is_ascii() {
            return Err(Error::NotAscii)
        }
        let rest = match s.strip_prefix("rsync://") {
            Some(rest) => rest,
            None => return Err(Error::BadScheme)
        };
        let (authority, rest) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx + 1..]),
            None => return Err(Error::MissingModule)
        };
        if authority.is_empty() {
            return Err(Error::MissingAuthority)
        }
        let (module, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx + 1..]),
            None => (rest, "")
        };
        if module.is_empty() {
            return Err(Error::MissingModule)
        }
        for component in path.split('/') {
            // A trailing slash leaves an empty final component. That's
            // fine for directory URIs.
            if component.is_empty() {
                continue
            }
            if !is_clean_component(component.as_bytes()) {
                return Err(Error::DubiousPath)
            }
        }
        Ok(Rsync::new(
            authority.to_ascii_lowercase(),
            module.into(),
            path.trim_end_matches('/').into()
        ))
    }
}


//--- PartialEq and Hash

impl PartialEq for Rsync {
    fn eq(&self, other: &Self) -> bool {
        self.authority == other.authority
            && self.module == other.module
            && self.path == other.path
    }
}

impl hash::Hash for Rsync {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.authority.hash(state);
        self.module.hash(state);
        self.path.hash(state);
    }
}


//--- Display

impl fmt::Display for Rsync {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "rsync://{}/{}", self.authority, self.module)?;
        if !self.path.is_empty() {
            write!(f, "/{}", self.path)?;
        }
        Ok(())
    }
}


//------------ Helpers -------------------------------------------------------

/// Returns whether a byte sequence is acceptable as a single path
/// component.
fn is_clean_component(component: &[u8]) -> bool {
    if component.is_empty()
        || component == b"."
        || component == b".."
    {
        return false
    }
    component.iter().all(|&ch| {
        ch.is_ascii() && ch > b' ' && ch != b'/' && ch != b'\\'
            && ch != 0x7F
    })
}


//------------ Error ---------------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    NotAscii,
    BadScheme,
    MissingAuthority,
    MissingModule,
    DubiousPath,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            Error::NotAscii => "URI contains non-ASCII characters",
            Error::BadScheme => "URI scheme is not 'rsync'",
            Error::MissingAuthority => "URI lacks an authority",
            Error::MissingModule => "URI lacks a module",
            Error::DubiousPath => "URI path contains dubious components",
        })
    }
}

impl std::error::Error for Error { }


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    fn uri(s: &str) -> Rsync {
        Rsync::from_str(s).unwrap()
    }

    #[test]
    fn parse() {
        let u = uri("rsync://Example.COM/repo/sub/file.cer");
        assert_eq!(u.authority(), "example.com");
        assert_eq!(u.module_name(), "repo");
        assert_eq!(u.path(), "sub/file.cer");
        assert_eq!(
            u.to_string(), "rsync://example.com/repo/sub/file.cer"
        );

        assert_eq!(
            Rsync::from_str("https://example.com/repo"),
            Err(Error::BadScheme)
        );
        assert_eq!(
            Rsync::from_str("rsync://example.com"),
            Err(Error::MissingModule)
        );
        assert_eq!(
            Rsync::from_str("rsync:///repo/file"),
            Err(Error::MissingAuthority)
        );
        assert_eq!(
            Rsync::from_str("rsync://example.com/repo/../escape"),
            Err(Error::DubiousPath)
        );
    }

    #[test]
    fn join() {
        let base = uri("rsync://example.com/repo/ca");
        assert_eq!(
            base.join(b"file.roa").unwrap(),
            uri("rsync://example.com/repo/ca/file.roa")
        );
        assert!(base.join(b"dir/file.roa").is_err());
        assert!(base.join(b"..").is_err());
        assert!(base.join(b"").is_err());
    }

    #[test]
    fn relative_to() {
        let base = uri("rsync://example.com/repo/ca");
        let file = uri("rsync://example.com/repo/ca/file.crl");
        assert_eq!(file.relative_to(&base), Some("file.crl"));
        assert_eq!(base.relative_to(&base), Some(""));
        assert_eq!(
            uri("rsync://example.com/repo/other/file.crl")
                .relative_to(&base),
            None
        );
        assert_eq!(
            uri("rsync://example.com/other/ca/file.crl")
                .relative_to(&base),
            None
        );
    }

    #[test]
    fn dubious_authority() {
        assert!(uri("rsync://localhost/repo/x").has_dubious_authority());
        assert!(uri("rsync://127.0.0.1/repo/x").has_dubious_authority());
        assert!(!uri("rsync://rpki.example.net/repo/x")
            .has_dubious_authority());
    }

    #[test]
    fn ends_with() {
        assert!(uri("rsync://example.com/repo/ca/file.mft")
            .ends_with(".mft"));
        assert!(!uri("rsync://example.com/repo/ca/file.mft")
            .ends_with(".crl"));
    }
}
