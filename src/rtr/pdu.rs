//! RTR PDUs.
//!
//! This module contains types that represent the protocol data units of
//! RPKI-RTR in their wire representation. The fixed-size PDUs are plain
//! structs whose memory layout matches the wire, so they can be given to
//! read and write operations as buffers. See section 5 of RFC 6810 and
//! RFC 8210. Annoyingly, the format of the End of Data PDU differs
//! between the two versions.

use std::{io, mem, slice};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use crate::payload::{RouteOrigin, RouterKey};
use super::serial::Serial;
use super::{Action, Payload, Timing};


//------------ Limits --------------------------------------------------------

/// The maximum length of a PDU we are willing to accept.
///
/// The length field is 32 bits wide, so a malicious client could
/// otherwise make us allocate gigabytes for a single PDU.
pub const MAX_PDU_LEN: u32 = 0x4_0000;


//------------ Macro for Common Impls ----------------------------------------

macro_rules! common {
    ( $type:ident ) => {
        impl $type {
            pub async fn read<Sock: AsyncRead + Unpin>(
                sock: &mut Sock
            ) -> Result<Self, io::Error> {
                let mut res = Self::default();
                sock.read_exact(res.as_mut()).await?;
                Ok(res)
            }

            pub async fn write<Sock: AsyncWrite + Unpin>(
                &self,
                sock: &mut Sock
            ) -> Result<(), io::Error> {
                sock.write_all(self.as_ref()).await
            }
        }

        impl AsRef<[u8]> for $type {
            fn as_ref(&self) -> &[u8] {
                unsafe {
                    slice::from_raw_parts(
                        self as *const Self as *const u8,
                        mem::size_of::<Self>()
                    )
                }
            }
        }

        impl AsMut<[u8]> for $type {
            fn as_mut(&mut self) -> &mut [u8] {
                unsafe {
                    slice::from_raw_parts_mut(
                        self as *mut Self as *mut u8,
                        mem::size_of::<Self>()
                    )
                }
            }
        }
    }
}


//------------ SerialNotify --------------------------------------------------

#[derive(Default)]
#[repr(packed)]
#[allow(dead_code)]
pub struct SerialNotify {
    header: Header,
    serial: u32,
}

impl SerialNotify {
    pub const PDU: u8 = 0;
    pub const LEN: u32 = 12;

    pub fn new(version: u8, session: u16, serial: Serial) -> Self {
        SerialNotify {
            header: Header::new(version, Self::PDU, session, Self::LEN),
            serial: serial.to_be(),
        }
    }
}

common!(SerialNotify);


//------------ SerialQuery ---------------------------------------------------

pub const SERIAL_QUERY_PDU: u8 = 1;
pub const SERIAL_QUERY_LEN: u32 = 12;


//------------ SerialQueryPayload --------------------------------------------

/// The part of a Serial Query following the header.
#[derive(Default)]
#[repr(packed)]
pub struct SerialQueryPayload {
    serial: u32
}

impl SerialQueryPayload {
    pub fn new(serial: Serial) -> Self {
        SerialQueryPayload {
            serial: serial.to_be()
        }
    }

    pub fn serial(&self) -> Serial {
        Serial::from_be(self.serial)
    }
}

common!(SerialQueryPayload);


//------------ ResetQuery ----------------------------------------------------

#[derive(Default)]
#[repr(packed)]
pub struct ResetQuery {
    #[allow(dead_code)]
    header: Header
}

impl ResetQuery {
    pub const PDU: u8 = 2;
    pub const LEN: u32 = 8;

    #[allow(dead_code)]
    pub fn new(version: u8) -> Self {
        ResetQuery {
            header: Header::new(version, Self::PDU, 0, Self::LEN)
        }
    }
}

common!(ResetQuery);


//------------ CacheResponse -------------------------------------------------

#[derive(Default)]
#[repr(packed)]
pub struct CacheResponse {
    #[allow(dead_code)]
    header: Header
}

impl CacheResponse {
    pub fn new(version: u8, session: u16) -> Self {
        CacheResponse {
            header: Header::new(version, 3, session, 8)
        }
    }
}

common!(CacheResponse);


//------------ Ipv4Prefix ----------------------------------------------------

#[derive(Default)]
#[repr(packed)]
#[allow(dead_code)]
pub struct Ipv4Prefix {
    header: Header,
    flags: u8,
    prefix_len: u8,
    max_len: u8,
    zero: u8,
    prefix: u32,
    asn: u32
}

impl Ipv4Prefix {
    pub fn new(
        version: u8,
        flags: u8,
        prefix_len: u8,
        max_len: u8,
        prefix: Ipv4Addr,
        asn: u32
    ) -> Self {
        Ipv4Prefix {
            header: Header::new(version, 4, 0, 20),
            flags,
            prefix_len,
            max_len,
            zero: 0,
            prefix: u32::from(prefix).to_be(),
            asn: asn.to_be()
        }
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn max_len(&self) -> u8 {
        self.max_len
    }

    pub fn prefix(&self) -> Ipv4Addr {
        u32::from_be(self.prefix).into()
    }

    pub fn asn(&self) -> u32 {
        u32::from_be(self.asn)
    }
}

common!(Ipv4Prefix);


//------------ Ipv6Prefix ----------------------------------------------------

#[derive(Default)]
#[repr(packed)]
#[allow(dead_code)]
pub struct Ipv6Prefix {
    header: Header,
    flags: u8,
    prefix_len: u8,
    max_len: u8,
    zero: u8,
    prefix: u128,
    asn: u32,
}

impl Ipv6Prefix {
    pub fn new(
        version: u8,
        flags: u8,
        prefix_len: u8,
        max_len: u8,
        prefix: Ipv6Addr,
        asn: u32
    ) -> Self {
        Ipv6Prefix {
            header: Header::new(version, 6, 0, 32),
            flags,
            prefix_len,
            max_len,
            zero: 0,
            prefix: u128::from(prefix).to_be(),
            asn: asn.to_be()
        }
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn max_len(&self) -> u8 {
        self.max_len
    }

    pub fn prefix(&self) -> Ipv6Addr {
        u128::from_be(self.prefix).into()
    }

    pub fn asn(&self) -> u32 {
        u32::from_be(self.asn)
    }
}

common!(Ipv6Prefix);


//------------ Prefix --------------------------------------------------------

/// Either kind of prefix PDU.
pub enum Prefix {
    V4(Ipv4Prefix),
    V6(Ipv6Prefix),
}

impl Prefix {
    pub fn new(version: u8, flags: u8, origin: RouteOrigin) -> Self {
        match origin.address() {
            IpAddr::V4(addr) => {
                Prefix::V4(
                    Ipv4Prefix::new(
                        version,
                        flags,
                        origin.address_length(),
                        origin.max_length(),
                        addr,
                        origin.as_id().into_u32()
                    )
                )
            }
            IpAddr::V6(addr) => {
                Prefix::V6(
                    Ipv6Prefix::new(
                        version,
                        flags,
                        origin.address_length(),
                        origin.max_length(),
                        addr,
                        origin.as_id().into_u32()
                    )
                )
            }
        }
    }

    pub async fn write<Sock: AsyncWrite + Unpin>(
        &self,
        sock: &mut Sock
    ) -> Result<(), io::Error> {
        sock.write_all(self.as_ref()).await
    }
}

impl AsRef<[u8]> for Prefix {
    fn as_ref(&self) -> &[u8] {
        match *self {
            Prefix::V4(ref prefix) => prefix.as_ref(),
            Prefix::V6(ref prefix) => prefix.as_ref(),
        }
    }
}


//------------ RouterKeyPdu --------------------------------------------------

/// A Router Key PDU.
///
/// Only exists in protocol version 1 and is of variable length because
/// of the subject public key info, so it assembles its wire format into
/// a buffer instead of being a fixed layout struct.
pub struct RouterKeyPdu {
    buf: Vec<u8>,
}

impl RouterKeyPdu {
    pub const PDU: u8 = 9;

    pub fn new(version: u8, flags: u8, key: &RouterKey) -> Self {
        let key_info = key.key_info();
        let len = 8 + 20 + 4 + key_info.len();
        let mut buf = Vec::with_capacity(len);
        buf.push(version);
        buf.push(Self::PDU);
        buf.push(flags);
        buf.push(0);
        buf.extend_from_slice(&(len as u32).to_be_bytes());
        buf.extend_from_slice(key.key_identifier().as_slice());
        buf.extend_from_slice(&key.as_id().into_u32().to_be_bytes());
        buf.extend_from_slice(key_info.as_ref());
        RouterKeyPdu { buf }
    }

    pub async fn write<Sock: AsyncWrite + Unpin>(
        &self,
        sock: &mut Sock
    ) -> Result<(), io::Error> {
        sock.write_all(&self.buf).await
    }
}

impl AsRef<[u8]> for RouterKeyPdu {
    fn as_ref(&self) -> &[u8] {
        &self.buf
    }
}


//------------ PayloadPdu ----------------------------------------------------

/// The PDU for any payload element.
pub enum PayloadPdu {
    Prefix(Prefix),
    RouterKey(RouterKeyPdu),
}

impl PayloadPdu {
    /// Creates the wire representation of a payload element.
    ///
    /// Returns `None` if the payload cannot be expressed in the given
    /// protocol version, i.e., router keys in version 0.
    pub fn new(
        version: u8, action: Action, payload: &Payload
    ) -> Option<Self> {
        match *payload {
            Payload::Origin(origin) => {
                Some(PayloadPdu::Prefix(Prefix::new(
                    version, action.into_flags(), origin
                )))
            }
            Payload::RouterKey(ref key) => {
                if version < 1 {
                    return None
                }
                Some(PayloadPdu::RouterKey(RouterKeyPdu::new(
                    version, action.into_flags(), key
                )))
            }
        }
    }

    pub async fn write<Sock: AsyncWrite + Unpin>(
        &self,
        sock: &mut Sock
    ) -> Result<(), io::Error> {
        match *self {
            PayloadPdu::Prefix(ref pdu) => pdu.write(sock).await,
            PayloadPdu::RouterKey(ref pdu) => pdu.write(sock).await,
        }
    }
}


//------------ EndOfData -----------------------------------------------------

/// Generic End of Data PDU.
///
/// This PDU differs between version 0 and 1 of RTR. Consequently, this
/// generic version is an enum that can be both, depending on the version
/// requested.
pub enum EndOfData {
    V0(EndOfDataV0),
    V1(EndOfDataV1),
}

impl EndOfData {
    pub fn new(
        version: u8,
        session: u16,
        serial: Serial,
        timing: Timing,
    ) -> Self {
        if version == 0 {
            EndOfData::V0(EndOfDataV0::new(session, serial))
        }
        else {
            EndOfData::V1(EndOfDataV1::new(
                version, session, serial,
                timing.refresh, timing.retry, timing.expire
            ))
        }
    }

    pub async fn write<Sock: AsyncWrite + Unpin>(
        &self,
        sock: &mut Sock
    ) -> Result<(), io::Error> {
        match *self {
            EndOfData::V0(ref pdu) => pdu.write(sock).await,
            EndOfData::V1(ref pdu) => pdu.write(sock).await,
        }
    }
}


//------------ EndOfDataV0 ---------------------------------------------------

#[derive(Default)]
#[repr(packed)]
#[allow(dead_code)]
pub struct EndOfDataV0 {
    header: Header,
    serial: u32
}

impl EndOfDataV0 {
    pub fn new(session: u16, serial: Serial) -> Self {
        EndOfDataV0 {
            header: Header::new(0, 7, session, 12),
            serial: serial.to_be()
        }
    }

    pub fn session(&self) -> u16 {
        self.header.session()
    }

    pub fn serial(&self) -> Serial {
        Serial::from_be(self.serial)
    }
}

common!(EndOfDataV0);


//------------ EndOfDataV1 ---------------------------------------------------

#[derive(Default)]
#[repr(packed)]
#[allow(dead_code)]
pub struct EndOfDataV1 {
    header: Header,
    serial: u32,
    refresh: u32,
    retry: u32,
    expire: u32,
}

impl EndOfDataV1 {
    pub fn new(
        version: u8,
        session: u16,
        serial: Serial,
        refresh: u32,
        retry: u32,
        expire: u32
    ) -> Self {
        EndOfDataV1 {
            header: Header::new(version, 7, session, 24),
            serial: serial.to_be(),
            refresh: refresh.to_be(),
            retry: retry.to_be(),
            expire: expire.to_be(),
        }
    }

    pub fn session(&self) -> u16 {
        self.header.session()
    }

    pub fn serial(&self) -> Serial {
        Serial::from_be(self.serial)
    }

    pub fn refresh(&self) -> u32 {
        u32::from_be(self.refresh)
    }

    pub fn retry(&self) -> u32 {
        u32::from_be(self.retry)
    }

    pub fn expire(&self) -> u32 {
        u32::from_be(self.expire)
    }
}

common!(EndOfDataV1);


//------------ CacheReset ----------------------------------------------------

#[derive(Default)]
#[repr(packed)]
pub struct CacheReset {
    #[allow(dead_code)]
    header: Header
}

impl CacheReset {
    pub fn new(version: u8) -> Self {
        CacheReset {
            header: Header::new(version, 8, 0, 8)
        }
    }
}

common!(CacheReset);


//------------ ErrorReport ---------------------------------------------------

/// An Error Report PDU.
///
/// Contains the erroneous PDU and a diagnostic text, so it is of
/// variable length and assembles its wire format into a buffer.
pub struct ErrorReport {
    buf: Vec<u8>,
}

impl ErrorReport {
    pub const PDU: u8 = 10;

    /// Creates a new error report.
    ///
    /// The error code goes into the header's session field. The PDU the
    /// report is about is included as its raw bytes.
    pub fn new(
        version: u8,
        error_code: u16,
        pdu: &[u8],
        text: &str,
    ) -> Self {
        let len = 8 + 4 + pdu.len() + 4 + text.len();
        let mut buf = Vec::with_capacity(len);
        buf.push(version);
        buf.push(Self::PDU);
        buf.extend_from_slice(&error_code.to_be_bytes());
        buf.extend_from_slice(&(len as u32).to_be_bytes());
        buf.extend_from_slice(&(pdu.len() as u32).to_be_bytes());
        buf.extend_from_slice(pdu);
        buf.extend_from_slice(&(text.len() as u32).to_be_bytes());
        buf.extend_from_slice(text.as_bytes());
        ErrorReport { buf }
    }

    pub async fn write<Sock: AsyncWrite + Unpin>(
        &self,
        sock: &mut Sock
    ) -> Result<(), io::Error> {
        sock.write_all(&self.buf).await
    }
}

impl AsRef<[u8]> for ErrorReport {
    fn as_ref(&self) -> &[u8] {
        &self.buf
    }
}


//------------ Header --------------------------------------------------------

#[derive(Clone, Copy, Default)]
#[repr(packed)]
pub struct Header {
    version: u8,
    pdu: u8,
    session: u16,
    length: u32,
}

impl Header {
    pub fn new(version: u8, pdu: u8, session: u16, length: u32) -> Self {
        Header {
            version,
            pdu,
            session: session.to_be(),
            length: length.to_be(),
        }
    }

    pub fn version(self) -> u8 {
        self.version
    }

    pub fn pdu(self) -> u8 {
        self.pdu
    }

    pub fn session(self) -> u16 {
        u16::from_be(self.session)
    }

    pub fn length(self) -> u32 {
        u32::from_be(self.length)
    }
}

common!(Header);


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;
    use bytes::Bytes;
    use crate::crypto::KeyIdentifier;
    use crate::resources::AddressPrefix;

    fn origin(asn: u32, prefix: &str, max_len: u8) -> RouteOrigin {
        RouteOrigin::new(
            asn.into(),
            AddressPrefix::from_str(prefix).unwrap(),
            max_len,
        )
    }

    #[test]
    fn header_layout() {
        let header = Header::new(1, 3, 0x1234, 8);
        assert_eq!(
            header.as_ref(),
            &[1, 3, 0x12, 0x34, 0, 0, 0, 8]
        );
        assert_eq!(mem::size_of::<Header>(), 8);
    }

    #[test]
    fn prefix_pdu_layout() {
        let pdu = Prefix::new(0, 1, origin(64501, "10.0.0.0/24", 24));
        assert_eq!(
            pdu.as_ref(),
            &[
                0, 4, 0, 0, 0, 0, 0, 20,      // header
                1, 24, 24, 0,                  // flags, len, maxlen, 0
                10, 0, 0, 0,                   // prefix
                0, 0, 0xfb, 0xf5,              // asn 64501
            ]
        );

        let pdu = Prefix::new(1, 0, origin(64501, "2001:db8::/32", 48));
        let bytes = pdu.as_ref();
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[..8], &[1, 6, 0, 0, 0, 0, 0, 32]);
        assert_eq!(&bytes[8..12], &[0, 32, 48, 0]);
        assert_eq!(&bytes[12..16], &[0x20, 0x01, 0x0d, 0xb8]);
    }

    #[test]
    fn prefix_pdu_round_trip() {
        let origin = origin(64501, "192.0.2.0/24", 28);
        let pdu = match Prefix::new(0, 1, origin) {
            Prefix::V4(pdu) => pdu,
            _ => panic!("expected a v4 prefix")
        };
        let mut parsed = Ipv4Prefix::default();
        parsed.as_mut().copy_from_slice(pdu.as_ref());
        assert_eq!(parsed.flags(), 1);
        assert_eq!(parsed.prefix_len(), 24);
        assert_eq!(parsed.max_len(), 28);
        assert_eq!(parsed.prefix(), Ipv4Addr::new(192, 0, 2, 0));
        assert_eq!(parsed.asn(), 64501);
    }

    #[test]
    fn end_of_data_layout() {
        let pdu = EndOfDataV0::new(0xabcd, Serial(7));
        assert_eq!(pdu.as_ref().len(), 12);
        assert_eq!(pdu.session(), 0xabcd);
        assert_eq!(pdu.serial(), Serial(7));

        let pdu = EndOfDataV1::new(1, 2, Serial(9), 3600, 600, 7200);
        assert_eq!(pdu.as_ref().len(), 24);
        assert_eq!(pdu.serial(), Serial(9));
        assert_eq!(pdu.refresh(), 3600);
        assert_eq!(pdu.retry(), 600);
        assert_eq!(pdu.expire(), 7200);
    }

    #[test]
    fn router_key_pdu_layout() {
        let key = RouterKey::new(
            64501.into(),
            KeyIdentifier::from_slice(&[0x11; 20]).unwrap(),
            Bytes::from_static(&[0xAA, 0xBB, 0xCC]),
        );
        let pdu = RouterKeyPdu::new(1, 1, &key);
        let bytes = pdu.as_ref();
        assert_eq!(bytes.len(), 35);
        assert_eq!(&bytes[..4], &[1, 9, 1, 0]);
        assert_eq!(&bytes[4..8], &35u32.to_be_bytes());
        assert_eq!(&bytes[8..28], &[0x11; 20][..]);
        assert_eq!(&bytes[28..32], &64501u32.to_be_bytes());
        assert_eq!(&bytes[32..], &[0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn router_keys_need_version_one() {
        let key = RouterKey::new(
            64501.into(),
            KeyIdentifier::from_slice(&[0x11; 20]).unwrap(),
            Bytes::from_static(&[0xAA]),
        );
        assert!(PayloadPdu::new(
            0, Action::Announce, &Payload::RouterKey(key.clone())
        ).is_none());
        assert!(PayloadPdu::new(
            1, Action::Announce, &Payload::RouterKey(key)
        ).is_some());
    }

    #[test]
    fn error_report_layout() {
        let pdu = ErrorReport::new(0, 3, &[0xDE, 0xAD], "nope");
        let bytes = pdu.as_ref();
        assert_eq!(bytes.len(), 8 + 4 + 2 + 4 + 4);
        assert_eq!(&bytes[..2], &[0, 10]);
        assert_eq!(&bytes[2..4], &3u16.to_be_bytes());
        assert_eq!(&bytes[4..8], &(bytes.len() as u32).to_be_bytes());
        assert_eq!(&bytes[8..12], &2u32.to_be_bytes());
        assert_eq!(&bytes[12..14], &[0xDE, 0xAD]);
        assert_eq!(&bytes[14..18], &4u32.to_be_bytes());
        assert_eq!(&bytes[18..], b"nope");
    }

    #[tokio::test]
    async fn header_async_read() {
        let data: &[u8] = &[0, 2, 0, 0, 0, 0, 0, 8];
        let mut source = data;
        let header = Header::read(&mut source).await.unwrap();
        assert_eq!(header.version(), 0);
        assert_eq!(header.pdu(), ResetQuery::PDU);
        assert_eq!(header.session(), 0);
        assert_eq!(header.length(), 8);
    }
}
