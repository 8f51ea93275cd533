//! The RPKI-to-Router protocol.
//!
//! RTR (RFC 6810 for version 0, RFC 8210 for version 1) is how routers
//! learn the validated payload. The wire format lives in [`pdu`], the
//! server and per-client session logic in [`server`], serial number
//! arithmetic in [`serial`], and the update notification fan-out in
//! [`notify`].

pub mod notify;
pub mod pdu;
pub mod serial;
pub mod server;

pub use self::notify::{NotifyReceiver, NotifySender};
pub use self::serial::Serial;
pub use self::server::{rtr_listener, PayloadSource};

use crate::payload::{RouteOrigin, RouterKey};


//------------ State ---------------------------------------------------------

/// The session state of a cache: a session ID and a serial number.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct State {
    session: u16,
    serial: Serial,
}

impl State {
    pub fn new(session: u16, serial: Serial) -> Self {
        State { session, serial }
    }

    pub fn session(self) -> u16 {
        self.session
    }

    pub fn serial(self) -> Serial {
        self.serial
    }
}


//------------ Action --------------------------------------------------------

/// What a delta entry does with its payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
    Announce,
    Withdraw,
}

impl Action {
    /// Returns the flags octet of a payload PDU for this action.
    pub fn into_flags(self) -> u8 {
        match self {
            Action::Announce => 1,
            Action::Withdraw => 0,
        }
    }
}


//------------ Payload -------------------------------------------------------

/// A single unit of payload served to a client.
#[derive(Clone, Debug)]
pub enum Payload {
    /// A validated ROA payload.
    Origin(RouteOrigin),

    /// A BGPsec router key.
    RouterKey(RouterKey),
}


//------------ Timing --------------------------------------------------------

/// The timing parameters of a version 1 End of Data PDU.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timing {
    /// Seconds until the client should ask for an update.
    pub refresh: u32,

    /// Seconds to wait before retrying a failed update.
    pub retry: u32,

    /// Seconds after which unrefreshed data must be discarded.
    pub expire: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            refresh: 3600,
            retry: 600,
            expire: 7200,
        }
    }
}
