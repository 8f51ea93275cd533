//! The RTR server.
//!
//! The server listens on a number of TCP sockets and runs one task per
//! client connection. Each connection starts out without a negotiated
//! protocol version; the first PDU received pins the version for the
//! rest of the session. Clients ask either for everything (Reset Query)
//! or for the changes since a serial they name (Serial Query), and get
//! notified out-of-band whenever new data is available.

use std::io;
use std::future::Future;
use std::net::TcpListener as StdListener;
use std::time::Duration;
use futures::future::{pending, select_all};
use log::{debug, error};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::timeout;
use crate::config::Config;
use crate::error::ExitError;
use super::notify::{NotifyReceiver, NotifySender};
use super::pdu;
use super::serial::Serial;
use super::{Action, Payload, State, Timing};


//------------ PayloadSource -------------------------------------------------

/// A source of payload for the RTR server.
///
/// The server needs four things from whoever keeps the validated data:
/// whether data is available at all, the current state, the full data
/// set, and the changes from some earlier state.
pub trait PayloadSource: Clone + Send + Sync + 'static {
    /// An iterator over the full payload set.
    type FullIter: Iterator<Item = Payload> + Send + 'static;

    /// An iterator over a set of changes.
    type DiffIter: Iterator<Item = (Action, Payload)> + Send + 'static;

    /// Returns whether the source is ready to serve data.
    fn ready(&self) -> bool;

    /// Returns the current state of the source.
    fn notify(&self) -> State;

    /// Returns the current state and the full payload set.
    fn full(&self) -> (State, Self::FullIter);

    /// Returns the changes from the given state to the current one.
    ///
    /// Returns `None` if the difference cannot be produced, either
    /// because the session differs or the serial has fallen out of the
    /// retained history. The client then needs a cache reset.
    fn diff(&self, state: State) -> Option<(State, Self::DiffIter)>;

    /// Returns the timing parameters to hand out to clients.
    fn timing(&self) -> Timing;
}


//------------ rtr_listener --------------------------------------------------

/// Binds the RTR listeners and returns a future serving them.
///
/// Binding happens synchronously right here so a failure to acquire a
/// socket becomes a fatal startup error.
pub fn rtr_listener<Source: PayloadSource>(
    source: Source,
    sender: &NotifySender,
    config: &Config,
) -> Result<impl Future<Output = ()>, ExitError> {
    let mut listeners = Vec::new();
    for addr in &config.rtr_listen {
        let listener = match StdListener::bind(addr) {
            Ok(listener) => listener,
            Err(err) => {
                error!("Fatal: cannot bind RTR listener {}: {}", addr, err);
                return Err(ExitError::Generic)
            }
        };
        if let Err(err) = listener.set_nonblocking(true) {
            error!(
                "Fatal: cannot set listener {} to non-blocking: {}",
                addr, err
            );
            return Err(ExitError::Generic)
        }
        listeners.push((addr.to_string(), listener));
    }
    Ok(_rtr_listener(
        source, sender.clone(), listeners, config.rtr_client_timeout
    ))
}

async fn _rtr_listener<Source: PayloadSource>(
    source: Source,
    sender: NotifySender,
    listeners: Vec<(String, StdListener)>,
    client_timeout: Duration,
) {
    // If there are no listeners, just never return.
    if listeners.is_empty() {
        pending::<()>().await;
        return;
    }

    let _ = select_all(
        listeners.into_iter().map(|(addr, listener)| {
            tokio::spawn(single_rtr_listener(
                addr, listener, source.clone(), sender.clone(),
                client_timeout,
            ))
        })
    ).await;
}

async fn single_rtr_listener<Source: PayloadSource>(
    addr: String,
    listener: StdListener,
    source: Source,
    sender: NotifySender,
    client_timeout: Duration,
) {
    let listener = match TcpListener::from_std(listener) {
        Ok(listener) => listener,
        Err(err) => {
            error!("Fatal error listening on {}: {}", addr, err);
            return;
        }
    };
    loop {
        let sock = match listener.accept().await {
            Ok((sock, peer)) => {
                debug!("RTR: connection from {}.", peer);
                sock
            }
            Err(err) => {
                error!("Fatal error in RTR listener {}: {}", addr, err);
                return;
            }
        };
        let conn = Connection::new(
            sock, source.clone(), sender.subscribe(), client_timeout
        );
        tokio::spawn(async move {
            if let Err(err) = conn.run().await {
                debug!("RTR connection closed: {}", err);
            }
        });
    }
}


//------------ Connection ----------------------------------------------------

/// A single client connection.
pub struct Connection<Sock, Source> {
    /// The socket to run the connection on.
    sock: Sock,

    /// The source of the payload data.
    source: Source,

    /// Our receiving end of update notifications.
    notify: NotifyReceiver,

    /// The protocol version of this session.
    ///
    /// This is `None` before the client's first PDU arrives; that PDU
    /// pins the version for the rest of the session.
    version: Option<u8>,

    /// The idle timeout after which the connection is dropped.
    client_timeout: Duration,
}

impl<Sock, Source> Connection<Sock, Source>
where
    Sock: AsyncRead + AsyncWrite + Unpin,
    Source: PayloadSource,
{
    pub fn new(
        sock: Sock,
        source: Source,
        notify: NotifyReceiver,
        client_timeout: Duration,
    ) -> Self {
        Connection {
            sock,
            source,
            notify,
            version: None,
            client_timeout,
        }
    }

    /// The version to use in outgoing PDUs.
    fn version(&self) -> u8 {
        self.version.unwrap_or(0)
    }

    /// Runs the session until the client is done or misbehaves.
    pub async fn run(mut self) -> Result<(), io::Error> {
        loop {
            match self.read_query().await? {
                Some(Query::Reset) => {
                    self.send_full().await?;
                }
                Some(Query::Serial { session, serial }) => {
                    self.send_diff(session, serial).await?;
                }
                Some(Query::Notify) => {
                    self.send_notify().await?;
                }
                None => return Ok(())
            }
            self.sock.flush().await?;
        }
    }

    /// Waits for the next thing to do.
    ///
    /// Returns `None` when the session should end: the peer closed the
    /// connection, the idle timeout struck, or a protocol error forced
    /// us to give up after sending an error report.
    ///
    /// Notifications are only delivered while no partial PDU has
    /// arrived; once the first header octet is in, we commit to reading
    /// the whole header so no bytes get lost.
    async fn read_query(&mut self) -> Result<Option<Query>, io::Error> {
        let mut buf = [0u8; 8];
        let mut read = 0;
        let deadline = tokio::time::Instant::now() + self.client_timeout;

        let header = loop {
            let sock = &mut self.sock;
            let notify = &mut self.notify;
            tokio::select! {
                res = sock.read(&mut buf[read..]) => {
                    let count = res?;
                    if count == 0 {
                        // Peer closed the connection.
                        return Ok(None)
                    }
                    read += count;
                    if read == buf.len() {
                        let mut header = pdu::Header::default();
                        header.as_mut().copy_from_slice(&buf);
                        break header
                    }
                }
                _ = notify.recv(), if read == 0 => {
                    return Ok(Some(Query::Notify))
                }
                _ = tokio::time::sleep_until(deadline) => {
                    // Idle timeout: close without an error report.
                    return Ok(None)
                }
            }
        };

        if let Some(err) = self.check_version(header) {
            err.write(&mut self.sock).await?;
            self.sock.flush().await?;
            return Ok(None)
        }

        // The length field is 32 bits wide. Refuse anything oversized
        // before even looking at the type so a malicious length can
        // never make us buffer gigabytes.
        if header.length() > pdu::MAX_PDU_LEN {
            return self.refuse(header, 3, "PDU too large").await
        }

        match header.pdu() {
            pdu::SERIAL_QUERY_PDU => {
                if header.length() != pdu::SERIAL_QUERY_LEN {
                    return self.refuse(header, 3, "invalid length").await
                }
                let payload = match timeout(
                    self.client_timeout,
                    pdu::SerialQueryPayload::read(&mut self.sock)
                ).await {
                    Ok(payload) => payload?,
                    Err(_) => return Ok(None),
                };
                Ok(Some(Query::Serial {
                    session: header.session(),
                    serial: payload.serial(),
                }))
            }
            pdu::ResetQuery::PDU => {
                if header.length() != pdu::ResetQuery::LEN {
                    return self.refuse(header, 3, "invalid length").await
                }
                Ok(Some(Query::Reset))
            }
            pdu::ErrorReport::PDU => {
                // The client reported an error. All we can do is close.
                Ok(None)
            }
            _ => {
                self.refuse(
                    header, 3, "expected Serial Query or Reset Query"
                ).await
            }
        }
    }

    /// Checks the version of an incoming PDU.
    ///
    /// The first PDU pins the session's version; every later PDU must
    /// use the same one.
    fn check_version(
        &mut self, header: pdu::Header
    ) -> Option<pdu::ErrorReport> {
        if let Some(current) = self.version {
            if current != header.version() {
                Some(pdu::ErrorReport::new(
                    header.version(), 8, header.as_ref(),
                    "version switched during connection"
                ))
            }
            else {
                None
            }
        }
        else if header.version() > 1 {
            Some(pdu::ErrorReport::new(
                header.version(), 4, header.as_ref(),
                "only versions 0 and 1 supported"
            ))
        }
        else {
            self.version = Some(header.version());
            None
        }
    }

    /// Sends an error report and ends the session.
    async fn refuse(
        &mut self, header: pdu::Header, code: u16, text: &str
    ) -> Result<Option<Query>, io::Error> {
        pdu::ErrorReport::new(
            self.version(), code, header.as_ref(), text
        ).write(&mut self.sock).await?;
        self.sock.flush().await?;
        Ok(None)
    }

    /// Answers a Reset Query with the full data set.
    async fn send_full(&mut self) -> Result<(), io::Error> {
        if !self.source.ready() {
            return self.send_no_data().await
        }
        let version = self.version();
        let (state, iter) = self.source.full();
        pdu::CacheResponse::new(
            version, state.session()
        ).write(&mut self.sock).await?;
        for payload in iter {
            if let Some(pdu) = pdu::PayloadPdu::new(
                version, Action::Announce, &payload
            ) {
                pdu.write(&mut self.sock).await?;
            }
        }
        self.send_end_of_data(state).await
    }

    /// Answers a Serial Query.
    ///
    /// If the source can produce a delta path from the client's state,
    /// streams it; otherwise tells the client to start over with a
    /// Cache Reset.
    async fn send_diff(
        &mut self, session: u16, serial: Serial
    ) -> Result<(), io::Error> {
        if !self.source.ready() {
            return self.send_no_data().await
        }
        let version = self.version();
        let (state, iter) = match self.source.diff(
            State::new(session, serial)
        ) {
            Some(some) => some,
            None => {
                return pdu::CacheReset::new(version)
                    .write(&mut self.sock).await
            }
        };
        pdu::CacheResponse::new(
            version, state.session()
        ).write(&mut self.sock).await?;
        for (action, payload) in iter {
            if let Some(pdu) = pdu::PayloadPdu::new(
                version, action, &payload
            ) {
                pdu.write(&mut self.sock).await?;
            }
        }
        self.send_end_of_data(state).await
    }

    async fn send_end_of_data(
        &mut self, state: State
    ) -> Result<(), io::Error> {
        pdu::EndOfData::new(
            self.version(), state.session(), state.serial(),
            self.source.timing(),
        ).write(&mut self.sock).await
    }

    /// Sends a "No Data Available" error report.
    ///
    /// Unlike other error reports, this one doesn't end the session;
    /// the client is expected to try again later.
    async fn send_no_data(&mut self) -> Result<(), io::Error> {
        pdu::ErrorReport::new(
            self.version(), 2, &[], "no data available yet"
        ).write(&mut self.sock).await
    }

    /// Sends a Serial Notify with the current state.
    async fn send_notify(&mut self) -> Result<(), io::Error> {
        if !self.source.ready() {
            return Ok(())
        }
        let state = self.source.notify();
        pdu::SerialNotify::new(
            self.version(), state.session(), state.serial()
        ).write(&mut self.sock).await
    }
}


//------------ Query ---------------------------------------------------------

/// The things that can happen on a connection.
enum Query {
    /// The client sent a Serial Query.
    Serial {
        session: u16,
        serial: Serial,
    },

    /// The client sent a Reset Query.
    Reset,

    /// The payload source has a new version.
    Notify,
}


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;
    use std::sync::Arc;
    use crate::payload::RouteOrigin;
    use crate::resources::AddressPrefix;

    /// A payload source with one v4 origin and a single-step diff.
    #[derive(Clone)]
    struct TestSource {
        state: State,
        full: Arc<Vec<Payload>>,
        diff: Arc<Vec<(Action, Payload)>>,
        diff_from: Serial,
        ready: bool,
    }

    impl TestSource {
        fn new() -> Self {
            let origin = RouteOrigin::new(
                64501.into(),
                AddressPrefix::from_str("10.0.0.0/24").unwrap(),
                24,
            );
            TestSource {
                state: State::new(0x700, Serial(3)),
                full: Arc::new(vec![Payload::Origin(origin)]),
                diff: Arc::new(vec![
                    (Action::Announce, Payload::Origin(origin))
                ]),
                diff_from: Serial(2),
                ready: true,
            }
        }
    }

    impl PayloadSource for TestSource {
        type FullIter = std::vec::IntoIter<Payload>;
        type DiffIter = std::vec::IntoIter<(Action, Payload)>;

        fn ready(&self) -> bool {
            self.ready
        }

        fn notify(&self) -> State {
            self.state
        }

        fn full(&self) -> (State, Self::FullIter) {
            (self.state, self.full.as_ref().clone().into_iter())
        }

        fn diff(&self, state: State) -> Option<(State, Self::DiffIter)> {
            if state.session() != self.state.session()
                || state.serial() != self.diff_from
            {
                return None
            }
            Some((self.state, self.diff.as_ref().clone().into_iter()))
        }

        fn timing(&self) -> Timing {
            Timing::default()
        }
    }

    fn run_session(input: Vec<u8>) -> Vec<u8> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time().build().unwrap();
        rt.block_on(async move {
            let (client, server) = tokio::io::duplex(0x10000);
            let sender = NotifySender::new();
            let conn = Connection::new(
                server, TestSource::new(), sender.subscribe(),
                Duration::from_millis(200),
            );
            let task = tokio::spawn(conn.run());
            let (mut read_half, mut write_half)
                = tokio::io::split(client);
            write_half.write_all(&input).await.unwrap();
            let mut res = Vec::new();
            read_half.read_to_end(&mut res).await.unwrap();
            drop(write_half);
            let _ = task.await;
            res
        })
    }

    #[test]
    fn reset_query_streams_full_set() {
        // Reset Query, version 0.
        let response = run_session(
            vec![0, 2, 0, 0, 0, 0, 0, 8]
        );
        // Cache Response (8) + IPv4 Prefix (20) + End of Data v0 (12).
        assert_eq!(response.len(), 40);
        assert_eq!(&response[..8], &[0, 3, 0x07, 0, 0, 0, 0, 8]);
        assert_eq!(response[9], 4); // IPv4 prefix PDU
        assert_eq!(response[16], 1); // announce flag
        assert_eq!(response[29], 7); // end of data PDU
        assert_eq!(
            &response[36..40], &3u32.to_be_bytes()
        ); // serial 3
    }

    #[test]
    fn serial_query_with_delta_path() {
        // Serial Query at serial 2, session 0x700, version 1.
        let mut query = vec![1, 1, 0x07, 0x00, 0, 0, 0, 12];
        query.extend_from_slice(&2u32.to_be_bytes());
        let response = run_session(query);
        // Cache Response (8) + IPv4 Prefix (20) + End of Data v1 (24).
        assert_eq!(response.len(), 52);
        assert_eq!(response[1], 3);
        assert_eq!(response[9], 4);
        assert_eq!(response[29], 7);
    }

    #[test]
    fn serial_query_out_of_window_gets_cache_reset() {
        // Serial Query at serial 0 which the source cannot serve.
        let mut query = vec![0, 1, 0x07, 0x00, 0, 0, 0, 12];
        query.extend_from_slice(&0u32.to_be_bytes());
        let response = run_session(query);
        // Cache Reset (8).
        assert_eq!(response.len(), 8);
        assert_eq!(&response[..2], &[0, 8]);
    }

    #[test]
    fn unsupported_version_gets_error_four() {
        let response = run_session(
            vec![2, 2, 0, 0, 0, 0, 0, 8]
        );
        assert_eq!(response[1], 10); // error report
        assert_eq!(&response[2..4], &4u16.to_be_bytes());
    }

    #[test]
    fn version_switch_gets_error_eight() {
        // A version 0 reset query followed by a version 1 reset query.
        let mut input = vec![0, 2, 0, 0, 0, 0, 0, 8];
        input.extend_from_slice(&[1, 2, 0, 0, 0, 0, 0, 8]);
        let response = run_session(input);
        // Full response (40 octets), then an error report with code 8.
        assert_eq!(response[40 + 1], 10);
        assert_eq!(&response[40 + 2..40 + 4], &8u16.to_be_bytes());
    }

    #[test]
    fn bad_pdu_type_gets_error_three() {
        // A Cache Response is nothing a client may send.
        let response = run_session(
            vec![0, 3, 0, 0, 0, 0, 0, 8]
        );
        assert_eq!(response[1], 10);
        assert_eq!(&response[2..4], &3u16.to_be_bytes());
    }
}
