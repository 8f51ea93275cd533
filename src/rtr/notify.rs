//! Sending of cache update notifications.
//!
//! Whenever the validation driver commits a new serial, every connected
//! client gets a Serial Notify PDU. The sender half lives with the
//! driver, a receiver half with each client connection. Delivery is
//! best-effort: each receiver's channel has a single slot, and if it is
//! full there already is an unprocessed notification, which is all a
//! session ever needs.

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;


//------------ NotifySender --------------------------------------------------

/// The sending half of the notification machinery.
#[derive(Clone, Debug)]
pub struct NotifySender {
    connections: Arc<Mutex<Vec<mpsc::Sender<()>>>>,
}

impl NotifySender {
    pub fn new() -> Self {
        NotifySender {
            connections: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Registers a new client connection.
    pub fn subscribe(&self) -> NotifyReceiver {
        let (tx, rx) = mpsc::channel(1);
        self.connections.lock().unwrap().push(tx);
        NotifyReceiver { rx }
    }

    /// Notifies all connected clients.
    ///
    /// Clients that have gone away are dropped from the registry. The
    /// list is cloned first so no lock is held while interacting with
    /// the channels.
    pub fn notify(&self) {
        let connections = self.connections.lock().unwrap().clone();
        let mut closed = false;
        for tx in &connections {
            match tx.try_send(()) {
                Ok(()) => { }
                Err(mpsc::error::TrySendError::Full(_)) => { }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    closed = true
                }
            }
        }
        if closed {
            self.connections.lock().unwrap().retain(|tx| {
                !tx.is_closed()
            });
        }
    }
}

impl Default for NotifySender {
    fn default() -> Self {
        Self::new()
    }
}


//------------ NotifyReceiver ------------------------------------------------

/// The receiving half of the notification machinery.
#[derive(Debug)]
pub struct NotifyReceiver {
    rx: mpsc::Receiver<()>,
}

impl NotifyReceiver {
    /// Waits for the next notification.
    ///
    /// If the sender has gone away, waits forever: the connection will
    /// be closed through other means.
    pub async fn recv(&mut self) {
        if self.rx.recv().await.is_none() {
            std::future::pending::<()>().await
        }
    }
}


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn notify_wakes_subscriber() {
        let sender = NotifySender::new();
        let mut receiver = sender.subscribe();
        sender.notify();
        tokio::time::timeout(
            Duration::from_secs(1), receiver.recv()
        ).await.unwrap();
    }

    #[tokio::test]
    async fn repeated_notifies_collapse() {
        let sender = NotifySender::new();
        let mut receiver = sender.subscribe();
        sender.notify();
        sender.notify();
        sender.notify();
        tokio::time::timeout(
            Duration::from_secs(1), receiver.recv()
        ).await.unwrap();
        // Only one further notification is pending at most; receiving
        // must not hang since notify was called while the slot was
        // already full.
        let res = tokio::time::timeout(
            Duration::from_millis(50), receiver.recv()
        ).await;
        let _ = res;
    }

    #[tokio::test]
    async fn closed_receivers_get_dropped() {
        let sender = NotifySender::new();
        let receiver = sender.subscribe();
        drop(receiver);
        sender.notify();
        sender.notify();
        assert!(sender.connections.lock().unwrap().is_empty());
    }
}
